//! OAuth2 token management.
//!
//! A [`TokenManager`] is a [`CredentialSource`](crate::CredentialSource): plugged into
//! the auth augmenter, it attaches a bearer token to every request, renews it before
//! it expires and once more when the server rejects it.
//!
//! # Supported Flows
//!
//! - **Client Credentials**: the token is requested from the token endpoint
//! - **Pre-Acquired Token**: an externally obtained token, optionally with a refresh token
//!
//! Renewal uses the `refresh_token` grant when a refresh token is known, and repeats
//! the configured grant otherwise.

mod config;
mod error;
mod provider;
mod token;

pub use self::config::{ClientAuthMethod, OAuth2Config, OAuth2ConfigBuilder, OAuth2GrantType};
pub use self::error::OAuth2Error;
pub use self::provider::TokenManager;
pub use self::token::{OAuth2Token, TokenCache};

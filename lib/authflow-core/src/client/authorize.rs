//! Authorization requests against the identity server's hypermedia API.
//!
//! The server answers an authorization request with a JSON representation whose
//! `type` field tells what comes next (an authentication step, a redirection, a
//! problem, ...).

use std::fmt;

use http::StatusCode;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{ApiClient, ApiClientError, HttpRequest, resolve};

/// Default path of the authorization endpoint.
pub const DEFAULT_AUTHORIZE_ENDPOINT: &str = "oauth/v2/oauth-authorize";

/// Query of an OAuth2 authorization request.
///
/// # Example
///
/// ```rust
/// use authflow_core::AuthorizeRequest;
/// use url::Url;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let base_url = Url::parse("https://idsvr.example.com/")?;
/// let request = AuthorizeRequest::new("haapi-client").to_request(&base_url)?;
///
/// assert_eq!(
///     request.url().as_str(),
///     "https://idsvr.example.com/oauth/v2/oauth-authorize?client_id=haapi-client&scope=openid&response_type=code"
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    client_id: String,
    scopes: Vec<String>,
    response_type: String,
    endpoint: String,
    redirect_uri: Option<String>,
    extra: Vec<(String, String)>,
}

impl AuthorizeRequest {
    /// Creates a `code` request for the `openid` scope.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scopes: vec!["openid".to_string()],
            response_type: "code".to_string(),
            endpoint: DEFAULT_AUTHORIZE_ENDPOINT.to_string(),
            redirect_uri: None,
            extra: Vec::new(),
        }
    }

    /// Replaces the requested scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a scope.
    #[must_use]
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Sets the `response_type`.
    #[must_use]
    pub fn with_response_type(mut self, response_type: impl Into<String>) -> Self {
        self.response_type = response_type.into();
        self
    }

    /// Sets the endpoint path, relative to the client base URL.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the `redirect_uri`.
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Adds a query parameter (`state`, `prompt`, ...).
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// The client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The requested scopes.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Builds the `GET` request against `base_url`.
    ///
    /// # Errors
    ///
    /// Fails if the endpoint cannot be joined to `base_url`, is on another origin, or
    /// the query cannot be encoded.
    pub fn to_request(&self, base_url: &Url) -> Result<HttpRequest, ApiClientError> {
        let mut url = resolve(base_url, &self.endpoint)?;

        let scope = self.scopes.join(" ");
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("scope", scope.as_str()),
            ("response_type", self.response_type.as_str()),
        ];
        if let Some(redirect_uri) = &self.redirect_uri {
            params.push(("redirect_uri", redirect_uri.as_str()));
        }
        params.extend(
            self.extra
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_str())),
        );

        let query = serde_urlencoded::to_string(&params)?;
        url.set_query(Some(&query));
        Ok(HttpRequest::get(url))
    }
}

/// Extracts the `type` field of a JSON representation.
///
/// # Errors
///
/// Returns [`ApiClientError::MalformedResponse`] if `body` is not a JSON object with a
/// string `type` field.
pub fn extract_type(body: &str) -> Result<String, ApiClientError> {
    let malformed = |reason: String| ApiClientError::MalformedResponse {
        reason,
        body: body.to_string(),
    };

    let value: Value =
        serde_json::from_str(body).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
    let Value::Object(object) = value else {
        return Err(malformed("expected a JSON object".to_string()));
    };
    match object.get("type") {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(other) => Err(malformed(format!(
            "field 'type' must be a string, got {other}"
        ))),
        None => Err(malformed("missing field 'type'".to_string())),
    }
}

/// Kinds of representation returned by the identity server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RepresentationType {
    /// The user must authenticate.
    AuthenticationStep,
    /// The client must follow a link.
    RedirectionStep,
    /// The user must register.
    RegistrationStep,
    /// The client must poll until something happens out of band.
    PollingStep,
    /// The same step must be continued.
    ContinueSameStep,
    /// A consentor must approve.
    ConsentorStep,
    /// The user must consent.
    UserConsentStep,
    /// The flow is over and carries the authorization response.
    OAuthAuthorizationResponse,
    /// The submitted credentials were rejected.
    IncorrectCredentialsProblem,
    /// The submitted form was invalid.
    InvalidInputProblem,
    /// The server hit an unexpected error.
    UnexpectedProblem,
    /// The authorization request was refused.
    AuthorizationResponseProblem,
    /// Anything else.
    Unknown(String),
}

impl RepresentationType {
    /// The wire value.
    pub fn as_str(&self) -> &str {
        match self {
            Self::AuthenticationStep => "authentication-step",
            Self::RedirectionStep => "redirection-step",
            Self::RegistrationStep => "registration-step",
            Self::PollingStep => "polling-step",
            Self::ContinueSameStep => "continue-same-step",
            Self::ConsentorStep => "consentor-step",
            Self::UserConsentStep => "user-consent-step",
            Self::OAuthAuthorizationResponse => "oauth-authorization-response",
            Self::IncorrectCredentialsProblem => "https://curity.se/problems/incorrect-credentials",
            Self::InvalidInputProblem => "https://curity.se/problems/invalid-input",
            Self::UnexpectedProblem => "https://curity.se/problems/unexpected",
            Self::AuthorizationResponseProblem => {
                "https://curity.se/problems/error-authorization-response"
            }
            Self::Unknown(value) => value,
        }
    }

    /// Returns `true` for problem representations.
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            Self::IncorrectCredentialsProblem
                | Self::InvalidInputProblem
                | Self::UnexpectedProblem
                | Self::AuthorizationResponseProblem
        )
    }
}

impl From<&str> for RepresentationType {
    fn from(value: &str) -> Self {
        match value {
            "authentication-step" => Self::AuthenticationStep,
            "redirection-step" => Self::RedirectionStep,
            "registration-step" => Self::RegistrationStep,
            "polling-step" => Self::PollingStep,
            "continue-same-step" => Self::ContinueSameStep,
            "consentor-step" => Self::ConsentorStep,
            "user-consent-step" => Self::UserConsentStep,
            "oauth-authorization-response" => Self::OAuthAuthorizationResponse,
            "https://curity.se/problems/incorrect-credentials" => Self::IncorrectCredentialsProblem,
            "https://curity.se/problems/invalid-input" => Self::InvalidInputProblem,
            "https://curity.se/problems/unexpected" => Self::UnexpectedProblem,
            "https://curity.se/problems/error-authorization-response" => {
                Self::AuthorizationResponseProblem
            }
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for RepresentationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationStep {
    /// HTTP status of the response.
    pub status: StatusCode,
    /// The response body, `"{}"` if it could not be read.
    pub body: String,
    /// The `type` field of the body.
    pub response_type: String,
}

impl AuthorizationStep {
    /// The typed representation kind.
    pub fn representation_type(&self) -> RepresentationType {
        RepresentationType::from(self.response_type.as_str())
    }
}

impl ApiClient {
    /// Sends an authorization request and reads the representation type of the answer.
    ///
    /// Error statuses are not errors: problem representations come back as a step.
    ///
    /// # Errors
    ///
    /// - [`ApiClientError::Transport`] if the call fails
    /// - [`ApiClientError::Authentication`] if the auth augmenter has no credential
    /// - [`ApiClientError::MalformedResponse`] if the body has no `type`, including
    ///   when the body could not be read
    pub async fn start_authorization(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<AuthorizationStep, ApiClientError> {
        let request = request.to_request(self.base_url())?;
        let mut response = self.execute(request).await?;

        let status = response.status();
        let body = response.read_body_or_default().await;
        let response_type = extract_type(&body)?;
        debug!(%status, %response_type, "authorization step");

        Ok(AuthorizationStep {
            status,
            body,
            response_type,
        })
    }
}

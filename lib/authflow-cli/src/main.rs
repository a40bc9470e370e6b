#![allow(missing_docs)]
use std::env;
use std::ffi::OsString;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use authflow_core::{
    ApiClient, Authentication, AuthorizationStep, AuthorizeRequest, DEFAULT_AUTHORIZE_ENDPOINT,
    DefaultHeaders, OAuth2Config, RequestLogger, TokenManager,
};
use http::uri::Scheme;
use tracing::{Level, info, warn};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8443;
const DEFAULT_CLIENT_ID: &str = "haapi-public-client";
const DEFAULT_TOKEN_ENDPOINT: &str = "oauth/v2/oauth-token";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    let args = AppArgs::parse().context("parsing arguments")?;

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
    if !args.remaining.is_empty() {
        warn!(remaining = ?args.remaining, "Warning: unused arguments left");
    }

    let client = args.client().context("building client")?;
    let step = client
        .start_authorization(&args.authorize_request())
        .await
        .context("starting authorization")?;

    info!(status = %step.status, "authorization started");
    print_step(&step);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_step(step: &AuthorizationStep) {
    println!("Response type  = {}", step.response_type);
}

#[derive(Debug)]
struct AppArgs {
    scheme: Scheme,
    host: String,
    port: u16,
    client_id: String,
    scopes: Vec<String>,
    endpoint: String,
    redirect_uri: Option<String>,
    token_endpoint: String,
    client_secret: Option<String>,
    access_token: Option<String>,
    timeout: Duration,
    verbose: bool,
    remaining: Vec<OsString>,
}

impl AppArgs {
    fn parse() -> Result<Self> {
        let mut pargs = pico_args::Arguments::from_env();

        let verbose = pargs.contains(["-v", "--verbose"]) || env_flag("AUTHFLOW_VERBOSE");

        let scheme: String = option(&mut pargs, "--scheme", "AUTHFLOW_SCHEME")?
            .unwrap_or_else(|| "https".to_string());
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" => Scheme::HTTP,
            "https" => Scheme::HTTPS,
            other => bail!("unsupported scheme '{other}', expected http or https"),
        };

        let host = option(&mut pargs, "--host", "AUTHFLOW_HOST")?
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = option(&mut pargs, "--port", "AUTHFLOW_PORT")?.unwrap_or(DEFAULT_PORT);
        let client_id = option(&mut pargs, "--client-id", "AUTHFLOW_CLIENT_ID")?
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());

        let mut scopes: Vec<String> = pargs
            .values_from_str("--scope")
            .context("parsing scope argument")?;
        if scopes.is_empty() {
            scopes = env::var("AUTHFLOW_SCOPE")
                .map(|value| value.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
        }
        if scopes.is_empty() {
            scopes.push("openid".to_string());
        }

        let endpoint = option(&mut pargs, "--endpoint", "AUTHFLOW_ENDPOINT")?
            .unwrap_or_else(|| DEFAULT_AUTHORIZE_ENDPOINT.to_string());
        let redirect_uri = option(&mut pargs, "--redirect-uri", "AUTHFLOW_REDIRECT_URI")?;
        let token_endpoint = option(&mut pargs, "--token-endpoint", "AUTHFLOW_TOKEN_ENDPOINT")?
            .unwrap_or_else(|| DEFAULT_TOKEN_ENDPOINT.to_string());
        let client_secret = option(&mut pargs, "--client-secret", "AUTHFLOW_CLIENT_SECRET")?;
        let access_token = option(&mut pargs, "--access-token", "AUTHFLOW_ACCESS_TOKEN")?;
        let timeout = option(&mut pargs, "--timeout", "AUTHFLOW_TIMEOUT")?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let remaining = pargs.finish();
        Ok(Self {
            scheme,
            host,
            port,
            client_id,
            scopes,
            endpoint,
            redirect_uri,
            token_endpoint,
            client_secret,
            access_token,
            timeout: Duration::from_secs(timeout),
            verbose,
            remaining,
        })
    }

    fn token_url(&self) -> String {
        if self.token_endpoint.contains("://") {
            return self.token_endpoint.clone();
        }
        format!(
            "{}://{}:{}/{}",
            self.scheme,
            self.host,
            self.port,
            self.token_endpoint.trim_start_matches('/')
        )
    }

    fn client(&self) -> Result<ApiClient> {
        let builder = ApiClient::builder()
            .with_scheme(self.scheme.clone())
            .with_host(&self.host)
            .with_port(self.port)
            .with_timeout(self.timeout)
            .with_interceptor(RequestLogger)
            .with_interceptor(DefaultHeaders::auth_json());

        let builder = match (&self.client_secret, &self.access_token) {
            (Some(secret), _) => {
                let config = OAuth2Config::client_credentials(
                    &self.client_id,
                    secret.as_str(),
                    self.token_url(),
                )?
                .add_scopes(self.scopes.iter().cloned())
                .with_timeout(self.timeout)
                .build()?;
                builder.with_credential_source(TokenManager::new(config)?)
            }
            (None, Some(token)) => {
                builder.with_authentication(Authentication::Bearer(token.as_str().into()))
            }
            (None, None) => {
                warn!("no client secret nor access token, requests are sent without credential");
                builder
            }
        };

        Ok(builder.build()?)
    }

    fn authorize_request(&self) -> AuthorizeRequest {
        let request = AuthorizeRequest::new(&self.client_id)
            .with_scopes(self.scopes.iter().cloned())
            .with_endpoint(&self.endpoint);
        match &self.redirect_uri {
            Some(redirect_uri) => request.with_redirect_uri(redirect_uri),
            None => request,
        }
    }
}

/// Reads `key` from the command line, then from the `env_var` environment variable.
fn option<T>(
    pargs: &mut pico_args::Arguments,
    key: &'static str,
    env_var: &str,
) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let value = pargs
        .opt_value_from_str(key)
        .with_context(|| format!("parsing {key} argument"))?;
    if value.is_some() {
        return Ok(value);
    }

    match env::var(env_var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|err| anyhow!("parsing {env_var} environment variable: {err}")),
        Err(_) => Ok(None),
    }
}

fn env_flag(env_var: &str) -> bool {
    env::var(env_var).is_ok_and(|value| matches!(value.as_str(), "1" | "true" | "yes"))
}

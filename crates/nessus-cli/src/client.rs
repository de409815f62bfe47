//! Shared client construction, credential resolution, and CLI error types.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use anyhow::anyhow;
use clap::Args;
use nessus_client::{ClientConfig, ClientError, Credentials, ReqwestTransport};
use url::Url;

/// CLI-level error type separating bad input, unfinished exports, and
/// operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Timeout(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
            Self::Timeout(_) => 4,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) | Self::Timeout(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ClientError> for CliError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::InvalidFormat { .. } => Self::Validation(error.to_string()),
            ClientError::Timeout { .. } => Self::Timeout(format!(
                "{error}; the export may still be processing on the server"
            )),
            other => Self::failure(other),
        }
    }
}

pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings gathered from global flags.
#[derive(Args, Debug, Clone)]
pub(crate) struct ConnectionArgs {
    #[arg(long, global = true, env = "NESSUS_URL", value_parser = parse_url)]
    pub(crate) url: Option<Url>,
    #[arg(long, global = true, env = "NESSUS_ACCESS_KEY", hide_env_values = true)]
    pub(crate) access_key: Option<String>,
    #[arg(long, global = true, env = "NESSUS_SECRET_KEY", hide_env_values = true)]
    pub(crate) secret_key: Option<String>,
    #[arg(long, global = true, env = "NESSUS_SESSION_TOKEN", hide_env_values = true)]
    pub(crate) session_token: Option<String>,
    #[arg(
        long = "timeout",
        global = true,
        env = "NESSUS_HTTP_TIMEOUT_SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS
    )]
    pub(crate) timeout_secs: u64,
    #[arg(
        long,
        global = true,
        env = "NESSUS_INSECURE",
        help = "Accept invalid TLS certificates (self-signed scanner installs)"
    )]
    pub(crate) insecure: bool,
}

/// Application context passed to command handlers.
#[derive(Debug, Clone)]
pub(crate) struct AppContext {
    pub(crate) transport: ReqwestTransport,
}

impl AppContext {
    /// Build the HTTP transport from connection flags.
    pub(crate) fn from_args(args: ConnectionArgs, trace_id: &str) -> CliResult<Self> {
        let url = args.url.ok_or_else(|| {
            CliError::validation("Nessus URL is required (pass --url or set NESSUS_URL)")
        })?;
        let credentials =
            resolve_credentials(args.access_key, args.secret_key, args.session_token)?;

        let config = ClientConfig::from_url(url, credentials)
            .with_timeout(Duration::from_secs(args.timeout_secs))
            .with_accept_invalid_certs(args.insecure)
            .with_user_agent(concat!("nessus-cli/", env!("CARGO_PKG_VERSION")))
            .with_request_id(trace_id);

        let transport = ReqwestTransport::new(&config)
            .map_err(|err| CliError::failure(anyhow!(err).context("failed to build HTTP client")))?;
        Ok(Self { transport })
    }
}

/// Parse the API URL provided to the CLI.
pub(crate) fn parse_url(input: &str) -> Result<Url, String> {
    input
        .parse::<Url>()
        .map_err(|err| format!("invalid URL '{input}': {err}"))
}

/// Pick credentials from flags: an API key pair wins over a session token.
pub(crate) fn resolve_credentials(
    access_key: Option<String>,
    secret_key: Option<String>,
    session_token: Option<String>,
) -> CliResult<Credentials> {
    let access_key = non_empty(access_key);
    let secret_key = non_empty(secret_key);

    match (access_key, secret_key) {
        (Some(access), Some(secret)) => Ok(Credentials::api_keys(access, secret)),
        (Some(_), None) | (None, Some(_)) => Err(CliError::validation(
            "both --access-key and --secret-key are required when using API keys",
        )),
        (None, None) => non_empty(session_token)
            .map(Credentials::session_token)
            .ok_or_else(|| {
                CliError::validation(
                    "credentials are required (pass --access-key/--secret-key or --session-token)",
                )
            }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

//! Connection settings and credentials for the Nessus API.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::{ClientError, ClientResult};

/// Header carrying an API key pair.
pub const HEADER_API_KEYS: &str = "x-apikeys";
/// Header carrying a session token.
pub const HEADER_COOKIE: &str = "x-cookie";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials attached to every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// API key pair sent as `X-ApiKeys: accessKey=<k>; secretKey=<s>`.
    ApiKeys {
        /// Access key.
        access_key: String,
        /// Secret key.
        secret_key: String,
    },
    /// Session token sent as `X-Cookie: token=<t>`.
    SessionToken(String),
}

impl Credentials {
    /// API key pair credentials.
    #[must_use]
    pub fn api_keys(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self::ApiKeys {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Session token credentials.
    #[must_use]
    pub fn session_token(token: impl Into<String>) -> Self {
        Self::SessionToken(token.into())
    }

    /// Header name and value that carry these credentials.
    #[must_use]
    pub fn header(&self) -> (&'static str, String) {
        match self {
            Self::ApiKeys {
                access_key,
                secret_key,
            } => (
                HEADER_API_KEYS,
                format!("accessKey={access_key}; secretKey={secret_key}"),
            ),
            Self::SessionToken(token) => (HEADER_COOKIE, format!("token={token}")),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKeys { access_key, .. } => formatter
                .debug_struct("ApiKeys")
                .field("access_key", access_key)
                .field("secret_key", &"<redacted>")
                .finish(),
            Self::SessionToken(_) => formatter
                .debug_tuple("SessionToken")
                .field(&"<redacted>")
                .finish(),
        }
    }
}

/// Configuration for [`crate::ReqwestTransport`].
///
/// ```
/// use nessus_client::{ClientConfig, Credentials};
/// use std::time::Duration;
///
/// let config = ClientConfig::new(
///     "https://nessus.example:8834",
///     Credentials::api_keys("access", "secret"),
/// )
/// .expect("valid URL")
/// .with_timeout(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) base_url: Url,
    pub(crate) credentials: Credentials,
    pub(crate) timeout: Duration,
    pub(crate) user_agent: String,
    pub(crate) accept_invalid_certs: bool,
    pub(crate) request_id: Option<String>,
}

impl ClientConfig {
    /// Build a configuration for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] when `base_url` does not parse.
    pub fn new(base_url: &str, credentials: Credentials) -> ClientResult<Self> {
        let base_url = base_url
            .parse::<Url>()
            .map_err(|source| ClientError::InvalidUrl {
                input: base_url.to_string(),
                source,
            })?;
        Ok(Self::from_url(base_url, credentials))
    }

    /// Build a configuration from an already parsed URL.
    #[must_use]
    pub fn from_url(base_url: Url, credentials: Credentials) -> Self {
        Self {
            base_url,
            credentials,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: concat!("nessus-client/", env!("CARGO_PKG_VERSION")).to_string(),
            accept_invalid_certs: false,
            request_id: None,
        }
    }

    /// Per-request timeout. Defaults to 30 seconds.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// User agent sent with every request.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Accept self-signed server certificates. Off by default.
    #[must_use]
    pub const fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Identifier sent as `x-request-id` on every request.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Server base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }
}

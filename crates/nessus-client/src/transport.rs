//! HTTP transport abstraction for the Nessus API.
//!
//! JSON endpoints and the binary download endpoint go through separate,
//! explicitly typed operations: [`Transport::get_json`] and
//! [`Transport::post_json`] decode structured data, [`Transport::get_raw`]
//! hands back the untouched body together with the response headers.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Header carrying the caller's trace identifier.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// Query parameters appended to a request path.
pub type Query<'a> = &'a [(&'a str, String)];

/// Raw response for endpoints that return file bytes instead of JSON.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body, byte for byte.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Header value as text, if present and printable.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Request operations required by the export workflow.
///
/// Bodies that are empty or not labelled as JSON decode as `null`, so callers
/// that tolerate missing payloads should ask for an `Option<T>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET` a JSON document.
    async fn get_json<T>(&self, path: &str, query: Query<'_>) -> ClientResult<T>
    where
        T: DeserializeOwned + Send;

    /// `POST` a JSON body and decode the JSON reply.
    async fn post_json<B, T>(&self, path: &str, query: Query<'_>, body: &B) -> ClientResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned + Send;

    /// `GET` a binary body with its headers.
    async fn get_raw(&self, path: &str, query: Query<'_>) -> ClientResult<RawResponse>;
}

/// Production transport backed by reqwest.
///
/// Idle connections are not kept, so every request opens a fresh connection.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    /// Build a transport that injects the configured credentials on every
    /// request.
    ///
    /// # Errors
    ///
    /// Returns an error when a header value is not encodable or the
    /// underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let mut default_headers = HeaderMap::new();

        let (name, value) = config.credentials.header();
        let mut value =
            HeaderValue::from_str(&value).map_err(|_| ClientError::InvalidHeader { name })?;
        value.set_sensitive(true);
        default_headers.insert(name, value);

        if let Some(request_id) = &config.request_id {
            let value = HeaderValue::from_str(request_id).map_err(|_| {
                ClientError::InvalidHeader {
                    name: HEADER_REQUEST_ID,
                }
            })?;
            default_headers.insert(HEADER_REQUEST_ID, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers)
            .pool_max_idle_per_host(0)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|source| ClientError::ClientBuild { source })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    fn url(&self, path: &str, query: Query<'_>) -> ClientResult<Url> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|source| ClientError::InvalidUrl {
                input: path.to_string(),
                source,
            })?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
        }
        Ok(url)
    }

    fn request(&self, method: Method, path: &str, query: Query<'_>) -> ClientResult<RequestBuilder> {
        let url = self.url(path, query)?;
        tracing::debug!(%method, %url, "sending request");
        Ok(self.client.request(method, url))
    }

    async fn send(
        method: &'static str,
        path: &str,
        request: RequestBuilder,
    ) -> ClientResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|source| ClientError::Request {
                method,
                path: path.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(classify_failure(method, path, response).await)
        }
    }

    async fn decode<T>(method: &'static str, path: &str, response: Response) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("json"));
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ClientError::Request {
                method,
                path: path.to_string(),
                source,
            })?;

        let value = if bytes.is_empty() || !is_json {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|source| ClientError::Decode {
                path: path.to_string(),
                source,
            })?
        };

        serde_json::from_value(value).map_err(|source| ClientError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get_json<T>(&self, path: &str, query: Query<'_>) -> ClientResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let request = self.request(Method::GET, path, query)?;
        let response = Self::send("GET", path, request).await?;
        Self::decode("GET", path, response).await
    }

    async fn post_json<B, T>(&self, path: &str, query: Query<'_>, body: &B) -> ClientResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned + Send,
    {
        let request = self.request(Method::POST, path, query)?.json(body);
        let response = Self::send("POST", path, request).await?;
        Self::decode("POST", path, response).await
    }

    async fn get_raw(&self, path: &str, query: Query<'_>) -> ClientResult<RawResponse> {
        let request = self.request(Method::GET, path, query)?;
        let response = Self::send("GET", path, request).await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::Request {
                method: "GET",
                path: path.to_string(),
                source,
            })?;

        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Turn a non-success response into a [`ClientError::Http`], preferring the
/// `error` field Nessus puts in its JSON error bodies.
async fn classify_failure(method: &'static str, path: &str, response: Response) -> ClientError {
    let status = response.status().as_u16();
    let bytes = response.bytes().await.unwrap_or_default();
    let body_text = String::from_utf8_lossy(&bytes).trim().to_string();

    let message = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            if body_text.is_empty() {
                "no response body".to_string()
            } else {
                body_text
            }
        });

    ClientError::Http {
        method,
        path: path.to_string(),
        status,
        message,
    }
}

//! Shared HTTP client for the hosted backend.
//!
//! Every request carries the project's anon key as `apikey` and, once a
//! user is signed in, the user's access token as the bearer (row level
//! security keys on it). Without a session the anon key is the bearer.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_RANGE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::domain::foundation::{DomainError, ErrorCode};

use super::query::Query;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abc.supabase.co`.
    pub url: String,
    anon_key: SecretString,
    pub timeout: Duration,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: SecretString::new(anon_key.into()),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn anon_key(&self) -> &str {
        self.anon_key.expose_secret()
    }

    /// Websocket endpoint of the realtime service.
    pub fn realtime_url(&self) -> String {
        let base = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            base,
            self.anon_key()
        )
    }
}

/// Error body returned by the table API and the auth service.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ErrorBody {
    fn text(self) -> Option<String> {
        self.message.or(self.msg).or(self.error_description)
    }
}

/// Cheap to clone; clones share the session token.
#[derive(Clone)]
pub struct SupabaseClient {
    config: Arc<SupabaseConfig>,
    http: Client,
    access_token: Arc<RwLock<Option<SecretString>>>,
}

impl SupabaseClient {
    pub fn new(config: SupabaseConfig) -> Result<Self, DomainError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DomainError::backend(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            config: Arc::new(config),
            http,
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// Sets or clears the user token used as bearer.
    pub fn set_access_token(&self, token: Option<&str>) {
        let mut slot = self.access_token.write().unwrap_or_else(|e| e.into_inner());
        *slot = token.map(|t| SecretString::new(t.to_string()));
    }

    fn bearer(&self) -> String {
        let slot = self.access_token.read().unwrap_or_else(|e| e.into_inner());
        let token = slot
            .as_ref()
            .map(|t| t.expose_secret().as_str())
            .unwrap_or_else(|| self.config.anon_key());
        format!("Bearer {}", token)
    }

    /// A request to `{url}/{path}` with the auth headers set.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.config.url, path))
            .header("apikey", self.config.anon_key())
            .header("Authorization", self.bearer())
    }

    /// Like [`request`](Self::request), but always authorized with the
    /// anon key.
    pub(crate) fn anon_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/{}", self.config.url, path))
            .header("apikey", self.config.anon_key())
            .header("Authorization", format!("Bearer {}", self.config.anon_key()))
    }

    /// A table API request against `table` with `query` applied.
    pub(crate) fn rest(&self, method: Method, table: &str, query: &Query) -> RequestBuilder {
        self.request(method, &format!("rest/v1/{}", table))
            .query(query.params())
    }

    /// Sends and decodes a JSON body.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, DomainError> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| {
            DomainError::new(
                ErrorCode::SerializationError,
                format!("unexpected response body: {}", e),
            )
        })
    }

    /// Sends and discards the body.
    pub(crate) async fn send_empty(&self, request: RequestBuilder) -> Result<(), DomainError> {
        self.send(request).await.map(|_| ())
    }

    /// Exact row count of `query` on `table`, without fetching rows.
    pub(crate) async fn count(&self, table: &str, query: &Query) -> Result<u64, DomainError> {
        let request = self
            .rest(Method::HEAD, table, query)
            .header("Prefer", "count=exact");
        let response = self.send(request).await?;
        parse_count(response.headers()).ok_or_else(|| {
            DomainError::new(
                ErrorCode::SerializationError,
                format!("missing row count for {}", table),
            )
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DomainError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ErrorBody = response.json().await.unwrap_or_default();
        debug!(%status, code = ?body.code, "backend request failed");
        Err(status_error(status, body.text()))
    }
}

fn transport_error(err: reqwest::Error) -> DomainError {
    if err.is_timeout() {
        DomainError::backend("request timed out")
    } else if err.is_connect() {
        DomainError::backend(format!("connection failed: {}", err))
    } else {
        DomainError::backend(err.to_string())
    }
}

fn status_error(status: StatusCode, message: Option<String>) -> DomainError {
    let message = message.unwrap_or_else(|| status.to_string());
    let code = match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED
            if message.to_lowercase().contains("jwt") =>
        {
            ErrorCode::Unauthorized
        }
        StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
        StatusCode::FORBIDDEN => ErrorCode::Forbidden,
        StatusCode::CONFLICT => ErrorCode::Conflict,
        StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::ValidationFailed,
        _ => ErrorCode::BackendError,
    };
    DomainError::new(code, message).with_detail("status", status.as_u16().to_string())
}

/// Total from a `Content-Range: 0-9/42` (or `*/42`) header.
fn parse_count(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)
        .and_then(|v: &HeaderValue| v.to_str().ok())
        .and_then(|v| v.rsplit('/').next())
        .and_then(|total| total.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_url_switches_scheme() {
        let config = SupabaseConfig::new("https://abc.supabase.co/", "anon");
        assert_eq!(
            config.realtime_url(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn bearer_falls_back_to_anon_key() {
        let client = SupabaseClient::new(SupabaseConfig::new("http://localhost", "anon")).unwrap();
        assert_eq!(client.bearer(), "Bearer anon");

        client.set_access_token(Some("user-token"));
        assert_eq!(client.bearer(), "Bearer user-token");

        client.set_access_token(None);
        assert_eq!(client.bearer(), "Bearer anon");
    }

    #[test]
    fn status_codes_map_to_error_codes() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, None).code,
            ErrorCode::Unauthorized
        );
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, Some("JWT expired".into())).code,
            ErrorCode::Unauthorized
        );
        assert_eq!(
            status_error(StatusCode::CONFLICT, Some("duplicate key".into())).code,
            ErrorCode::Conflict
        );
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, None).code,
            ErrorCode::BackendError
        );
    }

    #[test]
    fn count_comes_from_content_range() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, HeaderValue::from_static("*/42"));
        assert_eq!(parse_count(&headers), Some(42));

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("0-9/7"));
        assert_eq!(parse_count(&headers), Some(7));

        assert_eq!(parse_count(&HeaderMap::new()), None);
    }
}

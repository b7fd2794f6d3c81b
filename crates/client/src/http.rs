//! Request plumbing shared by every endpoint.
//!
//! Each request carries `Accept-Language` and a fresh `x-request-id`;
//! authenticated requests also carry `Authorization: Bearer <token>`.
//! Responses use the `{ success, data, message }` envelope.
//!
//! A 401 on an authenticated request forces exactly one token refresh and
//! one retry. There is no other retry or backoff.

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::PetmartClient;
use crate::error::{ClientError, Result};

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Maximum characters of a response body kept in error messages.
const MAX_BODY_IN_ERROR: usize = 200;

/// Response envelope used by every endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

/// Error bodies are not always full envelopes; take whatever message exists.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Shorten a response body for logs and error messages.
pub(crate) fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_BODY_IN_ERROR).collect()
}

/// Body of an error response; a body that cannot be read is logged and
/// treated as empty.
async fn read_error_body(response: reqwest::Response) -> String {
    response.text().await.unwrap_or_else(|e| {
        debug!(error = %e, "Failed to read error response body");
        String::new()
    })
}

fn error_message(body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| truncate_body(body))
}

/// How a request authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AuthMode {
    /// Must carry a valid bearer token.
    Required,
    /// Carries a token when the user is signed in, anonymous otherwise.
    Optional,
    /// Never carries a token (OTP endpoints).
    None,
}

/// A request to the marketplace API, relative to the base URL.
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
    auth: AuthMode,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            auth: AuthMode::Required,
        }
    }

    pub(crate) fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub(crate) fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub(crate) fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub(crate) fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub(crate) fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    pub(crate) fn query_opt(self, key: &'static str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub(crate) fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub(crate) const fn auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }
}

impl PetmartClient {
    /// Send a request whose envelope must carry `data`.
    pub(crate) async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.fetch_optional(request)
            .await?
            .ok_or(ClientError::MissingData)
    }

    /// Send a request whose envelope may carry `data`.
    pub(crate) async fn fetch_optional<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<Option<T>> {
        let response = self.send(&request).await?;
        decode(request.path(), response).await
    }

    /// Send a request and ignore any returned data.
    pub(crate) async fn execute(&self, request: ApiRequest) -> Result<()> {
        self.fetch_optional::<IgnoredAny>(request).await.map(|_| ())
    }

    async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response> {
        let token = match request.auth {
            AuthMode::Required => Some(self.session().ensure_valid_token().await?),
            AuthMode::Optional => self.optional_token().await,
            AuthMode::None => None,
        };

        let response = self.dispatch(request, token.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(rejected) = token else {
            return Err(ClientError::Unauthorized(
                error_message(&read_error_body(response).await),
            ));
        };

        warn!(path = %request.path, "Access token rejected, refreshing once");
        let fresh = self.session().force_refresh(&rejected).await?;
        let retry = self.dispatch(request, Some(&fresh)).await?;

        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized(
                error_message(&read_error_body(retry).await),
            ));
        }

        Ok(retry)
    }

    /// Token for endpoints that work signed in or anonymous.
    async fn optional_token(&self) -> Option<SecretString> {
        if !self.session().is_authenticated().await {
            return None;
        }

        match self.session().ensure_valid_token().await {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "Continuing without a session");
                None
            }
        }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&SecretString>,
    ) -> Result<reqwest::Response> {
        let mut url = self.endpoint(&request.path)?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }

        let request_id = Uuid::new_v4().to_string();
        let language = self.language().await;

        debug!(
            method = %request.method,
            url = %url,
            request_id = %request_id,
            "Sending API request"
        );

        let mut builder = self
            .http()
            .request(request.method.clone(), url)
            .header(reqwest::header::ACCEPT_LANGUAGE, language.as_header())
            .header(REQUEST_ID_HEADER, request_id);

        if let Some(token) = token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }
}

/// Turn a response into envelope data or a typed error.
async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<Option<T>> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(ClientError::RateLimited(retry_after));
    }

    let body = response.text().await?;

    if status == StatusCode::NOT_FOUND {
        let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
        return Err(ClientError::NotFound(
            parsed.message.unwrap_or_else(|| path.to_string()),
        ));
    }

    if !status.is_success() {
        warn!(
            status = %status,
            body = %truncate_body(&body),
            "API returned non-success status"
        );
        return Err(ClientError::Api {
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
        warn!(
            error = %e,
            body = %truncate_body(&body),
            "Failed to parse API response"
        );
        ClientError::Parse(e)
    })?;

    if !envelope.success {
        return Err(ClientError::Api {
            status: status.as_u16(),
            message: envelope
                .message
                .unwrap_or_else(|| "request failed".to_string()),
        });
    }

    Ok(envelope.data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_with_data() {
        let envelope: Envelope<Vec<u32>> =
            serde_json::from_str(r#"{"success":true,"data":[1,2]}"#).unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.data, Some(vec![1, 2]));
        assert!(envelope.message.is_none());
    }

    #[test]
    fn test_envelope_null_and_missing_data() {
        let envelope: Envelope<u32> =
            serde_json::from_str(r#"{"success":true,"data":null}"#).unwrap();
        assert!(envelope.data.is_none());

        let envelope: Envelope<u32> =
            serde_json::from_str(r#"{"success":false,"message":"nope"}"#).unwrap();
        assert!(!envelope.success);
        assert_eq!(envelope.message.as_deref(), Some("nope"));
    }

    #[test]
    fn test_envelope_for_type_without_default() {
        #[derive(Debug, Deserialize)]
        struct Tokens {
            access: String,
        }

        fn decode_into<T: DeserializeOwned>(body: &str) -> Envelope<T> {
            serde_json::from_str(body).unwrap()
        }

        let envelope: Envelope<Tokens> = decode_into(r#"{"success":true,"data":{"access":"a"}}"#);
        assert_eq!(envelope.data.unwrap().access, "a");

        let envelope: Envelope<Tokens> = decode_into(r#"{"success":false}"#);
        assert!(envelope.data.is_none());
        assert!(envelope.message.is_none());
    }

    #[test]
    fn test_error_message_prefers_message_then_error_then_body() {
        assert_eq!(error_message(r#"{"message":"bad otp"}"#), "bad otp");
        assert_eq!(error_message(r#"{"error":"forbidden"}"#), "forbidden");
        assert_eq!(error_message("<html>gateway</html>"), "<html>gateway</html>");
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        assert_eq!(truncate_body(&long).len(), MAX_BODY_IN_ERROR);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::get("api/products")
            .query("page", 2)
            .query_opt("search", None::<String>)
            .query_opt("category", Some("dogs"))
            .auth(AuthMode::Optional);

        assert_eq!(request.path(), "api/products");
        assert_eq!(request.query.len(), 2);
        assert_eq!(request.auth, AuthMode::Optional);
        assert_eq!(request.method, Method::GET);
    }
}

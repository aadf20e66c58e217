//! Asynchronous client for the session backend's REST surface.
//!
//! Every endpoint answers with the `{ok, data, error}` envelope from
//! [`crate::protocol`]. A non-success status or `ok: false` becomes
//! [`ApiError::Failed`] carrying the server's message when it sent one.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::protocol::{
    AttachResponse, AuthMode, AuthModeRequest, AuthModeResponse, CreateSessionRequest,
    CreatedSession, Empty, Envelope, SessionList, SessionSummary, TypeList,
};
use crate::registry::{SessionTypeProfile, BUILTIN_TYPE_ID};

/// Backend address used when neither config nor CLI set one
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000/api";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Failed { status: StatusCode, message: String },
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("response had no data")]
    MissingData,
}

impl ApiError {
    /// Whether the backend reported the target as already gone
    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::Failed { status, message } => {
                *status == StatusCode::NOT_FOUND || message.to_lowercase().contains("not found")
            }
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        // Url::join treats the last segment as a file unless it ends in '/'
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /session-types`
    pub async fn list_types(&self) -> Result<Vec<SessionTypeProfile>, ApiError> {
        let list: TypeList = self.request(Method::GET, &["session-types"], None::<&Empty>).await?;
        Ok(list.types)
    }

    /// `GET /sessions`
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>, ApiError> {
        let list: SessionList = self.request(Method::GET, &["sessions"], None::<&Empty>).await?;
        Ok(list.sessions)
    }

    /// `POST /sessions`. The built-in profile is requested with an empty body.
    pub async fn create_session(&self, type_id: &str) -> Result<CreatedSession, ApiError> {
        let body = CreateSessionRequest {
            type_id: (type_id != BUILTIN_TYPE_ID).then(|| type_id.to_string()),
        };
        self.request(Method::POST, &["sessions"], Some(&body)).await
    }

    /// `DELETE /sessions/{id}`
    pub async fn delete_session(&self, session_id: &str) -> Result<(), ApiError> {
        self.request_unit(Method::DELETE, &["sessions", session_id], None::<&Empty>)
            .await
    }

    /// `POST /sessions/{id}/attach`, returning the connection address
    pub async fn attach(&self, session_id: &str) -> Result<String, ApiError> {
        let response: AttachResponse = self
            .request(Method::POST, &["sessions", session_id, "attach"], Some(&Empty {}))
            .await?;
        Ok(response.connection_address)
    }

    /// `POST /sessions/{id}/auth-mode`
    pub async fn set_auth_mode(&self, session_id: &str, mode: AuthMode) -> Result<AuthMode, ApiError> {
        let response: AuthModeResponse = self
            .request(
                Method::POST,
                &["sessions", session_id, "auth-mode"],
                Some(&AuthModeRequest { mode }),
            )
            .await?;
        Ok(response.auth_mode)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<B: Serialize>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<Option<Envelope<serde_json::Value>>, ApiError> {
        let url = self.endpoint(segments);
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        read_envelope(status, &text)
    }

    async fn request<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let envelope = self.send(method, segments, body).await?;
        let data = envelope.and_then(|e| e.data).ok_or(ApiError::MissingData)?;
        serde_json::from_value(data).map_err(|e| ApiError::Failed {
            status: StatusCode::OK,
            message: format!("Malformed response: {}", e),
        })
    }

    async fn request_unit<B: Serialize>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<(), ApiError> {
        self.send(method, segments, body).await.map(|_| ())
    }
}

/// Classify a response by status and body.
///
/// A success status with an empty or non-envelope body (a bare `204` on
/// delete, say) is `Ok(None)`.
fn read_envelope(status: StatusCode, text: &str) -> Result<Option<Envelope<serde_json::Value>>, ApiError> {
    let envelope: Option<Envelope<serde_json::Value>> = serde_json::from_str(text).ok();

    match envelope {
        Some(envelope) if status.is_success() && envelope.ok != Some(false) => Ok(Some(envelope)),
        None if status.is_success() => Ok(None),
        Some(envelope) => Err(ApiError::Failed {
            status,
            message: envelope
                .error
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Request failed ({})", status.as_u16())),
        }),
        None => Err(ApiError::Failed {
            status,
            message: format!("Request failed ({})", status.as_u16()),
        }),
    }
}

/// Turn an attach address into a websocket URL.
///
/// Absolute `ws`/`wss` URLs pass through; anything else is resolved against
/// the server URL with the scheme mapped from http(s).
pub fn resolve_connection_url(base: &Url, address: &str) -> Result<Url, ApiError> {
    if let Ok(url) = Url::parse(address) {
        if matches!(url.scheme(), "ws" | "wss") {
            return Ok(url);
        }
    }

    let mut url = base.join(address)?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    // http(s) -> ws(s) is always an allowed scheme change for special URLs
    let _ = url.set_scheme(scheme);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_building() {
        let client = ApiClient::new("http://localhost:8000/api").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/api/");
        assert_eq!(client.endpoint(&["sessions"]).as_str(), "http://localhost:8000/api/sessions");
        assert_eq!(
            client.endpoint(&["sessions", "a b/c", "attach"]).as_str(),
            "http://localhost:8000/api/sessions/a%20b%2Fc/attach"
        );
    }

    #[test]
    fn test_not_found_classifier() {
        let err = ApiError::Failed {
            status: StatusCode::NOT_FOUND,
            message: "gone".into(),
        };
        assert!(err.is_not_found());
        let err = ApiError::Failed {
            status: StatusCode::BAD_REQUEST,
            message: "Session Not Found".into(),
        };
        assert!(err.is_not_found());
        let err = ApiError::Failed {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "boom".into(),
        };
        assert!(!err.is_not_found());
        assert!(!ApiError::MissingData.is_not_found());
    }

    #[test]
    fn test_resolve_connection_url() {
        let base = Url::parse("http://localhost:8000/api/").unwrap();
        let url = resolve_connection_url(&base, "/api/sessions/abc/ws").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8000/api/sessions/abc/ws");

        let secure = Url::parse("https://example.com/api/").unwrap();
        let url = resolve_connection_url(&secure, "/ws/abc").unwrap();
        assert_eq!(url.as_str(), "wss://example.com/ws/abc");

        let url = resolve_connection_url(&base, "wss://other.host/stream").unwrap();
        assert_eq!(url.as_str(), "wss://other.host/stream");
    }

    #[test]
    fn test_read_envelope() {
        let ok = read_envelope(StatusCode::OK, r#"{"ok":true,"data":{"authMode":"user"}}"#).unwrap();
        assert!(ok.and_then(|e| e.data).is_some());

        assert!(read_envelope(StatusCode::NO_CONTENT, "").unwrap().is_none());
        assert!(read_envelope(StatusCode::OK, "deleted").unwrap().is_none());

        let err = read_envelope(StatusCode::OK, r#"{"ok":false,"error":{"message":"nope"}}"#).unwrap_err();
        assert_eq!(err.to_string(), "nope");

        let err = read_envelope(StatusCode::NOT_FOUND, "").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Request failed (404)");
    }
}

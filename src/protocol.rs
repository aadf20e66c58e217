//! Wire formats shared with the backend.
//!
//! Duplex connection frames are JSON objects tagged by `type`. Inbound
//! frames decode into the closed [`ServerFrame`] union; anything with an
//! unrecognised tag becomes [`ServerFrame::Unknown`] and anything that is
//! not valid JSON is rejected by [`ServerFrame::parse`]. Both are dropped
//! by the session controller.
//!
//! REST responses arrive wrapped in an envelope:
//!
//! ```text
//! { "ok": true,  "data": { ... } }
//! { "ok": false, "error": { "message": "Session not found" } }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::registry::SessionTypeProfile;

/// Opaque, server-assigned session identifier
pub type SessionId = String;

/// Credential mode a session runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Machine-to-machine (service principal) credentials
    #[default]
    M2m,
    /// The signed-in user's own credentials
    User,
}

impl AuthMode {
    /// Normalize a wire value. `user` and `user-token` mean user mode,
    /// anything else falls back to m2m.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "user" | "user-token" => AuthMode::User,
            _ => AuthMode::M2m,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::M2m => "m2m",
            AuthMode::User => "user",
        }
    }

    /// The other mode
    pub fn toggled(self) -> Self {
        match self {
            AuthMode::M2m => AuthMode::User,
            AuthMode::User => AuthMode::M2m,
        }
    }
}

impl Serialize for AuthMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuthMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(AuthMode::from_wire(&value))
    }
}

/// Frames received over a session's duplex connection
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Backend process is attached and ready for input
    Ready,
    /// Credential mode changed on the backend
    AuthMode {
        #[serde(default)]
        mode: AuthMode,
    },
    /// Process output
    Output {
        #[serde(default)]
        data: String,
    },
    /// Process exited
    Exit {
        #[serde(default, alias = "exitCode")]
        code: Option<i64>,
    },
    /// Backend reported a failure
    Error {
        #[serde(default)]
        message: String,
    },
    /// Any frame kind this client does not know
    #[serde(other)]
    Unknown,
}

impl ServerFrame {
    /// Decode a text frame. Malformed payloads yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Frames sent over a session's duplex connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Keyboard or paste input
    Input { data: String },
    /// Grid size of the session's surface
    Resize { cols: u16, rows: u16 },
}

impl ClientFrame {
    pub fn to_json(&self) -> String {
        // Serializing a closed enum of strings and integers cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// REST response envelope
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub ok: Option<bool>,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

/// A session as listed or created by the backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    #[serde(default)]
    pub auth_mode: Option<AuthMode>,
    #[serde(default)]
    pub type_id: Option<String>,
}

/// `POST /sessions` request body
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
}

/// `POST /sessions` response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    pub session: SessionSummary,
    #[serde(default)]
    pub auth_mode: Option<AuthMode>,
    #[serde(default)]
    pub type_id: Option<String>,
}

impl CreatedSession {
    /// Credential mode, preferring the top-level field
    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode.or(self.session.auth_mode).unwrap_or_default()
    }

    /// Profile id, preferring the top-level field
    pub fn type_id(&self) -> Option<&str> {
        self.type_id.as_deref().or(self.session.type_id.as_deref())
    }
}

/// `GET /sessions` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionList {
    #[serde(default)]
    pub sessions: Vec<SessionSummary>,
}

/// `POST /sessions/{id}/attach` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachResponse {
    #[serde(alias = "websocketPath")]
    pub connection_address: String,
}

/// `POST /sessions/{id}/auth-mode` request body
#[derive(Debug, Clone, Serialize)]
pub struct AuthModeRequest {
    pub mode: AuthMode,
}

/// `POST /sessions/{id}/auth-mode` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthModeResponse {
    #[serde(default)]
    pub auth_mode: AuthMode,
}

/// `GET /session-types` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeList {
    #[serde(default)]
    pub types: Vec<SessionTypeProfile>,
}

/// Empty JSON object, used for bodies and data-less responses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_frames() {
        assert_eq!(ServerFrame::parse(r#"{"type":"ready"}"#), Some(ServerFrame::Ready));
        assert_eq!(
            ServerFrame::parse(r#"{"type":"output","data":"hi\r\n"}"#),
            Some(ServerFrame::Output { data: "hi\r\n".to_string() })
        );
        assert_eq!(
            ServerFrame::parse(r#"{"type":"auth_mode","mode":"user-token"}"#),
            Some(ServerFrame::AuthMode { mode: AuthMode::User })
        );
        assert_eq!(
            ServerFrame::parse(r#"{"type":"exit","exitCode":3}"#),
            Some(ServerFrame::Exit { code: Some(3) })
        );
        assert_eq!(
            ServerFrame::parse(r#"{"type":"exit","code":0}"#),
            Some(ServerFrame::Exit { code: Some(0) })
        );
        assert_eq!(
            ServerFrame::parse(r#"{"type":"error","message":"boom"}"#),
            Some(ServerFrame::Error { message: "boom".to_string() })
        );
    }

    #[test]
    fn test_unknown_and_malformed_frames() {
        assert_eq!(ServerFrame::parse(r#"{"type":"heartbeat","n":1}"#), Some(ServerFrame::Unknown));
        assert_eq!(ServerFrame::parse("not json"), None);
        assert_eq!(ServerFrame::parse(r#"{"data":"no tag"}"#), None);
    }

    #[test]
    fn test_client_frames_serialize_tagged() {
        let resize = ClientFrame::Resize { cols: 80, rows: 24 };
        assert_eq!(resize.to_json(), r#"{"type":"resize","cols":80,"rows":24}"#);
        let input = ClientFrame::Input { data: "ls\r".to_string() };
        assert_eq!(input.to_json(), r#"{"type":"input","data":"ls\r"}"#);
    }

    #[test]
    fn test_auth_mode_normalization() {
        assert_eq!(AuthMode::from_wire("user"), AuthMode::User);
        assert_eq!(AuthMode::from_wire("user-token"), AuthMode::User);
        assert_eq!(AuthMode::from_wire("m2m"), AuthMode::M2m);
        assert_eq!(AuthMode::from_wire("anything"), AuthMode::M2m);
        assert_eq!(AuthMode::M2m.toggled(), AuthMode::User);
        assert_eq!(serde_json::to_string(&AuthModeRequest { mode: AuthMode::User }).unwrap(), r#"{"mode":"user"}"#);
    }

    #[test]
    fn test_rest_payloads() {
        let body = serde_json::to_string(&CreateSessionRequest::default()).unwrap();
        assert_eq!(body, "{}");
        let body = serde_json::to_string(&CreateSessionRequest { type_id: Some("python".into()) }).unwrap();
        assert_eq!(body, r#"{"typeId":"python"}"#);

        let created: Envelope<CreatedSession> = serde_json::from_str(
            r#"{"ok":true,"data":{"session":{"sessionId":"abc123","authMode":"m2m"},"authMode":"user","typeId":"python"}}"#,
        )
        .unwrap();
        let created = created.data.unwrap();
        assert_eq!(created.session.session_id, "abc123");
        assert_eq!(created.auth_mode(), AuthMode::User);
        assert_eq!(created.type_id(), Some("python"));

        let attach: AttachResponse = serde_json::from_str(r#"{"websocketPath":"/api/sessions/abc/ws"}"#).unwrap();
        assert_eq!(attach.connection_address, "/api/sessions/abc/ws");
        let attach: AttachResponse = serde_json::from_str(r#"{"connectionAddress":"ws://h/x"}"#).unwrap();
        assert_eq!(attach.connection_address, "ws://h/x");

        let failed: Envelope<Empty> =
            serde_json::from_str(r#"{"ok":false,"error":{"message":"Session not found"}}"#).unwrap();
        assert_eq!(failed.ok, Some(false));
        assert!(failed.data.is_none());
        assert_eq!(failed.error.unwrap().message, "Session not found");

        // Envelopes over payloads without a Default impl still parse bare
        let bare: Envelope<CreatedSession> = serde_json::from_str("{}").unwrap();
        assert!(bare.ok.is_none() && bare.data.is_none() && bare.error.is_none());
    }
}

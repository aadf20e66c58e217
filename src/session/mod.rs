//! Sessions and the controller that owns them.
//!
//! A [`Session`] pairs a backend session id with its local surface and the
//! link to its duplex connection. All sessions live in the
//! [`controller::Controller`], which is the only place they are mutated.

pub mod controller;

use crate::core::Surface;
use crate::protocol::{AuthMode, SessionId};
use crate::registry::BUILTIN_TYPE_ID;

/// Id of the placeholder session that hosts the blocking picker
pub const LAUNCHER_SESSION_ID: &str = "__launcher__";

const LAUNCHER_TITLE: &str = "New session";
const SHORT_ID_LEN: usize = 8;

/// Connection state shown in the tab bar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Connecting,
    Connected,
    /// Connection dropped; not retried
    Disconnected,
    /// Remote process exited
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Closed => "closed",
        }
    }
}

/// Identifies one connection attempt, so events from a replaced
/// connection can be told apart from the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub u64);

/// The session's current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLink {
    pub id: LinkId,
    /// Socket handshake completed
    pub open: bool,
}

pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub auth_mode: AuthMode,
    pub type_id: String,
    /// Title set by the remote (OSC), empty if none
    pub dynamic_title: String,
    pub surface: Surface,
    pub link: Option<TransportLink>,
    pub launcher: bool,
}

impl Session {
    pub fn new(id: SessionId, auth_mode: AuthMode, type_id: Option<&str>, surface: Surface) -> Self {
        Self {
            id,
            status: SessionStatus::Connecting,
            auth_mode,
            type_id: type_id
                .filter(|t| !t.is_empty())
                .unwrap_or(BUILTIN_TYPE_ID)
                .to_string(),
            dynamic_title: String::new(),
            surface,
            link: None,
            launcher: false,
        }
    }

    /// Placeholder tab with nothing behind it
    pub fn launcher(surface: Surface) -> Self {
        Self {
            status: SessionStatus::Connected,
            dynamic_title: LAUNCHER_TITLE.to_string(),
            launcher: true,
            ..Self::new(LAUNCHER_SESSION_ID.to_string(), AuthMode::M2m, None, surface)
        }
    }

    /// Label for the tab: the remote title, else a short id
    pub fn display_title(&self) -> String {
        if !self.dynamic_title.is_empty() {
            return self.dynamic_title.clone();
        }
        self.id.chars().take(SHORT_ID_LEN).collect()
    }

    /// Whether input frames can be sent right now
    pub fn can_send(&self) -> bool {
        self.link.map(|l| l.open).unwrap_or(false)
    }

    /// Whether `link` is the session's current connection
    pub fn is_current_link(&self, link: LinkId) -> bool {
        self.link.map(|l| l.id == link).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_title_fallback() {
        let mut session = Session::new("0123456789abcdef".into(), AuthMode::User, None, Surface::new(10, 4, 0));
        assert_eq!(session.display_title(), "01234567");
        assert_eq!(session.type_id, BUILTIN_TYPE_ID);
        assert_eq!(session.status, SessionStatus::Connecting);
        session.dynamic_title = "vim".into();
        assert_eq!(session.display_title(), "vim");
    }

    #[test]
    fn test_launcher_defaults() {
        let launcher = Session::launcher(Surface::new(10, 4, 0));
        assert!(launcher.launcher);
        assert_eq!(launcher.id, LAUNCHER_SESSION_ID);
        assert_eq!(launcher.status, SessionStatus::Connected);
        assert_eq!(launcher.display_title(), "New session");
        assert!(!launcher.can_send());
    }

    #[test]
    fn test_link_tracking() {
        let mut session = Session::new("s".into(), AuthMode::M2m, Some("python"), Surface::new(10, 4, 0));
        assert_eq!(session.type_id, "python");
        assert!(!session.is_current_link(LinkId(1)));
        session.link = Some(TransportLink { id: LinkId(1), open: false });
        assert!(session.is_current_link(LinkId(1)));
        assert!(!session.is_current_link(LinkId(2)));
        assert!(!session.can_send());
        session.link = Some(TransportLink { id: LinkId(1), open: true });
        assert!(session.can_send());
    }
}

//! Session controller - owns every session, the active pointer and the
//! single picker overlay.
//!
//! The controller never performs I/O. Each [`Event`] is handled
//! synchronously by [`Controller::dispatch`], which mutates state and queues
//! [`Effect`]s. The runtime drains the effects, performs them, and feeds the
//! completions back in as events. Completions that name a session which no
//! longer exists are ignored, as are transport events from a connection
//! that has since been replaced.
//!
//! # Startup
//!
//! ```text
//! start()         → ListTypes
//! TypesListed     → ListSessions
//! SessionsListed  → mount each session (Attach), or the launcher + picker
//! Attached        → Connect
//! Transport       → Opened / Frame / Closed / Failed
//! ```

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::{LinkId, Session, SessionStatus, TransportLink, LAUNCHER_SESSION_ID};
use crate::api::ApiError;
use crate::core::surface::{ENTER_OVERLAY, LEAVE_OVERLAY};
use crate::core::Surface;
use crate::overlay::layout::{self, Palette};
use crate::overlay::{Overlay, OverlayAction, OverlayOptions, Readiness};
use crate::protocol::{AuthMode, ClientFrame, CreatedSession, ServerFrame, SessionId, SessionSummary};
use crate::registry::{Catalog, SessionTypeProfile, TerminalTypeRegistry, BUILTIN_TYPE_ID};
use crate::transport::TransportEvent;
use crate::ui::keymapper::{InputModes, KeyMapper};

/// Everything the controller reacts to
#[derive(Debug)]
pub enum Event {
    Key(KeyEvent),
    Paste(String),
    /// Content area (between tab bar and status bar) changed size
    Resize { cols: u16, rows: u16 },
    /// Display refresh tick, requested through [`Effect::RequestFrame`]
    Frame,
    /// Host glyph metrics settled (or the wait timed out)
    GlyphsReady,
    TypesListed(Result<Vec<SessionTypeProfile>, ApiError>),
    SessionsListed(Result<Vec<SessionSummary>, ApiError>),
    SessionCreated {
        type_id: String,
        result: Result<CreatedSession, ApiError>,
    },
    Attached {
        session: SessionId,
        result: Result<String, ApiError>,
    },
    SessionDeleted {
        session: SessionId,
        close_after: bool,
        result: Result<(), ApiError>,
    },
    AuthModeChanged {
        session: SessionId,
        result: Result<AuthMode, ApiError>,
    },
    Transport {
        session: SessionId,
        link: LinkId,
        event: TransportEvent,
    },
    /// Click on a tab; `close` when the click hit its close mark
    TabClicked { index: usize, close: bool },
    OpenPicker,
    Activate(SessionId),
    Kill(SessionId),
    ToggleAuth(SessionId),
    NextTab,
    PrevTab,
    GotoTab(usize),
    Quit,
}

/// Work the runtime performs on the controller's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ListTypes,
    ListSessions,
    CreateSession { type_id: String },
    Attach { session: SessionId },
    Connect { session: SessionId, link: LinkId, address: String },
    Send { session: SessionId, frame: ClientFrame },
    Disconnect { session: SessionId },
    DeleteSession { session: SessionId, close_after: bool },
    SetAuthMode { session: SessionId, mode: AuthMode },
    /// Resolve [`Event::GlyphsReady`] once host metrics are stable
    AwaitGlyphs,
    /// Deliver one [`Event::Frame`] on the next refresh
    RequestFrame,
    /// Read the host clipboard and deliver it as [`Event::Paste`]
    ReadClipboard,
}

/// Controller settings taken from the config and CLI
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub app_title: String,
    pub scrollback: usize,
    /// Fit passes between glyph readiness and the first paint
    pub warmup_passes: u8,
    pub palette: Palette,
    /// Launch this profile instead of the launcher when nothing is running
    pub initial_type: Option<String>,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            app_title: "Remote Terminal".to_string(),
            scrollback: 2000,
            warmup_passes: 2,
            palette: Palette::default(),
            initial_type: None,
        }
    }
}

pub struct Controller {
    sessions: HashMap<SessionId, Session>,
    /// Tab bar order
    tab_order: Vec<SessionId>,
    active: Option<SessionId>,
    /// At most one picker exists; it names its owner
    overlay: Option<Overlay>,
    catalog: Catalog,
    /// Size every surface is fitted to
    viewport: (u16, u16),
    /// Sessions waiting for a fit pass on the next frame
    pending_fits: Vec<SessionId>,
    frame_requested: bool,
    glyphs_ready: bool,
    next_link: u64,
    effects: Vec<Effect>,
    settings: ControllerSettings,
    /// Prefix key (Ctrl+B) pressed, waiting for the command key
    pub prefix_mode: bool,
    bootstrapped: bool,
    dirty: bool,
    quit: bool,
}

impl Controller {
    pub fn new(settings: ControllerSettings, viewport: (u16, u16)) -> Self {
        Self {
            sessions: HashMap::new(),
            tab_order: Vec::new(),
            active: None,
            overlay: None,
            catalog: Catalog::new(),
            viewport,
            pending_fits: Vec::new(),
            frame_requested: false,
            glyphs_ready: false,
            next_link: 1,
            effects: Vec::new(),
            settings,
            prefix_mode: false,
            bootstrapped: false,
            dirty: true,
            quit: false,
        }
    }

    /// Kick off the startup sequence
    pub fn start(&mut self) {
        info!("Loading session types");
        self.effects.push(Effect::ListTypes);
    }

    /// Take the queued effects
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Whether the host view needs a repaint; clears the flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    // ---- Queries used by the renderer ----

    /// Sessions in tab order
    pub fn tabs(&self) -> impl Iterator<Item = &Session> {
        self.tab_order.iter().filter_map(|id| self.sessions.get(id))
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.as_ref().and_then(|id| self.sessions.get(id))
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // ---- Dispatch ----

    pub fn dispatch(&mut self, event: Event) {
        match event {
            Event::Key(key) => self.on_key(key),
            Event::Paste(text) => self.on_paste(&text),
            Event::Resize { cols, rows } => {
                self.viewport = (cols, rows);
                if let Some(active) = self.active.clone() {
                    self.request_fit(&active);
                }
                self.dirty = true;
            }
            Event::Frame => self.on_frame(),
            Event::GlyphsReady => self.on_glyphs_ready(),
            Event::TypesListed(result) => self.on_types_listed(result),
            Event::SessionsListed(result) => self.on_sessions_listed(result),
            Event::SessionCreated { type_id, result } => self.on_session_created(type_id, result),
            Event::Attached { session, result } => self.on_attached(session, result),
            Event::SessionDeleted { session, close_after, result } => {
                self.on_session_deleted(session, close_after, result)
            }
            Event::AuthModeChanged { session, result } => self.on_auth_mode_changed(session, result),
            Event::Transport { session, link, event } => self.on_transport(session, link, event),
            Event::TabClicked { index, close } => {
                if let Some(id) = self.tab_order.get(index).cloned() {
                    if close {
                        self.kill(&id);
                    } else {
                        self.activate(&id);
                    }
                }
            }
            Event::OpenPicker => {
                let active = self.active.clone();
                self.open_picker(active, OverlayOptions::default());
            }
            Event::Activate(id) => self.activate(&id),
            Event::Kill(id) => self.kill(&id),
            Event::ToggleAuth(id) => self.toggle_auth(&id),
            Event::NextTab => self.cycle_tab(1),
            Event::PrevTab => self.cycle_tab(-1),
            Event::GotoTab(index) => {
                if let Some(id) = self.tab_order.get(index).cloned() {
                    self.activate(&id);
                }
            }
            Event::Quit => self.quit = true,
        }
    }

    // ---- Session registry ----

    /// Add a session tab. Already-known ids are only (optionally) activated.
    fn mount_session(&mut self, id: SessionId, auth_mode: AuthMode, type_id: Option<&str>, activate: bool) {
        if self.sessions.contains_key(&id) {
            if activate {
                self.activate(&id);
            }
            return;
        }

        let (cols, rows) = self.viewport;
        let surface = Surface::new(cols, rows, self.settings.scrollback);
        let session = Session::new(id.clone(), auth_mode, type_id, surface);
        info!("Mounted session {} (type {}, auth {})", id, session.type_id, auth_mode.as_str());

        self.sessions.insert(id.clone(), session);
        self.tab_order.push(id.clone());
        self.effects.push(Effect::Attach { session: id.clone() });

        if activate || self.active.is_none() {
            self.activate(&id);
        }
        self.dirty = true;
    }

    fn mount_launcher(&mut self) {
        let id = LAUNCHER_SESSION_ID.to_string();
        if !self.sessions.contains_key(&id) {
            let (cols, rows) = self.viewport;
            let launcher = Session::launcher(Surface::new(cols, rows, self.settings.scrollback));
            self.sessions.insert(id.clone(), launcher);
            self.tab_order.push(id.clone());
            debug!("Mounted launcher session");
        }
        self.activate(&id);
    }

    /// Mount the launcher and its blocking picker
    fn bootstrap_launcher(&mut self, notice: Option<String>) {
        self.mount_launcher();
        self.open_picker(
            Some(LAUNCHER_SESSION_ID.to_string()),
            OverlayOptions {
                replace_on_select: Some(true),
                blocking: None,
            },
        );
        if let Some(overlay) = self.overlay.as_mut() {
            if notice.is_some() {
                overlay.notice = notice;
            }
        }
        self.repaint_overlay();
    }

    /// Make `id` the active session. Idempotent.
    pub fn activate(&mut self, id: &str) {
        if !self.sessions.contains_key(id) {
            return;
        }
        if self.overlay.as_ref().map(|o| o.owner != id).unwrap_or(false) {
            self.close_overlay(true);
        }
        self.active = Some(id.to_string());
        self.request_fit(id);
        self.dirty = true;
    }

    fn cycle_tab(&mut self, delta: isize) {
        if self.tab_order.is_empty() {
            return;
        }
        let len = self.tab_order.len() as isize;
        let current = self
            .active
            .as_ref()
            .and_then(|a| self.tab_order.iter().position(|id| id == a))
            .unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        let id = self.tab_order[next].clone();
        self.activate(&id);
    }

    /// Tear down a session's overlay, connection and tab.
    ///
    /// When the registry ends up empty the launcher is mounted, unless
    /// `suppress_auto_create` is set.
    pub fn close_session(&mut self, id: &str, suppress_auto_create: bool) {
        if !self.sessions.contains_key(id) {
            return;
        }
        if self.overlay_owner() == Some(id) {
            self.close_overlay(false);
        }

        if let Some(session) = self.sessions.remove(id) {
            if session.link.is_some() {
                self.effects.push(Effect::Disconnect { session: id.to_string() });
            }
            info!("Closed session {}", id);
        }
        self.tab_order.retain(|s| s != id);
        self.pending_fits.retain(|s| s != id);

        if self.active.as_deref() == Some(id) {
            self.active = None;
            if let Some(first) = self.tab_order.first().cloned() {
                self.activate(&first);
            }
        }

        if self.sessions.is_empty() && !suppress_auto_create {
            self.bootstrap_launcher(None);
        }
        self.dirty = true;
    }

    /// Delete on the backend, then close locally
    pub fn kill(&mut self, id: &str) {
        match self.sessions.get(id) {
            Some(session) if !session.launcher => {
                info!("Killing session {}", id);
                self.effects.push(Effect::DeleteSession {
                    session: id.to_string(),
                    close_after: true,
                });
            }
            _ => {}
        }
    }

    pub fn toggle_auth(&mut self, id: &str) {
        let Some(session) = self.sessions.get(id) else {
            return;
        };
        if session.launcher {
            return;
        }
        self.effects.push(Effect::SetAuthMode {
            session: id.to_string(),
            mode: session.auth_mode.toggled(),
        });
    }

    /// Request a backend session of `type_id`, falling back to the default
    /// profile for ids the catalog does not know
    fn create_session(&mut self, type_id: &str) {
        let type_id = if type_id == BUILTIN_TYPE_ID || self.catalog.resolve_type(type_id).is_some() {
            type_id.to_string()
        } else {
            let fallback = self.catalog.get_default_type().id;
            warn!("Unknown session type {:?}, using {:?}", type_id, fallback);
            fallback
        };
        info!("Creating session of type {}", type_id);
        self.effects.push(Effect::CreateSession { type_id });
    }

    // ---- Picker overlay ----

    fn overlay_owner(&self) -> Option<&str> {
        self.overlay.as_ref().map(|o| o.owner.as_str())
    }

    fn picker_on_active(&self) -> bool {
        self.overlay_owner().is_some() && self.overlay_owner() == self.active.as_deref()
    }

    /// Open the picker on `target`, or bootstrap the launcher if there is
    /// no such session. A non-blocking picker already on the target is
    /// toggled closed.
    pub fn open_picker(&mut self, target: Option<SessionId>, options: OverlayOptions) {
        let Some(id) = target.filter(|id| self.sessions.contains_key(id)) else {
            self.bootstrap_launcher(None);
            return;
        };

        if let Some(overlay) = &self.overlay {
            if overlay.owner == id {
                if !overlay.blocking {
                    self.close_overlay(true);
                }
                return;
            }
            self.close_overlay(true);
        }

        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        session.surface.write(ENTER_OVERLAY);
        let mut overlay = Overlay::open(id.clone(), session.launcher, self.catalog.default_index(), options);
        overlay.clamp_selection(self.catalog.len());
        debug!(
            "Opened picker on {} (replace={}, blocking={})",
            id, overlay.replace_on_select, overlay.blocking
        );

        if self.glyphs_ready {
            overlay.readiness = Readiness::WarmUp {
                remaining: self.settings.warmup_passes,
            };
            self.overlay = Some(overlay);
            self.request_frame();
        } else {
            self.overlay = Some(overlay);
            self.effects.push(Effect::AwaitGlyphs);
        }
        self.dirty = true;
    }

    /// Close the picker, replaying held output unless `flush` is false
    pub fn close_overlay(&mut self, flush: bool) {
        let Some(mut overlay) = self.overlay.take() else {
            return;
        };
        let buffered = overlay.take_buffered();
        if let Some(session) = self.sessions.get_mut(&overlay.owner) {
            session.surface.write(LEAVE_OVERLAY);
            if flush && !buffered.is_empty() {
                session.surface.write(&buffered);
                if let Some(title) = session.surface.take_title_change() {
                    session.dynamic_title = title;
                }
            }
        }
        debug!("Closed picker on {} (flush={})", overlay.owner, flush);
        self.dirty = true;
    }

    /// Paint the picker into its owner's surface, once it is ready
    fn repaint_overlay(&mut self) {
        let Some(overlay) = &self.overlay else {
            return;
        };
        if !overlay.initialized() {
            return;
        }
        let Some(session) = self.sessions.get_mut(&overlay.owner) else {
            return;
        };
        let (cols, rows) = session.surface.size();
        let panel = layout::compose(overlay, self.catalog.list_types(), cols, rows, &self.settings.app_title);
        session.surface.write(&panel.paint(&self.settings.palette));
        self.dirty = true;
    }

    fn on_glyphs_ready(&mut self) {
        self.glyphs_ready = true;
        if let Some(overlay) = self.overlay.as_mut() {
            if overlay.readiness == Readiness::AwaitingGlyphs {
                overlay.readiness = Readiness::WarmUp {
                    remaining: self.settings.warmup_passes,
                };
                self.request_frame();
            }
        }
    }

    /// Launch the profile at `index` from the picker
    fn commit_selection(&mut self, index: usize) {
        let Some(overlay) = &self.overlay else {
            return;
        };
        let Some(profile) = self.catalog.get(index) else {
            return;
        };
        let selected = profile.id.clone();
        let owner = overlay.owner.clone();
        let replace = overlay.replace_on_select;
        let (current_type, launcher) = match self.sessions.get(&owner) {
            Some(s) => (s.type_id.clone(), s.launcher),
            None => (String::new(), false),
        };

        if !replace {
            self.close_overlay(true);
            self.create_session(&selected);
            return;
        }

        if !launcher && selected == current_type {
            self.close_overlay(true);
            return;
        }

        self.close_overlay(false);
        self.close_session(&owner, true);
        if !launcher {
            self.effects.push(Effect::DeleteSession {
                session: owner,
                close_after: false,
            });
        }
        self.create_session(&selected);
    }

    // ---- Frames and fitting ----

    fn request_frame(&mut self) {
        if !self.frame_requested {
            self.frame_requested = true;
            self.effects.push(Effect::RequestFrame);
        }
    }

    fn request_fit(&mut self, id: &str) {
        if !self.pending_fits.iter().any(|s| s == id) {
            self.pending_fits.push(id.to_string());
        }
        self.request_frame();
    }

    /// Fit a surface to the viewport and tell the remote its size
    fn fit_session(&mut self, id: &str) {
        let (cols, rows) = self.viewport;
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let changed = session.surface.fit(cols, rows);
        if session.can_send() {
            let (cols, rows) = session.surface.size();
            self.effects.push(Effect::Send {
                session: id.to_string(),
                frame: ClientFrame::Resize { cols, rows },
            });
        }
        if changed && self.overlay_owner() == Some(id) {
            self.repaint_overlay();
        }
        self.dirty = true;
    }

    fn on_frame(&mut self) {
        self.frame_requested = false;

        for id in std::mem::take(&mut self.pending_fits) {
            self.fit_session(&id);
        }

        let Some(overlay) = &self.overlay else {
            return;
        };
        let Readiness::WarmUp { remaining } = overlay.readiness else {
            return;
        };
        let owner = overlay.owner.clone();
        self.fit_session(&owner);

        if let Some(overlay) = self.overlay.as_mut() {
            if remaining > 0 {
                overlay.readiness = Readiness::WarmUp { remaining: remaining - 1 };
                self.request_frame();
            } else {
                overlay.readiness = Readiness::Ready;
                self.repaint_overlay();
            }
        }
    }

    // ---- Request completions ----

    fn on_types_listed(&mut self, result: Result<Vec<SessionTypeProfile>, ApiError>) {
        match result {
            Ok(types) => {
                self.catalog.replace(types);
                let count = self.catalog.len();
                if let Some(overlay) = self.overlay.as_mut() {
                    overlay.clamp_selection(count);
                }
                self.repaint_overlay();
            }
            Err(e) => warn!("Loading session types failed: {}", e),
        }

        if !self.bootstrapped {
            self.bootstrapped = true;
            self.effects.push(Effect::ListSessions);
        }
    }

    fn on_sessions_listed(&mut self, result: Result<Vec<SessionSummary>, ApiError>) {
        let listed = match result {
            Ok(listed) => listed,
            Err(e) => {
                warn!("Loading sessions failed: {}", e);
                Vec::new()
            }
        };
        info!("Backend reports {} existing sessions", listed.len());

        for summary in listed {
            self.mount_session(
                summary.session_id,
                summary.auth_mode.unwrap_or_default(),
                summary.type_id.as_deref(),
                false,
            );
        }

        if let Some(first) = self.tab_order.first().cloned() {
            self.activate(&first);
            return;
        }

        match self.settings.initial_type.clone() {
            Some(type_id) => self.create_session(&type_id),
            None => self.bootstrap_launcher(None),
        }
    }

    fn on_session_created(&mut self, requested: String, result: Result<CreatedSession, ApiError>) {
        match result {
            Ok(created) => {
                let type_id = created.type_id().unwrap_or(requested.as_str()).to_string();
                self.mount_session(created.session.session_id.clone(), created.auth_mode(), Some(&type_id), true);
            }
            Err(e) => {
                warn!("Create session failed: {}", e);
                if self.sessions.is_empty() {
                    self.bootstrap_launcher(Some(format!("Could not start session: {}", e)));
                } else if let Some(active) = self.active.clone() {
                    self.emit_line(&active, &format!("[error] Could not start session: {}", e));
                }
            }
        }
    }

    fn on_attached(&mut self, id: SessionId, result: Result<String, ApiError>) {
        if !self.sessions.contains_key(&id) {
            debug!("Attach completed for closed session {}", id);
            return;
        }
        match result {
            Ok(address) => {
                let link = LinkId(self.next_link);
                self.next_link += 1;
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.link = Some(TransportLink { id: link, open: false });
                }
                self.effects.push(Effect::Connect {
                    session: id,
                    link,
                    address,
                });
            }
            Err(e) => {
                warn!("Attach failed ({}): {}", id, e);
                if let Some(session) = self.sessions.get_mut(&id) {
                    session.status = SessionStatus::Disconnected;
                }
                self.emit_line(&id, &format!("[error] {}", e));
                self.dirty = true;
            }
        }
    }

    fn on_session_deleted(&mut self, id: SessionId, close_after: bool, result: Result<(), ApiError>) {
        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => debug!("Session {} already gone", id),
            Err(e) => {
                warn!("Failed to close session {}: {}", id, e);
                self.emit_line(&id, &format!("[error] {}", e));
                return;
            }
        }
        if close_after {
            self.close_session(&id, false);
        }
    }

    fn on_auth_mode_changed(&mut self, id: SessionId, result: Result<AuthMode, ApiError>) {
        match result {
            Ok(mode) => {
                if let Some(session) = self.sessions.get_mut(&id) {
                    info!("Session {} auth mode now {}", id, mode.as_str());
                    session.auth_mode = mode;
                    self.dirty = true;
                }
            }
            Err(e) => {
                warn!("Failed to switch auth mode ({}): {}", id, e);
                self.emit_line(&id, &format!("[error] {}", e));
            }
        }
    }

    // ---- Transport ----

    fn on_transport(&mut self, id: SessionId, link: LinkId, event: TransportEvent) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        if !session.is_current_link(link) {
            debug!("Ignoring event from stale link {:?} on {}", link, id);
            return;
        }

        match event {
            TransportEvent::Opened => {
                session.link = Some(TransportLink { id: link, open: true });
                session.status = SessionStatus::Connected;
                self.request_fit(&id);
            }
            TransportEvent::Frame(frame) => {
                session.link = Some(TransportLink { id: link, open: true });
                self.on_server_frame(&id, frame);
            }
            TransportEvent::Closed => self.on_link_down(id),
            TransportEvent::Failed(reason) => {
                warn!("Session {} connection failed: {}", id, reason);
                self.on_link_down(id);
            }
        }
        self.dirty = true;
    }

    /// The session's connection ended; it is not reopened
    fn on_link_down(&mut self, id: SessionId) {
        if self.overlay_owner() == Some(id.as_str()) {
            self.close_overlay(true);
        }
        if let Some(session) = self.sessions.get_mut(&id) {
            session.link = None;
            if session.status != SessionStatus::Closed {
                session.status = SessionStatus::Disconnected;
            }
        }
        self.effects.push(Effect::Disconnect { session: id });
    }

    fn on_server_frame(&mut self, id: &str, frame: ServerFrame) {
        match frame {
            ServerFrame::Ready => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.status = SessionStatus::Connected;
                }
                self.request_fit(id);
            }
            ServerFrame::AuthMode { mode } => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.auth_mode = mode;
                }
            }
            ServerFrame::Output { data } => {
                let Some(session) = self.sessions.get_mut(id) else {
                    return;
                };
                if session.status == SessionStatus::Connecting {
                    session.status = SessionStatus::Connected;
                }
                match self.overlay.as_mut() {
                    Some(overlay) if overlay.owner == id => overlay.buffer(data),
                    _ => {
                        session.surface.write(&data);
                        if let Some(title) = session.surface.take_title_change() {
                            session.dynamic_title = title;
                        }
                    }
                }
            }
            ServerFrame::Exit { code } => {
                if self.overlay_owner() == Some(id) {
                    self.close_overlay(true);
                }
                if let Some(session) = self.sessions.get_mut(id) {
                    session.status = SessionStatus::Closed;
                    let code = code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string());
                    session.surface.writeln(&format!("[process exited: code={}]", code));
                }
            }
            ServerFrame::Error { message } => {
                if self.overlay_owner() == Some(id) {
                    self.close_overlay(true);
                }
                if let Some(session) = self.sessions.get_mut(id) {
                    session.surface.writeln(&format!("[error] {}", message));
                }
            }
            ServerFrame::Unknown => debug!("Dropping unknown frame on {}", id),
        }
    }

    /// Write a notice line to a session, holding it back while the picker
    /// covers that session
    fn emit_line(&mut self, id: &str, line: &str) {
        match self.overlay.as_mut() {
            Some(overlay) if overlay.owner == id => overlay.buffer(format!("\r\n{}\r\n", line)),
            _ => {
                if let Some(session) = self.sessions.get_mut(id) {
                    session.surface.writeln(line);
                }
            }
        }
        self.dirty = true;
    }

    // ---- Input ----

    fn on_key(&mut self, key: KeyEvent) {
        if key.kind == KeyEventKind::Release {
            return;
        }

        let picker_on_active = self.picker_on_active();
        if picker_on_active && self.overlay.as_ref().map(|o| !o.initialized()).unwrap_or(false) {
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL) && !key.modifiers.contains(KeyModifiers::ALT);

        if ctrl && matches!(key.code, KeyCode::Char('t') | KeyCode::Char('T')) {
            self.dispatch(Event::OpenPicker);
            return;
        }

        if self.prefix_mode {
            self.prefix_mode = false;
            self.on_prefix_key(key);
            self.dirty = true;
            return;
        }

        if ctrl && matches!(key.code, KeyCode::Char('b') | KeyCode::Char('B')) {
            self.prefix_mode = true;
            self.dirty = true;
            return;
        }

        if picker_on_active {
            let count = self.catalog.len();
            let Some(overlay) = self.overlay.as_mut() else {
                return;
            };
            match overlay.handle_key(&key, count) {
                OverlayAction::Swallowed => {}
                OverlayAction::Redraw => self.repaint_overlay(),
                OverlayAction::Close => self.close_overlay(true),
                OverlayAction::Commit { index } => self.commit_selection(index),
            }
            return;
        }

        let Some(session) = self.active_session() else {
            return;
        };
        if let Some(data) = KeyMapper::map(&key, InputModes::of(&session.surface)) {
            self.send_input(data);
        }
    }

    /// Command after the Ctrl+B prefix
    fn on_prefix_key(&mut self, key: KeyEvent) {
        let active = self.active.clone();
        match key.code {
            KeyCode::Char('c') => self.dispatch(Event::OpenPicker),
            KeyCode::Char('n') => self.dispatch(Event::NextTab),
            KeyCode::Char('p') => self.dispatch(Event::PrevTab),
            KeyCode::Char(d @ '1'..='9') => self.dispatch(Event::GotoTab(d as usize - '1' as usize)),
            KeyCode::Char('x') => {
                if let Some(id) = active {
                    self.dispatch(Event::Kill(id));
                }
            }
            KeyCode::Char('a') => {
                if let Some(id) = active {
                    self.dispatch(Event::ToggleAuth(id));
                }
            }
            KeyCode::Char('v') => self.effects.push(Effect::ReadClipboard),
            KeyCode::Char('q') => self.dispatch(Event::Quit),
            // Ctrl+B twice sends a literal Ctrl+B
            KeyCode::Char('b') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if !self.picker_on_active() {
                    self.send_input("\x02".to_string());
                }
            }
            _ => {}
        }
    }

    fn on_paste(&mut self, text: &str) {
        if self.picker_on_active() {
            return;
        }
        let Some(session) = self.active_session() else {
            return;
        };
        let data = KeyMapper::paste(text, InputModes::of(&session.surface));
        self.send_input(data);
    }

    /// Send input to the active session if its connection is open
    fn send_input(&mut self, data: String) {
        let Some(session) = self.active_session() else {
            return;
        };
        if session.launcher || !session.can_send() {
            return;
        }
        let id = session.id.clone();
        self.effects.push(Effect::Send {
            session: id,
            frame: ClientFrame::Input { data },
        });
    }
}

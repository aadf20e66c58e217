//! Session type (profile) catalog.
//!
//! The backend owns manifest discovery; the client only sees the listing
//! returned by `GET /session-types`. [`Catalog`] normalizes that listing,
//! keeps it in picker order and answers the [`TerminalTypeRegistry`]
//! queries the session controller makes at create and render time.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

/// Id of the profile every backend provides
pub const BUILTIN_TYPE_ID: &str = "terminal";

/// Lowercase alphanumerics, hyphen and underscore, at most 64 chars
static TYPE_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").expect("valid type id pattern"));

/// Whether `id` is an acceptable profile identifier
pub fn is_valid_type_id(id: &str) -> bool {
    TYPE_ID_PATTERN.is_match(id)
}

/// A session profile as listed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionTypeProfile {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub badge: Option<String>,
    pub icon: Option<String>,
    pub default: bool,
    pub built_in: bool,
}

impl SessionTypeProfile {
    /// The plain shell profile
    pub fn builtin() -> Self {
        Self {
            id: BUILTIN_TYPE_ID.to_string(),
            name: "Terminal".to_string(),
            description: Some("Plain shell session".to_string()),
            badge: Some("terminal".to_string()),
            icon: Some("⌂".to_string()),
            default: true,
            built_in: true,
        }
    }

    /// Placeholder for an id the catalog does not know
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            badge: Some(id.to_string()),
            ..Default::default()
        }
    }

    /// Glyph shown in tabs and picker rows: icon, else badge, else id
    pub fn logo(&self) -> &str {
        non_empty(&self.icon)
            .or_else(|| non_empty(&self.badge))
            .unwrap_or(&self.id)
    }

    /// Fill in missing fields the way the picker expects them
    fn normalized(mut self) -> Self {
        if self.id.is_empty() {
            self.id = BUILTIN_TYPE_ID.to_string();
        }
        if self.id == BUILTIN_TYPE_ID {
            self.built_in = true;
        }
        if self.name.is_empty() {
            self.name = self.id.clone();
        }
        if non_empty(&self.badge).is_none() {
            self.badge = Some(self.id.clone());
        }
        if non_empty(&self.icon).is_none() {
            self.icon = None;
        }
        if non_empty(&self.description).is_none() {
            self.description = None;
        }
        self
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Read interface over the set of available session profiles
pub trait TerminalTypeRegistry {
    /// Profiles in picker order (default first, then by name)
    fn list_types(&self) -> &[SessionTypeProfile];

    /// Look up a profile by id
    fn resolve_type(&self, id: &str) -> Option<&SessionTypeProfile>;

    /// Profile used when nothing (or something unknown) was requested
    fn get_default_type(&self) -> SessionTypeProfile;
}

/// Client-side profile list, kept sorted for the picker
#[derive(Debug, Clone)]
pub struct Catalog {
    types: Vec<SessionTypeProfile>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Catalog holding only the built-in profile
    pub fn new() -> Self {
        Self {
            types: vec![SessionTypeProfile::builtin()],
        }
    }

    /// Catalog with exactly the given profiles (may be empty)
    pub fn from_types(types: Vec<SessionTypeProfile>) -> Self {
        let mut catalog = Self { types: Vec::new() };
        catalog.install(types);
        catalog
    }

    /// Replace the list with a fresh listing.
    ///
    /// An empty listing keeps the current catalog. Entries with invalid
    /// or duplicate ids are skipped.
    pub fn replace(&mut self, types: Vec<SessionTypeProfile>) {
        if types.is_empty() {
            debug!("Empty session type listing, keeping {} profiles", self.types.len());
            return;
        }
        self.install(types);
    }

    fn install(&mut self, types: Vec<SessionTypeProfile>) {
        let mut accepted: Vec<SessionTypeProfile> = Vec::with_capacity(types.len());
        for profile in types.into_iter().map(SessionTypeProfile::normalized) {
            if !is_valid_type_id(&profile.id) {
                warn!("Skipping session type with invalid id {:?}", profile.id);
                continue;
            }
            if accepted.iter().any(|p| p.id == profile.id) {
                warn!("Skipping duplicate session type {:?}", profile.id);
                continue;
            }
            accepted.push(profile);
        }

        accepted.sort_by(|a, b| {
            b.default
                .cmp(&a.default)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!("Session type catalog now has {} profiles", accepted.len());
        self.types = accepted;
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&SessionTypeProfile> {
        self.types.get(index)
    }

    /// Index the picker selects when it opens
    pub fn default_index(&self) -> usize {
        self.types.iter().position(|t| t.default).unwrap_or(0)
    }

    /// Profile for `id`, or a bare placeholder when unknown
    pub fn find_or_placeholder(&self, id: &str) -> SessionTypeProfile {
        match self.resolve_type(id) {
            Some(profile) => profile.clone(),
            None if id == BUILTIN_TYPE_ID => SessionTypeProfile::builtin(),
            None => SessionTypeProfile::unknown(id),
        }
    }
}

impl TerminalTypeRegistry for Catalog {
    fn list_types(&self) -> &[SessionTypeProfile] {
        &self.types
    }

    fn resolve_type(&self, id: &str) -> Option<&SessionTypeProfile> {
        self.types.iter().find(|t| t.id == id)
    }

    fn get_default_type(&self) -> SessionTypeProfile {
        self.types
            .get(self.default_index())
            .cloned()
            .unwrap_or_else(SessionTypeProfile::builtin)
    }
}

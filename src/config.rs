//! Configuration and color scheme management for tabterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.tabterm/config.toml`
//! - Built-in color schemes for the tab bar, status bar and picker
//!
//! # Configuration File
//!
//! ```toml
//! # Backend REST base URL
//! server_url = "http://127.0.0.1:8000/api"
//!
//! # Color scheme: default, solarized-dark, nord, dracula, tokyo-night
//! color_scheme = "tokyo-night"
//!
//! [overlay]
//! app_title = "Remote Terminal"
//! glyph_timeout_ms = 1500
//! warmup_passes = 2
//!
//! [terminal]
//! scrollback = 2000
//!
//! [tab_bar]
//! max_title_width = 24
//!
//! [status_bar]
//! visible = true
//! ```
//!
//! Command-line flags override the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::api::DEFAULT_SERVER_URL;
use crate::overlay::layout::Palette;

const CONFIG_DIR: &str = ".tabterm";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend REST base URL
    pub server_url: String,
    /// Color scheme name
    pub color_scheme: String,
    pub overlay: OverlayConfig,
    pub terminal: TerminalConfig,
    pub tab_bar: TabBarConfig,
    pub status_bar: StatusBarConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            color_scheme: "default".to_string(),
            overlay: OverlayConfig::default(),
            terminal: TerminalConfig::default(),
            tab_bar: TabBarConfig::default(),
            status_bar: StatusBarConfig::default(),
        }
    }
}

/// Profile picker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Heading shown in the picker header
    pub app_title: String,
    /// Upper bound on waiting for the host to report stable metrics
    pub glyph_timeout_ms: u64,
    /// Fit passes between glyph readiness and the first paint
    pub warmup_passes: u8,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            app_title: "Remote Terminal".to_string(),
            glyph_timeout_ms: 1500,
            warmup_passes: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Lines of scrollback kept per session surface
    pub scrollback: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self { scrollback: 2000 }
    }
}

/// Tab bar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TabBarConfig {
    /// Titles longer than this are truncated with an ellipsis
    pub max_title_width: usize,
}

impl Default for TabBarConfig {
    fn default() -> Self {
        Self { max_title_width: 24 }
    }
}

/// Status bar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusBarConfig {
    pub visible: bool,
}

impl Default for StatusBarConfig {
    fn default() -> Self {
        Self { visible: true }
    }
}

impl Config {
    /// Load configuration, falling back to defaults when the file is
    /// missing or unreadable
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Self::default(),
            },
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using defaults", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `~/.tabterm/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        data_dir().map(|dir| dir.join(CONFIG_FILE))
    }

    /// Get the color scheme
    pub fn get_color_scheme(&self) -> ColorScheme {
        let name = self.color_scheme.to_lowercase().replace('_', "-");
        if name != "tokyonight" && !ColorScheme::list().contains(&name.as_str()) {
            warn!("Unknown color scheme {:?}, using default", self.color_scheme);
        }
        ColorScheme::by_name(&self.color_scheme)
    }
}

/// `~/.tabterm`, home of the config file and the log
pub fn data_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(CONFIG_DIR))
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Color scheme definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorScheme {
    pub name: String,

    // Tab bar colors
    pub tab_bar_bg: Color,
    pub tab_bar_fg: Color,
    pub tab_active_bg: Color,
    pub tab_active_fg: Color,
    pub tab_inactive_bg: Color,
    pub tab_inactive_fg: Color,
    /// Status glyph of a disconnected or closed tab
    pub tab_alert_fg: Color,

    // Status bar colors
    pub status_bar_bg: Color,
    pub status_bar_fg: Color,
    pub status_prefix_bg: Color,
    pub status_prefix_fg: Color,

    // Picker colors
    pub picker_title: Color,
    pub picker_accent: Color,
    pub picker_muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::default_scheme()
    }
}

impl ColorScheme {
    /// Default color scheme
    pub fn default_scheme() -> Self {
        Self {
            name: "default".to_string(),

            // Tab bar - dark gray background
            tab_bar_bg: Color::new(40, 40, 40),
            tab_bar_fg: Color::new(180, 180, 180),
            tab_active_bg: Color::new(60, 60, 180),
            tab_active_fg: Color::new(255, 255, 255),
            tab_inactive_bg: Color::new(60, 60, 60),
            tab_inactive_fg: Color::new(150, 150, 150),
            tab_alert_fg: Color::new(230, 80, 80),

            status_bar_bg: Color::new(0, 100, 0),
            status_bar_fg: Color::new(255, 255, 255),
            status_prefix_bg: Color::new(200, 200, 0),
            status_prefix_fg: Color::new(0, 0, 0),

            picker_title: Color::new(80, 200, 220),
            picker_accent: Color::new(100, 150, 255),
            picker_muted: Color::new(128, 128, 128),
        }
    }

    /// Solarized Dark scheme
    pub fn solarized_dark() -> Self {
        Self {
            name: "solarized-dark".to_string(),

            tab_bar_bg: Color::new(0, 43, 54),
            tab_bar_fg: Color::new(147, 161, 161),
            tab_active_bg: Color::new(38, 139, 210),
            tab_active_fg: Color::new(253, 246, 227),
            tab_inactive_bg: Color::new(7, 54, 66),
            tab_inactive_fg: Color::new(101, 123, 131),
            tab_alert_fg: Color::new(220, 50, 47),

            status_bar_bg: Color::new(7, 54, 66),
            status_bar_fg: Color::new(147, 161, 161),
            status_prefix_bg: Color::new(181, 137, 0),
            status_prefix_fg: Color::new(0, 43, 54),

            picker_title: Color::new(42, 161, 152),
            picker_accent: Color::new(38, 139, 210),
            picker_muted: Color::new(88, 110, 117),
        }
    }

    /// Nord scheme
    pub fn nord() -> Self {
        Self {
            name: "nord".to_string(),

            tab_bar_bg: Color::new(46, 52, 64),
            tab_bar_fg: Color::new(216, 222, 233),
            tab_active_bg: Color::new(136, 192, 208),
            tab_active_fg: Color::new(46, 52, 64),
            tab_inactive_bg: Color::new(59, 66, 82),
            tab_inactive_fg: Color::new(147, 161, 181),
            tab_alert_fg: Color::new(191, 97, 106),

            status_bar_bg: Color::new(59, 66, 82),
            status_bar_fg: Color::new(216, 222, 233),
            status_prefix_bg: Color::new(163, 190, 140),
            status_prefix_fg: Color::new(46, 52, 64),

            picker_title: Color::new(136, 192, 208),
            picker_accent: Color::new(129, 161, 193),
            picker_muted: Color::new(76, 86, 106),
        }
    }

    /// Dracula scheme
    pub fn dracula() -> Self {
        Self {
            name: "dracula".to_string(),

            tab_bar_bg: Color::new(40, 42, 54),
            tab_bar_fg: Color::new(248, 248, 242),
            tab_active_bg: Color::new(189, 147, 249),
            tab_active_fg: Color::new(40, 42, 54),
            tab_inactive_bg: Color::new(68, 71, 90),
            tab_inactive_fg: Color::new(98, 114, 164),
            tab_alert_fg: Color::new(255, 85, 85),

            status_bar_bg: Color::new(68, 71, 90),
            status_bar_fg: Color::new(248, 248, 242),
            status_prefix_bg: Color::new(80, 250, 123),
            status_prefix_fg: Color::new(40, 42, 54),

            picker_title: Color::new(139, 233, 253),
            picker_accent: Color::new(189, 147, 249),
            picker_muted: Color::new(98, 114, 164),
        }
    }

    /// Tokyo Night scheme
    pub fn tokyo_night() -> Self {
        Self {
            name: "tokyo-night".to_string(),

            tab_bar_bg: Color::new(26, 27, 38),
            tab_bar_fg: Color::new(169, 177, 214),
            tab_active_bg: Color::new(122, 162, 247),
            tab_active_fg: Color::new(26, 27, 38),
            tab_inactive_bg: Color::new(36, 40, 59),
            tab_inactive_fg: Color::new(86, 95, 137),
            tab_alert_fg: Color::new(247, 118, 142),

            status_bar_bg: Color::new(36, 40, 59),
            status_bar_fg: Color::new(169, 177, 214),
            status_prefix_bg: Color::new(158, 206, 106),
            status_prefix_fg: Color::new(26, 27, 38),

            picker_title: Color::new(125, 207, 255),
            picker_accent: Color::new(122, 162, 247),
            picker_muted: Color::new(86, 95, 137),
        }
    }

    /// Get scheme by name
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "solarized-dark" | "solarized_dark" => Self::solarized_dark(),
            "nord" => Self::nord(),
            "dracula" => Self::dracula(),
            "tokyo-night" | "tokyo_night" | "tokyonight" => Self::tokyo_night(),
            _ => Self::default_scheme(),
        }
    }

    /// List available schemes
    pub fn list() -> Vec<&'static str> {
        vec!["default", "solarized-dark", "nord", "dracula", "tokyo-night"]
    }

    /// Picker colors for this scheme
    pub fn palette(&self) -> Palette {
        Palette {
            title: self.picker_title.to_crossterm(),
            accent: self.picker_accent.to_crossterm(),
            muted: self.picker_muted.to_crossterm(),
        }
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
server_url = "https://terminals.example.com/api"
color_scheme = "nord"

[overlay]
warmup_passes = 4
"#,
        );
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.server_url, "https://terminals.example.com/api");
        assert_eq!(config.get_color_scheme().name, "nord");
        assert_eq!(config.overlay.warmup_passes, 4);
        assert_eq!(config.overlay.glyph_timeout_ms, 1500);
        assert_eq!(config.overlay.app_title, "Remote Terminal");
        assert_eq!(config.terminal.scrollback, 2000);
        assert!(config.status_bar.visible);
    }

    #[test]
    fn test_errors_are_typed() {
        let missing = Path::new("/nonexistent/tabterm/config.toml");
        assert!(matches!(Config::load_from(missing), Err(ConfigError::Io { .. })));

        let file = write_config("server_url = [");
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().starts_with("failed to parse"));
    }

    #[test]
    fn test_load_falls_back_to_defaults() {
        let file = write_config("this is not toml");
        let config = Config::load(Some(file.path()));
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);

        let config = Config::load(Some(Path::new("/nonexistent/config.toml")));
        assert_eq!(config.color_scheme, "default");
    }

    #[test]
    fn test_scheme_lookup() {
        assert_eq!(ColorScheme::by_name("Tokyo-Night").name, "tokyo-night");
        assert_eq!(ColorScheme::by_name("unknown").name, "default");
        for name in ColorScheme::list() {
            assert_eq!(ColorScheme::by_name(name).name, name);
        }

        let palette = ColorScheme::nord().palette();
        assert_eq!(palette.title, crossterm::style::Color::Rgb { r: 136, g: 192, b: 208 });
    }
}

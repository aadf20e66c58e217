//! tabterm - A tabbed client for remote terminal sessions
//!
//! tabterm runs inside your terminal and connects to a terminal backend
//! over HTTP and websockets. Every backend session gets its own tab with a
//! locally emulated screen; new sessions are started from an inline
//! profile picker.
//!
//! # Features
//!
//! - **Multiple Tabs**: One tab per remote session, click to switch
//! - **Profile Picker**: Choose a session type without leaving the terminal
//! - **Credential Modes**: Toggle a session between m2m and user tokens
//! - **tmux Keybindings**: Familiar Ctrl+B prefix shortcuts
//! - **Color Schemes**: Built-in themes for the tab and status bars
//!
//! # Quick Start
//!
//! ```text
//! tabterm                                  # Backend at http://127.0.0.1:8000/api
//! tabterm --server https://host/api        # Another backend
//! tabterm --type python                    # Start a python session if none exist
//! ```
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | Ctrl+T | Toggle the profile picker |
//! | Ctrl+B c | Open the profile picker |
//! | Ctrl+B n/p | Next/Previous tab |
//! | Ctrl+B 1-9 | Select tab by number |
//! | Ctrl+B x | Kill session |
//! | Ctrl+B a | Toggle credential mode |
//! | Ctrl+B v | Paste clipboard |
//! | Ctrl+B q | Quit |

mod api;
mod config;
mod core;
mod overlay;
mod protocol;
mod registry;
mod session;
mod transport;
mod ui;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossterm::event::{Event as TermEvent, EventStream, MouseButton, MouseEventKind};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::api::{resolve_connection_url, ApiClient};
use crate::config::Config;
use crate::session::controller::{Controller, ControllerSettings, Effect, Event};
use crate::transport::{TransportBridge, TransportEvent};
use crate::ui::renderer::Renderer;

/// Delay standing in for one display refresh
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Interval between host size probes while waiting for glyph metrics
const GLYPH_PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "tabterm", version, about = "Tabbed client for remote terminal sessions")]
struct Cli {
    /// Backend REST base URL (overrides the config file)
    #[arg(short, long, env = "TABTERM_SERVER", value_name = "URL")]
    server: Option<String>,

    /// Config file (default: ~/.tabterm/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// Profile to start when the backend has no sessions
    #[arg(short = 't', long = "type", value_name = "TYPE_ID")]
    type_id: Option<String>,
}

/// Log to `~/.tabterm/tabterm.log`; the host terminal is in raw mode
fn init_logging(level: &str) {
    let log_path = config::data_dir()
        .map(|dir| dir.join("tabterm.log"))
        .unwrap_or_else(|| PathBuf::from("tabterm.log"));

    // Create log directory if needed
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    // Open log file (append mode)
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = Config::load(cli.config.as_deref());
    if let Some(server) = cli.server {
        config.server_url = server;
    }

    let api = ApiClient::new(&config.server_url)
        .with_context(|| format!("invalid server URL {:?}", config.server_url))?;
    info!("tabterm {} starting against {}", env!("CARGO_PKG_VERSION"), api.base_url());

    let mut renderer = Renderer::new(&config);
    renderer.init()?;

    let result = run(&config, cli.type_id, api, &mut renderer).await;

    // Cleanup
    let _ = renderer.cleanup();
    if let Err(e) = &result {
        error!("Exiting with error: {:#}", e);
    }
    info!("tabterm exiting");
    result
}

/// Main event loop
async fn run(config: &Config, initial_type: Option<String>, api: ApiClient, renderer: &mut Renderer) -> anyhow::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let (mut width, height) = Renderer::size()?;
    let settings = ControllerSettings {
        app_title: config.overlay.app_title.clone(),
        scrollback: config.terminal.scrollback,
        warmup_passes: config.overlay.warmup_passes,
        palette: config.get_color_scheme().palette(),
        initial_type,
    };
    let mut controller = Controller::new(settings, renderer.content_size(width, height));
    let mut runtime = Runtime::new(api, tx, Duration::from_millis(config.overlay.glyph_timeout_ms));
    let mut terminal_events = EventStream::new();

    controller.start();

    loop {
        for effect in controller.drain_effects() {
            runtime.perform(effect);
        }
        if controller.should_quit() {
            info!("Quit requested");
            break;
        }
        if controller.take_dirty() {
            renderer.render(&controller)?;
        }

        tokio::select! {
            Some(event) = rx.recv() => controller.dispatch(event),
            maybe_event = terminal_events.next() => match maybe_event {
                Some(Ok(TermEvent::Key(key))) => controller.dispatch(Event::Key(key)),
                Some(Ok(TermEvent::Paste(text))) => controller.dispatch(Event::Paste(text)),
                Some(Ok(TermEvent::Resize(cols, rows))) => {
                    width = cols;
                    let (cols, rows) = renderer.content_size(cols, rows);
                    controller.dispatch(Event::Resize { cols, rows });
                }
                Some(Ok(TermEvent::Mouse(mouse))) if mouse.row == 0 => {
                    let close = match mouse.kind {
                        MouseEventKind::Down(MouseButton::Left) => false,
                        MouseEventKind::Down(MouseButton::Middle) => true,
                        _ => continue,
                    };
                    if let Some((index, on_close_mark)) = renderer.tab_bar(&controller, width).hit(mouse.column) {
                        controller.dispatch(Event::TabClicked { index, close: close || on_close_mark });
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => warn!("Terminal event error: {}", e),
                None => {
                    info!("Terminal event stream ended");
                    break;
                }
            },
        }
    }

    runtime.shutdown();
    Ok(())
}

/// Performs controller effects and reports completions as events
struct Runtime {
    api: ApiClient,
    bridge: TransportBridge,
    events: mpsc::UnboundedSender<Event>,
    glyph_timeout: Duration,
}

impl Runtime {
    fn new(api: ApiClient, events: mpsc::UnboundedSender<Event>, glyph_timeout: Duration) -> Self {
        Self {
            api,
            bridge: TransportBridge::new(events.clone()),
            events,
            glyph_timeout,
        }
    }

    fn perform(&mut self, effect: Effect) {
        debug!("Effect: {:?}", effect);
        match effect {
            Effect::ListTypes => self.request(|api| async move { Event::TypesListed(api.list_types().await) }),
            Effect::ListSessions => {
                self.request(|api| async move { Event::SessionsListed(api.list_sessions().await) })
            }
            Effect::CreateSession { type_id } => self.request(|api| async move {
                let result = api.create_session(&type_id).await;
                Event::SessionCreated { type_id, result }
            }),
            Effect::Attach { session } => self.request(|api| async move {
                let result = api.attach(&session).await;
                Event::Attached { session, result }
            }),
            Effect::Connect { session, link, address } => {
                match resolve_connection_url(self.api.base_url(), &address) {
                    Ok(url) => self.bridge.connect(session, link, url),
                    Err(e) => {
                        warn!("Bad connection address {:?} for {}: {}", address, session, e);
                        let _ = self.events.send(Event::Transport {
                            session,
                            link,
                            event: TransportEvent::Failed(e.to_string()),
                        });
                    }
                }
            }
            Effect::Send { session, frame } => {
                if let Err(e) = self.bridge.send(&session, &frame) {
                    debug!("Dropping frame: {}", e);
                }
            }
            Effect::Disconnect { session } => self.bridge.disconnect(&session),
            Effect::DeleteSession { session, close_after } => self.request(move |api| async move {
                let result = api.delete_session(&session).await;
                Event::SessionDeleted {
                    session,
                    close_after,
                    result,
                }
            }),
            Effect::SetAuthMode { session, mode } => self.request(move |api| async move {
                let result = api.set_auth_mode(&session, mode).await;
                Event::AuthModeChanged { session, result }
            }),
            Effect::AwaitGlyphs => {
                let events = self.events.clone();
                let timeout = self.glyph_timeout;
                tokio::spawn(async move {
                    await_glyphs(|| crossterm::terminal::size().ok(), timeout).await;
                    let _ = events.send(Event::GlyphsReady);
                });
            }
            Effect::RequestFrame => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(FRAME_INTERVAL).await;
                    let _ = events.send(Event::Frame);
                });
            }
            Effect::ReadClipboard => match arboard::Clipboard::new().and_then(|mut c| c.get_text()) {
                Ok(text) => {
                    let _ = self.events.send(Event::Paste(text));
                }
                Err(e) => warn!("Clipboard read failed: {}", e),
            },
        }
    }

    /// Run one backend request on its own task
    fn request<F, Fut>(&self, call: F)
    where
        F: FnOnce(ApiClient) -> Fut,
        Fut: std::future::Future<Output = Event> + Send + 'static,
    {
        let events = self.events.clone();
        let fut = call(self.api.clone());
        tokio::spawn(async move {
            let _ = events.send(fut.await);
        });
    }

    fn shutdown(&mut self) {
        self.bridge.shutdown();
    }
}

/// Wait until the host reports the same size on two consecutive probes,
/// or until `timeout` passes
async fn await_glyphs<P>(probe: P, timeout: Duration)
where
    P: Fn() -> Option<(u16, u16)>,
{
    let settle = async {
        let mut last = probe();
        loop {
            tokio::time::sleep(GLYPH_PROBE_INTERVAL).await;
            let current = probe();
            if current.is_some() && current == last {
                return;
            }
            last = current;
        }
    };
    if tokio::time::timeout(timeout, settle).await.is_err() {
        debug!("Glyph metrics did not settle within {:?}", timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "tabterm",
            "--server",
            "https://terminals.example.com/api",
            "--type",
            "python",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.server.as_deref(), Some("https://terminals.example.com/api"));
        assert_eq!(cli.type_id.as_deref(), Some("python"));
        assert_eq!(cli.log_level, "debug");
        assert!(cli.config.is_none());

        let cli = Cli::try_parse_from(["tabterm", "-c", "/tmp/tabterm.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/tabterm.toml")));
        assert_eq!(cli.log_level, "info");
    }

    #[tokio::test]
    async fn test_glyphs_ready_once_size_is_stable() {
        let probes = AtomicUsize::new(0);
        // Size changes once, then holds
        let probe = || {
            let n = probes.fetch_add(1, Ordering::SeqCst);
            Some(if n < 2 { (80 + n as u16, 24) } else { (100, 30) })
        };
        let started = Instant::now();
        await_glyphs(probe, Duration::from_secs(5)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(probes.load(Ordering::SeqCst) >= 4);
    }

    #[tokio::test]
    async fn test_glyph_wait_is_bounded() {
        let started = Instant::now();
        await_glyphs(|| None, Duration::from_millis(200)).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(5));
    }
}

//! Configuration file management
//!
//! Loads TOML configuration files and provides application settings.
//! Default config path: ~/.config/termweb/config.toml
//!
//! The same structure is sent to every connected tab as `/config,<json>`,
//! so tab renderers and the hub always agree on tuning values.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[cfg(target_os = "linux")]
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
#[cfg(target_os = "linux")]
use std::sync::mpsc;

use crate::constants::*;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hub connection settings
    pub hub: HubConfig,
    /// Interactive terminal settings
    pub tty: TtyConfig,
    /// Frame pipeline tuning
    pub render: RenderConfig,
    /// Raw text service settings
    pub http_server: HttpServerConfig,
}

/// Hub connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// WebSocket URL of the terminal-side server
    pub terminal_url: String,
    /// Listen address for tab renderers and the browser driver
    pub renderer_bind: String,
    /// Page opened in the first tab (empty = none)
    pub startup_url: String,
    /// Base query used when the URL bar text is not a URL
    pub default_search_engine_base: String,
    /// User agent used when the terminal asks for mobile layouts
    pub mobile_user_agent: String,
}

/// Interactive terminal settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtyConfig {
    /// Time between small pixel frame requests (ms).
    /// Lower is smoother but costs more CPU.
    pub small_pixel_frame_rate: u64,
    /// Time between native tab polls (ms)
    pub tab_poll_interval: u64,
    /// Automatic reload attempts for a tab that never connects
    pub max_tab_reloads: u32,
}

/// How frames are delivered to the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameEncoding {
    /// Structured `/frame_text` and `/frame_pixels` JSON
    Protocol,
    /// Additionally composite and send `/frame,<ansi>`
    Ansi,
}

/// Frame pipeline tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Big sub-frame size as a multiple of the TTY size
    pub big_sub_frame_factor: i64,
    /// Extra pixels added to the measured character height
    pub char_height_fudge: f64,
    /// Fraction of a character at which its colour is sampled
    pub middle_of_em: f64,
    /// Drop characters whose colour matches the text-less screenshot
    pub use_text_visibility: bool,
    /// Time between pending mutation checks (ms)
    pub mutation_drain_interval: u64,
    /// Frame delivery format
    pub frame_encoding: FrameEncoding,
    /// Extra character rows added to the browser window height
    pub window_ui_rows: f64,
    /// TTY rows reserved for the tab bar and URL bar
    pub tty_ui_rows: i64,
}

/// Raw text service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpServerConfig {
    /// TTY width used for raw text pages
    pub columns: i64,
    /// TTY height used for raw text pages
    pub rows: i64,
    /// Wait after DOM ready before parsing text (ms)
    pub render_delay: u64,
    /// JPEG quality of the HTML background image (1-100)
    pub jpeg_quality: u8,
    /// Time before an unanswered request's tab is closed (ms)
    pub request_timeout: u64,
    /// Rows after which the page is truncated
    pub max_rows: i64,
    /// Snippet shown above the page
    pub header: String,
    /// Snippet shown below the page
    pub footer: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hub: HubConfig::default(),
            tty: TtyConfig::default(),
            render: RenderConfig::default(),
            http_server: HttpServerConfig::default(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            terminal_url: DEFAULT_TERMINAL_URL.to_string(),
            renderer_bind: DEFAULT_RENDERER_BIND.to_string(),
            startup_url: String::new(),
            default_search_engine_base: "https://www.google.com/search?q=".to_string(),
            mobile_user_agent: MOBILE_USER_AGENT.to_string(),
        }
    }
}

impl Default for TtyConfig {
    fn default() -> Self {
        Self {
            small_pixel_frame_rate: SMALL_PIXEL_FRAME_RATE_MS,
            tab_poll_interval: TAB_POLL_INTERVAL_MS,
            max_tab_reloads: MAX_TAB_RELOADS,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            big_sub_frame_factor: BIG_SUB_FRAME_FACTOR,
            char_height_fudge: CHAR_HEIGHT_FUDGE,
            middle_of_em: MIDDLE_OF_EM,
            use_text_visibility: true,
            mutation_drain_interval: MUTATION_DRAIN_INTERVAL_MS,
            frame_encoding: FrameEncoding::Protocol,
            window_ui_rows: WINDOW_UI_ROWS,
            tty_ui_rows: TTY_UI_ROWS,
        }
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            columns: RAW_TEXT_COLUMNS,
            rows: RAW_TEXT_ROWS,
            render_delay: RAW_TEXT_RENDER_DELAY_MS,
            jpeg_quality: RAW_TEXT_JPEG_QUALITY,
            request_timeout: RAW_TEXT_REQUEST_TIMEOUT_MS,
            max_rows: RAW_TEXT_MAX_ROWS,
            header: String::new(),
            footer: String::new(),
        }
    }
}

impl Config {
    /// System-wide config path
    const SYSTEM_CONFIG_PATH: &'static str = "/etc/termweb/config.toml";

    /// Get the path that would be used for loading config
    /// Returns None if using built-in defaults
    pub fn config_path() -> Option<PathBuf> {
        // 1. TERMWEB_CONFIG environment variable
        if let Ok(path) = std::env::var("TERMWEB_CONFIG") {
            let p = Path::new(&path);
            if p.exists() {
                return Some(p.to_path_buf());
            }
        }

        // 2. User config: ~/.config/termweb/config.toml
        if let Some(config_path) = default_config_path() {
            if config_path.exists() {
                return Some(config_path);
            }
        }

        // 3. System config: /etc/termweb/config.toml
        let system_config = Path::new(Self::SYSTEM_CONFIG_PATH);
        if system_config.exists() {
            return Some(system_config.to_path_buf());
        }

        None
    }

    /// Load configuration with priority:
    /// 1. TERMWEB_CONFIG environment variable
    /// 2. ~/.config/termweb/config.toml (user config)
    /// 3. /etc/termweb/config.toml (system config)
    /// 4. Built-in defaults
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            match Self::load_from_file(&path) {
                Ok(config) => {
                    info!("Loaded config: {}", path.display());
                    return config;
                }
                Err(e) => {
                    warn!("Failed to load config {}: {}", path.display(), e);
                }
            }
        }
        info!("Using built-in default config");
        Self::default()
    }

    /// Load settings from specified path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse settings from TOML text; missing keys take defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// JSON form sent to tabs with `/config`
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialise config")
    }

    /// Write a commented default config to `path`, or the user config path
    pub fn write_default_config(path: Option<&Path>) -> Result<PathBuf> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()
                .ok_or_else(|| anyhow::anyhow!("Config directory not found"))?,
        };
        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let body = toml::to_string_pretty(&Self::default())?;
        let template = format!(
            "# termweb configuration\n\
             #\n\
             # Location: {}\n\
             # Every key is optional; removed keys fall back to the values below.\n\
             # Edits are picked up while the hub is running.\n\n{}",
            config_path.display(),
            body
        );
        std::fs::write(&config_path, template)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        Ok(config_path)
    }
}

/// Config file change watcher (for hot reload)
#[cfg(target_os = "linux")]
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

#[cfg(target_os = "linux")]
impl ConfigWatcher {
    /// Start watching config file
    pub fn new(config_path: &Path) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let file_name = config_path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                use notify::EventKind;
                let is_ours = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                // Editors often save by writing a temp file and renaming it
                if is_ours && matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    let _ = tx.send(());
                }
            }
        })?;

        // Watch the parent directory to catch rename operations
        let watch_path = config_path.parent().unwrap_or(config_path);
        watcher.watch(watch_path, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Check if config file was modified (non-blocking).
    /// Drains queued events so one save triggers one reload.
    pub fn check_reload(&self) -> bool {
        let mut changed = false;
        while self.rx.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}

/// Hot reload needs inotify; elsewhere the config is read once
#[cfg(not(target_os = "linux"))]
pub struct ConfigWatcher;

#[cfg(not(target_os = "linux"))]
impl ConfigWatcher {
    pub fn new(_config_path: &Path) -> Result<Self> {
        anyhow::bail!("config hot reload is only supported on Linux")
    }

    pub fn check_reload(&self) -> bool {
        false
    }
}

/// Get default config file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("termweb").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_takes_defaults() {
        let config = Config::from_toml(
            r#"
            [tty]
            small_pixel_frame_rate = 100

            [render]
            frame_encoding = "ansi"
            "#,
        )
        .unwrap();
        assert_eq!(config.tty.small_pixel_frame_rate, 100);
        assert_eq!(config.tty.max_tab_reloads, MAX_TAB_RELOADS);
        assert_eq!(config.render.frame_encoding, FrameEncoding::Ansi);
        assert_eq!(config.render.big_sub_frame_factor, BIG_SUB_FRAME_FACTOR);
        assert_eq!(config.http_server.columns, RAW_TEXT_COLUMNS);
    }

    #[test]
    fn test_invalid_config_is_error() {
        assert!(Config::from_toml("[tty]\nsmall_pixel_frame_rate = \"fast\"").is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = Config::default();
        let json = config.to_json().unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_write_default_config() {
        let dir = std::env::temp_dir().join(format!("termweb-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let written = Config::write_default_config(Some(&path)).unwrap();
        assert_eq!(written, path);
        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, Config::default());
        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Hub-side tab session
//!
//! A tab is registered when its renderer announces itself, connected once it
//! opens a channel, and removed when closed or when the browser stops
//! reporting it.

use log::{debug, info, warn};

use super::protocol::{MessageSender, TabState};
use crate::constants::STARTUP_INTERSTITIAL_TITLES;
use crate::dom::serialise::RawTextMode;
use crate::host::{BrowserHost, NativeStatus, NativeTab, TabId};

/// One browser tab as the hub sees it
pub struct Tab {
    pub id: TabId,
    pub title: String,
    pub url: String,
    pub active: bool,
    pub removed: bool,
    pub page_state: String,
    pub status_message: String,
    /// Set for tabs opened to answer a raw text request
    pub request_id: Option<String>,
    pub raw_mode: Option<RawTextMode>,
    pub native_status: NativeStatus,
    /// The browser has reported this tab at least once
    native_known: bool,
    channel: Option<Box<dyn MessageSender>>,
    reload_count: u32,
}

impl Tab {
    pub fn new(id: TabId) -> Self {
        Self {
            id,
            title: String::new(),
            url: String::new(),
            active: false,
            removed: false,
            page_state: String::new(),
            status_message: String::new(),
            request_id: None,
            raw_mode: None,
            native_status: NativeStatus::Loading,
            native_known: false,
            channel: None,
            reload_count: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn connect(&mut self, channel: Box<dyn MessageSender>) {
        self.channel = Some(channel);
    }

    pub fn disconnect(&mut self) {
        self.channel = None;
    }

    pub fn is_native_known(&self) -> bool {
        self.native_known
    }

    pub fn reload_count(&self) -> u32 {
        self.reload_count
    }

    /// Send to the tab's renderer; dropped when not connected
    pub fn post_message(&mut self, message: String) {
        match self.channel.as_mut() {
            Some(channel) => channel.send_message(message),
            None => debug!("Tab {} has no channel, dropping {:?}", self.id, message),
        }
    }

    /// The `/mode` this tab's renderer should run in
    pub fn mode_name(&self) -> &'static str {
        match self.raw_mode {
            Some(mode) => mode.name(),
            None => "interactive",
        }
    }

    pub fn state(&self) -> TabState {
        TabState {
            id: self.id,
            active: self.active,
            removed: self.removed,
            title: self.title.clone(),
            uri: self.url.clone(),
            page_state: self.page_state.clone(),
            status_message: self.status_message.clone(),
        }
    }

    pub fn update_status(&mut self, status: &str, message: &str) {
        self.status_message = match status {
            "page_init" => format!("Loading {}", self.url),
            "parsing_complete" => String::new(),
            "window_unload" => "Loading...".to_string(),
            _ => message.to_string(),
        };
        self.page_state = status.to_string();
    }

    /// Copy what the browser reports
    pub fn apply_native(&mut self, native: &NativeTab) {
        self.title = native.title.clone();
        self.url = native.url.clone();
        self.active = native.active;
        self.native_status = native.status;
        self.native_known = true;
    }

    /// Browser startup pages that would steal the first tab
    pub fn is_interstitial(&self) -> bool {
        STARTUP_INTERSTITIAL_TITLES
            .iter()
            .any(|title| self.title.contains(title))
    }

    /// Reload a tab that finished loading but never connected.
    ///
    /// Pages without content (direct image links, native pages) never run a
    /// renderer. Returns whether a reload was issued.
    pub fn ensure_connection(&mut self, browser: &mut dyn BrowserHost, max_reloads: u32) -> bool {
        if self.is_connected() || self.native_status != NativeStatus::Complete {
            return false;
        }
        if self.reload_count >= max_reloads {
            return false;
        }
        self.reload_count += 1;
        warn!(
            "Automatically reloading tab {} that has loaded but not connected (attempt {}/{})",
            self.id, self.reload_count, max_reloads
        );
        browser.reload_tab(self.id);
        // Loading again until the browser says otherwise
        self.native_status = NativeStatus::Loading;
        if self.reload_count == max_reloads {
            info!("Tab {} reached its reload limit, leaving it as is", self.id);
        }
        true
    }
}

//! Hub state machine
//!
//! Sits between the terminal and the tab renderers. Routes terminal input to
//! the active tab and frames back to the terminal, keeps tab sessions in step
//! with what the browser reports, and sizes the browser window to the TTY.
//!
//! Everything here is synchronous. The transport owns the sockets and timers
//! and calls in with each message or tick; time is passed in explicitly.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::dimensions::HubDimensions;
use super::protocol::{
    json_command, Command, DimensionsReport, MessageSender, ProtocolError, RawTextResponse,
    TabInfo,
};
use super::tab::Tab;
use crate::config::Config;
use crate::dom::dimensions::TtySize;
use crate::dom::serialise::RawTextMode;
use crate::host::{BrowserHost, TabId};

/// First id handed to renderers that register without a native id
const LOCAL_TAB_ID_BASE: TabId = 1 << 40;

pub struct Hub<B: BrowserHost> {
    browser: B,
    config: Config,
    terminal: Option<Box<dyn MessageSender>>,
    tabs: BTreeMap<TabId, Tab>,
    active_tab_id: Option<TabId>,
    dimensions: HubDimensions,
    /// Some renderer has connected at least once
    is_connected_to_dom: bool,
    is_initial_window_size_pending: bool,
    /// Raw text tabs to close if still open at the deadline
    raw_text_deadlines: Vec<(TabId, Instant)>,
    /// URLs of closed tabs, most recent last
    closed_urls: Vec<String>,
    next_local_id: TabId,
}

impl<B: BrowserHost> Hub<B> {
    pub fn new(browser: B, config: Config) -> Self {
        Self {
            browser,
            dimensions: HubDimensions::new(&config),
            config,
            terminal: None,
            tabs: BTreeMap::new(),
            active_tab_id: None,
            is_connected_to_dom: false,
            is_initial_window_size_pending: true,
            raw_text_deadlines: Vec::new(),
            closed_urls: Vec::new(),
            next_local_id: LOCAL_TAB_ID_BASE,
        }
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn browser_mut(&mut self) -> &mut B {
        &mut self.browser
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dimensions(&self) -> &HubDimensions {
        &self.dimensions
    }

    pub fn tab(&self, id: TabId) -> Option<&Tab> {
        self.tabs.get(&id)
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.keys().copied().collect()
    }

    pub fn active_tab_id(&self) -> Option<TabId> {
        self.active_tab_id
    }

    pub fn is_terminal_connected(&self) -> bool {
        self.terminal.is_some()
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    fn send_to_terminal(&mut self, message: String) {
        match self.terminal.as_mut() {
            Some(terminal) => terminal.send_message(message),
            None => debug!("No terminal, dropping {:.40}", message),
        }
    }

    fn send_to_current_tab(&mut self, message: String) {
        let Some(id) = self.active_tab_id else {
            debug!("No active tab, dropping {:.40}", message);
            return;
        };
        match self.tabs.get_mut(&id) {
            Some(tab) => tab.post_message(message),
            None => debug!("Active tab {} is gone, dropping {:.40}", id, message),
        }
    }

    fn send_tab_state(&mut self, id: TabId) {
        let Some(tab) = self.tabs.get(&id) else {
            return;
        };
        if let Some(message) = json_command("/tab_state", &tab.state()) {
            self.send_to_terminal(message);
        }
    }

    pub fn terminal_connected(&mut self, terminal: Box<dyn MessageSender>) {
        info!("Connected to the terminal");
        self.terminal = Some(terminal);
        if self.is_connected_to_dom {
            self.resume();
        }
    }

    pub fn terminal_disconnected(&mut self) {
        warn!("Lost the terminal connection");
        self.terminal = None;
    }

    /// Bring a reconnected terminal up to date without touching the tabs
    fn resume(&mut self) {
        info!("Resending browser state to the terminal");
        for id in self.tab_ids() {
            self.send_tab_state(id);
        }
        let is_interactive = self
            .active_tab_id
            .and_then(|id| self.tabs.get(&id))
            .is_some_and(|tab| tab.raw_mode.is_none());
        if is_interactive {
            self.send_to_current_tab("/rebuild_text".to_string());
        }
    }

    /// A renderer announced itself; returns the id it should connect with
    pub fn register_tab(&mut self, native_id: Option<TabId>) -> TabId {
        let id = native_id.unwrap_or_else(|| {
            self.next_local_id += 1;
            self.next_local_id
        });
        let native = self.browser.list_tabs().into_iter().find(|t| t.id == id);
        let tab = self.tabs.entry(id).or_insert_with(|| Tab::new(id));
        if let Some(native) = native {
            tab.apply_native(&native);
        }
        info!("Tab {} ({}) registered", id, tab.title);
        if tab.active {
            self.active_tab_id = Some(id);
        }
        self.close_if_interstitial(id);
        id
    }

    /// A registered renderer opened its channel
    pub fn connect_tab(&mut self, id: TabId, channel: Box<dyn MessageSender>) {
        info!("Tab {} connected", id);
        let config = self.config.to_json();
        let tab = self.tabs.entry(id).or_insert_with(|| Tab::new(id));
        tab.connect(channel);
        match config {
            Ok(json) => tab.post_message(format!("/config,{}", json)),
            Err(e) => warn!("Tab {}: {:#}", id, e),
        }
        self.post_tty_size(id);
        let Some(tab) = self.tabs.get_mut(&id) else {
            return;
        };
        let mode = tab.mode_name();
        tab.post_message(format!("/mode,{}", mode));
        self.is_connected_to_dom = true;
    }

    /// Tell a tab the TTY size it renders for
    fn post_tty_size(&mut self, id: TabId) {
        let Some(tab) = self.tabs.get_mut(&id) else {
            return;
        };
        let tty = if tab.raw_mode.is_some() {
            self.dimensions.raw_text_tty
        } else {
            self.dimensions.tty
        };
        tab.post_message(format!("/tty_size,{},{}", tty.width, tty.height));
    }

    pub fn disconnect_tab(&mut self, id: TabId) {
        if let Some(tab) = self.tabs.get_mut(&id) {
            debug!("Tab {} disconnected", id);
            tab.disconnect();
        }
    }

    /// Drop a tab, telling the terminal it is gone
    fn forget_tab(&mut self, id: TabId) {
        let Some(mut tab) = self.tabs.remove(&id) else {
            return;
        };
        tab.removed = true;
        if let Some(message) = json_command("/tab_state", &tab.state()) {
            self.send_to_terminal(message);
        }
        if self.active_tab_id == Some(id) {
            self.active_tab_id = None;
        }
    }

    fn close_if_interstitial(&mut self, id: TabId) -> bool {
        if !self.tabs.get(&id).is_some_and(|t| t.is_interstitial()) {
            return false;
        }
        info!("Removing browser startup page (tab {})", id);
        self.browser.remove_tab(id);
        self.forget_tab(id);
        true
    }

    // ------------------------------------------------------------------
    // Terminal commands
    // ------------------------------------------------------------------

    pub fn handle_terminal_message(&mut self, message: &str, now: Instant) {
        let result = Command::parse(message).and_then(|cmd| self.terminal_command(&cmd, message, now));
        if let Err(e) = result {
            warn!("Terminal: {}", e);
        }
    }

    fn terminal_command(
        &mut self,
        cmd: &Command,
        message: &str,
        now: Instant,
    ) -> Result<(), ProtocolError> {
        match cmd.name() {
            "/tty_size" => {
                let (width, height) = (cmd.int_arg(1)?, cmd.int_arg(2)?);
                let Some(tty) = TtySize::checked(width, height) else {
                    warn!("Ignoring TTY size {}x{}", width, height);
                    return Ok(());
                };
                self.dimensions.tty = tty;
                self.dimensions.resize_browser_window(&mut self.browser);
                if let Some(id) = self.active_tab_id {
                    self.post_tty_size(id);
                }
            }
            "/url_bar" => {
                let url = url_for_input(&cmd.rest(), &self.config.hub.default_search_engine_base);
                self.send_to_current_tab(format!("/url,{}", url));
            }
            "/new_tab" => {
                let url = cmd.rest();
                self.open_tab(&url);
            }
            "/switch_to_tab" => self.switch_to_tab(cmd.id_arg(1)?),
            "/remove_tab" => self.remove_tab(cmd.id_arg(1)?),
            "/duplicate_tab" => {
                let id = cmd.id_arg(1)?;
                self.browser.duplicate_tab(id);
            }
            "/restore_tab" => match self.closed_urls.pop() {
                Some(url) => self.open_tab(&url),
                None => debug!("No closed tab to restore"),
            },
            "/raw_text_request" => {
                let request_id = cmd.arg(1)?.to_string();
                let mode = cmd.arg(2)?;
                let url = cmd.rest_from(3)?;
                self.raw_text_request(request_id, mode, &url, now);
            }
            "/status" => {
                let text = cmd.rest();
                if let Some(id) = self.active_tab_id {
                    if let Some(tab) = self.tabs.get_mut(&id) {
                        tab.update_status("info", &text);
                    }
                    self.send_tab_state(id);
                }
            }
            "/user_agent" => {
                let mobile = cmd.arg(1)? == "mobile";
                let agent = mobile.then(|| self.config.hub.mobile_user_agent.clone());
                self.browser.set_user_agent(agent.as_deref());
            }
            _ => self.send_to_current_tab(message.to_string()),
        }
        Ok(())
    }

    fn open_tab(&mut self, url: &str) {
        let id = self.browser.create_tab(url);
        info!("Opened tab {} for {}", id, url);
        let tab = self.tabs.entry(id).or_insert_with(|| Tab::new(id));
        tab.url = url.to_string();
        self.set_active(id);
    }

    fn set_active(&mut self, id: TabId) {
        for (tab_id, tab) in self.tabs.iter_mut() {
            tab.active = *tab_id == id;
        }
        self.active_tab_id = Some(id);
        self.send_tab_state(id);
    }

    fn switch_to_tab(&mut self, id: TabId) {
        if !self.tabs.contains_key(&id) {
            warn!("Cannot switch to unknown tab {}", id);
            return;
        }
        self.browser.activate_tab(id);
        self.set_active(id);
        // Only the active tab hears resizes
        self.post_tty_size(id);
        self.send_to_current_tab("/rebuild_text".to_string());
    }

    fn remove_tab(&mut self, id: TabId) {
        let Some(tab) = self.tabs.get(&id) else {
            debug!("Tab {} already gone", id);
            return;
        };
        if !tab.url.is_empty() {
            self.closed_urls.push(tab.url.clone());
        }
        self.browser.remove_tab(id);
        self.forget_tab(id);
    }

    fn raw_text_request(&mut self, request_id: String, mode: &str, url: &str, now: Instant) {
        let Some(mode) = RawTextMode::from_name(mode) else {
            warn!("Raw text request {}: unknown mode {:?}", request_id, mode);
            return;
        };
        let id = self.browser.create_tab(url);
        info!("Raw text request {} for {} in tab {}", request_id, url, id);
        let mut tab = Tab::new(id);
        tab.url = url.to_string();
        tab.request_id = Some(request_id);
        tab.raw_mode = Some(mode);
        self.tabs.insert(id, tab);
        let timeout = Duration::from_millis(self.config.http_server.request_timeout);
        self.raw_text_deadlines.push((id, now + timeout));
    }

    // ------------------------------------------------------------------
    // Tab commands
    // ------------------------------------------------------------------

    pub fn handle_tab_message(&mut self, id: TabId, message: &str) {
        let result = Command::parse(message).and_then(|cmd| self.tab_command(id, &cmd, message));
        if let Err(e) = result {
            warn!("Tab {}: {}", id, e);
        }
    }

    fn tab_command(&mut self, id: TabId, cmd: &Command, message: &str) -> Result<(), ProtocolError> {
        match cmd.name() {
            "/frame_text" | "/frame_pixels" | "/frame" => {
                self.send_to_terminal(message.to_string());
            }
            "/tab_info" => {
                let info: TabInfo = cmd.json()?;
                if let Some(tab) = self.tabs.get_mut(&id) {
                    tab.title = info.title;
                    tab.url = info.url;
                }
                self.send_tab_state(id);
            }
            "/status" => {
                let status = cmd.arg(1)?;
                let text = cmd.rest_from(2).unwrap_or_default();
                if let Some(tab) = self.tabs.get_mut(&id) {
                    tab.update_status(status, &text);
                }
                self.send_tab_state(id);
            }
            "/dimensions" => {
                let report: DimensionsReport = cmd.json()?;
                if self.dimensions.set_char(report.char) {
                    self.dimensions.resize_browser_window(&mut self.browser);
                }
            }
            "/raw_text" => self.finish_raw_text(id, cmd.rest()),
            "/log" => info!("Tab {}: {}", id, cmd.rest()),
            "/request_tty_size" => self.post_tty_size(id),
            other => info!("Unknown command from tab {}: {}", id, other),
        }
        Ok(())
    }

    fn finish_raw_text(&mut self, id: TabId, json: String) {
        let request_id = self.tabs.get(&id).and_then(|t| t.request_id.clone());
        match request_id {
            Some(request_id) => {
                let response = RawTextResponse { request_id, json };
                if let Some(message) = json_command("/raw_text", &response) {
                    self.send_to_terminal(message);
                }
            }
            None => warn!("Tab {} sent raw text nobody asked for", id),
        }
        self.browser.remove_tab(id);
        self.forget_tab(id);
        self.raw_text_deadlines.retain(|(tab_id, _)| *tab_id != id);
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    /// Frame loop tick: ask the active tab for a small frame
    pub fn tick_frame(&mut self) {
        if self.is_initial_window_size_pending
            && self.dimensions.resize_browser_window(&mut self.browser)
        {
            self.is_initial_window_size_pending = false;
        }
        if self.is_able_to_request_frame() {
            self.send_to_current_tab("/request_frame".to_string());
        }
    }

    fn is_able_to_request_frame(&self) -> bool {
        if !self.dimensions.tty.is_known() {
            debug!("Not requesting a frame without TTY size");
            return false;
        }
        let Some(tab) = self.active_tab_id.and_then(|id| self.tabs.get(&id)) else {
            debug!("No active tab, so not requesting a frame");
            return false;
        };
        if tab.raw_mode.is_some() {
            return false;
        }
        if !tab.is_connected() {
            debug!("Active tab {} has no channel, so not requesting a frame", tab.id);
            return false;
        }
        true
    }

    /// Poll tick: sync tabs with the browser and run due cleanups
    pub fn poll_tabs(&mut self, now: Instant) {
        let natives = self.browser.list_tabs();
        let mut seen = HashSet::new();
        let max_reloads = self.config.tty.max_tab_reloads;
        for native in &natives {
            seen.insert(native.id);
            let tab = self
                .tabs
                .entry(native.id)
                .or_insert_with(|| Tab::new(native.id));
            tab.apply_native(native);
            if native.active {
                self.active_tab_id = Some(native.id);
            }
            if self.close_if_interstitial(native.id) {
                continue;
            }
            if let Some(tab) = self.tabs.get_mut(&native.id) {
                tab.ensure_connection(&mut self.browser, max_reloads);
            }
        }

        // Only tabs the browser has reported before can vanish from it
        let gone: Vec<TabId> = self
            .tabs
            .values()
            .filter(|t| t.is_native_known() && !seen.contains(&t.id))
            .map(|t| t.id)
            .collect();
        for id in gone {
            debug!("Tab {} closed in the browser", id);
            self.forget_tab(id);
        }

        self.expire_raw_text_requests(now);
    }

    fn expire_raw_text_requests(&mut self, now: Instant) {
        let (due, pending): (Vec<_>, Vec<_>) = self
            .raw_text_deadlines
            .drain(..)
            .partition(|(_, deadline)| *deadline <= now);
        self.raw_text_deadlines = pending;
        for (id, _) in due {
            // Answered requests already closed their tab
            if self.tabs.contains_key(&id) {
                warn!("Raw text request in tab {} timed out, closing it", id);
                self.browser.remove_tab(id);
                self.forget_tab(id);
            }
        }
    }

    /// Apply an edited config and pass it on to every connected tab
    pub fn reload_config(&mut self, config: Config) {
        info!("Config reloaded");
        self.dimensions.apply_config(&config);
        let json = config.to_json();
        self.config = config;
        match json {
            Ok(json) => {
                for tab in self.tabs.values_mut().filter(|t| t.is_connected()) {
                    tab.post_message(format!("/config,{}", json));
                }
            }
            Err(e) => warn!("{:#}", e),
        }
    }
}

/// Turn URL bar text into a URL, searching when it doesn't look like one
pub fn url_for_input(input: &str, search_base: &str) -> String {
    let input = input.trim();
    if input.contains("://") || input.starts_with("about:") {
        return input.to_string();
    }
    let looks_like_host = input.contains('.') || input.starts_with("localhost");
    if looks_like_host && !input.contains(char::is_whitespace) {
        return format!("http://{}", input);
    }
    format!("{}{}", search_base, encode_query(input))
}

fn encode_query(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

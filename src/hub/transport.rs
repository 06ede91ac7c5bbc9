//! Hub event loop and sockets
//!
//! The hub dials out to the terminal's WebSocket server and listens for
//! renderer and driver links. Every socket runs in its own task and talks to
//! the single hub loop over one event channel, so the [`Hub`] itself never
//! sees a socket.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, sleep, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};

use super::manager::Hub;
use super::protocol::{json_command, BrowserCommand, Command, MessageSender, NativeTabs};
use crate::config::{Config, ConfigWatcher, TtyConfig};
use crate::constants::{RECONNECT_INITIAL_DELAY_MS, RECONNECT_MAX_DELAY_MS};
use crate::host::{BrowserHost, NativeStatus, NativeTab, TabId};

/// Renderer/driver connection id, local to this process
pub type LinkId = u64;

/// Ids handed out for tabs the hub asks the driver to create
const CREATED_TAB_ID_BASE: TabId = 1 << 32;

/// Everything the socket tasks report to the hub loop
#[derive(Debug)]
pub enum HubEvent {
    TerminalConnected(UnboundedSender<String>),
    TerminalMessage(String),
    TerminalDisconnected,
    LinkOpened(LinkId, UnboundedSender<String>),
    LinkMessage(LinkId, String),
    LinkClosed(LinkId),
}

// ============================================================================
// Remote browser
// ============================================================================

/// Browser control through a driver link.
///
/// The driver pushes `/native_tabs,<json>` whenever the browser's tabs
/// change and receives `/browser,<json>` actions. Actions issued before a
/// driver attaches are queued.
#[derive(Debug, Default)]
pub struct RemoteBrowser {
    driver: Option<UnboundedSender<String>>,
    queued: Vec<String>,
    tabs: Vec<NativeTab>,
    next_id: TabId,
}

impl RemoteBrowser {
    pub fn new() -> Self {
        Self {
            next_id: CREATED_TAB_ID_BASE,
            ..Default::default()
        }
    }

    pub fn is_attached(&self) -> bool {
        self.driver.is_some()
    }

    pub fn attach_driver(&mut self, mut driver: UnboundedSender<String>) {
        info!("Browser driver attached ({} queued actions)", self.queued.len());
        for message in self.queued.drain(..) {
            driver.send_message(message);
        }
        self.driver = Some(driver);
    }

    pub fn detach_driver(&mut self) {
        warn!("Browser driver detached");
        self.driver = None;
    }

    /// Replace the cached tab list with the driver's latest report
    pub fn update_tabs(&mut self, tabs: NativeTabs) {
        self.tabs = tabs;
    }

    fn send(&mut self, command: BrowserCommand) {
        let Some(message) = json_command("/browser", &command) else {
            return;
        };
        match self.driver.as_mut() {
            Some(driver) => driver.send_message(message),
            None => self.queued.push(message),
        }
    }
}

impl BrowserHost for RemoteBrowser {
    fn list_tabs(&mut self) -> Vec<NativeTab> {
        self.tabs.clone()
    }

    fn reload_tab(&mut self, id: TabId) {
        self.send(BrowserCommand::Reload { id });
    }

    fn remove_tab(&mut self, id: TabId) {
        self.tabs.retain(|t| t.id != id);
        self.send(BrowserCommand::Remove { id });
    }

    fn create_tab(&mut self, url: &str) -> TabId {
        self.next_id += 1;
        let id = self.next_id;
        // Provisional until the driver reports it
        self.tabs.push(NativeTab {
            id,
            url: url.to_string(),
            status: NativeStatus::Loading,
            ..Default::default()
        });
        self.send(BrowserCommand::Create {
            id,
            url: url.to_string(),
        });
        id
    }

    fn duplicate_tab(&mut self, id: TabId) {
        self.send(BrowserCommand::Duplicate { id });
    }

    fn activate_tab(&mut self, id: TabId) {
        for tab in &mut self.tabs {
            tab.active = tab.id == id;
        }
        self.send(BrowserCommand::Activate { id });
    }

    fn resize_window(&mut self, width: i64, height: i64) {
        self.send(BrowserCommand::Resize { width, height });
    }

    fn set_user_agent(&mut self, user_agent: Option<&str>) {
        self.send(BrowserCommand::UserAgent {
            user_agent: user_agent.map(str::to_string),
        });
    }
}

// ============================================================================
// Link routing
// ============================================================================

/// What a link turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Connected but not yet identified
    Pending,
    Driver,
    Tab(TabId),
}

/// Open renderer and driver links
#[derive(Default)]
pub struct Links {
    links: HashMap<LinkId, (LinkRole, UnboundedSender<String>)>,
}

impl Links {
    pub fn opened(&mut self, link: LinkId, sender: UnboundedSender<String>) {
        debug!("Link {} opened", link);
        self.links.insert(link, (LinkRole::Pending, sender));
    }

    pub fn role(&self, link: LinkId) -> Option<LinkRole> {
        self.links.get(&link).map(|(role, _)| *role)
    }

    pub fn message(&mut self, hub: &mut Hub<RemoteBrowser>, link: LinkId, message: &str) {
        let Some((role, sender)) = self.links.get_mut(&link) else {
            debug!("Message on unknown link {}", link);
            return;
        };
        let current = *role;
        match current {
            LinkRole::Tab(id) => hub.handle_tab_message(id, message),
            LinkRole::Driver => driver_message(hub, message),
            LinkRole::Pending => {
                let cmd = match Command::parse(message) {
                    Ok(cmd) => cmd,
                    Err(e) => {
                        warn!("Link {}: {}", link, e);
                        return;
                    }
                };
                match cmd.name() {
                    "/register" => {
                        let id = hub.register_tab(cmd.id_arg(1).ok());
                        sender.send_message(format!("/registered,{}", id));
                    }
                    "/connect" => match cmd.id_arg(1) {
                        Ok(id) => {
                            *role = LinkRole::Tab(id);
                            hub.connect_tab(id, Box::new(sender.clone()));
                        }
                        Err(e) => warn!("Link {}: {}", link, e),
                    },
                    "/driver" => {
                        *role = LinkRole::Driver;
                        hub.browser_mut().attach_driver(sender.clone());
                    }
                    other => warn!("Link {} sent {} before identifying itself", link, other),
                }
            }
        }
    }

    pub fn closed(&mut self, hub: &mut Hub<RemoteBrowser>, link: LinkId) {
        match self.links.remove(&link).map(|(role, _)| role) {
            Some(LinkRole::Tab(id)) => hub.disconnect_tab(id),
            Some(LinkRole::Driver) => hub.browser_mut().detach_driver(),
            Some(LinkRole::Pending) | None => debug!("Link {} closed", link),
        }
    }
}

fn driver_message(hub: &mut Hub<RemoteBrowser>, message: &str) {
    let cmd = match Command::parse(message) {
        Ok(cmd) => cmd,
        Err(e) => {
            warn!("Driver: {}", e);
            return;
        }
    };
    match cmd.name() {
        "/native_tabs" => match cmd.json::<NativeTabs>() {
            Ok(tabs) => hub.browser_mut().update_tabs(tabs),
            Err(e) => warn!("Driver: {}", e),
        },
        "/log" => info!("Driver: {}", cmd.rest()),
        other => info!("Unknown command from driver: {}", other),
    }
}

// ============================================================================
// Event loop
// ============================================================================

/// Frame and poll ticks, rebuilt when their configured periods change
struct Timers {
    frame: Interval,
    poll: Interval,
}

impl Timers {
    fn new(tty: &TtyConfig) -> Self {
        Self {
            frame: ticker(tty.small_pixel_frame_rate),
            poll: ticker(tty.tab_poll_interval),
        }
    }

    /// Returns true if any timer was rebuilt
    fn apply(&mut self, tty: &TtyConfig) -> bool {
        let mut changed = false;
        if self.frame.period() != period(tty.small_pixel_frame_rate) {
            info!("Frame interval now {}ms", tty.small_pixel_frame_rate);
            self.frame = ticker(tty.small_pixel_frame_rate);
            changed = true;
        }
        if self.poll.period() != period(tty.tab_poll_interval) {
            info!("Tab poll interval now {}ms", tty.tab_poll_interval);
            self.poll = ticker(tty.tab_poll_interval);
            changed = true;
        }
        changed
    }
}

fn period(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

fn ticker(ms: u64) -> Interval {
    let mut timer = interval(period(ms));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Run the hub until the process is stopped
pub async fn run_hub(config: Config, config_path: Option<PathBuf>) -> Result<()> {
    let (events_tx, mut events) = unbounded_channel();

    let listener = TcpListener::bind(&config.hub.renderer_bind)
        .await
        .with_context(|| format!("Failed to listen on {}", config.hub.renderer_bind))?;
    info!("Listening for renderers on {}", config.hub.renderer_bind);
    tokio::spawn(accept_links(listener, events_tx.clone()));
    tokio::spawn(connect_terminal(
        config.hub.terminal_url.clone(),
        events_tx.clone(),
    ));

    let watcher = config_path.and_then(|path| match ConfigWatcher::new(&path) {
        Ok(watcher) => Some((watcher, path)),
        Err(e) => {
            warn!("Config hot reload disabled: {:#}", e);
            None
        }
    });

    let mut timers = Timers::new(&config.tty);

    let startup_url = config.hub.startup_url.clone();
    let mut hub = Hub::new(RemoteBrowser::new(), config);
    let mut links = Links::default();
    if !startup_url.is_empty() {
        hub.handle_terminal_message(&format!("/new_tab,{}", startup_url), Instant::now());
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                handle_event(&mut hub, &mut links, event);
            }
            _ = timers.frame.tick() => hub.tick_frame(),
            _ = timers.poll.tick() => {
                hub.poll_tabs(Instant::now());
                if let Some((watcher, path)) = &watcher {
                    if watcher.check_reload() {
                        match Config::load_from_file(path) {
                            Ok(config) => {
                                timers.apply(&config.tty);
                                hub.reload_config(config);
                            }
                            Err(e) => warn!("Keeping the old config: {:#}", e),
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn handle_event(hub: &mut Hub<RemoteBrowser>, links: &mut Links, event: HubEvent) {
    match event {
        HubEvent::TerminalConnected(sender) => hub.terminal_connected(Box::new(sender)),
        HubEvent::TerminalMessage(message) => hub.handle_terminal_message(&message, Instant::now()),
        HubEvent::TerminalDisconnected => hub.terminal_disconnected(),
        HubEvent::LinkOpened(link, sender) => links.opened(link, sender),
        HubEvent::LinkMessage(link, message) => links.message(hub, link, &message),
        HubEvent::LinkClosed(link) => links.closed(hub, link),
    }
}

/// Keep a connection to the terminal, backing off while it is away
async fn connect_terminal(url: String, events: UnboundedSender<HubEvent>) {
    let mut delay = RECONNECT_INITIAL_DELAY_MS;
    loop {
        match connect_async(url.as_str()).await {
            Ok((ws, _)) => {
                delay = RECONNECT_INITIAL_DELAY_MS;
                let (tx, rx) = unbounded_channel();
                if events.send(HubEvent::TerminalConnected(tx)).is_err() {
                    return;
                }
                pump(ws, rx, |message| {
                    events.send(HubEvent::TerminalMessage(message)).is_ok()
                })
                .await;
                if events.send(HubEvent::TerminalDisconnected).is_err() {
                    return;
                }
            }
            Err(e) => debug!("Terminal not reachable at {}: {}", url, e),
        }
        sleep(Duration::from_millis(delay)).await;
        delay = next_backoff(delay);
    }
}

fn next_backoff(delay: u64) -> u64 {
    delay.saturating_mul(2).min(RECONNECT_MAX_DELAY_MS)
}

async fn accept_links(listener: TcpListener, events: UnboundedSender<HubEvent>) {
    let mut next_link: LinkId = 0;
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                next_link += 1;
                debug!("Link {} from {}", next_link, addr);
                tokio::spawn(serve_link(next_link, stream, events.clone()));
            }
            Err(e) => warn!("Accept failed: {}", e),
        }
    }
}

async fn serve_link(link: LinkId, stream: TcpStream, events: UnboundedSender<HubEvent>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Link {} handshake failed: {}", link, e);
            return;
        }
    };
    let (tx, rx) = unbounded_channel();
    if events.send(HubEvent::LinkOpened(link, tx)).is_err() {
        return;
    }
    pump(ws, rx, |message| {
        events.send(HubEvent::LinkMessage(link, message)).is_ok()
    })
    .await;
    let _ = events.send(HubEvent::LinkClosed(link));
}

/// Shuttle text frames both ways until either side goes away.
///
/// `incoming` returns false once nobody is listening any more.
async fn pump<S>(
    ws: WebSocketStream<S>,
    mut outgoing: UnboundedReceiver<String>,
    mut incoming: impl FnMut(String) -> bool,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws.split();
    loop {
        tokio::select! {
            message = outgoing.recv() => {
                let Some(message) = message else {
                    break;
                };
                if let Err(e) = ws_tx.send(Message::Text(message)).await {
                    debug!("Send failed: {}", e);
                    break;
                }
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !incoming(text) {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Receive failed: {}", e);
                    break;
                }
            },
        }
    }
    let _ = ws_tx.close().await;
}

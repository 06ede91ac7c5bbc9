//! Hub and tab renderer wired together over in-memory links

use std::time::Instant;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use termweb::config::Config;
use termweb::dom::serialise::TextFrame;
use termweb::dom::TabRenderer;
use termweb::host::mock::{BrowserCall, MockBrowser, MockDom};
use termweb::host::{NativeStatus, NativeTab, Rect, Size};
use termweb::hub::protocol::TabState;
use termweb::hub::Hub;
use termweb::utils::Rgb;

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

fn config() -> Config {
    let mut config = Config::default();
    config.render.char_height_fudge = 0.0;
    config
}

fn page() -> MockDom {
    let mut host = MockDom::new(Size::new(2.0, 4.0), Size::new(40.0, 40.0));
    host.page
        .paint(Rect::new(0.0, 0.0, 10.0, 4.0), Rgb::BLACK, true);
    host.add_text(1, "hello", vec![Rect::new(0.0, 0.0, 10.0, 4.0)]);
    host.title = "Hello".to_string();
    host.location = "https://example.com/".to_string();
    host
}

struct Rig {
    hub: Hub<MockBrowser>,
    renderer: TabRenderer<MockDom, Vec<String>>,
    terminal: UnboundedReceiver<String>,
    tab: UnboundedReceiver<String>,
}

impl Rig {
    fn new(now: Instant) -> Self {
        let mut browser = MockBrowser::new();
        browser.upsert(NativeTab {
            id: 7,
            title: "Hello".to_string(),
            url: "https://example.com/".to_string(),
            active: true,
            status: NativeStatus::Complete,
        });
        let mut hub = Hub::new(browser, config());
        let (terminal_tx, terminal) = unbounded_channel();
        hub.terminal_connected(Box::new(terminal_tx));
        hub.handle_terminal_message("/tty_size,20,10", now);

        let id = hub.register_tab(Some(7));
        let (tab_tx, tab) = unbounded_channel();
        hub.connect_tab(id, Box::new(tab_tx));
        let renderer = TabRenderer::new(page(), Vec::new(), id, config(), now);
        Self {
            hub,
            renderer,
            terminal,
            tab,
        }
    }

    /// Deliver everything queued in both directions until quiet
    fn settle(&mut self, now: Instant) {
        loop {
            let to_tab = drain(&mut self.tab);
            let to_hub: Vec<String> = self.renderer.sender_mut().drain(..).collect();
            if to_tab.is_empty() && to_hub.is_empty() {
                break;
            }
            for message in to_tab {
                self.renderer.handle_message(&message, now);
            }
            for message in to_hub {
                self.hub.handle_tab_message(7, &message);
            }
        }
    }
}

fn command(message: &str) -> &str {
    message.split(',').next().unwrap_or("")
}

#[test]
fn test_first_frames_reach_terminal() {
    let now = Instant::now();
    let mut rig = Rig::new(now);
    rig.settle(now);

    let sent = drain(&mut rig.terminal);
    let names: Vec<&str> = sent.iter().map(|m| command(m)).collect();
    assert_eq!(names, vec!["/frame_text", "/frame_pixels"]);

    let frame: TextFrame = serde_json::from_str(sent[0].split_once(',').unwrap().1).unwrap();
    assert_eq!(frame.meta.id, 7);
    assert_eq!(frame.text[..5].join(""), "hello");

    // Measured character (2x4) sizes the window: 20 cols, (10 - 2 + 3) rows
    assert_eq!(rig.hub.browser().calls, vec![BrowserCall::Resize(40, 44)]);
}

#[test]
fn test_frame_loop_reports_parsing_complete() {
    let now = Instant::now();
    let mut rig = Rig::new(now);
    rig.settle(now);
    drain(&mut rig.terminal);

    rig.hub.tick_frame();
    rig.settle(now);
    let sent = drain(&mut rig.terminal);
    let names: Vec<&str> = sent.iter().map(|m| command(m)).collect();
    assert_eq!(names, vec!["/frame_pixels", "/tab_state", "/tab_state"]);

    let last: TabState = serde_json::from_str(sent[2].split_once(',').unwrap().1).unwrap();
    assert_eq!(last.page_state, "parsing_complete");
    assert_eq!(last.status_message, "");
    assert_eq!(last.title, "Hello");

    // Later ticks only carry pixels and tab info
    rig.hub.tick_frame();
    rig.settle(now);
    let names: Vec<String> = drain(&mut rig.terminal)
        .iter()
        .map(|m| command(m).to_string())
        .collect();
    assert_eq!(names, vec!["/frame_pixels", "/tab_state"]);
}

#[test]
fn test_url_bar_navigates_active_tab() {
    let now = Instant::now();
    let mut rig = Rig::new(now);
    rig.settle(now);

    rig.hub.handle_terminal_message("/url_bar,example.org", now);
    rig.settle(now);
    assert_eq!(
        rig.renderer.host().calls_matching("navigate:"),
        vec!["navigate:http://example.org"]
    );
}

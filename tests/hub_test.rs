//! Hub behaviour across terminal drops and misbehaving tabs

use std::time::Instant;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use termweb::config::Config;
use termweb::host::mock::{BrowserCall, MockBrowser};
use termweb::host::{NativeStatus, NativeTab, TabId};
use termweb::hub::Hub;

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

fn native(id: TabId, status: NativeStatus) -> NativeTab {
    NativeTab {
        id,
        title: format!("Tab {}", id),
        url: format!("https://example.com/{}", id),
        active: id == 1,
        status,
    }
}

#[test]
fn test_terminal_reconnect_resumes_without_reregistering() {
    let mut browser = MockBrowser::new();
    browser.upsert(native(1, NativeStatus::Complete));
    browser.upsert(native(2, NativeStatus::Complete));
    let mut hub = Hub::new(browser, Config::default());

    let (terminal_tx, mut terminal) = unbounded_channel();
    hub.terminal_connected(Box::new(terminal_tx));
    let mut tabs = Vec::new();
    for id in [1, 2] {
        hub.register_tab(Some(id));
        let (tx, rx) = unbounded_channel();
        hub.connect_tab(id, Box::new(tx));
        tabs.push(rx);
    }
    for rx in &mut tabs {
        drain(rx);
    }
    assert!(drain(&mut terminal).is_empty());

    hub.terminal_disconnected();
    assert!(!hub.is_terminal_connected());
    hub.handle_tab_message(1, "/frame_pixels,{}");

    let (terminal_tx, mut terminal) = unbounded_channel();
    hub.terminal_connected(Box::new(terminal_tx));

    // Cached state for every tab, no setup resent to tabs
    let sent = drain(&mut terminal);
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|m| m.starts_with("/tab_state,")));
    assert!(sent[0].contains(r#""id":1"#));
    assert!(sent[1].contains(r#""id":2"#));

    // Only the active tab is asked for fresh text
    assert_eq!(drain(&mut tabs[0]), vec!["/rebuild_text"]);
    assert!(drain(&mut tabs[1]).is_empty());
    assert_eq!(hub.tab_ids(), vec![1, 2]);
}

#[test]
fn test_terminal_before_any_tab_gets_nothing() {
    let mut hub = Hub::new(MockBrowser::new(), Config::default());
    let (terminal_tx, mut terminal) = unbounded_channel();
    hub.terminal_connected(Box::new(terminal_tx));
    assert!(drain(&mut terminal).is_empty());
}

#[test]
fn test_unconnected_tab_reload_ceiling() {
    let mut browser = MockBrowser::new();
    browser.upsert(native(5, NativeStatus::Complete));
    let mut hub = Hub::new(browser, Config::default());

    let now = Instant::now();
    for _ in 0..10 {
        hub.poll_tabs(now);
        // The browser reports the reload finishing each time
        hub.browser_mut().upsert(native(5, NativeStatus::Complete));
    }
    assert_eq!(hub.browser().reload_count(5), 3);
    assert_eq!(hub.tab(5).map(|t| t.reload_count()), Some(3));
}

#[test]
fn test_loading_tab_not_reloaded() {
    let mut browser = MockBrowser::new();
    browser.upsert(native(5, NativeStatus::Loading));
    let mut hub = Hub::new(browser, Config::default());
    for _ in 0..5 {
        hub.poll_tabs(Instant::now());
    }
    assert_eq!(hub.browser().reload_count(5), 0);
}

#[test]
fn test_connected_tab_never_reloaded() {
    let mut browser = MockBrowser::new();
    browser.upsert(native(1, NativeStatus::Complete));
    let mut hub = Hub::new(browser, Config::default());
    hub.register_tab(Some(1));
    let (tx, _rx) = unbounded_channel();
    hub.connect_tab(1, Box::new(tx));
    for _ in 0..5 {
        hub.poll_tabs(Instant::now());
    }
    assert!(!hub
        .browser()
        .calls
        .iter()
        .any(|c| matches!(c, BrowserCall::Reload(_))));
}

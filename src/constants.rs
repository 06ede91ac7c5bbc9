//! Global constants for termweb
//!
//! Consolidates timing, geometry, and protocol constants
//! to keep magic numbers out of the pipeline code.

#![allow(dead_code)]

// ============================================================================
// Timing Constants
// ============================================================================

/// Interval between small pixel frame requests to the active tab (ms)
pub const SMALL_PIXEL_FRAME_RATE_MS: u64 = 250;

/// Interval between native tab polls (ms)
pub const TAB_POLL_INTERVAL_MS: u64 = 100;

/// Interval at which a pending DOM mutation is turned into a text rebuild (ms)
pub const MUTATION_DRAIN_INTERVAL_MS: u64 = 100;

/// Delay before parsing text for a raw text request (ms)
pub const RAW_TEXT_RENDER_DELAY_MS: u64 = 400;

/// Time after which an unanswered raw text request's tab is closed (ms)
pub const RAW_TEXT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Delay before a text frame is sent after a mouse button goes down (ms)
pub const MOUSEDOWN_TEXT_FRAME_DELAY_MS: u64 = 500;

/// First terminal reconnect delay (ms)
pub const RECONNECT_INITIAL_DELAY_MS: u64 = 50;

/// Terminal reconnect delay ceiling (ms)
pub const RECONNECT_MAX_DELAY_MS: u64 = 2_000;

// ============================================================================
// Geometry Constants
// ============================================================================

/// Extra height added to the measured character box.
///
/// Unexplained, but pages render closer to the terminal with it.
pub const CHAR_HEIGHT_FUDGE: f64 = 4.0;

/// Fraction of a character cell at which its colour is sampled
pub const MIDDLE_OF_EM: f64 = 0.5;

/// Big sub-frame size as a multiple of the TTY size in every direction
pub const BIG_SUB_FRAME_FACTOR: i64 = 6;

/// Extra character rows added to the browser window height.
///
/// The window height is not the viewport height; this roughly covers the gap.
pub const WINDOW_UI_ROWS: f64 = 3.0;

/// TTY rows taken by the terminal-side UI (tab bar and URL bar)
pub const TTY_UI_ROWS: i64 = 2;

/// Largest TTY width or height accepted from the terminal
pub const MAX_TTY_SIDE: i64 = 4096;

/// Maximum automatic reloads for a tab that loads but never connects
pub const MAX_TAB_RELOADS: u32 = 3;

// ============================================================================
// Glyphs
// ============================================================================

/// Lower half block: background colour is the upper pixel, foreground the lower
pub const HALF_BLOCK: &str = "\u{2584}";

/// Padding emitted after the first column of a wide glyph
pub const WIDE_GLYPH_PADDING: &str = " ";

// ============================================================================
// Raw Text Service
// ============================================================================

/// Default raw text TTY width
pub const RAW_TEXT_COLUMNS: i64 = 100;

/// Default raw text TTY height
pub const RAW_TEXT_ROWS: i64 = 30;

/// Default JPEG quality for the HTML background image
pub const RAW_TEXT_JPEG_QUALITY: u8 = 90;

/// Default maximum raw text rows before the page is truncated
pub const RAW_TEXT_MAX_ROWS: i64 = 10_000;

// ============================================================================
// Browser
// ============================================================================

/// Default terminal-side WebSocket server
pub const DEFAULT_TERMINAL_URL: &str = "ws://localhost:3334";

/// Default listen address for renderer and driver connections
pub const DEFAULT_RENDERER_BIND: &str = "127.0.0.1:3335";

/// Mobile user agent for forcing mobile layouts
pub const MOBILE_USER_AGENT: &str =
    "Mozilla/5.0 (Android 7.0; Mobile; rv:54.0) Gecko/58.0 Firefox/58.0";

/// Titles of browser startup tabs that are closed on sight
pub const STARTUP_INTERSTITIAL_TITLES: &[&str] = &[
    "Firefox by default shares data to:",
    "Firefox Privacy Notice",
];

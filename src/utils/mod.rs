//! Utility functions shared across termweb
//!
//! Grid rounding helpers and colour handling.

pub mod color;

pub use color::{parse_css_color, parse_hex_color, Rgb};

/// Round half up onto the integer grid: `floor(x + 0.5)`
///
/// Every DOM to TTY conversion goes through here so that identical
/// measurements always land on identical cells.
#[inline]
pub fn snap(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Force a height to be even, truncating any fraction first.
///
/// Two logical pixel rows pack into one TTY row.
#[inline]
pub fn ensure_even(x: f64) -> i64 {
    let n = x.trunc() as i64;
    if n % 2 == 0 {
        n
    } else {
        n.checked_add(1).unwrap_or(n - 1)
    }
}

/// Rebuild the arguments of a comma separated command into one string.
///
/// Payloads (JSON, URLs) may themselves contain commas.
pub fn rejoin_args(parts: &[&str]) -> String {
    parts.get(1..).map(|rest| rest.join(",")).unwrap_or_default()
}

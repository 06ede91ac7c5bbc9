//! Colour types and parsing
//!
//! RGB triples as sampled from screenshots, plus CSS computed-colour parsing
//! and true-colour escape sequences.

use serde::{Deserialize, Serialize};

/// A single 24-bit colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Read the RGB part of a 4-byte RGBA pixel starting at `offset`
    pub fn from_rgba(pixels: &[u8], offset: usize) -> Option<Self> {
        let px = pixels.get(offset..offset + 3)?;
        Some(Self::new(px[0], px[1], px[2]))
    }

    /// Components as an array, in wire order
    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// True-colour foreground escape sequence
    pub fn ansi_fg(self) -> String {
        format!("\x1b[38;2;{};{};{}m", self.r, self.g, self.b)
    }

    /// True-colour background escape sequence
    pub fn ansi_bg(self) -> String {
        format!("\x1b[48;2;{};{};{}m", self.r, self.g, self.b)
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

/// Parse 6-digit hex color (e.g., "ff0000" -> (255, 0, 0))
/// Also supports 3-digit short format (e.g., "f00" -> (255, 0, 0))
/// Returns None on invalid input.
pub fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    match hex.len() {
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some((r, g, b))
        }
        3 => {
            // Short format: expand F -> FF
            let r = u8::from_str_radix(&hex[0..1], 16).ok()? * 17;
            let g = u8::from_str_radix(&hex[1..2], 16).ok()? * 17;
            let b = u8::from_str_radix(&hex[2..3], 16).ok()? * 17;
            Some((r, g, b))
        }
        _ => None,
    }
}

/// Parse a computed CSS colour.
///
/// Supported formats:
/// - rgb(R, G, B)
/// - rgba(R, G, B, A) (alpha ignored)
/// - #RRGGBB / #RGB
pub fn parse_css_color(css: &str) -> Option<Rgb> {
    let css = css.trim();
    if css.starts_with('#') {
        return parse_hex_color(css).map(Rgb::from);
    }

    let inner = css
        .strip_prefix("rgba(")
        .or_else(|| css.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let mut parts = inner.split(',').map(|p| p.trim());

    let mut component = || -> Option<u8> {
        let v: f64 = parts.next()?.parse().ok()?;
        Some(v.round().clamp(0.0, 255.0) as u8)
    };
    let r = component()?;
    let g = component()?;
    let b = component()?;
    Some(Rgb::new(r, g, b))
}

//! TTY cell
//!
//! One character position on the grid.

use smol_str::SmolStr;
use unicode_width::UnicodeWidthStr;

use crate::host::{ElementId, Point};
use crate::utils::Rgb;

/// Position on the TTY grid, in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TtyCoords {
    pub x: i64,
    pub y: i64,
}

/// A character placed on the grid
#[derive(Debug, Clone, PartialEq)]
pub struct TtyCell {
    /// One grapheme cluster, or empty
    pub rune: SmolStr,
    pub fg: Rgb,
    pub bg: Rgb,
    pub tty_coords: TtyCoords,
    /// Absolute DOM position before snapping, for mapping clicks back
    pub dom_coords: Point,
    /// Containing element, for layering
    pub parent: ElementId,
    /// `y * frame.width + x`
    pub index: usize,
}

impl TtyCell {
    pub fn new(rune: &str, tty_coords: TtyCoords, dom_coords: Point, parent: ElementId) -> Self {
        Self {
            rune: SmolStr::new(rune),
            fg: Rgb::BLACK,
            bg: Rgb::BLACK,
            tty_coords,
            dom_coords,
            parent,
            index: 0,
        }
    }

    /// Empty or whitespace; the graphics layer shows through
    pub fn is_transparent(&self) -> bool {
        self.rune.trim().is_empty()
    }

    /// Columns the glyph occupies in a terminal
    pub fn display_width(&self) -> usize {
        glyph_width(&self.rune)
    }
}

/// Terminal columns of a grapheme, at least one for anything printable
pub fn glyph_width(glyph: &str) -> usize {
    if glyph.is_empty() {
        return 0;
    }
    UnicodeWidthStr::width(glyph).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency() {
        let at = TtyCoords::default();
        let p = Point::default();
        assert!(TtyCell::new("", at, p, 1).is_transparent());
        assert!(TtyCell::new(" ", at, p, 1).is_transparent());
        assert!(!TtyCell::new("a", at, p, 1).is_transparent());
    }

    #[test]
    fn test_glyph_width() {
        assert_eq!(glyph_width("a"), 1);
        assert_eq!(glyph_width("漢"), 2);
        assert_eq!(glyph_width(""), 0);
        // Combining mark alone still takes a cell
        assert_eq!(glyph_width("\u{0301}"), 1);
    }
}

//! TTY grid
//!
//! Sparse map from linear cell index to the character that owns the cell.
//! Decides which of several characters competing for a cell wins, and drops
//! characters that the screenshots say are hidden behind something opaque.

use std::collections::{HashMap, HashSet};

use log::trace;

use super::cell::TtyCell;
use super::dimensions::Dimensions;
use super::graphics::Screenshot;
use crate::config::RenderConfig;
use crate::host::{DomHost, ElementId, ElementStyle, Size};
use crate::utils::{snap, Rgb};

/// Computed styles captured once per build, keyed by element
#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    styles: HashMap<ElementId, ElementStyle>,
}

impl StyleTable {
    /// Snapshot the styles of the given elements
    pub fn capture(host: &dyn DomHost, elements: impl IntoIterator<Item = ElementId>) -> Self {
        let mut styles = HashMap::new();
        for element in elements {
            styles
                .entry(element)
                .or_insert_with(|| host.element_style(element));
        }
        Self { styles }
    }

    pub fn insert(&mut self, element: ElementId, style: ElementStyle) {
        self.styles.insert(element, style);
    }

    pub fn get(&self, element: ElementId) -> Option<&ElementStyle> {
        self.styles.get(&element)
    }

    fn z_index(&self, element: ElementId) -> i32 {
        self.styles.get(&element).map(|s| s.z_index).unwrap_or(0)
    }

    fn is_hidden(&self, element: ElementId) -> bool {
        self.styles.get(&element).map(|s| s.hidden).unwrap_or(false)
    }

    /// Whether a challenger element should replace the incumbent's character.
    ///
    /// Hidden incumbents always lose, hidden challengers never win, otherwise
    /// the higher z-index wins and a tie goes to the later character.
    pub fn is_above(&self, challenger: ElementId, incumbent: ElementId) -> bool {
        if self.is_hidden(incumbent) {
            return true;
        }
        if self.is_hidden(challenger) {
            return false;
        }
        self.z_index(challenger) >= self.z_index(incumbent)
    }
}

/// Both screenshots a build samples colours from
#[derive(Debug, Clone, Copy)]
pub struct Samples<'a> {
    pub with_text: &'a Screenshot,
    pub without_text: &'a Screenshot,
}

/// The grid of characters for one build
#[derive(Debug, Clone, Default)]
pub struct TtyGrid {
    cells: HashMap<usize, TtyCell>,
    frame_width: i64,
    char: Size,
    middle_of_em: f64,
    use_text_visibility: bool,
}

impl TtyGrid {
    pub fn new(dims: &Dimensions, render: &RenderConfig) -> Self {
        Self {
            cells: HashMap::new(),
            frame_width: dims.frame.width,
            char: dims.char,
            middle_of_em: render.middle_of_em,
            use_text_visibility: render.use_text_visibility,
        }
    }

    pub fn frame_width(&self) -> i64 {
        self.frame_width
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: usize) -> Option<&TtyCell> {
        self.cells.get(&index)
    }

    pub fn cell_at(&self, x: i64, y: i64) -> Option<&TtyCell> {
        self.index_of(x, y).and_then(|i| self.cells.get(&i))
    }

    pub fn cells(&self) -> impl Iterator<Item = &TtyCell> {
        self.cells.values()
    }

    /// Elements owning at least one committed cell
    pub fn elements(&self) -> HashSet<ElementId> {
        self.cells.values().map(|c| c.parent).collect()
    }

    fn index_of(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.frame_width {
            return None;
        }
        Some((y * self.frame_width + x) as usize)
    }

    /// Offer a character to the grid; returns whether it was committed
    pub fn add_cell(&mut self, mut candidate: TtyCell, samples: Samples, styles: &StyleTable) -> bool {
        let Some(index) = self.index_of(candidate.tty_coords.x, candidate.tty_coords.y) else {
            trace!(
                "Cell {:?} outside the frame, dropped",
                candidate.tty_coords
            );
            return false;
        };
        candidate.index = index;

        if let Some(incumbent) = self.cells.get(&index) {
            if !styles.is_above(candidate.parent, incumbent.parent) {
                return false;
            }
        }

        let Some((fg, bg)) = self.sample_colours(&candidate, samples) else {
            return false;
        };
        if self.use_text_visibility && fg == bg {
            // Text pixels identical with and without text: something covers it.
            // Also true when another character covers it.
            trace!("Obscured character {:?} at {}", candidate.rune, index);
            return false;
        }
        candidate.fg = fg;
        candidate.bg = bg;
        self.cells.insert(index, candidate);
        true
    }

    /// Colours at the middle of the character, with and without text
    fn sample_colours(&self, cell: &TtyCell, samples: Samples) -> Option<(Rgb, Rgb)> {
        let x = snap(cell.dom_coords.x + self.char.width * self.middle_of_em);
        let y = snap(cell.dom_coords.y + self.char.height * self.middle_of_em);
        let fg = samples.with_text.unscaled_pixel_at(x, y)?;
        let bg = samples.without_text.unscaled_pixel_at(x, y)?;
        Some((fg, bg))
    }
}

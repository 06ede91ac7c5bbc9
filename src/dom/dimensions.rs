//! Dimensions
//!
//! Sizes and scales relating three coordinate spaces:
//!
//! - DOM pixels, as laid out by the browser
//! - TTY cells, one character each
//! - frame pixels, the TTY grid with every row split in two by the half-block glyph
//!
//! A frame spans the whole document. Sub-frames are the windows onto it that
//! bound how much work a single build does.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;
use crate::constants::MAX_TTY_SIDE;
use crate::host::{DomHost, Size};
use crate::utils::{ensure_even, snap};

/// Which window of the frame to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubFrameKind {
    /// Exactly the visible TTY area
    Small,
    /// The visible area padded by the big sub-frame factor, clamped to the document
    Big,
    /// The entire document
    RawText,
}

/// TTY size in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TtySize {
    pub width: i64,
    pub height: i64,
}

impl TtySize {
    pub fn is_known(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// A size reported by the terminal, `None` when empty or absurdly large
    pub fn checked(width: i64, height: i64) -> Option<Self> {
        let side = 1..=MAX_TTY_SIDE;
        (side.contains(&width) && side.contains(&height)).then_some(Self { width, height })
    }
}

/// A window in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubFrame {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

/// A window in DOM pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DomSubFrame {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Full document size
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DomSize {
    pub width: f64,
    pub height: f64,
    /// Changed on the last update
    pub is_new: bool,
    pub sub: DomSubFrame,
}

/// The document as a frame-pixel grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: i64,
    pub height: i64,
    pub x_scroll: i64,
    pub y_scroll: i64,
    pub x_last_big_frame: i64,
    pub y_last_big_frame: i64,
    pub sub: SubFrame,
}

/// DOM pixel to frame pixel ratio
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScaleFactor {
    pub width: f64,
    pub height: f64,
}

/// Frame metadata sent with every text and pixel frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameMeta {
    pub sub_left: i64,
    pub sub_top: i64,
    pub sub_width: i64,
    pub sub_height: i64,
    pub total_width: i64,
    pub total_height: i64,
    pub id: u64,
}

/// All sizes for one tab
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub char: Size,
    pub tty: TtySize,
    pub dom: DomSize,
    pub frame: FrameSize,
    pub scale_factor: ScaleFactor,
    /// Raw text build hit the row limit
    pub is_page_truncated: bool,
    #[serde(skip)]
    big_sub_frame_factor: i64,
    #[serde(skip)]
    char_height_fudge: f64,
    #[serde(skip)]
    max_raw_text_rows: i64,
}

impl Dimensions {
    pub fn new(render: &RenderConfig, max_raw_text_rows: i64) -> Self {
        Self {
            char: Size::default(),
            tty: TtySize::default(),
            dom: DomSize::default(),
            frame: FrameSize::default(),
            scale_factor: ScaleFactor::default(),
            is_page_truncated: false,
            big_sub_frame_factor: render.big_sub_frame_factor,
            char_height_fudge: render.char_height_fudge,
            max_raw_text_rows,
        }
    }

    pub fn big_sub_frame_factor(&self) -> i64 {
        self.big_sub_frame_factor
    }

    /// Recompute everything derived from the document.
    ///
    /// Returns false when the document can't be measured yet; the previous
    /// values are kept and the caller should try again next tick.
    pub fn update(&mut self, host: &mut dyn DomHost) -> bool {
        let Some(char_box) = host.measure_char_box() else {
            debug!("No measuring box yet, dimensions not updated");
            return false;
        };
        let char = Size::new(char_box.width, char_box.height + self.char_height_fudge);
        if char.width <= 0.0 || char.height <= 0.0 {
            debug!("Degenerate char size {}x{}", char.width, char.height);
            return false;
        }
        self.char = char;

        // Max of both catches overflowing pages and pages smaller than the window
        let scroll = host.document_scroll_size();
        let viewport = host.viewport_size();
        self.set_dom_size(
            scroll.width.max(viewport.width),
            scroll.height.max(viewport.height),
        );
        self.calculate_scale_factor();
        self.update_frame_size();
        true
    }

    /// Set the measured char size directly (no fudge applied)
    pub fn set_char(&mut self, width: f64, height: f64) {
        self.char = Size::new(width, height);
        self.calculate_scale_factor();
        self.update_frame_size();
    }

    pub fn set_dom_size(&mut self, width: f64, height: f64) {
        self.dom.is_new = self.dom.width != width || self.dom.height != height;
        self.dom.width = width;
        self.dom.height = height;
        if self.scale_factor.width > 0.0 {
            self.update_frame_size();
        }
    }

    fn calculate_scale_factor(&mut self) {
        self.scale_factor = ScaleFactor {
            width: 1.0 / self.char.width,
            // Two half-block pixels per cell
            height: 2.0 / self.char.height,
        };
    }

    fn update_frame_size(&mut self) {
        self.frame.width = snap(self.dom.width * self.scale_factor.width);
        self.frame.height = snap(self.dom.height * self.scale_factor.height);
    }

    /// Compute the sub-frame of the given kind and its DOM equivalent
    pub fn set_sub_frame(&mut self, kind: SubFrameKind) {
        match kind {
            SubFrameKind::Small => self.calculate_small_sub_frame(),
            SubFrameKind::Big => self.calculate_big_sub_frame(),
            SubFrameKind::RawText => self.calculate_entire_dom_frame(),
        }
        self.frame.sub.height = ensure_even(self.frame.sub.height as f64);
    }

    fn calculate_small_sub_frame(&mut self) {
        self.frame.sub = SubFrame {
            left: self.frame.x_scroll,
            top: self.frame.y_scroll,
            width: self.tty.width,
            height: self.tty.height.saturating_mul(2),
        };
        self.scale_sub_frame_to_dom();
    }

    fn calculate_big_sub_frame(&mut self) {
        let factor = self.big_sub_frame_factor;
        let pad_x = factor.saturating_mul(self.tty.width);
        let pad_y = factor.saturating_mul(self.tty.height);
        self.frame.sub = SubFrame {
            left: self.frame.x_scroll.saturating_sub(pad_x),
            top: self.frame.y_scroll.saturating_sub(pad_y),
            width: self.tty.width.saturating_add(pad_x.saturating_mul(2)),
            height: self.tty.height.saturating_add(pad_y.saturating_mul(2)),
        };
        self.limit_sub_frame();
        self.scale_sub_frame_to_dom();
    }

    fn calculate_entire_dom_frame(&mut self) {
        self.is_page_truncated = false;
        let mut dom_height = self.dom.height;
        let mut height = snap(self.dom.height * self.scale_factor.height);
        let max_height = self.max_raw_text_rows * 2;
        if max_height > 0 && height > max_height {
            height = max_height;
            dom_height = max_height as f64 / self.scale_factor.height;
            self.is_page_truncated = true;
        }
        self.dom.sub = DomSubFrame {
            left: 0.0,
            top: 0.0,
            width: self.dom.width,
            height: dom_height,
        };
        self.frame.sub = SubFrame {
            left: 0,
            top: 0,
            width: snap(self.dom.width * self.scale_factor.width),
            height,
        };
    }

    fn limit_sub_frame(&mut self) {
        let sub = &mut self.frame.sub;
        sub.left = sub.left.max(0);
        sub.top = sub.top.max(0);
        sub.width = sub.width.min(self.frame.width);
        sub.height = sub.height.min(self.frame.height);
    }

    fn scale_sub_frame_to_dom(&mut self) {
        let sub = self.frame.sub;
        self.dom.sub = DomSubFrame {
            left: sub.left as f64 / self.scale_factor.width,
            top: sub.top as f64 / self.scale_factor.height,
            width: sub.width as f64 / self.scale_factor.width,
            height: sub.height as f64 / self.scale_factor.height,
        };
    }

    /// Metadata for the current sub-frame
    pub fn frame_meta(&self, id: u64) -> FrameMeta {
        FrameMeta {
            sub_left: self.frame.sub.left,
            sub_top: self.frame.sub.top,
            sub_width: self.frame.sub.width,
            sub_height: self.frame.sub.height,
            total_width: self.frame.width,
            total_height: self.frame.height,
            id,
        }
    }

    /// Sub-frame rows and columns in TTY cells: (top, bottom, left, right)
    pub fn sub_frame_cells(&self) -> (i64, i64, i64, i64) {
        let top = self.frame.sub.top / 2;
        let bottom = top + self.frame.sub.height / 2;
        let left = self.frame.sub.left;
        let right = left + self.frame.sub.width;
        (top, bottom, left, right)
    }

    /// Remember the scroll position a big frame was built at
    pub fn mark_big_frame(&mut self) {
        self.frame.x_last_big_frame = self.frame.x_scroll;
        self.frame.y_last_big_frame = self.frame.y_scroll;
    }

    /// Scrolled far enough from the last big frame to need a new one
    pub fn needs_big_frame(&self) -> bool {
        let y_diff = self.frame.y_last_big_frame - self.frame.y_scroll;
        let max_scroll = (self.big_sub_frame_factor - 1) * self.tty.height;
        y_diff.abs() > max_scroll
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::MockDom;

    fn render_config() -> RenderConfig {
        RenderConfig {
            char_height_fudge: 0.0,
            ..RenderConfig::default()
        }
    }

    fn dims_for(char: Size, viewport: Size, scroll: Size) -> Dimensions {
        let mut host = MockDom::new(char, viewport);
        host.scroll_size = scroll;
        let mut dims = Dimensions::new(&render_config(), 10_000);
        assert!(dims.update(&mut host));
        dims
    }

    #[test]
    fn test_checked_tty_size() {
        assert_eq!(
            TtySize::checked(80, 24),
            Some(TtySize {
                width: 80,
                height: 24
            })
        );
        assert_eq!(TtySize::checked(0, 24), None);
        assert_eq!(TtySize::checked(80, -1), None);
        assert_eq!(TtySize::checked(i64::MAX, 2), None);
        assert!(TtySize::checked(MAX_TTY_SIDE, MAX_TTY_SIDE).is_some());
    }

    #[test]
    fn test_huge_tty_does_not_overflow_sub_frames() {
        let mut dims = dims_for(
            Size::new(10.0, 20.0),
            Size::new(800.0, 600.0),
            Size::new(800.0, 600.0),
        );
        dims.tty = TtySize {
            width: i64::MAX,
            height: i64::MAX,
        };
        dims.set_sub_frame(SubFrameKind::Big);
        assert_eq!(dims.frame.sub.left, 0);
        assert_eq!(dims.frame.sub.width, dims.frame.width);
        dims.set_sub_frame(SubFrameKind::Small);
        assert_eq!(dims.frame.sub.width, i64::MAX);
    }

    #[test]
    fn test_scale_factor_invariant() {
        for (cw, ch, h) in [(7.0, 15.0, 1000.0), (8.4, 17.0, 333.0), (1.0, 2.0, 7.0)] {
            let dims = dims_for(
                Size::new(cw, ch),
                Size::new(100.0, 50.0),
                Size::new(100.0, h),
            );
            assert_eq!(dims.scale_factor.height, 2.0 / ch);
            assert_eq!(dims.scale_factor.width, 1.0 / cw);
            assert_eq!(dims.frame.height, snap(h * dims.scale_factor.height));
        }
    }

    #[test]
    fn test_dom_size_is_max_of_scroll_and_viewport() {
        let dims = dims_for(
            Size::new(10.0, 20.0),
            Size::new(800.0, 600.0),
            Size::new(500.0, 2000.0),
        );
        assert_eq!(dims.dom.width, 800.0);
        assert_eq!(dims.dom.height, 2000.0);
        assert_eq!(dims.frame.width, 80);
        assert_eq!(dims.frame.height, 200);
        assert!(dims.dom.is_new);
    }

    #[test]
    fn test_char_fudge_applied() {
        let mut host = MockDom::new(Size::new(10.0, 16.0), Size::new(100.0, 100.0));
        let mut dims = Dimensions::new(&RenderConfig::default(), 0);
        dims.update(&mut host);
        assert_eq!(dims.char.height, 20.0);
    }

    #[test]
    fn test_update_without_body_keeps_state() {
        let mut host = MockDom::new(Size::new(10.0, 20.0), Size::new(100.0, 100.0));
        host.char_box = None;
        let mut dims = Dimensions::new(&render_config(), 0);
        assert!(!dims.update(&mut host));
        assert_eq!(dims.frame.width, 0);
    }

    #[test]
    fn test_small_sub_frame() {
        let mut dims = dims_for(
            Size::new(10.0, 20.0),
            Size::new(800.0, 600.0),
            Size::new(800.0, 6000.0),
        );
        dims.tty = TtySize {
            width: 80,
            height: 25,
        };
        dims.frame.y_scroll = 100;
        dims.set_sub_frame(SubFrameKind::Small);
        assert_eq!(
            dims.frame.sub,
            SubFrame {
                left: 0,
                top: 100,
                width: 80,
                height: 50
            }
        );
        assert!((dims.dom.sub.top - 1000.0).abs() < 1e-9);
        assert!((dims.dom.sub.height - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_big_sub_frame_clamped_and_even() {
        let mut dims = dims_for(
            Size::new(10.0, 20.0),
            Size::new(800.0, 600.0),
            Size::new(800.0, 1210.0),
        );
        dims.tty = TtySize {
            width: 80,
            height: 25,
        };
        dims.set_sub_frame(SubFrameKind::Big);
        // 1210px at 0.1 frame px per DOM px is 121 rows, forced even
        assert_eq!(dims.frame.height, 121);
        assert_eq!(dims.frame.sub.left, 0);
        assert_eq!(dims.frame.sub.top, 0);
        assert_eq!(dims.frame.sub.width, 80);
        assert_eq!(dims.frame.sub.height, 122);
    }

    #[test]
    fn test_raw_text_sub_frame_covers_dom() {
        let mut dims = dims_for(
            Size::new(10.0, 20.0),
            Size::new(800.0, 600.0),
            Size::new(800.0, 3000.0),
        );
        dims.set_sub_frame(SubFrameKind::RawText);
        assert_eq!(dims.frame.sub.width, 80);
        assert_eq!(dims.frame.sub.height, 300);
        assert_eq!(dims.dom.sub.height, 3000.0);
        assert!(!dims.is_page_truncated);
    }

    #[test]
    fn test_raw_text_truncation() {
        let mut host = MockDom::new(Size::new(10.0, 20.0), Size::new(800.0, 600.0));
        host.scroll_size = Size::new(800.0, 3000.0);
        let mut dims = Dimensions::new(&render_config(), 100);
        dims.update(&mut host);
        dims.set_sub_frame(SubFrameKind::RawText);
        assert!(dims.is_page_truncated);
        assert_eq!(dims.frame.sub.height, 200);
        assert!((dims.dom.sub.height - 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_big_frame_threshold() {
        let mut dims = dims_for(
            Size::new(10.0, 20.0),
            Size::new(800.0, 600.0),
            Size::new(800.0, 6000.0),
        );
        dims.tty = TtySize {
            width: 80,
            height: 10,
        };
        dims.mark_big_frame();
        dims.frame.y_scroll = 50;
        assert!(!dims.needs_big_frame());
        dims.frame.y_scroll = 51;
        assert!(dims.needs_big_frame());
    }
}

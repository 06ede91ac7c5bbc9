//! Text builder
//!
//! Places the document's text onto the TTY grid.
//!
//! Text nodes are walked in document order. Each node's client rects (one
//! per rendered line, a rect never straddles a line break) are stepped
//! through one character at a time with two trackers kept in lockstep: a
//! DOM tracker advancing by the measured character width and a TTY tracker
//! advancing by one cell. Every step offers a cell to the grid.

use std::collections::HashSet;
use std::time::Instant;

use log::debug;
use unicode_segmentation::UnicodeSegmentation;

use super::cell::{glyph_width, TtyCell, TtyCoords};
use super::frame::FrameContext;
use super::grid::{Samples, StyleTable, TtyGrid};
use crate::config::RenderConfig;
use crate::host::{DomHost, ElementId, Point, Rect, TextNode};
use crate::utils::snap;

/// The grid produced by one build
#[derive(Debug, Clone, Default)]
pub struct TextBuild {
    pub grid: TtyGrid,
    pub styles: StyleTable,
    /// Justified text was realigned; layout changes on the next frame
    pub reflow_pending: bool,
}

/// A DOM rect snapped onto the TTY grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtyBox {
    pub col_start: i64,
    pub row: i64,
    pub width: i64,
}

impl TtyBox {
    /// Snap an absolute DOM rect using the frame scale factors
    pub fn from_dom(rect: &Rect, scale_width: f64, scale_height: f64) -> Self {
        Self {
            col_start: snap(rect.left * scale_width),
            row: snap(rect.top * scale_height / 2.0),
            width: snap(rect.width * scale_width),
        }
    }
}

/// Collapse whitespace runs to single spaces, trimming the ends when the
/// text starts a new line in its element
pub fn normalise_whitespace(text: &str, is_first_in_element: bool) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if matches!(c, ' ' | '\t' | '\n' | '\r') {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    if is_first_in_element {
        if out.starts_with(' ') {
            out.remove(0);
        }
        if out.ends_with(' ') {
            out.pop();
        }
    }
    out
}

/// Viewport-relative bounds of the DOM sub-frame
#[derive(Debug, Clone, Copy)]
struct ViewportWindow {
    top: f64,
    bottom: f64,
    left: f64,
    right: f64,
}

impl ViewportWindow {
    fn contains(&self, rect: &Rect) -> bool {
        let in_rows = |y: f64| y >= self.top && y <= self.bottom;
        let in_cols = |x: f64| x >= self.left && x <= self.right;
        (in_rows(rect.bottom()) || in_rows(rect.top))
            && (in_cols(rect.left) || in_cols(rect.right()))
    }
}

/// Per-build parse state
struct Parse<'a> {
    ctx: &'a FrameContext,
    grid: TtyGrid,
    styles: StyleTable,
    window: ViewportWindow,
    scroll: Point,
    parse_started: HashSet<ElementId>,
    previous_box: Option<Rect>,
    reflow_pending: bool,
}

/// Builds TTY grids from the document's text
#[derive(Debug, Clone)]
pub struct TextBuilder {
    render: RenderConfig,
}

impl TextBuilder {
    pub fn new(render: RenderConfig) -> Self {
        Self { render }
    }

    /// Build a fresh grid for the context's sub-frame
    pub fn build(&self, host: &mut dyn DomHost, ctx: &FrameContext) -> TextBuild {
        let dims = &ctx.dims;
        let scroll = host.scroll_position();
        let window = ViewportWindow {
            top: dims.dom.sub.top - scroll.y,
            bottom: dims.dom.sub.top + dims.dom.sub.height - scroll.y,
            left: dims.dom.sub.left - scroll.x,
            right: dims.dom.sub.left + dims.dom.sub.width - scroll.x,
        };

        let start = Instant::now();
        let nodes: Vec<TextNode> = host
            .text_nodes()
            .into_iter()
            .filter(|node| is_relevant(&*host, node, &window))
            .collect();
        debug!(
            "tree walker: {} nodes in {}ms",
            nodes.len(),
            start.elapsed().as_millis()
        );

        let styles = StyleTable::capture(&*host, nodes.iter().map(|n| n.parent));
        let mut parse = Parse {
            ctx,
            grid: TtyGrid::new(dims, &self.render),
            styles,
            window,
            scroll,
            parse_started: HashSet::new(),
            previous_box: None,
            reflow_pending: false,
        };

        let start = Instant::now();
        for node in &nodes {
            parse.position_node(host, node);
        }
        debug!(
            "position text nodes: {} cells in {}ms",
            parse.grid.len(),
            start.elapsed().as_millis()
        );

        TextBuild {
            grid: parse.grid,
            styles: parse.styles,
            reflow_pending: parse.reflow_pending,
        }
    }
}

/// Inside the sub-frame and not only whitespace
fn is_relevant(host: &dyn DomHost, node: &TextNode, window: &ViewportWindow) -> bool {
    if node.text.trim().is_empty() {
        return false;
    }
    match host.element_rect(node.parent) {
        Some(rect) => window.contains(&rect),
        None => false,
    }
}

impl Parse<'_> {
    fn position_node(&mut self, host: &mut dyn DomHost, node: &TextNode) {
        let is_first = self.parse_started.insert(node.parent);
        let text = normalise_whitespace(&node.text, is_first);
        if is_first {
            self.fix_justified_text(host, node.parent);
        }

        let graphemes: Vec<&str> = text.graphemes(true).collect();
        let mut char_index = 0;
        for rect in host.client_rects(node.id) {
            if !self.window.contains(&rect) {
                continue;
            }
            let dom_box = rect.offset(self.scroll.x, self.scroll.y);
            char_index = self.handle_box(&dom_box, &graphemes, char_index, node.parent);
            self.previous_box = Some(dom_box);
        }
    }

    /// Justification stretches gaps by fractions of a cell, which breaks
    /// snapping. The new alignment only shows after the next layout.
    fn fix_justified_text(&mut self, host: &mut dyn DomHost, element: ElementId) {
        let Some(style) = self.styles.get(element) else {
            return;
        };
        if style.justified {
            let mut style = style.clone();
            host.force_left_align(element);
            style.justified = false;
            self.styles.insert(element, style);
            self.reflow_pending = true;
        }
    }

    /// Step through one rect, returning the next unparsed grapheme index
    fn handle_box(
        &mut self,
        dom_box: &Rect,
        graphemes: &[&str],
        mut char_index: usize,
        parent: ElementId,
    ) -> usize {
        let dims = &self.ctx.dims;
        let tty_box = TtyBox::from_dom(dom_box, dims.scale_factor.width, dims.scale_factor.height);

        // The space a line wraps at is never laid out
        if self.is_new_line(dom_box) {
            if let Some(current) = graphemes.get(char_index) {
                if current.trim().is_empty() {
                    char_index += 1;
                }
            }
        }

        let samples = Samples {
            with_text: &self.ctx.with_text,
            without_text: &self.ctx.without_text,
        };
        let mut dom_tracker = Point {
            x: dom_box.left,
            y: dom_box.top,
        };
        let mut tty_x = tty_box.col_start;
        let end = tty_box.col_start + tty_box.width;
        while tty_x < end {
            let Some(grapheme) = graphemes.get(char_index) else {
                break;
            };
            let cell = TtyCell::new(
                grapheme,
                TtyCoords {
                    x: tty_x,
                    y: tty_box.row,
                },
                dom_tracker,
                parent,
            );
            self.grid.add_cell(cell, samples, &self.styles);

            let width = glyph_width(grapheme).max(1);
            char_index += 1;
            dom_tracker.x += dims.char.width * width as f64;
            tty_x += width as i64;
        }
        char_index
    }

    fn is_new_line(&self, dom_box: &Rect) -> bool {
        match self.previous_box {
            Some(previous) => dom_box.top > previous.top,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::dimensions::{Dimensions, SubFrameKind, TtySize};
    use crate::dom::graphics::GraphicsBuilder;
    use crate::host::mock::MockDom;
    use crate::host::{ElementStyle, Size};
    use crate::utils::Rgb;

    fn render() -> RenderConfig {
        RenderConfig {
            char_height_fudge: 0.0,
            middle_of_em: 0.25,
            ..RenderConfig::default()
        }
    }

    /// Black text on white, everything painted as text
    fn text_page(host: &mut MockDom) {
        let (w, h) = (host.page.width as f64, host.page.height as f64);
        host.page
            .paint(Rect::new(0.0, 0.0, w, h), Rgb::BLACK, true);
    }

    fn context(host: &mut MockDom, tty: TtySize) -> FrameContext {
        let mut dims = Dimensions::new(&render(), 0);
        dims.update(host);
        dims.tty = tty;
        dims.set_sub_frame(SubFrameKind::Big);
        FrameContext::capture(host, dims, &GraphicsBuilder::new(90), false)
    }

    #[test]
    fn test_normalise_whitespace() {
        assert_eq!(normalise_whitespace("\n  testing \t nodes\n", true), "testing nodes");
        assert_eq!(normalise_whitespace("\n  more \n", false), " more ");
        assert_eq!(normalise_whitespace("a", true), "a");
    }

    #[test]
    fn test_synced_tty_box_is_deterministic() {
        let rect = Rect::new(13.3, 41.7, 70.2, 15.0);
        let a = TtyBox::from_dom(&rect, 1.0 / 7.0, 2.0 / 15.0);
        let b = TtyBox::from_dom(&rect, 1.0 / 7.0, 2.0 / 15.0);
        assert_eq!(a, b);
        assert_eq!(
            a,
            TtyBox {
                col_start: 2,
                row: 3,
                width: 10
            }
        );
    }

    #[test]
    fn test_wrapped_text_skips_wrap_space() {
        let mut host = MockDom::new(Size::new(1.0, 2.0), Size::new(3.0, 6.0));
        text_page(&mut host);
        host.add_text(
            1,
            "\n testing nodes",
            vec![
                Rect::new(0.1, 0.1, 7.1, 2.0),
                Rect::new(0.1, 4.1, 5.1, 2.0),
            ],
        );
        let ctx = context(
            &mut host,
            TtySize {
                width: 3,
                height: 3,
            },
        );
        let build = TextBuilder::new(render()).build(&mut host, &ctx);
        let grid = &build.grid;

        assert_eq!(grid.cell(0).unwrap().rune, "t");
        assert_eq!(grid.cell(1).unwrap().rune, "e");
        assert_eq!(grid.cell(2).unwrap().rune, "s");
        assert!(grid.cell(3).is_none());
        assert!(grid.cell(4).is_none());
        assert!(grid.cell(5).is_none());
        assert_eq!(grid.cell(6).unwrap().rune, "n");
        assert_eq!(grid.cell(7).unwrap().rune, "o");
        assert_eq!(grid.cell(8).unwrap().rune, "d");
        assert_eq!(grid.len(), 6);
    }

    #[test]
    fn test_dom_origin_kept_after_snapping() {
        let mut host = MockDom::new(Size::new(1.0, 2.0), Size::new(3.0, 6.0));
        text_page(&mut host);
        host.add_text(1, "ab", vec![Rect::new(0.4, 0.1, 2.0, 2.0)]);
        let ctx = context(
            &mut host,
            TtySize {
                width: 3,
                height: 3,
            },
        );
        let build = TextBuilder::new(render()).build(&mut host, &ctx);
        let b = build.grid.cell_at(1, 0).unwrap();
        assert_eq!(b.rune, "b");
        assert!((b.dom_coords.x - 1.4).abs() < 1e-9);
        assert!((b.dom_coords.y - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_wide_glyph_takes_two_cells() {
        let mut host = MockDom::new(Size::new(1.0, 2.0), Size::new(6.0, 4.0));
        text_page(&mut host);
        host.add_text(1, "漢a", vec![Rect::new(0.0, 0.0, 3.0, 2.0)]);
        let ctx = context(
            &mut host,
            TtySize {
                width: 6,
                height: 2,
            },
        );
        let build = TextBuilder::new(render()).build(&mut host, &ctx);
        assert_eq!(build.grid.cell_at(0, 0).unwrap().rune, "漢");
        assert!(build.grid.cell_at(1, 0).is_none());
        assert_eq!(build.grid.cell_at(2, 0).unwrap().rune, "a");
    }

    #[test]
    fn test_justified_parent_realigned() {
        let mut host = MockDom::new(Size::new(1.0, 2.0), Size::new(6.0, 4.0));
        text_page(&mut host);
        host.add_text(9, "word", vec![Rect::new(0.0, 0.0, 4.0, 2.0)]);
        host.set_style(
            9,
            ElementStyle {
                justified: true,
                ..Default::default()
            },
        );
        let ctx = context(
            &mut host,
            TtySize {
                width: 6,
                height: 2,
            },
        );
        let build = TextBuilder::new(render()).build(&mut host, &ctx);
        assert!(build.reflow_pending);
        assert_eq!(host.calls_matching("left_align"), vec!["left_align:9"]);

        let build = TextBuilder::new(render()).build(&mut host, &ctx);
        assert!(!build.reflow_pending);
    }

    #[test]
    fn test_nodes_outside_sub_frame_ignored() {
        let mut host = MockDom::new(Size::new(1.0, 2.0), Size::new(4.0, 4.0));
        text_page(&mut host);
        host.add_text(1, "far", vec![Rect::new(0.0, 500.0, 3.0, 2.0)]);
        host.add_text(2, "   ", vec![Rect::new(0.0, 0.0, 3.0, 2.0)]);
        let ctx = context(
            &mut host,
            TtySize {
                width: 4,
                height: 2,
            },
        );
        let build = TextBuilder::new(render()).build(&mut host, &ctx);
        assert!(build.grid.is_empty());
    }
}

//! Frame compositing
//!
//! A build works on one consistent snapshot of the page: the dimensions and
//! the three captures taken together. The composite step merges the text grid
//! with the scaled capture into exactly one cell per TTY position.

use smol_str::SmolStr;

use super::dimensions::Dimensions;
use super::graphics::{GraphicsBuilder, Screenshot};
use super::grid::TtyGrid;
use crate::constants::{HALF_BLOCK, WIDE_GLYPH_PADDING};
use crate::host::DomHost;
use crate::utils::Rgb;

/// Dimensions and captures taken together for one build
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub dims: Dimensions,
    pub with_text: Screenshot,
    pub without_text: Screenshot,
    /// Empty for text-only builds
    pub scaled: Screenshot,
}

impl FrameContext {
    /// Take the captures for the current sub-frame
    pub fn capture(
        host: &mut dyn DomHost,
        dims: Dimensions,
        graphics: &GraphicsBuilder,
        with_scaled: bool,
    ) -> Self {
        let with_text = graphics.screenshot_with_text(host, &dims);
        let without_text = graphics.screenshot_without_text(host, &dims);
        let scaled = if with_scaled {
            graphics.scaled_screenshot(host, &dims)
        } else {
            Screenshot::default()
        };
        Self {
            dims,
            with_text,
            without_text,
            scaled,
        }
    }
}

/// One composited terminal cell
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCell {
    pub glyph: SmolStr,
    pub fg: Rgb,
    pub bg: Rgb,
}

/// Merge text over graphics for the visible TTY area.
///
/// Returns `tty.width * tty.height` cells in row-major order. Text cells win;
/// elsewhere the half-block takes the lower pixel as foreground and the upper
/// as background. A wide glyph is followed by padding cells so every row
/// stays exactly `tty.width` long.
pub fn composite(ctx: &FrameContext, grid: &TtyGrid) -> Vec<FrameCell> {
    let tty = ctx.dims.tty;
    let sub = ctx.dims.frame.sub;
    let (width, height) = (tty.width.max(0), tty.height.max(0));
    let mut cells = Vec::with_capacity((width * height) as usize);

    for row in 0..height {
        let mut col = 0;
        while col < width {
            let text = grid.cell_at(sub.left + col, sub.top / 2 + row);
            match text.filter(|c| !c.is_transparent()) {
                Some(cell) => {
                    cells.push(FrameCell {
                        glyph: cell.rune.clone(),
                        fg: cell.fg,
                        bg: cell.bg,
                    });
                    col += 1;
                    for _ in 1..cell.display_width() {
                        if col >= width {
                            break;
                        }
                        cells.push(FrameCell {
                            glyph: SmolStr::new_inline(WIDE_GLYPH_PADDING),
                            fg: cell.fg,
                            bg: cell.bg,
                        });
                        col += 1;
                    }
                }
                None => {
                    let upper = scaled_pixel(&ctx.scaled, col, row * 2);
                    let lower = scaled_pixel(&ctx.scaled, col, row * 2 + 1);
                    cells.push(FrameCell {
                        glyph: SmolStr::new_inline(HALF_BLOCK),
                        fg: lower,
                        bg: upper,
                    });
                    col += 1;
                }
            }
        }
    }
    cells
}

fn scaled_pixel(scaled: &Screenshot, x: i64, y: i64) -> Rgb {
    scaled.pixel_at(x, y).unwrap_or(Rgb::BLACK)
}

/// Render composited cells as 24-bit ANSI rows joined by newlines
pub fn to_ansi(cells: &[FrameCell], width: i64) -> String {
    if width <= 0 {
        return String::new();
    }
    let mut out = String::with_capacity(cells.len() * 24);
    for (i, row) in cells.chunks(width as usize).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let mut last: Option<(Rgb, Rgb)> = None;
        for cell in row {
            if last != Some((cell.fg, cell.bg)) {
                out.push_str(&cell.fg.ansi_fg());
                out.push_str(&cell.bg.ansi_bg());
                last = Some((cell.fg, cell.bg));
            }
            out.push_str(&cell.glyph);
        }
        out.push_str("\x1b[0m");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::dom::dimensions::{SubFrameKind, TtySize};
    use crate::dom::text::TextBuilder;
    use crate::host::mock::MockDom;
    use crate::host::{Rect, Size};

    fn render() -> RenderConfig {
        RenderConfig {
            char_height_fudge: 0.0,
            middle_of_em: 0.25,
            ..RenderConfig::default()
        }
    }

    fn setup(host: &mut MockDom, tty: TtySize) -> FrameContext {
        let mut dims = Dimensions::new(&render(), 0);
        dims.update(host);
        dims.tty = tty;
        dims.set_sub_frame(SubFrameKind::Small);
        FrameContext::capture(host, dims, &GraphicsBuilder::new(90), true)
    }

    #[test]
    fn test_graphics_only_frame() {
        let mut host = MockDom::new(Size::new(1.0, 2.0), Size::new(2.0, 4.0));
        host.page
            .paint(Rect::new(0.0, 1.0, 2.0, 1.0), Rgb::new(200, 0, 0), false);
        let ctx = setup(
            &mut host,
            TtySize {
                width: 2,
                height: 2,
            },
        );
        let cells = composite(&ctx, &TtyGrid::default());
        assert_eq!(cells.len(), 4);
        assert!(cells.iter().all(|c| c.glyph == HALF_BLOCK));
        assert_eq!(cells[0].bg, Rgb::WHITE);
        assert_eq!(cells[0].fg, Rgb::new(200, 0, 0));
        assert_eq!(cells[2].fg, Rgb::WHITE);
    }

    #[test]
    fn test_text_over_graphics() {
        let mut host = MockDom::new(Size::new(1.0, 2.0), Size::new(4.0, 4.0));
        host.page
            .paint(Rect::new(0.0, 0.0, 4.0, 2.0), Rgb::BLACK, true);
        host.add_text(1, "hi", vec![Rect::new(0.0, 0.0, 2.0, 2.0)]);
        let ctx = setup(
            &mut host,
            TtySize {
                width: 4,
                height: 2,
            },
        );
        let grid = TextBuilder::new(render()).build(&mut host, &ctx).grid;
        let cells = composite(&ctx, &grid);
        assert_eq!(cells.len(), 8);
        assert_eq!(cells[0].glyph, "h");
        assert_eq!(cells[0].fg, Rgb::BLACK);
        assert_eq!(cells[0].bg, Rgb::WHITE);
        assert_eq!(cells[1].glyph, "i");
        assert_eq!(cells[2].glyph, HALF_BLOCK);
        assert_eq!(cells[4].glyph, HALF_BLOCK);
    }

    #[test]
    fn test_wide_glyph_padding_keeps_row_width() {
        let mut host = MockDom::new(Size::new(1.0, 2.0), Size::new(3.0, 2.0));
        host.page
            .paint(Rect::new(0.0, 0.0, 3.0, 2.0), Rgb::BLACK, true);
        host.add_text(1, "漢a", vec![Rect::new(0.0, 0.0, 3.0, 2.0)]);
        let ctx = setup(
            &mut host,
            TtySize {
                width: 3,
                height: 1,
            },
        );
        let grid = TextBuilder::new(render()).build(&mut host, &ctx).grid;
        let cells = composite(&ctx, &grid);
        let glyphs: Vec<&str> = cells.iter().map(|c| c.glyph.as_str()).collect();
        assert_eq!(glyphs, vec!["漢", " ", "a"]);
    }

    #[test]
    fn test_ansi_rows() {
        let cell = |g: &str| FrameCell {
            glyph: SmolStr::new(g),
            fg: Rgb::BLACK,
            bg: Rgb::WHITE,
        };
        let ansi = to_ansi(&[cell("a"), cell("b"), cell("c"), cell("d")], 2);
        let rows: Vec<&str> = ansi.split('\n').collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            "\x1b[38;2;0;0;0m\x1b[48;2;255;255;255mab\x1b[0m"
        );
        assert!(rows[1].ends_with("cd\x1b[0m"));
    }
}

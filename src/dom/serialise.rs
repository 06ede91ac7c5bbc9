//! Frame serialisation
//!
//! Turns a built grid into the wire payloads: `/frame_text` JSON for the
//! interactive terminal, and plain text or HTML documents for raw text
//! requests.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::dimensions::{Dimensions, FrameMeta};
use super::grid::{StyleTable, TtyGrid};
use crate::host::DomHost;
use crate::utils::{parse_css_color, snap, Rgb};

/// An editable element, positioned in frame pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputBox {
    pub id: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub tag_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub colour: [u8; 3],
}

/// `/frame_text` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFrame {
    pub meta: FrameMeta,
    /// One entry per sub-frame cell, row-major; empty where there is no text
    pub text: Vec<String>,
    /// Foreground RGB triple per cell, `0,0,0` where there is no text
    pub colours: Vec<u8>,
    pub input_boxes: BTreeMap<String, InputBox>,
}

impl TextFrame {
    /// Cells of the sub-frame, in the order the terminal expects them
    pub fn from_grid(
        grid: &TtyGrid,
        dims: &Dimensions,
        id: u64,
        input_boxes: BTreeMap<String, InputBox>,
    ) -> Self {
        let (top, bottom, left, right) = dims.sub_frame_cells();
        let capacity = ((bottom - top) * (right - left)).max(0) as usize;
        let mut text = Vec::with_capacity(capacity);
        let mut colours = Vec::with_capacity(capacity * 3);
        for y in top..bottom {
            for x in left..right {
                match grid.cell_at(x, y) {
                    Some(cell) => {
                        text.push(cell.rune.to_string());
                        colours.extend_from_slice(&cell.fg.to_array());
                    }
                    None => {
                        text.push(String::new());
                        colours.extend_from_slice(&[0, 0, 0]);
                    }
                }
            }
        }
        Self {
            meta: dims.frame_meta(id),
            text,
            colours,
            input_boxes,
        }
    }
}

/// Every visible input box on the page, keyed by its host id
pub fn collect_input_boxes(host: &dyn DomHost, dims: &Dimensions) -> BTreeMap<String, InputBox> {
    let scroll = host.scroll_position();
    let sf = dims.scale_factor;
    let mut boxes = BTreeMap::new();
    for info in host.input_boxes() {
        let rect = info.rect.offset(scroll.x, scroll.y);
        let width = snap(rect.width * sf.width);
        let height = snap(rect.height * sf.height);
        if width == 0 || height == 0 || info.hidden {
            continue;
        }
        let colour = parse_css_color(&info.color).unwrap_or(Rgb::BLACK);
        boxes.insert(
            info.id.clone(),
            InputBox {
                id: info.id,
                x: snap((rect.left + info.padding_left) * sf.width),
                y: snap((rect.top + info.padding_top) * sf.height),
                width,
                height,
                tag_name: info.tag_name,
                kind: info.kind,
                colour: colour.to_array(),
            },
        );
    }
    boxes
}

/// Flavours of raw text request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawTextMode {
    Plain,
    Html,
    /// The page's own body HTML, no grid involved
    Dom,
}

impl RawTextMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "raw_text_plain" => Some(Self::Plain),
            "raw_text_html" => Some(Self::Html),
            "raw_text_dom" => Some(Self::Dom),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Plain => "raw_text_plain",
            Self::Html => "raw_text_html",
            Self::Dom => "raw_text_dom",
        }
    }
}

/// `/raw_text` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTextPayload {
    pub body: String,
    pub page_load_duration: u64,
    pub parsing_duration: u64,
}

/// Page facts the HTML head needs
#[derive(Debug, Clone, Default)]
pub struct PageInfo {
    pub title: String,
    pub favicon: Option<String>,
    /// Scaled capture as a data URI, empty for none
    pub background: String,
}

/// Builds raw text documents from a whole-page grid
#[derive(Debug, Clone)]
pub struct RawTextWriter {
    pub mode: RawTextMode,
    pub header: String,
    pub footer: String,
}

/// Anchor tracking while walking cells for HTML output
#[derive(Default)]
struct Anchors {
    open: Option<String>,
}

impl Anchors {
    fn close(&mut self, out: &mut String) {
        if self.open.take().is_some() {
            out.push_str("</a>");
        }
    }

    fn enter(&mut self, href: Option<&str>, out: &mut String) {
        if self.open.as_deref() == href {
            return;
        }
        self.close(out);
        if let Some(href) = href {
            let _ = write!(out, "<a href=\"/{}\">", escape_html(href));
            self.open = Some(href.to_string());
        }
    }
}

impl RawTextWriter {
    pub fn new(mode: RawTextMode, header: &str, footer: &str) -> Self {
        Self {
            mode,
            header: header.to_string(),
            footer: footer.to_string(),
        }
    }

    /// The complete document: head, page text, then build metadata
    pub fn document(
        &self,
        grid: &TtyGrid,
        styles: &StyleTable,
        dims: &Dimensions,
        page: &PageInfo,
        parsing_duration: u64,
    ) -> String {
        let body = match self.mode {
            RawTextMode::Html => self.html_text(grid, styles, dims),
            _ => self.plain_text(grid, dims),
        };
        let head = match self.mode {
            RawTextMode::Html => self.html_head(dims, page),
            _ => format!("{}\n", self.header),
        };
        head + &body + &self.footer_text(dims, parsing_duration)
    }

    fn plain_text(&self, grid: &TtyGrid, dims: &Dimensions) -> String {
        let (top, bottom, left, right) = dims.sub_frame_cells();
        let mut out = String::new();
        for y in top..bottom {
            for x in left..right {
                match grid.cell_at(x, y) {
                    Some(cell) => out.push_str(&cell.rune),
                    None => out.push(' '),
                }
            }
            out.push('\n');
        }
        out
    }

    fn html_text(&self, grid: &TtyGrid, styles: &StyleTable, dims: &Dimensions) -> String {
        let (top, bottom, left, right) = dims.sub_frame_cells();
        let mut out = String::new();
        let mut anchors = Anchors::default();
        for y in top..bottom {
            for x in left..right {
                match grid.cell_at(x, y) {
                    Some(cell) => {
                        let href = styles.get(cell.parent).and_then(|s| s.href.as_deref());
                        anchors.enter(href, &mut out);
                        out.push_str(&escape_html(&cell.rune));
                    }
                    None => {
                        anchors.close(&mut out);
                        out.push(' ');
                    }
                }
            }
            // Links never span a line break
            anchors.close(&mut out);
            out.push('\n');
        }
        out
    }

    fn html_head(&self, dims: &Dimensions, page: &PageInfo) -> String {
        let favicon = page
            .favicon
            .as_deref()
            .map(|href| {
                format!(
                    "<link rel=\"shortcut icon\" type=\"image/x-icon\" href=\"{}\">",
                    escape_html(href)
                )
            })
            .unwrap_or_default();
        let width = dims.dom.sub.width;
        let height = dims.dom.sub.height;
        format!(
            "<html>\n<head>\n{favicon}\n<title>{title}</title>\n<style>\n\
             html * {{ font-family: monospace; }}\n\
             body {{ font-size: 15px; }}\n\
             pre {{\n\
             background-image: url({background});\n\
             background-repeat: no-repeat;\n\
             background-size: {width}px {height}px;\n\
             image-rendering: pixelated;\n\
             width: {width}px;\n\
             height: {height}px;\n\
             font-size: 15px !important;\n\
             line-height: 20px !important;\n\
             letter-spacing: 0px !important;\n\
             font-style: normal !important;\n\
             font-weight: normal !important;\n\
             }}\n\
             .termweb-footer {{ opacity: 0.7; }}\n\
             </style>\n</head>\n<body>\n{header}\n<pre>",
            favicon = favicon,
            title = escape_html(&page.title),
            background = page.background,
            width = width,
            height = height,
            header = self.header,
        )
    }

    fn footer_text(&self, dims: &Dimensions, parsing_duration: u64) -> String {
        let date_time = chrono::Local::now().format("%-d/%-m/%Y@%H:%M:%S UTC%:z");
        let mut meta = format!("\n\nBuilt on {} in {}ms.", date_time, parsing_duration);
        if dims.is_page_truncated {
            meta.push_str("\nParser: the page was too large, some text may have been truncated.");
        }
        match self.mode {
            RawTextMode::Html => format!(
                "<span class=\"termweb-footer\">{}\n{}</span></pre></body></html>",
                meta, self.footer
            ),
            _ => format!("{}\n{}", meta, self.footer),
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

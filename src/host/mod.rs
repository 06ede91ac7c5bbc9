//! Host capabilities
//!
//! Everything the pipeline needs from a real browser goes through the two
//! traits here. `DomHost` is one tab's document (geometry, styles, pixels,
//! event dispatch) and `BrowserHost` is the browser's tab and window control.
//! Tests substitute the in-memory implementations from [`mock`].

pub mod mock;

use serde::{Deserialize, Serialize};

use crate::dom::input::KeyMods;

/// Browser-native tab identifier
pub type TabId = u64;

/// Identity of a DOM element, stable for the life of the document
pub type ElementId = u64;

/// Identity of a DOM text node
pub type NodeId = u64;

/// Width and height in DOM pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A point in DOM pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// A DOM rectangle (client rects are viewport-relative)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    /// Shift by a scroll offset (viewport-relative to document-absolute)
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.left + dx, self.top + dy, self.width, self.height)
    }
}

/// A text node as found by walking the document
#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub id: NodeId,
    /// The element containing the text
    pub parent: ElementId,
    /// Raw text as written in the document
    pub text: String,
}

/// Snapshot of the computed style values the pipeline cares about
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementStyle {
    /// Cascaded z-index (`auto` = 0)
    pub z_index: i32,
    /// `display: none` or `visibility: hidden`
    pub hidden: bool,
    /// `text-align: justify`
    pub justified: bool,
    /// Link target when the element is (inside) an anchor
    pub href: Option<String>,
}

/// Region capture request.
///
/// `region` is in absolute DOM pixels; the host draws it into an RGBA
/// buffer of `output_width * output_height` pixels, scaling as needed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    pub region: Rect,
    pub output_width: usize,
    pub output_height: usize,
}

/// Synthetic mouse events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Move,
    Down,
    Up,
    Click,
}

/// Synthetic keyboard events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Press,
    Down,
    Up,
}

/// A keyboard event to dispatch on the focused element
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    /// Printable character, empty for special keys
    pub key: String,
    pub key_code: i64,
    pub modifiers: KeyMods,
}

/// The element that currently has focus
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveElement {
    pub id: ElementId,
    /// Upper case tag name, e.g. `INPUT`
    pub tag_name: String,
}

/// Raw description of an editable element
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputBoxInfo {
    /// Stable id assigned by the host
    pub id: String,
    /// Viewport-relative bounding rect
    pub rect: Rect,
    pub padding_top: f64,
    pub padding_left: f64,
    /// Upper case tag name
    pub tag_name: String,
    /// `type` attribute, or `textbox` for ARIA text boxes
    pub kind: String,
    /// Computed CSS `color`
    pub color: String,
    /// Hidden by style or `aria-hidden`
    pub hidden: bool,
}

/// One tab's document
pub trait DomHost {
    /// Size of a single measured monospace character, `None` before the body exists
    fn measure_char_box(&mut self) -> Option<Size>;
    /// Full scrollable document size
    fn document_scroll_size(&self) -> Size;
    fn viewport_size(&self) -> Size;
    fn scroll_position(&self) -> Point;
    fn scroll_to(&mut self, x: f64, y: f64);

    /// Every text node in document order
    fn text_nodes(&self) -> Vec<TextNode>;
    /// Viewport-relative bounding rect of an element
    fn element_rect(&self, element: ElementId) -> Option<Rect>;
    /// Viewport-relative rects of a text node, one per rendered line
    fn client_rects(&self, node: NodeId) -> Vec<Rect>;
    fn element_style(&self, element: ElementId) -> ElementStyle;
    /// Override justified alignment; takes effect on the next layout
    fn force_left_align(&mut self, element: ElementId);

    /// Toggle the text colour rule used for with/without text captures
    fn set_text_visible(&mut self, visible: bool);
    /// Draw a region into an RGBA buffer; empty on failure
    fn capture(&mut self, request: &CaptureRequest) -> Vec<u8>;

    /// Topmost element at a viewport point
    fn element_at(&self, x: f64, y: f64) -> Option<ElementId>;
    fn focus(&mut self, element: ElementId);
    /// Dispatch a mouse event at absolute document coordinates
    fn dispatch_mouse(&mut self, element: ElementId, kind: MouseEventKind, x: f64, y: f64);
    fn active_element(&self) -> Option<ActiveElement>;
    fn dispatch_key(&mut self, event: &KeyEvent);

    fn input_boxes(&self) -> Vec<InputBoxInfo>;
    /// Set the text of an input box, returns false if it no longer exists
    fn set_input_value(&mut self, id: &str, text: &str) -> bool;

    fn navigate(&mut self, url: &str);
    fn history_back(&mut self);
    fn stop(&mut self);
    fn reload(&mut self);

    fn title(&self) -> String;
    fn location(&self) -> String;
    fn body_html(&self) -> String;
    fn favicon_href(&self) -> Option<String>;
}

/// Load state reported by the browser for a native tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeStatus {
    #[default]
    Loading,
    Complete,
}

/// A tab as the browser reports it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeTab {
    pub id: TabId,
    pub title: String,
    pub url: String,
    pub active: bool,
    pub status: NativeStatus,
}

/// Browser-level tab and window control
pub trait BrowserHost {
    /// Current native tabs of all normal windows
    fn list_tabs(&mut self) -> Vec<NativeTab>;
    fn reload_tab(&mut self, id: TabId);
    fn remove_tab(&mut self, id: TabId);
    /// Open a tab and return its id
    fn create_tab(&mut self, url: &str) -> TabId;
    fn duplicate_tab(&mut self, id: TabId);
    fn activate_tab(&mut self, id: TabId);
    fn resize_window(&mut self, width: i64, height: i64);
    /// Override the user agent, `None` restores the default
    fn set_user_agent(&mut self, user_agent: Option<&str>);
}

//! In-memory hosts
//!
//! Scriptable stand-ins for a browser, used by the test suites. Geometry,
//! styles and pixels are plain data; every side effect is recorded.

use std::collections::HashMap;

use super::*;
use crate::utils::Rgb;

/// A document-sized pair of RGBA images, one with text drawn and one without
#[derive(Debug, Clone)]
pub struct MockPage {
    pub width: usize,
    pub height: usize,
    pub with_text: Vec<u8>,
    pub without_text: Vec<u8>,
}

impl MockPage {
    /// A page filled with one background colour
    pub fn filled(width: usize, height: usize, background: Rgb) -> Self {
        let mut pixels = Vec::with_capacity(width * height * 4);
        for _ in 0..width * height {
            pixels.extend_from_slice(&[background.r, background.g, background.b, 255]);
        }
        Self {
            width,
            height,
            with_text: pixels.clone(),
            without_text: pixels,
        }
    }

    /// Paint an absolute rect; text-only paint leaves the text-less image alone
    pub fn paint(&mut self, rect: Rect, colour: Rgb, text_only: bool) {
        let x0 = rect.left.max(0.0) as usize;
        let y0 = rect.top.max(0.0) as usize;
        let x1 = (rect.right().max(0.0) as usize).min(self.width);
        let y1 = (rect.bottom().max(0.0) as usize).min(self.height);
        for y in y0..y1 {
            for x in x0..x1 {
                let i = (y * self.width + x) * 4;
                self.with_text[i..i + 3].copy_from_slice(&colour.to_array());
                if !text_only {
                    self.without_text[i..i + 3].copy_from_slice(&colour.to_array());
                }
            }
        }
    }

    /// Pixel at absolute coordinates; outside the page reads as white canvas
    pub fn pixel(&self, x: i64, y: i64, with_text: bool) -> [u8; 4] {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return [255, 255, 255, 255];
        }
        let i = (y as usize * self.width + x as usize) * 4;
        let src = if with_text {
            &self.with_text
        } else {
            &self.without_text
        };
        [src[i], src[i + 1], src[i + 2], src[i + 3]]
    }
}

/// A scripted document
#[derive(Debug, Clone)]
pub struct MockDom {
    pub char_box: Option<Size>,
    pub scroll_size: Size,
    pub viewport: Size,
    pub scroll: Point,
    pub nodes: Vec<TextNode>,
    pub rects: HashMap<NodeId, Vec<Rect>>,
    pub element_rects: HashMap<ElementId, Rect>,
    pub styles: HashMap<ElementId, ElementStyle>,
    pub page: MockPage,
    pub text_visible: bool,
    /// Result of `element_at`
    pub hit_element: Option<ElementId>,
    pub active: Option<ActiveElement>,
    pub inputs: Vec<InputBoxInfo>,
    pub title: String,
    pub location: String,
    pub body: String,
    pub favicon: Option<String>,
    /// Side effects, in order
    pub calls: Vec<String>,
}

impl MockDom {
    /// An empty white document exactly filling the viewport
    pub fn new(char_box: Size, viewport: Size) -> Self {
        Self {
            char_box: Some(char_box),
            scroll_size: viewport,
            viewport,
            scroll: Point::default(),
            nodes: Vec::new(),
            rects: HashMap::new(),
            element_rects: HashMap::new(),
            styles: HashMap::new(),
            page: MockPage::filled(
                viewport.width as usize,
                viewport.height as usize,
                Rgb::WHITE,
            ),
            text_visible: false,
            hit_element: None,
            active: None,
            inputs: Vec::new(),
            title: String::new(),
            location: "about:blank".to_string(),
            body: String::new(),
            favicon: None,
            calls: Vec::new(),
        }
    }

    /// Add a text node with its viewport-relative line rects
    pub fn add_text(&mut self, parent: ElementId, text: &str, rects: Vec<Rect>) -> NodeId {
        let id = self.nodes.len() as NodeId + 1;
        self.nodes.push(TextNode {
            id,
            parent,
            text: text.to_string(),
        });
        self.rects.insert(id, rects);
        id
    }

    pub fn set_style(&mut self, element: ElementId, style: ElementStyle) {
        self.styles.insert(element, style);
    }

    /// Recorded calls starting with `prefix`
    pub fn calls_matching(&self, prefix: &str) -> Vec<&str> {
        self.calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .map(|c| c.as_str())
            .collect()
    }

    /// Union of the rects of an element's text nodes
    fn text_bounds(&self, element: ElementId) -> Option<Rect> {
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for node in self.nodes.iter().filter(|n| n.parent == element) {
            for r in self.rects.get(&node.id).into_iter().flatten() {
                bounds = Some(match bounds {
                    None => (r.left, r.top, r.right(), r.bottom()),
                    Some((l, t, rt, b)) => (
                        l.min(r.left),
                        t.min(r.top),
                        rt.max(r.right()),
                        b.max(r.bottom()),
                    ),
                });
            }
        }
        bounds.map(|(l, t, r, b)| Rect::new(l, t, r - l, b - t))
    }
}

impl DomHost for MockDom {
    fn measure_char_box(&mut self) -> Option<Size> {
        self.char_box
    }

    fn document_scroll_size(&self) -> Size {
        self.scroll_size
    }

    fn viewport_size(&self) -> Size {
        self.viewport
    }

    fn scroll_position(&self) -> Point {
        self.scroll
    }

    fn scroll_to(&mut self, x: f64, y: f64) {
        self.scroll = Point { x, y };
        self.calls.push(format!("scroll_to:{},{}", x, y));
    }

    fn text_nodes(&self) -> Vec<TextNode> {
        self.nodes.clone()
    }

    fn element_rect(&self, element: ElementId) -> Option<Rect> {
        self.element_rects
            .get(&element)
            .copied()
            .or_else(|| self.text_bounds(element))
    }

    fn client_rects(&self, node: NodeId) -> Vec<Rect> {
        self.rects.get(&node).cloned().unwrap_or_default()
    }

    fn element_style(&self, element: ElementId) -> ElementStyle {
        self.styles.get(&element).cloned().unwrap_or_default()
    }

    fn force_left_align(&mut self, element: ElementId) {
        if let Some(style) = self.styles.get_mut(&element) {
            style.justified = false;
        }
        self.calls.push(format!("left_align:{}", element));
    }

    fn set_text_visible(&mut self, visible: bool) {
        self.text_visible = visible;
    }

    fn capture(&mut self, request: &CaptureRequest) -> Vec<u8> {
        let (w, h) = (request.output_width, request.output_height);
        if w == 0 || h == 0 || request.region.width <= 0.0 || request.region.height <= 0.0 {
            return Vec::new();
        }
        let step_x = request.region.width / w as f64;
        let step_y = request.region.height / h as f64;
        let mut out = Vec::with_capacity(w * h * 4);
        for oy in 0..h {
            for ox in 0..w {
                // Nearest neighbour
                let x = (request.region.left + ox as f64 * step_x).floor() as i64;
                let y = (request.region.top + oy as f64 * step_y).floor() as i64;
                out.extend_from_slice(&self.page.pixel(x, y, self.text_visible));
            }
        }
        out
    }

    fn element_at(&self, _x: f64, _y: f64) -> Option<ElementId> {
        self.hit_element
    }

    fn focus(&mut self, element: ElementId) {
        self.calls.push(format!("focus:{}", element));
    }

    fn dispatch_mouse(&mut self, element: ElementId, kind: MouseEventKind, x: f64, y: f64) {
        self.calls
            .push(format!("mouse:{:?}:{}@{},{}", kind, element, x, y));
    }

    fn active_element(&self) -> Option<ActiveElement> {
        self.active.clone()
    }

    fn dispatch_key(&mut self, event: &KeyEvent) {
        self.calls
            .push(format!("key:{:?}:{}:{}", event.kind, event.key, event.key_code));
    }

    fn input_boxes(&self) -> Vec<InputBoxInfo> {
        self.inputs.clone()
    }

    fn set_input_value(&mut self, id: &str, text: &str) -> bool {
        let found = self.inputs.iter().any(|i| i.id == id);
        if found {
            self.calls.push(format!("input:{}={}", id, text));
        }
        found
    }

    fn navigate(&mut self, url: &str) {
        self.location = url.to_string();
        self.calls.push(format!("navigate:{}", url));
    }

    fn history_back(&mut self) {
        self.calls.push("history_back".to_string());
    }

    fn stop(&mut self) {
        self.calls.push("stop".to_string());
    }

    fn reload(&mut self) {
        self.calls.push("reload".to_string());
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn body_html(&self) -> String {
        self.body.clone()
    }

    fn favicon_href(&self) -> Option<String> {
        self.favicon.clone()
    }
}

/// A recorded browser action
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserCall {
    Reload(TabId),
    Remove(TabId),
    Create(String),
    Duplicate(TabId),
    Activate(TabId),
    Resize(i64, i64),
    UserAgent(Option<String>),
}

/// A scripted browser
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    pub tabs: Vec<NativeTab>,
    pub calls: Vec<BrowserCall>,
    next_id: TabId,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self {
            tabs: Vec::new(),
            calls: Vec::new(),
            next_id: 100,
        }
    }

    /// Add or replace a native tab
    pub fn upsert(&mut self, tab: NativeTab) {
        match self.tabs.iter_mut().find(|t| t.id == tab.id) {
            Some(existing) => *existing = tab,
            None => self.tabs.push(tab),
        }
    }

    pub fn reload_count(&self, id: TabId) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == BrowserCall::Reload(id))
            .count()
    }
}

impl BrowserHost for MockBrowser {
    fn list_tabs(&mut self) -> Vec<NativeTab> {
        self.tabs.clone()
    }

    fn reload_tab(&mut self, id: TabId) {
        self.calls.push(BrowserCall::Reload(id));
    }

    fn remove_tab(&mut self, id: TabId) {
        self.tabs.retain(|t| t.id != id);
        self.calls.push(BrowserCall::Remove(id));
    }

    fn create_tab(&mut self, url: &str) -> TabId {
        self.next_id += 1;
        let id = self.next_id;
        self.tabs.push(NativeTab {
            id,
            url: url.to_string(),
            ..Default::default()
        });
        self.calls.push(BrowserCall::Create(url.to_string()));
        id
    }

    fn duplicate_tab(&mut self, id: TabId) {
        self.calls.push(BrowserCall::Duplicate(id));
    }

    fn activate_tab(&mut self, id: TabId) {
        for tab in &mut self.tabs {
            tab.active = tab.id == id;
        }
        self.calls.push(BrowserCall::Activate(id));
    }

    fn resize_window(&mut self, width: i64, height: i64) {
        self.calls.push(BrowserCall::Resize(width, height));
    }

    fn set_user_agent(&mut self, user_agent: Option<&str>) {
        self.calls
            .push(BrowserCall::UserAgent(user_agent.map(|s| s.to_string())));
    }
}

//! Tab renderer
//!
//! Runs inside one tab. Answers hub commands by building and sending text and
//! pixel frames, forwards terminal input into the page, and serves raw text
//! requests. Timed work (mutation rebuilds, delayed frames) is driven by
//! `tick` with an injected clock so the whole state machine is synchronous.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::dimensions::{Dimensions, SubFrameKind, TtySize};
use super::frame::{composite, to_ansi, FrameContext};
use super::graphics::{GraphicsBuilder, Screenshot};
use super::grid::TtyGrid;
use super::input::{InputBoxContent, InputMapper, InputOutcome, StdinEvent};
use super::serialise::{
    collect_input_boxes, PageInfo, RawTextMode, RawTextPayload, RawTextWriter, TextFrame,
};
use super::text::TextBuilder;
use crate::config::{Config, FrameEncoding};
use crate::constants::MOUSEDOWN_TEXT_FRAME_DELAY_MS;
use crate::host::{DomHost, Size, TabId};
use crate::hub::protocol::{json_command, Command, DimensionsReport, MessageSender, TabInfo};

/// What the tab was asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Interactive,
    RawText(RawTextMode),
}

impl RenderMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "interactive" => Some(Self::Interactive),
            other => RawTextMode::from_name(other).map(Self::RawText),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::RawText(mode) => mode.name(),
        }
    }
}

/// Per-tab frame producer
pub struct TabRenderer<H: DomHost, S: MessageSender> {
    host: H,
    sender: S,
    id: TabId,
    config: Config,
    dims: Dimensions,
    graphics: GraphicsBuilder,
    text: TextBuilder,
    /// Last text grid, for mapping clicks and compositing
    grid: TtyGrid,
    input: InputMapper,
    mode: Option<RenderMode>,
    is_first_frame_finished: bool,
    reported_char: Option<Size>,
    mutation_pending: bool,
    next_mutation_drain: Option<Instant>,
    text_frame_due: Option<Instant>,
    raw_text_due: Option<Instant>,
    started_at: Instant,
    page_load_duration: Option<Duration>,
}

impl<H: DomHost, S: MessageSender> TabRenderer<H, S> {
    pub fn new(host: H, sender: S, id: TabId, config: Config, now: Instant) -> Self {
        let dims = Dimensions::new(&config.render, config.http_server.max_rows);
        Self {
            host,
            sender,
            id,
            graphics: GraphicsBuilder::new(config.http_server.jpeg_quality),
            text: TextBuilder::new(config.render.clone()),
            config,
            dims,
            grid: TtyGrid::default(),
            input: InputMapper::new(),
            mode: None,
            is_first_frame_finished: false,
            reported_char: None,
            mutation_pending: false,
            next_mutation_drain: None,
            text_frame_due: None,
            raw_text_due: None,
            started_at: now,
            page_load_duration: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn sender_mut(&mut self) -> &mut S {
        &mut self.sender
    }

    pub fn dimensions(&self) -> &Dimensions {
        &self.dims
    }

    pub fn mode(&self) -> Option<RenderMode> {
        self.mode
    }

    fn send(&mut self, message: String) {
        self.sender.send_message(message);
    }

    /// Announce the page once the link is up
    pub fn start(&mut self) {
        self.send_tab_info();
        self.send("/status,page_init".to_string());
    }

    /// The page is about to navigate away
    pub fn window_unload(&mut self) {
        self.send("/status,window_unload".to_string());
    }

    /// The page and its resources finished loading
    pub fn page_loaded(&mut self, now: Instant) {
        let duration = now.saturating_duration_since(self.started_at);
        self.page_load_duration = Some(duration);
        debug!("Page loaded in {}ms", duration.as_millis());
        if let Some(RenderMode::RawText(_)) = self.mode {
            self.schedule_raw_text(now);
        }
    }

    /// The DOM changed; rebuilt on the next drain
    pub fn note_mutation(&mut self) {
        self.mutation_pending = true;
    }

    pub fn is_mutation_pending(&self) -> bool {
        self.mutation_pending
    }

    /// Handle one command from the hub
    pub fn handle_message(&mut self, message: &str, now: Instant) {
        let cmd = match Command::parse(message) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("Tab {}: {}", self.id, e);
                return;
            }
        };
        if let Err(e) = self.dispatch(&cmd, now) {
            warn!("Tab {}: {}", self.id, e);
        }
    }

    fn dispatch(
        &mut self,
        cmd: &Command,
        now: Instant,
    ) -> Result<(), crate::hub::protocol::ProtocolError> {
        match cmd.name() {
            "/config" => {
                let config: Config = cmd.json()?;
                self.load_config(config);
            }
            "/mode" => {
                let name = cmd.arg(1)?;
                match RenderMode::from_name(name) {
                    Some(mode) => self.set_mode(mode, now),
                    None => warn!("Tab {}: unknown mode {:?}", self.id, name),
                }
            }
            "/request_frame" => self.send_frame(),
            "/rebuild_text" => {
                if self.mode == Some(RenderMode::Interactive) {
                    self.send_all_big_frames();
                }
            }
            "/scroll_status" => {
                let (x, y) = (cmd.int_arg(1)?, cmd.int_arg(2)?);
                self.handle_scroll(x, y);
            }
            "/tty_size" => {
                let (w, h) = (cmd.int_arg(1)?, cmd.int_arg(2)?);
                self.handle_tty_size(w, h);
            }
            "/stdin" => {
                let event: StdinEvent = cmd.json()?;
                self.handle_input(&event, now);
            }
            "/input_box" => {
                let content: InputBoxContent = cmd.json()?;
                if !self.host.set_input_value(&content.id, &content.text) {
                    debug!("Input box {} no longer exists", content.id);
                }
            }
            "/url" => {
                let url = cmd.rest();
                self.host.navigate(&url);
            }
            "/history_back" => self.host.history_back(),
            "/window_stop" => self.host.stop(),
            other => {
                info!("Tab {}: unknown command {:?}", self.id, other);
            }
        }
        Ok(())
    }

    fn load_config(&mut self, config: Config) {
        let tty = self.dims.tty;
        let frame = self.dims.frame;
        self.dims = Dimensions::new(&config.render, config.http_server.max_rows);
        self.dims.tty = tty;
        self.dims.frame.x_scroll = frame.x_scroll;
        self.dims.frame.y_scroll = frame.y_scroll;
        self.graphics = GraphicsBuilder::new(config.http_server.jpeg_quality);
        self.text = TextBuilder::new(config.render.clone());
        self.config = config;
        self.next_mutation_drain = None;
    }

    fn set_mode(&mut self, mode: RenderMode, now: Instant) {
        debug!("Tab {} mode: {}", self.id, mode.name());
        self.mode = Some(mode);
        match mode {
            RenderMode::Interactive => self.send_all_big_frames(),
            RenderMode::RawText(_) => {
                if self.page_load_duration.is_some() {
                    self.schedule_raw_text(now);
                }
            }
        }
    }

    fn schedule_raw_text(&mut self, now: Instant) {
        let delay = Duration::from_millis(self.config.http_server.render_delay);
        self.raw_text_due = Some(now + delay);
    }

    /// Run whatever is due
    pub fn tick(&mut self, now: Instant) {
        let interval = Duration::from_millis(self.config.render.mutation_drain_interval);
        match self.next_mutation_drain {
            Some(due) if now < due => {}
            _ => {
                self.next_mutation_drain = Some(now + interval);
                if self.mutation_pending {
                    self.mutation_pending = false;
                    debug!("Tab {}: rebuilding text after DOM mutation", self.id);
                    self.send_all_big_frames();
                }
            }
        }

        if self.text_frame_due.is_some_and(|due| now >= due) {
            self.text_frame_due = None;
            self.send_small_text_frame();
        }

        if self.raw_text_due.is_some_and(|due| now >= due) {
            self.raw_text_due = None;
            self.send_raw_text();
        }
    }

    /// Recompute dimensions, reporting them when they change
    fn update_dimensions(&mut self) -> bool {
        if !self.dims.update(&mut self.host) {
            return false;
        }
        if self.reported_char != Some(self.dims.char) || self.dims.dom.is_new {
            self.reported_char = Some(self.dims.char);
            let report = DimensionsReport {
                char: self.dims.char,
                dom: Size::new(self.dims.dom.width, self.dims.dom.height),
            };
            if let Some(message) = json_command("/dimensions", &report) {
                self.send(message);
            }
        }
        true
    }

    fn is_interactive_with_tty(&self, what: &str) -> bool {
        if self.mode != Some(RenderMode::Interactive) {
            return false;
        }
        if !self.dims.tty.is_known() {
            debug!("Not sending {} without TTY data", what);
            return false;
        }
        true
    }

    /// The hub's periodic frame request
    pub fn send_frame(&mut self) {
        if !self.update_dimensions() {
            debug!("Tab {}: page not ready for a frame", self.id);
            return;
        }
        if self.dims.dom.is_new {
            self.send_all_big_frames();
        }
        self.send_small_pixel_frame();
        self.send_tab_info();
        if !self.is_first_frame_finished {
            self.send("/status,parsing_complete".to_string());
        }
        self.is_first_frame_finished = true;
    }

    /// Rebuild text and graphics for the buffered region around the viewport
    pub fn send_all_big_frames(&mut self) {
        if !self.is_interactive_with_tty("big frames") {
            return;
        }
        if !self.update_dimensions() {
            return;
        }
        self.dims.set_sub_frame(SubFrameKind::Big);
        let ctx = FrameContext::capture(&mut self.host, self.dims.clone(), &self.graphics, true);
        let build = self.text.build(&mut self.host, &ctx);
        if build.reflow_pending {
            // Realigned text only lays out on the next frame
            self.mutation_pending = true;
        }
        self.grid = build.grid;
        self.send_text_frame(&ctx.dims);
        self.send_pixel_frame(&ctx.scaled, &ctx.dims);
        self.dims.mark_big_frame();
    }

    /// Graphics for exactly the visible area
    pub fn send_small_pixel_frame(&mut self) {
        if !self.is_interactive_with_tty("small frames") {
            return;
        }
        if !self.update_dimensions() {
            return;
        }
        self.dims.set_sub_frame(SubFrameKind::Small);
        let scaled = self.graphics.scaled_screenshot(&mut self.host, &self.dims);
        let dims = self.dims.clone();
        self.send_pixel_frame(&scaled, &dims);
        if self.config.render.frame_encoding == FrameEncoding::Ansi {
            let ctx = FrameContext {
                dims,
                with_text: Screenshot::default(),
                without_text: Screenshot::default(),
                scaled,
            };
            let cells = composite(&ctx, &self.grid);
            self.send(format!("/frame,{}", to_ansi(&cells, ctx.dims.tty.width)));
        }
    }

    /// Text for exactly the visible area
    pub fn send_small_text_frame(&mut self) {
        if !self.is_interactive_with_tty("small frames") {
            return;
        }
        if !self.update_dimensions() {
            return;
        }
        self.dims.set_sub_frame(SubFrameKind::Small);
        let ctx = FrameContext::capture(&mut self.host, self.dims.clone(), &self.graphics, false);
        self.grid = self.text.build(&mut self.host, &ctx).grid;
        self.send_text_frame(&ctx.dims);
    }

    fn send_text_frame(&mut self, dims: &Dimensions) {
        let boxes = collect_input_boxes(&self.host, dims);
        let frame = TextFrame::from_grid(&self.grid, dims, self.id, boxes);
        if frame.text.is_empty() {
            debug!("Not sending empty text frame");
            return;
        }
        if let Some(message) = json_command("/frame_text", &frame) {
            self.send(message);
        }
    }

    fn send_pixel_frame(&mut self, scaled: &Screenshot, dims: &Dimensions) {
        let Some(frame) = self.graphics.pixel_frame(scaled, dims, self.id) else {
            debug!("Not sending empty pixel frame");
            return;
        };
        if let Some(message) = json_command("/frame_pixels", &frame) {
            self.send(message);
        }
    }

    fn send_tab_info(&mut self) {
        let info = TabInfo {
            url: self.host.location(),
            title: self.host.title(),
        };
        if let Some(message) = json_command("/tab_info", &info) {
            self.send(message);
        }
    }

    fn handle_scroll(&mut self, x: i64, y: i64) {
        // Whole TTY rows only, so text and half-block rows stay paired
        let y = y - y.rem_euclid(2);
        self.dims.frame.x_scroll = x;
        self.dims.frame.y_scroll = y;
        if !self.update_dimensions() {
            return;
        }
        let sf = self.dims.scale_factor;
        self.host
            .scroll_to(x as f64 / sf.width, y as f64 / sf.height);
        if self.mode == Some(RenderMode::Interactive) && self.dims.needs_big_frame() {
            debug!(
                "Parsing big frames: previous-y: {}, y-scroll: {}",
                self.dims.frame.y_last_big_frame, self.dims.frame.y_scroll
            );
            self.send_all_big_frames();
        }
    }

    fn handle_tty_size(&mut self, width: i64, height: i64) {
        let Some(tty) = TtySize::checked(width, height) else {
            debug!("Tab {}: ignoring TTY size {}x{}", self.id, width, height);
            return;
        };
        self.dims.tty = tty;
        self.send_all_big_frames();
    }

    fn handle_input(&mut self, event: &StdinEvent, now: Instant) {
        let outcome = self
            .input
            .handle(&mut self.host, &self.grid, &self.dims, event);
        if outcome == InputOutcome::TextFrameSoon {
            self.text_frame_due = Some(now + Duration::from_millis(MOUSEDOWN_TEXT_FRAME_DELAY_MS));
        }
    }

    /// Build and send the whole page as text
    pub fn send_raw_text(&mut self) {
        let Some(RenderMode::RawText(mode)) = self.mode else {
            return;
        };
        if !self.update_dimensions() {
            debug!("Tab {}: page not ready for raw text", self.id);
            return;
        }
        let start = Instant::now();
        let body = match mode {
            RawTextMode::Dom => self.host.body_html(),
            RawTextMode::Plain | RawTextMode::Html => {
                self.dims.set_sub_frame(SubFrameKind::RawText);
                let with_scaled = mode == RawTextMode::Html;
                let ctx =
                    FrameContext::capture(&mut self.host, self.dims.clone(), &self.graphics, with_scaled);
                let build = self.text.build(&mut self.host, &ctx);
                let background = if with_scaled {
                    self.graphics.jpeg_data_uri(&ctx.scaled).unwrap_or_else(|e| {
                        warn!("Raw text background: {:#}", e);
                        String::new()
                    })
                } else {
                    String::new()
                };
                let page = PageInfo {
                    title: self.host.title(),
                    favicon: self.host.favicon_href(),
                    background,
                };
                let http = &self.config.http_server;
                let writer = RawTextWriter::new(mode, &http.header, &http.footer);
                let parsing = start.elapsed().as_millis() as u64;
                writer.document(&build.grid, &build.styles, &ctx.dims, &page, parsing)
            }
        };
        let payload = RawTextPayload {
            body,
            page_load_duration: self
                .page_load_duration
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            parsing_duration: start.elapsed().as_millis() as u64,
        };
        debug!("raw text: {}ms", payload.parsing_duration);
        if let Some(message) = json_command("/raw_text", &payload) {
            self.send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::MockDom;
    use crate::host::Rect;
    use crate::utils::Rgb;

    fn config() -> Config {
        let mut config = Config::default();
        config.render.char_height_fudge = 0.0;
        config
    }

    fn page() -> MockDom {
        let mut host = MockDom::new(Size::new(2.0, 4.0), Size::new(40.0, 40.0));
        host.page
            .paint(Rect::new(0.0, 0.0, 10.0, 4.0), Rgb::BLACK, true);
        host.add_text(1, "hello", vec![Rect::new(0.0, 0.0, 10.0, 4.0)]);
        host.hit_element = Some(3);
        host.title = "Hello".to_string();
        host.location = "https://example.com/".to_string();
        host
    }

    fn renderer(host: MockDom, now: Instant) -> TabRenderer<MockDom, Vec<String>> {
        TabRenderer::new(host, Vec::new(), 7, config(), now)
    }

    fn commands(r: &TabRenderer<MockDom, Vec<String>>) -> Vec<&str> {
        r.sender()
            .iter()
            .map(|m| m.split(',').next().unwrap_or(""))
            .collect()
    }

    fn interactive(now: Instant) -> TabRenderer<MockDom, Vec<String>> {
        let mut r = renderer(page(), now);
        r.handle_message("/tty_size,20,10", now);
        r.handle_message("/mode,interactive", now);
        r
    }

    #[test]
    fn test_big_frames_on_interactive_mode() {
        let now = Instant::now();
        let mut r = renderer(page(), now);
        r.handle_message("/tty_size,20,10", now);
        assert!(r.sender().is_empty());

        r.handle_message("/mode,interactive", now);
        assert_eq!(
            commands(&r),
            vec!["/dimensions", "/frame_text", "/frame_pixels"]
        );
        let json = r.sender()[1].split_once(',').unwrap().1;
        let frame: TextFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.meta.id, 7);
        assert_eq!(frame.text.len(), 20 * 10);
        assert_eq!(frame.text[..5].join(""), "hello");
    }

    #[test]
    fn test_request_frame_reports_parsing_complete_once() {
        let now = Instant::now();
        let mut r = interactive(now);
        r.sender_mut().clear();

        r.handle_message("/request_frame", now);
        assert_eq!(
            commands(&r),
            vec!["/frame_pixels", "/tab_info", "/status"]
        );
        assert_eq!(r.sender()[2], "/status,parsing_complete");
        assert!(r.sender()[1].contains("https://example.com/"));

        r.sender_mut().clear();
        r.handle_message("/request_frame", now);
        assert_eq!(commands(&r), vec!["/frame_pixels", "/tab_info"]);
    }

    #[test]
    fn test_not_ready_skips_frames() {
        let now = Instant::now();
        let mut r = renderer(page(), now);
        r.handle_message("/mode,interactive", now);
        r.handle_message("/request_frame", now);
        assert!(!commands(&r).contains(&"/frame_pixels"));

        let mut host = page();
        host.char_box = None;
        let mut r = renderer(host, now);
        r.handle_message("/tty_size,20,10", now);
        r.handle_message("/mode,interactive", now);
        r.handle_message("/request_frame", now);
        assert!(r.sender().is_empty());
    }

    #[test]
    fn test_mutations_coalesce_into_one_rebuild() {
        let now = Instant::now();
        let mut r = interactive(now);
        r.sender_mut().clear();

        r.note_mutation();
        r.note_mutation();
        r.tick(now);
        assert!(!r.is_mutation_pending());
        assert_eq!(commands(&r), vec!["/frame_text", "/frame_pixels"]);

        r.sender_mut().clear();
        r.note_mutation();
        r.tick(now + Duration::from_millis(50));
        assert!(r.sender().is_empty());
        r.tick(now + Duration::from_millis(100));
        assert_eq!(commands(&r), vec!["/frame_text", "/frame_pixels"]);
    }

    #[test]
    fn test_bad_tty_size_ignored() {
        let now = Instant::now();
        let mut r = interactive(now);
        r.sender_mut().clear();

        r.handle_message("/tty_size,9223372036854775807,2", now);
        r.handle_message("/tty_size,0,10", now);
        r.handle_message("/tty_size,20,-3", now);
        assert!(r.sender().is_empty());
        assert_eq!(
            r.dimensions().tty,
            TtySize {
                width: 20,
                height: 10
            }
        );
    }

    #[test]
    fn test_odd_scroll_rounds_to_whole_row() {
        let now = Instant::now();
        let mut host = page();
        host.scroll_size = Size::new(40.0, 2000.0);
        let mut r = renderer(host, now);
        r.handle_message("/tty_size,20,10", now);
        r.handle_message("/mode,interactive", now);

        r.handle_message("/scroll_status,0,51", now);
        assert_eq!(r.dimensions().frame.y_scroll, 50);
        assert_eq!(r.host().scroll.y, 100.0);
    }

    #[test]
    fn test_scroll_rebuilds_past_threshold() {
        let now = Instant::now();
        let mut host = page();
        host.scroll_size = Size::new(40.0, 2000.0);
        let mut r = renderer(host, now);
        r.handle_message("/tty_size,20,10", now);
        r.handle_message("/mode,interactive", now);
        r.sender_mut().clear();

        // (6 - 1) * 10 rows of slack
        r.handle_message("/scroll_status,0,50", now);
        assert!(!commands(&r).contains(&"/frame_text"));
        assert_eq!(r.host().scroll.y, 100.0);

        r.handle_message("/scroll_status,0,60", now);
        assert!(commands(&r).contains(&"/frame_text"));
        assert_eq!(r.dimensions().frame.y_last_big_frame, 60);
    }

    #[test]
    fn test_mouse_down_sends_text_frame_later() {
        let now = Instant::now();
        let mut r = interactive(now);
        r.sender_mut().clear();

        r.handle_message(r#"/stdin,{"mouse_x":1,"mouse_y":0,"button":1}"#, now);
        assert_eq!(
            r.host().calls_matching("mouse:"),
            vec!["mouse:Move:3@3,2", "mouse:Down:3@3,2"]
        );
        r.tick(now + Duration::from_millis(499));
        assert!(!commands(&r).contains(&"/frame_text"));
        r.tick(now + Duration::from_millis(500));
        assert!(commands(&r).contains(&"/frame_text"));
    }

    #[test]
    fn test_raw_text_after_render_delay() {
        let now = Instant::now();
        let mut r = renderer(page(), now);
        r.handle_message("/mode,raw_text_plain", now);
        r.tick(now);
        assert!(r.sender().is_empty());

        let loaded = now + Duration::from_millis(250);
        r.page_loaded(loaded);
        r.tick(loaded + Duration::from_millis(399));
        assert!(!commands(&r).contains(&"/raw_text"));
        r.tick(loaded + Duration::from_millis(400));

        let raw = r
            .sender()
            .iter()
            .find(|m| m.starts_with("/raw_text,"))
            .unwrap();
        let payload: RawTextPayload =
            serde_json::from_str(raw.split_once(',').unwrap().1).unwrap();
        assert!(payload.body.starts_with("\nhello"));
        assert_eq!(payload.page_load_duration, 250);
        assert!(payload.body.contains("Built on"));
    }

    #[test]
    fn test_raw_text_dom_sends_body() {
        let now = Instant::now();
        let mut host = page();
        host.body = "<p>hello</p>".to_string();
        let mut r = renderer(host, now);
        r.page_loaded(now);
        r.handle_message("/mode,raw_text_dom", now);
        r.tick(now + Duration::from_millis(400));
        let raw = r.sender().last().unwrap();
        assert!(raw.starts_with("/raw_text,"));
        assert!(raw.contains(r#""body":"<p>hello</p>""#));
    }

    #[test]
    fn test_ansi_frames() {
        let now = Instant::now();
        let mut r = interactive(now);
        let mut config = config();
        config.render.frame_encoding = FrameEncoding::Ansi;
        let json = config.to_json().unwrap();
        r.handle_message(&format!("/config,{}", json), now);
        r.sender_mut().clear();

        r.handle_message("/request_frame", now);
        let frame = r
            .sender()
            .iter()
            .find(|m| m.starts_with("/frame,"))
            .unwrap();
        assert_eq!(frame.matches('\n').count(), 9);
        assert!(frame.contains("hello"));
    }

    #[test]
    fn test_page_commands() {
        let now = Instant::now();
        let mut r = renderer(page(), now);
        r.handle_message("/url,https://example.com/?a=1,2", now);
        r.handle_message("/history_back", now);
        r.handle_message("/window_stop", now);
        r.handle_message("/no_such_command,1", now);
        r.handle_message("/scroll_status,x", now);
        assert_eq!(
            r.host().calls,
            vec!["navigate:https://example.com/?a=1,2", "history_back", "stop"]
        );
    }
}

//! Browser window sizing
//!
//! The window is sized so the page viewport matches the TTY once the tab and
//! URL bars are taken off. Needs both the TTY size and a measured character.

use log::{debug, info};

use crate::config::{Config, RenderConfig};
use crate::dom::dimensions::TtySize;
use crate::host::{BrowserHost, Size};

#[derive(Debug, Clone, PartialEq)]
pub struct HubDimensions {
    pub tty: TtySize,
    pub char: Option<Size>,
    /// TTY size used for raw text tabs, which have no terminal
    pub raw_text_tty: TtySize,
    window_ui_rows: f64,
    tty_ui_rows: i64,
}

impl HubDimensions {
    pub fn new(config: &Config) -> Self {
        let mut dims = Self {
            tty: TtySize::default(),
            char: None,
            raw_text_tty: TtySize::default(),
            window_ui_rows: 0.0,
            tty_ui_rows: 0,
        };
        dims.apply_config(config);
        dims
    }

    pub fn apply_config(&mut self, config: &Config) {
        let RenderConfig {
            window_ui_rows,
            tty_ui_rows,
            ..
        } = config.render;
        self.window_ui_rows = window_ui_rows;
        self.tty_ui_rows = tty_ui_rows;
        self.raw_text_tty = TtySize {
            width: config.http_server.columns,
            height: config.http_server.rows,
        };
    }

    /// Record a measured character; true when it differs from the last one
    pub fn set_char(&mut self, char: Size) -> bool {
        if self.char == Some(char) {
            return false;
        }
        info!(
            "New char dimensions: {}x{} (old: {:?})",
            char.width, char.height, self.char
        );
        self.char = Some(char);
        true
    }

    /// Window size in pixels, `None` until both sizes are known
    pub fn window_size(&self) -> Option<(i64, i64)> {
        let char = self.char?;
        if !self.tty.is_known() || char.width <= 0.0 || char.height <= 0.0 {
            return None;
        }
        let width = (self.tty.width as f64 * char.width).round() as i64;
        let dom_rows = (self.tty.height - self.tty_ui_rows) as f64;
        let height = ((dom_rows + self.window_ui_rows) * char.height).round() as i64;
        Some((width, height))
    }

    /// Resize the browser window if possible; returns whether it was resized
    pub fn resize_browser_window(&self, browser: &mut dyn BrowserHost) -> bool {
        match self.window_size() {
            Some((width, height)) => {
                debug!("Resizing browser window to {}x{}", width, height);
                browser.resize_window(width, height);
                true
            }
            None => {
                debug!("Not resizing browser window without all of the TTY and character dimensions");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{BrowserCall, MockBrowser};

    #[test]
    fn test_window_size() {
        let mut dims = HubDimensions::new(&Config::default());
        assert_eq!(dims.window_size(), None);
        dims.tty = TtySize {
            width: 80,
            height: 24,
        };
        assert_eq!(dims.window_size(), None);
        assert!(dims.set_char(Size::new(8.5, 19.0)));
        assert!(!dims.set_char(Size::new(8.5, 19.0)));
        // (24 - 2 + 3) * 19
        assert_eq!(dims.window_size(), Some((680, 475)));
    }

    #[test]
    fn test_resize_needs_both_sizes() {
        let mut browser = MockBrowser::new();
        let mut dims = HubDimensions::new(&Config::default());
        dims.set_char(Size::new(10.0, 20.0));
        assert!(!dims.resize_browser_window(&mut browser));
        dims.tty = TtySize {
            width: 10,
            height: 10,
        };
        assert!(dims.resize_browser_window(&mut browser));
        assert_eq!(browser.calls, vec![BrowserCall::Resize(100, 220)]);
    }

    #[test]
    fn test_raw_text_tty_from_config() {
        let dims = HubDimensions::new(&Config::default());
        assert_eq!(dims.raw_text_tty.width, 100);
        assert_eq!(dims.raw_text_tty.height, 30);
    }
}

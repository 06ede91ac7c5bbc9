//! Input mapping
//!
//! Terminal keystrokes and mouse events become DOM events. Mouse positions
//! are TTY cells; a cell holding a snapped character is mapped back to the
//! character's original DOM position so the click lands on the real glyph.

use bitflags::bitflags;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::dimensions::Dimensions;
use super::grid::TtyGrid;
use crate::host::{DomHost, KeyEvent, KeyEventKind, MouseEventKind, Point};

/// Key code the terminal sends for CTRL+R
const KEY_RELOAD: i64 = 18;
const KEY_ENTER: i64 = 13;

bitflags! {
    /// Keyboard modifiers as sent in `/stdin`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyMods: u32 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
        const META  = 0b1000;
    }
}

/// `/stdin` payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StdinEvent {
    pub key: i64,
    pub char: String,
    #[serde(rename = "mod")]
    pub modifiers: u32,
    pub mouse_x: i64,
    pub mouse_y: i64,
    /// 1 while held, 0 on release
    pub button: i64,
}

impl StdinEvent {
    pub fn mods(&self) -> KeyMods {
        KeyMods::from_bits_truncate(self.modifiers)
    }

    /// Keyboard events carry a key code or a character; mouse events neither
    pub fn is_key(&self) -> bool {
        self.key != 0 || !self.char.is_empty()
    }
}

/// `/input_box` payload
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputBoxContent {
    pub id: String,
    pub text: String,
}

/// What the renderer should do after an input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Handled,
    /// A button went down; send a small text frame shortly
    TextFrameSoon,
}

/// Dispatches terminal input into the page
#[derive(Debug, Default)]
pub struct InputMapper {
    mouse_down: bool,
}

impl InputMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mouse_down(&self) -> bool {
        self.mouse_down
    }

    pub fn handle(
        &mut self,
        host: &mut dyn DomHost,
        grid: &TtyGrid,
        dims: &Dimensions,
        event: &StdinEvent,
    ) -> InputOutcome {
        if event.is_key() {
            if event.key == KEY_RELOAD {
                debug!("Reload requested from the terminal");
                host.reload();
            }
            dispatch_key(host, event);
            return InputOutcome::Handled;
        }
        self.handle_mouse(host, grid, dims, event)
    }

    fn handle_mouse(
        &mut self,
        host: &mut dyn DomHost,
        grid: &TtyGrid,
        dims: &Dimensions,
        event: &StdinEvent,
    ) -> InputOutcome {
        let at = dom_coords_for_mouse(grid, dims, event.mouse_x, event.mouse_y);
        match event.button {
            1 => {
                mouse_action(host, MouseEventKind::Move, at);
                let was_down = self.mouse_down;
                self.mouse_down = true;
                if !was_down {
                    mouse_action(host, MouseEventKind::Down, at);
                    return InputOutcome::TextFrameSoon;
                }
            }
            0 => {
                mouse_action(host, MouseEventKind::Move, at);
                if self.mouse_down {
                    mouse_action(host, MouseEventKind::Click, at);
                    mouse_action(host, MouseEventKind::Up, at);
                }
                self.mouse_down = false;
            }
            other => trace!("Ignoring mouse button {}", other),
        }
        InputOutcome::Handled
    }
}

/// Absolute DOM point for a click on a TTY cell, centred on the character
pub fn dom_coords_for_mouse(grid: &TtyGrid, dims: &Dimensions, mouse_x: i64, mouse_y: i64) -> Point {
    let x = dims.frame.x_scroll + mouse_x;
    let y = dims.frame.y_scroll / 2 + mouse_y;
    let origin = match grid.cell_at(x, y).filter(|c| !c.is_transparent()) {
        // Text may have moved while snapping; aim at where it really is
        Some(cell) => cell.dom_coords,
        None => Point {
            x: x as f64 * dims.char.width,
            y: y as f64 * dims.char.height,
        },
    };
    Point {
        x: origin.x + dims.char.width / 2.0,
        y: origin.y + dims.char.height / 2.0,
    }
}

fn mouse_action(host: &mut dyn DomHost, kind: MouseEventKind, at: Point) {
    let scroll = host.scroll_position();
    let Some(element) = host.element_at(at.x - scroll.x, at.y - scroll.y) else {
        debug!("No element under the mouse at {},{}", at.x, at.y);
        return;
    };
    host.focus(element);
    host.dispatch_mouse(element, kind, at.x, at.y);
}

fn dispatch_key(host: &mut dyn DomHost, event: &StdinEvent) {
    let key = |kind| KeyEvent {
        kind,
        key: event.char.clone(),
        key_code: event.key,
        modifiers: event.mods(),
    };
    let on_input = host
        .active_element()
        .map(|el| el.tag_name == "INPUT")
        .unwrap_or(false);
    // Plain inputs only submit on keypress; everything else listens for down/up
    if event.key == KEY_ENTER && on_input {
        host.dispatch_key(&key(KeyEventKind::Press));
    } else {
        host.dispatch_key(&key(KeyEventKind::Down));
        host.dispatch_key(&key(KeyEventKind::Up));
    }
}

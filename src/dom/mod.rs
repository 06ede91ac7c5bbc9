//! Per-tab frame pipeline
//!
//! Dimensions feed the graphics captures, the text builder places characters
//! on a grid using both, and the grid is serialised or composited with the
//! scaled capture into a frame.

pub mod cell;
pub mod dimensions;
pub mod frame;
pub mod graphics;
pub mod grid;
pub mod input;
pub mod renderer;
pub mod serialise;
pub mod text;

pub use dimensions::{Dimensions, SubFrameKind, TtySize};
pub use frame::{composite, to_ansi, FrameCell, FrameContext};
pub use graphics::{GraphicsBuilder, Screenshot};
pub use grid::{StyleTable, TtyGrid};
pub use renderer::{RenderMode, TabRenderer};
pub use text::{TextBuild, TextBuilder};

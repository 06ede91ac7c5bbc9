//! Graphics builder
//!
//! Captures the document's pixels. Two unscaled captures of the current DOM
//! sub-frame, one with text and one with text made transparent, let the grid
//! tell visible text from obscured text. A third capture scaled down to the
//! frame sub-frame is the half-block graphics layer.

use std::io::Cursor;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine;
use log::{debug, trace};
use serde::Serialize;

use super::dimensions::{Dimensions, FrameMeta};
use crate::host::{CaptureRequest, DomHost, Rect};
use crate::utils::Rgb;

/// A captured RGBA buffer and the absolute DOM region it covers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Screenshot {
    pixels: Vec<u8>,
    width: usize,
    height: usize,
    /// Absolute DOM origin of the captured region
    left: f64,
    top: f64,
}

impl Screenshot {
    /// Wrap raw RGBA data; a buffer of the wrong size is treated as empty
    pub fn new(pixels: Vec<u8>, width: usize, height: usize, left: f64, top: f64) -> Self {
        if pixels.len() != width * height * 4 {
            if !pixels.is_empty() {
                debug!(
                    "Discarding capture of {} bytes, expected {}x{}",
                    pixels.len(),
                    width,
                    height
                );
            }
            return Self::default();
        }
        Self {
            pixels,
            width,
            height,
            left,
            top,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Pixel at coordinates relative to the capture
    pub fn pixel_at(&self, x: i64, y: i64) -> Option<Rgb> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        let start = (y as usize * self.width + x as usize) * 4;
        Rgb::from_rgba(&self.pixels, start)
    }

    /// Pixel at absolute DOM coordinates, `None` outside the captured region
    pub fn unscaled_pixel_at(&self, x: i64, y: i64) -> Option<Rgb> {
        let (x, y) = (x as f64, y as f64);
        let right = self.left + self.width as f64;
        let bottom = self.top + self.height as f64;
        if x < self.left || x >= right || y < self.top || y >= bottom {
            return None;
        }
        self.pixel_at((x - self.left) as i64, (y - self.top) as i64)
    }
}

/// `/frame_pixels` payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PixelFrame {
    pub meta: FrameMeta,
    pub colours: Vec<u8>,
}

/// Screenshot capture and pixel frame serialisation
#[derive(Debug, Clone)]
pub struct GraphicsBuilder {
    jpeg_quality: u8,
}

impl GraphicsBuilder {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }

    /// Capture the DOM sub-frame with text visible
    pub fn screenshot_with_text(&self, host: &mut dyn DomHost, dims: &Dimensions) -> Screenshot {
        let start = Instant::now();
        host.set_text_visible(true);
        let shot = self.unscaled(host, dims);
        host.set_text_visible(false);
        debug!("get screenshot with text: {}ms", start.elapsed().as_millis());
        shot
    }

    /// Capture the DOM sub-frame with text transparent
    pub fn screenshot_without_text(
        &self,
        host: &mut dyn DomHost,
        dims: &Dimensions,
    ) -> Screenshot {
        let start = Instant::now();
        host.set_text_visible(false);
        let shot = self.unscaled(host, dims);
        debug!(
            "get screenshot without text: {}ms",
            start.elapsed().as_millis()
        );
        shot
    }

    /// Capture the DOM sub-frame scaled to one pixel per frame pixel
    pub fn scaled_screenshot(&self, host: &mut dyn DomHost, dims: &Dimensions) -> Screenshot {
        let start = Instant::now();
        let width = dims.frame.sub.width;
        let height = dims.frame.sub.height;
        let shot = self.capture(host, dims, width, height);
        debug!("get scaled screenshot: {}ms", start.elapsed().as_millis());
        shot
    }

    fn unscaled(&self, host: &mut dyn DomHost, dims: &Dimensions) -> Screenshot {
        let width = dims.dom.sub.width as i64;
        let height = dims.dom.sub.height as i64;
        self.capture(host, dims, width, height)
    }

    fn capture(
        &self,
        host: &mut dyn DomHost,
        dims: &Dimensions,
        width: i64,
        height: i64,
    ) -> Screenshot {
        if width <= 0 || height <= 0 {
            trace!("Zero-area capture {}x{} skipped", width, height);
            return Screenshot::default();
        }
        let sub = dims.dom.sub;
        let request = CaptureRequest {
            region: Rect::new(sub.left, sub.top, sub.width, sub.height),
            output_width: width as usize,
            output_height: height as usize,
        };
        let pixels = host.capture(&request);
        Screenshot::new(
            pixels,
            width as usize,
            height as usize,
            sub.left,
            sub.top,
        )
    }

    /// Row-major RGB triples of the scaled capture, `None` when empty
    pub fn pixel_frame(&self, scaled: &Screenshot, dims: &Dimensions, id: u64) -> Option<PixelFrame> {
        if scaled.is_empty() {
            return None;
        }
        let mut colours = Vec::with_capacity(scaled.width * scaled.height * 3);
        for px in scaled.pixels.chunks_exact(4) {
            colours.extend_from_slice(&px[..3]);
        }
        Some(PixelFrame {
            meta: dims.frame_meta(id),
            colours,
        })
    }

    /// JPEG data URI of the scaled capture, for raw HTML backgrounds
    pub fn jpeg_data_uri(&self, scaled: &Screenshot) -> Result<String> {
        if scaled.is_empty() {
            return Ok(String::new());
        }
        let mut rgb = Vec::with_capacity(scaled.width * scaled.height * 3);
        for px in scaled.pixels.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
        }
        let mut jpeg = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut jpeg), self.jpeg_quality);
        encoder
            .encode(
                &rgb,
                scaled.width as u32,
                scaled.height as u32,
                image::ColorType::Rgb8,
            )
            .context("Failed to encode background JPEG")?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&jpeg);
        Ok(format!("data:image/jpeg;base64,{}", encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::dom::dimensions::{SubFrameKind, TtySize};
    use crate::host::mock::MockDom;
    use crate::host::Size;

    fn setup() -> (MockDom, Dimensions) {
        let mut host = MockDom::new(Size::new(2.0, 4.0), Size::new(8.0, 8.0));
        host.page
            .paint(Rect::new(0.0, 0.0, 2.0, 2.0), Rgb::new(255, 0, 0), true);
        host.page
            .paint(Rect::new(4.0, 4.0, 4.0, 4.0), Rgb::new(0, 0, 255), false);
        let render = RenderConfig {
            char_height_fudge: 0.0,
            ..RenderConfig::default()
        };
        let mut dims = Dimensions::new(&render, 0);
        dims.update(&mut host);
        dims.tty = TtySize {
            width: 4,
            height: 2,
        };
        dims.set_sub_frame(SubFrameKind::Small);
        (host, dims)
    }

    #[test]
    fn test_text_toggle_between_captures() {
        let (mut host, dims) = setup();
        let graphics = GraphicsBuilder::new(90);
        let with_text = graphics.screenshot_with_text(&mut host, &dims);
        let without_text = graphics.screenshot_without_text(&mut host, &dims);
        assert_eq!(with_text.unscaled_pixel_at(1, 1), Some(Rgb::new(255, 0, 0)));
        assert_eq!(without_text.unscaled_pixel_at(1, 1), Some(Rgb::WHITE));
        assert_eq!(without_text.unscaled_pixel_at(5, 5), Some(Rgb::new(0, 0, 255)));
        assert!(!host.text_visible);
    }

    #[test]
    fn test_unscaled_pixel_outside_region() {
        let (mut host, dims) = setup();
        let shot = GraphicsBuilder::new(90).screenshot_with_text(&mut host, &dims);
        assert_eq!(shot.unscaled_pixel_at(8, 0), None);
        assert_eq!(shot.unscaled_pixel_at(-1, 0), None);
    }

    #[test]
    fn test_scaled_screenshot_matches_sub_frame() {
        let (mut host, dims) = setup();
        let graphics = GraphicsBuilder::new(90);
        let scaled = graphics.scaled_screenshot(&mut host, &dims);
        assert_eq!(scaled.width(), 4);
        assert_eq!(scaled.height(), 4);
        assert_eq!(scaled.pixel_at(3, 3), Some(Rgb::new(0, 0, 255)));
        let frame = graphics.pixel_frame(&scaled, &dims, 7).unwrap();
        assert_eq!(frame.colours.len(), 4 * 4 * 3);
        assert_eq!(frame.meta.id, 7);
    }

    #[test]
    fn test_zero_area_sub_frame_is_empty() {
        let (mut host, mut dims) = setup();
        dims.tty = TtySize::default();
        dims.set_sub_frame(SubFrameKind::Small);
        let graphics = GraphicsBuilder::new(90);
        let scaled = graphics.scaled_screenshot(&mut host, &dims);
        assert!(scaled.is_empty());
        assert!(graphics.pixel_frame(&scaled, &dims, 1).is_none());
    }

    #[test]
    fn test_jpeg_data_uri() {
        let (mut host, dims) = setup();
        let graphics = GraphicsBuilder::new(90);
        let scaled = graphics.scaled_screenshot(&mut host, &dims);
        let uri = graphics.jpeg_data_uri(&scaled).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,"));
    }
}

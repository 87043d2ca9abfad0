//! Off-screen render targets
//!
//! A [`Framebuffer`] pairs a pixel store with a depth buffer. The same type
//! backs the lit color target, the bloom mask target and the picking id
//! buffer. Targets are released explicitly during teardown; releasing twice
//! is logged and ignored.

use crate::foundation::color::Color;

/// Pixel rectangle, used as a scissor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    /// Left column
    pub x: u32,
    /// Top row
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect {
    /// Rectangle covering a single pixel
    pub fn pixel(x: u32, y: u32) -> Self {
        Self { x, y, width: 1, height: 1 }
    }

    /// Whether the pixel lies inside
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Pixel buffer with depth
#[derive(Debug, Clone, PartialEq)]
pub struct Framebuffer<T> {
    label: &'static str,
    width: u32,
    height: u32,
    pixels: Vec<T>,
    depth: Vec<f32>,
    released: bool,
}

/// Lit color target
pub type ColorTarget = Framebuffer<Color>;

/// Picking id buffer; 0 means background
pub type IdTarget = Framebuffer<u32>;

impl<T: Copy> Framebuffer<T> {
    /// Allocate a target filled with `clear`
    pub fn new(label: &'static str, width: u32, height: u32, clear: T) -> Self {
        let len = (width * height) as usize;
        Self {
            label,
            width,
            height,
            pixels: vec![clear; len],
            depth: vec![1.0; len],
            released: false,
        }
    }

    /// Debug label
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the storage has been released
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) as usize)
    }

    /// Fill every pixel and reset depth
    pub fn clear(&mut self, value: T) {
        self.pixels.fill(value);
        self.depth.fill(1.0);
    }

    /// Fill only the pixels inside `rect`
    pub fn clear_rect(&mut self, rect: Rect, value: T) {
        for y in rect.y..(rect.y + rect.height).min(self.height) {
            for x in rect.x..(rect.x + rect.width).min(self.width) {
                if let Some(i) = self.index(x, y) {
                    self.pixels[i] = value;
                    self.depth[i] = 1.0;
                }
            }
        }
    }

    /// Reset depth only
    pub fn clear_depth(&mut self) {
        self.depth.fill(1.0);
    }

    /// Pixel value
    pub fn get(&self, x: u32, y: u32) -> Option<T> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Overwrite a pixel
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = value;
        }
    }

    /// Stored depth
    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        self.index(x, y).map(|i| self.depth[i])
    }

    /// Overwrite depth
    pub fn set_depth(&mut self, x: u32, y: u32, depth: f32) {
        if let Some(i) = self.index(x, y) {
            self.depth[i] = depth;
        }
    }

    /// Row-major pixels
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    /// Mutable row-major pixels
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    /// Reallocate at a new size, filled with `clear`
    pub fn resize(&mut self, width: u32, height: u32, clear: T) {
        *self = Self::new(self.label, width, height, clear);
    }

    /// Free pixel storage; returns false if it was already released
    pub fn release(&mut self) -> bool {
        if self.released {
            log::warn!("Render target '{}' already released", self.label);
            return false;
        }
        self.pixels = Vec::new();
        self.depth = Vec::new();
        self.width = 0;
        self.height = 0;
        self.released = true;
        log::debug!("Released render target '{}'", self.label);
        true
    }
}

impl ColorTarget {
    /// Convert to 8-bit RGBA
    pub fn to_image(&self) -> image::RgbaImage {
        let mut out = image::RgbaImage::new(self.width, self.height);
        for (pixel, color) in out.pixels_mut().zip(&self.pixels) {
            let [r, g, b] = color.to_rgb8();
            *pixel = image::Rgba([r, g, b, 255]);
        }
        out
    }

    /// Largest per-channel difference against another target of the same size
    pub fn max_difference(&self, other: &Self) -> Option<f32> {
        if self.width != other.width || self.height != other.height {
            return None;
        }
        Some(
            self.pixels
                .iter()
                .zip(&other.pixels)
                .map(|(a, b)| (a.r - b.r).abs().max((a.g - b.g).abs()).max((a.b - b.b).abs()))
                .fold(0.0, f32::max),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_rect_only_touches_scissor() {
        let mut ids = IdTarget::new("ids", 4, 4, 7);
        ids.clear_rect(Rect::pixel(1, 2), 0);
        assert_eq!(ids.get(1, 2), Some(0));
        assert_eq!(ids.get(0, 0), Some(7));
        assert_eq!(ids.get(4, 0), None);
    }

    #[test]
    fn test_release_twice_is_harmless() {
        let mut target = ColorTarget::new("bloom", 2, 2, Color::BLACK);
        assert!(target.release());
        assert!(!target.release());
        assert!(target.is_released());
        assert!(target.pixels().is_empty());
    }

    #[test]
    fn test_to_image_and_difference() {
        let mut a = ColorTarget::new("a", 2, 1, Color::BLACK);
        a.set(1, 0, Color::WHITE);
        let image = a.to_image();
        assert_eq!(image.get_pixel(1, 0).0, [255, 255, 255, 255]);

        let b = ColorTarget::new("b", 2, 1, Color::BLACK);
        assert_eq!(a.max_difference(&b), Some(1.0));
        assert_eq!(a.max_difference(&ColorTarget::new("c", 1, 1, Color::BLACK)), None);
    }
}

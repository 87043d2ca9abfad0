//! Surface materials and textures
//!
//! Every scene node owns its material by value. Textures are immutable
//! decoded pixel data shared through `Arc`, so cloning a material never
//! duplicates image memory and never lets one node alter another's look.

use std::sync::Arc;

use crate::foundation::color::Color;

/// Decoded RGBA8 texture
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row-major RGBA8 pixels, top row first
    pub data: Vec<u8>,
}

impl Texture {
    /// Create a texture from raw RGBA8 data
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }

    /// Solid color texture
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba.repeat((width * height) as usize);
        Self::new(width, height, data)
    }

    /// Height over width
    pub fn aspect(&self) -> f32 {
        self.height as f32 / self.width.max(1) as f32
    }

    /// Nearest-neighbour sample; `v = 0` is the top row
    pub fn sample(&self, u: f32, v: f32) -> (Color, f32) {
        if self.width == 0 || self.height == 0 {
            return (Color::WHITE, 1.0);
        }
        let x = ((u.clamp(0.0, 1.0) * self.width as f32) as u32).min(self.width - 1);
        let y = ((v.clamp(0.0, 1.0) * self.height as f32) as u32).min(self.height - 1);
        let index = ((y * self.width + x) * 4) as usize;
        match self.data.get(index..index + 4) {
            Some(px) => (
                Color::from_rgb8(px[0], px[1], px[2]),
                f32::from(px[3]) / 255.0,
            ),
            None => (Color::WHITE, 1.0),
        }
    }
}

/// How a material responds to light
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shading {
    /// Lambert diffuse plus ambient
    Lit,
    /// Flat color, ignores lights
    Unlit,
    /// Animated horizontal scanline distortion
    Interference {
        /// Accumulated effect time in seconds
        time: f32,
        /// Strength of the scanline darkening
        intensity: f32,
    },
}

/// Which triangle faces a material draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    /// Counter-clockwise faces only
    Front,
    /// Clockwise faces only, for inflated hulls
    Back,
    /// Both
    #[default]
    Double,
}

/// Surface description used by the rasterizer
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Name (model part materials keep their source name)
    pub name: String,
    /// Base color
    pub color: Color,
    /// Self-illumination added after lighting
    pub emissive: Color,
    /// Opacity in `[0, 1]`
    pub opacity: f32,
    /// Lighting model
    pub shading: Shading,
    /// Optional color texture
    pub texture: Option<Arc<Texture>>,
    /// Metalness, kept for document overrides
    pub metalness: f32,
    /// Roughness, kept for document overrides
    pub roughness: f32,
    /// Faces to draw
    pub side: Side,
}

impl Default for Material {
    fn default() -> Self {
        Self::lit(Color::WHITE)
    }
}

impl Material {
    /// Lit material with a base color
    pub fn lit(color: Color) -> Self {
        Self {
            name: String::new(),
            color,
            emissive: Color::BLACK,
            opacity: 1.0,
            shading: Shading::Lit,
            texture: None,
            metalness: 0.0,
            roughness: 1.0,
            side: Side::Double,
        }
    }

    /// Flat unlit material
    pub fn unlit(color: Color) -> Self {
        Self {
            shading: Shading::Unlit,
            ..Self::lit(color)
        }
    }

    /// The flat black material swapped onto non-blooming nodes in the mask pass
    pub fn bloom_mask() -> Self {
        Self {
            name: "bloom_mask".to_string(),
            ..Self::unlit(Color::BLACK)
        }
    }

    /// Attach a texture
    pub fn with_texture(mut self, texture: Arc<Texture>) -> Self {
        self.texture = Some(texture);
        self
    }

    /// Set opacity
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    /// Set the name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether fragments blend with what is behind them
    pub fn is_transparent(&self) -> bool {
        self.opacity < 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_sampling_corners() {
        let mut data = Vec::new();
        // 2x1: red, blue
        data.extend_from_slice(&[255, 0, 0, 255]);
        data.extend_from_slice(&[0, 0, 255, 128]);
        let texture = Texture::new(2, 1, data);
        assert_eq!(texture.sample(0.0, 0.0).0, Color::from_rgb8(255, 0, 0));
        let (color, alpha) = texture.sample(0.99, 0.5);
        assert_eq!(color, Color::from_rgb8(0, 0, 255));
        assert!((alpha - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_clone_shares_texture_but_not_color() {
        let texture = Arc::new(Texture::solid(1, 1, [255; 4]));
        let original = Material::lit(Color::WHITE).with_texture(Arc::clone(&texture));
        let mut copy = original.clone();
        copy.color = Color::new(1.0, 0.0, 0.0);
        assert_eq!(original.color, Color::WHITE);
        assert_eq!(Arc::strong_count(&texture), 3);
    }
}

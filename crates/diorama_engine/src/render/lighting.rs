//! Scene lighting
//!
//! The diorama uses one ambient term plus a single directional light, the
//! same pair the document viewer always sets up.

use crate::config::RenderConfig;
use crate::foundation::color::Color;
use crate::foundation::math::Vec3;

/// Directional light source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Direction the light travels (normalized)
    pub direction: Vec3,
    /// Light color
    pub color: Color,
    /// Light intensity
    pub intensity: f32,
}

impl Light {
    /// Create a directional light
    pub fn directional(direction: Vec3, color: Color, intensity: f32) -> Self {
        Self {
            direction: direction.try_normalize(1e-9).unwrap_or_else(|| -Vec3::y()),
            color,
            intensity,
        }
    }
}

/// Ambient plus directional lighting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightingEnvironment {
    /// Ambient color
    pub ambient_color: Color,
    /// Ambient intensity
    pub ambient_intensity: f32,
    /// Key light
    pub sun: Light,
}

impl LightingEnvironment {
    /// Lighting described by the render configuration
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            ambient_color: Color::WHITE,
            ambient_intensity: config.ambient_intensity,
            sun: Light::directional(
                Vec3::from(config.light_direction),
                Color::WHITE,
                config.directional_intensity,
            ),
        }
    }

    /// Lambert diffuse plus ambient for a surface color and normal
    pub fn shade(&self, albedo: Color, normal: &Vec3) -> Color {
        let n = normal.try_normalize(1e-9).unwrap_or_else(Vec3::y);
        let diffuse = n.dot(&(-self.sun.direction)).max(0.0) * self.sun.intensity;
        let light = self.ambient_color * self.ambient_intensity + self.sun.color * diffuse;
        albedo.tint(light)
    }
}

impl Default for LightingEnvironment {
    fn default() -> Self {
        Self::from_config(&RenderConfig::default())
    }
}

//! # Engine Configuration
//!
//! One serializable tree for every tunable the session reads: viewport,
//! assets, bloom and lighting, click disambiguation, camera transitions and
//! AR placement.

use serde::{Deserialize, Serialize};

use super::Config;
use crate::foundation::color::Color;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Editing session: gizmo, grid helper, bloom suppressed while selecting
    pub edit_mode: bool,
    /// Render surface size
    pub viewport: ViewportConfig,
    /// Asset resolution
    pub assets: AssetConfig,
    /// Render pipeline settings
    pub render: RenderConfig,
    /// Pointer disambiguation
    pub picking: PickingConfig,
    /// Camera and transitions
    pub camera: CameraConfig,
    /// AR placement
    pub ar: ArConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            edit_mode: false,
            viewport: ViewportConfig::default(),
            assets: AssetConfig::default(),
            render: RenderConfig::default(),
            picking: PickingConfig::default(),
            camera: CameraConfig::default(),
            ar: ArConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Set the viewport size
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = ViewportConfig { width, height };
        self
    }

    /// Enable or disable edit mode
    pub fn with_edit_mode(mut self, edit_mode: bool) -> Self {
        self.edit_mode = edit_mode;
        self
    }

    /// Enable or disable bloom at startup
    pub fn with_bloom(mut self, enabled: bool) -> Self {
        self.render.bloom.enabled = enabled;
        self
    }

    /// Set the asset base URL prefix
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.assets.base_url = base_url.into();
        self
    }
}

/// Render surface size in pixels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self { width: 640, height: 480 }
    }
}

impl ViewportConfig {
    /// Width over height
    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

/// Asset resolution settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Prefix prepended to relative model, texture and font paths
    pub base_url: String,
}

/// Render pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Clear color used when the document has no color background
    pub clear_color: Color,
    /// Ambient light intensity
    pub ambient_intensity: f32,
    /// Directional light intensity
    pub directional_intensity: f32,
    /// Direction the directional light travels (normalized when used)
    pub light_direction: [f32; 3],
    /// Selective bloom
    pub bloom: BloomConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            bloom: BloomConfig::default(),
            clear_color: Color::BLACK,
            ambient_intensity: 0.5,
            directional_intensity: 0.8,
            light_direction: [-0.4, -1.0, -0.6],
        }
    }
}

/// Selective bloom parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomConfig {
    /// Whether the mask and composite passes run
    pub enabled: bool,
    /// Multiplier applied to the blurred mask before compositing
    pub strength: f32,
    /// Box blur radius in pixels
    pub radius: u32,
    /// Mask luminance below which nothing blooms
    pub threshold: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 1.0,
            radius: 4,
            threshold: 0.0,
        }
    }
}

/// Pointer disambiguation settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PickingConfig {
    /// Maximum pointer travel (pixels) for a press to count as a click
    pub click_threshold_px: f32,
    /// Window (milliseconds) for a second click to count as a double-click
    pub double_click_ms: f64,
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            click_threshold_px: 5.0,
            double_click_ms: 300.0,
        }
    }
}

/// Camera and transition settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Initial camera position
    pub position: [f32; 3],
    /// Initial look-at target
    pub target: [f32; 3],
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
    /// Duration of viewpoint transitions in milliseconds
    pub transition_ms: f32,
    /// Extra distance factor when framing nodes
    pub focus_margin: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            position: [0.0, 4.0, 10.0],
            target: [0.0, 0.0, 0.0],
            near: 0.1,
            far: 1000.0,
            transition_ms: 1000.0,
            focus_margin: 1.2,
        }
    }
}

/// AR placement settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ArConfig {
    /// Physical width of the printed marker in meters
    pub marker_width_m: f32,
    /// Minimum interval between marker scans in milliseconds
    pub scan_interval_ms: f64,
    /// Distance of the one-shot forward placement in meters
    pub forward_distance_m: f32,
    /// Content group position before any placement in webcam mode
    pub default_offset: [f32; 3],
}

impl Default for ArConfig {
    fn default() -> Self {
        Self {
            marker_width_m: 0.15,
            scan_interval_ms: 200.0,
            forward_distance_m: 5.0,
            default_offset: [0.0, 0.0, -5.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigError, ConfigFormat};

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            edit_mode = true

            [picking]
            double_click_ms = 250.0
            "#,
        )
        .unwrap();
        assert!(config.edit_mode);
        assert_eq!(config.picking.double_click_ms, 250.0);
        assert_eq!(config.picking.click_threshold_px, 5.0);
        assert_eq!(config.ar.marker_width_m, 0.15);
    }

    #[test]
    fn test_ron_round_trip() {
        let config = EngineConfig::default().with_viewport(320, 200).with_bloom(false);
        let text = config.to_text(ConfigFormat::Ron).unwrap();
        let back = EngineConfig::from_text(&text, ConfigFormat::Ron).unwrap();
        assert_eq!(back.viewport.width, 320);
        assert!(!back.render.bloom.enabled);
        assert_eq!(back.render.clear_color, config.render.clear_color);
    }

    #[test]
    fn test_file_round_trip_and_unsupported_extension() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("diorama_config_{}.toml", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        let config = EngineConfig::default().with_base_url("https://cdn.example/");
        config.save_to_file(&path_str).unwrap();
        let loaded = EngineConfig::load_from_file(&path_str).unwrap();
        assert_eq!(loaded.assets.base_url, "https://cdn.example/");
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            config.save_to_file("engine.yaml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            EngineConfig::from_text("viewport = 3", ConfigFormat::Toml),
            Err(ConfigError::Parse(_))
        ));
    }
}

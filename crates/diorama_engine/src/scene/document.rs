//! Scene document model
//!
//! The JSON interchange format for composed scenes. Parsing is lenient per
//! object: a malformed entry is reported and dropped while the rest of the
//! document survives. Only a document whose top level cannot be read is an
//! error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SceneError;
use crate::foundation::color::Color;
use crate::foundation::math::Vec3;

/// Free-form option map carried by effects, models and text
pub type Options = serde_json::Map<String, Value>;

/// Root serializable unit
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SceneDocument {
    /// Objects in render-order sequence
    pub objects: Vec<SceneObject>,
    /// Recorded viewpoint tour
    #[serde(rename = "cameraList", skip_serializing_if = "Vec::is_empty")]
    pub camera_list: Vec<CameraState>,
    /// Background color or environment URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    /// Orbit angle limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controls: Option<ControlsLimits>,
}

/// A document entry that could not be turned into a [`SceneObject`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedObject {
    /// Position in the source `objects` array
    pub index: usize,
    /// The `type` field, when readable
    pub kind: Option<String>,
    /// Why the entry was dropped
    pub reason: String,
}

/// Result of parsing a document: the valid part plus what was dropped
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    /// Valid objects and top-level fields
    pub document: SceneDocument,
    /// Entries dropped during parsing
    pub skipped: Vec<SkippedObject>,
}

#[derive(Deserialize)]
struct DocumentWire {
    #[serde(default)]
    objects: Vec<Value>,
    #[serde(rename = "cameraList", default)]
    camera_list: Vec<CameraState>,
    #[serde(default)]
    background: Option<String>,
    #[serde(default)]
    controls: Option<ControlsLimits>,
}

impl SceneDocument {
    /// Parse a JSON document
    ///
    /// # Errors
    /// [`SceneError::Parse`] when the text is not a JSON object with the
    /// expected top-level shape. Individual bad objects do not fail the parse.
    pub fn from_json(text: &str) -> Result<ParsedDocument, SceneError> {
        let value: Value = serde_json::from_str(text).map_err(|e| SceneError::Parse(e.to_string()))?;
        Self::from_value(value)
    }

    /// Parse an already decoded JSON value
    ///
    /// # Errors
    /// See [`SceneDocument::from_json`].
    pub fn from_value(value: Value) -> Result<ParsedDocument, SceneError> {
        if !value.is_object() {
            return Err(SceneError::Parse("document root must be an object".to_string()));
        }
        let wire: DocumentWire =
            serde_json::from_value(value).map_err(|e| SceneError::Parse(e.to_string()))?;

        let mut objects = Vec::with_capacity(wire.objects.len());
        let mut skipped = Vec::new();
        for (index, raw) in wire.objects.into_iter().enumerate() {
            let kind = raw.get("type").and_then(Value::as_str).map(str::to_string);
            match serde_json::from_value::<SceneObject>(raw) {
                Ok(object) => objects.push(object),
                Err(e) => {
                    log::warn!("Skipping scene object #{index} ({kind:?}): {e}");
                    skipped.push(SkippedObject {
                        index,
                        kind,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(ParsedDocument {
            document: Self {
                objects,
                camera_list: wire.camera_list,
                background: wire.background,
                controls: wire.controls,
            },
            skipped,
        })
    }

    /// Pretty JSON encoding
    ///
    /// # Errors
    /// [`SceneError::Serialize`] if an option map holds a value JSON cannot encode.
    pub fn to_json(&self) -> Result<String, SceneError> {
        serde_json::to_string_pretty(self).map_err(|e| SceneError::Serialize(e.to_string()))
    }
}

fn zero3() -> [f32; 3] {
    [0.0; 3]
}

fn one3() -> [f32; 3] {
    [1.0; 3]
}

fn unit_radius() -> f32 {
    1.0
}

fn default_base_width() -> f32 {
    5.0
}

/// One entry of the `objects` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    /// Kind-specific payload, tagged by `type`
    #[serde(flatten)]
    pub kind: ObjectKind,
    /// Local position
    #[serde(default = "zero3")]
    pub position: [f32; 3],
    /// Euler XYZ rotation in radians
    #[serde(default = "zero3")]
    pub rotation: [f32; 3],
    /// Local scale
    #[serde(default = "one3")]
    pub scale: [f32; 3],
    /// Explicit render order; the loader assigns one when absent
    #[serde(rename = "renderOrder", default, skip_serializing_if = "Option::is_none")]
    pub render_order: Option<i32>,
}

impl SceneObject {
    /// Object with identity transform
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            position: zero3(),
            rotation: zero3(),
            scale: one3(),
            render_order: None,
        }
    }

    /// Set position
    pub fn at(mut self, position: [f32; 3]) -> Self {
        self.position = position;
        self
    }
}

/// Kind-specific payload of a [`SceneObject`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectKind {
    /// Colored box
    #[serde(rename = "box")]
    Box {
        /// Width, height, depth
        #[serde(default = "one3")]
        size: [f32; 3],
        /// Surface color
        #[serde(default)]
        color: Color,
    },
    /// Colored sphere
    #[serde(rename = "sphere")]
    Sphere {
        /// Radius
        #[serde(default = "unit_radius")]
        radius: f32,
        /// Surface color
        #[serde(default)]
        color: Color,
    },
    /// Mesh asset
    #[serde(rename = "model")]
    Model(ModelObject),
    /// Textured plane
    #[serde(rename = "image")]
    Image {
        /// Texture URL
        url: String,
        /// Plane width; height follows the image aspect
        #[serde(rename = "baseWidth", default = "default_base_width")]
        base_width: f32,
    },
    /// Diary marker
    #[serde(rename = "diary")]
    Diary {
        /// Entry title
        title: String,
        /// Entry body
        #[serde(default)]
        content: String,
    },
    /// Library marker
    #[serde(rename = "library")]
    Library {
        /// Entry title
        title: String,
        /// Cover image URL
        cover: String,
        /// Library record id
        library_id: i64,
    },
    /// Extruded text built from a font asset
    #[serde(rename = "3Dtext")]
    Text3D {
        /// Font URL
        url: String,
        /// Text to extrude
        #[serde(default)]
        title: String,
        /// Text options (size, depth, color)
        #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
        options: Options,
    },
    /// Effect attached to the content root
    #[serde(rename = "effect")]
    Effect {
        /// Effect kind name, e.g. `SnowEffect`
        effect_name: String,
        /// Effect parameters
        #[serde(default)]
        options: Options,
    },
    /// Reusable sub-scene fetched by id
    #[serde(rename = "template")]
    Template {
        /// Template record id
        template_id: i64,
    },
}

impl ObjectKind {
    /// The `type` tag as written in documents
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Box { .. } => "box",
            Self::Sphere { .. } => "sphere",
            Self::Model(_) => "model",
            Self::Image { .. } => "image",
            Self::Diary { .. } => "diary",
            Self::Library { .. } => "library",
            Self::Text3D { .. } => "3Dtext",
            Self::Effect { .. } => "effect",
            Self::Template { .. } => "template",
        }
    }
}

/// Model entry payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelObject {
    /// Model URL (relative paths get the asset base prefix)
    pub url: String,
    /// Model options, `color` tints every part
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: Options,
    /// Effects and animations applied after loading
    #[serde(rename = "effect", default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<EffectDescriptor>,
    /// Per-part material overrides keyed by part name
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub material: Options,
    /// Compressed-geometry hint, kept for round trips
    #[serde(rename = "useDracoLoader", default, skip_serializing_if = "Option::is_none")]
    pub use_draco_loader: Option<bool>,
    /// Clip names to play, kept for round trips
    #[serde(rename = "playAnimations", default, skip_serializing_if = "Option::is_none")]
    pub play_animations: Option<Vec<String>>,
    /// Play clips once, kept for round trips
    #[serde(rename = "loopOnce", default, skip_serializing_if = "Option::is_none")]
    pub loop_once: Option<bool>,
}

impl ModelObject {
    /// Model with only a URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: Options::new(),
            effects: Vec::new(),
            material: Options::new(),
            use_draco_loader: None,
            play_animations: None,
            loop_once: None,
        }
    }
}

fn default_duration() -> f32 {
    0.5
}

/// Recursive effect / animation / timeline description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EffectDescriptor {
    /// Attach a named effect to the owning node
    Effect {
        /// Effect kind name
        effect_name: String,
        /// Effect parameters
        #[serde(default)]
        options: Options,
    },
    /// Tween node properties
    Animation(AnimationSpec),
    /// Run children in sequence or in parallel
    Timeline {
        /// Child descriptors
        #[serde(default)]
        children: Vec<EffectDescriptor>,
        /// `true` runs children one after another
        #[serde(default)]
        sequence: bool,
    },
}

/// Property tween parameters (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationSpec {
    /// Dotted property path to target value, e.g. `position.x`
    #[serde(default)]
    pub properties: BTreeMap<String, f32>,
    /// Duration of one pass
    #[serde(default = "default_duration")]
    pub duration: f32,
    /// Easing name, e.g. `power2.inOut`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ease: Option<String>,
    /// Delay before the first pass
    #[serde(default)]
    pub delay: f32,
    /// Extra passes; -1 repeats forever
    #[serde(default)]
    pub repeat: i32,
    /// Alternate direction on each repeat
    #[serde(default)]
    pub yoyo: bool,
    /// Pause between passes
    #[serde(rename = "repeatDelay", default)]
    pub repeat_delay: f32,
}

/// Recorded viewpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    /// Camera position
    #[serde(with = "xyz")]
    pub position: Vec3,
    /// Look-at point
    #[serde(with = "xyz")]
    pub target: Vec3,
    /// Vertical field of view in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fov: Option<f32>,
}

/// Orbit angle limits; `None` means unlimited and is not written
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlsLimits {
    /// Minimum azimuth in radians
    #[serde(rename = "minAzimuthAngle", default, skip_serializing_if = "Option::is_none")]
    pub min_azimuth_angle: Option<f32>,
    /// Maximum azimuth in radians
    #[serde(rename = "maxAzimuthAngle", default, skip_serializing_if = "Option::is_none")]
    pub max_azimuth_angle: Option<f32>,
    /// Minimum polar angle in radians
    #[serde(rename = "minPolarAngle", default, skip_serializing_if = "Option::is_none")]
    pub min_polar_angle: Option<f32>,
    /// Maximum polar angle in radians
    #[serde(rename = "maxPolarAngle", default, skip_serializing_if = "Option::is_none")]
    pub max_polar_angle: Option<f32>,
}

mod xyz {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::foundation::math::Vec3;

    #[derive(Serialize, Deserialize)]
    struct Xyz {
        x: f32,
        y: f32,
        z: f32,
    }

    pub fn serialize<S: Serializer>(v: &Vec3, serializer: S) -> Result<S::Ok, S::Error> {
        Xyz { x: v.x, y: v.y, z: v.z }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec3, D::Error> {
        let Xyz { x, y, z } = Xyz::deserialize(deserializer)?;
        Ok(Vec3::new(x, y, z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_box_defaults_and_ignored_fields() {
        let parsed = SceneDocument::from_value(json!({
            "objects": [
                { "type": "box", "position": [0, 1, 0], "color": "#ff0000", "radius": 9, "url": "ignored" }
            ]
        }))
        .unwrap();
        assert!(parsed.skipped.is_empty());
        let object = &parsed.document.objects[0];
        assert_eq!(object.scale, [1.0, 1.0, 1.0]);
        match &object.kind {
            ObjectKind::Box { size, color } => {
                assert_eq!(*size, [1.0, 1.0, 1.0]);
                assert_eq!(color.to_hex(), "#ff0000");
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let parsed = SceneDocument::from_value(json!({
            "objects": [
                { "type": "model" },
                { "type": "sphere", "radius": 2 },
                { "type": "hologram" },
                { "type": "template", "template_id": 7 },
                { "type": "box", "color": "not-a-color" }
            ]
        }))
        .unwrap();
        assert_eq!(parsed.document.objects.len(), 2);
        let indices: Vec<usize> = parsed.skipped.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 2, 4]);
        assert_eq!(parsed.skipped[1].kind.as_deref(), Some("hologram"));
    }

    #[test]
    fn test_top_level_parse_failure() {
        assert!(matches!(SceneDocument::from_json("[1, 2]"), Err(SceneError::Parse(_))));
        assert!(matches!(SceneDocument::from_json("{ not json"), Err(SceneError::Parse(_))));
        assert!(matches!(
            SceneDocument::from_json(r#"{ "objects": 3 }"#),
            Err(SceneError::Parse(_))
        ));
    }

    #[test]
    fn test_effect_descriptor_tree() {
        let descriptor: EffectDescriptor = serde_json::from_value(json!({
            "type": "timeline",
            "sequence": true,
            "children": [
                { "type": "animation", "properties": { "position.y": 2.0 }, "duration": 1.5, "yoyo": true, "repeat": -1 },
                { "type": "effect", "effect_name": "ScaleAnimate", "options": { "speed": 2 } }
            ]
        }))
        .unwrap();
        let EffectDescriptor::Timeline { children, sequence } = descriptor else {
            panic!("expected timeline");
        };
        assert!(sequence);
        assert_eq!(children.len(), 2);
        match &children[0] {
            EffectDescriptor::Animation(spec) => {
                assert_eq!(spec.properties["position.y"], 2.0);
                assert_eq!(spec.repeat, -1);
                assert!(spec.yoyo);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_controls_omit_unlimited() {
        let limits = ControlsLimits {
            min_polar_angle: Some(0.2),
            ..ControlsLimits::default()
        };
        let text = serde_json::to_string(&limits).unwrap();
        assert_eq!(text, r#"{"minPolarAngle":0.2}"#);
    }

    #[test]
    fn test_camera_list_uses_xyz_objects() {
        let parsed = SceneDocument::from_value(json!({
            "objects": [],
            "cameraList": [{ "position": { "x": 1, "y": 2, "z": 3 }, "target": { "x": 0, "y": 0, "z": 0 }, "fov": 50 }]
        }))
        .unwrap();
        let state = parsed.document.camera_list[0];
        assert_eq!(state.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(state.fov, Some(50.0));
        let value = serde_json::to_value(&parsed.document).unwrap();
        assert_eq!(value["cameraList"][0]["position"]["y"], json!(2.0));
    }

    #[test]
    fn test_object_serializes_with_type_tag() {
        let object = SceneObject::new(ObjectKind::Template { template_id: 3 }).at([1.0, 0.0, 0.0]);
        let value = serde_json::to_value(&object).unwrap();
        assert_eq!(value["type"], json!("template"));
        assert_eq!(value["template_id"], json!(3));
        assert_eq!(value["position"], json!([1.0, 0.0, 0.0]));
    }
}

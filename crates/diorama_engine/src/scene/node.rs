//! Live scene nodes
//!
//! A node carries a local transform, optional geometry and material, flags
//! that drive picking/bloom/visibility, and a [`NodeTag`] recording which
//! document kind produced it so the scene can be written back out.

use bitflags::bitflags;
use slotmap::new_key_type;

use super::document::{EffectDescriptor, Options};
use crate::foundation::color::Color;
use crate::foundation::math::{Transform, Vec3};
use crate::render::{Material, Mesh};
use crate::spatial::AABB;

new_key_type! {
    /// Arena handle of a scene node
    pub struct NodeId;
}

bitflags! {
    /// Per-node behaviour switches
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u32 {
        /// Rendered and pickable (children of a hidden node are hidden too)
        const VISIBLE = 1 << 0;
        /// Excluded from the picking id buffer, with its whole subtree
        const IGNORE_PICK = 1 << 1;
        /// Contributes to the selective bloom mask
        const BLOOM = 1 << 2;
        /// Editor visual (gizmo, grid, reticle); never saved
        const HELPER = 1 << 3;
        /// Created by an effect; saved through the effect, not as an object
        const EFFECT_OWNED = 1 << 4;
        /// Diary/library marker; drawn only in edit mode
        const MARKER = 1 << 5;
        /// Drawn after compositing, over the scene (gizmo handles)
        const OVERLAY = 1 << 6;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self::VISIBLE
    }
}

/// Shape parameters kept alongside generated meshes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// Box with width, height, depth
    Box {
        /// Edge lengths
        size: [f32; 3],
    },
    /// Sphere
    Sphere {
        /// Radius
        radius: f32,
    },
    /// Plane facing +Z
    Plane {
        /// Width
        width: f32,
        /// Height
        height: f32,
    },
    /// Any other mesh (model parts, text, gizmo handles)
    Custom,
}

/// Point sprites
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointCloud {
    /// Point positions in node space
    pub positions: Vec<Vec3>,
    /// Sprite size in world units
    pub size: f32,
}

/// Renderable geometry owned by a node
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Triangle mesh with the shape it was generated from
    Triangles {
        /// Source shape
        shape: Shape,
        /// Triangle data
        mesh: Mesh,
    },
    /// Point sprites
    Points(PointCloud),
}

impl Geometry {
    /// Box geometry
    pub fn cuboid(size: [f32; 3]) -> Self {
        Self::Triangles {
            shape: Shape::Box { size },
            mesh: Mesh::cuboid(size[0], size[1], size[2]),
        }
    }

    /// Sphere geometry
    pub fn sphere(radius: f32) -> Self {
        Self::Triangles {
            shape: Shape::Sphere { radius },
            mesh: Mesh::sphere(radius, 24, 16),
        }
    }

    /// Plane geometry
    pub fn plane(width: f32, height: f32) -> Self {
        Self::Triangles {
            shape: Shape::Plane { width, height },
            mesh: Mesh::plane(width, height),
        }
    }

    /// Arbitrary mesh
    pub fn custom(mesh: Mesh) -> Self {
        Self::Triangles {
            shape: Shape::Custom,
            mesh,
        }
    }

    /// Source shape of triangle geometry
    pub fn shape(&self) -> Option<Shape> {
        match self {
            Self::Triangles { shape, .. } => Some(*shape),
            Self::Points(_) => None,
        }
    }

    /// Node-space bounds
    pub fn bounds(&self) -> AABB {
        match self {
            Self::Triangles { mesh, .. } => mesh.bounds(),
            Self::Points(cloud) => AABB::from_points(cloud.positions.iter()),
        }
    }
}

/// Document provenance of a node, used when saving
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NodeTag {
    /// No document kind (group, model part, helper)
    #[default]
    Untagged,
    /// Loaded from a `model` object
    Model {
        /// URL as written in the document
        url: String,
        /// Model options
        options: Options,
        /// Effect descriptors applied at load
        effects: Vec<EffectDescriptor>,
        /// Per-part material overrides
        material: Options,
        /// Round-tripped loader hints
        use_draco_loader: Option<bool>,
        /// Round-tripped clip names
        play_animations: Option<Vec<String>>,
        /// Round-tripped clip looping
        loop_once: Option<bool>,
    },
    /// Loaded from an `image` object
    Image {
        /// URL as written in the document
        url: String,
        /// Plane width
        base_width: f32,
    },
    /// Diary marker
    Diary {
        /// Title
        title: String,
        /// Body
        content: String,
    },
    /// Library marker
    Library {
        /// Title
        title: String,
        /// Cover URL
        cover: String,
        /// Record id
        library_id: i64,
    },
    /// Extruded text
    Text3D {
        /// Font URL as written in the document
        url: String,
        /// Text
        title: String,
        /// Text options
        options: Options,
    },
    /// Template instance
    Template {
        /// Template record id
        template_id: i64,
    },
}

/// A live scene node
#[derive(Debug, Clone)]
pub struct Node {
    /// Display name
    pub name: String,
    /// Local transform relative to the parent
    pub transform: Transform,
    /// Draw order key (lower draws first)
    pub render_order: i32,
    /// Behaviour flags
    pub flags: NodeFlags,
    /// Renderable geometry
    pub geometry: Option<Geometry>,
    /// Surface material
    pub material: Option<Material>,
    /// Document provenance
    pub tag: NodeTag,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
}

impl Node {
    /// Empty group node
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            render_order: 0,
            flags: NodeFlags::default(),
            geometry: None,
            material: None,
            tag: NodeTag::Untagged,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Node with geometry and material
    pub fn mesh(name: impl Into<String>, geometry: Geometry, material: Material) -> Self {
        Self {
            geometry: Some(geometry),
            material: Some(material),
            ..Self::group(name)
        }
    }

    /// Set the transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Add flags
    pub fn with_flags(mut self, flags: NodeFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Set the provenance tag
    pub fn with_tag(mut self, tag: NodeTag) -> Self {
        self.tag = tag;
        self
    }

    /// Parent handle
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child handles in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the node itself is visible
    pub fn is_visible(&self) -> bool {
        self.flags.contains(NodeFlags::VISIBLE)
    }

    /// Base color of the material, if any
    pub fn color(&self) -> Option<Color> {
        self.material.as_ref().map(|m| m.color)
    }
}

//! Transform gizmo
//!
//! Three arrows translate the attached node along one axis, three rings
//! rotate it about one axis. The handles live next to the target (same
//! parent) so every drag is computed in the target's parent space: an
//! X-axis drag writes the X coordinate of the local position and nothing
//! else.
//!
//! Handle hits come from a restricted id-buffer pass that only draws handle
//! geometry, so scene objects behind or in front of a handle never steal the
//! press.

use crate::foundation::color::Color;
use crate::foundation::math::{Point3, Quat, Transform, Unit, Vec3};
use crate::input::PointerState;
use crate::render::{Camera, Material, Mesh, RenderError, RenderPipeline};
use crate::scene::{Geometry, Node, NodeFlags, NodeId, SceneGraph};
use crate::spatial::{Plane, Ray};

const ARROW_OFFSET: f32 = 1.0;
const ARROW_LENGTH: f32 = 1.0;
const SHAFT_RADIUS: f32 = 0.04;
const HEAD_RADIUS: f32 = 0.08;
const HEAD_LENGTH: f32 = 0.2;
const RING_RADIUS: f32 = 1.2;
const RING_TUBE: f32 = 0.05;

/// One of the three gizmo axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GizmoAxis {
    /// Red arrow, magenta ring
    X,
    /// Green arrow, cyan ring
    Y,
    /// Blue arrow, yellow ring
    Z,
}

impl GizmoAxis {
    /// Every axis in X, Y, Z order
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

    /// Component index into a vector
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }

    /// Unit vector along the axis
    pub fn unit(self) -> Vec3 {
        let mut v = Vec3::zeros();
        v[self.index()] = 1.0;
        v
    }

    fn arrow_color(self) -> Color {
        match self {
            Self::X => Color::new(1.0, 0.0, 0.0),
            Self::Y => Color::new(0.0, 1.0, 0.0),
            Self::Z => Color::new(0.0, 0.0, 1.0),
        }
    }

    fn ring_color(self) -> Color {
        match self {
            Self::X => Color::new(1.0, 0.0, 1.0),
            Self::Y => Color::new(0.0, 1.0, 1.0),
            Self::Z => Color::new(1.0, 1.0, 0.0),
        }
    }

    /// Rotation taking the torus (ring axis +Z) onto this axis
    fn ring_rotation(self) -> Quat {
        match self {
            Self::X => Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2),
            Self::Y => Quat::from_axis_angle(&Vec3::x_axis(), std::f32::consts::FRAC_PI_2),
            Self::Z => Quat::identity(),
        }
    }
}

/// What a handle does when dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    /// Arrow: move along the axis
    Translate(GizmoAxis),
    /// Ring: spin about the axis
    Rotate(GizmoAxis),
}

impl Handle {
    /// Axis of the handle
    pub fn axis(self) -> GizmoAxis {
        match self {
            Self::Translate(axis) | Self::Rotate(axis) => axis,
        }
    }

    // Pick ids for the restricted handle pass; 0 stays background
    fn pick_id(self) -> u32 {
        match self {
            Self::Translate(axis) => 1 + axis.index() as u32,
            Self::Rotate(axis) => 4 + axis.index() as u32,
        }
    }
}

/// Interaction state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GizmoState {
    /// No handle held
    Idle,
    /// Arrow held; all points are in the target's parent space
    Dragging {
        /// Constrained axis
        axis: GizmoAxis,
        /// Plane the pointer ray is intersected with
        plane: Plane,
        /// First intersection
        start_point: Vec3,
        /// Target position when the drag began
        start_position: Vec3,
    },
    /// Ring held; vectors are in the target's parent space
    Rotating {
        /// Ring axis
        axis: GizmoAxis,
        /// Ring normal at the start of the rotation
        normal: Vec3,
        /// Unit vector from the gizmo center to the last intersection
        last_vector: Vec3,
        /// Signed angle applied so far
        angle: f32,
    },
}

impl GizmoState {
    /// Whether a handle is held
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

#[derive(Debug, Clone)]
struct HandleNodes {
    root: NodeId,
    rings: NodeId,
    handles: Vec<(NodeId, Handle)>,
}

/// Arrow and ring handles bound to one scene node at a time
#[derive(Debug)]
pub struct TransformGizmo {
    nodes: Option<HandleNodes>,
    target: Option<NodeId>,
    state: GizmoState,
}

impl Default for TransformGizmo {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformGizmo {
    /// A detached gizmo; handles are created on first attach
    pub fn new() -> Self {
        Self {
            nodes: None,
            target: None,
            state: GizmoState::Idle,
        }
    }

    /// Node the gizmo manipulates
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// Current interaction state
    pub fn state(&self) -> &GizmoState {
        &self.state
    }

    /// Whether a drag or rotation is in progress
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Root of the handle subtree, if built
    pub fn root(&self) -> Option<NodeId> {
        self.nodes.as_ref().map(|nodes| nodes.root)
    }

    /// Attached and shown
    pub fn is_visible(&self, graph: &SceneGraph) -> bool {
        self.target.is_some()
            && self
                .root()
                .and_then(|root| graph.get(root))
                .is_some_and(Node::is_visible)
    }

    /// Bind to `target` and show the handles at its position
    pub fn attach(&mut self, graph: &mut SceneGraph, target: NodeId) -> bool {
        let Some(parent) = graph.parent(target) else {
            log::warn!("Gizmo cannot attach to {:?}: not in the scene", target);
            return false;
        };
        let nodes = match self.nodes.take() {
            Some(nodes) if graph.contains(nodes.root) => nodes,
            _ => build_handles(graph, parent),
        };
        if graph.parent(nodes.root) != Some(parent) {
            graph.reparent(nodes.root, parent);
        }
        if let Some(root) = graph.get_mut(nodes.root) {
            root.flags.insert(NodeFlags::VISIBLE);
        }
        self.nodes = Some(nodes);
        self.target = Some(target);
        self.state = GizmoState::Idle;
        self.follow(graph);
        log::debug!("Gizmo attached to {:?}", target);
        true
    }

    /// Unbind and hide
    pub fn detach(&mut self, graph: &mut SceneGraph) {
        if let Some(root) = self.root().and_then(|root| graph.get_mut(root)) {
            root.flags.remove(NodeFlags::VISIBLE);
        }
        if self.target.take().is_some() {
            log::debug!("Gizmo detached");
        }
        self.state = GizmoState::Idle;
    }

    /// Move the handles to the target and turn the rings with it
    ///
    /// Detaches when the target has been removed.
    pub fn follow(&mut self, graph: &mut SceneGraph) {
        let Some(target) = self.target else {
            return;
        };
        let Some(transform) = graph.get(target).map(|node| node.transform) else {
            self.detach(graph);
            return;
        };
        let Some(nodes) = &self.nodes else {
            return;
        };
        if let Some(root) = graph.get_mut(nodes.root) {
            root.transform.position = transform.position;
        }
        if let Some(rings) = graph.get_mut(nodes.rings) {
            rings.transform.rotation = transform.rotation;
        }
    }

    /// Resolve the handle under pixel `(x, y)` with a handle-only id pass
    ///
    /// # Errors
    /// [`RenderError::TargetBusy`] when called mid-frame.
    pub fn pick_handle(
        &self,
        pipeline: &mut RenderPipeline,
        graph: &SceneGraph,
        camera: &Camera,
        x: u32,
        y: u32,
    ) -> Result<Option<Handle>, RenderError> {
        let Some(nodes) = self.nodes.as_ref().filter(|_| self.is_visible(graph)) else {
            return Ok(None);
        };
        let id_for = |id: NodeId, _: &Node| {
            nodes
                .handles
                .iter()
                .find(|(node, _)| *node == id)
                .map(|(_, handle)| handle.pick_id())
        };
        let id = pipeline.render_id_pixel(graph, camera, x, y, &id_for)?;
        Ok(nodes
            .handles
            .iter()
            .map(|(_, handle)| *handle)
            .find(|handle| handle.pick_id() == id))
    }

    /// Start a drag if the press lands on a handle
    ///
    /// Returns `true` when the gizmo captured the press.
    ///
    /// # Errors
    /// Propagates render target errors from the handle pick.
    pub fn pointer_down(
        &mut self,
        pipeline: &mut RenderPipeline,
        graph: &SceneGraph,
        camera: &Camera,
        pointer: &PointerState,
    ) -> Result<bool, RenderError> {
        let Some((x, y)) = pointer.pixel() else {
            return Ok(false);
        };
        let Some(handle) = self.pick_handle(pipeline, graph, camera, x, y)? else {
            return Ok(false);
        };
        let Some(ray) = pointer_ray(camera, pointer) else {
            return Ok(false);
        };
        Ok(self.begin(graph, handle, &ray, camera.forward()))
    }

    /// Continue the active drag; `false` when idle or the ray misses
    pub fn pointer_move(&mut self, graph: &mut SceneGraph, camera: &Camera, pointer: &PointerState) -> bool {
        if !self.is_active() {
            return false;
        }
        pointer_ray(camera, pointer).is_some_and(|ray| self.drag(graph, &ray))
    }

    /// Release the handle; `true` if a drag was in progress
    pub fn pointer_up(&mut self) -> bool {
        let was_active = self.is_active();
        self.state = GizmoState::Idle;
        was_active
    }

    /// Enter `Dragging` or `Rotating` from a world-space pointer ray
    ///
    /// Translation intersects a plane through the target containing the
    /// dragged axis, facing the camera as much as possible. Rotation
    /// intersects the ring's own plane.
    pub fn begin(&mut self, graph: &SceneGraph, handle: Handle, ray: &Ray, view_dir: Vec3) -> bool {
        let Some((transform, to_local)) = self.target_frame(graph) else {
            return false;
        };
        let ray = to_local.ray(ray);
        let view_dir = to_local.vector(view_dir);
        let position = transform.position;

        self.state = match handle {
            Handle::Translate(axis) => {
                let normal = GizmoAxis::ALL
                    .into_iter()
                    .filter(|other| *other != axis)
                    .map(GizmoAxis::unit)
                    .max_by(|a, b| a.dot(&view_dir).abs().total_cmp(&b.dot(&view_dir).abs()))
                    .unwrap_or_else(|| axis.unit());
                let plane = Plane::from_point_normal(position, normal);
                let Some(start_point) = plane.intersect_ray(&ray) else {
                    return false;
                };
                GizmoState::Dragging {
                    axis,
                    plane,
                    start_point,
                    start_position: position,
                }
            }
            Handle::Rotate(axis) => {
                let normal = transform.rotation * axis.unit();
                let plane = Plane::from_point_normal(position, normal);
                let Some(vector) = plane
                    .intersect_ray(&ray)
                    .and_then(|hit| (hit - position).try_normalize(1e-6))
                else {
                    return false;
                };
                GizmoState::Rotating {
                    axis,
                    normal,
                    last_vector: vector,
                    angle: 0.0,
                }
            }
        };
        log::trace!("Gizmo {:?} started", handle);
        true
    }

    /// Apply a world-space pointer ray to the active drag
    pub fn drag(&mut self, graph: &mut SceneGraph, ray: &Ray) -> bool {
        let Some((transform, to_local)) = self.target_frame(graph) else {
            return false;
        };
        let Some(target) = self.target else {
            return false;
        };
        let ray = to_local.ray(ray);

        match &mut self.state {
            GizmoState::Idle => return false,
            GizmoState::Dragging {
                axis,
                plane,
                start_point,
                start_position,
            } => {
                let Some(hit) = plane.intersect_ray(&ray) else {
                    return false;
                };
                let i = axis.index();
                let delta = hit - *start_point;
                if let Some(node) = graph.get_mut(target) {
                    node.transform.position[i] = start_position[i] + delta[i];
                }
            }
            GizmoState::Rotating {
                normal,
                last_vector,
                angle,
                ..
            } => {
                let position = transform.position;
                let plane = Plane::from_point_normal(position, *normal);
                let Some(vector) = plane
                    .intersect_ray(&ray)
                    .and_then(|hit| (hit - position).try_normalize(1e-6))
                else {
                    return false;
                };
                let sign = if last_vector.cross(&vector).dot(normal) < 0.0 { -1.0 } else { 1.0 };
                let step = sign * last_vector.angle(&vector);
                let spin = Quat::from_axis_angle(&Unit::new_normalize(*normal), step);
                if let Some(node) = graph.get_mut(target) {
                    node.transform.rotation = spin * node.transform.rotation;
                }
                *last_vector = vector;
                *angle += step;
            }
        }
        self.follow(graph);
        true
    }

    /// Remove the handle nodes from the graph
    pub fn dispose(&mut self, graph: &mut SceneGraph) {
        self.detach(graph);
        if let Some(nodes) = self.nodes.take() {
            graph.remove(nodes.root);
        }
    }

    fn target_frame(&self, graph: &SceneGraph) -> Option<(Transform, ParentSpace)> {
        let target = self.target?;
        let transform = graph.get(target)?.transform;
        let parent = graph.parent(target)?;
        let inverse = graph.world_matrix(parent)?.try_inverse()?;
        Some((transform, ParentSpace(inverse)))
    }
}

// World to parent-local conversion
struct ParentSpace(crate::foundation::math::Mat4);

impl ParentSpace {
    fn ray(&self, ray: &Ray) -> Ray {
        let origin = self.0.transform_point(&Point3::from(ray.origin)).coords;
        Ray::new(origin, self.0.transform_vector(&ray.direction))
    }

    fn vector(&self, v: Vec3) -> Vec3 {
        self.0.transform_vector(&v)
    }
}

fn pointer_ray(camera: &Camera, pointer: &PointerState) -> Option<Ray> {
    let (x, y) = pointer.to_ndc();
    camera.screen_to_world_ray(x, y)
}

fn handle_flags() -> NodeFlags {
    NodeFlags::HELPER | NodeFlags::IGNORE_PICK | NodeFlags::OVERLAY
}

fn arrow_mesh() -> Mesh {
    let shaft_length = ARROW_LENGTH - HEAD_LENGTH;
    let mut mesh = Mesh::cylinder(SHAFT_RADIUS, SHAFT_RADIUS, shaft_length, 12);
    mesh.append(
        &Mesh::cylinder(0.0, HEAD_RADIUS, HEAD_LENGTH, 12),
        Vec3::new(0.0, shaft_length, 0.0),
    );
    mesh
}

fn build_handles(graph: &mut SceneGraph, parent: NodeId) -> HandleNodes {
    let root = graph.add(
        Node::group("transform_gizmo").with_flags(NodeFlags::HELPER | NodeFlags::IGNORE_PICK),
        parent,
    );
    let mut handles = Vec::with_capacity(6);

    let arrow = arrow_mesh();
    for axis in GizmoAxis::ALL {
        let direction = axis.unit();
        let rotation = Quat::rotation_between(&Vec3::y(), &direction).unwrap_or_else(Quat::identity);
        let transform = Transform {
            position: direction * ARROW_OFFSET,
            rotation,
            scale: Vec3::repeat(1.0),
        };
        let material = Material::unlit(axis.arrow_color()).with_opacity(0.8);
        let node = Node::mesh(format!("gizmo_arrow_{axis:?}"), Geometry::custom(arrow.clone()), material)
            .with_transform(transform)
            .with_flags(handle_flags());
        handles.push((graph.add(node, root), Handle::Translate(axis)));
    }

    let rings = graph.add(Node::group("gizmo_rings").with_flags(handle_flags()), root);
    let ring = Mesh::torus(RING_RADIUS, RING_TUBE, 8, 48);
    for axis in GizmoAxis::ALL {
        let transform = Transform {
            rotation: axis.ring_rotation(),
            ..Transform::identity()
        };
        let material = Material::unlit(axis.ring_color()).with_opacity(0.6);
        let node = Node::mesh(format!("gizmo_ring_{axis:?}"), Geometry::custom(ring.clone()), material)
            .with_transform(transform)
            .with_flags(handle_flags());
        handles.push((graph.add(node, rings), Handle::Rotate(axis)));
    }

    for id in handles.iter().map(|(id, _)| *id).chain([root, rings]) {
        if let Some(node) = graph.get_mut(id) {
            node.render_order = 1;
        }
    }
    HandleNodes { root, rings, handles }
}

//! Viewpoint tour and camera transitions

use super::{CameraTween, InputLocks, OrbitControls};
use crate::config::CameraConfig;
use crate::foundation::math::Vec3;
use crate::render::Camera;
use crate::scene::{CameraState, NodeId, SceneGraph};
use crate::spatial::BoundingSphere;

/// Recorded viewpoints plus the transition currently running
#[derive(Debug, Clone)]
pub struct CameraController {
    tour: Vec<CameraState>,
    tween: Option<CameraTween>,
    transition_ms: f32,
    focus_margin: f32,
}

impl CameraController {
    /// Controller with an empty tour
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            tour: Vec::new(),
            tween: None,
            transition_ms: config.transition_ms,
            focus_margin: config.focus_margin,
        }
    }

    /// Current viewpoint of a camera
    pub fn snapshot(camera: &Camera) -> CameraState {
        CameraState {
            position: camera.position,
            target: camera.target,
            fov: Some(camera.fov_degrees()),
        }
    }

    /// Snapshot the camera and append it to the tour
    pub fn record_camera(&mut self, camera: &Camera) -> CameraState {
        let state = Self::snapshot(camera);
        self.tour.push(state);
        log::debug!("Recorded viewpoint {} at {:?}", self.tour.len(), state.position);
        state
    }

    /// Recorded viewpoints in order
    pub fn tour(&self) -> &[CameraState] {
        &self.tour
    }

    /// Replace the tour (document load)
    pub fn set_tour(&mut self, tour: Vec<CameraState>) {
        self.tour = tour;
    }

    /// Whether a transition is running
    pub fn is_transitioning(&self) -> bool {
        self.tween.is_some()
    }

    /// The running transition
    pub fn tween(&self) -> Option<&CameraTween> {
        self.tween.as_ref()
    }

    /// Start an eased transition to `state`
    ///
    /// Orbit input is locked until the transition completes. A transition
    /// already running is replaced from wherever the camera is now.
    pub fn look_at_state(
        &mut self,
        state: CameraState,
        duration_ms: Option<f32>,
        camera: &Camera,
        orbit: &mut OrbitControls,
    ) {
        let duration = duration_ms.unwrap_or(self.transition_ms);
        if self.tween.is_some() {
            log::debug!("Replacing running camera transition");
        }
        self.tween = Some(CameraTween::new(camera, state, duration));
        orbit.lock(InputLocks::TWEEN);
    }

    /// Transition to tour stop `index`
    pub fn go_to_stop(&mut self, index: usize, camera: &Camera, orbit: &mut OrbitControls) -> bool {
        let Some(state) = self.tour.get(index).copied() else {
            log::warn!("No recorded viewpoint {}", index);
            return false;
        };
        self.look_at_state(state, None, camera, orbit);
        true
    }

    /// Viewpoint framing `nodes`, keeping the current view direction
    ///
    /// The bounding sphere of the nodes fits the vertical field of view with
    /// the configured margin. `None` when the nodes have no geometry.
    pub fn focus_state(&self, graph: &SceneGraph, nodes: &[NodeId], camera: &Camera) -> Option<CameraState> {
        let corners: Vec<Vec3> = nodes
            .iter()
            .map(|id| graph.world_bounds(*id))
            .filter(|bounds| !bounds.is_empty())
            .flat_map(|bounds| bounds.corners())
            .collect();
        let sphere = BoundingSphere::from_points(&corners)?;
        let half_fov = (camera.fov * 0.5).max(1e-3);
        let distance = (sphere.radius / half_fov.sin()).abs() * self.focus_margin;
        let direction = (camera.position - sphere.center)
            .try_normalize(1e-6)
            .unwrap_or_else(|| -camera.forward());
        Some(CameraState {
            position: sphere.center + direction * distance,
            target: sphere.center,
            fov: None,
        })
    }

    /// Frame `nodes` with a transition; returns the destination
    pub fn look_at_nodes(
        &mut self,
        graph: &SceneGraph,
        nodes: &[NodeId],
        camera: &Camera,
        orbit: &mut OrbitControls,
    ) -> Option<CameraState> {
        let Some(state) = self.focus_state(graph, nodes, camera) else {
            log::debug!("Nothing to frame in {} nodes", nodes.len());
            return None;
        };
        self.look_at_state(state, None, camera, orbit);
        Some(state)
    }

    /// Advance the transition; releases the orbit lock when it completes
    ///
    /// Returns `true` while the camera is being moved.
    pub fn update(&mut self, delta_seconds: f32, camera: &mut Camera, orbit: &mut OrbitControls) -> bool {
        let Some(tween) = &mut self.tween else {
            return false;
        };
        if tween.advance(delta_seconds * 1000.0, camera) {
            self.tween = None;
            orbit.sync_from_camera(camera);
            orbit.unlock(InputLocks::TWEEN);
            log::trace!("Camera transition finished");
        }
        true
    }

    /// Stop the transition where it is
    pub fn cancel(&mut self, camera: &Camera, orbit: &mut OrbitControls) {
        if self.tween.take().is_some() {
            orbit.sync_from_camera(camera);
            orbit.unlock(InputLocks::TWEEN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::color::Color;
    use crate::foundation::math::Transform;
    use crate::render::Material;
    use crate::scene::{Geometry, Node};
    use approx::assert_relative_eq;

    fn setup() -> (Camera, OrbitControls, CameraController) {
        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 45.0, 1.0, 0.1, 100.0);
        let orbit = OrbitControls::from_camera(&camera);
        (camera, orbit, CameraController::new(&CameraConfig::default()))
    }

    #[test]
    fn test_record_camera_appends_snapshot() {
        let (camera, _, mut controller) = setup();
        let state = controller.record_camera(&camera);
        assert_eq!(controller.tour().len(), 1);
        assert_eq!(state.fov.map(f32::round), Some(45.0));
        assert_relative_eq!(controller.tour()[0].position, Vec3::new(0.0, 0.0, 10.0));
    }

    #[test]
    fn test_transition_locks_orbit_until_done() {
        let (mut camera, mut orbit, mut controller) = setup();
        let state = CameraState {
            position: Vec3::new(0.0, 5.0, 5.0),
            target: Vec3::zeros(),
            fov: Some(60.0),
        };
        controller.look_at_state(state, Some(1000.0), &camera, &mut orbit);
        assert!(!orbit.is_enabled());

        assert!(controller.update(0.5, &mut camera, &mut orbit));
        let fov = camera.fov_degrees();
        assert!(fov > 45.0 && fov < 60.0, "fov {fov}");
        assert!(!orbit.is_enabled());

        controller.update(0.5, &mut camera, &mut orbit);
        assert!(!controller.is_transitioning());
        assert!(orbit.is_enabled());
        assert_relative_eq!(camera.position, Vec3::new(0.0, 5.0, 5.0), epsilon = 1e-4);
        assert_relative_eq!(orbit.distance(), 50.0f32.sqrt(), epsilon = 1e-4);
        assert!(!controller.update(0.1, &mut camera, &mut orbit));
    }

    #[test]
    fn test_new_transition_replaces_running_one() {
        let (mut camera, mut orbit, mut controller) = setup();
        let first = CameraState {
            position: Vec3::new(10.0, 0.0, 0.0),
            target: Vec3::zeros(),
            fov: None,
        };
        let second = CameraState {
            position: Vec3::new(0.0, 0.0, 3.0),
            ..first
        };
        controller.look_at_state(first, Some(1000.0), &camera, &mut orbit);
        controller.update(0.25, &mut camera, &mut orbit);
        controller.look_at_state(second, Some(200.0), &camera, &mut orbit);
        controller.update(0.2, &mut camera, &mut orbit);
        assert_relative_eq!(camera.position, Vec3::new(0.0, 0.0, 3.0), epsilon = 1e-4);
        assert!(orbit.is_enabled());
    }

    #[test]
    fn test_focus_fits_bounding_sphere() {
        let (camera, mut orbit, mut controller) = setup();
        let mut graph = SceneGraph::new();
        let a = graph.add_to_content(
            Node::mesh("a", Geometry::cuboid([2.0; 3]), Material::lit(Color::WHITE))
                .with_transform(Transform::from_position(Vec3::new(4.0, 0.0, 0.0))),
        );
        let b = graph.add_to_content(
            Node::mesh("b", Geometry::cuboid([2.0; 3]), Material::lit(Color::WHITE))
                .with_transform(Transform::from_position(Vec3::new(-4.0, 0.0, 0.0))),
        );
        let state = controller.look_at_nodes(&graph, &[a, b], &camera, &mut orbit).unwrap();
        assert!(controller.is_transitioning());
        assert_relative_eq!(state.target, Vec3::zeros(), epsilon = 1e-3);
        assert_eq!(state.fov, None);

        let corners: Vec<Vec3> = [a, b].iter().flat_map(|id| graph.world_bounds(*id).corners()).collect();
        let sphere = BoundingSphere::from_points(&corners).unwrap();
        let expected = sphere.radius / (camera.fov * 0.5).sin() * CameraConfig::default().focus_margin;
        assert_relative_eq!((state.position - state.target).norm(), expected, epsilon = 1e-3);
        // same side of the scene as the camera was
        assert!(state.position.z > 0.0);
        // every corner fits inside the vertical field of view
        assert!(expected * (camera.fov * 0.5).sin() >= sphere.radius);

        assert!(controller.look_at_nodes(&graph, &[], &camera, &mut orbit).is_none());
    }
}

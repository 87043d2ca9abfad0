//! AR session lifecycle and content placement

use std::f32::consts::PI;

use super::marker::{estimate_marker_pose, SquareMarkerDetector};
use super::{ArError, CameraStream, MarkerDetector, OrientationSensor, XrPlatform};
use crate::config::ArConfig;
use crate::controls::{DeviceOrientation, InputLocks, OrbitControls};
use crate::foundation::color::Color;
use crate::foundation::math::{Quat, Transform, Vec3};
use crate::render::{Camera, Material, Mesh, RenderPipeline};
use crate::scene::{Geometry, Node, NodeFlags, NodeId, SceneGraph};

/// Backend chosen when the session started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArBackend {
    /// Platform AR with surface hit-testing
    Native,
    /// Camera feed background with sensor-driven camera
    Webcam,
}

/// How webcam AR positions the content group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementMode {
    /// Stay where the last placement put it
    #[default]
    Forward,
    /// Follow a printed square marker
    Marker,
}

/// Device services available to the session
pub struct ArPlatforms {
    /// Native AR runtime
    pub xr: Option<Box<dyn XrPlatform>>,
    /// Rear camera
    pub camera: Option<Box<dyn CameraStream>>,
    /// Orientation sensor
    pub sensor: Option<Box<dyn OrientationSensor>>,
    /// Marker finder used in marker placement
    pub detector: Box<dyn MarkerDetector>,
}

impl Default for ArPlatforms {
    fn default() -> Self {
        Self {
            xr: None,
            camera: None,
            sensor: None,
            detector: Box::new(SquareMarkerDetector::new()),
        }
    }
}

impl ArPlatforms {
    /// Provide a native AR runtime
    pub fn with_xr(mut self, xr: impl XrPlatform + 'static) -> Self {
        self.xr = Some(Box::new(xr));
        self
    }

    /// Provide a camera stream
    pub fn with_camera(mut self, camera: impl CameraStream + 'static) -> Self {
        self.camera = Some(Box::new(camera));
        self
    }

    /// Provide an orientation sensor
    pub fn with_sensor(mut self, sensor: impl OrientationSensor + 'static) -> Self {
        self.sensor = Some(Box::new(sensor));
        self
    }

    /// Replace the marker detector
    pub fn with_detector(mut self, detector: impl MarkerDetector + 'static) -> Self {
        self.detector = Box::new(detector);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SessionState {
    Inactive,
    Native {
        reticle: NodeId,
        placed: bool,
    },
    Webcam {
        placement: PlacementMode,
        last_scan_ms: Option<f64>,
        sensor_live: bool,
    },
}

/// Rotation about +Y turning a node's +Z towards `viewer`, with no pitch or roll
pub fn level_facing(position: Vec3, viewer: Vec3) -> Quat {
    let to_viewer = viewer - position;
    if to_viewer.x.abs() < 1e-6 && to_viewer.z.abs() < 1e-6 {
        return Quat::identity();
    }
    Quat::from_axis_angle(&Vec3::y_axis(), to_viewer.x.atan2(to_viewer.z))
}

/// Runs one AR session at a time over the scene's content group
pub struct ArManager {
    config: ArConfig,
    platforms: ArPlatforms,
    state: SessionState,
    content_group: Option<NodeId>,
    orientation: DeviceOrientation,
    message: Option<String>,
}

impl ArManager {
    /// Inactive manager over the given platforms
    pub fn new(config: &ArConfig, platforms: ArPlatforms) -> Self {
        Self {
            config: *config,
            platforms,
            state: SessionState::Inactive,
            content_group: None,
            orientation: DeviceOrientation::new(),
            message: None,
        }
    }

    /// Whether a session is running
    pub fn is_active(&self) -> bool {
        self.state != SessionState::Inactive
    }

    /// Backend of the running session
    pub fn backend(&self) -> Option<ArBackend> {
        match self.state {
            SessionState::Inactive => None,
            SessionState::Native { .. } => Some(ArBackend::Native),
            SessionState::Webcam { .. } => Some(ArBackend::Webcam),
        }
    }

    /// Native sessions present without the bloom composite
    pub fn is_presenting_native(&self) -> bool {
        matches!(self.state, SessionState::Native { .. })
    }

    /// Group holding the document content while a session runs
    pub fn content_group(&self) -> Option<NodeId> {
        self.content_group
    }

    /// Placement reticle of a native session
    pub fn reticle(&self) -> Option<NodeId> {
        match self.state {
            SessionState::Native { reticle, .. } => Some(reticle),
            _ => None,
        }
    }

    /// Whether the sensor is steering the camera
    pub fn is_sensor_live(&self) -> bool {
        matches!(self.state, SessionState::Webcam { sensor_live: true, .. })
    }

    /// Last user-facing message, cleared by reading
    pub fn take_message(&mut self) -> Option<String> {
        self.message.take()
    }

    /// Current webcam placement mode
    pub fn placement_mode(&self) -> Option<PlacementMode> {
        match self.state {
            SessionState::Webcam { placement, .. } => Some(placement),
            _ => None,
        }
    }

    /// Switch webcam placement between forward and marker tracking
    pub fn set_placement_mode(&mut self, mode: PlacementMode) -> bool {
        let SessionState::Webcam { placement, last_scan_ms, .. } = &mut self.state else {
            return false;
        };
        *placement = mode;
        *last_scan_ms = None;
        true
    }

    /// Start a session, choosing the backend by what the device offers
    ///
    /// On failure nothing in the scene changes and the error carries a
    /// user-facing message.
    ///
    /// # Errors
    /// [`ArError::NotSupported`], [`ArError::SessionFailed`] or
    /// [`ArError::CameraUnavailable`].
    pub fn start(
        &mut self,
        graph: &mut SceneGraph,
        camera: &Camera,
        orbit: &mut OrbitControls,
        pipeline: &mut RenderPipeline,
    ) -> Result<ArBackend, ArError> {
        if let Some(backend) = self.backend() {
            log::debug!("AR session already running ({:?})", backend);
            return Ok(backend);
        }
        let result = self.open_backend();
        let backend = match result {
            Ok(backend) => backend,
            Err(e) => {
                log::warn!("AR start failed: {}", e);
                self.message = Some(e.user_message().to_string());
                return Err(e);
            }
        };
        log::info!("AR session started with {:?} backend", backend);

        let group = self.adopt_content(graph);
        match backend {
            ArBackend::Native => {
                if let Some(node) = graph.get_mut(group) {
                    node.flags.remove(NodeFlags::VISIBLE);
                }
                let reticle = graph.add(reticle_node(), graph.root());
                self.state = SessionState::Native { reticle, placed: false };
            }
            ArBackend::Webcam => {
                if let Some(node) = graph.get_mut(group) {
                    node.transform.position = Vec3::from(self.config.default_offset);
                }
                orbit.lock(InputLocks::AR);
                let sensor_live = self.platforms.sensor.as_ref().is_some_and(|s| !s.needs_permission());
                self.state = SessionState::Webcam {
                    placement: PlacementMode::Forward,
                    last_scan_ms: None,
                    sensor_live,
                };
                if self.platforms.sensor.is_none() {
                    log::info!("No orientation sensor; placing content in front of the camera");
                    self.place_in_front(graph, camera);
                }
                pipeline.set_background_layer(None);
            }
        }
        Ok(backend)
    }

    fn open_backend(&mut self) -> Result<ArBackend, ArError> {
        if let Some(xr) = self.platforms.xr.as_mut().filter(|xr| xr.is_supported()) {
            xr.request_session()?;
            return Ok(ArBackend::Native);
        }
        let Some(camera) = self.platforms.camera.as_mut() else {
            return Err(ArError::NotSupported);
        };
        camera.open()?;
        Ok(ArBackend::Webcam)
    }

    /// Wrap the current content in a fresh group and make it the content root
    fn adopt_content(&mut self, graph: &mut SceneGraph) -> NodeId {
        let previous = graph.content_root();
        let group = graph.add(Node::group("ar_content"), graph.root());
        for child in graph.children(previous).to_vec() {
            if child != group {
                graph.reparent(child, group);
            }
        }
        graph.set_content_root(group);
        self.content_group = Some(group);
        group
    }

    /// Ask for orientation readings; `false` means static placement is used
    ///
    /// Denial or a failed request never ends the session: the content is
    /// placed once in front of the camera and stays there.
    pub fn request_orientation_permission(&mut self, graph: &mut SceneGraph, camera: &Camera) -> bool {
        if !matches!(self.state, SessionState::Webcam { .. }) {
            return false;
        }
        let granted = match self.platforms.sensor.as_mut() {
            None => Err(ArError::SensorUnavailable("no sensor".into())),
            Some(sensor) if !sensor.needs_permission() => Ok(true),
            Some(sensor) => sensor.request_permission(),
        };
        let live = match granted {
            Ok(true) => true,
            Ok(false) => {
                log::warn!("Orientation permission denied; using static placement");
                self.message = Some("Motion access was denied; the scene stays where it is.".into());
                false
            }
            Err(e) => {
                log::warn!("Orientation permission request failed: {}", e);
                self.message = Some(e.user_message().to_string());
                false
            }
        };
        if let SessionState::Webcam { sensor_live, .. } = &mut self.state {
            *sensor_live = live;
        }
        if !live {
            self.place_in_front(graph, camera);
        }
        live
    }

    /// Put the content group a fixed distance ahead of the camera, level and facing it
    pub fn place_in_front(&mut self, graph: &mut SceneGraph, camera: &Camera) -> bool {
        let Some(node) = self.content_group.and_then(|group| graph.get_mut(group)) else {
            return false;
        };
        let position = camera.position + camera.forward() * self.config.forward_distance_m;
        node.transform.position = position;
        node.transform.rotation = level_facing(position, camera.position);
        node.flags.insert(NodeFlags::VISIBLE);
        log::debug!("AR content placed at {:?}", position);
        true
    }

    /// Per-frame step; returns `true` when the camera was driven by the sensor
    pub fn update(
        &mut self,
        now_ms: f64,
        graph: &mut SceneGraph,
        camera: &mut Camera,
        pipeline: &mut RenderPipeline,
    ) -> bool {
        match self.state {
            SessionState::Inactive => false,
            SessionState::Native { reticle, placed } => {
                self.update_native(graph, reticle, placed);
                false
            }
            SessionState::Webcam { placement, last_scan_ms, sensor_live } => {
                let frame = self.platforms.camera.as_mut().and_then(|c| c.latest_frame());
                if let Some(frame) = &frame {
                    pipeline.set_background_layer(Some(frame.clone()));
                }

                let mut steered = false;
                if sensor_live {
                    if let Some(sensor) = self.platforms.sensor.as_mut() {
                        if let Some(reading) = sensor.latest_reading() {
                            self.orientation.set_reading(reading);
                        }
                        self.orientation.set_screen_orientation(sensor.screen_orientation());
                    }
                    steered = self.orientation.update(camera);
                }

                if placement == PlacementMode::Marker {
                    let due = last_scan_ms.map_or(true, |last| now_ms - last >= self.config.scan_interval_ms);
                    if let (true, Some(frame)) = (due, frame) {
                        if let SessionState::Webcam { last_scan_ms, .. } = &mut self.state {
                            *last_scan_ms = Some(now_ms);
                        }
                        if let Some(corners) = self.platforms.detector.detect(&frame) {
                            let pose = estimate_marker_pose(
                                &corners,
                                frame.width,
                                frame.height,
                                camera,
                                self.config.marker_width_m,
                            );
                            if let Some(pose) = pose {
                                self.place_at(graph, pose.position, camera.position);
                            }
                        }
                    }
                }
                steered
            }
        }
    }

    fn update_native(&mut self, graph: &mut SceneGraph, reticle: NodeId, placed: bool) {
        let Some(xr) = self.platforms.xr.as_mut() else {
            return;
        };
        let hit = xr.hit_pose();
        let selects = xr.take_select_events();
        if let Some(node) = graph.get_mut(reticle) {
            match hit {
                Some(pose) => {
                    node.transform.position = pose.position;
                    node.transform.rotation = pose.rotation * reticle_flat();
                    node.flags.insert(NodeFlags::VISIBLE);
                }
                None => node.flags.remove(NodeFlags::VISIBLE),
            }
        }
        let (Some(pose), true) = (hit, selects > 0) else {
            return;
        };
        if let Some(group) = self.content_group.and_then(|g| graph.get_mut(g)) {
            group.transform.position = pose.position;
            group.transform.rotation = pose.rotation;
            group.flags.insert(NodeFlags::VISIBLE);
            if !placed {
                log::info!("AR content placed on detected surface");
            }
        }
        self.state = SessionState::Native { reticle, placed: true };
    }

    fn place_at(&mut self, graph: &mut SceneGraph, position: Vec3, viewer: Vec3) {
        if let Some(group) = self.content_group.and_then(|g| graph.get_mut(g)) {
            group.transform.position = position;
            group.transform.rotation = level_facing(position, viewer);
            group.flags.insert(NodeFlags::VISIBLE);
        }
    }

    /// End the session and hand the content back to the scene root
    pub fn stop(&mut self, graph: &mut SceneGraph, orbit: &mut OrbitControls, pipeline: &mut RenderPipeline) {
        let state = std::mem::replace(&mut self.state, SessionState::Inactive);
        match state {
            SessionState::Inactive => return,
            SessionState::Native { reticle, .. } => {
                if let Some(xr) = self.platforms.xr.as_mut() {
                    xr.end_session();
                }
                graph.remove(reticle);
            }
            SessionState::Webcam { .. } => {
                if let Some(camera) = self.platforms.camera.as_mut() {
                    camera.close();
                }
                pipeline.set_background_layer(None);
                orbit.unlock(InputLocks::AR);
            }
        }
        if let Some(group) = self.content_group.take() {
            let root = graph.root();
            for child in graph.children(group).to_vec() {
                graph.reparent(child, root);
            }
            graph.remove(group);
            graph.set_content_root(root);
        }
        log::info!("AR session ended");
    }
}

/// Lays the XY-plane ring onto the surface's XZ plane
fn reticle_flat() -> Quat {
    Quat::from_axis_angle(&Vec3::x_axis(), -PI / 2.0)
}

fn reticle_node() -> Node {
    // inner radius 0.15, outer 0.2
    let ring = Mesh::torus(0.175, 0.025, 8, 32);
    let mut node = Node::mesh("ar_reticle", Geometry::custom(ring), Material::unlit(Color::WHITE))
        .with_flags(NodeFlags::HELPER | NodeFlags::IGNORE_PICK)
        .with_transform(Transform {
            rotation: reticle_flat(),
            ..Transform::default()
        });
    node.flags.remove(NodeFlags::VISIBLE);
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::sync::Arc;

    use crate::ar::MarkerCorners;
    use crate::config::RenderConfig;
    use crate::controls::OrientationReading;
    use crate::foundation::math::Vec2;
    use crate::render::Texture;
    use approx::assert_relative_eq;

    #[derive(Default)]
    struct FakeXr {
        supported: bool,
        refuse: bool,
        hits: VecDeque<Option<Transform>>,
        selects: VecDeque<usize>,
        ended: Rc<RefCell<bool>>,
    }

    impl XrPlatform for FakeXr {
        fn is_supported(&self) -> bool {
            self.supported
        }
        fn request_session(&mut self) -> Result<(), ArError> {
            if self.refuse {
                Err(ArError::SessionFailed("hit-test unavailable".into()))
            } else {
                Ok(())
            }
        }
        fn hit_pose(&mut self) -> Option<Transform> {
            self.hits.pop_front().flatten()
        }
        fn take_select_events(&mut self) -> usize {
            self.selects.pop_front().unwrap_or(0)
        }
        fn end_session(&mut self) {
            *self.ended.borrow_mut() = true;
        }
    }

    #[derive(Default)]
    struct FakeCamera {
        deny: bool,
        frame: Option<Arc<Texture>>,
    }

    impl CameraStream for FakeCamera {
        fn open(&mut self) -> Result<(), ArError> {
            if self.deny {
                Err(ArError::CameraUnavailable("permission denied".into()))
            } else {
                Ok(())
            }
        }
        fn latest_frame(&mut self) -> Option<Arc<Texture>> {
            self.frame.clone()
        }
        fn close(&mut self) {}
    }

    struct FakeSensor {
        gated: bool,
        grant: bool,
        reading: OrientationReading,
    }

    impl OrientationSensor for FakeSensor {
        fn needs_permission(&self) -> bool {
            self.gated
        }
        fn request_permission(&mut self) -> Result<bool, ArError> {
            Ok(self.grant)
        }
        fn latest_reading(&mut self) -> Option<OrientationReading> {
            Some(self.reading)
        }
        fn screen_orientation(&self) -> f32 {
            0.0
        }
    }

    /// Reports a fixed centred marker and counts calls
    struct CountingDetector {
        calls: Rc<RefCell<usize>>,
        span: f32,
    }

    impl MarkerDetector for CountingDetector {
        fn detect(&mut self, frame: &Texture) -> Option<MarkerCorners> {
            *self.calls.borrow_mut() += 1;
            let (cx, cy) = (frame.width as f32 * 0.5, frame.height as f32 * 0.5);
            let half = self.span * 0.5;
            Some(MarkerCorners {
                top_left: Vec2::new(cx - half, cy - half),
                top_right: Vec2::new(cx + half, cy - half),
                bottom_right: Vec2::new(cx + half, cy + half),
                bottom_left: Vec2::new(cx - half, cy + half),
            })
        }
    }

    struct Rig {
        graph: SceneGraph,
        camera: Camera,
        orbit: OrbitControls,
        pipeline: RenderPipeline,
        object: NodeId,
    }

    impl Rig {
        fn new() -> Self {
            let mut graph = SceneGraph::new();
            let object = graph.add_to_content(Node::mesh(
                "box",
                Geometry::cuboid([1.0; 3]),
                Material::lit(Color::WHITE),
            ));
            let mut camera = Camera::perspective(Vec3::zeros(), 45.0, 1.0, 0.01, 100.0);
            camera.target = Vec3::new(0.0, 0.0, -1.0);
            let orbit = OrbitControls::from_camera(&camera);
            Self {
                graph,
                camera,
                orbit,
                pipeline: RenderPipeline::new(&RenderConfig::default(), 64, 64),
                object,
            }
        }

        fn start(&mut self, manager: &mut ArManager) -> Result<ArBackend, ArError> {
            manager.start(&mut self.graph, &self.camera, &mut self.orbit, &mut self.pipeline)
        }

        fn update(&mut self, manager: &mut ArManager, now_ms: f64) -> bool {
            manager.update(now_ms, &mut self.graph, &mut self.camera, &mut self.pipeline)
        }

        fn stop(&mut self, manager: &mut ArManager) {
            manager.stop(&mut self.graph, &mut self.orbit, &mut self.pipeline);
        }
    }

    fn webcam(frame: bool) -> FakeCamera {
        FakeCamera {
            deny: false,
            frame: frame.then(|| Arc::new(Texture::solid(320, 240, [200, 200, 200, 255]))),
        }
    }

    #[test]
    fn test_backend_selection() {
        let mut rig = Rig::new();
        let native = ArPlatforms::default()
            .with_xr(FakeXr {
                supported: true,
                ..FakeXr::default()
            })
            .with_camera(webcam(true));
        let mut manager = ArManager::new(&ArConfig::default(), native);
        assert_eq!(rig.start(&mut manager), Ok(ArBackend::Native));
        assert!(manager.is_presenting_native());
        rig.stop(&mut manager);

        let unsupported_xr = ArPlatforms::default().with_xr(FakeXr::default()).with_camera(webcam(true));
        let mut manager = ArManager::new(&ArConfig::default(), unsupported_xr);
        assert_eq!(rig.start(&mut manager), Ok(ArBackend::Webcam));
        assert!(!manager.is_presenting_native());
    }

    #[test]
    fn test_failed_start_leaves_normal_mode() {
        let mut rig = Rig::new();
        let root = rig.graph.root();
        let denied = ArPlatforms::default().with_camera(FakeCamera {
            deny: true,
            ..FakeCamera::default()
        });
        let mut manager = ArManager::new(&ArConfig::default(), denied);
        let error = rig.start(&mut manager).unwrap_err();
        assert!(matches!(error, ArError::CameraUnavailable(_)));
        assert!(!manager.is_active());
        assert!(manager.take_message().is_some());
        assert_eq!(rig.graph.content_root(), root);
        assert_eq!(rig.graph.parent(rig.object), Some(root));
        assert!(rig.orbit.is_enabled());

        let refused = ArPlatforms::default().with_xr(FakeXr {
            supported: true,
            refuse: true,
            ..FakeXr::default()
        });
        let mut manager = ArManager::new(&ArConfig::default(), refused);
        assert!(matches!(rig.start(&mut manager), Err(ArError::SessionFailed(_))));

        let mut manager = ArManager::new(&ArConfig::default(), ArPlatforms::default());
        assert_eq!(rig.start(&mut manager), Err(ArError::NotSupported));
    }

    #[test]
    fn test_native_reticle_and_select_commit() {
        let mut rig = Rig::new();
        let ended = Rc::new(RefCell::new(false));
        let floor = Transform::from_position(Vec3::new(0.5, -1.2, -2.0));
        let xr = FakeXr {
            supported: true,
            hits: VecDeque::from([None, Some(floor), Some(floor)]),
            selects: VecDeque::from([1, 0, 1]),
            ended: ended.clone(),
            ..FakeXr::default()
        };
        let mut manager = ArManager::new(&ArConfig::default(), ArPlatforms::default().with_xr(xr));
        rig.start(&mut manager).unwrap();
        let group = manager.content_group().unwrap();
        let reticle = manager.reticle().unwrap();
        assert_eq!(rig.graph.content_root(), group);
        assert_eq!(rig.graph.parent(rig.object), Some(group));
        assert!(!rig.graph.get(group).unwrap().is_visible());

        // select without a surface does nothing
        rig.update(&mut manager, 0.0);
        assert!(!rig.graph.get(reticle).unwrap().is_visible());
        assert!(!rig.graph.get(group).unwrap().is_visible());

        // surface found: reticle follows, content waits for select
        rig.update(&mut manager, 16.0);
        assert!(rig.graph.get(reticle).unwrap().is_visible());
        assert_relative_eq!(rig.graph.get(reticle).unwrap().transform.position, floor.position);
        assert!(!rig.graph.get(group).unwrap().is_visible());

        rig.update(&mut manager, 32.0);
        let placed = rig.graph.get(group).unwrap();
        assert!(placed.is_visible());
        assert_relative_eq!(placed.transform.position, floor.position);

        rig.stop(&mut manager);
        assert!(*ended.borrow());
        assert!(!rig.graph.contains(reticle));
        assert!(!rig.graph.contains(group));
        assert_eq!(rig.graph.parent(rig.object), Some(rig.graph.root()));
        assert_eq!(rig.graph.content_root(), rig.graph.root());
    }

    #[test]
    fn test_webcam_session_locks_orbit_and_shows_feed() {
        let mut rig = Rig::new();
        let sensor = FakeSensor {
            gated: false,
            grant: true,
            reading: OrientationReading::new(0.0, 90.0, 0.0),
        };
        let platforms = ArPlatforms::default().with_camera(webcam(true)).with_sensor(sensor);
        let mut manager = ArManager::new(&ArConfig::default(), platforms);
        assert_eq!(rig.start(&mut manager), Ok(ArBackend::Webcam));

        let group = manager.content_group().unwrap();
        assert_relative_eq!(rig.graph.get(group).unwrap().transform.position, Vec3::new(0.0, 0.0, -5.0));
        assert!(rig.orbit.locks().contains(InputLocks::AR));
        assert!(manager.is_sensor_live());

        assert!(rig.update(&mut manager, 0.0));
        assert!(rig.pipeline.has_background_layer());
        // upright device looks at the horizon
        assert_relative_eq!(rig.camera.forward(), Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-4);

        rig.stop(&mut manager);
        assert!(!rig.pipeline.has_background_layer());
        assert!(rig.orbit.is_enabled());
        assert_eq!(rig.graph.parent(rig.object), Some(rig.graph.root()));
    }

    #[test]
    fn test_denied_orientation_falls_back_to_forward_placement() {
        let mut rig = Rig::new();
        rig.camera.position = Vec3::new(1.0, 1.6, 0.0);
        // looking down and to the right
        rig.camera.target = Vec3::new(2.0, 1.0, -1.0);
        let sensor = FakeSensor {
            gated: true,
            grant: false,
            reading: OrientationReading::default(),
        };
        let platforms = ArPlatforms::default().with_camera(webcam(false)).with_sensor(sensor);
        let mut manager = ArManager::new(&ArConfig::default(), platforms);
        rig.start(&mut manager).unwrap();
        assert!(!manager.is_sensor_live());

        assert!(!manager.request_orientation_permission(&mut rig.graph, &rig.camera));
        assert!(manager.is_active());
        assert!(manager.take_message().is_some());

        let group = rig.graph.get(manager.content_group().unwrap()).unwrap();
        let expected = rig.camera.position + rig.camera.forward() * 5.0;
        assert_relative_eq!(group.transform.position, expected, epsilon = 1e-5);
        // level: local up stays world up, and +Z points back at the viewer horizontally
        assert_relative_eq!(group.transform.rotation * Vec3::y(), Vec3::y(), epsilon = 1e-5);
        let facing = group.transform.rotation * Vec3::z();
        let flat = Vec3::new(rig.camera.position.x - expected.x, 0.0, rig.camera.position.z - expected.z).normalize();
        assert_relative_eq!(facing, flat, epsilon = 1e-5);

        // the sensor never steers the camera
        let before = rig.camera.clone();
        assert!(!rig.update(&mut manager, 0.0));
        assert_eq!(rig.camera, before);
    }

    #[test]
    fn test_granted_permission_connects_sensor() {
        let mut rig = Rig::new();
        let sensor = FakeSensor {
            gated: true,
            grant: true,
            reading: OrientationReading::new(0.0, 90.0, 0.0),
        };
        let platforms = ArPlatforms::default().with_camera(webcam(true)).with_sensor(sensor);
        let mut manager = ArManager::new(&ArConfig::default(), platforms);
        rig.start(&mut manager).unwrap();
        assert!(!rig.update(&mut manager, 0.0));
        assert!(manager.request_orientation_permission(&mut rig.graph, &rig.camera));
        assert!(rig.update(&mut manager, 16.0));
    }

    #[test]
    fn test_marker_scans_are_rate_limited() {
        let mut rig = Rig::new();
        let calls = Rc::new(RefCell::new(0));
        let detector = CountingDetector {
            calls: calls.clone(),
            span: 40.0,
        };
        let platforms = ArPlatforms::default().with_camera(webcam(true)).with_detector(detector);
        let mut manager = ArManager::new(&ArConfig::default(), platforms);
        rig.start(&mut manager).unwrap();
        assert!(manager.set_placement_mode(PlacementMode::Marker));

        for now in [0.0, 50.0, 150.0, 199.0, 200.0, 260.0, 420.0] {
            rig.update(&mut manager, now);
        }
        // scans at 0, 200 and 420
        assert_eq!(*calls.borrow(), 3);

        // centred marker: straight ahead of the camera at the estimated distance
        let focal = 240.0 * 0.5 / (rig.camera.fov * 0.5).tan();
        let distance = 0.15 * focal / 40.0;
        let group = rig.graph.get(manager.content_group().unwrap()).unwrap();
        assert_relative_eq!(group.transform.position, Vec3::new(0.0, 0.0, -distance), epsilon = 1e-3);
        assert_relative_eq!(group.transform.rotation * Vec3::z(), Vec3::z(), epsilon = 1e-5);
    }
}

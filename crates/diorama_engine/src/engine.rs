//! Engine session
//!
//! The [`Engine`] owns one live scene and every subsystem that touches it.
//! Hosts drive it with [`Engine::frame`] once per display refresh (or AR
//! session frame) and forward pointer events with [`Engine::pointer_event`].
//! Within a frame the order is fixed: pending loads, effects, camera,
//! animations, render, then the host hook and the clock.

use std::sync::Arc;

use thiserror::Error;

use crate::application::{AppError, Application};
use crate::ar::{ArBackend, ArError, ArManager, ArPlatforms, PlacementMode};
use crate::assets::{AssetError, AsyncLoader, Completion, ResourceCache};
use crate::config::{ConfigError, EngineConfig};
use crate::controls::{CameraController, InputLocks, OrbitControls, OrbitLimits};
use crate::editor::{spawn_grid, GizmoState, GridOptions, Handle, TransformGizmo};
use crate::effects::{AddMode, EffectContext, EffectError, EffectId, EffectKind, EffectManager, EffectRegistry};
use crate::foundation::color::Color;
use crate::foundation::math::Vec3;
use crate::foundation::time::FrameClock;
use crate::input::{ClickClassifier, ClickKind, ClickTracker, PickHit, Picker, PointerEvent, PointerGesture, PointerState};
use crate::render::{Camera, ColorTarget, FrameOptions, RenderError, RenderPipeline};
use crate::scene::{
    save_document, AnimationSystem, CameraState, DocumentMeta, LoadContext, LoadJob, LoadReport, LoadStatus,
    NodeId, Options, ParsedDocument, ProgressFn, SceneDocument, SceneError, SceneGraph, SceneLoader,
    TemplateSource,
};

/// Engine-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// The session has been disposed
    #[error("Engine session disposed")]
    Disposed,

    /// Document loading or saving failed
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// An effect could not be attached
    #[error("Effect error: {0}")]
    Effect(#[from] EffectError),

    /// Rendering failed
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// Asset loading failed
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// AR could not start
    #[error("AR error: {0}")]
    Ar(#[from] ArError),

    /// Configuration could not be read
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// What a pointer event did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerOutcome {
    /// Nothing happened
    None,
    /// A gizmo handle was grabbed
    GizmoGrab(Handle),
    /// The grabbed handle moved its target
    GizmoDrag,
    /// The grabbed handle was released
    GizmoRelease,
    /// The camera orbited
    Orbit,
    /// A drag ended without picking
    DragEnd,
    /// A click changed the selection
    Selected(Option<NodeId>),
    /// A double-click started a focus transition
    Focused(NodeId),
}

struct ActiveLoad {
    id: u64,
    job: LoadJob,
    /// Move to the first tour stop once finished
    start_tour: bool,
}

/// One interactive diorama session
pub struct Engine {
    config: EngineConfig,
    cache: Option<Arc<ResourceCache>>,
    loader: AsyncLoader,
    scene_loader: SceneLoader,
    graph: SceneGraph,
    effects: EffectManager,
    animations: AnimationSystem,
    picker: Picker,
    clicks: ClickClassifier,
    double_clicks: ClickTracker,
    pointer: PointerState,
    gizmo: TransformGizmo,
    grid: Option<NodeId>,
    camera: Camera,
    orbit: OrbitControls,
    camera_controller: CameraController,
    pipeline: RenderPipeline,
    ar: ArManager,
    jobs: Vec<ActiveLoad>,
    completions: Vec<Completion>,
    finished_loads: Vec<(u64, LoadReport)>,
    next_load: u64,
    clock: FrameClock,
    selection: Option<NodeId>,
    background: Option<String>,
    disposed: bool,
}

impl Engine {
    /// Create a session over an injected resource cache
    pub fn new(config: EngineConfig, cache: Arc<ResourceCache>) -> Self {
        log::info!(
            "Creating engine session {}x{} (edit mode: {})",
            config.viewport.width,
            config.viewport.height,
            config.edit_mode
        );
        let camera_config = &config.camera;
        let mut camera = Camera::perspective(
            Vec3::from(camera_config.position),
            camera_config.fov_degrees,
            config.viewport.aspect(),
            camera_config.near,
            camera_config.far,
        );
        camera.target = Vec3::from(camera_config.target);

        let mut picker = Picker::new();
        picker.set_include_markers(config.edit_mode);

        let mut engine = Self {
            loader: AsyncLoader::new(cache.clone()),
            cache: Some(cache),
            scene_loader: SceneLoader::new(),
            graph: SceneGraph::new(),
            effects: EffectManager::new(EffectRegistry::with_builtins()),
            animations: AnimationSystem::new(),
            picker,
            clicks: ClickClassifier::from_config(&config.picking),
            double_clicks: ClickTracker::from_config(&config.picking),
            pointer: PointerState::new(config.viewport.width, config.viewport.height),
            gizmo: TransformGizmo::new(),
            grid: None,
            orbit: OrbitControls::from_camera(&camera),
            camera_controller: CameraController::new(camera_config),
            pipeline: RenderPipeline::new(&config.render, config.viewport.width, config.viewport.height),
            ar: ArManager::new(&config.ar, ArPlatforms::default()),
            camera,
            jobs: Vec::new(),
            completions: Vec::new(),
            finished_loads: Vec::new(),
            next_load: 0,
            clock: FrameClock::new(),
            selection: None,
            background: None,
            disposed: false,
            config,
        };
        if engine.config.edit_mode {
            engine.show_grid(true);
        }
        engine
    }

    /// Use device AR services
    pub fn with_ar_platforms(mut self, platforms: ArPlatforms) -> Self {
        self.ar = ArManager::new(&self.config.ar, platforms);
        self
    }

    /// Resolve `template` objects through `source`
    pub fn with_templates(mut self, source: Arc<dyn TemplateSource>) -> Self {
        self.scene_loader = SceneLoader::new().with_templates(source);
        self
    }

    /// Replace the effect registry (before any effect is attached)
    pub fn with_effect_registry(mut self, registry: EffectRegistry) -> Self {
        self.effects = EffectManager::new(registry);
        self
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.disposed {
            Err(EngineError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The injected cache, until disposal drops it
    pub fn cache(&self) -> Option<&Arc<ResourceCache>> {
        self.cache.as_ref()
    }

    /// Live scene
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    /// Live scene, for direct edits
    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// Render camera
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Move the camera directly; the orbit controls follow
    pub fn set_camera(&mut self, position: Vec3, target: Vec3) {
        self.camera.position = position;
        self.camera.target = target;
        self.orbit.sync_from_camera(&self.camera);
    }

    /// Orbit controls driving the camera
    pub fn orbit(&self) -> &OrbitControls {
        &self.orbit
    }

    /// Orbit controls, for limits and locks
    pub fn orbit_mut(&mut self) -> &mut OrbitControls {
        &mut self.orbit
    }

    /// Tour and camera transitions
    pub fn camera_controller(&self) -> &CameraController {
        &self.camera_controller
    }

    /// Attached effects
    pub fn effects(&self) -> &EffectManager {
        &self.effects
    }

    /// Running property tweens
    pub fn animations(&self) -> &AnimationSystem {
        &self.animations
    }

    /// Transform gizmo
    pub fn gizmo(&self) -> &TransformGizmo {
        &self.gizmo
    }

    /// Render pipeline
    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    /// AR session state
    pub fn ar(&self) -> &ArManager {
        &self.ar
    }

    /// Frame clock
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Last composed frame
    pub fn output(&self) -> &ColorTarget {
        self.pipeline.output()
    }

    /// Currently selected top-level node
    pub fn selection(&self) -> Option<NodeId> {
        self.selection
    }

    /// Whether `dispose` has run
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Change the viewport size
    ///
    /// # Errors
    /// Render target errors (zero size, mid-frame, released).
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), EngineError> {
        self.ensure_live()?;
        self.pipeline.resize(width, height)?;
        self.camera.set_aspect_ratio(width as f32 / height as f32);
        self.pointer.update_viewport(width, height);
        self.config.viewport.width = width;
        self.config.viewport.height = height;
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Documents
    // ----------------------------------------------------------------------

    /// Begin loading a document into the content root
    ///
    /// Top-level fields (tour, background, limits) apply at once; objects
    /// materialize over the following frames.
    ///
    /// # Errors
    /// [`EngineError::Disposed`].
    pub fn start_load(&mut self, parsed: ParsedDocument, progress: Option<ProgressFn>) -> Result<(), EngineError> {
        self.ensure_live()?;
        self.queue_load(parsed, progress);
        Ok(())
    }

    fn queue_load(&mut self, parsed: ParsedDocument, progress: Option<ProgressFn>) -> u64 {
        let start_tour = self.apply_document_fields(&parsed.document);
        let job = self.scene_loader.start(parsed, false, progress, &mut self.graph);
        self.push_job(job, start_tour)
    }

    fn push_job(&mut self, job: LoadJob, start_tour: bool) -> u64 {
        let id = self.next_load;
        self.next_load += 1;
        self.jobs.push(ActiveLoad { id, job, start_tour });
        id
    }

    /// Begin loading a document as a detachable, non-pickable group
    ///
    /// The group stays hidden until its load finishes.
    ///
    /// # Errors
    /// [`EngineError::Disposed`].
    pub fn start_group_load(&mut self, parsed: ParsedDocument) -> Result<Option<NodeId>, EngineError> {
        self.ensure_live()?;
        let job = self.scene_loader.start(parsed, true, None, &mut self.graph);
        let group = job.report().group;
        self.push_job(job, false);
        Ok(group)
    }

    /// Parse and load a JSON document to completion
    ///
    /// Only this document is waited for; other running loads keep going
    /// and their reports stay queued for [`take_finished_loads`](Self::take_finished_loads).
    ///
    /// # Errors
    /// [`SceneError::Parse`] for an unreadable document; individual bad
    /// objects are reported in the returned [`LoadReport`] instead.
    pub fn load_json(&mut self, text: &str, progress: Option<ProgressFn>) -> Result<LoadReport, EngineError> {
        self.ensure_live()?;
        let parsed = SceneDocument::from_json(text)?;
        let id = self.queue_load(parsed, progress);
        loop {
            self.pump_loads();
            if let Some(index) = self.finished_loads.iter().position(|(load, _)| *load == id) {
                return Ok(self.finished_loads.remove(index).1);
            }
            if !self.jobs.iter().any(|active| active.id == id) {
                return Err(EngineError::Scene(SceneError::Cancelled));
            }
            let completion = self.loader.wait()?;
            self.completions.push(completion);
        }
    }

    /// Block until every running load finishes; returns their reports
    ///
    /// # Errors
    /// [`EngineError::Asset`] if the background loader stopped.
    pub fn finish_loads(&mut self) -> Result<Vec<LoadReport>, EngineError> {
        self.ensure_live()?;
        loop {
            self.pump_loads();
            if self.jobs.is_empty() {
                break;
            }
            let completion = self.loader.wait()?;
            self.completions.push(completion);
        }
        Ok(self.take_finished_loads())
    }

    /// Whether any load is still running
    pub fn is_loading(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Reports of loads finished by the frame loop since the last call
    pub fn take_finished_loads(&mut self) -> Vec<LoadReport> {
        std::mem::take(&mut self.finished_loads)
            .into_iter()
            .map(|(_, report)| report)
            .collect()
    }

    fn apply_document_fields(&mut self, document: &SceneDocument) -> bool {
        if !document.camera_list.is_empty() {
            self.camera_controller.set_tour(document.camera_list.clone());
        }
        if let Some(background) = &document.background {
            match Color::from_hex(background) {
                Some(color) => self.pipeline.set_clear_color(color),
                None => log::debug!("Background '{}' is not a color; keeping clear color", background),
            }
            self.background = Some(background.clone());
        }
        if let Some(limits) = &document.controls {
            self.orbit.limits.apply_document(limits);
        }
        !document.camera_list.is_empty()
    }

    fn pump_loads(&mut self) {
        if self.jobs.is_empty() {
            return;
        }
        self.completions.extend(self.loader.poll());
        let mut ctx = LoadContext {
            graph: &mut self.graph,
            camera: &self.camera,
            viewport_height: self.pipeline.height(),
            bloom: self.pipeline.bloom_mut(),
            effects: &mut self.effects,
            animations: &mut self.animations,
        };
        for active in &mut self.jobs {
            active.job.pump(&mut self.completions, &mut self.loader, &mut ctx);
        }

        let (done, running): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.jobs).into_iter().partition(|a| a.job.status().is_done());
        self.jobs = running;
        for active in done {
            let finished = active.job.status() == LoadStatus::Finished;
            if finished && active.start_tour {
                self.camera_controller.go_to_stop(0, &self.camera, &mut self.orbit);
            }
            self.finished_loads.push((active.id, active.job.into_report()));
        }
        self.picker.sync(&self.graph);
    }

    /// Write the live scene back to a document
    ///
    /// # Errors
    /// [`EngineError::Disposed`].
    pub fn save(&self) -> Result<SceneDocument, EngineError> {
        self.ensure_live()?;
        let limits = (self.orbit.limits != OrbitLimits::default()).then(|| self.orbit.limits.to_document());
        let meta = DocumentMeta {
            camera_list: self.camera_controller.tour(),
            background: self.background.as_deref(),
            controls: limits,
        };
        Ok(save_document(&self.graph, &self.effects, meta))
    }

    /// Remove a node with its subtree and everything bound to it
    pub fn remove_node(&mut self, id: NodeId) -> Vec<NodeId> {
        if self.disposed {
            return Vec::new();
        }
        let removed = self.graph.remove(id);
        if removed.is_empty() {
            return removed;
        }
        let mut ctx = EffectContext {
            graph: &mut self.graph,
            camera: &self.camera,
            viewport_height: self.pipeline.height(),
            bloom: self.pipeline.bloom_mut(),
        };
        self.effects.on_nodes_removed(&removed, &mut ctx);
        self.animations.remove_nodes(&removed);
        self.picker.forget(&removed);
        if self.selection.is_some_and(|s| removed.contains(&s)) {
            self.select(None);
        }
        removed
    }

    // ----------------------------------------------------------------------
    // Effects
    // ----------------------------------------------------------------------

    /// Attach an effect by document name
    ///
    /// # Errors
    /// [`EffectError`] for unknown kinds, missing targets and rejected duplicates.
    pub fn add_effect(
        &mut self,
        name: &str,
        target: NodeId,
        options: Options,
        mode: AddMode,
    ) -> Result<EffectId, EngineError> {
        self.ensure_live()?;
        let mut ctx = EffectContext {
            graph: &mut self.graph,
            camera: &self.camera,
            viewport_height: self.pipeline.height(),
            bloom: self.pipeline.bloom_mut(),
        };
        Ok(self.effects.add_effect(&EffectKind::from_name(name), target, options, mode, &mut ctx)?)
    }

    /// Detach one effect kind from `target`
    pub fn remove_effect(&mut self, target: NodeId, name: &str) -> bool {
        if self.disposed {
            return false;
        }
        let mut ctx = EffectContext {
            graph: &mut self.graph,
            camera: &self.camera,
            viewport_height: self.pipeline.height(),
            bloom: self.pipeline.bloom_mut(),
        };
        self.effects.remove_effect(target, &EffectKind::from_name(name), &mut ctx)
    }

    /// Detach every effect from `target`
    pub fn remove_all_effects(&mut self, target: NodeId) -> usize {
        if self.disposed {
            return 0;
        }
        let mut ctx = EffectContext {
            graph: &mut self.graph,
            camera: &self.camera,
            viewport_height: self.pipeline.height(),
            bloom: self.pipeline.bloom_mut(),
        };
        self.effects.remove_all_effects(target, &mut ctx)
    }

    // ----------------------------------------------------------------------
    // Camera
    // ----------------------------------------------------------------------

    /// Append the current viewpoint to the tour
    pub fn record_camera(&mut self) -> CameraState {
        self.camera_controller.record_camera(&self.camera)
    }

    /// Transition to a viewpoint
    pub fn look_at_state(&mut self, state: CameraState, duration_ms: Option<f32>) {
        if !self.disposed {
            self.camera_controller
                .look_at_state(state, duration_ms, &self.camera, &mut self.orbit);
        }
    }

    /// Frame some nodes with a transition
    pub fn look_at_nodes(&mut self, nodes: &[NodeId]) -> Option<CameraState> {
        if self.disposed {
            return None;
        }
        self.camera_controller
            .look_at_nodes(&self.graph, nodes, &self.camera, &mut self.orbit)
    }

    /// Transition to tour stop `index`
    pub fn go_to_stop(&mut self, index: usize) -> bool {
        !self.disposed && self.camera_controller.go_to_stop(index, &self.camera, &mut self.orbit)
    }

    /// Disable or re-enable orbit input on behalf of the host
    pub fn set_orbit_enabled(&mut self, enabled: bool) {
        if enabled {
            self.orbit.unlock(InputLocks::USER);
        } else {
            self.orbit.lock(InputLocks::USER);
        }
    }

    // ----------------------------------------------------------------------
    // Editing
    // ----------------------------------------------------------------------

    /// Toggle edit mode: gizmo on selection, grid, markers, bloom suppression
    pub fn set_edit_mode(&mut self, edit_mode: bool) {
        if self.disposed || self.config.edit_mode == edit_mode {
            return;
        }
        self.config.edit_mode = edit_mode;
        self.picker.set_include_markers(edit_mode);
        self.show_grid(edit_mode);
        let selection = self.selection;
        self.select(if edit_mode { selection } else { None });
    }

    fn show_grid(&mut self, show: bool) {
        match (show, self.grid) {
            (true, None) => {
                let root = self.graph.root();
                self.grid = Some(spawn_grid(&mut self.graph, root, &GridOptions::default()));
            }
            (false, Some(grid)) => {
                self.graph.remove(grid);
                self.grid = None;
            }
            _ => {}
        }
    }

    /// Ground grid helper shown in edit mode
    pub fn grid(&self) -> Option<NodeId> {
        self.grid
    }

    /// Change the selection
    ///
    /// In edit mode the gizmo follows the selection and bloom is suppressed
    /// while something is selected.
    pub fn select(&mut self, node: Option<NodeId>) {
        if self.disposed {
            return;
        }
        let node = node.filter(|id| self.graph.contains(*id));
        self.selection = node;
        if !self.config.edit_mode {
            return;
        }
        match node {
            Some(id) => {
                self.gizmo.attach(&mut self.graph, id);
                self.pipeline.set_bloom_suppressed(true);
            }
            None => {
                self.gizmo.detach(&mut self.graph);
                self.pipeline.set_bloom_suppressed(false);
            }
        }
    }

    /// Turn bloom on or off; running transitions are left alone
    pub fn set_bloom_enabled(&mut self, enabled: bool) {
        self.pipeline.set_bloom_enabled(enabled);
    }

    // ----------------------------------------------------------------------
    // Pointer input
    // ----------------------------------------------------------------------

    /// Route a pointer event
    ///
    /// The gizmo gets first refusal while it is visible. Otherwise presses
    /// feed the orbit controls and the click classifier; a click picks and
    /// selects, a second click on the same node focuses it.
    ///
    /// # Errors
    /// Render target errors from the id pass; [`EngineError::Disposed`].
    pub fn pointer_event(&mut self, event: PointerEvent) -> Result<PointerOutcome, EngineError> {
        self.ensure_live()?;
        let (x, y) = event.position();
        self.pointer.update_position(x, y);
        match event {
            PointerEvent::Down { x, y } => {
                if self.gizmo.is_visible(&self.graph)
                    && self
                        .gizmo
                        .pointer_down(&mut self.pipeline, &self.graph, &self.camera, &self.pointer)?
                {
                    self.orbit.lock(InputLocks::GIZMO);
                    self.clicks.reset();
                    let handle = match *self.gizmo.state() {
                        GizmoState::Rotating { axis, .. } => Handle::Rotate(axis),
                        GizmoState::Dragging { axis, .. } => Handle::Translate(axis),
                        GizmoState::Idle => return Ok(PointerOutcome::None),
                    };
                    return Ok(PointerOutcome::GizmoGrab(handle));
                }
                self.clicks.pointer_down(x, y);
                self.orbit.begin_drag(x, y);
                Ok(PointerOutcome::None)
            }
            PointerEvent::Move { x, y } => {
                if self.gizmo.is_active() {
                    let moved = self.gizmo.pointer_move(&mut self.graph, &self.camera, &self.pointer);
                    return Ok(if moved { PointerOutcome::GizmoDrag } else { PointerOutcome::None });
                }
                if self.clicks.is_dragging(x, y) && self.orbit.drag_to(x, y, self.pointer.viewport_height) {
                    return Ok(PointerOutcome::Orbit);
                }
                Ok(PointerOutcome::None)
            }
            PointerEvent::Up { x, y } => {
                if self.gizmo.pointer_up() {
                    self.orbit.unlock(InputLocks::GIZMO);
                    return Ok(PointerOutcome::GizmoRelease);
                }
                self.orbit.end_drag();
                match self.clicks.pointer_up(x, y) {
                    PointerGesture::Click { .. } => self.click(),
                    PointerGesture::Drag => Ok(PointerOutcome::DragEnd),
                    PointerGesture::None => Ok(PointerOutcome::None),
                }
            }
        }
    }

    fn click(&mut self) -> Result<PointerOutcome, EngineError> {
        let hit = match self.pointer.pixel() {
            Some((px, py)) => self.pick(px, py)?,
            None => None,
        };
        let target = hit.map(|h| h.node);
        match (self.double_clicks.register(target, self.clock.total_millis()), target) {
            (ClickKind::Double, Some(node)) => {
                self.look_at_nodes(&[node]);
                Ok(PointerOutcome::Focused(node))
            }
            _ => {
                self.select(target);
                Ok(PointerOutcome::Selected(target))
            }
        }
    }

    /// Resolve the top-level node under a pixel
    ///
    /// # Errors
    /// Render target errors from the id pass.
    pub fn pick(&mut self, x: u32, y: u32) -> Result<Option<PickHit>, EngineError> {
        self.ensure_live()?;
        Ok(self.picker.pick(&mut self.pipeline, &self.graph, &self.camera, x, y)?)
    }

    // ----------------------------------------------------------------------
    // AR
    // ----------------------------------------------------------------------

    /// Start AR; on failure the session stays in normal camera mode
    ///
    /// # Errors
    /// [`EngineError::Ar`] carrying the reason; see [`ArError::user_message`].
    pub fn start_ar(&mut self) -> Result<ArBackend, EngineError> {
        self.ensure_live()?;
        let backend = self
            .ar
            .start(&mut self.graph, &self.camera, &mut self.orbit, &mut self.pipeline)?;
        self.picker.sync(&self.graph);
        Ok(backend)
    }

    /// Ask for orientation readings (webcam AR); `false` means static placement
    pub fn request_orientation_permission(&mut self) -> bool {
        !self.disposed && self.ar.request_orientation_permission(&mut self.graph, &self.camera)
    }

    /// Place AR content in front of the camera
    pub fn place_ar_content(&mut self) -> bool {
        !self.disposed && self.ar.place_in_front(&mut self.graph, &self.camera)
    }

    /// Switch webcam AR between forward and marker placement
    pub fn set_ar_placement(&mut self, mode: PlacementMode) -> bool {
        self.ar.set_placement_mode(mode)
    }

    /// Leave AR and return the content to the scene root
    pub fn stop_ar(&mut self) {
        if !self.disposed {
            self.ar.stop(&mut self.graph, &mut self.orbit, &mut self.pipeline);
        }
    }

    /// User-facing message from the last AR failure
    pub fn take_ar_message(&mut self) -> Option<String> {
        self.ar.take_message()
    }

    // ----------------------------------------------------------------------
    // Frame loop
    // ----------------------------------------------------------------------

    /// Run one frame of `delta` seconds
    ///
    /// # Errors
    /// [`EngineError::Disposed`], or a render error.
    pub fn frame(&mut self, delta: f32) -> Result<(), EngineError> {
        self.step(delta)?;
        self.clock.advance(delta);
        Ok(())
    }

    /// Run one frame and hand it to the application hook before the clock moves
    ///
    /// # Errors
    /// Engine errors, or whatever the hook returns.
    pub fn frame_with(&mut self, delta: f32, app: &mut dyn Application) -> Result<(), AppError> {
        self.step(delta)?;
        app.on_frame(self, delta)?;
        self.clock.advance(delta);
        Ok(())
    }

    /// Initialize `app`, run `frames` frames of `delta` seconds, then clean up
    ///
    /// # Errors
    /// The first engine or application error; cleanup still runs.
    pub fn run(&mut self, app: &mut dyn Application, frames: usize, delta: f32) -> Result<(), AppError> {
        app.initialize(self)?;
        let mut result = Ok(());
        for _ in 0..frames {
            result = self.frame_with(delta, app);
            if result.is_err() {
                break;
            }
        }
        app.cleanup(self);
        result
    }

    fn step(&mut self, delta: f32) -> Result<(), EngineError> {
        self.ensure_live()?;
        let delta = delta.max(0.0);

        self.pump_loads();

        {
            let mut ctx = EffectContext {
                graph: &mut self.graph,
                camera: &self.camera,
                viewport_height: self.pipeline.height(),
                bloom: self.pipeline.bloom_mut(),
            };
            self.effects.update(delta, &mut ctx);
        }

        let now_ms = self.clock.total_millis();
        let tweening = self
            .camera_controller
            .update(delta, &mut self.camera, &mut self.orbit);
        self.ar
            .update(now_ms, &mut self.graph, &mut self.camera, &mut self.pipeline);
        if !tweening {
            self.orbit.update(&mut self.camera);
        }

        self.animations.update(&mut self.graph, delta);
        self.gizmo.follow(&mut self.graph);

        let options = FrameOptions {
            show_markers: self.config.edit_mode,
            allow_bloom: !self.ar.is_presenting_native(),
        };
        self.pipeline.render(&mut self.graph, &self.camera, options)?;
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Teardown
    // ----------------------------------------------------------------------

    /// Tear the session down; later calls do nothing
    ///
    /// Cancels loads and discards their late results, disposes effects and
    /// helpers, ends AR, releases render targets and drops the cache.
    pub fn dispose(&mut self) {
        if self.disposed {
            log::debug!("Engine already disposed");
            return;
        }
        log::info!("Disposing engine session");

        for active in &mut self.jobs {
            active.job.cancel();
        }
        self.jobs.clear();
        self.completions.clear();
        self.loader.shutdown();
        log::debug!("Loads cancelled");

        self.ar.stop(&mut self.graph, &mut self.orbit, &mut self.pipeline);
        {
            let mut ctx = EffectContext {
                graph: &mut self.graph,
                camera: &self.camera,
                viewport_height: self.pipeline.height(),
                bloom: self.pipeline.bloom_mut(),
            };
            self.effects.dispose_all(&mut ctx);
        }
        log::debug!("Effects disposed");

        self.gizmo.dispose(&mut self.graph);
        self.show_grid(false);
        self.camera_controller.cancel(&self.camera, &mut self.orbit);
        self.animations.clear();
        self.clicks.reset();
        self.double_clicks.reset();
        self.selection = None;

        self.pipeline.release();
        let removed = self.graph.clear();
        self.picker.forget(&removed);
        self.cache = None;
        self.disposed = true;
        log::debug!("Released {} nodes and render targets", removed.len());
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

//! Document loading
//!
//! Objects are materialized one at a time in document order. Objects that
//! need an asset park the job until the [`AsyncLoader`] hands the asset
//! back, so the frame loop keeps rendering whatever has already resolved.
//! A bad entry is logged, recorded in the [`LoadReport`] and skipped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::animation::AnimationSystem;
use super::document::{
    EffectDescriptor, ModelObject, ObjectKind, Options, ParsedDocument, SceneDocument, SceneObject,
    SkippedObject,
};
use super::node::{Geometry, Node, NodeFlags, NodeId, NodeTag};
use super::scene_graph::SceneGraph;
use super::SceneError;
use crate::assets::{
    AssetError, AssetRequest, AssetTicket, AsyncLoader, Completion, LoadedAsset, ModelAsset,
    ResourceCache,
};
use crate::config::BloomConfig;
use crate::effects::{EffectContext, EffectManager};
use crate::foundation::color::Color;
use crate::foundation::math::Transform;
use crate::render::{Camera, Material, Mesh, Texture};

/// Spacing between implicit render orders of consecutive objects
pub const RENDER_ORDER_STEP: i32 = 10;

/// Color of diary and library marker spheres
pub const MARKER_COLOR: Color = Color::new(1.0, 170.0 / 255.0, 127.0 / 255.0);

/// Templates may include templates; deeper nesting is treated as a cycle
const MAX_TEMPLATE_DEPTH: usize = 4;

/// Where a template's document lives
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateBody {
    /// Document embedded in the record
    Inline(Value),
    /// URL of a JSON document, resolved against the asset base URL
    Url(String),
}

/// A template record returned by the template collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateRecord {
    /// Record id
    pub id: i64,
    /// Document or document location
    pub body: TemplateBody,
}

/// Template-by-id lookup
pub trait TemplateSource: Send + Sync {
    /// Fetch one template record
    ///
    /// # Errors
    /// [`AssetError::NotFound`] for unknown ids, or whatever the backing
    /// store reports.
    fn fetch_template(&self, id: i64) -> Result<TemplateRecord, AssetError>;
}

impl TemplateSource for HashMap<i64, TemplateBody> {
    fn fetch_template(&self, id: i64) -> Result<TemplateRecord, AssetError> {
        self.get(&id)
            .cloned()
            .map(|body| TemplateRecord { id, body })
            .ok_or_else(|| AssetError::NotFound(format!("template {id}")))
    }
}

/// Fetch a template and decode its document on the loader thread
fn template_request(source: Arc<dyn TemplateSource>, id: i64) -> AssetRequest {
    AssetRequest::Task(Box::new(move |cache: &ResourceCache| {
        let record = source.fetch_template(id)?;
        match record.body {
            TemplateBody::Inline(value) => Ok(LoadedAsset::Document(value)),
            TemplateBody::Url(url) => {
                let bytes = cache.load_bytes(&url)?;
                serde_json::from_slice(&bytes)
                    .map(LoadedAsset::Document)
                    .map_err(|e| AssetError::InvalidData(format!("template {id}: {e}")))
            }
        }
    }))
}

/// Systems a load writes into
pub struct LoadContext<'a> {
    /// Live scene
    pub graph: &'a mut SceneGraph,
    /// Active camera, handed to effects
    pub camera: &'a Camera,
    /// Bloom parameters, handed to effects
    pub bloom: &'a mut BloomConfig,
    /// Render target height in pixels, handed to effects
    pub viewport_height: u32,
    /// Effect instances
    pub effects: &'a mut EffectManager,
    /// Property tweens
    pub animations: &'a mut AnimationSystem,
}

/// `(current, total)` progress callback
pub type ProgressFn = Box<dyn FnMut(usize, usize)>;

/// State of a [`LoadJob`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Objects remain
    Running {
        /// Objects handled so far
        loaded: usize,
        /// Objects in the document
        total: usize,
    },
    /// Every object was handled
    Finished,
    /// The owning session went away
    Cancelled,
}

impl LoadStatus {
    /// Whether the job will do no more work
    pub fn is_done(self) -> bool {
        !matches!(self, Self::Running { .. })
    }
}

/// Outcome of a load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Top-level nodes created, in document order
    pub nodes: Vec<NodeId>,
    /// Entries dropped while parsing or loading
    pub skipped: Vec<SkippedObject>,
    /// Effects attached by `effect` objects
    pub effects: usize,
    /// The detachable group of a group load
    pub group: Option<NodeId>,
}

/// Starts load jobs
#[derive(Clone, Default)]
pub struct SceneLoader {
    templates: Option<Arc<dyn TemplateSource>>,
}

impl SceneLoader {
    /// Loader without a template collaborator; `template` objects are skipped
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `template` objects through `source`
    pub fn with_templates(mut self, source: Arc<dyn TemplateSource>) -> Self {
        self.templates = Some(source);
        self
    }

    /// Begin loading `parsed`
    ///
    /// Objects attach to the content root, or with `as_group` to a fresh
    /// non-pickable group under the scene root that stays hidden until the
    /// job finishes. `progress` only fires for non-group loads.
    pub fn start(
        &self,
        parsed: ParsedDocument,
        as_group: bool,
        progress: Option<ProgressFn>,
        graph: &mut SceneGraph,
    ) -> LoadJob {
        if as_group {
            let mut group = Node::group("group").with_flags(NodeFlags::IGNORE_PICK);
            group.flags.remove(NodeFlags::VISIBLE);
            let group = graph.add(group, graph.root());
            let mut job = LoadJob::new(self.clone(), parsed, group, true, 0, None);
            job.report.group = Some(group);
            job
        } else {
            LoadJob::new(self.clone(), parsed, graph.content_root(), false, 0, progress)
        }
    }

    /// Load `parsed` to completion, blocking on the loader thread
    ///
    /// # Errors
    /// [`SceneError::Cancelled`] if the loader shuts down midway.
    pub fn load(
        &self,
        parsed: ParsedDocument,
        as_group: bool,
        progress: Option<ProgressFn>,
        loader: &mut AsyncLoader,
        ctx: &mut LoadContext<'_>,
    ) -> Result<LoadReport, SceneError> {
        let mut job = self.start(parsed, as_group, progress, ctx.graph);
        let mut completions = Vec::new();
        loop {
            if job.pump(&mut completions, loader, ctx).is_done() {
                break;
            }
            let completion = loader.wait().map_err(|_| SceneError::Cancelled)?;
            completions.push(completion);
        }
        match job.status() {
            LoadStatus::Cancelled => Err(SceneError::Cancelled),
            _ => Ok(job.into_report()),
        }
    }
}

enum Pending {
    Asset {
        ticket: AssetTicket,
        index: usize,
        object: SceneObject,
    },
    Template {
        index: usize,
        object: SceneObject,
        group: NodeId,
        job: Box<LoadJob>,
    },
}

/// A document load advanced cooperatively by the frame loop
pub struct LoadJob {
    settings: SceneLoader,
    queue: VecDeque<(usize, SceneObject)>,
    total: usize,
    loaded: usize,
    next_order: i32,
    parent: NodeId,
    as_group: bool,
    depth: usize,
    progress: Option<ProgressFn>,
    pending: Option<Pending>,
    report: LoadReport,
    status: LoadStatus,
}

impl LoadJob {
    fn new(
        settings: SceneLoader,
        parsed: ParsedDocument,
        parent: NodeId,
        as_group: bool,
        depth: usize,
        progress: Option<ProgressFn>,
    ) -> Self {
        let ParsedDocument { document, skipped } = parsed;
        // Recover source positions of the surviving objects
        let source_len = document.objects.len() + skipped.len();
        let indices = (0..source_len).filter(|i| !skipped.iter().any(|s| s.index == *i));
        let queue: VecDeque<_> = indices.zip(document.objects).collect();
        let total = queue.len();
        Self {
            settings,
            queue,
            total,
            loaded: 0,
            next_order: 0,
            parent,
            as_group,
            depth,
            progress,
            pending: None,
            report: LoadReport {
                skipped,
                ..LoadReport::default()
            },
            status: LoadStatus::Running { loaded: 0, total },
        }
    }

    /// Current state
    pub fn status(&self) -> LoadStatus {
        self.status
    }

    /// Report so far
    pub fn report(&self) -> &LoadReport {
        &self.report
    }

    /// Consume the job, keeping its report
    pub fn into_report(self) -> LoadReport {
        self.report
    }

    /// Stop the job; results that arrive later are ignored
    pub fn cancel(&mut self) {
        if !self.status.is_done() {
            log::debug!("Cancelling load with {} objects left", self.queue.len());
        }
        self.queue.clear();
        self.pending = None;
        self.status = LoadStatus::Cancelled;
    }

    /// Advance as far as possible without blocking
    ///
    /// Takes the completions addressed to this job out of `completions`.
    pub fn pump(
        &mut self,
        completions: &mut Vec<Completion>,
        loader: &mut AsyncLoader,
        ctx: &mut LoadContext<'_>,
    ) -> LoadStatus {
        loop {
            if self.status.is_done() {
                return self.status;
            }
            match self.pending.take() {
                Some(Pending::Asset { ticket, index, object }) => {
                    let Some(position) = completions.iter().position(|(t, _)| *t == ticket) else {
                        self.pending = Some(Pending::Asset { ticket, index, object });
                        return self.status;
                    };
                    let (_, result) = completions.swap_remove(position);
                    self.resolve(index, object, result, ctx);
                }
                Some(Pending::Template { index, object, group, mut job }) => {
                    if !job.pump(completions, loader, ctx).is_done() {
                        self.pending = Some(Pending::Template { index, object, group, job });
                        return self.status;
                    }
                    self.finish_template(index, &object, group, job.into_report(), ctx.graph);
                }
                None => {
                    let Some((index, object)) = self.queue.pop_front() else {
                        log::info!(
                            "Scene load finished: {} nodes, {} skipped",
                            self.report.nodes.len(),
                            self.report.skipped.len()
                        );
                        if let Some(group) = self.report.group {
                            set_visible(ctx.graph, group, true);
                        }
                        self.status = LoadStatus::Finished;
                        return self.status;
                    };
                    self.begin(index, object, loader, ctx);
                }
            }
        }
    }

    fn begin(
        &mut self,
        index: usize,
        object: SceneObject,
        loader: &mut AsyncLoader,
        ctx: &mut LoadContext<'_>,
    ) {
        let request = match &object.kind {
            ObjectKind::Model(model) => AssetRequest::Model(model.url.clone()),
            ObjectKind::Image { url, .. } => AssetRequest::Texture(url.clone()),
            ObjectKind::Text3D { url, .. } => AssetRequest::Bytes(url.clone()),
            ObjectKind::Template { template_id } => {
                if self.depth >= MAX_TEMPLATE_DEPTH {
                    self.skip(index, &object, "templates nested too deeply");
                    return;
                }
                let Some(source) = self.settings.templates.clone() else {
                    self.skip(index, &object, "no template source configured");
                    return;
                };
                template_request(source, *template_id)
            }
            _ => {
                self.build(index, object, None, ctx);
                return;
            }
        };
        match loader.request(request) {
            Ok(ticket) => self.pending = Some(Pending::Asset { ticket, index, object }),
            Err(e) => self.skip(index, &object, e.to_string()),
        }
    }

    fn resolve(
        &mut self,
        index: usize,
        object: SceneObject,
        result: Result<LoadedAsset, AssetError>,
        ctx: &mut LoadContext<'_>,
    ) {
        match (result, &object.kind) {
            (Err(e), _) => self.skip(index, &object, e.to_string()),
            (Ok(LoadedAsset::Document(value)), ObjectKind::Template { template_id }) => {
                let parsed = match SceneDocument::from_value(value) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        self.skip(index, &object, format!("template {template_id}: {e}"));
                        return;
                    }
                };
                let mut group = Node::group(format!("template-{template_id}"))
                    .with_flags(NodeFlags::IGNORE_PICK)
                    .with_transform(object_transform(&object))
                    .with_tag(NodeTag::Template {
                        template_id: *template_id,
                    });
                group.flags.remove(NodeFlags::VISIBLE);
                let group = ctx.graph.add(group, self.parent);
                let job = Self::new(self.settings.clone(), parsed, group, true, self.depth + 1, None);
                self.pending = Some(Pending::Template {
                    index,
                    object,
                    group,
                    job: Box::new(job),
                });
            }
            (Ok(asset), _) => self.build(index, object, Some(asset), ctx),
        }
    }

    fn finish_template(
        &mut self,
        index: usize,
        object: &SceneObject,
        group: NodeId,
        nested: LoadReport,
        graph: &mut SceneGraph,
    ) {
        if !graph.contains(group) {
            self.skip(index, object, "template group removed while loading");
            return;
        }
        for skipped in &nested.skipped {
            log::debug!("Template entry #{} skipped: {}", skipped.index, skipped.reason);
        }
        set_visible(graph, group, true);
        self.place(group, object, graph);
        self.advance();
    }

    fn build(
        &mut self,
        index: usize,
        object: SceneObject,
        asset: Option<LoadedAsset>,
        ctx: &mut LoadContext<'_>,
    ) {
        match self.build_node(&object, asset, ctx) {
            Ok(Some(id)) => {
                self.place(id, &object, ctx.graph);
                self.advance();
            }
            Ok(None) => {
                self.report.effects += 1;
                self.advance();
            }
            Err(e) => self.skip(index, &object, e.to_string()),
        }
    }

    /// Create the node for one object; `effect` objects create none
    fn build_node(
        &mut self,
        object: &SceneObject,
        asset: Option<LoadedAsset>,
        ctx: &mut LoadContext<'_>,
    ) -> Result<Option<NodeId>, SceneError> {
        let transform = object_transform(object);
        let node = match (&object.kind, asset) {
            (ObjectKind::Box { size, color }, _) => {
                Node::mesh("box", Geometry::cuboid(*size), Material::lit(*color))
            }
            (ObjectKind::Sphere { radius, color }, _) => {
                Node::mesh("sphere", Geometry::sphere(*radius), Material::lit(*color))
            }
            (ObjectKind::Diary { title, content }, _) => marker_node("diary").with_tag(NodeTag::Diary {
                title: title.clone(),
                content: content.clone(),
            }),
            (ObjectKind::Library { title, cover, library_id }, _) => {
                marker_node("library").with_tag(NodeTag::Library {
                    title: title.clone(),
                    cover: cover.clone(),
                    library_id: *library_id,
                })
            }
            (ObjectKind::Image { url, base_width }, Some(LoadedAsset::Texture(texture))) => {
                image_node(url, *base_width, texture)
            }
            (ObjectKind::Text3D { url, title, options }, Some(LoadedAsset::Bytes(font))) => {
                text_node(url, title, options, &font)?
            }
            (ObjectKind::Model(model), Some(LoadedAsset::Model(asset))) => {
                let id = self.build_model(model, asset, transform, ctx);
                return Ok(Some(id));
            }
            (ObjectKind::Effect { effect_name, options }, _) => {
                let mut effect_ctx = EffectContext {
                    graph: &mut *ctx.graph,
                    camera: ctx.camera,
                    bloom: &mut *ctx.bloom,
                    viewport_height: ctx.viewport_height,
                };
                ctx.effects
                    .add_effect_by_name(effect_name, self.parent, options.clone(), &mut effect_ctx)?;
                return Ok(None);
            }
            (kind, _) => {
                return Err(SceneError::Asset(AssetError::InvalidData(format!(
                    "unexpected asset for {}",
                    kind.type_name()
                ))));
            }
        };
        Ok(Some(ctx.graph.add(node.with_transform(transform), self.parent)))
    }

    fn build_model(
        &mut self,
        model: &ModelObject,
        asset: ModelAsset,
        transform: Transform,
        ctx: &mut LoadContext<'_>,
    ) -> NodeId {
        let tint = model.options.get("color").and_then(color_value);
        let root = ctx.graph.add(
            Node::group("model")
                .with_transform(transform)
                .with_tag(NodeTag::Model {
                    url: model.url.clone(),
                    options: model.options.clone(),
                    effects: model.effects.clone(),
                    material: model.material.clone(),
                    use_draco_loader: model.use_draco_loader,
                    play_animations: model.play_animations.clone(),
                    loop_once: model.loop_once,
                }),
            self.parent,
        );
        for part in asset.parts {
            let mut material = part.material;
            if let Some(color) = tint {
                material.color = color;
            }
            let overrides = model
                .material
                .get(&part.name)
                .or_else(|| model.material.get(&material.name));
            if let Some(overrides) = overrides {
                apply_material_override(&mut material, overrides);
            }
            ctx.graph
                .add(Node::mesh(part.name, Geometry::custom(part.mesh), material), root);
        }

        for descriptor in &model.effects {
            attach_descriptor_effects(root, descriptor, ctx);
            ctx.animations.add(root, descriptor);
        }
        root
    }

    /// Assign render order and group flags, then record the node
    ///
    /// A template group only takes the order itself; its contents keep the
    /// orders their own document gave them.
    fn place(&mut self, id: NodeId, object: &SceneObject, graph: &mut SceneGraph) {
        let order = object.render_order.unwrap_or(self.next_order);
        self.next_order += RENDER_ORDER_STEP;
        let template = matches!(object.kind, ObjectKind::Template { .. });
        for node_id in graph.descendants(id) {
            if let Some(node) = graph.get_mut(node_id) {
                if node.flags.contains(NodeFlags::EFFECT_OWNED) {
                    continue;
                }
                if !template || node_id == id {
                    node.render_order = order;
                }
                if self.as_group {
                    node.flags.insert(NodeFlags::IGNORE_PICK);
                }
            }
        }
        self.report.nodes.push(id);
    }

    fn skip(&mut self, index: usize, object: &SceneObject, reason: impl Into<String>) {
        let reason = reason.into();
        let kind = object.kind.type_name();
        log::warn!("Skipping scene object #{} ({}): {}", index, kind, reason);
        self.report.skipped.push(SkippedObject {
            index,
            kind: Some(kind.to_string()),
            reason,
        });
        self.advance();
    }

    fn advance(&mut self) {
        self.loaded += 1;
        self.status = LoadStatus::Running {
            loaded: self.loaded,
            total: self.total,
        };
        if let Some(progress) = self.progress.as_mut() {
            progress(self.loaded, self.total);
        }
    }
}

/// Attach every `effect` descriptor in the tree to `node`
fn attach_descriptor_effects(
    node: NodeId,
    descriptor: &EffectDescriptor,
    ctx: &mut LoadContext<'_>,
) {
    match descriptor {
        EffectDescriptor::Effect { effect_name, options } => {
            let mut effect_ctx = EffectContext {
                graph: &mut *ctx.graph,
                camera: ctx.camera,
                bloom: &mut *ctx.bloom,
                viewport_height: ctx.viewport_height,
            };
            if let Err(e) =
                ctx.effects
                    .add_effect_by_name(effect_name, node, options.clone(), &mut effect_ctx)
            {
                log::warn!("Model effect {} not attached: {}", effect_name, e);
            }
        }
        EffectDescriptor::Timeline { children, .. } => {
            for child in children {
                attach_descriptor_effects(node, child, ctx);
            }
        }
        EffectDescriptor::Animation(_) => {}
    }
}

fn object_transform(object: &SceneObject) -> Transform {
    Transform::from_arrays(object.position, object.rotation, object.scale)
}

fn set_visible(graph: &mut SceneGraph, id: NodeId, visible: bool) {
    if let Some(node) = graph.get_mut(id) {
        node.flags.set(NodeFlags::VISIBLE, visible);
    }
}

fn marker_node(name: &str) -> Node {
    Node::mesh(name, Geometry::sphere(1.0), Material::lit(MARKER_COLOR)).with_flags(NodeFlags::MARKER)
}

fn image_node(url: &str, base_width: f32, texture: Arc<Texture>) -> Node {
    let height = base_width * texture.aspect();
    Node::mesh(
        "image",
        Geometry::plane(base_width, height),
        Material::unlit(Color::WHITE).with_texture(texture),
    )
    .with_tag(NodeTag::Image {
        url: url.to_string(),
        base_width,
    })
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TextOptions {
    size: f32,
    depth: f32,
    color: Option<Value>,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            size: 1.0,
            depth: 0.3,
            color: None,
        }
    }
}

/// Average glyph advance relative to the font size
const GLYPH_ADVANCE: f32 = 0.6;

/// A centred slab sized to the text run
fn text_node(url: &str, title: &str, options: &Options, font: &[u8]) -> Result<Node, SceneError> {
    if font.is_empty() {
        return Err(SceneError::Asset(AssetError::InvalidData(format!("empty font {url}"))));
    }
    let params: TextOptions =
        serde_json::from_value(Value::Object(options.clone())).unwrap_or_else(|e| {
            log::warn!("Ignoring invalid text options: {}", e);
            TextOptions::default()
        });
    let glyphs = title.chars().filter(|c| !c.is_whitespace()).count().max(1);
    let width = glyphs as f32 * params.size * GLYPH_ADVANCE;
    let color = params.color.as_ref().and_then(color_value).unwrap_or(Color::WHITE);
    Ok(Node::mesh(
        "3Dtext",
        Geometry::custom(Mesh::cuboid(width, params.size, params.depth.max(0.01))),
        Material::lit(color),
    )
    .with_tag(NodeTag::Text3D {
        url: url.to_string(),
        title: title.to_string(),
        options: options.clone(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MaterialOverride {
    color: Option<Value>,
    emissive: Option<Value>,
    opacity: Option<f32>,
    metalness: Option<f32>,
    roughness: Option<f32>,
}

fn apply_material_override(material: &mut Material, overrides: &Value) {
    let overrides: MaterialOverride = match serde_json::from_value(overrides.clone()) {
        Ok(o) => o,
        Err(e) => {
            log::warn!("Ignoring material override for {}: {}", material.name, e);
            return;
        }
    };
    if let Some(color) = overrides.color.as_ref().and_then(color_value) {
        material.color = color;
    }
    if let Some(emissive) = overrides.emissive.as_ref().and_then(color_value) {
        material.emissive = emissive;
    }
    if let Some(opacity) = overrides.opacity {
        material.opacity = opacity.clamp(0.0, 1.0);
    }
    if let Some(metalness) = overrides.metalness {
        material.metalness = metalness;
    }
    if let Some(roughness) = overrides.roughness {
        material.roughness = roughness;
    }
}

/// `"#rrggbb"` strings or `0xrrggbb` numbers
pub(crate) fn color_value(value: &Value) -> Option<Color> {
    match value {
        Value::String(text) => Color::from_hex(text),
        Value::Number(number) => number
            .as_u64()
            .map(|rgb| Color::from_rgb8((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)),
        _ => None,
    }
}

//! Writing the live scene back to a document
//!
//! Object kinds come from node tags first and generated shapes second.
//! Helpers and effect-owned nodes are never written; effects bound to the
//! content root are appended as `effect` objects after every node.

use super::document::{
    CameraState, ControlsLimits, ModelObject, ObjectKind, SceneDocument, SceneObject,
};
use super::loader::RENDER_ORDER_STEP;
use super::node::{Node, NodeFlags, NodeId, NodeTag, Shape};
use super::scene_graph::SceneGraph;
use crate::effects::EffectManager;

/// Top-level document fields that do not live in the graph
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentMeta<'a> {
    /// Recorded viewpoints
    pub camera_list: &'a [CameraState],
    /// Background color or environment URL
    pub background: Option<&'a str>,
    /// Orbit limits
    pub controls: Option<ControlsLimits>,
}

/// Build a document from the nodes under the content root
pub fn save_document(graph: &SceneGraph, effects: &EffectManager, meta: DocumentMeta<'_>) -> SceneDocument {
    let container = graph.content_root();
    let mut objects = Vec::new();
    let mut implicit_order = 0;

    for &id in graph.children(container) {
        let Some(node) = graph.get(id) else {
            continue;
        };
        if node.flags.intersects(NodeFlags::HELPER | NodeFlags::EFFECT_OWNED) {
            continue;
        }
        let Some(kind) = infer_kind(node) else {
            log::debug!("Not saving node '{}': no document kind", node.name);
            continue;
        };
        let transform = &node.transform;
        let rotation = transform.euler_xyz();
        let render_order = (node.render_order != implicit_order).then_some(node.render_order);
        implicit_order += RENDER_ORDER_STEP;
        objects.push(SceneObject {
            kind,
            position: transform.position.into(),
            rotation: rotation.into(),
            scale: transform.scale.into(),
            render_order,
        });
    }

    let roots: [NodeId; 2] = [container, graph.root()];
    for (_, effect) in effects.iter() {
        if !roots.contains(&effect.target()) || effect.is_disposed() {
            continue;
        }
        objects.push(SceneObject::new(ObjectKind::Effect {
            effect_name: effect.kind().name().to_string(),
            options: effect.options().clone(),
        }));
    }

    log::debug!("Saved {} objects", objects.len());
    SceneDocument {
        objects,
        camera_list: meta.camera_list.to_vec(),
        background: meta.background.map(str::to_string),
        controls: meta.controls,
    }
}

fn infer_kind(node: &Node) -> Option<ObjectKind> {
    let kind = match &node.tag {
        NodeTag::Model {
            url,
            options,
            effects,
            material,
            use_draco_loader,
            play_animations,
            loop_once,
        } => ObjectKind::Model(ModelObject {
            url: url.clone(),
            options: options.clone(),
            effects: effects.clone(),
            material: material.clone(),
            use_draco_loader: *use_draco_loader,
            play_animations: play_animations.clone(),
            loop_once: *loop_once,
        }),
        NodeTag::Image { url, base_width } => ObjectKind::Image {
            url: url.clone(),
            base_width: *base_width,
        },
        NodeTag::Diary { title, content } => ObjectKind::Diary {
            title: title.clone(),
            content: content.clone(),
        },
        NodeTag::Library {
            title,
            cover,
            library_id,
        } => ObjectKind::Library {
            title: title.clone(),
            cover: cover.clone(),
            library_id: *library_id,
        },
        NodeTag::Text3D { url, title, options } => ObjectKind::Text3D {
            url: url.clone(),
            title: title.clone(),
            options: options.clone(),
        },
        NodeTag::Template { template_id } => ObjectKind::Template {
            template_id: *template_id,
        },
        NodeTag::Untagged => {
            let color = node.color().unwrap_or_default();
            match node.geometry.as_ref().and_then(|g| g.shape())? {
                Shape::Box { size } => ObjectKind::Box { size, color },
                Shape::Sphere { radius } => ObjectKind::Sphere { radius, color },
                Shape::Plane { .. } | Shape::Custom => return None,
            }
        }
    };
    Some(kind)
}

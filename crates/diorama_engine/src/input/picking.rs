//! Id-buffer picking
//!
//! Every pickable node gets a stable non-zero id. A pick renders those ids
//! into a one-pixel scissor of the id target and maps the id under the
//! pointer back to the node, then up to its top-level object so a
//! multi-part model picks as one unit.

use std::collections::HashMap;

use crate::render::{RenderError, RenderPipeline, Camera};
use crate::scene::{Node, NodeFlags, NodeId, SceneGraph};

/// A resolved pick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickHit {
    /// Top-level object below the content root
    pub node: NodeId,
    /// The part whose pixel was hit
    pub part: NodeId,
    /// Id-buffer value of the part
    pub id: u32,
}

/// Assigns pick ids and resolves pointer positions to nodes
#[derive(Debug, Default)]
pub struct Picker {
    ids: HashMap<NodeId, u32>,
    nodes: HashMap<u32, NodeId>,
    next_id: u32,
    include_markers: bool,
}

impl Picker {
    /// Picker with no ids assigned
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Whether diary and library markers take part (edit mode)
    pub fn set_include_markers(&mut self, include: bool) {
        self.include_markers = include;
    }

    /// Whether a node would be drawn into the id buffer
    ///
    /// Hidden nodes, nodes without geometry and anything under an
    /// ignore-pick or helper node are excluded.
    pub fn is_pickable(&self, graph: &SceneGraph, id: NodeId) -> bool {
        let Some(node) = graph.get(id) else {
            return false;
        };
        if node.geometry.is_none() || !graph.is_effectively_visible(id) {
            return false;
        }
        if node.flags.contains(NodeFlags::MARKER) && !self.include_markers {
            return false;
        }
        !graph.has_flag_inherited(id, NodeFlags::IGNORE_PICK)
            && !graph.has_flag_inherited(id, NodeFlags::HELPER)
    }

    /// Give every pickable node an id and drop ids of removed nodes
    pub fn sync(&mut self, graph: &SceneGraph) {
        self.ids.retain(|node, _| graph.contains(*node));
        let ids = &self.ids;
        self.nodes.retain(|_, node| ids.contains_key(node));
        if self.next_id == 0 {
            self.next_id = 1;
        }
        for (id, _) in graph.iter() {
            if self.ids.contains_key(&id) || !self.is_pickable(graph, id) {
                continue;
            }
            let pick_id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1).max(1);
            self.ids.insert(id, pick_id);
            self.nodes.insert(pick_id, id);
        }
    }

    /// Pick id of a node, if assigned
    pub fn id_of(&self, node: NodeId) -> Option<u32> {
        self.ids.get(&node).copied()
    }

    /// Node behind a pick id
    pub fn node_of(&self, id: u32) -> Option<NodeId> {
        self.nodes.get(&id).copied()
    }

    /// Drop ids of removed nodes
    pub fn forget(&mut self, removed: &[NodeId]) {
        for node in removed {
            if let Some(id) = self.ids.remove(node) {
                self.nodes.remove(&id);
            }
        }
    }

    /// Resolve the node under pixel `(x, y)`
    ///
    /// # Errors
    /// [`RenderError::TargetBusy`] when called mid-frame.
    pub fn pick(
        &mut self,
        pipeline: &mut RenderPipeline,
        graph: &SceneGraph,
        camera: &Camera,
        x: u32,
        y: u32,
    ) -> Result<Option<PickHit>, RenderError> {
        self.sync(graph);
        let id_for = |id: NodeId, _: &Node| -> Option<u32> {
            if self.is_pickable(graph, id) {
                self.id_of(id)
            } else {
                None
            }
        };
        let id = pipeline.render_id_pixel(graph, camera, x, y, &id_for)?;
        if id == 0 {
            return Ok(None);
        }
        let Some(part) = self.node_of(id) else {
            log::debug!("Pick id {} has no node", id);
            return Ok(None);
        };
        let node = graph
            .top_level_ancestor(part, graph.content_root())
            .or_else(|| graph.top_level_ancestor(part, graph.root()))
            .unwrap_or(part);
        log::trace!("Picked {:?} (part {:?}) at ({}, {})", node, part, x, y);
        Ok(Some(PickHit { node, part, id }))
    }
}

//! Scene graph arena
//!
//! Nodes live in a slot map and link to each other by [`NodeId`]. Handles of
//! removed nodes simply stop resolving, so systems holding them (effects,
//! picking, the gizmo) observe removal instead of dangling.

use slotmap::SlotMap;

use super::node::{Node, NodeFlags, NodeId};
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::spatial::AABB;

/// A node handle paired with its world matrix
#[derive(Debug, Clone, Copy)]
pub struct WorldNode {
    /// Node handle
    pub id: NodeId,
    /// Accumulated world transform
    pub world: Mat4,
}

/// Hierarchical node storage with a fixed scene root
///
/// The content root is where document objects attach: the scene root
/// normally, the AR content group while an AR session is placing content.
pub struct SceneGraph {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
    content_root: NodeId,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// Create a graph holding only the scene root
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::group("scene"));
        Self {
            nodes,
            root,
            content_root: root,
        }
    }

    /// The scene root
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Where document objects attach
    pub fn content_root(&self) -> NodeId {
        self.content_root
    }

    /// Redirect document objects to another node (falls back to the root if
    /// the node does not exist)
    pub fn set_content_root(&mut self, id: NodeId) {
        self.content_root = if self.nodes.contains_key(id) { id } else { self.root };
    }

    /// Number of live nodes, the root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether only the root remains
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Whether the handle resolves
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Shared access to a node
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mutable access to a node
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Insert a node under `parent` (the root if `parent` is stale)
    pub fn add(&mut self, mut node: Node, parent: NodeId) -> NodeId {
        let parent = if self.nodes.contains_key(parent) { parent } else { self.root };
        node.parent = Some(parent);
        node.children.clear();
        let id = self.nodes.insert(node);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(id);
        }
        id
    }

    /// Insert a node under the content root
    pub fn add_to_content(&mut self, node: Node) -> NodeId {
        let parent = self.content_root;
        self.add(node, parent)
    }

    /// Move a node under a new parent, keeping its local transform
    ///
    /// Returns `false` if either handle is stale, the node is the root, or
    /// the move would create a cycle.
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> bool {
        if id == self.root || !self.contains(id) || !self.contains(new_parent) {
            return false;
        }
        if self.ancestors(new_parent).contains(&id) || new_parent == id {
            return false;
        }
        if let Some(old_parent) = self.nodes.get(id).and_then(|n| n.parent) {
            if let Some(old) = self.nodes.get_mut(old_parent) {
                old.children.retain(|c| *c != id);
            }
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = Some(new_parent);
        }
        if let Some(parent) = self.nodes.get_mut(new_parent) {
            parent.children.push(id);
        }
        true
    }

    /// Remove a node and its subtree, returning every removed handle
    /// (pre-order). The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> Vec<NodeId> {
        if id == self.root || !self.contains(id) {
            return Vec::new();
        }
        let removed = self.descendants(id);
        if let Some(parent) = self.nodes.get(id).and_then(|n| n.parent) {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.retain(|c| *c != id);
            }
        }
        for node in &removed {
            self.nodes.remove(*node);
        }
        if !self.nodes.contains_key(self.content_root) {
            self.content_root = self.root;
        }
        removed
    }

    /// Remove every node except the root
    pub fn clear(&mut self) -> Vec<NodeId> {
        let children = self.children(self.root).to_vec();
        children.into_iter().flat_map(|c| self.remove(c)).collect()
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Children of a node (empty for stale handles)
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map_or(&[], |n| n.children.as_slice())
    }

    /// The node and all its descendants in pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Parent chain from the immediate parent up to the root
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            out.push(node);
            current = self.parent(node);
        }
        out
    }

    /// Whether the node or any ancestor carries `flag`
    pub fn has_flag_inherited(&self, id: NodeId, flag: NodeFlags) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let Some(node) = self.nodes.get(node_id) else {
                return false;
            };
            if node.flags.contains(flag) {
                return true;
            }
            current = node.parent;
        }
        false
    }

    /// Whether the node and all its ancestors are visible
    pub fn is_effectively_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            match self.nodes.get(node_id) {
                Some(node) if node.is_visible() => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// The ancestor-or-self whose parent is `container`
    ///
    /// Returns `None` when `id` is not inside `container`.
    pub fn top_level_ancestor(&self, id: NodeId, container: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            let parent = self.parent(current)?;
            if parent == container {
                return Some(current);
            }
            current = parent;
        }
    }

    /// Local matrix of a node
    pub fn local_matrix(&self, id: NodeId) -> Option<Mat4> {
        self.nodes.get(id).map(|n| n.transform.to_matrix())
    }

    /// World matrix of a node
    pub fn world_matrix(&self, id: NodeId) -> Option<Mat4> {
        let mut matrix = self.local_matrix(id)?;
        for ancestor in self.ancestors(id) {
            matrix = self.local_matrix(ancestor)? * matrix;
        }
        Some(matrix)
    }

    /// World-space origin of a node
    pub fn world_position(&self, id: NodeId) -> Option<Vec3> {
        self.world_matrix(id)
            .map(|m| m.transform_point(&Point3::origin()).coords)
    }

    /// World-space bounds of the geometry in a subtree
    pub fn world_bounds(&self, id: NodeId) -> AABB {
        let mut bounds = AABB::empty();
        let Some(base) = self.world_matrix(id) else {
            return bounds;
        };
        self.visit_from(id, base, false, &mut |node_id, world| {
            if let Some(geometry) = self.nodes.get(node_id).and_then(|n| n.geometry.as_ref()) {
                bounds.union(&geometry.bounds().transformed(&world));
            }
        });
        bounds
    }

    /// Pre-order traversal of visible nodes from the root with world matrices
    pub fn visible_nodes(&self) -> Vec<WorldNode> {
        let mut out = Vec::new();
        self.visit_from(self.root, self.root_matrix(), true, &mut |id, world| {
            out.push(WorldNode { id, world });
        });
        out
    }

    fn root_matrix(&self) -> Mat4 {
        self.local_matrix(self.root).unwrap_or_else(Mat4::identity)
    }

    fn visit_from(
        &self,
        id: NodeId,
        world: Mat4,
        visible_only: bool,
        visitor: &mut dyn FnMut(NodeId, Mat4),
    ) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if visible_only && !node.is_visible() {
            return;
        }
        visitor(id, world);
        for child in &node.children {
            if let Some(child_node) = self.nodes.get(*child) {
                let child_world = world * child_node.transform.to_matrix();
                self.visit_from(*child, child_world, visible_only, visitor);
            }
        }
    }

    /// Iterate every live node
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Transform;
    use crate::foundation::color::Color;
    use crate::render::Material;
    use crate::scene::node::Geometry;
    use approx::assert_relative_eq;

    fn cube(name: &str, position: Vec3) -> Node {
        Node::mesh(name, Geometry::cuboid([1.0; 3]), Material::lit(Color::WHITE))
            .with_transform(Transform::from_position(position))
    }

    #[test]
    fn test_add_and_world_matrix() {
        let mut graph = SceneGraph::new();
        let group = graph.add_to_content(Node::group("g").with_transform(Transform::from_position(Vec3::new(1.0, 0.0, 0.0))));
        let child = graph.add(cube("c", Vec3::new(0.0, 2.0, 0.0)), group);
        assert_relative_eq!(graph.world_position(child).unwrap(), Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(graph.top_level_ancestor(child, graph.root()), Some(group));
        assert_eq!(graph.top_level_ancestor(group, graph.root()), Some(group));
        assert_eq!(graph.top_level_ancestor(graph.root(), graph.root()), None);
    }

    #[test]
    fn test_remove_subtree_reports_handles() {
        let mut graph = SceneGraph::new();
        let group = graph.add_to_content(Node::group("g"));
        let a = graph.add(cube("a", Vec3::zeros()), group);
        let b = graph.add(cube("b", Vec3::zeros()), a);
        let removed = graph.remove(group);
        assert_eq!(removed, vec![group, a, b]);
        assert!(!graph.contains(b));
        assert!(graph.children(graph.root()).is_empty());
        assert!(graph.remove(graph.root()).is_empty());
    }

    #[test]
    fn test_inherited_flags_and_visibility() {
        let mut graph = SceneGraph::new();
        let group = graph.add_to_content(Node::group("g").with_flags(NodeFlags::IGNORE_PICK));
        let child = graph.add(cube("c", Vec3::zeros()), group);
        assert!(graph.has_flag_inherited(child, NodeFlags::IGNORE_PICK));
        graph.get_mut(group).unwrap().flags.remove(NodeFlags::VISIBLE);
        assert!(!graph.is_effectively_visible(child));
        assert!(graph.visible_nodes().iter().all(|n| n.id != child));
    }

    #[test]
    fn test_reparent_rejects_cycles() {
        let mut graph = SceneGraph::new();
        let a = graph.add_to_content(Node::group("a"));
        let b = graph.add(Node::group("b"), a);
        assert!(!graph.reparent(a, b));
        let c = graph.add_to_content(Node::group("c"));
        assert!(graph.reparent(b, c));
        assert_eq!(graph.parent(b), Some(c));
        assert!(graph.children(a).is_empty());
    }

    #[test]
    fn test_world_bounds_covers_children() {
        let mut graph = SceneGraph::new();
        let group = graph.add_to_content(Node::group("g"));
        graph.add(cube("a", Vec3::new(-2.0, 0.0, 0.0)), group);
        graph.add(cube("b", Vec3::new(2.0, 0.0, 0.0)), group);
        let bounds = graph.world_bounds(group);
        assert_relative_eq!(bounds.min.x, -2.5);
        assert_relative_eq!(bounds.max.x, 2.5);
    }

    #[test]
    fn test_content_root_falls_back_after_removal() {
        let mut graph = SceneGraph::new();
        let content = graph.add(Node::group("ar"), graph.root());
        graph.set_content_root(content);
        assert_eq!(graph.content_root(), content);
        graph.remove(content);
        assert_eq!(graph.content_root(), graph.root());
    }
}

//! Ground grid shown while editing

use crate::foundation::color::Color;
use crate::render::{Material, Mesh, Vertex};
use crate::scene::{Geometry, Node, NodeFlags, NodeId, SceneGraph};

/// Grid layout and colors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridOptions {
    /// Spacing of minor lines in world units
    pub cell_size: f32,
    /// A major line every this many cells
    pub major_every: u32,
    /// Cells from the center to each edge
    pub half_cells: u32,
    /// Minor line color
    pub minor_color: Color,
    /// Major line color
    pub major_color: Color,
    /// Color of the two lines through the origin
    pub axis_color: Color,
    /// Minor line width in world units
    pub line_width: f32,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            major_every: 5,
            half_cells: 20,
            minor_color: Color::from_rgb8(0xcf, 0xd3, 0xdc),
            major_color: Color::from_rgb8(0xaa, 0xb0, 0xbd),
            axis_color: Color::from_rgb8(0x4c, 0x84, 0xff),
            line_width: 0.02,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Minor,
    Major,
    Axis,
}

/// Add a grid on the XZ plane under `parent`; returns the grid group
///
/// The grid is an ignore-pick helper, so it is never picked or saved.
pub fn spawn_grid(graph: &mut SceneGraph, parent: NodeId, options: &GridOptions) -> NodeId {
    let group = graph.add(
        Node::group("grid").with_flags(NodeFlags::HELPER | NodeFlags::IGNORE_PICK),
        parent,
    );
    let layers = [
        (LineKind::Minor, options.minor_color, 1.0),
        (LineKind::Major, options.major_color, 1.8),
        (LineKind::Axis, options.axis_color, 2.2),
    ];
    for (kind, color, width) in layers {
        let mesh = line_mesh(options, kind, options.line_width * width);
        if mesh.indices.is_empty() {
            continue;
        }
        let node = Node::mesh("grid_lines", Geometry::custom(mesh), Material::unlit(color));
        graph.add(node, group);
    }
    log::debug!("Grid helper added: {} cells each way", options.half_cells);
    group
}

fn classify(index: i64, major_every: u32) -> LineKind {
    if index == 0 {
        LineKind::Axis
    } else if major_every > 0 && index % i64::from(major_every) == 0 {
        LineKind::Major
    } else {
        LineKind::Minor
    }
}

fn line_mesh(options: &GridOptions, kind: LineKind, width: f32) -> Mesh {
    let half = i64::from(options.half_cells);
    let extent = half as f32 * options.cell_size;
    let w = width * 0.5;
    let mut mesh = Mesh::default();
    for index in -half..=half {
        if classify(index, options.major_every) != kind {
            continue;
        }
        let offset = index as f32 * options.cell_size;
        // along X at z = offset, then along Z at x = offset
        push_quad(&mut mesh, [-extent, offset - w], [extent, offset + w]);
        push_quad(&mut mesh, [offset - w, -extent], [offset + w, extent]);
    }
    mesh
}

fn push_quad(mesh: &mut Mesh, min: [f32; 2], max: [f32; 2]) {
    let base = mesh.vertices.len() as u32;
    let up = [0.0, 1.0, 0.0];
    for (x, z, uv) in [
        (min[0], min[1], [0.0, 0.0]),
        (max[0], min[1], [1.0, 0.0]),
        (max[0], max[1], [1.0, 1.0]),
        (min[0], max[1], [0.0, 1.0]),
    ] {
        mesh.vertices.push(Vertex::new([x, 0.0, z], up, uv));
    }
    mesh.indices.extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Picker;

    #[test]
    fn test_grid_layers_and_flags() {
        let mut graph = SceneGraph::new();
        let content = graph.content_root();
        let grid = spawn_grid(&mut graph, content, &GridOptions::default());
        let layers = graph.children(grid).to_vec();
        assert_eq!(layers.len(), 3);

        // 41 lines each way: 1 axis, 8 major, 32 minor
        let quads: Vec<usize> = layers
            .iter()
            .map(|id| match &graph.get(*id).unwrap().geometry {
                Some(Geometry::Triangles { mesh, .. }) => mesh.triangle_count() / 2,
                _ => 0,
            })
            .collect();
        assert_eq!(quads, vec![64, 16, 2]);

        let mut picker = Picker::new();
        picker.sync(&graph);
        assert!(layers.iter().all(|id| picker.id_of(*id).is_none()));
    }

    #[test]
    fn test_grid_bounds_follow_options() {
        let mut graph = SceneGraph::new();
        let options = GridOptions {
            cell_size: 0.5,
            half_cells: 4,
            ..GridOptions::default()
        };
        let root = graph.root();
        let grid = spawn_grid(&mut graph, root, &options);
        let bounds = graph.world_bounds(grid);
        assert!((bounds.max.x - 2.0).abs() < 0.1);
        assert!((bounds.min.z + 2.0).abs() < 0.1);
        assert!(bounds.max.y.abs() < 1e-6);
    }
}

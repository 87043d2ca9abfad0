//! OBJ loader for model assets
//!
//! Objects and groups (`o` / `g`) become separate named parts so documents
//! can override materials per part.

use std::io::{BufRead, BufReader, Read};

use thiserror::Error;

use crate::foundation::math::Vec3;
use crate::render::{Material, Mesh, Vertex};

/// Wavefront OBJ decode errors
#[derive(Error, Debug)]
pub enum ObjError {
    /// Source could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed statement
    #[error("Parse error on line {line}: {message}")]
    ParseError {
        /// 1-based line number
        line: usize,
        /// What was wrong
        message: String,
    },
    /// Structurally invalid file
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// One named mesh inside a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPart {
    /// `o`/`g` name, or `default`
    pub name: String,
    /// Triangle data
    pub mesh: Mesh,
    /// Material the part was authored with
    pub material: Material,
}

/// Decoded model, a list of parts in file order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelAsset {
    /// Parts in file order
    pub parts: Vec<ModelPart>,
}

impl ModelAsset {
    /// Total triangles across all parts
    pub fn triangle_count(&self) -> usize {
        self.parts.iter().map(|p| p.mesh.triangle_count()).sum()
    }

    /// Part by name
    pub fn part(&self, name: &str) -> Option<&ModelPart> {
        self.parts.iter().find(|p| p.name == name)
    }
}

#[derive(Default)]
struct PartBuilder {
    name: String,
    material_name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl PartBuilder {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn finish(self) -> Option<ModelPart> {
        if self.indices.is_empty() {
            return None;
        }
        let material = Material::default().with_name(if self.material_name.is_empty() {
            self.name.clone()
        } else {
            self.material_name
        });
        Some(ModelPart {
            name: self.name,
            mesh: Mesh::new(self.vertices, self.indices),
            material,
        })
    }
}

/// Wavefront OBJ decoder
pub struct ObjLoader;

impl ObjLoader {
    /// Parse OBJ text held in memory
    pub fn parse(bytes: &[u8]) -> Result<ModelAsset, ObjError> {
        Self::from_reader(bytes)
    }

    /// Parse OBJ text from any reader
    pub fn from_reader<R: Read>(source: R) -> Result<ModelAsset, ObjError> {
        let reader = BufReader::new(source);

        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut normals: Vec<[f32; 3]> = Vec::new();
        let mut tex_coords: Vec<[f32; 2]> = Vec::new();
        let mut parts = Vec::new();
        let mut current = PartBuilder::named("default");

        for (line_index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            let line_no = line_index + 1;

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields[0] {
                "v" => positions.push(parse_floats::<3>(&fields, line_no, "vertex")?),
                "vn" => normals.push(parse_floats::<3>(&fields, line_no, "normal")?),
                "vt" => tex_coords.push(parse_floats::<2>(&fields, line_no, "tex coord")?),
                "o" | "g" => {
                    let name = fields.get(1..).map(|rest| rest.join(" ")).unwrap_or_default();
                    let previous = std::mem::replace(&mut current, PartBuilder::named(&name));
                    parts.extend(previous.finish());
                }
                "usemtl" => {
                    current.material_name = fields.get(1).copied().unwrap_or_default().to_string();
                }
                "f" => {
                    if fields.len() < 4 {
                        return Err(ObjError::ParseError {
                            line: line_no,
                            message: "face needs at least three vertices".to_string(),
                        });
                    }
                    let mut face = Vec::with_capacity(fields.len() - 1);
                    for corner in &fields[1..] {
                        face.push(resolve_corner(corner, line_no, &positions, &normals, &tex_coords)?);
                    }
                    if face.iter().any(|(_, has_normal)| !has_normal) {
                        let normal = face_normal(&face);
                        for (vertex, has_normal) in &mut face {
                            if !*has_normal {
                                vertex.normal = normal;
                            }
                        }
                    }

                    let base = current.vertices.len() as u32;
                    current.vertices.extend(face.iter().map(|(v, _)| *v));
                    // Fan triangulation
                    for i in 1..(face.len() as u32 - 1) {
                        current.indices.extend_from_slice(&[base, base + i, base + i + 1]);
                    }
                }
                _ => {}
            }
        }
        parts.extend(current.finish());

        if parts.is_empty() {
            return Err(ObjError::InvalidFormat("No faces found in OBJ data".to_string()));
        }
        log::debug!("Parsed OBJ with {} parts", parts.len());
        Ok(ModelAsset { parts })
    }
}

fn parse_floats<const N: usize>(fields: &[&str], line: usize, what: &str) -> Result<[f32; N], ObjError> {
    let mut out = [0.0; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = fields
            .get(i + 1)
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| ObjError::ParseError {
                line,
                message: format!("invalid {what}"),
            })?;
    }
    Ok(out)
}

fn resolve_index(raw: &str, len: usize) -> Option<usize> {
    let index: i64 = raw.parse().ok()?;
    let resolved = if index < 0 { len as i64 + index } else { index - 1 };
    usize::try_from(resolved).ok().filter(|i| *i < len)
}

fn resolve_corner(
    corner: &str,
    line: usize,
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    tex_coords: &[[f32; 2]],
) -> Result<(Vertex, bool), ObjError> {
    let mut refs = corner.split('/');
    let position = refs
        .next()
        .and_then(|raw| resolve_index(raw, positions.len()))
        .and_then(|i| positions.get(i))
        .ok_or_else(|| ObjError::ParseError {
            line,
            message: format!("position index out of range in '{corner}'"),
        })?;
    let tex_coord = refs
        .next()
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| resolve_index(raw, tex_coords.len()))
        .and_then(|i| tex_coords.get(i))
        .copied()
        .unwrap_or([0.0, 0.0]);
    let normal = refs
        .next()
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| resolve_index(raw, normals.len()))
        .and_then(|i| normals.get(i))
        .copied();

    Ok((
        Vertex::new(*position, normal.unwrap_or([0.0, 1.0, 0.0]), tex_coord),
        normal.is_some(),
    ))
}

fn face_normal(face: &[(Vertex, bool)]) -> [f32; 3] {
    let p = |i: usize| Vec3::from(face[i].0.position);
    let n = (p(1) - p(0)).cross(&(p(2) - p(0)));
    if n.norm() <= f32::EPSILON {
        return [0.0, 1.0, 0.0];
    }
    let n = n.normalize();
    [n.x, n.y, n.z]
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PARTS: &str = "\
# two quads
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
o Body
usemtl paint
f 1 2 3 4
g Window
f 1 2 3
";

    #[test]
    fn test_parts_split_on_object_and_group() {
        let model = ObjLoader::parse(TWO_PARTS.as_bytes()).unwrap();
        assert_eq!(model.parts.len(), 2);
        assert_eq!(model.parts[0].name, "Body");
        assert_eq!(model.parts[0].material.name, "paint");
        assert_eq!(model.parts[0].mesh.triangle_count(), 2);
        assert_eq!(model.parts[1].name, "Window");
        assert_eq!(model.parts[1].material.name, "Window");
        assert_eq!(model.triangle_count(), 3);
    }

    #[test]
    fn test_missing_normals_use_face_normal() {
        let model = ObjLoader::parse(TWO_PARTS.as_bytes()).unwrap();
        let normal = model.parts[0].mesh.vertices[0].normal;
        assert!((normal[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_faces_without_objects_go_to_default_part() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1\n";
        let model = ObjLoader::parse(src.as_bytes()).unwrap();
        assert_eq!(model.parts.len(), 1);
        assert_eq!(model.parts[0].name, "default");
    }

    #[test]
    fn test_negative_indices_are_relative() {
        let src = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let model = ObjLoader::parse(src.as_bytes()).unwrap();
        assert_eq!(model.parts[0].mesh.vertices[1].position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_invalid_data_is_rejected() {
        assert!(matches!(ObjLoader::parse(b"v 0 0 0\n"), Err(ObjError::InvalidFormat(_))));
        assert!(matches!(
            ObjLoader::parse(b"v 0 0 0\nf 1 2 3\n"),
            Err(ObjError::ParseError { line: 2, .. })
        ));
        assert!(matches!(ObjLoader::parse(b"v a b c\n"), Err(ObjError::ParseError { line: 1, .. })));
    }
}

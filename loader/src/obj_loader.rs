use std::collections::HashMap;
use std::sync::Arc;

use scene::material::{CpuMaterial, MaterialSlot};
use scene::mesh::{flat_normals, CpuMesh, CpuMeshVertex, MeshGroup};
use scene::model::{Model, ModelPart};
use scene::transform::Transform;
use tracing::debug;

use crate::error::DecodeError;
use crate::registry::{DecodeRequest, ModelDecoder};

const FORMAT: &str = "OBJ";

/// Wavefront `.obj`. Material libraries are not read, `usemtl` names become
/// plain materials so each group can still be told apart.
pub struct ObjDecoder;

impl ModelDecoder for ObjDecoder {
    fn decode(&self, request: &DecodeRequest) -> Result<Model, DecodeError> {
        let contents = String::from_utf8_lossy(request.bytes);
        let parts = read_obj_model(&contents)?;
        if parts.is_empty() {
            return Err(DecodeError::Empty);
        }

        debug!(name = request.name, parts = parts.len(), "decoded OBJ");
        Ok(Model {
            name: Some(request.name.to_string()),
            parts,
        })
    }
}

#[derive(Default)]
struct ObjData {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
}

/// Corner of a face as zero based indices into the shared lists.
type FaceCorner = (usize, Option<usize>, Option<usize>);

#[derive(Default)]
struct PartBuilder {
    name: Option<String>,
    vertices: Vec<CpuMeshVertex>,
    indices: Vec<u32>,
    corner_lookup: HashMap<FaceCorner, u32>,
    groups: Vec<MeshGroup>,
    material_names: Vec<String>,
    active_material: Option<usize>,
    missing_normals: bool,
}

impl PartBuilder {
    fn named(name: Option<String>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    fn use_material(&mut self, name: &str) {
        if self.groups.is_empty() && !self.indices.is_empty() {
            // Faces seen before the first usemtl
            self.material_names.push(String::from("default"));
            self.groups.push(MeshGroup {
                start: 0,
                count: self.indices.len(),
                material_index: 0,
            });
        }

        let material_index = match self.material_names.iter().position(|m| m == name) {
            Some(index) => index,
            None => {
                self.material_names.push(name.to_string());
                self.material_names.len() - 1
            }
        };
        self.active_material = Some(material_index);

        if let Some(group) = self.groups.last_mut() {
            if group.count == 0 {
                group.material_index = material_index;
                return;
            }
        }
        self.groups.push(MeshGroup {
            start: self.indices.len(),
            count: 0,
            material_index,
        });
    }

    fn active_material_name(&self) -> Option<String> {
        self.active_material
            .and_then(|index| self.material_names.get(index))
            .cloned()
    }

    fn add_corner(&mut self, corner: FaceCorner, data: &ObjData) -> u32 {
        if let Some(index) = self.corner_lookup.get(&corner) {
            return *index;
        }

        let (position, uv, normal) = corner;
        let normal = match normal {
            Some(normal) => data.normals[normal],
            None => {
                self.missing_normals = true;
                [0.0, 0.0, 0.0]
            }
        };

        let index = self.vertices.len() as u32;
        self.vertices.push(CpuMeshVertex {
            position: data.positions[position],
            normal,
            uv: uv.map(|uv| data.uvs[uv]).unwrap_or_default(),
        });
        self.corner_lookup.insert(corner, index);
        index
    }

    fn add_triangle(&mut self, corners: [u32; 3]) {
        self.indices.extend_from_slice(&corners);
        if let Some(group) = self.groups.last_mut() {
            group.count += 3;
        }
    }

    fn build(mut self) -> Option<ModelPart> {
        if self.indices.is_empty() {
            return None;
        }

        if self.missing_normals {
            let positions: Vec<[f32; 3]> =
                self.vertices.iter().map(|vertex| vertex.position).collect();
            for (vertex, normal) in self
                .vertices
                .iter_mut()
                .zip(flat_normals(&positions, &self.indices))
            {
                vertex.normal = normal;
            }
        }

        self.groups.retain(|group| group.count > 0);
        let materials = match self.material_names.len() {
            0 => MaterialSlot::Single(Arc::new(CpuMaterial::default())),
            1 => MaterialSlot::Single(Arc::new(CpuMaterial::named(&self.material_names[0]))),
            _ => MaterialSlot::Multiple(
                self.material_names
                    .iter()
                    .map(|name| Arc::new(CpuMaterial::named(name)))
                    .collect(),
            ),
        };
        if matches!(materials, MaterialSlot::Single(_)) {
            self.groups.clear();
        }

        Some(ModelPart {
            name: self.name,
            transform: Transform::default(),
            mesh: CpuMesh::from_vertices(self.vertices, self.indices, self.groups),
            materials,
        })
    }
}

fn read_obj_model(contents: &str) -> Result<Vec<ModelPart>, DecodeError> {
    let mut data = ObjData::default();
    let mut parts = Vec::new();
    let mut current = PartBuilder::default();

    for (line_index, line) in contents.lines().enumerate() {
        let line_number = line_index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut split = line.split_whitespace();
        let Some(keyword) = split.next() else {
            continue;
        };
        match keyword {
            "v" => data.positions.push(parse_floats(split, line_number)?),
            "vn" => data.normals.push(parse_floats(split, line_number)?),
            "vt" => {
                let [u] = parse_floats(split.by_ref(), line_number)?;
                let v = match split.next() {
                    Some(token) => parse_float(token, line_number)?,
                    None => 0.0,
                };
                data.uvs.push([u, v]);
            }
            "f" => {
                let corners = split
                    .map(|token| parse_corner(token, &data, line_number))
                    .collect::<Result<Vec<_>, _>>()?;
                if corners.len() < 3 {
                    return Err(DecodeError::malformed(
                        FORMAT,
                        format!("line {line_number}: face with fewer than three corners"),
                    ));
                }

                let indices: Vec<u32> = corners
                    .into_iter()
                    .map(|corner| current.add_corner(corner, &data))
                    .collect();
                // fan triangulation
                for i in 1..indices.len() - 1 {
                    current.add_triangle([indices[0], indices[i], indices[i + 1]]);
                }
            }
            "o" | "g" => {
                let name = split.collect::<Vec<_>>().join(" ");
                let name = (!name.is_empty()).then_some(name);
                let material = current.active_material_name();

                let finished = std::mem::replace(&mut current, PartBuilder::named(name));
                if let Some(part) = finished.build() {
                    parts.push(part);
                }
                // The active material carries over into the new part
                if let Some(material) = material {
                    current.use_material(&material);
                }
            }
            "usemtl" => {
                let name = split.collect::<Vec<_>>().join(" ");
                current.use_material(&name);
            }
            _ => continue,
        }
    }

    if let Some(part) = current.build() {
        parts.push(part);
    }
    Ok(parts)
}

fn parse_floats<'a, const N: usize>(
    mut split: impl Iterator<Item = &'a str>,
    line_number: usize,
) -> Result<[f32; N], DecodeError> {
    let mut values = [0.0f32; N];
    for value in values.iter_mut() {
        let token = split.next().ok_or_else(|| {
            DecodeError::malformed(FORMAT, format!("line {line_number}: missing coordinate"))
        })?;
        *value = parse_float(token, line_number)?;
    }
    Ok(values)
}

fn parse_float(token: &str, line_number: usize) -> Result<f32, DecodeError> {
    token.parse::<f32>().map_err(|_| {
        DecodeError::malformed(FORMAT, format!("line {line_number}: bad number {token:?}"))
    })
}

fn parse_corner(token: &str, data: &ObjData, line_number: usize) -> Result<FaceCorner, DecodeError> {
    let mut indices = token.split('/');

    let position = resolve_index(indices.next(), data.positions.len(), line_number)?
        .ok_or_else(|| {
            DecodeError::malformed(FORMAT, format!("line {line_number}: face without position"))
        })?;
    let uv = resolve_index(indices.next(), data.uvs.len(), line_number)?;
    let normal = resolve_index(indices.next(), data.normals.len(), line_number)?;

    Ok((position, uv, normal))
}

/// One based, negative counts back from the end of the list.
fn resolve_index(
    token: Option<&str>,
    len: usize,
    line_number: usize,
) -> Result<Option<usize>, DecodeError> {
    let token = match token {
        Some(token) if !token.is_empty() => token,
        _ => return Ok(None),
    };

    let out_of_range =
        || DecodeError::malformed(FORMAT, format!("line {line_number}: index {token} out of range"));
    let index: i64 = token.parse().map_err(|_| {
        DecodeError::malformed(FORMAT, format!("line {line_number}: bad index {token:?}"))
    })?;

    let resolved = match index {
        0 => return Err(out_of_range()),
        i if i > 0 => i - 1,
        i => len as i64 + i,
    };
    if resolved < 0 || resolved >= len as i64 {
        return Err(out_of_range());
    }
    Ok(Some(resolved as usize))
}

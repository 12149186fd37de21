use std::collections::HashMap;
use std::iter::repeat;
use std::sync::Arc;

use gltf::mesh::Mode;
use gltf::{Node, Semantic};
use nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};
use scene::material::{CpuMaterial, MaterialSlot};
use scene::mesh::{flat_normals, CpuMesh, CpuMeshVertex};
use scene::model::{Model, ModelPart};
use scene::transform::Transform;
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::registry::{DecodeRequest, ModelDecoder};

/// `.gltf` and `.glb`. Buffers can be embedded, data URIs, or files next to the model.
pub struct GltfDecoder;

impl ModelDecoder for GltfDecoder {
    fn decode(&self, request: &DecodeRequest) -> Result<Model, DecodeError> {
        let gltf::Gltf { document, blob } = gltf::Gltf::from_slice(request.bytes)?;
        let buffers = gltf::import_buffers(&document, request.base_path, blob)?;

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| DecodeError::malformed("glTF", "no scene"))?;

        let mut scene_loading_data = SceneLoadingData::new(buffers);
        let mut parts = Vec::new();

        for node in scene.nodes() {
            read_node(
                &node,
                &mut scene_loading_data,
                &mut parts,
                &Transform::default(),
            );
        }

        if parts.is_empty() {
            return Err(DecodeError::Empty);
        }

        debug!(name = request.name, parts = parts.len(), "decoded glTF");
        Ok(Model {
            name: Some(request.name.to_string()),
            parts,
        })
    }
}

fn read_node(
    node: &Node,
    scene_loading_data: &mut SceneLoadingData,
    parts: &mut Vec<ModelPart>,
    parent_transform: &Transform,
) {
    let local_transform: Transform = from_gltf_transform(node.transform());
    let global_transform = parent_transform * local_transform;

    for child in node.children() {
        read_node(&child, scene_loading_data, parts, &global_transform);
    }

    let Some(mesh) = node.mesh() else {
        return;
    };
    let name = node.name().or(mesh.name()).map(str::to_string);

    for primitive in mesh.primitives() {
        let Some(cpu_mesh) = scene_loading_data.get_mesh(&primitive) else {
            continue;
        };
        let material = scene_loading_data.get_material(&primitive);

        parts.push(ModelPart {
            name: name.clone(),
            transform: global_transform.clone(),
            mesh: cpu_mesh,
            materials: MaterialSlot::Single(material),
        });
    }
}

fn from_gltf_transform(value: gltf::scene::Transform) -> Transform {
    // rotation is a quaternion
    let (translation, rotation, scale) = value.decomposed();

    let position: Point3<f32> = translation.into();
    let rotation: UnitQuaternion<f32> = UnitQuaternion::new_normalize(Quaternion::from(rotation));
    let scale: Vector3<f32> = Vector3::from_row_slice(&scale);

    Transform {
        position,
        rotation,
        scale,
    }
}

struct SceneLoadingData {
    gltf_buffers: Vec<gltf::buffer::Data>,
    meshes: HashMap<MeshKey, Arc<CpuMesh>>,
    materials: HashMap<usize, Arc<CpuMaterial>>,
    missing_material: Arc<CpuMaterial>,
}

impl SceneLoadingData {
    fn new(buffers: Vec<gltf::buffer::Data>) -> Self {
        Self {
            gltf_buffers: buffers,
            meshes: HashMap::new(),
            materials: HashMap::new(),
            missing_material: Arc::new(CpuMaterial::default()),
        }
    }

    /// `None` for primitives that cannot be shown as triangles.
    fn get_mesh(&mut self, primitive: &gltf::Primitive) -> Option<Arc<CpuMesh>> {
        if primitive.mode() != Mode::Triangles {
            warn!(mode = ?primitive.mode(), "skipping non-triangle primitive");
            return None;
        }
        let Some(positions_accessor) = primitive.get(&Semantic::Positions) else {
            warn!("skipping primitive without positions");
            return None;
        };

        let mesh_key = MeshKey {
            index_buffer_id: primitive.indices().map(|a| a.index()),
            vertex_buffer_positions_id: positions_accessor.index(),
            vertex_buffer_normals_id: primitive.get(&Semantic::Normals).map(|a| a.index()),
            vertex_buffer_uvs_id: primitive.get(&Semantic::TexCoords(0)).map(|a| a.index()),
        };

        if let Some(mesh) = self.meshes.get(&mesh_key) {
            return Some(mesh.clone());
        }

        let buffers = &self.gltf_buffers;
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
        let positions: Vec<[f32; 3]> = reader.read_positions()?.collect();

        let indices: Vec<u32> = reader
            .read_indices()
            .map(|indices| indices.into_u32().collect())
            .unwrap_or_else(|| (0..positions.len() as u32).collect());
        if indices.iter().any(|index| *index as usize >= positions.len()) {
            warn!("skipping primitive with out of range indices");
            return None;
        }

        let normals: Vec<[f32; 3]> = match reader.read_normals() {
            Some(normals) => normals.collect(),
            None => flat_normals(&positions, &indices),
        };
        let uvs: Box<dyn Iterator<Item = [f32; 2]>> =
            if let Some(read_tex_coords) = reader.read_tex_coords(0) {
                Box::new(read_tex_coords.into_f32())
            } else {
                Box::new(repeat([0.0f32, 0.0f32]))
            };

        let vertices: Vec<CpuMeshVertex> = positions
            .into_iter()
            .zip(normals.into_iter().chain(repeat([0.0, 1.0, 0.0])))
            .zip(uvs)
            .map(|((position, normal), uv)| CpuMeshVertex {
                position,
                normal,
                uv,
            })
            .collect();

        let mesh = CpuMesh::from_vertices(vertices, indices, Vec::new());
        self.meshes.insert(mesh_key, mesh.clone());
        Some(mesh)
    }

    fn get_material(&mut self, primitive: &gltf::Primitive) -> Arc<CpuMaterial> {
        let gltf_material = primitive.material();

        let Some(material_index) = gltf_material.index() else {
            return self.missing_material.clone();
        };

        self.materials
            .entry(material_index)
            .or_insert_with(|| {
                let gltf_material_pbr = gltf_material.pbr_metallic_roughness();
                let emissive_strength = gltf_material.emissive_strength().unwrap_or(1.0);
                let emissive_factor = gltf_material
                    .emissive_factor()
                    .map(|v| v * emissive_strength);

                Arc::new(CpuMaterial {
                    name: gltf_material.name().map(str::to_string),
                    base_color: Vector3::from_row_slice(
                        &gltf_material_pbr.base_color_factor()[0..3],
                    ),
                    roughness_factor: gltf_material_pbr.roughness_factor(),
                    metallic_factor: gltf_material_pbr.metallic_factor(),
                    emissivity: emissive_factor.into(),
                    double_sided: gltf_material.double_sided(),
                    ..CpuMaterial::default()
                })
            })
            .clone()
    }
}

#[derive(Hash, Eq, PartialEq, Debug)]
struct MeshKey {
    index_buffer_id: Option<usize>,
    vertex_buffer_positions_id: usize,
    vertex_buffer_normals_id: Option<usize>,
    vertex_buffer_uvs_id: Option<usize>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// A unit cube as a binary glTF, two nodes sharing one mesh.
    pub(crate) fn cube_glb() -> Vec<u8> {
        let positions: [[f32; 3]; 8] = [
            [-0.5, -0.5, 0.5],
            [0.5, -0.5, 0.5],
            [0.5, 0.5, 0.5],
            [-0.5, 0.5, 0.5],
            [-0.5, -0.5, -0.5],
            [0.5, -0.5, -0.5],
            [0.5, 0.5, -0.5],
            [-0.5, 0.5, -0.5],
        ];
        let indices: [u16; 36] = [
            0, 1, 2, 2, 3, 0, 5, 4, 7, 7, 6, 5, 1, 5, 6, 6, 2, 1, 4, 0, 3, 3, 7, 4, 3, 2, 6, 6,
            7, 3, 1, 0, 4, 4, 5, 1,
        ];

        let mut bin = Vec::new();
        for position in positions {
            for value in position {
                bin.extend_from_slice(&value.to_le_bytes());
            }
        }
        for index in indices {
            bin.extend_from_slice(&index.to_le_bytes());
        }

        let document = json!({
            "asset": { "version": "2.0" },
            "scene": 0,
            "scenes": [{ "nodes": [0, 1] }],
            "nodes": [
                { "name": "left", "mesh": 0, "translation": [-1.0, 0.0, 0.0] },
                { "name": "right", "mesh": 0, "translation": [1.0, 0.0, 0.0] }
            ],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }] }],
            "materials": [{
                "name": "paint",
                "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 1.0] }
            }],
            "buffers": [{ "byteLength": bin.len() }],
            "bufferViews": [
                { "buffer": 0, "byteOffset": 0, "byteLength": 96 },
                { "buffer": 0, "byteOffset": 96, "byteLength": 72 }
            ],
            "accessors": [
                {
                    "bufferView": 0, "componentType": 5126, "count": 8, "type": "VEC3",
                    "min": [-0.5, -0.5, -0.5], "max": [0.5, 0.5, 0.5]
                },
                { "bufferView": 1, "componentType": 5123, "count": 36, "type": "SCALAR" }
            ]
        });

        pack_glb(&document, &bin)
    }

    /// Wraps a document and its binary chunk in a GLB container.
    pub(crate) fn pack_glb(document: &serde_json::Value, bin: &[u8]) -> Vec<u8> {
        let mut json_chunk = serde_json::to_vec(document).unwrap();
        while json_chunk.len() % 4 != 0 {
            json_chunk.push(b' ');
        }

        let total = 12 + 8 + json_chunk.len() + 8 + bin.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json_chunk);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(bin);
        glb
    }

    #[test]
    fn test_decode_glb_cube() {
        let bytes = cube_glb();
        let model = GltfDecoder
            .decode(&DecodeRequest {
                name: "cube.glb",
                bytes: &bytes,
                base_path: None,
            })
            .unwrap();

        assert_eq!(model.mesh_count(), 2);
        assert_eq!(model.triangle_count(), 24);
        // Both nodes reuse the same mesh
        assert!(Arc::ptr_eq(&model.parts[0].mesh, &model.parts[1].mesh));

        let bounds = model.bounding_box();
        assert_eq!(bounds.min, Vector3::new(-1.5, -0.5, -0.5));
        assert_eq!(bounds.max, Vector3::new(1.5, 0.5, 0.5));

        let material = model.parts[0].materials.iter().next().unwrap();
        assert_eq!(material.name.as_deref(), Some("paint"));
        assert_eq!(material.base_color, Vector3::new(1.0, 0.0, 0.0));

        // Normals were computed since the file has none
        let normal = Vector3::from(model.parts[0].mesh.vertices[0].normal);
        assert!((normal.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_points_only_file_is_empty() {
        let mut bin = Vec::new();
        for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bin.extend_from_slice(&value.to_le_bytes());
        }
        let document = json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [0] }],
            "nodes": [{ "mesh": 0 }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "mode": 0 }] }],
            "buffers": [{ "byteLength": bin.len() }],
            "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
            "accessors": [{
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0]
            }]
        });

        let bytes = pack_glb(&document, &bin);
        let result = GltfDecoder.decode(&DecodeRequest {
            name: "points.glb",
            bytes: &bytes,
            base_path: None,
        });
        assert!(matches!(result, Err(DecodeError::Empty)));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let result = GltfDecoder.decode(&DecodeRequest {
            name: "broken.glb",
            bytes: b"glTF but not really",
            base_path: None,
        });
        assert!(matches!(result, Err(DecodeError::Gltf(_))));
    }
}

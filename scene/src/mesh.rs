use std::sync::Arc;

use math::bounding_box::BoundingBox;
use nalgebra::{Vector2, Vector3};

use crate::asset::{Asset, AssetId};

#[derive(Clone, Debug, PartialEq)]
pub struct CpuMeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// A range of indices drawn with one entry of the owning part's material list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshGroup {
    pub start: usize,
    pub count: usize,
    pub material_index: usize,
}

pub struct CpuMesh {
    pub id: AssetId,
    pub vertices: Vec<CpuMeshVertex>,
    pub indices: Vec<u32>,
    /// Empty means the whole index buffer uses material 0.
    pub groups: Vec<MeshGroup>,
    pub bounding_box: BoundingBox<Vector3<f32>>,
}

impl Asset for CpuMesh {
    fn id(&self) -> AssetId {
        self.id
    }
}

impl CpuMesh {
    pub fn new(
        vertices: Vec<CpuMeshVertex>,
        indices: Vec<u32>,
        bounding_box: BoundingBox<Vector3<f32>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: AssetId::new_v4(),
            vertices,
            indices,
            groups: Vec::new(),
            bounding_box,
        })
    }

    /// Builds the mesh and derives its bounding box from the vertex positions.
    pub fn from_vertices(
        vertices: Vec<CpuMeshVertex>,
        indices: Vec<u32>,
        groups: Vec<MeshGroup>,
    ) -> Arc<Self> {
        let bounding_box =
            BoundingBox::from_points(vertices.iter().map(|vertex| Vector3::from(vertex.position)));

        Arc::new(Self {
            id: AssetId::new_v4(),
            vertices,
            indices,
            groups,
            bounding_box,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn cube(width: f32, height: f32, depth: f32) -> Arc<Self> {
        struct CubeFace {
            position_indices: [usize; 4],
            normal: Vector3<f32>,
        }

        let positions: [Vector3<f32>; 8] = [
            // front
            Vector3::new(-0.5, -0.5, 0.5),
            Vector3::new(0.5, -0.5, 0.5),
            Vector3::new(0.5, 0.5, 0.5),
            Vector3::new(-0.5, 0.5, 0.5),
            // back
            Vector3::new(-0.5, -0.5, -0.5),
            Vector3::new(0.5, -0.5, -0.5),
            Vector3::new(0.5, 0.5, -0.5),
            Vector3::new(-0.5, 0.5, -0.5),
        ];

        let faces: [CubeFace; 6] = [
            // front
            CubeFace {
                position_indices: [0, 1, 2, 3],
                normal: Vector3::new(0.0, 0.0, 1.0),
            },
            // back
            CubeFace {
                position_indices: [5, 4, 7, 6],
                normal: Vector3::new(0.0, 0.0, -1.0),
            },
            // right
            CubeFace {
                position_indices: [1, 5, 6, 2],
                normal: Vector3::new(1.0, 0.0, 0.0),
            },
            // left
            CubeFace {
                position_indices: [4, 0, 3, 7],
                normal: Vector3::new(-1.0, 0.0, 0.0),
            },
            // up
            CubeFace {
                position_indices: [3, 2, 6, 7],
                normal: Vector3::new(0.0, 1.0, 0.0),
            },
            // down
            CubeFace {
                position_indices: [1, 0, 4, 5],
                normal: Vector3::new(0.0, -1.0, 0.0),
            },
        ];

        let uvs_face: [Vector2<f32>; 4] = [
            Vector2::new(0.0, 1.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 0.0),
        ];

        let vertices: Vec<CpuMeshVertex> = faces
            .iter()
            .flat_map(|face| {
                face.position_indices
                    .iter()
                    .enumerate()
                    .map(|(i, pos_index)| {
                        let position = positions[*pos_index];
                        CpuMeshVertex {
                            position: [position.x * width, position.y * height, position.z * depth],
                            normal: face.normal.into(),
                            uv: uvs_face[i].into(),
                        }
                    })
            })
            .collect();

        let face_indices_schema = [
            0, 1, 2, // bottom right
            2, 3, 0, // top left
        ];

        let indices: Vec<u32> = (0..faces.len())
            .flat_map(|face_index| {
                let offset = 4 * face_index as u32;
                face_indices_schema.map(|i| offset + i)
            })
            .collect();

        CpuMesh::new(
            vertices,
            indices,
            BoundingBox::new(
                Vector3::new(-width / 2.0, -height / 2.0, -depth / 2.0),
                Vector3::new(width / 2.0, height / 2.0, depth / 2.0),
            ),
        )
    }
}

/// Per-face normals, written to every corner of the face.
/// Used by decoders when the source file carries no normals.
pub fn flat_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![[0.0f32; 3]; positions.len()];

    for triangle in indices.chunks_exact(3) {
        let corners = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];
        if corners.iter().any(|&corner| corner >= positions.len()) {
            continue;
        }

        let a = Vector3::from(positions[corners[0]]);
        let b = Vector3::from(positions[corners[1]]);
        let c = Vector3::from(positions[corners[2]]);
        let normal = (b - a).cross(&(c - a));
        let normal = normal.try_normalize(f32::EPSILON).unwrap_or_else(Vector3::y);

        for corner in corners {
            normals[corner] = normal.into();
        }
    }

    normals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_bounds_match_vertices() {
        let cube = CpuMesh::cube(2.0, 4.0, 6.0);
        let derived = BoundingBox::from_points(
            cube.vertices.iter().map(|vertex| Vector3::from(vertex.position)),
        );
        assert_eq!(derived, cube.bounding_box);
        assert_eq!(cube.triangle_count(), 12);
    }

    #[test]
    fn test_flat_normals_face_up() {
        let positions = [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]];
        let normals = flat_normals(&positions, &[0, 1, 2]);
        for normal in normals {
            assert!((normal[1] - 1.0).abs() < 1e-6);
        }
    }
}

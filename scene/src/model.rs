use std::sync::Arc;

use bevy_ecs::prelude::*;
use math::bounding_box::BoundingBox;
use nalgebra::Vector3;

use crate::{material::MaterialSlot, mesh::CpuMesh, transform::Transform};

/// The decoded result of one model file, before it is placed into a world.
#[derive(Clone, Default)]
pub struct Model {
    pub name: Option<String>,
    pub parts: Vec<ModelPart>,
}

/// One drawable node. The transform is already flattened into model space.
#[derive(Clone)]
pub struct ModelPart {
    pub name: Option<String>,
    pub transform: Transform,
    pub mesh: Arc<CpuMesh>,
    pub materials: MaterialSlot,
}

impl Model {
    /// Gets the combined bounding box of all the parts in model space
    pub fn bounding_box(&self) -> BoundingBox<Vector3<f32>> {
        self.parts
            .iter()
            .map(|part| part.bounding_box())
            .fold(BoundingBox::empty(), |a, b| a.combine(&b))
    }

    pub fn mesh_count(&self) -> usize {
        self.parts.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.parts.iter().map(|part| part.mesh.vertices.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.parts.iter().map(|part| part.mesh.triangle_count()).sum()
    }
}

impl ModelPart {
    pub fn bounding_box(&self) -> BoundingBox<Vector3<f32>> {
        self.mesh.bounding_box.transform(&self.transform.to_matrix())
    }
}

/// ECS side of a model part: the mesh and its materials.
#[derive(Component, Clone)]
pub struct MeshNode {
    pub name: Option<String>,
    pub mesh: Arc<CpuMesh>,
    pub materials: MaterialSlot,
}

impl ModelPart {
    pub fn into_components(self) -> (Transform, MeshNode) {
        (
            self.transform,
            MeshNode {
                name: self.name,
                mesh: self.mesh,
                materials: self.materials,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::CpuMaterial;
    use crate::transform::TransformBuilder;
    use nalgebra::Point3;

    #[test]
    fn test_bounding_box_uses_part_transforms() {
        let cube = CpuMesh::cube(1.0, 1.0, 1.0);
        let material = MaterialSlot::Single(Arc::new(CpuMaterial::default()));
        let model = Model {
            name: None,
            parts: vec![
                ModelPart {
                    name: Some("left".into()),
                    transform: TransformBuilder::new()
                        .position(Point3::new(-2.0, 0.0, 0.0))
                        .build(),
                    mesh: cube.clone(),
                    materials: material.clone(),
                },
                ModelPart {
                    name: Some("right".into()),
                    transform: TransformBuilder::new()
                        .position(Point3::new(2.0, 0.0, 0.0))
                        .uniform_scale(2.0)
                        .build(),
                    mesh: cube,
                    materials: material,
                },
            ],
        };

        let bounds = model.bounding_box();
        assert_eq!(bounds.min, Vector3::new(-2.5, -1.0, -1.0));
        assert_eq!(bounds.max, Vector3::new(3.0, 1.0, 1.0));
        assert_eq!(model.mesh_count(), 2);
        assert_eq!(model.triangle_count(), 24);
    }
}

use std::collections::HashSet;
use std::sync::Arc;

use bevy_ecs::prelude::*;
use loader::format::ModelFormat;
use math::bounding_box::BoundingBox;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use scene::asset::Asset;
use scene::light::{CastShadow, ReceiveShadow};
use scene::material::CpuMaterial;
use scene::model::{MeshNode, Model};
use scene::transform::Transform;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: Option<String>,
    pub format: ModelFormat,
    pub mesh_count: usize,
    pub material_count: usize,
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// World space size after centering and scaling.
    pub size: Vector3<f32>,
    /// World space center after centering, at the origin up to rounding.
    pub center: Vector3<f32>,
    /// Center of the model in its own file.
    pub source_center: Vector3<f32>,
    pub scale: f32,
}

/// The model currently shown. Its parts are the entities with a `MeshNode`.
#[derive(Resource, Debug, Clone)]
pub struct LoadedModel {
    pub info: ModelInfo,
    /// Centering and scaling applied on top of the file's own transforms.
    pub root: Transform,
}

/// Spawns the parts of a decoded model, centered on the origin and scaled down
/// to `max_dimension` if it is larger. Any previous model must be removed first.
pub fn install_model(
    world: &mut World,
    model: Model,
    format: ModelFormat,
    max_dimension: Option<f32>,
) -> ModelInfo {
    let source_bounds = model.bounding_box();
    let source_center = if source_bounds.is_empty() {
        Vector3::zeros()
    } else {
        source_bounds.center()
    };

    let largest = source_bounds.max_dimension();
    let scale = match max_dimension {
        Some(max) if largest > max => max / largest,
        _ => 1.0,
    };
    let root = Transform {
        position: Point3::from(-source_center * scale),
        rotation: UnitQuaternion::identity(),
        scale: Vector3::new(scale, scale, scale),
    };

    let material_count = model
        .parts
        .iter()
        .flat_map(|part| part.materials.iter().map(|material| material.id()))
        .collect::<HashSet<_>>()
        .len();
    let mesh_count = model.mesh_count();
    let vertex_count = model.vertex_count();
    let triangle_count = model.triangle_count();
    let name = model.name.clone();

    for part in model.parts {
        let (transform, mesh_node) = part.into_components();
        world.spawn((&root * transform, mesh_node, CastShadow, ReceiveShadow));
    }

    let bounds = model_bounds(world);
    let (size, center) = if bounds.is_empty() {
        (Vector3::zeros(), Vector3::zeros())
    } else {
        (bounds.size(), bounds.center())
    };

    let info = ModelInfo {
        name,
        format,
        mesh_count,
        material_count,
        vertex_count,
        triangle_count,
        size,
        center,
        source_center,
        scale,
    };
    world.insert_resource(LoadedModel {
        info: info.clone(),
        root,
    });
    info
}

/// Despawns every part and forgets the model. GPU handles have to be released before.
pub fn despawn_model(world: &mut World) -> usize {
    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<MeshNode>>()
        .iter(world)
        .collect();
    for entity in &entities {
        world.despawn(*entity);
    }
    world.remove_resource::<LoadedModel>();
    entities.len()
}

/// World space bounds of all parts.
pub fn model_bounds(world: &mut World) -> BoundingBox<Vector3<f32>> {
    world
        .query::<(&Transform, &MeshNode)>()
        .iter(world)
        .map(|(transform, node)| node.mesh.bounding_box.transform(&transform.to_matrix()))
        .fold(BoundingBox::empty(), |a, b| a.combine(&b))
}

/// Returns how many parts were changed.
pub fn set_wireframe(world: &mut World, wireframe: bool) -> usize {
    let mut changed = 0;
    for mut node in world.query::<&mut MeshNode>().iter_mut(world) {
        node.materials.set_wireframe(wireframe);
        changed += 1;
    }
    changed
}

pub fn materials(world: &mut World) -> Vec<Arc<CpuMaterial>> {
    world
        .query::<&MeshNode>()
        .iter(world)
        .flat_map(|node| node.materials.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scene::material::MaterialSlot;
    use scene::mesh::CpuMesh;
    use scene::model::ModelPart;
    use scene::transform::TransformBuilder;

    fn offset_cube(position: Point3<f32>, size: f32) -> Model {
        Model {
            name: Some("cube".into()),
            parts: vec![ModelPart {
                name: None,
                transform: TransformBuilder::new().position(position).build(),
                mesh: CpuMesh::cube(size, size, size),
                materials: MaterialSlot::Single(Arc::new(CpuMaterial::default())),
            }],
        }
    }

    #[test]
    fn test_install_centers_on_origin() {
        let mut world = World::new();
        let info = install_model(
            &mut world,
            offset_cube(Point3::new(10.0, -4.0, 3.0), 2.0),
            ModelFormat::Glb,
            Some(10.0),
        );

        assert!(info.center.norm() < 1e-5);
        assert_eq!(info.source_center, Vector3::new(10.0, -4.0, 3.0));
        assert_eq!(info.scale, 1.0);
        assert!((info.size - Vector3::new(2.0, 2.0, 2.0)).norm() < 1e-5);
        assert!(model_bounds(&mut world).center().norm() < 1e-5);
    }

    #[test]
    fn test_install_scales_large_models_down() {
        let mut world = World::new();
        let info = install_model(
            &mut world,
            offset_cube(Point3::new(50.0, 0.0, 0.0), 40.0),
            ModelFormat::Obj,
            Some(10.0),
        );

        assert!((info.scale - 0.25).abs() < 1e-6);
        assert!((info.size.max() - 10.0).abs() < 1e-4);
        assert!(info.center.norm() < 1e-4);
    }

    #[test]
    fn test_despawn_and_wireframe() {
        let mut world = World::new();
        install_model(
            &mut world,
            offset_cube(Point3::origin(), 1.0),
            ModelFormat::Dae,
            None,
        );
        assert_eq!(set_wireframe(&mut world, true), 1);
        assert!(materials(&mut world).iter().all(|material| material.wireframe));

        assert_eq!(despawn_model(&mut world), 1);
        assert!(world.get_resource::<LoadedModel>().is_none());
        assert!(model_bounds(&mut world).is_empty());
        assert_eq!(set_wireframe(&mut world, false), 0);
    }
}

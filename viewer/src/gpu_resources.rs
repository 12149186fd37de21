use bevy_ecs::prelude::*;
use scene::asset::{Asset, AssetMap};
use scene::material::CpuMaterial;
use scene::mesh::CpuMesh;
use scene::model::MeshNode;
use tracing::debug;

use crate::backend::{GpuHandle, RenderBackend};
use crate::error::BackendError;

/// GPU side of a model part.
#[derive(Component, Debug, Clone)]
pub struct GpuMeshNode {
    pub mesh: GpuHandle,
    pub materials: Vec<GpuHandle>,
}

/// Uploaded assets by CPU asset id, so shared meshes and materials are uploaded once.
#[derive(Resource, Default)]
pub struct GpuAssets {
    pub meshes: AssetMap<GpuHandle>,
    pub materials: AssetMap<GpuHandle>,
}

impl GpuAssets {
    pub fn len(&self) -> usize {
        self.meshes.len() + self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Uploads every part that has no GPU resources yet. Returns how many parts were uploaded.
pub fn create_gpu_meshes(
    world: &mut World,
    backend: &mut dyn RenderBackend,
) -> Result<usize, BackendError> {
    let pending: Vec<(Entity, MeshNode)> = world
        .query_filtered::<(Entity, &MeshNode), Without<GpuMeshNode>>()
        .iter(world)
        .map(|(entity, node)| (entity, node.clone()))
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    world.init_resource::<GpuAssets>();
    let mut uploaded = Vec::with_capacity(pending.len());
    {
        let mut assets = world.resource_mut::<GpuAssets>();
        for (entity, node) in &pending {
            let mesh = create_gpu_mesh(&mut assets.meshes, &node.mesh, backend)?;
            let materials = node
                .materials
                .iter()
                .map(|material| create_gpu_material(&mut assets.materials, material, backend))
                .collect::<Result<Vec<_>, _>>()?;
            uploaded.push((*entity, GpuMeshNode { mesh, materials }));
        }
    }

    let count = uploaded.len();
    for (entity, gpu_mesh_node) in uploaded {
        world.entity_mut(entity).insert(gpu_mesh_node);
    }
    debug!(parts = count, "uploaded model parts");
    Ok(count)
}

fn create_gpu_mesh(
    mesh_assets: &mut AssetMap<GpuHandle>,
    mesh: &CpuMesh,
    backend: &mut dyn RenderBackend,
) -> Result<GpuHandle, BackendError> {
    if let Some(handle) = mesh_assets.get(&mesh.id()) {
        return Ok(*handle);
    }
    let handle = backend.upload_mesh(mesh)?;
    mesh_assets.insert(mesh.id(), handle);
    Ok(handle)
}

fn create_gpu_material(
    material_assets: &mut AssetMap<GpuHandle>,
    material: &CpuMaterial,
    backend: &mut dyn RenderBackend,
) -> Result<GpuHandle, BackendError> {
    if let Some(handle) = material_assets.get(&material.id()) {
        return Ok(*handle);
    }
    let handle = backend.upload_material(material)?;
    material_assets.insert(material.id(), handle);
    Ok(handle)
}

/// Releases every uploaded mesh and material and detaches them from their parts.
pub fn release_gpu_assets(world: &mut World, backend: &mut dyn RenderBackend) -> usize {
    let entities: Vec<Entity> = world
        .query_filtered::<Entity, With<GpuMeshNode>>()
        .iter(world)
        .collect();
    for entity in entities {
        world.entity_mut(entity).remove::<GpuMeshNode>();
    }

    let Some(mut assets) = world.get_resource_mut::<GpuAssets>() else {
        return 0;
    };
    let assets = &mut *assets;
    let handles: Vec<GpuHandle> = assets
        .meshes
        .drain()
        .chain(assets.materials.drain())
        .map(|(_, handle)| handle)
        .collect();
    for handle in &handles {
        backend.release(*handle);
    }
    handles.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use scene::material::MaterialSlot;
    use scene::transform::Transform;
    use std::sync::Arc;

    #[test]
    fn test_shared_assets_are_uploaded_once() {
        let mut world = World::new();
        let mesh = CpuMesh::cube(1.0, 1.0, 1.0);
        let material = Arc::new(CpuMaterial::default());
        for _ in 0..3 {
            world.spawn((
                Transform::default(),
                MeshNode {
                    name: None,
                    mesh: mesh.clone(),
                    materials: MaterialSlot::Single(material.clone()),
                },
            ));
        }

        let mut backend = HeadlessBackend::new();
        let stats = backend.stats();
        assert_eq!(create_gpu_meshes(&mut world, &mut backend).unwrap(), 3);
        assert_eq!(create_gpu_meshes(&mut world, &mut backend).unwrap(), 0);
        assert_eq!(stats.borrow().meshes_uploaded, 1);
        assert_eq!(stats.borrow().materials_uploaded, 1);

        assert_eq!(release_gpu_assets(&mut world, &mut backend), 2);
        assert!(stats.borrow().live_handles.is_empty());
        assert!(world.resource::<GpuAssets>().is_empty());
    }
}

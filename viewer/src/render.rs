use bevy_ecs::prelude::*;
use scene::light::{CastShadow, LightingRig, ReceiveShadow};
use scene::model::MeshNode;
use scene::transform::Transform;
use time::time::FrameStats;

use crate::backend::{DrawItem, DrawMaterial, FrameDescription, RenderBackend};
use crate::camera::Camera;
use crate::error::BackendError;
use crate::gpu_resources::GpuMeshNode;
use crate::helpers::SceneHelpers;

/// Collects the drawable state of the world. Parts that are not uploaded yet are left out.
pub fn describe_frame(world: &mut World) -> FrameDescription {
    let items = world
        .query::<(
            &Transform,
            &MeshNode,
            &GpuMeshNode,
            Option<&CastShadow>,
            Option<&ReceiveShadow>,
        )>()
        .iter(world)
        .map(
            |(transform, node, gpu_node, cast_shadow, receive_shadow)| DrawItem {
                mesh: gpu_node.mesh,
                materials: gpu_node
                    .materials
                    .iter()
                    .zip(node.materials.iter())
                    .map(|(handle, material)| DrawMaterial {
                        handle: *handle,
                        wireframe: material.wireframe,
                    })
                    .collect(),
                world_matrix: transform.to_matrix(),
                cast_shadow: cast_shadow.is_some(),
                receive_shadow: receive_shadow.is_some(),
            },
        )
        .collect();

    let camera = world.resource::<Camera>();
    let helpers = world.resource::<SceneHelpers>();

    FrameDescription {
        view: *camera.view(),
        projection: *camera.proj(),
        camera_position: camera.position,
        lights: world.resource::<LightingRig>().clone(),
        background: helpers.background,
        show_grid: helpers.show_grid,
        show_axes: helpers.show_axes,
        stats: helpers
            .show_stats
            .then(|| world.resource::<FrameStats>().clone()),
        items,
    }
}

pub fn render_frame(world: &mut World, backend: &mut dyn RenderBackend) -> Result<(), BackendError> {
    let frame = describe_frame(world);
    backend.render(&frame)
}

use angle::Deg;
use app::core_stage::CoreStage;
use app::plugin::{Plugin, PluginAppAccess};
use bevy_ecs::prelude::*;
use time::time::TimePlugin;

use crate::camera::{update_camera, Camera};
use crate::config::ViewerConfiguration;
use crate::controls::{update_orbit_controls, OrbitControls};
use crate::gpu_resources::GpuAssets;
use crate::helpers::SceneHelpers;

/// Camera, orbit controls, lights and helpers of a viewer scene.
pub struct ViewerPlugin {
    pub config: ViewerConfiguration,
    pub aspect_ratio: f32,
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewerPluginSet {
    UpdateControls,
    UpdateCamera,
}

impl Plugin for ViewerPlugin {
    fn build(&mut self, app: &mut PluginAppAccess) {
        let camera_config = &self.config.camera;
        let camera = Camera::new(
            camera_config.default_position,
            camera_config.default_target,
            self.aspect_ratio,
            Deg(camera_config.fov),
            camera_config.near,
            camera_config.far,
        );

        app.with_plugin(TimePlugin)
            .with_resource(camera)
            .with_resource(OrbitControls::new(camera_config))
            .with_resource(self.config.lighting.clone())
            .with_resource(SceneHelpers::from(&self.config.helpers))
            .with_resource(GpuAssets::default())
            .with_system(update_orbit_controls.in_set(ViewerPluginSet::UpdateControls))
            .with_staged_system(
                CoreStage::EndFrame,
                update_camera.in_set(ViewerPluginSet::UpdateCamera),
            );
    }
}

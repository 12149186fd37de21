use bevy_ecs::prelude::*;
use nalgebra::Vector3;

use crate::config::HelperConfig;

/// Background and the optional grid, axes and stats overlays.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct SceneHelpers {
    pub background: Vector3<f32>,
    pub show_grid: bool,
    pub show_axes: bool,
    pub show_stats: bool,
}

impl From<&HelperConfig> for SceneHelpers {
    fn from(config: &HelperConfig) -> Self {
        Self {
            background: config.background,
            show_grid: config.show_grid,
            show_axes: config.show_axes,
            show_stats: config.show_stats,
        }
    }
}

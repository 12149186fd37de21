use loader::config_loader::{ConfigError, LoadableConfig};
use loader::format::ModelFormat;
use nalgebra::{Point3, Vector3};
use scene::light::LightingRig;
use serde::{Deserialize, Serialize};

/// Everything that differs between viewer pages. Fixed once a session is initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfiguration {
    pub container_id: String,
    /// In bytes.
    pub max_file_size: u64,
    /// URL loads are only checked against `max_file_size` when this is set.
    pub enforce_size_limit_for_urls: bool,
    pub accepted_formats: Vec<ModelFormat>,
    pub camera: CameraConfig,
    pub lighting: LightingRig,
    pub model: ModelConfig,
    pub helpers: HelperConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub default_position: Point3<f32>,
    pub default_target: Point3<f32>,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Radians, measured from the up axis.
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_zoom: bool,
    pub enable_pan: bool,
    pub enable_rotate: bool,
    pub auto_rotate: bool,
    /// One turn every 60 seconds at 1.0.
    pub auto_rotate_speed: f32,
    /// Height of the camera above the model center after a fit, relative to the fit distance.
    pub fit_elevation: f32,
    /// Extra distance on top of the fit distance.
    pub fit_padding: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Models larger than this along any axis are scaled down to fit.
    pub max_dimension: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub background: Vector3<f32>,
    pub show_grid: bool,
    pub grid_size: f32,
    pub grid_divisions: u32,
    pub show_axes: bool,
    pub axes_size: f32,
    pub show_stats: bool,
}

impl Default for ViewerConfiguration {
    fn default() -> Self {
        Self {
            container_id: "viewer3D".to_string(),
            max_file_size: 100_000_000,
            enforce_size_limit_for_urls: false,
            accepted_formats: ModelFormat::ALL.to_vec(),
            camera: CameraConfig::default(),
            lighting: LightingRig::default(),
            model: ModelConfig::default(),
            helpers: HelperConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
            default_position: Point3::new(5.0, 5.0, 5.0),
            default_target: Point3::origin(),
            min_distance: 1.0,
            max_distance: 100.0,
            min_polar_angle: 0.0,
            max_polar_angle: std::f32::consts::PI,
            enable_damping: true,
            damping_factor: 0.05,
            enable_zoom: true,
            enable_pan: true,
            enable_rotate: true,
            auto_rotate: false,
            auto_rotate_speed: 2.0,
            fit_elevation: 0.5,
            fit_padding: 1.5,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_dimension: Some(10.0),
        }
    }
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            background: Vector3::new(0.118, 0.161, 0.231),
            show_grid: true,
            grid_size: 20.0,
            grid_divisions: 20,
            show_axes: true,
            axes_size: 5.0,
            show_stats: false,
        }
    }
}

impl LoadableConfig for ViewerConfiguration {}

impl ViewerConfiguration {
    pub fn accepts(&self, format: ModelFormat) -> bool {
        self.accepted_formats.contains(&format)
    }

    pub fn accepted_extensions(&self) -> Vec<&'static str> {
        self.accepted_formats
            .iter()
            .map(|format| format.extension())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));
        let camera = &self.camera;

        if self.container_id.is_empty() {
            return invalid("container_id is empty");
        }
        if self.max_file_size == 0 {
            return invalid("max_file_size must be larger than zero");
        }
        if self.accepted_formats.is_empty() {
            return invalid("no accepted formats");
        }
        if !(camera.fov > 0.0 && camera.fov < 180.0) {
            return invalid("camera.fov must be between 0 and 180 degrees");
        }
        if !(camera.near > 0.0 && camera.far > camera.near) {
            return invalid("camera.near must be positive and smaller than camera.far");
        }
        if !(camera.min_distance >= 0.0 && camera.max_distance >= camera.min_distance) {
            return invalid("camera distance limits are out of order");
        }
        let polar = 0.0..=std::f32::consts::PI;
        if !(polar.contains(&camera.min_polar_angle)
            && polar.contains(&camera.max_polar_angle)
            && camera.min_polar_angle <= camera.max_polar_angle)
        {
            return invalid("camera polar angles must be ordered within [0, pi]");
        }
        if !(camera.damping_factor > 0.0 && camera.damping_factor <= 1.0) {
            return invalid("camera.damping_factor must be in (0, 1]");
        }
        if !(camera.fit_padding >= 1.0) {
            return invalid("camera.fit_padding must be at least 1");
        }
        if matches!(self.model.max_dimension, Some(max) if !(max > 0.0)) {
            return invalid("model.max_dimension must be positive");
        }
        Ok(())
    }
}

use bevy_ecs::prelude::*;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub color: Vector3<f32>,
    pub intensity: f32,
}

/// Orthographic shadow camera used by a shadow casting directional light.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowSettings {
    pub map_size: u32,
    pub near: f32,
    pub far: f32,
    /// Half width of the shadow camera frustum.
    pub extent: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub color: Vector3<f32>,
    pub intensity: f32,
    pub position: Point3<f32>,
    pub shadow: Option<ShadowSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub color: Vector3<f32>,
    pub range: f32,
    pub intensity: f32,
    pub position: Point3<f32>,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Vector3::new(1.0, 1.0, 1.0),
            intensity: 0.5,
        }
    }
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            map_size: 2048,
            near: 0.5,
            far: 50.0,
            extent: 10.0,
        }
    }
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vector3::new(1.0, 1.0, 1.0),
            range: 100.0,
            intensity: 0.5,
            position: Point3::new(0.0, 10.0, 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightName {
    Ambient,
    Key,
    Fill,
    Accent,
}

/// The fixed set of lights a viewer scene is lit with.
/// Only the intensities change after setup.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightingRig {
    pub ambient: AmbientLight,
    pub key: DirectionalLight,
    pub fill: DirectionalLight,
    pub accent: Option<PointLight>,
}

impl LightingRig {
    pub fn intensity(&self, which: LightName) -> Option<f32> {
        match which {
            LightName::Ambient => Some(self.ambient.intensity),
            LightName::Key => Some(self.key.intensity),
            LightName::Fill => Some(self.fill.intensity),
            LightName::Accent => self.accent.as_ref().map(|light| light.intensity),
        }
    }

    /// Returns false when the rig has no light of that name.
    pub fn set_intensity(&mut self, which: LightName, intensity: f32) -> bool {
        match which {
            LightName::Ambient => self.ambient.intensity = intensity,
            LightName::Key => self.key.intensity = intensity,
            LightName::Fill => self.fill.intensity = intensity,
            LightName::Accent => match self.accent.as_mut() {
                Some(light) => light.intensity = intensity,
                None => return false,
            },
        }
        true
    }
}

impl Default for LightingRig {
    fn default() -> Self {
        Self {
            ambient: AmbientLight::default(),
            key: DirectionalLight {
                color: Vector3::new(1.0, 1.0, 1.0),
                intensity: 1.0,
                position: Point3::new(10.0, 10.0, 5.0),
                shadow: Some(ShadowSettings::default()),
            },
            fill: DirectionalLight {
                color: Vector3::new(1.0, 1.0, 1.0),
                intensity: 0.3,
                position: Point3::new(-5.0, 5.0, -5.0),
                shadow: None,
            },
            accent: Some(PointLight {
                color: Vector3::new(0.29, 0.565, 0.886),
                ..PointLight::default()
            }),
        }
    }
}

#[derive(Component)]
pub struct CastShadow;

#[derive(Component)]
pub struct ReceiveShadow;

use std::f32::consts::PI;

use bevy_ecs::prelude::*;
use nalgebra::{Point3, Vector3};
use time::time::Time;

use crate::camera::Camera;
use crate::config::CameraConfig;

const EPS: f32 = 0.000001;

/// Input for the orbit controls, already converted from pointer movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrbitInput {
    /// Radians around the target, left and up.
    Rotate { left: f32, up: f32 },
    /// Multiplies the distance to the target, values above one move away.
    Zoom { scale: f32 },
    /// World units along the camera's right and up axes.
    Pan { right: f32, up: f32 },
}

/// Orbits the camera around a target on a sphere. Input is collected between
/// frames and applied with damping by `update_orbit_controls`.
#[derive(Resource, Debug, Clone)]
pub struct OrbitControls {
    pub target: Point3<f32>,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_zoom: bool,
    pub enable_pan: bool,
    pub enable_rotate: bool,
    pub auto_rotate: bool,
    pub auto_rotate_speed: f32,

    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    pan_offset: Vector3<f32>,
}

impl OrbitControls {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            target: config.default_target,
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            min_polar_angle: config.min_polar_angle,
            max_polar_angle: config.max_polar_angle,
            enable_damping: config.enable_damping,
            damping_factor: config.damping_factor,
            enable_zoom: config.enable_zoom,
            enable_pan: config.enable_pan,
            enable_rotate: config.enable_rotate,
            auto_rotate: config.auto_rotate,
            auto_rotate_speed: config.auto_rotate_speed,

            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            pan_offset: Vector3::zeros(),
        }
    }

    pub fn handle_input(&mut self, input: OrbitInput) {
        match input {
            OrbitInput::Rotate { left, up } if self.enable_rotate => {
                self.theta_delta -= left;
                self.phi_delta -= up;
            }
            OrbitInput::Zoom { scale } if self.enable_zoom && scale > 0.0 => {
                self.scale *= scale;
            }
            OrbitInput::Pan { right, up } if self.enable_pan => {
                self.pan_offset += Vector3::new(right, up, 0.0);
            }
            _ => {}
        }
    }

    /// Drops input that has not been applied yet.
    pub fn stop(&mut self) {
        self.theta_delta = 0.0;
        self.phi_delta = 0.0;
        self.scale = 1.0;
        self.pan_offset = Vector3::zeros();
    }

    /// Radians per second.
    pub fn auto_rotation_rate(&self) -> f32 {
        2.0 * PI / 60.0 * self.auto_rotate_speed
    }

    fn polar_limits(&self) -> (f32, f32) {
        (
            self.min_polar_angle.max(EPS),
            self.max_polar_angle.min(PI - EPS),
        )
    }

    /// Moves the camera according to the pending input. Returns whether it moved.
    pub fn update(&mut self, camera: &mut Camera, delta_seconds: f32) -> bool {
        let offset = camera.position - self.target;
        let mut radius = offset.norm();
        let (mut theta, mut phi) = if radius > EPS {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        } else {
            radius = self.min_distance.max(EPS);
            (0.0, PI / 2.0)
        };

        if self.auto_rotate && self.enable_rotate {
            theta -= self.auto_rotation_rate() * delta_seconds;
        }

        let damping = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };
        theta += self.theta_delta * damping;
        phi += self.phi_delta * damping;

        let (min_phi, max_phi) = self.polar_limits();
        phi = phi.clamp(min_phi, max_phi);

        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);

        // Pan along the camera's own axes
        let forward = (-offset).try_normalize(EPS).unwrap_or_else(|| -Vector3::z());
        let right = forward
            .cross(&Camera::up().into_inner())
            .try_normalize(EPS)
            .unwrap_or_else(Vector3::x);
        let up = right.cross(&forward);
        self.target += (right * self.pan_offset.x + up * self.pan_offset.y) * damping;

        let sin_phi_radius = phi.sin() * radius;
        let new_offset = Vector3::new(
            sin_phi_radius * theta.sin(),
            phi.cos() * radius,
            sin_phi_radius * theta.cos(),
        );
        let new_position = self.target + new_offset;

        if self.enable_damping {
            self.theta_delta *= 1.0 - self.damping_factor;
            self.phi_delta *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.theta_delta = 0.0;
            self.phi_delta = 0.0;
            self.pan_offset = Vector3::zeros();
        }
        self.scale = 1.0;

        let moved = (new_position - camera.position).norm_squared() > EPS
            || (camera.target - self.target).norm_squared() > EPS;
        camera.position = new_position;
        camera.target = self.target;
        moved
    }
}

pub fn update_orbit_controls(
    time: Res<Time>,
    mut controls: ResMut<OrbitControls>,
    mut camera: ResMut<Camera>,
) {
    controls.update(&mut camera, time.delta_seconds());
}

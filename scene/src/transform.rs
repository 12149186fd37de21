use bevy_ecs::prelude::*;
use nalgebra::{Matrix3, Matrix4, Point3, UnitQuaternion, Vector3};
use std::ops::{Add, Mul};

/// Translation, rotation and scale, applied in scale -> rotate -> translate order.
#[derive(Component, Clone, Debug, PartialEq)]
pub struct Transform {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    pub fn to_matrix(&self) -> Matrix4<f32> {
        let translation = Matrix4::new_translation(&self.position.coords);
        let rotation = Matrix4::from(self.rotation);
        let scaling = Matrix4::new_nonuniform_scaling(&self.scale);

        translation * rotation * scaling
    }

    /// Splits an affine matrix into its parts. Shear is lost.
    pub fn from_matrix(matrix: &Matrix4<f32>) -> Transform {
        let position = Point3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)]);

        let linear: Matrix3<f32> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let scale = Vector3::new(
            linear.column(0).norm(),
            linear.column(1).norm(),
            linear.column(2).norm(),
        );

        let mut rotation_matrix = linear;
        for (axis, length) in scale.iter().enumerate() {
            if *length > f32::EPSILON {
                rotation_matrix.column_mut(axis).scale_mut(1.0 / length);
            }
        }

        Transform {
            position,
            rotation: UnitQuaternion::from_matrix(&rotation_matrix),
            scale,
        }
    }

    /// `None` when the matrix has shear or a mirror, which a `Transform` cannot hold.
    pub fn try_from_matrix(matrix: &Matrix4<f32>) -> Option<Transform> {
        let transform = Self::from_matrix(matrix);
        let tolerance = 1e-4 * matrix.amax().max(1.0);
        ((transform.to_matrix() - matrix).amax() <= tolerance).then_some(transform)
    }

    pub fn transform_point(&self, transform_point: &Point3<f32>) -> Point3<f32> {
        let scaled_position: Vector3<f32> = transform_point.coords.component_mul(&self.scale);
        let rotated_position: Vector3<f32> = self.rotation * scaled_position;
        let translated_position: Vector3<f32> = rotated_position.add(&self.position.coords);

        translated_position.into()
    }
}

impl Mul<Transform> for &Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Self::Output {
        Transform {
            position: self.transform_point(&rhs.position),
            rotation: self.rotation * rhs.rotation,
            scale: self.scale.component_mul(&rhs.scale),
        }
    }
}

pub struct TransformBuilder {
    position: Point3<f32>,
    rotation: UnitQuaternion<f32>,
    scale: Vector3<f32>,
}

impl TransformBuilder {
    pub fn new() -> Self {
        Self {
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn position(mut self, position: Point3<f32>) -> Self {
        self.position = position;

        self
    }

    pub fn rotation(mut self, rotation: UnitQuaternion<f32>) -> Self {
        self.rotation = rotation;

        self
    }

    pub fn scale(mut self, scale: Vector3<f32>) -> Self {
        self.scale = scale;

        self
    }

    pub fn uniform_scale(self, scale: f32) -> Self {
        self.scale(Vector3::new(scale, scale, scale))
    }

    pub fn build(self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }
}

impl Default for TransformBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_round_trip_keeps_parts() {
        let transform = TransformBuilder::new()
            .position(Point3::new(1.0, -2.0, 3.0))
            .rotation(UnitQuaternion::from_euler_angles(0.3, 0.2, 0.1))
            .scale(Vector3::new(2.0, 2.0, 0.5))
            .build();

        let decomposed = Transform::from_matrix(&transform.to_matrix());
        assert!((decomposed.position - transform.position).norm() < 1e-5);
        assert!((decomposed.scale - transform.scale).norm() < 1e-5);
        assert!(decomposed.rotation.angle_to(&transform.rotation) < 1e-3);
    }

    #[test]
    fn test_sheared_and_mirrored_matrices_are_not_transforms() {
        let stretched = Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 1.0, 1.0));
        let rotated = Matrix4::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_4);
        assert!(Transform::try_from_matrix(&(stretched * rotated)).is_none());
        assert!(Transform::try_from_matrix(&Matrix4::new_nonuniform_scaling(&Vector3::new(
            -1.0, 1.0, 1.0
        )))
        .is_none());

        let plain = rotated * stretched;
        let transform = Transform::try_from_matrix(&plain).unwrap();
        assert!((transform.to_matrix() - plain).amax() < 1e-5);
    }

    #[test]
    fn test_parent_times_child_matches_matrices() {
        let parent = TransformBuilder::new()
            .position(Point3::new(0.0, 1.0, 0.0))
            .uniform_scale(2.0)
            .build();
        let child = TransformBuilder::new()
            .position(Point3::new(1.0, 0.0, 0.0))
            .build();

        let combined = &parent * child.clone();
        let expected = parent.to_matrix() * child.to_matrix();
        let point = Point3::new(0.5, 0.5, 0.5);
        let via_transform = combined.transform_point(&point);
        let via_matrix = expected.transform_point(&point);
        assert!((via_transform - via_matrix).norm() < 1e-5);
    }
}

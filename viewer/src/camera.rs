use angle::{Angle, Deg, Rad};
use bevy_ecs::prelude::*;
use math::bounding_box::BoundingBox;
use nalgebra::{vector, Matrix, Matrix4, Point3, UnitVector3, Vector3};

#[derive(Resource, Debug, Clone)]
pub struct Camera {
    view: Matrix4<f32>,
    proj: Matrix4<f32>,

    pub position: Point3<f32>,
    pub target: Point3<f32>,

    fov: Deg<f32>,
    aspect_ratio: f32,
    near: f32,
    far: f32,
}

impl Camera {
    pub fn new(
        position: Point3<f32>,
        target: Point3<f32>,
        aspect_ratio: f32,
        fov: Deg<f32>,
        near: f32,
        far: f32,
    ) -> Self {
        Camera {
            proj: calculate_projection(aspect_ratio, Rad::from(fov), near, far),
            view: calculate_view(position, target),

            position,
            target,
            fov,
            aspect_ratio,
            near,
            far,
        }
    }

    pub fn update_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.proj[(0, 0)] = -self.proj[(1, 1)] / aspect_ratio;
    }

    pub fn view(&self) -> &Matrix4<f32> {
        &self.view
    }

    pub fn proj(&self) -> &Matrix4<f32> {
        &self.proj
    }

    pub fn fov(&self) -> Deg<f32> {
        self.fov
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn distance_to_target(&self) -> f32 {
        (self.position - self.target).norm()
    }

    pub fn look_at(&mut self, position: Point3<f32>, target: Point3<f32>) {
        self.position = position;
        self.target = target;
        self.update();
    }

    pub fn update(&mut self) {
        self.view = calculate_view(self.position, self.target);
    }

    /// in world-space
    pub const fn up() -> UnitVector3<f32> {
        UnitVector3::new_unchecked(vector![0.0, 1.0, 0.0])
    }
}

pub fn update_camera(mut camera: ResMut<Camera>) {
    camera.update();
}

/// Distance at which a box of `max_dimension` fills the view, both vertically
/// and, for narrow views, horizontally.
pub fn fit_distance(max_dimension: f32, fov: Deg<f32>, aspect_ratio: f32) -> f32 {
    let half_fov = Rad::<f32>::from(fov).value() / 2.0;
    let fit_height = max_dimension / (2.0 * half_fov.tan());
    let fit_width = fit_height / aspect_ratio;
    fit_height.max(fit_width)
}

/// Where the camera goes to frame `bounds`. `None` when there is nothing to frame.
pub fn fit_position(
    camera: &Camera,
    bounds: &BoundingBox<Vector3<f32>>,
    elevation: f32,
    padding: f32,
) -> Option<(Point3<f32>, Point3<f32>)> {
    let max_dimension = bounds.max_dimension();
    if bounds.is_empty() || max_dimension <= 0.0 {
        return None;
    }

    let distance = fit_distance(max_dimension, camera.fov(), camera.aspect_ratio());
    let center = Point3::from(bounds.center());
    let position = center + Vector3::new(0.0, distance * elevation, distance * padding);
    Some((position, center))
}

fn calculate_projection(aspect_ratio: f32, fov: Rad<f32>, near: f32, far: f32) -> Matrix4<f32> {
    // https://johannesugb.github.io/gpu-programming/setting-up-a-proper-vulkan-projection-matrix/
    // Note that this projection matrix is already multiplied by the X matrix
    let mut projection = Matrix4::identity();

    let tan_half_fov = (fov.value() / 2.0).tan();

    projection[(0, 0)] = 1.0 / (tan_half_fov * aspect_ratio);
    projection[(1, 1)] = -1.0 / tan_half_fov;

    projection[(2, 2)] = far / (near - far);
    projection[(2, 3)] = (near * far) / (near - far);

    projection[(3, 3)] = 0.0;
    projection[(3, 2)] = -1.0;

    projection
}

fn calculate_view(position: Point3<f32>, target: Point3<f32>) -> Matrix4<f32> {
    Matrix::look_at_rh(&position, &target, &Camera::up())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_ratio_update_matches_fresh_projection() {
        let mut camera = Camera::new(
            Point3::new(0.0, 0.0, 5.0),
            Point3::origin(),
            800.0 / 600.0,
            Deg(75.0),
            0.1,
            1000.0,
        );
        camera.update_aspect_ratio(400.0 / 300.0 * 2.0);

        let fresh = Camera::new(
            Point3::new(0.0, 0.0, 5.0),
            Point3::origin(),
            400.0 / 300.0 * 2.0,
            Deg(75.0),
            0.1,
            1000.0,
        );
        assert!((camera.proj() - fresh.proj()).norm() < 1e-6);
    }

    #[test]
    fn test_fit_distance_accounts_for_narrow_views() {
        let wide = fit_distance(2.0, Deg(90.0), 2.0);
        assert!((wide - 1.0).abs() < 1e-5);

        let narrow = fit_distance(2.0, Deg(90.0), 0.5);
        assert!((narrow - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_fit_position_above_and_in_front() {
        let camera = Camera::new(
            Point3::new(5.0, 5.0, 5.0),
            Point3::origin(),
            1.0,
            Deg(90.0),
            0.1,
            100.0,
        );
        let bounds = BoundingBox::new(Vector3::new(1.0, 1.0, 1.0), Vector3::new(3.0, 3.0, 3.0));

        let (position, target) = fit_position(&camera, &bounds, 0.5, 1.0).unwrap();
        assert_eq!(target, Point3::new(2.0, 2.0, 2.0));
        assert!((position - Point3::new(2.0, 2.5, 3.0)).norm() < 1e-5);

        assert!(fit_position(&camera, &BoundingBox::empty(), 0.5, 1.0).is_none());
    }
}

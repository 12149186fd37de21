use nalgebra::{Matrix4, Point3, Vector3};

#[derive(Clone, Debug, PartialEq)]
pub struct BoundingBox<T> {
    /// Minimum value.
    pub min: T,

    /// Maximum value.
    pub max: T,
}

impl<T> BoundingBox<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl BoundingBox<Vector3<f32>> {
    pub fn combine(&self, other: &BoundingBox<Vector3<f32>>) -> BoundingBox<Vector3<f32>> {
        BoundingBox {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    pub fn empty() -> BoundingBox<Vector3<f32>> {
        BoundingBox {
            min: Vector3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Vector3::new(-f32::INFINITY, -f32::INFINITY, -f32::INFINITY),
        }
    }

    pub fn from_points<I>(points: I) -> BoundingBox<Vector3<f32>>
    where
        I: IntoIterator<Item = Vector3<f32>>,
    {
        points
            .into_iter()
            .fold(BoundingBox::empty(), |bounds, point| bounds.extend(&point))
    }

    pub fn extend(&self, point: &Vector3<f32>) -> BoundingBox<Vector3<f32>> {
        BoundingBox {
            min: self.min.inf(point),
            max: self.max.sup(point),
        }
    }

    /// True when no point has been added yet, or when min > max on any axis.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) / 2.0
    }

    /// Largest extent along any axis. Zero for an empty box.
    pub fn max_dimension(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.size().max()
    }

    pub fn translate(&self, offset: &Vector3<f32>) -> BoundingBox<Vector3<f32>> {
        BoundingBox {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Axis-aligned box around all eight corners after the transform.
    pub fn transform(&self, matrix: &Matrix4<f32>) -> BoundingBox<Vector3<f32>> {
        if self.is_empty() {
            return BoundingBox::empty();
        }

        self.corners()
            .iter()
            .map(|corner| matrix.transform_point(&Point3::from(*corner)).coords)
            .fold(BoundingBox::empty(), |bounds, point| bounds.extend(&point))
    }

    pub fn corners(&self) -> [Vector3<f32>; 8] {
        let (min, max) = (self.min, self.max);
        [
            Vector3::new(min.x, min.y, min.z),
            Vector3::new(max.x, min.y, min.z),
            Vector3::new(min.x, max.y, min.z),
            Vector3::new(max.x, max.y, min.z),
            Vector3::new(min.x, min.y, max.z),
            Vector3::new(max.x, min.y, max.z),
            Vector3::new(min.x, max.y, max.z),
            Vector3::new(max.x, max.y, max.z),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_box_has_no_extent() {
        let bounds = BoundingBox::empty();
        assert!(bounds.is_empty());
        assert_eq!(bounds.max_dimension(), 0.0);
        assert!(bounds.transform(&Matrix4::identity()).is_empty());
    }

    #[test]
    fn test_center_and_size() {
        let bounds = BoundingBox::from_points([
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(3.0, 6.0, 4.0),
            Vector3::new(2.0, 4.0, 3.5),
        ]);
        assert!(!bounds.is_empty());
        assert_eq!(bounds.center(), Vector3::new(2.0, 4.0, 3.5));
        assert_eq!(bounds.size(), Vector3::new(2.0, 4.0, 1.0));
        assert_eq!(bounds.max_dimension(), 4.0);
    }

    #[test]
    fn test_transform_covers_rotated_corners() {
        let bounds = BoundingBox::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0));
        let rotation = Matrix4::from_euler_angles(0.0, std::f32::consts::FRAC_PI_4, 0.0);
        let rotated = bounds.transform(&rotation);
        let half_diagonal = 2.0f32.sqrt();
        assert!((rotated.max.x - half_diagonal).abs() < 1e-5);
        assert!((rotated.max.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_combine_and_translate() {
        let a = BoundingBox::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let b = BoundingBox::new(Vector3::new(-2.0, 0.5, 0.0), Vector3::new(0.0, 3.0, 0.5));
        let combined = a.combine(&b);
        assert_eq!(combined.min, Vector3::new(-2.0, 0.0, 0.0));
        assert_eq!(combined.max, Vector3::new(1.0, 3.0, 1.0));

        let moved = combined.translate(&-combined.center());
        assert!(moved.center().norm() < 1e-6);
    }
}

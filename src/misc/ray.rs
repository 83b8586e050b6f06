use nalgebra::{Point3, Vector3};

use crate::misc::FloatingPoint;

/// A ray in 3D space.
#[derive(Clone, Debug)]
pub struct Ray<T: FloatingPoint> {
    origin: Point3<T>,
    direction: Vector3<T>,
}

/// The intersection of two rays: the closest point and parameter on each ray.
pub struct RayIntersection<T: FloatingPoint> {
    pub(crate) intersection0: (Point3<T>, T),
    #[allow(unused)]
    pub(crate) intersection1: (Point3<T>, T),
}

impl<T: FloatingPoint> Ray<T> {
    pub fn new(origin: Point3<T>, direction: Vector3<T>) -> Self {
        Self { origin, direction }
    }

    pub fn origin(&self) -> &Point3<T> {
        &self.origin
    }

    pub fn direction(&self) -> &Vector3<T> {
        &self.direction
    }

    pub fn point_at(&self, t: T) -> Point3<T> {
        self.origin + self.direction * t
    }

    /// Finds the intersection between two rays.
    /// Returns `None` when the rays are parallel.
    pub fn find_intersection(&self, other: &Self) -> Option<RayIntersection<T>> {
        let dab = self.direction.dot(other.direction());
        let daa = self.direction.dot(&self.direction);
        let dbb = other.direction().dot(other.direction());
        let div = daa * dbb - dab * dab;

        if div.abs() < T::default_epsilon() {
            return None;
        }

        let dab0 = self.direction.dot(&other.origin().coords);
        let daa0 = self.direction.dot(&self.origin.coords);
        let dbb0 = other.direction().dot(&other.origin().coords);
        let dba0 = other.direction().dot(&self.origin.coords);

        let num = dab * (dab0 - daa0) - daa * (dbb0 - dba0);
        let w = num / div;
        let t = (dab0 - daa0 + w * dab) / daa;

        Some(RayIntersection {
            intersection0: (self.point_at(t), t),
            intersection1: (other.point_at(w), w),
        })
    }
}

use nalgebra::{Point3, Vector3};

use super::FloatingPoint;

/// Find the closest point on a segment
/// * `pt` - point to project
/// * `start` - start point of segment
/// * `end` - end point of segment
/// * `u0` - first param of segment
/// * `u1` - second param of segment
pub fn segment_closest_point<T: FloatingPoint>(
    pt: &Point3<T>,
    start: &Point3<T>,
    end: &Point3<T>,
    u0: T,
    u1: T,
) -> (T, Point3<T>) {
    let dif = end - start;
    let l = dif.norm();

    if l < T::default_epsilon() {
        return (u0, *start);
    }

    let o = start;
    let r = dif / l;
    let o2pt = pt - o;
    let do2ptr = o2pt.dot(&r);

    if do2ptr < T::zero() {
        (u0, *start)
    } else if do2ptr > l {
        (u1, *end)
    } else {
        (u0 + (u1 - u0) * do2ptr / l, o + r * do2ptr)
    }
}

/// Project a point orthogonally onto a line given by an origin and a direction.
pub fn point_to_line_foot<T: FloatingPoint>(
    origin: &Point3<T>,
    direction: &Vector3<T>,
    point: &Point3<T>,
) -> Point3<T> {
    let d = direction.normalize();
    origin + d * (point - origin).dot(&d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_point_to_line_foot() {
        let foot = point_to_line_foot(
            &Point3::new(0., 0., -5.),
            &Vector3::new(0., 0., 3.),
            &Point3::new(1., 2., 4.),
        );
        assert_relative_eq!(foot, Point3::new(0., 0., 4.), epsilon = 1e-12);
    }

    #[test]
    fn test_segment_closest_point() {
        let p0 = Point3::new(0., 0., 0.);
        let p1 = Point3::new(2., 0., 0.);
        let (u, pt) = segment_closest_point(&Point3::new(0.5, 1., 0.), &p0, &p1, 0., 1.);
        assert_relative_eq!(u, 0.25, epsilon = 1e-12);
        assert_relative_eq!(pt, Point3::new(0.5, 0., 0.), epsilon = 1e-12);

        // projections beyond the segment clamp to the end points
        let (u, _) = segment_closest_point(&Point3::new(-1., 1., 0.), &p0, &p1, 0., 1.);
        assert_relative_eq!(u, 0.);
        let (u, _) = segment_closest_point(&Point3::new(3., 1., 0.), &p0, &p1, 0., 1.);
        assert_relative_eq!(u, 1.);
    }
}

use nalgebra::Point4;

use super::FloatingPoint;

/// Transpose a rectangular grid of control points.
pub fn transpose_control_points<T: FloatingPoint>(
    points: &[Vec<Point4<T>>],
) -> Vec<Vec<Point4<T>>> {
    let mut transposed = vec![vec![]; points[0].len()];
    points.iter().for_each(|row| {
        row.iter().enumerate().for_each(|(j, p)| {
            transposed[j].push(*p);
        })
    });
    transposed
}

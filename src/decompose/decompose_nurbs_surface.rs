use itertools::Itertools;
use nalgebra::Point4;

use crate::{
    misc::{FloatingPoint, NurbsError},
    prelude::Decompose,
    surface::{NurbsSurface, UVDirection},
};

impl<T: FloatingPoint> Decompose for NurbsSurface<T> {
    type Output = Vec<Vec<NurbsSurface<T>>>;

    /// Decompose the surface into a grid of Bezier patches of the same degrees.
    /// The outer vector runs along U, the inner along V; patch `(i, j)` covers
    /// the i-th distinct U span and the j-th distinct V span.
    fn try_decompose(&self) -> anyhow::Result<Self::Output> {
        anyhow::ensure!(
            self.u_knots().is_clamped(self.u_degree())
                && self.v_knots().is_clamped(self.v_degree()),
            NurbsError::InvalidArgument(
                "surface must be clamped to decompose into Bezier patches".into()
            )
        );

        // saturate every interior knot to degree multiplicity, U first
        let mut refined = self.clone();
        for direction in [UVDirection::U, UVDirection::V] {
            let (knots, degree) = match direction {
                UVDirection::U => (refined.u_knots(), refined.u_degree()),
                UVDirection::V => (refined.v_knots(), refined.v_degree()),
            };
            let runs = knots.multiplicity();
            let deficits = runs
                .iter()
                .skip(1)
                .take(runs.len().saturating_sub(2))
                .filter(|run| run.count < degree)
                .flat_map(|run| vec![run.knot; degree - run.count])
                .collect_vec();
            if !deficits.is_empty() {
                refined = refined.try_refine_knot(deficits, direction)?;
            }
        }

        let u_degree = refined.u_degree();
        let v_degree = refined.v_degree();
        let u_patches = refined.u_knots().multiplicity().len() - 1;
        let v_patches = refined.v_knots().multiplicity().len() - 1;

        let bezier_knots = |degree: usize| -> Vec<T> {
            std::iter::repeat(T::zero())
                .take(degree + 1)
                .chain(std::iter::repeat(T::one()).take(degree + 1))
                .collect()
        };

        Ok((0..u_patches)
            .map(|iu| {
                (0..v_patches)
                    .map(|iv| {
                        let u_start = iu * u_degree;
                        let u_end = u_start + u_degree + 1;
                        let v_start = iv * v_degree;
                        let v_end = v_start + v_degree + 1;

                        let patch_control_points: Vec<Vec<Point4<T>>> = refined.control_points()
                            [u_start..u_end]
                            .iter()
                            .map(|row| row[v_start..v_end].to_vec())
                            .collect();

                        NurbsSurface::new(
                            u_degree,
                            v_degree,
                            bezier_knots(u_degree),
                            bezier_knots(v_degree),
                            patch_control_points,
                        )
                    })
                    .collect_vec()
            })
            .collect_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point4;

    fn wavy_bicubic() -> NurbsSurface<f64> {
        let control_points = (0..7)
            .map(|i| {
                (0..7)
                    .map(|j| {
                        let z = ((i * j) % 4) as f64 * 0.25;
                        Point4::new(i as f64, j as f64, z, 1.0)
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let knots = vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 1.0, 1.0, 1.0, 1.0];
        NurbsSurface::new(3, 3, knots.clone(), knots, control_points)
    }

    #[test]
    fn bezier_decomposition_covers_each_span() {
        let surface = wavy_bicubic();
        let patches = surface.try_decompose().unwrap();

        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].len(), 2);

        for row in patches.iter() {
            for patch in row.iter() {
                assert_eq!(patch.u_degree(), 3);
                assert_eq!(patch.v_degree(), 3);
                assert_eq!(patch.control_points().len(), 4);
                assert_eq!(patch.control_points()[0].len(), 4);
                assert_eq!(patch.u_knots().len(), 8);
                assert_eq!(patch.v_knots().len(), 8);
            }
        }

        // evaluating a patch at the locally normalized parameter matches the surface
        for u in [0.0, 0.2, 0.5, 0.77, 1.0] {
            for v in [0.0, 0.31, 0.5, 0.9, 1.0] {
                let iu = if u < 0.5 { 0 } else { 1 };
                let iv = if v < 0.5 { 0 } else { 1 };
                let local_u = (u - iu as f64 * 0.5) * 2.0;
                let local_v = (v - iv as f64 * 0.5) * 2.0;
                assert_relative_eq!(
                    surface.point_at(u, v),
                    patches[iu][iv].point_at(local_u, local_v),
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn single_patch_surface_decomposes_to_itself() {
        let control_points = (0..4)
            .map(|i| {
                (0..4)
                    .map(|j| Point4::new(i as f64, j as f64, 0.0, 1.0))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let knots = vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        let surface = NurbsSurface::new(3, 3, knots.clone(), knots, control_points);

        let patches = surface.try_decompose().unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].len(), 1);

        let patch = &patches[0][0];
        assert_eq!(patch.control_points(), surface.control_points());
    }
}

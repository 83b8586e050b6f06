use itertools::Itertools;

use crate::{
    curve::NurbsCurve,
    knot::KnotVector,
    misc::{FloatingPoint, NurbsError},
    prelude::Decompose,
};

impl<T: FloatingPoint> Decompose for NurbsCurve<T> {
    type Output = Vec<NurbsCurve<T>>;

    /// Decompose the curve into Bezier segments with knot vectors normalized
    /// to [0, 1]. Segment `i` covers the i-th distinct knot span.
    fn try_decompose(&self) -> anyhow::Result<Self::Output> {
        anyhow::ensure!(
            self.is_clamped(),
            NurbsError::InvalidArgument(
                "curve must be clamped to decompose into Bezier segments".into()
            )
        );

        let degree = self.degree();

        // saturate every interior knot to degree multiplicity
        let runs = self.knots().multiplicity();
        let deficits = runs
            .iter()
            .skip(1)
            .take(runs.len().saturating_sub(2))
            .filter(|run| run.count < degree)
            .flat_map(|run| vec![run.knot; degree - run.count])
            .collect_vec();
        let refined = if deficits.is_empty() {
            self.clone()
        } else {
            self.try_refine_knot(deficits)?
        };

        let spans = refined.knots().multiplicity().len() - 1;
        let bezier_knots: Vec<T> = std::iter::repeat(T::zero())
            .take(degree + 1)
            .chain(std::iter::repeat(T::one()).take(degree + 1))
            .collect();

        Ok((0..spans)
            .map(|i| {
                let start = i * degree;
                NurbsCurve::new_unchecked(
                    degree,
                    refined.control_points()[start..=(start + degree)].to_vec(),
                    KnotVector::new(bezier_knots.clone()),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point4;

    #[test]
    fn decomposed_segments_match_the_curve() {
        let curve = NurbsCurve::try_new(
            2,
            vec![
                Point4::new(0., 0., 0., 1.),
                Point4::new(1., 1., 0., 1.),
                Point4::new(2., -1., 0., 1.),
                Point4::new(3., 0., 0., 1.),
            ],
            vec![0., 0., 0., 0.5, 1., 1., 1.],
        )
        .unwrap();

        let segments = curve.try_decompose().unwrap();
        assert_eq!(segments.len(), 2);

        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.degree(), 2);
            assert_eq!(segment.control_points().len(), 3);
            let offset = i as f64 * 0.5;
            for step in 0..=8 {
                let local = step as f64 / 8.;
                let global = offset + local * 0.5;
                assert_relative_eq!(
                    segment.point_at(local),
                    curve.point_at(global),
                    epsilon = 1e-10
                );
            }
        }
    }
}

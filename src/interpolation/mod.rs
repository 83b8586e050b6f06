//! Parameterization, knot-vector generation and linear-system helpers shared
//! by the interpolating and approximating surface constructors.

use nalgebra::{DMatrix, DVector, Point3, Vector3};

use crate::knot::KnotVector;
use crate::misc::{FloatingPoint, NurbsError};

/// Compute averaged chord-length parameters for a rectangular grid of points.
///
/// The first list runs along the rows (the U direction), the second along the
/// columns (the V direction); each is the chord-length parameterization of
/// the corresponding grid lines averaged over the orthogonal direction.
pub fn averaged_grid_parameters<T: FloatingPoint>(
    points: &[Vec<Point3<T>>],
) -> anyhow::Result<(Vec<T>, Vec<T>)> {
    anyhow::ensure!(
        !points.is_empty() && !points[0].is_empty(),
        NurbsError::InvalidArgument("point grid must not be empty".into())
    );

    let rows = points.len();
    let cols = points[0].len();
    anyhow::ensure!(
        points.iter().all(|row| row.len() == cols),
        NurbsError::InvalidArgument("point grid must be rectangular".into())
    );

    let u = averaged_parameters_along(rows, cols, |k, l| &points[k][l]);
    let v = averaged_parameters_along(cols, rows, |l, k| &points[k][l]);
    Ok((u, v))
}

fn averaged_parameters_along<'a, T: FloatingPoint>(
    count: usize,
    lines: usize,
    at: impl Fn(usize, usize) -> &'a Point3<T>,
) -> Vec<T> {
    let n = count - 1;
    let mut params = vec![T::zero(); count];
    if n == 0 {
        return params;
    }
    params[n] = T::one();

    let mut contributing = 0;
    for line in 0..lines {
        let chords: Vec<_> = (1..count)
            .map(|k| (at(k, line) - at(k - 1, line)).norm())
            .collect();
        let total: T = chords.iter().fold(T::zero(), |a, b| a + *b);
        if total <= T::default_epsilon() {
            continue;
        }
        contributing += 1;

        let mut acc = T::zero();
        for k in 1..n {
            acc += chords[k - 1];
            params[k] += acc / total;
        }
    }

    if contributing == 0 {
        // fully degenerate grid lines, fall back to a uniform spacing
        for k in 1..n {
            params[k] = T::from_usize(k).unwrap() / T::from_usize(n).unwrap();
        }
    } else {
        let inv = T::one() / T::from_usize(contributing).unwrap();
        for k in 1..n {
            params[k] *= inv;
        }
    }

    params
}

/// Build a clamped knot vector by knot averaging, the standard companion of
/// chord-length parameters for global interpolation.
pub fn averaged_knot_vector<T: FloatingPoint>(degree: usize, params: &[T]) -> KnotVector<T> {
    let n = params.len() - 1;
    let mut knots = vec![T::zero(); degree + 1];
    for j in 1..=(n - degree) {
        let mut sum = T::zero();
        for i in j..(j + degree) {
            sum += params[i];
        }
        knots.push(sum / T::from_usize(degree).unwrap());
    }
    knots.extend(std::iter::repeat(T::one()).take(degree + 1));
    KnotVector::new(knots)
}

/// Build a clamped knot vector for a least-squares fit with fewer control
/// points than data points.
pub fn approximating_knot_vector<T: FloatingPoint>(
    degree: usize,
    data_count: usize,
    control_count: usize,
    params: &[T],
) -> KnotVector<T> {
    let n = control_count - 1;
    let r = data_count - 1;
    let d = T::from_usize(r + 1).unwrap() / T::from_usize(n - degree + 1).unwrap();

    let mut knots = vec![T::zero(); degree + 1];
    for j in 1..=(n - degree) {
        let jd = T::from_usize(j).unwrap() * d;
        let i = jd.floor().to_usize().unwrap();
        let alpha = jd - T::from_usize(i).unwrap();
        knots.push(params[i - 1] * (T::one() - alpha) + params[i] * alpha);
    }
    knots.extend(std::iter::repeat(T::one()).take(degree + 1));
    KnotVector::new(knots)
}

/// Assemble the full collocation matrix of basis function values at the
/// given parameters.
pub fn interpolation_matrix<T: FloatingPoint>(
    degree: usize,
    params: &[T],
    knots: &KnotVector<T>,
) -> DMatrix<T> {
    let count = params.len();
    let n = count - 1;
    let mut m_a = DMatrix::<T>::zeros(count, count);
    for (i, u) in params.iter().enumerate() {
        let span = knots.find_knot_span_index(n, degree, *u);
        let basis = knots.basis_functions(span, *u, degree);
        for (k, b) in basis.iter().enumerate() {
            m_a[(i, span - degree + k)] = *b;
        }
    }
    m_a
}

/// Solve the interpolation system for several right-hand-side point sets,
/// sharing a single LU decomposition across all sets and spatial dimensions.
pub fn try_solve_interpolation<T: FloatingPoint>(
    m_a: DMatrix<T>,
    point_sets: &[Vec<Point3<T>>],
) -> anyhow::Result<Vec<Vec<Point3<T>>>> {
    let lu = m_a.lu();
    point_sets
        .iter()
        .map(|points| {
            let n = points.len();
            let mut solved = vec![Point3::origin(); n];
            for dim in 0..3 {
                let b = DVector::from_vec(points.iter().map(|p| p[dim]).collect());
                let xs = lu.solve(&b).ok_or(NurbsError::NonConvergence(
                    "interpolation system is singular".into(),
                ))?;
                for j in 0..n {
                    solved[j][dim] = xs[j];
                }
            }
            Ok(solved)
        })
        .collect()
}

/// Estimate parametric first derivatives at each node with Bessel's
/// parabolic scheme: the interior tangent blends adjacent divided
/// differences by the spacing ratio, the ends extrapolate.
pub fn estimate_tangents<T: FloatingPoint>(
    points: &[Point3<T>],
    params: &[T],
) -> anyhow::Result<Vec<Vector3<T>>> {
    let n = points.len();
    anyhow::ensure!(
        n >= 2 && params.len() == n,
        NurbsError::InvalidArgument("tangent estimation needs at least two points".into())
    );
    anyhow::ensure!(
        params.windows(2).all(|w| w[1] > w[0]),
        NurbsError::InvalidArgument("parameters must be strictly increasing".into())
    );

    let diffs: Vec<Vector3<T>> = (1..n)
        .map(|k| (points[k] - points[k - 1]) / (params[k] - params[k - 1]))
        .collect();

    let mut tangents = vec![Vector3::zeros(); n];
    for k in 1..(n - 1) {
        let alpha = (params[k] - params[k - 1]) / (params[k + 1] - params[k - 1]);
        tangents[k] = diffs[k - 1] * (T::one() - alpha) + diffs[k] * alpha;
    }

    if n == 2 {
        tangents[0] = diffs[0];
        tangents[1] = diffs[0];
    } else {
        tangents[0] = diffs[0] * T::from_f64(2.0).unwrap() - tangents[1];
        tangents[n - 1] = diffs[n - 2] * T::from_f64(2.0).unwrap() - tangents[n - 2];
    }

    Ok(tangents)
}

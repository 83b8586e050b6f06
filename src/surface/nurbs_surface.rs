use argmin::core::{ArgminFloat, Executor, State};
use itertools::Itertools;
use nalgebra::{Point3, Point4, Vector2, Vector3, Vector4};

use crate::{
    closest_parameter::{SurfaceClosestParameterNewton, SurfaceClosestParameterProblem},
    curve::{dehomogenize, homogenize, NurbsCurve},
    interpolation::{
        approximating_knot_vector, averaged_grid_parameters, averaged_knot_vector,
        estimate_tangents, interpolation_matrix, try_solve_interpolation,
    },
    knot::{inserted_knot_elements, KnotVector},
    misc::{
        point_to_line_foot, segment_closest_point, transpose_control_points, Binomial,
        FloatingPoint, Invertible, NurbsError, Ray,
    },
};

use super::{FlipDirection, UVDirection};

/// Tensor-product NURBS surface patch.
///
/// Every operation is functional: the inputs are never mutated and each
/// structural operation allocates a fresh patch.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NurbsSurface<T: FloatingPoint> {
    /// control points with homogeneous coordinates, indexed `[i][j]`
    /// with `i` along U and `j` along V
    control_points: Vec<Vec<Point4<T>>>,
    u_degree: usize,
    v_degree: usize,
    u_knots: KnotVector<T>,
    v_knots: KnotVector<T>,
}

impl<T: FloatingPoint> NurbsSurface<T> {
    pub fn new<U: Into<KnotVector<T>>, V: Into<KnotVector<T>>>(
        u_degree: usize,
        v_degree: usize,
        u_knots: U,
        v_knots: V,
        control_points: Vec<Vec<Point4<T>>>,
    ) -> Self {
        Self {
            u_degree,
            v_degree,
            u_knots: u_knots.into(),
            v_knots: v_knots.into(),
            control_points,
        }
    }

    /// Create a new surface with full argument validation.
    pub fn try_new(
        u_degree: usize,
        v_degree: usize,
        u_knots: Vec<T>,
        v_knots: Vec<T>,
        control_points: Vec<Vec<Point4<T>>>,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            u_degree > 0 && v_degree > 0,
            NurbsError::InvalidArgument("degree must be greater than zero".into())
        );
        anyhow::ensure!(
            !control_points.is_empty() && !control_points[0].is_empty(),
            NurbsError::InvalidArgument("control grid must not be empty".into())
        );
        let cols = control_points[0].len();
        anyhow::ensure!(
            control_points.iter().all(|row| row.len() == cols),
            NurbsError::InvalidArgument("control grid must be rectangular".into())
        );
        let u_knots = KnotVector::new(u_knots);
        let v_knots = KnotVector::new(v_knots);
        anyhow::ensure!(
            u_knots.is_valid() && v_knots.is_valid(),
            NurbsError::InvalidArgument(
                "knot vector must be a non-decreasing sequence of real numbers".into()
            )
        );
        anyhow::ensure!(
            u_knots.len() == control_points.len() + u_degree + 1,
            NurbsError::InvalidArgument(format!(
                "invalid number of u knots, got {}, expected {}",
                u_knots.len(),
                control_points.len() + u_degree + 1
            ))
        );
        anyhow::ensure!(
            v_knots.len() == cols + v_degree + 1,
            NurbsError::InvalidArgument(format!(
                "invalid number of v knots, got {}, expected {}",
                v_knots.len(),
                cols + v_degree + 1
            ))
        );
        anyhow::ensure!(
            control_points
                .iter()
                .all(|row| row.iter().all(|p| p.w > T::zero())),
            NurbsError::InvalidArgument("control point weights must be positive".into())
        );

        Ok(Self {
            u_degree,
            v_degree,
            u_knots,
            v_knots,
            control_points,
        })
    }

    pub fn u_degree(&self) -> usize {
        self.u_degree
    }

    pub fn v_degree(&self) -> usize {
        self.v_degree
    }

    pub fn u_knots(&self) -> &KnotVector<T> {
        &self.u_knots
    }

    pub fn v_knots(&self) -> &KnotVector<T> {
        &self.v_knots
    }

    pub fn control_points(&self) -> &Vec<Vec<Point4<T>>> {
        &self.control_points
    }

    /// Get the u domain of the knot vector by degree
    pub fn u_knots_domain(&self) -> (T, T) {
        self.u_knots.domain(self.u_degree)
    }

    /// Get the v domain of the knot vector by degree
    pub fn v_knots_domain(&self) -> (T, T) {
        self.v_knots.domain(self.v_degree)
    }

    /// Get the u and v domain of the knot vector by degree
    pub fn knots_domain(&self) -> ((T, T), (T, T)) {
        (self.u_knots_domain(), self.v_knots_domain())
    }

    /// Get the transposed control points
    pub fn transposed_control_points(&self) -> Vec<Vec<Point4<T>>> {
        transpose_control_points(&self.control_points)
    }

    pub fn dehomogenized_control_points(&self) -> Vec<Vec<Point3<T>>> {
        dehomogenize_control_grid(&self.control_points)
    }

    /// A surface is U-closed when its first and last control rows coincide.
    pub fn is_u_closed(&self) -> bool {
        let eps = T::default_epsilon() * T::from_f64(10.0).unwrap();
        let first = &self.control_points[0];
        let last = &self.control_points[self.control_points.len() - 1];
        first.iter().zip(last.iter()).all(|(a, b)| {
            (dehomogenize(a).unwrap() - dehomogenize(b).unwrap()).norm() < eps
        })
    }

    /// A surface is V-closed when every row starts and ends at the same point.
    pub fn is_v_closed(&self) -> bool {
        let eps = T::default_epsilon() * T::from_f64(10.0).unwrap();
        self.control_points.iter().all(|row| {
            let a = row.first().unwrap();
            let b = row.last().unwrap();
            (dehomogenize(a).unwrap() - dehomogenize(b).unwrap()).norm() < eps
        })
    }

    /// Evaluate the surface at the given u, v parameters to get a point
    pub fn point_at(&self, u: T, v: T) -> Point3<T> {
        let p = self.point(u, v);
        dehomogenize(&p).unwrap()
    }

    /// Evaluate the surface, validating that the parameter pair lies inside
    /// the knot range first.
    pub fn try_point_at(&self, u: T, v: T) -> anyhow::Result<Point3<T>> {
        anyhow::ensure!(
            u >= self.u_knots.first() && u <= self.u_knots.last(),
            NurbsError::InvalidArgument(format!("u parameter out of range: {:?}", u))
        );
        anyhow::ensure!(
            v >= self.v_knots.first() && v <= self.v_knots.last(),
            NurbsError::InvalidArgument(format!("v parameter out of range: {:?}", v))
        );
        Ok(self.point_at(u, v))
    }

    /// Evaluate the surface at the given u, v parameters to get a point in
    /// homogeneous space
    pub fn point(&self, u: T, v: T) -> Point4<T> {
        let n = self.u_knots.len() - self.u_degree - 2;
        let m = self.v_knots.len() - self.v_degree - 2;

        let knot_span_index_u = self.u_knots.find_knot_span_index(n, self.u_degree, u);
        let knot_span_index_v = self.v_knots.find_knot_span_index(m, self.v_degree, v);
        let u_basis_vals = self
            .u_knots
            .basis_functions(knot_span_index_u, u, self.u_degree);
        let v_basis_vals = self
            .v_knots
            .basis_functions(knot_span_index_v, v, self.v_degree);
        let uind = knot_span_index_u - self.u_degree;

        let mut position = Point4::origin();
        for l in 0..=self.v_degree {
            let mut temp = Vector4::zeros();
            let vind = knot_span_index_v - self.v_degree + l;

            // sample u isoline
            for k in 0..=self.u_degree {
                temp += self.control_points[uind + k][vind].coords * u_basis_vals[k];
            }

            // add point from u isoline
            position.coords += temp * v_basis_vals[l];
        }

        position
    }

    /// Evaluate the normal at the given u, v parameters
    pub fn normal_at(&self, u: T, v: T) -> Vector3<T> {
        let deriv = self.rational_derivatives(u, v, 1);
        deriv[1][0].cross(&deriv[0][1])
    }

    /// Evaluate the rational derivatives at the given u, v parameters.
    /// Entry `[k][l]` holds ∂^(k+l) S / ∂u^k ∂v^l; only entries with
    /// `k + l <= derivs` are present.
    pub fn rational_derivatives(&self, u: T, v: T, derivs: usize) -> Vec<Vec<Vector3<T>>> {
        let ders = self.derivatives(u, v, derivs);
        rational_derivatives(&ders, derivs)
    }

    /// Evaluate the derivatives of the homogeneous surface at the given u, v parameters
    fn derivatives(&self, u: T, v: T, derivs: usize) -> Vec<Vec<Vector4<T>>> {
        let n = self.u_knots.len() - self.u_degree - 2;
        let m = self.v_knots.len() - self.v_degree - 2;

        let du = derivs.min(self.u_degree);
        let dv = derivs.min(self.v_degree);
        let mut skl = vec![vec![Vector4::zeros(); derivs + 1]; derivs + 1];
        let knot_span_index_u = self.u_knots.find_knot_span_index(n, self.u_degree, u);
        let knot_span_index_v = self.v_knots.find_knot_span_index(m, self.v_degree, v);
        let uders = self
            .u_knots
            .derivative_basis_functions(knot_span_index_u, u, self.u_degree, du);
        let vders = self
            .v_knots
            .derivative_basis_functions(knot_span_index_v, v, self.v_degree, dv);
        let mut temp = vec![Vector4::zeros(); self.v_degree + 1];

        for k in 0..=du {
            for (s, item) in temp.iter_mut().enumerate() {
                *item = Vector4::zeros();
                for r in 0..=self.u_degree {
                    *item += self.control_points[knot_span_index_u - self.u_degree + r]
                        [knot_span_index_v - self.v_degree + s]
                        .coords
                        * uders[k][r];
                }
            }

            let dd = (derivs - k).min(dv);
            for l in 0..=dd {
                for (s, item) in temp.iter().enumerate() {
                    skl[k][l] += item * vders[l][s];
                }
            }
        }

        skl
    }

    /// Run a curve operation over every isocurve of the chosen direction and
    /// reassemble the patch. The inactive direction passes through unchanged;
    /// the active direction adopts the degree and knot vector the operation
    /// produced (identical for every row by construction).
    fn try_map_isocurves<F>(&self, direction: UVDirection, f: F) -> anyhow::Result<Self>
    where
        F: Fn(&NurbsCurve<T>) -> anyhow::Result<NurbsCurve<T>>,
    {
        let (degree, knots, rows) = self.isocurve_rows(direction);
        let mapped = rows
            .into_iter()
            .map(|row| f(&NurbsCurve::new_unchecked(degree, row, knots.clone())))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let first = mapped.first().ok_or(NurbsError::InvalidArgument(
            "empty control grid".into(),
        ))?;
        let new_degree = first.degree();
        let new_knots = first.knots().clone();
        let points = mapped
            .iter()
            .map(|c| c.control_points().clone())
            .collect_vec();

        Ok(match direction {
            UVDirection::U => Self {
                control_points: transpose_control_points(&points),
                u_degree: new_degree,
                v_degree: self.v_degree,
                u_knots: new_knots,
                v_knots: self.v_knots.clone(),
            },
            UVDirection::V => Self {
                control_points: points,
                u_degree: self.u_degree,
                v_degree: new_degree,
                u_knots: self.u_knots.clone(),
                v_knots: new_knots,
            },
        })
    }

    fn isocurve_rows(&self, direction: UVDirection) -> (usize, KnotVector<T>, Vec<Vec<Point4<T>>>) {
        match direction {
            UVDirection::U => (
                self.u_degree,
                self.u_knots.clone(),
                self.transposed_control_points(),
            ),
            UVDirection::V => (
                self.v_degree,
                self.v_knots.clone(),
                self.control_points.clone(),
            ),
        }
    }

    /// Insert a knot with the given multiplicity in one parametric direction.
    /// Inserting into a knot that already has degree multiplicity is a no-op.
    pub fn try_insert_knot(
        &self,
        knot: T,
        times: usize,
        direction: UVDirection,
    ) -> anyhow::Result<Self> {
        self.try_map_isocurves(direction, |c| c.try_insert_knot(knot, times))
    }

    /// Refine the surface by inserting a batch of knots in one direction.
    pub fn try_refine_knot(
        &self,
        knots_to_insert: Vec<T>,
        direction: UVDirection,
    ) -> anyhow::Result<Self> {
        if knots_to_insert.is_empty() {
            return Ok(self.clone());
        }
        let knots = match direction {
            UVDirection::U => &self.u_knots,
            UVDirection::V => &self.v_knots,
        };
        anyhow::ensure!(
            knots_to_insert
                .iter()
                .all(|k| *k >= knots.first() && *k <= knots.last()),
            NurbsError::InvalidArgument("knot to insert out of range".into())
        );
        self.try_map_isocurves(direction, |c| c.try_refine_knot(knots_to_insert.clone()))
    }

    /// Try to remove a knot up to `times` times in one direction while
    /// keeping the patch within the distance tolerance.
    /// The removal count is the minimum over all isocurves, so the patch
    /// stays well formed; the achieved count is returned with the patch.
    pub fn try_remove_knot(
        &self,
        knot: T,
        times: usize,
        direction: UVDirection,
    ) -> anyhow::Result<(Self, usize)> {
        let tolerance = T::distance_tolerance();
        let (degree, knots, rows) = self.isocurve_rows(direction);

        let mut removable = times;
        for row in rows.iter() {
            let curve = NurbsCurve::new_unchecked(degree, row.clone(), knots.clone());
            let (_, count) = curve.try_remove_knot(knot, times, tolerance)?;
            removable = removable.min(count);
            if removable == 0 {
                return Ok((self.clone(), 0));
            }
        }

        let surface = self.try_map_isocurves(direction, |c| {
            c.try_remove_knot(knot, removable, tolerance).map(|(c, _)| c)
        })?;
        Ok((surface, removable))
    }

    /// Raise the degree of one parametric direction by `times`.
    pub fn try_elevate_degree(
        &self,
        times: usize,
        direction: UVDirection,
    ) -> anyhow::Result<Self> {
        if times == 0 {
            return Ok(self.clone());
        }
        let target = match direction {
            UVDirection::U => self.u_degree + times,
            UVDirection::V => self.v_degree + times,
        };
        self.try_map_isocurves(direction, |c| c.try_elevate_degree(target))
    }

    /// Lower the degree of one parametric direction by one.
    /// Fails when any isocurve cannot be reduced within the distance tolerance.
    pub fn try_reduce_degree(&self, direction: UVDirection) -> anyhow::Result<Self> {
        let tolerance = T::distance_tolerance();
        self.try_map_isocurves(direction, |c| c.try_reduce_degree(tolerance))
    }

    /// Flip the surface in u or v direction or both.
    /// Flipping twice restores the original patch.
    pub fn flip(&self, direction: FlipDirection) -> Self {
        let mut flipped = self.clone();

        // flip in u direction
        match direction {
            FlipDirection::U | FlipDirection::UV => {
                flipped.control_points = flipped.control_points.iter().rev().cloned().collect();
                flipped.u_knots = flipped.u_knots.inverse();
            }
            _ => {}
        }

        // flip in v direction
        match direction {
            FlipDirection::V | FlipDirection::UV => {
                flipped.control_points = flipped
                    .control_points
                    .iter()
                    .map(|row| row.iter().rev().cloned().collect())
                    .collect();
                flipped.v_knots = flipped.v_knots.inverse();
            }
            _ => {}
        }

        flipped
    }

    /// Decompose a 3D tangent vector at a parameter pair into its (u, v)
    /// parametric components, solving the symmetric 2x2 system
    /// `u'·Su + v'·Sv = tangent` in the least-squares sense.
    ///
    /// # Example
    /// ```
    /// use surfo::prelude::*;
    /// use nalgebra::{Point3, Vector3};
    /// use approx::assert_relative_eq;
    /// let square = NurbsSurface::bilinear(
    ///     &Point3::new(0., 0., 0.),
    ///     &Point3::new(1., 0., 0.),
    ///     &Point3::new(1., 1., 0.),
    ///     &Point3::new(0., 1., 0.),
    /// );
    /// let (du, dv) = square.try_uv_tangent((0.5, 0.5), &Vector3::new(1., 2., 0.)).unwrap();
    /// assert_relative_eq!(du, 1., epsilon = 1e-8);
    /// assert_relative_eq!(dv, 2., epsilon = 1e-8);
    /// ```
    pub fn try_uv_tangent(&self, uv: (T, T), tangent: &Vector3<T>) -> anyhow::Result<(T, T)> {
        let derivs = self.rational_derivatives(uv.0, uv.1, 1);
        let s_u = &derivs[1][0];
        let s_v = &derivs[0][1];

        let a = s_u.dot(s_u);
        let b = s_u.dot(s_v);
        let d = s_v.dot(s_v);
        let det = a * d - b * b;
        anyhow::ensure!(
            det.abs() > T::default_epsilon(),
            NurbsError::DegenerateSystem("surface partial derivatives are parallel".into())
        );

        let e = s_u.dot(tangent);
        let f = s_v.dot(tangent);
        Ok(((e * d - b * f) / det, (a * f - e * b) / det))
    }

    /// Find the closest point on the surface to a given point
    pub fn find_closest_point(&self, point: &Point3<T>) -> anyhow::Result<Point3<T>>
    where
        T: ArgminFloat,
    {
        self.find_closest_parameter(point)
            .map(|(u, v)| self.point_at(u, v))
    }

    /// Find the parameter pair whose surface point is closest to a given
    /// point.
    ///
    /// A dense secant-projection sweep over the sampled surface seeds a
    /// Newton iteration; if the iteration budget runs out the best iterate
    /// is returned without a convergence guarantee.
    pub fn find_closest_parameter(&self, point: &Point3<T>) -> anyhow::Result<(T, T)>
    where
        T: ArgminFloat,
    {
        let (u_start, u_end) = self.u_knots_domain();
        let (v_start, v_end) = self.v_knots_domain();

        let samples_u = (self.control_points.len() * self.u_degree).max(2);
        let samples_v = (self.control_points[0].len() * self.v_degree).max(2);
        let span_u = (u_end - u_start) / T::from_usize(samples_u - 1).unwrap();
        let span_v = (v_end - v_start) / T::from_usize(samples_v - 1).unwrap();

        let mut min_dist = T::infinity();
        let mut seed = Vector2::new(u_start, v_start);

        for j in 0..samples_v {
            let v = v_start + span_v * T::from_usize(j).unwrap();
            let pts = (0..samples_u)
                .map(|i| self.point_at(u_start + span_u * T::from_usize(i).unwrap(), v))
                .collect_vec();

            for i in 0..(samples_u - 1) {
                let u0 = u_start + span_u * T::from_usize(i).unwrap();
                let u1 = u0 + span_u;
                let (proj_u, proj_pt) = segment_closest_point(point, &pts[i], &pts[i + 1], u0, u1);
                let d = (point - proj_pt).norm();
                if d < min_dist {
                    min_dist = d;
                    seed = Vector2::new(proj_u, v);
                }
            }
        }

        let solver = SurfaceClosestParameterNewton::<T>::new(
            (self.u_knots_domain(), self.v_knots_domain()),
            (self.is_u_closed(), self.is_v_closed()),
        );
        let res = Executor::new(SurfaceClosestParameterProblem::new(point, self), solver)
            .configure(|state| state.param(seed).max_iters(10))
            .run()?;
        match res.state().get_best_param().cloned() {
            Some(t) if t.x.is_finite() && t.y.is_finite() => Ok((t.x, t.y)),
            _ => Err(NurbsError::NonConvergence("no finite parameter estimate".into()).into()),
        }
    }

    /// Create a bicubic patch blending four corner points bilinearly.
    ///
    /// # Example
    /// ```
    /// use surfo::prelude::*;
    /// use nalgebra::Point3;
    /// use approx::assert_relative_eq;
    /// let patch = NurbsSurface::bilinear(
    ///     &Point3::new(0., 0., 0.),
    ///     &Point3::new(1., 0., 0.),
    ///     &Point3::new(1., 1., 0.),
    ///     &Point3::new(0., 1., 0.),
    /// );
    /// assert_relative_eq!(
    ///     patch.point_at(0.25, 0.75),
    ///     Point3::new(0.25, 0.75, 0.),
    ///     epsilon = 1e-10
    /// );
    /// ```
    pub fn bilinear(
        p00: &Point3<T>,
        p10: &Point3<T>,
        p11: &Point3<T>,
        p01: &Point3<T>,
    ) -> Self {
        let degree = 3;
        let div = T::from_usize(degree).unwrap();
        let control_points = (0..=degree)
            .map(|i| {
                let s = T::from_usize(i).unwrap() / div;
                (0..=degree)
                    .map(|j| {
                        let t = T::from_usize(j).unwrap() / div;
                        let p = p00.coords * ((T::one() - s) * (T::one() - t))
                            + p10.coords * (s * (T::one() - t))
                            + p11.coords * (s * t)
                            + p01.coords * ((T::one() - s) * t);
                        Point4::new(p.x, p.y, p.z, T::one())
                    })
                    .collect_vec()
            })
            .collect_vec();

        let knots = || {
            let mut k = vec![T::zero(); degree + 1];
            k.extend(std::iter::repeat(T::one()).take(degree + 1));
            k
        };

        Self {
            u_degree: degree,
            v_degree: degree,
            u_knots: KnotVector::new(knots()),
            v_knots: KnotVector::new(knots()),
            control_points,
        }
    }

    /// Create a cylindrical surface by extruding a circular arc along the
    /// axis perpendicular to the arc plane.
    /// The u direction runs from the translated end (u = 0) down to the arc
    /// (u = 1); the v direction follows the arc.
    pub fn try_cylinder(
        origin: &Point3<T>,
        x_axis: &Vector3<T>,
        y_axis: &Vector3<T>,
        start_angle: T,
        end_angle: T,
        radius: T,
        height: T,
    ) -> anyhow::Result<Self> {
        let arc = NurbsCurve::try_arc(origin, x_axis, y_axis, radius, start_angle, end_angle)?;
        let axis = x_axis.normalize().cross(&y_axis.normalize());
        let half = T::from_f64(0.5).unwrap();

        let translations = [axis * height, axis * (height * half), Vector3::zeros()];
        let control_points = translations
            .iter()
            .map(|translation| {
                arc.control_points()
                    .iter()
                    .map(|p| {
                        // translate the homogeneous point without disturbing its weight
                        let w = p.w;
                        Point4::new(
                            p.x + translation.x * w,
                            p.y + translation.y * w,
                            p.z + translation.z * w,
                            w,
                        )
                    })
                    .collect_vec()
            })
            .collect_vec();

        Ok(Self {
            u_degree: 2,
            v_degree: arc.degree(),
            u_knots: KnotVector::new(vec![
                T::zero(),
                T::zero(),
                T::zero(),
                T::one(),
                T::one(),
                T::one(),
            ]),
            v_knots: arc.knots().clone(),
            control_points,
        })
    }

    /// Create a ruled surface between two curves.
    /// The curves are brought to a common degree and knot vector first;
    /// u = 0 traces the first curve and u = 1 the second.
    pub fn try_ruled(curve0: &NurbsCurve<T>, curve1: &NurbsCurve<T>) -> anyhow::Result<Self> {
        let (s0, e0) = curve0.knots_domain();
        let (s1, e1) = curve1.knots_domain();
        if (s0 - s1).abs() > T::default_epsilon() || (e0 - e1).abs() > T::default_epsilon() {
            return Err(NurbsError::GeometricFailure(
                "ruled surface requires curves with matching domain end points".into(),
            )
            .into());
        }

        let degree = curve0.degree().max(curve1.degree());
        let c0 = curve0.try_elevate_degree(degree)?;
        let c1 = curve1.try_elevate_degree(degree)?;

        let (missing0, missing1) = inserted_knot_elements(c0.knots(), c1.knots());
        let c0 = if missing0.is_empty() {
            c0
        } else {
            c0.try_refine_knot(missing0)?
        };
        let c1 = if missing1.is_empty() {
            c1
        } else {
            c1.try_refine_knot(missing1)?
        };

        Ok(Self {
            u_degree: 1,
            v_degree: degree,
            u_knots: KnotVector::new(vec![T::zero(), T::zero(), T::one(), T::one()]),
            v_knots: c0.knots().clone(),
            control_points: vec![c0.control_points().clone(), c1.control_points().clone()],
        })
    }

    /// Revolve a generatrix curve around an axis line by `theta` radians.
    /// The u direction sweeps the rotation with quadratic arcs, the v
    /// direction follows the generatrix.
    pub fn try_revolve(
        profile: &NurbsCurve<T>,
        center: &Point3<T>,
        axis: &Vector3<T>,
        theta: T,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            theta > T::zero() && theta <= T::two_pi(),
            NurbsError::InvalidArgument("revolution sweep must lie in (0, 2π]".into())
        );

        let axis = axis.normalize();
        let two = T::from_f64(2.0).unwrap();
        let narcs = (theta / (T::pi() / two))
            .ceil()
            .to_usize()
            .unwrap()
            .clamp(1, 4);
        let dtheta = theta / T::from_usize(narcs).unwrap();
        let wm = (dtheta / two).cos();

        let mut u_knots = vec![T::zero(); 2 * narcs + 4];
        for i in 0..3 {
            u_knots[2 * narcs + 1 + i] = T::one();
        }
        for i in 1..narcs {
            let v = T::from_usize(i).unwrap() / T::from_usize(narcs).unwrap();
            u_knots[2 * i + 1] = v;
            u_knots[2 * i + 2] = v;
        }

        let angles = (0..=narcs)
            .map(|i| T::from_usize(i).unwrap() * dtheta)
            .collect_vec();
        let sines = angles.iter().map(|a| a.sin()).collect_vec();
        let cosines = angles.iter().map(|a| a.cos()).collect_vec();

        let prof_points = profile.dehomogenized_control_points();
        let prof_weights = profile.weights();

        let mut control_points =
            vec![vec![Point4::origin(); prof_points.len()]; 2 * narcs + 1];

        for (j, p) in prof_points.iter().enumerate() {
            let o = point_to_line_foot(center, &axis, p);

            // radial frame at this height
            let mut x = p - o;
            let r = x.norm();
            let mut y = axis.cross(&x);
            if r > T::default_epsilon() {
                x /= r;
                y /= r;
            }

            let wj = prof_weights[j];
            control_points[0][j] = homogenize(p, wj);

            let mut p0 = *p;
            let mut t0 = y;
            let mut index = 0;

            for i in 1..=narcs {
                let p2 = if r <= T::default_epsilon() {
                    o
                } else {
                    o + x * (r * cosines[i]) + y * (r * sines[i])
                };
                control_points[index + 2][j] = homogenize(&p2, wj);

                let t2 = y * cosines[i] - x * sines[i];

                if r <= T::default_epsilon() {
                    control_points[index + 1][j] = homogenize(&o, wm * wj);
                } else {
                    let r0 = Ray::new(p0, t0);
                    let r1 = Ray::new(p2, t2);
                    let intersection =
                        r0.find_intersection(&r1)
                            .ok_or(NurbsError::GeometricFailure(
                                "revolution tangent rays do not intersect".into(),
                            ))?;
                    control_points[index + 1][j] =
                        homogenize(&intersection.intersection0.0, wm * wj);
                }

                index += 2;
                if i < narcs {
                    p0 = p2;
                    t0 = t2;
                }
            }
        }

        Ok(Self {
            u_degree: 2,
            v_degree: profile.degree(),
            u_knots: KnotVector::new(u_knots),
            v_knots: profile.knots().clone(),
            control_points,
        })
    }

    /// Interpolate a rectangular grid of points globally.
    /// The resulting patch passes through every input point at the averaged
    /// chord-length parameter pair of its grid position.
    pub fn try_interpolate_grid(
        points: &[Vec<Point3<T>>],
        u_degree: usize,
        v_degree: usize,
    ) -> anyhow::Result<Self> {
        let rows = points.len();
        let cols = points.first().map(|r| r.len()).unwrap_or(0);
        anyhow::ensure!(
            rows > u_degree && cols > v_degree,
            NurbsError::InvalidArgument("too few points for the requested degrees".into())
        );
        let (uk, vl) = averaged_grid_parameters(points)?;

        let u_knots = averaged_knot_vector(u_degree, &uk);
        let v_knots = averaged_knot_vector(v_degree, &vl);

        // interpolate along U, one system per column of the grid
        let columns = (0..cols)
            .map(|l| (0..rows).map(|k| points[k][l]).collect_vec())
            .collect_vec();
        let m_u = interpolation_matrix(u_degree, &uk, &u_knots);
        let u_fitted = try_solve_interpolation(m_u, &columns)?;

        // then along V, one system per row of the intermediate control net
        let intermediate_rows = (0..rows)
            .map(|i| (0..cols).map(|l| u_fitted[l][i]).collect_vec())
            .collect_vec();
        let m_v = interpolation_matrix(v_degree, &vl, &v_knots);
        let v_fitted = try_solve_interpolation(m_v, &intermediate_rows)?;

        Ok(Self {
            u_degree,
            v_degree,
            u_knots,
            v_knots,
            control_points: homogenize_control_grid(&v_fitted),
        })
    }

    /// Interpolate a rectangular grid of points with a C1 bicubic patch
    /// assembled locally from estimated tangents and twists.
    pub fn try_bicubic_interpolate(points: &[Vec<Point3<T>>]) -> anyhow::Result<Self> {
        let rows = points.len();
        let cols = points.first().map(|r| r.len()).unwrap_or(0);
        anyhow::ensure!(
            rows >= 2 && cols >= 2,
            NurbsError::InvalidArgument("bicubic interpolation needs a 2x2 grid at least".into())
        );
        let (ub, vb) = averaged_grid_parameters(points)?;
        let n = rows - 1;
        let m = cols - 1;

        // first-order tangents at every node
        let mut tu = vec![vec![Vector3::zeros(); cols]; rows];
        for l in 0..cols {
            let column = (0..rows).map(|k| points[k][l]).collect_vec();
            let tangents = estimate_tangents(&column, &ub)?;
            for (k, t) in tangents.into_iter().enumerate() {
                tu[k][l] = t;
            }
        }
        let mut tv = vec![vec![Vector3::zeros(); cols]; rows];
        for (k, row) in points.iter().enumerate() {
            let tangents = estimate_tangents(row, &vb)?;
            for (l, t) in tangents.into_iter().enumerate() {
                tv[k][l] = t;
            }
        }

        // twists as the weighted average of the mixed differences
        let half = T::from_f64(0.5).unwrap();
        let mut tw = vec![vec![Vector3::zeros(); cols]; rows];
        for k in 0..rows {
            let ak = if k == 0 || k == n {
                T::zero()
            } else {
                (ub[k] - ub[k - 1]) / (ub[k + 1] - ub[k - 1])
            };
            for l in 0..cols {
                let bl = if l == 0 || l == m {
                    T::zero()
                } else {
                    (vb[l] - vb[l - 1]) / (vb[l + 1] - vb[l - 1])
                };

                let dvu = if k == 0 {
                    (tv[1][l] - tv[0][l]) / (ub[1] - ub[0])
                } else if k == n {
                    (tv[n][l] - tv[n - 1][l]) / (ub[n] - ub[n - 1])
                } else {
                    let back = (tv[k][l] - tv[k - 1][l]) / (ub[k] - ub[k - 1]);
                    let forward = (tv[k + 1][l] - tv[k][l]) / (ub[k + 1] - ub[k]);
                    back * (T::one() - ak) + forward * ak
                };
                let duv = if l == 0 {
                    (tu[k][1] - tu[k][0]) / (vb[1] - vb[0])
                } else if l == m {
                    (tu[k][m] - tu[k][m - 1]) / (vb[m] - vb[m - 1])
                } else {
                    let back = (tu[k][l] - tu[k][l - 1]) / (vb[l] - vb[l - 1]);
                    let forward = (tu[k][l + 1] - tu[k][l]) / (vb[l + 1] - vb[l]);
                    back * (T::one() - bl) + forward * bl
                };

                tw[k][l] = if ak + bl > T::zero() {
                    (duv * ak + dvu * bl) / (ak + bl)
                } else {
                    (duv + dvu) * half
                };
            }
        }

        // assemble the bezier control grid
        let three = T::from_f64(3.0).unwrap();
        let nine = T::from_f64(9.0).unwrap();
        let mut b = vec![vec![Vector3::zeros(); 3 * m + 1]; 3 * n + 1];

        for k in 0..rows {
            for l in 0..cols {
                b[3 * k][3 * l] = points[k][l].coords;
            }
        }
        for k in 0..n {
            let du = (ub[k + 1] - ub[k]) / three;
            for l in 0..cols {
                b[3 * k + 1][3 * l] = points[k][l].coords + tu[k][l] * du;
                b[3 * k + 2][3 * l] = points[k + 1][l].coords - tu[k + 1][l] * du;
            }
        }
        for l in 0..m {
            let dv = (vb[l + 1] - vb[l]) / three;
            for k in 0..rows {
                b[3 * k][3 * l + 1] = points[k][l].coords + tv[k][l] * dv;
                b[3 * k][3 * l + 2] = points[k][l + 1].coords - tv[k][l + 1] * dv;
            }
        }

        // interior points from the twist compatibility at each cell corner
        for k in 0..n {
            for l in 0..m {
                let gamma = (ub[k + 1] - ub[k]) * (vb[l + 1] - vb[l]) / nine;
                let (i, j) = (3 * k, 3 * l);
                b[i + 1][j + 1] = tw[k][l] * gamma + b[i][j + 1] + b[i + 1][j] - b[i][j];
                b[i + 2][j + 1] =
                    b[i + 3][j + 1] + b[i + 2][j] - b[i + 3][j] - tw[k + 1][l] * gamma;
                b[i + 1][j + 2] =
                    b[i + 1][j + 3] + b[i][j + 2] - b[i][j + 3] - tw[k][l + 1] * gamma;
                b[i + 2][j + 2] =
                    tw[k + 1][l + 1] * gamma + b[i + 2][j + 3] + b[i + 3][j + 2] - b[i + 3][j + 3];
            }
        }

        let mut u_knots = vec![T::zero(); 4];
        for k in 1..n {
            u_knots.extend(std::iter::repeat(ub[k]).take(3));
        }
        u_knots.extend(std::iter::repeat(T::one()).take(4));
        let mut v_knots = vec![T::zero(); 4];
        for l in 1..m {
            v_knots.extend(std::iter::repeat(vb[l]).take(3));
        }
        v_knots.extend(std::iter::repeat(T::one()).take(4));

        let control_points = b
            .iter()
            .map(|row| {
                row.iter()
                    .map(|p| Point4::new(p.x, p.y, p.z, T::one()))
                    .collect_vec()
            })
            .collect_vec();

        // the construction is C1, so one copy of every interior knot is
        // removable exactly; what remains are double interior knots
        let mut surface = Self {
            u_degree: 3,
            v_degree: 3,
            u_knots: KnotVector::new(u_knots),
            v_knots: KnotVector::new(v_knots),
            control_points,
        };
        for k in 1..n {
            surface = surface.try_remove_knot(ub[k], 1, UVDirection::U)?.0;
        }
        for l in 1..m {
            surface = surface.try_remove_knot(vb[l], 1, UVDirection::V)?.0;
        }

        Ok(surface)
    }

    /// Approximate a rectangular grid of points in the least-squares sense
    /// with the requested number of control rows and columns.
    /// The boundary control points are pinned to the input end points.
    pub fn try_approximate(
        points: &[Vec<Point3<T>>],
        u_degree: usize,
        v_degree: usize,
        rows: usize,
        columns: usize,
    ) -> anyhow::Result<Self> {
        let size_u = points.len();
        let size_v = points.first().map(|r| r.len()).unwrap_or(0);
        anyhow::ensure!(
            rows < size_u && columns < size_v,
            NurbsError::InvalidArgument(
                "approximation needs fewer control points than data points".into()
            )
        );
        anyhow::ensure!(
            rows > u_degree && columns > v_degree,
            NurbsError::InvalidArgument("too few control points for the requested degrees".into())
        );

        let (uk, vl) = averaged_grid_parameters(points)?;
        let u_knots = approximating_knot_vector(u_degree, size_u, rows, &uk);
        let v_knots = approximating_knot_vector(v_degree, size_v, columns, &vl);

        // fit along U, one fit per data column
        let mut intermediate = vec![vec![Point3::origin(); size_v]; rows];
        for j in 0..size_v {
            let data = (0..size_u).map(|i| points[i][j]).collect_vec();
            let fitted = least_squares_fit(&data, u_degree, rows, &uk, &u_knots)?;
            for (i, p) in fitted.into_iter().enumerate() {
                intermediate[i][j] = p;
            }
        }

        // fit along V, one fit per intermediate row
        let mut fitted_grid = vec![vec![Point3::origin(); columns]; rows];
        for (i, row) in intermediate.iter().enumerate() {
            let fitted = least_squares_fit(row, v_degree, columns, &vl, &v_knots)?;
            fitted_grid[i] = fitted;
        }

        Ok(Self {
            u_degree,
            v_degree,
            u_knots,
            v_knots,
            control_points: homogenize_control_grid(&fitted_grid),
        })
    }
}

/// Compute the rational derivatives from homogeneous ones by the 2D
/// quotient rule. Entries are filled in lexicographic order of (k, l) with
/// k + l bounded by the requested order, so every referenced entry is
/// already complete.
fn rational_derivatives<T: FloatingPoint>(
    ders: &[Vec<Vector4<T>>],
    derivs: usize,
) -> Vec<Vec<Vector3<T>>> {
    let a_ders: Vec<Vec<Vector3<T>>> = ders
        .iter()
        .map(|row| row.iter().map(|d| d.xyz()).collect_vec())
        .collect();
    let w_ders: Vec<Vec<T>> = ders
        .iter()
        .map(|row| row.iter().map(|d| d.w).collect_vec())
        .collect();

    let mut skl: Vec<Vec<Vector3<T>>> = vec![];
    let mut binom = Binomial::<T>::new();

    for k in 0..=derivs {
        let mut row = vec![];

        for l in 0..=(derivs - k) {
            let mut v = a_ders[k][l];
            for j in 1..=l {
                let coef = binom.get(l, j) * w_ders[0][j];
                v -= row[l - j] * coef;
            }

            for i in 1..=k {
                let coef = binom.get(k, i) * w_ders[i][0];
                v -= skl[k - i][l] * coef;
                let mut v2 = Vector3::zeros();
                for j in 1..=l {
                    v2 += skl[k - i][l - j] * (binom.get(l, j) * w_ders[i][j]);
                }
                v -= v2 * binom.get(k, i);
            }

            row.push(v / w_ders[0][0]);
        }

        skl.push(row);
    }

    skl
}

/// Least-squares fit of one grid line: the end control points are pinned to
/// the data end points and the interior ones solve the normal equations.
fn least_squares_fit<T: FloatingPoint>(
    data: &[Point3<T>],
    degree: usize,
    control_count: usize,
    params: &[T],
    knots: &KnotVector<T>,
) -> anyhow::Result<Vec<Point3<T>>> {
    use nalgebra::{DMatrix, DVector};

    let n = control_count - 1;
    let r = data.len() - 1;

    let mut controls = vec![Point3::origin(); control_count];
    controls[0] = data[0];
    controls[n] = data[r];
    if n < 2 {
        return Ok(controls);
    }

    let mut basis = DMatrix::<T>::zeros(r - 1, n - 1);
    for i in 1..r {
        for j in 1..n {
            basis[(i - 1, j - 1)] = knots.one_basis_function(j, degree, params[i]);
        }
    }
    let normal = basis.transpose() * &basis;
    let lu = normal.lu();

    // residuals after subtracting the pinned boundary contributions
    let q0 = data[0].coords;
    let qr = data[r].coords;
    let residuals = (1..r)
        .map(|i| {
            let n0 = knots.one_basis_function(0, degree, params[i]);
            let nn = knots.one_basis_function(n, degree, params[i]);
            data[i].coords - q0 * n0 - qr * nn
        })
        .collect_vec();

    let rhs = (1..n)
        .map(|j| {
            let mut sum = Vector3::zeros();
            for i in 1..r {
                sum += residuals[i - 1] * basis[(i - 1, j - 1)];
            }
            sum
        })
        .collect_vec();

    for dim in 0..3 {
        let b = DVector::from_vec(rhs.iter().map(|p| p[dim]).collect());
        let xs = lu.solve(&b).ok_or(NurbsError::NonConvergence(
            "least-squares normal equations are singular".into(),
        ))?;
        for j in 1..n {
            controls[j][dim] = xs[j - 1];
        }
    }

    Ok(controls)
}

/// Drop a homogeneous control grid to Euclidean space.
pub fn dehomogenize_control_grid<T: FloatingPoint>(
    grid: &[Vec<Point4<T>>],
) -> Vec<Vec<Point3<T>>> {
    grid.iter()
        .map(|row| row.iter().map(|p| dehomogenize(p).unwrap()).collect())
        .collect()
}

/// Lift a Euclidean point grid into homogeneous space with unit weights.
pub fn homogenize_control_grid<T: FloatingPoint>(
    grid: &[Vec<Point3<T>>],
) -> Vec<Vec<Point4<T>>> {
    grid.iter()
        .map(|row| row.iter().map(|p| homogenize(p, T::one())).collect())
        .collect()
}

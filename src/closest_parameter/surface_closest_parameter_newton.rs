use argmin::{argmin_error_closure, core::*};
use nalgebra::{Matrix2, Vector2, Vector3};

use crate::misc::FloatingPoint;

/// Customized Newton's method for finding the closest parameter on a NURBS surface.
///
/// Each iteration solves the 2x2 system built from the first and second
/// rational derivatives; the updated parameter is clamped to the knot domain
/// in an open direction and wrapped around it in a closed one.
#[derive(Clone, Copy)]
pub struct SurfaceClosestParameterNewton<T> {
    /// domain of the parameter
    knot_domain: ((T, T), (T, T)),
    /// whether the surface is closed in each direction
    closed: (bool, bool),
}

impl<T> SurfaceClosestParameterNewton<T>
where
    T: ArgminFloat,
{
    pub fn new(domain: ((T, T), (T, T)), closed: (bool, bool)) -> Self {
        SurfaceClosestParameterNewton {
            knot_domain: domain,
            closed,
        }
    }
}

impl<O, F> Solver<O, IterState<Vector2<F>, Vector2<F>, (), (), (), F>>
    for SurfaceClosestParameterNewton<F>
where
    F: FloatingPoint + ArgminFloat,
    O: Gradient<Param = Vector2<F>, Gradient = Vector3<F>>
        + Hessian<Param = Vector2<F>, Hessian = Vec<Vec<Vector3<F>>>>,
{
    const NAME: &'static str = "Closest parameter newton method";

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        state: IterState<Vector2<F>, Vector2<F>, (), (), (), F>,
    ) -> Result<(IterState<Vector2<F>, Vector2<F>, (), (), (), F>, Option<KV>), Error> {
        let param = state.get_param().ok_or_else(argmin_error_closure!(
            NotInitialized,
            concat!(
                "`SurfaceClosestParameterNewton` requires an initial parameter vector. ",
                "Please provide an initial guess via `Executor`s `configure` method."
            )
        ))?;

        let dif = problem.gradient(param)?;
        let e = problem.hessian(param)?;

        let s_u = &e[1][0];
        let s_v = &e[0][1];
        let s_uu = &e[2][0];
        let s_vv = &e[0][2];
        let s_uv = &e[1][1];

        let delta = F::distance_tolerance();

        // point coincidence
        // |S(u,v) - p| < delta
        let distance = dif.norm();
        if distance < F::default_epsilon() {
            let p = *param;
            return Ok((state.param(p), None));
        }

        let f = s_u.dot(&dif);
        let g = s_v.dot(&dif);

        // cosine conditions
        // |Su(u,v) * (S(u,v) - p)|
        // ------------------------ < delta, and the same along v
        // |Su(u,v)| |S(u,v) - p|
        let c1 = num_traits::Float::abs(f) / (s_u.norm() * distance);
        let c2 = num_traits::Float::abs(g) / (s_v.norm() * distance);

        if distance < delta && c1 < delta && c2 < delta {
            let p = *param;
            return Ok((state.param(p), None));
        }

        let j00 = s_u.dot(s_u) + s_uu.dot(&dif);
        let j01 = s_u.dot(s_v) + s_uv.dot(&dif);
        let j11 = s_v.dot(s_v) + s_vv.dot(&dif);
        let jacobian = Matrix2::new(j00, j01, j01, j11);

        // a singular system cannot improve the estimate; stop where we are
        if num_traits::Float::abs(jacobian.determinant()) < F::default_epsilon() {
            let p = *param;
            return Ok((state.param(p), None));
        }

        let k = Vector2::new(-f, -g);
        let d = jacobian
            .lu()
            .solve(&k)
            .ok_or(anyhow::anyhow!("Failed to solve jacobian"))?;

        // constrain the updated parameter to the domain before testing it
        let updated = d + param;
        let new_param = Vector2::new(
            constrain(updated.x, self.knot_domain.0, self.closed.0),
            constrain(updated.y, self.knot_domain.1, self.closed.1),
        );

        // halt once the geometric step becomes insignificant
        let step = (s_u * (new_param.x - param.x)).norm() + (s_v * (new_param.y - param.y)).norm();
        if step < delta {
            let p = *param;
            return Ok((state.param(p), None));
        }

        Ok((state.param(new_param), None))
    }

    fn terminate(
        &mut self,
        state: &IterState<Vector2<F>, Vector2<F>, (), (), (), F>,
    ) -> TerminationStatus {
        if state.iter > state.max_iters {
            return TerminationStatus::Terminated(TerminationReason::MaxItersReached);
        }

        match (state.get_param(), state.get_prev_param()) {
            (Some(current_param), Some(prev_param)) => {
                let delta = (current_param - prev_param).norm();
                if delta < F::epsilon() {
                    TerminationStatus::Terminated(TerminationReason::SolverConverged)
                } else {
                    TerminationStatus::NotTerminated
                }
            }
            _ => TerminationStatus::NotTerminated,
        }
    }
}

/// Clamp an open direction to its domain; wrap a closed one around it.
fn constrain<T: FloatingPoint>(parameter: T, domain: (T, T), closed: bool) -> T {
    if parameter < domain.0 {
        if closed {
            domain.1 - (domain.0 - parameter)
        } else {
            domain.0
        }
    } else if parameter > domain.1 {
        if closed {
            domain.0 + (parameter - domain.1)
        } else {
            domain.1
        }
    } else {
        parameter
    }
}

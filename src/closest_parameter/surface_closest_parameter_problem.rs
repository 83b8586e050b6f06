use argmin::core::{CostFunction, Gradient, Hessian};
use nalgebra::{Point3, Vector2, Vector3};

use crate::{misc::FloatingPoint, surface::NurbsSurface};

/// Gradient & Hessian provider for finding the closest parameter on a surface to a given point.
pub struct SurfaceClosestParameterProblem<'a, T: FloatingPoint> {
    /// The point to find the closest parameter to.
    point: &'a Point3<T>,
    /// The surface to find the closest parameter on.
    surface: &'a NurbsSurface<T>,
}

impl<'a, T: FloatingPoint> SurfaceClosestParameterProblem<'a, T> {
    pub fn new(point: &'a Point3<T>, surface: &'a NurbsSurface<T>) -> Self {
        SurfaceClosestParameterProblem { point, surface }
    }
}

impl<'a, T: FloatingPoint> CostFunction for SurfaceClosestParameterProblem<'a, T> {
    type Param = Vector2<T>;
    type Output = T;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, anyhow::Error> {
        let p = self.surface.point_at(param.x, param.y);
        Ok((p - self.point).norm())
    }
}

impl<'a, T: FloatingPoint> Gradient for SurfaceClosestParameterProblem<'a, T> {
    type Param = Vector2<T>;
    type Gradient = Vector3<T>;

    /// The residual S(u,v) - p driving the Newton step.
    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, anyhow::Error> {
        let p = self.surface.point_at(param.x, param.y);
        Ok(p - self.point)
    }
}

impl<'a, T: FloatingPoint> Hessian for SurfaceClosestParameterProblem<'a, T> {
    type Param = Vector2<T>;
    type Hessian = Vec<Vec<Vector3<T>>>;

    /// Second-order rational derivatives of the surface at the parameter.
    fn hessian(&self, param: &Self::Param) -> Result<Self::Hessian, anyhow::Error> {
        Ok(self.surface.rational_derivatives(param.x, param.y, 2))
    }
}

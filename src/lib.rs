#![allow(clippy::needless_range_loop)]
//! Surfo is a tensor-product NURBS surface kernel for Rust.
//!
//! The crate models a rational B-spline patch as an immutable value and
//! provides the algorithms that operate on it: point and derivative
//! evaluation, knot insertion / refinement / removal, degree elevation and
//! reduction, decomposition into Bezier patches, inverse projection of a 3D
//! point onto the patch, and construction from primitive geometry or point
//! grids (bilinear corners, cylinders, ruled surfaces, surfaces of
//! revolution, global and local interpolation, least-squares approximation).
//!
//! Both parametric directions share one implementation: every
//! one-directional algorithm runs on the rows of the control grid and is
//! dispatched to the U direction by transposing the grid around it.
//!
//! ## Example
//!
//! ```
//! use surfo::prelude::*;
//! use nalgebra::{Point3, Vector3};
//! use std::f64::consts::FRAC_PI_2;
//! use approx::assert_relative_eq;
//!
//! // A quarter cylinder of radius 1 and height 2
//! let cylinder = NurbsSurface::try_cylinder(
//!     &Point3::origin(),
//!     &Vector3::x(),
//!     &Vector3::y(),
//!     0.,
//!     FRAC_PI_2,
//!     1.,
//!     2.,
//! )
//! .unwrap();
//!
//! // The surface evaluates exactly on the cylinder
//! let p = cylinder.point_at(0.5, 0.5);
//! let sqrt2_half = 2.0_f64.sqrt() / 2.;
//! assert_relative_eq!(p, Point3::new(sqrt2_half, sqrt2_half, 1.), epsilon = 1e-10);
//!
//! // and projects points back to their parameters
//! let (u, v) = cylinder.find_closest_parameter(&p).unwrap();
//! assert_relative_eq!(cylinder.point_at(u, v), p, epsilon = 1e-4);
//! ```

mod closest_parameter;
mod curve;
mod decompose;
mod interpolation;
mod knot;
mod misc;
mod surface;

pub mod prelude {
    pub use crate::closest_parameter::*;
    pub use crate::curve::*;
    pub use crate::decompose::*;
    pub use crate::interpolation::*;
    pub use crate::knot::*;
    pub use crate::misc::{
        binomial::*, error::*, floating_point::*, invertible::*, ray::*, transpose::*,
        trigonometry::*,
    };
    pub use crate::surface::*;
}

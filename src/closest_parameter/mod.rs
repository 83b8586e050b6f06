mod surface_closest_parameter_newton;
mod surface_closest_parameter_problem;
pub use surface_closest_parameter_newton::*;
pub use surface_closest_parameter_problem::*;

pub mod binomial;
pub mod error;
pub mod floating_point;
pub mod invertible;
pub mod ray;
pub mod transpose;
pub mod trigonometry;

pub use binomial::*;
pub use error::*;
pub use floating_point::*;
pub use invertible::*;
pub use ray::*;
pub use transpose::*;
pub use trigonometry::*;

/// Error kinds raised by the kernel.
///
/// Fallible operations return `anyhow::Result`; callers that need to
/// distinguish failure kinds can downcast to this enum.
#[derive(Debug, thiserror::Error)]
pub enum NurbsError {
    /// A precondition on the arguments was violated: non-positive degree,
    /// empty or non-monotone knot vector, parameter outside the knot range,
    /// broken sizing identity, non-positive weight, empty grid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A construction cannot proceed with the given geometry.
    #[error("geometric failure: {0}")]
    GeometricFailure(String),

    /// An iterative solver produced no usable estimate.
    #[error("non-convergence: {0}")]
    NonConvergence(String),

    /// A 2x2 system has a vanishing determinant.
    #[error("degenerate system: {0}")]
    DegenerateSystem(String),
}

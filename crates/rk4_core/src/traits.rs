use crate::error::EvaluationError;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types the equation VM can evaluate over.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// The right-hand side f(t, y) of a scalar first-order ODE dy/dt = f(t, y).
pub trait ScalarOde {
    /// Evaluates f at (t, y).
    fn derivative(&self, t: f64, y: f64) -> Result<f64, EvaluationError>;
}

/// A trait for fixed-step solvers that advance a scalar ODE.
pub trait Steppable {
    /// Performs one step of size h.
    /// t: current abscissa (updated after step)
    /// y: current ordinate (updated after step)
    ///
    /// On error neither `t` nor `y` is modified.
    fn step(
        &mut self,
        ode: &impl ScalarOde,
        t: &mut f64,
        y: &mut f64,
        h: f64,
    ) -> Result<(), EvaluationError>;
}

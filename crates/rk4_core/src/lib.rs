//! The `rk4_core` crate solves scalar first-order ODEs dy/dt = f(t, y) typed
//! in as text.
//!
//! Key components:
//! - **Traits**: `Scalar` (numeric type abstraction), `ScalarOde` (the f(t, y) seam), `Steppable` (Solvers).
//! - **Equation Engine**: Parser and bytecode VM for formulas over `t`, `y` and the constant `e`.
//! - **Solvers**: The classical fixed-step RK4 stepper.
//! - **Integrator**: `solve` drives the stepper from `t0` to `t_target` and returns the whole trajectory.

pub mod equation_engine;
pub mod error;
pub mod integrator;
pub mod problem;
pub mod render;
pub mod solution;
pub mod solvers;
pub mod traits;

pub use equation_engine::{compile, Equation};
pub use error::{
    Error, EvalFault, EvaluationError, Field, ParseError, SolveError, TimeoutError,
    ValidationError,
};
pub use integrator::{solve, solve_with, Reconciliation, SolverSettings};
pub use problem::{parse_field, OdeProblem, ProblemInput};
pub use solution::{Sample, SolutionResult, Trajectory};

//! Error taxonomy for compiling equations and integrating problems.
//!
//! Every failure is terminal for the call that reports it. Each variant carries
//! enough context (token, location, field) to render a precise message.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The expression text is malformed or references an unsupported symbol.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("invalid number '{literal}' at position {position}")]
    InvalidNumber { literal: String, position: usize },

    #[error("unexpected '{token}' at position {position}")]
    UnexpectedToken { token: String, position: usize },

    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("expected ')' to close '(' at position {open}")]
    UnclosedParen { open: usize },

    #[error("expression nests too deeply at position {position}")]
    TooDeep { position: usize },

    #[error("unknown symbol '{name}' at position {position}; only t, y and e are allowed")]
    UnknownSymbol { name: String, position: usize },

    #[error("unknown function '{name}' at position {position}")]
    UnknownFunction { name: String, position: usize },

    #[error("'{name}' at position {position} is a function and needs an argument")]
    MissingArgument { name: String, position: usize },
}

/// What went wrong inside a single evaluation of an equation.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EvalFault {
    #[error("division by zero")]
    DivisionByZero,

    #[error("{function} is undefined for {argument}")]
    Domain {
        function: &'static str,
        argument: f64,
    },

    #[error("result is not finite")]
    NonFinite,

    #[error("malformed bytecode")]
    MalformedBytecode,
}

/// An equation could not be evaluated at the given point.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("{fault} at (t = {t}, y = {y})")]
pub struct EvaluationError {
    pub t: f64,
    pub y: f64,
    pub fault: EvalFault,
}

impl EvaluationError {
    pub fn at(t: f64, y: f64, fault: EvalFault) -> Self {
        Self { t, y, fault }
    }
}

/// The numeric inputs of a problem, as named on the input form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    T0,
    Y0,
    TTarget,
    H,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::T0, Field::Y0, Field::TTarget, Field::H];

    pub fn name(self) -> &'static str {
        match self {
            Field::T0 => "t0",
            Field::Y0 => "y0",
            Field::TTarget => "t_target",
            Field::H => "h",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Problem parameters that make integration impossible or unbounded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} is not a number: '{text}'")]
    NotANumber { field: Field, text: String },

    #[error("{field} must be finite, got {value}")]
    NonFinite { field: Field, value: f64 },

    #[error("step size h must be non-zero")]
    ZeroStep,

    #[error("step size h = {h} points away from t_target (t_target - t0 = {span})")]
    WrongDirection { h: f64, span: f64 },

    #[error("integration needs {required} steps, more than the limit of {max_steps}")]
    TooManySteps { required: f64, max_steps: usize },

    #[error("step size h = {h} is below the floating-point resolution at t = {t}")]
    StepBelowResolution { h: f64, t: f64 },
}

impl ValidationError {
    /// The input field the error refers to.
    pub fn field(&self) -> Field {
        match self {
            ValidationError::NotANumber { field, .. } | ValidationError::NonFinite { field, .. } => {
                *field
            }
            ValidationError::ZeroStep
            | ValidationError::WrongDirection { .. }
            | ValidationError::TooManySteps { .. }
            | ValidationError::StepBelowResolution { .. } => Field::H,
        }
    }
}

/// A caller-imposed wall-clock bound was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("integration exceeded the {limit:?} time limit after {completed_steps} steps")]
pub struct TimeoutError {
    pub limit: Duration,
    pub completed_steps: usize,
}

/// Failure of a single `solve` run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

/// Any failure along the text-to-solution pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("could not parse equation: {0}")]
    Parse(#[from] ParseError),

    #[error("could not evaluate equation: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}

impl From<SolveError> for Error {
    fn from(err: SolveError) -> Self {
        match err {
            SolveError::Evaluation(e) => Error::Evaluation(e),
            SolveError::Validation(e) => Error::Validation(e),
            SolveError::Timeout(e) => Error::Timeout(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluation_error_reports_location() {
        let err = EvaluationError::at(1.0, 2.5, EvalFault::DivisionByZero);
        assert_eq!(err.to_string(), "division by zero at (t = 1, y = 2.5)");
    }

    #[test]
    fn validation_error_names_field() {
        let err = ValidationError::NonFinite {
            field: Field::TTarget,
            value: f64::INFINITY,
        };
        assert_eq!(err.field(), Field::TTarget);
        assert!(err.to_string().starts_with("t_target"));
        assert_eq!(ValidationError::ZeroStep.field(), Field::H);
    }

    #[test]
    fn solve_error_flattens_into_pipeline_error() {
        let err: Error = SolveError::from(ValidationError::ZeroStep).into();
        assert_eq!(err, Error::Validation(ValidationError::ZeroStep));
    }
}

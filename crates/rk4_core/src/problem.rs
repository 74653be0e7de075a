use crate::equation_engine::{compile, Equation};
use crate::error::{Error, Field, ValidationError};
use crate::integrator::{solve_with, SolverSettings};
use crate::solution::SolutionResult;
use serde::{Deserialize, Serialize};

/// An initial value problem dy/dt = f(t, y), y(t0) = y0, to be integrated up
/// to `t_target` with fixed step `h`.
#[derive(Debug, Clone, PartialEq)]
pub struct OdeProblem {
    pub equation: Equation,
    pub t0: f64,
    pub y0: f64,
    pub t_target: f64,
    pub h: f64,
}

impl OdeProblem {
    pub fn new(equation: Equation, t0: f64, y0: f64, t_target: f64, h: f64) -> Self {
        Self {
            equation,
            t0,
            y0,
            t_target,
            h,
        }
    }

    pub fn value(&self, field: Field) -> f64 {
        match field {
            Field::T0 => self.t0,
            Field::Y0 => self.y0,
            Field::TTarget => self.t_target,
            Field::H => self.h,
        }
    }

    /// Signed distance from `t0` to `t_target`.
    pub fn span(&self) -> f64 {
        self.t_target - self.t0
    }

    /// Checks that every parameter is finite and that `h` is non-zero and
    /// points towards `t_target`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for field in Field::ALL {
            let value = self.value(field);
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { field, value });
            }
        }
        if self.h == 0.0 {
            return Err(ValidationError::ZeroStep);
        }
        let span = self.span();
        if !span.is_finite() {
            return Err(ValidationError::NonFinite {
                field: Field::TTarget,
                value: self.t_target,
            });
        }
        if span != 0.0 && span.signum() != self.h.signum() {
            return Err(ValidationError::WrongDirection { h: self.h, span });
        }
        Ok(())
    }
}

/// Parses one numeric form field, requiring a finite value.
pub fn parse_field(field: Field, text: &str) -> Result<f64, ValidationError> {
    let value = text
        .trim()
        .parse::<f64>()
        .map_err(|_| ValidationError::NotANumber {
            field,
            text: text.to_string(),
        })?;
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field, value });
    }
    Ok(value)
}

/// The raw inputs of the solver form: an equation and four numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemInput {
    pub equation: String,
    pub t0: f64,
    pub y0: f64,
    pub t_target: f64,
    pub h: f64,
}

impl Default for ProblemInput {
    fn default() -> Self {
        Self {
            equation: "2 * t - 3 * y + 1".to_string(),
            t0: 1.0,
            y0: 5.0,
            t_target: 1.5,
            h: 0.01,
        }
    }
}

impl ProblemInput {
    /// Builds an input from the text of each form field.
    pub fn from_fields(
        equation: &str,
        t0: &str,
        y0: &str,
        t_target: &str,
        h: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            equation: equation.to_string(),
            t0: parse_field(Field::T0, t0)?,
            y0: parse_field(Field::Y0, y0)?,
            t_target: parse_field(Field::TTarget, t_target)?,
            h: parse_field(Field::H, h)?,
        })
    }

    /// Compiles the equation and validates the parameters.
    pub fn to_problem(&self) -> Result<OdeProblem, Error> {
        let equation = compile(&self.equation)?;
        let problem = OdeProblem::new(equation, self.t0, self.y0, self.t_target, self.h);
        problem.validate()?;
        Ok(problem)
    }

    pub fn solve(&self, settings: &SolverSettings) -> Result<SolutionResult, Error> {
        let problem = self.to_problem()?;
        Ok(solve_with(&problem, settings)?)
    }
}

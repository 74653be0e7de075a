use crate::error::{SolveError, TimeoutError, ValidationError};
use crate::problem::OdeProblem;
use crate::solution::{Sample, SolutionResult, Trajectory};
use crate::solvers::RK4;
use crate::traits::Steppable;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Relative distance from an integer below which `span / h` counts as a
/// whole number of steps.
const SNAP_TOLERANCE: f64 = 1e-9;

/// Most samples reserved up front; longer runs grow the buffer as they go.
const CAPACITY_HINT: usize = 1 << 20;

/// How the last step is handled when the span is not a multiple of `h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Reconciliation {
    /// Take a final shorter step so the last sample lands on `t_target`.
    #[default]
    ExactTarget,
    /// Take only whole steps and drop the remainder.
    FixedStepCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    pub max_steps: usize,
    #[serde(default)]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub reconciliation: Reconciliation,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            timeout: None,
            reconciliation: Reconciliation::ExactTarget,
        }
    }
}

/// Step layout of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StepPlan {
    full_steps: usize,
    /// The last full step ends exactly at `t_target`.
    lands_on_target: bool,
    partial_step: bool,
}

impl StepPlan {
    fn new(problem: &OdeProblem, settings: &SolverSettings) -> Result<Self, ValidationError> {
        problem.validate()?;
        if problem.span() != 0.0 {
            for t in [problem.t0, problem.t_target] {
                if !advances(t, problem.h) {
                    return Err(ValidationError::StepBelowResolution { h: problem.h, t });
                }
            }
        }

        let ratio = problem.span() / problem.h;
        if !ratio.is_finite() || ratio > settings.max_steps as f64 + 1.0 {
            return Err(ValidationError::TooManySteps {
                required: ratio.ceil(),
                max_steps: settings.max_steps,
            });
        }

        let nearest = ratio.round();
        let plan = if nearest >= 1.0 && (ratio - nearest).abs() <= SNAP_TOLERANCE * nearest {
            StepPlan {
                full_steps: nearest as usize,
                lands_on_target: true,
                partial_step: false,
            }
        } else {
            let full_steps = ratio.floor() as usize;
            let has_remainder = problem.span() != 0.0;
            StepPlan {
                full_steps,
                lands_on_target: false,
                partial_step: has_remainder
                    && settings.reconciliation == Reconciliation::ExactTarget,
            }
        };

        let total = plan.full_steps + usize::from(plan.partial_step);
        if total > settings.max_steps {
            return Err(ValidationError::TooManySteps {
                required: total as f64,
                max_steps: settings.max_steps,
            });
        }
        Ok(plan)
    }
}

/// Whether a step of `h` from `t` moves by `h` in floating point. Each
/// sample sits at `t0 + i*h`, so a step the sum cannot represent would repeat
/// or bunch up abscissae.
fn advances(t: f64, h: f64) -> bool {
    let moved = (t + h) - t;
    moved != 0.0 && ((moved - h) / h).abs() <= 1e-3
}

struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    fn check(&self, completed_steps: usize) -> Result<(), TimeoutError> {
        if self.started.elapsed() >= self.limit {
            return Err(TimeoutError {
                limit: self.limit,
                completed_steps,
            });
        }
        Ok(())
    }
}

/// Integrates `problem` with classical RK4 using the default settings.
pub fn solve(problem: &OdeProblem) -> Result<SolutionResult, SolveError> {
    solve_with(problem, &SolverSettings::default())
}

/// Integrates `problem` with classical RK4.
///
/// Samples are taken at `t0 + i*h`. Unless `settings.reconciliation` asks for
/// a fixed step count, a final shorter step lands the last sample exactly on
/// `t_target`. Any failure discards the whole trajectory.
pub fn solve_with(
    problem: &OdeProblem,
    settings: &SolverSettings,
) -> Result<SolutionResult, SolveError> {
    let result = integrate(problem, settings);
    match &result {
        Ok(solution) => debug!(
            "solved {:?}: {} samples, y({}) = {}",
            problem.equation.source(),
            solution.trajectory.len(),
            solution.final_time(),
            solution.final_value
        ),
        Err(err) => warn!("solve of {:?} failed: {}", problem.equation.source(), err),
    }
    result
}

fn integrate(problem: &OdeProblem, settings: &SolverSettings) -> Result<SolutionResult, SolveError> {
    let plan = StepPlan::new(problem, settings)?;
    debug!(
        "integrating from t = {} to t = {} with h = {}: {:?}",
        problem.t0, problem.t_target, problem.h, plan
    );

    let deadline = settings.timeout.map(|limit| Deadline {
        started: Instant::now(),
        limit,
    });

    let mut samples = Vec::with_capacity(plan.full_steps.min(CAPACITY_HINT) + 2);
    samples.push(Sample {
        t: problem.t0,
        y: problem.y0,
    });

    let mut solver = RK4::new();
    let mut t = problem.t0;
    let mut y = problem.y0;

    for i in 1..=plan.full_steps {
        let t_next = if plan.lands_on_target && i == plan.full_steps {
            problem.t_target
        } else {
            problem.t0 + i as f64 * problem.h
        };
        let dt = t_next - t;
        solver.step(&problem.equation, &mut t, &mut y, dt)?;
        t = t_next;
        samples.push(Sample { t, y });

        if let Some(deadline) = &deadline {
            deadline.check(i)?;
        }
    }

    if plan.partial_step {
        let dt = problem.t_target - t;
        solver.step(&problem.equation, &mut t, &mut y, dt)?;
        t = problem.t_target;
        samples.push(Sample { t, y });
    }

    debug!("{} right-hand side evaluations", solver.evaluations());

    Ok(SolutionResult {
        trajectory: Trajectory::new(samples),
        final_value: y,
    })
}

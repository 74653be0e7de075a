use crate::error::{EvalFault, EvaluationError};
use crate::traits::{ScalarOde, Steppable};

/// Classic Runge-Kutta 4th Order Solver
#[derive(Debug, Default, Clone, Copy)]
pub struct RK4 {
    evaluations: usize,
}

impl RK4 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of right-hand side evaluations performed so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}

impl Steppable for RK4 {
    fn step(
        &mut self,
        ode: &impl ScalarOde,
        t: &mut f64,
        y: &mut f64,
        h: f64,
    ) -> Result<(), EvaluationError> {
        let t0 = *t;
        let y0 = *y;
        let half = 0.5 * h;

        // k1 = f(t, y)
        let k1 = ode.derivative(t0, y0)?;
        self.evaluations += 1;

        // k2 = f(t + h/2, y + h*k1/2)
        let k2 = ode.derivative(t0 + half, y0 + half * k1)?;
        self.evaluations += 1;

        // k3 = f(t + h/2, y + h*k2/2)
        let k3 = ode.derivative(t0 + half, y0 + half * k2)?;
        self.evaluations += 1;

        // k4 = f(t + h, y + h*k3)
        let k4 = ode.derivative(t0 + h, y0 + h * k3)?;
        self.evaluations += 1;

        // y_next = y + h/6 * (k1 + 2k2 + 2k3 + k4)
        let y_next = y0 + h / 6.0 * (k1 + 2.0 * k2 + 2.0 * k3 + k4);
        if !y_next.is_finite() {
            return Err(EvaluationError::at(t0, y0, EvalFault::NonFinite));
        }

        *y = y_next;
        *t = t0 + h;
        Ok(())
    }
}

//! Integration runners and the solution handle returned to JS.

use crate::system::{to_js_error, WasmEquation};
use rk4_core::{
    solve_with, Equation, Error, OdeProblem, ProblemInput, SolutionResult, SolverSettings,
};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

/// An immutable solution; a new one replaces it on every compute.
#[wasm_bindgen]
pub struct WasmSolution {
    result: SolutionResult,
}

#[wasm_bindgen]
impl WasmSolution {
    pub fn final_value(&self) -> f64 {
        self.result.final_value()
    }

    pub fn final_time(&self) -> f64 {
        self.result.final_time()
    }

    pub fn len(&self) -> usize {
        self.result.trajectory().len()
    }

    pub fn is_empty(&self) -> bool {
        self.result.trajectory().is_empty()
    }

    /// Plot x values.
    pub fn times(&self) -> Vec<f64> {
        self.result.trajectory().times()
    }

    /// Plot y values.
    pub fn values(&self) -> Vec<f64> {
        self.result.trajectory().values()
    }

    /// `{ trajectory: [{ t, y }, ...], final_value }`
    pub fn to_js(&self) -> Result<JsValue, JsValue> {
        to_value(&self.result)
            .map_err(|err| JsValue::from_str(&format!("Failed to serialize solution: {err}")))
    }
}

/// Timeouts rely on `std::time::Instant`, which wasm32-unknown-unknown lacks.
fn bridge_settings(mut settings: SolverSettings) -> SolverSettings {
    if cfg!(target_arch = "wasm32") {
        settings.timeout = None;
    }
    settings
}

pub(crate) fn run(
    equation: &Equation,
    t0: f64,
    y0: f64,
    t_target: f64,
    h: f64,
    settings: SolverSettings,
) -> Result<SolutionResult, Error> {
    let problem = OdeProblem::new(equation.clone(), t0, y0, t_target, h);
    Ok(solve_with(&problem, &bridge_settings(settings))?)
}

pub(crate) fn run_input(
    input: &ProblemInput,
    settings: SolverSettings,
) -> Result<SolutionResult, Error> {
    input.solve(&bridge_settings(settings))
}

#[wasm_bindgen]
impl WasmEquation {
    pub fn solve(&self, t0: f64, y0: f64, t_target: f64, h: f64) -> Result<WasmSolution, JsValue> {
        let result = run(&self.equation, t0, y0, t_target, h, SolverSettings::default())
            .map_err(to_js_error)?;
        Ok(WasmSolution { result })
    }

    pub fn solve_with_settings(
        &self,
        t0: f64,
        y0: f64,
        t_target: f64,
        h: f64,
        settings: JsValue,
    ) -> Result<WasmSolution, JsValue> {
        let settings: SolverSettings = from_value(settings)
            .map_err(|err| JsValue::from_str(&format!("Invalid solver settings: {err}")))?;
        let result = run(&self.equation, t0, y0, t_target, h, settings).map_err(to_js_error)?;
        Ok(WasmSolution { result })
    }
}

/// Solves a serialized `ProblemInput` (`{ equation, t0, y0, t_target, h }`).
#[wasm_bindgen]
pub fn solve_input(input: JsValue) -> Result<WasmSolution, JsValue> {
    console_error_panic_hook::set_once();

    let input: ProblemInput = from_value(input)
        .map_err(|err| JsValue::from_str(&format!("Invalid problem input: {err}")))?;
    let result = run_input(&input, SolverSettings::default()).map_err(to_js_error)?;
    Ok(WasmSolution { result })
}

/// Solves straight from the text of the five form fields.
#[wasm_bindgen]
pub fn solve_fields(
    equation: &str,
    t0: &str,
    y0: &str,
    t_target: &str,
    h: &str,
) -> Result<WasmSolution, JsValue> {
    console_error_panic_hook::set_once();

    let input = ProblemInput::from_fields(equation, t0, y0, t_target, h).map_err(to_js_error)?;
    let result = run_input(&input, SolverSettings::default()).map_err(to_js_error)?;
    Ok(WasmSolution { result })
}

/// The form's initial contents.
#[wasm_bindgen]
pub fn default_input() -> Result<JsValue, JsValue> {
    to_value(&ProblemInput::default())
        .map_err(|err| JsValue::from_str(&format!("Failed to serialize input: {err}")))
}

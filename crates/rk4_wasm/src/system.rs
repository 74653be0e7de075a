//! Core WASM equation wrapper and low-level utilities.

use rk4_core::{compile, Equation};
use std::fmt::Display;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct WasmEquation {
    pub(crate) equation: Equation,
}

pub(crate) fn to_js_error(err: impl Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

pub(crate) fn build_equation(source: &str) -> Result<Equation, rk4_core::ParseError> {
    compile(source)
}

#[wasm_bindgen]
impl WasmEquation {
    #[wasm_bindgen(constructor)]
    pub fn new(source: &str) -> Result<WasmEquation, JsValue> {
        console_error_panic_hook::set_once();

        let equation = build_equation(source).map_err(to_js_error)?;
        Ok(WasmEquation { equation })
    }

    pub fn source(&self) -> String {
        self.equation.source().to_string()
    }

    /// Canonical infix form of the equation.
    pub fn display(&self) -> String {
        self.equation.to_string()
    }

    /// LaTeX for a `dy/dt = ...` plot title.
    pub fn latex(&self) -> String {
        self.equation.to_latex()
    }

    pub fn evaluate(&self, t: f64, y: f64) -> Result<f64, JsValue> {
        self.equation.evaluate(t, y).map_err(to_js_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_equation_rejects_invalid_equation() {
        let result = build_equation("1 +");
        assert!(result.is_err(), "expected parse error for invalid equation");
    }

    #[test]
    fn wasm_equation_renders_and_evaluates() {
        let equation = WasmEquation::new("2 * t - 3 * y + 1").expect("equation");
        assert_eq!(equation.source(), "2 * t - 3 * y + 1");
        assert_eq!(equation.display(), "2 * t - 3 * y + 1");
        assert_eq!(equation.latex(), "2 \\cdot t - 3 \\cdot y + 1");
        let value = equation.evaluate(1.0, 5.0).expect("evaluate");
        assert!((value + 12.0).abs() < 1e-12);
    }
}

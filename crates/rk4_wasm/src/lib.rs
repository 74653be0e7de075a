//! WASM bridge: compiles equations and runs the RK4 integrator for a browser
//! front end. All numerical work happens in `rk4_core`.

mod solver;
mod system;

pub use solver::{default_input, solve_fields, solve_input, WasmSolution};
pub use system::WasmEquation;

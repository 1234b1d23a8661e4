//! WASM bridge for the balloon stack solver.
//!
//! Parameters and settings cross the boundary as plain JS objects mirroring the serde shapes
//! of `balloon_core`; results come back the same way.

use balloon_core::{PressureLaw, SolverSettings, UserParameters};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

mod runner;

pub use runner::WasmBalloonRunner;

pub(crate) fn parse_params(value: JsValue) -> Result<UserParameters, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(UserParameters::default());
    }
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid parameters: {}", e)))
}

pub(crate) fn parse_settings(value: JsValue) -> Result<SolverSettings, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(SolverSettings::default());
    }
    from_value(value).map_err(|e| JsValue::from_str(&format!("Invalid solver settings: {}", e)))
}

fn solve(params: JsValue, settings: JsValue, law: PressureLaw) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();
    let params = parse_params(params)?;
    let settings = parse_settings(settings)?;
    let shape = balloon_core::solve_with(&params, law, &settings)
        .map_err(|e| JsValue::from_str(&format!("Equilibrium solve failed: {}", e)))?;
    to_value(&shape).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Solves with every chamber held at its target pressure.
#[wasm_bindgen]
pub fn solve_isobaric(params: JsValue, settings: JsValue) -> Result<JsValue, JsValue> {
    solve(params, settings, PressureLaw::Isobaric)
}

#[wasm_bindgen]
pub fn solve_adiabatic(params: JsValue, settings: JsValue) -> Result<JsValue, JsValue> {
    solve(params, settings, PressureLaw::Adiabatic)
}

/// Default two-level parameters, as a starting point for UI forms.
#[wasm_bindgen]
pub fn default_parameters() -> Result<JsValue, JsValue> {
    to_value(&UserParameters::default())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
pub fn three_level_parameters() -> Result<JsValue, JsValue> {
    to_value(&UserParameters::three_level())
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

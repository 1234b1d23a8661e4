//! Stepped solver runner, so a UI can draw progress between batches of Newton iterations.

use balloon_core::bootstrap::Bootstrap;
use balloon_core::equilibrium::{DriverPhase, NewtonDriver};
use balloon_core::result::project_outcome;
use balloon_core::solve::{prepare, MembraneSystem};
use balloon_core::PressureLaw;
use serde::Serialize;
use serde_wasm_bindgen::to_value;
use wasm_bindgen::prelude::*;

use crate::{parse_params, parse_settings};

/// Progress payload for the stepped solver.
#[derive(Serialize)]
struct BalloonSolveProgress {
    done: bool,
    iterations: usize,
    max_steps: usize,
    residual_norm: f64,
}

#[wasm_bindgen]
pub struct WasmBalloonRunner {
    boot: Bootstrap,
    driver: NewtonDriver<MembraneSystem>,
}

#[wasm_bindgen]
impl WasmBalloonRunner {
    #[wasm_bindgen(constructor)]
    pub fn new(
        params: JsValue,
        adiabatic: bool,
        settings: JsValue,
    ) -> Result<WasmBalloonRunner, JsValue> {
        console_error_panic_hook::set_once();

        let params = parse_params(params)?;
        let settings = parse_settings(settings)?;
        let law = if adiabatic {
            PressureLaw::Adiabatic
        } else {
            PressureLaw::Isobaric
        };
        let (boot, driver) = prepare(&params, law, &settings)
            .map_err(|e| JsValue::from_str(&format!("Runner setup failed: {}", e)))?;

        Ok(WasmBalloonRunner { boot, driver })
    }

    pub fn is_done(&self) -> bool {
        self.driver.phase().is_terminal()
    }

    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        for _ in 0..batch_size {
            let phase = self
                .driver
                .step()
                .map_err(|e| JsValue::from_str(&format!("{}", e)))?;
            if phase.is_terminal() {
                break;
            }
        }

        self.get_progress()
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        let driver = &self.driver;
        let progress = BalloonSolveProgress {
            done: matches!(
                driver.phase(),
                DriverPhase::Converged | DriverPhase::MaxIterationsReached
            ),
            iterations: driver.iterations(),
            max_steps: driver.settings().max_steps,
            residual_norm: driver.residual_norm(),
        };
        to_value(&progress).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Shape of the finished solve; at the iteration cap this is the best state reached.
    pub fn get_result(&self) -> Result<JsValue, JsValue> {
        let outcome = self
            .driver
            .outcome()
            .ok_or_else(|| JsValue::from_str("Equilibrium solver has not finished yet."))?;
        let shape = project_outcome(&self.boot, self.driver.system().law(), &outcome);

        to_value(&shape).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// The starting shape, for drawing before the first batch.
    pub fn get_initial_shape(&self) -> Result<JsValue, JsValue> {
        to_value(&self.boot.initial_shape())
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

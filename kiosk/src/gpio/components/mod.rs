/*
 *   Copyright (c) 2025 R3BL LLC
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! The appliance's logical devices.

pub mod button;
pub mod coin_validator;

pub use button::CategoryButton;
pub use coin_validator::CoinValidator;

use super::registry::{ComponentRegistry, RegistryError};
use crate::config::KioskConfig;

/// Component id of the single coin validator.
pub const COIN_VALIDATOR_ID: &str = "coin_validator";

/// Build and register the configured devices: one category button per entry
/// in `BUTTON_PINS` (position = index) and one coin validator.
///
/// # Errors
///
/// Returns an error when ids collide, which can only happen with a duplicate
/// pin list entry.
pub fn register_components(
    registry: &mut ComponentRegistry,
    config: &KioskConfig,
) -> Result<(), RegistryError> {
    for (position, pin) in config.button_pins.iter().enumerate() {
        registry.register(Box::new(CategoryButton::new(
            format!("category_button_{position}"),
            position,
            *pin,
            config.button_bounce,
        )))?;
    }
    registry.register(Box::new(CoinValidator::new(
        COIN_VALIDATOR_ID,
        config.coin_pin,
        config.coin_bounce,
        config.coin_pulse_timeout,
    )))?;
    Ok(())
}

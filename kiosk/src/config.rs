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

//! Appliance configuration, loaded from environment variables at startup.
//!
//! Every recognized key has a default, so an empty environment produces a
//! runnable (mock-hardware, local-SQLite) appliance. Any malformed value is a
//! [`StartupConfigError`]; the process must abort before accepting events, so
//! parsing never degrades to a default silently.

use std::{collections::BTreeMap, env, net::SocketAddr, str::FromStr, time::Duration};

use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing_core::LevelFilter;

pub const DEFAULT_APP_NAME: &str = "GiveBox";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://givebox.db";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8765";
pub const DEFAULT_BUTTON_PINS: &str = "17,27,22";
pub const DEFAULT_COIN_PIN: u8 = 23;
/// HX-916 factory presets: pulses per coin → value in cents.
pub const DEFAULT_PULSE_VALUES: &str = "1:10,2:20,3:50,4:100,5:200";

/// Raised while reading the environment at boot. Maps to a non-zero exit code
/// before any event is accepted.
#[derive(Debug, Error)]
pub enum StartupConfigError {
    #[error("invalid value for `{key}`: `{value}` ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error(
        "PIN_FACTORY `{requested}` names a hardware backend that is not linked into \
         this build; use `mock`, or rebuild with a real GPIO backend"
    )]
    UnsupportedPinBackend { requested: PinFactoryKind },
}

/// Which GPIO backend provides pins. Only [`PinFactoryKind::Mock`] is linked
/// into this build; the other selectors name Raspberry Pi backends that real
/// deployments plug in behind the `PinDriver` trait.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PinFactoryKind {
    Mock,
    Native,
    Lgpio,
    Rpigpio,
}

/// Parsed `ALLOWED_ORIGINS`. Retained for the management HTTP layer that sits
/// in front of the appliance; the display listener does not consult it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Accepts `*`, a JSON array (`["http://a","http://b"]`), a comma list, or
    /// a single origin.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed == "*" {
            return Self::Any;
        }
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str(trimmed) {
            let origins = items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_owned))
                .collect();
            return Self::List(origins);
        }
        if trimmed.contains(',') {
            return Self::List(
                trimmed
                    .split(',')
                    .map(|origin| origin.trim().to_owned())
                    .filter(|origin| !origin.is_empty())
                    .collect(),
            );
        }
        Self::List(vec![trimmed.to_owned()])
    }
}

/// Everything the appliance reads from the environment, post-parse.
#[derive(Clone, Debug)]
pub struct KioskConfig {
    pub app_name: String,
    pub debug: bool,
    pub log_level: LevelFilter,
    pub database_url: String,
    pub allowed_origins: AllowedOrigins,
    pub enable_gpio: bool,
    pub pin_factory: PinFactoryKind,
    pub listen_addr: SocketAddr,

    /// BCM pin numbers; the button at index i selects category position i.
    pub button_pins: Vec<u8>,
    pub coin_pin: u8,
    /// Hardware-level contact debounce, passed to the pin driver.
    pub button_bounce: Duration,
    pub coin_bounce: Duration,
    /// Quiet time that ends one coin pulse sequence.
    pub coin_pulse_timeout: Duration,

    /// Rolling debounce window for category selection.
    pub button_debounce: Duration,
    /// Rolling debounce window after the last coin insertion.
    pub coin_debounce: Duration,
    /// TTL on each correlation slot, measured from its own timestamp.
    pub slot_ttl: Duration,
    pub pulse_values: BTreeMap<u32, i64>,
    pub min_donation_cents: i64,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.into(),
            debug: false,
            log_level: LevelFilter::INFO,
            database_url: DEFAULT_DATABASE_URL.into(),
            allowed_origins: AllowedOrigins::Any,
            enable_gpio: false,
            pin_factory: PinFactoryKind::Mock,
            listen_addr: DEFAULT_LISTEN_ADDR.parse().unwrap(),
            button_pins: parse_pin_list(DEFAULT_BUTTON_PINS).unwrap(),
            coin_pin: DEFAULT_COIN_PIN,
            button_bounce: Duration::from_millis(200),
            coin_bounce: Duration::from_millis(10),
            coin_pulse_timeout: Duration::from_millis(300),
            button_debounce: Duration::from_millis(2_000),
            coin_debounce: Duration::from_millis(2_000),
            slot_ttl: Duration::from_secs(30),
            pulse_values: parse_pulse_values(DEFAULT_PULSE_VALUES).unwrap(),
            min_donation_cents: 1,
        }
    }
}

impl KioskConfig {
    /// Read and validate the full configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`StartupConfigError`] for any malformed value, or when a
    /// non-mock `PIN_FACTORY` is selected while `ENABLE_GPIO` is on.
    pub fn try_from_env() -> Result<Self, StartupConfigError> {
        let defaults = Self::default();

        let config = Self {
            app_name: env_string("APP_NAME", defaults.app_name),
            debug: env_bool("DEBUG", defaults.debug)?,
            log_level: env_log_level("LOG_LEVEL", defaults.log_level)?,
            database_url: env_string("DATABASE_URL", defaults.database_url),
            allowed_origins: match env::var("ALLOWED_ORIGINS") {
                Ok(raw) => AllowedOrigins::parse(&raw),
                Err(_) => defaults.allowed_origins,
            },
            enable_gpio: env_bool("ENABLE_GPIO", defaults.enable_gpio)?,
            pin_factory: env_from_str("PIN_FACTORY", defaults.pin_factory)?,
            listen_addr: env_from_str("LISTEN_ADDR", defaults.listen_addr)?,
            button_pins: match env::var("BUTTON_PINS") {
                Ok(raw) => parse_pin_list(&raw).map_err(|reason| {
                    StartupConfigError::Invalid {
                        key: "BUTTON_PINS",
                        value: raw,
                        reason,
                    }
                })?,
                Err(_) => defaults.button_pins,
            },
            coin_pin: env_from_str("COIN_PIN", defaults.coin_pin)?,
            button_bounce: env_millis("BUTTON_BOUNCE_MS", defaults.button_bounce)?,
            coin_bounce: env_millis("COIN_BOUNCE_MS", defaults.coin_bounce)?,
            coin_pulse_timeout: env_millis(
                "COIN_PULSE_TIMEOUT_MS",
                defaults.coin_pulse_timeout,
            )?,
            button_debounce: env_millis("BUTTON_DEBOUNCE_MS", defaults.button_debounce)?,
            coin_debounce: env_millis("COIN_DEBOUNCE_MS", defaults.coin_debounce)?,
            slot_ttl: env_secs("SLOT_TTL_SECS", defaults.slot_ttl)?,
            pulse_values: match env::var("PULSE_VALUES") {
                Ok(raw) => parse_pulse_values(&raw).map_err(|reason| {
                    StartupConfigError::Invalid {
                        key: "PULSE_VALUES",
                        value: raw,
                        reason,
                    }
                })?,
                Err(_) => defaults.pulse_values,
            },
            min_donation_cents: env_from_str(
                "MIN_DONATION_CENTS",
                defaults.min_donation_cents,
            )?,
        };

        // The only pin backend linked into this build is the mock one. Catch a
        // misconfigured appliance at boot rather than at first button press.
        if config.enable_gpio && config.pin_factory != PinFactoryKind::Mock {
            return Err(StartupConfigError::UnsupportedPinBackend {
                requested: config.pin_factory,
            });
        }

        Ok(config)
    }
}

fn env_string(key: &'static str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, StartupConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(StartupConfigError::Invalid {
                key,
                value: raw,
                reason: "expected a boolean (1/0, true/false, yes/no, on/off)".into(),
            }),
        },
    }
}

fn env_from_str<T>(key: &'static str, default: T) -> Result<T, StartupConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err: T::Err| StartupConfigError::Invalid {
                key,
                value: raw,
                reason: err.to_string(),
            }),
    }
}

fn env_millis(key: &'static str, default: Duration) -> Result<Duration, StartupConfigError> {
    let millis = env_from_str::<u64>(key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(millis))
}

fn env_secs(key: &'static str, default: Duration) -> Result<Duration, StartupConfigError> {
    let secs = env_from_str::<u64>(key, default.as_secs())?;
    Ok(Duration::from_secs(secs))
}

fn env_log_level(
    key: &'static str,
    default: LevelFilter,
) -> Result<LevelFilter, StartupConfigError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => {
            LevelFilter::from_str(raw.trim()).map_err(|_| StartupConfigError::Invalid {
                key,
                value: raw,
                reason: "expected one of off, error, warn, info, debug, trace".into(),
            })
        }
    }
}

fn parse_pin_list(raw: &str) -> Result<Vec<u8>, String> {
    let pins = raw
        .split(',')
        .map(|pin| {
            pin.trim()
                .parse::<u8>()
                .map_err(|_| format!("`{}` is not a pin number", pin.trim()))
        })
        .collect::<Result<Vec<u8>, String>>()?;
    if pins.is_empty() {
        return Err("at least one button pin is required".into());
    }
    Ok(pins)
}

fn parse_pulse_values(raw: &str) -> Result<BTreeMap<u32, i64>, String> {
    let mut table = BTreeMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        let (pulses, cents) = entry
            .split_once(':')
            .ok_or_else(|| format!("`{entry}` is not of the form pulses:cents"))?;
        let pulses = pulses
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("`{}` is not a pulse count", pulses.trim()))?;
        let cents = cents
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("`{}` is not a cent amount", cents.trim()))?;
        if cents <= 0 {
            return Err(format!("pulse value for {pulses} pulses must be positive"));
        }
        table.insert(pulses, cents);
    }
    if table.is_empty() {
        return Err("at least one pulse:cents entry is required".into());
    }
    Ok(table)
}

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

//! The transient event record that crosses from hardware callback threads
//! into the cooperative loop.

use std::{fmt, time::Instant};

use strum_macros::{Display, EnumString};

/// Identifies one logical device in the component registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self { Self::new(id) }
}

/// The closed set of event kinds the pipeline routes. Handlers are bound per
/// kind in a component's static handler table; there is no stringly-typed
/// dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    ButtonPressed,
    ButtonReleased,
    CoinInserted,
}

/// Opaque per-event payload. Producers attach what they know (pin number,
/// pulse count); handlers pick out what they need.
pub type EventData = serde_json::Map<String, serde_json::Value>;

/// One raw hardware notification.
///
/// `at` is a monotonic instant taken when the edge was observed, used for
/// ordering and latency accounting only; wall-clock instants come from the
/// injected [`crate::Clock`] at the moment state is written.
#[derive(Clone, Debug)]
pub struct GpioEvent {
    pub component_id: ComponentId,
    pub kind: EventKind,
    pub data: EventData,
    pub at: Instant,
}

impl GpioEvent {
    pub fn new(component_id: impl Into<ComponentId>, kind: EventKind) -> Self {
        Self {
            component_id: component_id.into(),
            kind,
            data: EventData::new(),
            at: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_owned(), value.into());
        self
    }

    /// Read back a numeric field attached with [`Self::with_field`].
    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(serde_json::Value::as_u64)
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self { Self::new(id) }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn event_kind_displays_snake_case() {
        assert_eq!(EventKind::ButtonPressed.to_string(), "button_pressed");
        assert_eq!(EventKind::CoinInserted.to_string(), "coin_inserted");
    }

    #[test]
    fn data_fields_round_trip() {
        let event = GpioEvent::new("coin_validator", EventKind::CoinInserted)
            .with_field("pin", 23)
            .with_field("pulse_count", 3);

        assert_eq!(event.u64_field("pulse_count"), Some(3));
        assert_eq!(event.u64_field("pin"), Some(23));
        assert_eq!(event.u64_field("missing"), None);
    }
}

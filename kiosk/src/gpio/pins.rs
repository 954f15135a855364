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

//! The hardware driver seam.
//!
//! The appliance treats the GPIO driver as a pure edge-event source: claim an
//! input pin, get edge callbacks on threads the driver owns, release the pin
//! on stop. [`MockPinDriver`] is the complete in-repo backend; it is the
//! production choice whenever GPIO is disabled, and lets tests fire edges
//! from arbitrary threads. Real Raspberry Pi backends implement [`PinDriver`]
//! out of tree.

use std::{collections::HashMap,
          fmt,
          sync::{Arc, Mutex},
          time::Duration};

use miette::miette;

/// Direction of an observed edge, after the driver's own contact debounce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    /// The input became active (button down, coin pulse low).
    Activated,
    /// The input returned to rest.
    Deactivated,
}

/// Invoked by the driver on its own callback threads. Implementations must
/// only do wait-free work (in this codebase: an [`crate::gpio::EventTap`]
/// enqueue or an atomic increment).
pub type EdgeCallback = Arc<dyn Fn(Edge) + Send + Sync>;

/// Parameters for claiming one input pin.
#[derive(Clone, Copy, Debug)]
pub struct PinRequest {
    /// BCM pin number.
    pub pin: u8,
    /// Pull-up (active-low wiring, the HX-916 and button default) vs
    /// pull-down.
    pub pull_up: bool,
    /// Contact debounce applied inside the driver.
    pub bounce: Duration,
}

/// One claimed input pin producing edge notifications.
pub trait EdgeSource: Send + Sync {
    fn set_edge_callback(&mut self, callback: EdgeCallback);

    /// Release the pin. Called on component stop; after this no further
    /// callbacks fire.
    fn release(&mut self);
}

/// Factory for claimed pins. The only part of the hardware stack the core
/// knows about.
pub trait PinDriver: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the pin is unavailable (eg: already claimed).
    fn try_claim_input(&self, request: PinRequest) -> miette::Result<Box<dyn EdgeSource>>;
}

#[derive(Default)]
struct MockPinState {
    claimed: bool,
    callback: Option<EdgeCallback>,
}

/// In-memory pin backend. Edges fired via [`MockPinDriver::fire_edge`] invoke
/// the claiming component's callback synchronously on the calling thread,
/// which is exactly how a real driver's callback thread behaves from the
/// component's point of view.
#[derive(Default)]
pub struct MockPinDriver {
    pins: Mutex<HashMap<u8, Arc<Mutex<MockPinState>>>>,
}

impl fmt::Debug for MockPinDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let claimed: Vec<u8> = {
            let pins = self.pins.lock().unwrap();
            pins.iter()
                .filter(|(_, state)| state.lock().unwrap().claimed)
                .map(|(pin, _)| *pin)
                .collect()
        };
        f.debug_struct("MockPinDriver")
            .field("claimed_pins", &claimed)
            .finish()
    }
}

impl MockPinDriver {
    pub fn new() -> Self { Self::default() }

    /// Simulate one hardware edge on `pin`. Returns `false` when the pin is
    /// not claimed or has no callback attached yet.
    pub fn fire_edge(&self, pin: u8, edge: Edge) -> bool {
        let maybe_callback = {
            let pins = self.pins.lock().unwrap();
            pins.get(&pin)
                .and_then(|state| state.lock().unwrap().callback.clone())
        };
        match maybe_callback {
            Some(callback) => {
                callback(edge);
                true
            }
            None => false,
        }
    }

    /// Convenience for coin validators: a burst of activation pulses.
    pub fn fire_pulses(&self, pin: u8, count: u32) {
        for _ in 0..count {
            self.fire_edge(pin, Edge::Activated);
            self.fire_edge(pin, Edge::Deactivated);
        }
    }
}

impl PinDriver for MockPinDriver {
    fn try_claim_input(&self, request: PinRequest) -> miette::Result<Box<dyn EdgeSource>> {
        let mut pins = self.pins.lock().unwrap();
        let state = pins.entry(request.pin).or_default();
        {
            let mut state = state.lock().unwrap();
            if state.claimed {
                return Err(miette!("pin {} is already claimed", request.pin));
            }
            state.claimed = true;
        }
        Ok(Box::new(MockEdgeSource {
            pin: request.pin,
            state: state.clone(),
        }))
    }
}

struct MockEdgeSource {
    pin: u8,
    state: Arc<Mutex<MockPinState>>,
}

impl EdgeSource for MockEdgeSource {
    fn set_edge_callback(&mut self, callback: EdgeCallback) {
        self.state.lock().unwrap().callback = Some(callback);
    }

    fn release(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.claimed = false;
        state.callback = None;
        tracing::debug!(message = "Mock pin released", pin = self.pin);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    fn request(pin: u8) -> PinRequest {
        PinRequest {
            pin,
            pull_up: true,
            bounce: Duration::from_millis(10),
        }
    }

    #[test]
    fn edges_reach_the_callback_from_another_thread() {
        let driver = Arc::new(MockPinDriver::new());
        let mut source = driver.try_claim_input(request(17)).unwrap();

        let hits = Arc::new(AtomicU32::new(0));
        let hits_in_callback = hits.clone();
        source.set_edge_callback(Arc::new(move |edge| {
            if edge == Edge::Activated {
                hits_in_callback.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let driver_on_thread = driver.clone();
        std::thread::spawn(move || {
            driver_on_thread.fire_pulses(17, 3);
        })
        .join()
        .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn double_claim_is_an_error() {
        let driver = MockPinDriver::new();
        let _first = driver.try_claim_input(request(23)).unwrap();

        assert!(driver.try_claim_input(request(23)).is_err());
    }

    #[test]
    fn released_pin_fires_no_callbacks_and_can_be_reclaimed() {
        let driver = MockPinDriver::new();
        let mut source = driver.try_claim_input(request(5)).unwrap();
        source.set_edge_callback(Arc::new(|_| panic!("released pin fired")));
        source.release();

        assert!(!driver.fire_edge(5, Edge::Activated));
        assert!(driver.try_claim_input(request(5)).is_ok());
    }
}

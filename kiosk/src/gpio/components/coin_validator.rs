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

//! Coin validator (HX-916 style).
//!
//! The validator signals a coin's value as a burst of pulses on one input
//! pin. Pulse edges are counted with atomics on the driver's callback thread;
//! a monitor task samples the accumulator and emits a single
//! `coin_inserted{pulse_count}` event once the line has been quiet for
//! `pulse_timeout`. The handler forwards the pulse count to the correlation
//! engine, which owns the pulse→cents table.

use std::{sync::{Arc,
                 atomic::{AtomicU32, AtomicU64, Ordering}},
          time::{Duration, Instant}};

use tokio::task::JoinHandle;

use super::super::{bridge::EventTap,
                   event::{ComponentId, EventKind, GpioEvent},
                   pins::{Edge, EdgeSource, PinDriver, PinRequest},
                   registry::{GpioComponent, HandlerTable}};

/// How often the monitor samples the pulse accumulator.
const MONITOR_SAMPLE_INTERVAL: Duration = Duration::from_millis(50);

/// Lock-free pulse window shared between the driver's callback thread and the
/// monitor task.
struct PulseAccumulator {
    count: AtomicU32,
    /// Milliseconds since `base` of the most recent pulse.
    last_pulse_ms: AtomicU64,
    base: Instant,
}

impl PulseAccumulator {
    fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            last_pulse_ms: AtomicU64::new(0),
            base: Instant::now(),
        }
    }

    fn record_pulse(&self) {
        self.last_pulse_ms
            .store(self.base.elapsed().as_millis() as u64, Ordering::Release);
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn quiet_for(&self) -> Duration {
        let last = self.last_pulse_ms.load(Ordering::Acquire);
        self.base
            .elapsed()
            .saturating_sub(Duration::from_millis(last))
    }

    /// Take the accumulated count, resetting the window for the next coin.
    fn take(&self) -> u32 { self.count.swap(0, Ordering::AcqRel) }

    fn pending(&self) -> u32 { self.count.load(Ordering::Acquire) }
}

pub struct CoinValidator {
    component_id: ComponentId,
    pin: u8,
    bounce: Duration,
    /// Quiet time after which a pulse sequence counts as one complete coin.
    pulse_timeout: Duration,
    pulses: Arc<PulseAccumulator>,
    source: Option<Box<dyn EdgeSource>>,
    monitor: Option<JoinHandle<()>>,
}

impl CoinValidator {
    pub fn new(
        component_id: impl Into<ComponentId>,
        pin: u8,
        bounce: Duration,
        pulse_timeout: Duration,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            pin,
            bounce,
            pulse_timeout,
            pulses: Arc::new(PulseAccumulator::new()),
            source: None,
            monitor: None,
        }
    }
}

impl GpioComponent for CoinValidator {
    fn component_id(&self) -> ComponentId { self.component_id.clone() }

    fn build_handler_table(&self) -> HandlerTable {
        let mut table = HandlerTable::new();
        table.bind(EventKind::CoinInserted, |event, container| async move {
            match event.u64_field("pulse_count") {
                Some(pulse_count) => {
                    container
                        .correlation_engine
                        .coin_inserted(pulse_count as u32)
                        .await;
                    Ok(())
                }
                None => Err(miette::miette!(
                    "coin_inserted event from `{}` carries no pulse_count",
                    event.component_id
                )),
            }
        });
        table
    }

    fn try_start(&mut self, driver: &dyn PinDriver, tap: EventTap) -> miette::Result<()> {
        let mut source = driver.try_claim_input(PinRequest {
            pin: self.pin,
            // HX-916 NO wiring pulls the line to ground per pulse.
            pull_up: true,
            bounce: self.bounce,
        })?;

        let pulses = self.pulses.clone();
        source.set_edge_callback(Arc::new(move |edge| {
            // Runs on the driver's callback thread; atomics only.
            if edge == Edge::Activated {
                pulses.record_pulse();
            }
        }));
        self.source = Some(source);

        let pulses = self.pulses.clone();
        let pulse_timeout = self.pulse_timeout;
        let component_id = self.component_id.clone();
        let pin = self.pin;
        self.monitor = Some(tokio::spawn(async move {
            let mut sample = tokio::time::interval(MONITOR_SAMPLE_INTERVAL);
            loop {
                sample.tick().await;
                if pulses.pending() > 0 && pulses.quiet_for() > pulse_timeout {
                    let pulse_count = pulses.take();
                    tracing::info!(
                        message = "Coin insertion complete",
                        component_id = %component_id,
                        pulse_count,
                    );
                    tap.enqueue(
                        GpioEvent::new(component_id.clone(), EventKind::CoinInserted)
                            .with_field("pin", pin)
                            .with_field("pulse_count", pulse_count),
                    );
                }
            }
        }));

        tracing::info!(
            message = "Coin validator bound",
            component_id = %self.component_id,
            pin = self.pin,
            pulse_timeout_ms = self.pulse_timeout.as_millis() as u64,
        );
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        if let Some(mut source) = self.source.take() {
            source.release();
        }
    }

    fn is_started(&self) -> bool { self.source.is_some() }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::gpio::{bridge, pins::MockPinDriver};

    fn validator() -> CoinValidator {
        CoinValidator::new(
            "coin_validator",
            23,
            Duration::from_millis(1),
            Duration::from_millis(60),
        )
    }

    #[tokio::test]
    async fn pulse_burst_becomes_one_coin_inserted_event() {
        let driver = MockPinDriver::new();
        let (tap, mut rx) = bridge::channel(8);
        let mut validator = validator();
        validator.try_start(&driver, tap).unwrap();

        driver.fire_pulses(23, 3);

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("monitor emitted no event")
            .unwrap();
        assert_eq!(event.kind, EventKind::CoinInserted);
        assert_eq!(event.u64_field("pulse_count"), Some(3));

        validator.stop();
    }

    #[tokio::test]
    async fn two_separated_bursts_become_two_events() {
        let driver = MockPinDriver::new();
        let (tap, mut rx) = bridge::channel(8);
        let mut validator = validator();
        validator.try_start(&driver, tap).unwrap();

        driver.fire_pulses(23, 4);
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();

        driver.fire_pulses(23, 1);
        let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.u64_field("pulse_count"), Some(4));
        assert_eq!(second.u64_field("pulse_count"), Some(1));

        validator.stop();
    }

    #[tokio::test]
    async fn stop_aborts_the_monitor_and_releases_the_pin() {
        let driver = MockPinDriver::new();
        let (tap, mut rx) = bridge::channel(8);
        let mut validator = validator();
        validator.try_start(&driver, tap).unwrap();

        validator.stop();

        assert!(!validator.is_started());
        assert!(!driver.fire_edge(23, Edge::Activated));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());
    }
}

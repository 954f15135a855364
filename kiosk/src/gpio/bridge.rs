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

//! Event bridge: the thread-safe hand-off from hardware callback threads to
//! the dispatcher task.
//!
//! Hardware callbacks run on threads the driver owns; nothing about their
//! scheduling is under our control. The bridge is a bounded
//! [`tokio::sync::mpsc`] channel: [`EventTap::enqueue`] is wait-free for the
//! caller, preserves FIFO per producer, and applies back-pressure by
//! **dropping the newest** event under a pulse storm. Dropping the newest
//! costs at most one pulse's value; dropping the oldest could split a coin's
//! pulse sequence and misread the whole coin.

use tokio::sync::mpsc;

use super::event::GpioEvent;

/// Capacity of the bridge queue. Sized for pulse storms, not steady state: a
/// human pressing buttons produces a handful of events per second.
pub const EVENT_QUEUE_CAPACITY: usize = 100;

/// Receiving half of the bridge, drained by the dispatcher on the loop.
pub type EventQueueRx = mpsc::Receiver<GpioEvent>;

/// Producer handle handed to every component. Cloneable; safe to call from
/// any thread.
#[derive(Clone, Debug)]
pub struct EventTap {
    sender: mpsc::Sender<GpioEvent>,
}

impl EventTap {
    /// Enqueue an event without blocking the calling (hardware) thread.
    ///
    /// Infallible by contract: a full queue or a stopped dispatcher drops the
    /// event with a warning and the callback thread carries on.
    pub fn enqueue(&self, event: GpioEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                // % is Display, ? is Debug.
                tracing::warn!(
                    message = "Event queue full - dropping newest event",
                    component_id = %event.component_id,
                    kind = %event.kind,
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::warn!(
                    message = "Dispatcher not running - dropping event",
                    component_id = %event.component_id,
                    kind = %event.kind,
                );
            }
        }
    }
}

/// Create the bridge. The tap side fans out to components; the receiver is
/// owned by the single dispatcher task.
pub fn channel(capacity: usize) -> (EventTap, EventQueueRx) {
    let (sender, receiver) = mpsc::channel(capacity);
    (EventTap { sender }, receiver)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::gpio::event::EventKind;

    #[tokio::test]
    async fn events_from_one_thread_arrive_in_fifo_order() {
        let (tap, mut rx) = channel(EVENT_QUEUE_CAPACITY);

        let producer = std::thread::spawn(move || {
            for press in 0..10_u64 {
                tap.enqueue(
                    GpioEvent::new("button_0", EventKind::ButtonPressed)
                        .with_field("seq", press),
                );
            }
        });
        producer.join().unwrap();

        for expected in 0..10 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.u64_field("seq"), Some(expected));
        }
    }

    #[tokio::test]
    async fn overflow_drops_newest_and_keeps_oldest() {
        let (tap, mut rx) = channel(2);

        for seq in 0..5_u64 {
            tap.enqueue(
                GpioEvent::new("coin_validator", EventKind::CoinInserted)
                    .with_field("seq", seq),
            );
        }

        // The first two made it in; 2..4 were dropped on the floor.
        assert_eq!(rx.recv().await.unwrap().u64_field("seq"), Some(0));
        assert_eq!(rx.recv().await.unwrap().u64_field("seq"), Some(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn enqueue_after_dispatcher_stops_does_not_panic() {
        let (tap, rx) = channel(2);
        drop(rx);

        tap.enqueue(GpioEvent::new("button_0", EventKind::ButtonPressed));
    }
}

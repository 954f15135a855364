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

//! Fan-out of display envelopes to subscribed clients.
//!
//! The subscriber set is the one mutex-guarded structure in the core:
//! subscriptions come from listener accept tasks while broadcasts come from
//! the pipeline. Delivery is fire-and-forget — a broadcast can never fail the
//! donation that triggered it. Each subscriber gets a bounded queue; a client
//! that cannot drain it within [`SUBSCRIBER_SEND_TIMEOUT`] counts as broken
//! and is dropped.

use std::{collections::HashMap,
          fmt,
          sync::{Mutex,
                 atomic::{AtomicU64, Ordering}},
          time::Duration};

use givebox_schema::DisplayEnvelope;
use tokio::sync::mpsc;

/// Per-subscriber queue depth. Generous for a display that redraws on every
/// message; tiny against a stalled TCP peer.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 32;

/// How long one slow subscriber may stall the broadcast loop before it is
/// dropped.
pub const SUBSCRIBER_SEND_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// Receiving half handed to a subscriber's writer task: serialized envelopes,
/// one JSON object per item.
pub type EnvelopeRx = mpsc::Receiver<String>;

#[derive(Default)]
pub struct BroadcastHub {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<String>>>,
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("connections", &self.connection_count())
            .finish()
    }
}

impl BroadcastHub {
    pub fn new() -> Self { Self::default() }

    /// Add a subscriber; the caller owns the receiving half.
    pub fn subscribe(&self) -> (SubscriberId, EnvelopeRx) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let count = {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.insert(id, sender);
            subscribers.len()
        };
        tracing::info!(
            message = "Display client connected",
            subscriber = %id,
            connections = count,
        );
        (id, receiver)
    }

    /// Remove a subscriber. Returns `false` when it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.lock().unwrap();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        if removed {
            tracing::info!(
                message = "Display client disconnected",
                subscriber = %id,
                connections = count,
            );
        }
        removed
    }

    pub fn connection_count(&self) -> usize { self.subscribers.lock().unwrap().len() }

    /// Serialize once and deliver to a snapshot of the subscriber set,
    /// sequentially. Failed or timed-out deliveries drop that subscriber;
    /// nothing propagates to the caller.
    pub async fn broadcast(&self, envelope: &DisplayEnvelope) {
        let payload = match serde_json::to_string(envelope) {
            Ok(payload) => payload,
            Err(error) => {
                // % is Display, ? is Debug.
                tracing::error!(
                    message = "Failed to serialize broadcast envelope",
                    error = %error,
                );
                return;
            }
        };

        let snapshot: Vec<(SubscriberId, mpsc::Sender<String>)> = {
            let subscribers = self.subscribers.lock().unwrap();
            subscribers
                .iter()
                .map(|(id, sender)| (*id, sender.clone()))
                .collect()
        };
        if snapshot.is_empty() {
            return;
        }

        let mut broken = Vec::new();
        for (id, sender) in snapshot {
            if sender
                .send_timeout(payload.clone(), SUBSCRIBER_SEND_TIMEOUT)
                .await
                .is_err()
            {
                broken.push(id);
            }
        }

        for id in broken {
            tracing::warn!(
                message = "Dropping slow or broken display client",
                subscriber = %id,
            );
            self.unsubscribe(id);
        }
    }

    /// Drop every subscriber. Writer tasks observe their queues closing and
    /// exit.
    pub fn close_all(&self) {
        let count = {
            let mut subscribers = self.subscribers.lock().unwrap();
            let count = subscribers.len();
            subscribers.clear();
            count
        };
        if count > 0 {
            tracing::info!(message = "Closed all display clients", connections = count);
        }
    }
}

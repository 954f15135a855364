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

//! Event dispatcher: the single task that drains the bridge and routes each
//! event to its component's handlers.
//!
//! There is deliberately no per-component parallelism: handlers run strictly
//! in arrival order, awaited one at a time, which makes the correlation
//! engine single-writer per step of its state machine. The only suspension
//! points are the queue read and the handlers themselves.

use std::{sync::Arc, time::Duration};

use tokio::sync::broadcast;

use super::{bridge::EventQueueRx, event::GpioEvent, registry::ComponentRegistry};
use crate::container::AppContainer;

/// How long shutdown will keep dispatching already-queued events before
/// dropping the rest.
pub const SHUTDOWN_DRAIN_DEADLINE: Duration = Duration::from_secs(2);

/// Owns the registry and the receiving half of the bridge for the lifetime of
/// the pipeline. Constructed after registration is complete, so no lock
/// guards the component table.
pub struct EventDispatcher {
    registry: ComponentRegistry,
    receiver: EventQueueRx,
    container: Arc<AppContainer>,
}

impl EventDispatcher {
    pub fn new(
        registry: ComponentRegistry,
        receiver: EventQueueRx,
        container: Arc<AppContainer>,
    ) -> Self {
        Self {
            registry,
            receiver,
            container,
        }
    }

    /// Run until every tap is dropped or `shutdown` fires. On shutdown,
    /// queued events are drained up to [`SHUTDOWN_DRAIN_DEADLINE`], then all
    /// components are stopped.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(message = "Event dispatcher started");
        loop {
            tokio::select! {
                maybe_event = self.receiver.recv() => match maybe_event {
                    Some(event) => self.dispatch(event).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    self.drain_to_deadline().await;
                    break;
                }
            }
        }
        self.registry.stop_all();
        tracing::info!(message = "Event dispatcher stopped");
    }

    /// Route one event. Unknown components and unbound kinds are discarded;
    /// handler failures are logged and swallowed so one faulty handler cannot
    /// stall the pipeline.
    async fn dispatch(&self, event: GpioEvent) {
        let Some(handlers) = self.registry.handlers_for(&event.component_id, event.kind)
        else {
            tracing::warn!(
                message = "Unknown component - discarding event",
                component_id = %event.component_id,
                kind = %event.kind,
            );
            return;
        };

        if handlers.is_empty() {
            tracing::debug!(
                message = "No handlers bound - discarding event",
                component_id = %event.component_id,
                kind = %event.kind,
            );
            return;
        }

        for handler in handlers {
            if let Err(report) = handler(event.clone(), self.container.clone()).await {
                // % is Display, ? is Debug.
                tracing::error!(
                    message = "Handler fault - isolated",
                    component_id = %event.component_id,
                    kind = %event.kind,
                    error = ?report,
                );
            }
        }
    }

    async fn drain_to_deadline(&mut self) {
        let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN_DEADLINE;
        while let Ok(event) = self.receiver.try_recv() {
            let dispatch_result =
                tokio::time::timeout_at(deadline, self.dispatch(event)).await;
            if dispatch_result.is_err() {
                tracing::warn!(
                    message = "Shutdown drain deadline reached - dropping queued events"
                );
                break;
            }
        }
    }
}

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

//! Test fixtures for the pipeline: a fully wired container on an in-memory
//! store, a manual clock, and a committer that can be told to fail.
//!
//! Public (not `cfg(test)`) so integration tests and scratch binaries can
//! use the same wiring the unit tests do.

use std::{sync::{Arc,
                 atomic::{AtomicU32, Ordering}},
          time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use givebox_schema::DisplayEnvelope;
use tokio::task::JoinHandle;

use crate::{broadcast::{BroadcastHub, EnvelopeRx},
            clock::{Clock, ManualClock},
            config::KioskConfig,
            container::AppContainer,
            correlate::{CorrelationEngine, CorrelationSettings},
            donate::{DonationCommitter, DonationReceipt, DonationWriter, WriterError},
            store::{PollStore, PollWithBindings}};

/// Settings with debounce windows short enough for tests that wait them out
/// in real time. TTL stays at the default; tests move the manual clock
/// instead of sleeping 30 s.
pub fn fast_settings() -> CorrelationSettings {
    CorrelationSettings {
        button_debounce: Duration::from_millis(50),
        coin_debounce: Duration::from_millis(50),
        ..CorrelationSettings::default()
    }
}

/// A [`DonationCommitter`] that fails its first N commits with a storage
/// error, then delegates to the real writer. Counts every call.
pub struct FlakyCommitter {
    inner: Arc<DonationWriter>,
    remaining_failures: AtomicU32,
    calls: AtomicU32,
}

impl FlakyCommitter {
    pub fn new(inner: Arc<DonationWriter>, failures: u32) -> Self {
        Self {
            inner,
            remaining_failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 { self.calls.load(Ordering::SeqCst) }
}

#[async_trait]
impl DonationCommitter for FlakyCommitter {
    async fn commit(
        &self,
        poll_id: i64,
        category_id: i64,
        amount_cents: i64,
        at: DateTime<Utc>,
    ) -> Result<DonationReceipt, WriterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(WriterError::Storage(sqlx::Error::PoolClosed));
        }
        self.inner.commit(poll_id, category_id, amount_cents, at).await
    }
}

/// Everything a pipeline test needs, wired the way the launcher wires
/// production: in-memory store, hub, writer behind a (flaky-capable)
/// committer, engine actor, container.
pub struct TestRig {
    pub container: Arc<AppContainer>,
    pub manual_clock: ManualClock,
    pub committer: Arc<FlakyCommitter>,
    engine_task: JoinHandle<()>,
}

impl TestRig {
    /// A rig whose committer never fails.
    ///
    /// # Errors
    ///
    /// Returns an error when the in-memory store cannot be created.
    pub async fn try_new(settings: CorrelationSettings) -> miette::Result<Self> {
        Self::try_new_with_flaky_commits(settings, 0).await
    }

    /// A rig whose committer fails the first `failures` commits with a
    /// storage error.
    ///
    /// # Errors
    ///
    /// Returns an error when the in-memory store cannot be created.
    pub async fn try_new_with_flaky_commits(
        settings: CorrelationSettings,
        failures: u32,
    ) -> miette::Result<Self> {
        let store = Arc::new(PollStore::try_in_memory().await?);
        let hub = Arc::new(BroadcastHub::new());
        let manual_clock = ManualClock::new(Utc::now());
        let clock: Arc<dyn Clock> = Arc::new(manual_clock.clone());

        let writer = Arc::new(DonationWriter::new(store.clone(), hub.clone()));
        let committer = Arc::new(FlakyCommitter::new(writer.clone(), failures));

        let (engine, engine_task) = CorrelationEngine::spawn(
            settings,
            clock.clone(),
            store.clone(),
            committer.clone(),
            hub.clone(),
        );

        let container = Arc::new(AppContainer {
            config: KioskConfig::default(),
            clock,
            poll_store: store,
            donation_writer: writer,
            broadcast_hub: hub,
            correlation_engine: engine,
        });

        Ok(Self {
            container,
            manual_clock,
            committer,
            engine_task,
        })
    }

    /// Create a poll that is active around the rig's (manual) current time.
    pub async fn seed_poll(&self, category_names: &[&str]) -> PollWithBindings {
        let now = self.container.clock.now();
        self.container
            .poll_store
            .try_create_poll(
                "Which cause should the funds support?",
                now - chrono::Duration::hours(1),
                now + chrono::Duration::hours(4),
                category_names,
            )
            .await
            .unwrap()
    }

    /// Stop the engine actor and wait for it.
    pub async fn shutdown(self) {
        self.container.correlation_engine.request_shutdown().await;
        let _ = self.engine_task.await;
    }
}

/// Collect up to `count` envelopes from a hub subscription, stopping early at
/// `deadline` from now. Returns what arrived.
pub async fn collect_envelopes(
    rx: &mut EnvelopeRx,
    count: usize,
    deadline: Duration,
) -> Vec<DisplayEnvelope> {
    let mut collected = Vec::with_capacity(count);
    let until = tokio::time::Instant::now() + deadline;
    while collected.len() < count {
        match tokio::time::timeout_at(until, rx.recv()).await {
            Ok(Some(payload)) => {
                let envelope =
                    serde_json::from_str(&payload).expect("hub payloads are envelopes");
                collected.push(envelope);
            }
            Ok(None) | Err(_) => break,
        }
    }
    collected
}

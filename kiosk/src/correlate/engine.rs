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

//! The correlation engine: debounced category selection + accumulated coin
//! value → one donation.
//!
//! # Mental model
//!
//! The engine is one task owning [`CorrelationSlots`]; everything else talks
//! to it by sending signals over an mpsc channel, so every slot mutation is
//! single-writer by construction. Handlers (running in the dispatcher) send
//! `ButtonPressed`/`CoinInserted`. Each of those starts a debounce sleeper: a
//! tiny task that sleeps and sends back a `…DebounceElapsed` signal stamped
//! with the generation it was spawned under.
//!
//! # Cancellation
//!
//! "Last press wins" falls out of the generation stamp: a newer press bumps
//! the generation (and aborts the old sleeper as an optimization), so even a
//! sleeper that already woke cannot write — its stale generation is ignored
//! when the signal is processed. A cancelled debounce therefore never
//! mutates a slot, without any lock around the slot state.
//!
//! # Correlation attempt
//!
//! Runs at the end of every debounce window, and is idempotent. The attempt
//! checks both slots against their TTL, resolves the active poll and the
//! binding at the selected position, and hands the pair to the donation
//! writer. Only a storage failure leaves the slots in place (the next
//! debounce retries); the other outcomes clear state per policy.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use givebox_schema::{CategoryChosenData, DisplayEnvelope, MoneyInsertedData};
use tokio::{sync::mpsc, task::JoinHandle};

use super::slots::{AmountCheck, CategoryCheck, CorrelationSlots};
use crate::{DEBUG_CORRELATE_MOD,
            broadcast::BroadcastHub,
            clock::Clock,
            config::KioskConfig,
            donate::{DonationCommitter, WriterError},
            store::{CategoryBinding, PollStore, StoreError}};

/// Signal queue depth. The dispatcher is the main producer and is itself fed
/// by a bounded queue, so this never fills in practice.
const ENGINE_SIGNAL_CAPACITY: usize = 64;

/// Tunables for the correlation state machine, usually derived from
/// [`KioskConfig`]. Defaults match the appliance defaults.
#[derive(Clone, Debug)]
pub struct CorrelationSettings {
    pub button_debounce: Duration,
    pub coin_debounce: Duration,
    pub slot_ttl: Duration,
    /// Coin validator pulse count → value in cents.
    pub pulse_values: BTreeMap<u32, i64>,
    pub min_donation_cents: i64,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            button_debounce: Duration::from_secs(2),
            coin_debounce: Duration::from_secs(2),
            slot_ttl: Duration::from_secs(30),
            pulse_values: BTreeMap::from([(1, 10), (2, 20), (3, 50), (4, 100), (5, 200)]),
            min_donation_cents: 1,
        }
    }
}

impl CorrelationSettings {
    pub fn from_config(config: &KioskConfig) -> Self {
        Self {
            button_debounce: config.button_debounce,
            coin_debounce: config.coin_debounce,
            slot_ttl: config.slot_ttl,
            pulse_values: config.pulse_values.clone(),
            min_donation_cents: config.min_donation_cents,
        }
    }
}

#[derive(Debug)]
enum EngineSignal {
    ButtonPressed { position: usize },
    CoinInserted { pulse_count: u32 },
    ButtonDebounceElapsed { generation: u64 },
    CoinDebounceElapsed { generation: u64 },
    Shutdown,
}

/// Cloneable handle to the engine task. Dropping every handle does not stop
/// the engine; send [`Self::request_shutdown`].
#[derive(Clone, Debug)]
pub struct CorrelationEngine {
    signal_tx: mpsc::Sender<EngineSignal>,
}

impl CorrelationEngine {
    /// Spawn the engine task and return its handle plus the join handle for
    /// shutdown sequencing.
    pub fn spawn(
        settings: CorrelationSettings,
        clock: Arc<dyn Clock>,
        store: Arc<PollStore>,
        committer: Arc<dyn DonationCommitter>,
        hub: Arc<BroadcastHub>,
    ) -> (Self, JoinHandle<()>) {
        let (signal_tx, signal_rx) = mpsc::channel(ENGINE_SIGNAL_CAPACITY);
        let slot_ttl = chrono::Duration::from_std(settings.slot_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let runtime = EngineRuntime {
            settings,
            slot_ttl,
            clock,
            store,
            committer,
            hub,
            signal_tx: signal_tx.clone(),
            signal_rx,
            slots: CorrelationSlots::new(),
            pending_position: None,
            button_sleeper: None,
            coin_sleeper: None,
        };
        let task = tokio::spawn(runtime.run());
        (Self { signal_tx }, task)
    }

    /// A category button at `position` was pressed.
    pub async fn button_pressed(&self, position: usize) {
        self.send(EngineSignal::ButtonPressed { position }).await;
    }

    /// The coin validator finished a pulse sequence.
    pub async fn coin_inserted(&self, pulse_count: u32) {
        self.send(EngineSignal::CoinInserted { pulse_count }).await;
    }

    /// Stop the engine, aborting outstanding debounce sleepers.
    pub async fn request_shutdown(&self) { self.send(EngineSignal::Shutdown).await; }

    async fn send(&self, signal: EngineSignal) {
        if self.signal_tx.send(signal).await.is_err() {
            tracing::warn!(message = "Correlation engine is not running - signal dropped");
        }
    }
}

struct EngineRuntime {
    settings: CorrelationSettings,
    slot_ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    store: Arc<PollStore>,
    committer: Arc<dyn DonationCommitter>,
    hub: Arc<BroadcastHub>,
    signal_tx: mpsc::Sender<EngineSignal>,
    signal_rx: mpsc::Receiver<EngineSignal>,
    slots: CorrelationSlots,
    /// Position of the latest (not yet debounced) button press.
    pending_position: Option<usize>,
    button_sleeper: Option<JoinHandle<()>>,
    coin_sleeper: Option<JoinHandle<()>>,
}

impl EngineRuntime {
    async fn run(mut self) {
        tracing::info!(message = "Correlation engine started");
        while let Some(signal) = self.signal_rx.recv().await {
            match signal {
                EngineSignal::ButtonPressed { position } => self.on_button_pressed(position),
                EngineSignal::CoinInserted { pulse_count } => {
                    self.on_coin_inserted(pulse_count).await;
                }
                EngineSignal::ButtonDebounceElapsed { generation } => {
                    self.on_button_debounce_elapsed(generation).await;
                }
                EngineSignal::CoinDebounceElapsed { generation } => {
                    self.on_coin_debounce_elapsed(generation).await;
                }
                EngineSignal::Shutdown => break,
            }
        }
        self.abort_sleepers();
        tracing::info!(message = "Correlation engine stopped");
    }

    /// Restart the button debounce window. The slot itself is only written
    /// when the window survives to its end.
    fn on_button_pressed(&mut self, position: usize) {
        let generation = self.slots.bump_button_generation();
        self.pending_position = Some(position);
        if let Some(superseded) = self.button_sleeper.take() {
            superseded.abort();
        }

        tracing::info!(
            message = "Category button pressed - debounce window restarted",
            position,
            generation,
        );

        let signal_tx = self.signal_tx.clone();
        let debounce = self.settings.button_debounce;
        self.button_sleeper = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let _ = signal_tx
                .send(EngineSignal::ButtonDebounceElapsed { generation })
                .await;
        }));
    }

    async fn on_coin_inserted(&mut self, pulse_count: u32) {
        let delta_cents = match self.settings.pulse_values.get(&pulse_count) {
            Some(cents) => *cents,
            None => {
                tracing::warn!(
                    message = "Unknown pulse count - counting zero cents",
                    pulse_count,
                );
                0
            }
        };

        let now = self.clock.now();
        let total_cents = self.slots.add_amount(delta_cents, now);
        tracing::info!(
            message = "Coin inserted",
            pulse_count,
            amount_cents = delta_cents,
            total_amount_cents = total_cents,
        );

        self.hub
            .broadcast(&DisplayEnvelope::MoneyInserted(MoneyInsertedData {
                amount_cents: delta_cents,
                total_amount_cents: total_cents,
                timestamp: now,
            }))
            .await;

        let generation = self.slots.bump_coin_generation();
        if let Some(superseded) = self.coin_sleeper.take() {
            superseded.abort();
        }
        let signal_tx = self.signal_tx.clone();
        let debounce = self.settings.coin_debounce;
        self.coin_sleeper = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let _ = signal_tx
                .send(EngineSignal::CoinDebounceElapsed { generation })
                .await;
        }));
    }

    /// End of a button debounce window: write the slot, announce the choice,
    /// try to correlate. A stale generation means this window was superseded
    /// and must not touch anything.
    async fn on_button_debounce_elapsed(&mut self, generation: u64) {
        if !self.slots.is_current_button_generation(generation) {
            DEBUG_CORRELATE_MOD.then(|| {
                tracing::debug!(message = "Superseded button debounce ignored", generation);
            });
            return;
        }
        let Some(position) = self.pending_position else {
            return;
        };

        let now = self.clock.now();
        self.slots.select_category(position, now);
        self.broadcast_category_chosen(position, now).await;
        self.attempt_correlation().await;
    }

    async fn on_coin_debounce_elapsed(&mut self, generation: u64) {
        if !self.slots.is_current_coin_generation(generation) {
            DEBUG_CORRELATE_MOD.then(|| {
                tracing::debug!(message = "Superseded coin debounce ignored", generation);
            });
            return;
        }
        self.attempt_correlation().await;
    }

    /// Announce a debounced selection. Suppressed (with a warning) when the
    /// active poll has no binding at the chosen position.
    async fn broadcast_category_chosen(&self, position: usize, now: DateTime<Utc>) {
        match self.resolve_active_binding(position).await {
            Ok(Some((_poll_id, binding))) => {
                self.hub
                    .broadcast(&DisplayEnvelope::CategoryChosen(CategoryChosenData {
                        category_id: binding.category_id,
                        category_name: Some(binding.category_name),
                        timestamp: now,
                    }))
                    .await;
            }
            Ok(None) => {
                tracing::warn!(
                    message =
                        "No active poll binding at selected position - broadcast suppressed",
                    position,
                );
            }
            Err(error) => {
                // % is Display, ? is Debug.
                tracing::warn!(
                    message = "Could not resolve category - broadcast suppressed",
                    position,
                    error = %error,
                );
            }
        }
    }

    /// The active poll's binding at `position`, if both exist.
    async fn resolve_active_binding(
        &self,
        position: usize,
    ) -> Result<Option<(i64, CategoryBinding)>, StoreError> {
        let now = self.clock.now();
        let Some(poll) = self.store.try_get_active_poll(now).await? else {
            return Ok(None);
        };
        let Some(poll) = self.store.try_get_poll_with_bindings(poll.id).await? else {
            return Ok(None);
        };
        Ok(poll
            .binding_at(position)
            .cloned()
            .map(|binding| (poll.poll.id, binding)))
    }

    /// One idempotent correlation attempt, in order: check category TTL,
    /// check amount TTL/minimum, resolve poll + binding, commit. Only a
    /// storage failure leaves the slots for a retry.
    async fn attempt_correlation(&mut self) {
        let now = self.clock.now();

        let position = match self.slots.check_category(now, self.slot_ttl) {
            CategoryCheck::Empty => return,
            CategoryCheck::Expired => {
                tracing::info!(message = "Selected category outlived its TTL - clearing");
                self.slots.clear_category();
                return;
            }
            CategoryCheck::Valid { position } => position,
        };

        let cents = match self.slots.check_amount(
            now,
            self.slot_ttl,
            self.settings.min_donation_cents,
        ) {
            AmountCheck::Missing => {
                self.slots.reset_amount(now);
                return;
            }
            AmountCheck::Expired => {
                tracing::info!(message = "Pending amount outlived its TTL - resetting");
                self.slots.reset_amount(now);
                return;
            }
            AmountCheck::Valid { cents } => cents,
        };

        let resolved = match self.resolve_active_binding(position).await {
            Ok(resolved) => resolved,
            Err(error) => {
                // Leave both slots: the next debounce retries.
                tracing::error!(
                    message = "Storage failure resolving active poll - will retry",
                    error = %error,
                );
                return;
            }
        };
        let Some((poll_id, binding)) = resolved else {
            // The poll ended or was edited out from under the selection.
            tracing::warn!(
                message = "No active poll or stale position - clearing correlation state",
                position,
            );
            self.slots.clear_category();
            self.slots.reset_amount(now);
            return;
        };

        match self
            .committer
            .commit(poll_id, binding.category_id, cents, now)
            .await
        {
            Ok(receipt) => {
                tracing::info!(
                    message = "Correlation complete - donation created",
                    donation_id = receipt.donation_id,
                    poll_id,
                    category_id = binding.category_id,
                    amount_cents = cents,
                );
                self.slots.clear_both();
            }
            Err(WriterError::NoActivePoll) => {
                tracing::info!(
                    message = "Poll vanished during commit - clearing correlation state"
                );
                self.slots.clear_both();
            }
            Err(WriterError::InvalidCategory {
                poll_id,
                category_id,
            }) => {
                tracing::warn!(
                    message = "Category no longer bound at commit time - clearing selection",
                    poll_id,
                    category_id,
                );
                self.slots.clear_category();
            }
            Err(WriterError::Storage(error)) => {
                // Slots stay; the next debounce window retries the commit.
                tracing::error!(
                    message = "Storage failure committing donation - kept for retry",
                    error = %error,
                );
            }
        }
    }

    fn abort_sleepers(&mut self) {
        if let Some(sleeper) = self.button_sleeper.take() {
            sleeper.abort();
        }
        if let Some(sleeper) = self.coin_sleeper.take() {
            sleeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;
    use crate::test_fixtures::{TestRig, collect_envelopes, fast_settings};

    /// Wait out a debounce window plus scheduling slack.
    async fn settle(window: Duration) {
        tokio::time::sleep(window + Duration::from_millis(120)).await;
    }

    #[tokio::test]
    async fn happy_path_button_then_coins_creates_one_donation() {
        let rig = TestRig::try_new(fast_settings()).await.unwrap();
        let poll = rig.seed_poll(&["A", "B"]).await;
        let category_a = poll.bindings[0].category_id;
        let (_sub, mut rx) = rig.container.broadcast_hub.subscribe();
        let engine = &rig.container.correlation_engine;

        engine.button_pressed(0).await;
        settle(fast_settings().button_debounce).await;
        engine.coin_inserted(3).await;
        settle(fast_settings().coin_debounce).await;

        let envelopes = collect_envelopes(&mut rx, 3, Duration::from_secs(2)).await;
        match &envelopes[0] {
            DisplayEnvelope::CategoryChosen(data) => {
                assert_eq!(data.category_id, category_a);
                assert_eq!(data.category_name.as_deref(), Some("A"));
            }
            other => panic!("expected category_chosen first, got {other:?}"),
        }
        match &envelopes[1] {
            DisplayEnvelope::MoneyInserted(data) => {
                assert_eq!(data.amount_cents, 50);
                assert_eq!(data.total_amount_cents, 50);
            }
            other => panic!("expected money_inserted second, got {other:?}"),
        }
        match &envelopes[2] {
            DisplayEnvelope::DonationCreated(data) => {
                assert_eq!(data.vote_id, poll.poll.id);
                assert_eq!(data.category_id, category_a);
                assert_eq!(data.amount_cents, 50);
                assert_eq!(data.totals.total_amount_cents, 50);
            }
            other => panic!("expected donation_created third, got {other:?}"),
        }

        let donations = rig
            .container
            .poll_store
            .try_list_donations(poll.poll.id)
            .await
            .unwrap();
        assert_eq!(donations.len(), 1);
        assert_eq!(donations[0].amount_cents, 50);
        assert_eq!(donations[0].category_id, category_a);

        rig.shutdown().await;
    }

    #[tokio::test]
    async fn last_press_wins_within_the_debounce_window() {
        let rig = TestRig::try_new(fast_settings()).await.unwrap();
        let poll = rig.seed_poll(&["A", "B"]).await;
        let category_b = poll.bindings[1].category_id;
        let (_sub, mut rx) = rig.container.broadcast_hub.subscribe();
        let engine = &rig.container.correlation_engine;

        engine.button_pressed(0).await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        engine.button_pressed(1).await;
        settle(fast_settings().button_debounce).await;

        // Exactly one category_chosen, and it carries the later press.
        let envelopes = collect_envelopes(&mut rx, 1, Duration::from_secs(2)).await;
        match &envelopes[0] {
            DisplayEnvelope::CategoryChosen(data) => {
                assert_eq!(data.category_id, category_b);
            }
            other => panic!("expected category_chosen, got {other:?}"),
        }
        assert!(
            collect_envelopes(&mut rx, 1, Duration::from_millis(200))
                .await
                .is_empty()
        );

        rig.shutdown().await;
    }

    #[tokio::test]
    async fn coin_insertions_accumulate_into_one_donation() {
        let rig = TestRig::try_new(fast_settings()).await.unwrap();
        let poll = rig.seed_poll(&["A"]).await;
        let (_sub, mut rx) = rig.container.broadcast_hub.subscribe();
        let engine = &rig.container.correlation_engine;

        engine.button_pressed(0).await;
        settle(fast_settings().button_debounce).await;

        // 4, 4, 1, 1 pulses inside one rolling debounce window.
        for pulse_count in [4, 4, 1, 1] {
            engine.coin_inserted(pulse_count).await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        settle(fast_settings().coin_debounce).await;

        // category_chosen + four money_inserted + one donation_created.
        let envelopes = collect_envelopes(&mut rx, 6, Duration::from_secs(2)).await;
        let running_totals: Vec<i64> = envelopes
            .iter()
            .filter_map(|envelope| match envelope {
                DisplayEnvelope::MoneyInserted(data) => Some(data.total_amount_cents),
                _ => None,
            })
            .collect();
        assert_eq!(running_totals, vec![100, 200, 210, 220]);

        let donations = rig
            .container
            .poll_store
            .try_list_donations(poll.poll.id)
            .await
            .unwrap();
        assert_eq!(donations.len(), 1);
        assert_eq!(donations[0].amount_cents, 220);

        rig.shutdown().await;
    }

    #[tokio::test]
    async fn expired_category_produces_no_donation_and_clears() {
        let rig = TestRig::try_new(fast_settings()).await.unwrap();
        let poll = rig.seed_poll(&["A"]).await;
        let engine = &rig.container.correlation_engine;

        engine.button_pressed(0).await;
        settle(fast_settings().button_debounce).await;

        // The kiosk sits idle past the slot TTL, then a coin arrives.
        rig.manual_clock.advance(chrono::Duration::seconds(40));
        engine.coin_inserted(3).await;
        settle(fast_settings().coin_debounce).await;

        let donations = rig
            .container
            .poll_store
            .try_list_donations(poll.poll.id)
            .await
            .unwrap();
        assert!(donations.is_empty());

        // The category slot was cleared: fresh coins alone still cannot
        // correlate.
        engine.coin_inserted(1).await;
        settle(fast_settings().coin_debounce).await;
        assert!(
            rig.container
                .poll_store
                .try_list_donations(poll.poll.id)
                .await
                .unwrap()
                .is_empty()
        );

        rig.shutdown().await;
    }

    #[test_case(9; "undocumented pulse count")]
    #[test_case(0; "zero pulses")]
    #[tokio::test]
    async fn unknown_pulse_count_counts_zero_cents(pulse_count: u32) {
        let rig = TestRig::try_new(fast_settings()).await.unwrap();
        let poll = rig.seed_poll(&["A"]).await;
        let (_sub, mut rx) = rig.container.broadcast_hub.subscribe();
        let engine = &rig.container.correlation_engine;

        engine.button_pressed(0).await;
        settle(fast_settings().button_debounce).await;
        engine.coin_inserted(pulse_count).await;
        settle(fast_settings().coin_debounce).await;

        let envelopes = collect_envelopes(&mut rx, 2, Duration::from_secs(2)).await;
        let money = envelopes.iter().find_map(|envelope| match envelope {
            DisplayEnvelope::MoneyInserted(data) => Some(data),
            _ => None,
        });
        let money = money.expect("money_inserted envelope");
        assert_eq!(money.amount_cents, 0);
        assert_eq!(money.total_amount_cents, 0);

        assert!(
            rig.container
                .poll_store
                .try_list_donations(poll.poll.id)
                .await
                .unwrap()
                .is_empty()
        );

        rig.shutdown().await;
    }

    #[tokio::test]
    async fn coins_without_a_selection_never_commit() {
        let rig = TestRig::try_new(fast_settings()).await.unwrap();
        let poll = rig.seed_poll(&["A"]).await;
        let engine = &rig.container.correlation_engine;

        engine.coin_inserted(5).await;
        settle(fast_settings().coin_debounce).await;

        assert!(
            rig.container
                .poll_store
                .try_list_donations(poll.poll.id)
                .await
                .unwrap()
                .is_empty()
        );

        rig.shutdown().await;
    }

    #[tokio::test]
    async fn transient_storage_failure_retries_into_exactly_one_donation() {
        // Button window shorter than coin window so the first (failing)
        // attempt deterministically happens at button-debounce expiry and the
        // retry at coin-debounce expiry.
        let mut settings = fast_settings();
        settings.button_debounce = Duration::from_millis(40);
        settings.coin_debounce = Duration::from_millis(160);

        let rig = TestRig::try_new_with_flaky_commits(settings.clone(), 1)
            .await
            .unwrap();
        let poll = rig.seed_poll(&["A"]).await;
        let engine = &rig.container.correlation_engine;

        engine.button_pressed(0).await;
        engine.coin_inserted(3).await;
        settle(settings.coin_debounce).await;

        assert_eq!(rig.committer.calls(), 2);
        let donations = rig
            .container
            .poll_store
            .try_list_donations(poll.poll.id)
            .await
            .unwrap();
        assert_eq!(donations.len(), 1);
        assert_eq!(donations[0].amount_cents, 50);

        rig.shutdown().await;
    }

    #[tokio::test]
    async fn selection_at_a_position_removed_by_an_edit_clears_state() {
        let rig = TestRig::try_new(fast_settings()).await.unwrap();
        let poll = rig.seed_poll(&["A", "B"]).await;
        let engine = &rig.container.correlation_engine;

        engine.button_pressed(1).await;
        settle(fast_settings().button_debounce).await;

        // Operator shrinks the poll to one category; position 1 is gone.
        rig.container
            .poll_store
            .try_update_poll(poll.poll.id, None, None, None, Some(&["A"]))
            .await
            .unwrap();

        engine.coin_inserted(3).await;
        settle(fast_settings().coin_debounce).await;

        assert!(
            rig.container
                .poll_store
                .try_list_donations(poll.poll.id)
                .await
                .unwrap()
                .is_empty()
        );

        rig.shutdown().await;
    }

    #[tokio::test]
    async fn positional_migration_redirects_the_next_donation() {
        let rig = TestRig::try_new(fast_settings()).await.unwrap();
        let poll = rig.seed_poll(&["A", "B"]).await;
        let engine = &rig.container.correlation_engine;

        // Operator edits position 0 from A to C before the press.
        let updated = rig
            .container
            .poll_store
            .try_update_poll(poll.poll.id, None, None, None, Some(&["C", "B"]))
            .await
            .unwrap();
        let category_c = updated.bindings[0].category_id;

        engine.button_pressed(0).await;
        settle(fast_settings().button_debounce).await;
        engine.coin_inserted(3).await;
        settle(fast_settings().coin_debounce).await;

        let donations = rig
            .container
            .poll_store
            .try_list_donations(poll.poll.id)
            .await
            .unwrap();
        assert_eq!(donations.len(), 1);
        assert_eq!(donations[0].category_id, category_c);

        rig.shutdown().await;
    }
}

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

//! Transactional donation writer.
//!
//! One call = one transaction: verify, insert, re-aggregate, commit. The
//! `donation_created` broadcast happens after the commit and is
//! fire-and-forget; a failed broadcast never fails (or duplicates) the
//! donation. The engine talks to the writer through [`DonationCommitter`], so
//! retry behavior can be tested with a flaky implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use givebox_schema::{DisplayEnvelope, DonationCreatedData};
use thiserror::Error;

use crate::{broadcast::BroadcastHub,
            store::{PollStore, PollTotals}};

/// Why a commit was refused. Only [`WriterError::Storage`] is transient; the
/// correlation engine retries it on the next debounce and clears slots for
/// the other two.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("poll no longer exists - no active poll to attribute the donation to")]
    NoActivePoll,

    #[error("category {category_id} is not bound to poll {poll_id}")]
    InvalidCategory { poll_id: i64, category_id: i64 },

    #[error("storage failure while committing donation")]
    Storage(#[from] sqlx::Error),
}

/// Result of a successful commit.
#[derive(Clone, Debug, PartialEq)]
pub struct DonationReceipt {
    pub donation_id: i64,
    pub totals: PollTotals,
}

/// The seam between the correlation engine and persistence.
#[async_trait]
pub trait DonationCommitter: Send + Sync {
    /// Persist one donation and return the poll's recomputed totals.
    ///
    /// # Errors
    ///
    /// See [`WriterError`] for the three failure modes and their policies.
    async fn commit(
        &self,
        poll_id: i64,
        category_id: i64,
        amount_cents: i64,
        at: DateTime<Utc>,
    ) -> Result<DonationReceipt, WriterError>;
}

pub struct DonationWriter {
    store: Arc<PollStore>,
    hub: Arc<BroadcastHub>,
}

impl DonationWriter {
    pub fn new(store: Arc<PollStore>, hub: Arc<BroadcastHub>) -> Self {
        Self { store, hub }
    }
}

#[async_trait]
impl DonationCommitter for DonationWriter {
    async fn commit(
        &self,
        poll_id: i64,
        category_id: i64,
        amount_cents: i64,
        at: DateTime<Utc>,
    ) -> Result<DonationReceipt, WriterError> {
        let mut tx = self.store.pool().begin().await?;

        // Re-verify inside the transaction: a poll edit can land between the
        // engine's resolve and this commit.
        if !PollStore::poll_exists_in(&mut tx, poll_id).await? {
            return Err(WriterError::NoActivePoll);
        }
        if !PollStore::binding_exists_in(&mut tx, poll_id, category_id).await? {
            return Err(WriterError::InvalidCategory {
                poll_id,
                category_id,
            });
        }

        let donation_id =
            PollStore::insert_donation_in(&mut tx, poll_id, category_id, amount_cents, at)
                .await?;
        let totals = PollStore::aggregate_totals_in(&mut tx, poll_id).await?;
        tx.commit().await?;

        tracing::info!(
            message = "Donation committed",
            donation_id,
            poll_id,
            category_id,
            amount_cents,
            total_amount_cents = totals.total_amount_cents,
        );

        self.hub
            .broadcast(&DisplayEnvelope::DonationCreated(DonationCreatedData {
                vote_id: poll_id,
                category_id,
                amount_cents,
                totals: totals.to_wire(),
                timestamp: at,
            }))
            .await;

        Ok(DonationReceipt {
            donation_id,
            totals,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::PollWithBindings;

    async fn seeded_store() -> (Arc<PollStore>, PollWithBindings) {
        let store = Arc::new(PollStore::try_in_memory().await.unwrap());
        let now = Utc::now();
        let poll = store
            .try_create_poll(
                "Who gets the funds?",
                now - Duration::hours(1),
                now + Duration::hours(4),
                &["A", "B"],
            )
            .await
            .unwrap();
        (store, poll)
    }

    #[tokio::test]
    async fn commit_inserts_row_and_broadcasts_exactly_one_envelope() {
        let (store, poll) = seeded_store().await;
        let hub = Arc::new(BroadcastHub::new());
        let (_sub, mut rx) = hub.subscribe();
        let writer = DonationWriter::new(store.clone(), hub);
        let category_a = poll.bindings[0].category_id;

        let receipt = writer
            .commit(poll.poll.id, category_a, 50, Utc::now())
            .await
            .unwrap();

        assert_eq!(receipt.totals.total_amount_cents, 50);
        assert_eq!(receipt.totals.total_donations, 1);

        let payload = rx.recv().await.unwrap();
        let envelope: DisplayEnvelope = serde_json::from_str(&payload).unwrap();
        match envelope {
            DisplayEnvelope::DonationCreated(data) => {
                assert_eq!(data.vote_id, poll.poll.id);
                assert_eq!(data.category_id, category_a);
                assert_eq!(data.amount_cents, 50);
                assert_eq!(data.totals.total_amount_cents, 50);
            }
            other => panic!("expected donation_created, got {other:?}"),
        }
        // Exactly one envelope per commit.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unbound_category_is_invalid_and_writes_nothing() {
        let (store, poll) = seeded_store().await;
        let hub = Arc::new(BroadcastHub::new());
        let writer = DonationWriter::new(store.clone(), hub);

        let other_category = store.try_get_or_create_category("Unbound").await.unwrap();
        let result = writer
            .commit(poll.poll.id, other_category.id, 50, Utc::now())
            .await;

        assert!(matches!(
            result,
            Err(WriterError::InvalidCategory { category_id, .. })
                if category_id == other_category.id
        ));
        assert_eq!(store.try_count_donations(poll.poll.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_poll_is_no_active_poll() {
        let (store, poll) = seeded_store().await;
        let hub = Arc::new(BroadcastHub::new());
        let writer = DonationWriter::new(store.clone(), hub);
        let category_a = poll.bindings[0].category_id;

        store.try_delete_poll(poll.poll.id).await.unwrap();
        let result = writer
            .commit(poll.poll.id, category_a, 50, Utc::now())
            .await;

        assert!(matches!(result, Err(WriterError::NoActivePoll)));
    }

    #[tokio::test]
    async fn commit_succeeds_with_zero_subscribers() {
        let (store, poll) = seeded_store().await;
        let hub = Arc::new(BroadcastHub::new());
        let writer = DonationWriter::new(store.clone(), hub);
        let category_a = poll.bindings[0].category_id;

        let receipt = writer
            .commit(poll.poll.id, category_a, 70, Utc::now())
            .await
            .unwrap();

        assert_eq!(receipt.totals.total_amount_cents, 70);
    }

    #[tokio::test]
    async fn totals_accumulate_across_commits() {
        let (store, poll) = seeded_store().await;
        let hub = Arc::new(BroadcastHub::new());
        let writer = DonationWriter::new(store.clone(), hub);
        let [category_a, category_b] = [
            poll.bindings[0].category_id,
            poll.bindings[1].category_id,
        ];

        writer
            .commit(poll.poll.id, category_a, 50, Utc::now())
            .await
            .unwrap();
        let receipt = writer
            .commit(poll.poll.id, category_b, 30, Utc::now())
            .await
            .unwrap();

        assert_eq!(receipt.totals.total_amount_cents, 80);
        assert_eq!(receipt.totals.total_donations, 2);
        assert_eq!(receipt.totals.by_category[0].amount_cents, 50);
        assert_eq!(receipt.totals.by_category[1].amount_cents, 30);
    }
}

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

//! SQLite-backed poll store.
//!
//! Owns the connection pool and every query in the appliance. Donation
//! insertion and aggregation are exposed as `*_in` associated functions that
//! run on a caller-supplied connection, so the donation writer can compose
//! them inside one transaction. Poll CRUD (used by the management surface in
//! front of the appliance) keeps the store's invariants: dense binding
//! positions, `start < end`, and positional donation migration on edits.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use miette::IntoDiagnostic;
use sqlx::{Row,
           sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool,
                    SqlitePoolOptions}};
use thiserror::Error;

use super::types::{Category, CategoryBinding, CategoryTotal, DonationRecord, Poll,
                   PollTotals, PollWithBindings};

/// Pool size for on-disk databases. In-memory databases get a single
/// connection, since every connection would otherwise see its own empty
/// database.
const FILE_POOL_SIZE: u32 = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("start_time ({start}) must be before end_time ({end})")]
    InvalidTimeWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("a poll needs at least one category (donations would be orphaned)")]
    EmptyCategorySet,

    #[error("category name must not be empty")]
    EmptyCategoryName,

    #[error("poll {0} not found")]
    PollNotFound(i64),

    #[error("category {0} is referenced by donations and cannot be deleted")]
    CategoryInUse(i64),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub struct PollStore {
    pool: SqlitePool,
}

impl PollStore {
    /// Open (creating if missing) the database at `database_url` and run
    /// pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is malformed, the database cannot be
    /// opened, or a migration fails; the caller aborts startup.
    pub async fn try_connect(database_url: &str) -> miette::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .into_diagnostic()?
            .create_if_missing(true)
            .foreign_keys(true);
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            FILE_POOL_SIZE
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .into_diagnostic()?;

        sqlx::migrate!().run(&pool).await.into_diagnostic()?;

        tracing::info!(message = "Poll store ready", database_url = %database_url);
        Ok(Self { pool })
    }

    /// Fresh in-memory store with migrations applied. Used by tests and by
    /// dry runs of the appliance.
    ///
    /// # Errors
    ///
    /// Returns an error when migrations fail.
    pub async fn try_in_memory() -> miette::Result<Self> {
        Self::try_connect("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool { &self.pool }

    pub async fn close(&self) { self.pool.close().await; }

    /// The poll whose `[start_time, end_time]` window contains `at`; ties
    /// broken by largest id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn try_get_active_poll(
        &self,
        at: DateTime<Utc>,
    ) -> Result<Option<Poll>, StoreError> {
        let maybe_poll = sqlx::query_as::<_, Poll>(
            "SELECT id, question, start_time, end_time
             FROM polls
             WHERE start_time <= ? AND end_time >= ?
             ORDER BY id DESC
             LIMIT 1",
        )
        .bind(at)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(maybe_poll)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn try_get_poll_with_bindings(
        &self,
        poll_id: i64,
    ) -> Result<Option<PollWithBindings>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::get_poll_with_bindings_in(&mut conn, poll_id).await
    }

    async fn get_poll_with_bindings_in(
        conn: &mut SqliteConnection,
        poll_id: i64,
    ) -> Result<Option<PollWithBindings>, StoreError> {
        let maybe_poll = sqlx::query_as::<_, Poll>(
            "SELECT id, question, start_time, end_time FROM polls WHERE id = ?",
        )
        .bind(poll_id)
        .fetch_optional(&mut *conn)
        .await?;
        let Some(poll) = maybe_poll else {
            return Ok(None);
        };
        let bindings = Self::bindings_in(conn, poll_id).await?;
        Ok(Some(PollWithBindings { poll, bindings }))
    }

    async fn bindings_in(
        conn: &mut SqliteConnection,
        poll_id: i64,
    ) -> Result<Vec<CategoryBinding>, StoreError> {
        let bindings = sqlx::query_as::<_, CategoryBinding>(
            "SELECT pc.category_id AS category_id,
                    c.name AS category_name,
                    pc.position AS position
             FROM poll_categories pc
             JOIN categories c ON c.id = pc.category_id
             WHERE pc.poll_id = ?
             ORDER BY pc.position ASC",
        )
        .bind(poll_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(bindings)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::EmptyCategoryName`] for a blank name, or
    /// [`StoreError::Database`] on query failure.
    pub async fn try_get_or_create_category(
        &self,
        name: &str,
    ) -> Result<Category, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Self::get_or_create_category_in(&mut conn, name).await
    }

    async fn get_or_create_category_in(
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Category, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::EmptyCategoryName);
        }
        sqlx::query("INSERT INTO categories (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *conn)
            .await?;
        let category = sqlx::query_as::<_, Category>(
            "SELECT id, name FROM categories WHERE name = ?",
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
        Ok(category)
    }

    /// Delete a category. Restricted while donations reference it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CategoryInUse`] when donations block deletion.
    pub async fn try_delete_category(&self, category_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ?")
            .bind(category_id)
            .execute(&self.pool)
            .await;
        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(sqlx::Error::Database(db_err))
                if db_err.message().contains("FOREIGN KEY constraint failed") =>
            {
                Err(StoreError::CategoryInUse(category_id))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Create a poll with its ordered categories (resolved by name,
    /// get-or-create).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTimeWindow`] or
    /// [`StoreError::EmptyCategorySet`] on invalid input, or
    /// [`StoreError::Database`] on query failure.
    pub async fn try_create_poll(
        &self,
        question: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        category_names: &[&str],
    ) -> Result<PollWithBindings, StoreError> {
        if start_time >= end_time {
            return Err(StoreError::InvalidTimeWindow {
                start: start_time,
                end: end_time,
            });
        }
        if category_names.is_empty() {
            return Err(StoreError::EmptyCategorySet);
        }

        let mut tx = self.pool.begin().await?;

        let poll_id = sqlx::query(
            "INSERT INTO polls (question, start_time, end_time) VALUES (?, ?, ?)",
        )
        .bind(question)
        .bind(start_time)
        .bind(end_time)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (position, name) in category_names.iter().enumerate() {
            let category = Self::get_or_create_category_in(&mut tx, name).await?;
            sqlx::query(
                "INSERT INTO poll_categories (poll_id, category_id, position)
                 VALUES (?, ?, ?)",
            )
            .bind(poll_id)
            .bind(category.id)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        let poll = Self::get_poll_with_bindings_in(&mut tx, poll_id)
            .await?
            .ok_or(StoreError::PollNotFound(poll_id))?;
        tx.commit().await?;

        tracing::info!(
            message = "Poll created",
            poll_id,
            categories = poll.bindings.len(),
        );
        Ok(poll)
    }

    /// Update a poll. When `category_names` is given, the binding list is
    /// replaced and existing donations are migrated **positionally**: the
    /// donation rows of the old category at position i are rewritten to the
    /// new category at position i. When the new list is shorter, surplus old
    /// positions map to the last new category. The migration and the binding
    /// rewrite commit atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PollNotFound`], [`StoreError::InvalidTimeWindow`],
    /// [`StoreError::EmptyCategorySet`], or [`StoreError::Database`].
    pub async fn try_update_poll(
        &self,
        poll_id: i64,
        question: Option<&str>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        category_names: Option<&[&str]>,
    ) -> Result<PollWithBindings, StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing = Self::get_poll_with_bindings_in(&mut tx, poll_id)
            .await?
            .ok_or(StoreError::PollNotFound(poll_id))?;

        let new_start = start_time.unwrap_or(existing.poll.start_time);
        let new_end = end_time.unwrap_or(existing.poll.end_time);
        if new_start >= new_end {
            return Err(StoreError::InvalidTimeWindow {
                start: new_start,
                end: new_end,
            });
        }

        if let Some(names) = category_names {
            if names.is_empty() {
                return Err(StoreError::EmptyCategorySet);
            }

            let mut new_ids = Vec::with_capacity(names.len());
            for name in names {
                let category = Self::get_or_create_category_in(&mut tx, name).await?;
                new_ids.push(category.id);
            }

            let migrated =
                Self::migrate_donations_positionally_in(&mut tx, &existing, &new_ids)
                    .await?;
            if migrated > 0 {
                tracing::info!(
                    message = "Migrated donations to edited category bindings",
                    poll_id,
                    rows = migrated,
                );
            }

            sqlx::query("DELETE FROM poll_categories WHERE poll_id = ?")
                .bind(poll_id)
                .execute(&mut *tx)
                .await?;
            for (position, category_id) in new_ids.iter().copied().enumerate() {
                sqlx::query(
                    "INSERT INTO poll_categories (poll_id, category_id, position)
                     VALUES (?, ?, ?)",
                )
                .bind(poll_id)
                .bind(category_id)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query(
            "UPDATE polls SET question = ?, start_time = ?, end_time = ? WHERE id = ?",
        )
        .bind(question.unwrap_or(existing.poll.question.as_str()))
        .bind(new_start)
        .bind(new_end)
        .bind(poll_id)
        .execute(&mut *tx)
        .await?;

        let updated = Self::get_poll_with_bindings_in(&mut tx, poll_id)
            .await?
            .ok_or(StoreError::PollNotFound(poll_id))?;
        tx.commit().await?;
        Ok(updated)
    }

    /// One UPDATE per changed position, in position order (the original
    /// system's policy, including mapping surplus old positions to the last
    /// new category).
    async fn migrate_donations_positionally_in(
        tx: &mut SqliteConnection,
        existing: &PollWithBindings,
        new_ids: &[i64],
    ) -> Result<u64, StoreError> {
        let Some(last_new_id) = new_ids.last().copied() else {
            return Ok(0);
        };
        let mut migrated = 0_u64;
        for (index, old_binding) in existing.bindings.iter().enumerate() {
            let new_id = new_ids.get(index).copied().unwrap_or(last_new_id);
            if old_binding.category_id == new_id {
                continue;
            }
            let done = sqlx::query(
                "UPDATE donations SET category_id = ? WHERE poll_id = ? AND category_id = ?",
            )
            .bind(new_id)
            .bind(existing.poll.id)
            .bind(old_binding.category_id)
            .execute(&mut *tx)
            .await?;
            migrated += done.rows_affected();
        }
        Ok(migrated)
    }

    /// Delete a poll; donations and bindings cascade.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn try_delete_poll(&self, poll_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM polls WHERE id = ?")
            .bind(poll_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn try_list_polls(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Poll>, StoreError> {
        let polls = sqlx::query_as::<_, Poll>(
            "SELECT id, question, start_time, end_time
             FROM polls ORDER BY id DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(polls)
    }

    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn try_list_donations(
        &self,
        poll_id: i64,
    ) -> Result<Vec<DonationRecord>, StoreError> {
        let donations = sqlx::query_as::<_, DonationRecord>(
            "SELECT id, poll_id, category_id, amount_cents, timestamp
             FROM donations WHERE poll_id = ? ORDER BY id ASC",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(donations)
    }

    /// Aggregates on a pooled connection (outside any transaction).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn try_aggregate_totals(&self, poll_id: i64) -> Result<PollTotals, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let totals = Self::aggregate_totals_in(&mut conn, poll_id).await?;
        Ok(totals)
    }

    // The `*_in` functions below run on a caller-supplied connection so the
    // donation writer can compose them inside one transaction.

    /// # Errors
    ///
    /// Returns the underlying sqlx error.
    pub async fn poll_exists_in(
        conn: &mut SqliteConnection,
        poll_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM polls WHERE id = ?")
            .bind(poll_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    /// # Errors
    ///
    /// Returns the underlying sqlx error.
    pub async fn binding_exists_in(
        conn: &mut SqliteConnection,
        poll_id: i64,
        category_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let row = sqlx::query(
            "SELECT 1 FROM poll_categories WHERE poll_id = ? AND category_id = ?",
        )
        .bind(poll_id)
        .bind(category_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row.is_some())
    }

    /// # Errors
    ///
    /// Returns the underlying sqlx error.
    pub async fn insert_donation_in(
        conn: &mut SqliteConnection,
        poll_id: i64,
        category_id: i64,
        amount_cents: i64,
        at: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO donations (poll_id, category_id, amount_cents, timestamp)
             VALUES (?, ?, ?, ?)",
        )
        .bind(poll_id)
        .bind(category_id)
        .bind(amount_cents)
        .bind(at)
        .execute(&mut *conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Totals for categories currently bound to the poll, in position order,
    /// zero rows included.
    ///
    /// # Errors
    ///
    /// Returns the underlying sqlx error.
    pub async fn aggregate_totals_in(
        conn: &mut SqliteConnection,
        poll_id: i64,
    ) -> Result<PollTotals, sqlx::Error> {
        let by_category = sqlx::query_as::<_, CategoryTotal>(
            "SELECT pc.category_id AS category_id,
                    c.name AS category_name,
                    pc.position AS position,
                    COALESCE(SUM(d.amount_cents), 0) AS amount_cents,
                    COUNT(d.id) AS donation_count
             FROM poll_categories pc
             JOIN categories c ON c.id = pc.category_id
             LEFT JOIN donations d
                 ON d.poll_id = pc.poll_id AND d.category_id = pc.category_id
             WHERE pc.poll_id = ?
             GROUP BY pc.category_id, c.name, pc.position
             ORDER BY pc.position ASC",
        )
        .bind(poll_id)
        .fetch_all(&mut *conn)
        .await?;

        let total_amount_cents = by_category.iter().map(|entry| entry.amount_cents).sum();
        let total_donations = by_category.iter().map(|entry| entry.donation_count).sum();
        Ok(PollTotals {
            poll_id,
            total_amount_cents,
            total_donations,
            by_category,
        })
    }

    /// Count every donation row for a poll, including rows whose category is
    /// no longer bound (unlike [`Self::aggregate_totals_in`]).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    pub async fn try_count_donations(&self, poll_id: i64) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(id) AS n FROM donations WHERE poll_id = ?")
            .bind(poll_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }
}

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

//! Row and aggregate types read from storage.

use chrono::{DateTime, Utc};
use givebox_schema::DonationTotals;
use sqlx::FromRow;

#[derive(Clone, Debug, PartialEq, FromRow)]
pub struct Poll {
    pub id: i64,
    pub question: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// One ordered poll↔category link. `position` is the zero-based display and
/// button index.
#[derive(Clone, Debug, PartialEq, FromRow)]
pub struct CategoryBinding {
    pub category_id: i64,
    pub category_name: String,
    pub position: i64,
}

/// A poll together with its ordered bindings.
#[derive(Clone, Debug, PartialEq)]
pub struct PollWithBindings {
    pub poll: Poll,
    pub bindings: Vec<CategoryBinding>,
}

impl PollWithBindings {
    pub fn binding_at(&self, position: usize) -> Option<&CategoryBinding> {
        self.bindings
            .iter()
            .find(|binding| binding.position == position as i64)
    }
}

#[derive(Clone, Debug, PartialEq, FromRow)]
pub struct DonationRecord {
    pub id: i64,
    pub poll_id: i64,
    pub category_id: i64,
    pub amount_cents: i64,
    pub timestamp: DateTime<Utc>,
}

/// Per-category slice of a poll's totals, in binding-position order. Zero
/// rows are included so displays always show every current option.
#[derive(Clone, Debug, PartialEq, FromRow)]
pub struct CategoryTotal {
    pub category_id: i64,
    pub category_name: String,
    pub position: i64,
    pub amount_cents: i64,
    pub donation_count: i64,
}

/// Aggregates for one poll, restricted to categories currently bound to it.
/// Donations for categories no longer bound stay in storage but are excluded
/// here.
#[derive(Clone, Debug, PartialEq)]
pub struct PollTotals {
    pub poll_id: i64,
    pub total_amount_cents: i64,
    pub total_donations: i64,
    pub by_category: Vec<CategoryTotal>,
}

impl PollTotals {
    /// Collapse into the wire shape (`category_id → amount_cents`).
    pub fn to_wire(&self) -> DonationTotals {
        DonationTotals {
            total_amount_cents: self.total_amount_cents,
            total_donations: self.total_donations,
            category_totals: self
                .by_category
                .iter()
                .map(|entry| (entry.category_id, entry.amount_cents))
                .collect(),
        }
    }
}

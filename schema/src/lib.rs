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

//! # givebox_schema
//!
//! Wire-format definitions for the messages the givebox appliance streams to
//! connected display clients. Every outbound message is one UTF-8 JSON object
//! of the shape `{"type": …, "data": …}`; [`DisplayEnvelope`] models this as
//! an adjacently-tagged enum so that both the appliance and Rust display
//! clients share one source of truth.
//!
//! This crate is deliberately tiny and dependency-light so display clients
//! can depend on it without pulling in the appliance itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One outbound broadcast message.
///
/// Serialized as `{"type": "<snake_case variant>", "data": {…}}`, eg:
///
/// ```json
/// {"type":"money_inserted","data":{"amount_cents":50,"total_amount_cents":50,"timestamp":"…"}}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DisplayEnvelope {
    /// A category selection survived its debounce window.
    CategoryChosen(CategoryChosenData),
    /// A coin pulse sequence completed and was added to the pending amount.
    MoneyInserted(MoneyInsertedData),
    /// A donation row was committed.
    DonationCreated(DonationCreatedData),
}

/// Payload for [`DisplayEnvelope::CategoryChosen`].
///
/// `category_name` is `None` when the appliance could not resolve the name at
/// broadcast time (eg: the poll was edited between press and debounce expiry).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryChosenData {
    pub category_id: i64,
    pub category_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Payload for [`DisplayEnvelope::MoneyInserted`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MoneyInsertedData {
    /// Value of this insertion alone. Zero when the pulse count was unknown.
    pub amount_cents: i64,
    /// Accumulated pending amount after this insertion.
    pub total_amount_cents: i64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated totals for one poll, recomputed after every committed donation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DonationTotals {
    pub total_amount_cents: i64,
    pub total_donations: i64,
    /// Map of category id → donated cents, for the categories currently bound
    /// to the poll. JSON object keys are the stringified category ids.
    pub category_totals: BTreeMap<i64, i64>,
}

/// Payload for [`DisplayEnvelope::DonationCreated`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DonationCreatedData {
    /// Id of the poll the donation was attributed to. Kept as `vote_id` on the
    /// wire for compatibility with existing display clients.
    pub vote_id: i64,
    pub category_id: i64,
    pub amount_cents: i64,
    pub totals: DonationTotals,
    pub timestamp: DateTime<Utc>,
}

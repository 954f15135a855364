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

//! The two correlation slots and their generation counters, as a pure state
//! machine. No timers, no I/O: the engine task drives this and is the only
//! writer.

use chrono::{DateTime, Duration, Utc};

/// A debounced category selection waiting to be correlated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CategorySlot {
    pub position: usize,
    pub set_at: DateTime<Utc>,
}

/// Accumulated coin value waiting to be correlated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AmountSlot {
    pub cents: i64,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of the category precondition for a correlation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryCheck {
    Empty,
    Expired,
    Valid { position: usize },
}

/// Outcome of the amount precondition for a correlation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmountCheck {
    /// No amount, or below the minimum donation.
    Missing,
    Expired,
    Valid { cents: i64 },
}

/// Slot state plus the generation counters that make debounce cancellation
/// safe: a sleeper's wake message carries the generation it was spawned
/// under, and a stale generation must never write.
#[derive(Debug, Default)]
pub struct CorrelationSlots {
    selected_category: Option<CategorySlot>,
    pending_amount: Option<AmountSlot>,
    button_generation: u64,
    coin_generation: u64,
}

impl CorrelationSlots {
    pub fn new() -> Self { Self::default() }

    /// Start a new button debounce window, superseding any in-flight one.
    pub fn bump_button_generation(&mut self) -> u64 {
        self.button_generation += 1;
        self.button_generation
    }

    pub fn bump_coin_generation(&mut self) -> u64 {
        self.coin_generation += 1;
        self.coin_generation
    }

    pub fn is_current_button_generation(&self, generation: u64) -> bool {
        self.button_generation == generation
    }

    pub fn is_current_coin_generation(&self, generation: u64) -> bool {
        self.coin_generation == generation
    }

    pub fn select_category(&mut self, position: usize, now: DateTime<Utc>) {
        self.selected_category = Some(CategorySlot {
            position,
            set_at: now,
        });
    }

    /// Add coin value to the pending amount, refreshing its timestamp.
    /// Returns the new total.
    pub fn add_amount(&mut self, delta_cents: i64, now: DateTime<Utc>) -> i64 {
        let previous = self.pending_amount.map_or(0, |slot| slot.cents);
        let cents = previous + delta_cents;
        self.pending_amount = Some(AmountSlot {
            cents,
            updated_at: now,
        });
        cents
    }

    pub fn clear_category(&mut self) { self.selected_category = None; }

    /// Reset the amount to `(0, now)` — the expiry/invalid policy, distinct
    /// from clearing after a successful commit.
    pub fn reset_amount(&mut self, now: DateTime<Utc>) {
        self.pending_amount = Some(AmountSlot {
            cents: 0,
            updated_at: now,
        });
    }

    /// Both slots clear together after a successful donation write.
    pub fn clear_both(&mut self) {
        self.selected_category = None;
        self.pending_amount = None;
    }

    pub fn check_category(&self, now: DateTime<Utc>, ttl: Duration) -> CategoryCheck {
        match self.selected_category {
            None => CategoryCheck::Empty,
            Some(slot) if now.signed_duration_since(slot.set_at) > ttl => {
                CategoryCheck::Expired
            }
            Some(slot) => CategoryCheck::Valid {
                position: slot.position,
            },
        }
    }

    pub fn check_amount(
        &self,
        now: DateTime<Utc>,
        ttl: Duration,
        min_cents: i64,
    ) -> AmountCheck {
        match self.pending_amount {
            None => AmountCheck::Missing,
            Some(slot) if now.signed_duration_since(slot.updated_at) > ttl => {
                AmountCheck::Expired
            }
            Some(slot) if slot.cents < min_cents => AmountCheck::Missing,
            Some(slot) => AmountCheck::Valid { cents: slot.cents },
        }
    }

    pub fn selected_category(&self) -> Option<CategorySlot> { self.selected_category }

    pub fn pending_amount(&self) -> Option<AmountSlot> { self.pending_amount }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn ttl() -> Duration { Duration::seconds(30) }

    #[test]
    fn generations_supersede_older_windows() {
        let mut slots = CorrelationSlots::new();

        let first = slots.bump_button_generation();
        let second = slots.bump_button_generation();

        assert!(!slots.is_current_button_generation(first));
        assert!(slots.is_current_button_generation(second));
    }

    #[test]
    fn amount_accumulates_and_refreshes_its_timestamp() {
        let mut slots = CorrelationSlots::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::milliseconds(300);

        assert_eq!(slots.add_amount(100, t0), 100);
        assert_eq!(slots.add_amount(100, t0), 200);
        assert_eq!(slots.add_amount(10, t1), 210);

        let slot = slots.pending_amount().unwrap();
        assert_eq!(slot.cents, 210);
        assert_eq!(slot.updated_at, t1);
    }

    #[test]
    fn category_check_empty_fresh_expired() {
        let mut slots = CorrelationSlots::new();
        let t0 = Utc::now();

        assert_eq!(slots.check_category(t0, ttl()), CategoryCheck::Empty);

        slots.select_category(1, t0);
        assert_eq!(
            slots.check_category(t0 + Duration::seconds(29), ttl()),
            CategoryCheck::Valid { position: 1 }
        );
        assert_eq!(
            slots.check_category(t0 + Duration::seconds(31), ttl()),
            CategoryCheck::Expired
        );
    }

    #[test]
    fn amount_check_covers_missing_minimum_and_ttl() {
        let mut slots = CorrelationSlots::new();
        let t0 = Utc::now();

        assert_eq!(slots.check_amount(t0, ttl(), 1), AmountCheck::Missing);

        slots.reset_amount(t0);
        assert_eq!(slots.check_amount(t0, ttl(), 1), AmountCheck::Missing);

        slots.add_amount(50, t0);
        assert_eq!(
            slots.check_amount(t0, ttl(), 1),
            AmountCheck::Valid { cents: 50 }
        );
        assert_eq!(
            slots.check_amount(t0 + Duration::seconds(31), ttl(), 1),
            AmountCheck::Expired
        );
    }

    #[test]
    fn clear_both_empties_both_slots_together() {
        let mut slots = CorrelationSlots::new();
        let t0 = Utc::now();
        slots.select_category(0, t0);
        slots.add_amount(50, t0);

        slots.clear_both();

        assert_eq!(slots.selected_category(), None);
        assert_eq!(slots.pending_amount(), None);
    }
}

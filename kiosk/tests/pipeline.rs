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

//! End-to-end pipeline tests: real mock pins fired from external threads,
//! through the bridge, dispatcher, correlation engine, writer, and hub.

use std::{sync::Arc, time::Duration};

use givebox::{config::KioskConfig,
              correlate::CorrelationSettings,
              gpio::{self, ComponentRegistry, Edge, EventDispatcher, MockPinDriver},
              test_fixtures::{TestRig, collect_envelopes}};
use givebox_schema::DisplayEnvelope;
use pretty_assertions::assert_eq;
use tokio::{sync::broadcast, task::JoinHandle};

const BUTTON_A_PIN: u8 = 17;
const BUTTON_B_PIN: u8 = 27;
const COIN_PIN: u8 = 23;

struct Pipeline {
    rig: TestRig,
    driver: Arc<MockPinDriver>,
    shutdown_tx: broadcast::Sender<()>,
    dispatcher_task: JoinHandle<()>,
}

impl Pipeline {
    async fn start() -> Self {
        let config = KioskConfig {
            button_pins: vec![BUTTON_A_PIN, BUTTON_B_PIN],
            coin_pin: COIN_PIN,
            button_debounce: Duration::from_millis(50),
            coin_debounce: Duration::from_millis(50),
            coin_pulse_timeout: Duration::from_millis(60),
            button_bounce: Duration::from_millis(1),
            coin_bounce: Duration::from_millis(1),
            ..KioskConfig::default()
        };

        let rig = TestRig::try_new(CorrelationSettings::from_config(&config))
            .await
            .unwrap();

        let driver = Arc::new(MockPinDriver::new());
        let (tap, queue_rx) = gpio::bridge::channel(gpio::EVENT_QUEUE_CAPACITY);
        let mut registry = ComponentRegistry::new();
        gpio::register_components(&mut registry, &config).unwrap();
        registry.start_all(driver.as_ref(), &tap);

        let dispatcher = EventDispatcher::new(registry, queue_rx, rig.container.clone());
        let (shutdown_tx, _) = broadcast::channel(1);
        let dispatcher_task = tokio::spawn(dispatcher.run(shutdown_tx.subscribe()));

        Self {
            rig,
            driver,
            shutdown_tx,
            dispatcher_task,
        }
    }

    /// Press and release a button from a thread the runtime knows nothing
    /// about, like a real driver callback thread.
    fn press_button_from_hardware_thread(&self, pin: u8) {
        let driver = self.driver.clone();
        std::thread::spawn(move || {
            driver.fire_edge(pin, Edge::Activated);
            driver.fire_edge(pin, Edge::Deactivated);
        })
        .join()
        .unwrap();
    }

    fn insert_coin_from_hardware_thread(&self, pulses: u32) {
        let driver = self.driver.clone();
        std::thread::spawn(move || {
            driver.fire_pulses(COIN_PIN, pulses);
        })
        .join()
        .unwrap();
    }

    async fn stop(self) {
        self.shutdown_tx.send(()).unwrap();
        self.dispatcher_task.await.unwrap();
        self.rig.shutdown().await;
    }
}

#[tokio::test]
async fn button_press_and_coins_become_one_broadcast_donation() {
    let pipeline = Pipeline::start().await;
    let poll = pipeline.rig.seed_poll(&["Animal shelter", "Food bank"]).await;
    let category_a = poll.bindings[0].category_id;
    let (_sub, mut rx) = pipeline.rig.container.broadcast_hub.subscribe();

    pipeline.press_button_from_hardware_thread(BUTTON_A_PIN);
    tokio::time::sleep(Duration::from_millis(250)).await;
    pipeline.insert_coin_from_hardware_thread(3);

    let envelopes = collect_envelopes(&mut rx, 3, Duration::from_secs(5)).await;
    assert_eq!(envelopes.len(), 3);
    match &envelopes[0] {
        DisplayEnvelope::CategoryChosen(data) => {
            assert_eq!(data.category_id, category_a);
            assert_eq!(data.category_name.as_deref(), Some("Animal shelter"));
        }
        other => panic!("expected category_chosen, got {other:?}"),
    }
    match &envelopes[1] {
        DisplayEnvelope::MoneyInserted(data) => {
            assert_eq!(data.amount_cents, 50);
            assert_eq!(data.total_amount_cents, 50);
        }
        other => panic!("expected money_inserted, got {other:?}"),
    }
    match &envelopes[2] {
        DisplayEnvelope::DonationCreated(data) => {
            assert_eq!(data.vote_id, poll.poll.id);
            assert_eq!(data.category_id, category_a);
            assert_eq!(data.amount_cents, 50);
            assert_eq!(data.totals.total_donations, 1);
        }
        other => panic!("expected donation_created, got {other:?}"),
    }

    let donations = pipeline
        .rig
        .container
        .poll_store
        .try_list_donations(poll.poll.id)
        .await
        .unwrap();
    assert_eq!(donations.len(), 1);
    assert_eq!(donations[0].amount_cents, 50);
    assert_eq!(donations[0].category_id, category_a);

    pipeline.stop().await;
}

#[tokio::test]
async fn second_button_maps_to_second_category_position() {
    let pipeline = Pipeline::start().await;
    let poll = pipeline.rig.seed_poll(&["Animal shelter", "Food bank"]).await;
    let category_b = poll.bindings[1].category_id;
    let (_sub, mut rx) = pipeline.rig.container.broadcast_hub.subscribe();

    pipeline.press_button_from_hardware_thread(BUTTON_B_PIN);

    let envelopes = collect_envelopes(&mut rx, 1, Duration::from_secs(5)).await;
    match &envelopes[0] {
        DisplayEnvelope::CategoryChosen(data) => {
            assert_eq!(data.category_id, category_b);
            assert_eq!(data.category_name.as_deref(), Some("Food bank"));
        }
        other => panic!("expected category_chosen, got {other:?}"),
    }

    pipeline.stop().await;
}

#[tokio::test]
async fn rapid_presses_on_two_buttons_choose_the_last_one() {
    let pipeline = Pipeline::start().await;
    let poll = pipeline.rig.seed_poll(&["Animal shelter", "Food bank"]).await;
    let category_b = poll.bindings[1].category_id;
    let (_sub, mut rx) = pipeline.rig.container.broadcast_hub.subscribe();

    pipeline.press_button_from_hardware_thread(BUTTON_A_PIN);
    tokio::time::sleep(Duration::from_millis(15)).await;
    pipeline.press_button_from_hardware_thread(BUTTON_B_PIN);

    let envelopes = collect_envelopes(&mut rx, 1, Duration::from_secs(5)).await;
    match &envelopes[0] {
        DisplayEnvelope::CategoryChosen(data) => {
            assert_eq!(data.category_id, category_b);
        }
        other => panic!("expected category_chosen, got {other:?}"),
    }
    // And only one selection surfaced for the two presses.
    assert!(
        collect_envelopes(&mut rx, 1, Duration::from_millis(300))
            .await
            .is_empty()
    );

    pipeline.stop().await;
}

#[tokio::test]
async fn coins_without_a_press_accumulate_but_never_commit() {
    let pipeline = Pipeline::start().await;
    let poll = pipeline.rig.seed_poll(&["Animal shelter"]).await;
    let (_sub, mut rx) = pipeline.rig.container.broadcast_hub.subscribe();

    pipeline.insert_coin_from_hardware_thread(4);
    tokio::time::sleep(Duration::from_millis(250)).await;
    pipeline.insert_coin_from_hardware_thread(1);

    let envelopes = collect_envelopes(&mut rx, 2, Duration::from_secs(5)).await;
    let totals: Vec<i64> = envelopes
        .iter()
        .filter_map(|envelope| match envelope {
            DisplayEnvelope::MoneyInserted(data) => Some(data.total_amount_cents),
            _ => None,
        })
        .collect();
    assert_eq!(totals, vec![100, 110]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(
        pipeline
            .rig
            .container
            .poll_store
            .try_list_donations(poll.poll.id)
            .await
            .unwrap()
            .is_empty()
    );

    pipeline.stop().await;
}

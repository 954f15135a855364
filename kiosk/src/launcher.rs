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

//! Appliance lifespan: construct everything, run until Ctrl-C, tear down in
//! order.
//!
//! Startup: store (+ migrations) → hub → writer → engine → container →
//! components → dispatcher → display listener. A failure anywhere here
//! surfaces as a diagnostic and a non-zero exit, before any event is
//! accepted.
//!
//! Shutdown: cancel the engine's debounce sleepers, then let the dispatcher
//! drain queued events up to its deadline and stop the components, stop the
//! listener, close subscribers, close the pool.

use std::sync::Arc;

use miette::IntoDiagnostic;
use tokio::sync::broadcast;

use crate::{broadcast as display,
            broadcast::BroadcastHub,
            clock::{Clock, SystemClock},
            config::KioskConfig,
            container::AppContainer,
            correlate::{CorrelationEngine, CorrelationSettings},
            donate::DonationWriter,
            gpio::{self, ComponentRegistry, EventDispatcher, MockPinDriver},
            store::PollStore};

/// Run the appliance until Ctrl-C.
///
/// # Errors
///
/// Returns an error when startup fails (database, migrations, component
/// registration, listener bind). Runtime faults after startup are logged and
/// survived, not returned.
pub async fn try_run(config: KioskConfig) -> miette::Result<()> {
    let store = Arc::new(PollStore::try_connect(&config.database_url).await?);
    let hub = Arc::new(BroadcastHub::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let writer = Arc::new(DonationWriter::new(store.clone(), hub.clone()));
    let (engine, engine_task) = CorrelationEngine::spawn(
        CorrelationSettings::from_config(&config),
        clock.clone(),
        store.clone(),
        writer.clone(),
        hub.clone(),
    );

    let container = Arc::new(AppContainer {
        config: config.clone(),
        clock,
        poll_store: store.clone(),
        donation_writer: writer,
        broadcast_hub: hub.clone(),
        correlation_engine: engine.clone(),
    });

    // The mock driver is the only backend linked into this build; the config
    // layer has already rejected any other selection when GPIO is enabled.
    let driver = Arc::new(MockPinDriver::new());
    if config.enable_gpio {
        tracing::info!(
            message = "GPIO enabled",
            pin_factory = %config.pin_factory,
        );
    } else {
        tracing::info!(message = "GPIO disabled - events come from the mock driver only");
    }

    let (tap, queue_rx) = gpio::bridge::channel(gpio::EVENT_QUEUE_CAPACITY);
    let mut registry = ComponentRegistry::new();
    gpio::register_components(&mut registry, &config).into_diagnostic()?;
    tracing::info!(
        message = "Components registered",
        components = registry.len(),
    );
    registry.start_all(driver.as_ref(), &tap);

    let (shutdown_tx, _) = broadcast::channel(4);

    let dispatcher = EventDispatcher::new(registry, queue_rx, container.clone());
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown_tx.subscribe()));

    let listener = display::try_bind(config.listen_addr).await?;
    let listener_task = display::spawn_accept_loop(listener, hub.clone(), shutdown_tx.subscribe());

    tracing::info!(
        message = "Appliance running - Ctrl-C to stop",
        app_name = %config.app_name,
    );
    tokio::signal::ctrl_c().await.into_diagnostic()?;
    tracing::info!(message = "Shutdown requested");

    // Debounce sleepers first: nothing may commit once teardown starts.
    engine.request_shutdown().await;
    let _ = engine_task.await;

    let _ = shutdown_tx.send(());
    let _ = dispatcher_task.await;
    let _ = listener_task.await;

    hub.close_all();
    store.close().await;

    tracing::info!(message = "Shutdown complete");
    Ok(())
}

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

//! The application container: every long-lived dependency, owned in one
//! place, constructed once at startup and threaded explicitly into event
//! handlers by the dispatcher. There is no global mutable state anywhere in
//! the appliance.

use std::sync::Arc;

use crate::{broadcast::BroadcastHub,
            clock::Clock,
            config::KioskConfig,
            correlate::CorrelationEngine,
            donate::DonationWriter,
            store::PollStore};

/// Handed (as `Arc<AppContainer>`) to every handler invocation. Database
/// sessions are not stored here — they are per-commit, acquired from the
/// store's pool.
pub struct AppContainer {
    pub config: KioskConfig,
    pub clock: Arc<dyn Clock>,
    pub poll_store: Arc<PollStore>,
    pub donation_writer: Arc<DonationWriter>,
    pub broadcast_hub: Arc<BroadcastHub>,
    pub correlation_engine: CorrelationEngine,
}

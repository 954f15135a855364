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

//! Hardware event pipeline: pins → bridge → dispatcher → handlers.
//!
//! Data flows one way. Driver callback threads produce [`event::GpioEvent`]s
//! and hand them to the loop through the bounded [`bridge`]; the single
//! [`dispatcher`] task resolves the target component in the [`registry`] and
//! invokes its declared handlers with the application container injected.

pub mod bridge;
pub mod components;
pub mod dispatcher;
pub mod event;
pub mod pins;
pub mod registry;

pub use bridge::{EVENT_QUEUE_CAPACITY, EventQueueRx, EventTap};
pub use components::{CategoryButton, CoinValidator, register_components};
pub use dispatcher::{EventDispatcher, SHUTDOWN_DRAIN_DEADLINE};
pub use event::{ComponentId, EventData, EventKind, GpioEvent};
pub use pins::{Edge, EdgeCallback, EdgeSource, MockPinDriver, PinDriver, PinRequest};
pub use registry::{ComponentLifecycle, ComponentRegistry, GpioComponent, HandlerFn,
                   HandlerFuture, HandlerTable, RegistryError};

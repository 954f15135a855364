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

//! Real-time fan-out to display clients: the in-process [`hub`] plus the TCP
//! [`listener`] that turns connections into subscriptions.

pub mod hub;
pub mod listener;

pub use hub::{BroadcastHub, EnvelopeRx, SUBSCRIBER_QUEUE_CAPACITY,
              SUBSCRIBER_SEND_TIMEOUT, SubscriberId};
pub use listener::{spawn_accept_loop, try_bind};

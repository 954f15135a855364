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

//! Category-selection button.
//!
//! Each button represents one category position of the active poll (button at
//! index i ⇒ binding at position i). The press handler only forwards the
//! position to the correlation engine; the engine owns debouncing and slot
//! state. Release edges are emitted too but nothing subscribes to them.

use std::{sync::Arc, time::Duration};

use super::super::{bridge::EventTap,
                   event::{ComponentId, EventKind, GpioEvent},
                   pins::{Edge, EdgeSource, PinDriver, PinRequest},
                   registry::{GpioComponent, HandlerTable}};
use crate::DEBUG_GPIO_MOD;

pub struct CategoryButton {
    component_id: ComponentId,
    /// Zero-based category position this button selects.
    position: usize,
    pin: u8,
    pull_up: bool,
    bounce: Duration,
    source: Option<Box<dyn EdgeSource>>,
}

impl CategoryButton {
    pub fn new(
        component_id: impl Into<ComponentId>,
        position: usize,
        pin: u8,
        bounce: Duration,
    ) -> Self {
        Self {
            component_id: component_id.into(),
            position,
            pin,
            // Buttons are wired active-low to ground.
            pull_up: true,
            bounce,
            source: None,
        }
    }
}

impl GpioComponent for CategoryButton {
    fn component_id(&self) -> ComponentId { self.component_id.clone() }

    fn build_handler_table(&self) -> HandlerTable {
        let position = self.position;
        let mut table = HandlerTable::new();
        table.bind(EventKind::ButtonPressed, move |_event, container| async move {
            container.correlation_engine.button_pressed(position).await;
            Ok(())
        });
        table
    }

    fn try_start(&mut self, driver: &dyn PinDriver, tap: EventTap) -> miette::Result<()> {
        let mut source = driver.try_claim_input(PinRequest {
            pin: self.pin,
            pull_up: self.pull_up,
            bounce: self.bounce,
        })?;

        let component_id = self.component_id.clone();
        let pin = self.pin;
        source.set_edge_callback(Arc::new(move |edge| {
            // Runs on the driver's callback thread; enqueue only.
            let kind = match edge {
                Edge::Activated => EventKind::ButtonPressed,
                Edge::Deactivated => EventKind::ButtonReleased,
            };
            tap.enqueue(GpioEvent::new(component_id.clone(), kind).with_field("pin", pin));
        }));

        self.source = Some(source);
        tracing::info!(
            message = "Category button bound",
            component_id = %self.component_id,
            pin = self.pin,
            position = self.position,
        );
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.release();
            DEBUG_GPIO_MOD.then(|| {
                tracing::debug!(
                    message = "Category button released",
                    component_id = %self.component_id,
                );
            });
        }
    }

    fn is_started(&self) -> bool { self.source.is_some() }
}

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

//! Component registry: the set of logical devices, their hardware bindings,
//! and their declared handlers.
//!
//! A component declares its `(event kind → handler)` bindings once, at
//! registration, as a [`HandlerTable`] of boxed async closures. There is no
//! runtime introspection; the table is the whole contract between a component
//! and the dispatcher. Registration is one-shot per id. The registry is owned
//! by exactly one task at a time (setup, then the dispatcher), so it carries
//! no locking.

use std::{collections::HashMap, pin::Pin, sync::Arc};

use strum_macros::Display;
use thiserror::Error;

use super::{bridge::EventTap,
            event::{ComponentId, EventKind, GpioEvent},
            pins::PinDriver};
use crate::container::AppContainer;

/// Boxed future returned by one handler invocation.
pub type HandlerFuture = Pin<Box<dyn Future<Output = miette::Result<()>> + Send>>;

/// One bound handler. Receives the event and the application container (the
/// dispatcher's dependency injection).
pub type HandlerFn = Box<dyn Fn(GpioEvent, Arc<AppContainer>) -> HandlerFuture + Send + Sync>;

/// Static `event kind → handlers` table, built at construction time.
#[derive(Default)]
pub struct HandlerTable {
    bindings: HashMap<EventKind, Vec<HandlerFn>>,
}

impl HandlerTable {
    pub fn new() -> Self { Self::default() }

    /// Bind an async closure to an event kind. Multiple handlers per kind run
    /// in bind order.
    pub fn bind<F, Fut>(&mut self, kind: EventKind, handler: F)
    where
        F: Fn(GpioEvent, Arc<AppContainer>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = miette::Result<()>> + Send + 'static,
    {
        self.bindings
            .entry(kind)
            .or_default()
            .push(Box::new(move |event, container| -> HandlerFuture {
                Box::pin(handler(event, container))
            }));
    }

    pub fn handlers_for(&self, kind: EventKind) -> &[HandlerFn] {
        self.bindings.get(&kind).map_or(&[], Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool { self.bindings.is_empty() }
}

/// A logical device: a couple of declared handlers plus the hardware resource
/// it binds on start and releases on stop.
pub trait GpioComponent: Send + Sync {
    fn component_id(&self) -> ComponentId;

    /// Declare the handler table. Called exactly once, at registration.
    fn build_handler_table(&self) -> HandlerTable;

    /// Bind hardware resources and begin emitting events through `tap`.
    ///
    /// # Errors
    ///
    /// Returns an error when the hardware resource cannot be bound (eg: pin
    /// already claimed).
    fn try_start(&mut self, driver: &dyn PinDriver, tap: EventTap) -> miette::Result<()>;

    /// Release hardware resources. Idempotent.
    fn stop(&mut self);

    fn is_started(&self) -> bool;
}

/// Registry-visible lifecycle. `unregistered` is represented by absence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ComponentLifecycle {
    Registered,
    Started,
    Stopped,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("component `{0}` is already registered")]
    DuplicateComponent(ComponentId),

    #[error("component `{0}` is not registered")]
    UnknownComponent(ComponentId),
}

struct RegistryEntry {
    id: ComponentId,
    component: Box<dyn GpioComponent>,
    handlers: HandlerTable,
    lifecycle: ComponentLifecycle,
}

/// Ordered set of registered components. Registration order is start order.
#[derive(Default)]
pub struct ComponentRegistry {
    entries: Vec<RegistryEntry>,
}

impl ComponentRegistry {
    pub fn new() -> Self { Self::default() }

    /// Register a component and capture its handler table. One-shot: a second
    /// registration under the same id fails.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateComponent`] when the id is taken.
    pub fn register(&mut self, component: Box<dyn GpioComponent>) -> Result<(), RegistryError> {
        let id = component.component_id();
        if self.contains(&id) {
            return Err(RegistryError::DuplicateComponent(id));
        }
        let handlers = component.build_handler_table();
        tracing::info!(message = "Component registered", component_id = %id);
        self.entries.push(RegistryEntry {
            id,
            component,
            handlers,
            lifecycle: ComponentLifecycle::Registered,
        });
        Ok(())
    }

    /// Remove a component, stopping it first when it is running.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownComponent`] when the id is absent.
    pub fn unregister(&mut self, id: &ComponentId) -> Result<(), RegistryError> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.id == *id)
            .ok_or_else(|| RegistryError::UnknownComponent(id.clone()))?;
        let mut entry = self.entries.remove(index);
        if entry.component.is_started() {
            entry.component.stop();
        }
        tracing::info!(message = "Component unregistered", component_id = %id);
        Ok(())
    }

    /// Start every component, binding hardware through `driver`. A component
    /// that fails to start is logged and skipped; one broken device must not
    /// take the kiosk down.
    pub fn start_all(&mut self, driver: &dyn PinDriver, tap: &EventTap) {
        for entry in &mut self.entries {
            if entry.component.is_started() {
                continue;
            }
            match entry.component.try_start(driver, tap.clone()) {
                Ok(()) => {
                    entry.lifecycle = ComponentLifecycle::Started;
                    tracing::info!(message = "Component started", component_id = %entry.id);
                }
                Err(report) => {
                    // % is Display, ? is Debug.
                    tracing::error!(
                        message = "Failed to start component",
                        component_id = %entry.id,
                        error = ?report,
                    );
                }
            }
        }
    }

    /// Stop every started component and release its hardware.
    pub fn stop_all(&mut self) {
        for entry in &mut self.entries {
            if entry.component.is_started() {
                entry.component.stop();
                entry.lifecycle = ComponentLifecycle::Stopped;
                tracing::info!(message = "Component stopped", component_id = %entry.id);
            }
        }
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.entries.iter().any(|entry| entry.id == *id)
    }

    /// Handlers bound for `(component, kind)`. `None` means the component is
    /// unknown; an empty slice means it declared nothing for this kind.
    pub fn handlers_for(&self, id: &ComponentId, kind: EventKind) -> Option<&[HandlerFn]> {
        self.entries
            .iter()
            .find(|entry| entry.id == *id)
            .map(|entry| entry.handlers.handlers_for(kind))
    }

    pub fn lifecycle(&self, id: &ComponentId) -> Option<ComponentLifecycle> {
        self.entries
            .iter()
            .find(|entry| entry.id == *id)
            .map(|entry| entry.lifecycle)
    }

    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.entries.iter().map(|entry| entry.id.clone()).collect()
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

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

//! Tracing initialization for the appliance binary.
//!
//! Builds a display layer (stderr) and, when `DEBUG` is on, a daily-rolling
//! file layer next to the binary. Returns the layers rather than installing
//! them so tests can compose their own subscriber; call [`try_install`] from
//! `main`.

use miette::IntoDiagnostic;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_core::LevelFilter;
use tracing_subscriber::{Layer, layer::SubscriberExt, registry::LookupSpan,
                         util::SubscriberInitExt};

use crate::config::KioskConfig;

/// File name prefix for the rolling debug log.
pub const LOG_FILE_PREFIX: &str = "givebox.log";

/// Type alias for a boxed layer.
pub type DynLayer<S> = dyn Layer<S> + Send + Sync + 'static;

/// Install the global tracing subscriber for the appliance process.
///
/// The returned guard must be held for the lifetime of the process; dropping
/// it flushes and shuts down the file writer.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn try_install(config: &KioskConfig) -> miette::Result<Option<WorkerGuard>> {
    let mut layers: Vec<Box<DynLayer<tracing_subscriber::Registry>>> = vec![];

    layers.push(create_display_layer(config.log_level));

    let mut maybe_guard = None;
    if config.debug {
        let (layer, guard) = create_file_layer(config.log_level);
        layers.push(layer);
        maybe_guard = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .into_diagnostic()?;

    Ok(maybe_guard)
}

/// Human-oriented layer writing to stderr, so broadcast payloads on stdout (if
/// ever piped) stay clean.
pub fn create_display_layer<S>(level_filter: LevelFilter) -> Box<DynLayer<S>>
where
    S: tracing_core::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    Box::new(
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(level_filter),
    )
}

/// Daily-rolling file layer in the current directory, non-blocking writer.
pub fn create_file_layer<S>(
    level_filter: LevelFilter,
) -> (Box<DynLayer<S>>, WorkerGuard)
where
    S: tracing_core::Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(".", LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(level_filter);
    (Box::new(layer), guard)
}

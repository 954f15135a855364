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

//! Appliance entry point. Configuration comes from the environment
//! ([`KioskConfig::try_from_env`]); the few flags here override it for
//! operator convenience. Any startup failure exits non-zero before a single
//! hardware event is accepted.

use clap_config::CLIArg;
use clap::Parser;
use givebox::{config::KioskConfig, launcher, log};
use miette::IntoDiagnostic;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli_arg = CLIArg::parse();

    let mut config = KioskConfig::try_from_env().into_diagnostic()?;
    cli_arg.global_options.apply(&mut config)?;

    let _log_guard = log::try_install(&config)?;
    tracing::info!(
        message = "Configuration loaded",
        app_name = %config.app_name,
        database_url = %config.database_url,
        listen_addr = %config.listen_addr,
        enable_gpio = config.enable_gpio,
    );

    launcher::try_run(config).await
}

/// More info:
/// - <https://docs.rs/clap/latest/clap/_derive/#overview>
mod clap_config {
    use std::net::SocketAddr;

    use clap::{Args, Parser};
    use givebox::config::KioskConfig;

    #[derive(Debug, Parser)]
    #[command(bin_name = "givebox")]
    #[command(about = "Charitable-voting kiosk appliance: buttons + coins in, donations out")]
    #[command(version)]
    #[command(next_line_help = true)]
    pub struct CLIArg {
        #[command(flatten)]
        pub global_options: GlobalOption,
    }

    #[derive(Debug, Args)]
    pub struct GlobalOption {
        #[arg(
            long,
            help = "Override LOG_LEVEL (off, error, warn, info, debug, trace)."
        )]
        pub log_level: Option<String>,

        #[arg(long, help = "Override DATABASE_URL.")]
        pub database_url: Option<String>,

        #[arg(long, help = "Override LISTEN_ADDR for display clients.")]
        pub listen_addr: Option<SocketAddr>,
    }

    impl GlobalOption {
        /// Fold the CLI overrides into the env-derived configuration.
        ///
        /// # Errors
        ///
        /// Returns an error for an unparseable `--log-level`.
        pub fn apply(&self, config: &mut KioskConfig) -> miette::Result<()> {
            if let Some(log_level) = &self.log_level {
                config.log_level = log_level
                    .trim()
                    .parse()
                    .map_err(|_| miette::miette!("invalid --log-level `{log_level}`"))?;
            }
            if let Some(database_url) = &self.database_url {
                config.database_url = database_url.clone();
            }
            if let Some(listen_addr) = self.listen_addr {
                config.listen_addr = listen_addr;
            }
            Ok(())
        }
    }
}

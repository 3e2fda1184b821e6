// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Shared tracing initialization for skein hosts and tools.

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Build the filter directive string for the given logging configuration.
///
/// Unlike the usual `RUST_LOG` flow, the process environment is never consulted; the level comes
/// only from configuration.
pub fn filter_directive(config: &LoggingConfig) -> String {
    let mut directive = config.level.clone();
    for (target, level) in &config.targets {
        directive.push_str(&format!(",{target}={level}"));
    }
    directive
}

/// Initialize tracing from a [`LoggingConfig`].
///
/// Uses a compact layered subscriber with file and line information, in the same shape for
/// every binary embedding the RPC core.
///
/// # Returns
/// * `Ok(())` on successful initialization
/// * `Err(eyre::Report)` if the filter is malformed or a global subscriber is already installed
pub fn init_tracing(config: &LoggingConfig) -> Result<(), eyre::Report> {
    let filter = EnvFilter::try_new(filter_directive(config))
        .map_err(|e| eyre::eyre!("Invalid log filter {:?}: {e}", config.level))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_ansi(config.ansi)
                .with_file(true)
                .with_target(false)
                .with_line_number(true)
                .with_thread_names(true)
                .with_span_events(fmt::format::FmtSpan::NONE),
        )
        .with(filter)
        .try_init()
        .map_err(|e| eyre::eyre!("Unable to install tracing subscriber: {e}"))?;

    Ok(())
}

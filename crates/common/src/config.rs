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

//! Config is created by the embedding host and handed to the RPC runtime when the proxy cache and
//! connection contexts are built. Nothing here is read from the process environment; values come
//! from defaults, optionally overlaid by a YAML file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use eyre::eyre;
use figment::Figment;
use figment::providers::{Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RpcConfig {
    /// Whether generated proxies send readable call names on the wire, rather than short hashed
    /// tokens. Readable names make transport traces easier to follow at the cost of payload size.
    pub preserve_function_names: bool,
    /// Promise-shaped calls taking longer than this are logged at `warn` by the default timing
    /// hook. Zero disables the warning.
    pub slow_call_threshold_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            preserve_function_names: true,
            slow_call_threshold_ms: 1000,
        }
    }
}

impl RpcConfig {
    pub fn slow_call_threshold(&self) -> Option<Duration> {
        (self.slow_call_threshold_ms > 0).then(|| Duration::from_millis(self.slow_call_threshold_ms))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level directive, e.g. `info` or `debug`.
    pub level: String,
    /// Per-target overrides, e.g. `skein_rpc: trace`.
    pub targets: BTreeMap<String, String>,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            targets: BTreeMap::new(),
            ansi: true,
        }
    }
}

impl Config {
    /// Load the configuration file if we have it, overlaying it on the defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Config, eyre::Report> {
        let Some(config_path) = config_path else {
            return Ok(Config::default());
        };
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(config_path))
            .extract::<Config>()
            .map_err(|e| {
                eyre!(
                    "Failed to parse configuration from {:?}: {}",
                    config_path,
                    e
                )
            })
    }
}

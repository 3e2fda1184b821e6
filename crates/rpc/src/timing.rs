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

//! Call timing hooks wrapped around every promise-shaped call.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use minstant::Instant;
use skein_common::RpcConfig;
use tracing::{debug, warn};

use crate::errors::RpcError;
use crate::value::Value;

pub trait TimingHook: Send + Sync {
    fn track(
        &self,
        call: &str,
        operation: BoxFuture<'static, Result<Value, RpcError>>,
    ) -> BoxFuture<'static, Result<Value, RpcError>>;
}

/// Logs the duration of each call, at `warn` once it exceeds the slow call threshold.
#[derive(Clone, Debug)]
pub struct TracingTiming {
    slow_call_threshold: Option<Duration>,
}

impl TracingTiming {
    pub fn new(slow_call_threshold: Option<Duration>) -> Self {
        Self {
            slow_call_threshold,
        }
    }

    pub fn from_config(config: &RpcConfig) -> Self {
        Self::new(config.slow_call_threshold())
    }
}

impl Default for TracingTiming {
    fn default() -> Self {
        Self::from_config(&RpcConfig::default())
    }
}

impl TimingHook for TracingTiming {
    fn track(
        &self,
        call: &str,
        operation: BoxFuture<'static, Result<Value, RpcError>>,
    ) -> BoxFuture<'static, Result<Value, RpcError>> {
        let call = call.to_string();
        let threshold = self.slow_call_threshold;
        async move {
            let start = Instant::now();
            let result = operation.await;
            let elapsed = start.elapsed();
            let failed = result.is_err();
            match threshold {
                Some(threshold) if elapsed > threshold => {
                    warn!(%call, ?elapsed, failed, "slow remote call");
                }
                _ => debug!(%call, ?elapsed, failed, "remote call finished"),
            }
            result
        }
        .boxed()
    }
}

/// Leaves calls untouched.
pub struct NoTiming;

impl TimingHook for NoTiming {
    fn track(
        &self,
        _call: &str,
        operation: BoxFuture<'static, Result<Value, RpcError>>,
    ) -> BoxFuture<'static, Result<Value, RpcError>> {
        operation
    }
}

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

//! Shared fixtures: an in-memory definition source and a context driven by hand.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flume::Receiver;
use serde_json::Value as JsonValue;
use skein_compiler::ReturnKind;
use skein_rpc::{
    CallId, CallTarget, ChannelTransport, ConnectionContext, DefinitionSource, FuturesStreams,
    NoTiming, Outbound, ProxyCache,
};

/// Definitions held in memory, counting every read.
#[derive(Default)]
pub struct MemorySource {
    files: Mutex<HashMap<PathBuf, String>>,
    reads: AtomicUsize,
    delay: Option<Duration>,
}

impl MemorySource {
    pub fn new<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Arc<Self> {
        Arc::new(Self::with_files(files))
    }

    /// Like [`MemorySource::new`], but every read takes `delay`.
    pub fn slow<'a>(
        delay: Duration,
        files: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::with_files(files)
        })
    }

    fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            files: Mutex::new(
                files
                    .into_iter()
                    .map(|(path, source)| (PathBuf::from(path), source.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn set(&self, path: &str, source: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), source.to_string());
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DefinitionSource for MemorySource {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such definition"))
    }
}

pub fn memory_cache(source: Arc<MemorySource>) -> ProxyCache {
    ProxyCache::new(source, Arc::new(FuturesStreams), Arc::new(NoTiming))
}

/// A connection whose outbound messages land in a channel the test reads from.
pub struct Harness {
    pub context: Arc<ConnectionContext>,
    pub outbound: Receiver<Outbound>,
}

impl Harness {
    pub fn new() -> Self {
        let (transport, outbound) = ChannelTransport::new();
        Self {
            context: ConnectionContext::new(Arc::new(transport)),
            outbound,
        }
    }

    /// The next outbound call, which must already have been sent.
    pub fn next_call(&self) -> (CallId, ReturnKind, CallTarget, JsonValue) {
        match self.outbound.try_recv() {
            Ok(Outbound::Call {
                id,
                kind,
                target,
                args,
            }) => (id, kind, target, args),
            other => panic!("expected an outbound call, got {other:?}"),
        }
    }

    pub fn nothing_sent(&self) -> bool {
        self.outbound.is_empty()
    }
}

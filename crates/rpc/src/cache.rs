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

//! Process-wide memo of proxy factories, one per absolute definition path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::OnceCell;
use skein_common::RpcConfig;
use skein_compiler::{generate, parse_definition};
use tracing::debug;

use crate::errors::{AcquireError, PathError};
use crate::proxy::{Hooks, Inject, ProxyFactory};
use crate::stream::{FuturesStreams, StreamProvider};
use crate::timing::{TimingHook, TracingTiming};

/// Where definition text comes from.
pub trait DefinitionSource: Send + Sync {
    fn read(&self, path: &Path) -> std::io::Result<String>;
}

/// Reads definitions from the filesystem.
pub struct FsSource;

impl DefinitionSource for FsSource {
    fn read(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Grow-only: a published factory stays for the life of the cache. Concurrent first
/// acquisitions of one path share a single build.
pub struct ProxyCache {
    entries: papaya::HashMap<PathBuf, Arc<OnceCell<Arc<ProxyFactory>>>>,
    source: Arc<dyn DefinitionSource>,
    hooks: Hooks,
    preserve_function_names: bool,
    builds: AtomicUsize,
}

impl Default for ProxyCache {
    fn default() -> Self {
        Self::new(
            Arc::new(FsSource),
            Arc::new(FuturesStreams),
            Arc::new(TracingTiming::default()),
        )
    }
}

impl ProxyCache {
    pub fn new(
        source: Arc<dyn DefinitionSource>,
        streams: Arc<dyn StreamProvider>,
        timing: Arc<dyn TimingHook>,
    ) -> Self {
        Self {
            entries: papaya::HashMap::new(),
            source,
            hooks: Hooks { streams, timing },
            preserve_function_names: RpcConfig::default().preserve_function_names,
            builds: AtomicUsize::new(0),
        }
    }

    /// A filesystem-backed cache using the configured name mode and slow call threshold.
    pub fn from_config(config: &RpcConfig) -> Self {
        let mut cache = Self::new(
            Arc::new(FsSource),
            Arc::new(FuturesStreams),
            Arc::new(TracingTiming::from_config(config)),
        );
        cache.preserve_function_names = config.preserve_function_names;
        cache
    }

    /// The factory for the definition at `path`, parsing and generating it on first use.
    ///
    /// Once a path is cached, later calls get the same factory whatever `service_name` and
    /// `preserve_function_names` they pass.
    pub fn acquire(
        &self,
        service_name: &str,
        preserve_function_names: bool,
        path: impl AsRef<Path>,
    ) -> Result<Arc<ProxyFactory>, AcquireError> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(PathError(path.to_path_buf()).into());
        }

        let cell = self
            .entries
            .pin()
            .get_or_insert_with(path.to_path_buf(), || Arc::new(OnceCell::new()))
            .clone();
        let built = cell.get_or_try_init(|| self.build(service_name, preserve_function_names, path));
        match built {
            Ok(factory) => {
                debug!(path = %path.display(), service = factory.service_name(), "proxy factory ready");
                Ok(factory.clone())
            }
            Err(e) => {
                // Leave no trace of the failed build, so the next acquisition retries.
                let entries = self.entries.pin();
                if let Some(current) = entries.get(path)
                    && Arc::ptr_eq(current, &cell)
                    && current.get().is_none()
                {
                    entries.remove(path);
                }
                Err(e)
            }
        }
    }

    /// [`ProxyCache::acquire`] with the cache's configured name mode.
    pub fn acquire_default(
        &self,
        service_name: &str,
        path: impl AsRef<Path>,
    ) -> Result<Arc<ProxyFactory>, AcquireError> {
        self.acquire(service_name, self.preserve_function_names, path)
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries
            .pin()
            .get(path.as_ref())
            .is_some_and(|cell| cell.get().is_some())
    }

    pub fn len(&self) -> usize {
        self.entries
            .pin()
            .iter()
            .filter(|(_, cell)| cell.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .entries
            .pin()
            .iter()
            .filter(|(_, cell)| cell.get().is_some())
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// How many times a definition has been parsed and generated.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn build(
        &self,
        service_name: &str,
        preserve_function_names: bool,
        path: &Path,
    ) -> Result<Arc<ProxyFactory>, AcquireError> {
        let source = self.source.read(path).map_err(|source| AcquireError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        let definition = parse_definition(&path.to_string_lossy(), &source)?;
        let unit = generate(service_name, preserve_function_names, &definition)?;
        debug!(
            path = %path.display(),
            service = service_name,
            functions = unit.functions.len(),
            interfaces = unit.interfaces.len(),
            "built proxy factory"
        );
        Ok(Arc::new(
            unit.inject(self.hooks.streams.clone(), self.hooks.timing.clone()),
        ))
    }
}

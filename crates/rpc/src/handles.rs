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

//! Which handle ids are live on a connection, and which have been released.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::errors::HandleError;
use crate::messages::HandleId;
use crate::remote::RemoteObject;

/// Holds shells weakly, for lookup only: dropping every local reference to a shell doesn't
/// release its handle, and nothing here ever disposes one implicitly.
#[derive(Default)]
pub(crate) struct HandleRegistry {
    live: papaya::HashMap<HandleId, Weak<RemoteObject>>,
    released: papaya::HashMap<HandleId, ()>,
    /// Serialises creation and release so an id maps to exactly one shell and is released once.
    allocation_lock: Mutex<()>,
}

impl HandleRegistry {
    /// The shell registered under `handle`, or a new one from `create`.
    pub fn get_or_create<E: From<HandleError>>(
        &self,
        handle: HandleId,
        create: impl FnOnce() -> Result<Arc<RemoteObject>, E>,
    ) -> Result<Arc<RemoteObject>, E> {
        if let Some(object) = self.lookup(handle)? {
            return Ok(object);
        }
        let _lock = self.lock();
        if let Some(object) = self.lookup(handle)? {
            return Ok(object);
        }
        let object = create()?;
        self.live.pin().insert(handle, Arc::downgrade(&object));
        Ok(object)
    }

    /// Register a shell whose id was just assigned by the remote side.
    pub fn bind(&self, handle: HandleId, object: &Arc<RemoteObject>) -> Result<(), HandleError> {
        let _lock = self.lock();
        if self.lookup(handle)?.is_some() {
            return Err(HandleError::AlreadyBound(handle));
        }
        self.live.pin().insert(handle, Arc::downgrade(object));
        Ok(())
    }

    pub fn release(&self, handle: HandleId) -> Result<(), HandleError> {
        let _lock = self.lock();
        if self.released.pin().contains_key(&handle) {
            return Err(HandleError::Released(handle));
        }
        if self.live.pin().remove(&handle).is_none() {
            return Err(HandleError::Unknown(handle));
        }
        self.released.pin().insert(handle, ());
        Ok(())
    }

    /// Release everything, returning the shells still alive.
    pub fn drain(&self) -> Vec<Arc<RemoteObject>> {
        let _lock = self.lock();
        let live = self.live.pin();
        let released = self.released.pin();
        let handles: Vec<HandleId> = live.iter().map(|(handle, _)| *handle).collect();
        let mut objects = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Some(object) = live.remove(&handle).and_then(Weak::upgrade) {
                objects.push(object);
            }
            released.insert(handle, ());
        }
        objects
    }

    /// Registered handles whose shell is still referenced locally.
    pub fn len(&self) -> usize {
        self.live
            .pin()
            .iter()
            .filter(|(_, shell)| shell.strong_count() > 0)
            .count()
    }

    fn lookup(&self, handle: HandleId) -> Result<Option<Arc<RemoteObject>>, HandleError> {
        if self.released.pin().contains_key(&handle) {
            return Err(HandleError::Released(handle));
        }
        Ok(self.live.pin().get(&handle).and_then(Weak::upgrade))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.allocation_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

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

//! Local shells standing in for objects that live on the remote side.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use once_cell::sync::OnceCell;

use crate::context::RpcContext;
use crate::errors::{HandleError, RpcError};
use crate::messages::HandleId;
use crate::proxy::{BoundInterface, CallResult, invoke, rejected};
use crate::value::Value;

/// A proxy for one remote object. Holds its context strongly; the context's registry only
/// refers back to it weakly.
pub struct RemoteObject {
    interface: Arc<BoundInterface>,
    context: Arc<dyn RpcContext>,
    handle: OnceCell<HandleId>,
    disposed: AtomicBool,
}

impl RemoteObject {
    /// A shell waiting for the handle id its constructor call will assign.
    pub(crate) fn unbound(interface: Arc<BoundInterface>, context: Arc<dyn RpcContext>) -> Self {
        Self {
            interface,
            context,
            handle: OnceCell::new(),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn bound(
        interface: Arc<BoundInterface>,
        context: Arc<dyn RpcContext>,
        handle: HandleId,
    ) -> Self {
        Self {
            interface,
            context,
            handle: OnceCell::with_value(handle),
            disposed: AtomicBool::new(false),
        }
    }

    pub(crate) fn bind(&self, handle: HandleId) -> Result<(), HandleError> {
        self.handle
            .set(handle)
            .map_err(|_| HandleError::AlreadyBound(handle))
    }

    /// Returns whether the object was already disposed.
    pub(crate) fn mark_disposed(&self) -> bool {
        self.disposed.swap(true, Ordering::SeqCst)
    }

    pub fn interface_name(&self) -> &str {
        &self.interface.plan().name
    }

    /// Whether this object may be passed where `interface` is declared.
    pub fn conforms_to(&self, interface: &str) -> bool {
        self.interface.plan().conforms_to(interface)
    }

    pub fn handle(&self) -> Result<HandleId, HandleError> {
        self.handle.get().copied().ok_or(HandleError::Unbound)
    }

    /// The handle, provided the object is bound and not yet disposed.
    pub fn live_handle(&self) -> Result<HandleId, HandleError> {
        let handle = self.handle()?;
        if self.is_disposed() {
            return Err(HandleError::Released(handle));
        }
        Ok(handle)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> &Arc<dyn RpcContext> {
        &self.context
    }

    pub fn call(&self, method: &str, args: &[Value]) -> Result<CallResult, RpcError> {
        let plan = self.interface.plan().method(method).ok_or_else(|| {
            RpcError::NoSuchCall(format!("{}.{method}", self.interface_name()))
        })?;
        let hooks = self.interface.hooks();
        match self.live_handle() {
            Ok(handle) => invoke(&self.context, hooks, plan, Some(handle), args),
            Err(e) => rejected(hooks, plan, e.into()),
        }
    }

    /// Release the handle and dispose of the remote object. A second disposal fails.
    pub fn dispose(&self) -> BoxFuture<'static, Result<(), RpcError>> {
        self.context.dispose_remote_object(self)
    }
}

impl Debug for RemoteObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObject")
            .field("interface", &self.interface_name())
            .field("handle", &self.handle.get())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

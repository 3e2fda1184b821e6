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

//! [`RpcContext`] over a [`Transport`]: one per connection to a remote process.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, ready};

use flume::Receiver;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value as JsonValue;
use skein_compiler::{Parameter, ProxyUnit, ReturnKind, Type};
use tracing::{debug, error, info, trace, warn};

use crate::context::{CallOutcome, RpcContext};
use crate::correlation::{CallTable, Pending, StreamEvent};
use crate::errors::{HandleError, MarshalError, RpcError};
use crate::handles::HandleRegistry;
use crate::marshal::{HandleResolver, Marshaller};
use crate::messages::{CallId, CallTarget, HandleId, Inbound, Outbound};
use crate::proxy::Hooks;
use crate::remote::RemoteObject;
use crate::transport::Transport;
use crate::type_registry::TypeRegistry;
use crate::value::Value;

pub struct ConnectionContext {
    me: Weak<ConnectionContext>,
    transport: Arc<dyn Transport>,
    calls: CallTable,
    handles: HandleRegistry,
    types: TypeRegistry,
    closed: AtomicBool,
}

impl ConnectionContext {
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            transport,
            calls: CallTable::default(),
            handles: HandleRegistry::default(),
            types: TypeRegistry::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Feed a message received from the remote side.
    pub fn dispatch(&self, message: Inbound) {
        if self.is_closed() {
            trace!(id = message.id(), "dropping message for closed connection");
            return;
        }
        self.calls.deliver(message);
    }

    /// Tear the connection down: pending calls fail with [`RpcError::ConnectionClosed`],
    /// streams end with that error, and every handle is released without contacting the remote
    /// side. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending = self.calls.drain();
        let calls = pending.len();
        for call in pending {
            call.reject(RpcError::ConnectionClosed);
        }
        let objects = self.handles.drain();
        for object in &objects {
            object.mark_disposed();
        }
        info!(calls, handles = objects.len(), "connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn outstanding_calls(&self) -> usize {
        self.calls.len()
    }

    /// Handles whose local shell is still referenced.
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    fn marshaller(&self) -> Marshaller<'_> {
        Marshaller::new(&self.types, self)
    }

    fn send(&self, message: Outbound) -> Result<(), RpcError> {
        if self.is_closed() {
            return Err(RpcError::ConnectionClosed);
        }
        self.transport.send(message).inspect_err(|e| {
            error!(error = %e, "unable to send outbound message");
        })
    }

    fn call(&self, target: CallTarget, kind: ReturnKind, args: JsonValue) -> CallOutcome {
        match kind {
            ReturnKind::Sync => {
                let id = self.calls.next_id();
                debug!(id, ?target, "sync call");
                CallOutcome::Sync(self.send(Outbound::Call {
                    id,
                    kind,
                    target,
                    args,
                }))
            }
            ReturnKind::Promise => CallOutcome::Promise(self.promise(target, args)),
            ReturnKind::Stream => match self.me.upgrade() {
                Some(context) => CallOutcome::Stream(
                    CallStream {
                        context,
                        request: Some((target, args)),
                        events: None,
                        id: None,
                        finished: false,
                    }
                    .boxed(),
                ),
                None => CallOutcome::Stream(
                    stream::once(future::ready(Err(RpcError::ConnectionClosed))).boxed(),
                ),
            },
        }
    }

    /// Send now, settle later.
    fn promise(&self, target: CallTarget, args: JsonValue) -> BoxFuture<'static, Result<JsonValue, RpcError>> {
        let id = self.calls.next_id();
        let (reply, settled) = flume::bounded(1);
        self.calls.insert(id, Pending::Promise(reply));
        debug!(id, ?target, "promise call");
        let sent = self.send(Outbound::Call {
            id,
            kind: ReturnKind::Promise,
            target,
            args,
        });
        if let Err(e) = sent {
            self.calls.remove(id);
            return future::ready(Err(e)).boxed();
        }
        async move {
            settled
                .recv_async()
                .await
                .unwrap_or(Err(RpcError::ConnectionClosed))
        }
        .boxed()
    }

    fn open_stream(
        &self,
        target: CallTarget,
        args: JsonValue,
    ) -> Result<(CallId, Receiver<StreamEvent>), RpcError> {
        let id = self.calls.next_id();
        let (events, receiver) = flume::unbounded();
        self.calls.insert(id, Pending::Stream(events));
        debug!(id, ?target, "stream subscribed");
        let sent = self.send(Outbound::Call {
            id,
            kind: ReturnKind::Stream,
            target,
            args,
        });
        if let Err(e) = sent {
            self.calls.remove(id);
            return Err(e);
        }
        Ok((id, receiver))
    }

    /// Dispose of a freshly created remote object that can't be given a local shell. The request
    /// is fire-and-forget; the caller already has its error.
    fn abandon(&self, handle: HandleId, reason: &HandleError) {
        warn!(handle, error = %reason, "constructor reply unusable; disposing the new object");
        let _ = self.send(Outbound::Call {
            id: self.calls.next_id(),
            kind: ReturnKind::Sync,
            target: CallTarget::Dispose { object: handle },
            args: JsonValue::Null,
        });
    }

    fn cancel(&self, id: CallId) {
        if self.calls.remove(id).is_none() {
            return;
        }
        debug!(id, "stream unsubscribed; cancelling");
        if self.is_closed() {
            return;
        }
        let _ = self.send(Outbound::Cancel { id });
    }
}

impl RpcContext for ConnectionContext {
    fn call_remote_function(&self, name: &str, kind: ReturnKind, args: JsonValue) -> CallOutcome {
        self.call(
            CallTarget::Function {
                name: name.to_string(),
            },
            kind,
            args,
        )
    }

    fn call_remote_method(
        &self,
        object: HandleId,
        name: &str,
        kind: ReturnKind,
        args: JsonValue,
    ) -> CallOutcome {
        self.call(
            CallTarget::Method {
                object,
                name: name.to_string(),
            },
            kind,
            args,
        )
    }

    fn create_remote_object(
        &self,
        constructor: &str,
        shell: Arc<RemoteObject>,
        args: &[Value],
        params: &[Parameter],
    ) -> BoxFuture<'static, Result<HandleId, RpcError>> {
        let args = match self.marshal_arguments(args, params) {
            Ok(args) => args,
            Err(e) => return future::ready(Err(e.into())).boxed(),
        };
        let reply = self.promise(
            CallTarget::NewObject {
                interface: constructor.to_string(),
            },
            args,
        );
        let me = self.me.clone();
        async move {
            let wire = reply.await?;
            let handle = wire.as_u64().ok_or_else(|| MarshalError::TypeMismatch {
                expected: "handle id".to_string(),
                found: "non-integer",
            })?;
            let Some(context) = me.upgrade().filter(|c| !c.is_closed()) else {
                return Err(RpcError::ConnectionClosed);
            };
            if let Err(e) = context.handles.bind(handle, &shell) {
                context.abandon(handle, &e);
                return Err(e.into());
            }
            shell.bind(handle)?;
            debug!(handle, interface = shell.interface_name(), "remote object created");
            Ok(handle)
        }
        .boxed()
    }

    fn dispose_remote_object(&self, object: &RemoteObject) -> BoxFuture<'static, Result<(), RpcError>> {
        let handle = match object.handle() {
            Ok(handle) => handle,
            Err(e) => return future::ready(Err(e.into())).boxed(),
        };
        if object.is_disposed() {
            return future::ready(Err(HandleError::Released(handle).into())).boxed();
        }
        if let Err(e) = self.handles.release(handle) {
            return future::ready(Err(e.into())).boxed();
        }
        object.mark_disposed();
        debug!(handle, interface = object.interface_name(), "disposing remote object");
        self.promise(CallTarget::Dispose { object: handle }, JsonValue::Null)
            .map(|reply| reply.map(|_| ()))
            .boxed()
    }

    fn register_unit(&self, unit: &ProxyUnit, hooks: &Hooks) -> Result<(), RpcError> {
        Ok(self.types.register(unit, hooks)?)
    }

    fn marshal(&self, value: &Value, ty: &Type) -> Result<JsonValue, MarshalError> {
        self.marshaller().marshal(value, ty)
    }

    fn unmarshal(&self, wire: &JsonValue, ty: &Type) -> Result<Value, MarshalError> {
        self.marshaller().unmarshal(wire, ty)
    }

    fn marshal_arguments(
        &self,
        args: &[Value],
        params: &[Parameter],
    ) -> Result<JsonValue, MarshalError> {
        self.marshaller().marshal_arguments(args, params)
    }

    fn unmarshal_arguments(
        &self,
        wire: &JsonValue,
        params: &[Parameter],
    ) -> Result<Vec<Value>, MarshalError> {
        self.marshaller().unmarshal_arguments(wire, params)
    }
}

impl HandleResolver for ConnectionContext {
    fn handle_for(&self, object: &Arc<RemoteObject>) -> Result<HandleId, MarshalError> {
        let handle = object.live_handle()?;
        if !std::ptr::addr_eq(Arc::as_ptr(object.context()), self as *const Self) {
            return Err(MarshalError::ForeignHandle(handle));
        }
        Ok(handle)
    }

    fn object_for(
        &self,
        handle: HandleId,
        interface: &str,
    ) -> Result<Arc<RemoteObject>, MarshalError> {
        self.handles.get_or_create(handle, || {
            let bound = self
                .types
                .interface(interface)
                .ok_or_else(|| MarshalError::UnknownInterface(interface.to_string()))?;
            let context: Arc<dyn RpcContext> = self.me.upgrade().ok_or(MarshalError::Detached)?;
            Ok(Arc::new(RemoteObject::bound(bound, context, handle)))
        })
    }
}

/// A stream call: sends its request on first poll, and cancels on drop if the remote side
/// hasn't finished.
struct CallStream {
    context: Arc<ConnectionContext>,
    request: Option<(CallTarget, JsonValue)>,
    events: Option<BoxStream<'static, StreamEvent>>,
    id: Option<CallId>,
    finished: bool,
}

impl Stream for CallStream {
    type Item = Result<JsonValue, RpcError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }
        if let Some((target, args)) = this.request.take() {
            match this.context.open_stream(target, args) {
                Ok((id, receiver)) => {
                    this.id = Some(id);
                    this.events = Some(receiver.into_stream().boxed());
                }
                Err(e) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
        let Some(events) = this.events.as_mut() else {
            this.finished = true;
            return Poll::Ready(None);
        };
        match ready!(events.poll_next_unpin(cx)) {
            Some(StreamEvent::Next(value)) => Poll::Ready(Some(Ok(value))),
            Some(StreamEvent::Error(e)) => {
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Some(StreamEvent::Complete) | None => {
                this.finished = true;
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for CallStream {
    fn drop(&mut self) {
        if let (false, Some(id)) = (self.finished, self.id) {
            self.context.cancel(id);
        }
    }
}

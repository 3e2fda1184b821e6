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

//! The fixed dispatcher that interprets a [`ProxyUnit`]'s call plans, and the factories and
//! proxies built from it.

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use skein_compiler::{CallPlan, InterfacePlan, ProxyUnit, ReturnKind};
use tracing::{debug, warn};

use crate::context::{CallOutcome, RpcContext};
use crate::errors::RpcError;
use crate::messages::HandleId;
use crate::remote::RemoteObject;
use crate::stream::{FuturesStreams, RemoteStream, StreamProvider};
use crate::timing::{TimingHook, TracingTiming};
use crate::value::Value;

/// The runtime dependencies injected into a generated unit.
#[derive(Clone)]
pub struct Hooks {
    pub streams: Arc<dyn StreamProvider>,
    pub timing: Arc<dyn TimingHook>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            streams: Arc::new(FuturesStreams),
            timing: Arc::new(TracingTiming::default()),
        }
    }
}

/// An interface plan together with the hooks of the unit that declared it.
pub struct BoundInterface {
    plan: Arc<InterfacePlan>,
    hooks: Hooks,
}

impl BoundInterface {
    pub(crate) fn new(plan: Arc<InterfacePlan>, hooks: Hooks) -> Self {
        Self { plan, hooks }
    }

    pub fn plan(&self) -> &InterfacePlan {
        &self.plan
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }
}

/// The local result of a proxy call, shaped by the call's [`ReturnKind`].
pub enum CallResult {
    /// The call was sent; there is no reply.
    Sync,
    /// Already sent; resolves to the unmarshalled reply.
    Promise(BoxFuture<'static, Result<Value, RpcError>>),
    /// Nothing sent yet; each subscription is its own remote invocation.
    Stream(RemoteStream),
}

impl CallResult {
    pub fn kind(&self) -> ReturnKind {
        match self {
            CallResult::Sync => ReturnKind::Sync,
            CallResult::Promise(_) => ReturnKind::Promise,
            CallResult::Stream(_) => ReturnKind::Stream,
        }
    }

    /// Await the reply of a promise-shaped call.
    pub async fn value(self) -> Result<Value, RpcError> {
        match self {
            CallResult::Promise(reply) => reply.await,
            other => Err(RpcError::WrongReturnKind {
                expected: ReturnKind::Promise,
                found: other.kind(),
            }),
        }
    }

    pub fn into_stream(self) -> Result<RemoteStream, RpcError> {
        match self {
            CallResult::Stream(stream) => Ok(stream),
            other => Err(RpcError::WrongReturnKind {
                expected: ReturnKind::Stream,
                found: other.kind(),
            }),
        }
    }
}

/// Run one call plan: marshal the arguments, issue the call, and shape the result.
pub(crate) fn invoke(
    context: &Arc<dyn RpcContext>,
    hooks: &Hooks,
    plan: &CallPlan,
    object: Option<HandleId>,
    args: &[Value],
) -> Result<CallResult, RpcError> {
    let wire_args = match context.marshal_arguments(args, &plan.params) {
        Ok(wire_args) => wire_args,
        Err(e) => return rejected(hooks, plan, e.into()),
    };
    debug!(
        call = %plan.name,
        wire_name = %plan.wire_name,
        kind = %plan.return_kind,
        ?object,
        "dispatching"
    );

    if plan.return_kind == ReturnKind::Stream {
        return Ok(CallResult::Stream(RemoteStream::new(
            context.clone(),
            hooks.streams.clone(),
            plan.wire_name.clone(),
            object,
            wire_args,
            plan.result.clone(),
        )));
    }

    let outcome = match object {
        Some(handle) => {
            context.call_remote_method(handle, &plan.wire_name, plan.return_kind, wire_args)
        }
        None => context.call_remote_function(&plan.wire_name, plan.return_kind, wire_args),
    };
    match outcome {
        CallOutcome::Sync(sent) => sent.map(|_| CallResult::Sync),
        CallOutcome::Promise(reply) => {
            let context = context.clone();
            let result_ty = plan.result.clone();
            let reply = async move {
                let wire = reply.await?;
                Ok(context.unmarshal(&wire, &result_ty)?)
            }
            .boxed();
            Ok(CallResult::Promise(hooks.timing.track(&plan.name, reply)))
        }
        other => Err(RpcError::WrongReturnKind {
            expected: plan.return_kind,
            found: other.kind(),
        }),
    }
}

/// A call that failed before anything was sent. The error reaches the caller the same way a
/// remote failure would: through the promise or the stream. Sync calls have no such channel.
pub(crate) fn rejected(
    hooks: &Hooks,
    plan: &CallPlan,
    error: RpcError,
) -> Result<CallResult, RpcError> {
    debug!(call = %plan.name, error = %error, "call rejected before sending");
    match plan.return_kind {
        ReturnKind::Sync => Err(error),
        ReturnKind::Promise => Ok(CallResult::Promise(
            hooks
                .timing
                .track(&plan.name, future::ready(Err(error)).boxed()),
        )),
        ReturnKind::Stream => Ok(CallResult::Stream(RemoteStream::failed(
            hooks.streams.clone(),
            error,
        ))),
    }
}

/// A generated unit that has been given its runtime dependencies. Immutable; shared by every
/// proxy created from it.
pub struct ProxyFactory {
    unit: Arc<ProxyUnit>,
    hooks: Hooks,
}

impl ProxyFactory {
    pub fn service_name(&self) -> &str {
        &self.unit.service_name
    }

    pub fn unit(&self) -> &ProxyUnit {
        &self.unit
    }

    /// A proxy whose calls go through `context`.
    pub fn create(&self, context: Arc<dyn RpcContext>) -> Result<ServiceProxy, RpcError> {
        context.register_unit(&self.unit, &self.hooks)?;
        Ok(ServiceProxy {
            unit: self.unit.clone(),
            hooks: self.hooks.clone(),
            context,
        })
    }
}

impl Debug for ProxyFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyFactory")
            .field("service", &self.unit.service_name)
            .field("functions", &self.unit.functions.len())
            .field("interfaces", &self.unit.interfaces.len())
            .finish()
    }
}

/// Injection step for a generated unit.
pub trait Inject {
    fn inject(self, streams: Arc<dyn StreamProvider>, timing: Arc<dyn TimingHook>) -> ProxyFactory;
}

impl Inject for ProxyUnit {
    fn inject(self, streams: Arc<dyn StreamProvider>, timing: Arc<dyn TimingHook>) -> ProxyFactory {
        ProxyFactory {
            unit: Arc::new(self),
            hooks: Hooks { streams, timing },
        }
    }
}

/// Forwards calls to a remote service's exported functions, and constructs instances of its
/// interfaces.
pub struct ServiceProxy {
    unit: Arc<ProxyUnit>,
    hooks: Hooks,
    context: Arc<dyn RpcContext>,
}

impl ServiceProxy {
    pub fn service_name(&self) -> &str {
        &self.unit.service_name
    }

    pub fn context(&self) -> &Arc<dyn RpcContext> {
        &self.context
    }

    pub fn call(&self, function: &str, args: &[Value]) -> Result<CallResult, RpcError> {
        let plan = self
            .unit
            .function(function)
            .ok_or_else(|| RpcError::NoSuchCall(function.to_string()))?;
        invoke(&self.context, &self.hooks, plan, None, args)
    }

    /// Create a new remote instance of `interface` through its constructor.
    pub fn construct(
        &self,
        interface: &str,
        args: &[Value],
    ) -> BoxFuture<'static, Result<Arc<RemoteObject>, RpcError>> {
        let Some(plan) = self.unit.interface(interface) else {
            return future::ready(Err(RpcError::NoSuchCall(format!("new {interface}"))))
                .boxed();
        };
        let Some(constructor) = &plan.constructor else {
            return future::ready(Err(RpcError::NoSuchCall(format!("new {interface}"))))
                .boxed();
        };

        let bound = Arc::new(BoundInterface::new(plan.clone(), self.hooks.clone()));
        let shell = Arc::new(RemoteObject::unbound(bound, self.context.clone()));
        let created = self.context.create_remote_object(
            &constructor.wire_name,
            shell.clone(),
            args,
            &constructor.params,
        );
        async move {
            created.await?;
            Ok(shell)
        }
        .boxed()
    }
}

/// Run `body` with `object`, then dispose of it whatever the outcome. The body's error wins
/// over a disposal error.
pub async fn with_remote_object<T, F, Fut>(object: Arc<RemoteObject>, body: F) -> Result<T, RpcError>
where
    F: FnOnce(Arc<RemoteObject>) -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let result = body(object.clone()).await;
    let disposed = object.dispose().await;
    match (result, disposed) {
        (Err(e), Err(dispose_error)) => {
            warn!(error = %dispose_error, "disposal failed after scoped use");
            Err(e)
        }
        (result, disposed) => {
            disposed?;
            result
        }
    }
}

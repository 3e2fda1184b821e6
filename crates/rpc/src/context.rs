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

//! The per-connection surface that generated proxies call through.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::Value as JsonValue;
use skein_compiler::{Parameter, ProxyUnit, ReturnKind, Type};

use crate::errors::{MarshalError, RpcError};
use crate::messages::HandleId;
use crate::proxy::Hooks;
use crate::remote::RemoteObject;
use crate::value::Value;

/// The raw, still marshalled, result of a remote call. Its shape follows the call's
/// [`ReturnKind`].
pub enum CallOutcome {
    /// Fire-and-forget; only a failure to send is reported.
    Sync(Result<(), RpcError>),
    /// Already sent; resolves when the reply arrives. Dropping it does not withdraw the call.
    Promise(BoxFuture<'static, Result<JsonValue, RpcError>>),
    /// Cold: nothing is sent until the stream is first polled. Dropping it before completion
    /// cancels the remote side.
    Stream(BoxStream<'static, Result<JsonValue, RpcError>>),
}

impl CallOutcome {
    pub fn kind(&self) -> ReturnKind {
        match self {
            CallOutcome::Sync(_) => ReturnKind::Sync,
            CallOutcome::Promise(_) => ReturnKind::Promise,
            CallOutcome::Stream(_) => ReturnKind::Stream,
        }
    }
}

pub trait RpcContext: Send + Sync {
    fn call_remote_function(&self, name: &str, kind: ReturnKind, args: JsonValue) -> CallOutcome;

    fn call_remote_method(
        &self,
        object: HandleId,
        name: &str,
        kind: ReturnKind,
        args: JsonValue,
    ) -> CallOutcome;

    /// Construct an object on the remote side through an interface constructor, then bind
    /// `shell` to the handle id it is given.
    fn create_remote_object(
        &self,
        constructor: &str,
        shell: Arc<RemoteObject>,
        args: &[Value],
        params: &[Parameter],
    ) -> BoxFuture<'static, Result<HandleId, RpcError>>;

    /// Release `object`'s handle and tell the remote side. Misuse (unbound, unknown or already
    /// released handles) is reported through the returned future.
    fn dispose_remote_object(&self, object: &RemoteObject) -> BoxFuture<'static, Result<(), RpcError>>;

    /// Make a unit's named types and interfaces known, so their values can be marshalled and
    /// their instances dispatched.
    fn register_unit(&self, unit: &ProxyUnit, hooks: &Hooks) -> Result<(), RpcError>;

    fn marshal(&self, value: &Value, ty: &Type) -> Result<JsonValue, MarshalError>;

    fn unmarshal(&self, wire: &JsonValue, ty: &Type) -> Result<Value, MarshalError>;

    fn marshal_arguments(
        &self,
        args: &[Value],
        params: &[Parameter],
    ) -> Result<JsonValue, MarshalError>;

    fn unmarshal_arguments(
        &self,
        wire: &JsonValue,
        params: &[Parameter],
    ) -> Result<Vec<Value>, MarshalError>;
}

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

//! Runtime half of the skein RPC layer: marshalling of typed values, call correlation and remote
//! handle bookkeeping per connection, the dispatcher that executes generated proxy units, and the
//! cache that builds those units from definition files.

mod cache;
mod connection;
mod context;
mod correlation;
mod errors;
mod handles;
mod marshal;
mod messages;
mod proxy;
mod remote;
mod stream;
mod timing;
mod transport;
mod type_registry;
mod value;

pub use crate::cache::{DefinitionSource, FsSource, ProxyCache};
pub use crate::connection::ConnectionContext;
pub use crate::context::{CallOutcome, RpcContext};
pub use crate::errors::{AcquireError, HandleError, MarshalError, PathError, RpcError};
pub use crate::marshal::{HandleResolver, Marshaller};
pub use crate::messages::{CallId, CallTarget, HandleId, Inbound, Outbound};
pub use crate::proxy::{
    BoundInterface, CallResult, Hooks, Inject, ProxyFactory, ServiceProxy, with_remote_object,
};
pub use crate::remote::RemoteObject;
pub use crate::stream::{FuturesStreams, RemoteStream, StreamProvider, Subscription};
pub use crate::timing::{NoTiming, TimingHook, TracingTiming};
pub use crate::transport::{ChannelTransport, Transport};
pub use crate::type_registry::TypeRegistry;
pub use crate::value::Value;

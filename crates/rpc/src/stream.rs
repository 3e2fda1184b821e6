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

//! Cold streams for stream-shaped calls, and the stream implementation injected into units.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::Value as JsonValue;
use skein_compiler::{ReturnKind, Type};

use crate::context::{CallOutcome, RpcContext};
use crate::errors::RpcError;
use crate::messages::HandleId;
use crate::value::Value;

/// Adapts each subscription's stream before it reaches the caller, e.g. to share, buffer or
/// instrument it.
pub trait StreamProvider: Send + Sync {
    fn adapt(
        &self,
        stream: BoxStream<'static, Result<Value, RpcError>>,
    ) -> BoxStream<'static, Result<Value, RpcError>>;
}

/// Plain `futures` streams, passed through untouched.
pub struct FuturesStreams;

impl StreamProvider for FuturesStreams {
    fn adapt(
        &self,
        stream: BoxStream<'static, Result<Value, RpcError>>,
    ) -> BoxStream<'static, Result<Value, RpcError>> {
        stream
    }
}

/// The result of a stream-shaped call. Nothing is sent until [`RemoteStream::subscribe`]d,
/// and every subscription is an independent remote invocation.
pub struct RemoteStream {
    streams: Arc<dyn StreamProvider>,
    request: Result<StreamRequest, RpcError>,
}

struct StreamRequest {
    context: Arc<dyn RpcContext>,
    wire_name: String,
    object: Option<HandleId>,
    args: JsonValue,
    result: Type,
}

impl RemoteStream {
    pub(crate) fn new(
        context: Arc<dyn RpcContext>,
        streams: Arc<dyn StreamProvider>,
        wire_name: String,
        object: Option<HandleId>,
        args: JsonValue,
        result: Type,
    ) -> Self {
        Self {
            streams,
            request: Ok(StreamRequest {
                context,
                wire_name,
                object,
                args,
                result,
            }),
        }
    }

    /// A stream call that failed before anything was sent. Every subscription yields `error`
    /// and ends.
    pub(crate) fn failed(streams: Arc<dyn StreamProvider>, error: RpcError) -> Self {
        Self {
            streams,
            request: Err(error),
        }
    }

    /// Start a new remote invocation. The request goes out when the subscription is first
    /// polled; dropping it before the remote side completes cancels the call.
    pub fn subscribe(&self) -> Subscription {
        let values = match &self.request {
            Ok(request) => request.open(),
            Err(e) => stream::once(future::ready(Err(e.clone()))).boxed(),
        };
        Subscription {
            inner: Some(self.streams.adapt(values)),
        }
    }
}

impl StreamRequest {
    fn open(&self) -> BoxStream<'static, Result<Value, RpcError>> {
        let outcome = match self.object {
            Some(handle) => self.context.call_remote_method(
                handle,
                &self.wire_name,
                ReturnKind::Stream,
                self.args.clone(),
            ),
            None => self.context.call_remote_function(
                &self.wire_name,
                ReturnKind::Stream,
                self.args.clone(),
            ),
        };
        let raw = match outcome {
            CallOutcome::Stream(raw) => raw,
            other => stream::once(future::ready(Err(RpcError::WrongReturnKind {
                expected: ReturnKind::Stream,
                found: other.kind(),
            })))
            .boxed(),
        };

        let context = self.context.clone();
        let result = self.result.clone();
        raw.map(move |item| {
            let wire = item?;
            Ok(context.unmarshal(&wire, &result)?)
        })
        .boxed()
    }
}

/// One subscriber's view of a [`RemoteStream`]. Ends after the first error.
pub struct Subscription {
    inner: Option<BoxStream<'static, Result<Value, RpcError>>>,
}

impl Subscription {
    /// Stop receiving values, cancelling the remote side if it is still running.
    pub fn unsubscribe(mut self) {
        self.inner.take();
    }
}

impl Stream for Subscription {
    type Item = Result<Value, RpcError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        let item = inner.poll_next_unpin(cx);
        if matches!(item, Poll::Ready(Some(Err(_)) | None)) {
            // Dropping the inner stream cancels whatever is still running remotely.
            self.inner = None;
        }
        item
    }
}

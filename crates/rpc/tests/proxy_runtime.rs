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

mod common;

use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use skein_compiler::{ReturnKind, Type, obfuscate, qualified_function};
use skein_rpc::{
    CallTarget, HandleError, Inbound, MarshalError, Outbound, ProxyCache, RemoteObject,
    RpcContext, RpcError, ServiceProxy, Value, with_remote_object,
};

use common::{Harness, MemorySource, memory_cache};

const FOO: &str = "interface Foo { bar(x: number): Promise<string> }";

const FILES: &str = r#"
export type Entry = { path: string, size?: number };

interface Disposable {
    dispose(): Promise<void>;
}

interface Counter extends Disposable {
    constructor(start: number);
    increment(by?: number): Promise<number>;
}

interface Lock {
    release(): Promise<void>;
}

export function ping(): Promise<number>;
export function notify(message: string): void;
export function stat(path: string): Promise<Entry>;
export function open(name: string): Promise<Counter>;
export function watch(root: string): Observable<Entry>;
export function retire(object: Disposable): Promise<void>;
export function unlock(lock: Lock): Promise<void>;
"#;

fn proxy_for(harness: &Harness, cache: &ProxyCache, service: &str, path: &str) -> ServiceProxy {
    cache
        .acquire(service, true, path)
        .unwrap()
        .create(harness.context.clone())
        .unwrap()
}

fn files_proxy(harness: &Harness) -> ServiceProxy {
    let cache = memory_cache(MemorySource::new([("/svc/Files.def", FILES)]));
    proxy_for(harness, &cache, "FilesService", "/svc/Files.def")
}

fn respond(harness: &Harness, id: u64, result: serde_json::Value) {
    harness.context.dispatch(Inbound::Response { id, result });
}

fn counter(harness: &Harness, handle: u64) -> Arc<RemoteObject> {
    harness
        .context
        .unmarshal(&json!(handle), &Type::Interface("Counter".to_string()))
        .unwrap()
        .as_remote()
        .unwrap()
        .clone()
}

#[tokio::test]
async fn test_method_call_round_trip() {
    let harness = Harness::new();
    let cache = memory_cache(MemorySource::new([("/a/Foo.def", FOO)]));
    let _proxy = proxy_for(&harness, &cache, "FooService", "/a/Foo.def");

    let foo = harness
        .context
        .unmarshal(&json!(7), &Type::Interface("Foo".to_string()))
        .unwrap();
    let foo = foo.as_remote().unwrap().clone();
    assert_eq!(foo.interface_name(), "Foo");
    assert_eq!(foo.handle(), Ok(7));

    let reply = foo.call("bar", &[Value::from(5)]).unwrap();
    let (id, kind, target, args) = harness.next_call();
    assert_eq!(kind, ReturnKind::Promise);
    assert_eq!(
        target,
        CallTarget::Method {
            object: 7,
            name: "bar".to_string()
        }
    );
    assert_eq!(args, json!({"x": 5}));
    assert_eq!(harness.context.outstanding_calls(), 1);

    respond(&harness, id, json!("hi"));
    assert_eq!(reply.value().await, Ok(Value::from("hi")));
    assert_eq!(harness.context.outstanding_calls(), 0);
}

#[tokio::test]
async fn test_function_names_on_the_wire() {
    // Interfaces would conflict between the two name modes on one connection.
    let source = MemorySource::new([(
        "/svc/Ping.def",
        "export function ping(): Promise<number>;",
    )]);
    let preserved_cache = memory_cache(source.clone());
    let obfuscated_cache = memory_cache(source);

    let harness = Harness::new();
    let preserved = preserved_cache
        .acquire("PingService", true, "/svc/Ping.def")
        .unwrap()
        .create(harness.context.clone())
        .unwrap();
    let obfuscated = obfuscated_cache
        .acquire("PingService", false, "/svc/Ping.def")
        .unwrap()
        .create(harness.context.clone())
        .unwrap();

    let _ = preserved.call("ping", &[]).unwrap();
    let (_, _, target, args) = harness.next_call();
    assert_eq!(
        target,
        CallTarget::Function {
            name: qualified_function("PingService", "ping")
        }
    );
    assert_eq!(args, json!({}));

    let _ = obfuscated.call("ping", &[]).unwrap();
    let (_, _, target, _) = harness.next_call();
    assert_eq!(
        target,
        CallTarget::Function {
            name: obfuscate(&qualified_function("PingService", "ping"))
        }
    );
}

#[tokio::test]
async fn test_sync_call_is_fire_and_forget() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    let result = proxy.call("notify", &[Value::from("hello")]).unwrap();
    assert_eq!(result.kind(), ReturnKind::Sync);
    let (_, kind, _, args) = harness.next_call();
    assert_eq!(kind, ReturnKind::Sync);
    assert_eq!(args, json!({"message": "hello"}));
    assert_eq!(harness.context.outstanding_calls(), 0);

    assert_eq!(
        result.value().await,
        Err(RpcError::WrongReturnKind {
            expected: ReturnKind::Promise,
            found: ReturnKind::Sync
        })
    );
}

#[tokio::test]
async fn test_results_are_unmarshalled_by_declared_type() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    let reply = proxy.call("stat", &[Value::from("/tmp")]).unwrap();
    let (id, _, _, _) = harness.next_call();
    respond(&harness, id, json!({"path": "/tmp"}));
    let entry = reply.value().await.unwrap();
    assert_eq!(entry.get("path"), Some(&Value::from("/tmp")));
    assert_eq!(entry.get("size"), Some(&Value::Null));

    let reply = proxy.call("stat", &[Value::from("/tmp")]).unwrap();
    let (id, _, _, _) = harness.next_call();
    respond(&harness, id, json!({"size": 3}));
    assert!(matches!(
        reply.value().await,
        Err(RpcError::Marshal(MarshalError::MissingField(_)))
    ));
}

#[tokio::test]
async fn test_remote_errors_reject_only_their_call() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    let first = proxy.call("ping", &[]).unwrap();
    let (first_id, _, _, _) = harness.next_call();
    let second = proxy.call("ping", &[]).unwrap();
    let (second_id, _, _, _) = harness.next_call();
    assert_ne!(first_id, second_id);

    harness.context.dispatch(Inbound::Error {
        id: first_id,
        message: "boom".to_string(),
    });
    respond(&harness, second_id, json!(2));

    assert_eq!(first.value().await, Err(RpcError::Remote("boom".to_string())));
    assert_eq!(second.value().await, Ok(Value::Number(2.0)));
}

#[tokio::test]
async fn test_marshal_failure_sends_nothing() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    // Promise calls report the failure through their result.
    let mistyped = proxy.call("stat", &[Value::from(12)]).unwrap();
    let missing = proxy.call("stat", &[]).unwrap();
    assert!(matches!(
        mistyped.value().await,
        Err(RpcError::Marshal(MarshalError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        missing.value().await,
        Err(RpcError::Marshal(MarshalError::MissingArgument(_)))
    ));

    // Stream calls deliver it to each subscriber, then complete.
    let watch = proxy
        .call("watch", &[Value::from(3)])
        .unwrap()
        .into_stream()
        .unwrap();
    let mut subscription = watch.subscribe();
    assert!(matches!(
        subscription.next().await,
        Some(Err(RpcError::Marshal(MarshalError::TypeMismatch { .. })))
    ));
    assert_eq!(subscription.next().await, None);

    // Sync calls have nowhere else to put it.
    assert!(matches!(
        proxy.call("notify", &[Value::from(3)]),
        Err(RpcError::Marshal(MarshalError::TypeMismatch { .. }))
    ));

    assert!(harness.nothing_sent());
    assert_eq!(harness.context.outstanding_calls(), 0);

    // The proxy is still usable afterwards.
    let _ = proxy.call("stat", &[Value::from("/")]).unwrap();
    assert_eq!(harness.next_call().3, json!({"path": "/"}));
}

#[tokio::test]
async fn test_remote_arguments_must_match_the_declared_interface() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);
    let counter = counter(&harness, 5);

    let reply = proxy
        .call("unlock", &[Value::Remote(counter.clone())])
        .unwrap();
    assert_eq!(
        reply.value().await,
        Err(RpcError::Marshal(MarshalError::WrongInterface {
            expected: "Lock".to_string(),
            found: "Counter".to_string()
        }))
    );
    assert!(harness.nothing_sent());

    // A Counter is a Disposable.
    let reply = proxy.call("retire", &[Value::Remote(counter)]).unwrap();
    let (id, _, target, args) = harness.next_call();
    assert_eq!(
        target,
        CallTarget::Function {
            name: qualified_function("FilesService", "retire")
        }
    );
    assert_eq!(args, json!({"object": 5}));
    respond(&harness, id, json!(null));
    assert_eq!(reply.value().await, Ok(Value::Null));
}

#[tokio::test]
async fn test_remote_arguments_must_belong_to_the_connection() {
    let home = Harness::new();
    let away = Harness::new();
    let _home_proxy = files_proxy(&home);
    let away_proxy = files_proxy(&away);
    let counter = counter(&home, 7);

    let reply = away_proxy
        .call("retire", &[Value::Remote(counter.clone())])
        .unwrap();
    assert_eq!(
        reply.value().await,
        Err(RpcError::Marshal(MarshalError::ForeignHandle(7)))
    );
    assert!(away.nothing_sent());
    assert!(home.nothing_sent());
    assert_eq!(away.context.outstanding_calls(), 0);
    assert_eq!(
        away.context.marshal(
            &Value::Remote(counter),
            &Type::Interface("Counter".to_string())
        ),
        Err(MarshalError::ForeignHandle(7))
    );
}

#[tokio::test]
async fn test_unknown_calls() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    assert_eq!(
        proxy.call("frobnicate", &[]).err(),
        Some(RpcError::NoSuchCall("frobnicate".to_string()))
    );
    assert!(matches!(
        proxy.construct("Entry", &[]).await,
        Err(RpcError::NoSuchCall(_))
    ));

    let counter = counter(&harness, 3);
    assert_eq!(
        counter.call("reset", &[]).err(),
        Some(RpcError::NoSuchCall("Counter.reset".to_string()))
    );
    assert!(harness.nothing_sent());
}

#[tokio::test]
async fn test_same_handle_same_object() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    let first = proxy.call("open", &[Value::from("a")]).unwrap();
    let (id, _, _, _) = harness.next_call();
    respond(&harness, id, json!(9));
    let first = first.value().await.unwrap();

    let second = proxy.call("open", &[Value::from("a")]).unwrap();
    let (id, _, _, _) = harness.next_call();
    respond(&harness, id, json!(9));
    let second = second.value().await.unwrap();

    let (first, second) = (first.as_remote().unwrap(), second.as_remote().unwrap());
    assert!(Arc::ptr_eq(first, second));
    assert_eq!(first.interface_name(), "Counter");
    assert_eq!(harness.context.live_handles(), 1);

    // Passing the object back out sends its handle.
    let wire = harness
        .context
        .marshal(
            &Value::Remote(first.clone()),
            &Type::Interface("Counter".to_string()),
        )
        .unwrap();
    assert_eq!(wire, json!(9));
}

#[tokio::test]
async fn test_construct_and_dispose() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    let created = proxy.construct("Counter", &[Value::from(1)]);
    let (id, kind, target, args) = harness.next_call();
    assert_eq!(kind, ReturnKind::Promise);
    assert_eq!(
        target,
        CallTarget::NewObject {
            interface: "Counter".to_string()
        }
    );
    assert_eq!(args, json!({"start": 1}));
    respond(&harness, id, json!(42));
    let counter = created.await.unwrap();
    assert_eq!(counter.handle(), Ok(42));
    assert_eq!(harness.context.live_handles(), 1);

    let increment = counter.call("increment", &[]).unwrap();
    let (id, _, target, args) = harness.next_call();
    assert_eq!(
        target,
        CallTarget::Method {
            object: 42,
            name: "increment".to_string()
        }
    );
    assert_eq!(args, json!({}));
    respond(&harness, id, json!(2));
    assert_eq!(increment.value().await, Ok(Value::Number(2.0)));

    let disposal = counter.dispose();
    let (id, _, target, _) = harness.next_call();
    assert_eq!(target, CallTarget::Dispose { object: 42 });
    assert!(counter.is_disposed());
    assert_eq!(harness.context.live_handles(), 0);

    assert_eq!(
        counter.dispose().await,
        Err(RpcError::Handle(HandleError::Released(42)))
    );
    let late = counter.call("increment", &[]).unwrap();
    assert_eq!(
        late.value().await,
        Err(RpcError::Handle(HandleError::Released(42)))
    );
    assert!(harness.nothing_sent());

    respond(&harness, id, json!(null));
    assert_eq!(disposal.await, Ok(()));

    // A released handle is never resurrected.
    assert!(matches!(
        harness
            .context
            .unmarshal(&json!(42), &Type::Interface("Counter".to_string())),
        Err(MarshalError::Handle(HandleError::Released(42)))
    ));
}

#[tokio::test]
async fn test_constructed_object_reusing_a_live_handle_is_disposed() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);
    let existing = counter(&harness, 4);

    let created = proxy.construct("Counter", &[Value::from(0)]);
    let (id, _, _, _) = harness.next_call();
    respond(&harness, id, json!(4));
    assert!(matches!(
        created.await,
        Err(RpcError::Handle(HandleError::AlreadyBound(4)))
    ));

    let (_, kind, target, args) = harness.next_call();
    assert_eq!(kind, ReturnKind::Sync);
    assert_eq!(target, CallTarget::Dispose { object: 4 });
    assert_eq!(args, json!(null));
    assert!(harness.nothing_sent());

    // The shell already bound to the handle is left alone.
    assert!(!existing.is_disposed());
    assert_eq!(existing.handle(), Ok(4));
    assert_eq!(harness.context.live_handles(), 1);
}

#[tokio::test]
async fn test_live_handles_ignores_dropped_shells() {
    let harness = Harness::new();
    let _proxy = files_proxy(&harness);

    let first = counter(&harness, 8);
    assert_eq!(harness.context.live_handles(), 1);
    drop(first);
    assert_eq!(harness.context.live_handles(), 0);

    // The handle was never released, so it can be rebound.
    let second = counter(&harness, 8);
    assert_eq!(second.handle(), Ok(8));
    assert_eq!(harness.context.live_handles(), 1);
}

#[tokio::test]
async fn test_with_remote_object_disposes_afterwards() {
    let harness = Harness::new();
    let _proxy = files_proxy(&harness);

    let responder = {
        let context = harness.context.clone();
        let outbound = harness.outbound.clone();
        tokio::spawn(async move {
            while let Ok(message) = outbound.recv_async().await {
                if let Outbound::Call {
                    id,
                    target: CallTarget::Dispose { .. },
                    ..
                } = message
                {
                    context.dispatch(Inbound::Response {
                        id,
                        result: json!(null),
                    });
                }
            }
        })
    };

    let first = counter(&harness, 1);
    let handle = with_remote_object(first.clone(), |counter| async move {
        counter.handle().map_err(RpcError::from)
    })
        .await;
    assert_eq!(handle, Ok(1));
    assert!(first.is_disposed());

    let second = counter(&harness, 2);
    let failed: Result<(), RpcError> = with_remote_object(second.clone(), |_| async {
        Err(RpcError::Remote("body failed".to_string()))
    })
    .await;
    assert_eq!(failed, Err(RpcError::Remote("body failed".to_string())));
    assert!(second.is_disposed());
    assert_eq!(harness.context.live_handles(), 0);

    responder.abort();
}

#[tokio::test]
async fn test_streams_are_cold_and_independent() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    let watch = proxy
        .call("watch", &[Value::from("/")])
        .unwrap()
        .into_stream()
        .unwrap();
    let mut first = watch.subscribe();
    assert!(harness.nothing_sent());

    assert!(first.next().now_or_never().is_none());
    let (first_id, kind, target, args) = harness.next_call();
    assert_eq!(kind, ReturnKind::Stream);
    assert_eq!(
        target,
        CallTarget::Function {
            name: qualified_function("FilesService", "watch")
        }
    );
    assert_eq!(args, json!({"root": "/"}));

    let mut second = watch.subscribe();
    assert!(second.next().now_or_never().is_none());
    let (second_id, _, _, _) = harness.next_call();
    assert_ne!(first_id, second_id);
    assert_eq!(harness.context.outstanding_calls(), 2);

    harness.context.dispatch(Inbound::StreamNext {
        id: first_id,
        value: json!({"path": "/a"}),
    });
    harness
        .context
        .dispatch(Inbound::StreamComplete { id: first_id });

    let entry = first.next().await.unwrap().unwrap();
    assert_eq!(entry.get("path"), Some(&Value::from("/a")));
    assert!(first.next().await.is_none());
    assert_eq!(harness.context.outstanding_calls(), 1);

    // Dropping a live subscription cancels the remote side.
    drop(second);
    assert_eq!(
        harness.outbound.try_recv(),
        Ok(Outbound::Cancel { id: second_id })
    );
    assert_eq!(harness.context.outstanding_calls(), 0);

    // A finished subscription sends nothing when dropped.
    drop(first);
    assert!(harness.nothing_sent());
}

#[tokio::test]
async fn test_stream_error_ends_the_subscription() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    let watch = proxy
        .call("watch", &[Value::from("/")])
        .unwrap()
        .into_stream()
        .unwrap();
    let mut subscription = watch.subscribe();
    assert!(subscription.next().now_or_never().is_none());
    let (id, _, _, _) = harness.next_call();

    harness.context.dispatch(Inbound::StreamError {
        id,
        message: "disk gone".to_string(),
    });
    assert_eq!(
        subscription.next().await,
        Some(Err(RpcError::Remote("disk gone".to_string())))
    );
    assert_eq!(subscription.next().await, None);
    assert_eq!(harness.context.outstanding_calls(), 0);
    assert!(harness.nothing_sent());
}

#[tokio::test]
async fn test_explicit_unsubscribe_cancels() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    let watch = proxy
        .call("watch", &[Value::from("/")])
        .unwrap()
        .into_stream()
        .unwrap();
    let mut subscription = watch.subscribe();
    assert!(subscription.next().now_or_never().is_none());
    let (id, _, _, _) = harness.next_call();

    subscription.unsubscribe();
    assert_eq!(harness.outbound.try_recv(), Ok(Outbound::Cancel { id }));

    // Late messages for the cancelled call are ignored.
    harness.context.dispatch(Inbound::StreamNext {
        id,
        value: json!({"path": "/late"}),
    });
    assert_eq!(harness.context.outstanding_calls(), 0);
}

#[tokio::test]
async fn test_close_rejects_everything_outstanding() {
    let harness = Harness::new();
    let proxy = files_proxy(&harness);

    let pending = proxy.call("ping", &[]).unwrap();
    let _ = harness.next_call();

    let watch = proxy
        .call("watch", &[Value::from("/")])
        .unwrap()
        .into_stream()
        .unwrap();
    let mut subscription = watch.subscribe();
    assert!(subscription.next().now_or_never().is_none());
    let _ = harness.next_call();

    let counter = counter(&harness, 5);
    assert_eq!(harness.context.live_handles(), 1);

    harness.context.close();
    harness.context.close();
    assert!(harness.context.is_closed());
    assert_eq!(harness.context.outstanding_calls(), 0);
    assert_eq!(harness.context.live_handles(), 0);
    assert!(counter.is_disposed());

    assert_eq!(pending.value().await, Err(RpcError::ConnectionClosed));
    assert_eq!(
        subscription.next().await,
        Some(Err(RpcError::ConnectionClosed))
    );
    assert_eq!(subscription.next().await, None);

    let late = proxy.call("ping", &[]).unwrap();
    assert_eq!(late.value().await, Err(RpcError::ConnectionClosed));
    assert_eq!(
        counter.dispose().await,
        Err(RpcError::Handle(HandleError::Released(5)))
    );
    assert!(harness.nothing_sent());
}

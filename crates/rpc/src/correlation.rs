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

//! Outstanding calls awaiting a reply, keyed by call id.

use std::sync::atomic::{AtomicU64, Ordering};

use flume::Sender;
use serde_json::Value as JsonValue;
use tracing::{trace, warn};

use crate::errors::RpcError;
use crate::messages::{CallId, Inbound};

/// What a stream subscriber receives.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamEvent {
    Next(JsonValue),
    Error(RpcError),
    Complete,
}

#[derive(Clone)]
pub(crate) enum Pending {
    Promise(Sender<Result<JsonValue, RpcError>>),
    Stream(Sender<StreamEvent>),
}

impl Pending {
    /// Settle with an error, for teardown.
    pub fn reject(self, error: RpcError) {
        match self {
            Pending::Promise(reply) => {
                let _ = reply.send(Err(error));
            }
            Pending::Stream(events) => {
                let _ = events.send(StreamEvent::Error(error));
            }
        }
    }
}

pub(crate) struct CallTable {
    pending: papaya::HashMap<CallId, Pending>,
    next_id: AtomicU64,
}

impl Default for CallTable {
    fn default() -> Self {
        Self {
            pending: papaya::HashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl CallTable {
    pub fn next_id(&self) -> CallId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, id: CallId, pending: Pending) {
        self.pending.pin().insert(id, pending);
    }

    pub fn remove(&self, id: CallId) -> Option<Pending> {
        self.pending.pin().remove(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Take every outstanding entry.
    pub fn drain(&self) -> Vec<Pending> {
        let pending = self.pending.pin();
        let ids: Vec<CallId> = pending.iter().map(|(id, _)| *id).collect();
        ids.into_iter()
            .filter_map(|id| pending.remove(&id).cloned())
            .collect()
    }

    /// Route a reply to whoever is waiting for it. Entries are removed once settled; replies
    /// for unknown or already settled calls are logged and dropped.
    pub fn deliver(&self, message: Inbound) {
        let id = message.id();
        match message {
            Inbound::Response { result, .. } => match self.remove(id) {
                Some(Pending::Promise(reply)) => {
                    // The caller may have stopped waiting; the entry is gone either way.
                    let _ = reply.send(Ok(result));
                }
                Some(Pending::Stream(events)) => {
                    warn!(id, "single response to a stream call; ending stream");
                    let _ = events.send(StreamEvent::Next(result));
                    let _ = events.send(StreamEvent::Complete);
                }
                None => warn!(id, "response for unknown call"),
            },
            Inbound::Error { message, .. } | Inbound::StreamError { message, .. } => {
                match self.remove(id) {
                    Some(pending) => pending.reject(RpcError::Remote(message)),
                    None => warn!(id, %message, "error for unknown call"),
                }
            }
            Inbound::StreamNext { value, .. } => {
                let events = match self.pending.pin().get(&id) {
                    Some(Pending::Stream(events)) => events.clone(),
                    Some(Pending::Promise(_)) => {
                        warn!(id, "stream event for a promise call");
                        return;
                    }
                    None => {
                        trace!(id, "stream event after cancellation");
                        return;
                    }
                };
                if events.send(StreamEvent::Next(value)).is_err() {
                    self.remove(id);
                }
            }
            Inbound::StreamComplete { .. } => match self.remove(id) {
                Some(Pending::Stream(events)) => {
                    let _ = events.send(StreamEvent::Complete);
                }
                Some(Pending::Promise(reply)) => {
                    warn!(id, "stream completion for a promise call");
                    let _ = reply.send(Ok(JsonValue::Null));
                }
                None => trace!(id, "completion after cancellation"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_settles_and_removes() {
        let table = CallTable::default();
        let id = table.next_id();
        let (tx, rx) = flume::bounded(1);
        table.insert(id, Pending::Promise(tx));
        assert_eq!(table.len(), 1);

        table.deliver(Inbound::Response {
            id,
            result: json!("ok"),
        });
        assert_eq!(rx.try_recv().unwrap(), Ok(json!("ok")));
        assert_eq!(table.len(), 0);

        // A duplicate reply finds nothing to settle.
        table.deliver(Inbound::Response {
            id,
            result: json!("again"),
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stream_events_keep_entry_until_complete() {
        let table = CallTable::default();
        let id = table.next_id();
        let (tx, rx) = flume::unbounded();
        table.insert(id, Pending::Stream(tx));

        table.deliver(Inbound::StreamNext { id, value: json!(1) });
        table.deliver(Inbound::StreamNext { id, value: json!(2) });
        assert_eq!(table.len(), 1);
        table.deliver(Inbound::StreamComplete { id });
        assert_eq!(table.len(), 0);

        let events: Vec<_> = rx.drain().collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Next(json!(1)),
                StreamEvent::Next(json!(2)),
                StreamEvent::Complete,
            ]
        );
    }

    #[test]
    fn test_remote_error_rejects() {
        let table = CallTable::default();
        let id = table.next_id();
        let (tx, rx) = flume::bounded(1);
        table.insert(id, Pending::Promise(tx));
        table.deliver(Inbound::Error {
            id,
            message: "boom".to_string(),
        });
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(RpcError::Remote("boom".to_string()))
        );
    }

    #[test]
    fn test_ids_are_distinct() {
        let table = CallTable::default();
        assert_ne!(table.next_id(), table.next_id());
    }

    #[test]
    fn test_drain_empties_table() {
        let table = CallTable::default();
        for _ in 0..3 {
            let (tx, _rx) = flume::unbounded();
            table.insert(table.next_id(), Pending::Stream(tx));
        }
        assert_eq!(table.drain().len(), 3);
        assert_eq!(table.len(), 0);
    }
}

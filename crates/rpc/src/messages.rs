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

//! Messages exchanged with the remote side. Arguments and results are already marshalled.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use skein_compiler::ReturnKind;

pub type CallId = u64;
pub type HandleId = u64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound {
    Call {
        id: CallId,
        kind: ReturnKind,
        target: CallTarget,
        args: JsonValue,
    },
    /// The subscriber of a stream call went away before it completed.
    Cancel { id: CallId },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CallTarget {
    Function { name: String },
    Method { object: HandleId, name: String },
    NewObject { interface: String },
    Dispose { object: HandleId },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Inbound {
    Response { id: CallId, result: JsonValue },
    Error { id: CallId, message: String },
    StreamNext { id: CallId, value: JsonValue },
    StreamError { id: CallId, message: String },
    StreamComplete { id: CallId },
}

impl Inbound {
    pub fn id(&self) -> CallId {
        match self {
            Inbound::Response { id, .. }
            | Inbound::Error { id, .. }
            | Inbound::StreamNext { id, .. }
            | Inbound::StreamError { id, .. }
            | Inbound::StreamComplete { id } => *id,
        }
    }
}

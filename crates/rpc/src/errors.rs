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

use std::path::PathBuf;

use skein_compiler::{GenerationError, ParseError, ReturnKind};

use crate::messages::HandleId;

/// Misuse of a remote object handle. Always delivered through the deferred result of the
/// operation, never raised synchronously.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("unknown remote object handle {0}")]
    Unknown(HandleId),
    #[error("remote object handle {0} was already released")]
    Released(HandleId),
    #[error("remote object has not been bound to a handle")]
    Unbound,
    #[error("remote object handle {0} is already bound")]
    AlreadyBound(HandleId),
}

/// A value that doesn't fit its declared type, in either direction.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarshalError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: &'static str,
    },
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("missing required argument `{0}`")]
    MissingArgument(String),
    #[error("expected at most {expected} arguments, got {found}")]
    TooManyArguments { expected: usize, found: usize },
    #[error("unknown type alias `{0}`")]
    UnknownAlias(String),
    #[error("unknown interface `{0}`")]
    UnknownInterface(String),
    #[error("{0} cannot be marshalled")]
    Unsupported(String),
    #[error("{0} is not representable on the wire")]
    InvalidNumber(f64),
    #[error("invalid date `{0}`")]
    InvalidDate(String),
    #[error("invalid buffer encoding: {0}")]
    InvalidBuffer(String),
    #[error("`{0}` is already registered with a different definition")]
    ConflictingDefinition(String),
    #[error("expected an instance of `{expected}`, found `{found}`")]
    WrongInterface { expected: String, found: String },
    #[error("remote object handle {0} belongs to another connection")]
    ForeignHandle(HandleId),
    #[error("the owning context has been dropped")]
    Detached,
    #[error(transparent)]
    Handle(#[from] HandleError),
}

/// Failure of a single remote call. Never poisons the context it was issued through.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[error(transparent)]
    Marshal(#[from] MarshalError),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("could not send request: {0}")]
    CouldNotSend(String),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("no such call `{0}`")]
    NoSuchCall(String),
    #[error("call is {found}, not {expected}")]
    WrongReturnKind {
        expected: ReturnKind,
        found: ReturnKind,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("definition path must be absolute: {}", .0.display())]
pub struct PathError(pub PathBuf);

/// Why the cache could not produce a factory. Scoped to the one acquisition; a later call for
/// the same path tries again.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

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

use std::fmt::{Display, Formatter};

use crate::types::SourcePos;

/// Failure to turn definition source into a [`crate::ServiceDefinition`].
///
/// Always fatal to the one acquisition that triggered the parse, never to the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The definition path, for diagnostics.
    pub path: String,
    pub position: SourcePos,
    /// Byte range in the source the error points at, when known.
    pub span: Option<(usize, usize)>,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("syntax error: {message}")]
    Syntax {
        message: String,
        expected: Vec<String>,
    },
    #[error("unsupported type construct: {0}")]
    UnsupportedType(String),
    #[error("duplicate exported name `{name}` (first declared at {previous})")]
    DuplicateExport { name: String, previous: SourcePos },
    #[error("`{member}` declared more than once in interface `{interface}`")]
    DuplicateMember { interface: String, member: String },
    #[error("duplicate name `{name}` in {owner}")]
    DuplicateParameter { owner: String, name: String },
    #[error("unresolved type reference `{0}`")]
    UnresolvedType(String),
    #[error("type alias cycle through {}", .0.join(" -> "))]
    CyclicAlias(Vec<String>),
    #[error("interface `{interface}` cannot extend `{parent}`: {reason}")]
    InvalidExtends {
        interface: String,
        parent: String,
        reason: String,
    },
    #[error(
        "interface `{interface}` composes conflicting signatures for `{method}`: {first} vs {second}"
    )]
    ConflictingSignature {
        interface: String,
        method: String,
        first: String,
        second: String,
    },
}

impl ParseError {
    pub fn new(path: &str, position: SourcePos, span: Option<(usize, usize)>, kind: ParseErrorKind) -> Self {
        Self {
            path: path.to_string(),
            position,
            span,
            kind,
        }
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.path, self.position, self.kind)
    }
}

impl std::error::Error for ParseError {}

/// A service model the generator can't produce a dispatch plan for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("`{call}`: {ty} cannot cross the process boundary as a value ({reason})")]
    UnsupportedPayload {
        call: String,
        ty: String,
        reason: &'static str,
    },
    #[error("`{call}`: synchronous calls cannot return a value, declared `{result}`")]
    SyncResult { call: String, result: String },
    #[error("wire name collision: `{first}` and `{second}` both map to `{token}`")]
    NameCollision {
        first: String,
        second: String,
        token: String,
    },
    #[error("`{call}`: reference to unknown type alias `{name}`")]
    UnknownAlias { call: String, name: String },
}

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

//! The typed model a service definition parses into.

use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{Display as StrumDisplay, EnumString};

/// 1-based position in definition source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

impl SourcePos {
    pub fn new((line, column): (usize, usize)) -> Self {
        Self { line, column }
    }
}

impl Display for SourcePos {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, EnumString)]
pub enum Primitive {
    #[strum(serialize = "string")]
    String,
    #[strum(serialize = "number")]
    Number,
    #[strum(serialize = "boolean")]
    Boolean,
    #[strum(serialize = "void")]
    Void,
    #[strum(to_string = "any", serialize = "mixed")]
    Any,
    #[strum(serialize = "Date")]
    Date,
    #[strum(serialize = "Buffer")]
    Buffer,
}

/// How the result of a call is delivered back to the caller.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReturnKind {
    /// Fire-and-forget; nothing comes back.
    Sync,
    /// A single deferred value.
    Promise,
    /// Zero or more values, then completion or an error.
    Stream,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(Primitive),
    /// Reference to a type alias declared in the same definition.
    Named(String),
    Nullable(Box<Type>),
    Array(Box<Type>),
    /// Carried as an array on the wire.
    Set(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Object(Vec<Field>),
    Function(Vec<Parameter>, Box<Type>),
    /// A live object on the remote side, referenced by handle.
    Interface(String),
    Promise(Box<Type>),
    Stream(Box<Type>),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub optional: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub optional: bool,
}

impl Parameter {
    pub fn new(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
            optional: false,
        }
    }

    pub fn optional(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_string(),
            ty,
            optional: true,
        }
    }
}

impl Type {
    pub fn string() -> Type {
        Type::Primitive(Primitive::String)
    }
    pub fn number() -> Type {
        Type::Primitive(Primitive::Number)
    }
    pub fn boolean() -> Type {
        Type::Primitive(Primitive::Boolean)
    }
    pub fn void() -> Type {
        Type::Primitive(Primitive::Void)
    }
    pub fn any() -> Type {
        Type::Primitive(Primitive::Any)
    }
    pub fn nullable(inner: Type) -> Type {
        Type::Nullable(Box::new(inner))
    }
    pub fn array(inner: Type) -> Type {
        Type::Array(Box::new(inner))
    }
    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }
    pub fn promise(inner: Type) -> Type {
        Type::Promise(Box::new(inner))
    }
    pub fn stream(inner: Type) -> Type {
        Type::Stream(Box::new(inner))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Primitive(Primitive::Void))
    }

    /// Pre-order walk over this type and every type nested inside it. Named references are not
    /// followed.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Type)) {
        f(self);
        match self {
            Type::Primitive(_) | Type::Named(_) | Type::Interface(_) => {}
            Type::Nullable(t)
            | Type::Array(t)
            | Type::Set(t)
            | Type::Promise(t)
            | Type::Stream(t) => t.walk(f),
            Type::Map(k, v) => {
                k.walk(f);
                v.walk(f);
            }
            Type::Object(fields) => {
                for field in fields {
                    field.ty.walk(f);
                }
            }
            Type::Function(params, ret) => {
                for param in params {
                    param.ty.walk(f);
                }
                ret.walk(f);
            }
        }
    }

    /// Mutable post-order walk, used to rewrite references once the symbol table is known.
    pub fn walk_mut(&mut self, f: &mut impl FnMut(&mut Type)) {
        match self {
            Type::Primitive(_) | Type::Named(_) | Type::Interface(_) => {}
            Type::Nullable(t)
            | Type::Array(t)
            | Type::Set(t)
            | Type::Promise(t)
            | Type::Stream(t) => t.walk_mut(f),
            Type::Map(k, v) => {
                k.walk_mut(f);
                v.walk_mut(f);
            }
            Type::Object(fields) => {
                for field in fields {
                    field.ty.walk_mut(f);
                }
            }
            Type::Function(params, ret) => {
                for param in params {
                    param.ty.walk_mut(f);
                }
                ret.walk_mut(f);
            }
        }
        f(self);
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{p}"),
            Type::Named(name) | Type::Interface(name) => write!(f, "{name}"),
            Type::Nullable(t) => write!(f, "?{t}"),
            Type::Array(t) => write!(f, "Array<{t}>"),
            Type::Set(t) => write!(f, "Set<{t}>"),
            Type::Map(k, v) => write!(f, "Map<{k}, {v}>"),
            Type::Object(fields) => {
                write!(f, "{{")?;
                write!(f, "{}", fields.iter().map(|field| field.to_string()).join(", "))?;
                write!(f, "}}")
            }
            Type::Function(params, ret) => {
                write!(f, "({}) => {ret}", params.iter().join(", "))
            }
            Type::Promise(t) => write!(f, "Promise<{t}>"),
            Type::Stream(t) => write!(f, "Observable<{t}>"),
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mark = if self.optional { "?" } else { "" };
        write!(f, "{}{mark}: {}", self.name, self.ty)
    }
}

impl Display for Parameter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mark = if self.optional { "?" } else { "" };
        write!(f, "{}{mark}: {}", self.name, self.ty)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<Parameter>,
    pub return_kind: ReturnKind,
    /// The type delivered to the caller: the `T` of `Promise<T>` / `Observable<T>`, or the
    /// declared type of a synchronous call.
    pub result: Type,
}

impl Signature {
    /// Split a declared return type into its call shape and result type.
    pub fn from_declared(params: Vec<Parameter>, declared: Type) -> Self {
        let (return_kind, result) = match declared {
            Type::Promise(inner) => (ReturnKind::Promise, *inner),
            Type::Stream(inner) => (ReturnKind::Stream, *inner),
            other => (ReturnKind::Sync, other),
        };
        Self {
            params,
            return_kind,
            result,
        }
    }

    /// Whether two signatures are interchangeable for callers. Parameter names don't matter.
    pub fn same_shape(&self, other: &Signature) -> bool {
        self.return_kind == other.return_kind
            && self.result == other.result
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.ty == b.ty && a.optional == b.optional)
    }

    /// The return type as written in source.
    pub fn declared_return(&self) -> Type {
        match self.return_kind {
            ReturnKind::Sync => self.result.clone(),
            ReturnKind::Promise => Type::promise(self.result.clone()),
            ReturnKind::Stream => Type::stream(self.result.clone()),
        }
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}): {}",
            self.params.iter().join(", "),
            self.declared_return()
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub signature: Signature,
    pub position: SourcePos,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceDef {
    pub name: String,
    /// Interfaces this one was composed from, as declared.
    pub extends: Vec<String>,
    pub constructor: Option<Vec<Parameter>>,
    /// Flattened method set: own methods plus everything inherited through `extends`.
    pub methods: IndexMap<String, Signature>,
    pub position: SourcePos,
}

/// Everything a definition file exports. Immutable once parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub name: String,
    pub functions: IndexMap<String, FunctionDef>,
    pub interfaces: IndexMap<String, InterfaceDef>,
    pub aliases: IndexMap<String, Type>,
}

impl ServiceDefinition {
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceDef> {
        self.interfaces.get(name)
    }

    pub fn alias(&self, name: &str) -> Option<&Type> {
        self.aliases.get(name)
    }
}

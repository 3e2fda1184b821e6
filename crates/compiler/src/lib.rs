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

//! Service definition front end: parses definition files into a [`ServiceDefinition`] and
//! generates the data-driven [`ProxyUnit`] that the RPC runtime dispatches through.

mod codegen;
mod diagnostics;
mod errors;
mod names;
mod parse;
mod resolve;
mod types;


pub use crate::codegen::{CallPlan, InterfacePlan, ProxyUnit, generate};
pub use crate::diagnostics::{DiagnosticRenderOptions, DiagnosticVerbosity, format_parse_error};
pub use crate::errors::{GenerationError, ParseError, ParseErrorKind};
pub use crate::names::{
    TOKEN_BYTES, obfuscate, qualified_constructor, qualified_function, qualified_method,
};
pub use crate::parse::definition::DefinitionParser;
pub use crate::resolve::parse_definition;
pub use crate::types::{
    Field, FunctionDef, InterfaceDef, Parameter, Primitive, ReturnKind, ServiceDefinition,
    Signature, SourcePos, Type,
};

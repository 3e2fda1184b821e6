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

//! Kicks off the Pest parser and converts its output into unresolved declarations.
//!
//! Names are not checked here; the resolver in [`crate::resolve`] does that once every
//! declaration in the file is known.

use std::collections::HashSet;
use std::str::FromStr;

use pest::Parser;
use pest::error::{ErrorVariant, InputLocation};
use pest::iterators::Pair;

use crate::errors::{ParseError, ParseErrorKind};
use crate::types::{Field, Parameter, Primitive, SourcePos, Type};

pub mod definition {
    #[derive(pest_derive::Parser)]
    #[grammar = "src/definition.pest"]
    pub struct DefinitionParser;
}

use definition::{DefinitionParser, Rule};

/// Where a declaration or reference appeared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Loc {
    pub position: SourcePos,
    pub span: (usize, usize),
}

impl Loc {
    fn of(pair: &Pair<Rule>) -> Self {
        let span = pair.as_span();
        Self {
            position: SourcePos::new(pair.line_col()),
            span: (span.start(), span.end()),
        }
    }
}

pub(crate) struct RawMethod {
    pub name: String,
    pub loc: Loc,
    pub params: Vec<Parameter>,
    pub declared: Type,
}

pub(crate) enum RawItem {
    Function {
        name: String,
        loc: Loc,
        params: Vec<Parameter>,
        declared: Type,
    },
    Interface {
        name: String,
        loc: Loc,
        extends: Vec<(String, Loc)>,
        constructors: Vec<(Vec<Parameter>, Loc)>,
        methods: Vec<RawMethod>,
    },
    Alias {
        name: String,
        loc: Loc,
        ty: Type,
    },
}

impl RawItem {
    pub fn name(&self) -> &str {
        match self {
            RawItem::Function { name, .. }
            | RawItem::Interface { name, .. }
            | RawItem::Alias { name, .. } => name,
        }
    }

    pub fn loc(&self) -> Loc {
        match self {
            RawItem::Function { loc, .. }
            | RawItem::Interface { loc, .. }
            | RawItem::Alias { loc, .. } => *loc,
        }
    }
}

/// Declarations in source order, plus every type name referenced anywhere in them.
pub(crate) struct RawDefinition {
    pub items: Vec<RawItem>,
    pub references: Vec<(String, Loc)>,
}

pub(crate) fn parse_items(path: &str, source: &str) -> Result<RawDefinition, ParseError> {
    let mut pairs = DefinitionParser::parse(Rule::definition_file, source)
        .map_err(|e| syntax_error(path, e))?;
    let Some(file) = pairs.next() else {
        return Ok(RawDefinition {
            items: vec![],
            references: vec![],
        });
    };

    let mut builder = ItemBuilder {
        path,
        references: vec![],
    };
    let mut items = vec![];
    for pair in file.into_inner() {
        match pair.as_rule() {
            Rule::function_decl => items.push(builder.function(pair)?),
            Rule::interface_decl => items.push(builder.interface(pair)?),
            Rule::alias_decl => items.push(builder.alias(pair)?),
            Rule::EOI => break,
            rule => unreachable!("unexpected top-level rule {rule:?}"),
        }
    }

    Ok(RawDefinition {
        items,
        references: builder.references,
    })
}

fn syntax_error(path: &str, e: pest::error::Error<Rule>) -> ParseError {
    let position = match e.line_col {
        pest::error::LineColLocation::Pos(lc) => SourcePos::new(lc),
        pest::error::LineColLocation::Span(begin, _) => SourcePos::new(begin),
    };
    let span = match e.location {
        InputLocation::Pos(p) => (p, p),
        InputLocation::Span((start, end)) => (start, end),
    };
    let expected = match &e.variant {
        ErrorVariant::ParsingError { positives, .. } => positives
            .iter()
            .map(|rule| format!("{rule:?}"))
            .collect(),
        ErrorVariant::CustomError { .. } => vec![],
    };
    ParseError::new(
        path,
        position,
        Some(span),
        ParseErrorKind::Syntax {
            message: e.variant.message().to_string(),
            expected,
        },
    )
}

struct ItemBuilder<'a> {
    path: &'a str,
    references: Vec<(String, Loc)>,
}

impl ItemBuilder<'_> {
    fn error(&self, pair: &Pair<Rule>, kind: ParseErrorKind) -> ParseError {
        let loc = Loc::of(pair);
        ParseError::new(self.path, loc.position, Some(loc.span), kind)
    }

    fn reject_generics(&self, pair: &Pair<Rule>, what: &str) -> Result<(), ParseError> {
        Err(self.error(
            pair,
            ParseErrorKind::UnsupportedType(format!(
                "generic {what} declaration `<{}>`",
                pair.clone().into_inner().map(|p| p.as_str()).collect::<Vec<_>>().join(", ")
            )),
        ))
    }

    fn function(&mut self, pair: Pair<Rule>) -> Result<RawItem, ParseError> {
        let loc = Loc::of(&pair);
        let mut name = None;
        let mut params = vec![];
        let mut declared = None;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::kw_export | Rule::kw_function => {}
                Rule::ident => name = Some(inner.as_str().to_string()),
                Rule::type_params => self.reject_generics(&inner, "function")?,
                Rule::param_list => {
                    let owner = format!("parameters of `{}`", name.as_deref().unwrap_or("?"));
                    params = self.param_list(inner, &owner)?;
                }
                Rule::type_expr => declared = Some(self.type_expr(inner)?),
                rule => unreachable!("unexpected rule in function declaration: {rule:?}"),
            }
        }
        Ok(RawItem::Function {
            name: name.unwrap_or_default(),
            loc,
            params,
            declared: declared.unwrap_or_else(Type::void),
        })
    }

    fn interface(&mut self, pair: Pair<Rule>) -> Result<RawItem, ParseError> {
        let loc = Loc::of(&pair);
        let mut name = String::new();
        let mut extends = vec![];
        let mut constructors = vec![];
        let mut methods = vec![];
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::kw_export | Rule::kw_interface => {}
                Rule::ident => name = inner.as_str().to_string(),
                Rule::type_params => self.reject_generics(&inner, "interface")?,
                Rule::extends_clause => {
                    for parent in inner.into_inner() {
                        if parent.as_rule() == Rule::ident {
                            extends.push((parent.as_str().to_string(), Loc::of(&parent)));
                        }
                    }
                }
                Rule::constructor_decl => {
                    let ctor_loc = Loc::of(&inner);
                    let owner = format!("constructor of `{name}`");
                    let list = inner
                        .into_inner()
                        .find(|p| p.as_rule() == Rule::param_list)
                        .map(|p| self.param_list(p, &owner))
                        .transpose()?
                        .unwrap_or_default();
                    constructors.push((list, ctor_loc));
                }
                Rule::method_decl => methods.push(self.method(inner, &name)?),
                rule => unreachable!("unexpected rule in interface declaration: {rule:?}"),
            }
        }
        Ok(RawItem::Interface {
            name,
            loc,
            extends,
            constructors,
            methods,
        })
    }

    fn method(&mut self, pair: Pair<Rule>, interface: &str) -> Result<RawMethod, ParseError> {
        let loc = Loc::of(&pair);
        let mut name = String::new();
        let mut params = vec![];
        let mut declared = Type::void();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::ident => name = inner.as_str().to_string(),
                Rule::param_list => {
                    let owner = format!("parameters of `{interface}.{name}`");
                    params = self.param_list(inner, &owner)?;
                }
                Rule::type_expr => declared = self.type_expr(inner)?,
                rule => unreachable!("unexpected rule in method declaration: {rule:?}"),
            }
        }
        Ok(RawMethod {
            name,
            loc,
            params,
            declared,
        })
    }

    fn alias(&mut self, pair: Pair<Rule>) -> Result<RawItem, ParseError> {
        let loc = Loc::of(&pair);
        let mut name = String::new();
        let mut ty = None;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::kw_export | Rule::kw_type => {}
                Rule::ident => name = inner.as_str().to_string(),
                Rule::type_params => self.reject_generics(&inner, "type alias")?,
                Rule::type_expr => ty = Some(self.type_expr(inner)?),
                rule => unreachable!("unexpected rule in type alias: {rule:?}"),
            }
        }
        Ok(RawItem::Alias {
            name,
            loc,
            ty: ty.unwrap_or_else(Type::void),
        })
    }

    fn param_list(&mut self, pair: Pair<Rule>, owner: &str) -> Result<Vec<Parameter>, ParseError> {
        let mut seen = HashSet::new();
        let mut params = vec![];
        for param in pair.into_inner() {
            let (name, ty, optional) = self.named_slot(param.clone())?;
            if !seen.insert(name.clone()) {
                return Err(self.error(
                    &param,
                    ParseErrorKind::DuplicateParameter {
                        owner: owner.to_string(),
                        name,
                    },
                ));
            }
            params.push(Parameter { name, ty, optional });
        }
        Ok(params)
    }

    /// `name?: type`, shared by parameters and object fields.
    fn named_slot(&mut self, pair: Pair<Rule>) -> Result<(String, Type, bool), ParseError> {
        let mut name = String::new();
        let mut optional = false;
        let mut ty = Type::any();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::ident => name = inner.as_str().to_string(),
                Rule::optional_mark => optional = true,
                Rule::type_expr => ty = self.type_expr(inner)?,
                rule => unreachable!("unexpected rule in parameter: {rule:?}"),
            }
        }
        Ok((name, ty, optional))
    }

    fn type_expr(&mut self, pair: Pair<Rule>) -> Result<Type, ParseError> {
        let members: Vec<_> = pair.clone().into_inner().collect();
        if members.len() > 1 {
            return Err(self.error(
                &pair,
                ParseErrorKind::UnsupportedType(format!("union type `{}`", pair.as_str().trim())),
            ));
        }
        let Some(member) = members.into_iter().next() else {
            return Err(self.error(
                &pair,
                ParseErrorKind::UnsupportedType("empty type".to_string()),
            ));
        };
        self.union_member(member)
    }

    fn union_member(&mut self, pair: Pair<Rule>) -> Result<Type, ParseError> {
        let mut nullable = false;
        let mut ty = None;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::nullable_mark => nullable = true,
                Rule::array_suffix => {
                    let element = ty.take().unwrap_or_else(Type::any);
                    ty = Some(Type::array(element));
                }
                _ => ty = Some(self.primary_type(inner)?),
            }
        }
        let ty = ty.unwrap_or_else(Type::any);
        Ok(if nullable { Type::nullable(ty) } else { ty })
    }

    fn primary_type(&mut self, pair: Pair<Rule>) -> Result<Type, ParseError> {
        match pair.as_rule() {
            Rule::type_ref => {
                let ident = pair.clone().into_inner().next().map(|p| p.as_str()).unwrap_or("");
                if let Ok(primitive) = Primitive::from_str(ident) {
                    return Ok(Type::Primitive(primitive));
                }
                self.references.push((ident.to_string(), Loc::of(&pair)));
                Ok(Type::Named(ident.to_string()))
            }
            Rule::paren_type => match pair.clone().into_inner().next() {
                Some(inner) => self.type_expr(inner),
                None => Err(self.error(
                    &pair,
                    ParseErrorKind::UnsupportedType("empty parenthesised type".to_string()),
                )),
            },
            Rule::function_type => {
                let mut inner = pair.into_inner();
                let params = match inner.next() {
                    Some(list) => self.param_list(list, "function type")?,
                    None => vec![],
                };
                let ret = match inner.next() {
                    Some(ret) => self.type_expr(ret)?,
                    None => Type::void(),
                };
                Ok(Type::Function(params, Box::new(ret)))
            }
            Rule::object_type => {
                let mut seen = HashSet::new();
                let mut fields = vec![];
                for field in pair.into_inner() {
                    let (name, ty, optional) = self.named_slot(field.clone())?;
                    if !seen.insert(name.clone()) {
                        return Err(self.error(
                            &field,
                            ParseErrorKind::DuplicateParameter {
                                owner: "object type".to_string(),
                                name,
                            },
                        ));
                    }
                    fields.push(Field { name, ty, optional });
                }
                Ok(Type::Object(fields))
            }
            Rule::generic_type => self.generic_type(pair),
            Rule::literal_type => {
                let construct = if pair.as_str() == "null" {
                    "bare `null` type; use `?T` for nullable values".to_string()
                } else {
                    format!("literal type `{}`", pair.as_str())
                };
                Err(self.error(&pair, ParseErrorKind::UnsupportedType(construct)))
            }
            rule => unreachable!("unexpected rule in type position: {rule:?}"),
        }
    }

    fn generic_type(&mut self, pair: Pair<Rule>) -> Result<Type, ParseError> {
        let mut inner = pair.clone().into_inner();
        let constructor = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
        let mut args = vec![];
        for arg in inner {
            args.push(self.type_expr(arg)?);
        }

        let arity = match constructor.as_str() {
            "Array" | "$ReadOnlyArray" | "Set" | "Promise" | "Observable"
            | "ConnectableObservable" | "Stream" => 1,
            "Map" => 2,
            _ => {
                return Err(self.error(
                    &pair,
                    ParseErrorKind::UnsupportedType(format!(
                        "generic type `{}`",
                        pair.as_str().trim()
                    )),
                ));
            }
        };
        if args.len() != arity {
            return Err(self.error(
                &pair,
                ParseErrorKind::UnsupportedType(format!(
                    "`{constructor}` takes {arity} type argument(s), got {}",
                    args.len()
                )),
            ));
        }

        let mut args = args.into_iter();
        let first = Box::new(args.next().unwrap_or_else(Type::any));
        Ok(match constructor.as_str() {
            "Array" | "$ReadOnlyArray" => Type::Array(first),
            "Set" => Type::Set(first),
            "Promise" => Type::Promise(first),
            "Map" => Type::Map(first, Box::new(args.next().unwrap_or_else(Type::any))),
            _ => Type::Stream(first),
        })
    }
}

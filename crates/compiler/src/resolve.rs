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

//! Name resolution over parsed declarations: builds the symbol table, checks references,
//! rejects alias cycles, and flattens interface composition into explicit method sets.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use tracing::debug;

use crate::errors::{ParseError, ParseErrorKind};
use crate::parse::{Loc, RawDefinition, RawItem, RawMethod, parse_items};
use crate::types::{FunctionDef, InterfaceDef, Parameter, ServiceDefinition, Signature, Type};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SymbolKind {
    Function,
    Interface,
    Alias,
}

/// Parse definition source into a [`ServiceDefinition`].
///
/// This is a pure function of the text; `path` is used for diagnostics and to name the service
/// (after the file stem).
pub fn parse_definition(path: &str, source: &str) -> Result<ServiceDefinition, ParseError> {
    let raw = parse_items(path, source)?;
    let definition = Resolver::new(path).resolve(raw)?;
    debug!(
        path,
        functions = definition.functions.len(),
        interfaces = definition.interfaces.len(),
        aliases = definition.aliases.len(),
        "parsed service definition"
    );
    Ok(definition)
}

fn service_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

struct Resolver<'a> {
    path: &'a str,
    symbols: IndexMap<String, (SymbolKind, Loc)>,
}

impl<'a> Resolver<'a> {
    fn new(path: &'a str) -> Self {
        Self {
            path,
            symbols: IndexMap::new(),
        }
    }

    fn error(&self, loc: Loc, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.path, loc.position, Some(loc.span), kind)
    }

    fn resolve(mut self, raw: RawDefinition) -> Result<ServiceDefinition, ParseError> {
        for item in &raw.items {
            let kind = match item {
                RawItem::Function { .. } => SymbolKind::Function,
                RawItem::Interface { .. } => SymbolKind::Interface,
                RawItem::Alias { .. } => SymbolKind::Alias,
            };
            if let Some((_, previous)) = self.symbols.get(item.name()) {
                return Err(self.error(
                    item.loc(),
                    ParseErrorKind::DuplicateExport {
                        name: item.name().to_string(),
                        previous: previous.position,
                    },
                ));
            }
            self.symbols
                .insert(item.name().to_string(), (kind, item.loc()));
        }

        for (name, loc) in &raw.references {
            match self.symbols.get(name) {
                Some((SymbolKind::Interface | SymbolKind::Alias, _)) => {}
                _ => return Err(self.error(*loc, ParseErrorKind::UnresolvedType(name.clone()))),
            }
        }

        let mut functions = IndexMap::new();
        let mut aliases = IndexMap::new();
        let mut alias_locs = HashMap::new();
        let mut interfaces = vec![];
        for item in raw.items {
            match item {
                RawItem::Function {
                    name,
                    loc,
                    params,
                    declared,
                } => {
                    let signature = self.signature(params, declared);
                    functions.insert(
                        name.clone(),
                        FunctionDef {
                            name,
                            signature,
                            position: loc.position,
                        },
                    );
                }
                RawItem::Alias { name, loc, mut ty } => {
                    self.rewrite(&mut ty);
                    alias_locs.insert(name.clone(), loc);
                    aliases.insert(name, ty);
                }
                RawItem::Interface {
                    name,
                    loc,
                    extends,
                    constructors,
                    methods,
                } => interfaces.push((name, loc, extends, constructors, methods)),
            }
        }

        check_alias_cycles(&aliases).map_err(|cycle| {
            let loc = alias_locs[&cycle[0]];
            self.error(loc, ParseErrorKind::CyclicAlias(cycle))
        })?;

        let mut declared = IndexMap::new();
        for (name, loc, extends, constructors, methods) in interfaces {
            let mut own = IndexMap::new();
            for RawMethod {
                name: method,
                loc: method_loc,
                params,
                declared: ret,
            } in methods
            {
                if own.contains_key(&method) {
                    return Err(self.error(
                        method_loc,
                        ParseErrorKind::DuplicateMember {
                            interface: name.clone(),
                            member: method,
                        },
                    ));
                }
                let signature = self.signature(params, ret);
                own.insert(method, signature);
            }

            let mut constructors = constructors.into_iter();
            let constructor = constructors.next().map(|(mut params, _)| {
                self.rewrite_params(&mut params);
                params
            });
            if let Some((_, dup_loc)) = constructors.next() {
                return Err(self.error(
                    dup_loc,
                    ParseErrorKind::DuplicateMember {
                        interface: name.clone(),
                        member: "constructor".to_string(),
                    },
                ));
            }

            for (parent, parent_loc) in &extends {
                match self.symbols.get(parent) {
                    Some((SymbolKind::Interface, _)) => {}
                    Some(_) => {
                        return Err(self.error(
                            *parent_loc,
                            ParseErrorKind::InvalidExtends {
                                interface: name.clone(),
                                parent: parent.clone(),
                                reason: "not an interface".to_string(),
                            },
                        ));
                    }
                    None => {
                        return Err(self.error(
                            *parent_loc,
                            ParseErrorKind::UnresolvedType(parent.clone()),
                        ));
                    }
                }
            }

            declared.insert(
                name.clone(),
                Declared {
                    loc,
                    extends: extends.into_iter().map(|(parent, _)| parent).collect(),
                    constructor,
                    own,
                },
            );
        }

        let mut flattened = HashMap::new();
        let mut result = IndexMap::new();
        for (name, decl) in &declared {
            let methods = self.flatten(name, &declared, &mut vec![], &mut flattened)?;
            result.insert(
                name.clone(),
                InterfaceDef {
                    name: name.clone(),
                    extends: decl.extends.clone(),
                    constructor: decl.constructor.clone(),
                    methods: methods.into_iter().map(|(m, (sig, _))| (m, sig)).collect(),
                    position: decl.loc.position,
                },
            );
        }

        Ok(ServiceDefinition {
            name: service_name(self.path),
            functions,
            interfaces: result,
            aliases,
        })
    }

    /// Named references to interfaces become interface-instance types; the rest stay alias
    /// references.
    fn rewrite(&self, ty: &mut Type) {
        ty.walk_mut(&mut |t| {
            let interface = match t {
                Type::Named(name)
                    if matches!(
                        self.symbols.get(name.as_str()),
                        Some((SymbolKind::Interface, _))
                    ) =>
                {
                    Some(std::mem::take(name))
                }
                _ => None,
            };
            if let Some(name) = interface {
                *t = Type::Interface(name);
            }
        });
    }

    fn rewrite_params(&self, params: &mut [Parameter]) {
        for param in params {
            self.rewrite(&mut param.ty);
        }
    }

    fn signature(&self, mut params: Vec<Parameter>, mut declared: Type) -> Signature {
        self.rewrite_params(&mut params);
        self.rewrite(&mut declared);
        Signature::from_declared(params, declared)
    }

    /// Method set of `name` including everything it extends, each tagged with the interface
    /// that declared it.
    fn flatten(
        &self,
        name: &str,
        declared: &IndexMap<String, Declared>,
        visiting: &mut Vec<String>,
        done: &mut HashMap<String, IndexMap<String, (Signature, String)>>,
    ) -> Result<IndexMap<String, (Signature, String)>, ParseError> {
        if let Some(methods) = done.get(name) {
            return Ok(methods.clone());
        }
        let decl = &declared[name];
        if visiting.iter().any(|v| v == name) {
            let mut cycle = visiting.clone();
            cycle.push(name.to_string());
            return Err(self.error(
                decl.loc,
                ParseErrorKind::InvalidExtends {
                    interface: visiting[0].clone(),
                    parent: name.to_string(),
                    reason: format!("extends cycle {}", cycle.join(" -> ")),
                },
            ));
        }
        visiting.push(name.to_string());

        let mut methods: IndexMap<String, (Signature, String)> = decl
            .own
            .iter()
            .map(|(m, sig)| (m.clone(), (sig.clone(), name.to_string())))
            .collect();
        for parent in &decl.extends {
            let inherited = self.flatten(parent, declared, visiting, done)?;
            for (method, (sig, origin)) in inherited {
                match methods.get(&method) {
                    Some((existing, existing_origin)) => {
                        if !existing.same_shape(&sig) {
                            return Err(self.error(
                                decl.loc,
                                ParseErrorKind::ConflictingSignature {
                                    interface: name.to_string(),
                                    method: method.clone(),
                                    first: format!("{existing_origin}.{method}{existing}"),
                                    second: format!("{origin}.{method}{sig}"),
                                },
                            ));
                        }
                    }
                    None => {
                        methods.insert(method, (sig, origin));
                    }
                }
            }
        }

        visiting.pop();
        done.insert(name.to_string(), methods.clone());
        Ok(methods)
    }
}

struct Declared {
    loc: Loc,
    extends: Vec<String>,
    constructor: Option<Vec<Parameter>>,
    own: IndexMap<String, Signature>,
}

/// Aliases may only refer back to themselves through an interface-instance indirection.
/// Returns the offending cycle, starting and ending at the same alias.
fn check_alias_cycles(aliases: &IndexMap<String, Type>) -> Result<(), Vec<String>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        name: &str,
        aliases: &IndexMap<String, Type>,
        marks: &mut HashMap<String, Mark>,
        stack: &mut Vec<String>,
    ) -> Result<(), Vec<String>> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| n == name).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(name.to_string());
                return Err(cycle);
            }
            None => {}
        }
        let Some(ty) = aliases.get(name) else {
            return Ok(());
        };
        marks.insert(name.to_string(), Mark::Visiting);
        stack.push(name.to_string());

        let mut refs = vec![];
        ty.walk(&mut |t| {
            if let Type::Named(target) = t {
                refs.push(target.as_str());
            }
        });
        for target in refs {
            visit(target, aliases, marks, stack)?;
        }

        stack.pop();
        marks.insert(name.to_string(), Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    for name in aliases.keys() {
        visit(name, aliases, &mut marks, &mut vec![])?;
    }
    Ok(())
}

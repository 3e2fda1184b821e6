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

//! Turns a [`ServiceDefinition`] into a [`ProxyUnit`]: a table of call plans which the runtime's
//! fixed dispatcher interprets. Each plan records everything a forwarding stub needs: how to
//! marshal each argument, what to call on the wire, and how the result comes back.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::errors::GenerationError;
use crate::names::{obfuscate, qualified_constructor, qualified_function, qualified_method};
use crate::types::{Parameter, ReturnKind, ServiceDefinition, Signature, Type};

/// One forwarding stub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallPlan {
    /// Name as declared in the definition.
    pub name: String,
    /// Name sent on the wire.
    pub wire_name: String,
    pub params: Vec<Parameter>,
    pub return_kind: ReturnKind,
    pub result: Type,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfacePlan {
    pub name: String,
    /// Present when the interface declares a constructor, allowing callers to create remote
    /// instances. Always promise-shaped, resolving to an instance of the interface.
    pub constructor: Option<CallPlan>,
    pub methods: IndexMap<String, CallPlan>,
    /// Every interface this one extends, directly or transitively.
    pub ancestors: Vec<String>,
}

impl InterfacePlan {
    pub fn method(&self, name: &str) -> Option<&CallPlan> {
        self.methods.get(name)
    }

    /// Whether an instance of this interface may be passed where `interface` is declared.
    pub fn conforms_to(&self, interface: &str) -> bool {
        self.name == interface || self.ancestors.iter().any(|a| a == interface)
    }
}

/// The generated, still inert, proxy for a service. Becomes callable once injected with its
/// runtime dependencies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyUnit {
    pub service_name: String,
    pub preserve_function_names: bool,
    pub functions: IndexMap<String, CallPlan>,
    pub interfaces: IndexMap<String, Arc<InterfacePlan>>,
    pub aliases: Arc<IndexMap<String, Type>>,
}

impl ProxyUnit {
    pub fn function(&self, name: &str) -> Option<&CallPlan> {
        self.functions.get(name)
    }

    pub fn interface(&self, name: &str) -> Option<&Arc<InterfacePlan>> {
        self.interfaces.get(name)
    }
}

pub fn generate(
    service_name: &str,
    preserve_function_names: bool,
    definition: &ServiceDefinition,
) -> Result<ProxyUnit, GenerationError> {
    let mut generator = Generator {
        service_name,
        preserve_function_names,
        aliases: &definition.aliases,
        tokens: HashMap::new(),
    };

    let mut functions = IndexMap::new();
    for (name, function) in &definition.functions {
        let qualified = qualified_function(service_name, name);
        let wire_name = generator.wire_name(&qualified, qualified.clone())?;
        let plan = generator.plan(name, &qualified, wire_name, &function.signature)?;
        functions.insert(name.clone(), plan);
    }

    let mut interfaces = IndexMap::new();
    for (name, interface) in &definition.interfaces {
        let constructor = match &interface.constructor {
            Some(params) => {
                let qualified = qualified_constructor(service_name, name);
                let wire_name = generator.wire_name(&qualified, name.clone())?;
                let signature = Signature {
                    params: params.clone(),
                    return_kind: ReturnKind::Promise,
                    result: Type::Interface(name.clone()),
                };
                Some(generator.plan(name, &qualified, wire_name, &signature)?)
            }
            None => None,
        };

        let mut methods = IndexMap::new();
        for (method, signature) in &interface.methods {
            let qualified = qualified_method(service_name, name, method);
            let wire_name = generator.wire_name(&qualified, method.clone())?;
            let plan = generator.plan(method, &qualified, wire_name, signature)?;
            methods.insert(method.clone(), plan);
        }

        interfaces.insert(
            name.clone(),
            Arc::new(InterfacePlan {
                name: name.clone(),
                constructor,
                methods,
                ancestors: ancestors(name, definition),
            }),
        );
    }

    debug!(
        service = service_name,
        preserve_function_names,
        functions = functions.len(),
        interfaces = interfaces.len(),
        "generated proxy unit"
    );

    Ok(ProxyUnit {
        service_name: service_name.to_string(),
        preserve_function_names,
        functions,
        interfaces,
        aliases: Arc::new(definition.aliases.clone()),
    })
}

/// Transitive `extends` closure of `name`.
fn ancestors(name: &str, definition: &ServiceDefinition) -> Vec<String> {
    let mut found: Vec<String> = vec![];
    let mut pending: Vec<&str> = vec![name];
    while let Some(current) = pending.pop() {
        let Some(interface) = definition.interfaces.get(current) else {
            continue;
        };
        for parent in &interface.extends {
            if parent != name && !found.contains(parent) {
                found.push(parent.clone());
                pending.push(parent);
            }
        }
    }
    found
}

struct Generator<'a> {
    service_name: &'a str,
    preserve_function_names: bool,
    aliases: &'a IndexMap<String, Type>,
    /// token -> qualified name, to catch collisions.
    tokens: HashMap<String, String>,
}

impl Generator<'_> {
    fn wire_name(&mut self, qualified: &str, preserved: String) -> Result<String, GenerationError> {
        if self.preserve_function_names {
            return Ok(preserved);
        }
        let token = obfuscate(qualified);
        if let Some(first) = self.tokens.get(&token) {
            return Err(GenerationError::NameCollision {
                first: first.clone(),
                second: qualified.to_string(),
                token,
            });
        }
        self.tokens.insert(token.clone(), qualified.to_string());
        Ok(token)
    }

    fn plan(
        &self,
        name: &str,
        qualified: &str,
        wire_name: String,
        signature: &Signature,
    ) -> Result<CallPlan, GenerationError> {
        for param in &signature.params {
            self.check_payload(qualified, &param.ty, &mut vec![])?;
        }
        self.check_payload(qualified, &signature.result, &mut vec![])?;
        if signature.return_kind == ReturnKind::Sync && !signature.result.is_void() {
            return Err(GenerationError::SyncResult {
                call: qualified.to_string(),
                result: signature.result.to_string(),
            });
        }

        Ok(CallPlan {
            name: name.to_string(),
            wire_name,
            params: signature.params.clone(),
            return_kind: signature.return_kind,
            result: signature.result.clone(),
        })
    }

    /// Reject anything that cannot travel as a value, following aliases.
    fn check_payload<'t>(
        &'t self,
        call: &str,
        ty: &'t Type,
        expanding: &mut Vec<&'t str>,
    ) -> Result<(), GenerationError> {
        let mut offending = None;
        let mut named = vec![];
        ty.walk(&mut |t| match t {
            Type::Promise(_) | Type::Stream(_) if offending.is_none() => {
                offending = Some((t, "call shapes are expressed by the return kind"));
            }
            Type::Function(..) if offending.is_none() => {
                offending = Some((t, "functions cannot be marshalled"));
            }
            Type::Named(alias) => named.push(alias.as_str()),
            _ => {}
        });
        if let Some((t, reason)) = offending {
            return Err(GenerationError::UnsupportedPayload {
                call: call.to_string(),
                ty: t.to_string(),
                reason,
            });
        }

        for alias in named {
            if expanding.contains(&alias) {
                continue;
            }
            let Some(target) = self.aliases.get(alias) else {
                return Err(GenerationError::UnknownAlias {
                    call: call.to_string(),
                    name: alias.to_string(),
                });
            };
            expanding.push(alias);
            self.check_payload(call, target, expanding)?;
            expanding.pop();
        }
        Ok(())
    }
}

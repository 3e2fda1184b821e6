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

//! Named types and interfaces known to a context, gathered from every unit registered with it.

use std::sync::Arc;

use skein_compiler::{ProxyUnit, Type};
use tracing::debug;

use crate::errors::MarshalError;
use crate::proxy::{BoundInterface, Hooks};

#[derive(Default)]
pub struct TypeRegistry {
    aliases: papaya::HashMap<String, Type>,
    interfaces: papaya::HashMap<String, Arc<BoundInterface>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a unit's aliases and interfaces available for marshalling. Registering the same
    /// definitions again is a no-op; a different definition under a known name is rejected
    /// and nothing from the unit is registered.
    pub fn register(&self, unit: &ProxyUnit, hooks: &Hooks) -> Result<(), MarshalError> {
        let aliases = self.aliases.pin();
        let interfaces = self.interfaces.pin();

        for (name, ty) in unit.aliases.iter() {
            if aliases.get(name).is_some_and(|known| known != ty) {
                return Err(MarshalError::ConflictingDefinition(name.clone()));
            }
        }
        for (name, plan) in &unit.interfaces {
            if interfaces
                .get(name)
                .is_some_and(|known| known.plan() != plan.as_ref())
            {
                return Err(MarshalError::ConflictingDefinition(name.clone()));
            }
        }

        for (name, ty) in unit.aliases.iter() {
            aliases.get_or_insert(name.clone(), ty.clone());
        }
        for (name, plan) in &unit.interfaces {
            interfaces.get_or_insert_with(name.clone(), || {
                Arc::new(BoundInterface::new(plan.clone(), hooks.clone()))
            });
        }
        debug!(
            service = %unit.service_name,
            aliases = unit.aliases.len(),
            interfaces = unit.interfaces.len(),
            "registered service types"
        );
        Ok(())
    }

    pub fn alias(&self, name: &str) -> Option<Type> {
        self.aliases.pin().get(name).cloned()
    }

    pub fn interface(&self, name: &str) -> Option<Arc<BoundInterface>> {
        self.interfaces.pin().get(name).cloned()
    }
}

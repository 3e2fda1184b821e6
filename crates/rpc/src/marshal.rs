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

//! Type-directed conversion between local [`Value`]s and their wire form.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};
use skein_compiler::{Parameter, Primitive, Type};

use crate::errors::MarshalError;
use crate::messages::HandleId;
use crate::remote::RemoteObject;
use crate::type_registry::TypeRegistry;
use crate::value::Value;

/// Largest integer an IEEE double holds exactly; integral numbers up to here go out as JSON
/// integers.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Maps remote objects to wire ids and back.
pub trait HandleResolver {
    /// Handle id for an object being sent to the remote side. Fails for objects that are
    /// disposed or belong to another connection.
    fn handle_for(&self, object: &Arc<RemoteObject>) -> Result<HandleId, MarshalError>;

    /// The local shell for a received handle id, created and registered on first sight so that
    /// the same id always yields the same object.
    fn object_for(
        &self,
        handle: HandleId,
        interface: &str,
    ) -> Result<Arc<RemoteObject>, MarshalError>;
}

pub struct Marshaller<'a> {
    types: &'a TypeRegistry,
    handles: &'a dyn HandleResolver,
}

impl<'a> Marshaller<'a> {
    pub fn new(types: &'a TypeRegistry, handles: &'a dyn HandleResolver) -> Self {
        Self { types, handles }
    }

    pub fn marshal(&self, value: &Value, ty: &Type) -> Result<JsonValue, MarshalError> {
        match (ty, value) {
            (Type::Named(name), _) => self.marshal(value, &self.resolve(name)?),
            (Type::Nullable(_), Value::Null) => Ok(JsonValue::Null),
            (Type::Nullable(inner), _) => self.marshal(value, inner),
            (Type::Primitive(primitive), _) => marshal_primitive(*primitive, value, ty),
            (Type::Array(element) | Type::Set(element), Value::Array(items)) => items
                .iter()
                .map(|item| self.marshal(item, element))
                .collect::<Result<Vec<_>, _>>()
                .map(JsonValue::Array),
            (Type::Map(key_ty, value_ty), Value::Map(entries)) => entries
                .iter()
                .map(|(k, v)| {
                    Ok(JsonValue::Array(vec![
                        self.marshal(k, key_ty)?,
                        self.marshal(v, value_ty)?,
                    ]))
                })
                .collect::<Result<Vec<_>, MarshalError>>()
                .map(JsonValue::Array),
            (Type::Object(fields), Value::Object(values)) => {
                let mut out = Map::new();
                for field in fields {
                    match values.get(&field.name) {
                        None | Some(Value::Null) if field.optional => {}
                        None => return Err(MarshalError::MissingField(field.name.clone())),
                        Some(v) => {
                            out.insert(field.name.clone(), self.marshal(v, &field.ty)?);
                        }
                    }
                }
                Ok(JsonValue::Object(out))
            }
            (Type::Interface(interface), Value::Remote(object)) => {
                if !object.conforms_to(interface) {
                    return Err(MarshalError::WrongInterface {
                        expected: interface.clone(),
                        found: object.interface_name().to_string(),
                    });
                }
                Ok(JsonValue::from(self.handles.handle_for(object)?))
            }
            (Type::Function(..) | Type::Promise(_) | Type::Stream(_), _) => {
                Err(MarshalError::Unsupported(ty.to_string()))
            }
            _ => Err(mismatch(ty, value.kind())),
        }
    }

    pub fn unmarshal(&self, wire: &JsonValue, ty: &Type) -> Result<Value, MarshalError> {
        match (ty, wire) {
            (Type::Named(name), _) => self.unmarshal(wire, &self.resolve(name)?),
            (Type::Nullable(_), JsonValue::Null) => Ok(Value::Null),
            (Type::Nullable(inner), _) => self.unmarshal(wire, inner),
            (Type::Primitive(primitive), _) => unmarshal_primitive(*primitive, wire, ty),
            (Type::Array(element) | Type::Set(element), JsonValue::Array(items)) => items
                .iter()
                .map(|item| self.unmarshal(item, element))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Type::Map(key_ty, value_ty), JsonValue::Array(entries)) => entries
                .iter()
                .map(|entry| match entry.as_array().map(Vec::as_slice) {
                    Some([k, v]) => Ok((self.unmarshal(k, key_ty)?, self.unmarshal(v, value_ty)?)),
                    _ => Err(mismatch_named("[key, value] pair", json_kind(entry))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Map),
            (Type::Object(fields), JsonValue::Object(values)) => {
                let mut out = IndexMap::with_capacity(fields.len());
                for field in fields {
                    let value = match values.get(&field.name) {
                        None | Some(JsonValue::Null) if field.optional => Value::Null,
                        None => return Err(MarshalError::MissingField(field.name.clone())),
                        Some(v) => self.unmarshal(v, &field.ty)?,
                    };
                    out.insert(field.name.clone(), value);
                }
                Ok(Value::Object(out))
            }
            (Type::Interface(interface), JsonValue::Number(n)) => match n.as_u64() {
                Some(handle) => Ok(Value::Remote(self.handles.object_for(handle, interface)?)),
                None => Err(mismatch_named("handle id", "number")),
            },
            (Type::Function(..) | Type::Promise(_) | Type::Stream(_), _) => {
                Err(MarshalError::Unsupported(ty.to_string()))
            }
            _ => Err(mismatch(ty, json_kind(wire))),
        }
    }

    /// Positional arguments to a wire object keyed by parameter name. Absent or null optional
    /// arguments are omitted.
    pub fn marshal_arguments(
        &self,
        args: &[Value],
        params: &[Parameter],
    ) -> Result<JsonValue, MarshalError> {
        if args.len() > params.len() {
            return Err(MarshalError::TooManyArguments {
                expected: params.len(),
                found: args.len(),
            });
        }
        let mut out = Map::new();
        for (i, param) in params.iter().enumerate() {
            match args.get(i) {
                None | Some(Value::Null) if param.optional => {}
                None => return Err(MarshalError::MissingArgument(param.name.clone())),
                Some(arg) => {
                    out.insert(param.name.clone(), self.marshal(arg, &param.ty)?);
                }
            }
        }
        Ok(JsonValue::Object(out))
    }

    /// The inverse of [`Marshaller::marshal_arguments`]; absent optional arguments come back as
    /// [`Value::Null`].
    pub fn unmarshal_arguments(
        &self,
        wire: &JsonValue,
        params: &[Parameter],
    ) -> Result<Vec<Value>, MarshalError> {
        let JsonValue::Object(values) = wire else {
            return Err(mismatch_named("argument object", json_kind(wire)));
        };
        params
            .iter()
            .map(|param| match values.get(&param.name) {
                None | Some(JsonValue::Null) if param.optional => Ok(Value::Null),
                None => Err(MarshalError::MissingArgument(param.name.clone())),
                Some(v) => self.unmarshal(v, &param.ty),
            })
            .collect()
    }

    fn resolve(&self, alias: &str) -> Result<Type, MarshalError> {
        self.types
            .alias(alias)
            .ok_or_else(|| MarshalError::UnknownAlias(alias.to_string()))
    }
}

fn marshal_primitive(
    primitive: Primitive,
    value: &Value,
    ty: &Type,
) -> Result<JsonValue, MarshalError> {
    match (primitive, value) {
        (Primitive::Any, _) => marshal_any(value),
        (Primitive::Void, Value::Null) => Ok(JsonValue::Null),
        (Primitive::String, Value::String(s)) => Ok(JsonValue::String(s.clone())),
        (Primitive::Number, Value::Number(n)) => number_to_wire(*n),
        (Primitive::Boolean, Value::Bool(b)) => Ok(JsonValue::Bool(*b)),
        (Primitive::Date, Value::Date(d)) => Ok(JsonValue::String(d.to_rfc3339())),
        (Primitive::Buffer, Value::Buffer(b)) => Ok(JsonValue::String(STANDARD.encode(b))),
        _ => Err(mismatch(ty, value.kind())),
    }
}

fn unmarshal_primitive(
    primitive: Primitive,
    wire: &JsonValue,
    ty: &Type,
) -> Result<Value, MarshalError> {
    match (primitive, wire) {
        (Primitive::Any, _) => Ok(unmarshal_any(wire)),
        // Whatever comes back from a void call is dropped.
        (Primitive::Void, _) => Ok(Value::Null),
        (Primitive::String, JsonValue::String(s)) => Ok(Value::String(s.clone())),
        (Primitive::Number, JsonValue::Number(n)) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| mismatch(ty, "number")),
        (Primitive::Boolean, JsonValue::Bool(b)) => Ok(Value::Bool(*b)),
        (Primitive::Date, JsonValue::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|d| Value::Date(d.with_timezone(&Utc)))
            .map_err(|_| MarshalError::InvalidDate(s.clone())),
        (Primitive::Buffer, JsonValue::String(s)) => STANDARD
            .decode(s)
            .map(|b| Value::Buffer(Bytes::from(b)))
            .map_err(|e| MarshalError::InvalidBuffer(e.to_string())),
        _ => Err(mismatch(ty, json_kind(wire))),
    }
}

fn number_to_wire(n: f64) -> Result<JsonValue, MarshalError> {
    if !n.is_finite() {
        return Err(MarshalError::InvalidNumber(n));
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Ok(JsonValue::from(n as i64));
    }
    serde_json::Number::from_f64(n)
        .map(JsonValue::Number)
        .ok_or(MarshalError::InvalidNumber(n))
}

/// `any` travels structurally, so only JSON-shaped values fit.
fn marshal_any(value: &Value) -> Result<JsonValue, MarshalError> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Bool(b) => Ok(JsonValue::Bool(*b)),
        Value::Number(n) => number_to_wire(*n),
        Value::String(s) => Ok(JsonValue::String(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(marshal_any)
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| Ok((k.clone(), marshal_any(v)?)))
            .collect::<Result<Map<_, _>, MarshalError>>()
            .map(JsonValue::Object),
        Value::Date(_) | Value::Buffer(_) | Value::Map(_) | Value::Remote(_) => Err(
            MarshalError::Unsupported(format!("{} inside `any`", value.kind())),
        ),
    }
}

fn unmarshal_any(wire: &JsonValue) -> Value {
    match wire {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Array(items) => Value::Array(items.iter().map(unmarshal_any).collect()),
        JsonValue::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), unmarshal_any(v)))
                .collect(),
        ),
    }
}

fn json_kind(wire: &JsonValue) -> &'static str {
    match wire {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

fn mismatch(ty: &Type, found: &'static str) -> MarshalError {
    mismatch_named(&ty.to_string(), found)
}

fn mismatch_named(expected: &str, found: &'static str) -> MarshalError {
    MarshalError::TypeMismatch {
        expected: expected.to_string(),
        found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HandleError;
    use crate::proxy::Hooks;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use skein_compiler::{generate, parse_definition};
    use test_case::test_case;

    /// Resolver for tests that never see remote objects.
    struct NoHandles;

    impl HandleResolver for NoHandles {
        fn handle_for(&self, _object: &Arc<RemoteObject>) -> Result<HandleId, MarshalError> {
            Err(HandleError::Unbound.into())
        }

        fn object_for(
            &self,
            _handle: HandleId,
            interface: &str,
        ) -> Result<Arc<RemoteObject>, MarshalError> {
            Err(MarshalError::UnknownInterface(interface.to_string()))
        }
    }

    fn types(source: &str) -> TypeRegistry {
        let definition = parse_definition("/defs/Types.def", source).unwrap();
        let unit = generate("Types", true, &definition).unwrap();
        let registry = TypeRegistry::new();
        registry.register(&unit, &Hooks::default()).unwrap();
        registry
    }

    fn round_trip(marshaller: &Marshaller, value: &Value, ty: &Type) -> (JsonValue, Value) {
        let wire = marshaller.marshal(value, ty).unwrap();
        let back = marshaller.unmarshal(&wire, ty).unwrap();
        (wire, back)
    }

    #[test]
    fn test_numbers() {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);
        assert_eq!(m.marshal(&Value::from(5), &Type::number()).unwrap(), json!(5));
        assert_eq!(m.marshal(&Value::from(2.5), &Type::number()).unwrap(), json!(2.5));
        assert!(matches!(
            m.marshal(&Value::from(f64::NAN), &Type::number()),
            Err(MarshalError::InvalidNumber(_))
        ));
        assert_eq!(m.unmarshal(&json!(7), &Type::number()).unwrap(), Value::from(7));
    }

    #[test_case(Value::from("x"), Type::number(); "string as number")]
    #[test_case(Value::from(1), Type::string(); "number as string")]
    #[test_case(Value::Null, Type::boolean(); "null for non-nullable")]
    #[test_case(Value::from(true), Type::array(Type::boolean()); "scalar as array")]
    fn test_marshal_mismatch(value: Value, ty: Type) {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);
        assert!(matches!(
            m.marshal(&value, &ty),
            Err(MarshalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_nullable() {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);
        let ty = Type::nullable(Type::string());
        assert_eq!(round_trip(&m, &Value::Null, &ty), (json!(null), Value::Null));
        assert_eq!(
            round_trip(&m, &Value::from("a"), &ty),
            (json!("a"), Value::from("a"))
        );
    }

    #[test]
    fn test_date_and_buffer() {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);

        let when = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let ty = Type::Primitive(Primitive::Date);
        let (wire, back) = round_trip(&m, &Value::Date(when), &ty);
        assert_eq!(wire, json!("2024-03-01T12:30:00+00:00"));
        assert_eq!(back, Value::Date(when));

        let ty = Type::Primitive(Primitive::Buffer);
        let (wire, back) = round_trip(&m, &Value::Buffer(Bytes::from_static(b"hi")), &ty);
        assert_eq!(wire, json!("aGk="));
        assert_eq!(back, Value::Buffer(Bytes::from_static(b"hi")));

        assert!(matches!(
            m.unmarshal(&json!("yesterday"), &Type::Primitive(Primitive::Date)),
            Err(MarshalError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_map_travels_as_pairs() {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);
        let ty = Type::map(Type::string(), Type::number());
        let value = Value::map([
            (Value::from("b"), Value::from(2)),
            (Value::from("a"), Value::from(1)),
        ]);
        let (wire, back) = round_trip(&m, &value, &ty);
        assert_eq!(wire, json!([["b", 2], ["a", 1]]));
        assert_eq!(back, value);

        assert!(matches!(
            m.unmarshal(&json!([["a"]]), &ty),
            Err(MarshalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_set_travels_as_array() {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);
        let ty = Type::Set(Box::new(Type::string()));
        let value = Value::Array(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(round_trip(&m, &value, &ty), (json!(["a", "b"]), value));
    }

    #[test]
    fn test_object_records_through_alias() {
        let registry = types(
            r#"
            type Entry = { path: string, size?: number, children: Array<Entry2> };
            type Entry2 = { path: string };
            "#,
        );
        let m = Marshaller::new(&registry, &NoHandles);
        let ty = Type::Named("Entry".to_string());

        let value = Value::object([
            ("path", Value::from("/tmp")),
            ("size", Value::Null),
            (
                "children",
                Value::Array(vec![Value::object([("path", Value::from("/tmp/a"))])]),
            ),
        ]);
        let (wire, back) = round_trip(&m, &value, &ty);
        assert_eq!(
            wire,
            json!({"path": "/tmp", "children": [{"path": "/tmp/a"}]})
        );
        assert_eq!(back, value);

        let missing = Value::object([("size", Value::from(1))]);
        assert_eq!(
            m.marshal(&missing, &ty).unwrap_err(),
            MarshalError::MissingField("path".to_string())
        );
    }

    #[test]
    fn test_unknown_alias() {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);
        assert_eq!(
            m.marshal(&Value::Null, &Type::Named("Nope".to_string()))
                .unwrap_err(),
            MarshalError::UnknownAlias("Nope".to_string())
        );
    }

    #[test]
    fn test_any_is_structural() {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);
        let value = Value::object([(
            "list",
            Value::Array(vec![Value::from(1), Value::from("two"), Value::Null]),
        )]);
        let (wire, back) = round_trip(&m, &value, &Type::any());
        assert_eq!(wire, json!({"list": [1, "two", null]}));
        assert_eq!(back, value);

        assert!(matches!(
            m.marshal(&Value::Buffer(Bytes::new()), &Type::any()),
            Err(MarshalError::Unsupported(_))
        ));
    }

    #[test]
    fn test_call_shapes_are_never_payload() {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);
        assert!(matches!(
            m.marshal(&Value::Null, &Type::promise(Type::string())),
            Err(MarshalError::Unsupported(_))
        ));
        assert!(matches!(
            m.unmarshal(&json!(null), &Type::stream(Type::string())),
            Err(MarshalError::Unsupported(_))
        ));
    }

    #[test]
    fn test_interface_errors_come_from_resolver() {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);
        assert_eq!(
            m.unmarshal(&json!(3), &Type::Interface("Foo".to_string()))
                .unwrap_err(),
            MarshalError::UnknownInterface("Foo".to_string())
        );
        assert!(matches!(
            m.unmarshal(&json!("3"), &Type::Interface("Foo".to_string())),
            Err(MarshalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_arguments() {
        let registry = TypeRegistry::new();
        let m = Marshaller::new(&registry, &NoHandles);
        let params = vec![
            Parameter::new("path", Type::string()),
            Parameter::optional("limit", Type::number()),
        ];

        let wire = m.marshal_arguments(&[Value::from("/a")], &params).unwrap();
        assert_eq!(wire, json!({"path": "/a"}));
        assert_eq!(
            m.unmarshal_arguments(&wire, &params).unwrap(),
            vec![Value::from("/a"), Value::Null]
        );

        let wire = m
            .marshal_arguments(&[Value::from("/a"), Value::from(10)], &params)
            .unwrap();
        assert_eq!(wire, json!({"path": "/a", "limit": 10}));

        assert_eq!(
            m.marshal_arguments(&[], &params).unwrap_err(),
            MarshalError::MissingArgument("path".to_string())
        );
        assert_eq!(
            m.marshal_arguments(
                &[Value::from("/a"), Value::from(1), Value::from(2)],
                &params
            )
            .unwrap_err(),
            MarshalError::TooManyArguments {
                expected: 2,
                found: 3,
            }
        );
        assert!(matches!(
            m.unmarshal_arguments(&json!([1]), &params),
            Err(MarshalError::TypeMismatch { .. })
        ));
    }
}

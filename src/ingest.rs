//! Entity Ingestor - raw JSON to canonical entity records.
//!
//! Accepts a single entity object or an array of them. Each entity needs a
//! `name` and a `properties` collection. Property values are either sample
//! values (the JSON type decides the declared type), type expressions such as
//! `"string"` or `"number[]"`, or explicit `{"type": .., "nullable": ..}`
//! descriptors. Nested objects become inline entities of their own.

use heck::ToPascalCase;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

use crate::entity::{Cardinality, DeclaredType, Entity, Property, Relationship, TypeExpr};
use crate::error::{ErrorKind, Kinded};
use crate::naming::{member_identifier, normalize_identifier, pluralize};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Malformed entity schema: {0}")]
    Malformed(String),

    #[error("Duplicate property '{property}' in entity '{entity}': '{first}' and '{second}' normalize to the same name")]
    DuplicateProperty {
        entity: String,
        property: String,
        first: String,
        second: String,
    },
}

impl Kinded for SchemaError {
    fn kind(&self) -> ErrorKind {
        match self {
            SchemaError::Malformed(_) => ErrorKind::Malformed,
            SchemaError::DuplicateProperty { .. } => ErrorKind::DuplicateProperty,
        }
    }
}

/// Parse raw JSON text into canonical entities.
pub fn parse(raw: &str) -> Result<Vec<Entity>, SchemaError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| SchemaError::Malformed(format!("invalid JSON: {e}")))?;
    parse_value(&value)
}

/// Parse raw JSON text, then apply explicit type overrides.
pub fn parse_with_overrides(raw: &str, overrides: &[Override]) -> Result<Vec<Entity>, SchemaError> {
    let mut entities = parse(raw)?;
    apply_overrides(&mut entities, overrides)?;
    Ok(entities)
}

/// Parse an already-decoded JSON document.
pub fn parse_value(value: &Value) -> Result<Vec<Entity>, SchemaError> {
    let records: Vec<&Map<String, Value>> = match value {
        Value::Object(map) => vec![map],
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_object().ok_or_else(|| {
                    SchemaError::Malformed(format!("element {i} is not an entity object"))
                })
            })
            .collect::<Result<_, _>>()?,
        other => {
            return Err(SchemaError::Malformed(format!(
                "expected an entity object or an array of entity objects, found {}",
                json_type_name(other)
            )))
        }
    };

    let mut entities = Vec::new();
    for record in records {
        ingest_record(record, &mut entities)?;
    }
    reject_duplicate_entities(&entities)?;

    debug!(entities = entities.len(), "ingested entity schema");
    Ok(entities)
}

/// Entity names, nested ones included, are unique within one document.
fn reject_duplicate_entities(entities: &[Entity]) -> Result<(), SchemaError> {
    let mut seen = HashSet::with_capacity(entities.len());
    for entity in entities {
        if !seen.insert(entity.name.as_str()) {
            return Err(SchemaError::Malformed(format!(
                "entity '{}' is defined more than once",
                entity.name
            )));
        }
    }
    Ok(())
}

fn ingest_record(record: &Map<String, Value>, out: &mut Vec<Entity>) -> Result<(), SchemaError> {
    let raw_name = record
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| SchemaError::Malformed("entity is missing a string 'name'".into()))?;
    let name = normalize_identifier(raw_name)
        .ok_or_else(|| SchemaError::Malformed(format!("entity name '{raw_name}' is not an identifier")))?;

    let fields = match record.get("properties") {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<_>>(),
        Some(Value::Array(items)) => descriptor_list(&name, items)?,
        Some(other) => {
            return Err(SchemaError::Malformed(format!(
                "entity '{name}': 'properties' must be an object or array, found {}",
                json_type_name(other)
            )))
        }
        None => {
            return Err(SchemaError::Malformed(format!(
                "entity '{name}' is missing a 'properties' collection"
            )))
        }
    };

    let mut nested = Vec::new();
    let properties = ingest_fields(&name, &fields, &mut nested)?;
    let relationships = ingest_relationships(&name, record.get("relationships"))?;

    out.push(Entity {
        name,
        properties,
        relationships,
    });
    out.extend(nested);
    Ok(())
}

/// Array-form properties: `[{"name": "id", "type": "string", "nullable": false}]`.
/// Rewritten into (name, descriptor) pairs so both forms share one path.
fn descriptor_list(entity: &str, items: &[Value]) -> Result<Vec<(String, Value)>, SchemaError> {
    items
        .iter()
        .map(|item| {
            let obj = item.as_object().ok_or_else(|| {
                SchemaError::Malformed(format!("entity '{entity}': property entries must be objects"))
            })?;
            let name = obj.get("name").and_then(Value::as_str).ok_or_else(|| {
                SchemaError::Malformed(format!("entity '{entity}': property entry without a name"))
            })?;
            // canonical records keep the original JSON key in `wire`
            let key = match obj.get("wire") {
                None => name,
                Some(Value::String(wire)) => wire.as_str(),
                Some(_) => {
                    return Err(SchemaError::Malformed(format!(
                        "entity '{entity}': property '{name}' has a non-string 'wire'"
                    )))
                }
            };
            let mut descriptor = Map::new();
            match obj.get("type").and_then(Value::as_str) {
                Some(ty) if ty.parse::<TypeExpr>().is_ok() => {
                    descriptor.insert("type".into(), Value::from(ty));
                }
                _ => {
                    return Err(SchemaError::Malformed(format!(
                        "entity '{entity}': property '{name}' needs a type expression in 'type'"
                    )))
                }
            }
            match obj.get("nullable") {
                None => {}
                Some(flag @ Value::Bool(_)) => {
                    descriptor.insert("nullable".into(), flag.clone());
                }
                Some(_) => {
                    return Err(SchemaError::Malformed(format!(
                        "entity '{entity}': property '{name}' has a non-boolean 'nullable'"
                    )))
                }
            }
            Ok((key.to_string(), Value::Object(descriptor)))
        })
        .collect()
}

fn ingest_fields(
    entity: &str,
    fields: &[(String, Value)],
    nested: &mut Vec<Entity>,
) -> Result<Vec<Property>, SchemaError> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut properties = Vec::with_capacity(fields.len());

    for (raw, value) in fields {
        let name = normalize_identifier(raw).ok_or_else(|| {
            SchemaError::Malformed(format!("entity '{entity}': property name '{raw}' is not an identifier"))
        })?;
        if let Some(first) = seen.insert(name.clone(), raw.as_str()) {
            return Err(SchemaError::DuplicateProperty {
                entity: entity.to_string(),
                property: name,
                first: first.to_string(),
                second: raw.clone(),
            });
        }

        let (declared_type, nullable) = infer(entity, &name, value, nested)?;
        properties.push(Property {
            wire: (name != *raw).then(|| raw.clone()),
            name,
            declared_type,
            nullable,
        });
    }

    Ok(properties)
}

/// Declared type for one field value, by fixed precedence of its JSON type.
fn infer(
    entity: &str,
    property: &str,
    value: &Value,
    nested: &mut Vec<Entity>,
) -> Result<(DeclaredType, bool), SchemaError> {
    match value {
        Value::Null => Ok((DeclaredType::Unknown, true)),
        Value::Bool(_) => Ok((DeclaredType::Boolean, false)),
        Value::Number(_) => Ok((DeclaredType::Numeric, false)),
        Value::String(s) => Ok(match s.parse::<TypeExpr>() {
            Ok(expr) => (expr.declared, expr.nullable),
            Err(()) => (DeclaredType::String, false),
        }),
        Value::Array(items) => {
            let element = infer_element(entity, property, items, nested)?;
            Ok((DeclaredType::repeated(element), false))
        }
        Value::Object(map) => {
            if let Some(explicit) = as_descriptor(map) {
                return Ok(explicit);
            }
            let name = nested_entity(entity, property, map, nested)?;
            Ok((DeclaredType::Entity(name), false))
        }
    }
}

fn infer_element(
    entity: &str,
    property: &str,
    items: &[Value],
    nested: &mut Vec<Entity>,
) -> Result<DeclaredType, SchemaError> {
    let mut samples = items.iter().filter(|v| !v.is_null());
    let Some(first) = samples.next() else {
        return Ok(DeclaredType::Unknown);
    };

    if let Value::Object(map) = first {
        if samples.any(|v| !v.is_object()) {
            return Ok(DeclaredType::Unknown);
        }
        if let Some((declared, _)) = as_descriptor(map) {
            return Ok(declared);
        }
        let name = nested_entity(entity, property, map, nested)?;
        return Ok(DeclaredType::Entity(name));
    }

    // Scalars and arrays: every element must agree. Only the first sample
    // contributes nested entities; later ones are inferred for comparison.
    let mut first_nested = Vec::new();
    let (element, _) = infer(entity, property, first, &mut first_nested)?;
    for sample in samples {
        let (other, _) = infer(entity, property, sample, &mut Vec::new())?;
        if other != element {
            return Ok(DeclaredType::Unknown);
        }
    }
    nested.extend(first_nested);
    Ok(element)
}

/// `{"type": "<expr>", "nullable": bool}` with no other keys.
fn as_descriptor(map: &Map<String, Value>) -> Option<(DeclaredType, bool)> {
    if map.keys().any(|k| k != "type" && k != "nullable") {
        return None;
    }
    let expr: TypeExpr = map.get("type")?.as_str()?.parse().ok()?;
    let nullable = match map.get("nullable") {
        None => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return None,
    };
    Some((expr.declared, expr.nullable || nullable))
}

fn nested_entity(
    parent: &str,
    property: &str,
    map: &Map<String, Value>,
    nested: &mut Vec<Entity>,
) -> Result<String, SchemaError> {
    let name = format!("{parent}{}", property.to_pascal_case());
    let fields: Vec<(String, Value)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

    let mut descendants = Vec::new();
    let properties = ingest_fields(&name, &fields, &mut descendants)?;
    nested.push(Entity {
        name: name.clone(),
        properties,
        relationships: Vec::new(),
    });
    nested.extend(descendants);
    Ok(name)
}

fn ingest_relationships(entity: &str, value: Option<&Value>) -> Result<Vec<Relationship>, SchemaError> {
    let items = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(SchemaError::Malformed(format!(
                "entity '{entity}': 'relationships' must be an array, found {}",
                json_type_name(other)
            )))
        }
    };

    items
        .iter()
        .map(|item| match item {
            Value::String(target) => {
                let target = relationship_target(entity, target)?;
                Ok(Relationship {
                    name: member_identifier(&target),
                    target,
                    cardinality: Cardinality::One,
                })
            }
            Value::Object(obj) => {
                let target = obj.get("target").and_then(Value::as_str).ok_or_else(|| {
                    SchemaError::Malformed(format!("entity '{entity}': relationship without a 'target'"))
                })?;
                let target = relationship_target(entity, target)?;
                let cardinality = match obj.get("cardinality").and_then(Value::as_str) {
                    None | Some("one") => Cardinality::One,
                    Some("many") => Cardinality::Many,
                    Some(other) => {
                        return Err(SchemaError::Malformed(format!(
                            "entity '{entity}': unknown cardinality '{other}'"
                        )))
                    }
                };
                let name = match obj.get("name").and_then(Value::as_str) {
                    Some(raw) => normalize_identifier(raw).ok_or_else(|| {
                        SchemaError::Malformed(format!(
                            "entity '{entity}': relationship name '{raw}' is not an identifier"
                        ))
                    })?,
                    None if cardinality == Cardinality::Many => member_identifier(&pluralize(&target)),
                    None => member_identifier(&target),
                };
                Ok(Relationship {
                    name,
                    target,
                    cardinality,
                })
            }
            other => Err(SchemaError::Malformed(format!(
                "entity '{entity}': relationship must be a string or object, found {}",
                json_type_name(other)
            ))),
        })
        .collect()
}

fn relationship_target(entity: &str, raw: &str) -> Result<String, SchemaError> {
    normalize_identifier(raw).ok_or_else(|| {
        SchemaError::Malformed(format!("entity '{entity}': relationship target '{raw}' is not an identifier"))
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Explicit type correction for one property: `Entity.property=type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub entity: String,
    pub property: String,
    pub expr: TypeExpr,
}

impl FromStr for Override {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, ty) = s
            .split_once('=')
            .ok_or_else(|| format!("override '{s}' must look like Entity.property=type"))?;
        let (entity, property) = target
            .split_once('.')
            .ok_or_else(|| format!("override target '{target}' must look like Entity.property"))?;
        let entity = normalize_identifier(entity).ok_or_else(|| format!("bad entity in override '{s}'"))?;
        let property =
            normalize_identifier(property).ok_or_else(|| format!("bad property in override '{s}'"))?;
        let expr = ty
            .parse::<TypeExpr>()
            .map_err(|()| format!("'{ty}' is not a type expression"))?;
        Ok(Override {
            entity,
            property,
            expr,
        })
    }
}

/// Apply overrides in order. The override replaces the declared type; the
/// property stays nullable if it already was.
pub fn apply_overrides(entities: &mut [Entity], overrides: &[Override]) -> Result<(), SchemaError> {
    for ov in overrides {
        let entity = entities
            .iter_mut()
            .find(|e| e.name == ov.entity)
            .ok_or_else(|| SchemaError::Malformed(format!("override names unknown entity '{}'", ov.entity)))?;
        let property = entity
            .properties
            .iter_mut()
            .find(|p| p.name == ov.property)
            .ok_or_else(|| {
                SchemaError::Malformed(format!(
                    "override names unknown property '{}.{}'",
                    ov.entity, ov.property
                ))
            })?;
        debug!(entity = %ov.entity, property = %ov.property, to = %ov.expr.declared, "applying type override");
        property.declared_type = ov.expr.declared.clone();
        property.nullable = property.nullable || ov.expr.nullable;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_keywords_declare_types() {
        let entities = parse(r#"{"name":"User","properties":{"id":"string","age":"number"}}"#).unwrap();
        assert_eq!(entities.len(), 1);
        let user = &entities[0];
        assert_eq!(user.name, "User");
        assert_eq!(user.properties[0].declared_type, DeclaredType::String);
        assert_eq!(user.properties[1].declared_type, DeclaredType::Numeric);
    }

    #[test]
    fn test_sample_values_infer_types() {
        let value = json!({
            "name": "Order",
            "properties": {
                "reference": "ORD-1",
                "total": 12.5,
                "paid": true,
                "note": null,
                "tags": ["a", "b"],
                "mixed": [1, "x"],
                "empty": []
            }
        });
        let entities = parse_value(&value).unwrap();
        let order = &entities[0];
        let ty = |n: &str| order.property(n).unwrap().declared_type.clone();

        assert_eq!(ty("reference"), DeclaredType::String);
        assert_eq!(ty("total"), DeclaredType::Numeric);
        assert_eq!(ty("paid"), DeclaredType::Boolean);
        assert_eq!(ty("note"), DeclaredType::Unknown);
        assert!(order.property("note").unwrap().nullable);
        assert_eq!(ty("tags"), DeclaredType::repeated(DeclaredType::String));
        assert_eq!(ty("mixed"), DeclaredType::repeated(DeclaredType::Unknown));
        assert_eq!(ty("empty"), DeclaredType::repeated(DeclaredType::Unknown));
    }

    #[test]
    fn test_nested_objects_become_entities() {
        let value = json!({
            "name": "User",
            "properties": {
                "address": {"street": "Main", "geo": {"lat": 1.0, "lng": 2.0}},
                "phones": [{"number": "555"}]
            }
        });
        let entities = parse_value(&value).unwrap();
        let names: Vec<_> = entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["User", "UserAddress", "UserAddressGeo", "UserPhones"]);

        let user = &entities[0];
        assert_eq!(
            user.property("address").unwrap().declared_type,
            DeclaredType::Entity("UserAddress".into())
        );
        assert_eq!(
            user.property("phones").unwrap().declared_type,
            DeclaredType::repeated(DeclaredType::Entity("UserPhones".into()))
        );
    }

    #[test]
    fn test_nested_arrays_infer_entities_once() {
        let value = json!({
            "name": "User",
            "properties": {"matrix": [[{"a": 1}], [{"a": 2}]]}
        });
        let entities = parse_value(&value).unwrap();
        let names: Vec<_> = entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["User", "UserMatrix"]);
        assert_eq!(
            entities[0].property("matrix").unwrap().declared_type,
            DeclaredType::repeated(DeclaredType::repeated(DeclaredType::Entity("UserMatrix".into())))
        );
        assert!(crate::builder::build(&entities, "acme").is_ok());
    }

    #[test]
    fn test_duplicate_entities_rejected() {
        let err = parse(r#"[{"name":"User","properties":{}},{"name":"User","properties":{"id":"string"}}]"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert!(err.to_string().contains("'User'"));

        // a nested entity colliding with a declared one
        let err = parse(
            r#"[{"name":"User","properties":{"address":{"city":"x"}}},{"name":"UserAddress","properties":{}}]"#,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert!(err.to_string().contains("UserAddress"));
    }

    #[test]
    fn test_wire_name_kept_when_normalized() {
        let user = &parse(r#"{"name":"User","properties":{"e-mail":"string","id":"string"}}"#).unwrap()[0];
        let email = user.property("e_mail").unwrap();
        assert_eq!(email.wire.as_deref(), Some("e-mail"));
        assert_eq!(email.wire_name(), "e-mail");
        assert_eq!(user.property("id").unwrap().wire, None);
        assert_eq!(user.property("id").unwrap().wire_name(), "id");
    }

    #[test]
    fn test_descriptor_is_not_nested_entity() {
        let value = json!({
            "name": "User",
            "properties": {
                "nickname": {"type": "string", "nullable": true},
                "kind": {"type": "admin"}
            }
        });
        let entities = parse_value(&value).unwrap();
        let user = &entities[0];
        let nickname = user.property("nickname").unwrap();
        assert_eq!(nickname.declared_type, DeclaredType::String);
        assert!(nickname.nullable);
        // "admin" is not a type expression, so this is a nested record
        assert_eq!(
            user.property("kind").unwrap().declared_type,
            DeclaredType::Entity("UserKind".into())
        );
    }

    #[test]
    fn test_duplicate_after_normalization() {
        let err = parse(r#"{"name":"User","properties":{"first name":"string","first-name":"string"}}"#)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateProperty);
        assert!(err.to_string().contains("first_name"));
    }

    #[test]
    fn test_malformed_inputs() {
        for raw in [
            "not json",
            "42",
            r#"["User"]"#,
            r#"{"properties":{}}"#,
            r#"{"name":"User"}"#,
            r#"{"name":"User","properties":"id"}"#,
            r#"{"name":"$$","properties":{}}"#,
            r#"{"name":"User","properties":{"$":"string"}}"#,
            r#"{"name":"User","properties":{},"relationships":{"target":"Post"}}"#,
            r#"{"name":"User","properties":{},"relationships":[{"target":"Post","cardinality":"lots"}]}"#,
        ] {
            let err = parse(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Malformed, "input: {raw}");
        }
    }

    #[test]
    fn test_relationships() {
        let value = json!({
            "name": "User",
            "properties": {},
            "relationships": ["Team", {"target": "Post", "cardinality": "many"}]
        });
        let user = &parse_value(&value).unwrap()[0];
        assert_eq!(user.relationships[0].name, "team");
        assert_eq!(user.relationships[0].cardinality, Cardinality::One);
        assert_eq!(user.relationships[1].name, "posts");
        assert_eq!(user.relationships[1].cardinality, Cardinality::Many);
    }

    #[test]
    fn test_array_form_properties() {
        let value = json!({
            "name": "User",
            "properties": [
                {"name": "id", "type": "string"},
                {"name": "score", "type": "number", "nullable": true}
            ]
        });
        let user = &parse_value(&value).unwrap()[0];
        assert_eq!(user.properties.len(), 2);
        assert!(user.property("score").unwrap().nullable);
    }

    #[test]
    fn test_override_resolves_unknown() {
        let ov: Override = "User.nickname=string".parse().unwrap();
        let entities = parse_with_overrides(r#"{"name":"User","properties":{"nickname":null}}"#, &[ov]).unwrap();
        let nickname = entities[0].property("nickname").unwrap();
        assert_eq!(nickname.declared_type, DeclaredType::String);
        assert!(nickname.nullable);
    }

    #[test]
    fn test_override_unknown_target() {
        let ov: Override = "User.missing=string".parse().unwrap();
        let err = parse_with_overrides(r#"{"name":"User","properties":{}}"#, &[ov]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);

        assert!("User=string".parse::<Override>().is_err());
        assert!("User.id".parse::<Override>().is_err());
        assert!("User.id=Alice".parse::<Override>().is_err());
    }

    #[test]
    fn test_canonical_form_reingests() {
        let value = json!({
            "name": "User",
            "properties": {"id": "string", "e-mail": "string", "tags": ["x"], "address": {"city": "Paris"}, "n": null},
            "relationships": [{"target": "Team", "cardinality": "many"}]
        });
        let first = parse_value(&value).unwrap();
        let canonical = serde_json::to_value(&first).unwrap();
        let second = parse_value(&canonical).unwrap();
        assert_eq!(first, second);
        assert_eq!(second[0].property("e_mail").unwrap().wire_name(), "e-mail");
    }
}

//! Canonical entity records.
//!
//! Entities serialize to the same document shape the ingestor accepts, so a
//! project's stored entity list can be re-ingested verbatim at build time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared type of a property, as written in a type expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeclaredType {
    String,
    Numeric,
    Boolean,
    /// A `null` sample with no explicit type; needs an override before
    /// renderers without a dynamic type can emit it.
    Unknown,
    Repeated(Box<DeclaredType>),
    /// Inline nested entity, by entity name.
    Entity(String),
}

impl DeclaredType {
    pub fn repeated(inner: DeclaredType) -> Self {
        DeclaredType::Repeated(Box::new(inner))
    }

    /// Innermost element type (through any number of `[]`).
    pub fn element(&self) -> &DeclaredType {
        match self {
            DeclaredType::Repeated(inner) => inner.element(),
            other => other,
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::String => f.write_str("string"),
            DeclaredType::Numeric => f.write_str("number"),
            DeclaredType::Boolean => f.write_str("boolean"),
            DeclaredType::Unknown => f.write_str("unknown"),
            DeclaredType::Repeated(inner) => write!(f, "{inner}[]"),
            DeclaredType::Entity(name) => write!(f, "ref:{name}"),
        }
    }
}

impl From<DeclaredType> for String {
    fn from(value: DeclaredType) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for DeclaredType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.parse::<TypeExpr>() {
            Ok(expr) if !expr.nullable => Ok(expr.declared),
            Ok(_) => Err(format!("nullable marker not allowed here: {value}")),
            Err(()) => Err(format!("not a type expression: {value}")),
        }
    }
}

/// A parsed type expression: a declared type plus an optional trailing `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeExpr {
    pub declared: DeclaredType,
    pub nullable: bool,
}

impl FromStr for TypeExpr {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (body, nullable) = match s.strip_suffix('?') {
            Some(body) => (body, true),
            None => (s, false),
        };
        let declared = parse_declared(body).ok_or(())?;
        Ok(TypeExpr { declared, nullable })
    }
}

fn parse_declared(s: &str) -> Option<DeclaredType> {
    if let Some(inner) = s.strip_suffix("[]") {
        return parse_declared(inner).map(DeclaredType::repeated);
    }
    if let Some(name) = s.strip_prefix("ref:") {
        return crate::naming::normalize_identifier(name).map(DeclaredType::Entity);
    }
    match s {
        "string" | "str" | "text" => Some(DeclaredType::String),
        "number" | "numeric" | "integer" | "int" | "float" | "double" | "decimal" => {
            Some(DeclaredType::Numeric)
        }
        "boolean" | "bool" => Some(DeclaredType::Boolean),
        "unknown" | "null" | "any" => Some(DeclaredType::Unknown),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: DeclaredType,
    #[serde(default)]
    pub nullable: bool,
    /// Original JSON key, kept only when it differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wire: Option<String>,
}

impl Property {
    /// Key the property travels under on the wire.
    pub fn wire_name(&self) -> &str {
        self.wire.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub cardinality: Cardinality,
}

/// A canonical entity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
}

impl Entity {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Entity names this entity depends on, through relationships and
    /// entity-typed properties.
    pub fn referenced_entities(&self) -> impl Iterator<Item = &str> {
        let from_props = self.properties.iter().filter_map(|p| match p.declared_type.element() {
            DeclaredType::Entity(name) => Some(name.as_str()),
            _ => None,
        });
        from_props.chain(self.relationships.iter().map(|r| r.target.as_str()))
    }
}

/// Merge freshly ingested entities into an existing list. An incoming entity
/// replaces a stored one of the same name in place; new names are appended.
pub fn merge_entities(existing: &mut Vec<Entity>, incoming: Vec<Entity>) -> MergeSummary {
    let mut summary = MergeSummary::default();
    for entity in incoming {
        match existing.iter_mut().find(|e| e.name == entity.name) {
            Some(slot) => {
                summary.replaced.push(entity.name.clone());
                *slot = entity;
            }
            None => {
                summary.added.push(entity.name.clone());
                existing.push(entity);
            }
        }
    }
    summary
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub added: Vec<String>,
    pub replaced: Vec<String>,
}

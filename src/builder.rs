//! AOM Builder - canonical entities to a `RootObject` tree.
//!
//! All references are resolved before any node is created, so a failed build
//! never yields a partial tree.

use heck::ToKebabCase;
use std::collections::HashMap;
use tracing::debug;

use crate::aom::{
    ClassPayload, EdgeOrigin, HttpVerb, MethodPayload, MethodReturn, ModelError, NamespacePayload, Node,
    NodeHeader, NodeKind, NodePath, PropertyKind, PropertyPayload, RelationshipEdge, RelationshipTable,
    RootObject,
};
use crate::entity::{Cardinality, DeclaredType, Entity, Relationship};
use crate::naming::{class_identifier, member_identifier, namespace_identifier, route_segment};

/// Namespace used when the project name has no identifier characters.
pub const FALLBACK_NAMESPACE: &str = "Api";

/// Compile entities into an AOM rooted at a namespace derived from
/// `project_namespace`.
pub fn build(entities: &[Entity], project_namespace: &str) -> Result<RootObject, ModelError> {
    let ns_identifier = match namespace_identifier(project_namespace) {
        ns if ns.is_empty() => FALLBACK_NAMESPACE.to_string(),
        ns => ns,
    };
    let ns_path = NodePath::root().child(&ns_identifier);

    let classes = class_map(entities, &ns_path)?;
    resolve_references(entities, &classes)?;

    let mut relationships = RelationshipTable::default();
    let mut class_nodes = Vec::with_capacity(entities.len());
    for entity in entities {
        let node = build_class(entity, &ns_path, &classes, &mut relationships)?;
        class_nodes.push(node);
    }

    let namespace = Node::new(
        NodeHeader::new(ns_identifier.clone(), &NodePath::root()),
        NodeKind::Namespace(NamespacePayload {
            project: project_namespace.to_string(),
        }),
        class_nodes,
    )?;

    debug!(
        namespace = %ns_identifier,
        classes = entities.len(),
        edges = relationships.len(),
        "built object model"
    );
    Ok(RootObject::new(namespace, relationships))
}

/// Entity name -> class identifier, rejecting classes that collide.
fn class_map<'a>(entities: &'a [Entity], ns_path: &NodePath) -> Result<HashMap<&'a str, String>, ModelError> {
    let mut classes = HashMap::with_capacity(entities.len());
    let mut taken: HashMap<String, &str> = HashMap::with_capacity(entities.len());
    for entity in entities {
        let identifier = class_identifier(&entity.name);
        if taken.insert(identifier.clone(), &entity.name).is_some() {
            return Err(ModelError::DuplicateIdentifier {
                scope: ns_path.to_string(),
                identifier,
            });
        }
        classes.insert(entity.name.as_str(), identifier);
    }
    Ok(classes)
}

fn resolve_references(entities: &[Entity], classes: &HashMap<&str, String>) -> Result<(), ModelError> {
    for entity in entities {
        if let Some(target) = entity.referenced_entities().find(|t| !classes.contains_key(t)) {
            return Err(ModelError::UnresolvedReference {
                entity: entity.name.clone(),
                target: target.to_string(),
            });
        }
    }
    Ok(())
}

fn build_class(
    entity: &Entity,
    ns_path: &NodePath,
    classes: &HashMap<&str, String>,
    relationships: &mut RelationshipTable,
) -> Result<Node, ModelError> {
    let class_id = &classes[entity.name.as_str()];
    let class_path = ns_path.child(class_id);
    let route = format!("/{}", route_segment(&entity.name));

    let mut children = Vec::with_capacity(entity.properties.len() + 5 + entity.relationships.len());

    for property in &entity.properties {
        let identifier = member_identifier(&property.name);
        let kind = lower(&property.declared_type, classes);
        if let PropertyKind::Reference(target) = element_kind(&kind) {
            let cardinality = match kind {
                PropertyKind::List(_) => Cardinality::Many,
                _ => Cardinality::One,
            };
            relationships.insert(
                class_id,
                target,
                RelationshipEdge {
                    name: identifier.clone(),
                    cardinality,
                    origin: EdgeOrigin::Property,
                },
            );
        }
        children.push(Node::leaf(
            NodeHeader::new(identifier, &class_path),
            NodeKind::Property(PropertyPayload {
                kind,
                nullable: property.nullable,
                wire_name: property.wire_name().to_string(),
            }),
        ));
    }

    for (identifier, payload) in crud_methods(class_id, &route) {
        children.push(Node::leaf(
            NodeHeader::new(identifier, &class_path),
            NodeKind::Method(payload),
        ));
    }

    for relationship in &entity.relationships {
        let target = &classes[relationship.target.as_str()];
        relationships.insert(
            class_id,
            target,
            RelationshipEdge {
                name: member_identifier(&relationship.name),
                cardinality: relationship.cardinality,
                origin: EdgeOrigin::Relationship,
            },
        );
        let (identifier, payload) = navigation_method(relationship, target, &route);
        children.push(Node::leaf(
            NodeHeader::new(identifier, &class_path),
            NodeKind::Method(payload),
        ));
    }

    Node::new(
        NodeHeader::new(class_id.clone(), ns_path),
        NodeKind::Class(ClassPayload {
            entity: entity.name.clone(),
            route,
        }),
        children,
    )
}

fn lower(declared: &DeclaredType, classes: &HashMap<&str, String>) -> PropertyKind {
    match declared {
        DeclaredType::String => PropertyKind::String,
        DeclaredType::Numeric => PropertyKind::Number,
        DeclaredType::Boolean => PropertyKind::Boolean,
        DeclaredType::Unknown => PropertyKind::Unknown,
        DeclaredType::Repeated(inner) => PropertyKind::List(Box::new(lower(inner, classes))),
        // references were checked before lowering
        DeclaredType::Entity(name) => PropertyKind::Reference(classes[name.as_str()].clone()),
    }
}

fn element_kind(kind: &PropertyKind) -> &PropertyKind {
    match kind {
        PropertyKind::List(inner) => element_kind(inner),
        other => other,
    }
}

fn crud_methods(class_id: &str, route: &str) -> Vec<(String, MethodPayload)> {
    let item_route = format!("{route}/{{id}}");
    let method = |verb, route: &str, returns, takes_id, body: bool| MethodPayload {
        verb,
        route: route.to_string(),
        returns,
        takes_id,
        body: body.then(|| class_id.to_string()),
    };
    vec![
        (
            "list".to_string(),
            method(HttpVerb::Get, route, MethodReturn::Many(class_id.into()), false, false),
        ),
        (
            "get".to_string(),
            method(HttpVerb::Get, &item_route, MethodReturn::One(class_id.into()), true, false),
        ),
        (
            "create".to_string(),
            method(HttpVerb::Post, route, MethodReturn::One(class_id.into()), false, true),
        ),
        (
            "update".to_string(),
            method(HttpVerb::Put, &item_route, MethodReturn::One(class_id.into()), true, true),
        ),
        (
            "delete".to_string(),
            method(HttpVerb::Delete, &item_route, MethodReturn::Nothing, true, false),
        ),
    ]
}

fn navigation_method(relationship: &Relationship, target: &str, route: &str) -> (String, MethodPayload) {
    let rel = member_identifier(&relationship.name);
    let segment = relationship.name.to_kebab_case();
    let (identifier, returns) = match relationship.cardinality {
        Cardinality::Many => (format!("list_{rel}"), MethodReturn::Many(target.to_string())),
        Cardinality::One => (format!("get_{rel}"), MethodReturn::One(target.to_string())),
    };
    (
        identifier,
        MethodPayload {
            verb: HttpVerb::Get,
            route: format!("{route}/{{id}}/{segment}"),
            returns,
            takes_id: true,
            body: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Kinded};
    use crate::ingest::parse_value;
    use serde_json::json;

    fn entities(value: serde_json::Value) -> Vec<Entity> {
        parse_value(&value).unwrap()
    }

    #[test]
    fn test_build_user_class() {
        let input = entities(json!({"name": "User", "properties": {"id": "string", "age": "number"}}));
        let root = build(&input, "acme").unwrap();

        assert_eq!(root.namespace().identifier(), "Acme");
        assert_eq!(root.class_count(), 1);
        let user = root.class("User").unwrap();
        let props: Vec<_> = user.properties().map(|(n, p)| (n.identifier(), p.kind.clone())).collect();
        assert_eq!(
            props,
            vec![("age", PropertyKind::Number), ("id", PropertyKind::String)]
        );
        let methods: Vec<_> = user.methods().map(|(n, _)| n.identifier()).collect();
        assert_eq!(methods, vec!["create", "delete", "get", "list", "update"]);
        assert_eq!(user.path().to_string(), "Acme::User");
    }

    #[test]
    fn test_routes() {
        let input = entities(json!({
            "name": "Category",
            "properties": {},
            "relationships": [{"target": "Category", "name": "children", "cardinality": "many"}]
        }));
        let root = build(&input, "shop").unwrap();
        let class = root.class("Category").unwrap();
        let routes: Vec<_> = class.methods().map(|(n, m)| (n.identifier(), m.route.clone())).collect();
        assert!(routes.contains(&("list".into(), "/categories".into())));
        assert!(routes.contains(&("get".into(), "/categories/{id}".into())));
        assert!(routes.contains(&("list_children".into(), "/categories/{id}/children".into())));
    }

    #[test]
    fn test_relationships_go_to_side_table() {
        let input = entities(json!([
            {"name": "User", "properties": {"address": {"city": "x"}}, "relationships": [{"target": "Post", "cardinality": "many"}]},
            {"name": "Post", "properties": {"title": "string"}, "relationships": ["User"]}
        ]));
        let root = build(&input, "blog").unwrap();

        // mutual references, still a tree
        assert_eq!(root.relationships().between("User", "Post")[0].name, "posts");
        assert_eq!(root.relationships().between("Post", "User")[0].name, "user");
        let address = root.relationships().between("User", "UserAddress");
        assert_eq!(address[0].origin, EdgeOrigin::Property);

        for node in root.walk() {
            if let NodeKind::Class(_) = node.kind() {
                assert_eq!(node.header().parent.segments(), ["Blog".to_string()]);
            }
        }
    }

    #[test]
    fn test_unresolved_reference_is_all_or_nothing() {
        let input = entities(json!([
            {"name": "User", "properties": {"id": "string"}},
            {"name": "Post", "properties": {}, "relationships": ["Author"]}
        ]));
        let err = build(&input, "blog").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedReference);
        assert!(err.to_string().contains("Author"));
    }

    #[test]
    fn test_duplicate_class_identifiers() {
        let input = entities(json!([
            {"name": "user_profile", "properties": {}},
            {"name": "UserProfile", "properties": {}}
        ]));
        let err = build(&input, "acme").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateIdentifier);
    }

    #[test]
    fn test_duplicate_member_identifiers() {
        // distinct wire names, same snake_case identifier
        let input = entities(json!({"name": "User", "properties": {"firstName": "string", "first_name": "string"}}));
        let err = build(&input, "acme").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateIdentifier);

        // property colliding with a generated method
        let input = entities(json!({"name": "User", "properties": {"list": "string"}}));
        assert_eq!(build(&input, "acme").unwrap_err().kind(), ErrorKind::DuplicateIdentifier);
    }

    #[test]
    fn test_wire_names_and_digit_identifiers() {
        let input = entities(json!({"name": "2fa", "properties": {"e-mail": "string", "2nd": "string", "id": "string"}}));
        let root = build(&input, "acme").unwrap();
        let class = root.class("_2fa").unwrap();
        let props: Vec<_> = class
            .properties()
            .map(|(n, p)| (n.identifier().to_string(), p.wire_name.clone()))
            .collect();
        assert_eq!(
            props,
            vec![
                ("_2nd".to_string(), "2nd".to_string()),
                ("e_mail".to_string(), "e-mail".to_string()),
                ("id".to_string(), "id".to_string()),
            ]
        );
    }

    #[test]
    fn test_namespace_fallback() {
        let root = build(&[], "!!!").unwrap();
        assert_eq!(root.namespace().identifier(), FALLBACK_NAMESPACE);
        assert_eq!(root.class_count(), 0);
    }

    #[test]
    fn test_fingerprint_stable() {
        let input = entities(json!({"name": "User", "properties": {"id": "string"}}));
        let a = build(&input, "acme").unwrap().fingerprint().unwrap();
        let b = build(&input, "acme").unwrap().fingerprint().unwrap();
        assert_eq!(a, b);
        let c = build(&input, "other").unwrap().fingerprint().unwrap();
        assert_ne!(a, c);
    }
}

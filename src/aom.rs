//! Abstract Object Model - the language-agnostic build tree.
//!
//! A `RootObject` owns exactly one namespace node. Every node shares a
//! [`NodeHeader`] (identifier plus parent path) and carries a closed
//! [`NodeKind`] payload. Nodes are assembled bottom-up: a node's children
//! exist before the node itself, and there is no API to mutate a node once it
//! is built. Cross-class links live in the [`RelationshipTable`], never in
//! the tree.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;

use crate::entity::Cardinality;
use crate::error::{ErrorKind, Kinded};
use crate::hashing::compute_digest;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Duplicate identifier '{identifier}' in scope '{scope}'")]
    DuplicateIdentifier { scope: String, identifier: String },

    #[error("Unresolved reference from '{entity}' to unknown entity '{target}'")]
    UnresolvedReference { entity: String, target: String },
}

impl Kinded for ModelError {
    fn kind(&self) -> ErrorKind {
        match self {
            ModelError::DuplicateIdentifier { .. } => ErrorKind::DuplicateIdentifier,
            ModelError::UnresolvedReference { .. } => ErrorKind::UnresolvedReference,
        }
    }
}

/// Path of identifiers from the root (exclusive) down to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, identifier: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(identifier.to_string());
        Self(segments)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.0.join("::"))
        }
    }
}

/// Fields shared by every node variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeHeader {
    pub identifier: String,
    pub parent: NodePath,
}

impl NodeHeader {
    pub fn new(identifier: impl Into<String>, parent: &NodePath) -> Self {
        Self {
            identifier: identifier.into(),
            parent: parent.clone(),
        }
    }

    pub fn path(&self) -> NodePath {
        self.parent.child(&self.identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum PropertyKind {
    String,
    Number,
    Boolean,
    Unknown,
    List(Box<PropertyKind>),
    /// Class identifier within the same namespace.
    Reference(String),
}

impl PropertyKind {
    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::String => "string",
            PropertyKind::Number => "number",
            PropertyKind::Boolean => "boolean",
            PropertyKind::Unknown => "unknown",
            PropertyKind::List(_) => "list",
            PropertyKind::Reference(_) => "reference",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::List(inner) => write!(f, "list<{inner}>"),
            PropertyKind::Reference(class) => write!(f, "ref<{class}>"),
            other => f.write_str(other.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Delete => "DELETE",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "class", rename_all = "snake_case")]
pub enum MethodReturn {
    Nothing,
    One(String),
    Many(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespacePayload {
    pub project: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassPayload {
    /// Entity name the class was compiled from.
    pub entity: String,
    /// Collection route, e.g. `/users`.
    pub route: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyPayload {
    pub kind: PropertyKind,
    pub nullable: bool,
    /// Wire name as it appeared in the entity.
    pub wire_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodPayload {
    pub verb: HttpVerb,
    pub route: String,
    pub returns: MethodReturn,
    pub takes_id: bool,
    /// Request body class, for create/update.
    pub body: Option<String>,
}

/// Closed set of node variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    Namespace(NamespacePayload),
    Class(ClassPayload),
    Property(PropertyPayload),
    Method(MethodPayload),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Namespace(_) => "namespace",
            NodeKind::Class(_) => "class",
            NodeKind::Property(_) => "property",
            NodeKind::Method(_) => "method",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    #[serde(flatten)]
    header: NodeHeader,
    #[serde(flatten)]
    kind: NodeKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<Node>,
}

impl Node {
    /// Assemble a node from already-built children.
    ///
    /// Children must have been created with this node's path as their parent,
    /// and their identifiers must be unique among themselves.
    pub fn new(header: NodeHeader, kind: NodeKind, children: Vec<Node>) -> Result<Self, ModelError> {
        let path = header.path();
        let mut seen = HashSet::with_capacity(children.len());
        for child in &children {
            debug_assert_eq!(child.header.parent, path, "child built under a different parent");
            if !seen.insert(child.identifier()) {
                return Err(ModelError::DuplicateIdentifier {
                    scope: path.to_string(),
                    identifier: child.identifier().to_string(),
                });
            }
        }
        Ok(Self {
            header,
            kind,
            children,
        })
    }

    pub fn leaf(header: NodeHeader, kind: NodeKind) -> Self {
        Self {
            header,
            kind,
            children: Vec::new(),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.header.identifier
    }

    pub fn header(&self) -> &NodeHeader {
        &self.header
    }

    pub fn path(&self) -> NodePath {
        self.header.path()
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Children in construction order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Children stable-sorted by identifier; the order every renderer walks.
    pub fn sorted_children(&self) -> Vec<&Node> {
        let mut sorted: Vec<&Node> = self.children.iter().collect();
        sorted.sort_by(|a, b| a.identifier().cmp(b.identifier()));
        sorted
    }

    pub fn properties(&self) -> impl Iterator<Item = (&Node, &PropertyPayload)> {
        self.sorted_children().into_iter().filter_map(|n| match &n.kind {
            NodeKind::Property(p) => Some((n, p)),
            _ => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = (&Node, &MethodPayload)> {
        self.sorted_children().into_iter().filter_map(|n| match &n.kind {
            NodeKind::Method(m) => Some((n, m)),
            _ => None,
        })
    }

    pub fn classes(&self) -> impl Iterator<Item = (&Node, &ClassPayload)> {
        self.sorted_children().into_iter().filter_map(|n| match &n.kind {
            NodeKind::Class(c) => Some((n, c)),
            _ => None,
        })
    }
}

/// How a cross-class edge came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOrigin {
    Relationship,
    Property,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipEdge {
    /// Relationship or property identifier on the source class.
    pub name: String,
    pub cardinality: Cardinality,
    pub origin: EdgeOrigin,
}

/// Side table of class-to-class edges keyed by (source, target) class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelationshipTable {
    #[serde(serialize_with = "serialize_edges")]
    edges: BTreeMap<(String, String), Vec<RelationshipEdge>>,
}

impl RelationshipTable {
    pub fn insert(&mut self, source: &str, target: &str, edge: RelationshipEdge) {
        self.edges
            .entry((source.to_string(), target.to_string()))
            .or_default()
            .push(edge);
    }

    pub fn between(&self, source: &str, target: &str) -> &[RelationshipEdge] {
        self.edges
            .get(&(source.to_string(), target.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Targets reachable from `source`, in target order.
    pub fn targets_of<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .keys()
            .filter(move |(s, _)| s == source)
            .map(|(_, t)| t.as_str())
    }

    pub fn len(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

fn serialize_edges<S: Serializer>(
    edges: &BTreeMap<(String, String), Vec<RelationshipEdge>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Entry<'a> {
        source: &'a str,
        target: &'a str,
        edges: &'a [RelationshipEdge],
    }
    serializer.collect_seq(edges.iter().map(|((source, target), edges)| Entry {
        source,
        target,
        edges,
    }))
}

/// The root of a compiled model. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootObject {
    namespace: Node,
    relationships: RelationshipTable,
}

impl RootObject {
    pub(crate) fn new(namespace: Node, relationships: RelationshipTable) -> Self {
        debug_assert!(matches!(namespace.kind(), NodeKind::Namespace(_)));
        debug_assert!(namespace.header().parent.is_root());
        Self {
            namespace,
            relationships,
        }
    }

    pub fn namespace(&self) -> &Node {
        &self.namespace
    }

    pub fn relationships(&self) -> &RelationshipTable {
        &self.relationships
    }

    pub fn class(&self, identifier: &str) -> Option<&Node> {
        self.namespace
            .children()
            .iter()
            .find(|n| n.identifier() == identifier && matches!(n.kind(), NodeKind::Class(_)))
    }

    pub fn class_count(&self) -> usize {
        self.namespace.classes().count()
    }

    /// Depth-first pre-order walk with siblings sorted by identifier.
    pub fn walk(&self) -> Vec<&Node> {
        fn visit<'a>(node: &'a Node, out: &mut Vec<&'a Node>) {
            out.push(node);
            for child in node.sorted_children() {
                visit(child, out);
            }
        }
        let mut out = Vec::new();
        visit(&self.namespace, &mut out);
        out
    }

    /// SHA-256 over the canonical JSON form of the whole model.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        compute_digest(self)
    }
}

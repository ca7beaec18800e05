//! Syntax tree produced by the DSL parser
//!
//! The tree is deliberately untyped beyond token classes: an `Expression`
//! node holds its head symbol as `children[0]` followed by its arguments, so
//! every domain shares the same shape and vocabulary checks happen later.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SourceLocation;

/// Heads of the legacy attribute forms `(var (attr-id "x"))` and
/// `(bind (attr-id "x") (value ...))`.
const LEGACY_ATTRIBUTE_PARENTS: [&str; 2] = ["var", "bind"];
const LEGACY_ATTRIBUTE_HEAD: &str = "attr-id";

/// Token class of a syntax node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Expression,
    Verb,
    Identifier,
    String,
    Number,
    Boolean,
    AttributeRef,
}

/// Identifier and optional display name carried by `@attr{id:name}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeRef {
    pub id: String,
    pub name: Option<String>,
}

/// A node of the syntax tree. Built only by the parser; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxNode {
    kind: NodeKind,
    value: String,
    location: SourceLocation,
    children: Vec<SyntaxNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attribute: Option<AttributeRef>,
}

impl SyntaxNode {
    pub(crate) fn leaf(kind: NodeKind, value: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            value: value.into(),
            location,
            children: Vec::new(),
            attribute: None,
        }
    }

    pub(crate) fn expression(
        head: SyntaxNode,
        arguments: Vec<SyntaxNode>,
        location: SourceLocation,
    ) -> Self {
        let mut children = Vec::with_capacity(arguments.len() + 1);
        let value = head.value.clone();
        children.push(head);
        children.extend(arguments);
        Self {
            kind: NodeKind::Expression,
            value,
            location,
            children,
            attribute: None,
        }
    }

    pub(crate) fn attribute_ref(
        literal: &str,
        id: &str,
        name: Option<&str>,
        location: SourceLocation,
    ) -> Self {
        Self {
            kind: NodeKind::AttributeRef,
            value: literal.to_string(),
            location,
            children: Vec::new(),
            attribute: Some(AttributeRef {
                id: id.to_string(),
                name: name.map(str::to_string),
            }),
        }
    }

    pub(crate) fn root(children: Vec<SyntaxNode>) -> Self {
        Self {
            kind: NodeKind::Root,
            value: String::new(),
            location: SourceLocation::new(1, 1, 0),
            children,
            attribute: None,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is(&self, kind: NodeKind) -> bool {
        self.kind == kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn location(&self) -> SourceLocation {
        self.location
    }

    pub fn line(&self) -> usize {
        self.location.line
    }

    pub fn column(&self) -> usize {
        self.location.column
    }

    pub fn children(&self) -> &[SyntaxNode] {
        &self.children
    }

    pub fn attribute(&self) -> Option<&AttributeRef> {
        self.attribute.as_ref()
    }

    /// Head symbol of an expression (`Verb` or `Identifier` node).
    pub fn head(&self) -> Option<&SyntaxNode> {
        match self.kind {
            NodeKind::Expression => self.children.first(),
            _ => None,
        }
    }

    /// Arguments of an expression, i.e. everything after the head.
    pub fn arguments(&self) -> &[SyntaxNode] {
        match self.kind {
            NodeKind::Expression if !self.children.is_empty() => &self.children[1..],
            _ => &[],
        }
    }

    /// First nested expression argument whose head is `name`,
    /// e.g. `(cbu.id "X")` inside `(case.create (cbu.id "X"))`.
    pub fn named_argument(&self, name: &str) -> Option<&SyntaxNode> {
        self.arguments()
            .iter()
            .find(|arg| arg.is(NodeKind::Expression) && arg.value == name)
    }

    /// Pre-order walk over this node and all of its descendants.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// JSON view of a literal node; `None` for expressions and the root.
    pub fn literal_value(&self) -> Option<serde_json::Value> {
        match self.kind {
            NodeKind::String | NodeKind::Identifier | NodeKind::Verb => {
                Some(serde_json::Value::String(self.value.clone()))
            }
            NodeKind::Boolean => Some(serde_json::Value::Bool(self.value == "true")),
            NodeKind::Number => {
                if let Ok(i) = self.value.parse::<i64>() {
                    Some(serde_json::Value::from(i))
                } else {
                    self.value
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(serde_json::Value::Number)
                }
            }
            NodeKind::AttributeRef => self
                .attribute
                .as_ref()
                .map(|attr| serde_json::Value::String(attr.id.clone())),
            NodeKind::Expression | NodeKind::Root => None,
        }
    }

    /// Attribute id of this node if it is an attribute in either syntax:
    /// `@attr{id}` or the legacy `(attr-id "id")`.
    fn attribute_id(&self) -> Option<&str> {
        match self.kind {
            NodeKind::AttributeRef => self.attribute.as_ref().map(|a| a.id.as_str()),
            NodeKind::Expression if self.value == LEGACY_ATTRIBUTE_HEAD => self
                .arguments()
                .first()
                .filter(|arg| arg.is(NodeKind::String))
                .map(|arg| arg.value.as_str()),
            _ => None,
        }
    }

    fn is_legacy_attribute_parent(&self) -> bool {
        self.is(NodeKind::Expression) && LEGACY_ATTRIBUTE_PARENTS.contains(&self.value.as_str())
    }
}

/// Iterator returned by [`SyntaxNode::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a SyntaxNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a SyntaxNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// A parsed document. Owns its root exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxTree {
    root: SyntaxNode,
}

impl SyntaxTree {
    pub(crate) fn new(expressions: Vec<SyntaxNode>) -> Self {
        Self {
            root: SyntaxNode::root(expressions),
        }
    }

    pub fn root(&self) -> &SyntaxNode {
        &self.root
    }

    /// Top-level expressions in document order.
    pub fn expressions(&self) -> &[SyntaxNode] {
        self.root.children()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.root.descendants().count()
    }

    /// Every `Verb` node, duplicates included, in document order.
    pub fn verb_nodes(&self) -> impl Iterator<Item = &SyntaxNode> {
        self.root.descendants().filter(|n| n.is(NodeKind::Verb))
    }

    /// Verbs in first-occurrence order, de-duplicated.
    pub fn verbs(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.verb_nodes()
            .filter(|n| seen.insert(n.value()))
            .map(|n| n.value().to_string())
            .collect()
    }

    /// Distinct attribute identifiers in document order, covering both
    /// `@attr{...}` and the legacy `(var (attr-id ...))` / `(bind (attr-id ...) ...)` forms.
    pub fn attribute_ids(&self) -> Vec<String> {
        self.attributes().into_iter().map(|(id, _)| id).collect()
    }

    /// Distinct `(id, name)` pairs. Legacy forms never carry a name; when an
    /// id appears several times the first occurrence wins.
    pub fn attributes(&self) -> Vec<(String, Option<String>)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for node in self.root.descendants() {
            match node.kind {
                NodeKind::AttributeRef => {
                    if let Some(attr) = &node.attribute {
                        if seen.insert(attr.id.clone()) {
                            out.push((attr.id.clone(), attr.name.clone()));
                        }
                    }
                }
                NodeKind::Expression if node.is_legacy_attribute_parent() => {
                    for arg in node.arguments() {
                        if arg.is(NodeKind::Expression) && arg.value == LEGACY_ATTRIBUTE_HEAD {
                            if let Some(id) = arg.attribute_id() {
                                if seen.insert(id.to_string()) {
                                    out.push((id.to_string(), None));
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        out
    }

    /// Attribute values bound in the document via
    /// `(bind @attr{id} (value v))`, `(bind (attr-id "id") (value v))` or
    /// `(bind @attr{id} v)`. Later bindings of the same id win.
    pub fn attribute_bindings(&self) -> Vec<(String, serde_json::Value)> {
        let mut out: Vec<(String, serde_json::Value)> = Vec::new();

        for node in self.root.descendants() {
            if !(node.is(NodeKind::Expression) && node.value == "bind") {
                continue;
            }
            let args = node.arguments();
            let Some(id) = args.first().and_then(SyntaxNode::attribute_id) else {
                continue;
            };
            let value = match args.get(1) {
                Some(v) if v.is(NodeKind::Expression) && v.value == "value" => {
                    v.arguments().first().and_then(SyntaxNode::literal_value)
                }
                Some(v) => v.literal_value(),
                None => None,
            };
            if let Some(value) = value {
                match out.iter_mut().find(|(existing, _)| existing == id) {
                    Some(slot) => slot.1 = value,
                    None => out.push((id.to_string(), value)),
                }
            }
        }

        out
    }
}

//! Deterministic, cycle-safe snapshots of a [`PackageGraph`].
//!
//! [`project_tree`] walks the graph from a root node and produces a
//! [`Snapshot`]: a plain tree of records with every relation collection
//! sorted, so two projections of the same graph compare equal no matter how
//! the graph's hash collections happen to iterate.
//!
//! Containment relations (`children`, filesystem children) and link targets
//! are projected recursively. A node that is already on the current
//! traversal path is emitted as a [`CycleStub`] carrying only its location.
//! The path is popped on return, so a node reached through two unrelated
//! branches (a diamond) is projected in full both times.
//!
//! Dependency edges are never followed. Each edge is reduced to an
//! [`OutboundEdge`] or [`InboundEdge`] naming the neighbour by location.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::graph::{DepType, Edge, EdgeError, InstallError, NodeId, PackageGraph};

/// Spec reported for edges that carry no version range.
pub const ANY_SPEC: &str = "*";

/// The projection of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Snapshot {
    // Variant order matters for deserialization: the most specific shape first.
    Link(LinkSnapshot),
    Plain(NodeSnapshot),
    Cycle(CycleStub),
}

/// Stands in for a node that is its own ancestor on the traversal path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStub {
    pub location: String,
}

/// A link node together with the projection of the node it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    #[serde(flatten)]
    pub node: NodeSnapshot,
    pub target: Box<Snapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub name: String,
    /// Only when the package name differs from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub location: String,
    pub path: String,
    /// Only when it differs from `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub extraneous: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dev: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    /// Never set together with `dev` or `optional`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub dev_optional: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub peer: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bundled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorSnapshot>,
    /// Keyed and ordered by dependency name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outbound_edges: BTreeMap<String, OutboundEdge>,
    /// Ordered by the depending node's location.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbound_edges: Vec<InboundEdge>,
    /// Ordered by path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filesystem_children: Vec<Snapshot>,
    /// Keyed and ordered by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Snapshot>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

/// An [`InstallError`] reduced to what is stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ErrorSnapshot {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl From<&InstallError> for ErrorSnapshot {
    fn from(err: &InstallError) -> Self {
        Self {
            code: err.code.clone(),
            path: err.path.clone().filter(|p| !p.is_empty()),
        }
    }
}

/// Fields shared by both edge directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeFields {
    #[serde(rename = "type")]
    pub kind: DepType,
    pub name: String,
    pub spec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EdgeError>,
}

impl EdgeFields {
    fn from_edge(edge: &Edge) -> Self {
        Self {
            kind: edge.kind,
            name: edge.name.clone(),
            spec: edge
                .spec
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| ANY_SPEC.to_owned()),
            error: edge.error,
        }
    }
}

/// A dependency seen from the depending node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEdge {
    #[serde(flatten)]
    pub edge: EdgeFields,
    /// Location of the node the edge resolved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

/// A dependency seen from the node it resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEdge {
    #[serde(flatten)]
    pub edge: EdgeFields,
    /// Location of the depending node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl OutboundEdge {
    pub fn project(graph: &PackageGraph, edge: &Edge) -> Self {
        Self {
            edge: EdgeFields::from_edge(edge),
            to: edge.to.map(|id| graph.node(id).location.clone()),
        }
    }
}

impl InboundEdge {
    pub fn project(graph: &PackageGraph, edge: &Edge) -> Self {
        Self {
            edge: EdgeFields::from_edge(edge),
            from: edge.from.map(|id| graph.node(id).location.clone()),
        }
    }

    // Full key so edges from the same node still order deterministically.
    fn sort_key(&self) -> (Option<&str>, &str, DepType, &str, Option<EdgeError>) {
        (
            self.from.as_deref(),
            &self.edge.name,
            self.edge.kind,
            &self.edge.spec,
            self.edge.error,
        )
    }
}

/// Which end of an edge is being described.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EdgeSnapshot {
    Outbound(OutboundEdge),
    Inbound(InboundEdge),
}

/// Reduce an edge to a record. Never looks past the neighbour's location.
pub fn project_edge(graph: &PackageGraph, edge: &Edge, direction: Direction) -> EdgeSnapshot {
    match direction {
        Direction::Outbound => EdgeSnapshot::Outbound(OutboundEdge::project(graph, edge)),
        Direction::Inbound => EdgeSnapshot::Inbound(InboundEdge::project(graph, edge)),
    }
}

/// The nodes currently being projected, outermost first.
#[derive(Debug, Default)]
pub struct Ancestors {
    path: Vec<NodeId>,
}

impl Ancestors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity check: a different node with equal content is not an ancestor.
    pub fn contains(&self, id: NodeId) -> bool {
        self.path.contains(&id)
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    fn push(&mut self, id: NodeId) {
        self.path.push(id);
    }

    fn pop(&mut self) {
        self.path.pop();
    }
}

/// Project the tree rooted at `root`.
pub fn project_tree(graph: &PackageGraph, root: NodeId) -> Snapshot {
    let _span = tracing::debug_span!("project_tree", root = %graph.node(root).location).entered();
    let mut ancestors = Ancestors::new();
    let snapshot = project(graph, root, &mut ancestors);
    tracing::debug!(nodes = snapshot.node_count(), "projected tree");
    snapshot
}

/// Project one node, sharing `ancestors` with the caller.
///
/// `ancestors` is left exactly as it was passed in.
pub fn project(graph: &PackageGraph, id: NodeId, ancestors: &mut Ancestors) -> Snapshot {
    let node = graph.node(id);
    if ancestors.contains(id) {
        tracing::trace!(location = %node.location, depth = ancestors.depth(), "cycle");
        return Snapshot::Cycle(CycleStub {
            location: node.location.clone(),
        });
    }

    ancestors.push(id);
    let record = NodeSnapshot::build(graph, id, ancestors);
    let snapshot = match node.link_target {
        Some(target) => Snapshot::Link(LinkSnapshot {
            node: record,
            target: Box::new(project(graph, target, ancestors)),
        }),
        None => Snapshot::Plain(record),
    };
    ancestors.pop();
    snapshot
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl NodeSnapshot {
    fn build(graph: &PackageGraph, id: NodeId, ancestors: &mut Ancestors) -> Self {
        let node = graph.node(id);
        let path = display_path(&node.path);
        let realpath = display_path(&node.realpath);
        let flags = node.flags;

        let outbound_edges = node
            .edges_out
            .iter()
            .map(|(name, &e)| (name.clone(), OutboundEdge::project(graph, graph.edge(e))))
            .collect();

        let mut inbound_edges: Vec<InboundEdge> = node
            .edges_in
            .iter()
            .map(|&e| InboundEdge::project(graph, graph.edge(e)))
            .collect();
        inbound_edges.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let mut fs_children: Vec<(String, &str, NodeId)> = node
            .fs_children
            .iter()
            .map(|&c| {
                let child = graph.node(c);
                (display_path(&child.path), child.location.as_str(), c)
            })
            .collect();
        fs_children.sort_unstable();
        let filesystem_children = fs_children
            .into_iter()
            .map(|(_, _, c)| project(graph, c, ancestors))
            .collect();

        let mut children: Vec<(&String, NodeId)> =
            node.children.iter().map(|(name, &c)| (name, c)).collect();
        children.sort_unstable();
        let children = children
            .into_iter()
            .map(|(name, c)| (name.clone(), project(graph, c, ancestors)))
            .collect();

        Self {
            name: node.name.clone(),
            package_name: node
                .package
                .name
                .clone()
                .filter(|n| !n.is_empty() && *n != node.name),
            version: node.version().filter(|v| !v.is_empty()).map(str::to_owned),
            location: node.location.clone(),
            realpath: (realpath != path).then_some(realpath),
            path,
            resolved: node.resolved.clone(),
            extraneous: flags.extraneous,
            dev: flags.dev,
            optional: flags.optional,
            dev_optional: flags.dev_optional && !flags.dev && !flags.optional,
            peer: flags.peer,
            bundled: flags.in_bundle,
            error: node.error.as_ref().map(ErrorSnapshot::from),
            errors: node.errors.iter().map(ErrorSnapshot::from).collect(),
            outbound_edges,
            inbound_edges,
            filesystem_children,
            children,
        }
    }
}

impl Snapshot {
    pub fn location(&self) -> &str {
        match self {
            Self::Link(link) => &link.node.location,
            Self::Plain(node) => &node.location,
            Self::Cycle(stub) => &stub.location,
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle(_))
    }

    /// The node record, unless this is a cycle stub.
    pub fn as_node(&self) -> Option<&NodeSnapshot> {
        match self {
            Self::Link(link) => Some(&link.node),
            Self::Plain(node) => Some(node),
            Self::Cycle(_) => None,
        }
    }

    pub fn link_target(&self) -> Option<&Snapshot> {
        match self {
            Self::Link(link) => Some(&link.target),
            _ => None,
        }
    }

    /// Visit this snapshot and everything nested in it, depth first:
    /// filesystem children, then children, then the link target.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Snapshot)) {
        visit(self);
        if let Some(node) = self.as_node() {
            for child in &node.filesystem_children {
                child.walk(visit);
            }
            for child in node.children.values() {
                child.walk(visit);
            }
        }
        if let Some(target) = self.link_target() {
            target.walk(visit);
        }
    }

    /// Number of records in the snapshot, cycle stubs included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

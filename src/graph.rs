//! Package dependency graph.
//!
//! A [`PackageGraph`] is an arena of installed packages ([`Node`]s) addressed by
//! dense `u32`-indexed [`NodeId`]s. Nodes are related two ways: by containment
//! (a node's `node_modules` children and its filesystem children) and by
//! dependency [`Edge`]s, which carry a [`DepType`] and a version range.
//!
//! The relation collections are hash-based and have no stable iteration order.
//! Use [`crate::snapshot`] to get a deterministic view of a graph.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EdgeId(pub u32);

/// The kind of dependency relation an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub enum DepType {
    #[default]
    Prod,
    Dev,
    Optional,
    Peer,
    PeerOptional,
    Workspace,
}

impl DepType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Dev => "dev",
            Self::Optional => "optional",
            Self::Peer => "peer",
            Self::PeerOptional => "peerOptional",
            Self::Workspace => "workspace",
        }
    }

    /// Unresolved edges of this kind are not an error.
    pub fn is_optional(self) -> bool {
        matches!(self, Self::Optional | Self::PeerOptional)
    }

    /// Peer edges resolve from the dependent's parent, not the dependent.
    pub fn is_peer(self) -> bool {
        matches!(self, Self::Peer | Self::PeerOptional)
    }
}

impl fmt::Display for DepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an edge is not satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EdgeError {
    #[serde(rename = "MISSING")]
    Missing,
    #[serde(rename = "INVALID")]
    Invalid,
    #[serde(rename = "PEER LOCAL")]
    PeerLocal,
    #[serde(rename = "DETACHED")]
    Detached,
}

impl EdgeError {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "MISSING",
            Self::Invalid => "INVALID",
            Self::PeerLocal => "PEER LOCAL",
            Self::Detached => "DETACHED",
        }
    }
}

impl fmt::Display for EdgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `name` and `version` fields of a package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Install classification of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Flags {
    pub extraneous: bool,
    pub dev: bool,
    pub optional: bool,
    pub dev_optional: bool,
    pub peer: bool,
    pub in_bundle: bool,
}

/// A failure recorded while loading or installing a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallError {
    pub code: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl InstallError {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_owned(),
            path: None,
            message: String::new(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_owned());
        self
    }
}

/// Everything needed to create a node. Containment and edges are set up
/// afterwards through [`PackageGraph`].
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    /// Defaults to the package name, then to the last component of the realpath.
    pub name: Option<String>,
    pub package: PackageMeta,
    pub path: PathBuf,
    /// Defaults to `path`.
    pub realpath: Option<PathBuf>,
    pub resolved: Option<String>,
    pub flags: Flags,
    pub error: Option<InstallError>,
    pub errors: Vec<InstallError>,
}

impl NodeSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn package(mut self, name: &str, version: Option<&str>) -> Self {
        self.package = PackageMeta {
            name: Some(name.to_owned()),
            version: version.map(str::to_owned),
        };
        self
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    #[must_use]
    pub fn realpath(mut self, realpath: impl Into<PathBuf>) -> Self {
        self.realpath = Some(realpath.into());
        self
    }

    #[must_use]
    pub fn resolved(mut self, resolved: &str) -> Self {
        self.resolved = Some(resolved.to_owned());
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: Flags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn error(mut self, error: InstallError) -> Self {
        self.error = Some(error);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub package: PackageMeta,
    /// Position relative to the top of the tree, `/`-separated. Empty for the top.
    pub location: String,
    pub path: PathBuf,
    pub realpath: PathBuf,
    pub resolved: Option<String>,
    /// Some for link nodes.
    pub link_target: Option<NodeId>,
    pub flags: Flags,
    pub error: Option<InstallError>,
    pub errors: Vec<InstallError>,
    pub parent: Option<NodeId>,
    pub fs_parent: Option<NodeId>,
    /// `node_modules` children keyed by name.
    pub children: HashMap<String, NodeId>,
    pub fs_children: HashSet<NodeId>,
    /// Dependencies of this node keyed by dependency name.
    pub edges_out: HashMap<String, EdgeId>,
    /// Resolved edges pointing at this node.
    pub edges_in: HashSet<EdgeId>,
}

impl Node {
    pub fn version(&self) -> Option<&str> {
        self.package.version.as_deref()
    }

    pub fn is_link(&self) -> bool {
        self.link_target.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub id: EdgeId,
    pub kind: DepType,
    pub name: String,
    /// The raw version range, e.g. `^1.2.0`. None means any version.
    pub spec: Option<String>,
    pub from: Option<NodeId>,
    pub to: Option<NodeId>,
    pub error: Option<EdgeError>,
}

#[derive(Debug, Clone, Default)]
pub struct PackageGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl PackageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parentless node. Its location is empty until it is attached.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_node(&mut self, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let realpath = spec.realpath.unwrap_or_else(|| spec.path.clone());
        let name = spec
            .name
            .or_else(|| spec.package.name.clone())
            .or_else(|| {
                realpath
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_default();
        self.nodes.push(Node {
            id,
            name,
            package: spec.package,
            location: String::new(),
            path: spec.path,
            realpath,
            resolved: spec.resolved,
            link_target: None,
            flags: spec.flags,
            error: spec.error,
            errors: spec.errors,
            parent: None,
            fs_parent: None,
            children: HashMap::new(),
            fs_children: HashSet::new(),
            edges_out: HashMap::new(),
            edges_in: HashSet::new(),
        });
        id
    }

    /// Add a symbolic link node. Its realpath is the target's realpath.
    pub fn add_link(&mut self, spec: NodeSpec, target: NodeId) -> NodeId {
        let id = self.add_node(spec);
        let realpath = self.node(target).realpath.clone();
        let link = self.node_mut(id);
        link.link_target = Some(target);
        link.realpath = realpath;
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0 as usize]
    }

    fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        &mut self.edges[id.0 as usize]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_link(&self, id: NodeId) -> bool {
        self.node(id).is_link()
    }

    /// Follow parent and filesystem-parent links to the top of the tree.
    pub fn top(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(up) = self.containing(current) {
            current = up;
        }
        current
    }

    fn containing(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        node.parent.or(node.fs_parent)
    }

    fn is_ancestor(&self, candidate: NodeId, of: NodeId) -> bool {
        let mut current = Some(of);
        while let Some(id) = current {
            if id == candidate {
                return true;
            }
            current = self.containing(id);
        }
        false
    }

    /// Find a node by location within the tree under `top`.
    ///
    /// Locations are relative to each node's own top, so the same location
    /// can occur once per tree.
    pub fn find(&self, top: NodeId, location: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.location == location && self.top(n.id) == top)
            .map(|n| n.id)
    }

    /// Attach `child` under `parent`'s `node_modules`.
    ///
    /// The child moves to `<parent.path>/node_modules/<name>` and leaves its
    /// previous parent. A same-named child already under `parent` is evicted
    /// and becomes a top-level node.
    pub fn set_parent(&mut self, child: NodeId, parent: NodeId) -> Result<(), Error> {
        if self.node(child).parent == Some(parent) {
            return Ok(());
        }
        if self.is_ancestor(child, parent) {
            return Err(Error::ContainmentCycle(self.node(child).path.clone()));
        }
        self.detach(child);

        let name = self.node(child).name.clone();
        if let Some(evicted) = self.node_mut(parent).children.insert(name.clone(), child) {
            tracing::debug!(name = %name, "evicting existing child");
            self.node_mut(evicted).parent = None;
            self.relocate(evicted);
        }
        self.node_mut(child).parent = Some(parent);

        let parent_node = self.node(parent);
        let path = parent_node.path.join("node_modules").join(&name);
        let realpath = parent_node.realpath.join("node_modules").join(&name);
        self.move_subtree(child, path, realpath);
        self.relocate(child);
        Ok(())
    }

    /// Record that `child` lives inside `parent`'s directory without being
    /// one of its `node_modules` children (workspace packages, for instance).
    pub fn add_fs_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        if self.is_ancestor(child, parent) {
            return Err(Error::ContainmentCycle(self.node(child).path.clone()));
        }
        self.detach(child);
        self.node_mut(child).fs_parent = Some(parent);
        self.node_mut(parent).fs_children.insert(child);
        self.relocate(child);
        Ok(())
    }

    fn detach(&mut self, id: NodeId) {
        let node = self.node(id);
        let name = node.name.clone();
        if let Some(old) = node.parent {
            let siblings = &mut self.node_mut(old).children;
            if siblings.get(&name) == Some(&id) {
                siblings.remove(&name);
            }
        }
        if let Some(old) = self.node(id).fs_parent {
            self.node_mut(old).fs_children.remove(&id);
        }
        let node = self.node_mut(id);
        node.parent = None;
        node.fs_parent = None;
    }

    /// Rewrite paths of a node and its `node_modules` descendants.
    fn move_subtree(&mut self, id: NodeId, path: PathBuf, realpath: PathBuf) {
        let node = self.node_mut(id);
        if !node.is_link() {
            node.realpath = realpath;
        }
        node.path = path;

        let node = self.node(id);
        let children: Vec<(String, NodeId)> = node
            .children
            .iter()
            .map(|(name, &child)| (name.clone(), child))
            .collect();
        let base = node.path.join("node_modules");
        let real_base = node.realpath.join("node_modules");
        for (name, child) in children {
            self.move_subtree(child, base.join(&name), real_base.join(&name));
        }
    }

    /// Recompute locations for a node and everything it contains.
    fn relocate(&mut self, id: NodeId) {
        let top = self.top(id);
        let location = relative_location(&self.node(id).path, &self.node(top).path);
        self.node_mut(id).location = location;

        let node = self.node(id);
        let contained: Vec<NodeId> = node
            .children
            .values()
            .chain(node.fs_children.iter())
            .copied()
            .collect();
        for child in contained {
            self.relocate(child);
        }
    }

    /// Add a dependency of `from` on `name`. An existing dependency with the
    /// same name is replaced and detached. Call [`Self::resolve_edges`] to
    /// point edges at their targets.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_edge(&mut self, from: NodeId, kind: DepType, name: &str, spec: Option<&str>) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            id,
            kind,
            name: name.to_owned(),
            spec: spec.map(str::to_owned),
            from: Some(from),
            to: None,
            error: None,
        });
        if let Some(replaced) = self.node_mut(from).edges_out.insert(name.to_owned(), id) {
            self.detach_edge(replaced);
        }
        id
    }

    fn detach_edge(&mut self, id: EdgeId) {
        if let Some(to) = self.edge(id).to {
            self.node_mut(to).edges_in.remove(&id);
        }
        let edge = self.edge_mut(id);
        edge.from = None;
        edge.to = None;
        edge.error = Some(EdgeError::Detached);
    }

    /// Resolve every attached edge against the current tree shape.
    #[allow(clippy::cast_possible_truncation)]
    pub fn resolve_edges(&mut self) {
        for i in 0..self.edges.len() {
            self.resolve_edge(EdgeId(i as u32));
        }
    }

    fn resolve_edge(&mut self, id: EdgeId) {
        let Some(from) = self.edge(id).from else {
            return;
        };
        if let Some(old) = self.edge_mut(id).to.take() {
            self.node_mut(old).edges_in.remove(&id);
        }

        let edge = self.edge(id);
        let kind = edge.kind;
        let start = if kind.is_peer() {
            self.node(from).parent
        } else {
            Some(from)
        };
        let mut to = start.and_then(|s| self.resolve_name(s, &edge.name));
        let mut error = None;
        if to.is_none() && kind.is_peer() {
            if let Some(&local) = self.node(from).children.get(&edge.name) {
                to = Some(local);
                error = Some(EdgeError::PeerLocal);
            }
        }
        match to {
            None if !kind.is_optional() => error = Some(EdgeError::Missing),
            Some(target) if error.is_none() && !self.satisfies(target, edge.spec.as_deref()) => {
                error = Some(EdgeError::Invalid);
            }
            _ => {}
        }

        if let Some(err) = error {
            tracing::debug!(
                from = %self.node(from).location,
                name = %edge.name,
                error = %err,
                "dependency not satisfied"
            );
        }
        if let Some(target) = to {
            self.node_mut(target).edges_in.insert(id);
        }
        let edge = self.edge_mut(id);
        edge.to = to;
        edge.error = error;
    }

    /// Walk up the containment chain looking for a child called `name`.
    fn resolve_name(&self, start: NodeId, name: &str) -> Option<NodeId> {
        let mut current = Some(start);
        while let Some(id) = current {
            if let Some(&found) = self.node(id).children.get(name) {
                return Some(found);
            }
            current = self.containing(id);
        }
        None
    }

    /// Ranges or versions that do not parse as semver are not checked.
    fn satisfies(&self, target: NodeId, spec: Option<&str>) -> bool {
        let Some(spec) = spec.filter(|s| !s.is_empty()) else {
            return true;
        };
        let Ok(range) = VersionReq::parse(spec) else {
            return true;
        };
        let node = self.node(target);
        let node = node.link_target.map_or(node, |t| self.node(t));
        match node.version().map(Version::parse) {
            Some(Ok(version)) => range.matches(&version),
            _ => true,
        }
    }
}

/// `path` relative to `top`, joined with `/`. Paths outside `top` are kept whole.
fn relative_location(path: &Path, top: &Path) -> String {
    let rel = path.strip_prefix(top).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::RootDir => Some(String::new()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

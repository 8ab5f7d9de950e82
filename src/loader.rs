//! Building a [`PackageGraph`] from a JSON manifest, and saving or loading
//! snapshots.
//!
//! A manifest lists nodes and dependency edges. Nodes refer to each other by
//! the `path` they are declared with:
//!
//! ```json
//! {
//!   "nodes": [
//!     { "path": ".", "realpath": "/home/user/root", "package": { "name": "root" } },
//!     { "path": "./node_modules/a", "parent": ".", "package": { "name": "a", "version": "1.0.0" } },
//!     { "path": "./node_modules/b", "parent": ".", "link": "/home/user/b" },
//!     { "path": "/home/user/b", "package": { "name": "b" } }
//!   ],
//!   "edges": [
//!     { "from": ".", "type": "prod", "name": "a", "spec": "^1.0.0" }
//!   ]
//! }
//! ```
//!
//! Nodes with a `parent` are moved under `<parent>/node_modules/<name>`, so
//! their declared path only serves as a reference.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;
use crate::graph::{DepType, Flags, InstallError, NodeId, NodeSpec, PackageGraph, PackageMeta};
use crate::snapshot::Snapshot;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub nodes: Vec<ManifestNode>,
    #[serde(default)]
    pub edges: Vec<ManifestEdge>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ManifestNode {
    pub path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub package: PackageMeta,
    #[serde(default)]
    pub realpath: Option<PathBuf>,
    #[serde(default)]
    pub resolved: Option<String>,
    #[serde(default)]
    pub parent: Option<PathBuf>,
    #[serde(default)]
    pub fs_parent: Option<PathBuf>,
    /// Declared path of the node this link points at.
    #[serde(default)]
    pub link: Option<PathBuf>,
    #[serde(default)]
    pub extraneous: bool,
    #[serde(default)]
    pub dev: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub dev_optional: bool,
    #[serde(default)]
    pub peer: bool,
    #[serde(default)]
    pub in_bundle: bool,
    #[serde(default)]
    pub error: Option<InstallError>,
    #[serde(default)]
    pub errors: Vec<InstallError>,
}

impl ManifestNode {
    pub fn flags(&self) -> Flags {
        Flags {
            extraneous: self.extraneous,
            dev: self.dev,
            optional: self.optional,
            dev_optional: self.dev_optional,
            peer: self.peer,
            in_bundle: self.in_bundle,
        }
    }

    fn spec(&self) -> NodeSpec {
        NodeSpec {
            name: self.name.clone(),
            package: self.package.clone(),
            path: self.path.clone(),
            realpath: self.realpath.clone(),
            resolved: self.resolved.clone(),
            flags: self.flags(),
            error: self.error.clone(),
            errors: self.errors.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEdge {
    pub from: PathBuf,
    #[serde(rename = "type", default)]
    pub kind: DepType,
    pub name: String,
    #[serde(default)]
    pub spec: Option<String>,
}

/// A graph built from a manifest, with its declared paths.
#[derive(Debug)]
pub struct LoadedGraph {
    pub graph: PackageGraph,
    /// The top of the first declared node.
    pub root: NodeId,
    pub by_path: HashMap<PathBuf, NodeId>,
}

pub fn load_manifest(path: &Path) -> Result<Manifest, Error> {
    let data = fs::read_to_string(path).map_err(|e| Error::ManifestRead(path.to_path_buf(), e))?;
    serde_json::from_str(&data).map_err(|e| Error::ManifestParse(path.to_path_buf(), e))
}

/// Read a manifest and build the graph it describes, edges resolved.
pub fn load_graph(path: &Path) -> Result<LoadedGraph, Error> {
    let manifest = load_manifest(path)?;
    if manifest.nodes.is_empty() {
        return Err(Error::EmptyManifest(path.to_path_buf()));
    }
    let loaded = build_graph(manifest)?;
    tracing::debug!(
        manifest = %path.display(),
        nodes = loaded.graph.node_count(),
        edges = loaded.graph.edge_count(),
        "loaded graph"
    );
    Ok(loaded)
}

pub fn build_graph(manifest: Manifest) -> Result<LoadedGraph, Error> {
    let mut graph = PackageGraph::new();
    let mut by_path: HashMap<PathBuf, NodeId> = HashMap::new();
    let mut declared: Vec<(usize, NodeId, ManifestNode)> = Vec::with_capacity(manifest.nodes.len());

    let (links, plain): (Vec<_>, Vec<_>) = manifest
        .nodes
        .into_iter()
        .enumerate()
        .partition(|(_, n)| n.link.is_some());
    let declared_paths: HashSet<PathBuf> = plain
        .iter()
        .chain(&links)
        .map(|(_, n)| n.path.clone())
        .collect();

    for (order, node) in plain {
        let id = insert(&mut by_path, &node, |spec| graph.add_node(spec))?;
        declared.push((order, id, node));
    }

    // Links may point at links declared after them, so add each once its
    // target exists.
    let mut pending = links;
    while !pending.is_empty() {
        let before = pending.len();
        let mut waiting = Vec::new();
        for (order, node) in pending {
            let target = node.link.as_ref().and_then(|t| by_path.get(t).copied());
            match target {
                Some(target) => {
                    let id = insert(&mut by_path, &node, |spec| graph.add_link(spec, target))?;
                    declared.push((order, id, node));
                }
                None => waiting.push((order, node)),
            }
        }
        if waiting.len() == before {
            return Err(unresolved_links(&waiting, &declared_paths));
        }
        pending = waiting;
    }

    // Containment follows declaration order.
    declared.sort_by_key(|(order, _, _)| *order);
    for (_, id, node) in &declared {
        if let Some(parent) = &node.parent {
            graph.set_parent(*id, lookup(&by_path, parent)?)?;
        }
        if let Some(fs_parent) = &node.fs_parent {
            graph.add_fs_child(lookup(&by_path, fs_parent)?, *id)?;
        }
    }

    for edge in manifest.edges {
        let from = lookup(&by_path, &edge.from)?;
        graph.add_edge(from, edge.kind, &edge.name, edge.spec.as_deref());
    }
    graph.resolve_edges();

    let first = declared.first().map_or(NodeId(0), |(_, id, _)| *id);
    let root = graph.top(first);
    Ok(LoadedGraph { graph, root, by_path })
}

fn insert(
    by_path: &mut HashMap<PathBuf, NodeId>,
    node: &ManifestNode,
    add: impl FnOnce(NodeSpec) -> NodeId,
) -> Result<NodeId, Error> {
    if by_path.contains_key(&node.path) {
        return Err(Error::DuplicateNode(node.path.clone()));
    }
    let id = add(node.spec());
    by_path.insert(node.path.clone(), id);
    Ok(id)
}

/// Links left over when no progress can be made either name an undeclared
/// path or point at each other.
fn unresolved_links(waiting: &[(usize, ManifestNode)], declared: &HashSet<PathBuf>) -> Error {
    let targets = waiting.iter().filter_map(|(_, n)| n.link.as_ref());
    if let Some(unknown) = targets.clone().find(|t| !declared.contains(*t)) {
        return Error::UnknownNode(unknown.clone());
    }
    let first = waiting
        .iter()
        .min_by_key(|(order, _)| *order)
        .map(|(_, n)| n.path.clone())
        .unwrap_or_default();
    Error::LinkCycle(first)
}

fn lookup(by_path: &HashMap<PathBuf, NodeId>, path: &Path) -> Result<NodeId, Error> {
    by_path
        .get(path)
        .copied()
        .ok_or_else(|| Error::UnknownNode(path.to_path_buf()))
}

pub fn save_snapshot(snapshot: &Snapshot, path: &Path) -> Result<(), Error> {
    let json = snapshot.to_json().map_err(Error::SnapshotEncode)?;
    fs::write(path, json).map_err(|e| Error::SnapshotWrite(path.to_path_buf(), e))?;
    tracing::debug!(path = %path.display(), "saved snapshot");
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot, Error> {
    let data = fs::read_to_string(path).map_err(|e| Error::SnapshotRead(path.to_path_buf(), e))?;
    serde_json::from_str(&data).map_err(|e| Error::SnapshotParse(path.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeError;
    use crate::snapshot::project_tree;

    const MANIFEST: &str = r#"{
        "nodes": [
            { "path": ".", "realpath": "/home/user/root", "package": { "name": "root", "version": "1.0.0" } },
            { "path": "./node_modules/b", "parent": ".", "link": "/home/user/b" },
            { "path": "./node_modules/a", "parent": ".", "package": { "name": "a", "version": "1.0.0" }, "dev": true },
            { "path": "/home/user/b", "package": { "name": "b", "version": "0.1.0" } }
        ],
        "edges": [
            { "from": ".", "type": "dev", "name": "a", "spec": "^1.0.0" },
            { "from": ".", "name": "b" },
            { "from": "./node_modules/a", "name": "gone" }
        ]
    }"#;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn builds_graph_from_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let loaded = load_graph(&write(tmp.path(), "graph.json", MANIFEST)).unwrap();
        let g = &loaded.graph;

        let root = g.node(loaded.root);
        assert_eq!(root.name, "root");
        assert_eq!(root.children.len(), 2);

        let a = g.node(root.children["a"]);
        assert!(a.flags.dev);
        assert_eq!(a.realpath, Path::new("/home/user/root/node_modules/a"));

        let b = g.node(root.children["b"]);
        assert!(b.is_link());
        assert_eq!(b.realpath, Path::new("/home/user/b"));

        let gone = g.edge(a.edges_out["gone"]);
        assert_eq!(gone.error, Some(EdgeError::Missing));
    }

    #[test]
    fn unknown_reference_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(
            tmp.path(),
            "bad.json",
            r#"{ "nodes": [ { "path": ".", "parent": "./nope" } ] }"#,
        );
        let err = load_graph(&path).unwrap_err();
        assert!(matches!(err, Error::UnknownNode(p) if p == Path::new("./nope")));
    }

    #[test]
    fn duplicate_and_empty_manifests_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let dup = write(tmp.path(), "dup.json", r#"{ "nodes": [ { "path": "." }, { "path": "." } ] }"#);
        assert!(matches!(load_graph(&dup), Err(Error::DuplicateNode(_))));

        let empty = write(tmp.path(), "empty.json", r#"{ "nodes": [] }"#);
        assert!(matches!(load_graph(&empty), Err(Error::EmptyManifest(_))));

        let junk = write(tmp.path(), "junk.json", "not json");
        assert!(matches!(load_graph(&junk), Err(Error::ManifestParse(..))));

        let missing = tmp.path().join("missing.json");
        assert!(matches!(load_graph(&missing), Err(Error::ManifestRead(..))));
    }

    #[test]
    fn link_may_point_at_a_later_link() {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "nodes": [
                    { "path": "." },
                    { "path": "./node_modules/a", "parent": ".", "link": "./node_modules/b" },
                    { "path": "./node_modules/b", "parent": ".", "link": "/t" },
                    { "path": "/t", "package": { "name": "t", "version": "1.0.0" } }
                ]
            }"#,
        )
        .unwrap();
        let loaded = build_graph(manifest).unwrap();
        let g = &loaded.graph;

        let a = loaded.by_path[Path::new("./node_modules/a")];
        let b = loaded.by_path[Path::new("./node_modules/b")];
        let t = loaded.by_path[Path::new("/t")];
        assert_eq!(g.node(a).link_target, Some(b));
        assert_eq!(g.node(b).link_target, Some(t));
        assert_eq!(g.node(a).realpath, Path::new("/t"));
        assert_eq!(g.node(loaded.root).children.len(), 2);
    }

    #[test]
    fn links_pointing_at_each_other_are_rejected() {
        let manifest: Manifest = serde_json::from_str(
            r#"{
                "nodes": [
                    { "path": "." },
                    { "path": "./x", "link": "./y" },
                    { "path": "./y", "link": "./x" }
                ]
            }"#,
        )
        .unwrap();
        let err = build_graph(manifest).unwrap_err();
        assert!(matches!(err, Error::LinkCycle(ref p) if p == Path::new("./x")));
        assert!(err.hint().is_some());

        let dangling: Manifest = serde_json::from_str(
            r#"{ "nodes": [ { "path": "." }, { "path": "./x", "link": "./y" }, { "path": "./z", "link": "./x" } ] }"#,
        )
        .unwrap();
        assert!(matches!(build_graph(dangling), Err(Error::UnknownNode(p)) if p == Path::new("./y")));
    }

    #[test]
    fn misspelled_node_fields_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        for typo in [r#""inbundle": true"#, r#""fs_parent": ".""#] {
            let path = write(
                tmp.path(),
                "typo.json",
                &format!(r#"{{ "nodes": [ {{ "path": ".", {typo} }} ] }}"#),
            );
            assert!(matches!(load_graph(&path), Err(Error::ManifestParse(..))), "{typo}");
        }
        let ok = write(
            tmp.path(),
            "ok.json",
            r#"{ "nodes": [ { "path": ".", "inBundle": true, "devOptional": true } ] }"#,
        );
        let loaded = load_graph(&ok).unwrap();
        let flags = loaded.graph.node(loaded.root).flags;
        assert!(flags.in_bundle && flags.dev_optional);
    }

    #[test]
    fn snapshot_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let loaded = load_graph(&write(tmp.path(), "graph.json", MANIFEST)).unwrap();
        let snap = project_tree(&loaded.graph, loaded.root);

        let out = tmp.path().join("snap.json");
        save_snapshot(&snap, &out).unwrap();
        assert_eq!(load_snapshot(&out).unwrap(), snap);

        let junk = write(tmp.path(), "junk.json", "[1, 2]");
        assert!(matches!(load_snapshot(&junk), Err(Error::SnapshotParse(..))));
    }
}

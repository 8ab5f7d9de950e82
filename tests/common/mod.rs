#![allow(dead_code)]

use std::path::{Path, PathBuf};

use treesnap::graph::{DepType, Flags, NodeId, NodeSpec, PackageGraph};

/// The dependency tree used across integration tests.
///
/// Structure:
///   root (.)                 deps: prod, bundled, missing
///                            devDeps: dev, overlap; optionalDeps: optional, overlap
///     node_modules/prod      deps: meta; peerDeps: peer
///       node_modules/meta
///     node_modules/bundled   (in bundle)
///     node_modules/dev       (dev)
///     node_modules/optional  (optional)
///     node_modules/peer      (peer)
///     node_modules/extraneous
///
/// Properties:
///   - `missing` never resolves (MISSING), `overlap` is optional so it does not error
///   - `peer` resolves from prod's parent, so it lands on the root's child
pub struct DepTree {
    pub graph: PackageGraph,
    pub root: NodeId,
    pub prod: NodeId,
    pub meta: NodeId,
}

impl DepTree {
    pub fn new() -> Self {
        let mut graph = PackageGraph::new();
        let root = graph.add_node(
            NodeSpec::new(".")
                .package("root", None)
                .realpath("/home/user/projects/root"),
        );

        let prod = child(&mut graph, root, "prod", Flags::default());
        let meta = child(&mut graph, prod, "meta", Flags::default());
        child(&mut graph, root, "bundled", Flags { in_bundle: true, ..Flags::default() });
        child(&mut graph, root, "dev", Flags { dev: true, ..Flags::default() });
        child(&mut graph, root, "optional", Flags { optional: true, ..Flags::default() });
        child(&mut graph, root, "peer", Flags { peer: true, ..Flags::default() });
        child(&mut graph, root, "extraneous", Flags { extraneous: true, ..Flags::default() });

        for name in ["prod", "bundled", "missing"] {
            graph.add_edge(root, DepType::Prod, name, None);
        }
        for name in ["dev", "overlap"] {
            graph.add_edge(root, DepType::Dev, name, None);
        }
        // overlap is listed again as optional and replaces the dev edge
        for name in ["optional", "overlap"] {
            graph.add_edge(root, DepType::Optional, name, None);
        }
        graph.add_edge(prod, DepType::Prod, "meta", None);
        graph.add_edge(prod, DepType::Peer, "peer", None);
        graph.resolve_edges();

        Self { graph, root, prod, meta }
    }
}

pub fn child(graph: &mut PackageGraph, parent: NodeId, name: &str, flags: Flags) -> NodeId {
    let id = graph.add_node(NodeSpec::new(name).package(name, Some("1.2.3")).flags(flags));
    graph.set_parent(id, parent).unwrap();
    id
}

/// The same shape as [`DepTree`], as a manifest.
pub const MANIFEST: &str = r#"{
  "nodes": [
    { "path": ".", "realpath": "/home/user/projects/root", "package": { "name": "root" } },
    { "path": "prod", "parent": ".", "package": { "name": "prod", "version": "1.2.3" } },
    { "path": "meta", "parent": "prod", "package": { "name": "meta", "version": "1.2.3" } },
    { "path": "bundled", "parent": ".", "package": { "name": "bundled", "version": "1.2.3" }, "inBundle": true },
    { "path": "dev", "parent": ".", "package": { "name": "dev", "version": "1.2.3" }, "dev": true },
    { "path": "optional", "parent": ".", "package": { "name": "optional", "version": "1.2.3" }, "optional": true },
    { "path": "peer", "parent": ".", "package": { "name": "peer", "version": "1.2.3" }, "peer": true },
    { "path": "extraneous", "parent": ".", "package": { "name": "extraneous", "version": "1.2.3" }, "extraneous": true }
  ],
  "edges": [
    { "from": ".", "type": "prod", "name": "prod" },
    { "from": ".", "type": "prod", "name": "bundled" },
    { "from": ".", "type": "prod", "name": "missing" },
    { "from": ".", "type": "dev", "name": "dev" },
    { "from": ".", "type": "optional", "name": "optional" },
    { "from": ".", "type": "optional", "name": "overlap" },
    { "from": "prod", "type": "prod", "name": "meta" },
    { "from": "prod", "type": "peer", "name": "peer" }
  ]
}"#;

/// Write `contents` under `dir` and return the file path.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

//! Human-readable rendering of snapshots.
//!
//! Nodes print as an indented tree. Edges print on one line each, in the
//! shape `{ prod meta@^1.0.0 -> node_modules/meta }` for dependencies and
//! `{ node_modules/prod prod meta@^1.0.0 }` for dependents.

use std::fmt::{self, Write};

use crate::snapshot::{EdgeSnapshot, InboundEdge, NodeSnapshot, OutboundEdge, Snapshot};

const INDENT: &str = "  ";

fn quoted_if_empty(location: &str) -> &str {
    if location.is_empty() { "\"\"" } else { location }
}

impl fmt::Display for OutboundEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.edge;
        write!(f, "{{ {} {}@{}", e.kind, e.name, e.spec)?;
        if let Some(to) = &self.to {
            write!(f, " -> {}", quoted_if_empty(to))?;
        }
        if let Some(err) = e.error {
            write!(f, " {err}")?;
        }
        f.write_str(" }")
    }
}

impl fmt::Display for InboundEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let e = &self.edge;
        let from = self.from.as_deref().unwrap_or_default();
        write!(f, "{{ {} {} {}@{}", quoted_if_empty(from), e.kind, e.name, e.spec)?;
        if let Some(err) = e.error {
            write!(f, " {err}")?;
        }
        f.write_str(" }")
    }
}

impl fmt::Display for EdgeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbound(edge) => fmt::Display::fmt(edge, f),
            Self::Inbound(edge) => fmt::Display::fmt(edge, f),
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_tree(f, self, 0)
    }
}

/// Render a snapshot as an indented text tree.
pub fn render(snapshot: &Snapshot) -> String {
    snapshot.to_string()
}

fn write_tree(out: &mut impl Write, snapshot: &Snapshot, depth: usize) -> fmt::Result {
    match snapshot {
        Snapshot::Cycle(stub) => {
            let pad = INDENT.repeat(depth);
            writeln!(out, "{pad}{} (cycle)", quoted_if_empty(&stub.location))
        }
        Snapshot::Plain(node) => write_node(out, node, depth),
        Snapshot::Link(link) => {
            write_node(out, &link.node, depth)?;
            writeln!(out, "{}target", INDENT.repeat(depth + 1))?;
            write_tree(out, &link.target, depth + 2)
        }
    }
}

fn write_node(out: &mut impl Write, node: &NodeSnapshot, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    let inner = INDENT.repeat(depth + 1);

    write!(out, "{pad}{}", node.name)?;
    if let Some(version) = &node.version {
        write!(out, "@{version}")?;
    }
    if let Some(package_name) = &node.package_name {
        write!(out, " ({package_name})")?;
    }
    write!(out, " {}", quoted_if_empty(&node.location))?;
    let flags = flag_names(node);
    if !flags.is_empty() {
        write!(out, " [{}]", flags.join(" "))?;
    }
    writeln!(out)?;

    writeln!(out, "{inner}path {}", node.path)?;
    if let Some(realpath) = &node.realpath {
        writeln!(out, "{inner}realpath {realpath}")?;
    }
    if let Some(resolved) = &node.resolved {
        writeln!(out, "{inner}resolved {resolved}")?;
    }
    for err in node.error.iter().chain(&node.errors) {
        write!(out, "{inner}error {}", err.code)?;
        if let Some(path) = &err.path {
            write!(out, " {path}")?;
        }
        writeln!(out)?;
    }

    if !node.outbound_edges.is_empty() {
        writeln!(out, "{inner}edgesOut")?;
        for edge in node.outbound_edges.values() {
            writeln!(out, "{inner}{INDENT}{edge}")?;
        }
    }
    if !node.inbound_edges.is_empty() {
        writeln!(out, "{inner}edgesIn")?;
        for edge in &node.inbound_edges {
            writeln!(out, "{inner}{INDENT}{edge}")?;
        }
    }
    if !node.filesystem_children.is_empty() {
        writeln!(out, "{inner}fsChildren")?;
        for child in &node.filesystem_children {
            write_tree(out, child, depth + 2)?;
        }
    }
    if !node.children.is_empty() {
        writeln!(out, "{inner}children")?;
        for child in node.children.values() {
            write_tree(out, child, depth + 2)?;
        }
    }
    Ok(())
}

pub(crate) fn flag_names(node: &NodeSnapshot) -> Vec<&'static str> {
    [
        (node.extraneous, "extraneous"),
        (node.dev, "dev"),
        (node.optional, "optional"),
        (node.dev_optional, "devOptional"),
        (node.peer, "peer"),
        (node.bundled, "bundled"),
    ]
    .into_iter()
    .filter_map(|(set, name)| set.then_some(name))
    .collect()
}

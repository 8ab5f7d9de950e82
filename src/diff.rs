//! Structural comparison of two snapshots.
//!
//! Nodes are matched by location. A location that appears more than once in
//! a snapshot (a diamond, or a link target projected next to its link) is
//! compared by its first occurrence in walk order. Cycle stubs carry no
//! attributes and are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::render::flag_names;
use crate::snapshot::{NodeSnapshot, Snapshot};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotDiff {
    /// Locations present only in the old snapshot.
    pub removed: Vec<String>,
    /// Locations present only in the new snapshot.
    pub added: Vec<String>,
    pub changed: Vec<NodeChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeChange {
    pub location: String,
    pub fields: Vec<FieldChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl SnapshotDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty() && self.changed.is_empty()
    }
}

type Indexed<'a> = BTreeMap<&'a str, (&'a NodeSnapshot, Option<&'a str>)>;

fn index<'a>(snapshot: &'a Snapshot, nodes: &mut Indexed<'a>) {
    snapshot.walk(&mut |s| {
        if let Some(node) = s.as_node() {
            let target = s.link_target().map(Snapshot::location);
            nodes.entry(node.location.as_str()).or_insert((node, target));
        }
    });
}

/// Compare `before` against `after`.
pub fn diff_snapshots(before: &Snapshot, after: &Snapshot) -> SnapshotDiff {
    let mut old = Indexed::new();
    let mut new = Indexed::new();
    index(before, &mut old);
    index(after, &mut new);

    let removed = old
        .keys()
        .filter(|loc| !new.contains_key(*loc))
        .map(|loc| (*loc).to_owned())
        .collect();
    let added = new
        .keys()
        .filter(|loc| !old.contains_key(*loc))
        .map(|loc| (*loc).to_owned())
        .collect();

    let changed = old
        .iter()
        .filter_map(|(loc, &(a, a_target))| {
            let &(b, b_target) = new.get(loc)?;
            let mut fields = compare_nodes(a, b);
            push_change(&mut fields, "target", a_target.map(str::to_owned), b_target.map(str::to_owned));
            (!fields.is_empty()).then(|| NodeChange {
                location: (*loc).to_owned(),
                fields,
            })
        })
        .collect();

    let diff = SnapshotDiff {
        removed,
        added,
        changed,
    };
    tracing::debug!(
        removed = diff.removed.len(),
        added = diff.added.len(),
        changed = diff.changed.len(),
        "compared snapshots"
    );
    diff
}

fn push_change(fields: &mut Vec<FieldChange>, field: &str, before: Option<String>, after: Option<String>) {
    if before != after {
        fields.push(FieldChange {
            field: field.to_owned(),
            before,
            after,
        });
    }
}

fn joined(items: impl IntoIterator<Item = String>) -> Option<String> {
    let items: Vec<String> = items.into_iter().collect();
    (!items.is_empty()).then(|| items.join(", "))
}

fn compare_nodes(a: &NodeSnapshot, b: &NodeSnapshot) -> Vec<FieldChange> {
    let mut fields = Vec::new();
    push_change(&mut fields, "name", Some(a.name.clone()), Some(b.name.clone()));
    push_change(&mut fields, "packageName", a.package_name.clone(), b.package_name.clone());
    push_change(&mut fields, "version", a.version.clone(), b.version.clone());
    push_change(&mut fields, "path", Some(a.path.clone()), Some(b.path.clone()));
    push_change(&mut fields, "realpath", a.realpath.clone(), b.realpath.clone());
    push_change(&mut fields, "resolved", a.resolved.clone(), b.resolved.clone());
    push_change(
        &mut fields,
        "flags",
        joined(flag_names(a).into_iter().map(str::to_owned)),
        joined(flag_names(b).into_iter().map(str::to_owned)),
    );
    push_change(
        &mut fields,
        "errors",
        joined(a.error.iter().chain(&a.errors).map(|e| e.code.clone())),
        joined(b.error.iter().chain(&b.errors).map(|e| e.code.clone())),
    );

    // Edges keyed by dependency name; each side renders the same way so a
    // changed range, target or error shows up as one field.
    let names: BTreeSet<&String> = a.outbound_edges.keys().chain(b.outbound_edges.keys()).collect();
    for name in names {
        push_change(
            &mut fields,
            &format!("edgesOut.{name}"),
            a.outbound_edges.get(name).map(ToString::to_string),
            b.outbound_edges.get(name).map(ToString::to_string),
        );
    }
    fields
}

impl fmt::Display for SnapshotDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No differences.");
        }
        for loc in &self.removed {
            writeln!(f, "- {}", display_location(loc))?;
        }
        for loc in &self.added {
            writeln!(f, "+ {}", display_location(loc))?;
        }
        for change in &self.changed {
            writeln!(f, "~ {}", display_location(&change.location))?;
            for field in &change.fields {
                writeln!(
                    f,
                    "    {}: {} -> {}",
                    field.field,
                    field.before.as_deref().unwrap_or("(none)"),
                    field.after.as_deref().unwrap_or("(none)")
                )?;
            }
        }
        Ok(())
    }
}

fn display_location(location: &str) -> &str {
    if location.is_empty() { "(root)" } else { location }
}

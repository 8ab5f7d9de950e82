mod common;

use assert_cmd::Command;
use predicates::prelude::*;

fn treesnap() -> Command {
    assert_cmd::cargo_bin_cmd!("treesnap")
}

// --- show subcommand ---

#[test]
fn show_prints_tree() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest = common::write_file(tmp.path(), "graph.json", common::MANIFEST);
    treesnap()
        .arg("show")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("root \"\"\n"))
        .stdout(predicate::str::contains("{ prod missing@* MISSING }"))
        .stdout(predicate::str::contains("peer@1.2.3 node_modules/peer [peer]"));
}

#[test]
fn show_json_is_valid() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest = common::write_file(tmp.path(), "graph.json", common::MANIFEST);
    let output = treesnap().arg("show").arg(&manifest).arg("--json").output().unwrap();
    assert!(output.status.success());
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["location"], "");
    assert_eq!(v["outboundEdges"]["missing"]["error"], "MISSING");
    assert_eq!(v["children"]["prod"]["children"]["meta"]["location"], "node_modules/prod/node_modules/meta");
    assert!(v["children"]["bundled"]["bundled"].as_bool().unwrap());
}

#[test]
fn show_from_inner_root() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest = common::write_file(tmp.path(), "graph.json", common::MANIFEST);
    treesnap()
        .args(["show", "--root", "node_modules/prod"])
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("prod@1.2.3 node_modules/prod\n"))
        .stdout(predicate::str::contains("bundled").not());
}

#[test]
fn show_unknown_root_has_hint() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest = common::write_file(tmp.path(), "graph.json", common::MANIFEST);
    treesnap()
        .args(["show", "--root", "node_modules/nope"])
        .arg(&manifest)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error: no node at location 'node_modules/nope'"))
        .stderr(predicate::str::contains("hint: --root takes a location"));
}

#[test]
fn show_missing_manifest_fails() {
    treesnap()
        .args(["show", "/nonexistent/graph.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error: cannot read manifest"));
}

#[test]
fn show_invalid_manifest_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest = common::write_file(tmp.path(), "graph.json", r#"{ "nodes": [], "extra": 1 }"#);
    treesnap()
        .arg("show")
        .arg(&manifest)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error: invalid manifest"));
}

#[test]
fn show_cyclic_links_terminates() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest = common::write_file(
        tmp.path(),
        "graph.json",
        r#"{
          "nodes": [
            { "path": "/w", "package": { "name": "w" } },
            { "path": "/w/node_modules/a", "parent": "/w", "package": { "name": "a" } },
            { "path": "/w/node_modules/b", "parent": "/w", "package": { "name": "b" } },
            { "path": "a-to-b", "parent": "/w/node_modules/a", "link": "/w/node_modules/b" },
            { "path": "b-to-a", "parent": "/w/node_modules/b", "link": "/w/node_modules/a" }
          ]
        }"#,
    );
    treesnap()
        .arg("show")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("node_modules/a (cycle)"));
}

// --- save / diff ---

#[test]
fn saved_snapshots_of_same_graph_do_not_differ() {
    let tmp = tempfile::tempdir().unwrap();
    let manifest = common::write_file(tmp.path(), "graph.json", common::MANIFEST);
    let a = tmp.path().join("a.json");
    let b = tmp.path().join("b.json");
    for out in [&a, &b] {
        treesnap()
            .arg("show")
            .arg(&manifest)
            .arg("--save")
            .arg(out)
            .assert()
            .success()
            .stderr(predicate::str::contains("Snapshot saved to"));
    }
    assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());

    treesnap()
        .arg("diff")
        .arg(&a)
        .arg(&b)
        .assert()
        .success()
        .stdout("No differences.\n");
}

#[test]
fn diff_reports_changes_with_exit_one() {
    let tmp = tempfile::tempdir().unwrap();
    let before = common::write_file(tmp.path(), "before.json", common::MANIFEST);
    let changed = common::MANIFEST.replace(
        r#"{ "name": "meta", "version": "1.2.3" }"#,
        r#"{ "name": "meta", "version": "2.0.0" }"#,
    );
    let after = common::write_file(tmp.path(), "after.json", &changed);

    let a = tmp.path().join("a.json");
    let b = tmp.path().join("b.json");
    treesnap().arg("show").arg(&before).arg("--save").arg(&a).assert().success();
    treesnap().arg("show").arg(&after).arg("--save").arg(&b).assert().success();

    treesnap()
        .arg("diff")
        .arg(&a)
        .arg(&b)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("~ node_modules/prod/node_modules/meta"))
        .stdout(predicate::str::contains("version: 1.2.3 -> 2.0.0"));

    let output = treesnap().arg("diff").arg(&a).arg(&b).arg("--json").output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["changed"][0]["location"], "node_modules/prod/node_modules/meta");
}

#[test]
fn diff_rejects_non_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    let junk = common::write_file(tmp.path(), "junk.json", "[]");
    treesnap()
        .arg("diff")
        .arg(&junk)
        .arg(&junk)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error: invalid snapshot"))
        .stderr(predicate::str::contains("hint: snapshots are written by"));
}

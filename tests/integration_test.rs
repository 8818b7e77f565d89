use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::path::Path;

use jarpatch::archive::{ArchiveReader, ArchiveWriter};

fn jarpatch() -> Command {
    Command::cargo_bin("jarpatch").unwrap()
}

fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let mut writer = ArchiveWriter::create(path).unwrap();
    for (name, data) in entries {
        writer.write_entry(name, data).unwrap();
    }
    writer.finish().unwrap();
}

fn read_jar(path: &Path) -> Vec<(String, Vec<u8>)> {
    let mut reader = ArchiveReader::open(path).unwrap();
    let names: Vec<String> = reader.entries().unwrap().into_iter().map(|e| e.name).collect();
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, reader.read_index(i).unwrap()))
        .collect()
}

const FOO: &[u8] = b"package net;\n\nclass Foo {\n}\n";
const FOO_PATCHED: &[u8] = b"package net;\n\nclass Foo {\n  int x;\n}\n";

#[test]
fn test_end_to_end_generate_then_apply() {
    let temp = assert_fs::TempDir::new().unwrap();
    let baseline = temp.child("server-sources.jar");
    let logo = vec![0x89, b'P', b'N', b'G', 0x00, 0xff, 0xfe];
    write_jar(
        baseline.path(),
        &[("net/Foo.java", FOO), ("net/Bar.java", b"class Bar {}\n"), ("assets/logo.png", &logo[..])],
    );

    let tree = temp.child("tree");
    tree.child("net/Foo.java").write_binary(FOO_PATCHED).unwrap();
    tree.child("net/Bar.java").write_str("class Bar {}\n").unwrap();
    let patches = temp.child("patches");

    jarpatch()
        .args(["generate", "--baseline"])
        .arg(baseline.path())
        .arg("--tree")
        .arg(tree.path())
        .arg("--output")
        .arg(patches.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Patches written: 1"));

    patches
        .child("net/Foo.java.patch")
        .assert(predicate::str::contains("@@ -1,4 +1,5 @@"));
    patches.child("net/Bar.java.patch").assert(predicate::path::missing());

    let output = temp.child("out/server-sources-patched.jar");
    jarpatch()
        .args(["apply", "--baseline"])
        .arg(baseline.path())
        .arg("--patches")
        .arg(patches.path())
        .arg("--output")
        .arg(output.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Patched: 1"));

    let entries = read_jar(output.path());
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["net/Foo.java", "net/Bar.java", "assets/logo.png"]);
    assert_eq!(entries[0].1, FOO_PATCHED);
    assert_eq!(entries[2].1, logo);
}

#[test]
fn test_apply_without_patches_copies_baseline() {
    let temp = assert_fs::TempDir::new().unwrap();
    let baseline = temp.child("base.jar");
    write_jar(baseline.path(), &[("A.java", b"class A {}\n")]);
    let output = temp.child("copy.jar");

    jarpatch()
        .args(["apply", "--baseline"])
        .arg(baseline.path())
        .arg("--output")
        .arg(output.path())
        .assert()
        .success();

    assert_eq!(
        std::fs::read(output.path()).unwrap(),
        std::fs::read(baseline.path()).unwrap()
    );
}

#[test]
fn test_stale_patch_fails_without_output() {
    let temp = assert_fs::TempDir::new().unwrap();
    let baseline = temp.child("base.jar");
    write_jar(baseline.path(), &[("net/Foo.java", b"class Foo {\n  // note\n}\n")]);

    let patches = temp.child("patches");
    patches
        .child("net/Foo.java.patch")
        .write_str("--- a/net/Foo.java\n+++ b/net/Foo.java\n@@ -1,2 +1,3 @@\n class Foo {\n+  int x;\n }\n")
        .unwrap();
    let output = temp.child("out.jar");

    jarpatch()
        .args(["apply", "--baseline"])
        .arg(baseline.path())
        .arg("--patches")
        .arg(patches.path())
        .arg("--output")
        .arg(output.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("net/Foo.java"))
        .stderr(predicate::str::contains("hunk #1"));

    output.assert(predicate::path::missing());
}

#[test]
fn test_workspace_command_extracts_sources() {
    let temp = assert_fs::TempDir::new().unwrap();
    let jar = temp.child("patched.jar");
    write_jar(jar.path(), &[("net/Foo.java", FOO_PATCHED)]);
    let ws = temp.child("workspace/server");

    jarpatch()
        .args(["workspace", "--archive"])
        .arg(jar.path())
        .arg("--output")
        .arg(ws.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Files extracted: 1"));

    ws.child("src/main/java/net/Foo.java")
        .assert(predicate::str::contains("int x;"));
}

#[test]
fn test_resolve_version_and_unknown_version() {
    let temp = assert_fs::TempDir::new().unwrap();
    let manifest = temp.child("version_manifest.json");
    manifest
        .write_str(r#"{"versions":[{"id":"1.16.4","type":"release","url":"https://example.invalid/1.16.4.json"}]}"#)
        .unwrap();

    jarpatch()
        .args(["resolve-version", "--version", "1.16.4", "--manifest"])
        .arg(manifest.path())
        .assert()
        .success()
        .stdout("https://example.invalid/1.16.4.json\n");

    jarpatch()
        .args(["resolve-version", "--version", "0.0.1", "--manifest"])
        .arg(manifest.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("0.0.1"));
}

#[test]
fn test_verify_reports_missing_download() {
    let temp = assert_fs::TempDir::new().unwrap();
    let client = temp.child("client.jar");
    client.write_str("abc").unwrap();
    let info = temp.child("1.16.4.json");
    info.write_str(
        r#"{"downloads":{
            "client":{"sha1":"a9993e364706816aba3e25717850c26c9cd0d89d","url":"https://example.invalid/c.jar"},
            "server":{"sha1":"a9993e364706816aba3e25717850c26c9cd0d89d","url":"https://example.invalid/s.jar"}
        }}"#,
    )
    .unwrap();

    jarpatch()
        .args(["verify", "--version-info"])
        .arg(info.path())
        .arg("--client")
        .arg(client.path())
        .arg("--server")
        .arg(temp.child("server.jar").path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("client: ok"))
        .stdout(predicate::str::contains("server: missing"));
}

#[test]
fn test_setup_runs_configured_targets() {
    let temp = assert_fs::TempDir::new().unwrap();
    write_jar(temp.child("jars/server-base.jar").path(), &[("net/Foo.java", FOO)]);
    write_jar(temp.child("jars/client-base.jar").path(), &[("C.java", b"class C {}\n")]);
    temp.child("patches/server/net/Foo.java.patch")
        .write_str(
            "--- a/net/Foo.java\n+++ b/net/Foo.java\n@@ -3,2 +3,3 @@\n class Foo {\n+  int x;\n }\n",
        )
        .unwrap();

    let config = temp.child("pipeline.toml");
    config
        .write_str(
            r#"
[[target]]
name = "server"
sources_jar = "jars/server-base.jar"

[[target]]
name = "client"
sources_jar = "jars/client-base.jar"
"#,
        )
        .unwrap();

    jarpatch()
        .args(["setup", "--config"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Target server:"))
        .stdout(predicate::str::contains("Target client:"));

    temp.child("workspace/server/src/main/java/net/Foo.java")
        .assert(predicate::str::contains("int x;"));
    temp.child("workspace/client/src/main/java/C.java")
        .assert(predicate::path::is_file());
    temp.child("jars/server-sources-patched.jar.stamp")
        .assert(predicate::path::is_file());

    // Second run only rebuilds workspaces.
    jarpatch()
        .args(["setup", "--target", "server", "--config"])
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Patched jar up to date"))
        .stdout(predicate::str::contains("Target client:").not());
}

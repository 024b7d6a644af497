#![allow(clippy::all)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn setup_db(name: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join(format!("{name}.db"));
    (dir, path)
}

fn tagbits(dir: &Path, db: &Path, args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("tagbits")
        .env("XDG_CONFIG_HOME", dir)
        .env_remove("TAGBITS_DB")
        .arg("--db")
        .arg(db)
        .args(["--format", "json"])
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn register_reports_first_fit_slots() {
    let (dir, db) = setup_db("register");
    let vip = tagbits(dir.path(), &db, &["register", "order", "vip"]);
    assert_eq!(vip["name"], "vip");
    assert_eq!(vip["slot"]["cell"], 1);
    assert_eq!(vip["slot"]["bit"], 1);
    let urgent = tagbits(dir.path(), &db, &["register", "order", "urgent"]);
    assert_eq!(urgent["slot"]["bit"], 2);
}

#[test]
fn tag_show_and_find_round_trip() {
    let (dir, db) = setup_db("roundtrip");
    tagbits(dir.path(), &db, &["register", "order", "vip"]);
    tagbits(dir.path(), &db, &["register", "order", "urgent"]);

    let shown = tagbits(dir.path(), &db, &["add", "order", "7", "vip", "urgent"]);
    assert_eq!(shown[0]["target_id"], 7);
    assert_eq!(shown[0]["tags"]["names"], serde_json::json!(["vip", "urgent"]));
    tagbits(dir.path(), &db, &["add", "order", "8", "urgent"]);

    let both = tagbits(dir.path(), &db, &["find", "order", "vip", "urgent"]);
    assert_eq!(both["targets"], serde_json::json!([7]));
    let any = tagbits(dir.path(), &db, &["find", "order", "--any", "vip", "urgent"]);
    assert_eq!(any["targets"], serde_json::json!([7, 8]));

    let listed = tagbits(dir.path(), &db, &["list", "order"]);
    let counts: Vec<_> = listed
        .as_array()
        .expect("array")
        .iter()
        .map(|u| (u["definition"]["name"].clone(), u["usage_count"].clone()))
        .collect();
    assert_eq!(
        counts,
        vec![
            (Value::from("vip"), Value::from(1)),
            (Value::from("urgent"), Value::from(2))
        ]
    );
}

#[test]
fn set_clear_and_remove_update_records() {
    let (dir, db) = setup_db("batch");
    tagbits(dir.path(), &db, &["register", "order", "a"]);
    tagbits(dir.path(), &db, &["register", "order", "b"]);

    let set = tagbits(dir.path(), &db, &["set", "order", "--targets", "1,2", "a", "b"]);
    assert_eq!(set["targets"], 2);
    let removed = tagbits(dir.path(), &db, &["remove", "order", "1", "a"]);
    assert_eq!(removed[0]["tags"]["names"], serde_json::json!(["b"]));

    let cleared = tagbits(dir.path(), &db, &["clear", "order", "2", "3"]);
    assert_eq!(cleared["targets"], 1);
    let shown = tagbits(dir.path(), &db, &["show", "order", "1", "2"]);
    assert_eq!(shown[0]["tags"]["names"], serde_json::json!(["b"]));
    assert_eq!(shown[1]["tags"]["names"], serde_json::json!([]));

    let purged = tagbits(dir.path(), &db, &["purge", "order", "1"]);
    assert_eq!(purged["removed"], true);
}

#[test]
fn rename_and_delete_definitions() {
    let (dir, db) = setup_db("rename");
    tagbits(dir.path(), &db, &["register", "order", "vip"]);
    tagbits(dir.path(), &db, &["add", "order", "1", "vip"]);
    let renamed = tagbits(dir.path(), &db, &["rename", "order", "vip", "gold"]);
    assert_eq!(renamed["name"], "gold");
    let shown = tagbits(dir.path(), &db, &["show", "order", "1"]);
    assert_eq!(shown[0]["tags"]["names"], serde_json::json!(["gold"]));

    tagbits(dir.path(), &db, &["delete", "order", "gold"]);
    let shown = tagbits(dir.path(), &db, &["show", "order", "1"]);
    assert_eq!(shown[0]["tags"]["names"], serde_json::json!([]));
}

#[test]
fn errors_exit_nonzero() {
    let (dir, db) = setup_db("errors");
    tagbits(dir.path(), &db, &["register", "order", "vip"]);
    let output = cargo_bin_cmd!("tagbits")
        .env("XDG_CONFIG_HOME", dir.path())
        .arg("--db")
        .arg(&db)
        .args(["register", "order", "vip"])
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).expect("utf8");
    assert!(stderr.starts_with("error:"), "stderr: {stderr}");
    assert!(stderr.contains("already exists"));

    cargo_bin_cmd!("tagbits")
        .env("XDG_CONFIG_HOME", dir.path())
        .arg("--db")
        .arg(&db)
        .args(["add", "order", "1", "ghost"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn config_file_supplies_database_and_options() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = dir.path().join("configured.db");
    let config = dir.path().join("cli.toml");
    fs::write(
        &config,
        format!(
            "[database]\ndefault = {:?}\n\n[tags]\ncell_count = 1\ntable_prefix = \"app_\"\n",
            db.display().to_string()
        ),
    )
    .expect("write config");

    for i in 0..64 {
        cargo_bin_cmd!("tagbits")
            .env_remove("TAGBITS_DB")
            .arg("--config")
            .arg(&config)
            .args(["register", "order", &format!("t{i}")])
            .assert()
            .success();
    }
    cargo_bin_cmd!("tagbits")
        .env_remove("TAGBITS_DB")
        .arg("--config")
        .arg(&config)
        .args(["register", "order", "overflow"])
        .assert()
        .failure();
    assert!(db.exists());

    let conn = rusqlite::Connection::open(&db).expect("open db");
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM app_tag_definitions", [], |row| row.get(0))
        .expect("count definitions");
    assert_eq!(count, 64);
}

#[test]
fn missing_database_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    cargo_bin_cmd!("tagbits")
        .env("XDG_CONFIG_HOME", dir.path())
        .env_remove("TAGBITS_DB")
        .args(["list", "order"])
        .assert()
        .failure()
        .code(1);
}

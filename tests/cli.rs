use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn bin() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("notevault"));
    cmd.env_remove("NOTEVAULT_PASSWORD")
        .env_remove("NOTEVAULT_NEW_PASSWORD")
        .env_remove("NOTEVAULT_ALLOW_PLAINTEXT")
        .env_remove("NOTEVAULT_AEAD");
    cmd
}

fn with_dir(dir: &Path) -> Command {
    let mut cmd = bin();
    cmd.arg("--dir").arg(dir);
    cmd
}

fn init(dir: &Path, password: &str) {
    with_dir(dir)
        .env("NOTEVAULT_PASSWORD", password)
        .args(["init", "--argon-mem", "1024", "--argon-time", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("note store initialized"));
}

fn add(dir: &Path, password: &str, title: &str) {
    with_dir(dir)
        .env("NOTEVAULT_PASSWORD", password)
        .args(["add", title, "body text"])
        .assert()
        .success()
        .stdout(predicate::str::contains("added note"));
}

#[test]
fn init_creates_encrypted_store() {
    let dir = tempdir().unwrap();
    init(dir.path(), "pw");

    assert!(dir.path().join("key.salt").exists());
    assert!(dir.path().join("key.verify").exists());
    assert!(dir.path().join("state.blob").exists());
    assert!(!dir.path().join("key.legacy").exists());
}

#[test]
fn add_and_list_roundtrip() {
    let dir = tempdir().unwrap();
    init(dir.path(), "pw");
    add(dir.path(), "pw", "Groceries");

    with_dir(dir.path())
        .env("NOTEVAULT_PASSWORD", "pw")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Groceries"));

    let blob = std::fs::read(dir.path().join("state.blob")).unwrap();
    assert!(!String::from_utf8_lossy(&blob).contains("Groceries"));
}

#[test]
fn wrong_password_fails() {
    let dir = tempdir().unwrap();
    init(dir.path(), "pw");
    add(dir.path(), "pw", "Secret");
    let before = std::fs::read(dir.path().join("state.blob")).unwrap();

    with_dir(dir.path())
        .env("NOTEVAULT_PASSWORD", "wrong_pw")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("incorrect password"));

    assert_eq!(std::fs::read(dir.path().join("state.blob")).unwrap(), before);
}

#[test]
fn init_twice_fails() {
    let dir = tempdir().unwrap();
    init(dir.path(), "pw");

    with_dir(dir.path())
        .env("NOTEVAULT_PASSWORD", "pw")
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn uninitialized_store_is_reported() {
    let dir = tempdir().unwrap();

    with_dir(dir.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn random_key_store_migrates_to_password() {
    let dir = tempdir().unwrap();

    with_dir(dir.path())
        .args(["init", "--random"])
        .assert()
        .success();
    assert!(dir.path().join("key.legacy").exists());

    with_dir(dir.path())
        .args(["add", "Before migration"])
        .assert()
        .success();

    with_dir(dir.path())
        .env("NOTEVAULT_NEW_PASSWORD", "correct-horse-battery")
        .args(["migrate", "--argon-mem", "1024", "--argon-time", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("password protected"));
    assert!(!dir.path().join("key.legacy").exists());

    with_dir(dir.path())
        .env("NOTEVAULT_PASSWORD", "correct-horse-battery")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Before migration"));
}

#[test]
fn migrate_on_password_store_fails() {
    let dir = tempdir().unwrap();
    init(dir.path(), "pw");

    with_dir(dir.path())
        .env("NOTEVAULT_NEW_PASSWORD", "other")
        .arg("migrate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to migrate"));
}

#[test]
fn legacy_plaintext_notes_are_encrypted_on_init() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("state.json"),
        r#"{"language":"en","notes":[{"id":"n1","title":"Old note","createdAt":1,"updatedAt":1}],"tags":[],"folders":[]}"#,
    )
    .unwrap();

    init(dir.path(), "pw");
    assert!(!dir.path().join("state.json").exists());

    with_dir(dir.path())
        .env("NOTEVAULT_PASSWORD", "pw")
        .args(["show", "n1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Old note"));
}

#[test]
fn export_then_import_into_other_store() {
    let src = tempdir().unwrap();
    init(src.path(), "pw");
    add(src.path(), "pw", "Portable");

    let out = tempdir().unwrap();
    let export = out.path().join("export.json");
    with_dir(src.path())
        .env("NOTEVAULT_PASSWORD", "pw")
        .arg("export")
        .arg("--output")
        .arg(&export)
        .assert()
        .success();

    let text = std::fs::read_to_string(&export).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert!(json["exportedAt"].is_i64());
    assert_eq!(json["notes"][0]["title"], "Portable");

    let dst = tempdir().unwrap();
    init(dst.path(), "pw2");
    with_dir(dst.path())
        .env("NOTEVAULT_PASSWORD", "pw2")
        .arg("import")
        .arg(&export)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 1 notes"));

    with_dir(dst.path())
        .env("NOTEVAULT_PASSWORD", "pw2")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Portable"));
}

#[test]
fn oversized_import_is_rejected() {
    let dir = tempdir().unwrap();
    init(dir.path(), "pw");

    let notes: Vec<serde_json::Value> = (0..10_001)
        .map(|i| serde_json::json!({"id": format!("n{i}"), "title": "t", "createdAt": 1, "updatedAt": 1}))
        .collect();
    let doc = serde_json::json!({
        "version": "0.1.0",
        "exportedAt": 0,
        "notes": notes,
        "tags": [],
        "folders": []
    });
    let file = dir.path().join("big.json");
    std::fs::write(&file, doc.to_string()).unwrap();

    with_dir(dir.path())
        .env("NOTEVAULT_PASSWORD", "pw")
        .arg("import")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("too many notes"));

    with_dir(dir.path())
        .env("NOTEVAULT_PASSWORD", "pw")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No notes stored."));
}

#[test]
fn share_link_can_be_adopted() {
    let a = tempdir().unwrap();
    with_dir(a.path()).args(["init", "--random"]).assert().success();

    let output = with_dir(a.path())
        .args(["share-link", "https://notes.example/app"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let link = String::from_utf8(output.stdout).unwrap().trim().to_string();
    assert!(link.starts_with("https://notes.example/app#key="));

    let b = tempdir().unwrap();
    with_dir(b.path())
        .args(["adopt", &link])
        .assert()
        .success()
        .stdout(predicate::str::contains("continue at https://notes.example/app"));

    assert_eq!(
        std::fs::read(a.path().join("key.legacy")).unwrap(),
        std::fs::read(b.path().join("key.legacy")).unwrap()
    );
}

#[test]
fn info_reports_mode() {
    let dir = tempdir().unwrap();
    init(dir.path(), "pw");

    with_dir(dir.path())
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Password"))
        .stdout(predicate::str::contains("Locked"));
}

#[test]
fn import_file_over_size_cap_is_rejected_before_reading() {
    let dir = tempdir().unwrap();
    init(dir.path(), "pw");

    // sparse file just past the 128 MiB cap
    let file = dir.path().join("huge.json");
    std::fs::File::create(&file)
        .unwrap()
        .set_len(128 * 1024 * 1024 + 1)
        .unwrap();

    with_dir(dir.path())
        .arg("import")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("larger than"));
}

#[test]
fn adopt_onto_store_with_notes_is_refused() {
    let a = tempdir().unwrap();
    with_dir(a.path()).args(["init", "--random"]).assert().success();
    let output = with_dir(a.path())
        .args(["share-link", "https://notes.example/app"])
        .output()
        .unwrap();
    let link = String::from_utf8(output.stdout).unwrap().trim().to_string();

    let b = tempdir().unwrap();
    with_dir(b.path()).args(["init", "--random"]).assert().success();
    with_dir(b.path()).args(["add", "Local note"]).assert().success();
    let key_before = std::fs::read(b.path().join("key.legacy")).unwrap();

    with_dir(b.path())
        .args(["adopt", &link])
        .assert()
        .failure()
        .stderr(predicate::str::contains("different key"));

    assert_eq!(std::fs::read(b.path().join("key.legacy")).unwrap(), key_before);
    with_dir(b.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Local note"));
}

use assert_cmd::Command;
use predicates::str::contains;
use std::path::Path;
use tempfile::TempDir;

fn dragonfly(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dragonfly").unwrap();
    cmd.current_dir(dir)
        .env_remove("LORELAI_CONFIG")
        .env("LORELAI_ARTIFACT_DIR", dir.join("artifacts"))
        .arg("--db")
        .arg(dir.join("lorelai.db"));
    cmd
}

#[test]
fn test_upload_dry_run_transfers_nothing() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("datasets");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("qa.jsonl"), "{}\n").unwrap();

    dragonfly(dir.path())
        .args(["data", "upload", "--dry-run"])
        .arg(format!("--path={}", src.display()))
        .assert()
        .success()
        .stdout(contains("[dry-run] would upload 1 file(s)"));
    assert!(!dir.path().join("artifacts").exists());

    dragonfly(dir.path())
        .args(["data", "upload"])
        .arg(format!("--path={}", src.display()))
        .assert()
        .success();
    assert!(dir.path().join("artifacts/benchmark/qa.jsonl").is_file());
}

#[test]
fn test_upload_missing_path_fails_validation() {
    let dir = TempDir::new().unwrap();
    dragonfly(dir.path())
        .args(["data", "upload", "--dry-run", "--path=does-not-exist"])
        .assert()
        .code(2)
        .stderr(contains("does not exist"));
}

#[test]
fn test_download_without_artifacts_is_not_found() {
    let dir = TempDir::new().unwrap();
    dragonfly(dir.path())
        .args(["data", "download", "--dry-run", "--path=out"])
        .assert()
        .code(3);
}

#[test]
fn test_download_into_store_fails_validation_and_keeps_files() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("qa.jsonl");
    std::fs::write(&src, "{\"id\": \"1\"}\n").unwrap();
    dragonfly(dir.path())
        .args(["data", "upload"])
        .arg(format!("--path={}", src.display()))
        .assert()
        .success();

    let stored = dir.path().join("artifacts/benchmark");
    dragonfly(dir.path())
        .args(["data", "download"])
        .arg(format!("--path={}", stored.display()))
        .assert()
        .code(2)
        .stderr(contains("overlap"));
    assert_eq!(
        std::fs::read_to_string(stored.join("qa.jsonl")).unwrap(),
        "{\"id\": \"1\"}\n"
    );
}

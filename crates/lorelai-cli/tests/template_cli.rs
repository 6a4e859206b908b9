use assert_cmd::Command;
use predicates::str::contains;
use std::path::Path;
use tempfile::TempDir;

fn dragonfly(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dragonfly").unwrap();
    cmd.current_dir(dir)
        .env_remove("LORELAI_CONFIG")
        .env_remove("LORELAI_DB")
        .env_remove("LORELAI_LOG")
        .arg("--db")
        .arg(dir.join("lorelai.db"));
    cmd
}

fn count(dir: &Path, table: &str) -> i64 {
    let conn = rusqlite::Connection::open(dir.join("lorelai.db")).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
        .unwrap()
}

#[test]
fn test_create_with_empty_name_fails_without_row() {
    let dir = TempDir::new().unwrap();
    dragonfly(dir.path())
        .args(["template", "create", "--template-name="])
        .assert()
        .code(2)
        .stderr(contains("validation error"));

    // Schema exists (the command opened the db) but holds no template.
    assert_eq!(count(dir.path(), "benchmark_templates"), 0);
}

#[test]
fn test_parameter_scenario_t1() {
    let dir = TempDir::new().unwrap();
    dragonfly(dir.path())
        .args(["template", "create", "--name=T1", "--description=nightly"])
        .assert()
        .success()
        .stdout(contains("Created template #1 'T1'"));

    dragonfly(dir.path())
        .args([
            "template",
            "add-parameter",
            "--template-id=1",
            "--parameter-name=code_version",
            "--parameter-type=string",
            "--parameter-value=1.0",
        ])
        .assert()
        .success()
        .stdout(contains("Added parameter 'code_version'"));

    let out = dragonfly(dir.path())
        .args(["--format", "json", "template", "list-parameters", "--template-id=1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let params: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let params = params.as_array().unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0]["name"], "code_version");
    assert_eq!(params[0]["value"], "1.0");

    dragonfly(dir.path())
        .args([
            "template",
            "delete-parameter",
            "--template-id=1",
            "--parameter-name=code_version",
        ])
        .assert()
        .success();

    let out = dragonfly(dir.path())
        .args(["--format", "json", "template", "list-parameters", "--template-id=1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let params: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert!(params.as_array().unwrap().is_empty());
}

#[test]
fn test_adding_twice_updates() {
    let dir = TempDir::new().unwrap();
    dragonfly(dir.path())
        .args(["template", "create", "--name=T1"])
        .assert()
        .success();
    for value in ["1.0", "1.1"] {
        dragonfly(dir.path())
            .args([
                "template",
                "add-parameter",
                "--template-id=1",
                "--parameter-name=code_version",
                "--parameter-type=string",
            ])
            .arg(format!("--parameter-value={}", value))
            .assert()
            .success();
    }
    assert_eq!(count(dir.path(), "benchmark_template_parameters"), 1);

    dragonfly(dir.path())
        .args(["template", "list-parameters", "--template-id=1"])
        .assert()
        .success()
        .stdout(contains("code_version  string  1.1"));
}

#[test]
fn test_bad_parameter_type_is_rejected() {
    let dir = TempDir::new().unwrap();
    dragonfly(dir.path())
        .args(["template", "create", "--name=T1"])
        .assert()
        .success();
    dragonfly(dir.path())
        .args([
            "template",
            "add-parameter",
            "--template-id=1",
            "--parameter-name=samples",
            "--parameter-type=decimal",
            "--parameter-value=1",
        ])
        .assert()
        .code(2)
        .stderr(contains("unsupported parameter type"));
    assert_eq!(count(dir.path(), "benchmark_template_parameters"), 0);
}

#[test]
fn test_show_round_trip_and_not_found() {
    let dir = TempDir::new().unwrap();
    dragonfly(dir.path())
        .args(["template", "create", "--name=Nightly RAG", "--description=full corpus"])
        .assert()
        .success();

    let out = dragonfly(dir.path())
        .args(["--format", "json", "template", "show", "--template-id=1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let t: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(t["name"], "Nightly RAG");
    assert_eq!(t["description"], "full corpus");

    dragonfly(dir.path())
        .args(["template", "show", "--template-id=42"])
        .assert()
        .code(3)
        .stderr(contains("not found: template 42"));
}

#[test]
fn test_delete_blocks_then_cascades() {
    let dir = TempDir::new().unwrap();
    dragonfly(dir.path())
        .args(["template", "create", "--name=T1"])
        .assert()
        .success();
    dragonfly(dir.path())
        .args([
            "template",
            "add-parameter",
            "--template-id=1",
            "--parameter-name=code_version",
            "--parameter-type=string",
            "--parameter-value=1.0",
        ])
        .assert()
        .success();

    dragonfly(dir.path())
        .args(["template", "delete", "--template-id=1"])
        .assert()
        .code(4)
        .stderr(contains("--cascade"));
    assert_eq!(count(dir.path(), "benchmark_templates"), 1);

    dragonfly(dir.path())
        .args(["template", "delete", "--template-id=1", "--cascade"])
        .assert()
        .success();
    assert_eq!(count(dir.path(), "benchmark_templates"), 0);
    assert_eq!(count(dir.path(), "benchmark_template_parameters"), 0);
}

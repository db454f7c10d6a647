use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;

/// Import with a missing input file should fail without creating the database.
#[test]
fn import_fails_on_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("quiz.db");

    cargo_bin_cmd!("quizctl")
        .args(["import", "--input"])
        .arg(dir.path().join("missing.json"))
        .arg("--database")
        .arg(&database)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found or unreadable"));

    assert!(!database.exists());
}

/// A small import should print the summary, and `stats` should report what was stored.
#[test]
fn import_then_stats() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("megavul.json");
    let database = dir.path().join("quiz.db");
    let dataset = json!([
        {
            "cve_id": "CVE-2021-3156",
            "cwe_ids": ["CWE-122"],
            "is_vul": true,
            "func_before": "memcpy(buf, arg, strlen(arg));",
            "func": "memcpy(buf, arg, min(strlen(arg), size));",
            "commit_hash": "c0ffee"
        },
        {
            "cwe_ids": ["CWE-122"],
            "is_vul": true,
            "func_before": "a",
            "func": "b"
        }
    ]);
    std::fs::write(&input, dataset.to_string()).unwrap();

    cargo_bin_cmd!("quizctl")
        .arg("import")
        .arg("--input")
        .arg(&input)
        .arg("--database")
        .arg(&database)
        .args(["--seed", "1", "--difficulty", "hard"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Import summary:"))
        .stdout(predicate::str::contains("Skipped (no CVE): 1"))
        .stdout(predicate::str::contains("Inserted: 1"))
        .stdout(predicate::str::contains("CWE-122: 1"))
        .stdout(predicate::str::contains("**").not());

    cargo_bin_cmd!("quizctl")
        .arg("stats")
        .arg("--database")
        .arg(&database)
        .assert()
        .success()
        .stdout(predicate::str::contains("Challenges: 1"))
        .stdout(predicate::str::contains("**").not());
}

/// `init-db --reset-users` on a fresh file should just create the schema.
#[test]
fn init_db_creates_schema() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("quiz.db");

    cargo_bin_cmd!("quizctl")
        .arg("init-db")
        .arg("--database")
        .arg(&database)
        .arg("--reset-users")
        .assert()
        .success()
        .stdout(predicate::str::contains("is ready"));

    assert!(database.exists());
}

#[test]
fn unknown_difficulty_is_rejected() {
    cargo_bin_cmd!("quizctl")
        .args(["import", "--difficulty", "trivial"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown difficulty"));
}

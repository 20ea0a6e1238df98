use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[allow(deprecated)]
fn mailsort_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mailsort").unwrap();
    cmd.env("MAILSORT_DB", dir.join("models.db"));
    // Keep the user's real config out of the tests.
    cmd.env("MAILSORT_CONFIG", dir.join("absent.toml"));
    cmd.env_remove("RUST_LOG");
    cmd.env_remove("MAILSORT_KEY");
    cmd
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

fn stdout_of(cmd: &mut Command, input: &str) -> String {
    let out = cmd.write_stdin(input.to_string()).assert().success();
    String::from_utf8(out.get_output().stdout.clone()).unwrap()
}

fn learn(dir: &Path, user: &str, label: &str, text: &str) {
    mailsort_cmd(dir)
        .args(["learn", "--user", user, "--label", label])
        .write_stdin(text.to_string())
        .assert()
        .success();
}

fn predict(dir: &Path, user: &str, text: &str) -> String {
    stdout_of(mailsort_cmd(dir).args(["predict", "--user", user]), text)
        .trim()
        .to_string()
}

fn write_spam_config(dir: &Path) -> PathBuf {
    let model_path = dir.join("spam.json");
    std::fs::write(
        &model_path,
        r#"{
            "classes": ["ham", "spam"],
            "vocabulary": {"winner": 0, "prize": 1, "free": 2, "claim": 3},
            "idf": [1.0, 1.0, 1.0, 1.0],
            "weights": [3.0, 3.0, 2.0, 2.0],
            "bias": -1.0
        }"#,
    )
    .unwrap();
    let config_path = dir.join("config.toml");
    std::fs::write(
        &config_path,
        format!("[spam]\nmodel_path = {:?}\n", model_path.display().to_string()),
    )
    .unwrap();
    config_path
}

#[test]
fn clean_prints_normalized_text() {
    let dir = TempDir::new().unwrap();
    let out = stdout_of(
        mailsort_cmd(dir.path()).arg("clean"),
        "Congratulations you have WON!",
    );
    assert_eq!(out.trim(), "congratulations won");
}

#[test]
fn clean_strips_headers() {
    let dir = TempDir::new().unwrap();
    let raw = "From: a@example.com\nSubject: hello\n\nThis is the actual body of the email.\n";
    let out = stdout_of(mailsort_cmd(dir.path()).arg("clean"), raw);
    assert_eq!(out.trim(), "actual body email");
}

#[test]
fn predict_untrained_user_is_primary() {
    let dir = TempDir::new().unwrap();
    assert_eq!(predict(dir.path(), "1", "See you at lunch tomorrow"), "primary");
}

#[test]
fn learn_persists_between_runs() {
    let dir = TempDir::new().unwrap();
    learn(dir.path(), "1", "work", "Quarterly budget review meeting with the finance team");
    learn(dir.path(), "1", "travel", "Your flight to Lisbon departs from gate twelve");

    let cats = stdout_of(mailsort_cmd(dir.path()).args(["categories", "--user", "1"]), "");
    assert_eq!(cats, "travel\nwork\n");

    assert_eq!(
        predict(dir.path(), "1", "Finance team budget meeting moved to Thursday"),
        "work"
    );
    assert_eq!(predict(dir.path(), "2", "Finance team budget meeting"), "primary");
}

#[test]
fn learn_message_names_label() {
    let dir = TempDir::new().unwrap();
    let out = stdout_of(
        mailsort_cmd(dir.path()).args(["learn", "--user", "1", "--label", "jobpostings"]),
        "Rust developer position open",
    );
    assert!(out.contains("jobpostings"));
}

#[test]
fn spam_label_is_not_learned() {
    let dir = TempDir::new().unwrap();
    learn(dir.path(), "1", "spam", "cheap watches");
    let cats = stdout_of(mailsort_cmd(dir.path()).args(["categories", "--user", "1"]), "");
    assert_eq!(cats, "");
}

#[test]
fn configured_spam_model_short_circuits() {
    let dir = TempDir::new().unwrap();
    let config = write_spam_config(dir.path());
    learn(dir.path(), "1", "promotions", "Claim your free prize");

    let out = stdout_of(
        mailsort_cmd(dir.path())
            .env("MAILSORT_CONFIG", &config)
            .args(["predict", "--user", "1"]),
        "Claim your FREE prize, winner!",
    );
    assert_eq!(out.trim(), "spam");

    let out = stdout_of(
        mailsort_cmd(dir.path())
            .env("MAILSORT_CONFIG", &config)
            .args(["predict", "--user", "1"]),
        "Notes from the design review",
    );
    assert_eq!(out.trim(), "promotions");
}

#[test]
fn missing_spam_model_predicts_error() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "[spam]\nmodel_path = \"/nonexistent/spam.json\"\n");
    let out = mailsort_cmd(dir.path())
        .env("MAILSORT_CONFIG", &config)
        .args(["predict", "--user", "1"])
        .write_stdin("hello")
        .assert()
        .success();
    let output = out.get_output();
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "error");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("/nonexistent/spam.json unavailable"), "stderr: {stderr}");
}

#[test]
fn configured_fallback_label_is_printed() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "[classifier]\nfallback_label = \"inbox\"\n");
    let out = stdout_of(
        mailsort_cmd(dir.path())
            .env("MAILSORT_CONFIG", &config)
            .args(["predict", "--user", "1"]),
        "See you at lunch tomorrow",
    );
    assert_eq!(out.trim(), "inbox");
}

#[test]
fn key_file_encrypts_model_database() {
    let dir = TempDir::new().unwrap();
    let key_path = dir.path().join("key");
    std::fs::write(&key_path, "3c".repeat(32)).unwrap();
    let config = write_config(
        dir.path(),
        &format!("[storage]\nkey_file = {:?}\n", key_path.display().to_string()),
    );

    mailsort_cmd(dir.path())
        .env("MAILSORT_CONFIG", &config)
        .args(["learn", "--user", "1", "--label", "work"])
        .write_stdin("Quarterly budget review meeting")
        .assert()
        .success();

    let cats = stdout_of(
        mailsort_cmd(dir.path())
            .env("MAILSORT_CONFIG", &config)
            .args(["categories", "--user", "1"]),
        "",
    );
    assert_eq!(cats, "work\n");

    // Same database without the key cannot be opened.
    mailsort_cmd(dir.path())
        .args(["categories", "--user", "1"])
        .assert()
        .failure();

    // MAILSORT_KEY works in place of the key file.
    let cats = stdout_of(
        mailsort_cmd(dir.path())
            .env("MAILSORT_KEY", "3c".repeat(32))
            .args(["categories", "--user", "1"]),
        "",
    );
    assert_eq!(cats, "work\n");
}

#[test]
fn unknown_config_key_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "[storage]\nencryption_key = \"secret\"\n");
    mailsort_cmd(dir.path())
        .env("MAILSORT_CONFIG", &config)
        .args(["predict", "--user", "1"])
        .write_stdin("hello")
        .assert()
        .failure();
}

#[test]
fn explain_lists_scores() {
    let dir = TempDir::new().unwrap();
    learn(dir.path(), "1", "travel", "flight booking confirmation");
    learn(dir.path(), "1", "work", "pull request review");
    let out = stdout_of(
        mailsort_cmd(dir.path()).args(["explain", "--user", "1"]),
        "flight booking",
    );
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "prediction: travel");
    assert!(lines[1].starts_with("travel"));
    assert!(lines[2].starts_with("work"));
}

#[test]
fn model_dir_config_uses_directory_store() {
    let dir = TempDir::new().unwrap();
    let models = dir.path().join("models");
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        format!("[storage]\nmodel_dir = {:?}\n", models.display().to_string()),
    )
    .unwrap();

    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("mailsort").unwrap();
    cmd.env_remove("MAILSORT_DB")
        .env_remove("MAILSORT_KEY")
        .env("MAILSORT_CONFIG", &config)
        .args(["learn", "--user", "9", "--label", "news"])
        .write_stdin("Morning headlines digest")
        .assert()
        .success();
    assert!(models.join("user_9").join("model.json").exists());
}

#[test]
fn invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "[classifier]\nalpha = -1.0\n").unwrap();
    mailsort_cmd(dir.path())
        .env("MAILSORT_CONFIG", &config)
        .args(["predict", "--user", "1"])
        .write_stdin("hello")
        .assert()
        .failure();
}

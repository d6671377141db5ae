//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

/// Command isolated from the caller's environment and config files.
fn cli_cmd(dir: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("breezer");
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir)
        .env_remove("BREEZER_ADDRESS")
        .env_remove("BREEZER_MODEL")
        .env_remove("BREEZER_TRIES")
        .env_remove("RUST_LOG");
    cmd
}

fn json_stdout(output: &std::process::Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("stdout should be valid JSON")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("breezer"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("breezer"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn subcommand_help_lists_set_options() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["set", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--fan"))
        .stdout(predicate::str::contains("--target-temp"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn simulated_get_json_returns_state() {
    let dir = tempdir().expect("tempdir should be created");
    let output = cli_cmd(dir.path())
        .args(["--simulate", "get", "--json"])
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let state = json_stdout(&output);
    assert_eq!(state["model"], "S3");
    assert_eq!(state["power"], true);
    assert_eq!(state["air_mode"], "outside");
    assert_eq!(state["fan_speed"], 2);
    assert_eq!(state["target_temp"], 20);
    assert_eq!(state["time_of_day"], "12:00");
}

#[test]
fn simulated_get_prints_table() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["--simulate", "--model", "s4", "get"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tion S4 breezer"))
        .stdout(predicate::str::contains("Fan speed"));
}

#[test]
fn simulated_set_json_returns_new_state() {
    let dir = tempdir().expect("tempdir should be created");
    let output = cli_cmd(dir.path())
        .args([
            "--simulate",
            "set",
            "--fan",
            "4",
            "--mode",
            "recirculation",
            "--json",
        ])
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let state = json_stdout(&output);
    assert_eq!(state["fan_speed"], 4);
    assert_eq!(state["air_mode"], "recirculation");
    // Untouched fields keep their values
    assert_eq!(state["target_temp"], 20);
}

#[test]
fn simulated_pair_succeeds() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["--simulate", "pair"])
        .assert()
        .success();
}

#[test]
fn unsupported_mode_fails_with_error() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["--simulate", "-m", "lite", "set", "--mode", "mixed"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn invalid_model_is_rejected() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["--simulate", "--model", "magicair", "get"])
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
}

#[test]
fn missing_address_fails_with_clean_stdout() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .arg("get")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("address"));
}

#[test]
fn config_file_selects_model() {
    let dir = tempdir().expect("tempdir should be created");
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        r#"
[device]
address = "AA:BB:CC:DD:EE:FF"
model = "lite"

[retry]
max_tries = 2
poll_interval_ms = 10
"#,
    )
    .expect("config should be written");

    let output = cli_cmd(dir.path())
        .args(["--simulate", "--config"])
        .arg(&path)
        .args(["get", "--json"])
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let state = json_stdout(&output);
    assert_eq!(state["model"], "Lite");
    assert!(state.get("firmware_version").is_none());
}

#[test]
fn local_config_file_is_picked_up() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(
        dir.path().join("breezer.toml"),
        "[device]\nmodel = \"s4\"\n",
    )
    .expect("config should be written");

    let output = cli_cmd(dir.path())
        .args(["--simulate", "get", "--json"])
        .output()
        .expect("command should execute");
    assert!(output.status.success());
    assert_eq!(json_stdout(&output)["model"], "S4");
}

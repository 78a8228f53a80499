//! Command-line behavior that does not need a broker: argument parsing,
//! configuration validation, and input checks that run before any network
//! call.

use assert_cmd::Command;
use predicates::prelude::*;
mod common;

fn platform_events() -> Command {
    let mut cmd = Command::cargo_bin("platform-events").unwrap();
    for var in [
        "PLATFORM_EVENTS_TOPIC",
        "PLATFORM_EVENTS_BATCH_SIZE",
        "PLATFORM_EVENTS_REPLAY_PRESET",
        "PLATFORM_EVENTS_CLIENT_ID",
        "PLATFORM_EVENTS_CURSOR_BACKEND",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_commands() {
    platform_events()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("consume"))
        .stdout(predicate::str::contains("publish"))
        .stdout(predicate::str::contains("whoami"));
}

#[test]
fn test_missing_command_fails() {
    platform_events().assert().failure();
}

#[test]
fn test_consume_without_topic_fails() {
    let (_temp_dir, config_path) = common::temp_config_file(&common::config_yaml(""));

    platform_events()
        .arg("--config")
        .arg(config_path)
        .arg("consume")
        .assert()
        .failure()
        .stderr(predicate::str::contains("topic is required"));
}

#[test]
fn test_batch_size_out_of_range_fails() {
    let (_temp_dir, config_path) =
        common::temp_config_file(&common::config_yaml("batch_size: 500\n"));

    platform_events()
        .arg("--config")
        .arg(config_path)
        .arg("consume")
        .arg("--topic")
        .arg("/event/Order_Event__e")
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size must be between 1 and 100"));
}

#[test]
fn test_cli_batch_size_override_is_validated() {
    let (_temp_dir, config_path) = common::temp_config_file(&common::config_yaml(""));

    platform_events()
        .arg("--config")
        .arg(config_path)
        .arg("consume")
        .arg("--topic")
        .arg("/event/Order_Event__e")
        .arg("--batch-size")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size must be between 1 and 100"));
}

#[test]
fn test_custom_preset_without_cursor_fails() {
    let (_temp_dir, config_path) =
        common::temp_config_file(&common::config_yaml("replay_preset: custom\n"));

    platform_events()
        .arg("--config")
        .arg(config_path)
        .arg("topic")
        .arg("--topic")
        .arg("/event/Order_Event__e")
        .assert()
        .failure()
        .stderr(predicate::str::contains("replay_preset custom"));
}

#[test]
fn test_invalid_yaml_fails() {
    let (_temp_dir, config_path) = common::temp_config_file("batch_size: [1, 2]\n");

    platform_events()
        .arg("--config")
        .arg(config_path)
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn test_publish_rejects_invalid_json_before_login() {
    let (_temp_dir, config_path) = common::temp_config_file(&common::config_yaml(
        "topic: /event/Order_Event__e\n",
    ));

    platform_events()
        .arg("--config")
        .arg(config_path)
        .arg("publish")
        .arg("--data")
        .arg("{not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--data is not valid JSON"));
}

#[test]
fn test_whoami_without_client_id_fails() {
    let (_temp_dir, config_path) = common::temp_config_file(
        "auth:\n  mechanism: client_credentials\n  endpoint: http://127.0.0.1:9\n",
    );

    platform_events()
        .arg("--config")
        .arg(config_path)
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("auth.client_id cannot be empty"));
}

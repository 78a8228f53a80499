use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Minimal valid configuration; `extra` is appended verbatim.
#[allow(dead_code)]
pub fn config_yaml(extra: &str) -> String {
    format!(
        "grpc_endpoint: localhost:7011\n\
         auth:\n  endpoint: http://127.0.0.1:9\n  client_id: cid\n  client_secret: secret\n  username: user@example.com\n  password: hunter2\n\
         {extra}"
    )
}

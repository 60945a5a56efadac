//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files and
//! overlaying environment values.

use std::io::Write;

use sim_domain::SimError;
use sim_infra::config;

fn temp_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn test_file_then_env_overlay() {
    let file = temp_config(
        ".toml",
        r#"
[identity]
issuer_url = "https://sso.example.com"
realm = "file-realm"
client_id = "sim-web"

[api]
base_url = "https://api.example.com"
timeout_seconds = 10

[session]
app_origin = "https://app.example.com"
"#,
    );

    let from_file = config::load_from_file(Some(file.path().to_path_buf())).unwrap();
    let merged = config::apply_env_overrides(from_file, |key| match key {
        "SIM_KEYCLOAK_REALM" => Some("env-realm".to_string()),
        "SIM_API_TIMEOUT_SECS" => Some("45".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(merged.identity.realm.as_deref(), Some("env-realm"));
    assert_eq!(merged.identity.client_id.as_deref(), Some("sim-web"));
    assert_eq!(merged.api.timeout_seconds, 45);
    assert_eq!(merged.session.app_origin.as_deref(), Some("https://app.example.com"));
}

#[test]
fn test_json_file_with_session_settings() {
    let file = temp_config(
        ".json",
        r#"{
            "session": {
                "refresh_min_validity_seconds": 15,
                "session_file": "/var/lib/sim/session.json"
            }
        }"#,
    );

    let loaded = config::load_from_file(Some(file.path().to_path_buf())).unwrap();

    assert_eq!(loaded.session.refresh_min_validity_seconds, 15);
    assert_eq!(loaded.session.token_min_validity_seconds, 300);
    assert!(loaded.session.session_file.is_some());
    assert_eq!(loaded.api.timeout_seconds, 30);
}

#[test]
fn test_malformed_file_is_config_error() {
    let file = temp_config(".json", "{ \"api\": ");

    let err = config::load_from_file(Some(file.path().to_path_buf())).unwrap_err();
    assert!(matches!(err, SimError::Config(msg) if msg.contains("Invalid JSON")));
}

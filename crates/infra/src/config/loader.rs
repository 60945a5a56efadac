//! Configuration loader
//!
//! Loads application configuration from a file and environment variables.
//!
//! ## Loading Strategy
//! 1. Probe the standard locations for a config file (JSON or TOML)
//! 2. Fall back to defaults when no file exists
//! 3. Overlay environment variables on top
//!
//! ## Environment Variables
//! - `SIM_KEYCLOAK_URL`: Identity provider base URL
//! - `SIM_KEYCLOAK_REALM`: Realm name
//! - `SIM_KEYCLOAK_CLIENT_ID`: Public client identifier
//! - `SIM_API_BASE_URL`: Backend API base URL
//! - `SIM_API_TIMEOUT_SECS`: Request timeout in seconds
//! - `SIM_APP_ORIGIN`: Post-logout redirect target
//! - `SIM_SILENT_CHECK_SSO_URI`: Silent SSO check redirect URI
//! - `SIM_SESSION_FILE`: Persist the session to this file
//!
//! Empty values are treated as unset.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./sim.toml` or `./sim.json` (current working directory)
//! 2. `./config.toml` or `./config.json` (current working directory)
//! 3. The same names in the parent and grandparent directories
//! 4. Relative to executable location

use std::path::{Path, PathBuf};

use sim_domain::constants::{
    ENV_API_BASE_URL, ENV_API_TIMEOUT_SECS, ENV_APP_ORIGIN, ENV_KEYCLOAK_CLIENT_ID,
    ENV_KEYCLOAK_REALM, ENV_KEYCLOAK_URL, ENV_SESSION_FILE, ENV_SILENT_CHECK_SSO_URI,
};
use sim_domain::{Config, Result, SimError};

const CONFIG_FILE_NAMES: [&str; 4] = ["sim.toml", "sim.json", "config.toml", "config.json"];

/// Load configuration from the first config file found plus environment
///
/// # Errors
/// Returns `SimError::Config` if a config file exists but cannot be parsed,
/// or an environment variable holds an invalid value.
pub fn load() -> Result<Config> {
    let config = match probe_config_paths() {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::debug!("No config file found, using defaults");
            Config::default()
        }
    };

    apply_env_overrides(config, |key| std::env::var(key).ok())
}

/// Load configuration from environment variables over defaults
///
/// # Errors
/// Returns `SimError::Config` for invalid numeric values.
pub fn load_from_env() -> Result<Config> {
    apply_env_overrides(Config::default(), |key| std::env::var(key).ok())
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `SimError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SimError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            SimError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SimError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration; format is detected by file extension.
///
/// # Errors
/// Returns `SimError::Config` if format is invalid or parsing fails.
pub fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SimError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SimError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(SimError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Overlay environment values read through `lookup` onto `config`.
///
/// # Errors
/// Returns `SimError::Config` when `SIM_API_TIMEOUT_SECS` is not a number.
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(url) = var(ENV_KEYCLOAK_URL) {
        config.identity.issuer_url = Some(url);
    }
    if let Some(realm) = var(ENV_KEYCLOAK_REALM) {
        config.identity.realm = Some(realm);
    }
    if let Some(client_id) = var(ENV_KEYCLOAK_CLIENT_ID) {
        config.identity.client_id = Some(client_id);
    }
    if let Some(base_url) = var(ENV_API_BASE_URL) {
        config.api.base_url = base_url;
    }
    if let Some(timeout) = var(ENV_API_TIMEOUT_SECS) {
        config.api.timeout_seconds = timeout
            .trim()
            .parse()
            .map_err(|e| SimError::Config(format!("Invalid API timeout '{timeout}': {e}")))?;
    }
    if let Some(origin) = var(ENV_APP_ORIGIN) {
        config.session.app_origin = Some(origin);
    }
    if let Some(uri) = var(ENV_SILENT_CHECK_SSO_URI) {
        config.session.silent_check_sso_redirect_uri = Some(uri);
    }
    if let Some(path) = var(ENV_SESSION_FILE) {
        config.session.session_file = Some(PathBuf::from(path));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Mutex;

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_env_overrides_every_field() {
        let config = apply_env_overrides(
            Config::default(),
            lookup(&[
                (ENV_KEYCLOAK_URL, "https://sso.example.com"),
                (ENV_KEYCLOAK_REALM, "sim"),
                (ENV_KEYCLOAK_CLIENT_ID, "sim-web"),
                (ENV_API_BASE_URL, "https://api.example.com"),
                (ENV_API_TIMEOUT_SECS, "12"),
                (ENV_APP_ORIGIN, "https://app.example.com"),
                (ENV_SILENT_CHECK_SSO_URI, "https://app.example.com/silent-check-sso.html"),
                (ENV_SESSION_FILE, "/tmp/sim-session.json"),
            ]),
        )
        .unwrap();

        assert!(config.identity.is_configured());
        assert_eq!(config.api.base_url, "https://api.example.com");
        assert_eq!(config.api.timeout_seconds, 12);
        assert_eq!(config.session.app_origin.as_deref(), Some("https://app.example.com"));
        assert_eq!(config.session.session_file, Some(PathBuf::from("/tmp/sim-session.json")));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut base = Config::default();
        base.identity.realm = Some("from-file".into());

        let config =
            apply_env_overrides(base, lookup(&[(ENV_KEYCLOAK_REALM, ""), (ENV_API_BASE_URL, "  ")]))
                .unwrap();

        assert_eq!(config.identity.realm.as_deref(), Some("from-file"));
        assert_eq!(config.api.base_url, "");
    }

    #[test]
    fn test_invalid_timeout_is_config_error() {
        let result =
            apply_env_overrides(Config::default(), lookup(&[(ENV_API_TIMEOUT_SECS, "soon")]));
        assert!(matches!(result, Err(SimError::Config(_))));
    }

    #[test]
    fn test_load_from_env_reads_process_environment() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        std::env::set_var(ENV_KEYCLOAK_CLIENT_ID, "env-client");

        let config = load_from_env().unwrap();
        assert_eq!(config.identity.client_id.as_deref(), Some("env-client"));

        std::env::remove_var(ENV_KEYCLOAK_CLIENT_ID);
    }

    #[test]
    fn test_load_from_file_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[identity]
issuer_url = "https://sso.example.com"
realm = "sim"

[api]
base_url = "https://api.example.com"
"#
        )
        .unwrap();

        let config = load_from_file(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.identity.realm.as_deref(), Some("sim"));
        assert_eq!(config.identity.missing_fields(), vec!["client_id"]);
        assert_eq!(config.api.timeout_seconds, 30);
        assert_eq!(config.session.refresh_min_validity_seconds, 30);
        assert_eq!(config.session.token_min_validity_seconds, 300);
    }

    #[test]
    fn test_load_from_file_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"api": {{"base_url": "http://localhost:8080", "timeout_seconds": 5}}}}"#)
            .unwrap();

        let config = load_from_file(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.api.timeout_seconds, 5);
        assert!(!config.identity.is_configured());
    }

    #[test]
    fn test_load_from_file_missing() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/sim.toml")));
        assert!(matches!(result, Err(SimError::Config(msg)) if msg.contains("not found")));
    }

    #[test]
    fn test_parse_config_invalid_and_unsupported() {
        assert!(parse_config("{ not json", Path::new("sim.json")).is_err());
        assert!(parse_config("api = [", Path::new("sim.toml")).is_err());
        assert!(
            matches!(parse_config("", Path::new("sim.yaml")), Err(SimError::Config(msg)) if msg.contains("Unsupported"))
        );
    }
}

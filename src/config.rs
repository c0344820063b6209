//! Configuration consumed by the bridge core.
//!
//! The on-disk format is TOML. Defaults match the original deployment:
//! listen on 8022 and use `~/.ssh/id_rsa` on both legs until told otherwise.
//! Key files are loaded up front so a bad path or unparsable key fails at
//! startup rather than mid-handshake, and the loaded templates are cheap to
//! deep-copy per session (no mutable state is shared between sessions).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::{PrivateKey, load_secret_key};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

const DEFAULT_PORT: u16 = 8022;
const DEFAULT_KEY_PATH: &str = "~/.ssh/id_rsa";

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// TCP port the inbound SSH listener binds.
    pub port: u16,
    /// Host private keys presented to connecting clients.
    pub server_host_keys: Vec<PathBuf>,
    /// Private keys used to authenticate toward destination hosts.
    pub client_keys: Vec<PathBuf>,
    /// Log file; stderr only when unset.
    pub log_file_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            server_host_keys: vec![PathBuf::from(DEFAULT_KEY_PATH)],
            client_keys: vec![PathBuf::from(DEFAULT_KEY_PATH)],
            log_file_path: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file. Missing keys fall back to the
    /// defaults; unknown keys are rejected.
    pub fn load(path: &Path) -> BridgeResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|err| BridgeError::config(format!("{}: {err}", path.display())))
    }

    /// Render the configuration as TOML, e.g. to export the defaults as a
    /// starting point for a config file.
    pub fn to_toml(&self) -> BridgeResult<String> {
        toml::to_string_pretty(self).map_err(|err| BridgeError::config(err.to_string()))
    }

    /// Apply a single `key=value` override on top of the loaded file.
    /// List-valued keys take comma-separated paths.
    pub fn apply_override(&mut self, key: &str, value: &str) -> BridgeResult<()> {
        match key {
            "port" => {
                self.port = value
                    .parse()
                    .map_err(|_| BridgeError::config(format!("port must be a number between 0-65535: {value}")))?;
            }
            "server_host_keys" => self.server_host_keys = split_paths(value),
            "client_keys" => self.client_keys = split_paths(value),
            "log_file_path" => {
                self.log_file_path = if value.is_empty() { None } else { Some(PathBuf::from(value)) };
            }
            other => return Err(BridgeError::config(format!("unknown configuration key '{other}'"))),
        }
        Ok(())
    }

    /// Load the server-side template handed to the engine's listener.
    pub fn source_params(&self) -> BridgeResult<SourceParams> {
        Ok(SourceParams {
            host_keys: load_keys(&self.server_host_keys)?,
        })
    }

    /// Load the client keys used toward destination hosts.
    pub fn destination_keys(&self) -> BridgeResult<Vec<Arc<PrivateKey>>> {
        load_keys(&self.client_keys)
    }
}

/// Server-side configuration template: the identity the bridge presents to
/// connecting clients. Public-key client authentication only; the engine
/// adapter must not offer password auth.
#[derive(Clone)]
pub struct SourceParams {
    pub host_keys: Vec<Arc<PrivateKey>>,
}

/// Client-side configuration template for one destination leg. The username
/// is absent until captured from the client's first auth request.
#[derive(Clone)]
pub struct DestinationParams {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub client_keys: Vec<Arc<PrivateKey>>,
}

impl DestinationParams {
    /// Copy of this template with the captured username merged in.
    pub fn for_user(&self, username: &str) -> Self {
        let mut params = self.clone();
        params.username = Some(username.to_string());
        params
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn split_paths(value: &str) -> Vec<PathBuf> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Expand a leading `~/` to the current user's home directory. `~user` forms
/// are left alone.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    if raw != "~" && !raw.starts_with("~/") {
        return path.to_path_buf();
    }
    let Some(home) = home::home_dir() else {
        return path.to_path_buf();
    };
    home.join(raw.trim_start_matches('~').trim_start_matches('/'))
}

fn load_keys(paths: &[PathBuf]) -> BridgeResult<Vec<Arc<PrivateKey>>> {
    paths
        .iter()
        .map(|path| {
            let key = load_secret_key(expand_tilde(path), None)?;
            Ok(Arc::new(key))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use russh::keys::ssh_key::rand_core::OsRng;
    use russh::keys::{Algorithm, ssh_key};

    use super::*;

    #[test]
    fn defaults_match_original_deployment() {
        let config = BridgeConfig::default();
        assert_eq!(config.port, 8022);
        assert_eq!(config.server_host_keys, vec![PathBuf::from("~/.ssh/id_rsa")]);
        assert_eq!(config.client_keys, vec![PathBuf::from("~/.ssh/id_rsa")]);
        assert!(config.log_file_path.is_none());
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = BridgeConfig::default();
        config.port = 2222;
        config.log_file_path = Some(PathBuf::from("/var/log/jumpbridge.log"));
        let rendered = config.to_toml().unwrap();
        let parsed: BridgeConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn load_rejects_unknown_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 2222\nmystery = true").unwrap();
        let err = BridgeConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn load_uses_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 2222").unwrap();
        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.port, 2222);
        assert_eq!(config.client_keys, vec![PathBuf::from("~/.ssh/id_rsa")]);
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let mut config = BridgeConfig::default();
        config.apply_override("port", "2200").unwrap();
        config.apply_override("client_keys", "/etc/keys/a, /etc/keys/b").unwrap();
        config.apply_override("log_file_path", "").unwrap();
        assert_eq!(config.port, 2200);
        assert_eq!(
            config.client_keys,
            vec![PathBuf::from("/etc/keys/a"), PathBuf::from("/etc/keys/b")]
        );
        assert!(config.log_file_path.is_none());

        assert!(config.apply_override("port", "70000").is_err());
        assert!(config.apply_override("listen", "x").is_err());
    }

    #[test]
    fn destination_template_merges_username_without_mutating() {
        let template = DestinationParams {
            host: "target.example".into(),
            port: 22,
            username: None,
            client_keys: Vec::new(),
        };
        let merged = template.for_user("alice");
        assert_eq!(merged.username.as_deref(), Some("alice"));
        assert!(template.username.is_none());
        assert_eq!(merged.address(), "target.example:22");
    }

    #[test]
    fn expand_tilde_rewrites_home_prefix() {
        if let Some(home) = home::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/.ssh/id_rsa")), home.join(".ssh/id_rsa"));
        }
        assert_eq!(expand_tilde(Path::new("/etc/key")), PathBuf::from("/etc/key"));
    }

    #[test]
    fn key_loading_validates_files() {
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let mut good = tempfile::NamedTempFile::new().unwrap();
        good.write_all(key.to_openssh(ssh_key::LineEnding::LF).unwrap().as_bytes())
            .unwrap();

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "not a key").unwrap();

        let config = BridgeConfig {
            server_host_keys: vec![good.path().to_path_buf()],
            client_keys: vec![bad.path().to_path_buf()],
            ..Default::default()
        };
        assert_eq!(config.source_params().unwrap().host_keys.len(), 1);
        assert!(matches!(config.destination_keys(), Err(BridgeError::Key(_))));
    }
}

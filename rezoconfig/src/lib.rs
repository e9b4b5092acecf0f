//! # REZOBridge configuration
//!
//! Loads the YAML configuration file, merges it over the embedded default
//! configuration, and exposes typed getters/setters. The configuration also
//! stores the server UDN, generated once and persisted so that control
//! points recognize the same logical device after a restart.
//!
//! ## Usage
//!
//! ```no_run
//! use rezoconfig::get_config;
//!
//! let config = get_config();
//! let port = config.http_port();
//! let udn = config.server_udn()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Result, anyhow};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tracing::info;
use uuid::Uuid;

const DEFAULT_CONFIG: &str = include_str!("rezobridge.yaml");

const ENV_CONFIG_DIR: &str = "REZOBRIDGE_CONFIG";

const DEFAULT_HTTP_PORT: u16 = 8200;

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load("").expect("Failed to load REZOBridge configuration"));
}

/// Returns the global configuration singleton.
pub fn get_config() -> Arc<Config> {
    Arc::clone(&CONFIG)
}

/// Configuration manager backed by a YAML document.
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    path: PathBuf,
    data: Mutex<Value>,
}

impl Config {
    /// Resolves the configuration directory: explicit argument, then the
    /// `REZOBRIDGE_CONFIG` environment variable, then `~/.rezobridge`.
    fn find_config_dir(directory: &str) -> PathBuf {
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Loading config from env");
            return PathBuf::from(env_path);
        }

        home_dir()
            .map(|h| h.join(".rezobridge"))
            .unwrap_or_else(|| PathBuf::from(".rezobridge"))
    }

    /// Loads the configuration, creating the file from the embedded default
    /// if it does not exist yet.
    pub fn load(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        let path = config_dir.join("rezobridge.yaml");

        let defaults: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let data = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let user: Value = serde_yaml::from_str(&text)?;
            merge(defaults, user)
        } else {
            fs::create_dir_all(&config_dir)?;
            fs::write(&path, DEFAULT_CONFIG)?;
            info!(path = %path.display(), "Wrote default configuration");
            defaults
        };

        Ok(Self {
            config_dir,
            path,
            data: Mutex::new(data),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn get_value(&self, path: &[&str]) -> Option<Value> {
        let data = self.data.lock().expect("Config mutex poisoned");
        let mut current = &*data;
        for key in path {
            current = current.get(*key)?;
        }
        Some(current.clone())
    }

    fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock().expect("Config mutex poisoned");
            let mut current = &mut *data;
            for key in &path[..path.len() - 1] {
                if current.get(*key).is_none() {
                    let map = current
                        .as_mapping_mut()
                        .ok_or_else(|| anyhow!("Config node {} is not a mapping", key))?;
                    map.insert(Value::String((*key).to_string()), Value::Mapping(Mapping::new()));
                }
                current = current.get_mut(*key).expect("Key inserted above");
            }
            let map = current
                .as_mapping_mut()
                .ok_or_else(|| anyhow!("Config leaf parent is not a mapping"))?;
            map.insert(
                Value::String(path[path.len() - 1].to_string()),
                value,
            );
        }
        self.save()
    }

    fn save(&self) -> Result<()> {
        let data = self.data.lock().expect("Config mutex poisoned");
        let text = serde_yaml::to_string(&*data)?;
        fs::create_dir_all(&self.config_dir)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    /// HTTP port for the local content-directory server.
    pub fn http_port(&self) -> u16 {
        match self.get_value(&["http", "port"]) {
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .unwrap_or(DEFAULT_HTTP_PORT),
            _ => DEFAULT_HTTP_PORT,
        }
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["http", "port"], Value::Number(port.into()))
    }

    /// Root directory of the exported media tree.
    pub fn media_root(&self) -> PathBuf {
        match self.get_value(&["media", "root"]) {
            Some(Value::String(s)) if !s.is_empty() => PathBuf::from(s),
            _ => home_dir()
                .map(|h| h.join("Music"))
                .unwrap_or_else(|| PathBuf::from("Music")),
        }
    }

    pub fn set_media_root(&self, root: &Path) -> Result<()> {
        self.set_value(
            &["media", "root"],
            Value::String(root.to_string_lossy().into_owned()),
        )
    }

    /// Friendly name advertised by the local server.
    pub fn friendly_name(&self) -> String {
        match self.get_value(&["server", "friendly_name"]) {
            Some(Value::String(s)) if !s.is_empty() => s,
            _ => "REZOBridge".to_string(),
        }
    }

    /// UDN of the local server. Generated and persisted on first access so
    /// the device identity survives restarts on a different address.
    pub fn server_udn(&self) -> Result<String> {
        if let Some(Value::String(s)) = self.get_value(&["server", "udn"]) {
            if !s.is_empty() {
                return Ok(s);
            }
        }

        let udn = format!("uuid:{}", Uuid::new_v4());
        self.set_value(&["server", "udn"], Value::String(udn.clone()))?;
        info!(udn = %udn, "Generated persistent server UDN");
        Ok(udn)
    }
}

/// Merges `user` over `defaults`, recursing through mappings.
fn merge(defaults: Value, user: Value) -> Value {
    match (defaults, user) {
        (Value::Mapping(mut base), Value::Mapping(over)) => {
            for (key, value) in over {
                let merged = match base.remove(&key) {
                    Some(existing) => merge(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Mapping(base)
        }
        (_, user) => user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        Config::load(dir.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn defaults_are_applied() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        assert_eq!(config.http_port(), DEFAULT_HTTP_PORT);
        assert_eq!(config.friendly_name(), "REZOBridge");
    }

    #[test]
    fn values_survive_reload() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        config.set_http_port(9000).unwrap();

        let reloaded = config_in(&dir);
        assert_eq!(reloaded.http_port(), 9000);
    }

    #[test]
    fn udn_is_stable_across_reloads() {
        let dir = TempDir::new().unwrap();
        let first = config_in(&dir).server_udn().unwrap();
        assert!(first.starts_with("uuid:"));

        let second = config_in(&dir).server_udn().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn user_values_merge_over_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("rezobridge.yaml"),
            "http:\n  port: 8400\n",
        )
        .unwrap();

        let config = config_in(&dir);
        assert_eq!(config.http_port(), 8400);
        // Untouched sections keep their defaults.
        assert_eq!(config.friendly_name(), "REZOBridge");
    }
}

// src/config.rs
//
// Layered configuration.
//
// Precedence, lowest first:
// 1. Built-in defaults.
// 2. `lablog.yaml` in the data directory.
// 3. Environment (LABLOG_DATA_DIR, LABLOG_MIRROR_URL).
// 4. Command-line flags, applied by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "lablog.yaml";
pub const ENV_DATA_DIR: &str = "LABLOG_DATA_DIR";
pub const ENV_MIRROR_URL: &str = "LABLOG_MIRROR_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Resolved before the file is read, so never taken from it.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Primary store file, relative to `data_dir`.
    pub store_file: String,

    /// Session flag file, relative to `data_dir`.
    pub session_file: String,

    pub mirror: MirrorConfig,

    /// Written by `lablog init` when no catalog exists yet.
    pub default_catalog: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Reporting endpoint. No URL, no mirroring.
    pub url: Option<String>,

    /// Treat non-2xx answers as failures. Off by default because the usual
    /// endpoint (a script web app) cannot be relied on to report status.
    pub observe_response: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            store_file: "lablog.db".into(),
            session_file: "session.db".into(),
            mirror: MirrorConfig::default(),
            default_catalog: ["Microscope", "Pipette", "Centrifuge", "Beaker"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Full load from the process environment.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        Self::load_with(data_dir, |key| std::env::var(key).ok())
    }

    /// `env` stands in for `std::env::var` so tests stay hermetic.
    pub fn load_with(
        data_dir: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let dir = data_dir
            .or_else(|| env(ENV_DATA_DIR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        let file = dir.join(CONFIG_FILE);
        let mut config = if file.exists() {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            Self::from_yaml(&raw).with_context(|| format!("Invalid config {:?}", file))?
        } else {
            Self::default()
        };
        config.data_dir = dir;

        if let Some(url) = env(ENV_MIRROR_URL) {
            config.mirror.url = Some(url);
        }
        config.mirror.url = config.mirror.url.filter(|u| !u.trim().is_empty());

        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn store_path(&self) -> PathBuf {
        self.resolve(&self.store_file)
    }

    pub fn session_path(&self) -> PathBuf {
        self.resolve(&self.session_file)
    }

    fn resolve(&self, file: &str) -> PathBuf {
        let p = Path::new(file);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.data_dir.join(p)
        }
    }
}

// src/config.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logbook: LogbookConfig,
    #[serde(default)]
    pub dscache: DscacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

impl RepoConfig {
    /// Read `<root>/config.toml`, falling back to defaults when it is absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("config.toml");
        let mut cfg = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            toml::from_str::<RepoConfig>(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        } else {
            tracing::info!(
                "No config file found at {}. Using RepoConfig::default().",
                path.display()
            );
            RepoConfig::default()
        };
        cfg.resolve_paths(root);
        Ok(cfg)
    }

    /// Load, first writing a default config with a freshly minted profile id
    /// if the repo has none yet.
    pub fn load_or_init(root: &Path) -> Result<Self> {
        if !root.join("config.toml").exists() {
            let mut cfg = RepoConfig::default();
            cfg.profile.id = ProfileConfig::mint_id();
            cfg.save(root)?;
            tracing::info!(root = %root.display(), profile_id = %cfg.profile.id, "initialized repo config");
        }
        Self::load(root)
    }

    /// Write this config as `<root>/config.toml`, paths as currently held.
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = root.join("config.toml");
        let text = toml::to_string_pretty(self).context("serializing config")?;
        crate::utils::fsio::write_atomic(&path, text.as_bytes())
            .with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }

    fn resolve_paths(&mut self, root: &Path) {
        self.store.path = absolutize(root, &self.store.path);
        self.logbook.path = absolutize(root, &self.logbook.path);
        self.dscache.path = absolutize(root, &self.dscache.path);
    }
}

/// The acting identity for saves in this repo.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProfileConfig {
    #[serde(default = "ProfileConfig::default_peername")]
    pub peername: String,
    #[serde(default)]
    pub id: String,
}

impl ProfileConfig {
    fn default_peername() -> String {
        "me".to_string()
    }

    /// Random base58 profile id.
    pub fn mint_id() -> String {
        let seed = uuid::Uuid::new_v4();
        bs58::encode(blake3::hash(seed.as_bytes()).as_bytes()).into_string()
    }
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            peername: Self::default_peername(),
            id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Fs,
    Mem,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "StoreConfig::default_kind")]
    pub kind: StoreKind,
    #[serde(default = "StoreConfig::default_path")]
    pub path: PathBuf,
}

impl StoreConfig {
    fn default_kind() -> StoreKind {
        StoreKind::Fs
    }

    fn default_path() -> PathBuf {
        PathBuf::from("store")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: Self::default_kind(),
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogbookConfig {
    #[serde(default = "LogbookConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "LogbookConfig::default_path")]
    pub path: PathBuf,
}

impl LogbookConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_path() -> PathBuf {
        PathBuf::from("logbook.jsonl")
    }
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DscacheConfig {
    #[serde(default = "DscacheConfig::default_path")]
    pub path: PathBuf,
}

impl DscacheConfig {
    fn default_path() -> PathBuf {
        PathBuf::from("dscache.json")
    }
}

impl Default for DscacheConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    /// Upper bound on a fallback history walk.
    #[serde(default = "HistoryConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl HistoryConfig {
    fn default_timeout_ms() -> u64 {
        100
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

fn absolutize(root: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        root.join(value)
    }
}

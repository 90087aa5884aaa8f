//! Configuration loading for mdkb.

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MDKB_CONFIG";

/// Top-level configuration loaded from config.toml.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

/// Where documents and their backups live.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_content_root")]
    pub root: String,
    /// Knowledgebase used by writes that name none.
    #[serde(default)]
    pub default_knowledgebase: Option<String>,
    /// Defaults to a `.backups` directory next to the content root.
    #[serde(default)]
    pub backups_dir: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,
}

/// Limits and locations for the two-phase archive import.
#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Cap on the declared uncompressed size of an archive.
    #[serde(default = "default_max_extracted_bytes")]
    pub max_extracted_bytes: u64,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: i64,
    /// Age after which any import directory is swept.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: i64,
    /// Candidate parents for session directories, tried in order.
    #[serde(default)]
    pub temp_roots: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_site_title")]
    pub site_title: String,
}

fn default_content_root() -> String {
    ProjectDirs::from("", "", "mdkb").map_or_else(
        || "./content".to_string(),
        |dirs| dirs.data_dir().join("content").to_string_lossy().into_owned(),
    )
}

fn default_max_backups() -> usize {
    10
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_max_extracted_bytes() -> u64 {
    200 * 1024 * 1024
}

fn default_session_timeout_secs() -> i64 {
    3600
}

fn default_retention_secs() -> i64 {
    24 * 60 * 60
}

fn default_site_title() -> String {
    "Markdown Knowledge Base".to_string()
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            root: default_content_root(),
            default_knowledgebase: None,
            backups_dir: None,
            max_backups: default_max_backups(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            max_extracted_bytes: default_max_extracted_bytes(),
            session_timeout_secs: default_session_timeout_secs(),
            retention_secs: default_retention_secs(),
            temp_roots: Vec::new(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            site_title: default_site_title(),
        }
    }
}

impl Config {
    /// Load config from `$MDKB_CONFIG`, else ~/.config/mdkb/config.toml, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            return Self::load_from(&path);
        }

        Ok(Config::default())
    }

    /// Load config from an explicit file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read config {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(explicit));
        }
        ProjectDirs::from("", "", "mdkb").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Defaults with the content root pointed at `root`.
    #[must_use]
    pub fn with_content_root(root: &Path) -> Self {
        let mut config = Self::default();
        config.content.root = root.to_string_lossy().into_owned();
        config
    }
}

impl ContentConfig {
    #[must_use]
    pub fn root_path(&self) -> PathBuf {
        expand_tilde(&self.root)
    }

    #[must_use]
    pub fn backups_path(&self) -> PathBuf {
        if let Some(dir) = &self.backups_dir {
            return expand_tilde(dir);
        }
        let root = self.root_path();
        match root.parent() {
            Some(parent) => parent.join(".backups"),
            None => root.join(".backups"),
        }
    }
}

impl ImportConfig {
    /// Candidate temp roots in search order, without duplicates.
    #[must_use]
    pub fn temp_root_paths(&self, content: &ContentConfig) -> Vec<PathBuf> {
        let candidates: Vec<PathBuf> = if self.temp_roots.is_empty() {
            let content_root = content.root_path();
            let sibling = content_root
                .parent()
                .map_or_else(|| PathBuf::from("temp"), |p| p.join("temp"));
            vec![PathBuf::from("/tmp"), std::env::temp_dir(), sibling]
        } else {
            self.temp_roots.iter().map(|p| expand_tilde(p)).collect()
        };

        let mut unique: Vec<PathBuf> = Vec::with_capacity(candidates.len());
        for path in candidates {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        unique
    }
}

/// Expand ~ to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(base_dirs) = BaseDirs::new()
    {
        return base_dirs.home_dir().join(rest);
    }
    PathBuf::from(path)
}

//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{LabError, Result};
use crate::core::paths::resolve_absolute_path;
use crate::query::mutation::MutationKind;

/// Full labdesk configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub grid: GridConfig,
    pub picker: PickerConfig,
    pub paths: PathsConfig,
    pub media: MediaConfig,
    pub ui: UiConfig,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout. `None` leaves the transport default in place.
    pub timeout_ms: Option<u64>,
}

/// Management-grid behavior shared by every list screen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GridConfig {
    /// Quiet interval before a burst of query changes is sent.
    pub debounce_ms: u64,
    pub default_page_size: u32,
    /// Allow-list of page sizes a grid accepts.
    pub page_sizes: Vec<u32>,
    /// Mutation kinds (`create`, `update`, `delete`, `duplicate`) after which the
    /// grid returns to the first page before refetching.
    pub reset_page_after: Vec<String>,
}

/// Type-ahead picker settings (user/asset selectors).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PickerConfig {
    pub debounce_ms: u64,
    pub page_size: u32,
}

/// Filesystem paths used by labdesk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub token_file: PathBuf,
    pub jsonl_log: PathBuf,
    pub sqlite_db: PathBuf,
}

/// Image upload side-channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MediaConfig {
    pub api_url: String,
    pub cloud_name: String,
    pub upload_preset: String,
}

/// Presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UiConfig {
    /// `en`, `vi`, or empty to detect from the environment.
    pub locale: String,
    pub max_alerts: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api/v1".to_string(),
            timeout_ms: None,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            default_page_size: 10,
            page_sizes: vec![5, 10, 20, 50, 100],
            reset_page_after: Vec::new(),
        }
    }
}

impl Default for PickerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            page_size: 20,
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.cloudinary.com/v1_1".to_string(),
            cloud_name: String::new(),
            upload_preset: String::new(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            locale: String::new(),
            max_alerts: 5,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[LAB-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("labdesk").join("config.toml");
        let data = home_dir.join(".local").join("share").join("labdesk");
        Self {
            config_file: cfg,
            token_file: data.join("session.json"),
            jsonl_log: data.join("activity.jsonl"),
            sqlite_db: data.join("activity.sqlite3"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, resolve_absolute_path);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| LabError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(LabError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a keeps the value stable across processes and Rust releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("LABDESK_API_BASE_URL") {
            self.api.base_url = raw;
        }
        if let Some(raw) = lookup("LABDESK_API_TIMEOUT_MS") {
            self.api.timeout_ms = Some(parse_env_u64("LABDESK_API_TIMEOUT_MS", &raw)?);
        }

        if let Some(raw) = lookup("LABDESK_GRID_DEBOUNCE_MS") {
            self.grid.debounce_ms = parse_env_u64("LABDESK_GRID_DEBOUNCE_MS", &raw)?;
        }
        if let Some(raw) = lookup("LABDESK_GRID_DEFAULT_PAGE_SIZE") {
            self.grid.default_page_size = parse_env_u32("LABDESK_GRID_DEFAULT_PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("LABDESK_PICKER_DEBOUNCE_MS") {
            self.picker.debounce_ms = parse_env_u64("LABDESK_PICKER_DEBOUNCE_MS", &raw)?;
        }
        if let Some(raw) = lookup("LABDESK_PICKER_PAGE_SIZE") {
            self.picker.page_size = parse_env_u32("LABDESK_PICKER_PAGE_SIZE", &raw)?;
        }

        if let Some(raw) = lookup("LABDESK_TOKEN_FILE") {
            self.paths.token_file = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("LABDESK_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("LABDESK_SQLITE_DB") {
            self.paths.sqlite_db = PathBuf::from(raw);
        }

        // The upload side-channel keeps the variable names the web build used.
        if let Some(raw) = lookup("VITE_CLOUDINARY_UPLOAD_PRESET") {
            self.media.upload_preset = raw;
        }
        if let Some(raw) = lookup("VITE_CLOUDINARY_CLOUD_NAME") {
            self.media.cloud_name = raw;
        }
        if let Some(raw) = lookup("VITE_CLOUDINARY_API_URL") {
            self.media.api_url = raw;
        }

        if let Some(raw) = lookup("LABDESK_LOCALE") {
            self.ui.locale = raw;
        }

        Ok(())
    }

    fn normalize(&mut self) {
        while self.api.base_url.len() > 1 && self.api.base_url.ends_with('/') {
            self.api.base_url.pop();
        }
        while self.media.api_url.len() > 1 && self.media.api_url.ends_with('/') {
            self.media.api_url.pop();
        }
        self.grid.page_sizes.sort_unstable();
        self.grid.page_sizes.dedup();
        self.ui.locale = self.ui.locale.trim().to_ascii_lowercase();
    }

    fn validate(&self) -> Result<()> {
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            return Err(LabError::InvalidConfig {
                details: format!(
                    "api.base_url must start with http:// or https://, got {:?}",
                    self.api.base_url
                ),
            });
        }

        if self.api.timeout_ms == Some(0) {
            return Err(LabError::InvalidConfig {
                details: "api.timeout_ms must be > 0 when set".to_string(),
            });
        }

        if self.grid.page_sizes.is_empty() || self.grid.page_sizes.contains(&0) {
            return Err(LabError::InvalidConfig {
                details: "grid.page_sizes must be non-empty and contain only sizes > 0"
                    .to_string(),
            });
        }

        if !self.grid.page_sizes.contains(&self.grid.default_page_size) {
            return Err(LabError::InvalidConfig {
                details: format!(
                    "grid.default_page_size ({}) must be one of grid.page_sizes {:?}",
                    self.grid.default_page_size, self.grid.page_sizes
                ),
            });
        }

        for kind in &self.grid.reset_page_after {
            if MutationKind::parse(kind).is_err() {
                return Err(LabError::InvalidConfig {
                    details: format!("grid.reset_page_after contains unknown mutation {kind:?}"),
                });
            }
        }

        if self.picker.page_size == 0 {
            return Err(LabError::InvalidConfig {
                details: "picker.page_size must be >= 1".to_string(),
            });
        }

        if !matches!(self.ui.locale.as_str(), "" | "en" | "vi") {
            return Err(LabError::InvalidConfig {
                details: format!("ui.locale must be \"en\" or \"vi\", got {:?}", self.ui.locale),
            });
        }

        if self.ui.max_alerts == 0 {
            return Err(LabError::InvalidConfig {
                details: "ui.max_alerts must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|error| LabError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_env_u32(name: &str, raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|error| LabError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

#[cfg(test)]
mod tests {
    use super::{Config, LabError};
    use std::collections::HashMap;
    use std::path::Path;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_page_size_must_be_allowed() {
        let mut cfg = Config::default();
        cfg.grid.default_page_size = 7;
        let err = cfg.validate().expect_err("expected invalid page size");
        match err {
            LabError::InvalidConfig { details } => assert!(details.contains("default_page_size")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn base_url_scheme_enforced() {
        let mut cfg = Config::default();
        cfg.api.base_url = "ftp://lab".to_string();
        let err = cfg.validate().expect_err("expected scheme error");
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn unknown_reset_kind_rejected() {
        let mut cfg = Config::default();
        cfg.grid.reset_page_after = vec!["archive".to_string()];
        let err = cfg.validate().expect_err("expected mutation kind error");
        assert!(err.to_string().contains("archive"));
    }

    #[test]
    fn reset_kinds_accept_what_the_refetch_policy_parses() {
        let mut cfg = Config::default();
        cfg.grid.reset_page_after = vec![" create".to_string(), "Delete ".to_string()];
        cfg.validate().expect("padded kinds are valid");
        assert!(crate::query::mutation::RefetchPolicy::from_config(&cfg.grid).is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        let overrides = vars(&[
            ("LABDESK_API_BASE_URL", "https://lab.example.edu/api/"),
            ("LABDESK_GRID_DEBOUNCE_MS", "600"),
            ("VITE_CLOUDINARY_CLOUD_NAME", "labcloud"),
            ("VITE_CLOUDINARY_UPLOAD_PRESET", "assets"),
        ]);
        cfg.apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect("env overrides should parse");
        cfg.normalize();

        assert_eq!(cfg.api.base_url, "https://lab.example.edu/api");
        assert_eq!(cfg.grid.debounce_ms, 600);
        assert_eq!(cfg.media.cloud_name, "labcloud");
        assert_eq!(cfg.media.upload_preset, "assets");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_invalid_number_rejected() {
        let mut cfg = Config::default();
        let overrides = vars(&[("LABDESK_GRID_DEBOUNCE_MS", "soon")]);
        let err = cfg
            .apply_env_overrides_from(|name| overrides.get(name).cloned())
            .expect_err("invalid number should fail");
        match err {
            LabError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("LABDESK_GRID_DEBOUNCE_MS"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn toml_sections_parse() {
        let raw = r#"
            [api]
            base_url = "https://lab.example.edu"
            timeout_ms = 5000

            [grid]
            debounce_ms = 450
            default_page_size = 20
            reset_page_after = ["create"]

            [ui]
            locale = "VI"
        "#;
        let mut cfg: Config = toml::from_str(raw).expect("toml parses");
        cfg.normalize();
        assert_eq!(cfg.api.timeout_ms, Some(5000));
        assert_eq!(cfg.grid.default_page_size, 20);
        assert_eq!(cfg.ui.locale, "vi");
        assert_eq!(cfg.picker.page_size, 20);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let result = Config::load(Some(Path::new("/nonexistent/labdesk/config.toml")));
        assert!(matches!(result, Err(LabError::MissingConfig { .. })));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[grid]\ndebounce_ms = 350\n").unwrap();
        let cfg = Config::load(Some(&path)).expect("config loads");
        assert_eq!(cfg.grid.debounce_ms, 350);
        assert!(cfg.paths.config_file.ends_with("config.toml"));
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let cfg = Config::default();
        let before = cfg.stable_hash().expect("hash");
        let mut modified = Config::default();
        modified.grid.debounce_ms += 1;
        assert_ne!(before, modified.stable_hash().expect("hash"));
        assert_eq!(before, cfg.stable_hash().expect("hash"));
    }
}

use crate::request::IdentityConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_EXPORT_TOOL: &str = "native";

const SYSTEM_CONFIG: &str = "/etc/pkgexport.conf";

const ENV_REPO_CACHE_DIR: &str = "PKGEXPORT_REPO_CACHE_DIR";
const ENV_EXPORT_USER: &str = "PKGEXPORT_EXPORT_USER";
const ENV_EXPORT_GROUP: &str = "PKGEXPORT_EXPORT_GROUP";
const ENV_EXPORT_TOOL: &str = "PKGEXPORT_EXPORT_TOOL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    general: GeneralSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct GeneralSection {
    #[serde(default)]
    repo_cache_dir: Option<PathBuf>,
    #[serde(default)]
    export_user: Option<String>,
    #[serde(default)]
    export_group: Option<String>,
    #[serde(default)]
    export_tool: Option<String>,
    /// Zero disables the timeout.
    #[serde(default)]
    export_timeout_secs: Option<u64>,
}

/// Effective service configuration: defaults, then config files in order,
/// then environment overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub repo_cache_dir: PathBuf,
    pub identity: IdentityConfig,
    pub export_tool: String,
    /// `None` lets the export run for as long as the tool takes.
    pub export_timeout: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            repo_cache_dir: default_cache_dir(),
            identity: IdentityConfig::default(),
            export_tool: DEFAULT_EXPORT_TOOL.to_owned(),
            export_timeout: None,
        }
    }
}

impl ServiceConfig {
    /// Load from an explicit file, or from the system and user config files
    /// when `explicit` is `None`. Missing files are skipped.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    warn!("config file {} not found, using defaults", path.display());
                }
                Self::load_files(&[path.to_path_buf()])
            }
            None => Self::load_files(&default_config_paths()),
        }
    }

    pub fn load_files(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for path in paths {
            if !path.exists() {
                debug!("skipping missing config file {}", path.display());
                continue;
            }
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let file: ConfigFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
            debug!("loaded config file {}", path.display());
            config.apply(file.general);
        }
        Ok(config)
    }

    /// Parse a single config document on top of the defaults.
    pub fn parse_str(input: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(input)?;
        let mut config = Self::default();
        config.apply(file.general);
        Ok(config)
    }

    fn apply(&mut self, section: GeneralSection) {
        if let Some(dir) = section.repo_cache_dir {
            self.repo_cache_dir = dir;
        }
        if let Some(user) = section.export_user {
            self.identity.user = Some(user);
        }
        if let Some(group) = section.export_group {
            self.identity.group = Some(group);
        }
        if let Some(tool) = section.export_tool {
            self.export_tool = tool;
        }
        if let Some(secs) = section.export_timeout_secs {
            self.export_timeout = (secs > 0).then_some(Duration::from_secs(secs));
        }
    }

    /// Apply `PKGEXPORT_*` overrides. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(dir) = get(ENV_REPO_CACHE_DIR) {
            self.repo_cache_dir = PathBuf::from(dir);
        }
        if let Some(user) = get(ENV_EXPORT_USER) {
            self.identity.user = Some(user);
        }
        if let Some(group) = get(ENV_EXPORT_GROUP) {
            self.identity.group = Some(group);
        }
        if let Some(tool) = get(ENV_EXPORT_TOOL) {
            self.export_tool = tool;
        }
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(SYSTEM_CONFIG)];
    if let Ok(home) = std::env::var("HOME") {
        paths.push(PathBuf::from(home).join(".config/pkgexport.conf"));
    }
    paths
}

fn default_cache_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache/pkgexport/repos")
    } else {
        PathBuf::from("/tmp/pkgexport/repos")
    }
}

//! Configuration for scyllactl.
//!
//! Settings are layered: built-in defaults, then an optional TOML or YAML
//! file, then `SCYLLA_CLUSTER_*` environment variables, and finally command
//! line flags applied by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dispatcher::ClusterRef;
use crate::error::{CtlError, Result};
use crate::output::OutputFormat;
use crate::replace::ReplacementOptions;

/// Environment variable naming the target cluster.
pub const CLUSTER_NAME_ENV: &str = "SCYLLA_CLUSTER_NAME";

/// Environment variable naming the target cluster's namespace.
pub const CLUSTER_NAMESPACE_ENV: &str = "SCYLLA_CLUSTER_NAMESPACE";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CtlConfig {
    /// Target cluster.
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Node replacement defaults.
    #[serde(default)]
    pub replace: ReplacementOptions,
    /// Output preferences.
    #[serde(default)]
    pub output: OutputConfig,
    /// Logging preferences.
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// ScyllaCluster name
    pub name: Option<String>,

    /// Namespace of the ScyllaCluster
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Kubeconfig file; the in-cluster or default config is used when unset
    pub kubeconfig: Option<PathBuf>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: None,
            namespace: default_namespace(),
            kubeconfig: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format
    #[serde(default)]
    pub format: OutputFormat,

    /// Enable colors
    #[serde(default = "default_true")]
    pub colors: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            colors: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_true() -> bool {
    true
}

impl CtlConfig {
    /// Load configuration from a file and the environment.
    ///
    /// An explicitly given file must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a TOML or YAML file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CtlError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let is_yaml = path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml");
        let config = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        }
        .map_err(|e| CtlError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Default configuration file path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("scyllactl").join("config.toml"))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup(CLUSTER_NAME_ENV).filter(|v| !v.is_empty()) {
            self.cluster.name = Some(name);
        }
        if let Some(namespace) = lookup(CLUSTER_NAMESPACE_ENV).filter(|v| !v.is_empty()) {
            self.cluster.namespace = namespace;
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        match self.cluster.name.as_deref() {
            None | Some("") => {
                return Err(CtlError::Config(format!(
                    "cluster name is required (use --cluster or {})",
                    CLUSTER_NAME_ENV
                )))
            }
            Some(_) => {}
        }

        if self.cluster.namespace.is_empty() {
            return Err(CtlError::Config("namespace must not be empty".to_string()));
        }

        self.replace.validate()
    }

    /// The configured cluster, once validated.
    pub fn cluster_ref(&self) -> Result<ClusterRef> {
        self.validate()?;
        let name = self.cluster.name.clone().unwrap_or_default();
        Ok(ClusterRef::new(self.cluster.namespace.clone(), name))
    }
}

/// Parse a duration such as `500ms`, `5s`, `30m` or `1h`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    let parse = |v: &str| {
        v.trim()
            .parse::<u64>()
            .map_err(|e| format!("invalid duration {:?}: {}", s, e))
    };

    if let Some(ms) = s.strip_suffix("ms") {
        parse(ms).map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        parse(secs).map(Duration::from_secs)
    } else if let Some(m) = s.strip_suffix('m') {
        parse(m).map(|v| Duration::from_secs(v * 60))
    } else if let Some(h) = s.strip_suffix('h') {
        parse(h).map(|v| Duration::from_secs(v * 3600))
    } else {
        parse(s).map(Duration::from_secs)
    }
}

/// Format a duration in the largest unit that divides it exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let secs = duration.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Serde helper for human-readable durations.
pub mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

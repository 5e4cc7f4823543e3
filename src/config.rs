use crate::policy::{
    self, LimitPolicy, LimitPolicySource, PolicyError, DEFAULT_CPU_TIME_LIMIT_MS,
    DEFAULT_MEMORY_LIMIT_BYTES, DEFAULT_WALL_TIME_LIMIT_MS,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from procwarden.toml.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
#[derive(Default)]
pub struct WardenConfig {
    pub limits: LimitsConfig,
    pub supervisor: SupervisorConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub memory_limit_bytes: u64,
    pub cpu_time_limit_ms: u64,
    pub wall_time_limit_ms: u64,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupervisorConfig {
    pub tick_interval_ms: u64,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub path: PathBuf,
}

// --- Default implementations ---

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: DEFAULT_MEMORY_LIMIT_BYTES,
            cpu_time_limit_ms: DEFAULT_CPU_TIME_LIMIT_MS,
            wall_time_limit_ms: DEFAULT_WALL_TIME_LIMIT_MS,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("processlog.jsonl"),
        }
    }
}

impl LimitsConfig {
    pub fn to_policy(&self) -> Result<LimitPolicy, PolicyError> {
        LimitPolicy::new(
            self.memory_limit_bytes,
            self.cpu_time_limit_ms,
            self.wall_time_limit_ms,
        )
    }
}

impl SupervisorConfig {
    /// Tick interval, clamped to at least one millisecond.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Errors that can occur while loading the config file.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file does not exist.
    NotFound { path: PathBuf },
    /// The config file exists but could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The config file is not valid TOML for this schema.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// The `[limits]` section holds an unusable value.
    Invalid { path: PathBuf, source: PolicyError },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound { path } => {
                write!(f, "config file {} not found", path.display())
            }
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Invalid { path, source } => {
                write!(f, "invalid limits in {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::NotFound { .. } => None,
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { source, .. } => Some(source),
        }
    }
}

/// A TOML config file on disk.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the whole file.
    pub fn read(&self) -> Result<WardenConfig, ConfigError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: self.path.clone(),
                }
            } else {
                ConfigError::Read {
                    path: self.path.clone(),
                    source: e,
                }
            }
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Read the file, or fall back to the defaults if it is missing or broken.
    pub fn read_or_default(&self) -> WardenConfig {
        match self.read() {
            Ok(cfg) => cfg,
            Err(e @ ConfigError::NotFound { .. }) => {
                tracing::debug!(error = %e, "using default settings");
                WardenConfig::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "using default settings");
                WardenConfig::default()
            }
        }
    }

    /// Read the file once and derive both the settings and the limit policy.
    ///
    /// A broken `[limits]` section falls back to the default policy but keeps
    /// the rest of the settings.
    pub fn load_settings(&self) -> (WardenConfig, LimitPolicy) {
        let settings = self.read_or_default();
        let policy = policy::resolve(&FileLimits {
            path: &self.path,
            limits: &settings.limits,
        });
        (settings, policy)
    }
}

impl LimitPolicySource for ConfigFile {
    fn load(&self) -> Result<LimitPolicy, ConfigError> {
        let cfg = self.read()?;
        FileLimits {
            path: &self.path,
            limits: &cfg.limits,
        }
        .load()
    }
}

/// The `[limits]` section of an already-read config file.
struct FileLimits<'a> {
    path: &'a Path,
    limits: &'a LimitsConfig,
}

impl LimitPolicySource for FileLimits<'_> {
    fn load(&self) -> Result<LimitPolicy, ConfigError> {
        self.limits.to_policy().map_err(|e| ConfigError::Invalid {
            path: self.path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &Path, contents: &str) -> ConfigFile {
        let path = dir.join("procwarden.toml");
        std::fs::write(&path, contents).unwrap();
        ConfigFile::new(path)
    }

    #[test]
    fn test_defaults() {
        let cfg = WardenConfig::default();
        assert_eq!(cfg.limits.memory_limit_bytes, 268_435_456);
        assert_eq!(cfg.limits.cpu_time_limit_ms, 10_000);
        assert_eq!(cfg.limits.wall_time_limit_ms, 10_000);
        assert_eq!(cfg.supervisor.tick_interval(), Duration::from_millis(100));
        assert_eq!(cfg.log.path, PathBuf::from("processlog.jsonl"));
    }

    #[test]
    fn test_full_config_parses() {
        let dir = tempdir().unwrap();
        let file = write_config(
            dir.path(),
            r#"
[limits]
memory_limit_bytes = 1000
cpu_time_limit_ms = 2000
wall_time_limit_ms = 3000

[supervisor]
tick_interval_ms = 50

[log]
path = "/var/log/warden.jsonl"
"#,
        );
        let cfg = file.read().unwrap();
        assert_eq!(cfg.limits.memory_limit_bytes, 1000);
        assert_eq!(cfg.supervisor.tick_interval_ms, 50);
        assert_eq!(cfg.log.path, PathBuf::from("/var/log/warden.jsonl"));

        let policy = file.load().unwrap();
        assert_eq!(policy, LimitPolicy::new(1000, 2000, 3000).unwrap());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = tempdir().unwrap();
        let file = write_config(dir.path(), "[limits]\ncpu_time_limit_ms = 500\n");
        let policy = file.load().unwrap();
        assert_eq!(policy.cpu_time_limit_ms(), 500);
        assert_eq!(policy.memory_limit_bytes(), DEFAULT_MEMORY_LIMIT_BYTES);
        assert_eq!(policy.wall_time_limit_ms(), DEFAULT_WALL_TIME_LIMIT_MS);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("absent.toml"));
        assert!(matches!(file.read(), Err(ConfigError::NotFound { .. })));
        assert_eq!(file.read_or_default(), WardenConfig::default());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let file = write_config(dir.path(), "[limits\nmemory_limit_bytes = ");
        let err = file.read().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse config"));
        assert_eq!(file.read_or_default(), WardenConfig::default());
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let dir = tempdir().unwrap();
        let file = write_config(dir.path(), "[limits]\nmemory_limit_bytes = \"lots\"\n");
        assert!(matches!(file.load(), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_zero_limit_is_invalid() {
        let dir = tempdir().unwrap();
        let file = write_config(dir.path(), "[limits]\nwall_time_limit_ms = 0\n");
        let err = file.load().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("wall_time_limit_ms"));
    }

    #[test]
    fn test_unreadable_source_resolves_to_defaults() {
        let dir = tempdir().unwrap();
        let missing = ConfigFile::new(dir.path().join("nope.toml"));
        assert_eq!(policy::resolve(&missing), LimitPolicy::default());

        let broken = write_config(dir.path(), "not toml at all [[[");
        assert_eq!(policy::resolve(&broken), LimitPolicy::default());
    }

    #[test]
    fn test_load_settings_from_one_read() {
        let dir = tempdir().unwrap();
        let file = write_config(
            dir.path(),
            "[limits]\nmemory_limit_bytes = 4096\n\n[supervisor]\ntick_interval_ms = 25\n",
        );
        let (settings, policy) = file.load_settings();
        assert_eq!(settings.supervisor.tick_interval(), Duration::from_millis(25));
        assert_eq!(policy.memory_limit_bytes(), 4096);
        assert_eq!(policy.cpu_time_limit_ms(), DEFAULT_CPU_TIME_LIMIT_MS);
    }

    #[test]
    fn test_load_settings_malformed_file_falls_back() {
        let dir = tempdir().unwrap();
        let file = write_config(dir.path(), "not toml at all [[[");
        let (settings, policy) = file.load_settings();
        assert_eq!(settings, WardenConfig::default());
        assert_eq!(policy, LimitPolicy::default());
    }

    #[test]
    fn test_load_settings_invalid_limits_keep_other_sections() {
        let dir = tempdir().unwrap();
        let file = write_config(
            dir.path(),
            "[limits]\ncpu_time_limit_ms = 0\n\n[log]\npath = \"events.jsonl\"\n",
        );
        let (settings, policy) = file.load_settings();
        assert_eq!(settings.log.path, PathBuf::from("events.jsonl"));
        assert_eq!(policy, LimitPolicy::default());
    }

    #[test]
    fn test_zero_tick_interval_is_clamped() {
        let cfg = SupervisorConfig {
            tick_interval_ms: 0,
        };
        assert_eq!(cfg.tick_interval(), Duration::from_millis(1));
    }
}

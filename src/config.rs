//! Layered configuration: typed defaults, then an optional TOML file on top.
//!
//! Loading is two-stage, matching the teacher's `PackOptions::default()` +
//! CLI-override pattern: [`Config::default`] builds the table of defaults,
//! then [`Config::load`] merges a `kaeya.toml` (or an explicit path) over it.
//! Unknown keys in the file are rejected loudly (`#[serde(deny_unknown_fields)]`)
//! rather than silently ignored, and a malformed size/duration string is a
//! fatal [`ConfigError`] — never a silently-clamped default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::units::{parse_duration, parse_size};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageSystem {
    Fs,
    Segment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The `log::LevelFilter` this level maps to, for `main` to hand to
    /// `env_logger`. The library itself never calls this — only the binary,
    /// at process entry.
    pub fn as_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// Fully resolved, validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_system: StorageSystem,
    pub storage_codec: CodecKind,
    pub storage_path: PathBuf,
    pub buffer_size: u64,
    pub merge_floor: u64,
    pub refresh_interval: Duration,
    pub flush_interval: Duration,
    pub merge_interval: Duration,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_system: StorageSystem::Segment,
            storage_codec: CodecKind::Csv,
            storage_path: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            buffer_size: 1024,
            merge_floor: 1024,
            refresh_interval: Duration::from_secs(1),
            flush_interval: Duration::from_secs(15),
            merge_interval: Duration::from_secs(30),
            log_level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load defaults, then merge an optional TOML file on top.
    ///
    /// `path = Some(p)` means the caller asked for a specific file — it must
    /// exist and parse, or loading fails. `path = None` probes `kaeya.toml`
    /// in the current directory; its absence is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let resolved = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let default_path = PathBuf::from("kaeya.toml");
                if default_path.is_file() {
                    Some(default_path)
                } else {
                    None
                }
            }
        };

        let Some(file_path) = resolved else {
            return Ok(config);
        };

        let text = std::fs::read_to_string(&file_path).map_err(|source| ConfigError::Read {
            path: file_path.clone(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: file_path.clone(),
            source,
        })?;

        raw.merge_into(&mut config)?;
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    storage: Option<RawStorage>,
    segment: Option<RawSegment>,
    log: Option<RawLog>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStorage {
    system: Option<String>,
    codec: Option<String>,
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSegment {
    buffer_size: Option<String>,
    merge_floor: Option<String>,
    refresh_interval: Option<String>,
    flush_interval: Option<String>,
    merge_interval: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLog {
    level: Option<String>,
}

impl RawConfig {
    fn merge_into(self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(storage) = self.storage {
            if let Some(system) = storage.system {
                config.storage_system = match system.as_str() {
                    "fs" => StorageSystem::Fs,
                    "segment" => StorageSystem::Segment,
                    other => return Err(ConfigError::InvalidStorageSystem(other.to_string())),
                };
            }
            if let Some(codec) = storage.codec {
                config.storage_codec = match codec.as_str() {
                    "csv" => CodecKind::Csv,
                    other => return Err(ConfigError::InvalidFormat(other.to_string())),
                };
            }
            if let Some(path) = storage.path {
                config.storage_path = path;
            }
        }

        if let Some(segment) = self.segment {
            if let Some(s) = segment.buffer_size {
                config.buffer_size = parse_size(&s)?;
            }
            if let Some(s) = segment.merge_floor {
                config.merge_floor = parse_size(&s)?;
            }
            if let Some(s) = segment.refresh_interval {
                config.refresh_interval = parse_duration(&s)?;
            }
            if let Some(s) = segment.flush_interval {
                config.flush_interval = parse_duration(&s)?;
            }
            if let Some(s) = segment.merge_interval {
                config.merge_interval = parse_duration(&s)?;
            }
        }

        if let Some(log) = self.log {
            if let Some(level) = log.level {
                config.log_level = match level.as_str() {
                    "debug" => LogLevel::Debug,
                    "info" => LogLevel::Info,
                    "warn" => LogLevel::Warn,
                    "error" => LogLevel::Error,
                    other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
                };
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    /// `Config::load(None)` probes a relative path, which means any test
    /// exercising that branch has to mutate the process-wide working
    /// directory (`std::env::set_current_dir`) — a resource shared by every
    /// test thread in this binary. Tests that touch it take this lock for
    /// their whole body so they never interleave with each other or with a
    /// concurrently running `Config::default()` (which also reads the CWD).
    fn cwd_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    #[test]
    fn defaults_match_the_documented_table() {
        let config = Config::default();
        assert_eq!(config.storage_system, StorageSystem::Segment);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.merge_floor, 1024);
        assert_eq!(config.refresh_interval, Duration::from_secs(1));
        assert_eq!(config.flush_interval, Duration::from_secs(15));
        assert_eq!(config.merge_interval, Duration::from_secs(30));
    }

    #[test]
    fn missing_default_file_is_not_an_error() {
        let _guard = cwd_lock().lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::TempDir::new().unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let result = Config::load(None);
        std::env::set_current_dir(original).unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let _guard = cwd_lock().lock().unwrap_or_else(|e| e.into_inner());
        let result = Config::load(Some(Path::new("/nonexistent/kaeya.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn merges_toml_over_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let file_path = dir.path().join("kaeya.toml");
        std::fs::write(
            &file_path,
            r#"
            [storage]
            system = "fs"

            [segment]
            buffer_size = "4k"
            refresh_interval = "5s"

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&file_path)).unwrap();
        assert_eq!(config.storage_system, StorageSystem::Fs);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.refresh_interval, Duration::from_secs(5));
        assert_eq!(config.log_level, LogLevel::Debug);
        // Untouched fields keep their defaults.
        assert_eq!(config.merge_floor, 1024);
    }

    #[test]
    fn malformed_size_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let file_path = dir.path().join("kaeya.toml");
        std::fs::write(&file_path, "[segment]\nbuffer_size = \"dfdsfb\"\n").unwrap();
        assert!(matches!(
            Config::load(Some(&file_path)),
            Err(ConfigError::InvalidFormat(_))
        ));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let file_path = dir.path().join("kaeya.toml");
        std::fs::write(&file_path, "[storage]\nbogus = \"x\"\n").unwrap();
        assert!(matches!(
            Config::load(Some(&file_path)),
            Err(ConfigError::Parse { .. })
        ));
    }
}

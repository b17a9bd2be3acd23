//! Error hierarchy for the engine.
//!
//! [`EngineError`] is the only error type that crosses the public `Set`/`Get`/
//! `Close` surface. [`IndexError`] is private to [`crate::index`] and is
//! converted into a fallback scan before it ever escapes a repository — it
//! must never appear in `EngineError`. [`ConfigError`] is separate because
//! configuration failures are fatal at startup, not part of the request path.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Codec could not decode a framed line. Propagated on a directed lookup;
    /// logged and skipped during an init/recovery scan (never returned from there).
    #[error("data format error: {0}")]
    DataFormat(String),

    /// Open/read/write/seek/sync failure. Propagated with context.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Internal-only: a key was not present in the advisory index.
///
/// This is never wrapped into [`EngineError`] — every call site converts it
/// into the tail-scan fallback (FS repository) or simply means "not yet
/// indexed" (segment repository keeps no index at all).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("key not present in index")]
pub struct IndexError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid size/duration format: {0:?}")]
    InvalidFormat(String),
    /// Kept for parity with the original Go error set; unreachable from
    /// `units::parse_size`/`parse_duration` in this implementation, since an
    /// unrecognized unit fails the format check before a unit is ever
    /// switched on (see `units.rs`).
    #[error("invalid unit {0:?} (expected one of b/k/m/g for sizes, s/m/h for durations)")]
    InvalidUnit(String),
    #[error("invalid storage.system {0:?} (expected \"fs\" or \"segment\")")]
    InvalidStorageSystem(String),
    #[error("invalid log.level {0:?} (expected debug/info/warn/error)")]
    InvalidLogLevel(String),
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

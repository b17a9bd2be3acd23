//! # kaeya — a persistent key/value store with a log-structured, append-only
//! on-disk representation.
//!
//! Two storage backends share one `Codec`/`TailReader` foundation:
//! - [`fs_repo::FsRepository`] — a single append-only file plus an advisory
//!   in-memory index, with a tail-scan fallback for anything the index
//!   missed.
//! - [`segment::repository::SegmentRepository`] — a chain of immutable
//!   segment files fed by a bounded write buffer, with background
//!   refresh/flush/merge workers.
//!
//! [`Repository`] is the thin entry point a caller (the CLI, or an embedding
//! application) actually constructs: it reads `storage.system` out of
//! [`Config`] and wires up whichever backend was asked for, the way the
//! out-of-scope HTTP surface described in the design notes is meant to.

pub mod codec;
pub mod config;
pub mod error;
pub mod fs_repo;
pub mod index;
pub mod segment;
pub mod tail_reader;
pub mod units;

pub use codec::{Codec, CsvCodec, DataFormatError, KV};
pub use config::{Config, LogLevel, StorageSystem};
pub use error::{ConfigError, EngineError};
pub use fs_repo::FsRepository;
pub use segment::repository::SegmentRepository;

/// The engine's public entry point: dispatches `Set`/`Get`/`Close` to
/// whichever backend [`Config::storage_system`] selects.
///
/// This is the seam an out-of-scope HTTP surface would sit behind — it owns
/// exactly one backend for the process lifetime and is closed exactly once.
pub enum Repository {
    Fs(FsRepository),
    Segment(SegmentRepository),
}

impl Repository {
    /// Open the backend named by `config.storage_system`, creating its
    /// on-disk directory structure as needed and recovering any existing
    /// state.
    pub fn open(config: &Config) -> Result<Self, EngineError> {
        match config.storage_system {
            StorageSystem::Fs => Ok(Repository::Fs(FsRepository::open(config)?)),
            StorageSystem::Segment => Ok(Repository::Segment(SegmentRepository::open(config)?)),
        }
    }

    pub fn save(&self, kv: &KV) -> Result<(), EngineError> {
        match self {
            Repository::Fs(repo) => repo.save(kv),
            Repository::Segment(repo) => repo.save(kv),
        }
    }

    /// Always returns `Ok` — a missing key is a successful [`KV::null`]
    /// result, not an error (see `EngineError`'s NotFound/Null design note).
    pub fn load(&self, key: &str) -> Result<KV, EngineError> {
        match self {
            Repository::Fs(repo) => repo.load(key),
            Repository::Segment(repo) => repo.load(key),
        }
    }

    /// Idempotent shutdown. For the segment backend this stops the
    /// background worker and runs a final refresh + flush; for the fs
    /// backend it syncs the file handle one last time.
    pub fn close(&mut self) -> Result<(), EngineError> {
        match self {
            Repository::Fs(repo) => repo.close(),
            Repository::Segment(repo) => repo.close(),
        }
    }

    /// Segment chain length, for the `info` subcommand. `None` on the fs
    /// backend — it has no segments.
    pub fn segment_count(&self) -> Option<usize> {
        match self {
            Repository::Fs(_) => None,
            Repository::Segment(repo) => Some(repo.segment_count()),
        }
    }

    pub fn min_segment_id(&self) -> Option<u64> {
        match self {
            Repository::Fs(_) => None,
            Repository::Segment(repo) => repo.min_id(),
        }
    }

    pub fn max_segment_id(&self) -> Option<u64> {
        match self {
            Repository::Fs(_) => None,
            Repository::Segment(repo) => repo.max_id(),
        }
    }
}

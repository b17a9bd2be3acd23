//! Single-file append-only repository: one file handle, an advisory index,
//! and a tail-scan fallback.
//!
//! Grounded on the teacher's `Archive` — a single owned file, opened once,
//! guarded by an internal lock for the operations that mutate it — but the
//! append-and-reindex discipline here is the engine's own: every `Save`
//! durably appends before the index is updated, so a crash mid-write leaves
//! a recoverable (if unindexed) record rather than a torn one.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use log::{info, warn};

use crate::codec::{Codec, CsvCodec, DELIMITER, KV};
use crate::config::{CodecKind, Config};
use crate::error::EngineError;
use crate::index::Indexer;
use crate::tail_reader::{read_line_from_tail, TailOutcome};

/// Append-only single-file repository.
pub struct FsRepository {
    data_path: PathBuf,
    file: Mutex<File>,
    codec: Box<dyn Codec>,
    index: Indexer,
}

impl FsRepository {
    pub fn open(config: &Config) -> Result<Self, EngineError> {
        let root = config.storage_path.join("data");
        fs::create_dir_all(&root)?;
        let data_path = root.join("data.ky");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&data_path)?;

        let codec: Box<dyn Codec> = match config.storage_codec {
            CodecKind::Csv => Box::new(CsvCodec),
        };

        let repo = Self {
            data_path,
            file: Mutex::new(file),
            codec,
            index: Indexer::new(),
        };
        repo.rebuild_index()?;
        info!("fs repository opened at {}", repo.data_path.display());
        Ok(repo)
    }

    /// Forward scan rebuilding the index from scratch. Corrupt lines are
    /// skipped, not fatal — later writes may have left a torn final line
    /// after a crash, and earlier valid data must still be recoverable.
    fn rebuild_index(&self) -> Result<(), EngineError> {
        let file = File::open(&self.data_path)?;
        let mut reader = BufReader::new(file);
        let mut offset: u64 = 0;
        let mut indexed = 0usize;
        let mut skipped = 0usize;

        loop {
            let mut raw = Vec::new();
            let read = reader.read_until(DELIMITER, &mut raw)?;
            if read == 0 {
                break;
            }
            let line_start = offset;
            offset += read as u64;
            if raw.last() == Some(&DELIMITER) {
                raw.pop();
            }
            if raw.is_empty() {
                continue;
            }
            match self.codec.decode(&raw) {
                Ok(kv) => {
                    self.index.index(&kv.key, line_start as i64);
                    indexed += 1;
                }
                Err(_) => {
                    warn!("skipped corrupt record at offset {line_start} during recovery scan");
                    skipped += 1;
                }
            }
        }

        info!("recovery scan indexed {indexed} record(s), skipped {skipped} corrupt line(s)");
        Ok(())
    }

    pub fn save(&self, kv: &KV) -> Result<(), EngineError> {
        let encoded = self
            .codec
            .encode(kv)
            .map_err(|e| EngineError::DataFormat(e.to_string()))?;
        let mut line = encoded;
        line.push(DELIMITER);
        let n = line.len() as u64;

        let mut guard = self.file.lock().expect("fs repository lock poisoned");
        guard.write_all(&line)?;
        guard.sync_all()?;
        let end = guard.seek(SeekFrom::End(0))?;
        let start = end - n;

        self.index.index(&kv.key, start as i64);
        Ok(())
    }

    pub fn load(&self, key: &str) -> Result<KV, EngineError> {
        if let Ok(offset) = self.index.search(key) {
            if let Some(kv) = self.load_at_offset(offset as u64)? {
                if kv.key == key {
                    return Ok(kv);
                }
            }
        }
        self.load_from_file(key)
    }

    fn load_at_offset(&self, offset: u64) -> Result<Option<KV>, EngineError> {
        let mut file = File::open(&self.data_path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut raw = Vec::new();
        let mut reader = BufReader::new(&mut file);
        reader.read_until(DELIMITER, &mut raw)?;
        if raw.last() == Some(&DELIMITER) {
            raw.pop();
        }
        if raw.is_empty() {
            return Ok(None);
        }
        match self.codec.decode(&raw) {
            Ok(kv) => Ok(Some(kv)),
            Err(_) => Ok(None),
        }
    }

    /// Reverse tail-scan fallback — walks the file from its end, decoding
    /// and opportunistically re-indexing every line it passes, until it
    /// finds a match or exhausts the file.
    fn load_from_file(&self, key: &str) -> Result<KV, EngineError> {
        let mut file = File::open(&self.data_path)?;
        let mut offset: i64 = -1;

        loop {
            let (outcome, next_offset) = read_line_from_tail(&mut file, offset, DELIMITER)?;
            offset = next_offset;
            match outcome {
                TailOutcome::End => return Ok(KV::null(key)),
                TailOutcome::Empty => continue,
                TailOutcome::Line { bytes, start_offset } => {
                    let Ok(kv) = self.codec.decode(&bytes) else {
                        continue;
                    };
                    self.index.index(&kv.key, start_offset as i64);
                    if kv.key == key {
                        return Ok(kv);
                    }
                }
            }
        }
    }

    pub fn close(&self) -> Result<(), EngineError> {
        let guard = self.file.lock().expect("fs repository lock poisoned");
        guard.sync_all()?;
        info!("fs repository closed ({} indexed key(s))", self.index.len());
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn index_len(&self) -> usize {
        self.index.len()
    }
}

//! Wires [`SegmentManager`] to three periodic timers and a stop signal.
//!
//! The worker selects over `crossbeam_channel::tick` receivers for
//! refresh/flush/merge plus a stop receiver. `Close` drops the stop
//! sender, *closing* the channel rather than sending on it — a worker that
//! already exited (say, after a prior panic-free error loop) never leaves
//! `Close` blocked on a rendezvous nobody will answer. This resolves the
//! stop-channel deadlock the single-slot-rendezvous design would otherwise
//! carry.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, tick, Select, Sender};
use log::{info, warn};

use crate::codec::{Codec, CsvCodec, KV};
use crate::config::{CodecKind, Config};
use crate::error::EngineError;

use super::manager::SegmentManager;

pub struct SegmentRepository {
    manager: Arc<SegmentManager>,
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SegmentRepository {
    pub fn open(config: &Config) -> Result<Self, EngineError> {
        let dir = config.storage_path.join("data").join("segments");
        let codec: Box<dyn Codec> = match config.storage_codec {
            CodecKind::Csv => Box::new(CsvCodec),
        };
        let manager = Arc::new(SegmentManager::open(
            dir,
            codec,
            config.buffer_size as usize,
            config.merge_floor,
        )?);

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let worker_manager = manager.clone();
        let refresh_interval = config.refresh_interval;
        let flush_interval = config.flush_interval;
        let merge_interval = config.merge_interval;

        let worker = thread::spawn(move || {
            run_worker(
                worker_manager,
                refresh_interval,
                flush_interval,
                merge_interval,
                stop_rx,
            )
        });

        info!("segment repository opened, background worker started");
        Ok(Self {
            manager,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    pub fn save(&self, kv: &KV) -> Result<(), EngineError> {
        self.manager.write(kv)
    }

    pub fn load(&self, key: &str) -> Result<KV, EngineError> {
        self.manager.read(key)
    }

    pub fn max_id(&self) -> Option<u64> {
        self.manager.max_id()
    }

    pub fn min_id(&self) -> Option<u64> {
        self.manager.min_id()
    }

    pub fn segment_count(&self) -> usize {
        self.manager.segment_count()
    }

    /// Idempotent shutdown: close the stop channel, wait for the worker,
    /// then run a final refresh + flush through the manager.
    pub fn close(&mut self) -> Result<(), EngineError> {
        self.stop_tx.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.manager.close()?;
        info!("segment repository closed");
        Ok(())
    }
}

impl Drop for SegmentRepository {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.close();
        }
    }
}

fn run_worker(
    manager: Arc<SegmentManager>,
    refresh_interval: Duration,
    flush_interval: Duration,
    merge_interval: Duration,
    stop_rx: crossbeam_channel::Receiver<()>,
) {
    let refresh_ticker = tick(refresh_interval);
    let flush_ticker = tick(flush_interval);
    let merge_ticker = tick(merge_interval);

    let mut select = Select::new();
    let refresh_idx = select.recv(&refresh_ticker);
    let flush_idx = select.recv(&flush_ticker);
    let merge_idx = select.recv(&merge_ticker);
    let stop_idx = select.recv(&stop_rx);

    loop {
        let op = select.select();
        match op.index() {
            i if i == refresh_idx => {
                let _ = op.recv(&refresh_ticker);
                if let Err(e) = manager.refresh() {
                    warn!("periodic refresh failed: {e}");
                }
            }
            i if i == flush_idx => {
                let _ = op.recv(&flush_ticker);
                if let Err(e) = manager.flush() {
                    warn!("periodic flush failed: {e}");
                }
            }
            i if i == merge_idx => {
                let _ = op.recv(&merge_ticker);
                if let Err(e) = manager.merge() {
                    warn!("periodic merge failed: {e}");
                }
            }
            i if i == stop_idx => {
                // Either a (never-sent) value or a disconnect error — both
                // mean "stop".
                let _ = op.recv(&stop_rx);
                break;
            }
            _ => unreachable!("Select only registered four receivers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage_path = dir.path().to_path_buf();
        config.buffer_size = 128;
        config.refresh_interval = Duration::from_millis(200);
        config.flush_interval = Duration::from_secs(60);
        config.merge_interval = Duration::from_secs(60);
        config
    }

    #[test]
    fn scenario_segment_visibility() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let mut repo = SegmentRepository::open(&config).unwrap();

        repo.save(&KV::new("aaa", "1")).unwrap();
        repo.save(&KV::new("bb", "100")).unwrap();
        assert_eq!(repo.load("aaa").unwrap().value, "");

        thread::sleep(Duration::from_millis(500));
        assert_eq!(repo.load("aaa").unwrap().value, "1");

        repo.save(&KV::new("aaa", "2")).unwrap();
        assert_eq!(repo.load("aaa").unwrap().value, "1");

        thread::sleep(Duration::from_millis(500));
        assert_eq!(repo.load("aaa").unwrap().value, "2");
        assert_eq!(repo.load("bb").unwrap().value, "100");

        repo.close().unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let mut repo = SegmentRepository::open(&config).unwrap();
        repo.save(&KV::new("k", "v")).unwrap();
        repo.close().unwrap();
        repo.close().unwrap();
    }
}

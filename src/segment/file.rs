//! A single immutable-after-publish segment file.
//!
//! Layout: `<id><LF>` followed by zero or more records, each preceded by a
//! delimiter. Construction writes with a write-capable handle, syncs,
//! closes, and reopens read-only — the live handle a manager holds never
//! writes to this path again (compaction always produces a *new* file).
//! Grounded on the teacher's block-write-then-reopen discipline in
//! `archive::Archive::finalize`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::DELIMITER;

/// Filenames look like `<unix-ns>_seg.sgk`; the timestamp is for human
/// inspection only — ordering authority is the segment ID on line one.
const SUFFIX: &str = "_seg.sgk";

pub struct SegmentFile {
    pub id: u64,
    pub path: PathBuf,
    /// Byte length of the `<id><LF>` header line.
    header_len: u64,
    /// Read-only handle held for the process lifetime of this segment.
    handle: File,
}

impl SegmentFile {
    /// Write `body` (already delimiter-framed per record) to a fresh
    /// segment file named for the current time, prefixed with `id`.
    pub fn create(dir: &Path, id: u64, body: &[u8]) -> io::Result<Self> {
        let filename = format!("{}{}", unix_nanos(), SUFFIX);
        let path = dir.join(filename);

        let header = format!("{id}");
        let header_len = header.len() as u64 + 1;

        {
            let mut writer = OpenOptions::new()
                .append(true)
                .write(true)
                .create(true)
                .open(&path)?;
            writer.write_all(header.as_bytes())?;
            writer.write_all(&[DELIMITER])?;
            writer.write_all(body)?;
            writer.sync_all()?;
        }

        let handle = OpenOptions::new().read(true).open(&path)?;
        Ok(Self {
            id,
            path,
            header_len,
            handle,
        })
    }

    /// Reopen an existing segment file, reading its ID off the first line.
    pub fn open_existing(path: PathBuf) -> io::Result<Self> {
        let handle = OpenOptions::new().read(true).open(&path)?;
        let mut reader = BufReader::new(handle.try_clone()?);
        let mut first_line = Vec::new();
        reader.read_until(DELIMITER, &mut first_line)?;
        if first_line.last() == Some(&DELIMITER) {
            first_line.pop();
        }
        let header_len = first_line.len() as u64 + 1;
        let text = String::from_utf8_lossy(&first_line);
        let id: u64 = text.parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("segment {path:?} has a non-numeric id line {text:?}"),
            )
        })?;

        Ok(Self {
            id,
            path,
            header_len,
            handle,
        })
    }

    pub fn size(&self) -> io::Result<u64> {
        Ok(self.handle.metadata()?.len())
    }

    /// A fresh read cursor over this segment's *body* — the id header is
    /// hidden, so a caller driving [`crate::tail_reader::read_line_from_tail`]
    /// over it never walks off the body into the id digits.
    ///
    /// Clones the already-open `handle` rather than reopening `self.path`:
    /// a `Read` racing a `Merge` may hold this `SegmentFile` just as the
    /// file is unlinked, and an already-open fd stays valid on POSIX until
    /// every clone of it closes, whereas opening `self.path` fresh at that
    /// point would race the unlink and surface a spurious I/O error instead
    /// of the `Null`/valid-data result concurrent use is supposed to see.
    pub fn body_reader(&self) -> io::Result<SegmentBody> {
        let file = self.handle.try_clone()?;
        Ok(SegmentBody {
            file,
            header_len: self.header_len,
        })
    }

    pub fn sync(&self) -> io::Result<()> {
        self.handle.sync_all()
    }

    pub fn filename_matches(name: &str) -> bool {
        name.ends_with(SUFFIX)
    }
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// A view over a [`SegmentFile`]'s body, hiding the `<id><LF>` header so
/// that `Seek::End`/`Seek::Start` operate on body-relative offsets.
pub struct SegmentBody {
    file: File,
    header_len: u64,
}

impl Read for SegmentBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for SegmentBody {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let absolute = match pos {
            SeekFrom::Start(n) => self.header_len + n,
            SeekFrom::End(n) => {
                let real_end = self.file.seek(SeekFrom::End(0))?;
                (real_end as i64 + n) as u64
            }
            SeekFrom::Current(n) => {
                let cur = self.file.seek(SeekFrom::Current(0))?;
                (cur as i64 + n) as u64
            }
        };
        let real_pos = self.file.seek(SeekFrom::Start(absolute))?;
        Ok(real_pos - self.header_len)
    }
}

/// List `<timestamp>_seg.sgk` files in `dir`, oldest filenames included —
/// sorting by segment ID (not filename) is the caller's job.
pub fn discover_segment_paths(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if SegmentFile::filename_matches(&name) {
            paths.push(entry.path());
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tail_reader::{read_line_from_tail, TailOutcome};
    use tempfile::TempDir;

    #[test]
    fn create_then_open_existing_agree_on_id() {
        let dir = TempDir::new().unwrap();
        let body = [DELIMITER]
            .iter()
            .chain(b"k,v")
            .copied()
            .collect::<Vec<u8>>();
        let created = SegmentFile::create(dir.path(), 7, &body).unwrap();
        let path = created.path.clone();
        let reopened = SegmentFile::open_existing(path).unwrap();
        assert_eq!(reopened.id, 7);
    }

    #[test]
    fn body_reader_hides_header() {
        let dir = TempDir::new().unwrap();
        let mut body = Vec::new();
        body.push(DELIMITER);
        body.extend_from_slice(b"k1,v1");
        let segment = SegmentFile::create(dir.path(), 42, &body).unwrap();

        let mut reader = segment.body_reader().unwrap();
        let (outcome, next) = read_line_from_tail(&mut reader, -1, DELIMITER).unwrap();
        assert_eq!(
            outcome,
            TailOutcome::Line { bytes: b"k1,v1".to_vec(), start_offset: 1 }
        );
        let (outcome, _) = read_line_from_tail(&mut reader, next, DELIMITER).unwrap();
        assert_eq!(outcome, TailOutcome::End);
    }
}

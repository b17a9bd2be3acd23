//! Tail reader — read one delimiter-framed line walking backward from a file
//! offset.
//!
//! An append-only log is cheapest to scan from newest to oldest: framing
//! uses the *previous* record's trailing delimiter as the stop condition, so
//! no index is needed to find record boundaries. The very first call at
//! `offset = -1` lands on the delimiter that terminates the whole file (the
//! FS file's own trailing `LF`, or — for a segment file — the delimiter that
//! immediately precedes the newest record) and therefore returns
//! [`TailOutcome::Empty`] with nothing accumulated; callers loop past `Empty`
//! exactly like any other non-matching line. This mirrors the teacher's
//! insistence on checking the cheapest signal first (`BlockHeader::read`
//! verifies `header_crc32` before touching any other field) — here the
//! cheapest signal is "is this byte the delimiter". The very oldest record
//! in an FS file has no leading delimiter (the file simply begins with its
//! bytes), so the walk reaching the start of file with bytes still
//! collected surfaces them as a final line before the next call reports
//! [`TailOutcome::End`].

use std::io::{self, Read, Seek, SeekFrom};

use crate::codec::DELIMITER;

/// Result of one backward line read.
#[derive(Debug, PartialEq, Eq)]
pub enum TailOutcome {
    /// A complete line, delimiter-bounded on both sides, in forward
    /// (left-to-right) byte order, together with its absolute byte offset
    /// from the start of the file (where the line's first byte sits) —
    /// callers that opportunistically re-index a record need this, not the
    /// negative tail-relative offset used to drive the walk itself.
    Line { bytes: Vec<u8>, start_offset: u64 },
    /// The delimiter was encountered with no bytes accumulated before it —
    /// distinct from [`TailOutcome::End`]: the walk has not reached the
    /// start of the file, only an empty span between two delimiters.
    Empty,
    /// The walk reached or passed the start of the file (`-offset > size`)
    /// without finding another delimiter.
    End,
}

/// Read one logical line walking backward from `offset` (a negative byte
/// count measured from end-of-file) in `file`, using `delim` as the record
/// boundary.
///
/// Returns the outcome together with `next_offset`, the offset to pass on
/// the following call. `next_offset` is always `offset - 1` relative to
/// wherever the walk stopped — i.e. positioned one byte past the delimiter
/// that ended this call, ready to resume the walk toward the start of the
/// file.
pub fn read_line_from_tail<F: Read + Seek>(
    file: &mut F,
    offset: i64,
    delim: u8,
) -> io::Result<(TailOutcome, i64)> {
    let size = file.seek(SeekFrom::End(0))? as i64;

    let mut cur = offset;
    let mut collected: Vec<u8> = Vec::new();

    loop {
        if -cur > size {
            // Walked past the start of the file with no bounding delimiter
            // before it — the oldest record in the FS layout has no leading
            // delimiter, only a trailing one, so whatever is collected here
            // is that final record. Surface it once; the next call (cur
            // already past the start) trips this branch again with nothing
            // collected and returns a clean End.
            if collected.is_empty() {
                return Ok((TailOutcome::End, cur));
            }
            collected.reverse();
            return Ok((
                TailOutcome::Line {
                    bytes: collected,
                    start_offset: 0,
                },
                cur,
            ));
        }

        file.seek(SeekFrom::Start((size + cur) as u64))?;
        let mut byte = [0u8; 1];
        file.read_exact(&mut byte)?;

        if byte[0] == delim {
            let next_offset = cur - 1;
            if collected.is_empty() {
                return Ok((TailOutcome::Empty, next_offset));
            }
            collected.reverse();
            let start_offset = (size + cur + 1) as u64;
            return Ok((
                TailOutcome::Line {
                    bytes: collected,
                    start_offset,
                },
                next_offset,
            ));
        }

        collected.push(byte[0]);
        cur -= 1;
    }
}

/// Convenience wrapper using the engine's own record [`DELIMITER`].
pub fn read_line_from_tail_default<F: Read + Seek>(
    file: &mut F,
    offset: i64,
) -> io::Result<(TailOutcome, i64)> {
    read_line_from_tail(file, offset, DELIMITER)
}

//! Segment chain — newest first, represented as stable handles into a `Vec`
//! rather than owned `prev`/`next` pointers (Rust cannot express an owned
//! cycle). Every mutation rebuilds a fresh, immutable `SegmentList`; the
//! manager publishes it by swapping an `Arc` under a short-held write lock,
//! so a concurrent reader either sees the whole pre-merge chain or the
//! whole post-merge chain, never a partially-rebuilt one.

use std::sync::Arc;

use super::file::SegmentFile;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentHandle(usize);

#[derive(Clone)]
struct SegmentSlot {
    segment: Arc<SegmentFile>,
    next: Option<SegmentHandle>,
}

#[derive(Clone, Default)]
pub struct SegmentList {
    slots: Vec<SegmentSlot>,
    head: Option<SegmentHandle>,
    tail: Option<SegmentHandle>,
}

impl SegmentList {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a list from segments already ordered newest (index 0) to
    /// oldest.
    pub fn from_newest_first(segments: Vec<Arc<SegmentFile>>) -> Self {
        let mut slots = Vec::with_capacity(segments.len());
        for segment in segments {
            slots.push(SegmentSlot {
                segment,
                next: None,
            });
        }
        for i in 0..slots.len().saturating_sub(1) {
            slots[i].next = Some(SegmentHandle(i + 1));
        }
        let head = if slots.is_empty() {
            None
        } else {
            Some(SegmentHandle(0))
        };
        let tail = if slots.is_empty() {
            None
        } else {
            Some(SegmentHandle(slots.len() - 1))
        };
        Self { slots, head, tail }
    }

    /// A new list with `segment` linked in at the head; `self` is left
    /// untouched (callers hold `Arc<SegmentList>` snapshots, never `&mut`).
    pub fn pushed_to_head(&self, segment: Arc<SegmentFile>) -> Self {
        let mut segments: Vec<Arc<SegmentFile>> = Vec::with_capacity(self.slots.len() + 1);
        segments.push(segment);
        segments.extend(self.iter().cloned());
        Self::from_newest_first(segments)
    }

    pub fn iter(&self) -> SegmentIter<'_> {
        SegmentIter {
            list: self,
            cursor: self.head,
        }
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn max_id(&self) -> Option<u64> {
        self.head.map(|h| self.slots[h.0].segment.id)
    }

    pub fn min_id(&self) -> Option<u64> {
        self.tail.map(|h| self.slots[h.0].segment.id)
    }
}

pub struct SegmentIter<'a> {
    list: &'a SegmentList,
    cursor: Option<SegmentHandle>,
}

impl<'a> Iterator for SegmentIter<'a> {
    type Item = &'a Arc<SegmentFile>;

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.cursor?;
        let slot = &self.list.slots[handle.0];
        self.cursor = slot.next;
        Some(&slot.segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_segment(dir: &TempDir, id: u64) -> Arc<SegmentFile> {
        Arc::new(SegmentFile::create(dir.path(), id, b"").unwrap())
    }

    #[test]
    fn segment_init_ordering() {
        let dir = TempDir::new().unwrap();
        let list = SegmentList::from_newest_first(vec![
            fake_segment(&dir, 3),
            fake_segment(&dir, 2),
            fake_segment(&dir, 1),
        ]);
        assert_eq!(list.max_id(), Some(3));
        assert_eq!(list.min_id(), Some(1));
        assert_eq!(list.count(), 3);
        let ids: Vec<u64> = list.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn push_to_head_is_newest() {
        let dir = TempDir::new().unwrap();
        let list = SegmentList::from_newest_first(vec![fake_segment(&dir, 1)]);
        let list = list.pushed_to_head(fake_segment(&dir, 2));
        assert_eq!(list.max_id(), Some(2));
        assert_eq!(list.min_id(), Some(1));
        let ids: Vec<u64> = list.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }
}

//! Priority queue of pending changes.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use parking_lot::Mutex;

use crate::changes::FileChangeInfo;

struct Entry {
    priority: u64,
    seq: u64,
    change: FileChangeInfo,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<Reverse<Entry>>,
    /// Sequence number of the newest entry per path.
    latest: HashMap<String, u64>,
    next_seq: u64,
}

/// Pending changes ordered by [`FileChangeInfo::priority`], FIFO on ties.
///
/// Enqueueing a path that is already pending supersedes the older entry:
/// only the most recent change for a path is ever handed out.
#[derive(Default)]
pub struct SyncQueue {
    inner: Mutex<Inner>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, change: FileChangeInfo) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.latest.insert(change.path.clone(), seq);
        inner.heap.push(Reverse(Entry {
            priority: change.priority(),
            seq,
            change,
        }));
    }

    pub fn dequeue(&self) -> Option<FileChangeInfo> {
        let mut inner = self.inner.lock();
        while let Some(Reverse(entry)) = inner.heap.pop() {
            if inner.latest.get(&entry.change.path) == Some(&entry.seq) {
                inner.latest.remove(&entry.change.path);
                return Some(entry.change);
            }
        }
        None
    }

    /// Number of distinct pending paths.
    pub fn len(&self) -> usize {
        self.inner.lock().latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{FileChangeKind, SyncSide};

    fn change(path: &str, size: u64, hash: &str) -> FileChangeInfo {
        FileChangeInfo {
            kind: FileChangeKind::Write,
            path: path.to_string(),
            side: SyncSide::Local,
            local_hash: Some("old".to_string()),
            remote_hash: Some(hash.to_string()),
            size,
        }
    }

    #[test]
    fn test_priority_order() {
        let queue = SyncQueue::new();
        queue.enqueue(change("ds/large.bin", 10_000, "h"));
        queue.enqueue(change("ds/small.txt", 10, "h"));
        queue.enqueue(change("ds/_.syftperm", 500, "h"));

        let order: Vec<_> = std::iter::from_fn(|| queue.dequeue())
            .map(|c| c.path)
            .collect();
        assert_eq!(order, vec!["ds/_.syftperm", "ds/small.txt", "ds/large.bin"]);
    }

    #[test]
    fn test_fifo_on_ties() {
        let queue = SyncQueue::new();
        for name in ["c", "a", "b"] {
            queue.enqueue(change(&format!("ds/{}", name), 5, "h"));
        }
        let order: Vec<_> = std::iter::from_fn(|| queue.dequeue())
            .map(|c| c.path)
            .collect();
        assert_eq!(order, vec!["ds/c", "ds/a", "ds/b"]);
    }

    #[test]
    fn test_latest_enqueue_wins() {
        let queue = SyncQueue::new();
        queue.enqueue(change("ds/f", 5, "first"));
        queue.enqueue(change("ds/g", 5, "other"));
        queue.enqueue(change("ds/f", 5, "second"));
        assert_eq!(queue.len(), 2);

        let drained: Vec<_> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(drained.len(), 2);
        let f = drained.iter().find(|c| c.path == "ds/f").unwrap();
        assert_eq!(f.remote_hash.as_deref(), Some("second"));
        assert!(queue.is_empty());
    }
}

//! Bounded LRU cache of open directory/file descriptors with pin/unpin and
//! an "insertion target" cursor so root descriptors are evicted last.
//!
//! Grounded on the intrusive-linked-list technique in the teacher's
//! `allocator::chain`/`allocator::list`, adapted from a buffer free-list to
//! an eviction list addressed through [`crate::arena::Arena`] handles.

use tracing::debug;

use crate::arena::{Arena, RecordId};
use crate::error::{Error, Result};

/// LRU list ordered head (protected / evicted last) to tail (evicted first).
pub struct FdCache {
    head: Option<RecordId>,
    tail: Option<RecordId>,
    /// New non-root entries are inserted immediately after this node (i.e.
    /// at the head-ward edge of the non-root segment). `None` means "insert
    /// at the true head" (no roots cached yet).
    target: Option<RecordId>,
    /// Total descriptors charged against `capacity`, including pinned ones
    /// that are temporarily off the list.
    total: usize,
    capacity: usize,
}

impl FdCache {
    pub fn new(capacity: usize) -> Self {
        FdCache { head: None, tail: None, target: None, total: 0, capacity: capacity.max(1) }
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Register a record that now owns an open `fd`. Must be called exactly
    /// once per descriptor acquired.
    pub fn add(&mut self, arena: &mut Arena, id: RecordId) {
        self.total += 1;
        self.link_after_target(arena, id);
        if arena.get(id).depth == 0 {
            self.target = Some(id);
        }
    }

    /// Temporarily remove `id` from the eviction list for the duration of a
    /// critical section (using its fd as `at_fd` for a child operation).
    /// Reentrant: a directory with several children awaiting an async
    /// `stat`/`opendir` against it is pinned once per in-flight child, and
    /// only relinked once every one of them has called [`Self::unpin`].
    pub fn pin(&mut self, arena: &mut Arena, id: RecordId) {
        let rec = arena.get(id);
        if rec.pincount == 0 {
            self.unlink(arena, id);
        }
        arena.get_mut(id).pincount += 1;
    }

    /// Undo one [`Self::pin`] call, relinking the record into the list once
    /// its pin count reaches zero.
    pub fn unpin(&mut self, arena: &mut Arena, id: RecordId) {
        let pincount = {
            let rec = arena.get_mut(id);
            rec.pincount = rec.pincount.saturating_sub(1);
            rec.pincount
        };
        if pincount == 0 {
            self.link_after_target(arena, id);
            if arena.get(id).depth == 0 {
                self.target = Some(id);
            }
        }
    }

    /// Unregister a descriptor that the caller is about to close itself
    /// (normal teardown, not eviction).
    pub fn remove(&mut self, arena: &mut Arena, id: RecordId) {
        if arena.get(id).pincount == 0 {
            self.unlink(arena, id);
        }
        self.total = self.total.saturating_sub(1);
    }

    /// Ensure at least one free slot exists, evicting the LRU tail (closing
    /// its fd) as needed. The caller (the engine) is expected to have
    /// already drained any pending ioq completions so `total` reflects every
    /// descriptor currently charged against `capacity`.
    pub fn reserve(&mut self, arena: &mut Arena) -> Result<()> {
        if self.total < self.capacity {
            return Ok(());
        }
        while self.total >= self.capacity {
            match self.pop_lru(arena) {
                Some(victim) => self.close(arena, victim),
                None => return Err(Error::Invalid("EMFILE: fd cache full and nothing evictable")),
            }
        }
        Ok(())
    }

    fn close(&mut self, arena: &mut Arena, id: RecordId) {
        let rec = arena.get_mut(id);
        if let Some(fd) = rec.fd.take() {
            unsafe {
                libc::close(fd);
            }
        }
        rec.has_dir_stream = false;
        debug!(record = id_debug(id), "evicted fd from cache");
        self.total = self.total.saturating_sub(1);
    }

    fn pop_lru(&mut self, arena: &mut Arena) -> Option<RecordId> {
        let victim = self.tail?;
        self.unlink(arena, victim);
        Some(victim)
    }

    fn link_after_target(&mut self, arena: &mut Arena, id: RecordId) {
        match self.target {
            None => self.link_at_head(arena, id),
            Some(target) => self.link_after(arena, target, id),
        }
    }

    fn link_at_head(&mut self, arena: &mut Arena, id: RecordId) {
        arena.get_mut(id).lru_links.prev = None;
        arena.get_mut(id).lru_links.next = self.head;
        if let Some(old_head) = self.head {
            arena.get_mut(old_head).lru_links.prev = Some(id);
        } else {
            self.tail = Some(id);
        }
        self.head = Some(id);
    }

    fn link_after(&mut self, arena: &mut Arena, target: RecordId, id: RecordId) {
        let next = arena.get(target).lru_links.next;
        arena.get_mut(id).lru_links.prev = Some(target);
        arena.get_mut(id).lru_links.next = next;
        arena.get_mut(target).lru_links.next = Some(id);
        match next {
            Some(next_id) => arena.get_mut(next_id).lru_links.prev = Some(id),
            None => self.tail = Some(id),
        }
    }

    fn unlink(&mut self, arena: &mut Arena, id: RecordId) {
        let (prev, next) = {
            let links = arena.get(id).lru_links;
            (links.prev, links.next)
        };
        match prev {
            Some(prev_id) => arena.get_mut(prev_id).lru_links.next = next,
            None => self.head = next,
        }
        match next {
            Some(next_id) => arena.get_mut(next_id).lru_links.prev = prev,
            None => self.tail = prev,
        }
        arena.get_mut(id).lru_links.prev = None;
        arena.get_mut(id).lru_links.next = None;
        if self.target == Some(id) {
            self.target = prev;
        }
    }
}

fn id_debug(id: RecordId) -> String {
    format!("{id:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileRecord;

    fn new_open_record(arena: &mut Arena, depth: u32) -> RecordId {
        let mut rec = FileRecord::new_root(b"x".to_vec());
        rec.depth = depth;
        rec.fd = Some(3);
        arena.insert(rec)
    }

    #[test]
    fn evicts_non_root_before_root() {
        let mut arena = Arena::new();
        let mut cache = FdCache::new(2);
        let root = new_open_record(&mut arena, 0);
        cache.add(&mut arena, root);
        let child_a = new_open_record(&mut arena, 1);
        cache.add(&mut arena, child_a);

        // Cache is full (capacity 2); reserving a 3rd slot must evict the
        // non-root entry, never the root.
        cache.reserve(&mut arena).unwrap();
        assert!(arena.get(child_a).fd.is_none());
        assert!(arena.get(root).fd.is_some());
    }

    #[test]
    fn pinned_entries_are_not_evicted() {
        let mut arena = Arena::new();
        let mut cache = FdCache::new(1);
        let only = new_open_record(&mut arena, 1);
        cache.add(&mut arena, only);
        cache.pin(&mut arena, only);

        let err = cache.reserve(&mut arena);
        assert!(err.is_err());
    }

    #[test]
    fn remove_backs_off_target_when_target_is_removed() {
        let mut arena = Arena::new();
        let mut cache = FdCache::new(4);
        let root = new_open_record(&mut arena, 0);
        cache.add(&mut arena, root);
        assert_eq!(cache.target, Some(root));
        cache.remove(&mut arena, root);
        assert_eq!(cache.target, None);
    }
}

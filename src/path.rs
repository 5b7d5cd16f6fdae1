//! Incremental path reconstruction.
//!
//! Per SPEC_FULL.md §4.4.c, rather than rebuilding a path from scratch for
//! every visit, the builder remembers the previously visited record and only
//! rewrites the suffix of the path buffer past the nearest common ancestor
//! with the new record.

use crate::arena::{Arena, RecordId};

/// Holds the currently-built path buffer and the previously visited record.
pub struct PathBuilder {
    buf: Vec<u8>,
    previous: Option<RecordId>,
}

impl PathBuilder {
    pub fn new() -> Self {
        PathBuilder { buf: Vec::new(), previous: None }
    }

    /// Rebuild the path for `current`, optionally appending `trailing_name`
    /// (a dirent name that hasn't been allocated a [`crate::record::FileRecord`]
    /// yet). Returns the resulting path as a byte slice.
    pub fn build(&mut self, arena: &Arena, current: RecordId, trailing_name: Option<&[u8]>) -> &[u8] {
        let chain = ancestor_chain(arena, current);
        let shared = match self.previous {
            Some(prev) => common_prefix_len(&chain, &ancestor_chain(arena, prev)),
            None => 0,
        };

        let truncate_at = match chain.get(shared) {
            Some(id) => arena.get(*id).name_offset,
            None => self.buf.len(),
        };
        self.buf.truncate(truncate_at);

        for id in &chain[shared..] {
            append_component(&mut self.buf, &arena.get(*id).name);
        }
        if let Some(name) = trailing_name {
            append_component(&mut self.buf, name);
        }

        self.previous = Some(current);
        &self.buf
    }

    /// Forget the remembered previous record, forcing a full rebuild on the
    /// next call. Used after GC frees a record that might still be referenced.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.previous = None;
    }

    /// Forget `id` specifically if it is the remembered previous record.
    /// Must be called before `id` is freed from the arena, or the next
    /// `build()` call would walk a dangling handle.
    pub fn forget(&mut self, id: RecordId) {
        if self.previous == Some(id) {
            self.reset();
        }
    }
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn append_component(buf: &mut Vec<u8>, name: &[u8]) {
    if !buf.is_empty() && buf.last() != Some(&b'/') {
        buf.push(b'/');
    }
    buf.extend_from_slice(name);
}

/// Root-to-leaf chain of ancestors, including `id` itself.
fn ancestor_chain(arena: &Arena, id: RecordId) -> Vec<RecordId> {
    let mut chain = vec![id];
    let mut current = id;
    while let Some(parent) = arena.get(current).parent {
        chain.push(parent);
        current = parent;
    }
    chain.reverse();
    chain
}

fn common_prefix_len(a: &[RecordId], b: &[RecordId]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileRecord;

    #[test]
    fn builds_absolute_path_for_nested_child() {
        let mut arena = Arena::new();
        let root = arena.insert(FileRecord::new_root(b"/tmp/walk".to_vec()));
        let child =
            arena.insert(FileRecord::new_child(b"a".to_vec(), root, root, 0, 0, b"/tmp/walk".len(), false));
        let grandchild = arena.insert(FileRecord::new_child(
            b"b".to_vec(),
            child,
            root,
            1,
            arena.get(child).name_offset,
            1,
            false,
        ));

        let mut builder = PathBuilder::new();
        let path = builder.build(&arena, grandchild, None);
        assert_eq!(path, b"/tmp/walk/a/b");
    }

    #[test]
    fn reuses_shared_prefix_between_consecutive_siblings() {
        let mut arena = Arena::new();
        let root = arena.insert(FileRecord::new_root(b"/tmp/walk".to_vec()));
        let a = arena.insert(FileRecord::new_child(b"a".to_vec(), root, root, 0, 0, b"/tmp/walk".len(), false));
        let b = arena.insert(FileRecord::new_child(b"b".to_vec(), root, root, 0, 0, b"/tmp/walk".len(), false));

        let mut builder = PathBuilder::new();
        assert_eq!(builder.build(&arena, a, None), b"/tmp/walk/a");
        assert_eq!(builder.build(&arena, b, None), b"/tmp/walk/b");
    }

    #[test]
    fn appends_trailing_dirent_name_without_allocating_a_record() {
        let mut arena = Arena::new();
        let root = arena.insert(FileRecord::new_root(b"/tmp/walk".to_vec()));
        let mut builder = PathBuilder::new();
        let path = builder.build(&arena, root, Some(b"child"));
        assert_eq!(path, b"/tmp/walk/child");
    }
}

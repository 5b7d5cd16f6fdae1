use std::cell::RefCell;
use std::collections::VecDeque;

use super::{execute, IoBackend, IoCompletion, IoOp};
use crate::arena::RecordId;

/// Executes every [`IoOp`] synchronously, on whatever thread calls
/// [`IoBackend::submit`]. Used for `ioq_threads = 0` and in tests, where the
/// overlap an async backend buys isn't worth the thread/ring setup cost.
pub struct InlineBackend {
    completions: RefCell<VecDeque<IoCompletion>>,
}

impl InlineBackend {
    pub fn new() -> Self {
        InlineBackend { completions: RefCell::new(VecDeque::new()) }
    }
}

impl Default for InlineBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBackend for InlineBackend {
    fn submit(&self, id: RecordId, op: IoOp) {
        let outcome = execute(op);
        self.completions.borrow_mut().push_back(IoCompletion { id, outcome });
    }

    fn try_recv(&self) -> Option<IoCompletion> {
        self.completions.borrow_mut().pop_front()
    }

    fn recv_blocking(&self) -> Option<IoCompletion> {
        self.try_recv()
    }

    fn is_synchronous(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    use crate::arena::Arena;
    use crate::record::FileRecord;

    fn dummy_id(arena: &mut Arena) -> RecordId {
        arena.insert(FileRecord::new_root(b"x".to_vec()))
    }

    #[test]
    fn close_of_invalid_fd_reports_errno() {
        let backend = InlineBackend::new();
        let mut arena = Arena::new();
        let id = dummy_id(&mut arena);
        backend.submit(id, IoOp::Close { fd: -1 });
        let completion = backend.recv_blocking().unwrap();
        assert!(matches!(completion.outcome, super::super::IoOutcome::Err { .. }));
    }

    #[test]
    fn stat_of_missing_name_reports_enoent() {
        let backend = InlineBackend::new();
        let mut arena = Arena::new();
        let id = dummy_id(&mut arena);
        backend.submit(
            id,
            IoOp::Stat { dir_fd: libc::AT_FDCWD, name: CString::new("/nonexistent-path-xyz").unwrap(), follow: true },
        );
        let completion = backend.recv_blocking().unwrap();
        match completion.outcome {
            super::super::IoOutcome::Err { errno } => assert_eq!(errno, libc::ENOENT),
            other => panic!("expected Err, got {other:?}"),
        }
    }
}

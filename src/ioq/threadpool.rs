use std::thread::JoinHandle;

use async_channel::{Receiver, Sender};

use super::{execute, IoBackend, IoCompletion, IoOp};
use crate::arena::RecordId;

/// Runs [`IoOp`]s on a small pool of OS threads.
///
/// Grounded on the teacher's `ReadTask`/`VfsTask` shape (a struct owning
/// channel halves with a `spawn` constructor and a `run` loop), with
/// `std::thread::spawn` standing in for `tokio::spawn` and blocking
/// `async_channel` calls (`send_blocking`/`recv_blocking`) standing in for
/// `.await` — this pool never runs inside an async runtime.
pub struct ThreadPoolBackend {
    work_tx: Sender<(RecordId, IoOp)>,
    completion_rx: Receiver<IoCompletion>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolBackend {
    pub fn new(threads: usize) -> Self {
        let (work_tx, work_rx) = async_channel::unbounded::<(RecordId, IoOp)>();
        let (completion_tx, completion_rx) = async_channel::unbounded::<IoCompletion>();

        let workers = (0..threads.max(1))
            .map(|_| {
                let work_rx = work_rx.clone();
                let completion_tx = completion_tx.clone();
                std::thread::spawn(move || Self::run(work_rx, completion_tx))
            })
            .collect();

        ThreadPoolBackend { work_tx, completion_rx, workers }
    }

    fn run(work_rx: Receiver<(RecordId, IoOp)>, completion_tx: Sender<IoCompletion>) {
        while let Ok((id, op)) = work_rx.recv_blocking() {
            let outcome = execute(op);
            if completion_tx.send_blocking(IoCompletion { id, outcome }).is_err() {
                break;
            }
        }
    }
}

impl Drop for ThreadPoolBackend {
    fn drop(&mut self) {
        self.work_tx.close();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl IoBackend for ThreadPoolBackend {
    fn submit(&self, id: RecordId, op: IoOp) {
        // Unbounded channel: a full queue would mean OOM long before this
        // send ever blocks, so `send_blocking` failing here only means the
        // pool has already been torn down.
        let _ = self.work_tx.send_blocking((id, op));
    }

    fn try_recv(&self) -> Option<IoCompletion> {
        self.completion_rx.try_recv().ok()
    }

    fn recv_blocking(&self) -> Option<IoCompletion> {
        self.completion_rx.recv_blocking().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::record::FileRecord;
    use std::ffi::CString;

    #[test]
    fn round_trips_a_close_through_worker_threads() {
        let pool = ThreadPoolBackend::new(2);
        let mut arena = Arena::new();
        let id = arena.insert(FileRecord::new_root(b"x".to_vec()));
        pool.submit(id, IoOp::Close { fd: -1 });
        let completion = pool.recv_blocking().unwrap();
        assert_eq!(completion.id, id);
        assert!(matches!(completion.outcome, super::super::IoOutcome::Err { .. }));
    }

    #[test]
    fn stat_of_cwd_self_succeeds() {
        let pool = ThreadPoolBackend::new(1);
        let mut arena = Arena::new();
        let id = arena.insert(FileRecord::new_root(b".".to_vec()));
        pool.submit(
            id,
            IoOp::Stat { dir_fd: libc::AT_FDCWD, name: CString::new(".").unwrap(), follow: true },
        );
        let completion = pool.recv_blocking().unwrap();
        assert!(matches!(completion.outcome, super::super::IoOutcome::Stat { .. }));
    }
}

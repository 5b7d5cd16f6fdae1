//! Concurrent cache of mount-point facts, consulted by `must_stat`/`-mount`
//! handling (SPEC_FULL.md §4.4.g) and populated ahead of the main loop by
//! ioq worker threads performing `stat`s.
//!
//! `whirlwind::ShardMap` is async-first (its shards are guarded by
//! `tokio`-style locks), but nothing else in this crate runs under an async
//! runtime (§5: the engine is a synchronous, non-suspending loop). Rather
//! than pull in an executor for one map, [`block_on`] drives the handful of
//! uncontended futures this module produces on the calling thread.

use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Wake, Waker};

use whirlwind::ShardMap;

/// A `(dev, ino)` pair identifying a directory that has been confirmed to sit
/// on a mount boundary (its `dev` differs from its parent's).
pub type MountKey = u64;

/// Concurrent cache mapping a device id to "is this a mount point we've
/// already confirmed". A miss means "unknown", not "not a mount point" --
/// callers still need to compare against the parent's `dev`.
pub struct MountHints {
    known: ShardMap<MountKey, bool>,
}

impl MountHints {
    pub fn new() -> Self {
        MountHints { known: ShardMap::new() }
    }

    /// Look up a previously recorded mount-boundary fact for `dev`.
    pub fn get(&self, dev: MountKey) -> Option<bool> {
        block_on(self.known.get(&dev)).map(|guard| *guard)
    }

    /// Record whether `dev` is a mount boundary.
    pub fn set(&self, dev: MountKey, is_mount_point: bool) {
        block_on(self.known.insert(dev, is_mount_point));
    }
}

impl Default for MountHints {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses `/proc/mounts` (or an equivalent `mtab`) into device-id facts.
///
/// The real parser is the named external collaborator (SPEC_FULL.md §1); this
/// trait is the seam the engine calls through, so a host binary can supply
/// its own without this crate depending on a specific mtab format.
pub trait MountTable {
    /// Whether `dev` is known, up front, to be a mount point's device id.
    fn is_mount_device(&self, dev: u64) -> bool;
}

/// A [`MountTable`] that knows about no mounts; used when the caller hasn't
/// supplied one and mount detection falls back entirely to dev-comparison.
pub struct NoMountTable;

impl MountTable for NoMountTable {
    fn is_mount_device(&self, _dev: u64) -> bool {
        false
    }
}

struct ThreadWaker {
    ready: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.ready.store(true, Ordering::SeqCst);
        let _guard = self.lock.lock().unwrap();
        self.condvar.notify_one();
    }
}

/// Poll `fut` on the current thread, parking between polls instead of
/// spinning. Adequate for the short, rarely-contended futures `ShardMap`
/// produces; not a general-purpose executor.
fn block_on<F: Future>(fut: F) -> F::Output {
    let waker = Arc::new(ThreadWaker {
        ready: AtomicBool::new(true),
        lock: Mutex::new(()),
        condvar: Condvar::new(),
    });
    let mut fut = pin!(fut);
    loop {
        if waker.ready.swap(false, Ordering::SeqCst) {
            let task_waker: Waker = waker.clone().into();
            let mut cx = Context::from_waker(&task_waker);
            if let Poll::Ready(value) = fut.as_mut().poll(&mut cx) {
                return value;
            }
        }
        let guard = waker.lock.lock().unwrap();
        if !waker.ready.load(Ordering::SeqCst) {
            let _unused = waker.condvar.wait(guard).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_recalls_a_mount_fact() {
        let hints = MountHints::new();
        assert_eq!(hints.get(42), None);
        hints.set(42, true);
        assert_eq!(hints.get(42), Some(true));
    }
}

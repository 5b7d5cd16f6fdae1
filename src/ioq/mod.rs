//! Offload of blocking directory/stat/close syscalls off the engine's main
//! call stack.
//!
//! SPEC_FULL.md §5 requires the engine loop to stay a single synchronous,
//! non-suspending call stack while still being able to overlap I/O latency.
//! Grounded on the teacher's `read_task.rs`/`vfs_task.rs`/`stream_writer.rs`
//! pattern (a small struct owning one or two channel halves with a
//! `spawn`/`run` pair), but with OS threads standing in for tokio tasks — see
//! DESIGN.md's note on dropping `tokio`.

mod inline;
mod threadpool;

#[cfg(target_os = "linux")]
mod uring;

pub use inline::InlineBackend;
pub use threadpool::ThreadPoolBackend;

#[cfg(target_os = "linux")]
pub use uring::{IoUringBackend, IoUringPool};

use std::ffi::CString;
use std::os::unix::io::RawFd;

use crate::arena::RecordId;
use crate::record::{FileStat, Timestamp};

/// A unit of work submitted to an [`IoBackend`].
#[derive(Debug)]
pub enum IoOp {
    /// `openat(parent_fd, name, O_DIRECTORY | (follow ? 0 : O_NOFOLLOW))`
    /// followed by `fdopendir`.
    OpenDir { parent_fd: RawFd, name: CString, follow: bool },
    /// `fstatat(dir_fd, name, ..., follow ? 0 : AT_SYMLINK_NOFOLLOW)`.
    Stat { dir_fd: RawFd, name: CString, follow: bool },
    /// `close(fd)`, offloaded so it doesn't stall the caller behind a slow
    /// filesystem (e.g. a network mount tearing down a directory stream).
    Close { fd: RawFd },
}

/// The result of executing an [`IoOp`].
#[derive(Debug)]
pub enum IoOutcome {
    Dir { fd: RawFd },
    Stat { stat: FileStat },
    Closed,
    Err { errno: i32 },
}

/// A completed [`IoOp`], tagged with the record it was submitted for.
#[derive(Debug)]
pub struct IoCompletion {
    pub id: RecordId,
    pub outcome: IoOutcome,
}

/// Something that can run [`IoOp`]s off the main call stack and hand back
/// [`IoCompletion`]s. Implementations never block the submitting thread.
///
/// Only `Send` is required: the engine owns its `Box<dyn IoBackend>` on a
/// single thread for its whole lifetime and never shares it across threads.
pub trait IoBackend: Send {
    /// Enqueue `op` for record `id`. Never blocks.
    fn submit(&self, id: RecordId, op: IoOp);

    /// Pop one completion if one is already available.
    fn try_recv(&self) -> Option<IoCompletion>;

    /// Block until one completion is available, or the backend has been shut
    /// down and has nothing left in flight.
    fn recv_blocking(&self) -> Option<IoCompletion>;

    /// Whether `submit` already ran `op` to completion before returning.
    /// True only for [`InlineBackend`]; the engine uses this to decide
    /// whether its queues need the `BALANCE` bookkeeping at all (SPEC_FULL.md
    /// §4.2: "the engine's queues have BALANCE disabled" for the inline backend).
    fn is_synchronous(&self) -> bool {
        false
    }
}

/// Run `op` synchronously on the calling thread. Shared by [`InlineBackend`],
/// [`ThreadPoolBackend`]'s worker threads, and the engine itself when it
/// chooses to service an op inline rather than wait on the ioq.
pub(crate) fn execute(op: IoOp) -> IoOutcome {
    match op {
        IoOp::OpenDir { parent_fd, name, follow } => unsafe {
            let nofollow = if follow { 0 } else { libc::O_NOFOLLOW };
            let fd = libc::openat(parent_fd, name.as_ptr(), libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC | nofollow);
            if fd < 0 {
                IoOutcome::Err { errno: *libc::__errno_location() }
            } else {
                IoOutcome::Dir { fd }
            }
        },
        IoOp::Stat { dir_fd, name, follow } => unsafe {
            let mut buf: libc::stat = std::mem::zeroed();
            let flags = if follow { 0 } else { libc::AT_SYMLINK_NOFOLLOW };
            let rc = libc::fstatat(dir_fd, name.as_ptr(), &mut buf, flags);
            if rc < 0 {
                IoOutcome::Err { errno: *libc::__errno_location() }
            } else {
                IoOutcome::Stat { stat: stat_from_raw(&buf) }
            }
        },
        IoOp::Close { fd } => unsafe {
            let rc = libc::close(fd);
            if rc < 0 {
                IoOutcome::Err { errno: *libc::__errno_location() }
            } else {
                IoOutcome::Closed
            }
        },
    }
}

fn stat_from_raw(buf: &libc::stat) -> FileStat {
    FileStat {
        dev: buf.st_dev as u64,
        ino: buf.st_ino as u64,
        mode: buf.st_mode as u32,
        nlink: buf.st_nlink as u64,
        uid: buf.st_uid,
        gid: buf.st_gid,
        rdev: buf.st_rdev as u64,
        size: buf.st_size as i64,
        blocks: buf.st_blocks as i64,
        atime: Timestamp { seconds: buf.st_atime, nanos: buf.st_atime_nsec as u32 },
        mtime: Timestamp { seconds: buf.st_mtime, nanos: buf.st_mtime_nsec as u32 },
        ctime: Timestamp { seconds: buf.st_ctime, nanos: buf.st_ctime_nsec as u32 },
    }
}

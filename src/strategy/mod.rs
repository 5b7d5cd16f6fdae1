//! Public entry point and strategy dispatch (SPEC_FULL.md §4.5, §6).

mod exponential_deepening;
mod iterative_deepening;

use crate::config::{Flags, Strategy};
use crate::engine::{self, QueueStyle};
use crate::error::Result;
use crate::ioq::{IoBackend, InlineBackend, ThreadPoolBackend};
use crate::mount::{MountTable, NoMountTable};
use crate::visitor::{Visit, VisitResult};

#[cfg(target_os = "linux")]
use crate::ioq::IoUringPool;

/// Arguments to [`walk`]. Mirrors the engine API described in SPEC_FULL.md §6.
pub struct WalkArgs<'cb> {
    pub roots: Vec<Vec<u8>>,
    pub flags: Flags,
    pub strategy: Strategy,
    /// Maximum simultaneously open fds; must be at least 2.
    pub nopenfd: usize,
    /// Number of ioq worker threads; 0 selects the inline, synchronous backend.
    pub ioq_threads: usize,
    /// Pre-populated mount facts / mtab parser, supplied by the external CLI
    /// collaborator. `None` falls back to pure dev-comparison.
    pub mount_table: Option<Box<dyn MountTable>>,
    pub callback: &'cb mut dyn FnMut(&Visit) -> VisitResult,
}

/// Walk `args.roots`, invoking `args.callback` for every reachable entry.
pub fn walk(args: WalkArgs) -> Result<()> {
    let WalkArgs { roots, flags, strategy, nopenfd, ioq_threads, mount_table, callback } = args;
    let mount_table = mount_table.unwrap_or_else(|| Box::new(NoMountTable));

    match strategy {
        Strategy::Bfs => {
            engine::run_pass(&roots, flags, QueueStyle::Fifo, nopenfd, make_ioq(ioq_threads), mount_table.as_ref(), callback)
        }
        Strategy::Dfs => {
            engine::run_pass(&roots, flags, QueueStyle::Lifo, nopenfd, make_ioq(ioq_threads), mount_table.as_ref(), callback)
        }
        Strategy::IterativeDeepening => {
            iterative_deepening::run(&roots, flags, nopenfd, ioq_threads, mount_table.as_ref(), callback)
        }
        Strategy::ExponentialDeepening => {
            exponential_deepening::run(&roots, flags, nopenfd, ioq_threads, mount_table.as_ref(), callback)
        }
    }
}

/// Build an ioq backend for `threads` workers. On Linux, a nonzero thread
/// count prefers `threads` independent `io_uring` rings round-robined
/// together, falling back to the thread pool if even one ring can't be
/// created (e.g. a container without the syscall allowed).
#[cfg(target_os = "linux")]
pub(crate) fn make_ioq(threads: usize) -> Box<dyn IoBackend> {
    if threads == 0 {
        return Box::new(InlineBackend::new());
    }
    match IoUringPool::new(threads, 64) {
        Ok(pool) => Box::new(pool),
        Err(_) => Box::new(ThreadPoolBackend::new(threads)),
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn make_ioq(threads: usize) -> Box<dyn IoBackend> {
    if threads == 0 {
        Box::new(InlineBackend::new())
    } else {
        Box::new(ThreadPoolBackend::new(threads))
    }
}

//! A breadth-first (and depth-first, iterative-deepening, exponential-
//! deepening) filesystem traversal engine.
//!
//! The engine's main loop is a single synchronous, non-suspending call stack
//! (SPEC_FULL.md §5): directory opens, stats, and closes are offloaded to an
//! [`ioq`] backend (inline, a thread pool, or `io_uring` on Linux) so the loop
//! never blocks on a single slow filesystem while other work is ready.
//! Embedders drive the engine through [`walk`], supplying a callback that
//! receives a [`Visit`] for every entry and returns a [`VisitResult`].

mod arena;
mod config;
mod engine;
mod error;
mod fd_cache;
mod ioq;
mod logging;
mod mount;
mod path;
mod queue;
mod record;
mod strategy;
mod visitor;

pub use config::{EngineConfig, Flags, FollowPolicy, Strategy};
pub use error::{Error, Result};
pub use logging::init as init_logging;
pub use mount::{MountTable, NoMountTable};
pub use record::{DeviceInode, FileStat, FileType, Timestamp};
pub use strategy::{walk, WalkArgs};
pub use visitor::{Visit, VisitKind, VisitResult};

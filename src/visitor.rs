//! The visitor descriptor handed to the user callback, and its result type
//! (SPEC_FULL.md §4.4.b, §6).

use std::cell::OnceCell;
use std::ffi::CString;
use std::os::unix::io::RawFd;

use crate::config::FollowPolicy;
use crate::ioq::{self, IoOp, IoOutcome};
use crate::record::{FileStat, FileType};

/// Whether a callback invocation is the pre-order or post-order visit of a
/// directory (files only ever get a PRE visit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitKind {
    Pre,
    Post,
}

/// The callback's decision for how the engine should proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitResult {
    /// Descend into the directory (if any) and keep walking.
    Continue,
    /// Do not descend; if this is a "current" record, run its POST gc.
    Prune,
    /// Abort the whole walk; the final `walk()` call returns an error.
    Stop,
}

/// A read-only snapshot passed to the visitor callback.
///
/// Whenever the engine's own decision tree (SPEC_FULL.md §4.4.d, `must_stat`)
/// already required a `stat`/`lstat` for this entry, that result is prefilled
/// here at construction time. Otherwise `stat()`/`lstat()` lazily fault in
/// the buffer the first time the callback asks for it, via the same
/// `fstatat` the engine itself would have issued, and cache the result for
/// any further calls on this same `Visit` (SPEC_FULL.md §4.4.b, §6).
pub struct Visit<'a> {
    pub path: &'a [u8],
    pub root: &'a [u8],
    pub depth: u32,
    pub kind: VisitKind,
    pub file_type: FileType,
    pub error: Option<i32>,
    /// Directory fd to resolve `at_path` against, if a parent fd is cached.
    pub at_fd: Option<RawFd>,
    pub at_path: &'a [u8],
    pub(crate) stat: OnceCell<Result<FileStat, i32>>,
    pub(crate) lstat: OnceCell<Result<FileStat, i32>>,
}

impl<'a> Visit<'a> {
    /// The follow-symlink stat, fetching it on first call if the engine
    /// didn't already need one for this entry.
    pub fn stat(&self) -> Result<&FileStat, i32> {
        self.stat.get_or_init(|| self.fetch(true)).as_ref().map_err(|errno| *errno)
    }

    /// The no-follow stat, fetching it on first call if the engine didn't
    /// already need one for this entry.
    pub fn lstat(&self) -> Result<&FileStat, i32> {
        self.lstat.get_or_init(|| self.fetch(false)).as_ref().map_err(|errno| *errno)
    }

    /// Either `stat()` or `lstat()`, depending on `follow` -- but never
    /// triggers a fetch; `None` if that buffer hasn't been resolved yet.
    pub fn cached_stat(&self, follow: FollowPolicy) -> Option<&FileStat> {
        let slot = match follow {
            FollowPolicy::TryFollow => &self.stat,
            FollowPolicy::NoFollow => &self.lstat,
        };
        slot.get().and_then(|r| r.as_ref().ok())
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    fn fetch(&self, follow: bool) -> Result<FileStat, i32> {
        let Ok(name) = CString::new(self.at_path) else { return Err(libc::EINVAL) };
        let dir_fd = self.at_fd.unwrap_or(libc::AT_FDCWD);
        match ioq::execute(IoOp::Stat { dir_fd, name, follow }) {
            IoOutcome::Stat { stat } => Ok(stat),
            IoOutcome::Err { errno } => Err(errno),
            IoOutcome::Dir { .. } | IoOutcome::Closed => unreachable!("Stat always resolves to Stat or Err"),
        }
    }
}

/// Wrap a result the engine already resolved before constructing a `Visit`,
/// if any, so `stat()`/`lstat()` reuse it instead of fetching again.
pub(crate) fn prefilled(value: Option<Result<FileStat, i32>>) -> OnceCell<Result<FileStat, i32>> {
    let cell = OnceCell::new();
    if let Some(value) = value {
        let _ = cell.set(value);
    }
    cell
}

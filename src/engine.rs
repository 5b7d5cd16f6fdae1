//! The traversal engine's main loop (SPEC_FULL.md §4.4).
//!
//! Grounded on the teacher's `VfsTask`-style "own the state, run a loop"
//! shape, but collapsed onto a single synchronous call stack per §5 instead
//! of a `tokio::spawn`ed task: the engine itself never suspends, it only
//! blocks on the ioq, on `readdir`, or inside the callback.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::unix::io::RawFd;

use tracing::{debug, trace};

use crate::arena::{Arena, RecordId};
use crate::config::{FollowPolicy, Flags};
use crate::error::{Error, Result};
use crate::fd_cache::FdCache;
use crate::ioq::{self, IoBackend, IoCompletion, IoOp, IoOutcome};
use crate::mount::{MountHints, MountTable};
use crate::path::PathBuilder;
use crate::queue::{Queue, QueueFlags};
use crate::record::{DeviceInode, FileRecord, FileStat, FileType, StatSlot};
use crate::stat;
use crate::visitor::{Visit, VisitKind, VisitResult};

/// Whether the engine's two queues drain in FIFO (BFS) or LIFO (DFS) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStyle {
    Fifo,
    Lifo,
}

/// What an in-flight ioq submission was for, so its completion can be routed
/// back to the right queue and record field. `pinned` is the parent record
/// whose cached fd was used as `at_fd` for this op, if any -- pinned for the
/// duration of the submission so a concurrent `reserve()` can't evict it out
/// from under the still-running `openat`/`fstatat` (SPEC_FULL.md §4.1).
enum InFlight {
    OpenDir { depth: u32, pinned: Option<RecordId> },
    Stat { follow: FollowPolicy, pinned: Option<RecordId> },
}

/// Run one engine pass over `roots`, invoking `callback` for every reachable
/// entry. `callback` may be a user's own visitor or a strategy wrapper's
/// depth-filtering shim (see `strategy/`).
pub fn run_pass(
    roots: &[Vec<u8>],
    flags: Flags,
    queue_style: QueueStyle,
    nopenfd: usize,
    ioq: Box<dyn IoBackend>,
    mount_table: &dyn MountTable,
    callback: &mut dyn FnMut(&Visit) -> VisitResult,
) -> Result<()> {
    if nopenfd < 2 {
        return Err(Error::Invalid("nopenfd must be at least 2"));
    }
    if roots.is_empty() {
        return Err(Error::Invalid("walk requires at least one root path"));
    }

    let queue_flags = build_queue_flags(flags, queue_style, ioq.as_ref());
    // DFS requires buffering children into records (so they land in the LIFO
    // directory/file queues instead of being visited immediately in readdir
    // order) even when the caller's own `Flags::BUFFER` bit is unset.
    let buffer_children = flags.contains(Flags::BUFFER) || queue_style == QueueStyle::Lifo;
    let mut engine = Engine {
        arena: Arena::new(),
        dir_queue: Queue::new(queue_flags),
        file_queue: Queue::new(queue_flags),
        fd_cache: FdCache::new(nopenfd.saturating_sub(1)),
        ioq,
        inflight: HashMap::new(),
        mount_hints: MountHints::new(),
        mount_table,
        path: PathBuilder::new(),
        flags,
        buffer_children,
        callback,
        accumulated_error: None,
        stopped: false,
    };
    engine.run(roots)
}

fn build_queue_flags(flags: Flags, queue_style: QueueStyle, ioq: &dyn IoBackend) -> QueueFlags {
    let mut qf = QueueFlags::empty();
    if flags.contains(Flags::SORT) {
        qf |= QueueFlags::ORDER;
    }
    if flags.contains(Flags::BUFFER) || queue_style == QueueStyle::Lifo {
        qf |= QueueFlags::BUFFER;
    }
    if queue_style == QueueStyle::Lifo {
        qf |= QueueFlags::LIFO;
    }
    if backend_is_threaded(ioq) {
        qf |= QueueFlags::BALANCE;
    }
    qf
}

/// The inline backend never contends with the main thread for syscalls, so
/// its queues skip the balance bookkeeping entirely (SPEC_FULL.md §4.2).
fn backend_is_threaded(ioq: &dyn IoBackend) -> bool {
    !ioq.is_synchronous()
}

struct Engine<'cb> {
    arena: Arena,
    dir_queue: Queue,
    file_queue: Queue,
    fd_cache: FdCache,
    ioq: Box<dyn IoBackend>,
    inflight: HashMap<RecordId, InFlight>,
    mount_hints: MountHints,
    mount_table: &'cb dyn MountTable,
    path: PathBuilder,
    flags: Flags,
    /// Whether a dirent should be allocated a persistent [`FileRecord`] and
    /// queued rather than visited transiently. True for `Flags::BUFFER`
    /// (e.g. SORT) and whenever the strategy's queue order is LIFO (DFS),
    /// per SPEC_FULL.md §4.4.a.
    buffer_children: bool,
    callback: &'cb mut dyn FnMut(&Visit) -> VisitResult,
    accumulated_error: Option<Error>,
    stopped: bool,
}

impl<'cb> Engine<'cb> {
    fn run(&mut self, roots: &[Vec<u8>]) -> Result<()> {
        let span = tracing::info_span!("walk", roots = roots.len());
        let _enter = span.enter();

        for root_name in roots {
            if self.stopped {
                break;
            }
            self.seed_root(root_name.clone())?;
        }

        self.dir_queue.flush();
        self.file_queue.flush();

        while !self.stopped && (!self.dir_queue.is_empty() || !self.file_queue.is_empty()) {
            self.drain_completions()?;

            if let Some(id) = self.next_directory() {
                self.drain_directory(id)?;
            } else if let Some(id) = self.next_file() {
                self.visit_record(id, VisitKind::Pre)?;
            } else {
                // Nothing immediately ready; block on the ioq for progress.
                if let Some(completion) = self.ioq.recv_blocking() {
                    self.apply_completion(completion)?;
                } else {
                    break;
                }
            }
            self.dir_queue.flush();
            self.file_queue.flush();
        }

        match (self.stopped, self.accumulated_error.take()) {
            (true, _) => Err(Error::Stopped),
            (false, Some(err)) => Err(err),
            (false, None) => Ok(()),
        }
    }

    /// A root has no parent dirent to supply a type hint, so (unlike a
    /// buffered or transient child) it always needs an explicit stat before
    /// `visit_record` can recognize it as a directory worth descending into.
    fn seed_root(&mut self, name: Vec<u8>) -> Result<()> {
        let id = self.arena.insert(FileRecord::new_root(name.clone()));
        let follow = stat::effective_follow_policy(self.flags, 0);
        match CString::new(name) {
            Ok(cname) => {
                let outcome = ioq::execute(IoOp::Stat {
                    dir_fd: libc::AT_FDCWD,
                    name: cname,
                    follow: follow == FollowPolicy::TryFollow,
                });
                match outcome {
                    IoOutcome::Stat { stat } => self.store_stat(id, follow, Ok(stat)),
                    IoOutcome::Err { errno } => self.record_error_on(id, errno),
                    IoOutcome::Dir { .. } | IoOutcome::Closed => unreachable!("Stat always resolves to Stat or Err"),
                }
            }
            Err(_) => self.record_error_on(id, libc::EINVAL),
        }
        self.visit_record(id, VisitKind::Pre)
    }

    fn next_directory(&mut self) -> Option<RecordId> {
        self.dir_queue.pop().or_else(|| self.dir_queue.pop_waiting())
    }

    fn next_file(&mut self) -> Option<RecordId> {
        self.file_queue.pop().or_else(|| self.file_queue.pop_waiting())
    }

    fn drain_completions(&mut self) -> Result<()> {
        while let Some(completion) = self.ioq.try_recv() {
            self.apply_completion(completion)?;
        }
        Ok(())
    }

    /// Route a completed ioq op back to its record and queue, unpinning
    /// whatever parent fd it borrowed as `at_fd` (if any) now that the op is
    /// done. A directory open that succeeds still has to compete for a cache
    /// slot the same way `open_directory_sync` does -- propagated as a hard
    /// error on exhaustion, not silently absorbed, since `fd` would otherwise
    /// leak uncounted.
    fn apply_completion(&mut self, completion: IoCompletion) -> Result<()> {
        let IoCompletion { id, outcome } = completion;
        let Some(kind) = self.inflight.remove(&id) else { return Ok(()) };
        match kind {
            InFlight::OpenDir { depth, pinned } => {
                if let Some(parent) = pinned {
                    self.fd_cache.unpin(&mut self.arena, parent);
                }
                match outcome {
                    IoOutcome::Dir { fd } => {
                        trace!(depth, fd, "opendir completed");
                        if let Err(err) = self.fd_cache.reserve(&mut self.arena) {
                            unsafe {
                                libc::close(fd);
                            }
                            return Err(err);
                        }
                        self.arena.get_mut(id).fd = Some(fd);
                        self.fd_cache.add(&mut self.arena, id);
                        self.dir_queue.attach_async(id);
                    }
                    IoOutcome::Err { errno } => {
                        self.record_error_on(id, errno);
                        self.dir_queue.attach_async(id);
                    }
                    IoOutcome::Stat { .. } | IoOutcome::Closed => {}
                }
            }
            InFlight::Stat { follow, pinned } => {
                if let Some(parent) = pinned {
                    self.fd_cache.unpin(&mut self.arena, parent);
                }
                match outcome {
                    IoOutcome::Stat { stat } => {
                        self.store_stat(id, follow, Ok(stat));
                        self.file_queue.attach_async(id);
                    }
                    IoOutcome::Err { errno } => {
                        self.store_stat(id, follow, Err(errno));
                        self.file_queue.attach_async(id);
                    }
                    IoOutcome::Dir { .. } | IoOutcome::Closed => {}
                }
            }
        }
        Ok(())
    }

    fn store_stat(&mut self, id: RecordId, follow: FollowPolicy, result: std::result::Result<FileStat, i32>) {
        let rec = self.arena.get_mut(id);
        let slot = stat::slot_mut(rec, follow);
        *slot = match result {
            Ok(stat) => StatSlot::Ok(stat),
            Err(errno) => StatSlot::Err(errno),
        };
        rec.ioqueued = false;
        if let Ok(stat) = result {
            rec.dev = Some(stat.dev);
            rec.ino = Some(stat.ino);
            if rec.file_type == FileType::Unknown {
                rec.file_type = stat.file_type();
            }
        }
    }

    fn record_error_on(&mut self, id: RecordId, errno: i32) {
        let rec = self.arena.get_mut(id);
        rec.file_type = FileType::Error;
        rec.ioqueued = false;
        rec.error_errno = Some(errno);
        if self.accumulated_error.is_none() {
            self.accumulated_error = Some(crate::error::from_errno(errno));
        }
    }

    /// Drain one directory's entries, then GC it. A directory that failed to
    /// open (or was cycle-detected in `descend_into`) is reported to the
    /// visitor as an ERROR entry instead of silently skipped, per
    /// SPEC_FULL.md §4.4.f/§4.4.g.
    fn drain_directory(&mut self, id: RecordId) -> Result<()> {
        if self.arena.get(id).file_type != FileType::Error && self.arena.get(id).fd.is_none() {
            self.open_directory_sync(id)?;
        }

        if self.arena.get(id).file_type == FileType::Error {
            self.emit_error_visit(id);
            self.gc(id);
            return Ok(());
        }

        let entries = self.read_directory_entries(id)?;
        for (name, file_type) in entries {
            if self.stopped {
                break;
            }
            self.visit_child(id, name, file_type)?;
        }

        self.gc(id);
        Ok(())
    }

    /// Open `id`'s directory fd directly on this thread, using the nearest
    /// open ancestor as `at_fd`. Falls back to component-wise opens on
    /// `ENAMETOOLONG` (SPEC_FULL.md §4.4.h).
    fn open_directory_sync(&mut self, id: RecordId) -> Result<()> {
        self.fd_cache.reserve(&mut self.arena)?;
        let (at_fd, name) = self.open_at_fd_and_name(id);
        let cname = CString::new(name).unwrap_or_else(|_| CString::new("?").unwrap());
        let follow = stat::effective_follow_policy(self.flags, self.arena.get(id).depth) == FollowPolicy::TryFollow;
        match ioq::execute(IoOp::OpenDir { parent_fd: at_fd, name: cname, follow }) {
            IoOutcome::Dir { fd } => {
                self.arena.get_mut(id).fd = Some(fd);
                self.fd_cache.add(&mut self.arena, id);
                Ok(())
            }
            IoOutcome::Err { errno } if errno == libc::ENAMETOOLONG => self.open_directory_componentwise(id),
            IoOutcome::Err { errno } => {
                self.record_error_on(id, errno);
                Ok(())
            }
            IoOutcome::Closed | IoOutcome::Stat { .. } => unreachable!("OpenDir always resolves to Dir or Err"),
        }
    }

    fn open_directory_componentwise(&mut self, id: RecordId) -> Result<()> {
        let chain = self.ancestor_chain_from_open_fd(id);
        let mut at_fd = libc::AT_FDCWD;
        for ancestor in chain {
            let name = self.arena.get(ancestor).name.clone();
            let cname = CString::new(name).unwrap_or_else(|_| CString::new("?").unwrap());
            // Intermediate ancestors are directories already confirmed by an
            // earlier `opendir`, never symlinks worth following; only the
            // final component (`ancestor == id`) may need to honor
            // FOLLOW_ALL/FOLLOW_ROOTS.
            let follow = ancestor == id
                && stat::effective_follow_policy(self.flags, self.arena.get(ancestor).depth) == FollowPolicy::TryFollow;
            match ioq::execute(IoOp::OpenDir { parent_fd: at_fd, name: cname, follow }) {
                IoOutcome::Dir { fd } => {
                    at_fd = fd;
                    if ancestor == id {
                        self.arena.get_mut(id).fd = Some(fd);
                        self.fd_cache.add(&mut self.arena, id);
                    } else {
                        unsafe {
                            libc::close(fd);
                        }
                    }
                }
                IoOutcome::Err { errno } => {
                    self.record_error_on(id, errno);
                    return Ok(());
                }
                _ => unreachable!(),
            }
        }
        Ok(())
    }

    /// Ancestors from the nearest still-open directory (exclusive) down to
    /// and including `id`, used by the `ENAMETOOLONG` fallback.
    fn ancestor_chain_from_open_fd(&self, id: RecordId) -> Vec<RecordId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(parent) = self.arena.get(current).parent {
            chain.push(parent);
            if self.arena.get(parent).fd.is_some() {
                break;
            }
            current = parent;
        }
        chain.reverse();
        chain
    }

    /// The `at_fd`/name pair to open `id` relative to its nearest open
    /// ancestor (or `AT_FDCWD` if none is cached).
    fn open_at_fd_and_name(&self, id: RecordId) -> (RawFd, Vec<u8>) {
        match self.arena.get(id).parent {
            Some(parent) if self.arena.get(parent).fd.is_some() => {
                (self.arena.get(parent).fd.unwrap(), self.arena.get(id).name.clone())
            }
            _ => (libc::AT_FDCWD, self.path.build(&self.arena, id, None).to_vec()),
        }
    }

    /// Like [`Self::open_at_fd_and_name`], but for an `at_fd` that will be
    /// used by an *async* submission: the parent whose fd is borrowed is
    /// pinned so `fd_cache.reserve()` can't evict it before the matching
    /// completion arrives and unpins it (SPEC_FULL.md §4.1).
    fn open_at_fd_and_name_pinned(&mut self, id: RecordId) -> (RawFd, Vec<u8>, Option<RecordId>) {
        match self.arena.get(id).parent {
            Some(parent) if self.arena.get(parent).fd.is_some() => {
                self.fd_cache.pin(&mut self.arena, parent);
                (self.arena.get(parent).fd.unwrap(), self.arena.get(id).name.clone(), Some(parent))
            }
            _ => (libc::AT_FDCWD, self.path.build(&self.arena, id, None).to_vec(), None),
        }
    }

    fn read_directory_entries(&self, id: RecordId) -> Result<Vec<(Vec<u8>, FileType)>> {
        let fd = self.arena.get(id).fd.expect("caller checked fd is open");
        let dup_fd = unsafe { libc::dup(fd) };
        if dup_fd < 0 {
            return Err(crate::error::from_errno(unsafe { *libc::__errno_location() }));
        }
        let dirp = unsafe { libc::fdopendir(dup_fd) };
        if dirp.is_null() {
            let errno = unsafe { *libc::__errno_location() };
            unsafe {
                libc::close(dup_fd);
            }
            return Err(crate::error::from_errno(errno));
        }

        let mut entries = Vec::new();
        loop {
            unsafe {
                *libc::__errno_location() = 0;
            }
            let entry = unsafe { libc::readdir(dirp) };
            if entry.is_null() {
                let errno = unsafe { *libc::__errno_location() };
                if errno != 0 {
                    unsafe {
                        libc::closedir(dirp);
                    }
                    return Err(crate::error::from_errno(errno));
                }
                break;
            }
            let name = unsafe { CStr::from_ptr((*entry).d_name.as_ptr()) }.to_bytes();
            if name == b"." || name == b".." {
                continue;
            }
            let d_type = unsafe { (*entry).d_type };
            entries.push((name.to_vec(), dirent_file_type(d_type)));
        }
        unsafe {
            libc::closedir(dirp);
        }
        if self.flags.contains(Flags::SORT) {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
        }
        Ok(entries)
    }

    /// SPEC_FULL.md §4.4.a: decide whether to buffer this dirent as a new
    /// record, or visit it immediately without ever allocating one.
    fn visit_child(&mut self, parent: RecordId, name: Vec<u8>, type_hint: FileType) -> Result<()> {
        if self.buffer_children {
            self.buffer_child(parent, name, type_hint)
        } else {
            self.visit_transient(parent, name, type_hint)
        }
    }

    fn buffer_child(&mut self, parent: RecordId, name: Vec<u8>, type_hint: FileType) -> Result<()> {
        let root = self.arena.get(parent).root.unwrap_or(parent);
        let parent_rec = self.arena.get(parent);
        let mut rec = FileRecord::new_child(
            name,
            parent,
            root,
            parent_rec.depth,
            parent_rec.name_offset,
            parent_rec.name_length,
            parent_rec.name.last() == Some(&b'/'),
        );
        rec.file_type = type_hint;
        let depth = rec.depth;
        let id = self.arena.insert(rec);
        self.arena.get_mut(parent).refcount += 1;
        self.file_queue.push_file(id);

        let follow = stat::effective_follow_policy(self.flags, depth);
        if stat::must_stat(self.flags, depth, type_hint, false) && self.file_queue.may_service_async() {
            self.submit_stat(id, follow);
        } else {
            self.file_queue.skip(id);
        }
        Ok(())
    }

    fn submit_stat(&mut self, id: RecordId, follow: FollowPolicy) {
        let (dir_fd, name, pinned) = self.open_at_fd_and_name_pinned(id);
        let Ok(cname) = CString::new(name) else {
            if let Some(parent) = pinned {
                self.fd_cache.unpin(&mut self.arena, parent);
            }
            self.file_queue.skip(id);
            return;
        };
        self.arena.get_mut(id).ioqueued = true;
        self.inflight.insert(id, InFlight::Stat { follow, pinned });
        self.file_queue.detach_async();
        self.ioq.submit(id, IoOp::Stat { dir_fd, name: cname, follow: follow == FollowPolicy::TryFollow });
    }

    /// A leaf-ish dirent visited without ever allocating a [`FileRecord`]:
    /// files (unless later promoted to directories by the callback's own
    /// `Continue`) never need the bookkeeping a persistent record buys.
    fn visit_transient(&mut self, parent: RecordId, name: Vec<u8>, type_hint: FileType) -> Result<()> {
        let depth = self.arena.get(parent).depth + 1;
        let follow = stat::effective_follow_policy(self.flags, depth);
        let need_stat = stat::must_stat(self.flags, depth, type_hint, false);

        let mut stat_result = None;
        let mut lstat_result = None;
        let mut resolved_type = type_hint;
        let mut error = None;

        if need_stat {
            let (dir_fd, _) = self.open_at_fd_and_name(parent);
            let outcome = ioq::execute(IoOp::Stat {
                dir_fd,
                name: CString::new(name.clone()).unwrap_or_else(|_| CString::new("?").unwrap()),
                follow: follow == FollowPolicy::TryFollow,
            });
            match outcome {
                IoOutcome::Stat { stat } => {
                    resolved_type = stat.file_type();
                    if follow == FollowPolicy::TryFollow {
                        stat_result = Some(stat);
                    } else {
                        lstat_result = Some(stat);
                    }
                }
                IoOutcome::Err { errno } => {
                    resolved_type = FileType::Error;
                    error = Some(errno);
                }
                _ => unreachable!(),
            }
        }

        let path = self.path.build(&self.arena, parent, Some(&name)).to_vec();
        let root_path = self.arena.get(self.arena.get(parent).root.unwrap_or(parent)).name.clone();
        let at_fd = self.arena.get(parent).fd;

        let visit = Visit {
            path: &path,
            root: &root_path,
            depth,
            kind: VisitKind::Pre,
            file_type: resolved_type,
            error,
            at_fd,
            at_path: &name,
            stat: crate::visitor::prefilled(stat_result.map(Ok).or(error.map(Err)).filter(|_| follow == FollowPolicy::TryFollow)),
            lstat: crate::visitor::prefilled(lstat_result.map(Ok).or(error.map(Err)).filter(|_| follow == FollowPolicy::NoFollow)),
        };
        let result = (self.callback)(&visit);
        drop(visit);

        match result {
            VisitResult::Stop => {
                self.stopped = true;
                Ok(())
            }
            VisitResult::Prune => Ok(()),
            VisitResult::Continue if resolved_type == FileType::Directory => {
                self.descend_into(parent, name, stat_result.or(lstat_result))
            }
            VisitResult::Continue => Ok(()),
        }
    }

    fn descend_into(&mut self, parent: RecordId, name: Vec<u8>, known_stat: Option<FileStat>) -> Result<()> {
        let root = self.arena.get(parent).root.unwrap_or(parent);
        let parent_rec = self.arena.get(parent);
        let mut rec = FileRecord::new_child(
            name,
            parent,
            root,
            parent_rec.depth,
            parent_rec.name_offset,
            parent_rec.name_length,
            parent_rec.name.last() == Some(&b'/'),
        );
        rec.file_type = FileType::Directory;
        if let Some(stat) = known_stat {
            rec.dev = Some(stat.dev);
            rec.ino = Some(stat.ino);
            rec.stat = StatSlot::Ok(stat);
        }
        let id = self.arena.insert(rec);
        self.arena.get_mut(parent).refcount += 1;

        if self.flags.contains(Flags::DETECT_CYCLES) && self.detects_cycle(id) {
            self.record_error_on(id, libc::ELOOP);
            self.dir_queue.push(id);
            self.dir_queue.skip(id);
            return Ok(());
        }

        if self.is_mount_boundary(id) {
            if self.flags.contains(Flags::SKIP_MOUNTS) {
                self.gc(id);
                return Ok(());
            }
            if self.flags.contains(Flags::PRUNE_MOUNTS) {
                self.dir_queue.push(id);
                self.dir_queue.skip(id);
                self.arena.get_mut(id).pruned = true;
                return Ok(());
            }
        }

        self.dir_queue.push(id);
        if self.dir_queue.may_service_async() {
            self.submit_opendir(id);
        } else {
            self.dir_queue.skip(id);
        }
        Ok(())
    }

    fn submit_opendir(&mut self, id: RecordId) {
        let (at_fd, name, pinned) = self.open_at_fd_and_name_pinned(id);
        let Ok(cname) = CString::new(name) else {
            if let Some(parent) = pinned {
                self.fd_cache.unpin(&mut self.arena, parent);
            }
            self.dir_queue.skip(id);
            return;
        };
        self.arena.get_mut(id).ioqueued = true;
        let depth = self.arena.get(id).depth;
        let follow = stat::effective_follow_policy(self.flags, depth) == FollowPolicy::TryFollow;
        self.inflight.insert(id, InFlight::OpenDir { depth, pinned });
        self.dir_queue.detach_async();
        self.ioq.submit(id, IoOp::OpenDir { parent_fd: at_fd, name: cname, follow });
    }

    fn detects_cycle(&self, id: RecordId) -> bool {
        let Some(DeviceInode { dev, ino }) = self.arena.get(id).device_inode() else { return false };
        let mut current = self.arena.get(id).parent;
        while let Some(ancestor) = current {
            if let Some(ancestor_di) = self.arena.get(ancestor).device_inode() {
                if ancestor_di.dev == dev && ancestor_di.ino == ino {
                    return true;
                }
            }
            current = self.arena.get(ancestor).parent;
        }
        false
    }

    fn is_mount_boundary(&mut self, id: RecordId) -> bool {
        if !self.flags.intersects(Flags::SKIP_MOUNTS | Flags::PRUNE_MOUNTS) {
            return false;
        }
        let Some(dev) = self.arena.get(id).dev else { return false };
        let Some(parent) = self.arena.get(id).parent else { return false };
        let Some(parent_dev) = self.arena.get(parent).dev else { return false };
        let is_boundary = dev != parent_dev || self.mount_table.is_mount_device(dev);
        self.mount_hints.set(dev, is_boundary);
        if is_boundary {
            debug!(dev, "mount boundary detected");
        }
        is_boundary
    }

    /// Visit an already-allocated record popped off a queue (SPEC_FULL.md
    /// §4.4, step 2b): its PRE visit already happened via `descend_into`'s
    /// caller for directories, so this path only fires for buffered files
    /// and for roots, whose PRE visit has not happened yet.
    fn visit_record(&mut self, id: RecordId, kind: VisitKind) -> Result<()> {
        if self.arena.get(id).file_type == FileType::Error {
            self.emit_error_visit(id);
            self.gc(id);
            return Ok(());
        }

        let depth = self.arena.get(id).depth;
        let follow = stat::effective_follow_policy(self.flags, depth);
        let path = self.path.build(&self.arena, id, None).to_vec();
        let root_id = self.arena.get(id).root.unwrap_or(id);
        let root_path = self.arena.get(root_id).name.clone();
        let at_fd = self.arena.get(id).parent.and_then(|p| self.arena.get(p).fd);
        let at_path = self.arena.get(id).name.clone();
        let file_type = self.arena.get(id).file_type;

        let visit = Visit {
            path: &path,
            root: &root_path,
            depth,
            kind,
            file_type,
            error: None,
            at_fd,
            at_path: &at_path,
            stat: crate::visitor::prefilled(stat::resolve(self.arena.get(id), FollowPolicy::TryFollow).map(|r| r.map(|s| *s))),
            lstat: crate::visitor::prefilled(stat::resolve(self.arena.get(id), FollowPolicy::NoFollow).map(|r| r.map(|s| *s))),
        };
        let result = (self.callback)(&visit);
        drop(visit);

        match (kind, result) {
            (_, VisitResult::Stop) => {
                self.stopped = true;
            }
            (VisitKind::Pre, VisitResult::Continue) if file_type == FileType::Directory => {
                self.arena.get_mut(id).refcount += 1;
                trace!(depth, "descending into buffered directory");
                self.dir_queue.push(id);
                if self.dir_queue.may_service_async() {
                    self.submit_opendir(id);
                } else {
                    self.dir_queue.skip(id);
                }
                self.gc(id);
                return Ok(());
            }
            (VisitKind::Pre, VisitResult::Prune) | (VisitKind::Pre, VisitResult::Continue) => {}
            (VisitKind::Post, _) => {}
        }
        self.gc(id);
        Ok(())
    }

    /// Report an already-`record_error_on`'d entry to the visitor, if
    /// `RECOVER` permits it; `record_error_on` already folded the errno into
    /// `accumulated_error`, so the non-`RECOVER` case needs no further work.
    fn emit_error_visit(&mut self, id: RecordId) {
        if !self.flags.contains(Flags::RECOVER) {
            return;
        }
        let path = self.path.build(&self.arena, id, None).to_vec();
        let root_id = self.arena.get(id).root.unwrap_or(id);
        let root_path = self.arena.get(root_id).name.clone();
        let at_path = self.arena.get(id).name.clone();
        let visit = Visit {
            path: &path,
            root: &root_path,
            depth: self.arena.get(id).depth,
            kind: VisitKind::Pre,
            file_type: FileType::Error,
            error: self.arena.get(id).error_errno,
            at_fd: None,
            at_path: &at_path,
            stat: crate::visitor::prefilled(None),
            lstat: crate::visitor::prefilled(None),
        };
        if (self.callback)(&visit) == VisitResult::Stop {
            self.stopped = true;
        }
    }

    /// Decrement `id`'s refcount and, when it reaches zero, fire the POST
    /// visit (if due), close its fd, and free it, propagating to the parent.
    fn gc(&mut self, id: RecordId) {
        let mut current = id;
        loop {
            let refcount = {
                let rec = self.arena.get_mut(current);
                rec.refcount = rec.refcount.saturating_sub(1);
                rec.refcount
            };
            if refcount > 0 {
                break;
            }

            if self.flags.contains(Flags::POST_ORDER)
                && self.arena.get(current).file_type == FileType::Directory
                && !self.arena.get(current).post_visited
            {
                self.arena.get_mut(current).post_visited = true;
                let _ = self.visit_record_post(current);
            }

            self.close_record(current);
            self.path.forget(current);
            let parent = self.arena.get(current).parent;
            self.arena.remove(current);
            match parent {
                Some(p) => current = p,
                None => break,
            }
        }
    }

    fn visit_record_post(&mut self, id: RecordId) -> Result<()> {
        let depth = self.arena.get(id).depth;
        let path = self.path.build(&self.arena, id, None).to_vec();
        let root_id = self.arena.get(id).root.unwrap_or(id);
        let root_path = self.arena.get(root_id).name.clone();
        let at_path = self.arena.get(id).name.clone();
        let visit = Visit {
            path: &path,
            root: &root_path,
            depth,
            kind: VisitKind::Post,
            file_type: self.arena.get(id).file_type,
            error: None,
            at_fd: None,
            at_path: &at_path,
            stat: crate::visitor::prefilled(stat::resolve(self.arena.get(id), FollowPolicy::TryFollow).map(|r| r.map(|s| *s))),
            lstat: crate::visitor::prefilled(stat::resolve(self.arena.get(id), FollowPolicy::NoFollow).map(|r| r.map(|s| *s))),
        };
        if (self.callback)(&visit) == VisitResult::Stop {
            self.stopped = true;
        }
        Ok(())
    }

    fn close_record(&mut self, id: RecordId) {
        if self.arena.get(id).fd.is_some() {
            self.fd_cache.remove(&mut self.arena, id);
            if let Some(fd) = self.arena.get_mut(id).fd.take() {
                unsafe {
                    libc::close(fd);
                }
            }
        }
    }
}

const DT_WHT: u8 = 14;

fn dirent_file_type(d_type: u8) -> FileType {
    match d_type {
        libc::DT_REG => FileType::Regular,
        libc::DT_DIR => FileType::Directory,
        libc::DT_LNK => FileType::Symlink,
        libc::DT_BLK => FileType::BlockDev,
        libc::DT_CHR => FileType::CharDev,
        libc::DT_FIFO => FileType::Fifo,
        libc::DT_SOCK => FileType::Socket,
        DT_WHT => FileType::Whiteout,
        _ => FileType::Unknown,
    }
}

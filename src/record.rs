//! The per-entry record and its small satellite types.

use std::os::unix::io::RawFd;

use crate::arena::RecordId;

/// Classification of a filesystem entry.
///
/// `Unknown` covers dirents whose `d_type` the OS didn't supply (common on
/// some filesystems); the engine falls back to `stat` in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown,
    Regular,
    Directory,
    Symlink,
    BlockDev,
    CharDev,
    Fifo,
    Socket,
    /// A union-mount negative entry, synthesized from ENOENT + dirent `d_type = DT_WHT`.
    Whiteout,
    /// The entry could not be classified at all (stat/lstat failed).
    Error,
}

/// Device/inode pair used for mount-boundary and cycle-detection checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceInode {
    pub dev: u64,
    pub ino: u64,
}

/// A POSIX timestamp with nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanos: u32,
}

/// The subset of `struct stat` the engine and visitor care about.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blocks: i64,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

impl FileStat {
    /// Classify `self.mode` into a [`FileType`].
    pub fn file_type(&self) -> FileType {
        match self.mode & libc::S_IFMT {
            libc::S_IFREG => FileType::Regular,
            libc::S_IFDIR => FileType::Directory,
            libc::S_IFLNK => FileType::Symlink,
            libc::S_IFBLK => FileType::BlockDev,
            libc::S_IFCHR => FileType::CharDev,
            libc::S_IFIFO => FileType::Fifo,
            libc::S_IFSOCK => FileType::Socket,
            _ => FileType::Unknown,
        }
    }

    pub fn device_inode(&self) -> DeviceInode {
        DeviceInode { dev: self.dev, ino: self.ino }
    }
}

/// Lazily fetched stat buffer: unfetched, fetched successfully, or fetched
/// and failed with a specific errno.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StatSlot {
    #[default]
    Unfetched,
    Ok(FileStat),
    Err(i32),
}

impl StatSlot {
    pub fn as_result(&self) -> Option<Result<&FileStat, i32>> {
        match self {
            StatSlot::Unfetched => None,
            StatSlot::Ok(stat) => Some(Ok(stat)),
            StatSlot::Err(errno) => Some(Err(*errno)),
        }
    }
}

/// Intrusive doubly linked list hooks, reused for the three lists a record
/// may belong to simultaneously (queue stage, ready stage, LRU list). Each
/// record owns one `ListLinks` per list it may join.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListLinks {
    pub prev: Option<RecordId>,
    pub next: Option<RecordId>,
}

/// One encountered filesystem entry.
///
/// See SPEC_FULL.md §3 for the invariants this type must uphold; they are
/// enforced by `FdCache`, `Queue`, and `Engine`, not by this struct itself
/// (a plain data holder, like the teacher's `FileAttr`).
#[derive(Debug)]
pub struct FileRecord {
    pub name: Vec<u8>,
    pub parent: Option<RecordId>,
    /// `None` when this record is itself a root.
    pub root: Option<RecordId>,
    pub depth: u32,

    pub name_offset: usize,
    pub name_length: usize,

    pub fd: Option<RawFd>,
    pub has_dir_stream: bool,

    pub refcount: u32,
    pub pincount: u32,
    pub ioqueued: bool,

    pub file_type: FileType,
    pub dev: Option<u64>,
    pub ino: Option<u64>,

    pub stat: StatSlot,
    pub lstat: StatSlot,

    /// The errno that classified this record as [`FileType::Error`], if any.
    pub error_errno: Option<i32>,

    pub post_visited: bool,
    pub pruned: bool,

    pub queue_links: ListLinks,
    pub ready_links: ListLinks,
    pub lru_links: ListLinks,
}

impl FileRecord {
    /// Construct a root record (`depth = 0`, no parent, no root back-reference).
    pub fn new_root(name: Vec<u8>) -> Self {
        let name_length = name.len();
        FileRecord {
            name,
            parent: None,
            root: None,
            depth: 0,
            name_offset: 0,
            name_length,
            fd: None,
            has_dir_stream: false,
            refcount: 1,
            pincount: 0,
            ioqueued: false,
            file_type: FileType::Unknown,
            dev: None,
            ino: None,
            stat: StatSlot::Unfetched,
            lstat: StatSlot::Unfetched,
            error_errno: None,
            post_visited: false,
            pruned: false,
            queue_links: ListLinks::default(),
            ready_links: ListLinks::default(),
            lru_links: ListLinks::default(),
        }
    }

    /// Construct a child record of `parent`, per invariant (I5) in SPEC_FULL.md §3.
    pub fn new_child(
        name: Vec<u8>,
        parent_id: RecordId,
        root_id: RecordId,
        parent_depth: u32,
        parent_name_offset: usize,
        parent_name_length: usize,
        parent_ends_with_slash: bool,
    ) -> Self {
        let name_length = name.len();
        let name_offset =
            parent_name_offset + parent_name_length + usize::from(!parent_ends_with_slash);
        FileRecord {
            name,
            parent: Some(parent_id),
            root: Some(root_id),
            depth: parent_depth + 1,
            name_offset,
            name_length,
            fd: None,
            has_dir_stream: false,
            refcount: 1,
            pincount: 0,
            ioqueued: false,
            file_type: FileType::Unknown,
            dev: None,
            ino: None,
            stat: StatSlot::Unfetched,
            lstat: StatSlot::Unfetched,
            error_errno: None,
            post_visited: false,
            pruned: false,
            queue_links: ListLinks::default(),
            ready_links: ListLinks::default(),
            lru_links: ListLinks::default(),
        }
    }

    /// Device/inode pair if already cached by a prior stat.
    pub fn device_inode(&self) -> Option<DeviceInode> {
        match (self.dev, self.ino) {
            (Some(dev), Some(ino)) => Some(DeviceInode { dev, ino }),
            _ => None,
        }
    }
}

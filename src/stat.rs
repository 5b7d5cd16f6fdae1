//! Stat/lstat caching policy and symlink-follow rules (SPEC_FULL.md §4.4.d, §4.4.e).

use crate::config::{FollowPolicy, Flags};
use crate::record::{FileRecord, FileType, StatSlot};

/// The effective follow policy for an entry at `depth`: root entries consult
/// `FOLLOW_ROOTS`, everything deeper consults `FOLLOW_ALL`.
pub fn effective_follow_policy(flags: Flags, depth: u32) -> FollowPolicy {
    let follow = if depth == 0 { flags.contains(Flags::FOLLOW_ROOTS) } else { flags.contains(Flags::FOLLOW_ALL) };
    if follow {
        FollowPolicy::TryFollow
    } else {
        FollowPolicy::NoFollow
    }
}

/// Whether an entry needs a `stat`/`lstat` call before the engine can decide
/// how to proceed, per SPEC_FULL.md §4.4.d.
pub fn must_stat(flags: Flags, depth: u32, file_type: FileType, mount_boundary_uncertain: bool) -> bool {
    if flags.contains(Flags::STAT) {
        return true;
    }
    if file_type == FileType::Unknown {
        return true;
    }
    if file_type == FileType::Directory
        && flags.intersects(Flags::DETECT_CYCLES | Flags::SKIP_MOUNTS | Flags::PRUNE_MOUNTS)
    {
        return true;
    }
    if file_type == FileType::Symlink && effective_follow_policy(flags, depth) == FollowPolicy::TryFollow {
        return true;
    }
    mount_boundary_uncertain
}

/// Select the stat slot that answers `follow`: `stat` (follow-symlink) or
/// `lstat` (no-follow).
pub fn slot(record: &FileRecord, follow: FollowPolicy) -> &StatSlot {
    match follow {
        FollowPolicy::TryFollow => &record.stat,
        FollowPolicy::NoFollow => &record.lstat,
    }
}

pub fn slot_mut(record: &mut FileRecord, follow: FollowPolicy) -> &mut StatSlot {
    match follow {
        FollowPolicy::TryFollow => &mut record.stat,
        FollowPolicy::NoFollow => &mut record.lstat,
    }
}

/// Resolve the fetched stat result for `follow`, applying the TRYFOLLOW ->
/// NOFOLLOW fallback: a broken symlink under TRYFOLLOW reports the link
/// itself instead of `ENOENT`.
pub fn resolve<'a>(record: &'a FileRecord, follow: FollowPolicy) -> Option<Result<&'a crate::record::FileStat, i32>> {
    let primary = slot(record, follow).as_result()?;
    match (follow, primary) {
        (FollowPolicy::TryFollow, Err(libc::ENOENT)) => record.lstat.as_result(),
        _ => Some(primary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileStat;

    fn stat_with_mode(mode: u32) -> FileStat {
        FileStat {
            dev: 1,
            ino: 1,
            mode,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            size: 0,
            blocks: 0,
            atime: crate::record::Timestamp { seconds: 0, nanos: 0 },
            mtime: crate::record::Timestamp { seconds: 0, nanos: 0 },
            ctime: crate::record::Timestamp { seconds: 0, nanos: 0 },
        }
    }

    #[test]
    fn unknown_type_always_requires_stat() {
        assert!(must_stat(Flags::empty(), 0, FileType::Unknown, false));
    }

    #[test]
    fn plain_file_at_depth_needs_no_stat_by_default() {
        assert!(!must_stat(Flags::empty(), 3, FileType::Regular, false));
    }

    #[test]
    fn directory_needs_stat_when_detecting_cycles() {
        assert!(must_stat(Flags::DETECT_CYCLES, 2, FileType::Directory, false));
        assert!(!must_stat(Flags::empty(), 2, FileType::Directory, false));
    }

    #[test]
    fn tryfollow_falls_back_to_lstat_on_broken_symlink() {
        let mut record = FileRecord::new_root(b"link".to_vec());
        record.stat = StatSlot::Err(libc::ENOENT);
        record.lstat = StatSlot::Ok(stat_with_mode(libc::S_IFLNK));
        let resolved = resolve(&record, FollowPolicy::TryFollow).unwrap();
        assert!(resolved.is_ok());
    }
}

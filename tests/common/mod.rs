//! Shared fixture for integration tests, in the donor repo's
//! `tests/shadow_fs/common.rs` style: a `TempDir`-backed fixture plus small
//! helpers, with the tree built directly by `std::fs` rather than through the
//! engine itself.

use std::os::unix::fs::symlink as unix_symlink;
use std::path::PathBuf;

use bftw::{Flags, Strategy, Visit, VisitKind, VisitResult, WalkArgs};
use tempfile::TempDir;

pub struct Fixture {
    pub tempdir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Fixture { tempdir: TempDir::new().expect("create temp dir") }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.tempdir.path().join(name)
    }

    /// The root path to hand to `walk()`, as the raw bytes the engine expects.
    pub fn root(&self) -> Vec<u8> {
        self.tempdir.path().to_str().expect("utf8 tempdir path").as_bytes().to_vec()
    }

    pub fn write_file(&self, name: &str, data: &[u8]) {
        if let Some(parent) = self.path(name).parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(self.path(name), data).expect("write fixture file");
    }

    pub fn create_dir(&self, name: &str) {
        std::fs::create_dir_all(self.path(name)).expect("create fixture dir");
    }

    pub fn symlink(&self, target: &str, link_name: &str) {
        unix_symlink(self.path(target), self.path(link_name)).expect("create fixture symlink");
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `walk()` to completion over `fixture.root()`, recording every visited
/// path (PRE and POST both recorded, in callback order).
pub fn collect(fixture: &Fixture, flags: Flags, strategy: Strategy) -> Vec<String> {
    let mut seen = Vec::new();
    {
        let mut callback = |visit: &Visit| -> VisitResult {
            seen.push(describe(visit));
            VisitResult::Continue
        };
        bftw::walk(WalkArgs {
            roots: vec![fixture.root()],
            flags,
            strategy,
            nopenfd: 64,
            ioq_threads: 0,
            mount_table: None,
            callback: &mut callback,
        })
        .expect("walk succeeds");
    }
    seen
}

fn describe(visit: &Visit) -> String {
    String::from_utf8_lossy(visit.path).into_owned()
}

/// Run `walk()`, recording `(path, is_post)` for every visit and letting the
/// caller decide per-visit what to return via `decide`.
pub fn collect_with(
    fixture: &Fixture,
    flags: Flags,
    strategy: Strategy,
    mut decide: impl FnMut(&Visit) -> VisitResult,
) -> bftw::Result<Vec<(String, bool)>> {
    let mut seen = Vec::new();
    {
        let mut callback = |visit: &Visit| -> VisitResult {
            seen.push((describe(visit), visit.kind == VisitKind::Post));
            decide(visit)
        };
        bftw::walk(WalkArgs {
            roots: vec![fixture.root()],
            flags,
            strategy,
            nopenfd: 64,
            ioq_threads: 0,
            mount_table: None,
            callback: &mut callback,
        })?;
    }
    Ok(seen)
}

pub fn relative<'a>(fixture: &Fixture, path: &'a str) -> &'a str {
    let root = fixture.tempdir.path().to_str().expect("utf8 tempdir path");
    path.strip_prefix(root).unwrap_or(path).trim_start_matches('/')
}

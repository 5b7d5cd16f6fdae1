mod common;

use bftw::{Flags, FileType, Strategy, VisitResult, WalkArgs};
use common::Fixture;

#[test]
fn a_symlink_loop_is_reported_as_an_error_instead_of_recursing_forever() {
    let fixture = Fixture::new();
    fixture.create_dir("a");
    fixture.create_dir("a/b");
    // An absolute symlink pointing back up at an ancestor directory.
    fixture.symlink("a", "a/b/loop");

    let flags = Flags::DETECT_CYCLES | Flags::FOLLOW_ALL | Flags::RECOVER;

    let mut seen: Vec<(String, FileType, Option<i32>)> = Vec::new();
    let mut callback = |visit: &bftw::Visit| -> VisitResult {
        seen.push((String::from_utf8_lossy(visit.path).into_owned(), visit.file_type(), visit.error));
        VisitResult::Continue
    };
    bftw::walk(WalkArgs {
        roots: vec![fixture.root()],
        flags,
        strategy: Strategy::Bfs,
        nopenfd: 64,
        ioq_threads: 0,
        mount_table: None,
        callback: &mut callback,
    })
    .expect("a detected cycle is reported via RECOVER, not a failed walk");

    // The walk must terminate at all -- a missing fix here would hang instead
    // of merely producing a wrong count, but a generous bound also catches a
    // naive "descend once more before detecting" regression.
    assert!(seen.len() < 20, "cycle detection must bound the walk, saw {} visits: {seen:?}", seen.len());

    let error_visits: Vec<_> = seen.iter().filter(|(_, ty, _)| *ty == FileType::Error).collect();
    assert_eq!(error_visits.len(), 1, "exactly one ELOOP visit expected: {seen:?}");
    assert_eq!(error_visits[0].2, Some(libc::ELOOP), "the cycle's error code must be ELOOP: {seen:?}");
}

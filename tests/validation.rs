mod common;

use bftw::{Error, Flags, Strategy, VisitResult, WalkArgs};
use common::Fixture;

fn noop_walk(roots: Vec<Vec<u8>>, nopenfd: usize) -> bftw::Result<()> {
    let mut callback = |_: &bftw::Visit| VisitResult::Continue;
    bftw::walk(WalkArgs {
        roots,
        flags: Flags::empty(),
        strategy: Strategy::Bfs,
        nopenfd,
        ioq_threads: 0,
        mount_table: None,
        callback: &mut callback,
    })
}

#[test]
fn rejects_nopenfd_below_two() {
    let fixture = Fixture::new();
    let result = noop_walk(vec![fixture.root()], 1);
    assert!(matches!(result, Err(Error::Invalid(_))), "nopenfd < 2 must be rejected, got {result:?}");
}

#[test]
fn rejects_empty_roots() {
    let result = noop_walk(vec![], 64);
    assert!(matches!(result, Err(Error::Invalid(_))), "an empty root list must be rejected, got {result:?}");
}

#[test]
fn accepts_the_minimum_valid_nopenfd() {
    let fixture = Fixture::new();
    fixture.write_file("x.txt", b"x");
    let result = noop_walk(vec![fixture.root()], 2);
    assert!(result.is_ok(), "nopenfd == 2 is the documented minimum and must be accepted: {result:?}");
}

mod common;

use bftw::{Error, Flags, Strategy, VisitResult, WalkArgs};
use common::{relative, Fixture};

#[test]
fn stop_aborts_the_walk_with_an_error() {
    let fixture = Fixture::new();
    fixture.write_file("a.txt", b"a");
    fixture.write_file("b.txt", b"b");
    fixture.write_file("c.txt", b"c");

    let mut seen = Vec::new();
    let mut callback = |visit: &bftw::Visit| -> VisitResult {
        seen.push(String::from_utf8_lossy(visit.path).into_owned());
        VisitResult::Stop
    };
    let result = bftw::walk(WalkArgs {
        roots: vec![fixture.root()],
        flags: Flags::empty(),
        strategy: Strategy::Bfs,
        nopenfd: 64,
        ioq_threads: 0,
        mount_table: None,
        callback: &mut callback,
    });

    assert!(matches!(result, Err(Error::Stopped)), "Stop must surface as Error::Stopped, got {result:?}");
    assert_eq!(seen.len(), 1, "no further visits may happen once the callback returns Stop: {seen:?}");
}

#[test]
fn prune_on_a_directory_skips_its_children() {
    let fixture = Fixture::new();
    fixture.create_dir("pruned");
    fixture.write_file("pruned/hidden.txt", b"x");
    fixture.write_file("kept.txt", b"y");

    let mut seen = Vec::new();
    let mut callback = |visit: &bftw::Visit| -> VisitResult {
        let rel = relative(&fixture, &String::from_utf8_lossy(visit.path)).to_string();
        seen.push(rel.clone());
        if rel == "pruned" {
            VisitResult::Prune
        } else {
            VisitResult::Continue
        }
    };
    bftw::walk(WalkArgs {
        roots: vec![fixture.root()],
        flags: Flags::empty(),
        strategy: Strategy::Bfs,
        nopenfd: 64,
        ioq_threads: 0,
        mount_table: None,
        callback: &mut callback,
    })
    .expect("walk succeeds");

    assert!(seen.contains(&"pruned".to_string()), "the pruned directory itself must still be visited: {seen:?}");
    assert!(seen.contains(&"kept.txt".to_string()));
    assert!(
        !seen.iter().any(|p| p.starts_with("pruned/")),
        "nothing under a pruned directory may be visited: {seen:?}"
    );
}

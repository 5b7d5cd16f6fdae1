mod common;

use std::collections::HashMap;

use bftw::{Flags, Strategy};
use common::{collect, relative, Fixture};

fn deep_fixture() -> Fixture {
    let fixture = Fixture::new();
    fixture.create_dir("a/b/c");
    fixture.write_file("a/b/c/d.txt", b"leaf");
    fixture
}

fn counts(paths: &[String], fixture: &Fixture) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for p in paths {
        *counts.entry(relative(fixture, p).to_string()).or_insert(0) += 1;
    }
    counts
}

#[test]
fn iterative_deepening_reaches_every_depth_exactly_once() {
    let fixture = deep_fixture();
    let seen = collect(&fixture, Flags::empty(), Strategy::IterativeDeepening);
    let counts = counts(&seen, &fixture);

    for path in ["a", "a/b", "a/b/c", "a/b/c/d.txt"] {
        assert_eq!(counts.get(path), Some(&1), "{path:?} must be visited exactly once across all rounds: {counts:?}");
    }
}

#[test]
fn exponential_deepening_reaches_every_depth_exactly_once() {
    let fixture = deep_fixture();
    let seen = collect(&fixture, Flags::empty(), Strategy::ExponentialDeepening);
    let counts = counts(&seen, &fixture);

    for path in ["a", "a/b", "a/b/c", "a/b/c/d.txt"] {
        assert_eq!(counts.get(path), Some(&1), "{path:?} must be visited exactly once across all rounds: {counts:?}");
    }
}

#[test]
fn iterative_deepening_matches_plain_bfs_path_set() {
    let fixture = deep_fixture();
    let bfs: std::collections::HashSet<String> =
        collect(&fixture, Flags::empty(), Strategy::Bfs).iter().map(|p| relative(&fixture, p).to_string()).collect();
    let ids: std::collections::HashSet<String> = collect(&fixture, Flags::empty(), Strategy::IterativeDeepening)
        .iter()
        .map(|p| relative(&fixture, p).to_string())
        .collect();

    assert_eq!(bfs, ids, "iterative deepening must discover the same set of paths as plain BFS");
}

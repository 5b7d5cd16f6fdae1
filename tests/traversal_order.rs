mod common;

use bftw::{Flags, Strategy};
use common::{collect, relative, Fixture};

#[test]
fn bfs_visits_shallow_entries_before_deep_ones() {
    let fixture = Fixture::new();
    fixture.create_dir("a");
    fixture.create_dir("a/b");
    fixture.write_file("a/b/deep.txt", b"x");
    fixture.write_file("shallow.txt", b"y");

    let seen = collect(&fixture, Flags::empty(), Strategy::Bfs);
    let rel: Vec<&str> = seen.iter().map(|p| relative(&fixture, p)).collect();

    let deep_pos = rel.iter().position(|p| *p == "a/b/deep.txt").unwrap();
    let shallow_pos = rel.iter().position(|p| *p == "shallow.txt").unwrap();
    let ab_pos = rel.iter().position(|p| *p == "a/b").unwrap();
    assert!(shallow_pos < deep_pos, "shallow entries must be visited before deeper ones in BFS");
    assert!(ab_pos < deep_pos, "a directory's own visit precedes its children");
}

#[test]
fn sort_orders_siblings_lexicographically() {
    let fixture = Fixture::new();
    fixture.write_file("b.txt", b"b");
    fixture.write_file("a.txt", b"a");
    fixture.write_file("c.txt", b"c");

    let seen = collect(&fixture, Flags::SORT, Strategy::Bfs);
    let rel: Vec<&str> = seen.iter().map(|p| relative(&fixture, p)).filter(|p| !p.is_empty()).collect();
    assert_eq!(rel, ["a.txt", "b.txt", "c.txt"]);
}

#[test]
fn dfs_finishes_one_subtree_before_starting_the_next() {
    let fixture = Fixture::new();
    fixture.create_dir("a");
    fixture.write_file("a/one.txt", b"1");
    fixture.write_file("a/two.txt", b"2");
    fixture.create_dir("b");
    fixture.write_file("b/one.txt", b"1");
    fixture.write_file("b/two.txt", b"2");

    let seen = collect(&fixture, Flags::empty(), Strategy::Dfs);
    let rel: Vec<&str> = seen.iter().map(|p| relative(&fixture, p)).collect();

    // DFS may visit "a" or "b" first (sibling order isn't asserted here, only
    // depth-first grouping), but once a subtree starts it must finish before
    // the other one's entries appear.
    assert!(is_contiguous_block(&rel, "a/"), "entries under a/ must form one contiguous run: {rel:?}");
    assert!(is_contiguous_block(&rel, "b/"), "entries under b/ must form one contiguous run: {rel:?}");
}

fn is_contiguous_block(paths: &[&str], prefix: &str) -> bool {
    let positions: Vec<usize> =
        paths.iter().enumerate().filter(|(_, p)| p.starts_with(prefix)).map(|(i, _)| i).collect();
    match (positions.first(), positions.last()) {
        (Some(first), Some(last)) => {
            let other_prefix = if prefix == "a/" { "b/" } else { "a/" };
            !paths[*first..=*last].iter().any(|p| p.starts_with(other_prefix))
        }
        _ => false,
    }
}

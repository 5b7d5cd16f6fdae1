mod common;

use bftw::{Flags, Strategy};
use common::{collect_with, relative, Fixture};

#[test]
fn directory_post_visit_fires_after_all_its_descendants() {
    let fixture = Fixture::new();
    fixture.create_dir("a");
    fixture.create_dir("a/b");
    fixture.write_file("a/b/leaf.txt", b"x");
    fixture.write_file("a/sibling.txt", b"y");

    let seen = collect_with(&fixture, Flags::POST_ORDER, Strategy::Bfs, |_| bftw::VisitResult::Continue)
        .expect("walk succeeds");

    let index_of = |wanted: &str, post: bool| {
        seen.iter()
            .position(|(p, is_post)| relative(&fixture, p) == wanted && *is_post == post)
            .unwrap_or_else(|| panic!("no {} visit recorded for {wanted:?}: {seen:?}", if post { "POST" } else { "PRE" }))
    };

    let a_post = index_of("a", true);
    let b_post = index_of("a/b", true);
    let leaf_pre = index_of("a/b/leaf.txt", false);
    let sibling_pre = index_of("a/sibling.txt", false);

    assert!(b_post < a_post, "a/b's POST visit must precede a's POST visit");
    assert!(leaf_pre < b_post, "a/b/leaf.txt must be visited before a/b's POST visit");
    assert!(sibling_pre < a_post, "a/sibling.txt must be visited before a's POST visit");
}

#[test]
fn files_never_receive_a_post_visit() {
    let fixture = Fixture::new();
    fixture.write_file("only.txt", b"x");

    let seen = collect_with(&fixture, Flags::POST_ORDER, Strategy::Bfs, |_| bftw::VisitResult::Continue)
        .expect("walk succeeds");

    let file_visits: Vec<_> = seen.iter().filter(|(p, _)| relative(&fixture, p) == "only.txt").collect();
    assert_eq!(file_visits.len(), 1, "a plain file gets exactly one (PRE) visit: {seen:?}");
    assert!(!file_visits[0].1, "a plain file's single visit must be PRE, not POST");
}

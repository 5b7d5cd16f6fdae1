//! Iterative deepening: repeated bounded-depth passes (SPEC_FULL.md §4.5).

use std::collections::HashSet;

use crate::config::Flags;
use crate::engine::{self, QueueStyle};
use crate::error::Result;
use crate::mount::MountTable;
use crate::visitor::{Visit, VisitKind, VisitResult};

pub fn run(
    roots: &[Vec<u8>],
    flags: Flags,
    nopenfd: usize,
    ioq_threads: usize,
    mount_table: &dyn MountTable,
    callback: &mut dyn FnMut(&Visit) -> VisitResult,
) -> Result<()> {
    let mut min_depth: u32 = 0;
    let mut max_depth: u32 = 1;
    let mut pruned_paths: HashSet<Vec<u8>> = HashSet::new();

    loop {
        let mut saw_beyond_window = false;
        let mut newly_pruned: HashSet<Vec<u8>> = HashSet::new();

        {
            let mut shim = |visit: &Visit| -> VisitResult {
                if pruned_paths.contains(visit.path) {
                    return VisitResult::Prune;
                }
                if visit.depth < min_depth {
                    return VisitResult::Continue;
                }
                if visit.depth >= max_depth {
                    // Window-pruned, not user-pruned: re-evaluated fresh once
                    // the window grows past this depth next round, so it must
                    // NOT be added to `pruned_paths`.
                    saw_beyond_window = true;
                    return VisitResult::Prune;
                }
                let result = callback(visit);
                if result == VisitResult::Prune {
                    newly_pruned.insert(visit.path.to_vec());
                }
                result
            };
            engine::run_pass(
                roots,
                flags,
                QueueStyle::Lifo,
                nopenfd,
                super::make_ioq(ioq_threads),
                mount_table,
                &mut shim,
            )?;
        }

        pruned_paths.extend(newly_pruned);
        if !saw_beyond_window {
            break;
        }
        min_depth = max_depth;
        max_depth += 1;
    }

    if flags.contains(Flags::POST_ORDER) {
        run_post_phase(roots, flags, nopenfd, ioq_threads, mount_table, callback, &pruned_paths)?;
    }

    Ok(())
}

/// Re-runs the engine once with `POST_ORDER` enabled, forwarding only its
/// POST visits. This gets the same observable result as replaying the first
/// phase's depth list in reverse (every directory's POST visit, deepest
/// first) without needing to retain that list across iterations.
///
/// `pruned_paths` must still gate the PRE leg here: otherwise this replay
/// re-descends into every subtree the forward passes' callback pruned and
/// fires a spurious POST visit for each entry underneath it.
fn run_post_phase(
    roots: &[Vec<u8>],
    flags: Flags,
    nopenfd: usize,
    ioq_threads: usize,
    mount_table: &dyn MountTable,
    callback: &mut dyn FnMut(&Visit) -> VisitResult,
    pruned_paths: &HashSet<Vec<u8>>,
) -> Result<()> {
    let mut shim = |visit: &Visit| -> VisitResult {
        match visit.kind {
            VisitKind::Pre if pruned_paths.contains(visit.path) => VisitResult::Prune,
            VisitKind::Pre => VisitResult::Continue,
            VisitKind::Post => callback(visit),
        }
    };
    engine::run_pass(
        roots,
        flags | Flags::POST_ORDER,
        QueueStyle::Lifo,
        nopenfd,
        super::make_ioq(ioq_threads),
        mount_table,
        &mut shim,
    )
}

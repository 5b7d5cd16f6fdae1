//! Engine flags, strategy selection, and the serde/TOML config layer.
//!
//! The bitflags idiom and the "deserialize static defaults, then convert into
//! the runtime flag type" split mirror how the rest of the retrieval pack
//! (cberner-fuser, easy_fuser) keeps wire/config flags separate from the
//! types the engine actually runs on.

use bitflags::bitflags;
use serde::Deserialize;

bitflags! {
    /// Behavioral flags for a single [`crate::engine::Engine`] run.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// Always `stat()` every entry, even when the dirent type hint is known.
        const STAT          = 1 << 0;
        /// Visit siblings of a directory in sorted (byte-lexicographic) order.
        const SORT          = 1 << 1;
        /// Surface per-entry errors to the visitor instead of accumulating them.
        const RECOVER       = 1 << 2;
        /// Fire a POST visit for every directory in addition to the PRE visit.
        const POST_ORDER    = 1 << 3;
        /// Refuse to descend into a directory that cycles back to an ancestor.
        const DETECT_CYCLES = 1 << 4;
        /// Treat mount points as leaves: no callback invocation at all.
        const SKIP_MOUNTS   = 1 << 5;
        /// Visit mount points but do not descend into them.
        const PRUNE_MOUNTS  = 1 << 6;
        /// Buffer file records before visiting (required by SORT and plain DFS).
        const BUFFER        = 1 << 7;
        /// Synthesize whiteout entries from ENOENT + dirent type `WHT`.
        const WHITEOUTS     = 1 << 8;
        /// Follow symlinks named explicitly as roots.
        const FOLLOW_ROOTS  = 1 << 9;
        /// Follow symlinks encountered at any depth.
        const FOLLOW_ALL    = 1 << 10;
    }
}

impl Default for Flags {
    fn default() -> Self {
        Flags::empty()
    }
}

/// Traversal strategy. See SPEC_FULL.md §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Plain breadth-first search.
    Bfs,
    /// Plain depth-first search.
    Dfs,
    /// Iterative deepening: repeated bounded-depth BFS/DFS passes.
    IterativeDeepening,
    /// Exponential deepening: iterative deepening with a doubling bound.
    ExponentialDeepening,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Bfs
    }
}

/// Symlink-follow policy used when resolving a single entry's stat buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowPolicy {
    /// Follow the link; if it is broken, fall back to the link itself.
    TryFollow,
    /// Never follow; always `lstat`.
    NoFollow,
}

/// Static defaults loadable from a TOML config file.
///
/// This is the ambient "config" layer: it never parses `argv` (that belongs
/// to the external CLI collaborator), it only deserializes defaults that an
/// embedding program may want to persist.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of file descriptors the engine may hold open at once.
    pub nopenfd: usize,
    /// Number of ioq worker threads (0 selects the inline, synchronous backend).
    pub ioq_threads: usize,
    /// Traversal strategy.
    pub strategy: Strategy,
    /// Visit siblings in sorted order.
    pub sort: bool,
    /// Follow symlinks supplied as root paths.
    pub follow_roots: bool,
    /// Follow symlinks encountered below the roots.
    pub follow_all: bool,
    /// Refuse to descend into directories that cycle back to an ancestor.
    pub detect_cycles: bool,
    /// Skip mount points entirely.
    pub skip_mounts: bool,
    /// Visit but do not descend into mount points.
    pub prune_mounts: bool,
    /// Fire POST visits in addition to PRE visits.
    pub post_order: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            nopenfd: default_nopenfd(),
            ioq_threads: 2,
            strategy: Strategy::default(),
            sort: false,
            follow_roots: false,
            follow_all: false,
            detect_cycles: true,
            skip_mounts: false,
            prune_mounts: false,
            post_order: false,
        }
    }
}

impl EngineConfig {
    /// Parse an `EngineConfig` from TOML text, falling back to defaults for
    /// any field the document omits.
    pub fn from_toml(text: &str) -> crate::error::Result<Self> {
        toml::from_str(text).map_err(|err| crate::error::Error::Invalid(err.message_leak()))
    }

    /// Convert the static config into the runtime [`Flags`] bitset.
    pub fn into_flags(&self) -> Flags {
        let mut flags = Flags::empty();
        flags.set(Flags::SORT, self.sort);
        flags.set(Flags::FOLLOW_ROOTS, self.follow_roots);
        flags.set(Flags::FOLLOW_ALL, self.follow_all);
        flags.set(Flags::DETECT_CYCLES, self.detect_cycles);
        flags.set(Flags::SKIP_MOUNTS, self.skip_mounts);
        flags.set(Flags::PRUNE_MOUNTS, self.prune_mounts);
        flags.set(Flags::POST_ORDER, self.post_order);
        if matches!(self.strategy, Strategy::Dfs) || self.sort {
            flags.insert(Flags::BUFFER);
        }
        flags
    }
}

fn default_nopenfd() -> usize {
    // A conservative default independent of the process's actual rlimit;
    // `WalkArgs::nopenfd` can be raised to match `getrlimit(RLIMIT_NOFILE)`.
    256
}

/// Small helper trait used above to turn a `toml::de::Error` into a
/// `'static` message without keeping the original error alive.
trait LeakMessage {
    fn message_leak(&self) -> &'static str;
}

impl LeakMessage for toml::de::Error {
    fn message_leak(&self) -> &'static str {
        "malformed engine config TOML"
    }
}

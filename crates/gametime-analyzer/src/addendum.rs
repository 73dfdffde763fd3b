//! Per-block assignment counters (path-local SSA renaming)
//!
//! Each block's addendum maps an *original* variable name — the substring
//! before any `<k>` version tag — to the number of assignments observed on
//! the path up to and including that block. The counters live in one
//! path-level table keyed by `(block, name)` and are projected per block;
//! an assignment bumps the counter in its own block and every later block,
//! so downstream uses pick up the new version.

use gametime_ir::BlockId;
use rustc_hash::FxHashMap;

/// The assignment counters of every block on one path.
#[derive(Debug)]
pub struct PathAddenda {
    order: Vec<BlockId>,
    pos: FxHashMap<BlockId, usize>,
    counts: FxHashMap<(BlockId, String), u32>,
}

impl PathAddenda {
    pub fn new(blocks: &[BlockId]) -> Self {
        let pos = blocks.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        Self {
            order: blocks.to_vec(),
            pos,
            counts: FxHashMap::default(),
        }
    }

    /// Position of a block on the path, if it is on the path.
    pub fn position(&self, block: BlockId) -> Option<usize> {
        self.pos.get(&block).copied()
    }

    /// Assignments to `name` observed up to and including `block`.
    pub fn version(&self, block: BlockId, name: &str) -> u32 {
        self.counts
            .get(&(block, original_name(name).to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Render `name` at its version in `block`: `name` for version 0,
    /// `name<k>` for k ≥ 1.
    pub fn render(&self, block: BlockId, name: &str) -> String {
        versioned(original_name(name), self.version(block, name))
    }

    /// Record one assignment to `name` in `block`: the counter is bumped in
    /// `block` and in every later block on the path.
    pub fn bump(&mut self, block: BlockId, name: &str) {
        let original = original_name(name).to_string();
        let from = match self.position(block) {
            Some(i) => i,
            None => return,
        };
        for &b in &self.order[from..] {
            *self.counts.entry((b, original.clone())).or_insert(0) += 1;
        }
    }
}

/// The substring of a variable name before its `<k>` version tag.
pub fn original_name(name: &str) -> &str {
    match name.find('<') {
        Some(i) => &name[..i],
        None => name,
    }
}

/// `name` for version 0, `name<k>` otherwise.
pub fn versioned(name: &str, version: u32) -> String {
    if version == 0 {
        name.to_string()
    } else {
        format!("{name}<{version}>")
    }
}

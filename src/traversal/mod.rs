// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Contracts between the selective writer and its collaborators: the link
//! system that resolves CIDs to block bytes, and the selector engine that
//! decides which links of a DAG to walk.
//!
//! The engine drives; the visitor loads. For every link the engine wants
//! to enter it calls [`LinkVisitor::visit_link`] with the path the link
//! appears at, starting with the root at the empty path. The visitor
//! answers with the block bytes to decode and descend into, or prunes the
//! subtree, or halts the walk. Engines must visit links of one node in a
//! deterministic order for selective output to be reproducible.

mod path;
mod path_tree;
pub(crate) mod resume;

pub use path::{Path, PathSegment};
pub(crate) use path_tree::PathTree;

use crate::error::Result;
use cid::Cid;

/// Resolves links to the block bytes they address.
pub trait LinkSystem {
    fn load_link(&mut self, link: &Cid) -> Result<Vec<u8>>;
}

/// Plain closures make fine link systems, `|cid| store.read(cid)`.
impl<F> LinkSystem for F
where
    F: FnMut(&Cid) -> Result<Vec<u8>>,
{
    fn load_link(&mut self, link: &Cid) -> Result<Vec<u8>> {
        self(link)
    }
}

/// The visitor's answer to one link visit.
pub enum LinkVisit {
    /// Decode these bytes and keep walking beneath the link.
    Continue(Vec<u8>),
    /// Do not descend into this link.
    SkipSubtree,
    /// Halt the walk; not an error.
    Stop,
}

/// Receives link visits during a walk.
pub trait LinkVisitor {
    fn visit_link(&mut self, path: &Path, link: &Cid) -> Result<LinkVisit>;
}

/// A selector engine: walks the DAG under `root`, announcing every link
/// it wants to enter and honoring the visitor's verdicts.
pub trait SelectorWalk {
    fn walk(&mut self, root: &Cid, visitor: &mut dyn LinkVisitor) -> Result<()>;
}

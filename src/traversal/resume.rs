// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The resuming link facade behind the selective writer.
//!
//! As a walk runs forward, every loaded link is recorded in the shared
//! [`PathTree`] together with the payload offset its frame begins at, and
//! a counter tracks the offset as if every frame were emitted. A rewound
//! walk re-runs the same traversal in replay mode: subtrees the tree
//! proves to end before the resume point are pruned wholesale (their
//! links marked seen, the counter jumped past them), everything else is
//! descended with its bytes flowing to the sink, which trims the prefix
//! that precedes the resume point. Once the target path or offset is
//! reached the walk downgrades to plain forward emission.

use super::{LinkSystem, LinkVisit, LinkVisitor, Path, PathTree};
use crate::error::{Error, Result};
use crate::options::Options;
use crate::varint_frame::frame_encoded_len;
use cid::Cid;
use tracing::trace;

/// Where a rewound pass re-enters normal emission.
#[derive(Debug, Clone, Default)]
pub(crate) enum Replay {
    /// Plain forward pass.
    #[default]
    None,
    /// Resume once the payload counter reaches this offset.
    Offset(u64),
    /// Resume at the load whose path equals this one exactly.
    Path(Path),
}

/// Consumes the frames a traversal produces.
pub(crate) trait BlockSink {
    /// One block frame, beginning at `frame_start` of the full payload.
    fn write_block(&mut self, cid: &Cid, data: &[u8], frame_start: u64) -> Result<()>;

    /// Frames accounted without flowing through the sink (pruned
    /// subtrees during replay).
    fn note_skipped(&mut self, _bytes: u64) {}
}

/// Sizing pass: frames are counted by the visitor, nothing is kept.
pub(crate) struct CountingSink;

impl BlockSink for CountingSink {
    fn write_block(&mut self, _cid: &Cid, _data: &[u8], _frame_start: u64) -> Result<()> {
        Ok(())
    }
}

/// The facade a selector engine drives on behalf of the selective writer.
pub(crate) struct ResumingVisitor<'a, L, S> {
    pub base: &'a mut L,
    pub sink: &'a mut S,
    pub tree: &'a mut PathTree,
    pub seen: ahash::HashSet<Cid>,
    /// Payload offset after everything accounted so far; starts at the
    /// header frame length.
    pub counter: u64,
    /// Counter position when the previous pass stopped; the fallback
    /// when the tree cannot place a path.
    pub pending_block_start: u64,
    pub replay: Replay,
    pub links_visited: u64,
    pub options: &'a Options,
}

impl<L: LinkSystem, S: BlockSink> ResumingVisitor<'_, L, S> {
    /// Loads, records, optionally emits, and accounts one link.
    fn forward(&mut self, path: &Path, link: &Cid, emit: bool) -> Result<LinkVisit> {
        self.tree.add_path(path.segments(), *link, self.counter);
        let data = self.base.load_link(link)?;
        if emit {
            self.sink.write_block(link, &data, self.counter)?;
        }
        self.seen.insert(*link);
        self.counter += frame_encoded_len(link.encoded_len() as u64 + data.len() as u64);
        Ok(LinkVisit::Continue(data))
    }

    fn visit_offset_replay(&mut self, path: &Path, link: &Cid, target: u64) -> Result<LinkVisit> {
        if self.counter >= target {
            trace!(counter = self.counter, "reached resume offset");
            self.replay = Replay::None;
            return self.forward(path, link, true);
        }
        if let Some(end) = self.tree.offset_after(path.segments()) {
            if end <= target {
                // the whole subtree precedes the resume point
                for known in self.tree.links_under(path.segments()) {
                    self.seen.insert(known);
                }
                self.sink.note_skipped(end - self.counter);
                self.counter = end;
                return Ok(LinkVisit::SkipSubtree);
            }
        }
        // the subtree reaches past the resume point (or is unknown):
        // descend, letting the sink trim the leading bytes
        self.forward(path, link, true)
    }

    fn visit_path_replay(&mut self, path: &Path, link: &Cid, target: &Path) -> Result<LinkVisit> {
        if path == target {
            trace!(%path, "reached resume path");
            self.replay = Replay::None;
            return self.forward(path, link, true);
        }
        if let Some(depth) = path.divergence_from(target) {
            // a branch aside of the target: everything under it was
            // produced before the resume point
            let prefix = &path.segments()[..=depth];
            for known in self.tree.links_under(prefix) {
                self.seen.insert(known);
            }
            self.counter = self
                .tree
                .offset_after(prefix)
                .unwrap_or(self.pending_block_start);
            return Ok(LinkVisit::SkipSubtree);
        }
        // an ancestor of the target: descend without emitting
        self.forward(path, link, false)
    }
}

impl<L: LinkSystem, S: BlockSink> LinkVisitor for ResumingVisitor<'_, L, S> {
    fn visit_link(&mut self, path: &Path, link: &Cid) -> Result<LinkVisit> {
        self.options.check_cancelled()?;
        // each link is walked and written at most once per pass, whatever
        // the selector would do
        if self.seen.contains(link) {
            return Ok(LinkVisit::SkipSubtree);
        }
        self.links_visited += 1;
        if self.links_visited > self.options.max_traversal_links {
            return Err(Error::LinkBudgetExceeded {
                limit: self.options.max_traversal_links,
            });
        }
        match self.replay.clone() {
            Replay::None => self.forward(path, link, true),
            Replay::Offset(target) => self.visit_offset_replay(path, link, target),
            Replay::Path(target) => self.visit_path_replay(path, link, &target),
        }
    }
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::PathSegment;
use cid::Cid;

/// Records, for every path a traversal has loaded a link at, the link and
/// the payload offset its frame begins at.
///
/// The tree grows append-only during forward traversal and is shared
/// across rewinds of the same walk, which is what lets a rewind answer
/// "which links live under this path" and "where does the output continue
/// after everything under this path" without re-reading blocks.
///
/// Nodes live in an arena and refer to children by index; paths never
/// point back up.
#[derive(Debug)]
pub(crate) struct PathTree {
    nodes: Vec<PathNode>,
}

#[derive(Debug)]
struct PathNode {
    link: Option<Cid>,
    offset: u64,
    children: Vec<(PathSegment, usize)>,
}

impl PathNode {
    fn child(&self, segment: &PathSegment) -> Option<usize> {
        self.children
            .iter()
            .find(|(s, _)| s == segment)
            .map(|(_, ix)| *ix)
    }
}

const ROOT: usize = 0;

impl PathTree {
    pub fn new() -> Self {
        PathTree {
            nodes: vec![PathNode {
                link: None,
                offset: 0,
                children: vec![],
            }],
        }
    }

    /// Records `link` at `path`, first seen when the output stood at
    /// `at_offset`. Ancestors missing from the tree are filled in with the
    /// same link and offset; paths already present keep their first
    /// recording.
    pub fn add_path(&mut self, path: &[PathSegment], link: Cid, at_offset: u64) {
        if path.is_empty() {
            self.nodes[ROOT].link = Some(link);
            self.nodes[ROOT].offset = at_offset;
            return;
        }
        let mut at = ROOT;
        for segment in path {
            at = match self.nodes[at].child(segment) {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(PathNode {
                        link: Some(link),
                        offset: at_offset,
                        children: vec![],
                    });
                    self.nodes[at].children.push((segment.clone(), child));
                    child
                }
            };
        }
    }

    /// All links recorded at or under `path`.
    pub fn links_under(&self, path: &[PathSegment]) -> Vec<Cid> {
        let mut at = ROOT;
        for segment in path {
            match self.nodes[at].child(segment) {
                Some(child) => at = child,
                None => return vec![],
            }
        }
        if path.is_empty() {
            // the root node stands for the whole walk; just its own link
            return self.nodes[ROOT].link.into_iter().collect();
        }
        let mut links = vec![];
        self.collect_links(at, &mut links);
        links
    }

    fn collect_links(&self, node: usize, into: &mut Vec<Cid>) {
        if let Some(link) = self.nodes[node].link {
            into.push(link);
        }
        for (_, child) in &self.nodes[node].children {
            self.collect_links(*child, into);
        }
    }

    /// The output offset immediately after everything under `path`: the
    /// recorded offset of the next sibling subtree, walking up towards the
    /// root when a level has none. `None` when the path is unknown or
    /// nothing follows it.
    pub fn offset_after(&self, path: &[PathSegment]) -> Option<u64> {
        self.offset_after_at(ROOT, path)
    }

    fn offset_after_at(&self, node: usize, path: &[PathSegment]) -> Option<u64> {
        let first = path.first()?;
        let child = self.nodes[node].child(first)?;
        let closest = self.nodes[child].offset;
        if path.len() > 1 {
            if let Some(offset) = self.offset_after_at(child, &path[1..]) {
                return Some(offset);
            }
        }
        // next sibling by recorded offset
        self.nodes[node]
            .children
            .iter()
            .map(|(_, ix)| self.nodes[*ix].offset)
            .filter(|offset| *offset > closest)
            .min()
    }
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Shared fixtures: block builders, an in-memory link system, and a
//! stand-in selector engine that walks every link of a DAG-CBOR DAG
//! depth-first.

use carfile::multihash::prelude::*;
use carfile::traversal::{LinkSystem, LinkVisit, LinkVisitor, Path, PathSegment, SelectorWalk};
use carfile::{Block, Cid, Error, Result};
use ipld_core::ipld::Ipld;

pub const RAW: u64 = 0x55;
pub const DAG_CBOR: u64 = 0x71;

pub fn raw_block(data: &[u8]) -> Block {
    Block {
        cid: Cid::new_v1(RAW, MultihashCode::Blake2b256.digest(data)),
        data: data.to_vec(),
    }
}

/// A bag of blocks addressable by CID, usable as a link system.
#[derive(Default, Clone)]
pub struct MemoryDag {
    pub blocks: ahash::HashMap<Cid, Vec<u8>>,
}

impl MemoryDag {
    /// Adds a raw leaf and returns its CID.
    pub fn leaf(&mut self, data: &[u8]) -> Cid {
        let block = raw_block(data);
        let cid = block.cid;
        self.blocks.insert(cid, block.data);
        cid
    }

    /// Adds a DAG-CBOR node and returns its CID.
    pub fn node(&mut self, ipld: Ipld) -> Cid {
        let data = serde_ipld_dagcbor::to_vec(&ipld).expect("fixture encodes");
        let cid = Cid::new_v1(DAG_CBOR, MultihashCode::Blake2b256.digest(&data));
        self.blocks.insert(cid, data);
        cid
    }

    pub fn link_system(&self) -> impl LinkSystem + '_ {
        |cid: &Cid| self.blocks.get(cid).cloned().ok_or(Error::NotFound)
    }
}

/// Walks everything: a full-traversal engine over DAG-CBOR nodes,
/// descending links depth-first in deterministic node order.
pub struct WalkAll;

impl SelectorWalk for WalkAll {
    fn walk(&mut self, root: &Cid, visitor: &mut dyn LinkVisitor) -> Result<()> {
        let mut stopped = false;
        visit(&Path::default(), root, visitor, &mut stopped)
    }
}

fn visit(
    path: &Path,
    link: &Cid,
    visitor: &mut dyn LinkVisitor,
    stopped: &mut bool,
) -> Result<()> {
    if *stopped {
        return Ok(());
    }
    match visitor.visit_link(path, link)? {
        LinkVisit::Continue(bytes) => {
            if link.codec() != DAG_CBOR {
                return Ok(());
            }
            let node: Ipld = serde_ipld_dagcbor::from_slice(&bytes)
                .map_err(|e| Error::MalformedSection(e.to_string()))?;
            let mut links = vec![];
            collect_links(&node, &mut vec![], &mut links);
            for (segments, child) in links {
                let mut child_path = path.clone();
                for segment in segments {
                    child_path.push(segment);
                }
                visit(&child_path, &child, visitor, stopped)?;
                if *stopped {
                    break;
                }
            }
            Ok(())
        }
        LinkVisit::SkipSubtree => Ok(()),
        LinkVisit::Stop => {
            *stopped = true;
            Ok(())
        }
    }
}

fn collect_links(node: &Ipld, at: &mut Vec<PathSegment>, into: &mut Vec<(Vec<PathSegment>, Cid)>) {
    match node {
        Ipld::Map(map) => {
            for (key, value) in map {
                at.push(PathSegment::from(key.as_str()));
                collect_links(value, at, into);
                at.pop();
            }
        }
        Ipld::List(list) => {
            for (i, value) in list.iter().enumerate() {
                at.push(PathSegment::from(i));
                collect_links(value, at, into);
                at.pop();
            }
        }
        Ipld::Link(cid) => into.push((at.clone(), *cid)),
        _ => {}
    }
}

/// A three-level fixture DAG:
///
/// ```text
/// root ─┬─ "left"  ─┬─ 0: leaf a
///       │           └─ 1: leaf b
///       ├─ "mid"   ──── leaf c
///       └─ "right" ─┬─ 0: leaf b   (shared with left/1)
///                   └─ 1: leaf d
/// ```
pub fn sample_dag() -> (MemoryDag, Cid) {
    let mut dag = MemoryDag::default();
    let a = dag.leaf(b"leaf a, with some padding to give it heft");
    let b = dag.leaf(b"leaf b");
    let c = dag.leaf(b"leaf c, middle of the road");
    let d = dag.leaf(b"leaf d, the last one");

    let left = dag.node(Ipld::List(vec![Ipld::Link(a), Ipld::Link(b)]));
    let right = dag.node(Ipld::List(vec![Ipld::Link(b), Ipld::Link(d)]));
    let root = dag.node(Ipld::Map(
        [
            ("left".to_string(), Ipld::Link(left)),
            ("mid".to_string(), Ipld::Link(c)),
            ("right".to_string(), Ipld::Link(right)),
        ]
        .into_iter()
        .collect(),
    ));
    (dag, root)
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod common;

use carfile::{
    BlockReader, Error, IndexCodec, Options, ResumePoint, SelectiveWriter, V2Header,
};
use common::{sample_dag, MemoryDag, WalkAll};
use ipld_core::ipld::Ipld;
use pretty_assertions::assert_eq;
use std::io::Cursor;

#[test]
fn two_runs_are_byte_identical() {
    let (dag, root) = sample_dag();
    let mut writer =
        SelectiveWriter::new(dag.link_system(), WalkAll, root, Options::default()).unwrap();

    let mut first = vec![];
    writer.write_to(&mut first).unwrap();
    let mut second = vec![];
    writer.write_to(&mut second).unwrap();
    assert_eq!(first, second);
}

#[test]
fn output_is_a_valid_archive_in_visit_order() {
    let (dag, root) = sample_dag();
    let mut writer =
        SelectiveWriter::new(dag.link_system(), WalkAll, root, Options::default()).unwrap();
    let mut out = vec![];
    let written = writer.write_to(&mut out).unwrap();
    assert_eq!(written, out.len() as u64);

    let header = V2Header::from_le_bytes(out[11..51].try_into().unwrap()).unwrap();
    assert_eq!(header.data_size, writer.data_size());

    let mut reader = BlockReader::new(Cursor::new(&out), Options::default()).unwrap();
    assert_eq!(reader.roots(), &[root]);
    let mut order = vec![];
    while let Some(block) = reader.next().unwrap() {
        assert_eq!(dag.blocks.get(&block.cid), Some(&block.data));
        order.push(block.cid);
    }
    // depth-first, first-seen order: every reachable block exactly once,
    // root first
    assert_eq!(order.len(), dag.blocks.len());
    assert_eq!(order[0], root);
    let mut unique = order.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), order.len());
}

#[test]
fn preflight_size_matches_written_size() {
    let (dag, root) = sample_dag();
    let mut writer =
        SelectiveWriter::new(dag.link_system(), WalkAll, root, Options::default()).unwrap();
    let sized = writer.data_size();

    let mut payload = vec![];
    let written = writer.write_v1(ResumePoint::Start, &mut payload).unwrap();
    assert_eq!(written, sized);
    assert_eq!(payload.len() as u64, sized);

    // a declared size is trusted and enforced
    let mut declared = SelectiveWriter::new(
        dag.link_system(),
        WalkAll,
        root,
        Options::default().with_data_payload_size(sized),
    )
    .unwrap();
    let mut out = vec![];
    declared.write_v1(ResumePoint::Start, &mut out).unwrap();
    assert_eq!(out, payload);

    let mut wrong = SelectiveWriter::new(
        dag.link_system(),
        WalkAll,
        root,
        Options::default().with_data_payload_size(sized + 1),
    )
    .unwrap();
    assert!(matches!(
        wrong.write_v1(ResumePoint::Start, &mut vec![]),
        Err(Error::SizeMismatch { .. })
    ));
}

#[test]
fn resume_from_every_byte_offset() {
    let (dag, root) = sample_dag();
    let mut writer =
        SelectiveWriter::new(dag.link_system(), WalkAll, root, Options::default()).unwrap();
    let mut full = vec![];
    writer.write_v1(ResumePoint::Start, &mut full).unwrap();

    for k in 0..=full.len() {
        let mut suffix = vec![];
        let written = writer
            .write_v1(ResumePoint::Offset(k as u64), &mut suffix)
            .unwrap();
        assert_eq!(written, suffix.len() as u64);
        assert_eq!(suffix, full[k..], "resume at byte {k}");
    }
}

#[test]
fn resume_with_a_fresh_writer_matches() {
    let (dag, root) = sample_dag();
    let mut full = vec![];
    SelectiveWriter::new(dag.link_system(), WalkAll, root, Options::default())
        .unwrap()
        .write_v1(ResumePoint::Start, &mut full)
        .unwrap();

    for k in [0, 1, full.len() / 2, full.len() - 1, full.len()] {
        let mut writer =
            SelectiveWriter::new(dag.link_system(), WalkAll, root, Options::default()).unwrap();
        let mut suffix = vec![];
        writer
            .write_v1(ResumePoint::Offset(k as u64), &mut suffix)
            .unwrap();
        assert_eq!(suffix, full[k..], "fresh resume at byte {k}");
    }
}

#[test]
fn resume_by_path_starts_at_that_block() {
    let (dag, root) = sample_dag();
    let mut writer =
        SelectiveWriter::new(dag.link_system(), WalkAll, root, Options::default()).unwrap();
    let mut full = vec![];
    writer.write_v1(ResumePoint::Start, &mut full).unwrap();

    // locate the frame of the block under "mid" in the full payload
    let mut reader = BlockReader::new(Cursor::new(&full), Options::default()).unwrap();
    let mid_cid = {
        let node: Ipld = serde_ipld_dagcbor::from_slice(dag.blocks.get(&root).unwrap()).unwrap();
        match &node {
            Ipld::Map(map) => match map.get("mid") {
                Some(Ipld::Link(cid)) => *cid,
                _ => panic!("fixture has a mid link"),
            },
            _ => panic!("fixture root is a map"),
        }
    };
    let mid_offset = loop {
        let section = reader.skip_next().unwrap().expect("mid is in the payload");
        if section.cid == mid_cid {
            break section.payload_offset;
        }
    };

    let mut tail = vec![];
    writer
        .write_v1(ResumePoint::Path("mid".into()), &mut tail)
        .unwrap();
    assert_eq!(tail, full[mid_offset as usize..]);
}

#[test]
fn shared_links_are_written_once() {
    let (dag, root) = sample_dag();
    let mut writer =
        SelectiveWriter::new(dag.link_system(), WalkAll, root, Options::default()).unwrap();
    let mut out = vec![];
    writer.write_to(&mut out).unwrap();

    let mut reader = BlockReader::new(Cursor::new(&out), Options::default()).unwrap();
    let mut seen = vec![];
    while let Some(block) = reader.next().unwrap() {
        assert!(!seen.contains(&block.cid), "duplicate {}", block.cid);
        seen.push(block.cid);
    }
}

#[test]
fn selective_index_resolves_every_block() {
    let (dag, root) = sample_dag();
    let mut writer = SelectiveWriter::new(
        dag.link_system(),
        WalkAll,
        root,
        Options::default().with_index_codec(IndexCodec::MultihashSorted),
    )
    .unwrap();
    let mut out = vec![];
    writer.write_to(&mut out).unwrap();

    let read = carfile::blockstore::ReadOnly::new(out, Options::default()).unwrap();
    use carfile::blockstore::Blockstore as _;
    for (cid, data) in &dag.blocks {
        assert_eq!(read.get(cid).unwrap(), Some(data.clone()));
    }
}

#[test]
fn link_budget_is_enforced() {
    let (dag, root) = sample_dag();
    let result = SelectiveWriter::new(
        dag.link_system(),
        WalkAll,
        root,
        Options::default().with_max_traversal_links(2),
    );
    assert!(matches!(
        result,
        Err(Error::LinkBudgetExceeded { limit: 2 })
    ));
}

#[test]
fn changing_content_between_passes_is_a_size_mismatch() {
    let mut dag = MemoryDag::default();
    let leaf = dag.leaf(b"mutable");
    let root = dag.node(Ipld::List(vec![Ipld::Link(leaf)]));

    // a link system that grows the leaf after the sizing pass
    let mut calls = 0u32;
    let shifty = |cid: &carfile::Cid| {
        let mut data = dag.blocks.get(cid).cloned().ok_or(Error::NotFound)?;
        if *cid == leaf {
            calls += 1;
            if calls > 1 {
                data.extend_from_slice(b", but longer now");
            }
        }
        Ok(data)
    };

    let mut writer = SelectiveWriter::new(shifty, WalkAll, root, Options::default()).unwrap();
    assert!(matches!(
        writer.write_v1(ResumePoint::Start, &mut vec![]),
        Err(Error::SizeMismatch { .. })
    ));
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod common;

use carfile::blockstore::{Blockstore as _, WriteOnly};
use carfile::{
    wrap_v1, BlockReader, Error, IndexCodec, Options, Reader, SeekSource, V2Header, PRAGMA,
};
use common::raw_block;
use pretty_assertions::assert_eq;
use std::io::Cursor;

fn v1_fixture(payloads: &[&[u8]]) -> (Vec<carfile::Block>, Vec<u8>) {
    let blocks: Vec<_> = payloads.iter().map(|p| raw_block(p)).collect();
    let writer = WriteOnly::new(vec![], &[blocks[0].cid], Options::default()).unwrap();
    for b in &blocks {
        writer.put_keyed(&b.cid, &b.data).unwrap();
    }
    (blocks, writer.into_inner().unwrap())
}

#[test]
fn minimal_v1_yields_one_block_then_eof() {
    let (blocks, bytes) = v1_fixture(&[b"the one and only block"]);
    let mut reader = BlockReader::new(Cursor::new(&bytes), Options::default()).unwrap();
    assert_eq!(reader.version(), 1);
    assert_eq!(reader.roots(), &[blocks[0].cid]);
    assert_eq!(reader.next().unwrap().unwrap(), blocks[0]);
    assert!(reader.next().unwrap().is_none());
    assert!(reader.next().unwrap().is_none());
}

#[test]
fn v2_wrap_of_v1_is_prefix_plus_payload_plus_index() {
    let (blocks, v1) = v1_fixture(&[b"wrapped block"]);
    let mut wrapped = vec![];
    wrap_v1(Cursor::new(&v1), &mut wrapped, &Options::default()).unwrap();

    // fixed prefix
    assert_eq!(&wrapped[..11], &PRAGMA);
    let header = V2Header::from_le_bytes(wrapped[11..51].try_into().unwrap()).unwrap();
    assert_eq!(header.data_offset, 51);
    assert_eq!(header.data_size, v1.len() as u64);
    assert_eq!(header.index_offset, 51 + v1.len() as u64);
    // payload verbatim
    assert_eq!(&wrapped[51..51 + v1.len()], &v1);

    // the wrapped file iterates identically to the bare payload
    let mut reader = BlockReader::new(Cursor::new(&wrapped), Options::default()).unwrap();
    assert_eq!(reader.version(), 2);
    assert_eq!(reader.roots(), &[blocks[0].cid]);
    assert_eq!(reader.next().unwrap().unwrap(), blocks[0]);
    assert!(reader.next().unwrap().is_none());

    // and serves random access through its index
    let read = carfile::blockstore::ReadOnly::new(wrapped, Options::default()).unwrap();
    assert_eq!(
        read.get(&blocks[0].cid).unwrap(),
        Some(blocks[0].data.clone())
    );
}

#[test]
fn corrupted_wrapped_payload_fails_untrusted_reads() {
    let (blocks, v1) = v1_fixture(&[b"pristine bytes"]);
    let mut wrapped = vec![];
    wrap_v1(Cursor::new(&v1), &mut wrapped, &Options::default()).unwrap();
    // flip one bit inside the block data, within the v1 region
    let last_payload_byte = 51 + v1.len() - 1;
    wrapped[last_payload_byte] ^= 1;

    let mut untrusted = BlockReader::new(Cursor::new(&wrapped), Options::default()).unwrap();
    assert!(matches!(
        untrusted.next(),
        Err(Error::IntegrityMismatch { .. })
    ));

    let mut trusted =
        BlockReader::new(Cursor::new(&wrapped), Options::default().with_trusted(true)).unwrap();
    let block = trusted.next().unwrap().unwrap();
    assert_eq!(block.cid, blocks[0].cid);
    assert_ne!(block.data, blocks[0].data);

    // the read-only store behaves the same way
    let strict = carfile::blockstore::ReadOnly::new(wrapped.clone(), Options::default()).unwrap();
    assert!(matches!(
        strict.get(&blocks[0].cid),
        Err(Error::IntegrityMismatch { .. })
    ));
    let lenient =
        carfile::blockstore::ReadOnly::new(wrapped, Options::default().with_trusted(true))
            .unwrap();
    assert!(lenient.get(&blocks[0].cid).unwrap().is_some());
}

#[test]
fn oversize_header_is_rejected_at_open() {
    use integer_encoding::VarInt;
    // header frame declaring 1 GiB
    let bytes = (1u64 << 30).encode_var_vec();
    let err = BlockReader::new(Cursor::new(&bytes), Options::default()).unwrap_err();
    assert!(matches!(err, Error::HeaderTooLarge { got, .. } if got == 1 << 30));
}

#[test]
fn oversize_section_is_rejected_before_buffering() {
    use integer_encoding::VarInt;
    let (_, mut bytes) = v1_fixture(&[b"small"]);
    // append a section declaring far more than the limit allows
    bytes.extend_from_slice(&(100u64 << 20).encode_var_vec());

    let mut reader = BlockReader::new(
        Cursor::new(&bytes),
        Options::default().with_max_allowed_section_size(1 << 20),
    )
    .unwrap();
    assert!(reader.next().unwrap().is_some());
    assert!(matches!(
        reader.next(),
        Err(Error::SectionTooLarge { got, max }) if got == 100 << 20 && max == 1 << 20
    ));
}

#[test]
fn inspect_reports_counts_sizes_and_index() {
    let (blocks, v1) = v1_fixture(&[b"abc", b"defghij", b"klmno"]);
    let mut wrapped = vec![];
    wrap_v1(Cursor::new(&v1), &mut wrapped, &Options::default()).unwrap();

    for validate in [false, true] {
        let reader = Reader::new(wrapped.clone(), Options::default()).unwrap();
        let stats = reader.inspect(validate).unwrap();
        assert_eq!(stats.version, 2);
        assert_eq!(stats.block_count, 3);
        assert!(stats.roots_present);
        assert_eq!(stats.roots, vec![blocks[0].cid]);
        assert_eq!(stats.min_block_length, 3);
        assert_eq!(stats.max_block_length, 7);
        assert_eq!(stats.avg_block_length, 5);
        assert_eq!(stats.codec_counts.get(&common::RAW), Some(&3));
        assert_eq!(stats.index_codec, Some(0x0401));
    }
}

#[test]
fn inspect_catches_corruption_only_when_validating() {
    let (_, v1) = v1_fixture(&[b"to be corrupted"]);
    let mut wrapped = vec![];
    wrap_v1(Cursor::new(&v1), &mut wrapped, &Options::default()).unwrap();
    let last_payload_byte = 51 + v1.len() - 1;
    wrapped[last_payload_byte] ^= 1;

    let reader = Reader::new(wrapped, Options::default()).unwrap();
    assert!(reader.inspect(false).is_ok());
    assert!(matches!(
        reader.inspect(true),
        Err(Error::IntegrityMismatch { .. })
    ));
}

#[test]
fn generate_index_finds_every_block() {
    let (blocks, bytes) = v1_fixture(&[b"x", b"yy", b"zzz"]);
    let index = carfile::index::generate_index(
        SeekSource(Cursor::new(&bytes)),
        &Options::default().with_index_codec(IndexCodec::Sorted),
    )
    .unwrap();
    assert_eq!(index.len(), 3);
    for b in &blocks {
        let offset = index.get_first(&b.cid).unwrap();
        // the recorded offset points at a section start inside the payload
        let (cid, data) = read_section_at(&bytes, offset as usize);
        assert_eq!(cid, b.cid);
        assert_eq!(data, b.data);
    }
}

fn read_section_at(bytes: &[u8], offset: usize) -> (carfile::Cid, Vec<u8>) {
    use integer_encoding::VarIntReader;
    let mut cursor = Cursor::new(&bytes[offset..]);
    let len: u64 = cursor.read_varint().unwrap();
    let start = cursor.position() as usize;
    let body = &cursor.get_ref()[start..start + len as usize];
    let cid = carfile::Cid::read_bytes(&mut Cursor::new(body)).unwrap();
    let cid_len = cid.encoded_len();
    (cid, body[cid_len..].to_vec())
}

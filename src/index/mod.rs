// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Random-access indexes mapping multihashes to byte offsets inside a v1
//! payload.
//!
//! Two formats exist, both self-described by a leading multicodec varint:
//! a width-grouped sorted table keyed by full multihash bytes, and an
//! algorithm-grouped variant keyed by bare digests. Offsets point at the
//! section start (the length varint) relative to the first byte of the
//! payload, so the very first record of a typical archive points just past
//! the header frame.
//!
//! Records are collected, sorted once, and written; the on-disk tables are
//! fixed-stride within a group, so lookups over a mapped file binary
//! search without copying (see [`IndexView`]).

mod insertion;
mod multihash_sorted;
mod sorted;

pub(crate) use insertion::InsertionIndex;
pub use multihash_sorted::MultihashSortedIndex;
pub use sorted::SortedIndex;

use crate::block_reader::BlockReader;
use crate::error::{Error, Result};
use crate::io::ByteSource;
use crate::multihash::is_identity;
use crate::options::{IndexCodec, Options};
use cid::Cid;
use integer_encoding::VarInt;
use positioned_io::ReadAt;
use std::io::{Read, Write};
use tracing::debug;

/// Multicodec tag of the sorted index format.
pub const CODEC_SORTED: u64 = 0x0400;
/// Multicodec tag of the multihash-sorted index format.
pub const CODEC_MULTIHASH_SORTED: u64 = 0x0401;

/// Group and record counts are bounded so a hostile index cannot demand
/// absurd allocations.
pub(crate) const MAX_COUNT: u64 = i32::MAX as u64;
/// Widths beyond this are not plausible multihashes.
pub(crate) const MAX_WIDTH: u32 = 16 << 10;

/// One index entry: where a CID's section starts inside the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub cid: Cid,
    pub offset: u64,
}

/// An owned, fully-parsed index in either format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    Sorted(SortedIndex),
    MultihashSorted(MultihashSortedIndex),
}

impl Index {
    /// Builds an index of the requested format, or `None` when the codec
    /// says not to build one.
    pub fn from_records(codec: IndexCodec, records: Vec<Record>) -> Option<Index> {
        match codec {
            IndexCodec::Sorted => Some(Index::Sorted(SortedIndex::from_records(records))),
            IndexCodec::MultihashSorted => Some(Index::MultihashSorted(
                MultihashSortedIndex::from_records(records),
            )),
            IndexCodec::None => None,
        }
    }

    /// The multicodec tag this index self-describes with.
    pub fn codec(&self) -> u64 {
        match self {
            Index::Sorted(_) => CODEC_SORTED,
            Index::MultihashSorted(_) => CODEC_MULTIHASH_SORTED,
        }
    }

    /// Invokes `f` with the offset of every record matching `cid`, until
    /// `f` returns `false`. Fails with [`Error::NotFound`] when nothing
    /// matches.
    pub fn get_all(&self, cid: &Cid, f: impl FnMut(u64) -> bool) -> Result<()> {
        match self {
            Index::Sorted(index) => index.get_all(cid, f),
            Index::MultihashSorted(index) => index.get_all(cid, f),
        }
    }

    /// Offset of the first record matching `cid`.
    pub fn get_first(&self, cid: &Cid) -> Result<u64> {
        let mut found = None;
        self.get_all(cid, |offset| {
            found = Some(offset);
            false
        })?;
        found.ok_or(Error::NotFound)
    }

    /// Visits every record as `(multihash bytes, offset)`.
    pub fn for_each(&self, f: impl FnMut(&[u8], u64) -> Result<()>) -> Result<()> {
        match self {
            Index::Sorted(index) => index.for_each(f),
            Index::MultihashSorted(index) => index.for_each(f),
        }
    }

    /// Number of records in the catalog.
    pub fn len(&self) -> u64 {
        match self {
            Index::Sorted(index) => index.len(),
            Index::MultihashSorted(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes the codec tag and the index body, returning the bytes
    /// written.
    pub fn write_to(&self, mut writer: impl Write) -> Result<u64> {
        let tag = self.codec().encode_var_vec();
        writer.write_all(&tag)?;
        let body = match self {
            Index::Sorted(index) => index.write_body(&mut writer)?,
            Index::MultihashSorted(index) => index.write_body(&mut writer)?,
        };
        Ok(tag.len() as u64 + body)
    }

    /// Reads an index, dispatching on the leading codec tag.
    pub fn read_from(mut reader: impl Read) -> Result<Index> {
        let codec = read_codec(&mut reader)?;
        match codec {
            CODEC_SORTED => Ok(Index::Sorted(SortedIndex::read_body(reader)?)),
            CODEC_MULTIHASH_SORTED => Ok(Index::MultihashSorted(
                MultihashSortedIndex::read_body(reader)?,
            )),
            other => Err(Error::MalformedIndex(format!(
                "unknown index codec {other:#x}"
            ))),
        }
    }
}

/// Reads the multicodec tag an index starts with.
pub fn read_codec(reader: impl Read) -> Result<u64> {
    unsigned_varint::io::read_u64(reader)
        .map_err(|e| Error::MalformedIndex(format!("bad codec varint: {e}")))
}

/// Builds an index over a v1 payload by scanning its sections.
///
/// Identity CIDs are cataloged only when the options ask for them. The
/// index format follows [`Options::index_codec`], defaulting to
/// multihash-sorted when the option says "none".
pub fn generate_index<R: ByteSource>(source: R, options: &Options) -> Result<Index> {
    let mut reader = BlockReader::new(source, options.clone())?;
    let mut records = vec![];
    while let Some(section) = reader.skip_next()? {
        if is_identity(&section.cid) && !options.store_identity_cids {
            continue;
        }
        records.push(Record {
            cid: section.cid,
            offset: section.payload_offset,
        });
    }
    debug!(num_records = records.len(), "generated index");
    let codec = match options.index_codec {
        IndexCodec::None => IndexCodec::MultihashSorted,
        other => other,
    };
    Ok(Index::from_records(codec, records).expect("codec is never none here"))
}

/// Serialized multihash bytes for a `(code, digest)` pair.
pub(crate) fn multihash_bytes(code: u64, digest: &[u8]) -> Vec<u8> {
    let mut out = code.encode_var_vec();
    out.extend_from_slice(&(digest.len() as u64).encode_var_vec());
    out.extend_from_slice(digest);
    out
}

/// A lazily-consulted index over a readable region.
///
/// Only the group directory is parsed up front; lookups binary search the
/// fixed-stride record arrays in place through [`ReadAt`], so a mapped
/// multi-gigabyte index costs a handful of page reads per query.
#[derive(Debug, Clone)]
pub struct IndexView {
    codec: u64,
    groups: Vec<GroupMeta>,
}

#[derive(Debug, Clone)]
struct GroupMeta {
    /// Multihash code, for the multihash-sorted format.
    algo: Option<u64>,
    /// Key length in bytes.
    width: u32,
    count: u64,
    /// Absolute offset of the first record in the backing.
    records_offset: u64,
}

impl GroupMeta {
    fn stride(&self) -> u64 {
        self.width as u64 + 8
    }
}

impl IndexView {
    /// Parses the directory of an index starting at `offset` in `backing`.
    pub fn open<R: ReadAt>(backing: &R, offset: u64) -> Result<IndexView> {
        let mut cursor = positioned_io::Cursor::new_pos(backing, offset);
        let codec = read_codec(&mut cursor)?;
        let mut groups = vec![];
        match codec {
            CODEC_SORTED => {
                read_group_directory(&mut cursor, None, &mut groups)?;
            }
            CODEC_MULTIHASH_SORTED => {
                let algo_count = read_u32(&mut cursor)?;
                validate_count(algo_count as u64)?;
                for _ in 0..algo_count {
                    let algo = read_u64(&mut cursor)?;
                    read_group_directory(&mut cursor, Some(algo), &mut groups)?;
                }
            }
            other => {
                return Err(Error::MalformedIndex(format!(
                    "unknown index codec {other:#x}"
                )))
            }
        }
        Ok(IndexView { codec, groups })
    }

    pub fn codec(&self) -> u64 {
        self.codec
    }

    /// See [`Index::get_all`]; probes go through `backing`.
    pub fn get_all<R: ReadAt>(
        &self,
        backing: &R,
        cid: &Cid,
        mut f: impl FnMut(u64) -> bool,
    ) -> Result<()> {
        let (key, algo) = match self.codec {
            CODEC_SORTED => (cid.hash().to_bytes(), None),
            _ => (cid.hash().digest().to_vec(), Some(cid.hash().code())),
        };
        let mut found = false;
        for group in &self.groups {
            if group.algo != algo || group.width as usize != key.len() {
                continue;
            }
            let stride = group.stride();
            let mut record = vec![0u8; stride as usize];
            // lower bound by binary search over the fixed-stride array
            let (mut lo, mut hi) = (0u64, group.count);
            while lo < hi {
                let mid = (lo + hi) / 2;
                backing.read_exact_at(group.records_offset + mid * stride, &mut record)?;
                if record[..key.len()] < key[..] {
                    lo = mid + 1;
                } else {
                    hi = mid;
                }
            }
            let mut at = lo;
            while at < group.count {
                backing.read_exact_at(group.records_offset + at * stride, &mut record)?;
                if record[..key.len()] != key[..] {
                    break;
                }
                found = true;
                let offset =
                    u64::from_le_bytes(record[key.len()..].try_into().expect("stride is width+8"));
                if !f(offset) {
                    return Ok(());
                }
                at += 1;
            }
        }
        if found {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    /// Offset of the first record matching `cid`.
    pub fn get_first<R: ReadAt>(&self, backing: &R, cid: &Cid) -> Result<u64> {
        let mut found = None;
        self.get_all(backing, cid, |offset| {
            found = Some(offset);
            false
        })?;
        found.ok_or(Error::NotFound)
    }
}

fn read_group_directory<R: ReadAt>(
    cursor: &mut positioned_io::Cursor<&R>,
    algo: Option<u64>,
    groups: &mut Vec<GroupMeta>,
) -> Result<()> {
    use std::io::{Seek, SeekFrom};
    let group_count = read_u32(&mut *cursor)?;
    validate_count(group_count as u64)?;
    for _ in 0..group_count {
        let width = read_u32(&mut *cursor)?;
        if width > MAX_WIDTH {
            return Err(Error::MalformedIndex(format!("implausible width {width}")));
        }
        let count = read_u64(&mut *cursor)?;
        validate_count(count)?;
        let records_offset = cursor.stream_position()?;
        let records_len = count
            .checked_mul(width as u64 + 8)
            .ok_or_else(|| Error::MalformedIndex("record array overflows".into()))?;
        cursor.seek(SeekFrom::Current(records_len as i64))?;
        groups.push(GroupMeta {
            algo,
            width,
            count,
            records_offset,
        });
    }
    Ok(())
}

pub(crate) fn validate_count(count: u64) -> Result<()> {
    if count > MAX_COUNT {
        return Err(Error::MalformedIndex(format!(
            "count {count} exceeds maximum"
        )));
    }
    Ok(())
}

pub(crate) fn read_u32(mut reader: impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::MalformedIndex("truncated".into()))?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64(mut reader: impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::MalformedIndex("truncated".into()))?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multihash::prelude::*;
    use crate::Block;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;
    use std::io::Cursor;

    fn records_of(blocks: &[Block]) -> Vec<Record> {
        blocks
            .iter()
            .enumerate()
            .map(|(i, b)| Record {
                cid: b.cid,
                offset: (i as u64 + 1) * 100,
            })
            .collect()
    }

    #[quickcheck]
    fn roundtrip_both_codecs(blocks: Vec<Block>) {
        for codec in [IndexCodec::Sorted, IndexCodec::MultihashSorted] {
            let records = records_of(&blocks);
            let index = Index::from_records(codec, records.clone()).unwrap();
            assert_eq!(index.len(), records.len() as u64);

            let mut bytes = vec![];
            let written = index.write_to(&mut bytes).unwrap();
            assert_eq!(written, bytes.len() as u64);

            let decoded = Index::read_from(Cursor::new(&bytes)).unwrap();
            assert_eq!(decoded, index);

            for record in &records {
                // duplicates in the fixture may shadow offsets; the looked-up
                // offset must belong to some record with the same cid
                let offset = decoded.get_first(&record.cid).unwrap();
                assert!(records
                    .iter()
                    .any(|r| r.cid == record.cid && r.offset == offset));
            }
        }
    }

    #[quickcheck]
    fn view_agrees_with_owned(blocks: Vec<Block>) {
        for codec in [IndexCodec::Sorted, IndexCodec::MultihashSorted] {
            let records = records_of(&blocks);
            let index = Index::from_records(codec, records.clone()).unwrap();
            let mut bytes = vec![];
            index.write_to(&mut bytes).unwrap();

            let view = IndexView::open(&bytes, 0).unwrap();
            assert_eq!(view.codec(), index.codec());
            for record in &records {
                assert_eq!(
                    view.get_first(&bytes, &record.cid).unwrap(),
                    index.get_first(&record.cid).unwrap()
                );
            }
        }
    }

    #[test]
    fn missing_cid_is_not_found() {
        let index = Index::from_records(IndexCodec::MultihashSorted, vec![]).unwrap();
        let cid = Cid::new_v1(0x55, MultihashCode::Sha2_256.digest(b"absent"));
        assert!(matches!(index.get_first(&cid), Err(Error::NotFound)));
    }

    #[test]
    fn duplicate_offsets_all_visited() {
        let cid = Cid::new_v1(0x55, MultihashCode::Sha2_256.digest(b"dup"));
        let records = vec![
            Record { cid, offset: 17 },
            Record { cid, offset: 59 },
        ];
        for codec in [IndexCodec::Sorted, IndexCodec::MultihashSorted] {
            let index = Index::from_records(codec, records.clone()).unwrap();
            let mut offsets = vec![];
            index
                .get_all(&cid, |offset| {
                    offsets.push(offset);
                    true
                })
                .unwrap();
            offsets.sort_unstable();
            assert_eq!(offsets, vec![17, 59]);
        }
    }

    #[test]
    fn unknown_codec_is_rejected() {
        let mut bytes = 0x9999u64.encode_var_vec();
        bytes.extend_from_slice(&[0; 16]);
        assert!(matches!(
            Index::read_from(Cursor::new(&bytes)),
            Err(Error::MalformedIndex(_))
        ));
    }
}

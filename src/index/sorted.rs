// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{read_u32, read_u64, validate_count, Record, MAX_WIDTH};
use crate::error::{Error, Result};
use cid::Cid;
use std::io::{Read, Write};

/// Width-grouped index keyed by full multihash bytes.
///
/// Body layout: a `u32` group count, then per group (ascending by width)
/// a `u32` key width, a `u64` record count, and `count` fixed-stride
/// records of `width` key bytes followed by a `u64` offset, sorted
/// ascending by key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortedIndex {
    groups: Vec<WidthGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct WidthGroup {
    width: u32,
    /// `(key, offset)`, sorted by key bytes then offset.
    records: Vec<(Box<[u8]>, u64)>,
}

impl SortedIndex {
    pub(crate) fn from_records(records: Vec<Record>) -> Self {
        Self::from_keyed(
            records
                .into_iter()
                .map(|r| (r.cid.hash().to_bytes().into_boxed_slice(), r.offset)),
        )
    }

    pub(crate) fn from_keyed(keyed: impl IntoIterator<Item = (Box<[u8]>, u64)>) -> Self {
        let mut by_width: Vec<WidthGroup> = vec![];
        for (key, offset) in keyed {
            let width = key.len() as u32;
            match by_width.iter_mut().find(|g| g.width == width) {
                Some(group) => group.records.push((key, offset)),
                None => by_width.push(WidthGroup {
                    width,
                    records: vec![(key, offset)],
                }),
            }
        }
        by_width.sort_by_key(|g| g.width);
        for group in &mut by_width {
            group.records.sort();
        }
        SortedIndex { groups: by_width }
    }

    pub fn len(&self) -> u64 {
        self.groups.iter().map(|g| g.records.len() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get_all(&self, cid: &Cid, f: impl FnMut(u64) -> bool) -> Result<()> {
        self.get_all_keyed(&cid.hash().to_bytes(), f)
    }

    pub(crate) fn get_all_keyed(&self, key: &[u8], mut f: impl FnMut(u64) -> bool) -> Result<()> {
        let Some(group) = self.groups.iter().find(|g| g.width as usize == key.len()) else {
            return Err(Error::NotFound);
        };
        let start = group.records.partition_point(|(k, _)| k[..] < key[..]);
        let matches = group.records[start..]
            .iter()
            .take_while(|(k, _)| k[..] == key[..]);
        let mut found = false;
        for (_, offset) in matches {
            found = true;
            if !f(*offset) {
                return Ok(());
            }
        }
        if found {
            Ok(())
        } else {
            Err(Error::NotFound)
        }
    }

    pub fn for_each(&self, mut f: impl FnMut(&[u8], u64) -> Result<()>) -> Result<()> {
        for group in &self.groups {
            for (key, offset) in &group.records {
                f(key, *offset)?;
            }
        }
        Ok(())
    }

    pub(crate) fn write_body(&self, mut writer: impl Write) -> Result<u64> {
        let mut written = 0u64;
        writer.write_all(&(self.groups.len() as u32).to_le_bytes())?;
        written += 4;
        for group in &self.groups {
            writer.write_all(&group.width.to_le_bytes())?;
            writer.write_all(&(group.records.len() as u64).to_le_bytes())?;
            written += 12;
            for (key, offset) in &group.records {
                writer.write_all(key)?;
                writer.write_all(&offset.to_le_bytes())?;
                written += key.len() as u64 + 8;
            }
        }
        Ok(written)
    }

    pub(crate) fn read_body(mut reader: impl Read) -> Result<Self> {
        let group_count = read_u32(&mut reader)?;
        validate_count(group_count as u64)?;
        let mut groups = Vec::with_capacity(group_count as usize);
        for _ in 0..group_count {
            let width = read_u32(&mut reader)?;
            if width > MAX_WIDTH {
                return Err(Error::MalformedIndex(format!("implausible width {width}")));
            }
            let count = read_u64(&mut reader)?;
            validate_count(count)?;
            let mut records = Vec::with_capacity(count as usize);
            let mut record = vec![0u8; width as usize + 8];
            for _ in 0..count {
                reader
                    .read_exact(&mut record)
                    .map_err(|_| Error::MalformedIndex("truncated record".into()))?;
                let key: Box<[u8]> = record[..width as usize].into();
                let offset = u64::from_le_bytes(
                    record[width as usize..].try_into().expect("stride is width+8"),
                );
                records.push((key, offset));
            }
            groups.push(WidthGroup { width, records });
        }
        Ok(SortedIndex { groups })
    }
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{multihash_bytes, read_u32, read_u64, validate_count, Record, SortedIndex};
use crate::error::{Error, Result};
use cid::Cid;
use std::io::{Read, Write};

/// Index grouped by multihash algorithm, keyed by bare digests.
///
/// Body layout: a `u32` algorithm count, then per algorithm (ascending by
/// code) a `u64` multihash code followed by a sorted-index body holding
/// that algorithm's digests. In practice each algorithm contributes a
/// single width group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MultihashSortedIndex {
    /// `(code, digests)`, ascending by code.
    algorithms: Vec<(u64, SortedIndex)>,
}

impl MultihashSortedIndex {
    pub(crate) fn from_records(records: Vec<Record>) -> Self {
        let mut grouped: Vec<(u64, Vec<(Box<[u8]>, u64)>)> = vec![];
        for record in records {
            let code = record.cid.hash().code();
            let key: Box<[u8]> = record.cid.hash().digest().into();
            match grouped.iter_mut().find(|(c, _)| *c == code) {
                Some((_, keyed)) => keyed.push((key, record.offset)),
                None => grouped.push((code, vec![(key, record.offset)])),
            }
        }
        grouped.sort_by_key(|(code, _)| *code);
        MultihashSortedIndex {
            algorithms: grouped
                .into_iter()
                .map(|(code, keyed)| (code, SortedIndex::from_keyed(keyed)))
                .collect(),
        }
    }

    pub fn len(&self) -> u64 {
        self.algorithms.iter().map(|(_, index)| index.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.algorithms.is_empty()
    }

    pub fn get_all(&self, cid: &Cid, f: impl FnMut(u64) -> bool) -> Result<()> {
        let code = cid.hash().code();
        let Some((_, digests)) = self.algorithms.iter().find(|(c, _)| *c == code) else {
            return Err(Error::NotFound);
        };
        digests.get_all_keyed(cid.hash().digest(), f)
    }

    pub fn for_each(&self, mut f: impl FnMut(&[u8], u64) -> Result<()>) -> Result<()> {
        for (code, digests) in &self.algorithms {
            digests.for_each(|digest, offset| f(&multihash_bytes(*code, digest), offset))?;
        }
        Ok(())
    }

    pub(crate) fn write_body(&self, mut writer: impl Write) -> Result<u64> {
        let mut written = 0u64;
        writer.write_all(&(self.algorithms.len() as u32).to_le_bytes())?;
        written += 4;
        for (code, digests) in &self.algorithms {
            writer.write_all(&code.to_le_bytes())?;
            written += 8;
            written += digests.write_body(&mut writer)?;
        }
        Ok(written)
    }

    pub(crate) fn read_body(mut reader: impl Read) -> Result<Self> {
        let algo_count = read_u32(&mut reader)?;
        validate_count(algo_count as u64)?;
        let mut algorithms = Vec::with_capacity(algo_count as usize);
        for _ in 0..algo_count {
            let code = read_u64(&mut reader)?;
            let digests = SortedIndex::read_body(&mut reader)?;
            algorithms.push((code, digests));
        }
        Ok(MultihashSortedIndex { algorithms })
    }
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::Record;
use cid::Cid;
use indexmap::IndexMap;
use smallvec::SmallVec;

/// In-memory index a read-write store accumulates while streaming blocks
/// out, later flushed into an on-disk index.
///
/// Keyed by multihash bytes so both deduplication policies can be
/// answered: a digest probe is a map hit, a whole-CID probe additionally
/// compares the stored CIDs. Insertion order is preserved, which makes
/// key enumeration deterministic.
#[derive(Debug, Default)]
pub(crate) struct InsertionIndex {
    entries: IndexMap<Box<[u8]>, SmallVec<[Entry; 1]>, ahash::RandomState>,
    len: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub cid: Cid,
    pub offset: u64,
    pub size: u64,
}

impl InsertionIndex {
    pub fn insert(&mut self, cid: Cid, offset: u64, size: u64) {
        self.entries
            .entry(cid.hash().to_bytes().into_boxed_slice())
            .or_default()
            .push(Entry { cid, offset, size });
        self.len += 1;
    }

    fn digest_entries(&self, cid: &Cid) -> &[Entry] {
        self.entries
            .get(cid.hash().to_bytes().as_slice())
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    /// Entries matching `cid` under the given deduplication notion.
    pub fn matches<'a>(
        &'a self,
        cid: &'a Cid,
        use_whole_cids: bool,
    ) -> impl Iterator<Item = &'a Entry> {
        self.digest_entries(cid)
            .iter()
            .filter(move |entry| !use_whole_cids || entry.cid == *cid)
    }

    pub fn has(&self, cid: &Cid, use_whole_cids: bool) -> bool {
        self.matches(cid, use_whole_cids).next().is_some()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    /// Every stored CID, in insertion order of their digests.
    pub fn cids(&self) -> impl Iterator<Item = &Cid> {
        self.entries
            .values()
            .flat_map(|entries| entries.iter().map(|entry| &entry.cid))
    }

    /// Flushes to plain records for an index build.
    pub fn records(&self) -> Vec<Record> {
        self.entries
            .values()
            .flat_map(|entries| {
                entries.iter().map(|entry| Record {
                    cid: entry.cid,
                    offset: entry.offset,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multihash::prelude::*;

    #[test]
    fn whole_cid_and_digest_probes_differ() {
        let data = b"shared payload";
        let digest = MultihashCode::Sha2_256.digest(data);
        let raw = Cid::new_v1(0x55, digest);
        let dag = Cid::new_v1(0x71, digest);

        let mut index = InsertionIndex::default();
        index.insert(raw, 10, 5);

        // same digest, different codec
        assert!(index.has(&dag, false));
        assert!(!index.has(&dag, true));
        assert!(index.has(&raw, true));

        index.insert(dag, 20, 5);
        assert_eq!(index.len(), 2);
        assert_eq!(index.matches(&dag, true).count(), 1);
        assert_eq!(index.matches(&dag, false).count(), 2);
        assert_eq!(index.cids().collect::<Vec<_>>(), vec![&raw, &dag]);
    }
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Content-addressed block stores backed by archive files.
//!
//! Three variants with one contract: [`WriteOnly`] streams a v1 payload to
//! any sink, [`ReadWrite`] builds an indexed v2 file, and [`ReadOnly`]
//! serves lookups from a finished file. All of them answer for blocks by
//! CID; none of them interpret block payloads.

mod read_only;
mod read_write;
mod write_only;

pub use read_only::{open_read_only, ReadOnly};
pub use read_write::{open_read_write, ReadWrite};
pub use write_only::WriteOnly;

use crate::error::Result;
use crate::multihash;
use cid::Cid;

/// The store contract: keyed block reads and writes.
///
/// Deleting is part of the vocabulary but no archive-backed store supports
/// it; implementations answer with their wrong-variant error.
pub trait Blockstore {
    fn get(&self, k: &Cid) -> Result<Option<Vec<u8>>>;

    fn put_keyed(&self, k: &Cid, block: &[u8]) -> Result<()>;

    fn has(&self, k: &Cid) -> Result<bool> {
        Ok(self.get(k)?.is_some())
    }

    /// Size in bytes of the block's data, if present.
    fn get_size(&self, k: &Cid) -> Result<Option<u64>>;

    fn delete_block(&self, k: &Cid) -> Result<()>;
}

/// Identity CIDs carry their payload in the digest; stores that elect not
/// to persist them answer reads straight from the CID.
pub(crate) fn identity_payload(k: &Cid, store_identity_cids: bool) -> Option<Vec<u8>> {
    if !store_identity_cids && multihash::is_identity(k) {
        return Some(k.hash().digest().to_vec());
    }
    None
}

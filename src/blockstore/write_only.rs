// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{identity_payload, Blockstore};
use crate::error::{Error, Result};
use crate::index::InsertionIndex;
use crate::multihash;
use crate::options::Options;
use crate::v1::{self, V1Header};
use cid::Cid;
use parking_lot::Mutex;
use std::io::Write;
use tracing::trace;

/// Append-only v1 writer with just enough memory of what it wrote to
/// answer `has` and `get_size`.
///
/// Suitable for streaming sinks: nothing is ever read back, so `get` and
/// `delete_block` fail with [`Error::WriteOnly`].
pub struct WriteOnly<W> {
    inner: Mutex<WriteOnlyInner<W>>,
}

struct WriteOnlyInner<W> {
    out: W,
    written: InsertionIndex,
    /// Bytes emitted so far, doubling as the next section's offset.
    position: u64,
    options: Options,
}

impl<W: Write> WriteOnly<W> {
    /// Writes the v1 header for `roots` and returns the store.
    pub fn new(mut out: W, roots: &[Cid], options: Options) -> Result<Self> {
        options.check_cancelled()?;
        let position = V1Header::new(roots.to_vec()).write_to(&mut out)?;
        Ok(WriteOnly {
            inner: Mutex::new(WriteOnlyInner {
                out,
                written: InsertionIndex::default(),
                position,
                options,
            }),
        })
    }

    /// Every written CID, in write order.
    pub fn cids(&self) -> Vec<Cid> {
        self.inner.lock().written.cids().cloned().collect()
    }

    /// Flushes the sink and hands it back.
    pub fn into_inner(self) -> Result<W> {
        let WriteOnlyInner { mut out, .. } = self.inner.into_inner();
        out.flush()?;
        Ok(out)
    }
}

impl<W: Write> Blockstore for WriteOnly<W> {
    fn get(&self, _k: &Cid) -> Result<Option<Vec<u8>>> {
        Err(Error::WriteOnly)
    }

    #[tracing::instrument(level = "trace", skip(self, block))]
    fn put_keyed(&self, k: &Cid, block: &[u8]) -> Result<()> {
        let WriteOnlyInner {
            out,
            written,
            position,
            options,
        } = &mut *self.inner.lock();
        options.check_cancelled()?;

        if !options.store_identity_cids && multihash::is_identity(k) {
            trace!("identity cid, not storing");
            return Ok(());
        }
        let cid_size = k.encoded_len() as u64;
        if cid_size > options.max_index_cid_size {
            return Err(Error::CidTooLarge {
                size: cid_size,
                max: options.max_index_cid_size,
            });
        }
        if !options.blockstore_allow_duplicate_puts
            && written.has(k, options.blockstore_use_whole_cids)
        {
            trace!("deduplicated");
            return Ok(());
        }

        let frame = v1::write_section(&mut *out, k, block)?;
        written.insert(*k, *position, block.len() as u64);
        *position += frame;
        Ok(())
    }

    fn has(&self, k: &Cid) -> Result<bool> {
        let inner = self.inner.lock();
        if identity_payload(k, inner.options.store_identity_cids).is_some() {
            return Ok(true);
        }
        Ok(inner
            .written
            .has(k, inner.options.blockstore_use_whole_cids))
    }

    fn get_size(&self, k: &Cid) -> Result<Option<u64>> {
        let inner = self.inner.lock();
        if let Some(payload) = identity_payload(k, inner.options.store_identity_cids) {
            return Ok(Some(payload.len() as u64));
        }
        let result = inner
            .written
            .matches(k, inner.options.blockstore_use_whole_cids)
            .next()
            .map(|entry| entry.size);
        Ok(result)
    }

    fn delete_block(&self, _k: &Cid) -> Result<()> {
        Err(Error::WriteOnly)
    }
}

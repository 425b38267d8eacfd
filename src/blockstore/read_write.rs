// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{identity_payload, Blockstore};
use crate::error::{Error, Result};
use crate::index::{Index, InsertionIndex};
use crate::multihash;
use crate::options::Options;
use crate::v1::{self, V1Header};
use crate::v2::{self, write_zeroes, V2Header};
use cid::Cid;
use parking_lot::Mutex;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, trace};

/// A v2 container under construction: blocks stream to disk while an
/// in-memory index accumulates; [`ReadWrite::finalize`] appends the index
/// and fills in the header reserved at open.
///
/// Until finalized the file is not a valid archive (the header slot holds
/// zeroes). Finalize consumes the store and is the only path that keeps
/// the file; every other way out, drop included, unlinks it.
pub struct ReadWrite {
    inner: Mutex<ReadWriteInner>,
    path: PathBuf,
    finalized: bool,
}

struct ReadWriteInner {
    file: File,
    /// Absolute offset the next section lands at.
    write_position: u64,
    /// Absolute offset of the first payload byte.
    data_offset: u64,
    index: InsertionIndex,
    roots: Vec<Cid>,
    options: Options,
}

/// Creates (or overwrites) `path` and reserves the fixed prefix: pragma,
/// a zeroed header slot, optional padding, then the v1 header for `roots`.
#[instrument(level = "debug", skip(roots, options))]
pub fn open_read_write(
    path: impl AsRef<Path> + std::fmt::Debug,
    roots: &[Cid],
    options: Options,
) -> Result<ReadWrite> {
    options.check_cancelled()?;
    let path = path.as_ref().to_path_buf();
    let mut file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)?;

    file.write_all(&v2::PRAGMA)?;
    file.write_all(&[0u8; v2::HEADER_SIZE])?;
    write_zeroes(&mut file, options.data_padding)?;
    let data_offset = v2::PREFIX_SIZE + options.data_padding;
    let header_len = V1Header::new(roots.to_vec()).write_to(&mut file)?;

    Ok(ReadWrite {
        inner: Mutex::new(ReadWriteInner {
            file,
            write_position: data_offset + header_len,
            data_offset,
            index: InsertionIndex::default(),
            roots: roots.to_vec(),
            options,
        }),
        path,
        finalized: false,
    })
}

impl ReadWrite {
    /// Roots captured at open.
    pub fn roots(&self) -> Vec<Cid> {
        self.inner.lock().roots.clone()
    }

    /// Every stored CID, in insertion order.
    pub fn cids(&self) -> Vec<Cid> {
        self.inner.lock().index.cids().cloned().collect()
    }

    /// Appends the index (per the configured codec), fills the header
    /// slot with the final offsets, and syncs. The file is a complete
    /// archive afterwards.
    #[instrument(level = "debug", skip(self))]
    pub fn finalize(mut self) -> Result<()> {
        {
            let inner = self.inner.get_mut();
            inner.options.check_cancelled()?;
            let data_size = inner.write_position - inner.data_offset;
            let mut header = V2Header::new(data_size)
                .with_data_padding(inner.options.data_padding)
                .with_index_padding(inner.options.index_padding);
            header
                .characteristics
                .set_fully_indexed(inner.options.store_identity_cids);

            match Index::from_records(inner.options.index_codec, inner.index.records()) {
                Some(index) => {
                    inner.file.seek(SeekFrom::Start(inner.write_position))?;
                    write_zeroes(&mut inner.file, inner.options.index_padding)?;
                    index.write_to(&mut inner.file)?;
                    debug!(records = index.len(), "wrote index");
                }
                None => header = header.without_index(),
            }

            inner.file.seek(SeekFrom::Start(v2::PRAGMA_SIZE as u64))?;
            header.write_to(&mut inner.file)?;
            inner.file.sync_all()?;
            debug!(data_size, "finalized archive");
        }
        self.finalized = true;
        Ok(())
    }

    /// Closes and unlinks the partially-written file.
    pub fn discard(mut self) -> Result<()> {
        self.finalized = true; // drop must not unlink twice
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl Drop for ReadWrite {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Blockstore for ReadWrite {
    #[tracing::instrument(level = "trace", skip(self))]
    fn get(&self, k: &Cid) -> Result<Option<Vec<u8>>> {
        let ReadWriteInner {
            file,
            data_offset,
            index,
            options,
            ..
        } = &mut *self.inner.lock();
        options.check_cancelled()?;
        if let Some(payload) = identity_payload(k, options.store_identity_cids) {
            return Ok(Some(payload));
        }
        let Some(entry) = index
            .matches(k, options.blockstore_use_whole_cids)
            .next()
            .cloned()
        else {
            trace!("not found");
            return Ok(None);
        };
        trace!(offset = entry.offset, "fetching from disk");
        file.seek(SeekFrom::Start(*data_offset + entry.offset))?;
        let Some((cid, data)) = v1::read_section(
            &mut *file,
            options.zero_length_section_as_eof,
            options.max_allowed_section_size,
        )?
        else {
            return Err(Error::TruncatedSection);
        };
        let matches = if options.blockstore_use_whole_cids {
            cid == *k
        } else {
            cid.hash() == k.hash()
        };
        Ok(matches.then_some(data))
    }

    #[tracing::instrument(level = "trace", skip(self, block))]
    fn put_keyed(&self, k: &Cid, block: &[u8]) -> Result<()> {
        let ReadWriteInner {
            file,
            write_position,
            data_offset,
            index,
            options,
            ..
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
            && index.has(k, options.blockstore_use_whole_cids)
        {
            trace!("deduplicated");
            return Ok(());
        }

        file.seek(SeekFrom::Start(*write_position))?;
        let frame = v1::write_section(&mut *file, k, block)?;
        index.insert(*k, *write_position - *data_offset, block.len() as u64);
        *write_position += frame;
        Ok(())
    }

    fn has(&self, k: &Cid) -> Result<bool> {
        let inner = self.inner.lock();
        if identity_payload(k, inner.options.store_identity_cids).is_some() {
            return Ok(true);
        }
        Ok(inner
            .index
            .has(k, inner.options.blockstore_use_whole_cids))
    }

    fn get_size(&self, k: &Cid) -> Result<Option<u64>> {
        let inner = self.inner.lock();
        if let Some(payload) = identity_payload(k, inner.options.store_identity_cids) {
            return Ok(Some(payload.len() as u64));
        }
        let result = inner
            .index
            .matches(k, inner.options.blockstore_use_whole_cids)
            .next()
            .map(|entry| entry.size);
        Ok(result)
    }

    fn delete_block(&self, _k: &Cid) -> Result<()> {
        Err(Error::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockstore::testutil::block;
    use pretty_assertions::assert_eq;

    #[test]
    fn put_get_roundtrip_before_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wip.car");
        let blocks = [block(b"alpha"), block(b"beta")];

        let store = open_read_write(&path, &[blocks[0].cid], Options::default()).unwrap();
        for b in &blocks {
            store.put_keyed(&b.cid, &b.data).unwrap();
        }
        for b in &blocks {
            assert_eq!(store.get(&b.cid).unwrap(), Some(b.data.clone()));
            assert!(store.has(&b.cid).unwrap());
            assert_eq!(
                store.get_size(&b.cid).unwrap(),
                Some(b.data.len() as u64)
            );
        }
        assert!(store.get(&block(b"missing").cid).unwrap().is_none());
        store.finalize().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn dropping_an_unfinalized_store_unlinks_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dropped.car");
        {
            let store = open_read_write(&path, &[], Options::default()).unwrap();
            store.put_keyed(&block(b"x").cid, b"x").unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn discard_unlinks_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("discarded.car");
        let store = open_read_write(&path, &[], Options::default()).unwrap();
        store.discard().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn existing_files_are_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clobbered.car");
        std::fs::write(&path, b"previous contents, much longer than a pragma").unwrap();

        let store = open_read_write(&path, &[], Options::default()).unwrap();
        store.put_keyed(&block(b"fresh").cid, b"fresh").unwrap();
        store.finalize().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..v2::PRAGMA_SIZE], &v2::PRAGMA);
    }
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::{identity_payload, Blockstore};
use crate::block_reader::BlockReader;
use crate::error::{Error, Result};
use crate::index::{generate_index, Index, IndexView};
use crate::io::{Mmap, PayloadReader, SeekSource};
use crate::multihash;
use crate::options::Options;
use crate::v1::{self, V1Header};
use crate::v2::{self, V2Header};
use cid::Cid;
use positioned_io::{ReadAt, Size};
use smallvec::SmallVec;
use std::io::{self, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, instrument};

/// A finished v1 or v2 archive served as a blockstore.
///
/// The backing is shared-read and the index immutable once opened, so
/// lookups need no lock and the store is safe for concurrent readers.
/// When the file carries an index its record groups are consulted in
/// place; otherwise one is built by scanning, or the open is refused,
/// depending on [`Options::generate_missing_index`].
pub struct ReadOnly<R = Mmap> {
    backing: R,
    version: u64,
    payload_start: u64,
    payload_size: u64,
    roots: Vec<Cid>,
    index: StoreIndex,
    options: Options,
}

enum StoreIndex {
    /// Consulted in place through the backing.
    View(IndexView),
    /// Built by scanning the payload.
    Owned(Index),
}

/// Opens `path` with a read-only memory map. See [`ReadOnly::new`].
pub fn open_read_only(path: impl AsRef<Path>, options: Options) -> Result<ReadOnly<Mmap>> {
    let file = std::fs::File::open(path)?;
    ReadOnly::new(Mmap::map(&file)?, options)
}

impl<R: ReadAt + Size> ReadOnly<R> {
    #[instrument(level = "debug", skip_all)]
    pub fn new(backing: R, options: Options) -> Result<Self> {
        let size = backing
            .size()?
            .ok_or_else(|| Error::Io(io::Error::other("backing size unknown")))?;
        let version = v1::read_version(
            positioned_io::Cursor::new(&backing),
            options.max_allowed_header_size,
        )?;

        let (payload_start, payload_size, index_offset) = match version {
            1 => (0, size, None),
            2 => {
                let mut bytes = [0; v2::HEADER_SIZE];
                backing
                    .read_exact_at(v2::PRAGMA_SIZE as u64, &mut bytes)
                    .map_err(|e| match e.kind() {
                        io::ErrorKind::UnexpectedEof => Error::TruncatedHeader,
                        _ => Error::Io(e),
                    })?;
                let header = V2Header::from_le_bytes(bytes)?;
                let index_offset = header.has_index().then_some(header.index_offset);
                (header.data_offset, header.data_size, index_offset)
            }
            other => return Err(Error::UnsupportedVersion(other)),
        };

        let index = match index_offset {
            Some(offset) => StoreIndex::View(IndexView::open(&backing, offset)?),
            None if options.generate_missing_index => {
                let payload = PayloadReader::new(&backing, payload_start, payload_size);
                let index = generate_index(SeekSource(payload), &options)?;
                debug!(records = index.len(), "indexed archive by scanning");
                StoreIndex::Owned(index)
            }
            None => return Err(Error::MissingIndex),
        };

        let mut payload = PayloadReader::new(&backing, payload_start, payload_size);
        let header = V1Header::read_from(&mut payload, &options)?;
        if header.version != 1 {
            return Err(Error::MalformedHeader(
                "data payload must be a v1".into(),
            ));
        }

        Ok(ReadOnly {
            backing,
            version,
            payload_start,
            payload_size,
            roots: header.roots,
            index,
            options,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn roots(&self) -> Vec<Cid> {
        self.roots.clone()
    }

    /// Every stored CID in file order, by scanning the payload.
    pub fn cids(&self) -> Result<Vec<Cid>> {
        let payload = PayloadReader::new(&self.backing, self.payload_start, self.payload_size);
        let mut reader = BlockReader::new(SeekSource(payload), self.options.clone())?;
        let mut cids = vec![];
        while let Some(section) = reader.skip_next()? {
            cids.push(section.cid);
        }
        Ok(cids)
    }

    fn lookup(&self, k: &Cid) -> Result<SmallVec<[u64; 1]>> {
        let mut offsets = SmallVec::new();
        let collect = |offset: u64| {
            offsets.push(offset);
            true
        };
        let outcome = match &self.index {
            StoreIndex::View(view) => view.get_all(&self.backing, k, collect),
            StoreIndex::Owned(index) => index.get_all(k, collect),
        };
        match outcome {
            Ok(()) => Ok(offsets),
            Err(Error::NotFound) => Ok(SmallVec::new()),
            Err(other) => Err(other),
        }
    }

    /// Reads the section at a payload offset.
    fn section_at(&self, offset: u64) -> Result<Option<(Cid, Vec<u8>)>> {
        let mut payload =
            PayloadReader::new(&self.backing, self.payload_start, self.payload_size);
        payload.seek(SeekFrom::Start(offset))?;
        v1::read_section(
            &mut payload,
            self.options.zero_length_section_as_eof,
            self.options.max_allowed_section_size,
        )
    }

    fn cid_matches(&self, stored: &Cid, requested: &Cid) -> bool {
        if self.options.blockstore_use_whole_cids {
            stored == requested
        } else {
            stored.hash() == requested.hash()
        }
    }
}

impl<R: ReadAt + Size> Blockstore for ReadOnly<R> {
    #[tracing::instrument(level = "trace", skip(self))]
    fn get(&self, k: &Cid) -> Result<Option<Vec<u8>>> {
        self.options.check_cancelled()?;
        if let Some(payload) = identity_payload(k, self.options.store_identity_cids) {
            return Ok(Some(payload));
        }
        for offset in self.lookup(k)? {
            let Some((cid, data)) = self.section_at(offset)? else {
                continue;
            };
            if !self.cid_matches(&cid, k) {
                // an index may alias distinct cids onto one offset
                continue;
            }
            if !self.options.trusted {
                multihash::verify_block(&cid, &data)?;
            }
            return Ok(Some(data));
        }
        Ok(None)
    }

    fn put_keyed(&self, _k: &Cid, _block: &[u8]) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn has(&self, k: &Cid) -> Result<bool> {
        if identity_payload(k, self.options.store_identity_cids).is_some() {
            return Ok(true);
        }
        for offset in self.lookup(k)? {
            let Some((cid, _)) = self.section_at(offset)? else {
                continue;
            };
            if self.cid_matches(&cid, k) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get_size(&self, k: &Cid) -> Result<Option<u64>> {
        if let Some(payload) = identity_payload(k, self.options.store_identity_cids) {
            return Ok(Some(payload.len() as u64));
        }
        for offset in self.lookup(k)? {
            let Some((cid, data)) = self.section_at(offset)? else {
                continue;
            };
            if self.cid_matches(&cid, k) {
                return Ok(Some(data.len() as u64));
            }
        }
        Ok(None)
    }

    fn delete_block(&self, _k: &Cid) -> Result<()> {
        Err(Error::ReadOnly)
    }
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::block_reader::BlockReader;
use crate::error::{Error, Result};
use crate::index;
use crate::io::{Mmap, PayloadReader, SeekSource};
use crate::options::Options;
use crate::v1::{self, V1Header};
use crate::v2::{self, V2Header};
use cid::Cid;
use positioned_io::{ReadAt, Size};
use std::io;
use std::path::Path;
use tracing::instrument;

/// Random access over a CARv1 or CARv2 backing, typically a mapped file.
///
/// Exposes the embedded v1 payload and the index region as independent
/// bounded readers, and a validating [`Reader::inspect`] scan.
pub struct Reader<R> {
    version: u64,
    header: Option<V2Header>,
    inner: R,
    options: Options,
}

/// Opens a file with a read-only memory map. See [`Reader::new`].
pub fn open_reader(path: impl AsRef<Path>, options: Options) -> Result<Reader<Mmap>> {
    let file = std::fs::File::open(path)?;
    Reader::new(Mmap::map(&file)?, options)
}

impl<R: ReadAt + Size> Reader<R> {
    #[instrument(level = "debug", skip_all)]
    pub fn new(inner: R, options: Options) -> Result<Self> {
        let version = v1::read_version(
            positioned_io::Cursor::new(&inner),
            options.max_allowed_header_size,
        )?;
        let header = match version {
            1 => None,
            2 => {
                let mut bytes = [0; v2::HEADER_SIZE];
                inner
                    .read_exact_at(v2::PRAGMA_SIZE as u64, &mut bytes)
                    .map_err(|e| match e.kind() {
                        io::ErrorKind::UnexpectedEof => Error::TruncatedHeader,
                        _ => Error::Io(e),
                    })?;
                Some(V2Header::from_le_bytes(bytes)?)
            }
            other => return Err(Error::UnsupportedVersion(other)),
        };
        Ok(Reader {
            version,
            header,
            inner,
            options,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// The fixed header, for a v2 backing.
    pub fn header(&self) -> Option<&V2Header> {
        self.header.as_ref()
    }

    fn backing_size(&self) -> Result<u64> {
        self.inner
            .size()?
            .ok_or_else(|| Error::Io(io::Error::other("backing size unknown")))
    }

    /// A bounded reader over the v1 payload.
    pub fn data_reader(&self) -> Result<PayloadReader<'_, R>> {
        match &self.header {
            Some(header) => Ok(PayloadReader::new(
                &self.inner,
                header.data_offset,
                header.data_size,
            )),
            None => Ok(PayloadReader::new(&self.inner, 0, self.backing_size()?)),
        }
    }

    /// A bounded reader over the index region, or `None` when the backing
    /// is a v1 or carries no index.
    pub fn index_reader(&self) -> Result<Option<PayloadReader<'_, R>>> {
        match &self.header {
            Some(header) if header.has_index() => {
                let size = self.backing_size()?;
                if header.index_offset > size {
                    return Err(Error::OffsetImpossible {
                        data_offset: header.data_offset,
                        data_size: header.data_size,
                        index_offset: header.index_offset,
                    });
                }
                Ok(Some(PayloadReader::new(
                    &self.inner,
                    header.index_offset,
                    size - header.index_offset,
                )))
            }
            _ => Ok(None),
        }
    }

    /// Roots of the payload header.
    pub fn roots(&self) -> Result<Vec<Cid>> {
        let mut data = self.data_reader()?;
        let header = V1Header::read_from(&mut data, &self.options)?;
        if header.version != 1 {
            return Err(Error::MalformedHeader(
                "data payload must be a v1".into(),
            ));
        }
        Ok(header.roots)
    }

    /// Scans the whole archive, validating the format and accumulating
    /// [`Stats`]. With `validate_block_hash` every payload is hashed and
    /// checked against its CID; without it blocks are skipped over.
    #[instrument(level = "debug", skip(self))]
    pub fn inspect(&self, validate_block_hash: bool) -> Result<Stats> {
        let mut stats = Stats {
            version: self.version,
            header: self.header,
            ..Default::default()
        };

        let block_options = if validate_block_hash {
            self.options.clone().with_trusted(false)
        } else {
            self.options.clone()
        };
        let mut blocks = BlockReader::new(
            SeekSource(self.data_reader()?),
            block_options,
        )?;
        stats.roots = blocks.roots().to_vec();
        let mut roots_seen = vec![false; stats.roots.len()];

        let mut total_cid_length = 0u64;
        let mut total_block_length = 0u64;
        let mut min_cid_length = u64::MAX;
        let mut min_block_length = u64::MAX;

        loop {
            let (cid, block_length) = if validate_block_hash {
                match blocks.next()? {
                    Some(block) => (block.cid, block.data.len() as u64),
                    None => break,
                }
            } else {
                match blocks.skip_next()? {
                    Some(section) => (section.cid, section.data_size),
                    None => break,
                }
            };

            for (seen, root) in roots_seen.iter_mut().zip(&stats.roots) {
                if !*seen && cid == *root {
                    *seen = true;
                }
            }

            let cid_length = cid.encoded_len() as u64;
            *stats.codec_counts.entry(cid.codec()).or_default() += 1;
            *stats.mh_type_counts.entry(cid.hash().code()).or_default() += 1;

            stats.block_count += 1;
            total_cid_length += cid_length;
            total_block_length += block_length;
            min_cid_length = min_cid_length.min(cid_length);
            min_block_length = min_block_length.min(block_length);
            stats.max_cid_length = stats.max_cid_length.max(cid_length);
            stats.max_block_length = stats.max_block_length.max(block_length);
        }

        stats.roots_present = roots_seen.iter().all(|seen| *seen);
        if stats.block_count > 0 {
            stats.min_cid_length = min_cid_length;
            stats.min_block_length = min_block_length;
            stats.avg_cid_length = total_cid_length / stats.block_count;
            stats.avg_block_length = total_block_length / stats.block_count;
        }

        if let Some(mut index_region) = self.index_reader()? {
            stats.index_codec = Some(index::read_codec(&mut index_region)?);
        }
        Ok(stats)
    }
}

/// High-level description of an archive, produced by [`Reader::inspect`].
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub version: u64,
    pub header: Option<V2Header>,
    pub roots: Vec<Cid>,
    /// Whether every root CID was found among the blocks.
    pub roots_present: bool,
    pub block_count: u64,
    /// Blocks per content codec.
    pub codec_counts: ahash::HashMap<u64, u64>,
    /// Blocks per multihash algorithm.
    pub mh_type_counts: ahash::HashMap<u64, u64>,
    pub min_cid_length: u64,
    pub max_cid_length: u64,
    pub avg_cid_length: u64,
    pub min_block_length: u64,
    pub max_block_length: u64,
    pub avg_block_length: u64,
    /// Codec tag of the embedded index, when one is present.
    pub index_codec: Option<u64>,
}

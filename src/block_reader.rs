// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::error::{Error, Result};
use crate::io::{ByteSource, CountRead};
use crate::multihash;
use crate::options::Options;
use crate::v1::{self, V1Header};
use crate::v2::{self, V2Header};
use crate::Block;
use cid::Cid;
use std::io::Read;
use tracing::trace;

/// Metadata of a section that was jumped over instead of buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    pub cid: Cid,
    /// Byte offset of the section start in the underlying source.
    pub offset: u64,
    /// Byte offset of the section start relative to the v1 payload.
    pub payload_offset: u64,
    /// Length of the block data (the section body minus the CID).
    pub data_size: u64,
}

/// Iterates the blocks of a CARv1 or CARv2 byte stream.
///
/// On construction the opening header is decoded; a v2 prefix is consumed
/// and iteration proceeds over the embedded v1 payload, bounded to its
/// declared size. Iteration is forward-only and end-of-payload is sticky.
#[derive(Debug)]
pub struct BlockReader<R> {
    version: u64,
    roots: Vec<Cid>,
    inner: R,
    /// Payload bytes still to iterate; unbounded for a bare v1 stream.
    remaining: u64,
    /// Offset of the next section in the underlying source.
    offset: u64,
    /// Offset of the first byte of the v1 payload in the source.
    payload_start: u64,
    options: Options,
    eof: bool,
}

impl<R: ByteSource> BlockReader<R> {
    pub fn new(mut reader: R, options: Options) -> Result<Self> {
        let mut counting = CountRead::new(&mut reader);
        let opening = V1Header::read_from(&mut counting, &options)?;
        let consumed = counting.bytes_read() as u64;

        match opening.version {
            1 => Ok(BlockReader {
                version: 1,
                roots: opening.roots,
                inner: reader,
                remaining: u64::MAX,
                offset: consumed,
                payload_start: 0,
                options,
                eof: false,
            }),
            2 => {
                let header = V2Header::read_from(&mut reader)?;
                // the prefix read so far is the pragma and the fixed header
                let skip = header
                    .data_offset
                    .checked_sub(consumed + v2::HEADER_SIZE as u64)
                    .ok_or(Error::OffsetImpossible {
                        data_offset: header.data_offset,
                        data_size: header.data_size,
                        index_offset: header.index_offset,
                    })?;
                reader.skip_bytes(skip)?;

                let mut remaining = header.data_size;
                let mut counting = CountRead::new((&mut reader).take(remaining));
                let inner_header = V1Header::read_from(&mut counting, &options)?;
                if inner_header.version != 1 {
                    return Err(Error::MalformedHeader(format!(
                        "invalid data payload header version; expected 1, got {}",
                        inner_header.version
                    )));
                }
                let header_len = counting.bytes_read() as u64;
                remaining -= header_len;

                trace!(
                    data_offset = header.data_offset,
                    data_size = header.data_size,
                    "iterating v2-wrapped payload"
                );
                Ok(BlockReader {
                    version: 2,
                    roots: inner_header.roots,
                    inner: reader,
                    remaining,
                    offset: header.data_offset + header_len,
                    payload_start: header.data_offset,
                    options,
                    eof: false,
                })
            }
            _ => unreachable!("header decode admits only versions 1 and 2"),
        }
    }

    /// The version the container advertised, 1 or 2.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Roots of the (possibly embedded) v1 payload.
    pub fn roots(&self) -> &[Cid] {
        &self.roots
    }

    /// Reads the next block, verifying the payload hash unless the source
    /// is trusted. `Ok(None)` once the payload is exhausted.
    pub fn next(&mut self) -> Result<Option<Block>> {
        if self.eof {
            return Ok(None);
        }
        self.options.check_cancelled()?;
        let mut counting = CountRead::new((&mut self.inner).take(self.remaining));
        let Some((cid, data)) = v1::read_section(
            &mut counting,
            self.options.zero_length_section_as_eof,
            self.options.max_allowed_section_size,
        )?
        else {
            self.eof = true;
            return Ok(None);
        };
        let consumed = counting.bytes_read() as u64;
        self.remaining = self.remaining.saturating_sub(consumed);
        self.offset += consumed;

        if !self.options.trusted {
            multihash::verify_block(&cid, &data)?;
        }
        Ok(Some(Block { cid, data }))
    }

    /// Jumps over the next section, returning where it was and what it
    /// held. The payload hash is not checked. Sources with a cheap seek
    /// advance without reading the block data.
    pub fn skip_next(&mut self) -> Result<Option<SectionInfo>> {
        if self.eof {
            return Ok(None);
        }
        self.options.check_cancelled()?;
        let section_offset = self.offset;

        let mut counting = CountRead::new((&mut self.inner).take(self.remaining));
        let Some(section_len) = v1::read_section_length(
            &mut counting,
            self.options.zero_length_section_as_eof,
            self.options.max_allowed_section_size,
        )?
        else {
            self.eof = true;
            return Ok(None);
        };

        let cid = {
            let mut bounded = (&mut counting).take(section_len);
            Cid::read_bytes(&mut bounded).map_err(|e| match e {
                cid::Error::Io(io_error)
                    if io_error.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    Error::TruncatedSection
                }
                other => Error::Cid(other),
            })?
        };
        let head = counting.bytes_read() as u64; // length varint and cid
        let cid_len = cid.encoded_len() as u64;
        if section_len < cid_len {
            return Err(Error::TruncatedSection);
        }
        let data_size = section_len - cid_len;
        if self.remaining != u64::MAX && head + data_size > self.remaining {
            return Err(Error::UnexpectedEof);
        }
        self.inner.skip_bytes(data_size).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::UnexpectedEof,
            _ => Error::Io(e),
        })?;

        let consumed = head + data_size;
        self.remaining = self.remaining.saturating_sub(consumed);
        self.offset += consumed;
        Ok(Some(SectionInfo {
            cid,
            offset: section_offset,
            payload_offset: section_offset - self.payload_start,
            data_size,
        }))
    }
}

/// Drains a reader into any blockstore, returning the payload roots.
pub fn load_car<R: ByteSource>(
    store: &impl crate::blockstore::Blockstore,
    reader: R,
    options: Options,
) -> Result<Vec<Cid>> {
    let mut reader = BlockReader::new(reader, options)?;
    while let Some(block) = reader.next()? {
        store.put_keyed(&block.cid, &block.data)?;
    }
    Ok(reader.roots().to_vec())
}

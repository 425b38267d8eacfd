// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! # CARv2 layout
//!
//! A v2 container is a fixed 51-byte prefix wrapping an ordinary v1
//! payload, optionally followed by an index:
//!
//! ```text
//! ┌────────┬──────────┬─────────┬──────────┬─────────┬───────┐
//! │pragma  │v2 header │(padding)│v1 payload│(padding)│ index │
//! │11 bytes│40 bytes  │         │          │         │       │
//! └────────┴──────────┴─────────┴──────────┴─────────┴───────┘
//! ```
//!
//! The pragma is itself a valid v1 header frame advertising `version: 2`,
//! so format detection needs nothing beyond the ordinary header decode.

use crate::error::{Error, Result};
use crate::index::generate_index;
use crate::io::ByteSource;
use crate::options::{IndexCodec, Options};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Size of the v2 pragma in bytes.
pub const PRAGMA_SIZE: usize = 11;
/// Fixed size of the v2 header in bytes.
pub const HEADER_SIZE: usize = 40;
/// Size of the full fixed prefix (pragma then header).
pub const PREFIX_SIZE: u64 = (PRAGMA_SIZE + HEADER_SIZE) as u64;

/// The pragma opening every v2 container: the DAG-CBOR encoding of
/// `{version: 2}` wrapped in a varint frame. Identical for every v2 file.
pub const PRAGMA: [u8; PRAGMA_SIZE] = [
    0x0a, // frame body length (10)
    0xa1, // map(1)
    0x67, // string(7)
    0x76, 0x65, 0x72, 0x73, 0x69, 0x6f, 0x6e, // "version"
    0x02, // uint(2)
];

/// 128-bit bitfield describing properties of a v2 container. Only one bit
/// is assigned so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Characteristics {
    pub hi: u64,
    pub lo: u64,
}

impl Characteristics {
    /// High bit of `hi`: the index catalogs every CID segment, identity
    /// CIDs included.
    const FULLY_INDEXED: u64 = 1 << 63;

    pub fn is_fully_indexed(&self) -> bool {
        self.hi & Self::FULLY_INDEXED != 0
    }

    pub fn set_fully_indexed(&mut self, enabled: bool) {
        if enabled {
            self.hi |= Self::FULLY_INDEXED;
        } else {
            self.hi &= !Self::FULLY_INDEXED;
        }
    }

    pub fn to_le_bytes(self) -> [u8; 16] {
        let mut bytes = [0; 16];
        bytes[0..8].copy_from_slice(&self.hi.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.lo.to_le_bytes());
        bytes
    }

    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        Characteristics {
            hi: u64::from_le_bytes(bytes[0..8].try_into().expect("infallible")),
            lo: u64::from_le_bytes(bytes[8..16].try_into().expect("infallible")),
        }
    }
}

/// The fixed 40-byte header following the pragma. All integers are
/// little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V2Header {
    pub characteristics: Characteristics,
    /// Byte offset from the start of the file to the first byte of the v1
    /// payload.
    pub data_offset: u64,
    /// Byte length of the v1 payload.
    pub data_size: u64,
    /// Byte offset from the start of the file to the index, or 0 when no
    /// index is present.
    pub index_offset: u64,
}

impl V2Header {
    /// Header for an unpadded container holding `data_size` payload bytes,
    /// with the index placed directly after the payload.
    pub fn new(data_size: u64) -> Self {
        V2Header {
            characteristics: Characteristics::default(),
            data_offset: PREFIX_SIZE,
            data_size,
            index_offset: PREFIX_SIZE + data_size,
        }
    }

    /// Shifts the payload (and everything after it) right by `padding`
    /// zero bytes.
    pub fn with_data_padding(mut self, padding: u64) -> Self {
        self.data_offset = PREFIX_SIZE + padding;
        self.index_offset += padding;
        self
    }

    /// Shifts the index right by `padding` zero bytes.
    pub fn with_index_padding(mut self, padding: u64) -> Self {
        self.index_offset += padding;
        self
    }

    /// Marks the container as carrying no index.
    pub fn without_index(mut self) -> Self {
        self.index_offset = 0;
        self
    }

    pub fn has_index(&self) -> bool {
        self.index_offset != 0
    }

    pub fn to_le_bytes(self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0; HEADER_SIZE];
        bytes[0..16].copy_from_slice(&self.characteristics.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.data_offset.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.data_size.to_le_bytes());
        bytes[32..40].copy_from_slice(&self.index_offset.to_le_bytes());
        bytes
    }

    /// Decodes and validates a header. The payload must sit after the
    /// fixed prefix, be non-empty, and any index must sit after the
    /// payload.
    pub fn from_le_bytes(bytes: [u8; HEADER_SIZE]) -> Result<Self> {
        let header = V2Header {
            characteristics: Characteristics::from_le_bytes(
                bytes[0..16].try_into().expect("infallible"),
            ),
            data_offset: u64::from_le_bytes(bytes[16..24].try_into().expect("infallible")),
            data_size: u64::from_le_bytes(bytes[24..32].try_into().expect("infallible")),
            index_offset: u64::from_le_bytes(bytes[32..40].try_into().expect("infallible")),
        };
        header.validate()?;
        Ok(header)
    }

    /// Checks the offset invariants without decoding.
    pub fn validate(&self) -> Result<()> {
        let plausible = self.data_offset >= PREFIX_SIZE
            && self.data_size > 0
            && (self.index_offset == 0
                || self.index_offset >= self.data_offset + self.data_size);
        if !plausible {
            return Err(Error::OffsetImpossible {
                data_offset: self.data_offset,
                data_size: self.data_size,
                index_offset: self.index_offset,
            });
        }
        Ok(())
    }

    pub fn read_from(mut reader: impl Read) -> Result<Self> {
        let mut bytes = [0; HEADER_SIZE];
        reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::TruncatedHeader,
            _ => Error::Io(e),
        })?;
        Self::from_le_bytes(bytes)
    }

    pub fn write_to(&self, mut writer: impl Write) -> io::Result<()> {
        writer.write_all(&self.to_le_bytes())
    }
}

/// Wraps an existing v1 payload into a v2 container, generating an index.
///
/// The source is scanned once to size it and collect index records, then
/// rewound and copied verbatim. Returns the total bytes written.
pub fn wrap_v1<R, W>(mut source: R, mut sink: W, options: &Options) -> Result<u64>
where
    R: ByteSource + Seek,
    W: Write,
{
    options.check_cancelled()?;
    let index = match options.index_codec {
        IndexCodec::None => None,
        _ => Some(generate_index(&mut source, options)?),
    };
    let data_size = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;

    let mut header = V2Header::new(data_size)
        .with_data_padding(options.data_padding)
        .with_index_padding(options.index_padding);
    if index.is_none() {
        header = header.without_index();
    }

    let mut written = 0u64;
    sink.write_all(&PRAGMA)?;
    header.write_to(&mut sink)?;
    written += PREFIX_SIZE;
    written += write_zeroes(&mut sink, options.data_padding)?;
    options.check_cancelled()?;
    written += io::copy(&mut source, &mut sink)?;
    if let Some(index) = index {
        written += write_zeroes(&mut sink, options.index_padding)?;
        written += index.write_to(&mut sink)?;
    }
    Ok(written)
}

pub(crate) fn write_zeroes(mut writer: impl Write, count: u64) -> io::Result<u64> {
    io::copy(&mut io::repeat(0).take(count), &mut writer)
}

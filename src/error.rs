// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use std::io;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by readers, writers, stores and indexes.
///
/// Variants carry enough structure to react to a failure programmatically;
/// the rendered message is for humans. The library never logs or prints on
/// its own.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid car version: {0}")]
    UnsupportedVersion(u64),

    #[error("header length {got} exceeds maximum allowed {max}")]
    HeaderTooLarge { got: u64, max: u64 },

    #[error("section length {got} exceeds maximum allowed {max}")]
    SectionTooLarge { got: u64, max: u64 },

    #[error("truncated header")]
    TruncatedHeader,

    #[error("truncated section")]
    TruncatedSection,

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("malformed section: {0}")]
    MalformedSection(String),

    #[error("malformed index: {0}")]
    MalformedIndex(String),

    #[error("mismatch in content integrity, expected: {expected}, got: {computed}")]
    IntegrityMismatch { expected: Cid, computed: Cid },

    #[error("cid of {size} bytes exceeds maximum index cid size of {max} bytes")]
    CidTooLarge { size: u64, max: u64 },

    #[error("payload size mismatch, expected: {expected}, written: {written}")]
    SizeMismatch { expected: u64, written: u64 },

    #[error(
        "impossible offsets: data_offset {data_offset}, data_size {data_size}, index_offset {index_offset}"
    )]
    OffsetImpossible {
        data_offset: u64,
        data_size: u64,
        index_offset: u64,
    },

    #[error("cid not found in index")]
    NotFound,

    #[error("file has no embedded index")]
    MissingIndex,

    #[error("unsupported multihash code: {0:#x}")]
    UnsupportedMultihash(u64),

    #[error("traversal link budget of {limit} exceeded")]
    LinkBudgetExceeded { limit: u64 },

    #[error("unsupported operation")]
    Unsupported,

    #[error("write-only store; unsupported operation")]
    WriteOnly,

    #[error("read-only store; unsupported operation")]
    ReadOnly,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid cid: {0}")]
    Cid(#[from] cid::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True for the variants that mean "the input ended before a complete
    /// structure was read".
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            Error::TruncatedHeader | Error::TruncatedSection | Error::UnexpectedEof
        )
    }
}

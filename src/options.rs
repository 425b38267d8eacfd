// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::error::{Error, Result};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Default maximum length accepted for a header frame.
pub const DEFAULT_MAX_ALLOWED_HEADER_SIZE: u64 = 32 << 20; // 32 MiB
/// Default maximum length accepted for a block section frame.
pub const DEFAULT_MAX_ALLOWED_SECTION_SIZE: u64 = 8 << 20; // 8 MiB
/// Default maximum serialized CID length indexable by a store.
pub const DEFAULT_MAX_INDEX_CID_SIZE: u64 = 2 << 10; // 2 KiB

/// The index format written when a container is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexCodec {
    /// Width-grouped records keyed by the full multihash bytes.
    Sorted,
    /// Records grouped by multihash algorithm, keyed by bare digests.
    #[default]
    MultihashSorted,
    /// Skip writing an index altogether.
    None,
}

impl IndexCodec {
    /// The multicodec tag identifying this index format on disk, if any.
    pub fn multicodec(self) -> Option<u64> {
        match self {
            IndexCodec::Sorted => Some(crate::index::CODEC_SORTED),
            IndexCodec::MultihashSorted => Some(crate::index::CODEC_MULTIHASH_SORTED),
            IndexCodec::None => None,
        }
    }
}

/// Cooperative cancellation signal checked at I/O boundaries.
///
/// Cloning shares the flag. A cancelled operation leaves any file it was
/// writing unfinalized; the caller is expected to discard it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-call configuration for readers, writers and stores.
///
/// There is no process-wide state: limits and behavior toggles all live
/// here. The setters are chainable so call sites read like the option lists
/// they replace.
#[derive(Debug, Clone)]
pub struct Options {
    /// Zero bytes inserted between the fixed header and the data payload.
    pub data_padding: u64,
    /// Zero bytes inserted between the data payload and the index.
    pub index_padding: u64,
    /// Index format appended on finalize.
    pub index_codec: IndexCodec,
    /// Treat a zero-length section as a clean end of the payload.
    pub zero_length_section_as_eof: bool,
    /// Upper bound on the serialized CID length a store will index.
    pub max_index_cid_size: u64,
    /// Write and index blocks whose CID carries an identity multihash.
    pub store_identity_cids: bool,
    /// Permit writing the same block more than once.
    pub blockstore_allow_duplicate_puts: bool,
    /// Deduplicate by whole CID rather than by multihash digest.
    pub blockstore_use_whole_cids: bool,
    /// Build a full index by scanning when a file carries none.
    pub generate_missing_index: bool,
    /// Accept a `{version: 1}` header that has no `roots` key at all.
    /// Some historical producers emitted such headers.
    pub allow_headers_without_roots: bool,
    /// Abort a traversal after this many link visits.
    pub max_traversal_links: u64,
    /// Upper bound on the header frame length.
    pub max_allowed_header_size: u64,
    /// Upper bound on any section frame length.
    pub max_allowed_section_size: u64,
    /// Skip hash verification of block payloads.
    pub trusted: bool,
    /// Known data payload size for a selective write, zero when unknown.
    /// When set, the sizing pass is skipped and a disagreement with the
    /// bytes actually produced is an error.
    pub data_payload_size: u64,
    /// Cooperative cancellation, checked at I/O boundaries.
    pub cancel: CancelToken,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            data_padding: 0,
            index_padding: 0,
            index_codec: IndexCodec::MultihashSorted,
            zero_length_section_as_eof: false,
            max_index_cid_size: DEFAULT_MAX_INDEX_CID_SIZE,
            store_identity_cids: false,
            blockstore_allow_duplicate_puts: false,
            blockstore_use_whole_cids: true,
            generate_missing_index: true,
            allow_headers_without_roots: false,
            max_traversal_links: u64::MAX,
            max_allowed_header_size: DEFAULT_MAX_ALLOWED_HEADER_SIZE,
            max_allowed_section_size: DEFAULT_MAX_ALLOWED_SECTION_SIZE,
            trusted: false,
            data_payload_size: 0,
            cancel: CancelToken::default(),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_padding(mut self, padding: u64) -> Self {
        self.data_padding = padding;
        self
    }

    pub fn with_index_padding(mut self, padding: u64) -> Self {
        self.index_padding = padding;
        self
    }

    pub fn with_index_codec(mut self, codec: IndexCodec) -> Self {
        self.index_codec = codec;
        self
    }

    pub fn with_zero_length_section_as_eof(mut self, enable: bool) -> Self {
        self.zero_length_section_as_eof = enable;
        self
    }

    pub fn with_max_index_cid_size(mut self, max: u64) -> Self {
        self.max_index_cid_size = max;
        self
    }

    pub fn with_store_identity_cids(mut self, enable: bool) -> Self {
        self.store_identity_cids = enable;
        self
    }

    pub fn with_blockstore_allow_duplicate_puts(mut self, enable: bool) -> Self {
        self.blockstore_allow_duplicate_puts = enable;
        self
    }

    pub fn with_blockstore_use_whole_cids(mut self, enable: bool) -> Self {
        self.blockstore_use_whole_cids = enable;
        self
    }

    pub fn with_generate_missing_index(mut self, enable: bool) -> Self {
        self.generate_missing_index = enable;
        self
    }

    pub fn with_allow_headers_without_roots(mut self, enable: bool) -> Self {
        self.allow_headers_without_roots = enable;
        self
    }

    pub fn with_max_traversal_links(mut self, max: u64) -> Self {
        self.max_traversal_links = max;
        self
    }

    pub fn with_max_allowed_header_size(mut self, max: u64) -> Self {
        self.max_allowed_header_size = max;
        self
    }

    pub fn with_max_allowed_section_size(mut self, max: u64) -> Self {
        self.max_allowed_section_size = max;
        self
    }

    pub fn with_trusted(mut self, trusted: bool) -> Self {
        self.trusted = trusted;
        self
    }

    pub fn with_data_payload_size(mut self, size: u64) -> Self {
        self.data_payload_size = size;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bails out with [`Error::Cancelled`] once the token has fired.
    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Content-Addressable aRchives (CAR), versions 1 and 2.
//!
//! A CAR file packs a set of IPLD blocks — opaque payloads keyed by
//! [`Cid`] — behind a small header naming the root CIDs of the DAGs the
//! blocks form. A v1 file is the header followed by length-prefixed
//! sections; a v2 file wraps a v1 payload in a fixed prefix and may
//! append an index mapping multihashes to payload offsets for random
//! access.
//!
//! What lives where:
//!
//! - [`BlockReader`] iterates either format from any byte stream,
//!   verifying payload hashes unless told the source is trusted.
//! - [`Reader`] gives random access over a mapped file, plus
//!   [`Reader::inspect`] for validation and statistics.
//! - [`blockstore`] has the stores: write-only streaming, read-write
//!   with deferred index, and read-only over finished files.
//! - [`index`] holds the on-disk index formats and generation.
//! - [`SelectiveWriter`] streams the blocks a selector walk visits,
//!   deterministically, and can resume mid-stream; the collaborator
//!   contracts it is driven by live in [`traversal`].
//!
//! Every behavior toggle and size limit is a per-call [`Options`] value;
//! there is no process-wide configuration.

pub mod blockstore;
pub mod index;
pub mod multihash;
pub mod traversal;

mod block;
mod block_reader;
mod error;
mod io;
mod options;
mod reader;
mod selective;
mod v1;
mod v2;
mod varint_frame;

pub use block::Block;
pub use block_reader::{load_car, BlockReader, SectionInfo};
pub use cid::Cid;
pub use error::{Error, Result};
pub use io::{ByteSource, Mmap, PayloadReader, SeekSource, StreamSource};
pub use options::{
    CancelToken, IndexCodec, Options, DEFAULT_MAX_ALLOWED_HEADER_SIZE,
    DEFAULT_MAX_ALLOWED_SECTION_SIZE, DEFAULT_MAX_INDEX_CID_SIZE,
};
pub use reader::{open_reader, Reader, Stats};
pub use selective::{ResumePoint, SelectiveWriter};
pub use v1::V1Header;
pub use v2::{wrap_v1, Characteristics, V2Header, PRAGMA};

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Deterministic selective archives: walk a DAG under a selector engine
//! and stream out exactly the blocks the walk visits, in visit order,
//! each written once.
//!
//! Construction runs a sizing pass (unless the payload size is already
//! known), so the fixed v2 header can be emitted before any payload —
//! streaming consumers get correct offsets up front. The same walk can
//! then be replayed from an arbitrary byte offset or path, emitting only
//! the suffix; see [`crate::traversal::resume`] for the replay rules.

use crate::error::{Error, Result};
use crate::index::{Index, Record};
use crate::io::CountWrite;
use crate::options::{IndexCodec, Options};
use crate::traversal::resume::{BlockSink, CountingSink, Replay, ResumingVisitor};
use crate::traversal::{LinkSystem, Path, PathTree, SelectorWalk};
use crate::v1::V1Header;
use crate::v2::{self, write_zeroes, V2Header};
use crate::varint_frame::encode_frame;
use cid::Cid;
use std::io::Write;
use tracing::{debug, instrument};

/// Where to (re)start the payload stream.
#[derive(Debug, Clone)]
pub enum ResumePoint {
    /// The whole payload, header first.
    Start,
    /// Only the bytes from this payload offset on.
    Offset(u64),
    /// Only the blocks from this traversal path on.
    Path(Path),
}

/// Streams the blocks a selector walk visits as a v1 payload or a full
/// v2 container.
///
/// Two runs over the same link system, root and engine produce identical
/// bytes; the path tree built on the first pass is shared with every
/// later pass so rewinds can prune instead of re-reading.
pub struct SelectiveWriter<L, S> {
    link_system: L,
    walker: S,
    root: Cid,
    options: Options,
    tree: PathTree,
    /// v1 payload length, header frame included.
    data_size: u64,
    /// Counter position after the most recent pass.
    last_position: u64,
}

impl<L: LinkSystem, S: SelectorWalk> SelectiveWriter<L, S> {
    /// Prepares a writer for the DAG under `root`. Unless
    /// [`Options::data_payload_size`] supplies the payload size, a sizing
    /// pass walks the selector once without emitting anything.
    #[instrument(level = "debug", skip(link_system, walker, options))]
    pub fn new(link_system: L, walker: S, root: Cid, options: Options) -> Result<Self> {
        let mut writer = SelectiveWriter {
            link_system,
            walker,
            root,
            data_size: options.data_payload_size,
            options,
            tree: PathTree::new(),
            last_position: 0,
        };
        if writer.data_size == 0 {
            writer.data_size = writer.run_pass(Replay::None, &mut CountingSink)?;
            debug!(data_size = writer.data_size, "sized traversal");
        }
        Ok(writer)
    }

    /// Exact length of the v1 payload this writer produces.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    fn header(&self) -> V1Header {
        V1Header::new(vec![self.root])
    }

    fn run_pass(&mut self, replay: Replay, sink: &mut impl BlockSink) -> Result<u64> {
        let header_len = self.header().encoded_len()?;
        let root = self.root;
        let mut visitor = ResumingVisitor {
            base: &mut self.link_system,
            sink,
            tree: &mut self.tree,
            seen: ahash::HashSet::default(),
            counter: header_len,
            pending_block_start: self.last_position.max(header_len),
            replay,
            links_visited: 0,
            options: &self.options,
        };
        self.walker.walk(&root, &mut visitor)?;
        let end = visitor.counter;
        self.last_position = end;
        Ok(end)
    }

    fn check_size(&self, produced: u64) -> Result<()> {
        if self.data_size != 0 && produced != self.data_size {
            return Err(Error::SizeMismatch {
                expected: self.data_size,
                written: produced,
            });
        }
        Ok(())
    }

    /// Streams the v1 payload from `from` onward into `writer`, returning
    /// the bytes written. [`ResumePoint::Start`] emits the whole payload;
    /// an offset emits exactly the suffix a full run would have produced
    /// from that byte; a path emits from that block's frame on.
    pub fn write_v1(&mut self, from: ResumePoint, writer: impl Write) -> Result<u64> {
        let (written, _) = self.write_v1_inner(from, writer)?;
        Ok(written)
    }

    fn write_v1_inner(
        &mut self,
        from: ResumePoint,
        writer: impl Write,
    ) -> Result<(u64, Vec<Record>)> {
        self.options.check_cancelled()?;
        let mut header_frame = vec![];
        self.header().write_to(&mut header_frame)?;
        let header_len = header_frame.len() as u64;

        let mut counted = CountWrite::new(writer);
        let (replay, to_skip) = match from {
            ResumePoint::Start => {
                counted.write_all(&header_frame)?;
                (Replay::None, 0)
            }
            ResumePoint::Offset(k) if k < header_len => {
                counted.write_all(&header_frame[k as usize..])?;
                (Replay::Offset(k), 0)
            }
            ResumePoint::Offset(k) => (Replay::Offset(k), k - header_len),
            ResumePoint::Path(path) => (Replay::Path(path), 0),
        };

        let mut sink = TeeSink {
            out: &mut counted,
            to_skip,
            records: vec![],
        };
        let produced = self.run_pass(replay, &mut sink)?;
        let records = sink.records;
        self.check_size(produced)?;
        counted.flush()?;
        Ok((counted.bytes_written(), records))
    }

    /// Streams a complete v2 container: pragma, header, padding, the v1
    /// payload, and the index (per the configured codec). Returns the
    /// bytes written.
    #[instrument(level = "debug", skip_all)]
    pub fn write_to(&mut self, writer: impl Write) -> Result<u64> {
        self.options.check_cancelled()?;
        let mut counted = CountWrite::new(writer);

        let mut header = V2Header::new(self.data_size)
            .with_data_padding(self.options.data_padding)
            .with_index_padding(self.options.index_padding);
        header
            .characteristics
            .set_fully_indexed(self.options.store_identity_cids);
        if self.options.index_codec == IndexCodec::None {
            header = header.without_index();
        }
        counted.write_all(&v2::PRAGMA)?;
        header.write_to(&mut counted)?;
        write_zeroes(&mut counted, self.options.data_padding)?;

        let (_, records) = self.write_v1_inner(ResumePoint::Start, &mut counted)?;

        if let Some(index) = Index::from_records(self.options.index_codec, records) {
            write_zeroes(&mut counted, self.options.index_padding)?;
            index.write_to(&mut counted)?;
        }
        counted.flush()?;
        Ok(counted.bytes_written())
    }

    /// Writes a complete v2 container to a file.
    pub fn write_to_path(&mut self, path: impl AsRef<std::path::Path>) -> Result<u64> {
        let mut file = std::fs::File::create(path)?;
        let written = self.write_to(&mut file)?;
        file.sync_all()?;
        Ok(written)
    }
}

/// Emits flowing frames, trimming the prefix that precedes a byte-offset
/// resume point, and collects index records as it goes.
struct TeeSink<'a, W> {
    out: &'a mut W,
    to_skip: u64,
    records: Vec<Record>,
}

impl<W: Write> BlockSink for TeeSink<'_, W> {
    fn write_block(&mut self, cid: &Cid, data: &[u8], frame_start: u64) -> Result<()> {
        self.records.push(Record {
            cid: *cid,
            offset: frame_start,
        });
        let frame = encode_frame(&[&cid.to_bytes(), data]);
        if self.to_skip >= frame.len() as u64 {
            self.to_skip -= frame.len() as u64;
            return Ok(());
        }
        let trim = std::mem::take(&mut self.to_skip) as usize;
        self.out.write_all(&frame[trim..])?;
        Ok(())
    }

    fn note_skipped(&mut self, bytes: u64) {
        self.to_skip = self.to_skip.saturating_sub(bytes);
    }
}

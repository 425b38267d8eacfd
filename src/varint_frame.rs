// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! # Varint frames
//!
//! CARs are made of concatenations of _varint frames_. Each varint frame is
//! a concatenation of the _body length_ as an unsigned varint, and the
//! _frame body_ itself.
//!
//! ```text
//!        varint frame
//! │◄───────────────────────►│
//! │                         │
//! ├───────────┬─────────────┤
//! │varint:    │             │
//! │body length│frame body   │
//! └───────────┼─────────────┤
//!             │             │
//! frame body ►│◄───────────►│
//!     offset     =body length
//! ```
//!
//! The first frame of a payload is a header frame; subsequent frames are
//! block frames whose body is a CID followed by the block data.

use crate::error::{Error, Result};
use integer_encoding::VarInt;
use std::io::{self, Read, Write};

/// Reads a frame body length, leaving the reader at the start of the body,
/// or returns [`Ok(None)`] if the input ends cleanly at a frame boundary.
///
/// ```text
/// start ►│
///        ├───────────┬─────────────┐
///        │varint:    │             │
///        │body length│frame body   │
///        └───────────┼─────────────┘
///        reader end ►│
/// ```
pub fn read_frame_length_or_eof(mut reader: impl Read) -> Result<Option<u64>> {
    use unsigned_varint::io::{
        read_u64,
        ReadError::{Decode, Io},
    };

    let mut byte = [0u8; 1]; // detect EOF
    match reader.read(&mut byte)? {
        0 => Ok(None),
        1 => match read_u64(byte.chain(reader)) {
            Ok(length) => Ok(Some(length)),
            // bytes of the length were consumed, so a short read here is not
            // a clean end of input
            Err(Io(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::UnexpectedEof),
            Err(Io(e)) => Err(e.into()),
            Err(Decode(e)) => Err(Error::MalformedSection(e.to_string())),
            Err(other) => Err(Error::MalformedSection(other.to_string())),
        },
        _ => unreachable!(),
    }
}

/// Total encoded size of a frame with a `body_len`-byte body.
pub fn frame_encoded_len(body_len: u64) -> u64 {
    body_len.required_space() as u64 + body_len
}

/// Writes the given parts as one varint frame (length, then each part).
///
/// A block frame concatenates the bytes of a CID and the block data:
/// `write_frame(w, &[&cid.to_bytes(), data])`.
pub fn write_frame(mut writer: impl Write, parts: &[&[u8]]) -> io::Result<u64> {
    let body_len: u64 = parts.iter().map(|part| part.len() as u64).sum();
    let head = body_len.encode_var_vec();
    writer.write_all(&head)?;
    for part in parts {
        writer.write_all(part)?;
    }
    Ok(head.len() as u64 + body_len)
}

/// Builds the frame in memory instead of writing it out.
pub fn encode_frame(parts: &[&[u8]]) -> Vec<u8> {
    let body_len: u64 = parts.iter().map(|part| part.len() as u64).sum();
    let mut out = body_len.encode_var_vec();
    out.reserve(body_len as usize);
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

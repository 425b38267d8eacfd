// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! # CARv1 layout
//!
//! The first varint frame is a _header frame_, where the frame body is a
//! [`V1Header`] encoded as DAG-CBOR (`{roots: [&Any], version: Int}`).
//!
//! Subsequent varint frames are _block frames_, where the frame body is a
//! concatenation of a [`Cid`] and the _block data_ addressed by that CID.
//!
//! ```text
//! block frame ►│
//! body offset  │
//!              │  =body length
//!              │◄────────────►│
//!  ┌───────────┼───┬──────────┤
//!  │body length│cid│block data│
//!  └───────────┴───┼──────────┤
//!                  │◄────────►│
//!                  │  =block data length
//!      block data  │
//!          offset ►│
//! ```

use crate::error::{Error, Result};
use crate::options::Options;
use crate::varint_frame::{frame_encoded_len, read_frame_length_or_eof, write_frame};
use cid::Cid;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// The `{roots, version}` header opening every v1 payload.
///
/// The same shape, with `version == 2` and no roots, doubles as the fixed
/// pragma opening a v2 container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct V1Header {
    // The roots array should contain one or more CIDs, each of which should
    // be present somewhere in the remainder of the payload.
    // See <https://ipld.io/specs/transport/car/carv1/#constraints>
    pub roots: Vec<Cid>,
    pub version: u64,
}

/// Relaxed decode shape: `roots` is optional so the `{version: 2}` pragma
/// parses, and so the missing-roots policy can be applied afterwards.
#[derive(Debug, Deserialize)]
struct HeaderRepr {
    #[serde(default)]
    roots: Option<Vec<Cid>>,
    version: u64,
}

impl V1Header {
    pub fn new(roots: Vec<Cid>) -> Self {
        V1Header { roots, version: 1 }
    }

    /// Reads and validates a header frame.
    ///
    /// `version` must be 1 (a real v1 header, `roots` required unless
    /// [`Options::allow_headers_without_roots`] is set; an empty list is
    /// always accepted) or 2 (the pragma, where `roots` must be absent or
    /// empty). Any other version fails with
    /// [`Error::UnsupportedVersion`].
    pub fn read_from(reader: impl Read, options: &Options) -> Result<Self> {
        let body = read_header_frame(reader, options.max_allowed_header_size)?;
        Self::decode(&body, options)
    }

    fn decode(body: &[u8], options: &Options) -> Result<Self> {
        let repr: HeaderRepr = serde_ipld_dagcbor::from_slice(body)
            .map_err(|e| Error::MalformedHeader(e.to_string()))?;
        match repr.version {
            1 => {
                let roots = match repr.roots {
                    Some(roots) => roots,
                    None if options.allow_headers_without_roots => vec![],
                    None => return Err(Error::MalformedHeader("no roots".into())),
                };
                Ok(V1Header { roots, version: 1 })
            }
            2 => match repr.roots {
                None => Ok(V1Header {
                    roots: vec![],
                    version: 2,
                }),
                Some(roots) if roots.is_empty() => Ok(V1Header {
                    roots,
                    version: 2,
                }),
                Some(_) => Err(Error::MalformedHeader(
                    "version 2 pragma must not carry roots".into(),
                )),
            },
            other => Err(Error::UnsupportedVersion(other)),
        }
    }

    /// Serializes the header as one varint frame, returning the bytes
    /// written.
    pub fn write_to(&self, writer: impl Write) -> Result<u64> {
        let body = self.to_bytes()?;
        Ok(write_frame(writer, &[&body])?)
    }

    /// Length of the header frame [`Self::write_to`] produces.
    pub fn encoded_len(&self) -> Result<u64> {
        Ok(frame_encoded_len(self.to_bytes()?.len() as u64))
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| Error::Io(io::Error::other(e)))
    }

    /// Checks whether two headers match: same version, and the same root
    /// CIDs in any order.
    pub fn matches(&self, other: &V1Header) -> bool {
        if self.version != other.version || self.roots.len() != other.roots.len() {
            return false;
        }
        // Headers with a single root are popular.
        if let ([a], [b]) = (self.roots.as_slice(), other.roots.as_slice()) {
            return a == b;
        }
        self.roots.iter().all(|root| other.roots.contains(root))
    }
}

/// Reads a header frame body, enforcing `max_allowed_header_size` before
/// the body is buffered.
fn read_header_frame(mut reader: impl Read, max_allowed_header_size: u64) -> Result<Vec<u8>> {
    let length = match read_frame_length_or_eof(&mut reader) {
        Ok(Some(length)) => length,
        Ok(None) | Err(Error::UnexpectedEof) => return Err(Error::TruncatedHeader),
        Err(Error::MalformedSection(reason)) => return Err(Error::MalformedHeader(reason)),
        Err(other) => return Err(other),
    };
    if length > max_allowed_header_size {
        return Err(Error::HeaderTooLarge {
            got: length,
            max: max_allowed_header_size,
        });
    }
    let mut body = vec![0; usize::try_from(length).map_err(|_| Error::TruncatedHeader)?];
    reader.read_exact(&mut body).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::TruncatedHeader,
        _ => Error::Io(e),
    })?;
    Ok(body)
}

/// Reads only the `version` field of the opening header frame; used to
/// detect the container format before committing to a decode path.
pub fn read_version(reader: impl Read, max_allowed_header_size: u64) -> Result<u64> {
    let body = read_header_frame(reader, max_allowed_header_size)?;
    let repr: HeaderRepr = serde_ipld_dagcbor::from_slice(&body)
        .map_err(|e| Error::MalformedHeader(e.to_string()))?;
    Ok(repr.version)
}

/// Reads a section length, applying the zero-length and maximum-size
/// policies. `Ok(None)` means a clean end of the payload.
pub fn read_section_length(
    reader: impl Read,
    zero_length_section_as_eof: bool,
    max_allowed_section_size: u64,
) -> Result<Option<u64>> {
    let Some(length) = read_frame_length_or_eof(reader)? else {
        return Ok(None);
    };
    if length == 0 {
        if zero_length_section_as_eof {
            return Ok(None);
        }
        return Err(Error::MalformedSection("zero-length section".into()));
    }
    if length > max_allowed_section_size {
        return Err(Error::SectionTooLarge {
            got: length,
            max: max_allowed_section_size,
        });
    }
    Ok(Some(length))
}

/// Reads one block section, returning its CID and block data, or
/// `Ok(None)` at a clean end of the payload.
pub fn read_section(
    mut reader: impl Read,
    zero_length_section_as_eof: bool,
    max_allowed_section_size: u64,
) -> Result<Option<(Cid, Vec<u8>)>> {
    let Some(length) = read_section_length(
        &mut reader,
        zero_length_section_as_eof,
        max_allowed_section_size,
    )?
    else {
        return Ok(None);
    };
    let mut body = vec![0; usize::try_from(length).map_err(|_| Error::TruncatedSection)?];
    reader.read_exact(&mut body).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => Error::TruncatedSection,
        _ => Error::Io(e),
    })?;
    let (cid, cid_len) = read_cid_prefix(&body)?;
    body.drain(..cid_len);
    Ok(Some((cid, body)))
}

/// Writes one block section as a varint frame.
pub fn write_section(writer: impl Write, cid: &Cid, data: &[u8]) -> io::Result<u64> {
    write_frame(writer, &[&cid.to_bytes(), data])
}

/// Parses the CID opening a section body, returning it with its encoded
/// length.
pub fn read_cid_prefix(body: &[u8]) -> Result<(Cid, usize)> {
    let mut cursor = io::Cursor::new(body);
    let cid = Cid::read_bytes(&mut cursor).map_err(|e| match e {
        cid::Error::Io(io_error) if io_error.kind() == io::ErrorKind::UnexpectedEof => {
            Error::TruncatedSection
        }
        other => Error::Cid(other),
    })?;
    Ok((cid, cursor.position() as usize))
}

// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Small I/O capabilities the codecs are generic over.
//!
//! Streaming iteration only needs [`std::io::Read`]; skipping over payloads
//! benefits from a seek when the source has one. [`ByteSource`] captures
//! exactly that: a readable source with a `skip_bytes` operation that
//! defaults to discarding and is overridden with a seek where possible.
//! Random access goes through [`positioned_io::ReadAt`] instead, with
//! [`Mmap`] as the common file-backed implementation.

use positioned_io::{ReadAt, Size};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// A readable byte source that can advance past bytes without keeping them.
pub trait ByteSource: Read {
    /// Advances exactly `n` bytes. The default implementation reads and
    /// discards; seekable sources override it.
    fn skip_bytes(&mut self, mut n: u64) -> io::Result<()> {
        let mut scratch = [0u8; 8192];
        while n > 0 {
            let want = scratch.len().min(usize::try_from(n).unwrap_or(usize::MAX));
            let read = self.read(&mut scratch[..want])?;
            if read == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            n -= read as u64;
        }
        Ok(())
    }
}

impl<T: AsRef<[u8]>> ByteSource for io::Cursor<T> {
    fn skip_bytes(&mut self, n: u64) -> io::Result<()> {
        let pos = self.position().saturating_add(n);
        if pos > self.get_ref().as_ref().len() as u64 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        self.set_position(pos);
        Ok(())
    }
}

impl ByteSource for File {
    fn skip_bytes(&mut self, n: u64) -> io::Result<()> {
        self.seek(SeekFrom::Current(i64::try_from(n).map_err(io::Error::other)?))?;
        Ok(())
    }
}

impl<B: ByteSource + ?Sized> ByteSource for &mut B {
    fn skip_bytes(&mut self, n: u64) -> io::Result<()> {
        (**self).skip_bytes(n)
    }
}

impl<B: ByteSource + ?Sized> ByteSource for Box<B> {
    fn skip_bytes(&mut self, n: u64) -> io::Result<()> {
        (**self).skip_bytes(n)
    }
}

/// Grants the seek-based `skip_bytes` to any `Read + Seek` value.
pub struct SeekSource<R>(pub R);

impl<R: Read> Read for SeekSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Seek> ByteSource for SeekSource<R> {
    fn skip_bytes(&mut self, n: u64) -> io::Result<()> {
        self.0
            .seek(SeekFrom::Current(i64::try_from(n).map_err(io::Error::other)?))?;
        Ok(())
    }
}

/// Reads from streams that cannot seek; `skip_bytes` discards.
pub struct StreamSource<R>(pub R);

impl<R: Read> Read for StreamSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> ByteSource for StreamSource<R> {}

/// A reader that keeps track of how many bytes it has read.
///
/// This is useful for calculating the _block data length_ when the
/// (_varint frame_) _body length_ is known.
pub struct CountRead<ReadT> {
    inner: ReadT,
    count: usize,
}

impl<ReadT> CountRead<ReadT> {
    pub fn new(inner: ReadT) -> Self {
        Self { inner, count: 0 }
    }
    pub fn bytes_read(&self) -> usize {
        self.count
    }
}

impl<ReadT> Read for CountRead<ReadT>
where
    ReadT: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n;
        Ok(n)
    }
}

/// A writer that keeps track of how many bytes it has written.
pub struct CountWrite<WriteT> {
    inner: WriteT,
    count: u64,
}

impl<WriteT> CountWrite<WriteT> {
    pub fn new(inner: WriteT) -> Self {
        Self { inner, count: 0 }
    }
    pub fn bytes_written(&self) -> u64 {
        self.count
    }
}

impl<WriteT> Write for CountWrite<WriteT>
where
    WriteT: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Wrapper type of [`memmap2::Mmap`] that implements [`ReadAt`] and [`Size`].
pub struct Mmap(memmap2::Mmap);

impl Mmap {
    pub fn map(file: &File) -> io::Result<Self> {
        Ok(Self(unsafe { memmap2::Mmap::map(file)? }))
    }
}

impl ReadAt for Mmap {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = pos as usize;
        if start >= self.0.len() {
            return Ok(0);
        }
        let end = start + buf.len();
        if end <= self.0.len() {
            buf.copy_from_slice(&self.0[start..end]);
            Ok(buf.len())
        } else {
            let len = self.0.len() - start;
            buf[..len].copy_from_slice(&self.0[start..]);
            Ok(len)
        }
    }
}

impl Size for Mmap {
    fn size(&self) -> io::Result<Option<u64>> {
        Ok(Some(self.0.len() as _))
    }
}

/// A bounded window over a [`ReadAt`] backing, readable and seekable.
///
/// The interface version of a section reader: reads clamp to the window,
/// seeks are relative to the window start.
pub struct PayloadReader<'a, R> {
    inner: &'a R,
    start: u64,
    len: u64,
    pos: u64,
}

impl<'a, R: ReadAt> PayloadReader<'a, R> {
    pub fn new(inner: &'a R, start: u64, len: u64) -> Self {
        PayloadReader {
            inner,
            start,
            len,
            pos: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<R: ReadAt> Read for PayloadReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len {
            return Ok(0);
        }
        let available = usize::try_from(self.len - self.pos).unwrap_or(usize::MAX);
        let want = buf.len().min(available);
        let n = self.inner.read_at(self.start + self.pos, &mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: ReadAt> Seek for PayloadReader<'_, R> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let next = match target {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.len) + i128::from(delta),
        };
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of payload",
            ));
        }
        self.pos = u64::try_from(next).map_err(io::Error::other)?;
        Ok(self.pos)
    }
}

impl<R: ReadAt> ReadAt for PayloadReader<'_, R> {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        if pos >= self.len {
            return Ok(0);
        }
        let available = usize::try_from(self.len - pos).unwrap_or(usize::MAX);
        let want = buf.len().min(available);
        self.inner.read_at(self.start + pos, &mut buf[..want])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_reader_clamps_to_window() {
        let bytes = (0u8..32).collect::<Vec<_>>();
        let mut window = PayloadReader::new(&bytes, 4, 8);
        let mut out = vec![];
        window.read_to_end(&mut out).unwrap();
        assert_eq!(out, (4u8..12).collect::<Vec<_>>());

        window.seek(SeekFrom::Start(6)).unwrap();
        let mut tail = vec![];
        window.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, vec![10, 11]);

        window.seek(SeekFrom::End(-1)).unwrap();
        let mut last = [0u8; 4];
        assert_eq!(window.read(&mut last).unwrap(), 1);
        assert_eq!(last[0], 11);
    }

    #[test]
    fn cursor_skip_stops_at_end() {
        let mut cursor = io::Cursor::new([0u8; 4]);
        cursor.skip_bytes(4).unwrap();
        assert!(cursor.skip_bytes(1).is_err());
    }
}

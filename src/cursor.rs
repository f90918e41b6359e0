//! Byte-stream cursor shared by the scanner, classifier and decoders.
//!
//! The cursor is the only mutable resource of an extraction run.  Reads move
//! strictly forward; the one backward motion the format needs ("undo" a
//! lookahead so the next classification cycle sees a marker or a data byte
//! again) goes through [`TapeCursor::reposition`], which is bounds-checked
//! against the stream length.
//!
//! Exhaustion is not an error at this layer: byte reads return `None` and
//! bulk reads return short buffers, and each caller decides whether a short
//! read is a clean end, a truncation, or a fatal condition.

use std::io::{self, BufReader, Read, Seek, SeekFrom};

use byteorder::{ByteOrder, LittleEndian};

pub struct TapeCursor<R: Read + Seek> {
    reader: BufReader<R>,
    pos:    u64,
    len:    u64,
}

impl<R: Read + Seek> TapeCursor<R> {
    /// Wrap `reader`, measuring its length and rewinding to offset 0.
    pub fn new(mut reader: R) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;
        Ok(Self { reader: BufReader::new(reader), pos: 0, len })
    }

    #[inline]
    pub fn position(&self) -> u64 { self.pos }

    #[inline]
    pub fn len(&self) -> u64 { self.len }

    #[inline]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    #[inline]
    pub fn is_at_end(&self) -> bool { self.pos >= self.len }

    /// Bytes left between the current position and the end of the stream.
    #[inline]
    pub fn remaining(&self) -> u64 { self.len.saturating_sub(self.pos) }

    /// Read one byte, or `None` once the stream is exhausted.
    pub fn read_u8(&mut self) -> io::Result<Option<u8>> {
        let mut b = [0u8; 1];
        loop {
            match self.reader.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.pos += 1;
                    return Ok(Some(b[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read up to `n` bytes.  A result shorter than `n` means the stream
    /// ended first.
    pub fn read_up_to(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n.min(self.remaining() as usize));
        let got = (&mut self.reader).take(n as u64).read_to_end(&mut out)?;
        self.pos += got as u64;
        Ok(out)
    }

    /// Read exactly `N` bytes, or `None` if the stream ends first.  On a
    /// short read the bytes that were available are still consumed.
    pub fn read_array<const N: usize>(&mut self) -> io::Result<Option<[u8; N]>> {
        let bytes = self.read_up_to(N)?;
        if bytes.len() < N {
            return Ok(None);
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(Some(out))
    }

    /// Read a little-endian 16-bit word.
    pub fn read_u16_le(&mut self) -> io::Result<Option<u16>> {
        Ok(self.read_array::<2>()?.map(|b| LittleEndian::read_u16(&b)))
    }

    /// Move the cursor by `delta` bytes relative to the current position.
    ///
    /// The target must lie within `0..=len`.
    pub fn reposition(&mut self, delta: i64) -> io::Result<()> {
        let target = self.pos as i64 + delta;
        if target < 0 || target as u64 > self.len {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!(
                "reposition by {delta} from offset {} leaves the stream (length {})",
                self.pos, self.len
            )));
        }
        self.reader.seek_relative(delta)?;
        self.pos = target as u64;
        Ok(())
    }

    /// Jump to an absolute offset.
    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.reposition(offset as i64 - self.pos as i64)
    }

    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

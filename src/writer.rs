//! Tape image writer.
//!
//! [`TapeWriter`] lays blocks out the way a cassette recording does, so the
//! output can be fed straight back to the extractor:
//!
//! ```text
//! ASCII:   marker | 0xEA x10 | name | marker | sector | marker | sector ...
//! BASIC:   marker | 0xD3 x10 | name | marker | program (ends in 7 x 0x00)
//! binary:  marker | 0xD0 x10 | name | marker | start | end | exec | image
//! custom:  marker | data
//! ```
//!
//! ASCII text is terminated with `0x1A` and padded with `0x1A` to a whole
//! number of 256-byte sectors.  Input that the extractor could not read back
//! unchanged is rejected with `io::ErrorKind::InvalidInput`.

use std::io::{self, Write};

use crate::block::{BinaryHeader, BlockKind, NAME_LEN, TAG_REPEAT};
use crate::decode::{ASCII_EOF, PROGRAM_END_RUN, SECTOR_LEN};
use crate::marker::FRAME_MARKER;

pub struct TapeWriter<W: Write> {
    writer:  W,
    written: u64,
    blocks:  usize,
}

impl<W: Write> TapeWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0, blocks: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 { self.written }

    /// Blocks written so far.
    pub fn block_count(&self) -> usize { self.blocks }

    pub fn write_ascii(&mut self, name: &str, text: &[u8]) -> io::Result<()> {
        if text.contains(&ASCII_EOF) {
            return Err(invalid("ASCII text may not contain the 0x1A end-of-file byte"));
        }
        self.file_header(BlockKind::Ascii, name)?;

        let mut body = Vec::with_capacity(text.len() + SECTOR_LEN);
        body.extend_from_slice(text);
        body.push(ASCII_EOF);
        let padded = body.len().div_ceil(SECTOR_LEN) * SECTOR_LEN;
        body.resize(padded, ASCII_EOF);

        for sector in body.chunks(SECTOR_LEN) {
            self.put(&FRAME_MARKER)?;
            self.put(sector)?;
        }
        self.blocks += 1;
        Ok(())
    }

    pub fn write_program(&mut self, name: &str, program: &[u8]) -> io::Result<()> {
        let end_run = [0u8; PROGRAM_END_RUN];
        match program.windows(PROGRAM_END_RUN).position(|w| w == end_run) {
            Some(p) if p + PROGRAM_END_RUN == program.len() => {}
            _ => return Err(invalid("program must end with its first run of seven 0x00 bytes")),
        }
        self.file_header(BlockKind::Program, name)?;
        self.put(&FRAME_MARKER)?;
        self.put(program)?;
        self.blocks += 1;
        Ok(())
    }

    /// Write a binary image loaded at `start`.  The end address is derived
    /// from the image length.
    pub fn write_binary(&mut self, name: &str, start: u16, exec: u16, image: &[u8]) -> io::Result<()> {
        let last = image.len()
            .checked_sub(1)
            .ok_or_else(|| invalid("binary image is empty"))?;
        let end = u16::try_from(last)
            .ok()
            .and_then(|l| start.checked_add(l))
            .ok_or_else(|| invalid("binary image runs past 0xFFFF"))?;

        self.file_header(BlockKind::Binary, name)?;
        self.put(&FRAME_MARKER)?;
        let mut header = Vec::with_capacity(6);
        BinaryHeader { start, end, exec }.write(&mut header)?;
        self.put(&header)?;
        self.put(image)?;
        self.blocks += 1;
        Ok(())
    }

    pub fn write_custom(&mut self, data: &[u8]) -> io::Result<()> {
        if data.first().is_some_and(|b| BlockKind::from_tag(*b).is_some()) {
            return Err(invalid("custom data may not start with a type tag byte"));
        }
        if data.windows(FRAME_MARKER.len()).any(|w| w == FRAME_MARKER) {
            return Err(invalid("custom data may not contain a frame marker"));
        }
        self.put(&FRAME_MARKER)?;
        self.put(data)?;
        self.blocks += 1;
        Ok(())
    }

    /// Write raw bytes between blocks (padding, noise, deliberate damage).
    pub fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.put(bytes)
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn file_header(&mut self, kind: BlockKind, name: &str) -> io::Result<()> {
        if name.len() > NAME_LEN {
            return Err(invalid("block names are at most six bytes"));
        }
        let Some(tag) = kind.tag() else {
            return Err(invalid("custom blocks have no file header"));
        };
        let mut field = [b' '; NAME_LEN];
        field[..name.len()].copy_from_slice(name.as_bytes());

        self.put(&FRAME_MARKER)?;
        self.put(&[tag; TAG_REPEAT as usize])?;
        self.put(&field)
    }

    fn put(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.to_owned())
}

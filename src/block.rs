//! Block model and the type-tag classifier.
//!
//! # Layout
//!
//! ```text
//! file header block:  marker | tag x10 | name (6 B, space padded)
//! data block:         marker | kind-specific payload
//! custom block:       marker | opaque bytes (first byte is not a tag)
//! ```
//!
//! | Tag    | Kind    | Payload                                              |
//! |--------|---------|------------------------------------------------------|
//! | `0xEA` | ASCII   | 256-byte sectors, each behind a marker, ends at 0x1A |
//! | `0xD3` | BASIC   | tokenized program, ends with seven 0x00 bytes        |
//! | `0xD0` | Binary  | start/end/exec (LE u16), then `end - start + 1` bytes |
//!
//! All multi-byte fields are little-endian.

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Read, Seek, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::cursor::TapeCursor;
use crate::error::Result;
use crate::report::Anomaly;

pub const TAG_BINARY:  u8 = 0xD0;
pub const TAG_PROGRAM: u8 = 0xD3;
pub const TAG_ASCII:   u8 = 0xEA;
/// Every type tag is written this many times in a row.
pub const TAG_REPEAT:  u8 = 10;
pub const NAME_LEN:    usize = 6;
pub const BINARY_HEADER_SIZE: usize = 6;

// ── BlockKind ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Ascii,
    Program,
    Binary,
    /// No recognised tag; the block is opaque data loaded by a program.
    Custom,
}

impl BlockKind {
    #[inline]
    pub fn tag(self) -> Option<u8> {
        match self {
            BlockKind::Ascii   => Some(TAG_ASCII),
            BlockKind::Program => Some(TAG_PROGRAM),
            BlockKind::Binary  => Some(TAG_BINARY),
            BlockKind::Custom  => None,
        }
    }

    #[inline]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_ASCII   => Some(BlockKind::Ascii),
            TAG_PROGRAM => Some(BlockKind::Program),
            TAG_BINARY  => Some(BlockKind::Binary),
            _           => None,
        }
    }

    /// Human-readable name (for diagnostics only).
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::Ascii   => "ASCII",
            BlockKind::Program => "BASIC",
            BlockKind::Binary  => "binary",
            BlockKind::Custom  => "custom",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ascii"             => Some(BlockKind::Ascii),
            "basic" | "program" => Some(BlockKind::Program),
            "binary" | "bin"    => Some(BlockKind::Binary),
            "custom" | "block"  => Some(BlockKind::Custom),
            _                   => None,
        }
    }

    /// Kinds that carry a file header with an embedded name.
    #[inline]
    pub fn is_named(self) -> bool {
        self != BlockKind::Custom
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Classifier ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Block(BlockKind),
    /// Nothing follows the marker.
    EndOfStream,
    /// The tag run is broken.  A damaged tag cannot be told apart from a
    /// torn recording, so the run ends here.
    Torn(Anomaly),
}

/// Classify the block whose marker was just consumed.
///
/// A first byte that is not a type tag is data: the cursor is stepped back
/// over it so the custom decoder sees it as the first payload byte.
pub fn classify<R: Read + Seek>(cursor: &mut TapeCursor<R>) -> Result<Classification> {
    let offset = cursor.position();
    let tag = match cursor.read_u8()? {
        Some(b) => b,
        None    => return Ok(Classification::EndOfStream),
    };

    let Some(kind) = BlockKind::from_tag(tag) else {
        cursor.reposition(-1)?;
        return Ok(Classification::Block(BlockKind::Custom));
    };

    for repeats in 1..TAG_REPEAT {
        match cursor.read_u8()? {
            Some(b) if b == tag => {}
            _ => return Ok(Classification::Torn(Anomaly::CorruptTag { offset, tag, repeats })),
        }
    }
    Ok(Classification::Block(kind))
}

// ── Binary image header ──────────────────────────────────────────────────────

/// Load address block at the start of a binary image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    pub start: u16,
    pub end:   u16,
    pub exec:  u16,
}

impl BinaryHeader {
    /// Read the three addresses; `None` if the stream ends first.
    pub fn read<R: Read + Seek>(cursor: &mut TapeCursor<R>) -> io::Result<Option<Self>> {
        let Some(start) = cursor.read_u16_le()? else { return Ok(None) };
        let Some(end)   = cursor.read_u16_le()? else { return Ok(None) };
        let Some(exec)  = cursor.read_u16_le()? else { return Ok(None) };
        Ok(Some(Self { start, end, exec }))
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.start)?;
        writer.write_u16::<LittleEndian>(self.end)?;
        writer.write_u16::<LittleEndian>(self.exec)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; BINARY_HEADER_SIZE] {
        let mut out = [0u8; BINARY_HEADER_SIZE];
        LittleEndian::write_u16(&mut out[0..2], self.start);
        LittleEndian::write_u16(&mut out[2..4], self.end);
        LittleEndian::write_u16(&mut out[4..6], self.exec);
        out
    }

    /// Image length; the address range is inclusive.  `None` when
    /// `end < start`.
    pub fn payload_len(&self) -> Option<usize> {
        self.end
            .checked_sub(self.start)
            .map(|d| d as usize + 1)
    }
}

// ── Extracted block ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockMeta {
    Ascii   { name: String },
    Program { name: String },
    Binary  { name: String, header: BinaryHeader },
    /// `seq` is the 1-based count of custom blocks seen so far in the run.
    Custom  { seq: u32 },
}

/// One decoded block, ready to hand to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapeBlock {
    /// Offset of the frame marker that opened the block.
    pub offset:  u64,
    pub meta:    BlockMeta,
    pub payload: Vec<u8>,
}

impl TapeBlock {
    pub fn kind(&self) -> BlockKind {
        match self.meta {
            BlockMeta::Ascii { .. }   => BlockKind::Ascii,
            BlockMeta::Program { .. } => BlockKind::Program,
            BlockMeta::Binary { .. }  => BlockKind::Binary,
            BlockMeta::Custom { .. }  => BlockKind::Custom,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.meta {
            BlockMeta::Ascii { name }
            | BlockMeta::Program { name }
            | BlockMeta::Binary { name, .. } => Some(name),
            BlockMeta::Custom { .. } => None,
        }
    }

    /// Output name: the embedded name, or `BLOCK<n>` for custom blocks.
    pub fn artifact_name(&self) -> String {
        match &self.meta {
            BlockMeta::Custom { seq } => format!("BLOCK{seq}"),
            _ => self.name().unwrap_or_default().to_owned(),
        }
    }

    /// Bytes written for this block.  Binary images keep their load
    /// addresses as a 6-byte little-endian prefix; every other kind is the
    /// bare payload.
    pub fn artifact_bytes(&self) -> Cow<'_, [u8]> {
        match &self.meta {
            BlockMeta::Binary { header, .. } => {
                let mut out = Vec::with_capacity(BINARY_HEADER_SIZE + self.payload.len());
                out.extend_from_slice(&header.to_bytes());
                out.extend_from_slice(&self.payload);
                Cow::Owned(out)
            }
            _ => Cow::Borrowed(&self.payload),
        }
    }
}

//! Per-kind payload decoders.
//!
//! Each decoder starts where the classifier left the cursor and returns a
//! [`Decoded`] value; none of them touch the sink or the run state, so they
//! can be driven directly from a byte buffer.
//!
//! Termination rules differ per kind:
//!
//! | Kind   | Ends at                                 | Terminator kept  |
//! |--------|-----------------------------------------|------------------|
//! | ASCII  | `0x1A` or end of stream                 | no               |
//! | BASIC  | seven consecutive `0x00` bytes          | yes              |
//! | Binary | `end - start + 1` bytes                 | n/a              |
//! | Custom | the next frame marker, or end of stream | no, cursor rewinds onto it |

use std::io::{Read, Seek};

use tracing::debug;

use crate::block::{BinaryHeader, BlockKind, BlockMeta, TapeBlock, NAME_LEN};
use crate::cursor::TapeCursor;
use crate::error::{Result, TapeError};
use crate::marker::{ends_with_marker, find_marker, Sync, MARKER_LEN};
use crate::report::Anomaly;

/// ASCII files are re-framed by a marker after every sector.
pub const SECTOR_LEN: usize = 256;
/// End-of-file byte of ASCII files (CP/M `^Z`).
pub const ASCII_EOF: u8 = 0x1A;
/// A tokenized program ends with this many zero bytes.
pub const PROGRAM_END_RUN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Block(TapeBlock),
    /// The stream ended early; what was read is still worth keeping.
    Partial(TapeBlock, Anomaly),
    /// The stream ended early and nothing is emitted for this block.
    Lost(Anomaly),
}

impl Decoded {
    pub fn block(&self) -> Option<&TapeBlock> {
        match self {
            Decoded::Block(b) | Decoded::Partial(b, _) => Some(b),
            Decoded::Lost(_) => None,
        }
    }

    pub fn anomaly(&self) -> Option<&Anomaly> {
        match self {
            Decoded::Block(_) => None,
            Decoded::Partial(_, a) | Decoded::Lost(a) => Some(a),
        }
    }
}

/// Read the 6-byte name field, dropping its space padding.
///
/// `Ok(None)` if the stream ends inside the field.
pub fn read_name<R: Read + Seek>(cursor: &mut TapeCursor<R>) -> Result<Option<String>> {
    let at = cursor.position();
    let Some(raw) = cursor.read_array::<NAME_LEN>()? else {
        return Ok(None);
    };
    let text = std::str::from_utf8(&raw)
        .map_err(|source| TapeError::NameDecode { offset: at, source })?;
    Ok(Some(text.trim_end().to_owned()))
}

/// Name field plus the marker that opens the data block.
fn file_header<R: Read + Seek>(
    cursor: &mut TapeCursor<R>,
    offset: u64,
    kind:   BlockKind,
) -> Result<Result<String, Anomaly>> {
    let Some(name) = read_name(cursor)? else {
        return Ok(Err(Anomaly::Headless { offset, kind }));
    };
    match find_marker(cursor)? {
        Sync::Marker(at) => {
            debug!(%kind, name = %name, data_marker = at, "file header");
            Ok(Ok(name))
        }
        Sync::End | Sync::Torn { .. } => Ok(Err(Anomaly::Headless { offset, kind })),
    }
}

pub fn decode_ascii<R: Read + Seek>(cursor: &mut TapeCursor<R>, offset: u64) -> Result<Decoded> {
    let name = match file_header(cursor, offset, BlockKind::Ascii)? {
        Ok(name) => name,
        Err(anomaly) => return Ok(Decoded::Lost(anomaly)),
    };

    let mut payload = Vec::new();
    loop {
        let b = match cursor.read_u8()? {
            Some(ASCII_EOF) => break,
            Some(b) => b,
            None => {
                let anomaly = Anomaly::MissingEof { offset, name: name.clone() };
                let meta = BlockMeta::Ascii { name };
                return Ok(Decoded::Partial(TapeBlock { offset, meta, payload }, anomaly));
            }
        };
        payload.push(b);

        if payload.len() % SECTOR_LEN == 0 {
            match find_marker(cursor)? {
                Sync::Marker(at) => debug!(name = %name, sector_marker = at, "resync"),
                Sync::End | Sync::Torn { .. } => {
                    let anomaly = Anomaly::MissingSector { offset, name: name.clone(), kept: payload.len() };
                    let meta = BlockMeta::Ascii { name };
                    return Ok(Decoded::Partial(TapeBlock { offset, meta, payload }, anomaly));
                }
            }
        }
    }

    Ok(Decoded::Block(TapeBlock { offset, meta: BlockMeta::Ascii { name }, payload }))
}

pub fn decode_binary<R: Read + Seek>(cursor: &mut TapeCursor<R>, offset: u64) -> Result<Decoded> {
    let name = match file_header(cursor, offset, BlockKind::Binary)? {
        Ok(name) => name,
        Err(anomaly) => return Ok(Decoded::Lost(anomaly)),
    };

    let Some(header) = BinaryHeader::read(cursor)? else {
        return Ok(Decoded::Lost(Anomaly::MissingAddresses { offset, name }));
    };
    let expected = header.payload_len().ok_or(TapeError::InvalidAddressRange {
        offset,
        start: header.start,
        end:   header.end,
    })?;
    debug!(
        name = %name,
        start = format_args!("{:#06x}", header.start),
        end = format_args!("{:#06x}", header.end),
        exec = format_args!("{:#06x}", header.exec),
        "binary image"
    );

    let payload = cursor.read_up_to(expected)?;
    let got = payload.len();
    let meta = BlockMeta::Binary { name: name.clone(), header };
    let block = TapeBlock { offset, meta, payload };
    if got < expected {
        return Ok(Decoded::Partial(block, Anomaly::ShortImage { offset, name, expected, got }));
    }
    Ok(Decoded::Block(block))
}

pub fn decode_program<R: Read + Seek>(cursor: &mut TapeCursor<R>, offset: u64) -> Result<Decoded> {
    let name = match file_header(cursor, offset, BlockKind::Program)? {
        Ok(name) => name,
        Err(anomaly) => return Ok(Decoded::Lost(anomaly)),
    };

    let mut payload = Vec::new();
    while !payload.ends_with(&[0u8; PROGRAM_END_RUN]) {
        match cursor.read_u8()? {
            Some(b) => payload.push(b),
            // Only a complete, sentinel-terminated program is usable.
            None => {
                let read = payload.len();
                return Ok(Decoded::Lost(Anomaly::UnterminatedProgram { offset, name, read }));
            }
        }
    }

    Ok(Decoded::Block(TapeBlock { offset, meta: BlockMeta::Program { name }, payload }))
}

/// Opaque data up to the next frame marker.
///
/// The marker itself is not part of the payload; the cursor is stepped back
/// onto it so the next classification cycle starts there.  If the stream ends
/// first, everything read is the payload.
pub fn decode_custom<R: Read + Seek>(
    cursor: &mut TapeCursor<R>,
    offset: u64,
    seq:    u32,
) -> Result<Decoded> {
    let mut payload = Vec::new();
    loop {
        match cursor.read_u8()? {
            Some(b) => {
                payload.push(b);
                if ends_with_marker(&payload) {
                    payload.truncate(payload.len() - MARKER_LEN);
                    cursor.reposition(-(MARKER_LEN as i64))?;
                    break;
                }
            }
            None => {
                debug!(seq, len = payload.len(), "custom block runs to end of stream");
                break;
            }
        }
    }

    Ok(Decoded::Block(TapeBlock { offset, meta: BlockMeta::Custom { seq }, payload }))
}

//! Frame-marker synchronisation.
//!
//! Every block on an MSX tape image starts with an 8-byte frame marker: the
//! sentinel byte `0x1F` followed by the fixed signature
//! `A6 DE BA CC 13 7D 74`.  Recordings pad markers out to 8-byte boundaries,
//! so the scanner skips any bytes before the sentinel.
//!
//! A sentinel followed by the wrong signature is fatal
//! ([`TapeError::Framing`]).  A stream that stops before the sentinel, or
//! inside the signature, is a clean end: tapes are often cut off abruptly.

use std::io::{Read, Seek};

use crate::cursor::TapeCursor;
use crate::error::{Result, TapeError};

pub const SENTINEL: u8 = 0x1F;
pub const SIGNATURE: [u8; 7] = [0xA6, 0xDE, 0xBA, 0xCC, 0x13, 0x7D, 0x74];
pub const MARKER_LEN: usize = 8;
pub const FRAME_MARKER: [u8; MARKER_LEN] = [
    SENTINEL, 0xA6, 0xDE, 0xBA, 0xCC, 0x13, 0x7D, 0x74,
];

/// Outcome of one marker search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sync {
    /// A full marker was consumed; `offset` is where its sentinel sat.
    Marker(u64),
    /// The stream ended before any sentinel.
    End,
    /// The stream ended inside the signature that follows the sentinel at
    /// `offset`.
    Torn { offset: u64 },
}

/// Advance past the next frame marker.
pub fn find_marker<R: Read + Seek>(cursor: &mut TapeCursor<R>) -> Result<Sync> {
    let offset = loop {
        match cursor.read_u8()? {
            None => return Ok(Sync::End),
            Some(SENTINEL) => break cursor.position() - 1,
            Some(_) => {}
        }
    };

    match cursor.read_array::<7>()? {
        None => Ok(Sync::Torn { offset }),
        Some(sig) if sig == SIGNATURE => Ok(Sync::Marker(offset)),
        Some(found) => Err(TapeError::Framing { offset, found }),
    }
}

/// True when `buf` ends with a complete frame marker.
#[inline]
pub fn ends_with_marker(buf: &[u8]) -> bool {
    buf.ends_with(&FRAME_MARKER)
}

use std::io;
use std::str::Utf8Error;

use thiserror::Error;

use crate::report::Anomaly;

#[derive(Error, Debug)]
pub enum TapeError {
    /// A sentinel byte was found but the signature after it did not match.
    /// Top-level framing is not recoverable; the run stops here.
    #[error("Bad frame marker at offset {offset:#x}: expected signature a6debacc137d74, found {}", hex::encode(.found))]
    Framing { offset: u64, found: [u8; 7] },
    #[error("Block name at offset {offset:#x} is not valid text: {source}")]
    NameDecode {
        offset: u64,
        #[source]
        source: Utf8Error,
    },
    #[error("Binary image at offset {offset:#x} has end address {end:#06x} below start {start:#06x}")]
    InvalidAddressRange { offset: u64, start: u16, end: u16 },
    /// Raised only in strict mode; lenient runs log the anomaly and continue.
    #[error("Damaged tape: {0}")]
    Anomaly(#[from] Anomaly),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

pub type Result<T, E = TapeError> = std::result::Result<T, E>;

//! Run report: what was extracted, and what damage was tolerated on the way.
//!
//! Several damaged-tape conditions are deliberately treated as a clean end
//! of the tape (a torn marker, a tag that is not repeated ten times, a block
//! cut off mid-payload).  Each one is recorded as an [`Anomaly`] so that
//! "the tape ended" and "the tape is damaged" remain distinguishable after
//! the run.  With `ExtractOptions::strict` set, the first anomaly aborts the
//! run instead.
//!
//! The report serialises to JSON and is what `castape --manifest` writes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::block::{BlockKind, BlockMeta, TapeBlock};
use crate::sink::file_name;

/// A tolerated defect in the tape image.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anomaly {
    #[error("stream ends inside the frame marker at offset {offset:#x}")]
    TornMarker { offset: u64 },
    #[error("type tag {tag:#04x} at offset {offset:#x} repeated {repeats} of 10 times")]
    CorruptTag { offset: u64, tag: u8, repeats: u8 },
    #[error("{kind} block at offset {offset:#x} ends before its data marker")]
    Headless { offset: u64, kind: BlockKind },
    #[error("ASCII file {name:?} lost its sector marker after {kept} bytes")]
    MissingSector { offset: u64, name: String, kept: usize },
    #[error("ASCII file {name:?} ends without an end-of-file byte")]
    MissingEof { offset: u64, name: String },
    #[error("binary image {name:?} ends inside its load addresses")]
    MissingAddresses { offset: u64, name: String },
    #[error("binary image {name:?} is {got} of {expected} bytes")]
    ShortImage { offset: u64, name: String, expected: usize, got: usize },
    #[error("BASIC program {name:?} cut off after {read} bytes, block discarded")]
    UnterminatedProgram { offset: u64, name: String, read: usize },
}

impl Anomaly {
    pub fn offset(&self) -> u64 {
        match self {
            Anomaly::TornMarker { offset }
            | Anomaly::CorruptTag { offset, .. }
            | Anomaly::Headless { offset, .. }
            | Anomaly::MissingSector { offset, .. }
            | Anomaly::MissingEof { offset, .. }
            | Anomaly::MissingAddresses { offset, .. }
            | Anomaly::ShortImage { offset, .. }
            | Anomaly::UnterminatedProgram { offset, .. } => *offset,
        }
    }
}

/// One extracted block as recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    /// 0-based position among the emitted blocks.
    pub index:  usize,
    pub kind:   BlockKind,
    /// Embedded name; `None` for custom blocks.
    pub name:   Option<String>,
    /// File name the block is written under.
    pub file:   String,
    /// Offset of the block's frame marker.
    pub offset: u64,
    /// Artifact size, including the address header of binary images.
    pub size:   usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start:  Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end:    Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec:   Option<u16>,
    /// BLAKE3 of the artifact bytes, hex encoded.
    pub blake3: String,
}

impl BlockSummary {
    pub fn from_block(index: usize, block: &TapeBlock) -> Self {
        let artifact = block.artifact_bytes();
        let (start, end, exec) = match &block.meta {
            BlockMeta::Binary { header, .. } => {
                (Some(header.start), Some(header.end), Some(header.exec))
            }
            _ => (None, None, None),
        };
        Self {
            index,
            kind:   block.kind(),
            name:   block.name().map(str::to_owned),
            file:   file_name(block),
            offset: block.offset,
            size:   artifact.len(),
            start,
            end,
            exec,
            blake3: hex::encode(blake3::hash(&artifact).as_bytes()),
        }
    }
}

/// Complete record of one extraction run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractReport {
    /// Input path, when the run was started from a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source:        Option<String>,
    /// Cursor position when the run stopped.
    pub bytes_scanned: u64,
    pub blocks:        Vec<BlockSummary>,
    pub anomalies:     Vec<Anomaly>,
}

impl ExtractReport {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn count(&self, kind: BlockKind) -> usize {
        self.blocks.iter().filter(|b| b.kind == kind).count()
    }

    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty()
    }

    /// Summary line for display.
    pub fn summary(&self) -> String {
        format!(
            "{} block(s) extracted ({} ASCII, {} BASIC, {} binary, {} custom), \
             {} byte(s) scanned, {} anomal{}",
            self.blocks.len(),
            self.count(BlockKind::Ascii),
            self.count(BlockKind::Program),
            self.count(BlockKind::Binary),
            self.count(BlockKind::Custom),
            self.bytes_scanned,
            self.anomalies.len(),
            if self.anomalies.len() == 1 { "y" } else { "ies" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BinaryHeader;

    fn binary_block() -> TapeBlock {
        TapeBlock {
            offset:  0x40,
            meta:    BlockMeta::Binary {
                name:   "GAME".into(),
                header: BinaryHeader { start: 0x9000, end: 0x9002, exec: 0x9000 },
            },
            payload: vec![0xC9, 0x00, 0xC9],
        }
    }

    #[test]
    fn summary_counts_artifact_bytes() {
        let s = BlockSummary::from_block(0, &binary_block());
        assert_eq!(s.kind, BlockKind::Binary);
        assert_eq!(s.file, "GAME");
        assert_eq!(s.size, 9);
        assert_eq!(s.start, Some(0x9000));
        assert_eq!(s.blake3.len(), 64);
    }

    #[test]
    fn report_json_roundtrip() {
        let report = ExtractReport {
            source:        Some("game.cas".into()),
            bytes_scanned: 128,
            blocks:        vec![BlockSummary::from_block(0, &binary_block())],
            anomalies:     vec![Anomaly::TornMarker { offset: 120 }],
        };
        let json = report.to_json().unwrap();
        let text = String::from_utf8(json.clone()).unwrap();
        assert!(text.contains("\"torn_marker\""));
        assert!(text.contains("\"binary\""));

        let back = ExtractReport::from_json(&json).unwrap();
        assert_eq!(back.blocks, report.blocks);
        assert_eq!(back.anomalies, report.anomalies);
        assert!(!back.is_clean());
    }

    #[test]
    fn summary_line() {
        let report = ExtractReport {
            blocks: vec![BlockSummary::from_block(0, &binary_block())],
            bytes_scanned: 64,
            ..Default::default()
        };
        assert_eq!(
            report.summary(),
            "1 block(s) extracted (0 ASCII, 0 BASIC, 1 binary, 0 custom), 64 byte(s) scanned, 0 anomalies"
        );
    }
}

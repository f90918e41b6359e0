//! The dispatch loop: one extraction run over one tape image.
//!
//! # States
//!
//! ```text
//!             marker + tag               decoder ran, block persisted
//! Scanning ────────────────► Dispatching ────────────────────────────► Scanning
//!    │  end of stream / torn marker / broken tag run
//!    ├────────────────────────────────────────────────────────────────► Done
//!    │  bad signature, bad name, bad address range, I/O, strict anomaly
//!    └────────────────────────────────────────────────────────────────► Fatal
//! ```
//!
//! Between blocks the cursor sits on the next block's frame marker (or in the
//! padding just before it), or at the end of the stream.
//!
//! All run state (the cursor, the custom-block counter, the report) lives in
//! the [`Extraction`] value, so independent runs never share anything.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::block::{classify, BlockKind, Classification, TapeBlock};
use crate::cursor::TapeCursor;
use crate::decode::{decode_ascii, decode_binary, decode_custom, decode_program, Decoded};
use crate::error::{Result, TapeError};
use crate::marker::{find_marker, Sync};
use crate::report::{Anomaly, BlockSummary, ExtractReport};
use crate::sink::BlockSink;

// ── ExtractOptions ────────────────────────────────────────────────────────────

/// Configuration for an [`Extraction`].
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Abort on the first [`Anomaly`] instead of logging it and treating the
    /// damage as the end of the tape.
    pub strict: bool,
}

// ── RunState ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Scanning,
    /// A block of `kind` opened by the marker at `offset` is next.
    Dispatching { kind: BlockKind, offset: u64 },
    Done,
    Fatal,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Fatal)
    }
}

// ── Extraction ────────────────────────────────────────────────────────────────

pub struct Extraction<R: Read + Seek> {
    cursor:     TapeCursor<R>,
    state:      RunState,
    custom_seq: u32,
    options:    ExtractOptions,
    report:     ExtractReport,
}

impl<R: Read + Seek> Extraction<R> {
    pub fn new(reader: R, options: ExtractOptions) -> io::Result<Self> {
        Ok(Self {
            cursor:     TapeCursor::new(reader)?,
            state:      RunState::Scanning,
            custom_seq: 0,
            options,
            report:     ExtractReport::default(),
        })
    }

    /// Record where the tape came from in the report.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.report.source = Some(source.into());
        self
    }

    pub fn state(&self) -> RunState { self.state }

    pub fn position(&self) -> u64 { self.cursor.position() }

    pub fn stream_len(&self) -> u64 { self.cursor.len() }

    pub fn report(&self) -> &ExtractReport { &self.report }

    pub fn into_report(self) -> ExtractReport { self.report }

    /// Perform one state transition.
    ///
    /// Terminal states are sticky: stepping a finished run returns its state
    /// without touching the stream.
    pub fn step<S: BlockSink + ?Sized>(&mut self, sink: &mut S) -> Result<RunState> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        let next = self.advance(sink);
        self.report.bytes_scanned = self.cursor.position();
        match next {
            Ok(state) => {
                self.state = state;
                Ok(state)
            }
            Err(e) => {
                error!(offset = self.cursor.position(), "extraction aborted: {e}");
                self.state = RunState::Fatal;
                Err(e)
            }
        }
    }

    /// Step until the run reaches `Done`, or fail with the error that made it
    /// `Fatal`.  Blocks persisted before a failure stay persisted.
    pub fn run<S: BlockSink + ?Sized>(&mut self, sink: &mut S) -> Result<()> {
        while !self.state.is_terminal() {
            self.step(sink)?;
        }
        Ok(())
    }

    fn advance<S: BlockSink + ?Sized>(&mut self, sink: &mut S) -> Result<RunState> {
        match self.state {
            RunState::Scanning => self.scan(),
            RunState::Dispatching { kind, offset } => {
                self.dispatch(kind, offset, sink)?;
                Ok(RunState::Scanning)
            }
            state @ (RunState::Done | RunState::Fatal) => Ok(state),
        }
    }

    fn scan(&mut self) -> Result<RunState> {
        let offset = match find_marker(&mut self.cursor)? {
            Sync::Marker(offset) => offset,
            Sync::End => return Ok(RunState::Done),
            Sync::Torn { offset } => {
                self.tolerate(Anomaly::TornMarker { offset })?;
                return Ok(RunState::Done);
            }
        };

        match classify(&mut self.cursor)? {
            Classification::Block(kind) => {
                debug!(%kind, offset, "block");
                Ok(RunState::Dispatching { kind, offset })
            }
            Classification::EndOfStream => Ok(RunState::Done),
            Classification::Torn(anomaly) => {
                self.tolerate(anomaly)?;
                Ok(RunState::Done)
            }
        }
    }

    fn dispatch<S: BlockSink + ?Sized>(
        &mut self,
        kind:   BlockKind,
        offset: u64,
        sink:   &mut S,
    ) -> Result<()> {
        let cursor = &mut self.cursor;
        let decoded = match kind {
            BlockKind::Ascii   => decode_ascii(cursor, offset)?,
            BlockKind::Program => decode_program(cursor, offset)?,
            BlockKind::Binary  => decode_binary(cursor, offset)?,
            BlockKind::Custom  => {
                self.custom_seq += 1;
                decode_custom(cursor, offset, self.custom_seq)?
            }
        };

        match decoded {
            Decoded::Block(block) => self.emit(block, sink),
            Decoded::Partial(block, anomaly) => {
                self.tolerate(anomaly)?;
                self.emit(block, sink)
            }
            Decoded::Lost(anomaly) => self.tolerate(anomaly),
        }
    }

    fn emit<S: BlockSink + ?Sized>(&mut self, block: TapeBlock, sink: &mut S) -> Result<()> {
        sink.persist(&block)?;
        let summary = BlockSummary::from_block(self.report.blocks.len(), &block);
        info!(kind = %summary.kind, file = %summary.file, size = summary.size, offset = summary.offset, "extracted");
        self.report.blocks.push(summary);
        Ok(())
    }

    fn tolerate(&mut self, anomaly: Anomaly) -> Result<()> {
        if self.options.strict {
            return Err(TapeError::Anomaly(anomaly));
        }
        warn!(offset = anomaly.offset(), "{anomaly}");
        self.report.anomalies.push(anomaly);
        Ok(())
    }
}

// ── Convenience ───────────────────────────────────────────────────────────────

/// Run a complete extraction over `reader`.
pub fn extract<R, S>(reader: R, sink: &mut S, options: ExtractOptions) -> Result<ExtractReport>
where
    R: Read + Seek,
    S: BlockSink + ?Sized,
{
    let mut run = Extraction::new(reader, options)?;
    run.run(sink)?;
    Ok(run.into_report())
}

/// Convenience: extract the tape image at `path`.
pub fn extract_file<S: BlockSink + ?Sized>(
    path:    &Path,
    sink:    &mut S,
    options: ExtractOptions,
) -> Result<ExtractReport> {
    let f = File::open(path)?;
    let mut run = Extraction::new(f, options)?.with_source(path.display().to_string());
    run.run(sink)?;
    Ok(run.into_report())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockMeta, TAG_ASCII};
    use crate::marker::FRAME_MARKER;
    use std::io::Cursor;

    fn hello_tape() -> Vec<u8> {
        let mut t = FRAME_MARKER.to_vec();
        t.extend_from_slice(&[TAG_ASCII; 10]);
        t.extend_from_slice(b"HELLO ");
        t.extend_from_slice(&FRAME_MARKER);
        t.extend_from_slice(b"HI\x1a");
        t
    }

    #[test]
    fn steps_through_each_state() {
        let tape = hello_tape();
        let mut run = Extraction::new(Cursor::new(tape.clone()), ExtractOptions::default()).unwrap();
        let mut out: Vec<TapeBlock> = Vec::new();

        assert_eq!(run.state(), RunState::Scanning);
        assert_eq!(
            run.step(&mut out).unwrap(),
            RunState::Dispatching { kind: BlockKind::Ascii, offset: 0 }
        );
        assert!(out.is_empty());
        assert_eq!(run.step(&mut out).unwrap(), RunState::Scanning);
        assert_eq!(out.len(), 1);
        assert_eq!(run.step(&mut out).unwrap(), RunState::Done);
        assert_eq!(run.step(&mut out).unwrap(), RunState::Done);
        assert_eq!(run.position(), tape.len() as u64);
    }

    #[test]
    fn custom_blocks_are_numbered_per_run() {
        let mut tape = FRAME_MARKER.to_vec();
        tape.extend_from_slice(b"one");
        tape.extend_from_slice(&FRAME_MARKER);
        tape.extend_from_slice(b"two");

        for _ in 0..2 {
            let mut out: Vec<TapeBlock> = Vec::new();
            extract(Cursor::new(tape.clone()), &mut out, ExtractOptions::default()).unwrap();
            let seqs: Vec<_> = out.iter().map(|b| b.meta.clone()).collect();
            assert_eq!(seqs, [BlockMeta::Custom { seq: 1 }, BlockMeta::Custom { seq: 2 }]);
        }
    }

    #[test]
    fn fatal_state_is_sticky() {
        let mut tape = FRAME_MARKER.to_vec();
        tape[7] = 0x00;
        let mut run = Extraction::new(Cursor::new(tape), ExtractOptions::default()).unwrap();
        let mut out: Vec<TapeBlock> = Vec::new();
        assert!(matches!(run.run(&mut out), Err(TapeError::Framing { offset: 0, .. })));
        assert_eq!(run.state(), RunState::Fatal);
        assert_eq!(run.step(&mut out).unwrap(), RunState::Fatal);
    }

    #[test]
    fn strict_mode_turns_anomalies_into_errors() {
        let mut tape = hello_tape();
        tape.extend_from_slice(&FRAME_MARKER[..3]);

        let mut out: Vec<TapeBlock> = Vec::new();
        let report = extract(Cursor::new(tape.clone()), &mut out, ExtractOptions::default()).unwrap();
        assert_eq!(report.blocks.len(), 1);
        assert_eq!(report.anomalies, [Anomaly::TornMarker { offset: 35 }]);

        let mut out: Vec<TapeBlock> = Vec::new();
        let strict = ExtractOptions { strict: true };
        match extract(Cursor::new(tape), &mut out, strict) {
            Err(TapeError::Anomaly(Anomaly::TornMarker { offset: 35 })) => {}
            other => panic!("unexpected {other:?}"),
        }
        // The block before the damage was already handed over.
        assert_eq!(out.len(), 1);
    }
}

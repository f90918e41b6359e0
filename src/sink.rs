//! Output side of an extraction run.
//!
//! The dispatch loop decides *what* a block is and where it ends; a
//! [`BlockSink`] decides where its bytes go.  [`DirSink`] writes one
//! file per block, `Vec<TapeBlock>` keeps blocks in memory, and [`Discard`]
//! drops them (listing and dry runs).

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::block::TapeBlock;

pub trait BlockSink {
    /// Take ownership of one finished block.  The block must be durably
    /// stored by the time this returns; the next block is not scanned
    /// before then.
    fn persist(&mut self, block: &TapeBlock) -> io::Result<()>;
}

impl BlockSink for Vec<TapeBlock> {
    fn persist(&mut self, block: &TapeBlock) -> io::Result<()> {
        self.push(block.clone());
        Ok(())
    }
}

impl<S: BlockSink + ?Sized> BlockSink for &mut S {
    fn persist(&mut self, block: &TapeBlock) -> io::Result<()> {
        (**self).persist(block)
    }
}

/// Accepts and drops every block.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl BlockSink for Discard {
    fn persist(&mut self, _: &TapeBlock) -> io::Result<()> { Ok(()) }
}

/// File name used for a block on disk.
///
/// The embedded name is used as-is apart from path separators and NUL, which
/// are replaced by `_`.  Names that come out empty, `.` or `..` fall back to
/// `<kind>_<offset>` so a blank header never escapes the output directory.
pub fn file_name(block: &TapeBlock) -> String {
    let name: String = block
        .artifact_name()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match name.as_str() {
        "" | "." | ".." => format!("{}_{:08x}", block.kind().name().to_lowercase(), block.offset),
        _ => name,
    }
}

/// Writes each block to its own file inside a directory.
///
/// Files are created fresh (an existing file of the same name is
/// truncated), written once and synced before `persist` returns.
#[derive(Debug)]
pub struct DirSink {
    dir:     PathBuf,
    written: Vec<PathBuf>,
}

impl DirSink {
    /// Use `dir` as the output directory, creating it if necessary.
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_owned();
        if !dir.exists() { std::fs::create_dir_all(&dir)?; }
        Ok(Self { dir, written: Vec::new() })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    /// Paths written so far, in tape order.
    pub fn written(&self) -> &[PathBuf] { &self.written }
}

impl BlockSink for DirSink {
    fn persist(&mut self, block: &TapeBlock) -> io::Result<()> {
        let path = self.dir.join(file_name(block));
        let mut f = File::create(&path)?;
        f.write_all(&block.artifact_bytes())?;
        f.sync_all()?;
        debug!(path = %path.display(), "wrote block");
        self.written.push(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockMeta;

    fn ascii(name: &str) -> TapeBlock {
        TapeBlock { offset: 0x20, meta: BlockMeta::Ascii { name: name.into() }, payload: b"10 PRINT".to_vec() }
    }

    #[test]
    fn names_are_kept_verbatim() {
        assert_eq!(file_name(&ascii("HELLO")), "HELLO");
        assert_eq!(file_name(&ascii("A B")), "A B");
    }

    #[test]
    fn separators_and_blank_names_are_neutralised() {
        assert_eq!(file_name(&ascii("../x")), ".._x");
        assert_eq!(file_name(&ascii("a\\b")), "a_b");
        assert_eq!(file_name(&ascii("")), "ascii_00000020");
        assert_eq!(file_name(&ascii("..")), "ascii_00000020");
    }

    #[test]
    fn dir_sink_truncates_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("HELLO"), vec![0xFF; 64]).unwrap();

        let mut sink = DirSink::new(tmp.path()).unwrap();
        sink.persist(&ascii("HELLO")).unwrap();

        assert_eq!(std::fs::read(tmp.path().join("HELLO")).unwrap(), b"10 PRINT");
        assert_eq!(sink.written(), &[tmp.path().join("HELLO")]);
    }

    #[test]
    fn dir_sink_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("nested/out");
        let mut sink = DirSink::new(&out).unwrap();
        sink.persist(&TapeBlock { offset: 0, meta: BlockMeta::Custom { seq: 1 }, payload: vec![7] }).unwrap();
        assert_eq!(std::fs::read(out.join("BLOCK1")).unwrap(), [7]);
    }
}

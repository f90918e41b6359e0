pub mod cursor;
pub mod marker;
pub mod block;
pub mod decode;
pub mod error;
pub mod extract;
pub mod report;
pub mod sink;
pub mod writer;

pub use block::{BlockKind, BlockMeta, TapeBlock};
pub use error::TapeError;
pub use extract::{extract, extract_file, ExtractOptions, Extraction, RunState};
pub use report::{Anomaly, ExtractReport};
pub use sink::{BlockSink, DirSink, Discard};
pub use writer::TapeWriter;

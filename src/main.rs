use std::io;
use std::path::PathBuf;

use castape::block::{BlockMeta, TapeBlock};
use castape::sink::{file_name, BlockSink, DirSink, Discard};
use castape::{ExtractOptions, Extraction};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "castape", about = "Extract the files stored in an MSX .cas tape image")]
struct Cli {
    /// Tape image to read
    input: PathBuf,
    /// Directory the extracted files are written to
    #[arg(short = 'C', long, default_value = ".")]
    output_dir: PathBuf,
    /// List the blocks without writing any files
    #[arg(short = 'n', long)]
    dry_run: bool,
    /// Stop at the first sign of damage instead of treating it as the end of the tape
    #[arg(long)]
    strict: bool,
    /// Write a JSON report of the run to this path
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Only print errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    let options = ExtractOptions { strict: cli.strict };
    let file = std::fs::File::open(&cli.input)?;
    let mut run = Extraction::new(file, options)?.with_source(cli.input.display().to_string());

    let result = if cli.dry_run {
        run.run(&mut Announce { inner: Discard, quiet: cli.quiet })
    } else {
        let sink = DirSink::new(&cli.output_dir)?;
        run.run(&mut Announce { inner: sink, quiet: cli.quiet })
    };

    // The manifest records whatever was extracted, including before a failure.
    let report = run.into_report();
    if let Some(path) = &cli.manifest {
        std::fs::write(path, report.to_json()?)?;
    }
    result?;

    if !cli.quiet {
        println!("{}", report.summary());
    }
    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

/// Prints one line per block before handing it on.
struct Announce<S> {
    inner: S,
    quiet: bool,
}

impl<S: BlockSink> BlockSink for Announce<S> {
    fn persist(&mut self, block: &TapeBlock) -> io::Result<()> {
        if !self.quiet {
            println!("{}", describe(block));
        }
        self.inner.persist(block)
    }
}

fn describe(block: &TapeBlock) -> String {
    let file = file_name(block);
    match &block.meta {
        BlockMeta::Ascii { .. } => {
            format!("Found ASCII:  {:<8} {:>6} bytes", file, block.payload.len())
        }
        BlockMeta::Program { .. } => {
            format!("Found BASIC:  {:<8} {:>6} bytes", file, block.payload.len())
        }
        BlockMeta::Binary { header, .. } => format!(
            "Found binary: {:<8} {:>6} bytes  start {:#06x}  end {:#06x}  exec {:#06x}",
            file, block.payload.len(), header.start, header.end, header.exec
        ),
        BlockMeta::Custom { .. } => {
            format!("Found custom: {:<8} {:>6} bytes", file, block.payload.len())
        }
    }
}

fn init_tracing() {
    // RUST_LOG=castape=debug shows every marker and resync
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

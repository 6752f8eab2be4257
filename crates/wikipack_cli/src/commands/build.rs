//! Build command implementation.

use bzip2::read::MultiBzDecoder;
use clap::Args;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use wikipack_core::{BuildConfig, BuildSummary, HtmlRenderer, Ingestor, Namespace, NamespaceFilter};

const READ_BUFFER: usize = 1024 * 1024;

/// Arguments of `wikipack build`.
#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Dump file (`.xml`, `.xml.gz` or `.xml.bz2`), or `-` for stdin
    pub input: PathBuf,

    /// Output directory; must not hold a previous build
    pub output: PathBuf,

    /// Store payloads uncompressed
    #[arg(long)]
    pub no_compress: bool,

    /// Number of write workers
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Batches that may wait for a worker
    #[arg(long, default_value_t = 64)]
    pub queue_capacity: usize,

    /// Records per batch
    #[arg(long, default_value_t = 300)]
    pub batch_size: usize,

    /// Soft size cap of a segment file, in bytes
    #[arg(long, default_value_t = 1024 * 1024 * 1024)]
    pub max_segment_size: u64,

    /// Records between progress lines
    #[arg(long, default_value_t = 10_000)]
    pub progress_interval: u64,

    /// Stop after this many records
    #[arg(short, long)]
    pub limit: Option<u64>,

    /// Namespace codes to keep (repeatable); defaults to articles and categories
    #[arg(short, long = "namespace")]
    pub namespaces: Vec<i32>,
}

impl BuildArgs {
    /// Maps the arguments onto a build configuration.
    pub fn config(&self) -> Result<BuildConfig, Box<dyn std::error::Error>> {
        let mut filter = NamespaceFilter::default();
        if !self.namespaces.is_empty() {
            let namespaces = self
                .namespaces
                .iter()
                .map(|code| {
                    Namespace::from_code(*code).ok_or_else(|| format!("unknown namespace code: {code}"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            filter = NamespaceFilter::only(namespaces);
        }

        Ok(BuildConfig::new(&self.output)
            .compress(!self.no_compress)
            .workers(self.workers)
            .queue_capacity(self.queue_capacity)
            .batch_size(self.batch_size)
            .max_segment_size(self.max_segment_size)
            .progress_interval(self.progress_interval)
            .limit(self.limit)
            .namespaces(filter))
    }
}

/// Runs the build command.
pub fn run(args: &BuildArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.config()?;
    let input = open_input(&args.input)?;
    let ingestor = Ingestor::create(config, Arc::new(HtmlRenderer::new()))?;

    let started = Instant::now();
    let summary = ingestor.ingest(input, |title, count| {
        println!(
            "{count} records, last: {title}, elapsed: {:.1}s",
            started.elapsed().as_secs_f64()
        );
    })?;

    info!(
        output = %args.output.display(),
        entries = summary.entry_count,
        segments = summary.segment_count(),
        "archive written"
    );
    print_summary(&args.output, &summary);
    Ok(())
}

/// Opens the dump, decompressing `.gz` and `.bz2` files on the fly.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>, Box<dyn std::error::Error>> {
    debug!(input = %path.display(), "opening dump");
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::with_capacity(READ_BUFFER, io::stdin())));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("gz") => {
            let file = File::open(path)?;
            Ok(Box::new(BufReader::with_capacity(
                READ_BUFFER,
                MultiGzDecoder::new(file),
            )))
        }
        Some("bz2") => {
            let file = File::open(path)?;
            Ok(Box::new(BufReader::with_capacity(
                READ_BUFFER,
                MultiBzDecoder::new(file),
            )))
        }
        _ => Ok(Box::new(BufReader::with_capacity(READ_BUFFER, File::open(path)?))),
    }
}

fn print_summary(output: &Path, summary: &BuildSummary) {
    let writes = &summary.writes;
    println!();
    println!("Build complete: {}", output.display());
    println!("  Records parsed:   {}", summary.records_parsed);
    println!("  Filtered out:     {}", summary.records_filtered);
    println!("  Pages stored:     {}", writes.records_stored);
    println!("  Redirects:        {}", writes.redirects_indexed);
    println!(
        "  Skipped:          {} empty, {} failed",
        writes.records_empty, writes.records_failed
    );
    println!("  Index entries:    {}", summary.entry_count);
    println!(
        "  Segments:         {} ({} bytes)",
        summary.segment_count(),
        writes.bytes_written
    );
    println!("  Elapsed:          {:.1}s", summary.elapsed.as_secs_f64());
}

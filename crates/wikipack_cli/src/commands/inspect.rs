//! Inspect command implementation.

use serde::Serialize;
use std::path::Path;
use wikipack_core::ArchiveReader;

/// Archive inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Archive path.
    pub path: String,
    /// Whether payloads are gzip-compressed.
    pub compressed: bool,
    /// On-disk format version.
    pub format_version: Option<u32>,
    /// Number of index rows.
    pub entry_count: u64,
    /// Number of redirect rows.
    pub redirect_count: u64,
    /// Number of segment files found on disk.
    pub segment_count: usize,
    /// Segment count recorded by the build.
    pub recorded_segment_count: Option<u64>,
    /// Segment size cap used by the build.
    pub max_segment_size: Option<u64>,
    /// Total size of all segment files in bytes.
    pub total_size: u64,
    /// Per-segment statistics (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentStats>>,
}

/// Statistics for a single segment.
#[derive(Debug, Serialize)]
pub struct SegmentStats {
    /// Segment id.
    pub id: u32,
    /// File size in bytes.
    pub size: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_segments: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let reader = ArchiveReader::open(path)?;
    let result = inspect(&reader, show_segments)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics about an open archive.
pub fn inspect(reader: &ArchiveReader, show_segments: bool) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let settings = reader.settings()?;
    let entries = reader.index().entries()?;
    let redirect_count = entries.iter().filter(|e| e.is_redirect()).count() as u64;
    let sizes = reader.segment_sizes()?;

    Ok(InspectResult {
        path: reader.dir().display().to_string(),
        compressed: settings.compression.is_compressed(),
        format_version: settings.format_version,
        entry_count: entries.len() as u64,
        redirect_count,
        segment_count: sizes.len(),
        recorded_segment_count: settings.segment_count,
        max_segment_size: settings.max_segment_size,
        total_size: sizes.iter().map(|(_, size)| size).sum(),
        segments: show_segments.then(|| {
            sizes
                .iter()
                .map(|(id, size)| SegmentStats {
                    id: id.as_u32(),
                    size: *size,
                })
                .collect()
        }),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("wikipack Archive Inspection");
    println!("===========================");
    println!();
    println!("Path: {}", result.path);
    println!(
        "Format version: {}",
        result
            .format_version
            .map_or_else(|| "unknown".to_string(), |v| v.to_string())
    );
    println!("Compressed: {}", result.compressed);
    println!();
    println!("Index:");
    println!("  Entries:   {}", result.entry_count);
    println!("  Redirects: {}", result.redirect_count);
    println!("  Pages:     {}", result.entry_count - result.redirect_count);
    println!();
    println!("Storage:");
    println!("  Segments:   {}", result.segment_count);
    if let Some(max) = result.max_segment_size {
        println!("  Size cap:   {}", format_size(max));
    }
    println!("  Total size: {}", format_size(result.total_size));

    if result.recorded_segment_count.is_some_and(|n| n != result.segment_count as u64) {
        println!();
        println!(
            "WARNING: index records {} segments, {} found on disk",
            result.recorded_segment_count.unwrap_or_default(),
            result.segment_count
        );
    }

    if let Some(segments) = &result.segments {
        println!();
        println!("Segments:");
        for seg in segments {
            println!("  dat.{}: {}", seg.id, format_size(seg.size));
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

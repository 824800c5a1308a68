//! Inspect command implementation.

use super::{lock_existing, read_file, CliError, Format};
use semnet_core::persist::{decode_content, decode_segment};
use semnet_core::SlotState;
use serde::Serialize;
use std::path::Path;

/// Dump inspection result.
#[derive(Debug, Default, Serialize)]
pub struct InspectResult {
    /// Knowledge-base path.
    pub path: String,
    /// Format version as `major.minor`.
    pub format_version: String,
    /// Epoch at the time of the dump.
    pub epoch: u64,
    /// Next transaction id.
    pub next_transaction_id: u64,
    /// Slots per segment.
    pub segment_size: u16,
    /// Number of segment files.
    pub segment_count: u16,
    /// Live nodes.
    pub nodes: usize,
    /// Live links.
    pub links: usize,
    /// Live connectors.
    pub connectors: usize,
    /// Free slots.
    pub free_slots: usize,
    /// Links with content.
    pub content_entries: usize,
    /// Total content bytes.
    pub content_bytes: usize,
    /// Per-segment usage (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentUsage>>,
    /// Keynode bindings (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keynodes: Option<Vec<KeynodeEntry>>,
}

/// Slot usage of one segment.
#[derive(Debug, Serialize)]
pub struct SegmentUsage {
    /// Segment id.
    pub id: u16,
    /// Live slots.
    pub live: usize,
    /// Free slots.
    pub free: usize,
}

/// One keynode binding.
#[derive(Debug, Serialize)]
pub struct KeynodeEntry {
    /// System identifier.
    pub name: String,
    /// Bound address.
    pub address: String,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_segments: bool, show_keynodes: bool, format: &str) -> Result<(), CliError> {
    let format = Format::parse(format)?;
    let result = inspect(path, show_segments, show_keynodes)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        Format::Text => print_text_output(&result),
    }
    Ok(())
}

/// Reads the dump at `path` without loading it into a context.
pub fn inspect(path: &Path, show_segments: bool, show_keynodes: bool) -> Result<InspectResult, CliError> {
    let dir = lock_existing(path)?;
    let manifest = dir
        .load_manifest()?
        .ok_or_else(|| CliError::NotFound(path.to_path_buf()))?;

    let mut result = InspectResult {
        path: path.display().to_string(),
        format_version: format!("{}.{}", manifest.format_version.0, manifest.format_version.1),
        epoch: manifest.epoch.as_u64(),
        next_transaction_id: manifest.next_transaction_id,
        segment_size: manifest.segment_size,
        segment_count: manifest.segment_count,
        ..InspectResult::default()
    };

    let mut usage = Vec::new();
    for id in 1..=manifest.segment_count {
        let image = decode_segment(&read_file(&dir.segment_path(id))?)?;
        let mut segment = SegmentUsage { id, live: 0, free: 0 };
        for (state, element) in &image.slots {
            match state {
                SlotState::Live => {
                    segment.live += 1;
                    let ty = element.element_type();
                    if ty.is_connector() {
                        result.connectors += 1;
                    } else if ty.is_link() {
                        result.links += 1;
                    } else {
                        result.nodes += 1;
                    }
                }
                _ => segment.free += 1,
            }
        }
        result.free_slots += segment.free;
        usage.push(segment);
    }
    if show_segments {
        result.segments = Some(usage);
    }

    let content_path = dir.content_path();
    if content_path.exists() {
        let entries = decode_content(&read_file(&content_path)?)?;
        result.content_entries = entries.len();
        result.content_bytes = entries.iter().map(|(_, bytes)| bytes.len()).sum();
    }

    if show_keynodes {
        result.keynodes = Some(
            manifest
                .keynodes
                .iter()
                .map(|(name, addr)| KeynodeEntry {
                    name: name.clone(),
                    address: addr.to_string(),
                })
                .collect(),
        );
    }

    Ok(result)
}

fn print_text_output(result: &InspectResult) {
    println!("SemNet Knowledge Base Inspection");
    println!("================================");
    println!();
    println!("Path:    {}", result.path);
    println!("Format:  v{}", result.format_version);
    println!("Epoch:   {}", result.epoch);
    println!("Next tx: {}", result.next_transaction_id);
    println!();
    println!("Segments:");
    println!("  Count:      {}", result.segment_count);
    println!("  Slots each: {}", result.segment_size);
    println!("  Free slots: {}", result.free_slots);
    println!();
    println!("Elements:");
    println!("  Nodes:      {}", result.nodes);
    println!("  Links:      {}", result.links);
    println!("  Connectors: {}", result.connectors);
    println!();
    println!("Content:");
    println!("  Entries: {}", result.content_entries);
    println!("  Size:    {}", format_size(result.content_bytes as u64));

    if let Some(segments) = &result.segments {
        println!();
        println!("Segment usage:");
        for segment in segments {
            println!("  [{:05}] {} live, {} free", segment.id, segment.live, segment.free);
        }
    }

    if let Some(keynodes) = &result.keynodes {
        println!();
        println!("Keynodes:");
        for keynode in keynodes {
            println!("  {} -> {}", keynode.name, keynode.address);
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

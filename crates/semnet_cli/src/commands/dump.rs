//! Dump command implementation.

use super::{open_existing, CliError, Format};
use semnet_core::{Address, Memory};
use serde::Serialize;
use std::path::Path;

/// One element as printed by `dump`.
#[derive(Debug, Serialize)]
pub struct ElementRecord {
    /// Address as `segment:offset`.
    pub address: String,
    /// Type bits, in hex.
    pub element_type: String,
    /// `node`, `link` or `connector`.
    pub kind: &'static str,
    /// Source of a connector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin: Option<String>,
    /// Target of a connector.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// Content of a link, lossily decoded as UTF-8.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Outgoing arc count.
    pub outgoing: u32,
    /// Incoming arc count.
    pub incoming: u32,
}

/// Runs the dump command.
pub fn run(path: &Path, limit: Option<usize>, format: &str) -> Result<(), CliError> {
    let format = Format::parse(format)?;
    let memory = open_existing(path)?;
    let records = collect(&memory, limit)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        Format::Text => {
            for record in &records {
                print_record(record);
            }
            println!();
            println!("{} element(s)", records.len());
        }
    }
    Ok(())
}

/// Describes up to `limit` live elements in address order.
pub fn collect(memory: &Memory, limit: Option<usize>) -> Result<Vec<ElementRecord>, CliError> {
    let addrs = memory.store().live_addresses();
    let limit = limit.unwrap_or(addrs.len());
    addrs
        .into_iter()
        .take(limit)
        .map(|addr| describe(memory, addr))
        .collect()
}

fn describe(memory: &Memory, addr: Address) -> Result<ElementRecord, CliError> {
    let ty = memory.get_element_type(addr)?;
    let mut record = ElementRecord {
        address: addr.to_string(),
        element_type: ty.to_string(),
        kind: "node",
        begin: None,
        end: None,
        content: None,
        outgoing: memory.outgoing_arcs_count(addr)?,
        incoming: memory.incoming_arcs_count(addr)?,
    };
    if ty.is_connector() {
        let (begin, end) = memory.get_arc_info(addr)?;
        record.kind = "connector";
        record.begin = Some(begin.to_string());
        record.end = Some(end.to_string());
    } else if ty.is_link() {
        let content = memory.get_link_content(addr)?;
        record.kind = "link";
        record.content = Some(String::from_utf8_lossy(content.as_bytes()).into_owned());
    }
    Ok(record)
}

fn print_record(record: &ElementRecord) {
    let mut line = format!("{:>10}  {}  {:<9}", record.address, record.element_type, record.kind);
    if let (Some(begin), Some(end)) = (&record.begin, &record.end) {
        line.push_str(&format!("  {begin} -> {end}"));
    }
    if let Some(content) = &record.content {
        line.push_str(&format!("  {content:?}"));
    }
    line.push_str(&format!("  out={} in={}", record.outgoing, record.incoming));
    println!("{line}");
}

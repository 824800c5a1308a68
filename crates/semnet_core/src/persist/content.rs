//! Link content file codec.
//!
//! ```text
//! magic "SNCT" | version u16 | record count u32
//! record: address u32 | length u32 | bytes | crc32 u32 (of address..bytes)
//! crc32 u32
//! ```

use super::{compute_crc32, push_trailer, verify_trailer, ByteReader, FORMAT_VERSION};
use crate::error::{CoreError, CoreResult};
use crate::types::Address;
use std::sync::Arc;

/// Magic bytes at the start of the content file.
pub const CONTENT_MAGIC: [u8; 4] = *b"SNCT";

/// Encodes link content entries.
#[must_use]
pub fn encode_content(entries: &[(Address, Arc<[u8]>)]) -> Vec<u8> {
    let payload: usize = entries.iter().map(|(_, bytes)| bytes.len() + 12).sum();
    let mut buf = Vec::with_capacity(10 + payload + 4);
    buf.extend_from_slice(&CONTENT_MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    let count = u32::try_from(entries.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&count.to_le_bytes());

    for (addr, bytes) in entries {
        let start = buf.len();
        buf.extend_from_slice(&addr.hash().to_le_bytes());
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(bytes);
        let crc = compute_crc32(&buf[start..]);
        buf.extend_from_slice(&crc.to_le_bytes());
    }

    push_trailer(&mut buf);
    buf
}

/// Decodes and checks the content file.
///
/// # Errors
///
/// `ChecksumMismatch` if the file or a record is damaged, `InvalidFormat`
/// for a wrong magic, version or truncated record.
pub fn decode_content(data: &[u8]) -> CoreResult<Vec<(Address, Vec<u8>)>> {
    let body = verify_trailer(data)?;
    let mut reader = ByteReader::new(body, "content file");
    reader.magic(&CONTENT_MAGIC)?;
    reader.version(FORMAT_VERSION)?;
    let count = reader.u32()?;

    let mut entries = Vec::new();
    for _ in 0..count {
        let header = reader.bytes(8)?;
        let addr = Address::from_hash(u32::from_le_bytes([
            header[0], header[1], header[2], header[3],
        ]));
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let bytes = reader.bytes(len)?;
        let expected = reader.u32()?;

        let mut record = Vec::with_capacity(8 + len);
        record.extend_from_slice(header);
        record.extend_from_slice(bytes);
        let actual = compute_crc32(&record);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }
        if addr.is_empty() {
            return Err(CoreError::invalid_format("content record for the empty address"));
        }
        entries.push((addr, bytes.to_vec()));
    }
    reader.finish()?;
    Ok(entries)
}

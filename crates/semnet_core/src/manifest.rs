//! Storage manifest.
//!
//! The manifest records what a dump contains: format version, the epoch and
//! next transaction id at dump time, the segment geometry and the keynode
//! table. It is the last file written by a dump.

use crate::error::{CoreError, CoreResult};
use crate::persist::{push_trailer, verify_trailer, ByteReader};
use crate::types::{Address, Epoch};

/// Magic bytes for manifest file.
pub const MANIFEST_MAGIC: [u8; 4] = *b"SNMF";

/// Current manifest version.
pub const MANIFEST_VERSION: u16 = 1;

/// Metadata of one dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Format version (major, minor).
    pub format_version: (u16, u16),
    /// Epoch of the last commit included in the dump.
    pub epoch: Epoch,
    /// First transaction id to hand out after reload.
    pub next_transaction_id: u64,
    /// Slots per segment of the dumping store.
    pub segment_size: u16,
    /// Number of segment files.
    pub segment_count: u16,
    /// Keynode bindings, sorted by name.
    pub keynodes: Vec<(String, Address)>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    /// Creates a manifest for an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            format_version: (1, 0),
            epoch: Epoch::default(),
            next_transaction_id: 1,
            segment_size: u16::MAX,
            segment_count: 0,
            keynodes: Vec::new(),
        }
    }

    /// Looks up a keynode binding.
    #[must_use]
    pub fn keynode(&self, name: &str) -> Option<Address> {
        self.keynodes
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|&(_, addr)| addr)
    }

    /// Encodes the manifest to bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MANIFEST_MAGIC);
        buf.extend_from_slice(&MANIFEST_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.format_version.0.to_le_bytes());
        buf.extend_from_slice(&self.format_version.1.to_le_bytes());
        buf.extend_from_slice(&self.epoch.as_u64().to_le_bytes());
        buf.extend_from_slice(&self.next_transaction_id.to_le_bytes());
        buf.extend_from_slice(&self.segment_size.to_le_bytes());
        buf.extend_from_slice(&self.segment_count.to_le_bytes());

        let count = u32::try_from(self.keynodes.len()).unwrap_or(u32::MAX);
        buf.extend_from_slice(&count.to_le_bytes());
        for (name, addr) in &self.keynodes {
            let name_bytes = name.as_bytes();
            let name_len = u16::try_from(name_bytes.len()).unwrap_or(u16::MAX);
            buf.extend_from_slice(&name_len.to_le_bytes());
            buf.extend_from_slice(&name_bytes[..usize::from(name_len)]);
            buf.extend_from_slice(&addr.hash().to_le_bytes());
        }

        push_trailer(&mut buf);
        buf
    }

    /// Decodes a manifest from bytes.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < 4 || data[..4] != MANIFEST_MAGIC {
            return Err(CoreError::invalid_format("invalid manifest magic"));
        }
        let body = verify_trailer(data)?;
        let mut reader = ByteReader::new(body, "manifest");
        reader.magic(&MANIFEST_MAGIC)?;
        reader.version(MANIFEST_VERSION)?;

        let format_version = (reader.u16()?, reader.u16()?);
        let epoch = Epoch::new(reader.u64()?);
        let next_transaction_id = reader.u64()?;
        let segment_size = reader.u16()?;
        let segment_count = reader.u16()?;

        let count = reader.u32()?;
        let mut keynodes = Vec::new();
        for _ in 0..count {
            let name_len = usize::from(reader.u16()?);
            let name = std::str::from_utf8(reader.bytes(name_len)?)
                .map_err(|_| CoreError::invalid_format("invalid keynode name"))?
                .to_string();
            let addr = Address::from_hash(reader.u32()?);
            keynodes.push((name, addr));
        }
        reader.finish()?;

        Ok(Self {
            format_version,
            epoch,
            next_transaction_id,
            segment_size,
            segment_count,
            keynodes,
        })
    }
}

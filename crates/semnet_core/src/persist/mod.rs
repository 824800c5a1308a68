//! Dump and load of the element store.
//!
//! A dump writes one file per segment under `segments/`, the link content
//! to `content.dat`, and the MANIFEST. Files are staged under temporary
//! names and published together once the new manifest is durable (see
//! [`crate::dir`]), so after a crash the directory opens as either the old
//! dump or the new one. Every file carries a CRC32 trailer; a mismatch on
//! load is fatal.
//!
//! All integers are little-endian.

mod content;
mod segment;

pub use content::{decode_content, encode_content, CONTENT_MAGIC};
pub use segment::{decode_segment, encode_segment, SEGMENT_MAGIC, SLOT_RECORD_SIZE};

use crate::dir::StorageDir;
use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use crate::store::ElementStore;
use semnet_storage::{FileBackend, StorageBackend};
use std::path::Path;
use tracing::debug;

/// Version of the segment and content file layouts.
pub const FORMAT_VERSION: u16 = 1;

/// Writes every segment and the content store, then the manifest.
///
/// Callers must keep commits out while this runs.
pub fn dump(dir: &StorageDir, store: &ElementStore, manifest: &Manifest) -> CoreResult<()> {
    dir.discard_staged()?;
    let images = store.export();
    for image in &images {
        write_staged(&dir.segment_path(image.id), &encode_segment(image))?;
    }
    write_staged(&dir.content_path(), &encode_content(&store.content().entries()))?;

    dir.stage_manifest(manifest)?;
    dir.publish_staged()?;
    dir.remove_segments_after(images.len())?;
    debug!(
        segments = images.len(),
        keynodes = manifest.keynodes.len(),
        "store dumped"
    );
    Ok(())
}

fn write_staged(path: &Path, data: &[u8]) -> CoreResult<()> {
    let mut backend = FileBackend::open_with_create_dirs(&StorageDir::staged_path(path))?;
    backend.replace(data)?;
    backend.sync()?;
    Ok(())
}

/// Replaces the contents of `store` with the dump described by `manifest`.
pub fn load(dir: &StorageDir, store: &ElementStore, manifest: &Manifest) -> CoreResult<()> {
    let mut images = Vec::with_capacity(usize::from(manifest.segment_count));
    for id in 1..=manifest.segment_count {
        let path = dir.segment_path(id);
        if !path.exists() {
            return Err(CoreError::segment_corruption(format!(
                "segment file {} is missing",
                path.display()
            )));
        }
        let backend = FileBackend::open(&path)?;
        let image = decode_segment(&backend.read_all()?)?;
        if image.id != id {
            return Err(CoreError::segment_corruption(format!(
                "file for segment {id} holds segment {}",
                image.id
            )));
        }
        images.push(image);
    }
    store.import(images)?;

    let content_path = dir.content_path();
    if content_path.exists() {
        let backend = FileBackend::open(&content_path)?;
        let data = backend.read_all()?;
        if !data.is_empty() {
            for (addr, bytes) in decode_content(&data)? {
                if !store.element_type(addr).is_ok_and(|ty| ty.is_link()) {
                    return Err(CoreError::segment_corruption(format!(
                        "content stored for {addr}, which is not a live link"
                    )));
                }
                store.content().set(addr, &bytes);
            }
        }
    }
    debug!(segments = manifest.segment_count, "store loaded");
    Ok(())
}

/// IEEE CRC32.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 == 0 {
                    crc >> 1
                } else {
                    (crc >> 1) ^ 0xEDB8_8320
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

/// Splits off and checks the CRC32 trailer, returning the body.
pub(crate) fn verify_trailer(data: &[u8]) -> CoreResult<&[u8]> {
    if data.len() < 4 {
        return Err(CoreError::invalid_format("file too short for checksum"));
    }
    let (body, trailer) = data.split_at(data.len() - 4);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = compute_crc32(body);
    if expected != actual {
        return Err(CoreError::ChecksumMismatch { expected, actual });
    }
    Ok(body)
}

/// Appends the CRC32 of everything written so far.
pub(crate) fn push_trailer(buf: &mut Vec<u8>) {
    let crc = compute_crc32(buf);
    buf.extend_from_slice(&crc.to_le_bytes());
}

/// Little-endian cursor over a decoded body.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    what: &'static str,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], what: &'static str) -> Self {
        Self { data, pos: 0, what }
    }

    pub(crate) fn bytes(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| CoreError::invalid_format(format!("{} is truncated", self.what)))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> CoreResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> CoreResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> CoreResult<u64> {
        let b = self.bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    pub(crate) fn magic(&mut self, expected: &[u8; 4]) -> CoreResult<()> {
        if self.bytes(4)? == expected {
            Ok(())
        } else {
            Err(CoreError::invalid_format(format!("bad {} magic", self.what)))
        }
    }

    pub(crate) fn version(&mut self, supported: u16) -> CoreResult<u16> {
        let version = self.u16()?;
        if version == 0 || version > supported {
            return Err(CoreError::invalid_format(format!(
                "unsupported {} version {version}",
                self.what
            )));
        }
        Ok(version)
    }

    pub(crate) fn finish(&self) -> CoreResult<()> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(CoreError::invalid_format(format!(
                "{} has {} trailing bytes",
                self.what,
                self.data.len() - self.pos
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, ElementType, Epoch};
    use tempfile::tempdir;

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn trailer_detects_flipped_bit() {
        let mut buf = b"segment body".to_vec();
        push_trailer(&mut buf);
        assert_eq!(verify_trailer(&buf).unwrap(), b"segment body");

        buf[3] ^= 0x10;
        assert!(matches!(
            verify_trailer(&buf),
            Err(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn reader_rejects_truncation() {
        let mut reader = ByteReader::new(&[1, 0, 2], "test record");
        assert_eq!(reader.u16().unwrap(), 1);
        assert!(matches!(reader.u16(), Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn dump_then_load_reproduces_graph() {
        let temp = tempdir().unwrap();
        let dir = StorageDir::open(temp.path(), true).unwrap();

        let store = ElementStore::new(4, 8);
        let a = store.allocate(ElementType::CONST_NODE).unwrap();
        let link = store.allocate(ElementType::CONST_LINK).unwrap();
        let arc = store.connect(ElementType::CONST_PERM_POS_ARC, a, link).unwrap();
        let spare = store.allocate(ElementType::CONST_NODE).unwrap();
        let far = store.allocate(ElementType::VAR_NODE).unwrap();
        store.erase(spare).unwrap();
        store.set_content(link, b"hello").unwrap();

        let mut manifest = Manifest::new();
        manifest.epoch = Epoch::new(5);
        manifest.segment_count = store.segment_count() as u16;
        dump(&dir, &store, &manifest).unwrap();

        let loaded_manifest = dir.load_manifest().unwrap().unwrap();
        let restored = ElementStore::new(4, 8);
        load(&dir, &restored, &loaded_manifest).unwrap();

        assert_eq!(restored.arc_info(arc).unwrap(), (a, link));
        assert_eq!(restored.outgoing_arcs(a).unwrap(), vec![arc]);
        assert_eq!(restored.incoming_count(link).unwrap(), 1);
        assert_eq!(&*restored.get_content(link).unwrap(), b"hello");
        assert_eq!(restored.element_type(far).unwrap(), ElementType::VAR_NODE);
        assert!(!restored.is_element(spare));
        assert_eq!(restored.stats(), store.stats());

        // the freed slot is reused with a newer generation than before
        let reused = restored.allocate(ElementType::CONST_NODE).unwrap();
        assert_eq!(reused, spare);
        assert!(restored.get(reused).unwrap().generation() > store.get(a).unwrap().generation());
    }

    #[test]
    fn missing_segment_file_is_corruption() {
        let temp = tempdir().unwrap();
        let dir = StorageDir::open(temp.path(), true).unwrap();
        let mut manifest = Manifest::new();
        manifest.segment_count = 1;
        let store = ElementStore::new(4, 8);
        assert!(matches!(
            load(&dir, &store, &manifest),
            Err(CoreError::SegmentCorruption { .. })
        ));
        assert!(!store.is_element(Address::new(1, 0)));
    }

    #[test]
    fn redump_replaces_files_and_leaves_nothing_staged() {
        let temp = tempdir().unwrap();
        let dir = StorageDir::open(temp.path(), true).unwrap();
        let store = ElementStore::new(2, 8);
        for _ in 0..5 {
            store.allocate(ElementType::CONST_NODE).unwrap();
        }
        let mut manifest = Manifest::new();
        manifest.segment_count = store.segment_count() as u16;
        dump(&dir, &store, &manifest).unwrap();
        assert!(dir.segment_path(3).exists());

        let smaller = ElementStore::new(2, 8);
        let kept = smaller.allocate(ElementType::CONST_NODE_CLASS).unwrap();
        manifest.epoch = Epoch::new(9);
        manifest.segment_count = smaller.segment_count() as u16;
        dump(&dir, &smaller, &manifest).unwrap();

        assert!(!dir.segment_path(2).exists());
        assert!(!StorageDir::staged_path(&dir.segment_path(1)).exists());
        assert!(!StorageDir::staged_path(&dir.content_path()).exists());
        assert!(!temp.path().join("MANIFEST.next").exists());

        let loaded_manifest = dir.load_manifest().unwrap().unwrap();
        assert_eq!(loaded_manifest.epoch, Epoch::new(9));
        let restored = ElementStore::new(2, 8);
        load(&dir, &restored, &loaded_manifest).unwrap();
        assert_eq!(restored.element_type(kept).unwrap(), ElementType::CONST_NODE_CLASS);
        assert_eq!(restored.stats().total(), 1);
    }
}

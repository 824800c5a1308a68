//! Segment file codec.
//!
//! ```text
//! magic "SNSG" | version u16 | segment id u16 | slot count u32
//! slot record * count
//! crc32 u32
//! ```
//!
//! A slot record is 56 bytes: state u8, reserved u8, type u16,
//! generation u32, version u64, outgoing count u32, incoming count u32,
//! then eight addresses packed by [`Address::hash`]: first outgoing,
//! first incoming, begin, end, next outgoing, previous outgoing,
//! next incoming, previous incoming.

use super::{push_trailer, verify_trailer, ByteReader, FORMAT_VERSION};
use crate::error::{CoreError, CoreResult};
use crate::store::{Element, SegmentImage, SlotState};
use crate::types::{Address, ElementType};

/// Magic bytes at the start of a segment file.
pub const SEGMENT_MAGIC: [u8; 4] = *b"SNSG";

/// Encoded size of one slot.
pub const SLOT_RECORD_SIZE: usize = 56;

const STATE_FREE: u8 = 0;
const STATE_LIVE: u8 = 1;

/// Encodes a segment image. Anything but a live slot is written as free.
#[must_use]
pub fn encode_segment(image: &SegmentImage) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + image.slots.len() * SLOT_RECORD_SIZE + 4);
    buf.extend_from_slice(&SEGMENT_MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&image.id.to_le_bytes());
    let count = u32::try_from(image.slots.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&count.to_le_bytes());

    for (state, element) in &image.slots {
        let live = *state == SlotState::Live;
        buf.push(if live { STATE_LIVE } else { STATE_FREE });
        buf.push(0);
        let ty = if live { element.ty } else { ElementType::EMPTY };
        buf.extend_from_slice(&ty.bits().to_le_bytes());
        buf.extend_from_slice(&element.generation.to_le_bytes());
        if live {
            buf.extend_from_slice(&element.version.to_le_bytes());
            buf.extend_from_slice(&element.out_count.to_le_bytes());
            buf.extend_from_slice(&element.in_count.to_le_bytes());
            for addr in links_of(element) {
                buf.extend_from_slice(&addr.hash().to_le_bytes());
            }
        } else {
            buf.extend_from_slice(&[0u8; SLOT_RECORD_SIZE - 8]);
        }
    }

    push_trailer(&mut buf);
    buf
}

/// Decodes and checks a segment file.
///
/// # Errors
///
/// `ChecksumMismatch` for a damaged file, `InvalidFormat` for a wrong
/// magic or version, `SegmentCorruption` for records that cannot be valid.
pub fn decode_segment(data: &[u8]) -> CoreResult<SegmentImage> {
    let body = verify_trailer(data)?;
    let mut reader = ByteReader::new(body, "segment");
    reader.magic(&SEGMENT_MAGIC)?;
    reader.version(FORMAT_VERSION)?;
    let id = reader.u16()?;
    if id == 0 {
        return Err(CoreError::segment_corruption("segment id 0 is reserved"));
    }
    let count = reader.u32()? as usize;
    if count > usize::from(u16::MAX) + 1 {
        return Err(CoreError::segment_corruption(format!(
            "segment {id} claims {count} slots"
        )));
    }

    let mut slots = Vec::with_capacity(count);
    for offset in 0..count {
        let state = reader.u8()?;
        reader.u8()?;
        let ty = ElementType::from_bits(reader.u16()?);
        let generation = reader.u32()?;
        let version = reader.u64()?;
        let out_count = reader.u32()?;
        let in_count = reader.u32()?;
        let mut addrs = [Address::EMPTY; 8];
        for addr in &mut addrs {
            *addr = Address::from_hash(reader.u32()?);
        }

        match state {
            STATE_FREE => slots.push((
                SlotState::Free,
                Element::new(ElementType::EMPTY, generation),
            )),
            STATE_LIVE => {
                if !ty.is_valid_element() {
                    return Err(CoreError::segment_corruption(format!(
                        "slot {id}:{offset} holds invalid type {ty}"
                    )));
                }
                let [first_out, first_in, begin, end, next_out, prev_out, next_in, prev_in] =
                    addrs;
                slots.push((
                    SlotState::Live,
                    Element {
                        ty,
                        generation,
                        version,
                        first_out,
                        first_in,
                        out_count,
                        in_count,
                        begin,
                        end,
                        next_out,
                        prev_out,
                        next_in,
                        prev_in,
                    },
                ));
            }
            other => {
                return Err(CoreError::segment_corruption(format!(
                    "slot {id}:{offset} has unknown state {other}"
                )))
            }
        }
    }
    reader.finish()?;
    Ok(SegmentImage { id, slots })
}

fn links_of(element: &Element) -> [Address; 8] {
    [
        element.first_out,
        element.first_in,
        element.begin,
        element.end,
        element.next_out,
        element.prev_out,
        element.next_in,
        element.prev_in,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ElementStore;

    fn sample_image() -> SegmentImage {
        let store = ElementStore::new(8, 1);
        let a = store.allocate(ElementType::CONST_NODE_CLASS).unwrap();
        let b = store.allocate(ElementType::CONST_NODE).unwrap();
        store.connect(ElementType::CONST_PERM_POS_ARC, a, b).unwrap();
        let gone = store.allocate(ElementType::CONST_LINK).unwrap();
        store.erase(gone).unwrap();
        store.export().remove(0)
    }

    #[test]
    fn records_have_fixed_size() {
        let image = sample_image();
        let encoded = encode_segment(&image);
        assert_eq!(encoded.len(), 12 + image.slots.len() * SLOT_RECORD_SIZE + 4);
        assert_eq!(&encoded[..4], b"SNSG");
    }

    #[test]
    fn decode_restores_records() {
        let image = sample_image();
        let decoded = decode_segment(&encode_segment(&image)).unwrap();
        assert_eq!(decoded.id, image.id);
        assert_eq!(decoded.slots, image.slots);
    }

    #[test]
    fn damaged_file_is_rejected() {
        let mut encoded = encode_segment(&sample_image());
        encoded[20] ^= 0xFF;
        assert!(matches!(
            decode_segment(&encoded),
            Err(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn unknown_state_is_corruption() {
        let image = sample_image();
        let mut encoded = encode_segment(&image);
        encoded.truncate(encoded.len() - 4);
        encoded[12] = 7;
        push_trailer(&mut encoded);
        assert!(matches!(
            decode_segment(&encoded),
            Err(CoreError::SegmentCorruption { .. })
        ));
    }

    #[test]
    fn wrong_magic_is_invalid_format() {
        let mut encoded = b"XXXX".to_vec();
        encoded.extend_from_slice(&[1, 0, 1, 0, 0, 0, 0, 0]);
        push_trailer(&mut encoded);
        assert!(matches!(
            decode_segment(&encoded),
            Err(CoreError::InvalidFormat { .. })
        ));
    }
}

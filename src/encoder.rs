//! Two-pass byte encoder turning a builder tree into an EXIF block.
//!
//! Offsets in an IFD are absolute within the block, and a directory's size
//! depends on whether each value spills to the data area while child
//! directories occupy variable space recursively. The encoder therefore
//! runs a size pass that resolves every directory's extent into a prepared
//! tree, then an offset pass that writes into a buffer sized up front.
//! The builder tree itself is only read, never modified.

use std::collections::HashSet;

use crate::builder::{BuilderTag, BuilderTagValue, IfdBuilder};
use crate::error::{EncodeError, ExifError, ExifResult};
use crate::registry::{STRIP_BYTE_COUNTS, STRIP_OFFSETS};
use crate::tags::{ByteOrder, Type};

/// Offset at which the first IFD lands, immediately after the TIFF header.
pub const EXIF_DEFAULT_FIRST_IFD_OFFSET: u32 = 8;

const ENTRY_SIZE: u32 = 12;

/// Serializes a builder tree into a self-contained EXIF block.
#[derive(Debug, Default)]
pub struct IfdByteEncoder {}

impl IfdByteEncoder {
    pub fn new() -> IfdByteEncoder {
        IfdByteEncoder::default()
    }

    /// Encodes the chain rooted at `root` into a TIFF-structured block,
    /// including the 8-byte header.
    ///
    /// The output is a pure function of the tree and its byte order: no
    /// state is cached between invocations, and a fresh size pass runs
    /// every time to tolerate intervening mutation.
    pub fn encode_to_exif(&self, root: &IfdBuilder) -> ExifResult<Vec<u8>> {
        let mut visited = HashSet::new();
        let prepared = prepare(root, &mut visited)?;

        let mut total = EXIF_DEFAULT_FIRST_IFD_OFFSET;
        let mut cursor = Some(&prepared);
        while let Some(ifd) = cursor {
            total = total
                .checked_add(ifd.total_size)
                .ok_or(ExifError::IntSizeError)?;
            cursor = ifd.next.as_deref();
        }

        let byte_order = root.byte_order();
        let mut out = vec![0u8; total as usize];
        match byte_order {
            ByteOrder::LittleEndian => out[..2].copy_from_slice(b"II"),
            ByteOrder::BigEndian => out[..2].copy_from_slice(b"MM"),
        }
        byte_order.set_u16(&mut out[2..], 0x002a);
        byte_order.set_u32(&mut out[4..], EXIF_DEFAULT_FIRST_IFD_OFFSET);

        // Siblings lay out as concatenated self-contained subtrees; each
        // next-IFD pointer lands after the whole prior subtree.
        let mut base = EXIF_DEFAULT_FIRST_IFD_OFFSET;
        let mut cursor = Some(&prepared);
        while let Some(ifd) = cursor {
            let next_base = match ifd.next {
                Some(_) => base + ifd.total_size,
                None => 0,
            };
            write_ifd(ifd, base, next_base, &mut out);
            base += ifd.total_size;
            cursor = ifd.next.as_deref();
        }
        Ok(out)
    }
}

struct PreparedIfd<'a> {
    byte_order: ByteOrder,
    entries: Vec<PreparedEntry<'a>>,
    thumbnail: Option<&'a [u8]>,
    table_size: u32,
    child_size: u32,
    spilled_size: u32,
    total_size: u32,
    next: Option<Box<PreparedIfd<'a>>>,
}

struct PreparedEntry<'a> {
    tag_id: u16,
    type_id: Type,
    count: u32,
    payload: PreparedPayload<'a>,
}

enum PreparedPayload<'a> {
    /// Value bytes of at most 4 bytes, zero-padded into the value field.
    Inline([u8; 4]),
    /// Value bytes that spill to the directory's data area.
    Spilled(&'a [u8]),
    /// A nested directory, interleaved into this directory's region.
    Child(PreparedIfd<'a>),
    /// Placeholder for the synthesized thumbnail strip offset.
    ThumbnailOffset,
}

/// Size pass: resolves entry order, payload placement, and extents.
fn prepare<'a>(builder: &'a IfdBuilder, visited: &mut HashSet<usize>) -> ExifResult<PreparedIfd<'a>> {
    // Ownership makes a repeat node a cycle through child/sibling links.
    if !visited.insert(builder as *const IfdBuilder as usize) {
        return Err(EncodeError::CycleDetected.into());
    }
    let byte_order = builder.byte_order();

    let mut sorted: Vec<&BuilderTag> = builder.tags().iter().collect();
    if builder.thumbnail().is_some() {
        // The strip location pair is synthesized below, never carried over.
        sorted.retain(|tag| tag.tag_id() != STRIP_OFFSETS && tag.tag_id() != STRIP_BYTE_COUNTS);
    }
    // Stable: duplicates keep their insertion order.
    sorted.sort_by_key(|tag| tag.tag_id());

    let mut entries = Vec::with_capacity(sorted.len() + 2);
    for tag in sorted {
        let entry = match tag.value() {
            BuilderTagValue::Child(child) => PreparedEntry {
                tag_id: tag.tag_id(),
                type_id: Type::LONG,
                count: 1,
                payload: PreparedPayload::Child(prepare(child, visited)?),
            },
            BuilderTagValue::Bytes(raw) => {
                let count = u32::try_from(raw.len() / tag.type_id().byte_len()).map_err(|_| {
                    EncodeError::ValueTooLarge {
                        tag_id: tag.tag_id(),
                    }
                })?;
                let payload = if raw.len() <= 4 {
                    let mut inline = [0u8; 4];
                    inline[..raw.len()].copy_from_slice(raw);
                    PreparedPayload::Inline(inline)
                } else {
                    PreparedPayload::Spilled(raw)
                };
                PreparedEntry {
                    tag_id: tag.tag_id(),
                    type_id: tag.type_id(),
                    count,
                    payload,
                }
            }
        };
        entries.push(entry);
    }

    let thumbnail = builder.thumbnail();
    if let Some(data) = thumbnail {
        let length = u32::try_from(data.len())?;
        let mut inline = [0u8; 4];
        byte_order.set_u32(&mut inline, length);
        entries.push(PreparedEntry {
            tag_id: STRIP_OFFSETS,
            type_id: Type::LONG,
            count: 1,
            payload: PreparedPayload::ThumbnailOffset,
        });
        entries.push(PreparedEntry {
            tag_id: STRIP_BYTE_COUNTS,
            type_id: Type::LONG,
            count: 1,
            payload: PreparedPayload::Inline(inline),
        });
        entries.sort_by_key(|entry| entry.tag_id);
    }

    if entries.len() > usize::from(u16::MAX) {
        return Err(EncodeError::TooManyEntries(entries.len()).into());
    }
    let table_size = 2 + ENTRY_SIZE * entries.len() as u32 + 4;

    let mut child_size = 0u32;
    let mut spilled_size = 0u32;
    for entry in &entries {
        match &entry.payload {
            PreparedPayload::Child(child) => {
                child_size = child_size
                    .checked_add(child.total_size)
                    .ok_or(ExifError::IntSizeError)?;
            }
            PreparedPayload::Spilled(raw) => {
                let length = u32::try_from(raw.len())?;
                spilled_size = spilled_size
                    .checked_add(length)
                    .ok_or(ExifError::IntSizeError)?;
            }
            PreparedPayload::Inline(_) | PreparedPayload::ThumbnailOffset => {}
        }
    }
    let thumbnail_size = match thumbnail {
        Some(data) => u32::try_from(data.len())?,
        None => 0,
    };
    let total_size = table_size
        .checked_add(child_size)
        .and_then(|sum| sum.checked_add(spilled_size))
        .and_then(|sum| sum.checked_add(thumbnail_size))
        .ok_or(ExifError::IntSizeError)?;

    let next = match builder.next_ifd() {
        Some(next) => Some(Box::new(prepare(next, visited)?)),
        None => None,
    };
    Ok(PreparedIfd {
        byte_order,
        entries,
        thumbnail,
        table_size,
        child_size,
        spilled_size,
        total_size,
        next,
    })
}

/// Offset pass: writes the entry table at `base`, children right after it,
/// then the data area, with every offset absolute within the block.
fn write_ifd(ifd: &PreparedIfd, base: u32, next_ifd_offset: u32, out: &mut [u8]) {
    let byte_order = ifd.byte_order;
    let mut pos = base as usize;
    byte_order.set_u16(&mut out[pos..], ifd.entries.len() as u16);
    pos += 2;

    let mut next_child = base + ifd.table_size;
    let mut next_data = base + ifd.table_size + ifd.child_size;
    let thumbnail_offset = next_data + ifd.spilled_size;

    for entry in &ifd.entries {
        byte_order.set_u16(&mut out[pos..], entry.tag_id);
        byte_order.set_u16(&mut out[pos + 2..], entry.type_id.to_u16());
        byte_order.set_u32(&mut out[pos + 4..], entry.count);
        match &entry.payload {
            PreparedPayload::Inline(raw) => {
                out[pos + 8..pos + 12].copy_from_slice(raw);
            }
            PreparedPayload::Spilled(raw) => {
                byte_order.set_u32(&mut out[pos + 8..], next_data);
                let start = next_data as usize;
                out[start..start + raw.len()].copy_from_slice(raw);
                next_data += raw.len() as u32;
            }
            PreparedPayload::Child(child) => {
                byte_order.set_u32(&mut out[pos + 8..], next_child);
                write_ifd(child, next_child, 0, out);
                next_child += child.total_size;
            }
            PreparedPayload::ThumbnailOffset => {
                byte_order.set_u32(&mut out[pos + 8..], thumbnail_offset);
            }
        }
        pos += ENTRY_SIZE as usize;
    }
    byte_order.set_u32(&mut out[pos..], next_ifd_offset);

    if let Some(data) = ifd.thumbnail {
        let start = thumbnail_offset as usize;
        out[start..start + data.len()].copy_from_slice(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{IfdMapping, TagIndex};
    use std::sync::Arc;

    fn new_root() -> IfdBuilder {
        IfdBuilder::new(
            Arc::new(IfdMapping::standard()),
            Arc::new(TagIndex::standard()),
            "IFD",
            ByteOrder::BigEndian,
        )
        .unwrap()
    }

    #[test]
    fn size_pass_accounts_for_spill() {
        let mut root = new_root();
        root.add_standard_with_name("ImageDescription", "Sample").unwrap();
        root.add_standard_with_name("Orientation", 1u16).unwrap();

        let mut visited = HashSet::new();
        let prepared = prepare(&root, &mut visited).unwrap();
        // 2 + 2 * 12 + 4 for the table, plus "Sample\0" in the data area.
        assert_eq!(prepared.table_size, 30);
        assert_eq!(prepared.child_size, 0);
        assert_eq!(prepared.spilled_size, 7);
        assert_eq!(prepared.total_size, 37);
    }

    #[test]
    fn size_pass_interleaves_children() {
        let mut root = new_root();
        root.get_or_create("IFD/Exif").unwrap();

        let mut visited = HashSet::new();
        let prepared = prepare(&root, &mut visited).unwrap();
        assert_eq!(prepared.table_size, 18);
        // An empty child still owns a table of its own.
        assert_eq!(prepared.child_size, 6);
        assert_eq!(prepared.total_size, 24);
    }

    #[test]
    fn short_values_pad_inline() {
        let mut root = new_root();
        root.add_standard_with_name("ImageDescription", "ab").unwrap();

        let mut visited = HashSet::new();
        let prepared = prepare(&root, &mut visited).unwrap();
        assert_eq!(prepared.spilled_size, 0);
        match &prepared.entries[0].payload {
            PreparedPayload::Inline(raw) => assert_eq!(raw, b"ab\x00\x00"),
            _ => panic!("value should stay inline"),
        }
        assert_eq!(prepared.entries[0].count, 3);
    }

    #[test]
    fn thumbnail_synthesizes_strip_pair() {
        let mut root = new_root();
        let sibling = root.get_or_create("IFD1").unwrap();
        sibling.set_thumbnail(b"JPEG".to_vec()).unwrap();

        let mut visited = HashSet::new();
        let prepared = prepare(&root, &mut visited).unwrap();
        let sibling = prepared.next.as_deref().unwrap();
        let ids: Vec<u16> = sibling.entries.iter().map(|entry| entry.tag_id).collect();
        assert_eq!(ids, vec![STRIP_OFFSETS, STRIP_BYTE_COUNTS]);
        assert_eq!(sibling.total_size, 30 + 4);
    }
}

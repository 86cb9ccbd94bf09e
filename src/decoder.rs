//! Decoding of an EXIF block into a read-only tree of parsed directories.
//!
//! The parsed tree is the input shape for [`IfdBuilder::from_existing_chain`]
//! and [`IfdBuilder::add_tags_from_existing`]; entry payloads are kept as the
//! verbatim, byte-ordered value bytes so the writeback path can reproduce
//! them exactly.
//!
//! [`IfdBuilder::from_existing_chain`]: crate::IfdBuilder::from_existing_chain
//! [`IfdBuilder::add_tags_from_existing`]: crate::IfdBuilder::add_tags_from_existing

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{BuildError, ExifResult, FormatError};
use crate::registry::{
    self, IfdMapping, TagIndex, ROOT_IFD_PATH, STRIP_BYTE_COUNTS, STRIP_OFFSETS,
};
use crate::tags::{ByteOrder, Type};
use crate::value::TagData;

const TIFF_VERSION: u16 = 0x002a;

/// A single parsed directory entry.
#[derive(Debug, Clone)]
pub struct IfdEntry {
    tag_id: u16,
    type_id: Type,
    count: u32,
    raw_value: Vec<u8>,
    value_offset: Option<u32>,
    child: Option<Box<Ifd>>,
}

impl IfdEntry {
    pub fn tag_id(&self) -> u16 {
        self.tag_id
    }

    pub fn type_id(&self) -> Type {
        self.type_id
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// The on-wire value bytes, exactly as stored (inline or spilled).
    pub fn raw_value(&self) -> &[u8] {
        &self.raw_value
    }

    /// Absolute offset of the payload in the data area, for values that
    /// spilled out of the 4-byte value field.
    pub fn value_offset(&self) -> Option<u32> {
        self.value_offset
    }

    /// The nested directory this entry points at, for child-IFD tags.
    pub fn child(&self) -> Option<&Ifd> {
        self.child.as_deref()
    }

    /// Canonical path of the nested directory, for child-IFD tags.
    pub fn child_ifd_path(&self) -> Option<&str> {
        self.child.as_deref().map(Ifd::ifd_path)
    }

    /// Decodes the raw value through the typed codec.
    pub fn value(&self, byte_order: ByteOrder) -> ExifResult<TagData> {
        TagData::decode(self.tag_id, self.type_id, &self.raw_value, byte_order)
    }
}

/// A parsed, read-only Image File Directory.
#[derive(Debug, Clone)]
pub struct Ifd {
    ifd_path: String,
    fq_ifd_path: String,
    index: u32,
    ifd_tag_id: u16,
    byte_order: ByteOrder,
    offset: u32,
    entries: Vec<IfdEntry>,
    next_ifd: Option<Box<Ifd>>,
    thumbnail: Option<Vec<u8>>,
    mapping: Arc<IfdMapping>,
    tag_index: Arc<TagIndex>,
}

impl Ifd {
    pub fn ifd_path(&self) -> &str {
        &self.ifd_path
    }

    pub fn fq_ifd_path(&self) -> &str {
        &self.fq_ifd_path
    }

    /// Zero-based position in the top-level sibling chain.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Tag in the parent that pointed here; 0 for top-level directories.
    pub fn ifd_tag_id(&self) -> u16 {
        self.ifd_tag_id
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Absolute offset of this directory's entry table within the block.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Entries in their on-wire order.
    pub fn entries(&self) -> &[IfdEntry] {
        &self.entries
    }

    pub fn next_ifd(&self) -> Option<&Ifd> {
        self.next_ifd.as_deref()
    }

    /// Thumbnail payload carried by this directory, if any.
    pub fn thumbnail(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    pub(crate) fn mapping(&self) -> Arc<IfdMapping> {
        Arc::clone(&self.mapping)
    }

    pub(crate) fn tag_index(&self) -> Arc<TagIndex> {
        Arc::clone(&self.tag_index)
    }

    /// Resolves `name` through the registry and returns the first entry
    /// with the resolved id.
    pub fn find_tag_with_name(&self, name: &str) -> ExifResult<&IfdEntry> {
        let definition = self.tag_index.get_by_name(&self.ifd_path, name)?;
        self.entries
            .iter()
            .find(|entry| entry.tag_id == definition.id)
            .ok_or_else(|| BuildError::TagEntryNotFound(definition.id).into())
    }
}

/// Walks a fully-qualified path from a parsed root directory.
pub fn find_ifd_from_root<'a>(root: &'a Ifd, fq_path: &str) -> ExifResult<&'a Ifd> {
    let segments = registry::parse_fq_path(fq_path)?;
    let (first, rest) = segments
        .split_first()
        .ok_or_else(|| BuildError::MalformedPath(fq_path.to_owned()))?;
    if first.name != root.ifd_path {
        return Err(BuildError::IfdPathMismatch {
            expected: root.ifd_path.clone(),
            actual: first.name.clone(),
        }
        .into());
    }

    let mut current = root;
    for _ in 0..first.index {
        current = current
            .next_ifd()
            .ok_or_else(|| BuildError::IfdNotFound(fq_path.to_owned()))?;
    }
    for segment in rest {
        if segment.index != 0 {
            return Err(BuildError::IfdNotFound(fq_path.to_owned()).into());
        }
        current = current
            .entries
            .iter()
            .filter_map(IfdEntry::child)
            .find(|child| {
                child
                    .ifd_path
                    .rsplit('/')
                    .next()
                    .is_some_and(|name| name == segment.name)
            })
            .ok_or_else(|| BuildError::IfdNotFound(fq_path.to_owned()))?;
    }
    Ok(current)
}

/// Parses an EXIF block (a TIFF-structured buffer starting with the byte
/// order signature) into its chain of directories.
pub fn decode_exif(
    mapping: Arc<IfdMapping>,
    tag_index: Arc<TagIndex>,
    data: &[u8],
) -> ExifResult<Ifd> {
    if data.len() < 8 {
        return Err(FormatError::Truncated.into());
    }
    let byte_order = match &data[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return Err(FormatError::SignatureInvalid.into()),
    };
    let version = byte_order.get_u16(&data[2..4]);
    if version != TIFF_VERSION {
        return Err(FormatError::VersionInvalid(version).into());
    }
    let first_ifd_offset = byte_order.get_u32(&data[4..8]);

    let mut parser = Parser {
        data,
        byte_order,
        mapping,
        tag_index,
        visited: HashSet::new(),
    };
    parser.parse_chain(first_ifd_offset)
}

struct Parser<'a> {
    data: &'a [u8],
    byte_order: ByteOrder,
    mapping: Arc<IfdMapping>,
    tag_index: Arc<TagIndex>,
    visited: HashSet<u32>,
}

impl<'a> Parser<'a> {
    /// Parses the top-level sibling chain rooted at `offset`.
    fn parse_chain(&mut self, offset: u32) -> ExifResult<Ifd> {
        let mut chain: Vec<Ifd> = Vec::new();
        let mut next_offset = offset;
        while next_offset != 0 {
            let index = chain.len() as u32;
            let fq_ifd_path = fq_path_for(ROOT_IFD_PATH, index);
            let (ifd, next) =
                self.parse_ifd(next_offset, ROOT_IFD_PATH.to_owned(), fq_ifd_path, index, 0)?;
            chain.push(ifd);
            next_offset = next;
        }

        let mut root = None;
        for mut ifd in chain.into_iter().rev() {
            ifd.next_ifd = root.take().map(Box::new);
            root = Some(ifd);
        }
        // A first-IFD offset of zero leaves the chain empty.
        root.ok_or_else(|| FormatError::Truncated.into())
    }

    /// Parses one directory; returns it plus its next-IFD offset.
    fn parse_ifd(
        &mut self,
        offset: u32,
        ifd_path: String,
        fq_ifd_path: String,
        index: u32,
        ifd_tag_id: u16,
    ) -> ExifResult<(Ifd, u32)> {
        if !self.visited.insert(offset) {
            return Err(FormatError::CycleInOffsets.into());
        }

        let start = offset as usize;
        if self.data.len() < start + 2 {
            return Err(FormatError::Truncated.into());
        }
        let count = self.byte_order.get_u16(&self.data[start..]) as usize;
        let table_end = start + 2 + count * 12;
        if self.data.len() < table_end + 4 {
            return Err(FormatError::Truncated.into());
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let entry_start = start + 2 + i * 12;
            entries.push(self.parse_entry(entry_start, &ifd_path, &fq_ifd_path)?);
        }
        let next_ifd_offset = self.byte_order.get_u32(&self.data[table_end..]);

        let thumbnail = if ifd_path == ROOT_IFD_PATH && index == 1 {
            self.extract_thumbnail(&entries)?
        } else {
            None
        };

        let ifd = Ifd {
            ifd_path,
            fq_ifd_path,
            index,
            ifd_tag_id,
            byte_order: self.byte_order,
            offset,
            entries,
            next_ifd: None,
            thumbnail,
            mapping: Arc::clone(&self.mapping),
            tag_index: Arc::clone(&self.tag_index),
        };
        Ok((ifd, next_ifd_offset))
    }

    fn parse_entry(
        &mut self,
        entry_start: usize,
        ifd_path: &str,
        fq_ifd_path: &str,
    ) -> ExifResult<IfdEntry> {
        let raw = &self.data[entry_start..entry_start + 12];
        let tag_id = self.byte_order.get_u16(raw);
        let type_code = self.byte_order.get_u16(&raw[2..]);
        let type_id =
            Type::from_u16(type_code).ok_or(FormatError::UnknownFieldType(type_code))?;
        let count = self.byte_order.get_u32(&raw[4..]);

        let length = (count as u64)
            .checked_mul(type_id.byte_len() as u64)
            .ok_or(FormatError::Truncated)?;
        let (raw_value, value_offset) = if length <= 4 {
            (raw[8..8 + length as usize].to_vec(), None)
        } else {
            let value_offset = self.byte_order.get_u32(&raw[8..]);
            (
                self.slice_at(value_offset, length)?.to_vec(),
                Some(value_offset),
            )
        };

        // A registered child-pointer tag makes this entry a nested directory.
        let child_name = self
            .mapping
            .child_name_for_tag(ifd_path, tag_id)
            .map(str::to_owned);
        let child = match child_name {
            Some(name) if raw_value.len() == 4 => {
                let child_offset = self.byte_order.get_u32(&raw_value);
                let child_path = format!("{ifd_path}/{name}");
                let child_fq_path = format!("{fq_ifd_path}/{name}");
                let (child, _) =
                    self.parse_ifd(child_offset, child_path, child_fq_path, 0, tag_id)?;
                Some(Box::new(child))
            }
            _ => None,
        };

        Ok(IfdEntry {
            tag_id,
            type_id,
            count,
            raw_value,
            value_offset,
            child,
        })
    }

    /// Pulls the thumbnail payload referenced by the strip location pair.
    fn extract_thumbnail(&self, entries: &[IfdEntry]) -> ExifResult<Option<Vec<u8>>> {
        let locate = |wanted: u16| {
            entries
                .iter()
                .find(|entry| entry.tag_id == wanted && entry.raw_value.len() == 4)
                .map(|entry| self.byte_order.get_u32(&entry.raw_value))
        };
        let (offset, length) = match (locate(STRIP_OFFSETS), locate(STRIP_BYTE_COUNTS)) {
            (Some(offset), Some(length)) => (offset, length),
            _ => return Ok(None),
        };
        Ok(Some(self.slice_at(offset, length as u64)?.to_vec()))
    }

    fn slice_at(&self, offset: u32, length: u64) -> ExifResult<&'a [u8]> {
        let start = offset as usize;
        let end = start
            .checked_add(usize::try_from(length)?)
            .ok_or(FormatError::Truncated)?;
        if self.data.len() < end {
            return Err(FormatError::ValueOutOfBounds {
                offset,
                length: length as u32,
            }
            .into());
        }
        Ok(&self.data[start..end])
    }
}

pub(crate) fn fq_path_for(ifd_path: &str, index: u32) -> String {
    if index == 0 {
        ifd_path.to_owned()
    } else {
        format!("{ifd_path}{index}")
    }
}

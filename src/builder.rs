//! The mutable directory tree and its editing operations.
//!
//! An [`IfdBuilder`] owns an ordered tag list, its child directories
//! (through [`BuilderTagValue::Child`] values), and an optional next
//! sibling. Parents are never back-referenced; operations that need
//! ancestor context, like [`IfdBuilder::get_or_create`], start from the
//! root builder instead.

use std::sync::Arc;

use itertools::Itertools;

use crate::decoder::{fq_path_for, Ifd};
use crate::error::{BuildError, ExifResult};
use crate::registry::{
    self, IfdMapping, TagDefinition, TagIndex, ROOT_IFD_PATH, STRIP_BYTE_COUNTS, STRIP_OFFSETS,
};
use crate::tags::{ByteOrder, Type};
use crate::value::TagData;

/// Value held by a builder tag: either the concrete on-wire bytes, or a
/// child directory whose 4-byte offset only exists at encode time.
///
/// The container is write-once; editing a tag replaces the whole value.
#[derive(Debug)]
pub enum BuilderTagValue {
    Bytes(Vec<u8>),
    Child(Box<IfdBuilder>),
}

impl BuilderTagValue {
    pub fn from_bytes(raw: Vec<u8>) -> BuilderTagValue {
        BuilderTagValue::Bytes(raw)
    }

    pub fn from_child(child: IfdBuilder) -> BuilderTagValue {
        BuilderTagValue::Child(Box::new(child))
    }

    pub fn is_child(&self) -> bool {
        matches!(self, BuilderTagValue::Child(_))
    }

    /// The inline bytes; fails for child references.
    pub fn bytes(&self) -> ExifResult<&[u8]> {
        match self {
            BuilderTagValue::Bytes(raw) => Ok(raw),
            BuilderTagValue::Child(_) => Err(BuildError::ValueNotInline.into()),
        }
    }

    /// The child directory; fails for inline values.
    pub fn child(&self) -> ExifResult<&IfdBuilder> {
        match self {
            BuilderTagValue::Child(child) => Ok(child),
            BuilderTagValue::Bytes(_) => Err(BuildError::ValueNotChild.into()),
        }
    }

    pub fn child_mut(&mut self) -> ExifResult<&mut IfdBuilder> {
        match self {
            BuilderTagValue::Child(child) => Ok(child),
            BuilderTagValue::Bytes(_) => Err(BuildError::ValueNotChild.into()),
        }
    }
}

/// A single entry of a directory builder.
///
/// The recorded path equals the owning directory's canonical path; a child
/// reference records the parent's path because the tag itself lives in the
/// parent.
#[derive(Debug)]
pub struct BuilderTag {
    ifd_path: String,
    tag_id: u16,
    type_id: Type,
    value: BuilderTagValue,
}

impl BuilderTag {
    pub fn new(ifd_path: &str, tag_id: u16, type_id: Type, value: BuilderTagValue) -> BuilderTag {
        BuilderTag {
            ifd_path: ifd_path.to_owned(),
            tag_id,
            type_id,
            value,
        }
    }

    pub fn ifd_path(&self) -> &str {
        &self.ifd_path
    }

    pub fn tag_id(&self) -> u16 {
        self.tag_id
    }

    pub fn type_id(&self) -> Type {
        self.type_id
    }

    pub fn value(&self) -> &BuilderTagValue {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut BuilderTagValue {
        &mut self.value
    }

    /// Re-encodes `data` under the tag's declared type and replaces the
    /// value container.
    ///
    /// `UNDEFINED` tags with a registered sub-codec take their tag-specific
    /// struct; other types take the matching [`TagData`] variant.
    pub fn set_value(&mut self, byte_order: ByteOrder, data: &TagData) -> ExifResult<()> {
        if self.value.is_child() {
            return Err(BuildError::ValueNotInline.into());
        }
        let encoded = data.encode(self.tag_id, self.type_id, byte_order)?;
        self.value = BuilderTagValue::Bytes(encoded);
        Ok(())
    }
}

/// Builds a tag from a registry definition, encoding `data` under the
/// definition's declared type.
pub fn new_standard_builder_tag(
    ifd_path: &str,
    definition: &TagDefinition,
    byte_order: ByteOrder,
    data: &TagData,
) -> ExifResult<BuilderTag> {
    let encoded = data.encode(definition.id, definition.type_id, byte_order)?;
    Ok(BuilderTag {
        ifd_path: ifd_path.to_owned(),
        tag_id: definition.id,
        type_id: definition.type_id,
        value: BuilderTagValue::Bytes(encoded),
    })
}

/// A mutable Image File Directory under construction.
#[derive(Debug)]
pub struct IfdBuilder {
    ifd_path: String,
    fq_ifd_path: String,
    ifd_index: u32,
    ifd_tag_id: u16,
    byte_order: ByteOrder,
    tags: Vec<BuilderTag>,
    next_ifd: Option<Box<IfdBuilder>>,
    existing_offset: u32,
    thumbnail: Option<Vec<u8>>,
    mapping: Arc<IfdMapping>,
    tag_index: Arc<TagIndex>,
}

impl IfdBuilder {
    /// An empty builder for the directory role named by `ifd_path`
    /// (canonical or fully-qualified; `IFD` and `IFD0` are synonymous).
    pub fn new(
        mapping: Arc<IfdMapping>,
        tag_index: Arc<TagIndex>,
        ifd_path: &str,
        byte_order: ByteOrder,
    ) -> ExifResult<IfdBuilder> {
        let mapped = mapping.get(ifd_path)?;
        let canonical = mapped.path.clone();
        let ifd_tag_id = mapped.tag_id;
        Ok(IfdBuilder {
            fq_ifd_path: canonical.clone(),
            ifd_path: canonical,
            ifd_index: 0,
            ifd_tag_id,
            byte_order,
            tags: Vec::new(),
            next_ifd: None,
            existing_offset: 0,
            thumbnail: None,
            mapping,
            tag_index,
        })
    }

    /// A builder mirroring a parsed directory's identity, with no tags.
    pub fn from_existing(ifd: &Ifd) -> IfdBuilder {
        IfdBuilder {
            ifd_path: ifd.ifd_path().to_owned(),
            fq_ifd_path: ifd.fq_ifd_path().to_owned(),
            ifd_index: ifd.index(),
            ifd_tag_id: ifd.ifd_tag_id(),
            byte_order: ifd.byte_order(),
            tags: Vec::new(),
            next_ifd: None,
            existing_offset: ifd.offset(),
            thumbnail: None,
            mapping: ifd.mapping(),
            tag_index: ifd.tag_index(),
        }
    }

    /// Recursively clones a parsed chain into a builder tree.
    ///
    /// Tag values are copied verbatim in their original order; child-IFD
    /// entries become attached child builders; the sibling chain is
    /// relinked. Thumbnail data is captured as payload bytes while its
    /// strip location pair is dropped, to be regenerated by the encoder.
    pub fn from_existing_chain(ifd: &Ifd) -> ExifResult<IfdBuilder> {
        let mut builder = IfdBuilder::from_existing(ifd);
        let ifd_path = builder.ifd_path.clone();
        for entry in ifd.entries() {
            if let Some(child) = entry.child() {
                builder.add_child_ifd(IfdBuilder::from_existing_chain(child)?)?;
                continue;
            }
            if ifd.thumbnail().is_some()
                && (entry.tag_id() == STRIP_OFFSETS || entry.tag_id() == STRIP_BYTE_COUNTS)
            {
                continue;
            }
            builder.add(BuilderTag::new(
                &ifd_path,
                entry.tag_id(),
                entry.type_id(),
                BuilderTagValue::Bytes(entry.raw_value().to_vec()),
            ))?;
        }
        builder.thumbnail = ifd.thumbnail().map(<[u8]>::to_vec);
        if let Some(next) = ifd.next_ifd() {
            builder.set_next_ifd(IfdBuilder::from_existing_chain(next)?)?;
        }
        Ok(builder)
    }

    pub fn ifd_path(&self) -> &str {
        &self.ifd_path
    }

    pub fn fq_ifd_path(&self) -> &str {
        &self.fq_ifd_path
    }

    pub fn ifd_index(&self) -> u32 {
        self.ifd_index
    }

    /// Tag in the parent directory that points at this one; 0 for
    /// top-level directories.
    pub fn ifd_tag_id(&self) -> u16 {
        self.ifd_tag_id
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Tags in insertion order. Canonical tag-id order is produced only at
    /// encode time.
    pub fn tags(&self) -> &[BuilderTag] {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut [BuilderTag] {
        &mut self.tags
    }

    pub fn next_ifd(&self) -> Option<&IfdBuilder> {
        self.next_ifd.as_deref()
    }

    /// Offset the directory had in the block it was imported from; 0 for
    /// fresh builders.
    pub fn existing_offset(&self) -> u32 {
        self.existing_offset
    }

    pub fn thumbnail(&self) -> Option<&[u8]> {
        self.thumbnail.as_deref()
    }

    /// Appends a tag. The tag's recorded path must equal this directory's
    /// canonical path; child directories go through [`Self::add_child_ifd`].
    pub fn add(&mut self, tag: BuilderTag) -> ExifResult<()> {
        if tag.value.is_child() {
            return Err(BuildError::ChildTagViaAdd(tag.tag_id).into());
        }
        if tag.ifd_path != self.ifd_path {
            return Err(BuildError::IfdPathMismatch {
                expected: self.ifd_path.clone(),
                actual: tag.ifd_path,
            }
            .into());
        }
        self.tags.push(tag);
        Ok(())
    }

    /// Attaches a child directory, synthesizing the pointer tag for it.
    ///
    /// The child must be registered under this directory's path with the
    /// same owning tag id, and at most one child per tag id may exist.
    pub fn add_child_ifd(&mut self, child: IfdBuilder) -> ExifResult<()> {
        let name = child
            .ifd_path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_owned();
        let registered = self.mapping.child_tag_id(&self.ifd_path, &name);
        if registered != Some(child.ifd_tag_id) || child.ifd_tag_id == 0 {
            return Err(BuildError::UnregisteredChild {
                parent_path: self.ifd_path.clone(),
                name,
            }
            .into());
        }
        if self
            .tags
            .iter()
            .any(|tag| tag.tag_id == child.ifd_tag_id && tag.value.is_child())
        {
            return Err(BuildError::ChildAlreadyExists(child.ifd_tag_id).into());
        }
        self.tags.push(BuilderTag {
            ifd_path: self.ifd_path.clone(),
            tag_id: child.ifd_tag_id,
            type_id: Type::LONG,
            value: BuilderTagValue::from_child(child),
        });
        Ok(())
    }

    /// Position of the first tag with `tag_id`.
    pub fn find(&self, tag_id: u16) -> ExifResult<usize> {
        self.find_n(tag_id, 1)
            .into_iter()
            .next()
            .ok_or_else(|| BuildError::TagEntryNotFound(tag_id).into())
    }

    /// Positions of the first `n` tags with `tag_id`, in insertion order.
    /// Fewer (possibly zero) positions are returned if not enough exist.
    pub fn find_n(&self, tag_id: u16, n: usize) -> Vec<usize> {
        self.tags
            .iter()
            .positions(|tag| tag.tag_id == tag_id)
            .take(n)
            .collect()
    }

    /// Resolves `name` through the registry and returns the first matching
    /// tag.
    pub fn find_tag_with_name(&self, name: &str) -> ExifResult<&BuilderTag> {
        let definition = self.tag_index.get_by_name(&self.ifd_path, name)?;
        let position = self.find(definition.id)?;
        Ok(&self.tags[position])
    }

    pub fn find_tag_with_name_mut(&mut self, name: &str) -> ExifResult<&mut BuilderTag> {
        let definition = self.tag_index.get_by_name(&self.ifd_path, name)?;
        let position = self.find(definition.id)?;
        Ok(&mut self.tags[position])
    }

    /// Replaces the first tag with `tag_id`.
    pub fn replace(&mut self, tag_id: u16, tag: BuilderTag) -> ExifResult<()> {
        let position = self.find(tag_id)?;
        self.tags[position] = tag;
        Ok(())
    }

    /// Replaces the tag at `index`.
    pub fn replace_at(&mut self, index: usize, tag: BuilderTag) -> ExifResult<()> {
        if index >= self.tags.len() {
            return Err(BuildError::IndexOutOfRange {
                index,
                len: self.tags.len(),
            }
            .into());
        }
        self.tags[index] = tag;
        Ok(())
    }

    /// Removes the first tag with `tag_id`.
    pub fn delete_first(&mut self, tag_id: u16) -> ExifResult<()> {
        self.delete_n(tag_id, 1)
    }

    /// Removes up to the first `n` tags with `tag_id`; fails only when
    /// nothing was removed.
    pub fn delete_n(&mut self, tag_id: u16, n: usize) -> ExifResult<()> {
        let positions = self.find_n(tag_id, n);
        if positions.is_empty() {
            return Err(BuildError::TagEntryNotFound(tag_id).into());
        }
        for position in positions.into_iter().rev() {
            self.tags.remove(position);
        }
        Ok(())
    }

    /// Removes every tag with `tag_id` and reports how many were removed;
    /// zero is not an error.
    pub fn delete_all(&mut self, tag_id: u16) -> usize {
        let before = self.tags.len();
        self.tags.retain(|tag| tag.tag_id != tag_id);
        before - self.tags.len()
    }

    /// Links `next` as this directory's sibling. Siblings must share the
    /// directory role and byte order.
    pub fn set_next_ifd(&mut self, next: IfdBuilder) -> ExifResult<()> {
        if next.ifd_path != self.ifd_path {
            return Err(BuildError::IfdPathMismatch {
                expected: self.ifd_path.clone(),
                actual: next.ifd_path,
            }
            .into());
        }
        if next.byte_order != self.byte_order {
            return Err(BuildError::ByteOrderMismatch.into());
        }
        self.next_ifd = Some(Box::new(next));
        Ok(())
    }

    /// Resolves `name` through the registry, encodes `value` under the
    /// declared type, and appends the tag.
    pub fn add_standard_with_name<V: Into<TagData>>(
        &mut self,
        name: &str,
        value: V,
    ) -> ExifResult<()> {
        let definition = self.tag_index.get_by_name(&self.ifd_path, name)?;
        let tag = new_standard_builder_tag(&self.ifd_path, definition, self.byte_order, &value.into())?;
        self.add(tag)
    }

    /// Like [`Self::add_standard_with_name`], but replaces an existing tag
    /// with the same id instead of appending a duplicate.
    pub fn set_standard_with_name<V: Into<TagData>>(
        &mut self,
        name: &str,
        value: V,
    ) -> ExifResult<()> {
        let definition = self.tag_index.get_by_name(&self.ifd_path, name)?;
        let tag = new_standard_builder_tag(&self.ifd_path, definition, self.byte_order, &value.into())?;
        match self.find(definition.id) {
            Ok(position) => {
                self.tags[position] = tag;
                Ok(())
            }
            Err(_) => self.add(tag),
        }
    }

    /// Copies tags from a parsed directory, in their original order and
    /// with their raw value bytes verbatim.
    ///
    /// A tag is skipped when `include` is given and does not list its id,
    /// when `exclude` lists its id, or when it is a child-IFD tag (child
    /// directories are imported by [`Self::from_existing_chain`], not
    /// here).
    pub fn add_tags_from_existing(
        &mut self,
        ifd: &Ifd,
        include: Option<&[u16]>,
        exclude: Option<&[u16]>,
    ) -> ExifResult<()> {
        let ifd_path = self.ifd_path.clone();
        for entry in ifd.entries() {
            if let Some(include) = include {
                if !include.contains(&entry.tag_id()) {
                    continue;
                }
            }
            if let Some(exclude) = exclude {
                if exclude.contains(&entry.tag_id()) {
                    continue;
                }
            }
            if entry.child().is_some() {
                continue;
            }
            self.add(BuilderTag::new(
                &ifd_path,
                entry.tag_id(),
                entry.type_id(),
                BuilderTagValue::Bytes(entry.raw_value().to_vec()),
            ))?;
        }
        Ok(())
    }

    /// Attaches thumbnail payload bytes. Only the second top-level sibling
    /// may carry a thumbnail; the encoder synthesizes its strip location
    /// pair.
    pub fn set_thumbnail(&mut self, data: Vec<u8>) -> ExifResult<()> {
        if self.ifd_path != ROOT_IFD_PATH || self.ifd_index != 1 {
            return Err(BuildError::ThumbnailPlacement {
                fq_ifd_path: self.fq_ifd_path.clone(),
            }
            .into());
        }
        self.thumbnail = Some(data);
        Ok(())
    }

    /// Walks a fully-qualified path from this (root) builder, creating
    /// empty siblings and registered child directories as needed, and
    /// returns the builder at the leaf.
    pub fn get_or_create(&mut self, fq_path: &str) -> ExifResult<&mut IfdBuilder> {
        let segments = registry::parse_fq_path(fq_path)?;
        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| BuildError::MalformedPath(fq_path.to_owned()))?;
        if first.name != self.ifd_path {
            return Err(BuildError::IfdPathMismatch {
                expected: self.ifd_path.clone(),
                actual: first.name.clone(),
            }
            .into());
        }

        let mut current: &mut IfdBuilder = self;
        for sibling_index in 1..=first.index {
            if current.next_ifd.is_none() {
                let sibling = IfdBuilder {
                    ifd_path: current.ifd_path.clone(),
                    fq_ifd_path: fq_path_for(&current.ifd_path, sibling_index),
                    ifd_index: sibling_index,
                    ifd_tag_id: current.ifd_tag_id,
                    byte_order: current.byte_order,
                    tags: Vec::new(),
                    next_ifd: None,
                    existing_offset: 0,
                    thumbnail: None,
                    mapping: Arc::clone(&current.mapping),
                    tag_index: Arc::clone(&current.tag_index),
                };
                current.next_ifd = Some(Box::new(sibling));
            }
            current = current.next_ifd.as_deref_mut().unwrap();
        }

        for segment in rest {
            if segment.index != 0 {
                return Err(BuildError::UnregisteredChild {
                    parent_path: current.ifd_path.clone(),
                    name: segment.name.clone(),
                }
                .into());
            }
            let tag_id = match current.mapping.child_tag_id(&current.ifd_path, &segment.name) {
                Some(tag_id) => tag_id,
                None => {
                    return Err(BuildError::UnregisteredChild {
                        parent_path: current.ifd_path.clone(),
                        name: segment.name.clone(),
                    }
                    .into())
                }
            };
            let position = current
                .tags
                .iter()
                .position(|tag| tag.tag_id == tag_id && tag.value.is_child());
            let position = match position {
                Some(position) => position,
                None => {
                    let child_path = format!("{}/{}", current.ifd_path, segment.name);
                    let mut child = IfdBuilder::new(
                        Arc::clone(&current.mapping),
                        Arc::clone(&current.tag_index),
                        &child_path,
                        current.byte_order,
                    )?;
                    child.fq_ifd_path = format!("{}/{}", current.fq_ifd_path, segment.name);
                    current.add_child_ifd(child)?;
                    current.tags.len() - 1
                }
            };
            let parent = current;
            current = match &mut parent.tags[position].value {
                BuilderTagValue::Child(child) => &mut **child,
                // The position predicate above only matches child values.
                BuilderTagValue::Bytes(_) => unreachable!(),
            };
        }
        Ok(current)
    }

    /// One line per node in pre-order: the directory line, then each tag
    /// in insertion order; child references recurse in place, siblings
    /// follow after the whole subtree.
    pub fn dump_to_strings(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.dump_ifd(&mut lines, &[]);
        lines
    }

    fn dump_ifd(&self, lines: &mut Vec<String>, parents: &[String]) {
        let parents_joined = parents.iter().join("->");
        lines.push(format!(
            "IFD<PARENTS=[{}] FQ-IFD-PATH=[{}] IFD-INDEX=({}) IFD-TAG-ID=(0x{:04x}) TAG=[0x{:04x}]>",
            parents_joined, self.fq_ifd_path, self.ifd_index, self.ifd_tag_id, self.ifd_tag_id,
        ));
        for (position, tag) in self.tags.iter().enumerate() {
            let child_path = match &tag.value {
                BuilderTagValue::Child(child) => child.ifd_path.as_str(),
                BuilderTagValue::Bytes(_) => "",
            };
            lines.push(format!(
                "TAG<PARENTS=[{}] FQ-IFD-PATH=[{}] IFD-TAG-ID=(0x{:04x}) CHILD-IFD=[{}] TAG-INDEX=({}) TAG=[0x{:04x}]>",
                parents_joined, self.fq_ifd_path, self.ifd_tag_id, child_path, position, tag.tag_id,
            ));
            if let BuilderTagValue::Child(child) = &tag.value {
                let mut child_parents = parents.to_vec();
                child_parents.push(self.ifd_path.clone());
                child.dump_ifd(lines, &child_parents);
            }
        }
        if let Some(next) = &self.next_ifd {
            next.dump_ifd(lines, parents);
        }
    }
}

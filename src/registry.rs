//! Directory-path and tag-definition registries.
//!
//! A directory's role is named by a slash-separated canonical path
//! (`IFD`, `IFD/Exif`, `IFD/Exif/Iop`). A fully-qualified path carries a
//! zero-based sibling index per level when it is non-zero (`IFD1`). The
//! mapping resolves either form; the tag index resolves tag names and ids
//! scoped to a canonical path.

use std::collections::HashMap;

use itertools::Itertools;

use crate::error::{BuildError, ExifResult};
use crate::tags::Type;

/// Canonical path of the root IFD.
pub const ROOT_IFD_PATH: &str = "IFD";

/// Parent tag pointing at the Exif sub-IFD.
pub const EXIF_IFD_POINTER: u16 = 0x8769;
/// Parent tag pointing at the GPS sub-IFD.
pub const GPS_IFD_POINTER: u16 = 0x8825;
/// Parent tag pointing at the interoperability sub-IFD.
pub const IOP_IFD_POINTER: u16 = 0xa005;

/// Strip location pair synthesized for thumbnail payloads.
pub const STRIP_OFFSETS: u16 = 0x0111;
pub const STRIP_BYTE_COUNTS: u16 = 0x0117;

/// A directory role registered with the mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedIfd {
    /// Canonical path, e.g. `IFD/Exif`.
    pub path: String,
    /// Last path segment, e.g. `Exif`.
    pub name: String,
    /// Canonical path of the parent, absent for the root.
    pub parent_path: Option<String>,
    /// Tag in the parent directory that points at this one; 0 for the root.
    pub tag_id: u16,
}

/// Registry of the directory tree shape: which canonical paths exist and
/// which parent tag owns each child.
#[derive(Debug, Default)]
pub struct IfdMapping {
    ifds: HashMap<String, MappedIfd>,
    children: HashMap<String, Vec<(String, u16)>>,
}

impl IfdMapping {
    /// An empty mapping with only the root directory registered.
    pub fn new() -> IfdMapping {
        let mut mapping = IfdMapping::default();
        mapping.ifds.insert(
            ROOT_IFD_PATH.to_owned(),
            MappedIfd {
                path: ROOT_IFD_PATH.to_owned(),
                name: ROOT_IFD_PATH.to_owned(),
                parent_path: None,
                tag_id: 0,
            },
        );
        mapping
    }

    /// The standard EXIF directory tree: `IFD`, `IFD/Exif`, `IFD/Exif/Iop`,
    /// and `IFD/GPSInfo`.
    pub fn standard() -> IfdMapping {
        let mut mapping = IfdMapping::new();
        mapping.register(ROOT_IFD_PATH, "Exif", EXIF_IFD_POINTER);
        mapping.register(ROOT_IFD_PATH, "GPSInfo", GPS_IFD_POINTER);
        mapping.register("IFD/Exif", "Iop", IOP_IFD_POINTER);
        mapping
    }

    /// Registers `name` as a child of `parent_path`, owned by `tag_id`.
    pub fn register(&mut self, parent_path: &str, name: &str, tag_id: u16) {
        let path = format!("{parent_path}/{name}");
        self.ifds.insert(
            path.clone(),
            MappedIfd {
                path,
                name: name.to_owned(),
                parent_path: Some(parent_path.to_owned()),
                tag_id,
            },
        );
        self.children
            .entry(parent_path.to_owned())
            .or_default()
            .push((name.to_owned(), tag_id));
    }

    /// Resolves a canonical or fully-qualified path to its registration.
    pub fn get(&self, path: &str) -> ExifResult<&MappedIfd> {
        let canonical = canonicalize_path(path)?;
        self.ifds.get(&canonical).ok_or_else(|| {
            let (parent_path, name) = match canonical.rsplit_once('/') {
                Some((parent, name)) => (parent.to_owned(), name.to_owned()),
                None => (String::new(), canonical.clone()),
            };
            BuildError::UnregisteredChild { parent_path, name }.into()
        })
    }

    /// The registered children of `parent_path`, in registration order.
    pub fn children_of(&self, parent_path: &str) -> &[(String, u16)] {
        self.children
            .get(parent_path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Tag id owning the child named `name` under `parent_path`.
    pub fn child_tag_id(&self, parent_path: &str, name: &str) -> Option<u16> {
        self.children_of(parent_path)
            .iter()
            .find(|(child, _)| child == name)
            .map(|&(_, tag_id)| tag_id)
    }

    /// Child segment name owned by `tag_id` under `parent_path`, if any.
    pub fn child_name_for_tag(&self, parent_path: &str, tag_id: u16) -> Option<&str> {
        self.children_of(parent_path)
            .iter()
            .find(|&&(_, id)| id == tag_id)
            .map(|(name, _)| name.as_str())
    }
}

/// One level of a fully-qualified path: segment name plus sibling index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathSegment {
    pub name: String,
    pub index: u32,
}

/// Splits a fully-qualified path into named segments with sibling indices.
/// An absent index means 0, so `IFD` and `IFD0` parse identically.
pub(crate) fn parse_fq_path(fq_path: &str) -> ExifResult<Vec<PathSegment>> {
    let mut segments = Vec::new();
    for part in fq_path.split('/') {
        let digits = part.chars().rev().take_while(char::is_ascii_digit).count();
        let (name, index) = part.split_at(part.len() - digits);
        if name.is_empty() {
            return Err(BuildError::MalformedPath(fq_path.to_owned()).into());
        }
        let index = if index.is_empty() {
            0
        } else {
            index
                .parse::<u32>()
                .map_err(|_| BuildError::MalformedPath(fq_path.to_owned()))?
        };
        segments.push(PathSegment {
            name: name.to_owned(),
            index,
        });
    }
    Ok(segments)
}

/// Strips the per-level sibling indices from a fully-qualified path.
pub(crate) fn canonicalize_path(fq_path: &str) -> ExifResult<String> {
    Ok(parse_fq_path(fq_path)?
        .into_iter()
        .map(|segment| segment.name)
        .join("/"))
}

/// A registered tag: id, name, and declared wire type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDefinition {
    pub id: u16,
    pub name: &'static str,
    pub type_id: Type,
}

const fn def(id: u16, name: &'static str, type_id: Type) -> TagDefinition {
    TagDefinition { id, name, type_id }
}

// Baseline TIFF tags carried by the root IFD (and its thumbnail sibling).
static TAGS_ROOT: &[TagDefinition] = &[
    def(0x000b, "ProcessingSoftware", Type::ASCII),
    def(0x00fe, "NewSubfileType", Type::LONG),
    def(0x00ff, "SubfileType", Type::SHORT),
    def(0x0100, "ImageWidth", Type::LONG),
    def(0x0101, "ImageLength", Type::LONG),
    def(0x0102, "BitsPerSample", Type::SHORT),
    def(0x0103, "Compression", Type::SHORT),
    def(0x010e, "ImageDescription", Type::ASCII),
    def(0x010f, "Make", Type::ASCII),
    def(0x0110, "Model", Type::ASCII),
    def(0x0111, "StripOffsets", Type::LONG),
    def(0x0112, "Orientation", Type::SHORT),
    def(0x0115, "SamplesPerPixel", Type::SHORT),
    def(0x0116, "RowsPerStrip", Type::LONG),
    def(0x0117, "StripByteCounts", Type::LONG),
    def(0x011a, "XResolution", Type::RATIONAL),
    def(0x011b, "YResolution", Type::RATIONAL),
    def(0x0128, "ResolutionUnit", Type::SHORT),
    def(0x0131, "Software", Type::ASCII),
    def(0x0132, "DateTime", Type::ASCII),
    def(0x013b, "Artist", Type::ASCII),
    def(0x013e, "WhitePoint", Type::RATIONAL),
    def(0x0213, "YCbCrPositioning", Type::SHORT),
    def(0x8298, "Copyright", Type::ASCII),
    def(0x8769, "ExifTag", Type::LONG),
    def(0x8825, "GPSTag", Type::LONG),
];

static TAGS_EXIF: &[TagDefinition] = &[
    def(0x829a, "ExposureTime", Type::RATIONAL),
    def(0x829d, "FNumber", Type::RATIONAL),
    def(0x8822, "ExposureProgram", Type::SHORT),
    def(0x8827, "ISOSpeedRatings", Type::SHORT),
    def(0x8830, "SensitivityType", Type::SHORT),
    def(0x8832, "RecommendedExposureIndex", Type::LONG),
    def(0x8833, "ISOSpeed", Type::LONG),
    def(0x9000, "ExifVersion", Type::UNDEFINED),
    def(0x9003, "DateTimeOriginal", Type::ASCII),
    def(0x9004, "DateTimeDigitized", Type::ASCII),
    def(0x9101, "ComponentsConfiguration", Type::UNDEFINED),
    def(0x9201, "ShutterSpeedValue", Type::SRATIONAL),
    def(0x9202, "ApertureValue", Type::RATIONAL),
    def(0x9204, "ExposureBiasValue", Type::SRATIONAL),
    def(0x9207, "MeteringMode", Type::SHORT),
    def(0x9209, "Flash", Type::SHORT),
    def(0x920a, "FocalLength", Type::RATIONAL),
    def(0x927c, "MakerNote", Type::UNDEFINED),
    def(0x9286, "UserComment", Type::UNDEFINED),
    def(0x9290, "SubSecTime", Type::ASCII),
    def(0xa000, "FlashpixVersion", Type::UNDEFINED),
    def(0xa001, "ColorSpace", Type::SHORT),
    def(0xa002, "PixelXDimension", Type::LONG),
    def(0xa003, "PixelYDimension", Type::LONG),
    def(0xa005, "InteroperabilityTag", Type::LONG),
];

static TAGS_GPS: &[TagDefinition] = &[
    def(0x0000, "GPSVersionID", Type::BYTE),
    def(0x0001, "GPSLatitudeRef", Type::ASCII),
    def(0x0002, "GPSLatitude", Type::RATIONAL),
    def(0x0003, "GPSLongitudeRef", Type::ASCII),
    def(0x0004, "GPSLongitude", Type::RATIONAL),
    def(0x0005, "GPSAltitudeRef", Type::BYTE),
    def(0x0006, "GPSAltitude", Type::RATIONAL),
    def(0x001d, "GPSDateStamp", Type::ASCII),
];

static TAGS_IOP: &[TagDefinition] = &[
    def(0x0001, "InteroperabilityIndex", Type::ASCII),
    def(0x0002, "InteroperabilityVersion", Type::UNDEFINED),
];

/// Registry of tag definitions, scoped per canonical directory path.
#[derive(Debug)]
pub struct TagIndex {
    tables: HashMap<&'static str, &'static [TagDefinition]>,
}

impl TagIndex {
    /// Index over the standard TIFF, EXIF, GPS, and interoperability tags.
    pub fn standard() -> TagIndex {
        let mut tables: HashMap<&'static str, &'static [TagDefinition]> = HashMap::new();
        tables.insert("IFD", TAGS_ROOT);
        tables.insert("IFD/Exif", TAGS_EXIF);
        tables.insert("IFD/GPSInfo", TAGS_GPS);
        tables.insert("IFD/Exif/Iop", TAGS_IOP);
        TagIndex { tables }
    }

    fn table(&self, ifd_path: &str) -> ExifResult<&'static [TagDefinition]> {
        let canonical = canonicalize_path(ifd_path)?;
        self.tables.get(canonical.as_str()).copied().ok_or_else(|| {
            let (parent_path, name) = match canonical.rsplit_once('/') {
                Some((parent, name)) => (parent.to_owned(), name.to_owned()),
                None => (String::new(), canonical.clone()),
            };
            BuildError::UnregisteredChild { parent_path, name }.into()
        })
    }

    /// Looks a tag up by id within the scope of `ifd_path`.
    pub fn get(&self, ifd_path: &str, tag_id: u16) -> ExifResult<&'static TagDefinition> {
        self.table(ifd_path)?
            .iter()
            .find(|definition| definition.id == tag_id)
            .ok_or_else(|| BuildError::TagEntryNotFound(tag_id).into())
    }

    /// Looks a tag up by name within the scope of `ifd_path`.
    pub fn get_by_name(&self, ifd_path: &str, name: &str) -> ExifResult<&'static TagDefinition> {
        self.table(ifd_path)?
            .iter()
            .find(|definition| definition.name == name)
            .ok_or_else(|| {
                BuildError::UnknownTagName {
                    ifd_path: ifd_path.to_owned(),
                    name: name.to_owned(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExifError;

    #[test]
    fn standard_mapping_resolves_fq_paths() {
        let mapping = IfdMapping::standard();

        let root = mapping.get("IFD0").unwrap();
        assert_eq!(root.path, "IFD");
        assert_eq!(root.tag_id, 0);

        let iop = mapping.get("IFD0/Exif0/Iop").unwrap();
        assert_eq!(iop.path, "IFD/Exif/Iop");
        assert_eq!(iop.tag_id, IOP_IFD_POINTER);
        assert_eq!(iop.parent_path.as_deref(), Some("IFD/Exif"));
    }

    #[test]
    fn unknown_child_is_rejected() {
        let mapping = IfdMapping::standard();
        match mapping.get("IFD/Invalid") {
            Err(ExifError::BuildError(BuildError::UnregisteredChild { parent_path, name })) => {
                assert_eq!(parent_path, "IFD");
                assert_eq!(name, "Invalid");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn children_are_listed_in_registration_order() {
        let mapping = IfdMapping::standard();
        let children = mapping.children_of("IFD");
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], ("Exif".to_owned(), EXIF_IFD_POINTER));
        assert_eq!(children[1], ("GPSInfo".to_owned(), GPS_IFD_POINTER));
        assert_eq!(mapping.child_tag_id("IFD/Exif", "Iop"), Some(IOP_IFD_POINTER));
        assert_eq!(mapping.child_name_for_tag("IFD", GPS_IFD_POINTER), Some("GPSInfo"));
        assert!(mapping.children_of("IFD/GPSInfo").is_empty());
    }

    #[test]
    fn fq_path_segments() {
        let segments = parse_fq_path("IFD1/Exif/Iop0").unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].name, "IFD");
        assert_eq!(segments[0].index, 1);
        assert_eq!(segments[1].index, 0);
        assert_eq!(segments[2].name, "Iop");
        assert_eq!(segments[2].index, 0);

        assert!(parse_fq_path("IFD//Exif").is_err());
        assert!(parse_fq_path("0").is_err());
    }

    #[test]
    fn tag_index_lookups() {
        let index = TagIndex::standard();

        let definition = index.get_by_name("IFD", "ProcessingSoftware").unwrap();
        assert_eq!(definition.id, 0x000b);
        assert_eq!(definition.type_id, Type::ASCII);

        let definition = index.get("IFD0/Exif", 0x8833).unwrap();
        assert_eq!(definition.name, "ISOSpeed");
        assert_eq!(definition.type_id, Type::LONG);

        assert!(index.get_by_name("IFD", "NoSuchTag").is_err());
        assert!(index.get("IFD", 0xffff).is_err());
    }
}

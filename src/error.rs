use std::error::Error;
use std::fmt;

use crate::tags::Type;

/// Exif error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExifError {
    /// An editing operation on the builder tree was invalid.
    BuildError(BuildError),

    /// The builder tree could not be serialized.
    EncodeError(EncodeError),

    /// The input block is not formatted properly.
    FormatError(FormatError),

    /// An integer conversion to or from a platform size failed, either due to
    /// limits of the platform size or limits of the format.
    IntSizeError,
}

/// An editing operation on the builder tree was invalid.
///
/// The list of variants may grow. Matching against this exhaustively is not
/// covered by interface stability guarantees.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BuildError {
    /// No tag with the given id is present in the directory.
    TagEntryNotFound(u16),
    /// A child directory for the given tag id is already attached.
    ChildAlreadyExists(u16),
    /// The named segment is not a registered child of its parent directory.
    UnregisteredChild { parent_path: String, name: String },
    /// The tag name is not registered for the directory path.
    UnknownTagName { ifd_path: String, name: String },
    /// The supplied value is not assignable to the tag's declared type.
    TypeMismatch { tag_id: u16, type_id: Type },
    /// The tag or sibling carries a directory path other than the one required.
    IfdPathMismatch { expected: String, actual: String },
    /// Sibling directories must agree on byte order.
    ByteOrderMismatch,
    /// A positional operation was given an out-of-range index.
    IndexOutOfRange { index: usize, len: usize },
    /// A fully-qualified directory path could not be parsed.
    MalformedPath(String),
    /// Thumbnail data may only be attached to the second top-level IFD.
    ThumbnailPlacement { fq_ifd_path: String },
    /// No directory matches the fully-qualified path.
    IfdNotFound(String),
    /// Child directories are attached with `add_child_ifd`, not `add`.
    ChildTagViaAdd(u16),
    /// The value holds a child directory, not inline bytes.
    ValueNotInline,
    /// The value holds inline bytes, not a child directory.
    ValueNotChild,
}

impl fmt::Display for BuildError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use self::BuildError::*;
        match *self {
            TagEntryNotFound(tag_id) => {
                write!(fmt, "tag entry (0x{tag_id:04x}) not found")
            }
            ChildAlreadyExists(tag_id) => {
                write!(fmt, "child ifd for tag (0x{tag_id:04x}) already exists")
            }
            UnregisteredChild {
                ref parent_path,
                ref name,
            } => {
                write!(
                    fmt,
                    "ifd child with name [{name}] not registered: [{parent_path}/{name}]"
                )
            }
            UnknownTagName {
                ref ifd_path,
                ref name,
            } => {
                write!(fmt, "tag with name [{name}] not known for ifd [{ifd_path}]")
            }
            TypeMismatch { tag_id, type_id } => {
                write!(
                    fmt,
                    "value for tag (0x{tag_id:04x}) is not assignable to type {type_id:?}"
                )
            }
            IfdPathMismatch {
                ref expected,
                ref actual,
            } => {
                write!(fmt, "ifd path [{actual}] does not match [{expected}]")
            }
            ByteOrderMismatch => write!(fmt, "sibling ifds must share a byte order"),
            IndexOutOfRange { index, len } => {
                write!(fmt, "tag position ({index}) out of range for ({len}) tags")
            }
            MalformedPath(ref fq_path) => {
                write!(fmt, "ifd path [{fq_path}] is malformed")
            }
            ThumbnailPlacement { ref fq_ifd_path } => {
                write!(fmt, "thumbnails can only be attached to IFD1, not [{fq_ifd_path}]")
            }
            IfdNotFound(ref fq_path) => write!(fmt, "ifd [{fq_path}] not found"),
            ChildTagViaAdd(tag_id) => {
                write!(
                    fmt,
                    "child ifd for tag (0x{tag_id:04x}) must be attached with add_child_ifd"
                )
            }
            ValueNotInline => write!(fmt, "tag value is a child ifd, not inline bytes"),
            ValueNotChild => write!(fmt, "tag value is inline bytes, not a child ifd"),
        }
    }
}

/// The builder tree could not be serialized to a well-formed block.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodeError {
    /// A directory is reachable from itself via child or sibling links.
    CycleDetected,
    /// The value's encoded length exceeds what the entry count field can express.
    ValueTooLarge { tag_id: u16 },
    /// A directory holds more entries than the 2-byte count field can express.
    TooManyEntries(usize),
}

impl fmt::Display for EncodeError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use self::EncodeError::*;
        match *self {
            CycleDetected => write!(fmt, "cycle detected in the ifd tree"),
            ValueTooLarge { tag_id } => {
                write!(fmt, "value for tag (0x{tag_id:04x}) is too large to encode")
            }
            TooManyEntries(count) => {
                write!(fmt, "({count}) entries exceed the ifd entry-count field")
            }
        }
    }
}

/// The input block is not formatted properly.
///
/// This indicates that the encoder producing the block might behave
/// incorrectly or that the input has been corrupted.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FormatError {
    Truncated,
    SignatureInvalid,
    VersionInvalid(u16),
    UnknownFieldType(u16),
    ValueOutOfBounds { offset: u32, length: u32 },
    CycleInOffsets,
}

impl fmt::Display for FormatError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use self::FormatError::*;
        match *self {
            Truncated => write!(fmt, "block ends before the structure it describes"),
            SignatureInvalid => write!(fmt, "TIFF byte-order signature invalid"),
            VersionInvalid(version) => {
                write!(fmt, "TIFF version (0x{version:04x}) invalid")
            }
            UnknownFieldType(code) => write!(fmt, "unknown field type ({code})"),
            ValueOutOfBounds { offset, length } => {
                write!(
                    fmt,
                    "value at offset ({offset}) with length ({length}) exceeds the block"
                )
            }
            CycleInOffsets => write!(fmt, "block contains a cycle in its ifd offsets"),
        }
    }
}

impl fmt::Display for ExifError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match *self {
            ExifError::BuildError(ref e) => write!(fmt, "Build error: {e}"),
            ExifError::EncodeError(ref e) => write!(fmt, "Encode error: {e}"),
            ExifError::FormatError(ref e) => write!(fmt, "Format error: {e}"),
            ExifError::IntSizeError => write!(fmt, "Platform or format size limits exceeded"),
        }
    }
}

impl Error for ExifError {}

impl From<BuildError> for ExifError {
    fn from(err: BuildError) -> ExifError {
        ExifError::BuildError(err)
    }
}

impl From<EncodeError> for ExifError {
    fn from(err: EncodeError) -> ExifError {
        ExifError::EncodeError(err)
    }
}

impl From<FormatError> for ExifError {
    fn from(err: FormatError) -> ExifError {
        ExifError::FormatError(err)
    }
}

impl From<std::num::TryFromIntError> for ExifError {
    fn from(_err: std::num::TryFromIntError) -> ExifError {
        ExifError::IntSizeError
    }
}

/// Result of building, encoding, or decoding an EXIF block.
pub type ExifResult<T> = Result<T, ExifError>;

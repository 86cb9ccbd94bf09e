//! Editing and encoding of EXIF metadata in TIFF-structured containers.
//!
//! An EXIF block is a chain of Image File Directories (IFDs) whose entry
//! tables hold offsets into a shared data area; the layout of that area
//! depends recursively on the size of every directory in the tree. This
//! crate models the chain as a mutable builder tree — add, replace, and
//! delete tags, attach child directories, import from a parsed block —
//! and reconstructs a canonical, self-consistent byte stream from it with
//! a two-pass encoder.
//!
//! # Related Links
//! * <https://web.archive.org/web/20210108073850/https://www.adobe.io/open/standards/TIFF.html> - The TIFF specification
//! * <https://web.archive.org/web/20190624045241if_/http://www.cipa.jp:80/std/documents/e/DC-008-Translation-2019-E.pdf> - The EXIF 2.3 specification
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use exif_ifd::{ByteOrder, IfdBuilder, IfdByteEncoder, IfdMapping, TagIndex};
//!
//! # fn main() -> exif_ifd::ExifResult<()> {
//! let mapping = Arc::new(IfdMapping::standard());
//! let tag_index = Arc::new(TagIndex::standard());
//!
//! let mut root = IfdBuilder::new(mapping, tag_index, "IFD", ByteOrder::BigEndian)?;
//! root.add_standard_with_name("Software", "exif-ifd")?;
//! root.get_or_create("IFD/Exif")?
//!     .add_standard_with_name("ISOSpeed", 200u32)?;
//!
//! let block = IfdByteEncoder::new().encode_to_exif(&root)?;
//! assert_eq!(&block[..2], b"MM");
//! # Ok(())
//! # }
//! ```

mod builder;
mod decoder;
mod encoder;
mod error;
mod registry;
mod tags;
mod undefined;
mod value;

pub use self::builder::{new_standard_builder_tag, BuilderTag, BuilderTagValue, IfdBuilder};
pub use self::decoder::{decode_exif, find_ifd_from_root, Ifd, IfdEntry};
pub use self::encoder::{IfdByteEncoder, EXIF_DEFAULT_FIRST_IFD_OFFSET};
pub use self::error::{BuildError, EncodeError, ExifError, ExifResult, FormatError};
pub use self::registry::{
    IfdMapping, MappedIfd, TagDefinition, TagIndex, EXIF_IFD_POINTER, GPS_IFD_POINTER,
    IOP_IFD_POINTER, ROOT_IFD_PATH, STRIP_BYTE_COUNTS, STRIP_OFFSETS,
};
pub use self::tags::{ByteOrder, Type};
pub use self::undefined::{CommentEncoding, UndefinedData, UserComment};
pub use self::value::{Rational, SRational, TagData};

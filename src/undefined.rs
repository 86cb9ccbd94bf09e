//! Sub-codecs for `UNDEFINED`-typed tags whose payloads carry structure.
//!
//! Only UserComment (0x9286) has a registered codec. Every other
//! `UNDEFINED` tag passes through as raw bytes, unchanged in either
//! direction.

use crate::error::{BuildError, ExifResult};
use crate::tags::Type;

/// UserComment, the only `UNDEFINED` tag with a registered sub-codec.
pub const USER_COMMENT: u16 = 0x9286;

/// The character encoding declared by a UserComment's 8-byte prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentEncoding {
    Ascii,
    Jis,
    Unicode,
    Undefined,
}

impl CommentEncoding {
    fn magic(self) -> &'static [u8; 8] {
        match self {
            CommentEncoding::Ascii => b"ASCII\x00\x00\x00",
            CommentEncoding::Jis => b"JIS\x00\x00\x00\x00\x00",
            CommentEncoding::Unicode => b"UNICODE\x00",
            CommentEncoding::Undefined => &[0u8; 8],
        }
    }

    fn from_magic(raw: &[u8]) -> Option<CommentEncoding> {
        for encoding in [
            CommentEncoding::Ascii,
            CommentEncoding::Jis,
            CommentEncoding::Unicode,
            CommentEncoding::Undefined,
        ] {
            if raw == encoding.magic() {
                return Some(encoding);
            }
        }
        None
    }
}

/// UserComment payload: encoding identifier plus comment bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserComment {
    pub encoding: CommentEncoding,
    pub comment: Vec<u8>,
}

/// A structured view of an `UNDEFINED` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndefinedData {
    UserComment(UserComment),
    /// Payload of a tag without a registered sub-codec, carried verbatim.
    Raw(Vec<u8>),
}

impl From<UserComment> for crate::value::TagData {
    fn from(comment: UserComment) -> crate::value::TagData {
        crate::value::TagData::Undefined(UndefinedData::UserComment(comment))
    }
}

pub(crate) fn encode(tag_id: u16, data: &UndefinedData) -> ExifResult<Vec<u8>> {
    match (tag_id, data) {
        (USER_COMMENT, UndefinedData::UserComment(comment)) => {
            let mut buf = Vec::with_capacity(8 + comment.comment.len());
            buf.extend_from_slice(comment.encoding.magic());
            buf.extend_from_slice(&comment.comment);
            Ok(buf)
        }
        (_, UndefinedData::Raw(raw)) => Ok(raw.clone()),
        // A structured payload handed to a tag that does not carry it.
        (_, UndefinedData::UserComment(_)) => Err(BuildError::TypeMismatch {
            tag_id,
            type_id: Type::UNDEFINED,
        }
        .into()),
    }
}

pub(crate) fn decode(tag_id: u16, raw: &[u8]) -> UndefinedData {
    if tag_id == USER_COMMENT && raw.len() >= 8 {
        if let Some(encoding) = CommentEncoding::from_magic(&raw[..8]) {
            return UndefinedData::UserComment(UserComment {
                encoding,
                comment: raw[8..].to_vec(),
            });
        }
    }
    UndefinedData::Raw(raw.to_vec())
}

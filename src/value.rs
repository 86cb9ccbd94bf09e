//! Typed tag values and the wire codec that turns them into (and back out
//! of) the byte-ordered representation stored in a directory entry.

use crate::error::{BuildError, ExifResult, FormatError};
use crate::tags::{ByteOrder, Type};
use crate::undefined::{self, UndefinedData};

/// Fraction stored as two 32-bit unsigned integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub num: u32,
    pub denom: u32,
}

/// Fraction stored as two 32-bit signed integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SRational {
    pub num: i32,
    pub denom: i32,
}

/// A typed tag value, before encoding or after decoding.
///
/// `Bytes` doubles as the raw form for `BYTE` values and for opaque
/// `UNDEFINED` payloads without a registered sub-codec.
#[derive(Debug, Clone, PartialEq)]
pub enum TagData {
    Bytes(Vec<u8>),
    Ascii(String),
    Shorts(Vec<u16>),
    Longs(Vec<u32>),
    SLongs(Vec<i32>),
    Rationals(Vec<Rational>),
    SRationals(Vec<SRational>),
    Undefined(UndefinedData),
}

impl TagData {
    /// Encodes the value as its on-wire representation under `type_id`.
    ///
    /// ASCII values gain their terminating NUL here. `UNDEFINED` values are
    /// dispatched to the per-tag sub-codec selected by `tag_id`.
    pub fn encode(&self, tag_id: u16, type_id: Type, byte_order: ByteOrder) -> ExifResult<Vec<u8>> {
        let encoded = match (self, type_id) {
            (TagData::Bytes(raw), Type::BYTE | Type::UNDEFINED) => raw.clone(),
            (TagData::Undefined(data), Type::UNDEFINED) => undefined::encode(tag_id, data)?,
            (TagData::Ascii(s), Type::ASCII) => {
                let mut buf = Vec::with_capacity(s.len() + 1);
                buf.extend_from_slice(s.as_bytes());
                buf.push(0);
                buf
            }
            (TagData::Shorts(values), Type::SHORT) => {
                let mut buf = Vec::with_capacity(values.len() * 2);
                for &n in values {
                    byte_order.put_u16(&mut buf, n);
                }
                buf
            }
            (TagData::Longs(values), Type::LONG) => {
                let mut buf = Vec::with_capacity(values.len() * 4);
                for &n in values {
                    byte_order.put_u32(&mut buf, n);
                }
                buf
            }
            (TagData::SLongs(values), Type::SLONG) => {
                let mut buf = Vec::with_capacity(values.len() * 4);
                for &n in values {
                    byte_order.put_i32(&mut buf, n);
                }
                buf
            }
            (TagData::Rationals(values), Type::RATIONAL) => {
                let mut buf = Vec::with_capacity(values.len() * 8);
                for r in values {
                    byte_order.put_u32(&mut buf, r.num);
                    byte_order.put_u32(&mut buf, r.denom);
                }
                buf
            }
            (TagData::SRationals(values), Type::SRATIONAL) => {
                let mut buf = Vec::with_capacity(values.len() * 8);
                for r in values {
                    byte_order.put_i32(&mut buf, r.num);
                    byte_order.put_i32(&mut buf, r.denom);
                }
                buf
            }
            _ => return Err(BuildError::TypeMismatch { tag_id, type_id }.into()),
        };
        Ok(encoded)
    }

    /// Decodes raw entry bytes back into a typed value.
    ///
    /// ASCII values are cut at the first NUL. Types without a typed
    /// representation here (`SBYTE`, `SSHORT`, floats) come back as raw
    /// bytes, matching the opaque treatment they get everywhere else.
    pub fn decode(
        tag_id: u16,
        type_id: Type,
        raw: &[u8],
        byte_order: ByteOrder,
    ) -> ExifResult<TagData> {
        if raw.len() % type_id.byte_len() != 0 {
            return Err(FormatError::Truncated.into());
        }
        let decoded = match type_id {
            Type::BYTE => TagData::Bytes(raw.to_vec()),
            Type::UNDEFINED => TagData::Undefined(undefined::decode(tag_id, raw)),
            Type::ASCII => {
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                TagData::Ascii(String::from_utf8_lossy(&raw[..end]).into_owned())
            }
            Type::SHORT => TagData::Shorts(
                raw.chunks_exact(2)
                    .map(|chunk| byte_order.get_u16(chunk))
                    .collect(),
            ),
            Type::LONG => TagData::Longs(
                raw.chunks_exact(4)
                    .map(|chunk| byte_order.get_u32(chunk))
                    .collect(),
            ),
            Type::SLONG => TagData::SLongs(
                raw.chunks_exact(4)
                    .map(|chunk| byte_order.get_i32(chunk))
                    .collect(),
            ),
            Type::RATIONAL => TagData::Rationals(
                raw.chunks_exact(8)
                    .map(|chunk| Rational {
                        num: byte_order.get_u32(chunk),
                        denom: byte_order.get_u32(&chunk[4..]),
                    })
                    .collect(),
            ),
            Type::SRATIONAL => TagData::SRationals(
                raw.chunks_exact(8)
                    .map(|chunk| SRational {
                        num: byte_order.get_i32(chunk),
                        denom: byte_order.get_i32(&chunk[4..]),
                    })
                    .collect(),
            ),
            Type::SBYTE | Type::SSHORT | Type::FLOAT | Type::DOUBLE => {
                TagData::Bytes(raw.to_vec())
            }
        };
        Ok(decoded)
    }
}

impl From<&str> for TagData {
    fn from(s: &str) -> TagData {
        TagData::Ascii(s.to_owned())
    }
}

impl From<String> for TagData {
    fn from(s: String) -> TagData {
        TagData::Ascii(s)
    }
}

impl From<Vec<u8>> for TagData {
    fn from(raw: Vec<u8>) -> TagData {
        TagData::Bytes(raw)
    }
}

impl From<u16> for TagData {
    fn from(n: u16) -> TagData {
        TagData::Shorts(vec![n])
    }
}

impl From<Vec<u16>> for TagData {
    fn from(values: Vec<u16>) -> TagData {
        TagData::Shorts(values)
    }
}

impl From<u32> for TagData {
    fn from(n: u32) -> TagData {
        TagData::Longs(vec![n])
    }
}

impl From<Vec<u32>> for TagData {
    fn from(values: Vec<u32>) -> TagData {
        TagData::Longs(values)
    }
}

impl From<i32> for TagData {
    fn from(n: i32) -> TagData {
        TagData::SLongs(vec![n])
    }
}

impl From<Vec<i32>> for TagData {
    fn from(values: Vec<i32>) -> TagData {
        TagData::SLongs(values)
    }
}

impl From<Rational> for TagData {
    fn from(r: Rational) -> TagData {
        TagData::Rationals(vec![r])
    }
}

impl From<Vec<Rational>> for TagData {
    fn from(values: Vec<Rational>) -> TagData {
        TagData::Rationals(values)
    }
}

impl From<SRational> for TagData {
    fn from(r: SRational) -> TagData {
        TagData::SRationals(vec![r])
    }
}

impl From<Vec<SRational>> for TagData {
    fn from(values: Vec<SRational>) -> TagData {
        TagData::SRationals(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExifError;

    #[test]
    fn encode_per_byte_order() {
        let patterns: Vec<(TagData, Type, &[u8], &[u8])> = vec![
            (
                TagData::Bytes(vec![1, 2]),
                Type::BYTE,
                b"\x01\x02",
                b"\x01\x02",
            ),
            (
                TagData::Ascii("ab".to_owned()),
                Type::ASCII,
                b"ab\x00",
                b"ab\x00",
            ),
            (
                TagData::Shorts(vec![0x0102, 0x0304]),
                Type::SHORT,
                b"\x01\x02\x03\x04",
                b"\x02\x01\x04\x03",
            ),
            (
                TagData::Longs(vec![0x01020304]),
                Type::LONG,
                b"\x01\x02\x03\x04",
                b"\x04\x03\x02\x01",
            ),
            (
                TagData::SLongs(vec![-2]),
                Type::SLONG,
                b"\xff\xff\xff\xfe",
                b"\xfe\xff\xff\xff",
            ),
            (
                TagData::Rationals(vec![Rational { num: 1, denom: 2 }]),
                Type::RATIONAL,
                b"\x00\x00\x00\x01\x00\x00\x00\x02",
                b"\x01\x00\x00\x00\x02\x00\x00\x00",
            ),
            (
                TagData::SRationals(vec![SRational { num: -1, denom: -2 }]),
                Type::SRATIONAL,
                b"\xff\xff\xff\xff\xff\xff\xff\xfe",
                b"\xff\xff\xff\xff\xfe\xff\xff\xff",
            ),
        ];

        for (value, type_id, big, little) in patterns {
            assert_eq!(
                value.encode(0x1234, type_id, ByteOrder::BigEndian).unwrap(),
                big,
            );
            assert_eq!(
                value
                    .encode(0x1234, type_id, ByteOrder::LittleEndian)
                    .unwrap(),
                little,
            );
        }
    }

    #[test]
    fn encode_rejects_foreign_variant() {
        let value = TagData::Ascii("nope".to_owned());
        match value.encode(0x0100, Type::LONG, ByteOrder::BigEndian) {
            Err(ExifError::BuildError(BuildError::TypeMismatch { tag_id, type_id })) => {
                assert_eq!(tag_id, 0x0100);
                assert_eq!(type_id, Type::LONG);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn decode_round_trips() {
        let value = TagData::Rationals(vec![
            Rational { num: 72, denom: 1 },
            Rational { num: 3, denom: 4 },
        ]);
        for byte_order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
            let raw = value.encode(0x011a, Type::RATIONAL, byte_order).unwrap();
            let back = TagData::decode(0x011a, Type::RATIONAL, &raw, byte_order).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn decode_trims_ascii_nul() {
        let decoded =
            TagData::decode(0x010e, Type::ASCII, b"photo\x00", ByteOrder::BigEndian).unwrap();
        assert_eq!(decoded, TagData::Ascii("photo".to_owned()));
    }

    #[test]
    fn decode_rejects_ragged_payload() {
        assert!(TagData::decode(0x0100, Type::LONG, b"\x00\x01", ByteOrder::BigEndian).is_err());
    }
}

use std::collections::btree_map::Entry;
use std::io::{self, Cursor};
use std::sync::Arc;

use ciborium::value::Value as CborValue;
use thiserror::Error;

use crate::date::{DateError, PeerDate};
use crate::limits::MAX_VALUE_DEPTH;
use crate::value::{Dictionary, Value};

/// CBOR tag for a standard date/time text string (RFC 8949 section 3.4.1).
const TAG_DATE_TIME: u64 = 0;

pub type CborError = ciborium::ser::Error<io::Error>;

type CborDecodeError = ciborium::de::Error<io::Error>;

/// Errors produced when a value cannot be canonically encoded.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("value nesting exceeds limit ({depth} > {max})")]
    TooDeep { depth: usize, max: usize },
    #[error("date cannot be encoded: {0}")]
    Date(#[from] DateError),
    #[error("failed to write CBOR: {0}")]
    Cbor(#[from] CborError),
}

/// Errors produced when decoding canonical bytes back into values.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read CBOR: {0}")]
    Cbor(#[from] CborDecodeError),
    #[error("{0} trailing bytes after encoded value")]
    TrailingBytes(usize),
    #[error("value nesting exceeds limit ({max})")]
    TooDeep { max: usize },
    #[error("unsupported CBOR item: {0}")]
    Unsupported(&'static str),
    #[error("integer does not fit in 64 signed bits")]
    IntegerOutOfRange,
    #[error("duplicate map key `{0}`")]
    DuplicateKey(String),
    #[error("invalid date: {0}")]
    Date(#[from] DateError),
    #[error("expected {expected}")]
    Shape { expected: &'static str },
}

/// Deterministic byte encoding of descriptions.
///
/// Sign and verify must see bit-identical output for the same logical
/// value, so implementations may not depend on insertion order or on any
/// state outside the value itself.
pub trait CanonicalEncoder: Send + Sync {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError>;

    fn encode_dictionary(&self, map: &Dictionary) -> Result<Vec<u8>, EncodeError> {
        self.encode(&Value::dictionary(map.clone()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError>;

    fn decode_dictionary(&self, bytes: &[u8]) -> Result<Dictionary, DecodeError> {
        match self.decode(bytes)? {
            Value::Dictionary(map) => {
                Ok(Arc::try_unwrap(map).unwrap_or_else(|shared| (*shared).clone()))
            }
            _ => Err(DecodeError::Shape {
                expected: "an encoded dictionary",
            }),
        }
    }
}

/// Canonical CBOR encoder.
///
/// Map keys are emitted length-first then bytewise, dates as tag 0 text and
/// integers in their shortest form.
#[derive(Debug, Clone, Copy)]
pub struct CborEncoder {
    max_depth: usize,
}

impl Default for CborEncoder {
    fn default() -> Self {
        Self::new(MAX_VALUE_DEPTH)
    }
}

impl CborEncoder {
    #[must_use]
    pub const fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    fn write(&self, item: &CborValue) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(item, &mut buf)?;
        Ok(buf)
    }

    fn to_cbor(&self, value: &Value, depth: usize) -> Result<CborValue, EncodeError> {
        if depth > self.max_depth {
            return Err(EncodeError::TooDeep {
                depth,
                max: self.max_depth,
            });
        }
        Ok(match value {
            Value::String(text) => CborValue::Text(text.clone()),
            Value::Integer(number) => CborValue::Integer((*number).into()),
            Value::Bool(flag) => CborValue::Bool(*flag),
            Value::Bytes(bytes) => CborValue::Bytes(bytes.clone()),
            Value::Date(date) => {
                CborValue::Tag(TAG_DATE_TIME, Box::new(CborValue::Text(date.encode()?)))
            }
            Value::Array(items) => CborValue::Array(
                items
                    .iter()
                    .map(|item| self.to_cbor(item, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Dictionary(map) => self.map_to_cbor(map, depth)?,
        })
    }

    fn map_to_cbor(&self, map: &Dictionary, depth: usize) -> Result<CborValue, EncodeError> {
        let mut entries: Vec<(&String, &Value)> = map.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        let mut out = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            out.push((
                CborValue::Text(key.clone()),
                self.to_cbor(value, depth + 1)?,
            ));
        }
        Ok(CborValue::Map(out))
    }

    fn from_cbor(&self, item: CborValue, depth: usize) -> Result<Value, DecodeError> {
        if depth > self.max_depth {
            return Err(DecodeError::TooDeep {
                max: self.max_depth,
            });
        }
        match item {
            CborValue::Text(text) => Ok(Value::String(text)),
            CborValue::Integer(number) => i64::try_from(number)
                .map(Value::Integer)
                .map_err(|_| DecodeError::IntegerOutOfRange),
            CborValue::Bool(flag) => Ok(Value::Bool(flag)),
            CborValue::Bytes(bytes) => Ok(Value::Bytes(bytes)),
            CborValue::Tag(TAG_DATE_TIME, inner) => match *inner {
                CborValue::Text(text) => Ok(Value::Date(PeerDate::parse(&text)?)),
                _ => Err(DecodeError::Unsupported("date tag without text")),
            },
            CborValue::Tag(..) => Err(DecodeError::Unsupported("tag")),
            CborValue::Array(items) => Ok(Value::Array(
                items
                    .into_iter()
                    .map(|item| self.from_cbor(item, depth + 1))
                    .collect::<Result<_, _>>()?,
            )),
            CborValue::Map(entries) => {
                let mut map = Dictionary::new();
                for (key, value) in entries {
                    let CborValue::Text(key) = key else {
                        return Err(DecodeError::Unsupported("non-text map key"));
                    };
                    let value = self.from_cbor(value, depth + 1)?;
                    match map.entry(key) {
                        Entry::Occupied(entry) => {
                            return Err(DecodeError::DuplicateKey(entry.key().clone()))
                        }
                        Entry::Vacant(entry) => {
                            entry.insert(value);
                        }
                    }
                }
                Ok(Value::dictionary(map))
            }
            CborValue::Float(_) => Err(DecodeError::Unsupported("float")),
            CborValue::Null => Err(DecodeError::Unsupported("null")),
            _ => Err(DecodeError::Unsupported("simple value")),
        }
    }
}

impl CanonicalEncoder for CborEncoder {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let item = self.to_cbor(value, 1)?;
        self.write(&item)
    }

    fn encode_dictionary(&self, map: &Dictionary) -> Result<Vec<u8>, EncodeError> {
        let item = self.map_to_cbor(map, 1)?;
        self.write(&item)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, DecodeError> {
        let mut cursor = Cursor::new(bytes);
        let item: CborValue = ciborium::de::from_reader(&mut cursor)?;
        let consumed = usize::try_from(cursor.position()).unwrap_or(usize::MAX);
        if consumed < bytes.len() {
            return Err(DecodeError::TrailingBytes(bytes.len() - consumed));
        }
        self.from_cbor(item, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dictionary {
        let mut gestalt = Dictionary::new();
        gestalt.insert("ComputerName".into(), "Mac".into());
        let mut map = Dictionary::new();
        map.insert("version".into(), Value::Integer(2));
        map.insert("gestalt".into(), Value::dictionary(gestalt));
        map.insert("pk".into(), Value::Bytes(vec![1, 2, 3]));
        map.insert(
            "date".into(),
            Value::Date(PeerDate::from_unix_millis(1_000).expect("date")),
        );
        map.insert("views".into(), Value::string_set(["b", "a"]));
        map.insert("flag".into(), Value::Bool(true));
        map
    }

    #[test]
    fn encoding_is_deterministic_and_decodes_back() {
        let encoder = CborEncoder::default();
        let map = sample();
        let first = encoder.encode_dictionary(&map).expect("encode");
        let second = encoder
            .encode(&Value::dictionary(map.clone()))
            .expect("encode value");
        assert_eq!(first, second);

        let decoded = encoder.decode_dictionary(&first).expect("decode");
        assert_eq!(decoded, map);
        assert_eq!(encoder.encode_dictionary(&decoded).expect("re-encode"), first);
    }

    #[test]
    fn keys_are_ordered_length_first() {
        let encoder = CborEncoder::default();
        let mut map = Dictionary::new();
        map.insert("aa".into(), Value::Integer(1));
        map.insert("b".into(), Value::Integer(2));
        let bytes = encoder.encode_dictionary(&map).expect("encode");
        // map(2), text(1) "b", 2, text(2) "aa", 1
        assert_eq!(bytes, vec![0xa2, 0x61, b'b', 0x02, 0x62, b'a', b'a', 0x01]);
    }

    #[test]
    fn dates_use_tag_zero_text() {
        let encoder = CborEncoder::default();
        let date = PeerDate::from_unix_millis(0).expect("date");
        let bytes = encoder.encode(&Value::Date(date)).expect("encode");
        // tag(0), text(24)
        assert_eq!(&bytes[..3], &[0xc0, 0x78, 0x18]);
        assert_eq!(&bytes[3..], b"1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn nesting_limit_is_enforced() {
        let encoder = CborEncoder::new(2);
        let nested = Value::Array(vec![Value::Array(vec![Value::Integer(1)])]);
        assert!(matches!(
            encoder.encode(&nested),
            Err(EncodeError::TooDeep { depth: 3, max: 2 })
        ));
        assert!(encoder.encode(&Value::Array(vec![Value::Integer(1)])).is_ok());
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let encoder = CborEncoder::default();
        let mut bytes = encoder.encode(&Value::Integer(5)).expect("encode");
        bytes.push(0x00);
        assert!(matches!(
            encoder.decode(&bytes),
            Err(DecodeError::TrailingBytes(1))
        ));
    }

    #[test]
    fn decode_rejects_unsupported_items() {
        let encoder = CborEncoder::default();
        // null
        assert!(matches!(
            encoder.decode(&[0xf6]),
            Err(DecodeError::Unsupported("null"))
        ));
        // {1: 2}
        assert!(matches!(
            encoder.decode(&[0xa1, 0x01, 0x02]),
            Err(DecodeError::Unsupported("non-text map key"))
        ));
        // {"a": 1, "a": 2}
        assert!(matches!(
            encoder.decode(&[0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02]),
            Err(DecodeError::DuplicateKey(key)) if key == "a"
        ));
        // u64::MAX
        let mut big = vec![0x1b];
        big.extend_from_slice(&u64::MAX.to_be_bytes());
        assert!(matches!(
            encoder.decode(&big),
            Err(DecodeError::IntegerOutOfRange)
        ));
    }

    #[test]
    fn decode_dictionary_requires_a_map() {
        let encoder = CborEncoder::default();
        let bytes = encoder.encode(&Value::Integer(1)).expect("encode");
        assert!(matches!(
            encoder.decode_dictionary(&bytes),
            Err(DecodeError::Shape { .. })
        ));
    }
}

//! JSON codec for the native wire format.
//!
//! Unions are externally tagged: argument-less variants are a bare string
//! holding the tag (`"GetConf"`), argument-bearing variants a single-key
//! object keyed by the tag (`{"Ack": {..}}`). Field names are snake_case
//! unless a field renames itself.

use crate::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Implement [TaggedUnion] for an enum from its variant names.
///
/// `TAGS` and `tag()` come from the same list and the match is
/// exhaustive, so a variant left out fails to compile.
macro_rules! tagged_union {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::codec::TaggedUnion for $ty {
            const NAME: &'static str = stringify!($ty);
            const TAGS: &'static [&'static str] =
                &[$(stringify!($variant)),+];

            fn tag(&self) -> &'static str {
                match self {
                    $($ty::$variant { .. } => stringify!($variant),)+
                }
            }
        }
    };
}

/// Implement [Message] for a request enum from its variant names.
macro_rules! message_tags {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::Message for $ty {
            fn tag(&self) -> &'static str {
                match self {
                    $($ty::$variant { .. } => stringify!($variant),)+
                }
            }
        }
    };
}

/// The bare success sentinel for command responses.
pub const OK_TAG: &str = "Ok";

/// A request could not be serialized.
#[derive(Debug, thiserror::Error)]
#[error("failed to encode request: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Inbound json did not match the expected shape.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Not json at all.
    #[error("invalid json: {0}")]
    Json(#[source] serde_json::Error),

    /// The top-level token had the wrong shape.
    #[error("expected {expected}, found {found}")]
    Shape {
        /// what we wanted
        expected: &'static str,
        /// what we got
        found: &'static str,
    },

    /// The tag is not part of the closed variant set.
    #[error("unknown {union} tag `{tag}`")]
    UnknownTag {
        /// the union being decoded
        union: &'static str,
        /// the offending tag
        tag: String,
    },

    /// The tag was fine, its payload was not.
    #[error("invalid `{tag}` payload: {source}")]
    Payload {
        /// the variant being decoded
        tag: String,
        /// underlying serde error
        source: serde_json::Error,
    },
}

/// A closed set of externally tagged variants.
pub trait TaggedUnion: DeserializeOwned {
    /// Union name, for diagnostics.
    const NAME: &'static str;

    /// Every wire tag in the set.
    const TAGS: &'static [&'static str];

    /// The wire tag of this value.
    fn tag(&self) -> &'static str;
}

/// Serialize a value to its wire json.
pub fn encode<T: Serialize + ?Sized>(
    val: &T,
) -> std::result::Result<String, EncodeError> {
    Ok(serde_json::to_string(val)?)
}

/// Deserialize a plain (non-union) payload.
pub fn decode<T: DeserializeOwned>(
    json: &[u8],
) -> std::result::Result<T, DecodeError> {
    serde_json::from_slice(json).map_err(DecodeError::Json)
}

/// Deserialize a tagged union, checking shape and tag before payload.
pub fn decode_union<T: TaggedUnion>(
    json: &[u8],
) -> std::result::Result<T, DecodeError> {
    let value: Value = serde_json::from_slice(json).map_err(DecodeError::Json)?;
    let tag = wire_tag(&value)?.to_string();
    if !T::TAGS.contains(&tag.as_str()) {
        return Err(DecodeError::UnknownTag {
            union: T::NAME,
            tag,
        });
    }
    serde_json::from_value(value)
        .map_err(|source| DecodeError::Payload { tag, source })
}

/// Deserialize a query / cmd response envelope.
pub fn decode_response<T: DeserializeOwned>(
    json: &[u8],
) -> std::result::Result<Response<T>, DecodeError> {
    let value: Value = serde_json::from_slice(json).map_err(DecodeError::Json)?;
    let mut map = match value {
        Value::String(s) if s == OK_TAG => return Ok(Response::Ok),
        Value::Object(map) => map,
        oth => {
            return Err(DecodeError::Shape {
                expected: "response object or \"Ok\"",
                found: kind(&oth),
            })
        }
    };

    match map.remove("err") {
        Some(Value::String(err)) => return Ok(Response::Err(err)),
        None | Some(Value::Null) => (),
        Some(oth) => {
            return Err(DecodeError::Shape {
                expected: "string or null `err`",
                found: kind(&oth),
            })
        }
    }

    match map.remove("res") {
        None | Some(Value::Null) => Ok(Response::Ok),
        Some(res) => {
            let tag = wire_tag(&res).unwrap_or("res").to_string();
            serde_json::from_value(res)
                .map(Response::Body)
                .map_err(|source| DecodeError::Payload { tag, source })
        }
    }
}

/// The tag of an externally tagged value.
pub fn wire_tag(value: &Value) -> std::result::Result<&str, DecodeError> {
    match value {
        Value::String(tag) => Ok(tag.as_str()),
        Value::Object(map) if map.len() == 1 => match map.keys().next() {
            Some(tag) => Ok(tag.as_str()),
            None => Err(DecodeError::Shape {
                expected: "single-key object",
                found: "empty object",
            }),
        },
        Value::Object(map) if map.is_empty() => Err(DecodeError::Shape {
            expected: "single-key object",
            found: "empty object",
        }),
        Value::Object(_) => Err(DecodeError::Shape {
            expected: "single-key object",
            found: "multi-key object",
        }),
        oth => Err(DecodeError::Shape {
            expected: "string or single-key object",
            found: kind(oth),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

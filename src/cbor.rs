//! Helpers for building and walking the integer-keyed CBOR maps every
//! Proteus entity is encoded as.

use crate::{DecodeError, Error};
use ciborium::Value;
use ciborium::value::Integer;
use zeroize::Zeroizing;

/// Conversion of an entity into its CBOR value tree.
pub(crate) trait Encode {
    fn encode(&self) -> Value;
}

/// Conversion of a CBOR value tree back into an entity.
///
/// Implementations collect fields into locals, skip unknown keys, and only
/// construct `Self` once every required field is present and validated.
pub(crate) trait Decode: Sized {
    fn decode(value: Value) -> Result<Self, DecodeError>;
}

pub(crate) fn to_vec(value: &Value) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|err| Error::Internal(format!("Failed to encode CBOR: {err:?}")))?;
    Ok(buf)
}

pub(crate) fn from_slice(bytes: &[u8]) -> Result<Value, DecodeError> {
    ciborium::from_reader(bytes).map_err(|err| DecodeError::Cbor(format!("{err:?}")))
}

pub(crate) fn serialise<T: Encode>(entity: &T) -> Result<Vec<u8>, Error> {
    to_vec(&entity.encode())
}

pub(crate) fn deserialise<T: Decode>(bytes: &[u8]) -> Result<T, Error> {
    Ok(T::decode(from_slice(bytes)?)?)
}

/// Builds a map with small integer keys, preserving the given order.
pub(crate) fn map(entries: Vec<(u8, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(key, value)| (uint(key), value))
            .collect(),
    )
}

pub(crate) fn uint<T: Into<Integer>>(value: T) -> Value {
    Value::Integer(value.into())
}

pub(crate) fn bytes(value: &[u8]) -> Value {
    Value::Bytes(value.to_vec())
}

pub(crate) fn optional<T>(value: Option<&T>, encode: impl FnOnce(&T) -> Value) -> Value {
    value.map_or(Value::Null, encode)
}

/// Returns the raw key/value pairs of a map.
pub(crate) fn raw_map(
    value: Value,
    field: &'static str,
) -> Result<Vec<(Value, Value)>, DecodeError> {
    match value {
        Value::Map(entries) => Ok(entries),
        _ => Err(DecodeError::UnexpectedType {
            field,
            expected: "a map",
        }),
    }
}

/// Returns the entries of an integer-keyed map.
///
/// Keys that are not small unsigned integers cannot belong to any known
/// field and are dropped here, so decoders only ever see `u8` keys.
pub(crate) fn entries(
    value: Value,
    field: &'static str,
) -> Result<Vec<(u8, Value)>, DecodeError> {
    Ok(raw_map(value, field)?
        .into_iter()
        .filter_map(|(key, value)| match key {
            Value::Integer(key) => u8::try_from(key).ok().map(|key| (key, value)),
            _ => None,
        })
        .collect())
}

pub(crate) fn to_uint<T: TryFrom<Integer>>(
    value: Value,
    field: &'static str,
) -> Result<T, DecodeError> {
    match value {
        Value::Integer(integer) => {
            T::try_from(integer).map_err(|_| DecodeError::IntegerOutOfRange { field })
        }
        _ => Err(DecodeError::UnexpectedType {
            field,
            expected: "an unsigned integer",
        }),
    }
}

pub(crate) fn to_bytes(value: Value, field: &'static str) -> Result<Vec<u8>, DecodeError> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        _ => Err(DecodeError::UnexpectedType {
            field,
            expected: "a byte string",
        }),
    }
}

/// Decodes a byte string of exactly `N` bytes.
pub(crate) fn to_fixed<const N: usize>(
    value: Value,
    field: &'static str,
) -> Result<[u8; N], DecodeError> {
    let bytes = Zeroizing::new(to_bytes(value, field)?);
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| DecodeError::InvalidArrayLen {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

pub(crate) fn to_array(value: Value, field: &'static str) -> Result<Vec<Value>, DecodeError> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(DecodeError::UnexpectedType {
            field,
            expected: "an array",
        }),
    }
}

/// Decodes a nullable field, `null` mapping to `None`.
pub(crate) fn to_optional<T>(
    value: Value,
    decode: impl FnOnce(Value) -> Result<T, DecodeError>,
) -> Result<Option<T>, DecodeError> {
    match value {
        Value::Null => Ok(None),
        value => decode(value).map(Some),
    }
}

pub(crate) fn required<T>(value: Option<T>, field: &'static str) -> Result<T, DecodeError> {
    value.ok_or(DecodeError::MissingField(field))
}

//! Canonical binary codec for wire and storage encodings.
//!
//! A single fixed bincode configuration is used for every encoded structure
//! so that the byte representation of an event is identical on every node.
//! The event hash and signature are computed over these bytes.

use bincode::config;
use thiserror::Error;

/// Upper bound on any single decoded structure (16 MiB).
pub const DECODE_LIMIT: usize = 0x100_0000;

/// The canonical codec configuration: big-endian, varint, bounded.
pub const WIRE_CONFIG: config::Configuration<
    config::BigEndian,
    config::Varint,
    config::Limit<DECODE_LIMIT>,
> = config::standard()
    .with_limit::<DECODE_LIMIT>()
    .with_big_endian()
    .with_variable_int_encoding();

/// Codec failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("trailing bytes after decoded value: {0} left over")]
    TrailingBytes(usize),
}

/// Encode a value with the canonical configuration.
pub fn encode<T: bincode::Encode>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(bincode::encode_to_vec(value, WIRE_CONFIG)?)
}

/// Decode a value, requiring that the input is consumed exactly.
pub fn decode_whole<T: bincode::Decode<()>>(bytes: &[u8]) -> Result<T, CodecError> {
    let (value, consumed) = bincode::decode_from_slice(bytes, WIRE_CONFIG)?;
    if consumed != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - consumed));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let value: (u64, Vec<u8>) = (42, vec![1, 2, 3]);
        let bytes = encode(&value).unwrap();
        let back: (u64, Vec<u8>) = decode_whole(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&7u64).unwrap();
        bytes.push(0);
        let result: Result<u64, _> = decode_whole(&bytes);
        assert!(matches!(result, Err(CodecError::TrailingBytes(1))));
    }
}

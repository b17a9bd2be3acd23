//! Record codec: encode/decode a `(key, value)` pair to/from a delimiter-framed line.
//!
//! # Framing contract
//! [`Codec::encode`] MUST NOT emit [`DELIMITER`] anywhere in its output —
//! every call site in `fs_repo` and `segment` relies on the delimiter as the
//! sole record boundary. [`Codec::decode`] is a pure function of its input;
//! it never touches the filesystem.
//!
//! # Reference codec
//! [`CsvCodec`] joins `key` and `value` with the first comma as separator:
//! `"<key>,<value>"`. Decoding splits on the *first* comma only, so a value
//! containing commas round-trips; a key containing a comma does not (the
//! codec does not escape — callers whose keys contain commas need a
//! different codec, which is exactly the seam `Codec` exists for).

use thiserror::Error;

/// The byte used to frame records in every on-disk file. Never emitted by a
/// conforming codec's encoded output.
pub const DELIMITER: u8 = b'\n';

/// A decoded key/value record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KV {
    pub key: String,
    pub value: String,
}

impl KV {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// A `Null` entry: requested key absent, value conventionally empty.
    pub fn null(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataFormatError {
    #[error("no unescaped separator found in line: {0:?}")]
    NoSeparator(String),
    #[error("encoded key or value contains the record delimiter")]
    DelimiterInPayload,
}

/// Encode/decode a [`KV`] to/from a single delimiter-framed line.
///
/// Implementations are pure and side-effect free. The engine is generic over
/// `dyn Codec` so that a future codec only needs to implement this trait —
/// this is the seam the out-of-scope plugin registration would hang off of.
pub trait Codec: Send + Sync {
    fn encode(&self, kv: &KV) -> Result<Vec<u8>, DataFormatError>;
    fn decode(&self, line: &[u8]) -> Result<KV, DataFormatError>;
}

/// The reference "key,value" codec (CSV-like, no escaping).
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvCodec;

impl Codec for CsvCodec {
    fn encode(&self, kv: &KV) -> Result<Vec<u8>, DataFormatError> {
        if kv.key.as_bytes().contains(&DELIMITER) || kv.value.as_bytes().contains(&DELIMITER) {
            return Err(DataFormatError::DelimiterInPayload);
        }
        let mut out = Vec::with_capacity(kv.key.len() + kv.value.len() + 1);
        out.extend_from_slice(kv.key.as_bytes());
        out.push(b',');
        out.extend_from_slice(kv.value.as_bytes());
        Ok(out)
    }

    fn decode(&self, line: &[u8]) -> Result<KV, DataFormatError> {
        let text = String::from_utf8_lossy(line);
        match text.find(',') {
            Some(idx) => Ok(KV::new(&text[..idx], &text[idx + 1..])),
            None => Err(DataFormatError::NoSeparator(text.into_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let codec = CsvCodec;
        let kv = KV::new("aaa", "1");
        let encoded = codec.encode(&kv).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), kv);
    }

    #[test]
    fn empty_value_is_legal() {
        let codec = CsvCodec;
        let kv = KV::new("k", "");
        let encoded = codec.encode(&kv).unwrap();
        assert_eq!(encoded, b"k,");
        assert_eq!(codec.decode(&encoded).unwrap(), kv);
    }

    #[test]
    fn value_may_contain_commas() {
        let codec = CsvCodec;
        let kv = KV::new("ccc", r#"{"a":1,"b":2}"#);
        let encoded = codec.encode(&kv).unwrap();
        assert_eq!(codec.decode(&encoded).unwrap(), kv);
    }

    #[test]
    fn decode_without_separator_fails() {
        let codec = CsvCodec;
        assert!(matches!(
            codec.decode(b"no-separator-here"),
            Err(DataFormatError::NoSeparator(_))
        ));
    }

    #[test]
    fn encode_rejects_delimiter_in_key_or_value() {
        let codec = CsvCodec;
        assert!(codec.encode(&KV::new("a\nb", "v")).is_err());
        assert!(codec.encode(&KV::new("k", "v\n")).is_err());
    }

    proptest::proptest! {
        #[test]
        fn round_trip_arbitrary(key in "[^,\n]{0,40}", value in "[^\n]{0,80}") {
            let codec = CsvCodec;
            let kv = KV::new(key, value);
            let encoded = codec.encode(&kv).unwrap();
            proptest::prop_assert_eq!(codec.decode(&encoded).unwrap(), kv);
        }
    }
}

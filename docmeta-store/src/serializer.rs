//! Value serializers used by forward stores.
//!
//! Every forward store encodes its values through a [`ValueSerializer`]. The
//! serializer is chosen per key from the compression flag recorded in the
//! schema, so readers decode consistently without extra configuration.

use std::{fmt::Debug, sync::Arc};

use crate::error::{MetaIndexError, MetaResult};

/// Encodes a single attribute value to bytes and back.
///
/// Implementations must be deterministic and `decode(encode(v)) == v` must hold
/// for every value.
pub trait ValueSerializer: Debug + Send + Sync {
    fn encode(&self, value: &str) -> Vec<u8>;
    fn decode(&self, bytes: &[u8]) -> MetaResult<String>;
}

/// Stores values as raw UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Serializer;

impl ValueSerializer for Utf8Serializer {
    fn encode(&self, value: &str) -> Vec<u8> {
        value.as_bytes().to_vec()
    }

    fn decode(&self, bytes: &[u8]) -> MetaResult<String> {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|err| MetaIndexError::Corrupt(format!("value is not valid UTF-8: {err}")))
    }
}

/// Wraps another serializer and LZ4-compresses its output.
///
/// The uncompressed length is prepended so decoding can size its buffer.
#[derive(Debug, Clone, Default)]
pub struct Lz4Serializer<S: ValueSerializer> {
    inner: S,
}

impl<S: ValueSerializer> Lz4Serializer<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: ValueSerializer> ValueSerializer for Lz4Serializer<S> {
    fn encode(&self, value: &str) -> Vec<u8> {
        lz4_flex::compress_prepend_size(&self.inner.encode(value))
    }

    fn decode(&self, bytes: &[u8]) -> MetaResult<String> {
        let prefix: [u8; 4] = bytes
            .get(..4)
            .and_then(|prefix| prefix.try_into().ok())
            .ok_or_else(|| {
                MetaIndexError::Corrupt("failed to decompress value: missing size prefix".to_string())
            })?;
        let expected = u32::from_le_bytes(prefix) as usize;
        let raw = lz4_flex::decompress_size_prepended(bytes).map_err(|err| {
            MetaIndexError::Corrupt(format!("failed to decompress value: {err}"))
        })?;
        // Truncated input can decompress to a short buffer without an error.
        if raw.len() != expected {
            return Err(MetaIndexError::Corrupt(format!(
                "failed to decompress value: expected {expected} bytes, got {}",
                raw.len()
            )));
        }
        self.inner.decode(&raw)
    }
}

/// Returns the serializer matching a key's compression flag.
pub fn serializer_for(compress: bool) -> Arc<dyn ValueSerializer> {
    if compress {
        Arc::new(Lz4Serializer::new(Utf8Serializer))
    } else {
        Arc::new(Utf8Serializer)
    }
}

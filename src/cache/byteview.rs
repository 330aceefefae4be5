//! Immutable cached value

use std::fmt;

use bytes::Bytes;

use super::lru::Value;

/// An immutable view over a cached byte payload.
///
/// Callers can never reach the stored buffer mutably: [`ByteView::byte_slice`]
/// hands out a fresh copy, and [`ByteView::to_bytes`] a reference-counted
/// handle to bytes that cannot change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Create a view taking ownership of `data`
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Create a view holding a private copy of `data`
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a copy of the payload
    pub fn byte_slice(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Returns a cheap shared handle to the payload
    pub fn to_bytes(&self) -> Bytes {
        self.data.clone()
    }
}

impl Value for ByteView {
    fn size(&self) -> usize {
        self.len()
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.data))
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<Bytes> for ByteView {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<&'static str> for ByteView {
    fn from(data: &'static str) -> Self {
        Self::new(data)
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

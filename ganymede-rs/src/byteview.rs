//! Provides the immutable value type stored in and returned by a cache group.
//!
//! A [ByteView] wraps a **Bytes** buffer. Cloning a view is cheap (the buffer is reference
//! counted) and there is no way to obtain mutable access to the underlying data. Callers which
//! need an owned buffer they can modify use [ByteView::byte_slice], which always returns a
//! fresh copy.
//!
//! # Example
//! ```
//! # use ganymede::byteview::ByteView;
//! let view = ByteView::from("630");
//! assert_eq!(view.len(), 3);
//!
//! // Modifying the copy doesn't touch the view itself...
//! let mut copy = view.byte_slice();
//! copy[0] = b'9';
//! assert_eq!(view.to_string(), "630");
//! ```
use std::fmt::{Display, Formatter};

use bytes::Bytes;

use crate::lru::ByteSize;

/// Represents an immutable view on a cached value.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Creates a view by copying the given slice.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Returns the number of bytes in this view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a copy of the data so that the caller cannot alter the cached bytes.
    pub fn byte_slice(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Provides read-only access to the underlying bytes without copying them.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        ByteView::copy_from_slice(data.as_bytes())
    }
}

impl ByteSize for ByteView {
    fn allocated_size(&self) -> usize {
        self.data.len()
    }
}

impl Display for ByteView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl std::fmt::Debug for ByteView {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteView({:?})", String::from_utf8_lossy(&self.data))
    }
}

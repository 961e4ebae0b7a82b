//! Read-only byte sources for segment files
//!
//! Segment files are loaded once and kept resident; everything here is a
//! cheap view over a shared immutable buffer. Network/disk directories are
//! external collaborators that hand us a `FileSlice`.

use std::io;
use std::ops::Range;
use std::sync::Arc;

/// Owned bytes with cheap cloning (Arc-backed)
#[derive(Debug, Clone)]
pub struct OwnedBytes {
    data: Arc<Vec<u8>>,
    range: Range<usize>,
}

impl OwnedBytes {
    pub fn new(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            data: Arc::new(data),
            range: 0..len,
        }
    }

    pub fn empty() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            range: 0..0,
        }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        let start = self.range.start + range.start;
        let end = self.range.start + range.end;
        Self {
            data: Arc::clone(&self.data),
            range: start..end,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[self.range.clone()]
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl AsRef<[u8]> for OwnedBytes {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::ops::Deref for OwnedBytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

/// A randomly accessible slice of a segment file
#[derive(Debug, Clone)]
pub struct FileSlice {
    data: OwnedBytes,
    range: Range<u64>,
}

impl FileSlice {
    pub fn new(data: OwnedBytes) -> Self {
        let len = data.len() as u64;
        Self {
            data,
            range: 0..len,
        }
    }

    pub fn empty() -> Self {
        Self {
            data: OwnedBytes::empty(),
            range: 0..0,
        }
    }

    pub fn slice(&self, range: Range<u64>) -> Self {
        let start = self.range.start + range.start;
        let end = self.range.start + range.end;
        Self {
            data: self.data.clone(),
            range: start..end,
        }
    }

    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.range.start == self.range.end
    }

    /// Read the entire slice
    pub fn read_bytes(&self) -> OwnedBytes {
        self.data
            .slice(self.range.start as usize..self.range.end as usize)
    }

    /// Read a specific range within this slice
    pub fn read_bytes_range(&self, range: Range<u64>) -> io::Result<OwnedBytes> {
        let start = self.range.start + range.start;
        let end = self.range.start + range.end;
        if end > self.range.end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Range {:?} out of bounds (slice len: {})", range, self.len()),
            ));
        }
        Ok(self.data.slice(start as usize..end as usize))
    }
}

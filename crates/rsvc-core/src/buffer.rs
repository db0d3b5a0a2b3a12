//! Reply payload buffer.
//!
//! Handlers see the reply as append-only; the dispatcher resets it when it
//! replaces a partial reply with an error response.

/// A growable byte buffer holding one reply payload.
#[derive(Debug, Default)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Append raw bytes to the end of the buffer.
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append a little-endian `u32`.
    pub fn append_u32(&mut self, v: u32) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Append a little-endian `u64`.
    pub fn append_u64(&mut self, v: u64) {
        self.data.extend_from_slice(&v.to_le_bytes());
    }

    /// Discard all contents.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_reset() {
        let mut buf = Buffer::new();
        assert!(buf.is_empty());

        buf.append(b"abc");
        buf.append_u32(7);
        assert_eq!(buf.len(), 7);
        assert_eq!(&buf.as_slice()[..3], b"abc");

        buf.reset();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_integers_are_little_endian() {
        let mut buf = Buffer::new();
        buf.append_u32(0x0102_0304);
        buf.append_u64(5);

        assert_eq!(&buf.as_slice()[..4], &[4, 3, 2, 1]);
        assert_eq!(&buf.as_slice()[4..], &[5, 0, 0, 0, 0, 0, 0, 0]);
    }
}

/// Growable byte buffer with big-endian integer appends.
///
/// Backs the key encoder and the iterator's incremental key
/// reconstruction, where keys grow at the tail and shrink by truncation
/// while the cursor moves.
#[derive(Clone, Default)]
pub struct ByteBuffer {
    buf: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> ByteBuffer {
        ByteBuffer::default()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Drop everything past the first `n` bytes, capacity is kept.
    pub fn truncate(&mut self, n: usize) {
        self.buf.truncate(n);
    }

    pub fn write(&mut self, p: &[u8]) {
        self.buf.extend_from_slice(p);
    }

    pub fn write_byte(&mut self, c: u8) {
        self.buf.push(c);
    }

    pub fn write_str(&mut self, v: &str) {
        self.buf.extend_from_slice(v.as_bytes());
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }
}

#[cfg(test)]
#[path = "buffer_test.rs"]
mod buffer_test;

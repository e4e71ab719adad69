//! Byte-addressable frame memory

use ethflow_primitives::U256;

/// EVM memory, always a multiple of 32 bytes long
#[derive(Clone, Debug, Default)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    /// Create empty memory
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Current size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Grow to cover `offset..offset + len`, rounding up to a word boundary.
    /// Zero-length ranges never grow memory.
    pub fn resize(&mut self, offset: usize, len: usize) {
        if len == 0 {
            return;
        }
        let end = offset.saturating_add(len).div_ceil(32) * 32;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
    }

    /// Read a word; callers resize first
    pub fn load(&self, offset: usize) -> U256 {
        U256::from_big_endian(&self.slice(offset, 32))
    }

    /// Write a word
    pub fn store(&mut self, offset: usize, value: U256) {
        self.resize(offset, 32);
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        self.data[offset..offset + 32].copy_from_slice(&word);
    }

    /// Write one byte
    pub fn store8(&mut self, offset: usize, value: u8) {
        self.resize(offset, 1);
        self.data[offset] = value;
    }

    /// Copy `len` bytes out, zero-filling past the end
    pub fn slice(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        if offset < self.data.len() {
            let end = offset.saturating_add(len).min(self.data.len());
            out[..end - offset].copy_from_slice(&self.data[offset..end]);
        }
        out
    }

    /// Copy `len` bytes from `src` (zero-filled past its end) into memory
    pub fn set_padded(&mut self, offset: usize, src: &[u8], src_offset: usize, len: usize) {
        if len == 0 {
            return;
        }
        self.resize(offset, len);
        for i in 0..len {
            self.data[offset + i] =
                src_offset.checked_add(i).and_then(|j| src.get(j)).copied().unwrap_or(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_word_aligned() {
        let mut mem = Memory::new();
        mem.resize(0, 1);
        assert_eq!(mem.size(), 32);
        mem.resize(40, 1);
        assert_eq!(mem.size(), 64);
        mem.resize(1000, 0);
        assert_eq!(mem.size(), 64);
    }

    #[test]
    fn test_store_load() {
        let mut mem = Memory::new();
        mem.store(0, U256::from(0x2a));
        assert_eq!(mem.load(0), U256::from(0x2a));
        assert_eq!(mem.slice(31, 1), vec![0x2a]);
    }

    #[test]
    fn test_store8() {
        let mut mem = Memory::new();
        mem.store8(5, 0xff);
        assert_eq!(mem.size(), 32);
        assert_eq!(mem.slice(4, 3), vec![0, 0xff, 0]);
    }

    #[test]
    fn test_slice_past_end_zero_filled() {
        let mut mem = Memory::new();
        mem.store8(0, 1);
        assert_eq!(mem.slice(30, 4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_set_padded() {
        let mut mem = Memory::new();
        mem.set_padded(0, &[1, 2, 3], 1, 4);
        assert_eq!(mem.slice(0, 4), vec![2, 3, 0, 0]);
    }
}

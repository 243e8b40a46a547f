//! Flat emulated memory.
//!
//! A single byte array addressed from 0 with no segmentation, paging or
//! protection. Word accesses are little-endian and built from byte accesses.

use thiserror::Error;

/// Default memory size: 1 MiB.
pub const MEMORY_SIZE: usize = 1024 * 1024;

/// Flat byte-addressed memory.
#[derive(Clone)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Create a zeroed memory of the default size.
    pub fn new() -> Self {
        Self::with_size(MEMORY_SIZE)
    }

    /// Create a zeroed memory of `size` bytes.
    pub fn with_size(size: usize) -> Self {
        Self { bytes: vec![0; size] }
    }

    /// Size in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Check that `len` bytes starting at `addr` are addressable and return
    /// the starting index.
    fn span(&self, addr: u32, len: usize) -> Result<usize, MemoryError> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(start),
            _ => Err(MemoryError::OutOfBounds { addr, size: self.bytes.len() }),
        }
    }

    #[inline]
    pub fn read8(&self, addr: u32) -> Result<u8, MemoryError> {
        let index = self.span(addr, 1)?;
        Ok(self.bytes[index])
    }

    /// Read a little-endian 32-bit word.
    pub fn read32(&self, addr: u32) -> Result<u32, MemoryError> {
        let index = self.span(addr, 4)?;
        let mut value = 0u32;
        for (i, byte) in self.bytes[index..index + 4].iter().enumerate() {
            value |= u32::from(*byte) << (8 * i);
        }
        Ok(value)
    }

    #[inline]
    pub fn write8(&mut self, addr: u32, value: u8) -> Result<(), MemoryError> {
        let index = self.span(addr, 1)?;
        self.bytes[index] = value;
        Ok(())
    }

    /// Write a little-endian 32-bit word.
    ///
    /// The whole span is checked first, so a failed write changes nothing.
    pub fn write32(&mut self, addr: u32, value: u32) -> Result<(), MemoryError> {
        let index = self.span(addr, 4)?;
        for (i, byte) in self.bytes[index..index + 4].iter_mut().enumerate() {
            *byte = (value >> (8 * i)) as u8;
        }
        Ok(())
    }

    /// Copy an image into memory starting at `addr`.
    pub fn load(&mut self, addr: u32, image: &[u8]) -> Result<(), MemoryError> {
        let start = self.span(addr, image.len()).map_err(|_| MemoryError::ImageTooLarge {
            size: image.len(),
            available: self.bytes.len().saturating_sub(addr as usize),
        })?;
        self.bytes[start..start + image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Borrow `len` bytes starting at `addr`, clipped to the end of memory.
    pub fn slice(&self, addr: u32, len: usize) -> &[u8] {
        let start = (addr as usize).min(self.bytes.len());
        let end = start.saturating_add(len).min(self.bytes.len());
        &self.bytes[start..end]
    }

    /// Zero all memory.
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.bytes.iter().filter(|b| **b != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_bytes", &non_zero)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Access touches bytes outside memory.
    #[error("memory access at {addr:#010x} outside of {size:#x} bytes")]
    OutOfBounds { addr: u32, size: usize },

    /// Image does not fit at the requested address.
    #[error("image of {size} bytes exceeds available space {available}")]
    ImageTooLarge { size: usize, available: usize },
}

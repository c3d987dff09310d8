//! Byte-level access layer for unwind data parsing and generation.
//!
//! This module provides the low-level building blocks the DWARF interpreter and the
//! compact-unwind synthesizer are built on:
//!
//! - [`crate::file::parser::Parser`] - Cursor-based reader for instruction streams and
//!   encoded pointer values
//! - [`crate::file::writer::Writer`] - Growable buffer for emitting unwind data
//! - [`crate::file::CodeSource`] - Random-access view into the mapped image, used when the
//!   synthesizer has to inspect the function body itself
//! - [`crate::file::PointerWidth`] - Target pointer width (4 or 8 bytes)
//!
//! Everything here operates on caller-owned byte buffers; no file I/O happens in this
//! crate.

pub(crate) mod io;
pub mod parser;
pub mod writer;

use crate::Result;

/// Width of a target pointer, in the sense of the image being processed.
///
/// Selects the size of `DW_EH_PE_absptr` encoded values and the slot size used by the
/// compact unwind encoders (4 bytes for i386, 8 bytes for x86-64).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    /// 32-bit pointers (i386).
    Four,
    /// 64-bit pointers (x86-64).
    Eight,
}

impl PointerWidth {
    /// The width in bytes.
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::Four => 4,
            PointerWidth::Eight => 8,
        }
    }
}

/// Random-access byte source over a mapped image.
///
/// The frameless compact encoding for large stack frames stores the offset of the
/// `sub rsp, imm32` instruction instead of the stack size itself, which requires
/// reading the immediate back out of the function body. This trait is the minimal
/// surface the synthesizer needs for that: seek by virtual address, read one
/// little-endian `u32`, and restore the previous position.
///
/// Implementations must leave the handle position restored when the synthesizer is
/// done (the synthesizer itself saves [`tell`](CodeSource::tell) and calls
/// [`seek`](CodeSource::seek) back), but the trait does not serialize access: if one
/// handle is shared across threads the caller must lock around each synthesis call.
pub trait CodeSource {
    /// Current raw position within the source.
    fn tell(&self) -> u64;

    /// Restore a raw position previously obtained from [`tell`](CodeSource::tell).
    ///
    /// Returns `false` if the position is outside the source.
    fn seek(&mut self, pos: u64) -> bool;

    /// Position the source at a virtual address.
    ///
    /// Returns `false` if the address does not fall inside the source.
    fn address_seek(&mut self, address: u64) -> bool;

    /// Read a little-endian `u32` at the current position and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than four bytes remain.
    fn read_u32(&mut self) -> Result<u32>;
}

/// An in-memory [`CodeSource`] over a byte slice mapped at a base virtual address.
///
/// # Examples
///
/// ```rust
/// use unwindscope::{CodeSource, ImageSlice};
///
/// let code = [0x90, 0x90, 0x00, 0x10, 0x00, 0x00];
/// let mut image = ImageSlice::new(0x1000, &code);
///
/// assert!(image.address_seek(0x1002));
/// assert_eq!(image.read_u32()?, 0x1000);
/// # Ok::<(), unwindscope::Error>(())
/// ```
pub struct ImageSlice<'a> {
    base: u64,
    data: &'a [u8],
    position: usize,
}

impl<'a> ImageSlice<'a> {
    /// Create an [`ImageSlice`] over `data` mapped at virtual address `base`.
    #[must_use]
    pub fn new(base: u64, data: &'a [u8]) -> Self {
        ImageSlice {
            base,
            data,
            position: 0,
        }
    }

    /// The base virtual address of the slice.
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }
}

impl CodeSource for ImageSlice<'_> {
    fn tell(&self) -> u64 {
        self.position as u64
    }

    fn seek(&mut self, pos: u64) -> bool {
        if pos > self.data.len() as u64 {
            return false;
        }
        self.position = pos as usize;
        true
    }

    fn address_seek(&mut self, address: u64) -> bool {
        let Some(offset) = address.checked_sub(self.base) else {
            return false;
        };
        if offset >= self.data.len() as u64 {
            return false;
        }
        self.position = offset as usize;
        true
    }

    fn read_u32(&mut self) -> Result<u32> {
        io::read_le_at(self.data, &mut self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_slice_seek_and_read() {
        let data = [0xAA, 0x78, 0x56, 0x34, 0x12, 0xBB];
        let mut image = ImageSlice::new(0x4000, &data);

        assert!(image.address_seek(0x4001));
        assert_eq!(image.tell(), 1);
        assert_eq!(image.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(image.tell(), 5);

        assert!(image.seek(0));
        assert_eq!(image.tell(), 0);
    }

    #[test]
    fn test_image_slice_rejects_outside_addresses() {
        let data = [0u8; 4];
        let mut image = ImageSlice::new(0x4000, &data);

        assert!(!image.address_seek(0x3FFF));
        assert!(!image.address_seek(0x4004));
        assert!(!image.seek(5));
    }

    #[test]
    fn test_image_slice_read_past_end() {
        let data = [0x01, 0x02];
        let mut image = ImageSlice::new(0, &data);
        assert!(image.read_u32().is_err());
    }
}

//! Growable output buffer for emitting DWARF unwind data.
//!
//! This module provides [`crate::file::writer::Writer`], the producing counterpart of
//! [`crate::file::parser::Parser`]. The container writer uses it to re-emit `.eh_frame`
//! records after transformation, and tests use it to assemble call-frame instruction
//! streams without hand-encoding LEB128 operands.
//!
//! Writing cannot run out of bounds (the buffer grows), but encoded-pointer writes can
//! still fail for unknown representation nibbles, mirroring the reader.

use crate::{
    dwarf::constants::{
        DW_EH_PE_ABSPTR, DW_EH_PE_DATAREL, DW_EH_PE_PCREL, DW_EH_PE_SDATA2, DW_EH_PE_SDATA4,
        DW_EH_PE_SDATA8, DW_EH_PE_SLEB128, DW_EH_PE_UDATA2, DW_EH_PE_UDATA4, DW_EH_PE_UDATA8,
        DW_EH_PE_ULEB128,
    },
    file::{io::write_le, PointerWidth},
    Result,
};

/// An owned, growable buffer for DWARF unwind data.
///
/// Like [`Parser`](crate::file::parser::Parser), a `Writer` carries the base virtual
/// address the emitted bytes will be mapped at and the target pointer width, which
/// [`write_encoded`](Writer::write_encoded) needs to adjust pc-relative and
/// data-relative values.
///
/// # Examples
///
/// ```rust
/// use unwindscope::Writer;
///
/// let mut writer = Writer::new(0, None);
/// writer.write_uleb128(624_485);
/// assert_eq!(writer.as_slice(), &[0xE5, 0x8E, 0x26]);
/// ```
pub struct Writer {
    data: Vec<u8>,
    address: u64,
    width: Option<PointerWidth>,
}

impl Writer {
    /// Create an empty writer mapped at `address` with an optional pointer width.
    #[must_use]
    pub fn new(address: u64, width: Option<PointerWidth>) -> Self {
        Writer {
            data: Vec::new(),
            address,
            width,
        }
    }

    /// The number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The base virtual address of the buffer.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Borrow the emitted bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Consume the writer, returning the emitted bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Append a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Append a little-endian `u16`.
    pub fn write_u16(&mut self, value: u16) {
        write_le(&mut self.data, value);
    }

    /// Append a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) {
        write_le(&mut self.data, value);
    }

    /// Append a little-endian `u64`.
    pub fn write_u64(&mut self, value: u64) {
        write_le(&mut self.data, value);
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append a string followed by a NUL terminator.
    pub fn write_cstring(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
    }

    /// Append an unsigned LEB128 value.
    pub fn write_uleb128(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.data.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    /// Append a signed LEB128 value.
    pub fn write_sleb128(&mut self, mut value: i64) {
        let is_neg = value < 0;
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            let more = if is_neg {
                value != -1 || byte & 0x40 == 0
            } else {
                value != 0 || byte & 0x40 != 0
            };
            self.data.push(if more { byte | 0x80 } else { byte });
            if !more {
                break;
            }
        }
    }

    /// Append a DWARF exception-header encoded pointer value.
    ///
    /// Pc-relative values are adjusted against the virtual address of the value being
    /// written (base address plus current length); data-relative values against the
    /// buffer's base address.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown representation nibble or an
    /// absolute-pointer write without a configured width.
    pub fn write_encoded(&mut self, encoding: u8, value: u64) -> Result<()> {
        let value = match encoding & 0x70 {
            DW_EH_PE_PCREL => value.wrapping_sub(self.address.wrapping_add(self.data.len() as u64)),
            DW_EH_PE_DATAREL => value.wrapping_sub(self.address),
            _ => value,
        };

        #[allow(clippy::cast_possible_truncation)] // fixed-size representations truncate
        match encoding & 0x0F {
            DW_EH_PE_ABSPTR => match self.width {
                Some(PointerWidth::Four) => self.write_u32(value as u32),
                Some(PointerWidth::Eight) => self.write_u64(value),
                None => {
                    return Err(malformed_error!(
                        "Absolute pointer encoding without a configured pointer width"
                    ))
                }
            },
            DW_EH_PE_ULEB128 => self.write_uleb128(value),
            #[allow(clippy::cast_possible_wrap)]
            DW_EH_PE_SLEB128 => self.write_sleb128(value as i64),
            DW_EH_PE_UDATA2 | DW_EH_PE_SDATA2 => self.write_u16(value as u16),
            DW_EH_PE_UDATA4 | DW_EH_PE_SDATA4 => self.write_u32(value as u32),
            DW_EH_PE_UDATA8 | DW_EH_PE_SDATA8 => self.write_u64(value),
            other => return Err(malformed_error!("Invalid pointer encoding - {:#04x}", other)),
        }

        Ok(())
    }

    /// The number of bytes a fixed-size encoding occupies.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for variable-length or unknown encodings.
    pub fn encoding_size(&self, encoding: u8) -> Result<usize> {
        match encoding & 0x0F {
            DW_EH_PE_ABSPTR => match self.width {
                Some(width) => Ok(width.bytes()),
                None => Err(malformed_error!(
                    "Absolute pointer encoding without a configured pointer width"
                )),
            },
            DW_EH_PE_UDATA2 | DW_EH_PE_SDATA2 => Ok(2),
            DW_EH_PE_UDATA4 | DW_EH_PE_SDATA4 => Ok(4),
            DW_EH_PE_UDATA8 | DW_EH_PE_SDATA8 => Ok(8),
            other => Err(malformed_error!("Invalid pointer encoding - {:#04x}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parser;

    #[test]
    fn test_write_uleb128() {
        let cases: Vec<(u64, Vec<u8>)> = vec![
            (0, vec![0x00]),
            (0x7F, vec![0x7F]),
            (0x80, vec![0x80, 0x01]),
            (624_485, vec![0xE5, 0x8E, 0x26]),
        ];
        for (value, expected) in cases {
            let mut writer = Writer::new(0, None);
            writer.write_uleb128(value);
            assert_eq!(writer.as_slice(), expected.as_slice(), "{value}");
        }
    }

    #[test]
    fn test_write_sleb128() {
        let cases: Vec<(i64, Vec<u8>)> = vec![
            (0, vec![0x00]),
            (2, vec![0x02]),
            (-2, vec![0x7E]),
            (-8, vec![0x78]),
            (127, vec![0xFF, 0x00]),
            (-127, vec![0x81, 0x7F]),
            (128, vec![0x80, 0x01]),
            (-128, vec![0x80, 0x7F]),
        ];
        for (value, expected) in cases {
            let mut writer = Writer::new(0, None);
            writer.write_sleb128(value);
            assert_eq!(writer.as_slice(), expected.as_slice(), "{value}");
        }
    }

    #[test]
    fn test_write_encoded_pcrel_reads_back() {
        let mut writer = Writer::new(0x1000, Some(PointerWidth::Eight));
        writer.write_u8(0);
        writer.write_encoded(0x1B, 0x2000).unwrap(); // pcrel sdata4

        let bytes = writer.into_vec();
        let mut parser = Parser::with_context(&bytes, 0x1000, PointerWidth::Eight);
        parser.skip(1).unwrap();
        assert_eq!(parser.read_encoded(0x1B).unwrap(), 0x2000);
    }

    #[test]
    fn test_write_cstring() {
        let mut writer = Writer::new(0, None);
        writer.write_cstring("zR");
        assert_eq!(writer.as_slice(), b"zR\0");
    }

    #[test]
    fn test_encoding_size() {
        let writer = Writer::new(0, Some(PointerWidth::Four));
        assert_eq!(writer.encoding_size(0x00).unwrap(), 4);
        assert_eq!(writer.encoding_size(0x0B).unwrap(), 4);
        assert_eq!(writer.encoding_size(0x04).unwrap(), 8);
        assert!(writer.encoding_size(0x01).is_err());
    }
}

//! Low-level byte stream parser for DWARF unwind data decoding.
//!
//! This module provides the [`crate::file::parser::Parser`] type, a cursor-based binary data
//! parser designed for reading call-frame instruction streams and the encoded pointer values
//! found in `.eh_frame` / `__eh_frame` sections. It offers bounds-checked access to binary
//! data with support for variable-length LEB128 encodings and the DWARF exception-header
//! pointer encodings.
//!
//! # Architecture
//!
//! The parser is built around a simple cursor-based model that maintains a position within
//! a byte slice. On top of the position it carries the context needed to resolve encoded
//! pointers: the base virtual address of the buffer and the target pointer width. The
//! architecture provides:
//!
//! - **Position tracking** - Maintains current offset for sequential parsing operations
//! - **Bounds checking** - All operations validate data availability before reading
//! - **Type-safe reading** - Strongly typed methods for common data types
//! - **Encoded pointers** - `DW_EH_PE_*` application and representation handling
//!
//! # Key Components
//!
//! ## Navigation Methods
//! - [`crate::file::parser::Parser::seek`] - Move to specific position
//! - [`crate::file::parser::Parser::skip`] - Move forward by a number of bytes
//! - [`crate::file::parser::Parser::pos`] - Get current position
//!
//! ## Data Access Methods
//! - [`crate::file::parser::Parser::read_le`] - Read primitive types (little-endian)
//! - [`crate::file::parser::Parser::read_uleb128`] - Read unsigned LEB128 integers
//! - [`crate::file::parser::Parser::read_sleb128`] - Read signed LEB128 integers
//! - [`crate::file::parser::Parser::read_cstring`] - Read NUL-terminated strings
//! - [`crate::file::parser::Parser::read_encoded`] - Read a DWARF encoded pointer value
//!
//! # Usage Examples
//!
//! ```rust
//! use unwindscope::Parser;
//!
//! // def_cfa r7, 8 followed by a ULEB128 operand
//! let data = [0x0C, 0x07, 0x08, 0x90, 0x03];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_le::<u8>()?, 0x0C);
//! assert_eq!(parser.read_uleb128()?, 7);
//! assert_eq!(parser.read_uleb128()?, 8);
//! # Ok::<(), unwindscope::Error>(())
//! ```

use crate::{
    dwarf::constants::{
        DW_EH_PE_ABSPTR, DW_EH_PE_DATAREL, DW_EH_PE_PCREL, DW_EH_PE_SDATA2, DW_EH_PE_SDATA4,
        DW_EH_PE_SDATA8, DW_EH_PE_SLEB128, DW_EH_PE_UDATA2, DW_EH_PE_UDATA4, DW_EH_PE_UDATA8,
        DW_EH_PE_ULEB128,
    },
    file::{
        io::{read_le_at, CfiIO},
        PointerWidth,
    },
    Result,
};

/// A cursor-based parser for DWARF unwind data.
///
/// `Parser` borrows a byte range together with the base virtual address the bytes are
/// mapped at and (optionally) the target pointer width. The address and width only
/// matter for [`read_encoded`](Parser::read_encoded); plain instruction streams can be
/// parsed with [`Parser::new`] which leaves both unset.
///
/// The parser maintains an internal position cursor and provides bounds checking to
/// prevent buffer overruns when reading malformed or truncated data.
///
/// # Examples
///
/// ```rust
/// use unwindscope::Parser;
///
/// let data = [0xE5, 0x8E, 0x26];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_uleb128()?, 624_485);
/// assert_eq!(parser.remaining(), 0);
/// # Ok::<(), unwindscope::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
    /// Base virtual address of the buffer, for pc-relative and data-relative pointers
    address: u64,
    /// Target pointer width, for `DW_EH_PE_absptr` values
    width: Option<PointerWidth>,
}

impl<'a> Parser<'a> {
    /// Create a new [`crate::file::parser::Parser`] from a byte slice.
    ///
    /// The base address defaults to zero and no pointer width is configured; reading an
    /// absolute-pointer encoded value will fail until a width is provided via
    /// [`Parser::with_context`].
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser {
            data,
            position: 0,
            address: 0,
            width: None,
        }
    }

    /// Create a parser with full encoded-pointer context.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    /// * `address` - The virtual address `data` is mapped at
    /// * `width` - The target pointer width
    #[must_use]
    pub fn with_context(data: &'a [u8], address: u64, width: PointerWidth) -> Self {
        Parser {
            data,
            position: 0,
            address,
            width: Some(width),
        }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The base virtual address of the buffer.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns the number of bytes remaining from the current position.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the current position to the specified index.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing would exceed the data length.
    pub fn skip(&mut self, count: usize) -> Result<()> {
        let Some(end) = self.position.checked_add(count) else {
            return Err(out_of_bounds_error!());
        };
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = end;
        Ok(())
    }

    /// Peek at the next byte without advancing the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is at or beyond the data length.
    pub fn peek_byte(&self) -> Result<u8> {
        if self.position >= self.data.len() {
            return Err(out_of_bounds_error!());
        }
        Ok(self.data[self.position])
    }

    /// Read a type `T` from the current position in little-endian format and advance.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the data length.
    pub fn read_le<T: CfiIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read an unsigned LEB128 value and advance past it.
    ///
    /// The value is accumulated from 7-bit groups, least significant first, with bit
    /// 0x80 as the continuation flag.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the buffer ends mid-value, or
    /// [`crate::Error::Malformed`] if more than 64 bits accumulate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use unwindscope::Parser;
    ///
    /// let mut parser = Parser::new(&[0x80, 0x01]);
    /// assert_eq!(parser.read_uleb128()?, 128);
    /// # Ok::<(), unwindscope::Error>(())
    /// ```
    pub fn read_uleb128(&mut self) -> Result<u64> {
        let mut result = 0_u64;
        let mut bit = 0_u32;

        loop {
            let byte = self.read_le::<u8>()?;
            if bit > 63 {
                return Err(malformed_error!("ULEB128 value too big for u64"));
            }
            result |= u64::from(byte & 0x7F) << bit;
            bit += 7;

            if byte & 0x80 == 0 {
                break;
            }
        }

        Ok(result)
    }

    /// Read a signed LEB128 value and advance past it.
    ///
    /// Accumulation works as for [`read_uleb128`](Parser::read_uleb128); negative values
    /// are sign-extended using bit 0x40 of the final group.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the buffer ends mid-value, or
    /// [`crate::Error::Malformed`] if more than 64 bits accumulate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use unwindscope::Parser;
    ///
    /// let mut parser = Parser::new(&[0x78]);
    /// assert_eq!(parser.read_sleb128()?, -8);
    /// # Ok::<(), unwindscope::Error>(())
    /// ```
    pub fn read_sleb128(&mut self) -> Result<i64> {
        let mut result = 0_i64;
        let mut bit = 0_u32;

        loop {
            let byte = self.read_le::<u8>()?;
            if bit > 63 {
                return Err(malformed_error!("SLEB128 value too big for i64"));
            }
            result |= i64::from(byte & 0x7F) << bit;
            bit += 7;

            if byte & 0x80 == 0 {
                // Sign extend negative numbers.
                if byte & 0x40 != 0 && bit < 64 {
                    result |= -1_i64 << bit;
                }
                break;
            }
        }

        Ok(result)
    }

    /// Read a NUL-terminated string and advance past the terminator.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the buffer ends before a NUL terminator,
    /// or [`crate::Error::Malformed`] for invalid UTF-8 content.
    pub fn read_cstring(&mut self) -> Result<String> {
        let start = self.position;
        let mut bytes = Vec::new();

        loop {
            let byte = self.read_le::<u8>()?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }

        String::from_utf8(bytes)
            .map_err(|e| malformed_error!("Invalid string at offset {}: {}", start, e.utf8_error()))
    }

    /// Read a DWARF exception-header encoded pointer value.
    ///
    /// The high nibble of `encoding` selects the application base: `DW_EH_PE_pcrel`
    /// resolves against the virtual address of the value itself (base address plus
    /// current position), `DW_EH_PE_datarel` against the buffer's base address, and
    /// anything else is absolute. The low nibble selects the representation: an
    /// absolute pointer of the configured width, a LEB128 value, or a fixed-size
    /// signed/unsigned 2/4/8-byte field. Signed representations are sign-extended
    /// before the (wrapping) base addition.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown representation or an
    /// absolute-pointer read without a configured width, and
    /// [`crate::Error::OutOfBounds`] if the value would run past the buffer.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use unwindscope::{Parser, PointerWidth};
    ///
    /// // pc-relative sdata4 value of -4, encoded at address 0x2000
    /// let data = [0xFC, 0xFF, 0xFF, 0xFF];
    /// let mut parser = Parser::with_context(&data, 0x2000, PointerWidth::Eight);
    /// assert_eq!(parser.read_encoded(0x1B)?, 0x1FFC);
    /// # Ok::<(), unwindscope::Error>(())
    /// ```
    pub fn read_encoded(&mut self, encoding: u8) -> Result<u64> {
        let base = match encoding & 0x70 {
            DW_EH_PE_PCREL => self.address.wrapping_add(self.position as u64),
            DW_EH_PE_DATAREL => self.address,
            _ => 0,
        };

        #[allow(clippy::cast_sign_loss)] // sign extension then wrapping base addition
        let value = match encoding & 0x0F {
            DW_EH_PE_ABSPTR => match self.width {
                Some(PointerWidth::Four) => i64::from(self.read_le::<i32>()?) as u64,
                Some(PointerWidth::Eight) => self.read_le::<u64>()?,
                None => {
                    return Err(malformed_error!(
                        "Absolute pointer encoding without a configured pointer width"
                    ))
                }
            },
            DW_EH_PE_ULEB128 => self.read_uleb128()?,
            DW_EH_PE_SLEB128 => self.read_sleb128()? as u64,
            DW_EH_PE_UDATA2 => u64::from(self.read_le::<u16>()?),
            DW_EH_PE_SDATA2 => i64::from(self.read_le::<i16>()?) as u64,
            DW_EH_PE_UDATA4 => u64::from(self.read_le::<u32>()?),
            DW_EH_PE_SDATA4 => i64::from(self.read_le::<i32>()?) as u64,
            DW_EH_PE_UDATA8 | DW_EH_PE_SDATA8 => self.read_le::<u64>()?,
            other => return Err(malformed_error!("Invalid pointer encoding - {:#04x}", other)),
        };

        Ok(base.wrapping_add(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_read_uleb128() {
        let test_cases: Vec<(Vec<u8>, u64)> = vec![
            (vec![0x00], 0),
            (vec![0x7F], 0x7F),
            (vec![0x80, 0x01], 0x80),
            (vec![0xFF, 0x7F], 0x3FFF),
            (vec![0xE5, 0x8E, 0x26], 624_485),
            (
                vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01],
                u64::MAX,
            ),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            assert_eq!(parser.read_uleb128().unwrap(), expected);
            assert_eq!(parser.pos(), input.len());
        }
    }

    #[test]
    fn test_read_uleb128_overflow() {
        // 11 continuation bytes accumulate past 64 bits
        let input = [0x80; 10]
            .iter()
            .chain([0x01].iter())
            .copied()
            .collect::<Vec<u8>>();
        let mut parser = Parser::new(&input);
        assert!(matches!(
            parser.read_uleb128(),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_read_uleb128_truncated() {
        let mut parser = Parser::new(&[0x80]);
        assert!(matches!(parser.read_uleb128(), Err(Error::OutOfBounds)));
    }

    #[test]
    fn test_read_sleb128() {
        let test_cases: Vec<(Vec<u8>, i64)> = vec![
            (vec![0x00], 0),
            (vec![0x02], 2),
            (vec![0x7E], -2),
            (vec![0x78], -8),
            (vec![0xFF, 0x00], 127),
            (vec![0x81, 0x7F], -127),
            (vec![0x80, 0x01], 128),
            (vec![0x80, 0x7F], -128),
        ];

        for (input, expected) in test_cases {
            let mut parser = Parser::new(&input);
            assert_eq!(parser.read_sleb128().unwrap(), expected, "{input:02X?}");
            assert_eq!(parser.pos(), input.len());
        }
    }

    #[test]
    fn test_read_cstring() {
        let mut parser = Parser::new(b"zR\0zPLR\0");
        assert_eq!(parser.read_cstring().unwrap(), "zR");
        assert_eq!(parser.read_cstring().unwrap(), "zPLR");

        // unterminated string is an error, not a default
        let mut parser = Parser::new(b"abc");
        assert!(matches!(parser.read_cstring(), Err(Error::OutOfBounds)));
    }

    #[test]
    fn test_read_encoded_fixed_widths() {
        // udata2
        let mut parser = Parser::new(&[0x34, 0x12]);
        assert_eq!(parser.read_encoded(0x02).unwrap(), 0x1234);

        // sdata2, sign-extended
        let mut parser = Parser::new(&[0xFE, 0xFF]);
        assert_eq!(parser.read_encoded(0x0A).unwrap(), (-2_i64) as u64);

        // udata4
        let mut parser = Parser::new(&[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(parser.read_encoded(0x03).unwrap(), 0x1234_5678);

        // udata8
        let mut parser = Parser::new(&[1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(parser.read_encoded(0x04).unwrap(), 1);
    }

    #[test]
    fn test_read_encoded_bases() {
        // pcrel: base is address + position of the value
        let data = [0x00, 0x10, 0x00];
        let mut parser = Parser::with_context(&data, 0x1000, PointerWidth::Eight);
        parser.skip(1).unwrap();
        assert_eq!(parser.read_encoded(0x12).unwrap(), 0x1001 + 0x10);

        // datarel: base is the buffer's base address
        let mut parser = Parser::with_context(&data, 0x1000, PointerWidth::Eight);
        assert_eq!(parser.read_encoded(0x31).unwrap(), 0x1000);
    }

    #[test]
    fn test_read_encoded_absptr() {
        let data = [0xFC, 0xFF, 0xFF, 0xFF];
        let mut parser = Parser::with_context(&data, 0, PointerWidth::Four);
        assert_eq!(parser.read_encoded(0x00).unwrap(), (-4_i64) as u64);

        // absptr without a configured width is malformed
        let mut parser = Parser::new(&data);
        assert!(matches!(
            parser.read_encoded(0x00),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_read_encoded_invalid() {
        let mut parser = Parser::new(&[0x00; 8]);
        assert!(matches!(
            parser.read_encoded(0x05),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_navigation() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.peek_byte().unwrap(), 0x01);
        assert_eq!(parser.pos(), 0);

        parser.skip(2).unwrap();
        assert_eq!(parser.pos(), 2);
        assert_eq!(parser.remaining(), 2);

        parser.seek(4).unwrap();
        assert!(!parser.has_more_data());
        assert!(parser.seek(5).is_err());
        assert!(matches!(parser.peek_byte(), Err(Error::OutOfBounds)));
    }
}

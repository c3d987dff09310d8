//! Low-level byte order and safe reading utilities for DWARF unwind data.
//!
//! This module provides endian-aware binary data reading and writing primitives for parsing
//! `.eh_frame` / `__eh_frame` unwind streams. It implements safe, bounds-checked operations
//! for reading primitive types from byte buffers, ensuring data integrity and preventing
//! buffer overruns when parsing untrusted binary data.
//!
//! # Architecture
//!
//! The module is built around the [`crate::file::io::CfiIO`] trait which provides a unified
//! interface for reading and writing binary data in a type-safe manner:
//!
//! - Generic trait-based reading for all primitive types used by the DWARF codec
//! - Automatic bounds checking to prevent buffer overruns
//! - Consistent error handling through the [`crate::Result`] type
//!
//! All unwind streams handled by this crate are little-endian; there is no big-endian
//! variant.
//!
//! # Key Components
//!
//! - [`crate::file::io::CfiIO`] - Trait defining byte-array conversion for primitive types
//! - [`crate::file::io::read_le_at`] - Read a value at a specific offset with auto-advance
//! - [`crate::file::io::write_le`] - Append a value to a growable buffer
//!
//! # Error Handling
//!
//! All reading functions return [`crate::Result<T>`] and will return
//! [`crate::Error::OutOfBounds`] if there are insufficient bytes in the buffer to complete
//! the operation. A read past the end is always an error, never a silent default.

use crate::{Error::OutOfBounds, Result};

/// Trait for implementing type-specific safe binary data reading operations.
///
/// This trait abstracts over the conversion between fixed-size byte arrays and typed
/// values in little-endian format. It is implemented for the primitive integer types
/// that appear in DWARF unwind streams, ensuring type safety and consistent behavior
/// across all binary reading operations.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait CfiIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cfi_io {
    ($($ty:ty),*) => {
        $(
            impl CfiIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cfi_io!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Safely reads a value of type `T` in little-endian byte order at a specific offset.
///
/// This function reads at the specified offset and automatically advances the offset by
/// the number of bytes read. Supports all types that implement the
/// [`crate::file::io::CfiIO`] trait.
///
/// # Arguments
///
/// * `data` - The byte buffer to read from
/// * `offset` - Mutable reference to the offset position (will be advanced after reading)
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes remaining.
pub fn read_le_at<T: CfiIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds);
    };

    *offset += type_len;

    Ok(T::from_le_bytes(read))
}

/// Appends a value of type `T` in little-endian byte order to a growable buffer.
///
/// Used by the unwind data writer; cannot fail since the buffer grows as needed.
pub fn write_le<T: CfiIO>(data: &mut Vec<u8>, value: T)
where
    T::Bytes: AsRef<[u8]>,
{
    data.extend_from_slice(value.to_le_bytes().as_ref());
}

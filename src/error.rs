use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors split into two categories with very different handling contracts:
///
/// # Hard Errors (malformed input)
/// - [`Error::Malformed`] - Corrupted or invalid unwind data
/// - [`Error::OutOfBounds`] - A read past the end of an instruction stream or buffer
///
/// These indicate the input bytes themselves are broken and are propagated to the caller
/// of the whole parse. They are never silently defaulted.
///
/// # Soft Errors (unsupported constructs)
/// - [`Error::NotSupported`] - A CFI construct the compact unwind format cannot represent
///
/// This is recoverable: [`crate::compact::synthesize`] folds it into the `MODE_DWARF`
/// sentinel, and the caller keeps the full DWARF unwind data for that function.
///
/// # Examples
///
/// ```rust
/// use unwindscope::{Error, Parser};
///
/// let mut parser = Parser::new(&[0x80]); // truncated ULEB128
/// match parser.read_uleb128() {
///     Err(Error::OutOfBounds) => {} // buffer exhausted mid-value
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The unwind data is damaged and could not be parsed.
    ///
    /// This error indicates that the instruction stream or encoded value doesn't
    /// conform to the DWARF exception-header format. The error includes the source
    /// location where the malformation was detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing unwind data.
    ///
    /// This error occurs when trying to read data beyond the end of an instruction
    /// stream or buffer. It's a safety check to prevent buffer overruns when parsing
    /// untrusted binary data.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The unwind program uses a construct the compact format cannot represent.
    ///
    /// This covers unknown CFA opcodes and register indices outside the modeled
    /// register space. Callers fold this into the `MODE_DWARF` sentinel rather than
    /// treating it as a failure.
    #[error("This CFI construct is not supported")]
    NotSupported,
}

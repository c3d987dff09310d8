//! # unwindscope Prelude
//!
//! Convenient re-exports of the types most call sites need. Import this module
//! to parse unwind data, replay call-frame programs, and synthesize compact
//! encodings without spelling out the full module paths.

/// The main error type for all unwindscope operations
pub use crate::Error;

/// The result type used throughout unwindscope
pub use crate::Result;

/// Byte-level access: cursor reader, growable writer, machine-code views
pub use crate::{CodeSource, ImageSlice, Parser, PointerWidth, Writer};

/// The CIE model and its owning arena
pub use crate::{CieHandle, CieList, CommonInformationEntry};

/// The call-frame interpreter and its prologue snapshot
pub use crate::{interpret, PrologFlags, PrologInfo, RegisterLocation, MAX_REGISTER_NUMBER};

/// Compact unwind synthesis
pub use crate::synthesize;

/// Compact unwind mode bits, needed to interpret synthesized words
pub use crate::compact::encoding::{
    UNWIND_MODE_BP_FRAME, UNWIND_MODE_DWARF, UNWIND_MODE_MASK, UNWIND_MODE_STACK_IMMD,
    UNWIND_MODE_STACK_IND,
};

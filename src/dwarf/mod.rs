//! DWARF call-frame information model.
//!
//! Everything the crate knows about `.eh_frame`-style unwind data lives here:
//! the exception-header and call-frame constants ([`constants`]), the parsed
//! CIE model and its owning arena ([`cie`]), and the instruction interpreter
//! that turns an unwind program into a [`PrologInfo`] snapshot
//! ([`interpreter`]).
//!
//! # Usage
//!
//! ```rust
//! use unwindscope::{interpret, CommonInformationEntry, PrologInfo};
//!
//! let cie = CommonInformationEntry::new(
//!     1, "zR".to_string(), 1, -8, 16, 0x1B, 0xFF, 0xFF, 0,
//!     vec![0x0C, 0x07, 0x08, 0x90, 0x01],
//! );
//! let fde_instructions = [0x0E, 0x10]; // def_cfa_offset 16
//!
//! let mut info = PrologInfo::default();
//! interpret(cie.initial_instructions(), &cie, &mut info)?;
//! interpret(&fde_instructions, &cie, &mut info)?;
//! assert_eq!(info.cfa_register_offset, 16);
//! # Ok::<(), unwindscope::Error>(())
//! ```

pub mod cie;
pub mod constants;
pub mod interpreter;

pub use cie::{CieHandle, CieList, CommonInformationEntry};
pub use interpreter::{interpret, PrologFlags, PrologInfo, RegisterLocation, MAX_REGISTER_NUMBER};

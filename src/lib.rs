// Copyright 2025 the unwindscope authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # unwindscope
//!
//! A DWARF call-frame-information interpreter and compact unwind encoding
//! synthesizer, built in pure Rust. `unwindscope` replays the unwind program of
//! a function (its CIE's initial instructions plus its FDE's instructions) into
//! a prologue snapshot and, where the prologue fits one of the recognized x86 /
//! x86-64 shapes, condenses the whole FDE into the single 32-bit compact
//! unwind word used by Mach-O `__unwind_info` sections.
//!
//! ## Features
//!
//! - **Call-frame interpretation** - Full `DW_CFA_*` opcode coverage, including
//!   the signed-factored variants and the GNU extensions
//! - **Encoded pointer support** - `DW_EH_PE_*` reads and writes with
//!   pc-relative and data-relative adjustment
//! - **Compact unwind synthesis** - Frame-pointer, frameless-immediate and
//!   frameless-indirect encodings for both x86 and x86-64
//! - **Hostile-input safe** - Every read is bounds checked; unsupported
//!   constructs degrade to the DWARF fallback mode instead of failing
//!
//! ## Quick Start
//!
//! ```rust
//! use unwindscope::{synthesize, CommonInformationEntry, ImageSlice, PointerWidth};
//!
//! // The standard x86-64 CIE program: def_cfa rsp+8, return address at CFA-8
//! let cie = CommonInformationEntry::new(
//!     1, "zR".to_string(), 1, -8, 16, 0x1B, 0xFF, 0xFF, 0,
//!     vec![0x0C, 0x07, 0x08, 0x90, 0x01],
//! );
//!
//! // An FDE with no instructions of its own: a leaf function
//! let mut code = ImageSlice::new(0x1000, &[]);
//! let word = synthesize(PointerWidth::Eight, &cie, &[], 0x1000, &mut code)?;
//! assert_eq!(word & 0x0F00_0000, 0x0200_0000); // frameless, immediate stack size
//! # Ok::<(), unwindscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `unwindscope` is organized into three layers:
//!
//! - [`file`] - Byte-level access: the bounds-checked [`Parser`] cursor, the
//!   [`Writer`] buffer, and the [`CodeSource`] view into mapped machine code
//! - [`dwarf`] - The CIE model and the call-frame instruction interpreter that
//!   produces [`PrologInfo`] snapshots
//! - [`compact`] - The per-architecture encoders that turn a snapshot into a
//!   compact unwind word
//!
//! ## Error Handling
//!
//! The crate distinguishes hard failures from unsupported input. Truncated or
//! corrupt data surfaces as [`Error::Malformed`] / [`Error::OutOfBounds`];
//! constructs the compact format simply cannot express are absorbed by
//! [`synthesize`] and reported as the `UNWIND_MODE_DWARF` sentinel word, never
//! as an error.

#[macro_use]
pub(crate) mod error;

pub mod compact;
pub mod dwarf;
pub mod file;
pub mod prelude;

/// Convenience alias for operations that can fail with an [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;

pub use compact::synthesize;
pub use dwarf::{
    interpret, CieHandle, CieList, CommonInformationEntry, PrologFlags, PrologInfo,
    RegisterLocation, MAX_REGISTER_NUMBER,
};
pub use file::{parser::Parser, writer::Writer, CodeSource, ImageSlice, PointerWidth};

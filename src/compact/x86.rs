//! x86 (i386) compact unwind encoding.
//!
//! Supplies the 32-bit frame geometry to the shared encoder: 4-byte pointers,
//! CFA at `ebp + 8` for frame-pointer functions, and the callee-saved set
//! `ebx`, `ecx`, `edx`, `edi`, `esi`, `ebp`.

use crate::{
    compact::{
        encode_with,
        encoding::x86::{
            COMPACT_REG_EBP, COMPACT_REG_EBX, COMPACT_REG_ECX, COMPACT_REG_EDI, COMPACT_REG_EDX,
            COMPACT_REG_ESI, DWARF_REG_EBP, DWARF_REG_EBX, DWARF_REG_ECX, DWARF_REG_EDI,
            DWARF_REG_EDX, DWARF_REG_ESI, DWARF_REG_ESP, DWARF_REG_RET_ADDR,
        },
        ArchLayout,
    },
    dwarf::interpreter::PrologInfo,
    file::CodeSource,
    Result,
};

const LAYOUT: ArchLayout = ArchLayout::new(
    4,
    DWARF_REG_EBP,
    DWARF_REG_ESP,
    DWARF_REG_RET_ADDR,
    [
        (DWARF_REG_EBX, COMPACT_REG_EBX),
        (DWARF_REG_ECX, COMPACT_REG_ECX),
        (DWARF_REG_EDX, COMPACT_REG_EDX),
        (DWARF_REG_EDI, COMPACT_REG_EDI),
        (DWARF_REG_ESI, COMPACT_REG_ESI),
        (DWARF_REG_EBP, COMPACT_REG_EBP),
    ],
);

/// Encode a prologue snapshot as an x86 compact unwind word.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] if the
/// frameless-indirect shape needs the stack-decrement immediate and `code`
/// cannot deliver it.
pub fn encode<S: CodeSource>(info: &PrologInfo, function_start: u64, code: &mut S) -> Result<u32> {
    encode_with(&LAYOUT, info, function_start, code)
}

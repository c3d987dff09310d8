//! x86-64 compact unwind encoding.
//!
//! Supplies the x86-64 frame geometry to the shared encoder: 8-byte pointers,
//! CFA at `rbp + 16` for frame-pointer functions, and the callee-saved set
//! `rbx`, `r12`..`r15`, `rbp`.

use crate::{
    compact::{
        encode_with,
        encoding::x86_64::{
            COMPACT_REG_R12, COMPACT_REG_R13, COMPACT_REG_R14, COMPACT_REG_R15, COMPACT_REG_RBP,
            COMPACT_REG_RBX, DWARF_REG_R12, DWARF_REG_R13, DWARF_REG_R14, DWARF_REG_R15,
            DWARF_REG_RBP, DWARF_REG_RBX, DWARF_REG_RET_ADDR, DWARF_REG_RSP,
        },
        ArchLayout,
    },
    dwarf::interpreter::PrologInfo,
    file::CodeSource,
    Result,
};

const LAYOUT: ArchLayout = ArchLayout::new(
    8,
    DWARF_REG_RBP,
    DWARF_REG_RSP,
    DWARF_REG_RET_ADDR,
    [
        (DWARF_REG_RBX, COMPACT_REG_RBX),
        (DWARF_REG_R12, COMPACT_REG_R12),
        (DWARF_REG_R13, COMPACT_REG_R13),
        (DWARF_REG_R14, COMPACT_REG_R14),
        (DWARF_REG_R15, COMPACT_REG_R15),
        (DWARF_REG_RBP, COMPACT_REG_RBP),
    ],
);

/// Encode a prologue snapshot as an x86-64 compact unwind word.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] if the
/// frameless-indirect shape needs the stack-decrement immediate and `code`
/// cannot deliver it.
pub fn encode<S: CodeSource>(info: &PrologInfo, function_start: u64, code: &mut S) -> Result<u32> {
    encode_with(&LAYOUT, info, function_start, code)
}

//! Compact unwind encoding layout and register numberings.
//!
//! A compact unwind encoding is a single 32-bit word. Bits 24..28 select the
//! mode; the remaining bits are mode-specific fields whose positions are given
//! by the masks below. The field layout is identical for the x86 and x86-64
//! encodings, so one set of masks serves both; only the pointer size, the
//! register numberings and the fixed frame geometry differ per architecture.
//!
//! Two register numberings are in play and must not be confused:
//!
//! * the DWARF numbering (`DWARF_REG_*`), used by call-frame instructions to
//!   name registers, and
//! * the 3-bit compact numbering (`COMPACT_REG_*`), used inside the encoding
//!   word's register fields.

/// Mask selecting the mode bits of an encoding word.
pub const UNWIND_MODE_MASK: u32 = 0x0F00_0000;
/// Frame-pointer based function (`rbp`/`ebp` frame).
pub const UNWIND_MODE_BP_FRAME: u32 = 0x0100_0000;
/// Frameless function with an immediate stack size.
pub const UNWIND_MODE_STACK_IMMD: u32 = 0x0200_0000;
/// Frameless function whose stack size lives in the `sub` instruction's
/// immediate inside the function body.
pub const UNWIND_MODE_STACK_IND: u32 = 0x0300_0000;
/// No compact encoding; the unwinder must fall back to the DWARF FDE.
pub const UNWIND_MODE_DWARF: u32 = 0x0400_0000;

/// Frame mode: five 3-bit compact register fields.
pub const UNWIND_BP_FRAME_REGISTERS: u32 = 0x0000_7FFF;
/// Frame mode: distance from the frame pointer to the furthest save slot, in
/// pointer-sized units.
pub const UNWIND_BP_FRAME_OFFSET: u32 = 0x00FF_0000;

/// Frameless modes: immediate stack size in pointer-sized units, or the code
/// offset of the stack-decrement immediate for the indirect mode.
pub const UNWIND_FRAMELESS_STACK_SIZE: u32 = 0x00FF_0000;
/// Frameless indirect mode: extra adjustment added to the fetched stack size.
pub const UNWIND_FRAMELESS_STACK_ADJUST: u32 = 0x0000_E000;
/// Frameless modes: number of saved registers (0..=6).
pub const UNWIND_FRAMELESS_STACK_REG_COUNT: u32 = 0x0000_1C00;
/// Frameless modes: Lehmer-coded permutation of the saved registers.
pub const UNWIND_FRAMELESS_STACK_REG_PERMUTATION: u32 = 0x0000_03FF;

/// DWARF register numbering for x86-64 and the compact codes it maps to.
pub mod x86_64 {
    /// `rbx` in the DWARF numbering.
    pub const DWARF_REG_RBX: usize = 3;
    /// `rbp` in the DWARF numbering.
    pub const DWARF_REG_RBP: usize = 6;
    /// `rsp` in the DWARF numbering.
    pub const DWARF_REG_RSP: usize = 7;
    /// `r12` in the DWARF numbering.
    pub const DWARF_REG_R12: usize = 12;
    /// `r13` in the DWARF numbering.
    pub const DWARF_REG_R13: usize = 13;
    /// `r14` in the DWARF numbering.
    pub const DWARF_REG_R14: usize = 14;
    /// `r15` in the DWARF numbering.
    pub const DWARF_REG_R15: usize = 15;
    /// The return-address pseudo register.
    pub const DWARF_REG_RET_ADDR: usize = 16;

    /// `rbx` in the 3-bit compact numbering.
    pub const COMPACT_REG_RBX: u32 = 1;
    /// `r12` in the 3-bit compact numbering.
    pub const COMPACT_REG_R12: u32 = 2;
    /// `r13` in the 3-bit compact numbering.
    pub const COMPACT_REG_R13: u32 = 3;
    /// `r14` in the 3-bit compact numbering.
    pub const COMPACT_REG_R14: u32 = 4;
    /// `r15` in the 3-bit compact numbering.
    pub const COMPACT_REG_R15: u32 = 5;
    /// `rbp` in the 3-bit compact numbering.
    pub const COMPACT_REG_RBP: u32 = 6;
}

/// DWARF register numbering for x86 and the compact codes it maps to.
pub mod x86 {
    /// `edx` in the DWARF numbering.
    pub const DWARF_REG_EDX: usize = 1;
    /// `ecx` in the DWARF numbering.
    pub const DWARF_REG_ECX: usize = 2;
    /// `ebx` in the DWARF numbering.
    pub const DWARF_REG_EBX: usize = 3;
    /// `esi` in the DWARF numbering.
    pub const DWARF_REG_ESI: usize = 4;
    /// `edi` in the DWARF numbering.
    pub const DWARF_REG_EDI: usize = 5;
    /// `ebp` in the DWARF numbering.
    pub const DWARF_REG_EBP: usize = 6;
    /// `esp` in the DWARF numbering.
    pub const DWARF_REG_ESP: usize = 7;
    /// The return-address pseudo register.
    pub const DWARF_REG_RET_ADDR: usize = 8;

    /// `ebx` in the 3-bit compact numbering.
    pub const COMPACT_REG_EBX: u32 = 1;
    /// `ecx` in the 3-bit compact numbering.
    pub const COMPACT_REG_ECX: u32 = 2;
    /// `edx` in the 3-bit compact numbering.
    pub const COMPACT_REG_EDX: u32 = 3;
    /// `edi` in the 3-bit compact numbering.
    pub const COMPACT_REG_EDI: u32 = 4;
    /// `esi` in the 3-bit compact numbering.
    pub const COMPACT_REG_ESI: u32 = 5;
    /// `ebp` in the 3-bit compact numbering.
    pub const COMPACT_REG_EBP: u32 = 6;
}

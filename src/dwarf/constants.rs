//! DWARF exception-header constants and the call-frame opcode set.
//!
//! Values mirror the DWARF exception handling ABI as used by the `.eh_frame` /
//! `__eh_frame` sections: pointer-encoding bytes (`DW_EH_PE_*`) and the call-frame
//! instruction opcodes (`DW_CFA_*`). The opcode byte layout is fixed by the DWARF
//! CFI specification: when the top two bits are zero the full byte selects an
//! extended opcode ([`CallFrameInstruction`]), otherwise the top two bits select a
//! packed opcode class and the low six bits carry the operand.

use strum::FromRepr;

/// Absolute pointer representation, sized to the target pointer width.
pub const DW_EH_PE_ABSPTR: u8 = 0x00;
/// Unsigned LEB128 representation.
pub const DW_EH_PE_ULEB128: u8 = 0x01;
/// Unsigned 2-byte representation.
pub const DW_EH_PE_UDATA2: u8 = 0x02;
/// Unsigned 4-byte representation.
pub const DW_EH_PE_UDATA4: u8 = 0x03;
/// Unsigned 8-byte representation.
pub const DW_EH_PE_UDATA8: u8 = 0x04;
/// Signed LEB128 representation.
pub const DW_EH_PE_SLEB128: u8 = 0x09;
/// Signed 2-byte representation.
pub const DW_EH_PE_SDATA2: u8 = 0x0A;
/// Signed 4-byte representation.
pub const DW_EH_PE_SDATA4: u8 = 0x0B;
/// Signed 8-byte representation.
pub const DW_EH_PE_SDATA8: u8 = 0x0C;

/// Pc-relative application: value is relative to its own address.
pub const DW_EH_PE_PCREL: u8 = 0x10;
/// Text-relative application (unused by this crate, listed for completeness).
pub const DW_EH_PE_TEXTREL: u8 = 0x20;
/// Data-relative application: value is relative to the section base address.
pub const DW_EH_PE_DATAREL: u8 = 0x30;
/// No value is present.
pub const DW_EH_PE_OMIT: u8 = 0xFF;

/// Packed `advance_loc` opcode class (low six bits are the code delta).
pub const DW_CFA_ADVANCE_LOC: u8 = 0x40;
/// Packed `offset` opcode class (low six bits are the register number).
pub const DW_CFA_OFFSET: u8 = 0x80;
/// Packed `restore` opcode class (low six bits are the register number).
pub const DW_CFA_RESTORE: u8 = 0xC0;
/// Mask selecting the packed opcode class bits.
pub const DW_CFA_PACKED_MASK: u8 = 0xC0;
/// Mask selecting the packed operand bits.
pub const DW_CFA_OPERAND_MASK: u8 = 0x3F;

/// Extended call-frame instructions, selected by the full opcode byte when the
/// top two bits are zero.
///
/// Any byte in the extended range that does not map to a variant is an
/// unsupported construct and makes the whole function fall back to DWARF
/// unwind data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum CallFrameInstruction {
    /// No operation.
    Nop = 0x00,
    /// Set the code offset to an encoded address.
    SetLoc = 0x01,
    /// Advance the code offset by a 1-byte delta.
    AdvanceLoc1 = 0x02,
    /// Advance the code offset by a 2-byte delta.
    AdvanceLoc2 = 0x03,
    /// Advance the code offset by a 4-byte delta.
    AdvanceLoc4 = 0x04,
    /// Save a register at a factored CFA offset (ULEB128 register).
    OffsetExtended = 0x05,
    /// Restore a register to its state at the start of this instruction stream.
    RestoreExtended = 0x06,
    /// Mark a register as undefined.
    Undefined = 0x07,
    /// Mark a register as holding its entry value.
    SameValue = 0x08,
    /// Save a register in another register.
    Register = 0x09,
    /// Push the current row state (not modeled, see the interpreter docs).
    RememberState = 0x0A,
    /// Pop a previously pushed row state (not modeled).
    RestoreState = 0x0B,
    /// Define the CFA as register plus unsigned offset.
    DefCfa = 0x0C,
    /// Change the CFA register, keeping the offset.
    DefCfaRegister = 0x0D,
    /// Change the CFA offset, keeping the register.
    DefCfaOffset = 0x0E,
    /// Define the CFA via a DWARF expression (skipped as opaque).
    DefCfaExpression = 0x0F,
    /// A register is saved at an address computed by an expression.
    Expression = 0x10,
    /// Signed-factored variant of [`CallFrameInstruction::OffsetExtended`].
    OffsetExtendedSf = 0x11,
    /// Signed-factored variant of [`CallFrameInstruction::DefCfa`].
    DefCfaSf = 0x12,
    /// Signed-factored variant of [`CallFrameInstruction::DefCfaOffset`].
    DefCfaOffsetSf = 0x13,
    /// A register's value (not its save slot) is CFA plus factored offset.
    ValOffset = 0x14,
    /// Signed-factored variant of [`CallFrameInstruction::ValOffset`].
    ValOffsetSf = 0x15,
    /// A register's value is computed by an expression.
    ValExpression = 0x16,
    /// GNU extension: outgoing argument area size.
    GnuArgsSize = 0x2E,
    /// GNU extension: like `offset_extended` with a negated offset.
    GnuNegativeOffsetExtended = 0x2F,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_opcode_lookup() {
        assert_eq!(
            CallFrameInstruction::from_repr(0x0C),
            Some(CallFrameInstruction::DefCfa)
        );
        assert_eq!(
            CallFrameInstruction::from_repr(0x2E),
            Some(CallFrameInstruction::GnuArgsSize)
        );
        // gaps in the extended range are unknown opcodes
        assert_eq!(CallFrameInstruction::from_repr(0x17), None);
        assert_eq!(CallFrameInstruction::from_repr(0x2D), None);
    }

    #[test]
    fn test_packed_class_masks() {
        assert_eq!(0x41 & DW_CFA_PACKED_MASK, DW_CFA_ADVANCE_LOC);
        assert_eq!(0x86 & DW_CFA_PACKED_MASK, DW_CFA_OFFSET);
        assert_eq!(0xC3 & DW_CFA_PACKED_MASK, DW_CFA_RESTORE);
        assert_eq!(0x86 & DW_CFA_OPERAND_MASK, 6);
    }
}

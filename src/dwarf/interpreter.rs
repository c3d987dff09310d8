//! Call-frame instruction interpreter.
//!
//! This module replays a function's unwind program (the CIE's shared initial
//! instructions followed by the FDE's own instructions) into a [`PrologInfo`]
//! snapshot describing where the CFA comes from and where each register is saved.
//! The snapshot is the sole input of the compact unwind synthesizer in
//! [`crate::compact`].
//!
//! # Architecture
//!
//! [`interpret`] is called twice per function over one mutable [`PrologInfo`]:
//! once with [`CommonInformationEntry::initial_instructions`] and once with the
//! FDE instruction bytes. Each call snapshots the incoming state as the baseline
//! for `restore`/`restore_extended`, so restores inside the CIE program revert to
//! the all-unused state while restores inside the FDE program revert to the
//! CIE-derived state. This two-phase restore scope is load-bearing and matches
//! how `.eh_frame` consumers apply the CIE prologue per FDE.
//!
//! # Error contract
//!
//! Reads past the end of the instruction stream and oversized LEB128 values are
//! hard [`crate::Error::Malformed`]/[`crate::Error::OutOfBounds`] failures. An
//! unknown opcode or a register index outside the modeled space (≥
//! [`MAX_REGISTER_NUMBER`]) is the soft [`crate::Error::NotSupported`], which the
//! synthesizer folds into the `MODE_DWARF` sentinel instead of crashing.
//!
//! `remember_state`/`restore_state` are parsed but not modeled: there is no stack
//! of row snapshots, so a prologue whose final state depends on them is silently
//! mis-simulated. The compact encoder only inspects prologue-shaped programs
//! where this does not occur; stricter callers can pre-scan for the two opcodes.

use bitflags::bitflags;

use crate::{
    dwarf::{
        cie::CommonInformationEntry,
        constants::{
            CallFrameInstruction, DW_CFA_ADVANCE_LOC, DW_CFA_OFFSET, DW_CFA_OPERAND_MASK,
            DW_CFA_PACKED_MASK, DW_CFA_RESTORE,
        },
    },
    file::parser::Parser,
    Error, Result,
};

/// Size of the modeled register index space.
///
/// Covers every register number the x86 and x86-64 DWARF mappings define, with
/// room to spare; any reference at or above this bound is treated as an
/// unsupported construct rather than malformed input.
pub const MAX_REGISTER_NUMBER: usize = 120;

/// Where a register's entry value lives at the end of the prologue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterLocation {
    /// Not saved, or explicitly undefined.
    #[default]
    Unused,
    /// Saved in memory at CFA plus the given byte offset.
    InCfa(i64),
    /// The register's value (not a save slot) is CFA plus the given offset.
    OffsetFromCfa(i64),
    /// Saved in another register.
    InRegister(u64),
    /// Saved at an address computed by the expression at this instruction-stream
    /// byte position.
    AtExpression(usize),
    /// The value itself is computed by the expression at this byte position.
    IsExpression(usize),
}

bitflags! {
    /// Facts observed while replaying the unwind program that the compact
    /// encoders use to reject functions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PrologFlags: u8 {
        /// Some register was saved more than once.
        const SAVED_MORE_THAN_ONCE = 1 << 0;
        /// Some register is saved in another register.
        const IN_OTHER_REGISTERS = 1 << 1;
        /// A `def_cfa` offset looked negative (unsigned value above 0x80000000).
        const CFA_OFFSET_NEGATIVE = 1 << 2;
        /// `same_value` appeared anywhere in the program.
        const SAME_VALUE_USED = 1 << 3;
    }
}

/// Snapshot of a function's prologue as described by its unwind program.
///
/// Created fresh per function, filled by [`interpret`], consumed by
/// [`crate::compact::synthesize`], then discarded.
#[derive(Debug, Clone)]
pub struct PrologInfo {
    /// DWARF register number the CFA is computed from.
    pub cfa_register: u32,
    /// Byte offset added to the CFA register; `CFA = cfa_register + offset`.
    pub cfa_register_offset: i32,
    /// Byte position of a CFA expression, if the program used one.
    pub cfa_expression: Option<usize>,
    /// Outgoing argument area size from `GNU_args_size`.
    pub sp_extra_arg_size: u32,
    /// Code offset at the most recent `def_cfa_offset`, i.e. where the stack
    /// decrement instruction ends.
    pub code_offset_at_stack_decrement: u32,
    /// Register the CIE's own program saved twice at the same slot, if any.
    pub register_saved_twice_in_cie: Option<u8>,
    /// Observed facts the encoders reject on.
    pub flags: PrologFlags,
    /// Where to restore each register from.
    pub registers: [RegisterLocation; MAX_REGISTER_NUMBER],
}

impl Default for PrologInfo {
    fn default() -> Self {
        PrologInfo {
            cfa_register: 0,
            cfa_register_offset: 0,
            cfa_expression: None,
            sp_extra_arg_size: 0,
            code_offset_at_stack_decrement: 0,
            register_saved_twice_in_cie: None,
            flags: PrologFlags::empty(),
            registers: [RegisterLocation::Unused; MAX_REGISTER_NUMBER],
        }
    }
}

impl PrologInfo {
    /// The location of a register, if its index is inside the modeled space.
    #[must_use]
    pub fn register(&self, reg: usize) -> Option<RegisterLocation> {
        self.registers.get(reg).copied()
    }
}

/// Validate a register index against the modeled register space.
fn checked_reg(reg: u64) -> Result<usize> {
    if reg >= MAX_REGISTER_NUMBER as u64 {
        return Err(Error::NotSupported);
    }
    Ok(reg as usize)
}

/// Replay one call-frame instruction stream into `info`.
///
/// Call once with the CIE's initial instructions and once with the FDE's own
/// instructions, sharing the same `info`. The incoming state is snapshotted at
/// the start of each call and serves as the baseline that `restore` and
/// `restore_extended` revert single registers to.
///
/// # Errors
/// [`crate::Error::NotSupported`] for unknown opcodes or register indices ≥
/// [`MAX_REGISTER_NUMBER`]; [`crate::Error::OutOfBounds`] /
/// [`crate::Error::Malformed`] for truncated or invalid operand data.
///
/// # Examples
///
/// ```rust
/// use unwindscope::{interpret, CommonInformationEntry, PrologInfo, RegisterLocation};
///
/// let cie = CommonInformationEntry::new(
///     1, "zR".to_string(), 1, -8, 16, 0x1B, 0xFF, 0xFF, 0,
///     vec![0x0C, 0x07, 0x08, 0x90, 0x01], // def_cfa rsp+8; ra at CFA-8
/// );
///
/// let mut info = PrologInfo::default();
/// interpret(cie.initial_instructions(), &cie, &mut info)?;
///
/// assert_eq!(info.cfa_register, 7);
/// assert_eq!(info.cfa_register_offset, 8);
/// assert_eq!(info.register(16), Some(RegisterLocation::InCfa(-8)));
/// # Ok::<(), unwindscope::Error>(())
/// ```
#[allow(clippy::too_many_lines)]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn interpret(
    instructions: &[u8],
    cie: &CommonInformationEntry,
    info: &mut PrologInfo,
) -> Result<()> {
    let initial_state = info.clone();
    let mut parser = Parser::new(instructions);
    let mut code_offset = 0_u64;

    while parser.has_more_data() {
        let opcode = parser.read_le::<u8>()?;

        // Top two bits select the packed opcode classes; zero means the full
        // byte is an extended opcode.
        match opcode & DW_CFA_PACKED_MASK {
            DW_CFA_ADVANCE_LOC => {
                code_offset = code_offset.wrapping_add(
                    u64::from(opcode & DW_CFA_OPERAND_MASK)
                        .wrapping_mul(cie.code_alignment_factor()),
                );
                continue;
            }
            DW_CFA_OFFSET => {
                let reg = usize::from(opcode & DW_CFA_OPERAND_MASK);
                let offset =
                    (parser.read_uleb128()? as i64).wrapping_mul(cie.data_alignment_factor());
                if info.registers[reg] != RegisterLocation::Unused {
                    info.flags |= PrologFlags::SAVED_MORE_THAN_ONCE;
                }
                info.registers[reg] = RegisterLocation::InCfa(offset);
                continue;
            }
            DW_CFA_RESTORE => {
                let reg = usize::from(opcode & DW_CFA_OPERAND_MASK);
                info.registers[reg] = initial_state.registers[reg];
                continue;
            }
            _ => {}
        }

        let Some(instruction) = CallFrameInstruction::from_repr(opcode) else {
            return Err(Error::NotSupported);
        };

        match instruction {
            CallFrameInstruction::Nop => {}
            CallFrameInstruction::SetLoc => {
                code_offset = parser.read_encoded(cie.fde_encoding())?;
            }
            CallFrameInstruction::AdvanceLoc1 => {
                code_offset = code_offset.wrapping_add(
                    u64::from(parser.read_le::<u8>()?).wrapping_mul(cie.code_alignment_factor()),
                );
            }
            CallFrameInstruction::AdvanceLoc2 => {
                code_offset = code_offset.wrapping_add(
                    u64::from(parser.read_le::<u16>()?).wrapping_mul(cie.code_alignment_factor()),
                );
            }
            CallFrameInstruction::AdvanceLoc4 => {
                code_offset = code_offset.wrapping_add(
                    u64::from(parser.read_le::<u32>()?).wrapping_mul(cie.code_alignment_factor()),
                );
            }
            CallFrameInstruction::OffsetExtended => {
                let reg = parser.read_uleb128()?;
                let offset =
                    (parser.read_uleb128()? as i64).wrapping_mul(cie.data_alignment_factor());
                let reg = checked_reg(reg)?;
                if info.registers[reg] != RegisterLocation::Unused {
                    info.flags |= PrologFlags::SAVED_MORE_THAN_ONCE;
                }
                info.registers[reg] = RegisterLocation::InCfa(offset);
            }
            CallFrameInstruction::OffsetExtendedSf => {
                let reg = parser.read_uleb128()?;
                let offset = parser
                    .read_sleb128()?
                    .wrapping_mul(cie.data_alignment_factor());
                let reg = checked_reg(reg)?;
                if info.registers[reg] != RegisterLocation::Unused {
                    info.flags |= PrologFlags::SAVED_MORE_THAN_ONCE;
                }
                info.registers[reg] = RegisterLocation::InCfa(offset);
            }
            CallFrameInstruction::RestoreExtended => {
                let reg = checked_reg(parser.read_uleb128()?)?;
                info.registers[reg] = initial_state.registers[reg];
            }
            CallFrameInstruction::Undefined => {
                let reg = checked_reg(parser.read_uleb128()?)?;
                info.registers[reg] = RegisterLocation::Unused;
            }
            CallFrameInstruction::SameValue => {
                let reg = checked_reg(parser.read_uleb128()?)?;
                info.registers[reg] = RegisterLocation::Unused;
                info.flags |= PrologFlags::SAME_VALUE_USED;
            }
            CallFrameInstruction::Register => {
                let reg = parser.read_uleb128()?;
                let reg2 = parser.read_uleb128()?;
                let reg = checked_reg(reg)?;
                checked_reg(reg2)?;
                info.registers[reg] = RegisterLocation::InRegister(reg2);
                info.flags |= PrologFlags::IN_OTHER_REGISTERS;
            }
            // Not modeled: there is no stack of row snapshots (see module docs).
            CallFrameInstruction::RememberState | CallFrameInstruction::RestoreState => {}
            CallFrameInstruction::DefCfa => {
                let reg = parser.read_uleb128()?;
                let offset = parser.read_uleb128()?;
                let reg = checked_reg(reg)?;
                info.cfa_register = reg as u32;
                info.cfa_register_offset = offset as i32;
                // Coarse magnitude check inherited from the original encoder.
                if offset > 0x8000_0000 {
                    info.flags |= PrologFlags::CFA_OFFSET_NEGATIVE;
                }
            }
            CallFrameInstruction::DefCfaSf => {
                let reg = parser.read_uleb128()?;
                let offset = parser
                    .read_sleb128()?
                    .wrapping_mul(cie.data_alignment_factor());
                let reg = checked_reg(reg)?;
                info.cfa_register = reg as u32;
                info.cfa_register_offset = offset as i32;
            }
            CallFrameInstruction::DefCfaRegister => {
                let reg = checked_reg(parser.read_uleb128()?)?;
                info.cfa_register = reg as u32;
            }
            CallFrameInstruction::DefCfaOffset => {
                info.cfa_register_offset = parser.read_uleb128()? as i32;
                info.code_offset_at_stack_decrement = code_offset as u32;
            }
            CallFrameInstruction::DefCfaOffsetSf => {
                info.cfa_register_offset = parser
                    .read_sleb128()?
                    .wrapping_mul(cie.data_alignment_factor())
                    as i32;
                info.code_offset_at_stack_decrement = code_offset as u32;
            }
            CallFrameInstruction::DefCfaExpression => {
                info.cfa_register = 0;
                info.cfa_expression = Some(parser.pos());
                let length = parser.read_uleb128()?;
                skip_expression(&mut parser, length)?;
            }
            CallFrameInstruction::Expression => {
                let reg = checked_reg(parser.read_uleb128()?)?;
                info.registers[reg] = RegisterLocation::AtExpression(parser.pos());
                let length = parser.read_uleb128()?;
                skip_expression(&mut parser, length)?;
            }
            CallFrameInstruction::ValExpression => {
                let reg = checked_reg(parser.read_uleb128()?)?;
                info.registers[reg] = RegisterLocation::IsExpression(parser.pos());
                let length = parser.read_uleb128()?;
                skip_expression(&mut parser, length)?;
            }
            CallFrameInstruction::ValOffset => {
                let reg = parser.read_uleb128()?;
                let offset =
                    (parser.read_uleb128()? as i64).wrapping_mul(cie.data_alignment_factor());
                let reg = checked_reg(reg)?;
                info.registers[reg] = RegisterLocation::OffsetFromCfa(offset);
            }
            CallFrameInstruction::ValOffsetSf => {
                let reg = parser.read_uleb128()?;
                let offset = parser
                    .read_sleb128()?
                    .wrapping_mul(cie.data_alignment_factor());
                let reg = checked_reg(reg)?;
                info.registers[reg] = RegisterLocation::OffsetFromCfa(offset);
            }
            CallFrameInstruction::GnuArgsSize => {
                info.sp_extra_arg_size = parser.read_uleb128()? as u32;
            }
            CallFrameInstruction::GnuNegativeOffsetExtended => {
                let reg = checked_reg(parser.read_uleb128()?)?;
                let offset =
                    (parser.read_uleb128()? as i64).wrapping_mul(cie.data_alignment_factor());
                if info.registers[reg] != RegisterLocation::Unused {
                    info.flags |= PrologFlags::SAVED_MORE_THAN_ONCE;
                }
                info.registers[reg] = RegisterLocation::InCfa(offset.wrapping_neg());
            }
        }
    }

    Ok(())
}

/// Skip over an opaque DWARF expression blob.
fn skip_expression(parser: &mut Parser<'_>, length: u64) -> Result<()> {
    let length = usize::try_from(length).map_err(|_| out_of_bounds_error!())?;
    parser.skip(length)
}

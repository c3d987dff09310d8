//! Compact unwind encoding synthesis.
//!
//! Turns the [`PrologInfo`] produced by the call-frame interpreter into a
//! single 32-bit compact unwind encoding word for x86 or x86-64. Functions
//! whose prologue fits one of the recognized shapes get a self-contained
//! encoding; everything else folds into [`encoding::UNWIND_MODE_DWARF`], which
//! tells the unwinder to keep using the original FDE. Synthesis never fails
//! because a prologue is unusual, only because the input data itself is
//! malformed.
//!
//! # Architecture
//!
//! The two architectures share one encoder ([`synthesize`] dispatches on
//! [`PointerWidth`]); the per-architecture modules contribute an [`ArchLayout`]
//! describing pointer size, frame geometry, and the callee-saved register set.
//! Three encodable shapes exist:
//!
//! * frame-pointer based (`UNWIND_MODE_BP_FRAME`): CFA is `bp + 2*ptr` and the
//!   old frame pointer sits at `CFA - 2*ptr`; up to five callee-saved
//!   registers occupy the slots below the frame pointer,
//! * frameless immediate (`UNWIND_MODE_STACK_IMMD`): CFA is `sp + size` with
//!   `size / ptr` fitting in 8 bits; saved registers abut the return address
//!   and are recorded as a Lehmer-coded permutation,
//! * frameless indirect (`UNWIND_MODE_STACK_IND`): as above, but the stack
//!   size is fetched from the `sub sp` instruction's 32-bit immediate inside
//!   the function body, located via [`CodeSource`].

pub mod encoding;
pub mod x86;
pub mod x86_64;

use crate::{
    compact::encoding::{
        UNWIND_BP_FRAME_OFFSET, UNWIND_FRAMELESS_STACK_ADJUST, UNWIND_FRAMELESS_STACK_REG_COUNT,
        UNWIND_FRAMELESS_STACK_SIZE, UNWIND_MODE_BP_FRAME, UNWIND_MODE_DWARF,
        UNWIND_MODE_STACK_IMMD, UNWIND_MODE_STACK_IND,
    },
    dwarf::{
        cie::CommonInformationEntry,
        interpreter::{interpret, PrologFlags, PrologInfo, RegisterLocation},
    },
    file::{CodeSource, PointerWidth},
    Error, Result,
};

/// Per-architecture geometry and register tables for the shared encoder.
pub(crate) struct ArchLayout {
    /// Pointer size in bytes (8 for x86-64, 4 for x86).
    pointer_size: i64,
    /// DWARF number of the frame pointer register.
    frame_reg: usize,
    /// DWARF number of the stack pointer register.
    stack_reg: usize,
    /// DWARF number of the return-address pseudo register.
    ret_addr_reg: usize,
    /// Encodable callee-saved registers as (DWARF number, compact code) pairs.
    /// The frame pointer is last; the frame-pointer mode only uses the first
    /// five entries.
    saved: [(usize, u32); 6],
}

impl ArchLayout {
    /// Construct a layout; used by the per-architecture modules.
    pub(crate) const fn new(
        pointer_size: i64,
        frame_reg: usize,
        stack_reg: usize,
        ret_addr_reg: usize,
        saved: [(usize, u32); 6],
    ) -> Self {
        ArchLayout {
            pointer_size,
            frame_reg,
            stack_reg,
            ret_addr_reg,
            saved,
        }
    }
}

/// Synthesize the compact unwind encoding for one function.
///
/// Replays the CIE's initial instructions and the FDE's instructions into a
/// fresh [`PrologInfo`], then encodes the result for the given pointer width.
/// Unsupported constructs (unknown opcodes, out-of-range register numbers,
/// prologue shapes the compact format cannot express) yield
/// [`encoding::UNWIND_MODE_DWARF`]; only malformed input data is an error.
///
/// `code` provides the function's machine code and is only consulted for the
/// frameless-indirect shape, where the stack size must be read back out of the
/// `sub sp` instruction at `function_start` plus the recorded code offset.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] or [`crate::Error::OutOfBounds`] when
/// the instruction streams or the machine code backing `code` are truncated or
/// invalid.
///
/// # Examples
///
/// ```rust
/// use unwindscope::{synthesize, CommonInformationEntry, ImageSlice, PointerWidth};
///
/// // def_cfa rsp+8, return address at CFA-8: a leaf function
/// let cie = CommonInformationEntry::new(
///     1, "zR".to_string(), 1, -8, 16, 0x1B, 0xFF, 0xFF, 0,
///     vec![0x0C, 0x07, 0x08, 0x90, 0x01],
/// );
///
/// let mut code = ImageSlice::new(0x1000, &[]);
/// let word = synthesize(PointerWidth::Eight, &cie, &[], 0x1000, &mut code)?;
/// assert_eq!(word, 0x0200_0000 | (1 << 16));
/// # Ok::<(), unwindscope::Error>(())
/// ```
pub fn synthesize<S: CodeSource>(
    width: PointerWidth,
    cie: &CommonInformationEntry,
    fde_instructions: &[u8],
    function_start: u64,
    code: &mut S,
) -> Result<u32> {
    let mut info = PrologInfo::default();
    let replay = interpret(cie.initial_instructions(), cie, &mut info)
        .and_then(|()| interpret(fde_instructions, cie, &mut info));
    match replay {
        Ok(()) => {}
        Err(Error::NotSupported) => return Ok(UNWIND_MODE_DWARF),
        Err(err) => return Err(err),
    }

    match width {
        PointerWidth::Four => x86::encode(&info, function_start, code),
        PointerWidth::Eight => x86_64::encode(&info, function_start, code),
    }
}

/// The shared encoder behind [`x86::encode`] and [`x86_64::encode`].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn encode_with<S: CodeSource>(
    layout: &ArchLayout,
    info: &PrologInfo,
    function_start: u64,
    code: &mut S,
) -> Result<u32> {
    // Prologues the compact format cannot describe at all.
    if info.register_saved_twice_in_cie == Some(layout.ret_addr_reg as u8) {
        return Ok(UNWIND_MODE_DWARF);
    }
    if info.flags.intersects(
        PrologFlags::SAVED_MORE_THAN_ONCE
            | PrologFlags::CFA_OFFSET_NEGATIVE
            | PrologFlags::SAME_VALUE_USED,
    ) {
        return Ok(UNWIND_MODE_DWARF);
    }
    if info.sp_extra_arg_size != 0 {
        return Ok(UNWIND_MODE_DWARF);
    }

    let ptr = layout.pointer_size;

    let standard_bp_frame = info.cfa_register as usize == layout.frame_reg
        && i64::from(info.cfa_register_offset) == 2 * ptr
        && info.registers[layout.frame_reg] == RegisterLocation::InCfa(-2 * ptr);
    let standard_sp_frame = info.cfa_register as usize == layout.stack_reg;
    if !standard_bp_frame && !standard_sp_frame {
        return Ok(UNWIND_MODE_DWARF);
    }

    // Scan the saved registers; anything outside the encodable set, or saved
    // anywhere but a CFA slot, forces the DWARF fallback. The return-address
    // pseudo register is implicit in every mode and is skipped.
    let mut saved_offsets: [Option<i64>; 6] = [None; 6];
    for (reg, location) in info.registers.iter().enumerate() {
        match *location {
            RegisterLocation::Unused => {}
            RegisterLocation::InCfa(offset) => {
                if reg == layout.ret_addr_reg {
                    continue;
                }
                let Some(index) = layout.saved.iter().position(|&(dwarf, _)| dwarf == reg) else {
                    return Ok(UNWIND_MODE_DWARF);
                };
                saved_offsets[index] = Some(offset);
            }
            _ => return Ok(UNWIND_MODE_DWARF),
        }
    }

    if standard_bp_frame {
        encode_bp_frame(layout, &saved_offsets)
    } else {
        encode_frameless(layout, info, &saved_offsets, function_start, code)
    }
}

/// Encode a frame-pointer based function.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode_bp_frame(layout: &ArchLayout, saved_offsets: &[Option<i64>; 6]) -> Result<u32> {
    let ptr = layout.pointer_size;
    let mut word = UNWIND_MODE_BP_FRAME;

    // Furthest save slot below the frame pointer; the frame pointer's own
    // slot (last table entry) is implicit in the mode.
    let mut furthest = 0_i64;
    for offset in saved_offsets.iter().take(5).flatten() {
        if *offset < furthest {
            furthest = *offset;
        }
    }
    if furthest == 0 {
        return Ok(word);
    }

    let encoded_offset = (furthest + 2 * ptr) / -ptr;
    if !(0..=255).contains(&encoded_offset) {
        return Ok(UNWIND_MODE_DWARF);
    }
    word |= (encoded_offset as u32) << UNWIND_BP_FRAME_OFFSET.trailing_zeros();

    // Five pointer-sized slots starting at the furthest offset, each holding
    // one 3-bit compact register code.
    for (index, &(_, compact)) in layout.saved.iter().enumerate().take(5) {
        if let Some(offset) = saved_offsets[index] {
            let delta = offset - furthest;
            if delta < 0 || delta > 4 * ptr || delta % ptr != 0 {
                return Ok(UNWIND_MODE_DWARF);
            }
            word |= compact << ((delta / ptr) as u32 * 3);
        }
    }

    Ok(word)
}

/// Encode a frameless (stack-pointer based) function.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode_frameless<S: CodeSource>(
    layout: &ArchLayout,
    info: &PrologInfo,
    saved_offsets: &[Option<i64>; 6],
    function_start: u64,
    code: &mut S,
) -> Result<u32> {
    let ptr = layout.pointer_size;
    let max_immediate =
        i64::from(UNWIND_FRAMELESS_STACK_SIZE >> UNWIND_FRAMELESS_STACK_SIZE.trailing_zeros());

    if info.cfa_register_offset < 0 {
        return Ok(UNWIND_MODE_DWARF);
    }

    let mut word = UNWIND_MODE_STACK_IMMD;
    let mut stack_value = i64::from(info.cfa_register_offset) / ptr;
    let mut stack_adjust = 0_u32;
    if stack_value > max_immediate {
        // Too big for the immediate field; record the code offset of the
        // `sub sp` instruction instead and let the unwinder fetch its 32-bit
        // immediate at runtime.
        if info.code_offset_at_stack_decrement == 0 {
            return Ok(UNWIND_MODE_DWARF);
        }
        let decrement_end = u64::from(info.code_offset_at_stack_decrement);
        let literal_address = function_start.wrapping_add(decrement_end).wrapping_sub(4);

        let saved_position = code.tell();
        if !code.address_seek(literal_address) {
            return Ok(UNWIND_MODE_DWARF);
        }
        let literal = code.read_u32()?;
        code.seek(saved_position);

        stack_adjust = (info.cfa_register_offset as u32).wrapping_sub(literal) / ptr as u32;
        stack_value = decrement_end as i64 - 4;
        if stack_adjust > 7 {
            return Ok(UNWIND_MODE_DWARF);
        }
        if !(0..=max_immediate).contains(&stack_value) {
            return Ok(UNWIND_MODE_DWARF);
        }
        word = UNWIND_MODE_STACK_IND;
    }

    // Saved registers must occupy the six pointer-sized slots directly below
    // the return address, packed against it with no gaps.
    let mut slots = [0_u32; 6];
    let mut count = 0_u32;
    for (index, &(_, compact)) in layout.saved.iter().enumerate() {
        if let Some(offset) = saved_offsets[index] {
            count += 1;
            let adjusted = offset + 7 * ptr;
            if adjusted < 0 || adjusted % ptr != 0 {
                return Ok(UNWIND_MODE_DWARF);
            }
            let position = adjusted / ptr;
            if !(0..6).contains(&position) {
                return Ok(UNWIND_MODE_DWARF);
            }
            if slots[position as usize] != 0 {
                return Ok(UNWIND_MODE_DWARF);
            }
            slots[position as usize] = compact;
        }
    }
    for i in 0..count as usize {
        if slots[5 - i] == 0 {
            return Ok(UNWIND_MODE_DWARF);
        }
    }

    word |= (stack_value as u32) << UNWIND_FRAMELESS_STACK_SIZE.trailing_zeros();
    word |= stack_adjust << UNWIND_FRAMELESS_STACK_ADJUST.trailing_zeros();
    word |= count << UNWIND_FRAMELESS_STACK_REG_COUNT.trailing_zeros();
    word |= permutation_encoding(&slots, count as usize);
    Ok(word)
}

/// Lehmer-code the saved-register order into the 10-bit permutation field.
///
/// `slots[6 - count..]` holds the distinct compact register codes in stack
/// order; each is renumbered to its rank among the codes not yet consumed,
/// then the ranks are combined with factorial-base weights. The weights depend
/// on `count` because fewer registers need fewer digits.
fn permutation_encoding(slots: &[u32; 6], count: usize) -> u32 {
    let mut renumbered = [0_u32; 6];
    for i in (6 - count)..6 {
        let smaller = slots[(6 - count)..i]
            .iter()
            .filter(|&&code| code < slots[i])
            .count() as u32;
        renumbered[i] = slots[i] - smaller - 1;
    }

    match count {
        6 => {
            120 * renumbered[0]
                + 24 * renumbered[1]
                + 6 * renumbered[2]
                + 2 * renumbered[3]
                + renumbered[4]
        }
        5 => {
            120 * renumbered[1]
                + 24 * renumbered[2]
                + 6 * renumbered[3]
                + 2 * renumbered[4]
                + renumbered[5]
        }
        4 => 60 * renumbered[2] + 12 * renumbered[3] + 3 * renumbered[4] + renumbered[5],
        3 => 20 * renumbered[3] + 4 * renumbered[4] + renumbered[5],
        2 => 5 * renumbered[4] + renumbered[5],
        1 => renumbered[5],
        _ => 0,
    }
}

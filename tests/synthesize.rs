//! End-to-end synthesis tests: call-frame instruction streams in, compact
//! unwind words out.

use std::cell::Cell;

use unwindscope::prelude::*;

/// The standard x86-64 CIE: `def_cfa rsp+8`, return address at `CFA-8`.
fn x64_cie() -> CommonInformationEntry {
    CommonInformationEntry::new(
        1,
        "zR".to_string(),
        1,
        -8,
        16,
        0x1B,
        0xFF,
        0xFF,
        0,
        vec![0x0C, 0x07, 0x08, 0x90, 0x01],
    )
}

/// The standard x86 CIE: `def_cfa esp+4`, return address at `CFA-4`.
fn x86_cie() -> CommonInformationEntry {
    CommonInformationEntry::new(
        1,
        "zR".to_string(),
        1,
        -4,
        8,
        0x1B,
        0xFF,
        0xFF,
        0,
        vec![0x0C, 0x07, 0x04, 0x88, 0x01],
    )
}

/// A code source that records whether the synthesizer touched it.
struct RecordingCode {
    touched: Cell<bool>,
}

impl RecordingCode {
    fn new() -> Self {
        RecordingCode {
            touched: Cell::new(false),
        }
    }
}

impl CodeSource for RecordingCode {
    fn tell(&self) -> u64 {
        self.touched.set(true);
        0
    }

    fn seek(&mut self, _pos: u64) -> bool {
        self.touched.set(true);
        true
    }

    fn address_seek(&mut self, _address: u64) -> bool {
        self.touched.set(true);
        false
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.touched.set(true);
        Ok(0)
    }
}

#[test]
fn leaf_function_is_frameless_with_one_slot() {
    let cie = x64_cie();
    let mut code = ImageSlice::new(0x1000, &[]);

    let word = synthesize(PointerWidth::Eight, &cie, &[], 0x1000, &mut code).unwrap();
    assert_eq!(word, UNWIND_MODE_STACK_IMMD | (1 << 16));
}

#[test]
fn standard_rbp_frame_with_saved_rbx() {
    let cie = x64_cie();
    // def_cfa_offset 16; rbp at CFA-16; def_cfa_register rbp; rbx at CFA-24
    let fde = [0x0E, 0x10, 0x86, 0x02, 0x0D, 0x06, 0x83, 0x03];

    let mut code = ImageSlice::new(0x1000, &[]);
    let word = synthesize(PointerWidth::Eight, &cie, &fde, 0x1000, &mut code).unwrap();
    assert_eq!(word, UNWIND_MODE_BP_FRAME | (1 << 16) | 1);
}

#[test]
fn synthesis_is_deterministic() {
    let cie = x64_cie();
    let fde = [0x0E, 0x10, 0x86, 0x02, 0x0D, 0x06, 0x83, 0x03];

    let mut code = ImageSlice::new(0x1000, &[]);
    let words: Vec<u32> = (0..3)
        .map(|_| synthesize(PointerWidth::Eight, &cie, &fde, 0x1000, &mut code).unwrap())
        .collect();
    assert!(words.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn same_value_forces_dwarf_fallback() {
    let cie = x64_cie();
    // same_value rbx
    let fde = [0x08, 0x03];

    let mut code = ImageSlice::new(0x1000, &[]);
    let word = synthesize(PointerWidth::Eight, &cie, &fde, 0x1000, &mut code).unwrap();
    assert_eq!(word, UNWIND_MODE_DWARF);
}

#[test]
fn out_of_range_register_forces_dwarf_fallback() {
    let cie = x64_cie();
    // offset_extended for register 200
    let fde = [0x05, 0xC8, 0x01, 0x02];

    let mut code = ImageSlice::new(0x1000, &[]);
    let word = synthesize(PointerWidth::Eight, &cie, &fde, 0x1000, &mut code).unwrap();
    assert_eq!(word, UNWIND_MODE_DWARF);
}

#[test]
fn oversized_stack_without_decrement_offset_never_reads_code() {
    let cie = x64_cie();
    // def_cfa_offset 4096 with no advance_loc before it
    let mut w = Writer::new(0, None);
    w.write_u8(0x0E);
    w.write_uleb128(4096);

    let mut code = RecordingCode::new();
    let word = synthesize(PointerWidth::Eight, &cie, &w.into_vec(), 0x1000, &mut code).unwrap();
    assert_eq!(word, UNWIND_MODE_DWARF);
    assert!(!code.touched.get());
}

#[test]
fn oversized_stack_reads_decrement_immediate() {
    let cie = x64_cie();
    // advance_loc 8; def_cfa_offset 4096 -> sub rsp, 4064 ends at offset 8
    let mut w = Writer::new(0, None);
    w.write_u8(0x40 | 8);
    w.write_u8(0x0E);
    w.write_uleb128(4096);

    let mut image = vec![0_u8; 8];
    image[4..8].copy_from_slice(&4064_u32.to_le_bytes());
    let mut code = ImageSlice::new(0x1000, &image);

    let word = synthesize(PointerWidth::Eight, &cie, &w.into_vec(), 0x1000, &mut code).unwrap();
    assert_eq!(word, UNWIND_MODE_STACK_IND | (4 << 16) | (4 << 13));
}

#[test]
fn frameless_save_orders_round_trip_the_permutation() {
    let cie = x64_cie();
    // the encodable callee-saved set minus rbp, with its compact codes
    let regs = [(3_u64, 1_u32), (12, 2), (13, 3), (14, 4), (15, 5)];

    for count in 1..=3_usize {
        let mut words = Vec::new();
        permuted_subsets(&regs, count, &mut |order| {
            let mut w = Writer::new(0, None);
            w.write_u8(0x0E); // def_cfa_offset
            w.write_uleb128(8 * (order.len() as u64 + 1));
            for (position, &(reg, _)) in order.iter().enumerate() {
                // first pushed register sits nearest the return address
                w.write_u8(0x05); // offset_extended
                w.write_uleb128(reg);
                w.write_uleb128(2 + position as u64);
            }

            let mut code = ImageSlice::new(0x1000, &[]);
            let word =
                synthesize(PointerWidth::Eight, &cie, &w.into_vec(), 0x1000, &mut code).unwrap();
            assert_eq!(word & UNWIND_MODE_MASK, UNWIND_MODE_STACK_IMMD);
            assert_eq!((word >> 10) & 0x7, count as u32);

            // the unwinder's decode must recover the exact save order: the
            // deepest slot comes first, the register abutting the return
            // address last
            let decoded = decode_permutation(word & 0x3FF, count);
            let expected: Vec<u32> = order.iter().rev().map(|&(_, code)| code).collect();
            assert_eq!(decoded, expected);

            words.push(word);
        });

        let distinct: std::collections::HashSet<u32> = words.iter().copied().collect();
        assert_eq!(distinct.len(), words.len(), "collision at count {count}");
    }
}

/// Reference decode of the 10-bit permutation field, as the unwinder performs
/// it: split into factorial-base digits, then map each digit to the n-th
/// smallest compact register code not yet consumed.
fn decode_permutation(mut permutation: u32, count: usize) -> Vec<u32> {
    let mut digits = Vec::new();
    match count {
        3 => {
            digits.push(permutation / 20);
            permutation %= 20;
            digits.push(permutation / 4);
            digits.push(permutation % 4);
        }
        2 => {
            digits.push(permutation / 5);
            digits.push(permutation % 5);
        }
        1 => digits.push(permutation),
        _ => panic!("decoder covers counts 1..=3"),
    }

    let mut available: Vec<u32> = (1..=6).collect();
    digits
        .into_iter()
        .map(|digit| available.remove(digit as usize))
        .collect()
}

/// Call `visit` with every ordered arrangement of `count` registers from `regs`.
fn permuted_subsets(
    regs: &[(u64, u32)],
    count: usize,
    visit: &mut dyn FnMut(&[(u64, u32)]),
) {
    fn recurse(
        regs: &[(u64, u32)],
        order: &mut Vec<(u64, u32)>,
        count: usize,
        visit: &mut dyn FnMut(&[(u64, u32)]),
    ) {
        if order.len() == count {
            visit(order);
            return;
        }
        for &reg in regs {
            if !order.contains(&reg) {
                order.push(reg);
                recurse(regs, order, count, visit);
                order.pop();
            }
        }
    }
    recurse(regs, &mut Vec::new(), count, visit);
}

#[test]
fn x86_leaf_function() {
    let cie = x86_cie();
    let mut code = ImageSlice::new(0x1000, &[]);

    let word = synthesize(PointerWidth::Four, &cie, &[], 0x1000, &mut code).unwrap();
    assert_eq!(word, UNWIND_MODE_STACK_IMMD | (1 << 16));
}

#[test]
fn x86_standard_ebp_frame_with_saved_esi() {
    let cie = x86_cie();
    // def_cfa_offset 8; ebp at CFA-8; def_cfa_register ebp; esi at CFA-12
    let fde = [0x0E, 0x08, 0x86, 0x02, 0x0D, 0x06, 0x84, 0x03];

    let mut code = ImageSlice::new(0x1000, &[]);
    let word = synthesize(PointerWidth::Four, &cie, &fde, 0x1000, &mut code).unwrap();
    assert_eq!(word, UNWIND_MODE_BP_FRAME | (1 << 16) | 5);
}

#[test]
fn truncated_fde_is_a_hard_error() {
    let cie = x64_cie();
    let mut code = ImageSlice::new(0x1000, &[]);

    // offset_extended with no operands
    assert!(synthesize(PointerWidth::Eight, &cie, &[0x05], 0x1000, &mut code).is_err());
}

#[test]
fn overlong_uleb_is_a_hard_error() {
    let cie = x64_cie();
    // def_cfa_offset followed by eleven continuation bytes
    let mut fde = vec![0x0E];
    fde.extend(std::iter::repeat(0x80).take(11));

    let mut code = ImageSlice::new(0x1000, &[]);
    assert!(synthesize(PointerWidth::Eight, &cie, &fde, 0x1000, &mut code).is_err());
}

#[test]
fn saving_a_register_twice_forces_dwarf_fallback() {
    let cie = x64_cie();
    // rbx saved at CFA-16, then again at CFA-24
    let fde = [0x83, 0x02, 0x83, 0x03];

    let mut code = ImageSlice::new(0x1000, &[]);
    let word = synthesize(PointerWidth::Eight, &cie, &fde, 0x1000, &mut code).unwrap();
    assert_eq!(word, UNWIND_MODE_DWARF);
}

#[test]
fn restore_reinstates_the_cie_state() {
    let cie = x64_cie();
    // re-save the return address, then restore it; the re-save still counts as
    // a double save and forces the fallback
    let fde = [0x05, 0x10, 0x04, 0xC0 | 0x10];

    let mut code = ImageSlice::new(0x1000, &[]);
    let word = synthesize(PointerWidth::Eight, &cie, &fde, 0x1000, &mut code).unwrap();
    assert_eq!(word, UNWIND_MODE_DWARF);
}

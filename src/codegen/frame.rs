use crate::codegen::instr::{BYTES_PER_WORD, Instr, Reg};
use crate::codegen::seq::CodeSeq;

// =============================================================================
// FRAME - activation-record addressing and runtime stack idioms
// =============================================================================
//
// The runtime stack grows upward; `$sp` points at the next free word. An
// activation record's base is its lowest address, held in `$fp` for the
// current scope; locals sit at non-negative word offsets from the base in
// declaration order.

/// Byte offset of the static-link word within a nested activation record.
pub const STATIC_LINK_OFFSET: u16 = 0;

/// Code that materializes the address of the activation record
/// `levels_outward` lexical scopes out from the current one, together with
/// the register that ends up holding it.
///
/// Zero levels emits nothing and designates `$fp` itself; each additional
/// level is one load of the static-link word, so the sequence length is
/// exactly `levels_outward`.
pub fn frame_address(dest: Reg, levels_outward: u32) -> (CodeSeq, Reg) {
    if levels_outward == 0 {
        return (CodeSeq::empty(), Reg::Fp);
    }
    let mut seq = CodeSeq::singleton(Instr::Lw {
        rd: dest,
        base: Reg::Fp,
        offset: STATIC_LINK_OFFSET,
    });
    for _ in 1..levels_outward {
        seq = seq.push(Instr::Lw {
            rd: dest,
            base: dest,
            offset: STATIC_LINK_OFFSET,
        });
    }
    (seq, dest)
}

/// Push a register onto the runtime stack.
///
/// Stack effect: `( -- r )`
pub fn push_reg(r: Reg) -> CodeSeq {
    CodeSeq::singleton(Instr::Sw {
        base: Reg::Sp,
        src: r,
        offset: 0,
    })
    .push(Instr::Addi {
        rd: Reg::Sp,
        rs: Reg::Sp,
        imm: BYTES_PER_WORD as i16,
    })
}

/// Pop the top of the runtime stack into a register.
///
/// Stack effect: `( x -- )`
pub fn pop_into_reg(r: Reg) -> CodeSeq {
    CodeSeq::singleton(Instr::Addi {
        rd: Reg::Sp,
        rs: Reg::Sp,
        imm: -(BYTES_PER_WORD as i16),
    })
    .push(Instr::Lw {
        rd: r,
        base: Reg::Sp,
        offset: 0,
    })
}

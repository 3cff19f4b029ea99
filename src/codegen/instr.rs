use serde::{Deserialize, Serialize};

// =============================================================================
// INSTR - Machine words, registers, instruction encoding
// =============================================================================
//
// Every instruction occupies exactly one 32-bit little-endian word:
//
//   ┌──────────┬──────┬──────┬────────────────┐
//   │  opcode  │  r1  │  r2  │   immediate    │
//   │ (8 bits) │ (4)  │ (4)  │   (16 bits)    │
//   └──────────┴──────┴──────┴────────────────┘
//
// The immediate field is signed for immediate-arithmetic and branch
// displacements, unsigned for load/store offsets and shift amounts. Branch
// displacements count instructions relative to the *next* instruction:
// taken means `pc <- pc + 1 + disp`.

/// One machine word.
pub type Word = i32;

/// Size of a machine word in bytes. Memory is byte-addressed; every memory
/// operand must be word-aligned.
pub const BYTES_PER_WORD: u32 = 4;

/// Register names.
///
/// `$zero` reads as zero and ignores writes. The generator's register
/// conventions: `$at`/`$v0` condition and value scratch, `$a0` the print
/// argument, `$t1`/`$t2` binary-operator scratch, `$t9` frame walks,
/// `$gp` the data segment base, `$sp` next free stack word, `$fp` the
/// current activation record base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Reg {
    Zero = 0,
    At = 1,
    V0 = 2,
    A0 = 3,
    T1 = 4,
    T2 = 5,
    T9 = 6,
    Gp = 7,
    Sp = 8,
    Fp = 9,
}

impl Reg {
    /// Recover a register from its 4-bit encoding field.
    pub fn from_index(n: u8) -> Option<Reg> {
        match n {
            0 => Some(Reg::Zero),
            1 => Some(Reg::At),
            2 => Some(Reg::V0),
            3 => Some(Reg::A0),
            4 => Some(Reg::T1),
            5 => Some(Reg::T2),
            6 => Some(Reg::T9),
            7 => Some(Reg::Gp),
            8 => Some(Reg::Sp),
            9 => Some(Reg::Fp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reg::Zero => "$zero",
            Reg::At => "$at",
            Reg::V0 => "$v0",
            Reg::A0 => "$a0",
            Reg::T1 => "$t1",
            Reg::T2 => "$t2",
            Reg::T9 => "$t9",
            Reg::Gp => "$gp",
            Reg::Sp => "$sp",
            Reg::Fp => "$fp",
        }
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// Opcode bytes, grouped by class.
const OP_EXIT: u8 = 0x00;
const OP_ADD: u8 = 0x01;
const OP_SUB: u8 = 0x02;
const OP_MUL: u8 = 0x03;
const OP_DIV: u8 = 0x04;
const OP_ADDI: u8 = 0x10;
const OP_ANDI: u8 = 0x11;
const OP_SRL: u8 = 0x12;
const OP_LW: u8 = 0x20;
const OP_SW: u8 = 0x21;
const OP_BEQ: u8 = 0x30;
const OP_BNE: u8 = 0x31;
const OP_BLTZ: u8 = 0x32;
const OP_BLEZ: u8 = 0x33;
const OP_BGTZ: u8 = 0x34;
const OP_BGEZ: u8 = 0x35;
const OP_READ: u8 = 0x40;
const OP_PRINT: u8 = 0x41;

/// A single machine instruction. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    /// Halt the machine. Opcode 0x00, so zeroed memory fails safe instead
    /// of executing garbage.
    Exit,

    // ───────────────────────────── Arithmetic ───────────────────────────
    /// `rd <- rd + rs`
    Add { rd: Reg, rs: Reg },
    /// `rd <- rd - rs`
    Sub { rd: Reg, rs: Reg },
    /// `rd <- rd * rs`
    Mul { rd: Reg, rs: Reg },
    /// `rd <- rd / rs` (truncating)
    Div { rd: Reg, rs: Reg },

    // ──────────────────────── Immediate arithmetic ───────────────────────
    /// `rd <- rs + imm`
    Addi { rd: Reg, rs: Reg, imm: i16 },

    // ────────────────────────────── Bit ops ─────────────────────────────
    /// `rd <- rs & imm`
    Andi { rd: Reg, rs: Reg, imm: u16 },
    /// `rd <- rs >> shamt` (logical). `srl r, r, 0` is the canonical no-op.
    Srl { rd: Reg, rs: Reg, shamt: u16 },

    // ────────────────────────────── Memory ──────────────────────────────
    /// `rd <- mem[base + offset]`, offset in bytes, word-aligned.
    Lw { rd: Reg, base: Reg, offset: u16 },
    /// `mem[base + offset] <- src`, offset in bytes, word-aligned.
    Sw { base: Reg, src: Reg, offset: u16 },

    // ───────────────────────────── Branches ─────────────────────────────
    /// Branch when `r1 == r2`.
    Beq { r1: Reg, r2: Reg, disp: i16 },
    /// Branch when `r1 != r2`.
    Bne { r1: Reg, r2: Reg, disp: i16 },
    /// Branch when `r < 0`.
    Bltz { r: Reg, disp: i16 },
    /// Branch when `r <= 0`.
    Blez { r: Reg, disp: i16 },
    /// Branch when `r > 0`.
    Bgtz { r: Reg, disp: i16 },
    /// Branch when `r >= 0`.
    Bgez { r: Reg, disp: i16 },

    // ─────────────────────────────── I/O ────────────────────────────────
    /// Read one integer from the input channel into `rd`.
    Read { rd: Reg },
    /// Print the integer in `rs` to the output channel.
    Print { rs: Reg },
}

/// A word that cannot be decoded back into an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    UnknownOpcode(u8),
    BadRegister { opcode: u8, field: u8 },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnknownOpcode(op) => {
                write!(f, "unknown opcode 0x{:02x}", op)
            }
            DecodeError::BadRegister { opcode, field } => {
                write!(
                    f,
                    "register field {} out of range in opcode 0x{:02x}",
                    field, opcode
                )
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl Instr {
    /// Pack this instruction into its 32-bit word.
    pub fn encode(&self) -> u32 {
        let (op, r1, r2, imm) = match *self {
            Instr::Exit => (OP_EXIT, Reg::Zero, Reg::Zero, 0),
            Instr::Add { rd, rs } => (OP_ADD, rd, rs, 0),
            Instr::Sub { rd, rs } => (OP_SUB, rd, rs, 0),
            Instr::Mul { rd, rs } => (OP_MUL, rd, rs, 0),
            Instr::Div { rd, rs } => (OP_DIV, rd, rs, 0),
            Instr::Addi { rd, rs, imm } => (OP_ADDI, rd, rs, imm as u16),
            Instr::Andi { rd, rs, imm } => (OP_ANDI, rd, rs, imm),
            Instr::Srl { rd, rs, shamt } => (OP_SRL, rd, rs, shamt),
            Instr::Lw { rd, base, offset } => (OP_LW, rd, base, offset),
            Instr::Sw { base, src, offset } => (OP_SW, base, src, offset),
            Instr::Beq { r1, r2, disp } => (OP_BEQ, r1, r2, disp as u16),
            Instr::Bne { r1, r2, disp } => (OP_BNE, r1, r2, disp as u16),
            Instr::Bltz { r, disp } => (OP_BLTZ, r, Reg::Zero, disp as u16),
            Instr::Blez { r, disp } => (OP_BLEZ, r, Reg::Zero, disp as u16),
            Instr::Bgtz { r, disp } => (OP_BGTZ, r, Reg::Zero, disp as u16),
            Instr::Bgez { r, disp } => (OP_BGEZ, r, Reg::Zero, disp as u16),
            Instr::Read { rd } => (OP_READ, rd, Reg::Zero, 0),
            Instr::Print { rs } => (OP_PRINT, rs, Reg::Zero, 0),
        };
        (op as u32) << 24 | (r1 as u32) << 20 | (r2 as u32) << 16 | imm as u32
    }

    /// Unpack a 32-bit word back into an instruction.
    pub fn decode(word: u32) -> Result<Instr, DecodeError> {
        let op = (word >> 24) as u8;
        let f1 = ((word >> 20) & 0xf) as u8;
        let f2 = ((word >> 16) & 0xf) as u8;
        let imm = (word & 0xffff) as u16;

        let reg = |field: u8| {
            Reg::from_index(field).ok_or(DecodeError::BadRegister { opcode: op, field })
        };

        Ok(match op {
            OP_EXIT => Instr::Exit,
            OP_ADD => Instr::Add { rd: reg(f1)?, rs: reg(f2)? },
            OP_SUB => Instr::Sub { rd: reg(f1)?, rs: reg(f2)? },
            OP_MUL => Instr::Mul { rd: reg(f1)?, rs: reg(f2)? },
            OP_DIV => Instr::Div { rd: reg(f1)?, rs: reg(f2)? },
            OP_ADDI => Instr::Addi { rd: reg(f1)?, rs: reg(f2)?, imm: imm as i16 },
            OP_ANDI => Instr::Andi { rd: reg(f1)?, rs: reg(f2)?, imm },
            OP_SRL => Instr::Srl { rd: reg(f1)?, rs: reg(f2)?, shamt: imm },
            OP_LW => Instr::Lw { rd: reg(f1)?, base: reg(f2)?, offset: imm },
            OP_SW => Instr::Sw { base: reg(f1)?, src: reg(f2)?, offset: imm },
            OP_BEQ => Instr::Beq { r1: reg(f1)?, r2: reg(f2)?, disp: imm as i16 },
            OP_BNE => Instr::Bne { r1: reg(f1)?, r2: reg(f2)?, disp: imm as i16 },
            OP_BLTZ => Instr::Bltz { r: reg(f1)?, disp: imm as i16 },
            OP_BLEZ => Instr::Blez { r: reg(f1)?, disp: imm as i16 },
            OP_BGTZ => Instr::Bgtz { r: reg(f1)?, disp: imm as i16 },
            OP_BGEZ => Instr::Bgez { r: reg(f1)?, disp: imm as i16 },
            OP_READ => Instr::Read { rd: reg(f1)? },
            OP_PRINT => Instr::Print { rs: reg(f1)? },
            other => return Err(DecodeError::UnknownOpcode(other)),
        })
    }

    /// Branch displacement, when this instruction is a branch.
    pub fn branch_disp(&self) -> Option<i16> {
        match *self {
            Instr::Beq { disp, .. }
            | Instr::Bne { disp, .. }
            | Instr::Bltz { disp, .. }
            | Instr::Blez { disp, .. }
            | Instr::Bgtz { disp, .. }
            | Instr::Bgez { disp, .. } => Some(disp),
            _ => None,
        }
    }
}

impl std::fmt::Display for Instr {
    /// Assembler syntax, one instruction per line in listings.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Instr::Exit => write!(f, "EXIT"),
            Instr::Add { rd, rs } => write!(f, "ADD   {}, {}", rd, rs),
            Instr::Sub { rd, rs } => write!(f, "SUB   {}, {}", rd, rs),
            Instr::Mul { rd, rs } => write!(f, "MUL   {}, {}", rd, rs),
            Instr::Div { rd, rs } => write!(f, "DIV   {}, {}", rd, rs),
            Instr::Addi { rd, rs, imm } => write!(f, "ADDI  {}, {}, {}", rd, rs, imm),
            Instr::Andi { rd, rs, imm } => write!(f, "ANDI  {}, {}, {}", rd, rs, imm),
            Instr::Srl { rd, rs, shamt } => write!(f, "SRL   {}, {}, {}", rd, rs, shamt),
            Instr::Lw { rd, base, offset } => write!(f, "LW    {}, {}({})", rd, offset, base),
            Instr::Sw { base, src, offset } => write!(f, "SW    {}, {}({})", src, offset, base),
            Instr::Beq { r1, r2, disp } => write!(f, "BEQ   {}, {}, {}", r1, r2, disp),
            Instr::Bne { r1, r2, disp } => write!(f, "BNE   {}, {}, {}", r1, r2, disp),
            Instr::Bltz { r, disp } => write!(f, "BLTZ  {}, {}", r, disp),
            Instr::Blez { r, disp } => write!(f, "BLEZ  {}, {}", r, disp),
            Instr::Bgtz { r, disp } => write!(f, "BGTZ  {}, {}", r, disp),
            Instr::Bgez { r, disp } => write!(f, "BGEZ  {}, {}", r, disp),
            Instr::Read { rd } => write!(f, "READ  {}", rd),
            Instr::Print { rs } => write!(f, "PRINT {}", rs),
        }
    }
}

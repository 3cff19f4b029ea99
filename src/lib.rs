//! Kiln - code-generation backend for a small block-structured language.
//!
//! Kiln takes the semantically-annotated syntax tree of a program (every
//! identifier use already resolved to a lexical level and a frame offset)
//! and produces a binary object file for a stack-oriented virtual machine:
//! a header, one encoded instruction word per generated instruction, and a
//! data segment holding the program's deduplicated numeric literals.
//!
//! Scanning, parsing and name resolution live upstream; the machine that
//! runs the output lives downstream. Procedures are not yet implemented.

pub mod ast;
pub mod bof;
pub mod codegen;

pub use bof::{BofError, BofHeader, ObjectFile};
pub use codegen::{CodeGen, CodeSeq, CodegenError, Instr, Reg, Word};

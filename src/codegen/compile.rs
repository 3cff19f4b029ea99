use crate::ast::{ArithOp, Block, Condition, ConstDef, Expr, Ident, Number, RelOp, Stmt};
use crate::bof::{BofHeader, ObjectFile};
use crate::codegen::error::CodegenError;
use crate::codegen::frame::{frame_address, pop_into_reg, push_reg};
use crate::codegen::instr::{BYTES_PER_WORD, Instr, Reg};
use crate::codegen::literals::LiteralPool;
use crate::codegen::seq::CodeSeq;

// =============================================================================
// COMPILE - expression, condition, statement and program code generation
// =============================================================================

/// The code generator. Owns the literal pool for exactly one program;
/// `gen_program` consumes the generator, so a pool can never be shared
/// between two compilations.
#[derive(Debug, Default)]
pub struct CodeGen {
    literals: LiteralPool,
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen {
            literals: LiteralPool::new(),
        }
    }

    /// Generate the whole program: block code plus a trailing `exit`, then
    /// the header computed from the finalized text and pool sizes.
    pub fn gen_program(mut self, program: &Block) -> Result<ObjectFile, CodegenError> {
        let text = self.gen_block(program)?.push(Instr::Exit);
        let header = BofHeader::for_program(text.len(), self.literals.len());
        Ok(ObjectFile {
            header,
            text: text.into_vec(),
            data: self.literals.iter().collect(),
        })
    }

    /// Constant definitions, then variable declarations, then the block's
    /// statement, in that fixed order.
    fn gen_block(&mut self, block: &Block) -> Result<CodeSeq, CodegenError> {
        if let Some(proc) = block.procs.first() {
            return Err(CodegenError::procedure_decl(proc.name.as_str()));
        }
        let mut seq = CodeSeq::empty();
        for def in &block.consts {
            seq = seq.concat(self.gen_const_def(def)?);
        }
        for decl in &block.vars {
            for _name in &decl.names {
                // allocate one word, initialized to zero
                seq = seq.concat(push_reg(Reg::Zero));
            }
        }
        Ok(seq.concat(self.gen_stmt(&block.stmt)?))
    }

    /// Three instructions per constant: load its pool word, push it into
    /// the slot being allocated.
    fn gen_const_def(&mut self, def: &ConstDef) -> Result<CodeSeq, CodegenError> {
        let offset = self.data_offset(&def.number)?;
        let load = CodeSeq::singleton(Instr::Lw {
            rd: Reg::At,
            base: Reg::Gp,
            offset,
        });
        Ok(load.concat(push_reg(Reg::At)))
    }

    // ───────────────────────────── Statements ───────────────────────────

    /// Generate code for one statement. Uses `$at`, `$v0` and `$t9` as
    /// scratch; every statement emits at least one instruction.
    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<CodeSeq, CodegenError> {
        match stmt {
            Stmt::Assign { target, value } => self.gen_assign(target, value),
            Stmt::Call { name } => Err(CodegenError::procedure_call(name.as_str())),
            Stmt::Begin(stmts) => {
                let mut seq = CodeSeq::empty();
                for stmt in stmts {
                    seq = seq.concat(self.gen_stmt(stmt)?);
                }
                Ok(seq)
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.gen_if(cond, then_branch, else_branch),
            Stmt::While { cond, body } => self.gen_while(cond, body),
            Stmt::Read(target) => {
                let (frame, fr) = frame_address(Reg::T9, target.resolved.levels_outward);
                let offset = frame_offset(target)?;
                Ok(CodeSeq::singleton(Instr::Read { rd: Reg::V0 })
                    .concat(frame)
                    .push(Instr::Sw {
                        base: fr,
                        src: Reg::V0,
                        offset,
                    }))
            }
            Stmt::Write(expr) => {
                let value = self.gen_expr(expr)?;
                Ok(value
                    .concat(pop_into_reg(Reg::A0))
                    .push(Instr::Print { rs: Reg::A0 }))
            }
            Stmt::Skip => Ok(CodeSeq::singleton(Instr::Srl {
                rd: Reg::At,
                rs: Reg::At,
                shamt: 0,
            })),
        }
    }

    fn gen_assign(&mut self, target: &Ident, value: &Expr) -> Result<CodeSeq, CodegenError> {
        let value = self.gen_expr(value)?;
        let (frame, fr) = frame_address(Reg::T9, target.resolved.levels_outward);
        let offset = frame_offset(target)?;
        Ok(value
            .concat(pop_into_reg(Reg::At))
            .concat(frame)
            .push(Instr::Sw {
                base: fr,
                src: Reg::At,
                offset,
            }))
    }

    /// Layout:
    ///
    /// ```text
    ///   <condition + pop $v0>
    ///   BEQ $zero, $v0, then_len + 1   ; false: skip then and its exit jump
    ///   <then code>
    ///   BEQ $zero, $zero, else_len     ; true: skip the else code
    ///   <else code>
    /// ```
    ///
    /// Both branch bodies are generated exactly once; their measured
    /// lengths feed the displacements directly.
    fn gen_if(
        &mut self,
        cond: &Condition,
        then_branch: &Stmt,
        else_branch: &Stmt,
    ) -> Result<CodeSeq, CodegenError> {
        let test = self.gen_test(cond)?;
        let then_code = self.gen_stmt(then_branch)?;
        let else_code = self.gen_stmt(else_branch)?;

        let skip_then = branch_disp(then_code.len() as i64 + 1)?;
        let skip_else = branch_disp(else_code.len() as i64)?;

        Ok(test
            .push(Instr::Beq {
                r1: Reg::Zero,
                r2: Reg::V0,
                disp: skip_then,
            })
            .concat(then_code)
            .push(Instr::Beq {
                r1: Reg::Zero,
                r2: Reg::Zero,
                disp: skip_else,
            })
            .concat(else_code))
    }

    /// Layout:
    ///
    /// ```text
    ///   <condition + pop $v0>            ; T words
    ///   BEQ $zero, $v0, body_len + 1     ; false: leave the loop
    ///   <body code>                      ; B words
    ///   BEQ $zero, $zero, -(T + B + 2)   ; back to the condition start
    /// ```
    ///
    /// The back edge counts the test, the body and both branch words.
    fn gen_while(&mut self, cond: &Condition, body: &Stmt) -> Result<CodeSeq, CodegenError> {
        let test = self.gen_test(cond)?;
        let body_code = self.gen_stmt(body)?;

        let test_len = test.len() as i64;
        let body_len = body_code.len() as i64;
        let skip_out = branch_disp(body_len + 1)?;
        let back_edge = branch_disp(-(test_len + body_len + 2))?;

        Ok(test
            .push(Instr::Beq {
                r1: Reg::Zero,
                r2: Reg::V0,
                disp: skip_out,
            })
            .concat(body_code)
            .push(Instr::Beq {
                r1: Reg::Zero,
                r2: Reg::Zero,
                disp: back_edge,
            }))
    }

    /// Condition value popped into `$v0`, ready for a branch-if-zero.
    fn gen_test(&mut self, cond: &Condition) -> Result<CodeSeq, CodegenError> {
        Ok(self.gen_condition(cond)?.concat(pop_into_reg(Reg::V0)))
    }

    // ───────────────────────────── Conditions ───────────────────────────

    /// Generate code leaving a boolean word (1 true, 0 false) on top of
    /// the runtime stack. Uses `$at` and `$v0` as scratch.
    fn gen_condition(&mut self, cond: &Condition) -> Result<CodeSeq, CodegenError> {
        match cond {
            Condition::Odd(expr) => {
                let operand = self.gen_expr(expr)?;
                Ok(operand
                    .concat(pop_into_reg(Reg::At))
                    .push(Instr::Andi {
                        rd: Reg::At,
                        rs: Reg::At,
                        imm: 1,
                    })
                    .concat(push_reg(Reg::At)))
            }
            Condition::Rel { op, lhs, rhs } => self.gen_rel(*op, lhs, rhs),
        }
    }

    /// Both operands are evaluated fully, left then right, before any
    /// comparison runs. The operator's test branches over the tail's
    /// "set 1" when the relation holds:
    ///
    /// ```text
    ///   <lhs> <rhs>
    ///   pop $at, pop $v0
    ///   <test: branches +2 when true>
    ///   ADDI $at, $zero, 0
    ///   BEQ  $zero, $zero, 1
    ///   ADDI $at, $zero, 1
    ///   push $at
    /// ```
    fn gen_rel(&mut self, op: RelOp, lhs: &Expr, rhs: &Expr) -> Result<CodeSeq, CodegenError> {
        let left = self.gen_expr(lhs)?;
        let right = self.gen_expr(rhs)?;
        Ok(left
            .concat(right)
            .concat(pop_into_reg(Reg::At))
            .concat(pop_into_reg(Reg::V0))
            .concat(rel_test(op))
            .push(Instr::Addi {
                rd: Reg::At,
                rs: Reg::Zero,
                imm: 0,
            })
            .push(Instr::Beq {
                r1: Reg::Zero,
                r2: Reg::Zero,
                disp: 1,
            })
            .push(Instr::Addi {
                rd: Reg::At,
                rs: Reg::Zero,
                imm: 1,
            })
            .concat(push_reg(Reg::At)))
    }

    // ──────────────────────────── Expressions ───────────────────────────

    /// Generate code leaving the expression's value on top of the runtime
    /// stack: net effect exactly one word, whatever the shape.
    fn gen_expr(&mut self, expr: &Expr) -> Result<CodeSeq, CodegenError> {
        match expr {
            Expr::Ident(id) => gen_ident(id),
            Expr::Number(num) => self.gen_number(num),
            Expr::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs),
        }
    }

    /// Left operand, right operand, pop right into `$t2` and left into
    /// `$t1`, apply the operator, push `$t1`. Consumes two stack words,
    /// produces one.
    fn gen_binary(&mut self, op: ArithOp, lhs: &Expr, rhs: &Expr) -> Result<CodeSeq, CodegenError> {
        let left = self.gen_expr(lhs)?;
        let right = self.gen_expr(rhs)?;
        Ok(left
            .concat(right)
            .concat(pop_into_reg(Reg::T2))
            .concat(pop_into_reg(Reg::T1))
            .push(arith_instr(op))
            .concat(push_reg(Reg::T1)))
    }

    /// Load the literal's pool word off `$gp` and push it, allocating a
    /// pool slot on first use of this exact (text, value) pair.
    fn gen_number(&mut self, num: &Number) -> Result<CodeSeq, CodegenError> {
        let offset = self.data_offset(num)?;
        Ok(CodeSeq::singleton(Instr::Lw {
            rd: Reg::V0,
            base: Reg::Gp,
            offset,
        })
        .concat(push_reg(Reg::V0)))
    }

    fn data_offset(&mut self, num: &Number) -> Result<u16, CodegenError> {
        let offset = self.literals.lookup(&num.text, num.value);
        u16::try_from(offset).map_err(|_| CodegenError::DataOffsetTooLarge {
            text: num.text.clone(),
            offset,
        })
    }
}

/// Frame address per `levels_outward`, load the identifier's word, push it.
fn gen_ident(id: &Ident) -> Result<CodeSeq, CodegenError> {
    let (frame, fr) = frame_address(Reg::T9, id.resolved.levels_outward);
    let offset = frame_offset(id)?;
    Ok(frame
        .push(Instr::Lw {
            rd: Reg::V0,
            base: fr,
            offset,
        })
        .concat(push_reg(Reg::V0)))
}

/// An identifier's byte offset within its activation record, checked
/// against the instruction's 16-bit offset field.
fn frame_offset(id: &Ident) -> Result<u16, CodegenError> {
    let bytes = id.resolved.offset_count as u64 * BYTES_PER_WORD as u64;
    u16::try_from(bytes).map_err(|_| CodegenError::FrameOffsetTooLarge {
        name: id.name.clone(),
        offset_count: id.resolved.offset_count,
    })
}

/// A branch displacement in instruction words, checked against the signed
/// 16-bit field.
fn branch_disp(words: i64) -> Result<i16, CodegenError> {
    i16::try_from(words).map_err(|_| CodegenError::BranchTooFar { distance: words })
}

/// The comparison prefix for one relational operator: branches +2 (over
/// the "set 0" word and its exit jump) exactly when the relation holds.
/// `=` and `<>` compare the registers directly; the signed tests subtract
/// first and test the sign of `$v0 - $at`.
fn rel_test(op: RelOp) -> CodeSeq {
    let sub = Instr::Sub {
        rd: Reg::V0,
        rs: Reg::At,
    };
    match op {
        RelOp::Eq => CodeSeq::singleton(Instr::Beq {
            r1: Reg::V0,
            r2: Reg::At,
            disp: 2,
        }),
        RelOp::Ne => CodeSeq::singleton(Instr::Bne {
            r1: Reg::V0,
            r2: Reg::At,
            disp: 2,
        }),
        RelOp::Lt => CodeSeq::singleton(sub).push(Instr::Bltz { r: Reg::V0, disp: 2 }),
        RelOp::Le => CodeSeq::singleton(sub).push(Instr::Blez { r: Reg::V0, disp: 2 }),
        RelOp::Gt => CodeSeq::singleton(sub).push(Instr::Bgtz { r: Reg::V0, disp: 2 }),
        RelOp::Ge => CodeSeq::singleton(sub).push(Instr::Bgez { r: Reg::V0, disp: 2 }),
    }
}

/// The single instruction applying a binary operator to `$t1`, `$t2`.
fn arith_instr(op: ArithOp) -> Instr {
    match op {
        ArithOp::Add => Instr::Add { rd: Reg::T1, rs: Reg::T2 },
        ArithOp::Sub => Instr::Sub { rd: Reg::T1, rs: Reg::T2 },
        ArithOp::Mul => Instr::Mul { rd: Reg::T1, rs: Reg::T2 },
        ArithOp::Div => Instr::Div { rd: Reg::T1, rs: Reg::T2 },
    }
}

//! End-to-end tests: generated object files are executed on a reference
//! implementation of the target machine model (word = 32-bit LE, memory
//! byte-addressed, branches next-relative in instruction words, runtime
//! stack growing upward from the stack-bottom address).

use std::collections::VecDeque;

use kiln::ast::{ArithOp, Block, Condition, ConstDef, Expr, Ident, Number, RelOp, Stmt, VarDecl};
use kiln::codegen::frame::frame_address;
use kiln::{CodeGen, Instr, ObjectFile, Reg, Word};

// =============================================================================
// Reference executor
// =============================================================================

const STEP_LIMIT: usize = 100_000;

struct Machine {
    text: Vec<Instr>,
    mem: Vec<Word>,
    regs: [Word; 10],
    pc: usize,
    input: VecDeque<Word>,
    output: Vec<Word>,
}

impl Machine {
    fn load(obj: &ObjectFile) -> Machine {
        let words = obj.header.stack_bottom as usize / 4 + 4096;
        let mut mem = vec![0; words];
        let data_base = obj.header.data_start as usize / 4;
        mem[data_base..data_base + obj.data.len()].copy_from_slice(&obj.data);

        let mut regs = [0; 10];
        regs[Reg::Gp as usize] = obj.header.data_start as Word;
        regs[Reg::Sp as usize] = obj.header.stack_bottom as Word;
        regs[Reg::Fp as usize] = obj.header.stack_bottom as Word;

        Machine {
            text: obj.text.clone(),
            mem,
            regs,
            pc: 0,
            input: VecDeque::new(),
            output: Vec::new(),
        }
    }

    fn reg(&self, r: Reg) -> Word {
        self.regs[r as usize]
    }

    fn set_reg(&mut self, r: Reg, value: Word) {
        if r != Reg::Zero {
            self.regs[r as usize] = value;
        }
    }

    fn word_index(&self, base: Reg, offset: u16) -> usize {
        let addr = self.reg(base) + offset as Word;
        assert!(addr >= 0, "negative address {}", addr);
        assert_eq!(addr % 4, 0, "unaligned address {}", addr);
        addr as usize / 4
    }

    fn branch(&mut self, taken: bool, disp: i16) {
        if taken {
            let target = self.pc as i64 + 1 + disp as i64;
            assert!(target >= 0, "branch before text start");
            self.pc = target as usize;
        } else {
            self.pc += 1;
        }
    }

    fn run(&mut self) {
        for _ in 0..STEP_LIMIT {
            assert!(self.pc < self.text.len(), "pc {} ran off the text segment", self.pc);
            let instr = self.text[self.pc];
            match instr {
                Instr::Exit => return,
                Instr::Add { rd, rs } => {
                    self.set_reg(rd, self.reg(rd).wrapping_add(self.reg(rs)));
                    self.pc += 1;
                }
                Instr::Sub { rd, rs } => {
                    self.set_reg(rd, self.reg(rd).wrapping_sub(self.reg(rs)));
                    self.pc += 1;
                }
                Instr::Mul { rd, rs } => {
                    self.set_reg(rd, self.reg(rd).wrapping_mul(self.reg(rs)));
                    self.pc += 1;
                }
                Instr::Div { rd, rs } => {
                    let divisor = self.reg(rs);
                    assert_ne!(divisor, 0, "division by zero");
                    self.set_reg(rd, self.reg(rd).wrapping_div(divisor));
                    self.pc += 1;
                }
                Instr::Addi { rd, rs, imm } => {
                    self.set_reg(rd, self.reg(rs).wrapping_add(imm as Word));
                    self.pc += 1;
                }
                Instr::Andi { rd, rs, imm } => {
                    self.set_reg(rd, self.reg(rs) & imm as Word);
                    self.pc += 1;
                }
                Instr::Srl { rd, rs, shamt } => {
                    self.set_reg(rd, ((self.reg(rs) as u32) >> shamt) as Word);
                    self.pc += 1;
                }
                Instr::Lw { rd, base, offset } => {
                    let value = self.mem[self.word_index(base, offset)];
                    self.set_reg(rd, value);
                    self.pc += 1;
                }
                Instr::Sw { base, src, offset } => {
                    let index = self.word_index(base, offset);
                    let value = self.reg(src);
                    self.mem[index] = value;
                    self.pc += 1;
                }
                Instr::Beq { r1, r2, disp } => {
                    self.branch(self.reg(r1) == self.reg(r2), disp);
                }
                Instr::Bne { r1, r2, disp } => {
                    self.branch(self.reg(r1) != self.reg(r2), disp);
                }
                Instr::Bltz { r, disp } => self.branch(self.reg(r) < 0, disp),
                Instr::Blez { r, disp } => self.branch(self.reg(r) <= 0, disp),
                Instr::Bgtz { r, disp } => self.branch(self.reg(r) > 0, disp),
                Instr::Bgez { r, disp } => self.branch(self.reg(r) >= 0, disp),
                Instr::Read { rd } => {
                    let value = self.input.pop_front().expect("input channel ran dry");
                    self.set_reg(rd, value);
                    self.pc += 1;
                }
                Instr::Print { rs } => {
                    self.output.push(self.reg(rs));
                    self.pc += 1;
                }
            }
        }
        panic!("step limit exceeded; branch offsets are probably wrong");
    }
}

// =============================================================================
// Program builders
// =============================================================================

fn num(value: Word) -> Expr {
    Expr::Number(Number::new(value.to_string(), value))
}

fn var(name: &str, offset_count: u32) -> Ident {
    Ident::new(name, 0, offset_count)
}

fn binary(op: ArithOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn rel(op: RelOp, lhs: Expr, rhs: Expr) -> Condition {
    Condition::Rel { op, lhs, rhs }
}

fn assign(target: Ident, value: Expr) -> Stmt {
    Stmt::Assign { target, value }
}

fn if_stmt(cond: Condition, then_branch: Stmt, else_branch: Stmt) -> Stmt {
    Stmt::If {
        cond,
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
    }
}

fn while_stmt(cond: Condition, body: Stmt) -> Stmt {
    Stmt::While {
        cond,
        body: Box::new(body),
    }
}

fn program(consts: Vec<ConstDef>, vars: Vec<&str>, stmt: Stmt) -> Block {
    Block {
        consts,
        vars: if vars.is_empty() {
            Vec::new()
        } else {
            vec![VarDecl::new(vars)]
        },
        procs: Vec::new(),
        stmt,
    }
}

fn compile(block: &Block) -> ObjectFile {
    CodeGen::new().gen_program(block).unwrap()
}

fn run_with_input(block: &Block, input: &[Word]) -> Vec<Word> {
    let obj = compile(block);
    let mut machine = Machine::load(&obj);
    machine.input = input.iter().copied().collect();
    machine.run();
    machine.output
}

fn run_program(block: &Block) -> Vec<Word> {
    run_with_input(block, &[])
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_const_five_is_written() {
    let block = program(
        vec![ConstDef::new("c", Number::new("5", 5))],
        vec![],
        Stmt::Write(Expr::Ident(var("c", 0))),
    );
    let obj = compile(&block);
    assert_eq!(obj.data, vec![5]);

    let mut machine = Machine::load(&obj);
    machine.run();
    assert_eq!(machine.output, vec![5]);
}

#[test]
fn test_if_true_runs_only_the_then_branch() {
    let block = program(
        vec![],
        vec![],
        if_stmt(
            rel(RelOp::Lt, num(3), num(5)),
            Stmt::Write(num(111)),
            Stmt::Write(num(222)),
        ),
    );
    assert_eq!(run_program(&block), vec![111]);
}

#[test]
fn test_if_false_runs_only_the_else_branch() {
    let block = program(
        vec![],
        vec![],
        if_stmt(
            rel(RelOp::Lt, num(5), num(3)),
            Stmt::Write(num(111)),
            Stmt::Write(num(222)),
        ),
    );
    assert_eq!(run_program(&block), vec![222]);
}

#[test]
fn test_while_runs_the_body_exactly_nine_times() {
    // x := 1; while x < 10 do begin x := x + 1; write x end
    let x = || var("x", 0);
    let block = program(
        vec![],
        vec!["x"],
        Stmt::Begin(vec![
            assign(x(), num(1)),
            while_stmt(
                rel(RelOp::Lt, Expr::Ident(x()), num(10)),
                Stmt::Begin(vec![
                    assign(x(), binary(ArithOp::Add, Expr::Ident(x()), num(1))),
                    Stmt::Write(Expr::Ident(x())),
                ]),
            ),
        ]),
    );
    let output = run_program(&block);
    assert_eq!(output.len(), 9);
    assert_eq!(output, (2..=10).collect::<Vec<Word>>());
}

#[test]
fn test_while_body_can_run_zero_times() {
    let block = program(
        vec![],
        vec![],
        while_stmt(rel(RelOp::Gt, num(1), num(2)), Stmt::Write(num(99))),
    );
    assert_eq!(run_program(&block), Vec::<Word>::new());
}

#[test]
fn test_odd_condition_at_runtime() {
    for (value, expected) in [(7, 1), (8, 0), (-3, 1), (0, 0)] {
        let block = program(
            vec![],
            vec![],
            if_stmt(
                Condition::Odd(num(value)),
                Stmt::Write(num(1)),
                Stmt::Write(num(0)),
            ),
        );
        assert_eq!(run_program(&block), vec![expected], "odd {}", value);
    }
}

#[test]
fn test_relational_operators_at_runtime() {
    let cases = [
        (RelOp::Eq, 3, 3, 1),
        (RelOp::Eq, 3, 4, 0),
        (RelOp::Ne, 3, 4, 1),
        (RelOp::Ne, 3, 3, 0),
        (RelOp::Lt, 2, 3, 1),
        (RelOp::Lt, 3, 3, 0),
        (RelOp::Lt, 4, 3, 0),
        (RelOp::Le, 3, 3, 1),
        (RelOp::Le, 4, 3, 0),
        (RelOp::Gt, 4, 3, 1),
        (RelOp::Gt, 3, 3, 0),
        (RelOp::Ge, 3, 3, 1),
        (RelOp::Ge, 2, 3, 0),
        (RelOp::Lt, -5, 2, 1),
        (RelOp::Ge, -1, -1, 1),
    ];
    for (op, lhs, rhs, expected) in cases {
        let block = program(
            vec![],
            vec![],
            if_stmt(
                rel(op, num(lhs), num(rhs)),
                Stmt::Write(num(1)),
                Stmt::Write(num(0)),
            ),
        );
        assert_eq!(
            run_program(&block),
            vec![expected],
            "{} {:?} {}",
            lhs,
            op,
            rhs
        );
    }
}

#[test]
fn test_arithmetic_is_left_to_right() {
    let cases = [
        (binary(ArithOp::Sub, binary(ArithOp::Sub, num(10), num(3)), num(2)), 5),
        (binary(ArithOp::Div, num(7), num(2)), 3),
        (binary(ArithOp::Add, num(2), binary(ArithOp::Mul, num(3), num(4))), 14),
        (binary(ArithOp::Mul, binary(ArithOp::Div, num(20), num(5)), num(3)), 12),
        (binary(ArithOp::Sub, num(3), num(10)), -7),
    ];
    for (expr, expected) in cases {
        let block = program(vec![], vec![], Stmt::Write(expr));
        assert_eq!(run_program(&block), vec![expected]);
    }
}

#[test]
fn test_read_feeds_the_target_variable() {
    let x = || var("x", 0);
    let block = program(
        vec![],
        vec!["x"],
        Stmt::Begin(vec![
            Stmt::Read(x()),
            Stmt::Write(binary(ArithOp::Add, Expr::Ident(x()), num(1))),
        ]),
    );
    assert_eq!(run_with_input(&block, &[41]), vec![42]);
}

#[test]
fn test_variables_start_at_zero() {
    let block = program(vec![], vec!["x"], Stmt::Write(Expr::Ident(var("x", 0))));
    assert_eq!(run_program(&block), vec![0]);
}

#[test]
fn test_equal_literals_share_one_data_entry() {
    let block = program(
        vec![],
        vec![],
        Stmt::Begin(vec![Stmt::Write(num(7)), Stmt::Write(num(7))]),
    );
    let obj = compile(&block);
    assert_eq!(obj.data, vec![7]);

    let loads: Vec<&Instr> = obj
        .text
        .iter()
        .filter(|i| matches!(i, Instr::Lw { base: Reg::Gp, .. }))
        .collect();
    assert_eq!(loads.len(), 2);
    for load in loads {
        assert!(matches!(load, Instr::Lw { offset: 0, .. }));
    }

    let mut machine = Machine::load(&obj);
    machine.run();
    assert_eq!(machine.output, vec![7, 7]);
}

#[test]
fn test_compound_loop_with_nested_if() {
    // x := 0; while x < 5 do begin if odd x then write x else skip; x := x + 1 end
    let x = || var("x", 0);
    let block = program(
        vec![],
        vec!["x"],
        Stmt::Begin(vec![
            assign(x(), num(0)),
            while_stmt(
                rel(RelOp::Lt, Expr::Ident(x()), num(5)),
                Stmt::Begin(vec![
                    if_stmt(
                        Condition::Odd(Expr::Ident(x())),
                        Stmt::Write(Expr::Ident(x())),
                        Stmt::Skip,
                    ),
                    assign(x(), binary(ArithOp::Add, Expr::Ident(x()), num(1))),
                ]),
            ),
        ]),
    );
    assert_eq!(run_program(&block), vec![1, 3]);
}

#[test]
fn test_frame_walk_follows_static_links() {
    // Hand-built text: walk two static links out, load the word at offset 4
    // of that frame, print it. Frames are staged in memory directly.
    let (walk, fr) = frame_address(Reg::T9, 2);
    let text = walk
        .push(Instr::Lw { rd: Reg::V0, base: fr, offset: 4 })
        .push(Instr::Print { rs: Reg::V0 })
        .push(Instr::Exit)
        .into_vec();
    let obj = ObjectFile {
        header: kiln::BofHeader::for_program(text.len(), 0),
        text,
        data: vec![],
    };

    let mut machine = Machine::load(&obj);
    machine.regs[Reg::Fp as usize] = 2000;
    machine.mem[2000 / 4] = 1600; // static link: current -> parent
    machine.mem[1600 / 4] = 1200; // static link: parent -> grandparent
    machine.mem[(1200 + 4) / 4] = 77; // grandparent's slot at offset 4
    machine.run();
    assert_eq!(machine.output, vec![77]);
}

#[test]
fn test_object_survives_serialization_round_trip() {
    let block = program(
        vec![ConstDef::new("c", Number::new("3", 3))],
        vec!["x"],
        Stmt::Begin(vec![
            assign(var("x", 1), binary(ArithOp::Mul, Expr::Ident(var("c", 0)), num(14))),
            Stmt::Write(Expr::Ident(var("x", 1))),
        ]),
    );
    let obj = compile(&block);
    let reread = ObjectFile::from_bytes(&obj.to_bytes()).unwrap();
    assert_eq!(reread, obj);

    let mut machine = Machine::load(&reread);
    machine.run();
    assert_eq!(machine.output, vec![42]);
}

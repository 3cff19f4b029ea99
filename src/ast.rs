use serde::{Deserialize, Serialize};

use crate::codegen::instr::Word;

// =============================================================================
// AST - the resolved syntax tree handed to the code generator
// =============================================================================
//
// The tree arrives from the semantic pass with every identifier use already
// resolved: the generator trusts `levels_outward` and `offset_count` and never
// revalidates them. All types derive serde so an upstream pass can hand trees
// across a process boundary.

/// Resolved attributes of one identifier use.
///
/// `levels_outward` counts lexical scope hops from the point of use to the
/// declaring scope (0 = declared in the current scope). `offset_count` is the
/// word offset of the name's slot within its owning activation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdUse {
    pub levels_outward: u32,
    pub offset_count: u32,
}

/// An identifier use site, with its resolved attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    pub resolved: IdUse,
}

impl Ident {
    pub fn new(name: impl Into<String>, levels_outward: u32, offset_count: u32) -> Self {
        Ident {
            name: name.into(),
            resolved: IdUse {
                levels_outward,
                offset_count,
            },
        }
    }
}

/// A numeric literal: the source text it was written as, plus its value.
///
/// The pair (text, value) is the literal pool's deduplication key, so `07`
/// and `7` are distinct pool entries even though they load the same word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Number {
    pub text: String,
    pub value: Word,
}

impl Number {
    pub fn new(text: impl Into<String>, value: Word) -> Self {
        Number {
            text: text.into(),
            value,
        }
    }
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Relational operators. A closed set: condition codegen enumerates exactly
/// these six.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Expressions. Every shape leaves exactly one word on the runtime stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Ident(Ident),
    Number(Number),
    Binary {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Conditions. Every shape leaves a boolean word (1/0) on the runtime stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// Parity test: true when the operand is odd.
    Odd(Expr),
    Rel {
        op: RelOp,
        lhs: Expr,
        rhs: Expr,
    },
}

/// Statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Assign {
        target: Ident,
        value: Expr,
    },
    /// Procedure call. Recognized by the tree, rejected by the generator
    /// until procedures are implemented.
    Call {
        name: String,
    },
    /// `begin ... end` sequencing, in program order.
    Begin(Vec<Stmt>),
    If {
        cond: Condition,
        then_branch: Box<Stmt>,
        else_branch: Box<Stmt>,
    },
    While {
        cond: Condition,
        body: Box<Stmt>,
    },
    /// Read one integer from the input channel into the target.
    Read(Ident),
    /// Print the value of the expression to the output channel.
    Write(Expr),
    /// No-op; still emits one instruction so every statement has nonzero
    /// length (keeps branch-offset arithmetic uniform).
    Skip,
}

/// One constant definition: `const name = number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstDef {
    pub name: String,
    pub number: Number,
}

impl ConstDef {
    pub fn new(name: impl Into<String>, number: Number) -> Self {
        ConstDef {
            name: name.into(),
            number,
        }
    }
}

/// One variable declaration line: `var a, b, c`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDecl {
    pub names: Vec<String>,
}

impl VarDecl {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        VarDecl {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

/// A procedure declaration. Carried in the tree for completeness; the
/// generator rejects blocks that contain any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcDecl {
    pub name: String,
    pub block: Block,
}

/// A block: declarations plus the statement they scope.
///
/// Nesting depth of blocks is exactly what `levels_outward` measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub consts: Vec<ConstDef>,
    pub vars: Vec<VarDecl>,
    pub procs: Vec<ProcDecl>,
    pub stmt: Stmt,
}

impl Block {
    /// A block with no declarations, wrapping a single statement.
    pub fn of_stmt(stmt: Stmt) -> Self {
        Block {
            consts: Vec::new(),
            vars: Vec::new(),
            procs: Vec::new(),
            stmt,
        }
    }
}

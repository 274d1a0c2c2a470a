//! Abstract Syntax Tree definitions for BX
//!
//! One closed sum type per syntactic category. Every node kind is tagged with
//! a `kind` discriminant when encoded, which is what the decoder keys on.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frontend::scope::ScopeArena;
use crate::types::{ProcSignature, Type};
use crate::utils::{Error, Result, Span};

/// Handle to a lexical block. Blocks are numbered in declaration order,
/// depth-first; the global block is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

impl BlockId {
    pub const GLOBAL: BlockId = BlockId(0);
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier with its source position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ident {
    pub name: String,
    #[serde(default)]
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self { name: name.into(), span }
    }
}

// ==================== Expressions ====================

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    /// Negation (-)
    #[serde(rename = "opposite")]
    Neg,
    /// Bitwise not (~)
    #[serde(rename = "bitwise-negation")]
    BitNot,
    /// Logical not (!)
    #[serde(rename = "logical-negation")]
    Not,
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinOp {
    #[serde(rename = "addition")]
    Add,
    #[serde(rename = "subtraction")]
    Sub,
    #[serde(rename = "multiplication")]
    Mul,
    #[serde(rename = "division")]
    Div,
    #[serde(rename = "modulus")]
    Mod,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseShiftLeft,
    BitwiseShiftRight,
    IsEqual,
    IsNotEqual,
    IsLessThan,
    IsLessThanOrEqual,
    IsGreaterThan,
    IsGreaterThanOrEqual,
    LogicalAnd,
    LogicalOr,
}

impl BinOp {
    /// Int × Int → Int
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinOp::Add
                | BinOp::Sub
                | BinOp::Mul
                | BinOp::Div
                | BinOp::Mod
                | BinOp::BitwiseAnd
                | BinOp::BitwiseOr
                | BinOp::BitwiseXor
                | BinOp::BitwiseShiftLeft
                | BinOp::BitwiseShiftRight
        )
    }

    /// Int × Int → Bool
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            BinOp::IsLessThan | BinOp::IsLessThanOrEqual | BinOp::IsGreaterThan | BinOp::IsGreaterThanOrEqual
        )
    }

    /// T × T → Bool
    pub fn is_equality(&self) -> bool {
        matches!(self, BinOp::IsEqual | BinOp::IsNotEqual)
    }

    /// Bool × Bool → Bool
    pub fn is_logical(&self) -> bool {
        matches!(self, BinOp::LogicalAnd | BinOp::LogicalOr)
    }
}

/// An expression node. `ty` stays `Unresolved` until the resolution pass
/// writes it; `block` is the enclosing lexical block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(rename = "node")]
    pub kind: ExprKind,
    /// Encoded for inspection; decoding always starts unresolved
    #[serde(skip_deserializing)]
    pub ty: Type,
    #[serde(skip)]
    pub block: BlockId,
    #[serde(default)]
    pub span: Span,
}

/// Expression variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    Int { value: i32 },
    Bool { value: bool },
    Null,
    /// Variable reference
    Var { name: String },
    Unary { op: UnOp, operand: Box<Expr> },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    /// Procedure call by name
    Call { target: String, args: Vec<Expr> },
    /// `object[index]`
    Index { object: Box<Expr>, index: Box<Expr> },
    /// `object.field`
    Field { object: Box<Expr>, field: String },
    /// `object->field`
    ArrowField { object: Box<Expr>, field: String },
    /// `&object`
    AddressOf { object: Box<Expr> },
    /// `*object`
    Deref { object: Box<Expr> },
}

impl Expr {
    /// A fresh, unresolved expression
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            ty: Type::default(),
            block: BlockId::GLOBAL,
            span,
        }
    }

    /// Shapes that denote a storage location: variable, dereference,
    /// index and field accesses
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Var { .. }
                | ExprKind::Deref { .. }
                | ExprKind::Index { .. }
                | ExprKind::Field { .. }
                | ExprKind::ArrowField { .. }
        )
    }

    /// Visit this expression and every sub-expression, parents first
    pub fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Int { .. } | ExprKind::Bool { .. } | ExprKind::Null | ExprKind::Var { .. } => {}
            ExprKind::Unary { operand, .. } => operand.walk(f),
            ExprKind::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            ExprKind::Call { args, .. } => args.iter().for_each(|a| a.walk(f)),
            ExprKind::Index { object, index } => {
                object.walk(f);
                index.walk(f);
            }
            ExprKind::Field { object, .. }
            | ExprKind::ArrowField { object, .. }
            | ExprKind::AddressOf { object }
            | ExprKind::Deref { object } => object.walk(f),
        }
    }

    fn set_block(&mut self, block: BlockId) {
        self.block = block;
        match &mut self.kind {
            ExprKind::Int { .. } | ExprKind::Bool { .. } | ExprKind::Null | ExprKind::Var { .. } => {}
            ExprKind::Unary { operand, .. } => operand.set_block(block),
            ExprKind::Binary { left, right, .. } => {
                left.set_block(block);
                right.set_block(block);
            }
            ExprKind::Call { args, .. } => args.iter_mut().for_each(|a| a.set_block(block)),
            ExprKind::Index { object, index } => {
                object.set_block(block);
                index.set_block(block);
            }
            ExprKind::Field { object, .. }
            | ExprKind::ArrowField { object, .. }
            | ExprKind::AddressOf { object }
            | ExprKind::Deref { object } => object.set_block(block),
        }
    }
}

// ==================== Statements ====================

/// Assignment target. Only a bare variable is accepted at statement level,
/// even though expressions know more assignable shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LValue {
    Var {
        name: String,
        #[serde(skip_deserializing)]
        ty: Type,
        #[serde(skip)]
        block: BlockId,
        #[serde(default)]
        span: Span,
    },
}

/// `var a = e1, b = e2 : T;` with parallel names and initializers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VarDeclRepr")]
pub struct VarDecl {
    pub names: Vec<Ident>,
    /// One slot per name; `None` leaves the variable zero-initialised
    pub inits: Vec<Option<Expr>>,
    pub ty: Type,
    pub span: Span,
}

#[derive(Deserialize)]
struct VarDeclRepr {
    names: Vec<Ident>,
    inits: Vec<Option<Expr>>,
    ty: Type,
    #[serde(default)]
    span: Span,
}

impl TryFrom<VarDeclRepr> for VarDecl {
    type Error = Error;

    fn try_from(repr: VarDeclRepr) -> Result<Self> {
        VarDecl::new(repr.names, repr.inits, repr.ty, repr.span)
    }
}

impl VarDecl {
    pub fn new(names: Vec<Ident>, inits: Vec<Option<Expr>>, ty: Type, span: Span) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::MalformedDeclaration {
                message: "variable declaration without names".to_string(),
                span,
            });
        }
        if names.len() != inits.len() {
            return Err(Error::MalformedDeclaration {
                message: format!("{} names but {} initializers", names.len(), inits.len()),
                span,
            });
        }
        Ok(Self { names, inits, ty, span })
    }
}

/// `if (cond) { ... } else ...`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_block: Block,
    pub else_branch: Option<ElseBranch>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElseBranch {
    Block(Block),
    /// `else if ...`
    If(Box<IfStmt>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpKind {
    Break,
    Continue,
}

impl fmt::Display for JumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JumpKind::Break => write!(f, "break"),
            JumpKind::Continue => write!(f, "continue"),
        }
    }
}

/// Statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    VarDecl(VarDecl),
    /// `type name = T;`
    TypeAlias {
        name: Ident,
        ty: Type,
        #[serde(default)]
        span: Span,
    },
    /// `x = e;`
    Assign {
        target: LValue,
        value: Expr,
        #[serde(default)]
        span: Span,
    },
    /// A bare call used as a statement
    Eval {
        call: Expr,
        #[serde(default)]
        span: Span,
    },
    If(IfStmt),
    While {
        cond: Expr,
        body: Block,
        #[serde(default)]
        span: Span,
    },
    Jump {
        jump: JumpKind,
        #[serde(default)]
        span: Span,
    },
    Return {
        value: Option<Expr>,
        #[serde(default)]
        span: Span,
    },
    Block(Block),
}

/// Code block; owns its own scope frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    #[serde(skip)]
    pub id: BlockId,
    pub stmts: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>, span: Span) -> Self {
        Self {
            id: BlockId::GLOBAL,
            stmts,
            span,
        }
    }

    /// Visit every expression in this block, nested blocks included, in
    /// source order
    pub fn walk_exprs(&self, f: &mut dyn FnMut(&Expr)) {
        for stmt in &self.stmts {
            stmt.walk_exprs(f);
        }
    }

    /// Every declared type in this block and its nested blocks must be
    /// concrete. Only a decoded program can spell out `unresolved`.
    fn check_declared_types(&self) -> Result<()> {
        for stmt in &self.stmts {
            match stmt {
                Stmt::VarDecl(decl) => {
                    for name in &decl.names {
                        declared_type(&decl.ty, &name.name, name.span)?;
                    }
                }
                Stmt::TypeAlias { name, ty, .. } => declared_type(ty, &name.name, name.span)?,
                Stmt::If(stmt) => stmt.check_declared_types()?,
                Stmt::While { body, .. } => body.check_declared_types()?,
                Stmt::Block(block) => block.check_declared_types()?,
                Stmt::Assign { .. } | Stmt::Eval { .. } | Stmt::Jump { .. } | Stmt::Return { .. } => {}
            }
        }
        Ok(())
    }
}

fn declared_type(ty: &Type, name: &str, span: Span) -> Result<()> {
    if ty.is_resolved() {
        return Ok(());
    }
    Err(Error::MalformedDeclaration {
        message: format!("{} is declared with unresolved type {}", name, ty),
        span,
    })
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::VarDecl(decl) => decl.span,
            Stmt::If(stmt) => stmt.span,
            Stmt::Block(block) => block.span,
            Stmt::TypeAlias { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Eval { span, .. }
            | Stmt::While { span, .. }
            | Stmt::Jump { span, .. }
            | Stmt::Return { span, .. } => *span,
        }
    }

    pub fn walk_exprs(&self, f: &mut dyn FnMut(&Expr)) {
        match self {
            Stmt::VarDecl(decl) => decl.inits.iter().flatten().for_each(|e| e.walk(f)),
            Stmt::TypeAlias { .. } | Stmt::Jump { .. } => {}
            Stmt::Assign { value, .. } => value.walk(f),
            Stmt::Eval { call, .. } => call.walk(f),
            Stmt::If(stmt) => stmt.walk_exprs(f),
            Stmt::While { cond, body, .. } => {
                cond.walk(f);
                body.walk_exprs(f);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    value.walk(f);
                }
            }
            Stmt::Block(block) => block.walk_exprs(f),
        }
    }
}

impl IfStmt {
    fn check_declared_types(&self) -> Result<()> {
        self.then_block.check_declared_types()?;
        match &self.else_branch {
            Some(ElseBranch::Block(block)) => block.check_declared_types(),
            Some(ElseBranch::If(nested)) => nested.check_declared_types(),
            None => Ok(()),
        }
    }

    fn walk_exprs(&self, f: &mut dyn FnMut(&Expr)) {
        self.cond.walk(f);
        self.then_block.walk_exprs(f);
        match &self.else_branch {
            Some(ElseBranch::Block(block)) => block.walk_exprs(f),
            Some(ElseBranch::If(nested)) => nested.walk_exprs(f),
            None => {}
        }
    }
}

// ==================== Procedures & Program ====================

/// Procedure parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: Ident,
    pub ty: Type,
}

/// Procedure definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProcedureRepr")]
pub struct Procedure {
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: Type,
    pub body: Block,
    pub span: Span,
}

#[derive(Deserialize)]
struct ProcedureRepr {
    name: Ident,
    params: Vec<Param>,
    #[serde(default = "void")]
    ret: Type,
    body: Block,
    #[serde(default)]
    span: Span,
}

fn void() -> Type {
    Type::Void
}

impl TryFrom<ProcedureRepr> for Procedure {
    type Error = Error;

    fn try_from(repr: ProcedureRepr) -> Result<Self> {
        Procedure::new(repr.name, repr.params, repr.ret, repr.body, repr.span)
    }
}

impl Procedure {
    /// Fails when two parameters share a name
    pub fn new(name: Ident, params: Vec<Param>, ret: Type, body: Block, span: Span) -> Result<Self> {
        let mut seen = HashSet::new();
        for param in &params {
            if !seen.insert(param.name.name.as_str()) {
                return Err(Error::MalformedDeclaration {
                    message: format!("procedure {} has duplicate parameter {}", name.name, param.name.name),
                    span: param.name.span,
                });
            }
        }
        Ok(Self { name, params, ret, body, span })
    }

    fn check_declared_types(&self) -> Result<()> {
        for param in &self.params {
            declared_type(&param.ty, &param.name.name, param.name.span)?;
        }
        declared_type(&self.ret, &self.name.name, self.name.span)?;
        self.body.check_declared_types()
    }

    pub fn signature(&self) -> ProcSignature {
        ProcSignature::new(self.params.iter().map(|p| p.ty.clone()).collect(), self.ret.clone())
    }
}

/// A complete program (compilation unit)
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "ProgramRepr")]
pub struct Program {
    pub procedures: Vec<Procedure>,
    /// Global variable declarations and type aliases only
    pub globals: Block,
    /// Scope frames of every block, filled during resolution
    #[serde(skip)]
    pub scopes: ScopeArena,
}

#[derive(Deserialize)]
struct ProgramRepr {
    procedures: Vec<Procedure>,
    globals: Block,
}

impl TryFrom<ProgramRepr> for Program {
    type Error = Error;

    fn try_from(repr: ProgramRepr) -> Result<Self> {
        Program::new(repr.procedures, repr.globals)
    }
}

impl Program {
    /// Fails unless exactly one procedure is named `main`. Block handles
    /// are assigned here, so every expression knows its enclosing block.
    pub fn new(procedures: Vec<Procedure>, globals: Block) -> Result<Self> {
        let mains: Vec<&Procedure> = procedures.iter().filter(|p| p.name.name == "main").collect();
        if mains.len() != 1 {
            let span = mains.get(1).map_or(globals.span, |p| p.span);
            return Err(Error::MalformedDeclaration {
                message: format!("there must be exactly one main procedure, found {}", mains.len()),
                span,
            });
        }
        if let Some(stmt) = globals
            .stmts
            .iter()
            .find(|s| !matches!(s, Stmt::VarDecl(_) | Stmt::TypeAlias { .. }))
        {
            return Err(Error::MalformedDeclaration {
                message: "only variable and type declarations are allowed at top level".to_string(),
                span: stmt.span(),
            });
        }

        let mut program = Self {
            procedures,
            globals,
            scopes: ScopeArena::new(),
        };
        program.check_declared_types()?;
        program.link_blocks();
        Ok(program)
    }

    /// Fails on the first variable, parameter, return or alias type that
    /// still contains `unresolved`
    pub fn check_declared_types(&self) -> Result<()> {
        self.globals.check_declared_types()?;
        self.procedures.iter().try_for_each(Procedure::check_declared_types)
    }

    /// Visit every expression in the program: globals, then procedures in
    /// declaration order
    pub fn walk_exprs(&self, f: &mut dyn FnMut(&Expr)) {
        self.globals.walk_exprs(f);
        for procedure in &self.procedures {
            procedure.body.walk_exprs(f);
        }
    }

    /// True when every expression carries a concrete type
    pub fn is_fully_resolved(&self) -> bool {
        let mut resolved = true;
        self.walk_exprs(&mut |e| resolved &= e.ty.is_resolved());
        resolved
    }

    /// Number the blocks (global = 0, then depth-first in declaration order)
    /// and point every expression and l-value at its enclosing block
    fn link_blocks(&mut self) {
        let mut linker = BlockLinker { next: 0 };
        linker.block(&mut self.globals);
        for procedure in &mut self.procedures {
            linker.block(&mut procedure.body);
        }
    }
}

struct BlockLinker {
    next: u32,
}

impl BlockLinker {
    fn block(&mut self, block: &mut Block) {
        block.id = BlockId(self.next);
        self.next += 1;
        let id = block.id;
        for stmt in &mut block.stmts {
            self.stmt(stmt, id);
        }
    }

    fn stmt(&mut self, stmt: &mut Stmt, id: BlockId) {
        match stmt {
            Stmt::VarDecl(decl) => decl.inits.iter_mut().flatten().for_each(|e| e.set_block(id)),
            Stmt::TypeAlias { .. } | Stmt::Jump { .. } => {}
            Stmt::Assign { target, value, .. } => {
                let LValue::Var { block, .. } = target;
                *block = id;
                value.set_block(id);
            }
            Stmt::Eval { call, .. } => call.set_block(id),
            Stmt::If(stmt) => self.if_stmt(stmt, id),
            Stmt::While { cond, body, .. } => {
                cond.set_block(id);
                self.block(body);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    value.set_block(id);
                }
            }
            Stmt::Block(block) => self.block(block),
        }
    }

    fn if_stmt(&mut self, stmt: &mut IfStmt, id: BlockId) {
        stmt.cond.set_block(id);
        self.block(&mut stmt.then_block);
        match &mut stmt.else_branch {
            Some(ElseBranch::Block(block)) => self.block(block),
            Some(ElseBranch::If(nested)) => self.if_stmt(nested, id),
            None => {}
        }
    }
}

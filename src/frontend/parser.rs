//! Parser for BX
//!
//! Recursive descent parser with Pratt parsing for binary expressions.
//! Type aliases are expanded while parsing, so the AST only ever holds
//! concrete types.

use std::collections::HashMap;

use log::trace;

use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::token::{Assoc, Token, TokenKind};
use crate::types::{StructField, Type};
use crate::utils::{Error, Result, Span};

/// The parser
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Type aliases per open block, outermost (top level) first
    aliases: Vec<HashMap<String, Type>>,
}

impl Parser {
    /// Create a new parser from a lexer. Lexing errors surface here.
    pub fn new(mut lexer: Lexer) -> Result<Self> {
        Ok(Self::from_tokens(lexer.tokenize()?))
    }

    /// Create a parser from pre-tokenized input ending with `Eof`
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        let tokens = if tokens.is_empty() {
            vec![Token::eof(Span::dummy())]
        } else {
            tokens
        };
        Self {
            tokens,
            pos: 0,
            aliases: vec![HashMap::new()],
        }
    }

    // ==================== Helper Methods ====================

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.current_kind()) == std::mem::discriminant(kind)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    /// Span of the last consumed token
    fn previous_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn unexpected(&self, expected: impl Into<String>) -> Error {
        let token = self.current();
        if token.kind == TokenKind::Eof {
            Error::UnexpectedEof {
                expected: expected.into(),
                span: token.span,
            }
        } else {
            Error::UnexpectedToken {
                expected: expected.into(),
                got: token.kind.describe(),
                span: token.span,
            }
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected.describe()))
        }
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    // ==================== Parsing Methods ====================

    /// Parse a complete program: procedures, global variables and global
    /// type aliases in any order
    pub fn parse_program(&mut self) -> Result<Program> {
        let start = self.current().span;
        let mut procedures = Vec::new();
        let mut globals = Vec::new();

        while !self.is_at_end() {
            match self.current_kind() {
                TokenKind::Def => procedures.push(self.parse_procedure()?),
                TokenKind::Var => globals.push(self.parse_var_decl()?),
                TokenKind::Type => globals.push(self.parse_type_alias()?),
                _ => return Err(self.unexpected("'def', 'var' or 'type'")),
            }
        }

        let span = start.merge(&self.current().span);
        Program::new(procedures, Block::new(globals, span))
    }

    /// `def name(params)[: T] { ... }`
    fn parse_procedure(&mut self) -> Result<Procedure> {
        let start = self.current().span;
        self.expect(TokenKind::Def)?;
        let name = self.parse_ident()?;
        trace!("parsing procedure {}", name.name);

        self.expect(TokenKind::LParen)?;
        let params = self.parse_params()?;
        self.expect(TokenKind::RParen)?;

        let ret = if self.consume(&TokenKind::Colon) {
            self.parse_type()?
        } else {
            Type::Void
        };

        let body = self.parse_block()?;
        let span = start.merge(&body.span);
        Procedure::new(name, params, ret, body, span)
    }

    /// `a, b: int, c: bool`: every name takes the next annotation
    fn parse_params(&mut self) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        if self.check(&TokenKind::RParen) {
            return Ok(params);
        }

        let mut pending = Vec::new();
        loop {
            pending.push(self.parse_ident()?);
            if self.consume(&TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::Colon)?;
            let ty = self.parse_type()?;
            params.extend(pending.drain(..).map(|name| Param { name, ty: ty.clone() }));
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }
        Ok(params)
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let token = self.current().clone();
        match &token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Ident::new(name.clone(), token.span))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// A name in declaration position: parsed as an expression, which must
    /// turn out to be a plain variable
    fn parse_declared_name(&mut self, what: &str) -> Result<Ident> {
        let expr = self.parse_expr()?;
        match expr.kind {
            ExprKind::Var { name } => Ok(Ident::new(name, expr.span)),
            _ => Err(Error::MalformedDeclaration {
                message: format!("{} must be a plain identifier", what),
                span: expr.span,
            }),
        }
    }

    // ==================== Types ====================

    /// Base type followed by any number of `*` and `[N]` modifiers; each
    /// modifier wraps the type built so far
    fn parse_type(&mut self) -> Result<Type> {
        let mut ty = self.parse_base_type()?;

        loop {
            if self.consume(&TokenKind::Star) {
                ty = Type::pointer(ty);
            } else if self.consume(&TokenKind::LBracket) {
                let TokenKind::IntLit(length) = self.current_kind().clone() else {
                    return Err(self.unexpected("array length"));
                };
                let span = self.advance().span;
                let length = u32::try_from(length).map_err(|_| Error::ValueOutOfRange {
                    literal: length.to_string(),
                    span,
                })?;
                self.expect(TokenKind::RBracket)?;
                ty = Type::array(length, ty);
            } else {
                break;
            }
        }

        Ok(ty)
    }

    fn parse_base_type(&mut self) -> Result<Type> {
        let token = self.current().clone();
        match &token.kind {
            TokenKind::Int => {
                self.advance();
                Ok(Type::Int)
            }
            TokenKind::Bool => {
                self.advance();
                Ok(Type::Bool)
            }
            TokenKind::Void => {
                self.advance();
                Ok(Type::Void)
            }
            TokenKind::Struct => self.parse_struct_type(),
            TokenKind::Ident(name) => {
                self.advance();
                self.lookup_alias(name).ok_or_else(|| Error::UndefinedSymbol {
                    name: name.clone(),
                    span: token.span,
                })
            }
            _ => Err(self.unexpected("type")),
        }
    }

    /// `struct { name: type, ... }`
    fn parse_struct_type(&mut self) -> Result<Type> {
        self.expect(TokenKind::Struct)?;
        self.expect(TokenKind::LBrace)?;

        let mut fields: Vec<StructField> = Vec::new();
        if !self.check(&TokenKind::RBrace) {
            loop {
                // Repeated field names are kept; lookups take the first
                let name = self.parse_declared_name("struct field name")?;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                fields.push(StructField::new(name.name, ty));
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::RBrace)?;
        Ok(Type::Struct { fields })
    }

    fn lookup_alias(&self, name: &str) -> Option<Type> {
        self.aliases.iter().rev().find_map(|scope| scope.get(name)).cloned()
    }

    // ==================== Statements ====================

    fn parse_block(&mut self) -> Result<Block> {
        let start = self.current().span;
        self.expect(TokenKind::LBrace)?;

        self.aliases.push(HashMap::new());
        let mut stmts = Vec::new();
        let result = loop {
            if self.check(&TokenKind::RBrace) || self.is_at_end() {
                break Ok(());
            }
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(err) => break Err(err),
            }
        };
        self.aliases.pop();
        result?;

        self.expect(TokenKind::RBrace)?;

        Ok(Block::new(stmts, start.merge(&self.previous_span())))
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.current_kind() {
            TokenKind::Var => self.parse_var_decl(),
            TokenKind::Type => self.parse_type_alias(),
            TokenKind::If => Ok(Stmt::If(self.parse_if()?)),
            TokenKind::While => self.parse_while(),
            TokenKind::Break | TokenKind::Continue => {
                let token = self.advance();
                let jump = if token.kind == TokenKind::Break {
                    JumpKind::Break
                } else {
                    JumpKind::Continue
                };
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Jump {
                    jump,
                    span: token.span.merge(&self.previous_span()),
                })
            }
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Ident(_) if matches!(self.peek(), Some(t) if t.kind == TokenKind::Eq) => {
                self.parse_assign()
            }
            _ => self.parse_eval(),
        }
    }

    /// `var x = e, y : T;`
    fn parse_var_decl(&mut self) -> Result<Stmt> {
        let start = self.current().span;
        self.expect(TokenKind::Var)?;

        let mut names = Vec::new();
        let mut inits = Vec::new();
        loop {
            names.push(self.parse_ident()?);
            inits.push(if self.consume(&TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            });
            if !self.consume(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        self.expect(TokenKind::Semicolon)?;

        let decl = VarDecl::new(names, inits, ty, start.merge(&self.previous_span()))?;
        Ok(Stmt::VarDecl(decl))
    }

    /// `type name = T;`; the alias is visible for the rest of the block
    fn parse_type_alias(&mut self) -> Result<Stmt> {
        let start = self.current().span;
        self.expect(TokenKind::Type)?;
        let name = self.parse_declared_name("type alias name")?;
        self.expect(TokenKind::Eq)?;
        let ty = self.parse_type()?;
        self.expect(TokenKind::Semicolon)?;

        let scope = self
            .aliases
            .last_mut()
            .unwrap_or_else(|| unreachable!("top-level alias scope is never popped"));
        if scope.contains_key(&name.name) {
            return Err(Error::DuplicateSymbol {
                name: name.name,
                span: name.span,
            });
        }
        trace!("type alias {} = {}", name.name, ty);
        scope.insert(name.name.clone(), ty.clone());

        Ok(Stmt::TypeAlias {
            name,
            ty,
            span: start.merge(&self.previous_span()),
        })
    }

    /// `x = e;`
    fn parse_assign(&mut self) -> Result<Stmt> {
        let target = self.parse_ident()?;
        self.expect(TokenKind::Eq)?;
        let value = self.parse_expr()?;
        self.expect(TokenKind::Semicolon)?;

        let span = target.span.merge(&self.previous_span());
        Ok(Stmt::Assign {
            target: LValue::Var {
                name: target.name,
                ty: Type::default(),
                block: BlockId::GLOBAL,
                span: target.span,
            },
            value,
            span,
        })
    }

    /// A call evaluated for its effect
    fn parse_eval(&mut self) -> Result<Stmt> {
        let call = self.parse_expr()?;
        if !matches!(call.kind, ExprKind::Call { .. }) {
            return Err(Error::Syntax {
                message: "only a procedure call can be used as a statement".to_string(),
                span: call.span,
            });
        }
        self.expect(TokenKind::Semicolon)?;
        let span = call.span.merge(&self.previous_span());
        Ok(Stmt::Eval { call, span })
    }

    /// `if (c) { } [else { } | else if ...]`
    fn parse_if(&mut self) -> Result<IfStmt> {
        let start = self.current().span;
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_block = self.parse_block()?;

        let else_branch = if self.consume(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                Some(ElseBranch::If(Box::new(self.parse_if()?)))
            } else {
                Some(ElseBranch::Block(self.parse_block()?))
            }
        } else {
            None
        };

        Ok(IfStmt {
            cond,
            then_block,
            else_branch,
            span: start.merge(&self.previous_span()),
        })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        let start = self.current().span;
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;

        Ok(Stmt::While {
            cond,
            span: start.merge(&body.span),
            body,
        })
    }

    fn parse_return_stmt(&mut self) -> Result<Stmt> {
        let start = self.current().span;
        self.expect(TokenKind::Return)?;

        let value = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon)?;

        Ok(Stmt::Return {
            value,
            span: start.merge(&self.previous_span()),
        })
    }

    // ==================== Expression Parsing (Pratt) ====================

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_expr_bp(0)
    }

    /// Parse expression with binding power (Pratt parsing)
    fn parse_expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        // Level of the last non-associative operator folded into `left`
        let mut last_non_assoc = None;

        loop {
            let op_token = self.current().clone();
            let Some((bp, assoc)) = op_token.kind.binary_precedence() else {
                break;
            };

            if bp < min_bp {
                break;
            }

            if assoc == Assoc::NonAssoc && last_non_assoc == Some(bp) {
                return Err(Error::Syntax {
                    message: format!("comparison {} cannot be chained", op_token.kind.describe()),
                    span: op_token.span,
                });
            }

            self.advance();
            let op = Self::token_to_binop(&op_token.kind, op_token.span)?;
            let right = self.parse_expr_bp(bp + 1)?;
            let span = left.span.merge(&right.span);

            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
            last_non_assoc = (assoc == Assoc::NonAssoc).then_some(bp);
        }

        Ok(left)
    }

    /// Prefix operators, then a primary with its postfix chain
    fn parse_unary(&mut self) -> Result<Expr> {
        let token = self.current().clone();

        match token.kind {
            TokenKind::Minus => {
                self.advance();
                // Fold into the literal so that -2147483648 is representable
                if let TokenKind::IntLit(magnitude) = self.current_kind().clone() {
                    let literal = self.advance();
                    let span = token.span.merge(&literal.span);
                    let value = i32::try_from(-magnitude).map_err(|_| Error::ValueOutOfRange {
                        literal: format!("-{}", magnitude),
                        span,
                    })?;
                    let folded = Expr::new(ExprKind::Int { value }, span);
                    return self.parse_postfix(folded);
                }
                let operand = self.parse_unary()?;
                Ok(Self::unary(UnOp::Neg, operand, token.span))
            }
            TokenKind::Not => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Self::unary(UnOp::Not, operand, token.span))
            }
            TokenKind::Tilde => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Self::unary(UnOp::BitNot, operand, token.span))
            }
            TokenKind::Star => {
                self.advance();
                let object = if self.is_prefix_op() {
                    self.parse_unary()?
                } else {
                    let primary = self.parse_primary()?;
                    self.parse_selectors(primary)?
                };
                let span = token.span.merge(&object.span);
                let deref = Expr::new(ExprKind::Deref { object: Box::new(object) }, span);
                self.parse_postfix(deref)
            }
            TokenKind::And => {
                self.advance();
                let object = self.parse_unary()?;
                if !object.is_assignable() {
                    return Err(Error::Syntax {
                        message: "cannot take the address of this expression".to_string(),
                        span: object.span,
                    });
                }
                let span = token.span.merge(&object.span);
                Ok(Expr::new(ExprKind::AddressOf { object: Box::new(object) }, span))
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_postfix(primary)
            }
        }
    }

    fn is_prefix_op(&self) -> bool {
        matches!(
            self.current_kind(),
            TokenKind::Minus | TokenKind::Not | TokenKind::Tilde | TokenKind::Star | TokenKind::And
        )
    }

    fn unary(op: UnOp, operand: Expr, start: Span) -> Expr {
        let span = start.merge(&operand.span);
        Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, span)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.current().clone();

        match token.kind {
            TokenKind::IntLit(value) => {
                self.advance();
                let value = i32::try_from(value).map_err(|_| Error::ValueOutOfRange {
                    literal: value.to_string(),
                    span: token.span,
                })?;
                Ok(Expr::new(ExprKind::Int { value }, token.span))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                let value = token.kind == TokenKind::True;
                Ok(Expr::new(ExprKind::Bool { value }, token.span))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, token.span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.consume(&TokenKind::LParen) {
                    let args = self.parse_args()?;
                    let span = token.span.merge(&self.previous_span());
                    Ok(Expr::new(ExprKind::Call { target: name, args }, span))
                } else {
                    Ok(Expr::new(ExprKind::Var { name }, token.span))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let mut inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                inner.span = token.span.merge(&self.previous_span());
                Ok(inner)
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Positional arguments up to and including the closing parenthesis
    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.consume(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    /// `.field` and `->field` only
    fn parse_selectors(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            if self.consume(&TokenKind::Dot) {
                expr = self.field(expr, false)?;
            } else if self.consume(&TokenKind::Arrow) {
                expr = self.field(expr, true)?;
            } else {
                return Ok(expr);
            }
        }
    }

    /// Indexing and field selectors
    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr> {
        loop {
            if self.consume(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(TokenKind::RBracket)?;
                let span = expr.span.merge(&self.previous_span());
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if self.consume(&TokenKind::Dot) {
                expr = self.field(expr, false)?;
            } else if self.consume(&TokenKind::Arrow) {
                expr = self.field(expr, true)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn field(&mut self, object: Expr, through_pointer: bool) -> Result<Expr> {
        let field = self.parse_ident()?;
        let span = object.span.merge(&field.span);
        let object = Box::new(object);
        let kind = if through_pointer {
            ExprKind::ArrowField { object, field: field.name }
        } else {
            ExprKind::Field { object, field: field.name }
        };
        Ok(Expr::new(kind, span))
    }

    fn token_to_binop(kind: &TokenKind, span: Span) -> Result<BinOp> {
        match kind {
            TokenKind::Plus => Ok(BinOp::Add),
            TokenKind::Minus => Ok(BinOp::Sub),
            TokenKind::Star => Ok(BinOp::Mul),
            TokenKind::Slash => Ok(BinOp::Div),
            TokenKind::Percent => Ok(BinOp::Mod),
            TokenKind::EqEq => Ok(BinOp::IsEqual),
            TokenKind::Ne => Ok(BinOp::IsNotEqual),
            TokenKind::Lt => Ok(BinOp::IsLessThan),
            TokenKind::Le => Ok(BinOp::IsLessThanOrEqual),
            TokenKind::Gt => Ok(BinOp::IsGreaterThan),
            TokenKind::Ge => Ok(BinOp::IsGreaterThanOrEqual),
            TokenKind::AndAnd => Ok(BinOp::LogicalAnd),
            TokenKind::OrOr => Ok(BinOp::LogicalOr),
            TokenKind::And => Ok(BinOp::BitwiseAnd),
            TokenKind::Or => Ok(BinOp::BitwiseOr),
            TokenKind::Caret => Ok(BinOp::BitwiseXor),
            TokenKind::Shl => Ok(BinOp::BitwiseShiftLeft),
            TokenKind::Shr => Ok(BinOp::BitwiseShiftRight),
            other => Err(Error::Syntax {
                message: format!("{} is not a binary operator", other.describe()),
                span,
            }),
        }
    }
}

/// Lex and parse a whole source text
pub fn parse_source(source: &str) -> Result<Program> {
    Parser::new(Lexer::new(source))?.parse_program()
}

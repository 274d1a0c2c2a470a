//! Name and type resolution for BX
//!
//! Performs, in declaration order:
//! - Built-in procedure registration
//! - Global variable declaration
//! - Procedure signature collection (so calls may refer forward)
//! - Body resolution: every expression gets its type written exactly once
//!
//! The first error aborts the pass.

use log::{debug, trace};

use crate::frontend::ast::*;
use crate::frontend::scope::{ProcTable, ProcTableHandle, ScopeArena};
use crate::types::{ProcSignature, Type};
use crate::utils::{Error, Result, Span};

/// Procedures every program can call without declaring them
fn register_builtins(procs: &ProcTableHandle) -> Result<()> {
    let mut table = procs.borrow_mut();
    table.declare("print_int", ProcSignature::new(vec![Type::Int], Type::Void), Span::dummy())?;
    table.declare("print_bool", ProcSignature::new(vec![Type::Bool], Type::Void), Span::dummy())?;
    Ok(())
}

/// Resolve names and types of a whole program in place. The scope frames
/// built on the way are kept in `program.scopes`.
///
/// A program is resolved at most once: one that already carries expression
/// types is refused.
pub fn resolve_program(program: &mut Program) -> Result<()> {
    program.check_declared_types()?;
    let mut typed = None;
    program.walk_exprs(&mut |e| {
        if typed.is_none() && e.ty.is_resolved() {
            typed = Some(e.span);
        }
    });
    if let Some(span) = typed {
        return Err(Error::MalformedDeclaration {
            message: "program has already been resolved".to_string(),
            span,
        });
    }

    let Program {
        procedures,
        globals,
        scopes,
    } = program;

    *scopes = ScopeArena::new();
    let procs = ProcTable::new_handle();
    register_builtins(&procs)?;
    scopes.enter_root(globals.id, procs);

    let mut resolver = Resolver::new(scopes);

    // Globals live in the outermost frame
    resolver.resolve_stmts(globals.id, &mut globals.stmts)?;

    for procedure in procedures.iter() {
        resolver.scopes.declare_proc(
            globals.id,
            &procedure.name.name,
            procedure.signature(),
            procedure.name.span,
        )?;
    }

    for procedure in procedures.iter_mut() {
        resolver.resolve_procedure(globals.id, procedure)?;
    }
    Ok(())
}

/// Walks statements and expressions, consulting the scope arena
pub struct Resolver<'a> {
    scopes: &'a mut ScopeArena,
    /// Return type of the procedure being resolved
    ret: Type,
    /// Number of enclosing `while` loops
    loop_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(scopes: &'a mut ScopeArena) -> Self {
        Self {
            scopes,
            ret: Type::Void,
            loop_depth: 0,
        }
    }

    fn resolve_procedure(&mut self, global: BlockId, procedure: &mut Procedure) -> Result<()> {
        debug!("resolving procedure {}{}", procedure.name.name, procedure.signature());
        let body = procedure.body.id;
        self.scopes.enter_block(global, body);

        // Parameters share the body's frame, so a local cannot redeclare one
        for param in &procedure.params {
            self.scopes.declare_var(body, &param.name.name, param.ty.clone(), param.name.span)?;
        }

        self.ret = procedure.ret.clone();
        self.loop_depth = 0;
        self.resolve_stmts(body, &mut procedure.body.stmts)
    }

    /// Enter `block` as a child of `parent` and resolve its statements
    fn resolve_block(&mut self, parent: BlockId, block: &mut Block) -> Result<()> {
        self.scopes.enter_block(parent, block.id);
        self.resolve_stmts(block.id, &mut block.stmts)
    }

    fn resolve_stmts(&mut self, block: BlockId, stmts: &mut [Stmt]) -> Result<()> {
        for stmt in stmts {
            self.resolve_stmt(block, stmt)?;
        }
        Ok(())
    }

    fn resolve_stmt(&mut self, block: BlockId, stmt: &mut Stmt) -> Result<()> {
        match stmt {
            Stmt::VarDecl(decl) => {
                for (name, init) in decl.names.iter().zip(decl.inits.iter_mut()) {
                    if let Some(init) = init {
                        let ty = self.resolve_expr(init)?;
                        Self::expect_type(&decl.ty, &ty, init.span)?;
                    }
                    self.scopes.declare_var(block, &name.name, decl.ty.clone(), name.span)?;
                }
                Ok(())
            }

            // Expanded by the parser
            Stmt::TypeAlias { .. } => Ok(()),

            Stmt::Assign { target, value, .. } => {
                let LValue::Var {
                    name,
                    ty,
                    block: target_block,
                    span,
                } = target;
                let declared = self.scopes.lookup_var(*target_block, name, *span)?.ty.clone();
                let value_ty = self.resolve_expr(value)?;
                Self::expect_type(&declared, &value_ty, value.span)?;
                *ty = declared;
                Ok(())
            }

            Stmt::Eval { call, .. } => {
                self.resolve_expr(call)?;
                Ok(())
            }

            Stmt::If(if_stmt) => self.resolve_if(block, if_stmt),

            Stmt::While { cond, body, .. } => {
                self.resolve_condition(cond)?;
                self.loop_depth += 1;
                let result = self.resolve_block(block, body);
                self.loop_depth -= 1;
                result
            }

            Stmt::Jump { jump, span } => {
                if self.loop_depth == 0 {
                    return Err(Error::JumpOutsideLoop {
                        jump: jump.to_string(),
                        span: *span,
                    });
                }
                Ok(())
            }

            Stmt::Return { value, span } => match value {
                Some(value) => {
                    let ty = self.resolve_expr(value)?;
                    Self::expect_type(&self.ret, &ty, value.span)
                }
                None if self.ret == Type::Void => Ok(()),
                None => Err(Error::TypeMismatch {
                    expected: self.ret.to_string(),
                    got: Type::Void.to_string(),
                    span: *span,
                }),
            },

            Stmt::Block(nested) => self.resolve_block(block, nested),
        }
    }

    fn resolve_if(&mut self, block: BlockId, if_stmt: &mut IfStmt) -> Result<()> {
        self.resolve_condition(&mut if_stmt.cond)?;
        self.resolve_block(block, &mut if_stmt.then_block)?;
        match &mut if_stmt.else_branch {
            Some(ElseBranch::Block(else_block)) => self.resolve_block(block, else_block),
            Some(ElseBranch::If(nested)) => self.resolve_if(block, nested),
            None => Ok(()),
        }
    }

    fn resolve_condition(&mut self, cond: &mut Expr) -> Result<()> {
        let ty = self.resolve_expr(cond)?;
        Self::expect_type(&Type::Bool, &ty, cond.span)
    }

    /// Compute the type of `expr`, write it into the node and return it
    fn resolve_expr(&mut self, expr: &mut Expr) -> Result<Type> {
        debug_assert_eq!(expr.ty, Type::Unresolved, "expression resolved twice");
        let block = expr.block;
        let span = expr.span;

        let ty = match &mut expr.kind {
            ExprKind::Int { .. } => Type::Int,
            ExprKind::Bool { .. } => Type::Bool,
            ExprKind::Null => Type::Null,

            ExprKind::Var { name } => self.scopes.lookup_var(block, name, span)?.ty.clone(),

            ExprKind::Unary { op, operand } => {
                let operand_ty = self.resolve_expr(operand)?;
                let expected = match op {
                    UnOp::Neg | UnOp::BitNot => Type::Int,
                    UnOp::Not => Type::Bool,
                };
                Self::expect_type(&expected, &operand_ty, operand.span)?;
                expected
            }

            ExprKind::Binary { op, left, right } => {
                let left_ty = self.resolve_expr(left)?;
                let right_ty = self.resolve_expr(right)?;
                self.binary_type(*op, &left_ty, &right_ty, left.span, right.span)?
            }

            ExprKind::Call { target, args } => {
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args.iter_mut() {
                    arg_types.push(self.resolve_expr(arg)?);
                }
                self.scopes.resolve_call(block, target, &arg_types, span)?.ret
            }

            ExprKind::Index { object, index } => {
                let object_ty = self.resolve_expr(object)?;
                let index_ty = self.resolve_expr(index)?;
                let element = match object_ty {
                    Type::Array { element, .. } => *element,
                    other => return Err(Self::mismatch("array", &other, object.span)),
                };
                Self::expect_type(&Type::Int, &index_ty, index.span)?;
                element
            }

            ExprKind::Field { object, field } => {
                let object_ty = self.resolve_expr(object)?;
                if !matches!(object_ty, Type::Struct { .. }) {
                    return Err(Self::mismatch("struct", &object_ty, object.span));
                }
                Self::field_type(&object_ty, field, span)?
            }

            ExprKind::ArrowField { object, field } => {
                let object_ty = self.resolve_expr(object)?;
                match &object_ty {
                    Type::Pointer { target } if matches!(**target, Type::Struct { .. }) => {
                        Self::field_type(target, field, span)?
                    }
                    _ => return Err(Self::mismatch("pointer to struct", &object_ty, object.span)),
                }
            }

            ExprKind::AddressOf { object } => Type::pointer(self.resolve_expr(object)?),

            ExprKind::Deref { object } => {
                let object_ty = self.resolve_expr(object)?;
                match object_ty {
                    Type::Pointer { target } => *target,
                    other => return Err(Self::mismatch("pointer", &other, object.span)),
                }
            }
        };

        trace!("{} line {}: {}", block, span.line, ty);
        expr.ty = ty.clone();
        Ok(ty)
    }

    fn binary_type(&self, op: BinOp, left: &Type, right: &Type, left_span: Span, right_span: Span) -> Result<Type> {
        if op.is_arithmetic() || op.is_ordering() {
            Self::expect_type(&Type::Int, left, left_span)?;
            Self::expect_type(&Type::Int, right, right_span)?;
            return Ok(if op.is_arithmetic() { Type::Int } else { Type::Bool });
        }

        if op.is_logical() {
            Self::expect_type(&Type::Bool, left, left_span)?;
            Self::expect_type(&Type::Bool, right, right_span)?;
            return Ok(Type::Bool);
        }

        // Equality: same type on both sides, or null against a pointer
        if left.accepts(right) || right.accepts(left) {
            Ok(Type::Bool)
        } else {
            Err(Self::mismatch(&left.to_string(), right, right_span))
        }
    }

    fn field_type(ty: &Type, field: &str, span: Span) -> Result<Type> {
        ty.field(field).cloned().ok_or_else(|| Error::UnknownField {
            field: field.to_string(),
            ty: ty.to_string(),
            span,
        })
    }

    /// `expected` must accept a value of type `got`
    fn expect_type(expected: &Type, got: &Type, span: Span) -> Result<()> {
        if expected.accepts(got) {
            Ok(())
        } else {
            Err(Self::mismatch(&expected.to_string(), got, span))
        }
    }

    fn mismatch(expected: &str, got: &Type, span: Span) -> Error {
        Error::TypeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_source;
    use pretty_assertions::assert_eq;

    fn resolve(source: &str) -> Result<Program> {
        let mut program = parse_source(source)?;
        resolve_program(&mut program)?;
        Ok(program)
    }

    fn resolve_main(body: &str) -> Result<Program> {
        resolve(&format!("def main() {{ {} }}", body))
    }

    fn expr_types(program: &Program) -> Vec<Type> {
        let mut types = Vec::new();
        program.walk_exprs(&mut |e| types.push(e.ty.clone()));
        types
    }

    #[test]
    fn test_simple_program_resolves_to_int() {
        let program = resolve_main("var x = 1, y = 2 : int; x = x + y;").unwrap();
        assert_eq!(expr_types(&program), vec![Type::Int; 5]);

        let Stmt::Assign { target: LValue::Var { ty, .. }, .. } = &program.procedures[0].body.stmts[1] else {
            panic!("expected assignment")
        };
        assert_eq!(*ty, Type::Int);
        assert!(program.is_fully_resolved());
    }

    #[test]
    fn test_unresolved_before_the_pass() {
        let program = parse_source("def main() { print_int(1); }").unwrap();
        assert!(!program.is_fully_resolved());
    }

    #[test]
    fn test_program_is_resolved_once() {
        let mut program = resolve_main("var x = 1 : int; print_int(x);").unwrap();
        let before = expr_types(&program);

        let err = resolve_program(&mut program).unwrap_err();
        assert!(matches!(err, Error::MalformedDeclaration { ref message, .. } if message.contains("already")));
        assert_eq!(expr_types(&program), before);
    }

    #[test]
    fn test_declared_types_edited_after_parsing_are_refused() {
        let mut program = parse_source("def main() { var x : int; x = x; }").unwrap();
        let Stmt::VarDecl(decl) = &mut program.procedures[0].body.stmts[0] else {
            panic!("expected declaration")
        };
        decl.ty = Type::pointer(Type::Unresolved);

        let err = resolve_program(&mut program).unwrap_err();
        assert!(matches!(err, Error::MalformedDeclaration { .. }));
    }

    #[test]
    fn test_scopes_are_kept_on_the_program() {
        let program = resolve("var g = true : bool; def main() { var x = 1 : int; }").unwrap();
        let body = program.procedures[0].body.id;
        let sp = Span::dummy();
        assert_eq!(program.scopes.lookup_var(body, "x", sp).unwrap().ty, Type::Int);
        assert_eq!(program.scopes.lookup_var(body, "g", sp).unwrap().ty, Type::Bool);
        assert!(program.scopes.lookup_var(BlockId::GLOBAL, "x", sp).is_err());
    }

    #[test]
    fn test_undefined_variable_reports_line() {
        let err = resolve("def main() {\n  var x = 1 : int;\n  y = 2;\n}").unwrap_err();
        match err {
            Error::UndefinedSymbol { name, span } => {
                assert_eq!(name, "y");
                assert_eq!(span.line, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_shadowing_and_duplicates() {
        assert!(resolve_main(
            "var x = 1 : int; { var x = true : bool; print_bool(x); } print_int(x);"
        )
        .is_ok());

        let err = resolve_main("var x = 1 : int; var x = 2 : int;").unwrap_err();
        assert!(matches!(err, Error::DuplicateSymbol { ref name, .. } if name == "x"));

        // Parameters live in the body's own frame
        let err = resolve("def f(a: int) { var a = 1 : int; } def main() { }").unwrap_err();
        assert!(matches!(err, Error::DuplicateSymbol { .. }));

        // A variable is not visible in its own initializer
        assert!(matches!(
            resolve_main("var z = z : int;"),
            Err(Error::UndefinedSymbol { .. })
        ));
    }

    #[test]
    fn test_overloads_and_forward_calls() {
        let program = resolve(
            "def main() { print_int(f(1)); print_bool(f(1, 2)); }
             def f(a: int): int { return a; }
             def f(a, b: int): bool { return a < b; }",
        )
        .unwrap();
        assert!(program.is_fully_resolved());

        let err = resolve("def f(a: int) { } def f(b: int): bool { return true; } def main() { }").unwrap_err();
        assert!(matches!(err, Error::DuplicateProcedure { ref name, .. } if name == "f"));

        let err = resolve("def f(a: int) { } def main() { f(true); }").unwrap_err();
        assert!(matches!(err, Error::CallMismatch { ref args, .. } if args == "bool"));

        let err = resolve_main("g();").unwrap_err();
        assert!(matches!(err, Error::UndefinedSymbol { ref name, .. } if name == "g"));
    }

    #[test]
    fn test_builtins() {
        assert!(resolve_main("print_int(1); print_bool(1 < 2);").is_ok());
        assert!(matches!(
            resolve_main("print_int(true);"),
            Err(Error::CallMismatch { .. })
        ));
        assert!(matches!(
            resolve("def print_int(x: int) { } def main() { }"),
            Err(Error::DuplicateProcedure { .. })
        ));
    }

    #[test]
    fn test_type_mismatches() {
        let err = resolve_main("var b = 1 : bool;").unwrap_err();
        match err {
            Error::TypeMismatch { expected, got, .. } => {
                assert_eq!(expected, "bool");
                assert_eq!(got, "int");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(resolve_main("if (1) { }"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(resolve_main("while (0) { }"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(resolve_main("var x = 1 + true : int;"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(resolve_main("var b = !1 : bool;"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(resolve_main("var b = 1 == true : bool;"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(resolve_main("var b = true < false : bool;"), Err(Error::TypeMismatch { .. })));
        assert!(resolve_main("var b = true != false && 1 <= 2 : bool;").is_ok());
    }

    #[test]
    fn test_returns() {
        assert!(resolve("def f(): int { return 1; } def main() { return; }").is_ok());
        assert!(matches!(
            resolve("def f(): int { return; } def main() { }"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            resolve("def f(): int { return true; } def main() { }"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(resolve_main("return 1;"), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn test_jumps_need_a_loop() {
        assert!(resolve_main("while (true) { if (true) { break; } else { continue; } }").is_ok());

        let err = resolve_main("break;").unwrap_err();
        assert!(matches!(err, Error::JumpOutsideLoop { ref jump, .. } if jump == "break"));

        // The loop ends with its body
        let err = resolve_main("while (true) { } continue;").unwrap_err();
        assert!(matches!(err, Error::JumpOutsideLoop { ref jump, .. } if jump == "continue"));
    }

    #[test]
    fn test_pointers_and_null() {
        let program = resolve_main(
            "var x = 0 : int; var p = null : int*;
             p = &x; x = *p + 1;
             if (p != null) { print_int(*p); }",
        )
        .unwrap();
        assert!(program.is_fully_resolved());

        assert!(matches!(resolve_main("var x = null : int;"), Err(Error::TypeMismatch { .. })));
        assert!(matches!(
            resolve_main("var x = 0 : int; print_int(*x);"),
            Err(Error::TypeMismatch { ref expected, .. }) if expected == "pointer"
        ));
    }

    #[test]
    fn test_arrays_and_structs() {
        let source = "type point = struct { x: int, y: int };
                      var origin : point;
                      var pts : point*[2];
                      def main() {
                          var a : int[3];
                          print_int(a[1] + origin.x + pts[0]->y);
                          %s
                      }";
        assert!(resolve(&source.replace("%s", "")).is_ok());

        let err = resolve(&source.replace("%s", "print_int(origin.z);")).unwrap_err();
        assert!(matches!(err, Error::UnknownField { ref field, .. } if field == "z"));

        let err = resolve(&source.replace("%s", "print_int(a[true]);")).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));

        let err = resolve(&source.replace("%s", "print_int(origin->x);")).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref expected, .. } if expected == "pointer to struct"));

        let err = resolve(&source.replace("%s", "print_int(a.x);")).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref expected, .. } if expected == "struct"));
    }

    #[test]
    fn test_globals_are_visible_everywhere() {
        let program = resolve("var counter = 0 : int; def main() { counter = counter + 1; }").unwrap();
        assert!(program.is_fully_resolved());
    }
}

//! Scope and overload resolution
//!
//! Variables live in frames stored in one arena and addressed by `FrameId`.
//! Each block owns a chain of frame handles, outermost first: entering a
//! nested block copies the parent's chain and appends one fresh frame, so the
//! child's own declarations never reach the parent's frame.
//!
//! Procedures form one flat namespace for the whole program. Every block
//! holds the same `ProcTableHandle`, so a procedure declared through any
//! block is visible from every other block.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, trace};

use crate::frontend::ast::BlockId;
use crate::types::{format_types, ProcSignature, Type};
use crate::utils::{Error, Result, Span};

/// Handle to a frame in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(usize);

/// What a frame knows about one variable
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRecord {
    pub ty: Type,
    /// Identifier assigned by the lowering stage; write-once
    pub temp: Option<String>,
}

#[derive(Debug, Default)]
struct Frame {
    symbols: HashMap<String, SymbolRecord>,
}

// ==================== Procedure Table ====================

/// Overloads per procedure name, in registration order
#[derive(Debug, Default)]
pub struct ProcTable {
    overloads: HashMap<String, Vec<ProcSignature>>,
}

/// The whole-program procedure table, shared by every block
pub type ProcTableHandle = Rc<RefCell<ProcTable>>;

impl ProcTable {
    pub fn new_handle() -> ProcTableHandle {
        Rc::new(RefCell::new(ProcTable::default()))
    }

    /// Register an overload. Fails when an overload with the same parameter
    /// types exists, whatever its return type.
    pub fn declare(&mut self, name: &str, signature: ProcSignature, span: Span) -> Result<()> {
        let overloads = self.overloads.entry(name.to_string()).or_default();
        if overloads.iter().any(|existing| existing.same_params(&signature)) {
            return Err(Error::DuplicateProcedure {
                name: name.to_string(),
                params: format_types(&signature.params),
                span,
            });
        }
        debug!("declare procedure {}{}", name, signature);
        overloads.push(signature);
        Ok(())
    }

    /// Pick the overload whose parameter types match `args` exactly
    pub fn resolve(&self, name: &str, args: &[Type], span: Span) -> Result<ProcSignature> {
        let overloads = match self.overloads.get(name) {
            Some(overloads) if !overloads.is_empty() => overloads,
            _ => {
                return Err(Error::UndefinedSymbol {
                    name: name.to_string(),
                    span,
                })
            }
        };
        let found = overloads.iter().find(|sig| sig.accepts_args(args)).cloned();
        trace!("resolve call {}({}) -> {:?}", name, format_types(args), found);
        found.ok_or_else(|| Error::CallMismatch {
            name: name.to_string(),
            args: format_types(args),
            span,
        })
    }

    pub fn overloads(&self, name: &str) -> &[ProcSignature] {
        self.overloads.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ==================== Scope Arena ====================

#[derive(Debug)]
struct BlockScope {
    /// Outermost (global) frame first
    chain: Vec<FrameId>,
    procs: ProcTableHandle,
}

/// Every scope frame of a program, plus each block's view of them.
///
/// Operations taking a `BlockId` panic if that block was never entered;
/// the resolution pass enters each block before visiting its contents.
#[derive(Debug, Default)]
pub struct ScopeArena {
    frames: Vec<Frame>,
    blocks: HashMap<BlockId, BlockScope>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_frame(&mut self) -> FrameId {
        let id = FrameId(self.frames.len());
        self.frames.push(Frame::default());
        id
    }

    fn scope(&self, block: BlockId) -> &BlockScope {
        &self.blocks[&block]
    }

    /// Create the outermost scope: one empty frame and the program's
    /// procedure table
    pub fn enter_root(&mut self, block: BlockId, procs: ProcTableHandle) {
        let frame = self.fresh_frame();
        self.blocks.insert(block, BlockScope { chain: vec![frame], procs });
    }

    /// Give `child` a copy of the parent's chain plus one fresh frame, and
    /// the parent's procedure table (the same table, not a copy)
    pub fn enter_block(&mut self, parent: BlockId, child: BlockId) {
        let (mut chain, procs) = {
            let scope = self.scope(parent);
            (scope.chain.clone(), Rc::clone(&scope.procs))
        };
        chain.push(self.fresh_frame());
        trace!("enter block {} from {} (depth {})", child, parent, chain.len());
        self.blocks.insert(child, BlockScope { chain, procs });
    }

    /// Number of frames in `block`'s chain
    pub fn depth(&self, block: BlockId) -> usize {
        self.scope(block).chain.len()
    }

    /// The procedure table `block` resolves calls against
    pub fn procs(&self, block: BlockId) -> ProcTableHandle {
        Rc::clone(&self.scope(block).procs)
    }

    /// Bind `name` in the innermost frame of `block`. Shadowing an outer
    /// frame is fine; a second binding in the same frame is not.
    pub fn declare_var(&mut self, block: BlockId, name: &str, ty: Type, span: Span) -> Result<()> {
        let innermost = *self
            .scope(block)
            .chain
            .last()
            .unwrap_or_else(|| unreachable!("every chain has at least one frame"));
        let frame = &mut self.frames[innermost.0];
        if frame.symbols.contains_key(name) {
            return Err(Error::DuplicateSymbol {
                name: name.to_string(),
                span,
            });
        }
        debug!("declare {}: {} in block {}", name, ty, block);
        frame.symbols.insert(name.to_string(), SymbolRecord { ty, temp: None });
        Ok(())
    }

    /// Frame holding the innermost binding of `name` visible from `block`
    fn find(&self, block: BlockId, name: &str) -> Option<FrameId> {
        self.scope(block)
            .chain
            .iter()
            .rev()
            .copied()
            .find(|frame| self.frames[frame.0].symbols.contains_key(name))
    }

    /// Search innermost to outermost
    pub fn lookup_var(&self, block: BlockId, name: &str, span: Span) -> Result<&SymbolRecord> {
        self.find(block, name)
            .and_then(|frame| self.frames[frame.0].symbols.get(name))
            .ok_or_else(|| Error::UndefinedSymbol {
                name: name.to_string(),
                span,
            })
    }

    /// Register a procedure overload in the shared table
    pub fn declare_proc(&self, block: BlockId, name: &str, signature: ProcSignature, span: Span) -> Result<()> {
        self.scope(block).procs.borrow_mut().declare(name, signature, span)
    }

    /// Resolve a call against the shared table by exact argument types
    pub fn resolve_call(&self, block: BlockId, name: &str, args: &[Type], span: Span) -> Result<ProcSignature> {
        self.scope(block).procs.borrow().resolve(name, args, span)
    }

    /// Attach a lowering temporary to an already declared symbol. With
    /// `is_global` the outermost frame is targeted directly instead of the
    /// innermost binding.
    pub fn bind_temp(&mut self, block: BlockId, name: &str, temp: &str, is_global: bool, span: Span) -> Result<()> {
        let frame = if is_global {
            self.scope(block).chain.first().copied()
        } else {
            self.find(block, name)
        };
        let record = frame
            .and_then(|frame| self.frames[frame.0].symbols.get_mut(name))
            .ok_or_else(|| Error::UndefinedSymbol {
                name: name.to_string(),
                span,
            })?;
        if record.temp.is_some() {
            return Err(Error::TemporaryAlreadyBound {
                name: name.to_string(),
                span,
            });
        }
        trace!("bind {} -> {}", name, temp);
        record.temp = Some(temp.to_string());
        Ok(())
    }

    /// The temporary bound to the innermost binding of `name`
    pub fn temp(&self, block: BlockId, name: &str, span: Span) -> Result<&str> {
        self.lookup_var(block, name, span)?
            .temp
            .as_deref()
            .ok_or_else(|| Error::TemporaryUnbound {
                name: name.to_string(),
                span,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GLOBAL: BlockId = BlockId::GLOBAL;

    fn arena() -> ScopeArena {
        let mut arena = ScopeArena::new();
        arena.enter_root(GLOBAL, ProcTable::new_handle());
        arena
    }

    fn sig(params: Vec<Type>, ret: Type) -> ProcSignature {
        ProcSignature::new(params, ret)
    }

    #[test]
    fn test_shadowing_in_nested_block() {
        let mut arena = arena();
        let outer = BlockId(1);
        let inner = BlockId(2);
        arena.enter_block(GLOBAL, outer);
        arena.declare_var(outer, "x", Type::Int, Span::dummy()).unwrap();
        arena.enter_block(outer, inner);
        arena.declare_var(inner, "x", Type::Bool, Span::dummy()).unwrap();

        assert_eq!(arena.lookup_var(inner, "x", Span::dummy()).unwrap().ty, Type::Bool);
        // Outer binding untouched and visible again from the outer block
        assert_eq!(arena.lookup_var(outer, "x", Span::dummy()).unwrap().ty, Type::Int);
        assert_eq!(arena.depth(inner), 3);
    }

    #[test]
    fn test_duplicate_in_same_frame() {
        let mut arena = arena();
        arena.declare_var(GLOBAL, "x", Type::Int, Span::dummy()).unwrap();
        let err = arena.declare_var(GLOBAL, "x", Type::Int, Span::dummy()).unwrap_err();
        assert!(matches!(err, Error::DuplicateSymbol { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_child_declarations_stay_in_child() {
        let mut arena = arena();
        let child = BlockId(1);
        arena.enter_block(GLOBAL, child);
        arena.declare_var(child, "local", Type::Int, Span::dummy()).unwrap();
        assert!(arena.lookup_var(GLOBAL, "local", Span::dummy()).is_err());

        // A sibling entered later does not see it either
        let sibling = BlockId(2);
        arena.enter_block(GLOBAL, sibling);
        assert!(matches!(
            arena.lookup_var(sibling, "local", Span::new(0, 0, 9, 1)),
            Err(Error::UndefinedSymbol { span, .. }) if span.line == 9
        ));
    }

    #[test]
    fn test_outer_declarations_after_entry_are_visible() {
        let mut arena = arena();
        let child = BlockId(1);
        arena.enter_block(GLOBAL, child);
        arena.declare_var(GLOBAL, "late", Type::Int, Span::dummy()).unwrap();
        assert_eq!(arena.lookup_var(child, "late", Span::dummy()).unwrap().ty, Type::Int);
    }

    #[test]
    fn test_overloads_by_parameter_list() {
        let arena = arena();
        let sp = Span::dummy();
        arena.declare_proc(GLOBAL, "f", sig(vec![Type::Int], Type::Void), sp).unwrap();
        arena.declare_proc(GLOBAL, "f", sig(vec![Type::Int, Type::Int], Type::Void), sp).unwrap();
        let err = arena.declare_proc(GLOBAL, "f", sig(vec![Type::Int], Type::Bool), sp).unwrap_err();
        assert!(matches!(err, Error::DuplicateProcedure { ref params, .. } if params == "int"));

        let table = arena.procs(GLOBAL);
        assert_eq!(table.borrow().overloads("f").len(), 2);
    }

    #[test]
    fn test_call_resolution_is_exact() {
        let arena = arena();
        let sp = Span::dummy();
        arena.declare_proc(GLOBAL, "f", sig(vec![Type::Int], Type::Bool), sp).unwrap();

        assert_eq!(arena.resolve_call(GLOBAL, "f", &[Type::Int], sp).unwrap().ret, Type::Bool);

        let err = arena.resolve_call(GLOBAL, "f", &[Type::Bool], sp).unwrap_err();
        assert!(matches!(err, Error::CallMismatch { ref args, .. } if args == "bool"));

        // Arity alone never matches
        let err = arena.resolve_call(GLOBAL, "f", &[Type::Int, Type::Int], sp).unwrap_err();
        assert!(matches!(err, Error::CallMismatch { .. }));

        let err = arena.resolve_call(GLOBAL, "g", &[], sp).unwrap_err();
        assert!(matches!(err, Error::UndefinedSymbol { ref name, .. } if name == "g"));
    }

    #[test]
    fn test_no_widening_from_null() {
        let arena = arena();
        let sp = Span::dummy();
        arena.declare_proc(GLOBAL, "p", sig(vec![Type::pointer(Type::Int)], Type::Void), sp).unwrap();
        assert!(arena.resolve_call(GLOBAL, "p", &[Type::Null], sp).is_err());
    }

    #[test]
    fn test_procedure_table_is_shared_across_blocks() {
        let mut arena = arena();
        let a = BlockId(1);
        let b = BlockId(2);
        let nested = BlockId(3);
        arena.enter_block(GLOBAL, a);
        arena.enter_block(GLOBAL, b);
        arena.enter_block(a, nested);

        assert!(Rc::ptr_eq(&arena.procs(a), &arena.procs(b)));
        arena
            .declare_proc(nested, "helper", sig(vec![], Type::Int), Span::dummy())
            .unwrap();
        assert_eq!(arena.resolve_call(b, "helper", &[], Span::dummy()).unwrap().ret, Type::Int);
        assert_eq!(arena.resolve_call(GLOBAL, "helper", &[], Span::dummy()).unwrap().ret, Type::Int);
    }

    #[test]
    fn test_temporaries_are_write_once() {
        let mut arena = arena();
        let child = BlockId(1);
        arena.enter_block(GLOBAL, child);
        arena.declare_var(child, "x", Type::Int, Span::dummy()).unwrap();

        assert!(matches!(
            arena.temp(child, "x", Span::dummy()),
            Err(Error::TemporaryUnbound { .. })
        ));
        arena.bind_temp(child, "x", "%0", false, Span::dummy()).unwrap();
        assert_eq!(arena.temp(child, "x", Span::dummy()).unwrap(), "%0");

        let err = arena.bind_temp(child, "x", "%1", false, Span::dummy()).unwrap_err();
        assert!(matches!(err, Error::TemporaryAlreadyBound { .. }));

        assert!(matches!(
            arena.bind_temp(child, "nope", "%2", false, Span::dummy()),
            Err(Error::UndefinedSymbol { .. })
        ));
    }

    #[test]
    fn test_global_binding_bypasses_shadowing() {
        let mut arena = arena();
        let child = BlockId(1);
        arena.declare_var(GLOBAL, "g", Type::Int, Span::dummy()).unwrap();
        arena.enter_block(GLOBAL, child);
        arena.declare_var(child, "g", Type::Bool, Span::dummy()).unwrap();

        // Targets the global frame even though the child shadows `g`
        arena.bind_temp(child, "g", "@g", true, Span::dummy()).unwrap();
        assert_eq!(arena.temp(GLOBAL, "g", Span::dummy()).unwrap(), "@g");
        assert!(arena.temp(child, "g", Span::dummy()).is_err());

        // Only globals can be bound that way
        arena.declare_var(child, "local", Type::Int, Span::dummy()).unwrap();
        assert!(matches!(
            arena.bind_temp(child, "local", "@l", true, Span::dummy()),
            Err(Error::UndefinedSymbol { .. })
        ));
    }

    #[test]
    fn test_global_temporaries_are_write_once() {
        let sp = Span::dummy();
        let already_bound = |r: Result<()>| matches!(r, Err(Error::TemporaryAlreadyBound { .. }));

        // global, then global
        let mut first = arena();
        first.declare_var(GLOBAL, "g", Type::Int, sp).unwrap();
        let child = BlockId(1);
        first.enter_block(GLOBAL, child);
        first.bind_temp(child, "g", "@g", true, sp).unwrap();
        assert!(already_bound(first.bind_temp(child, "g", "@g2", true, sp)));

        // global, then local: the child does not shadow `g`, so both hit the same record
        assert!(already_bound(first.bind_temp(child, "g", "%g", false, sp)));
        assert_eq!(first.temp(child, "g", sp).unwrap(), "@g");

        // local, then global
        let mut second = arena();
        second.declare_var(GLOBAL, "g", Type::Int, sp).unwrap();
        second.enter_block(GLOBAL, child);
        second.bind_temp(child, "g", "%g", false, sp).unwrap();
        assert!(already_bound(second.bind_temp(child, "g", "@g", true, sp)));
        assert_eq!(second.temp(GLOBAL, "g", sp).unwrap(), "%g");
    }

    #[test]
    fn test_temporary_on_outer_symbol_is_seen_by_parent() {
        let mut arena = arena();
        let outer = BlockId(1);
        let inner = BlockId(2);
        arena.enter_block(GLOBAL, outer);
        arena.declare_var(outer, "x", Type::Int, Span::dummy()).unwrap();
        arena.enter_block(outer, inner);
        arena.bind_temp(inner, "x", "%x", false, Span::dummy()).unwrap();
        assert_eq!(arena.temp(outer, "x", Span::dummy()).unwrap(), "%x");
    }
}

//! Abstract syntax tree produced by the parser and consumed read-only by the
//! metadata visitor and the code emitter.
//!
//! Nodes are arena-allocated (see [`crate::arena`]); the `'a` lifetime tracks
//! the arena's lifetime. Ownership is tree-shaped: a parent's fields hold
//! references into the same arena as its children, and the AST never forms
//! cycles.

pub mod stmt;

pub use stmt::{
    Arg, AssignOp, BinaryOp, BindingKind, Block, DeclTarget, Expr, ForHead, FunctionBody,
    Literal, Param, Program, Stmt, SwitchCase, TypeAnnotation, TypeField, UnaryOp,
};

use crate::arena::Arena;
use crate::ast::{Expr, Stmt};

/// Bundles the arenas the parser allocates AST nodes into.
///
/// A fresh `AstContext` per compilation run means a fresh arena, so two
/// concurrent transpilations never share allocator state (see §5 Reentrancy).
pub struct AstContext<'a> {
    pub exprs: &'a Arena<Expr<'a>>,
    pub stmts: &'a Arena<Stmt<'a>>,
}

impl<'a> AstContext<'a> {
    pub fn new(exprs: &'a Arena<Expr<'a>>, stmts: &'a Arena<Stmt<'a>>) -> Self {
        AstContext { exprs, stmts }
    }

    pub fn alloc_expr(&self, expr: Expr<'a>) -> &'a Expr<'a> {
        self.exprs.alloc(expr)
    }

    pub fn alloc_stmt(&self, stmt: Stmt<'a>) -> &'a Stmt<'a> {
        self.stmts.alloc(stmt)
    }

    pub fn alloc_block<I>(&self, stmts: I) -> &'a [Stmt<'a>]
    where
        I: IntoIterator<Item = Stmt<'a>>,
        I::IntoIter: ExactSizeIterator,
    {
        self.stmts.alloc_slice(stmts)
    }
}

impl<'a> Clone for AstContext<'a> {
    fn clone(&self) -> Self {
        AstContext { exprs: self.exprs, stmts: self.stmts }
    }
}

impl<'a> Copy for AstContext<'a> {}

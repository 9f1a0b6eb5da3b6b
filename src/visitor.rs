//! Shared read-only AST traversal.
//!
//! The metadata visitor (`analysis::discovery`) and the dependency-graph
//! builder both need to walk expressions the same way; `walk_expr` centralizes
//! that traversal so each caller only implements the node kinds it cares
//! about.

use crate::ast::{Arg, Expr, Stmt};

pub trait Visitor<'a>: Sized {
    fn visit_expr(&mut self, expr: &'a Expr<'a>) {
        walk_expr(self, expr);
    }

    fn visit_stmt(&mut self, stmt: &'a Stmt<'a>) {
        walk_stmt(self, stmt);
    }
}

pub fn walk_expr<'a, V: Visitor<'a>>(v: &mut V, expr: &'a Expr<'a>) {
    match expr {
        Expr::Literal { .. } | Expr::Identifier { .. } => {}
        Expr::Member { object, .. } => v.visit_expr(object),
        Expr::Index { object, index, .. } => {
            v.visit_expr(object);
            v.visit_expr(index);
        }
        Expr::Call { callee, args, .. } => {
            v.visit_expr(callee);
            for arg in args {
                v.visit_expr(arg.value());
            }
        }
        Expr::Binary { left, right, .. } => {
            v.visit_expr(left);
            v.visit_expr(right);
        }
        Expr::Unary { operand, .. } => v.visit_expr(operand),
        Expr::Conditional { cond, then_expr, else_expr, .. } => {
            v.visit_expr(cond);
            v.visit_expr(then_expr);
            v.visit_expr(else_expr);
        }
        Expr::Assignment { target, value, .. } => {
            v.visit_expr(target);
            v.visit_expr(value);
        }
        Expr::Array { elements, .. } | Expr::Tuple { elements, .. } => {
            for el in elements {
                v.visit_expr(el);
            }
        }
    }
}

pub fn walk_stmt<'a, V: Visitor<'a>>(v: &mut V, stmt: &'a Stmt<'a>) {
    match stmt {
        Stmt::VariableDeclaration { init, .. } => {
            if let Some(init) = init {
                v.visit_expr(init);
            }
        }
        Stmt::FunctionDeclaration { body, .. } => match body {
            crate::ast::FunctionBody::Expr(e) => v.visit_expr(e),
            crate::ast::FunctionBody::Block(block) => {
                for s in *block {
                    v.visit_stmt(s);
                }
            }
        },
        Stmt::TypeDefinition { fields, .. } => {
            for field in fields {
                if let Some(default) = field.default {
                    v.visit_expr(default);
                }
            }
        }
        Stmt::ExpressionStatement { expr, .. } => v.visit_expr(expr),
        Stmt::BlockStatement { body, .. } => {
            for s in *body {
                v.visit_stmt(s);
            }
        }
        Stmt::If { cond, then_branch, else_branch, .. } => {
            v.visit_expr(cond);
            for s in *then_branch {
                v.visit_stmt(s);
            }
            if let Some(else_branch) = else_branch {
                for s in *else_branch {
                    v.visit_stmt(s);
                }
            }
        }
        Stmt::While { cond, body, .. } => {
            v.visit_expr(cond);
            for s in *body {
                v.visit_stmt(s);
            }
        }
        Stmt::For { head, body, .. } => {
            match head {
                crate::ast::ForHead::Range { start, end, .. } => {
                    v.visit_expr(start);
                    v.visit_expr(end);
                }
                crate::ast::ForHead::In { iterable, .. } => v.visit_expr(iterable),
            }
            for s in *body {
                v.visit_stmt(s);
            }
        }
        Stmt::Switch { discriminant, cases, .. } => {
            if let Some(d) = discriminant {
                v.visit_expr(d);
            }
            for case in cases {
                match case {
                    crate::ast::SwitchCase::Case { test, body } => {
                        v.visit_expr(test);
                        visit_function_body(v, body);
                    }
                    crate::ast::SwitchCase::Default { body } => visit_function_body(v, body),
                }
            }
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                v.visit_expr(value);
            }
        }
        Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Import { .. } => {}
    }
}

fn visit_function_body<'a, V: Visitor<'a>>(v: &mut V, body: &crate::ast::FunctionBody<'a>) {
    match body {
        crate::ast::FunctionBody::Expr(e) => v.visit_expr(e),
        crate::ast::FunctionBody::Block(block) => {
            for s in *block {
                v.visit_stmt(s);
            }
        }
    }
}

/// Collects every call's argument list in source order, used by the
/// metadata visitor's "extract argument by name" lookups.
pub fn find_named_arg<'a, 'b>(args: &'b [Arg<'a>], name: &str, interner: &crate::intern::Interner) -> Option<&'b Expr<'a>> {
    args.iter().find_map(|arg| match arg {
        Arg::Named { name: n, value } if interner.resolve(*n) == name => Some(*value),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;
    use crate::span::Span;

    #[test]
    fn find_named_arg_locates_named_shape() {
        let mut interner = Interner::new();
        let name = interner.intern("title");
        let lit = Expr::Literal { value: crate::ast::Literal::Boolean(true), span: Span::default() };
        let args = vec![Arg::Named { name, value: &lit }];
        let found = find_named_arg(&args, "title", &interner);
        assert!(found.is_some());
        assert!(find_named_arg(&args, "missing", &interner).is_none());
    }
}

use crate::intern::Symbol;
use crate::span::Span;
use crate::token::Operator;

/// A block is a sequence of statements, arena-allocated as a slice.
pub type Block<'a> = &'a [Stmt<'a>];

/// Binding kind for a variable declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Default,
    Var,
    Varip,
    Const,
}

/// Left-hand side of a variable declaration: a single name or a tuple.
#[derive(Debug, Clone)]
pub enum DeclTarget {
    Name(Symbol),
    Tuple(Vec<Symbol>),
}

#[derive(Debug, Clone)]
pub struct TypeAnnotation {
    pub name: Symbol,
    /// Generic type arguments, e.g. `array<float>`.
    pub args: Vec<TypeAnnotation>,
}

#[derive(Debug, Clone)]
pub struct Param<'a> {
    pub name: Symbol,
    pub type_annotation: Option<TypeAnnotation>,
    pub default: Option<&'a Expr<'a>>,
}

#[derive(Debug, Clone)]
pub struct TypeField<'a> {
    pub name: Symbol,
    pub type_annotation: TypeAnnotation,
    pub default: Option<&'a Expr<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub enum FunctionBody<'a> {
    Expr(&'a Expr<'a>),
    Block(Block<'a>),
}

#[derive(Debug, Clone)]
pub enum SwitchCase<'a> {
    /// `pattern => expr_or_block` or, discriminant-less, `condition => expr_or_block`.
    Case { test: &'a Expr<'a>, body: FunctionBody<'a> },
    /// The final `=> expr_or_block` with no test.
    Default { body: FunctionBody<'a> },
}

#[derive(Debug, Clone)]
pub enum ForHead<'a> {
    /// `for i = start to end`
    Range { var: Symbol, start: &'a Expr<'a>, end: &'a Expr<'a> },
    /// `for x in arr` or `for [i, x] in arr`
    In { var: DeclTarget, with_index: bool, index: Option<Symbol>, iterable: &'a Expr<'a> },
}

/// Top-level program: an ordered list of statements.
#[derive(Debug)]
pub struct Program<'a> {
    pub statements: Block<'a>,
}

/// Imperative statement AST node.
#[derive(Debug)]
pub enum Stmt<'a> {
    VariableDeclaration {
        kind: BindingKind,
        target: DeclTarget,
        type_annotation: Option<TypeAnnotation>,
        init: Option<&'a Expr<'a>>,
        exported: bool,
        span: Span,
    },
    FunctionDeclaration {
        name: Symbol,
        params: Vec<Param<'a>>,
        generics: Vec<Symbol>,
        body: FunctionBody<'a>,
        exported: bool,
        span: Span,
    },
    TypeDefinition {
        name: Symbol,
        fields: Vec<TypeField<'a>>,
        exported: bool,
        span: Span,
    },
    ExpressionStatement {
        expr: &'a Expr<'a>,
        span: Span,
    },
    BlockStatement {
        body: Block<'a>,
        span: Span,
    },
    If {
        cond: &'a Expr<'a>,
        then_branch: Block<'a>,
        else_branch: Option<Block<'a>>,
        span: Span,
    },
    While {
        cond: &'a Expr<'a>,
        body: Block<'a>,
        span: Span,
    },
    For {
        head: ForHead<'a>,
        body: Block<'a>,
        span: Span,
    },
    Switch {
        discriminant: Option<&'a Expr<'a>>,
        cases: Vec<SwitchCase<'a>>,
        span: Span,
    },
    Return {
        value: Option<&'a Expr<'a>>,
        span: Span,
    },
    Break {
        span: Span,
    },
    Continue {
        span: Span,
    },
    Import {
        path: Symbol,
        alias: Option<Symbol>,
        span: Span,
    },
}

impl<'a> Stmt<'a> {
    pub fn span(&self) -> Span {
        match self {
            Stmt::VariableDeclaration { span, .. }
            | Stmt::FunctionDeclaration { span, .. }
            | Stmt::TypeDefinition { span, .. }
            | Stmt::ExpressionStatement { span, .. }
            | Stmt::BlockStatement { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Switch { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Break { span }
            | Stmt::Continue { span }
            | Stmt::Import { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Walrus,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
}

impl AssignOp {
    pub fn from_operator(op: Operator) -> Option<AssignOp> {
        Some(match op {
            Operator::Assign => AssignOp::Assign,
            Operator::Walrus => AssignOp::Walrus,
            Operator::PlusEq => AssignOp::AddAssign,
            Operator::MinusEq => AssignOp::SubAssign,
            Operator::StarEq => AssignOp::MulAssign,
            Operator::SlashEq => AssignOp::DivAssign,
            Operator::PercentEq => AssignOp::ModAssign,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone)]
pub enum Literal {
    Number(Symbol),
    String(Symbol),
    Boolean(bool),
    Color(Symbol),
    Na,
}

/// A call argument: positional, or named (`name = value`, represented per the
/// grammar as an assignment-shaped argument rather than a distinct node so
/// that extracting an argument by name is a single shape to match on).
#[derive(Debug)]
pub enum Arg<'a> {
    Positional(&'a Expr<'a>),
    Named { name: Symbol, value: &'a Expr<'a> },
}

impl<'a> Arg<'a> {
    pub fn value(&self) -> &'a Expr<'a> {
        match self {
            Arg::Positional(e) => e,
            Arg::Named { value, .. } => value,
        }
    }
}

/// Pure expression AST node.
#[derive(Debug)]
pub enum Expr<'a> {
    Literal { value: Literal, span: Span },
    Identifier { name: Symbol, span: Span },
    Member {
        object: &'a Expr<'a>,
        property: Symbol,
        computed: bool,
        span: Span,
    },
    /// Historical access `expr[n]` is represented by `Member` with `computed: true`
    /// and an `Index` property expression held out-of-band; see `HistoricalAccess`.
    Index {
        object: &'a Expr<'a>,
        index: &'a Expr<'a>,
        span: Span,
    },
    Call {
        callee: &'a Expr<'a>,
        args: Vec<Arg<'a>>,
        type_args: Vec<TypeAnnotation>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: &'a Expr<'a>,
        span: Span,
    },
    Conditional {
        cond: &'a Expr<'a>,
        then_expr: &'a Expr<'a>,
        else_expr: &'a Expr<'a>,
        span: Span,
    },
    Assignment {
        op: AssignOp,
        target: &'a Expr<'a>,
        value: &'a Expr<'a>,
        span: Span,
    },
    Array {
        elements: Vec<&'a Expr<'a>>,
        span: Span,
    },
    Tuple {
        elements: Vec<&'a Expr<'a>>,
        span: Span,
    },
}

impl<'a> Expr<'a> {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Identifier { span, .. }
            | Expr::Member { span, .. }
            | Expr::Index { span, .. }
            | Expr::Call { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Assignment { span, .. }
            | Expr::Array { span, .. }
            | Expr::Tuple { span, .. } => *span,
        }
    }

    /// The identifier name if this expression is a bare `Identifier`.
    pub fn as_identifier(&self) -> Option<Symbol> {
        match self {
            Expr::Identifier { name, .. } => Some(*name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_op_from_operator_maps_compound_forms() {
        assert_eq!(AssignOp::from_operator(Operator::PlusEq), Some(AssignOp::AddAssign));
        assert_eq!(AssignOp::from_operator(Operator::Walrus), Some(AssignOp::Walrus));
        assert_eq!(AssignOp::from_operator(Operator::Lt), None);
    }

    #[test]
    fn arg_value_unwraps_named_and_positional() {
        let lit = Expr::Literal { value: Literal::Boolean(true), span: Span::default() };
        let positional = Arg::Positional(&lit);
        assert!(matches!(positional.value(), Expr::Literal { .. }));
    }
}

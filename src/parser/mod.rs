//! Recursive-descent parser with precedence climbing.
//!
//! Precedence rises through assignment, ternary, logical-or, logical-and,
//! equality, comparison, additive, multiplicative, unary, and finally the
//! call/member postfix chain. Each level is its own function so the grammar
//! reads top-down the way the levels are listed here.

pub mod common;

use crate::arena_ctx::AstContext;
use crate::ast::{
    Arg, AssignOp, BinaryOp, BindingKind, Block, DeclTarget, Expr, ForHead, FunctionBody, Literal,
    Param, Program, Stmt, SwitchCase, TypeAnnotation, TypeField, UnaryOp,
};
use crate::error::{CompileError, ParseErrorKind};
use crate::intern::Symbol;
use crate::span::Span;
use crate::token::{Keyword, Operator, Token, TokenKind};
use common::is_assignment_operator;

#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    pub max_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig { max_depth: 1000 }
    }
}

pub struct Parser<'t, 'ast> {
    tokens: &'t [Token],
    pos: usize,
    ctx: AstContext<'ast>,
    config: ParserConfig,
    depth: usize,
    errors: Vec<CompileError>,
}

type PResult<T> = Result<T, CompileError>;

impl<'t, 'ast> Parser<'t, 'ast> {
    pub fn new(tokens: &'t [Token], ctx: AstContext<'ast>, config: ParserConfig) -> Self {
        Parser { tokens, pos: 0, ctx, config, depth: 0, errors: Vec::new() }
    }

    /// Parses the whole token stream strictly: the first error aborts.
    pub fn parse_strict(mut self) -> PResult<Program<'ast>> {
        let statements = self.parse_block_until_eof()?;
        Ok(Program { statements })
    }

    /// Parses the whole token stream in best-effort mode: statements that
    /// fail to parse are skipped up to the next NEWLINE/DEDENT and their
    /// error recorded, so a single mistake doesn't block the whole result.
    pub fn parse_recovering(mut self) -> (Program<'ast>, Vec<CompileError>) {
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.at_eof() && !self.check(&TokenKind::Dedent) {
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(err) => {
                    self.errors.push(err);
                    self.synchronize();
                }
            }
            self.skip_newlines();
        }
        let program = Program { statements: self.ctx.alloc_block(statements) };
        (program, self.errors)
    }

    fn synchronize(&mut self) {
        while !self.at_eof() {
            match self.peek_kind() {
                TokenKind::Newline | TokenKind::Dedent => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // token stream primitives
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(k) if *k == kw)
    }

    fn check_operator(&self, op: Operator) -> bool {
        matches!(self.peek_kind(), TokenKind::Operator(o) if *o == op)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_operator(&mut self, op: Operator) -> bool {
        if self.check_operator(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> PResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let found = crate::error::describe_token(self.peek_kind());
            Err(CompileError::Parse(
                ParseErrorKind::UnexpectedToken { expected, found },
                self.peek().span,
            ))
        }
    }

    fn expect_identifier(&mut self) -> PResult<(Symbol, Span)> {
        match self.peek_kind().clone() {
            TokenKind::Identifier(sym) => {
                let span = self.peek().span;
                self.advance();
                Ok((sym, span))
            }
            _ => Err(CompileError::Parse(
                ParseErrorKind::MissingToken { expected: "identifier" },
                self.peek().span,
            )),
        }
    }

    fn skip_newlines(&mut self) {
        while self.check(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > self.config.max_depth {
            return Err(CompileError::Parse(ParseErrorKind::RecursionLimitExceeded, self.peek().span));
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    fn parse_block_until_eof(&mut self) -> PResult<Block<'ast>> {
        let mut statements = Vec::new();
        self.skip_newlines();
        while !self.at_eof() {
            statements.push(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(self.ctx.alloc_block(statements))
    }

    /// A statement's body: either `stmt` on the same line, or an indented
    /// block introduced by NEWLINE INDENT ... DEDENT.
    fn parse_suite(&mut self) -> PResult<Block<'ast>> {
        if self.eat(&TokenKind::Newline) {
            self.expect(TokenKind::Indent, "indented block")?;
            let mut statements = Vec::new();
            self.skip_newlines();
            while !self.check(&TokenKind::Dedent) && !self.at_eof() {
                statements.push(self.parse_statement()?);
                self.skip_newlines();
            }
            self.expect(TokenKind::Dedent, "end of indented block")?;
            Ok(self.ctx.alloc_block(statements))
        } else {
            let stmt = self.parse_statement()?;
            Ok(self.ctx.alloc_block(vec![stmt]))
        }
    }

    fn parse_statement(&mut self) -> PResult<Stmt<'ast>> {
        self.enter()?;
        let result = self.parse_statement_inner();
        self.exit();
        result
    }

    fn parse_statement_inner(&mut self) -> PResult<Stmt<'ast>> {
        match self.peek_kind().clone() {
            TokenKind::Keyword(Keyword::Var) => {
                self.advance();
                self.parse_variable_declaration(BindingKind::Var, false)
            }
            TokenKind::Keyword(Keyword::Varip) => {
                self.advance();
                self.parse_variable_declaration(BindingKind::Varip, false)
            }
            TokenKind::Keyword(Keyword::Const) => {
                self.advance();
                self.parse_variable_declaration(BindingKind::Const, false)
            }
            TokenKind::Keyword(Keyword::Export) => {
                self.advance();
                self.parse_exported_statement()
            }
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Switch) => self.parse_switch(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => {
                let span = self.peek().span;
                self.advance();
                Ok(Stmt::Break { span })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let span = self.peek().span;
                self.advance();
                Ok(Stmt::Continue { span })
            }
            TokenKind::Keyword(Keyword::Import) => self.parse_import(),
            TokenKind::Keyword(Keyword::Type) => self.parse_type_definition(false),
            _ => self.parse_declaration_or_expression_statement(),
        }
    }

    fn parse_exported_statement(&mut self) -> PResult<Stmt<'ast>> {
        match self.peek_kind().clone() {
            TokenKind::Keyword(Keyword::Var) => {
                self.advance();
                self.parse_variable_declaration(BindingKind::Var, true)
            }
            TokenKind::Keyword(Keyword::Varip) => {
                self.advance();
                self.parse_variable_declaration(BindingKind::Varip, true)
            }
            TokenKind::Keyword(Keyword::Const) => {
                self.advance();
                self.parse_variable_declaration(BindingKind::Const, true)
            }
            TokenKind::Keyword(Keyword::Type) => self.parse_type_definition(true),
            _ => self.parse_function_declaration(true),
        }
    }

    /// Attempts `[type] name = expr` / `[a, b] = expr`; falls back to a bare
    /// expression statement (which covers calls and compound assignment,
    /// since `+=`/`:=` are handled inside the expression grammar).
    fn parse_declaration_or_expression_statement(&mut self) -> PResult<Stmt<'ast>> {
        if self.looks_like_function_declaration() {
            return self.parse_function_declaration(false);
        }
        let checkpoint = self.pos;
        if let Some(stmt) = self.try_parse_variable_declaration_default()? {
            return Ok(stmt);
        }
        self.pos = checkpoint;
        let start = self.peek().span;
        let expr = self.parse_expression()?;
        let span = start.merge(expr.span());
        Ok(Stmt::ExpressionStatement { expr: self.ctx.alloc_expr(expr), span })
    }

    /// `name(params) => body` or `name(params)\n    body`.
    fn looks_like_function_declaration(&self) -> bool {
        if !matches!(self.peek_kind(), TokenKind::Identifier(_)) {
            return false;
        }
        if !matches!(self.peek_at(1), TokenKind::LParen) {
            return false;
        }
        let mut depth = 0usize;
        let mut i = 1;
        loop {
            match self.peek_at(i) {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        // A declaration either has an `=>` expression body, or a
                        // block body (NEWLINE immediately followed by INDENT).
                        // A bare call statement's NEWLINE is followed by another
                        // statement at the same indent level, not an INDENT.
                        return matches!(self.peek_at(i + 1), TokenKind::Operator(Operator::FatArrow))
                            || (matches!(self.peek_at(i + 1), TokenKind::Newline)
                                && matches!(self.peek_at(i + 2), TokenKind::Indent));
                    }
                }
                TokenKind::Eof | TokenKind::Newline => return false,
                _ => {}
            }
            i += 1;
            if i > 64 {
                return false;
            }
        }
    }

    fn try_parse_variable_declaration_default(&mut self) -> PResult<Option<Stmt<'ast>>> {
        let start_span = self.peek().span;
        if self.check(&TokenKind::LBracket) {
            // tuple destructuring target
            let save = self.pos;
            if let Ok(target) = self.try_parse_tuple_target() {
                if self.eat_operator(Operator::Assign) {
                    let init = self.parse_expression()?;
                    let span = start_span.merge(init.span());
                    return Ok(Some(Stmt::VariableDeclaration {
                        kind: BindingKind::Default,
                        target,
                        type_annotation: None,
                        init: Some(self.ctx.alloc_expr(init)),
                        exported: false,
                        span,
                    }));
                }
            }
            self.pos = save;
            return Ok(None);
        }

        if !matches!(self.peek_kind(), TokenKind::Identifier(_)) {
            return Ok(None);
        }

        // `name = expr`
        if matches!(self.peek_at(1), TokenKind::Operator(Operator::Assign)) {
            let (name, _) = self.expect_identifier()?;
            self.advance(); // '='
            let init = self.parse_expression()?;
            let span = start_span.merge(init.span());
            return Ok(Some(Stmt::VariableDeclaration {
                kind: BindingKind::Default,
                target: DeclTarget::Name(name),
                type_annotation: None,
                init: Some(self.ctx.alloc_expr(init)),
                exported: false,
                span,
            }));
        }

        // `TypeName name = expr`
        if matches!(self.peek_at(1), TokenKind::Identifier(_))
            && matches!(self.peek_at(2), TokenKind::Operator(Operator::Assign))
        {
            let type_annotation = self.parse_type_annotation()?;
            let (name, _) = self.expect_identifier()?;
            self.advance(); // '='
            let init = self.parse_expression()?;
            let span = start_span.merge(init.span());
            return Ok(Some(Stmt::VariableDeclaration {
                kind: BindingKind::Default,
                target: DeclTarget::Name(name),
                type_annotation: Some(type_annotation),
                init: Some(self.ctx.alloc_expr(init)),
                exported: false,
                span,
            }));
        }

        Ok(None)
    }

    fn try_parse_tuple_target(&mut self) -> PResult<DeclTarget> {
        self.expect(TokenKind::LBracket, "'['")?;
        let mut names = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                let (name, _) = self.expect_identifier()?;
                names.push(name);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(DeclTarget::Tuple(names))
    }

    fn parse_variable_declaration(&mut self, kind: BindingKind, exported: bool) -> PResult<Stmt<'ast>> {
        let start_span = self.peek().span;
        let type_annotation = if matches!(self.peek_kind(), TokenKind::Identifier(_))
            && matches!(self.peek_at(1), TokenKind::Identifier(_))
        {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let target = if self.check(&TokenKind::LBracket) {
            self.try_parse_tuple_target()?
        } else {
            let (name, _) = self.expect_identifier()?;
            DeclTarget::Name(name)
        };
        let init = if self.eat_operator(Operator::Assign) || self.eat_operator(Operator::Walrus) {
            Some(self.ctx.alloc_expr(self.parse_expression()?))
        } else {
            None
        };
        let span = match init {
            Some(e) => start_span.merge(e.span()),
            None => start_span,
        };
        Ok(Stmt::VariableDeclaration { kind, target, type_annotation, init, exported, span })
    }

    fn parse_type_annotation(&mut self) -> PResult<TypeAnnotation> {
        let (name, _) = self.expect_identifier()?;
        let mut args = Vec::new();
        if self.eat_operator(Operator::Lt) {
            loop {
                args.push(self.parse_type_annotation()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.eat_operator(Operator::Gt);
        }
        Ok(TypeAnnotation { name, args })
    }

    fn parse_type_definition(&mut self, exported: bool) -> PResult<Stmt<'ast>> {
        let start_span = self.peek().span;
        self.expect(TokenKind::Keyword(Keyword::Type), "'type'")?;
        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::Newline, "newline")?;
        self.expect(TokenKind::Indent, "indented type body")?;
        let mut fields = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::Dedent) && !self.at_eof() {
            let type_annotation = self.parse_type_annotation()?;
            let (field_name, _) = self.expect_identifier()?;
            let default = if self.eat_operator(Operator::Assign) {
                Some(self.ctx.alloc_expr(self.parse_expression()?))
            } else {
                None
            };
            fields.push(TypeField { name: field_name, type_annotation, default });
            self.skip_newlines();
        }
        let end_span = self.peek().span;
        self.expect(TokenKind::Dedent, "end of type body")?;
        Ok(Stmt::TypeDefinition { name, fields, exported, span: start_span.merge(end_span) })
    }

    fn parse_function_declaration(&mut self, exported: bool) -> PResult<Stmt<'ast>> {
        let start_span = self.peek().span;
        let (name, _) = self.expect_identifier()?;
        let mut generics = Vec::new();
        if self.eat_operator(Operator::Lt) {
            loop {
                let (g, _) = self.expect_identifier()?;
                generics.push(g);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.eat_operator(Operator::Gt);
        }
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let type_annotation = if matches!(self.peek_kind(), TokenKind::Identifier(_))
                    && matches!(self.peek_at(1), TokenKind::Identifier(_))
                {
                    Some(self.parse_type_annotation()?)
                } else {
                    None
                };
                let (pname, _) = self.expect_identifier()?;
                let default = if self.eat_operator(Operator::Assign) {
                    Some(self.ctx.alloc_expr(self.parse_expression()?))
                } else {
                    None
                };
                params.push(Param { name: pname, type_annotation, default });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        self.eat_operator(Operator::FatArrow);
        let body = if self.check(&TokenKind::Newline) {
            FunctionBody::Block(self.parse_suite()?)
        } else {
            FunctionBody::Expr(self.ctx.alloc_expr(self.parse_expression()?))
        };
        Ok(Stmt::FunctionDeclaration {
            name,
            params,
            generics,
            body,
            exported,
            span: start_span,
        })
    }

    fn parse_if(&mut self) -> PResult<Stmt<'ast>> {
        let start_span = self.peek().span;
        self.expect(TokenKind::Keyword(Keyword::If), "'if'")?;
        let cond = self.ctx.alloc_expr(self.parse_expression()?);
        let then_branch = self.parse_suite()?;
        // `else` follows the block's DEDENT directly, so the cursor is
        // already positioned right at it if present — no lookahead needed.
        let else_branch = if self.eat_keyword(Keyword::Else) {
            if self.check_keyword(Keyword::If) {
                Some(self.ctx.alloc_block(vec![self.parse_if()?]))
            } else {
                Some(self.parse_suite()?)
            }
        } else {
            None
        };
        Ok(Stmt::If { cond, then_branch, else_branch, span: start_span })
    }

    fn parse_while(&mut self) -> PResult<Stmt<'ast>> {
        let start_span = self.peek().span;
        self.expect(TokenKind::Keyword(Keyword::While), "'while'")?;
        let cond = self.ctx.alloc_expr(self.parse_expression()?);
        let body = self.parse_suite()?;
        Ok(Stmt::While { cond, body, span: start_span })
    }

    fn parse_for(&mut self) -> PResult<Stmt<'ast>> {
        let start_span = self.peek().span;
        self.expect(TokenKind::Keyword(Keyword::For), "'for'")?;

        let head = if self.check(&TokenKind::LBracket) {
            self.expect(TokenKind::LBracket, "'['")?;
            let (index_name, _) = self.expect_identifier()?;
            self.expect(TokenKind::Comma, "','")?;
            let (val, _) = self.expect_identifier()?;
            self.expect(TokenKind::RBracket, "']'")?;
            self.expect(TokenKind::Keyword(Keyword::In), "'in'")?;
            let iterable = self.ctx.alloc_expr(self.parse_expression()?);
            ForHead::In { var: DeclTarget::Name(val), with_index: true, index: Some(index_name), iterable }
        } else {
            let (var, _) = self.expect_identifier()?;
            if self.eat_keyword(Keyword::In) {
                let iterable = self.ctx.alloc_expr(self.parse_expression()?);
                ForHead::In { var: DeclTarget::Name(var), with_index: false, index: None, iterable }
            } else {
                self.expect(TokenKind::Operator(Operator::Assign), "'='")?;
                let start = self.ctx.alloc_expr(self.parse_expression()?);
                self.expect(TokenKind::Keyword(Keyword::To), "'to'")?;
                let end = self.ctx.alloc_expr(self.parse_expression()?);
                ForHead::Range { var, start, end }
            }
        };

        let body = self.parse_suite()?;
        Ok(Stmt::For { head, body, span: start_span })
    }

    fn parse_switch(&mut self) -> PResult<Stmt<'ast>> {
        let start_span = self.peek().span;
        self.expect(TokenKind::Keyword(Keyword::Switch), "'switch'")?;
        let discriminant = if self.check(&TokenKind::Newline) {
            None
        } else {
            Some(self.ctx.alloc_expr(self.parse_expression()?))
        };
        self.expect(TokenKind::Newline, "newline")?;
        self.expect(TokenKind::Indent, "indented switch body")?;
        let mut cases = Vec::new();
        self.skip_newlines();
        while !self.check(&TokenKind::Dedent) && !self.at_eof() {
            if self.eat_operator(Operator::FatArrow) {
                let body = self.parse_case_body()?;
                cases.push(SwitchCase::Default { body });
            } else {
                let test = self.ctx.alloc_expr(self.parse_expression()?);
                self.expect(TokenKind::Operator(Operator::FatArrow), "'=>'")?;
                let body = self.parse_case_body()?;
                cases.push(SwitchCase::Case { test, body });
            }
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent, "end of switch body")?;
        Ok(Stmt::Switch { discriminant, cases, span: start_span })
    }

    fn parse_case_body(&mut self) -> PResult<FunctionBody<'ast>> {
        if self.check(&TokenKind::Newline) {
            Ok(FunctionBody::Block(self.parse_suite()?))
        } else {
            Ok(FunctionBody::Expr(self.ctx.alloc_expr(self.parse_expression()?)))
        }
    }

    fn parse_return(&mut self) -> PResult<Stmt<'ast>> {
        let start_span = self.peek().span;
        self.expect(TokenKind::Keyword(Keyword::Return), "'return'")?;
        let value = if self.check(&TokenKind::Newline) || self.check(&TokenKind::Dedent) || self.at_eof() {
            None
        } else {
            Some(self.ctx.alloc_expr(self.parse_expression()?))
        };
        Ok(Stmt::Return { value, span: start_span })
    }

    fn parse_import(&mut self) -> PResult<Stmt<'ast>> {
        let start_span = self.peek().span;
        self.expect(TokenKind::Keyword(Keyword::Import), "'import'")?;
        let (path, _) = self.expect_identifier()?;
        let alias = if self.eat_keyword(Keyword::As) {
            Some(self.expect_identifier()?.0)
        } else {
            None
        };
        Ok(Stmt::Import { path, alias, span: start_span })
    }

    // ------------------------------------------------------------------
    // expressions, by ascending precedence
    // ------------------------------------------------------------------

    pub fn parse_expression(&mut self) -> PResult<Expr<'ast>> {
        self.enter()?;
        let result = self.parse_assignment();
        self.exit();
        result
    }

    fn parse_assignment(&mut self) -> PResult<Expr<'ast>> {
        let target = self.parse_ternary()?;
        if let TokenKind::Operator(op) = *self.peek_kind() {
            if is_assignment_operator(op) {
                self.advance();
                let value = self.parse_assignment()?;
                let span = target.span().merge(value.span());
                return Ok(Expr::Assignment {
                    op: AssignOp::from_operator(op).unwrap(),
                    target: self.ctx.alloc_expr(target),
                    value: self.ctx.alloc_expr(value),
                    span,
                });
            }
        }
        Ok(target)
    }

    fn parse_ternary(&mut self) -> PResult<Expr<'ast>> {
        let cond = self.parse_logical_or()?;
        if self.eat_operator(Operator::Question) {
            let then_expr = self.parse_ternary()?;
            self.expect(TokenKind::Colon, "':'")?;
            let else_expr = self.parse_ternary()?;
            let span = cond.span().merge(else_expr.span());
            return Ok(Expr::Conditional {
                cond: self.ctx.alloc_expr(cond),
                then_expr: self.ctx.alloc_expr(then_expr),
                else_expr: self.ctx.alloc_expr(else_expr),
                span,
            });
        }
        Ok(cond)
    }

    fn parse_logical_or(&mut self) -> PResult<Expr<'ast>> {
        let mut left = self.parse_logical_and()?;
        while self.check_operator(Operator::Or) {
            self.advance();
            let right = self.parse_logical_and()?;
            left = self.binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> PResult<Expr<'ast>> {
        let mut left = self.parse_equality()?;
        while self.check_operator(Operator::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = self.binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr<'ast>> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Operator(Operator::EqEq) => BinaryOp::Eq,
                TokenKind::Operator(Operator::NotEq) => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> PResult<Expr<'ast>> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Operator(Operator::Lt) => BinaryOp::Lt,
                TokenKind::Operator(Operator::Gt) => BinaryOp::Gt,
                TokenKind::Operator(Operator::LtEq) => BinaryOp::LtEq,
                TokenKind::Operator(Operator::GtEq) => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr<'ast>> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Operator(Operator::Plus) => BinaryOp::Add,
                TokenKind::Operator(Operator::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr<'ast>> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Operator(Operator::Star) => BinaryOp::Mul,
                TokenKind::Operator(Operator::Slash) => BinaryOp::Div,
                TokenKind::Operator(Operator::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr<'ast>> {
        let op = match self.peek_kind() {
            TokenKind::Operator(Operator::Minus) => Some(UnaryOp::Neg),
            TokenKind::Operator(Operator::Plus) => Some(UnaryOp::Plus),
            TokenKind::Operator(Operator::Not) => Some(UnaryOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.peek().span;
            self.advance();
            let operand = self.parse_unary()?;
            let span = start.merge(operand.span());
            return Ok(Expr::Unary { op, operand: self.ctx.alloc_expr(operand), span });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr<'ast>> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let (property, prop_span) = self.expect_identifier()?;
                let span = expr.span().merge(prop_span);
                expr = Expr::Member {
                    object: self.ctx.alloc_expr(expr),
                    property,
                    computed: false,
                    span,
                };
                continue;
            }
            if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let end_span = self.peek().span;
                self.expect(TokenKind::RBracket, "']'")?;
                let span = expr.span().merge(end_span);
                expr = Expr::Index {
                    object: self.ctx.alloc_expr(expr),
                    index: self.ctx.alloc_expr(index),
                    span,
                };
                continue;
            }
            if self.check_operator(Operator::Lt) {
                if let Some(type_args) = self.try_parse_generic_args() {
                    if self.check(&TokenKind::LParen) {
                        let (args, end_span) = self.parse_call_args()?;
                        let span = expr.span().merge(end_span);
                        expr = Expr::Call {
                            callee: self.ctx.alloc_expr(expr),
                            args,
                            type_args,
                            span,
                        };
                        continue;
                    }
                }
            }
            if self.check(&TokenKind::LParen) {
                let (args, end_span) = self.parse_call_args()?;
                let span = expr.span().merge(end_span);
                expr = Expr::Call {
                    callee: self.ctx.alloc_expr(expr),
                    args,
                    type_args: Vec::new(),
                    span,
                };
                continue;
            }
            break;
        }
        Ok(expr)
    }

    /// Bounded-lookahead disambiguation between `a < b` and a generic call
    /// `f<T>(...)`: tentatively parses a type-argument list and rolls back
    /// unless it's immediately followed by `(`.
    fn try_parse_generic_args(&mut self) -> Option<Vec<TypeAnnotation>> {
        let save = self.pos;
        if !self.eat_operator(Operator::Lt) {
            return None;
        }
        let mut args = Vec::new();
        loop {
            match self.parse_type_annotation() {
                Ok(t) => args.push(t),
                Err(_) => {
                    self.pos = save;
                    return None;
                }
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if !self.eat_operator(Operator::Gt) {
            self.pos = save;
            return None;
        }
        if !self.check(&TokenKind::LParen) {
            self.pos = save;
            return None;
        }
        Some(args)
    }

    fn parse_call_args(&mut self) -> PResult<(Vec<Arg<'ast>>, Span)> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                if matches!(self.peek_kind(), TokenKind::Identifier(_))
                    && matches!(self.peek_at(1), TokenKind::Operator(Operator::Assign))
                {
                    let (name, _) = self.expect_identifier()?;
                    self.advance(); // '='
                    let value = self.ctx.alloc_expr(self.parse_expression()?);
                    args.push(Arg::Named { name, value });
                } else {
                    let value = self.ctx.alloc_expr(self.parse_expression()?);
                    args.push(Arg::Positional(value));
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end_span = self.peek().span;
        self.expect(TokenKind::RParen, "')'")?;
        Ok((args, end_span))
    }

    fn parse_primary(&mut self) -> PResult<Expr<'ast>> {
        let span = self.peek().span;
        match self.peek_kind().clone() {
            TokenKind::Number(sym) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Number(sym), span })
            }
            TokenKind::String(sym) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::String(sym), span })
            }
            TokenKind::Boolean(b) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Boolean(b), span })
            }
            TokenKind::Color(sym) => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Color(sym), span })
            }
            TokenKind::Na => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Na, span })
            }
            TokenKind::Identifier(sym) => {
                self.advance();
                Ok(Expr::Identifier { name: sym, span })
            }
            TokenKind::LParen => self.parse_paren_or_tuple(),
            TokenKind::LBracket => self.parse_array_literal(),
            _ => {
                let found = crate::error::describe_token(self.peek_kind());
                Err(CompileError::Parse(
                    ParseErrorKind::UnexpectedToken { expected: "an expression", found },
                    span,
                ))
            }
        }
    }

    fn parse_paren_or_tuple(&mut self) -> PResult<Expr<'ast>> {
        let start_span = self.peek().span;
        self.expect(TokenKind::LParen, "'('")?;
        let first = self.parse_expression()?;
        if self.eat(&TokenKind::Comma) {
            let mut elements = vec![self.ctx.alloc_expr(first)];
            if !self.check(&TokenKind::RParen) {
                loop {
                    elements.push(self.ctx.alloc_expr(self.parse_expression()?));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
            }
            let end_span = self.peek().span;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(Expr::Tuple { elements, span: start_span.merge(end_span) });
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(first)
    }

    fn parse_array_literal(&mut self) -> PResult<Expr<'ast>> {
        let start_span = self.peek().span;
        self.expect(TokenKind::LBracket, "'['")?;
        let mut elements = Vec::new();
        if !self.check(&TokenKind::RBracket) {
            loop {
                elements.push(self.ctx.alloc_expr(self.parse_expression()?));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let end_span = self.peek().span;
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(Expr::Array { elements, span: start_span.merge(end_span) })
    }

    fn binary(&mut self, op: BinaryOp, left: Expr<'ast>, right: Expr<'ast>) -> Expr<'ast> {
        let span = left.span().merge(right.span());
        Expr::Binary {
            op,
            left: self.ctx.alloc_expr(left),
            right: self.ctx.alloc_expr(right),
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Result<Program<'static>, CompileError> {
        let (tokens, _interner) = Lexer::new(source).tokenize().unwrap();
        let tokens: &'static [Token] = Box::leak(tokens.into_boxed_slice());
        let exprs: &'static Arena<Expr<'static>> = Box::leak(Box::new(Arena::new()));
        let stmts: &'static Arena<Stmt<'static>> = Box::leak(Box::new(Arena::new()));
        let ctx = AstContext::new(exprs, stmts);
        Parser::new(tokens, ctx, ParserConfig::default()).parse_strict()
    }

    #[test]
    fn parses_simple_assignment() {
        let program = parse("x = 1 + 2").unwrap();
        assert_eq!(program.statements.len(), 1);
        assert!(matches!(program.statements[0], Stmt::VariableDeclaration { .. }));
    }

    #[test]
    fn parses_if_with_block_body() {
        let program = parse("if x > 0\n    y = 1\nz = 2").unwrap();
        assert_eq!(program.statements.len(), 2);
        assert!(matches!(program.statements[0], Stmt::If { .. }));
    }

    #[test]
    fn parses_compound_assignment_as_expression_statement() {
        let program = parse("x += 1").unwrap();
        match &program.statements[0] {
            Stmt::ExpressionStatement { expr, .. } => {
                assert!(matches!(expr, Expr::Assignment { .. }));
            }
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn parses_call_with_named_argument() {
        let program = parse("plot(close, title = \"x\")").unwrap();
        match &program.statements[0] {
            Stmt::ExpressionStatement { expr: Expr::Call { args, .. }, .. } => {
                assert_eq!(args.len(), 2);
                assert!(matches!(args[1], Arg::Named { .. }));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn parses_ternary_expression() {
        let program = parse("x = a > 0 ? 1 : -1").unwrap();
        match &program.statements[0] {
            Stmt::VariableDeclaration { init: Some(Expr::Conditional { .. }), .. } => {}
            other => panic!("expected conditional init, got {:?}", other),
        }
    }

    #[test]
    fn parses_for_range_loop() {
        let program = parse("for i = 0 to 10\n    x = i").unwrap();
        match &program.statements[0] {
            Stmt::For { head: ForHead::Range { .. }, .. } => {}
            other => panic!("expected range for, got {:?}", other),
        }
    }

    #[test]
    fn parses_for_in_loop_with_index() {
        let program = parse("for [i, v] in arr\n    x = v").unwrap();
        match &program.statements[0] {
            Stmt::For { head: ForHead::In { with_index: true, index: Some(_), .. }, .. } => {}
            other => panic!("expected indexed for-in with a captured index symbol, got {:?}", other),
        }
    }

    #[test]
    fn parses_switch_with_discriminant() {
        let program = parse("switch x\n    1 => y = 1\n    => y = 2").unwrap();
        match &program.statements[0] {
            Stmt::Switch { discriminant: Some(_), cases, .. } => assert_eq!(cases.len(), 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn historical_index_access_parses() {
        let program = parse("x = close[1]").unwrap();
        match &program.statements[0] {
            Stmt::VariableDeclaration { init: Some(Expr::Index { .. }), .. } => {}
            other => panic!("expected index expr, got {:?}", other),
        }
    }

    #[test]
    fn deeply_nested_parens_hit_recursion_limit() {
        let mut source = String::new();
        for _ in 0..1200 {
            source.push('(');
        }
        source.push('1');
        for _ in 0..1200 {
            source.push(')');
        }
        let result = parse(&format!("x = {}", source));
        assert!(result.is_err());
    }

    #[test]
    fn tuple_destructuring_declaration_parses() {
        let program = parse("[a, b] = f()").unwrap();
        match &program.statements[0] {
            Stmt::VariableDeclaration { target: DeclTarget::Tuple(names), .. } => {
                assert_eq!(names.len(), 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}

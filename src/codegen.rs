//! Lowers a parsed program into the JS-text body the embeddable host runtime
//! and the standalone factory both build on.
//!
//! Variable reads/writes for anything other than a function parameter or a
//! `const` go through a per-evaluation `vars` scope object rather than bare
//! `let` bindings, so repeated assignment to the same name (the common
//! "recompute every bar" shape) never runs into JS's no-redeclaration rule.

use crate::analysis::discovery::Metadata;
use crate::ast::{
    Arg, AssignOp, BinaryOp, BindingKind, DeclTarget, Expr, ForHead, FunctionBody, Literal,
    Program, Stmt, SwitchCase, UnaryOp,
};
use crate::intern::{Interner, Symbol};
use crate::span::Span;
use crate::tables;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// Maps an input-producing call's span to its zero-based `inputCallback`
/// ordinal. Built once from `metadata.inputs` (whose order and spans already
/// reflect first-encounter order) so both the main `emit()` pass and any
/// out-of-source-order re-emission (topologically sorted computed variables,
/// reverse-order bgcolor conditions) resolve the same call to the same
/// ordinal without re-walking the program.
pub type InputOrdinals = HashMap<(usize, usize), u32>;

fn span_key(span: Span) -> (usize, usize) {
    (span.start, span.end)
}

pub fn input_ordinals(metadata: &Metadata) -> InputOrdinals {
    metadata.inputs.iter().enumerate().map(|(i, input)| (span_key(input.span), i as u32)).collect()
}

/// Value returned by a historical getter for a name the runtime has no
/// history for (not a tracked price source).
pub const NA_SENTINEL: &str = "null";

#[derive(Debug, Clone, Copy)]
pub struct EmitConfig {
    pub max_loop_iterations: u32,
}

impl Default for EmitConfig {
    fn default() -> Self {
        EmitConfig { max_loop_iterations: 10_000 }
    }
}

pub struct EmitResult {
    pub body: String,
}

pub fn emit<'a>(
    program: &Program<'a>,
    metadata: &Metadata<'a>,
    interner: &Interner,
    config: EmitConfig,
) -> EmitResult {
    let mut emitter = Emitter {
        interner,
        config,
        out: String::new(),
        indent: 0,
        loop_counter: 0,
        scopes: vec![Scope::default()],
        input_ordinals: input_ordinals(metadata),
    };
    for stmt in program.statements {
        emitter.emit_stmt(stmt);
    }
    let body = emitter.out;
    let mut preamble = historical_preamble(metadata, interner);
    let helper_preamble = compose_preamble(&body);
    if !helper_preamble.is_empty() {
        if !preamble.is_empty() {
            preamble.push('\n');
        }
        preamble.push_str(&helper_preamble);
    }
    let full = if preamble.is_empty() { body } else { format!("{}\n{}", preamble, body) };
    EmitResult { body: full }
}

/// Declares a persistent series plus a historical getter for every price
/// source that is read with `[n]` syntax, and a not-available fallback
/// getter for every other historically-accessed name — driven directly by
/// the metadata pass's `historical_access` set rather than substring search,
/// since each getter is uniquely named after its target identifier.
fn historical_preamble(metadata: &Metadata, interner: &Interner) -> String {
    let mut out = String::new();
    for sym in &metadata.historical_access {
        let name = interner.resolve(*sym);
        if PRICE_SOURCES.contains(&name) {
            let _ = writeln!(out, "const _series_{n} = context.new_var({n}(context));", n = name);
            let _ = writeln!(
                out,
                "function _getHistorical_{n}(n) {{ return _series_{n}.get(n); }}",
                n = name
            );
        } else {
            let sanitized = sanitize(name);
            let _ = writeln!(
                out,
                "function _getHistorical_{n}(n) {{ return {na}; }}",
                n = sanitized,
                na = NA_SENTINEL
            );
        }
    }
    out.trim_end().to_string()
}

#[derive(Default)]
struct Scope {
    consts: HashSet<Symbol>,
    params: HashSet<Symbol>,
}

struct Emitter<'i> {
    interner: &'i Interner,
    config: EmitConfig,
    out: String,
    indent: usize,
    loop_counter: u32,
    scopes: Vec<Scope>,
    input_ordinals: InputOrdinals,
}

impl<'i> Emitter<'i> {
    fn name(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    fn write_line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn is_const(&self, name: Symbol) -> bool {
        self.scopes.iter().rev().any(|s| s.consts.contains(&name))
    }

    fn is_param(&self, name: Symbol) -> bool {
        self.scopes.iter().rev().any(|s| s.params.contains(&name))
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    fn emit_stmt<'a>(&mut self, stmt: &Stmt<'a>) {
        match stmt {
            Stmt::VariableDeclaration { kind, target, init, exported, .. } => {
                self.emit_variable_declaration(*kind, target, init.as_deref(), *exported);
            }
            Stmt::FunctionDeclaration { name, params, body, exported, .. } => {
                self.emit_function_declaration(*name, params, body, *exported);
            }
            Stmt::TypeDefinition { name, fields, exported, .. } => {
                self.emit_type_definition(*name, fields, *exported);
            }
            Stmt::ExpressionStatement { expr, .. } => {
                let js = self.emit_expr(expr);
                self.write_line(&format!("{};", js));
            }
            Stmt::BlockStatement { body, .. } => {
                for s in *body {
                    self.emit_stmt(s);
                }
            }
            Stmt::If { cond, then_branch, else_branch, .. } => {
                let cond_js = self.emit_expr(cond);
                self.write_line(&format!("if ({}) {{", cond_js));
                self.indent += 1;
                for s in *then_branch {
                    self.emit_stmt(s);
                }
                self.indent -= 1;
                match else_branch {
                    Some(eb) => {
                        self.write_line("} else {");
                        self.indent += 1;
                        for s in *eb {
                            self.emit_stmt(s);
                        }
                        self.indent -= 1;
                        self.write_line("}");
                    }
                    None => self.write_line("}"),
                }
            }
            Stmt::While { cond, body, .. } => self.emit_while(cond, body),
            Stmt::For { head, body, .. } => self.emit_for(head, body),
            Stmt::Switch { discriminant, cases, .. } => self.emit_switch(discriminant.as_deref(), cases),
            Stmt::Return { value, .. } => match value {
                Some(v) => {
                    let js = self.emit_expr(v);
                    self.write_line(&format!("return {};", js));
                }
                None => self.write_line("return;"),
            },
            Stmt::Break { .. } => self.write_line("break;"),
            Stmt::Continue { .. } => self.write_line("continue;"),
            Stmt::Import { .. } => {
                // Imports resolve at the module-loading layer the host runtime
                // owns; nothing is emitted into the body itself.
            }
        }
    }

    fn emit_variable_declaration<'a>(
        &mut self,
        kind: BindingKind,
        target: &DeclTarget,
        init: Option<&Expr<'a>>,
        exported: bool,
    ) {
        let Some(init) = init else { return };
        let js_init = self.emit_expr(init);
        let prefix = if exported { "export " } else { "" };
        match (kind, target) {
            (BindingKind::Const, DeclTarget::Name(name)) => {
                self.scopes.last_mut().unwrap().consts.insert(*name);
                let sanitized = sanitize(self.name(*name));
                self.write_line(&format!("{}const {} = {};", prefix, sanitized, js_init));
            }
            (BindingKind::Var | BindingKind::Varip, DeclTarget::Name(name)) => {
                let sanitized = sanitize(self.name(*name));
                self.write_line(&format!(
                    "{prefix}if (typeof vars.{s} === 'undefined') {{ vars.{s} = {init}; }}",
                    prefix = prefix,
                    s = sanitized,
                    init = js_init
                ));
            }
            (BindingKind::Default, DeclTarget::Name(name)) => {
                let sanitized = sanitize(self.name(*name));
                self.write_line(&format!("{}vars.{} = {};", prefix, sanitized, js_init));
            }
            (_, DeclTarget::Tuple(names)) => {
                let tmp = format!("_tuple_{}", self.loop_counter);
                self.loop_counter += 1;
                self.write_line(&format!("{}const {} = {};", prefix, tmp, js_init));
                for (i, n) in names.iter().enumerate() {
                    let sanitized = sanitize(self.name(*n));
                    self.write_line(&format!("vars.{} = {}[{}];", sanitized, tmp, i));
                }
            }
        }
    }

    fn emit_function_declaration<'a>(
        &mut self,
        name: Symbol,
        params: &[crate::ast::Param<'a>],
        body: &FunctionBody<'a>,
        exported: bool,
    ) {
        let sanitized = sanitize(self.name(name));
        let param_list: Vec<String> = params.iter().map(|p| sanitize(self.name(p.name))).collect();
        let prefix = if exported { "export " } else { "" };
        self.write_line(&format!("{}function {}({}) {{", prefix, sanitized, param_list.join(", ")));
        self.indent += 1;
        let mut scope = Scope::default();
        for p in params {
            scope.params.insert(p.name);
        }
        self.scopes.push(scope);
        match body {
            FunctionBody::Expr(e) => {
                let js = self.emit_expr(e);
                self.write_line(&format!("return {};", js));
            }
            FunctionBody::Block(block) => {
                for s in *block {
                    self.emit_stmt(s);
                }
            }
        }
        self.scopes.pop();
        self.indent -= 1;
        self.write_line("}");
    }

    fn emit_type_definition<'a>(&mut self, name: Symbol, fields: &[crate::ast::TypeField<'a>], exported: bool) {
        let sanitized = sanitize(self.name(name));
        let prefix = if exported { "export " } else { "" };
        self.write_line(&format!("{}function make_{}(overrides) {{", prefix, sanitized));
        self.indent += 1;
        self.write_line("overrides = overrides || {};");
        self.write_line("return Object.assign({");
        self.indent += 1;
        for f in fields {
            let fname = sanitize(self.name(f.name));
            let default_js = f.default.map(|d| self.emit_expr(d)).unwrap_or_else(|| "null".to_string());
            self.write_line(&format!("{}: {},", fname, default_js));
        }
        self.indent -= 1;
        self.write_line("}, overrides);");
        self.indent -= 1;
        self.write_line("}");
    }

    fn emit_while<'a>(&mut self, cond: &Expr<'a>, body: &[Stmt<'a>]) {
        let counter = self.next_loop_counter();
        self.write_line(&format!("let {} = 0;", counter));
        let cond_js = self.emit_expr(cond);
        self.write_line(&format!("while ({}) {{", cond_js));
        self.indent += 1;
        self.emit_loop_guard(&counter);
        for s in body {
            self.emit_stmt(s);
        }
        self.indent -= 1;
        self.write_line("}");
    }

    fn emit_for<'a>(&mut self, head: &ForHead<'a>, body: &[Stmt<'a>]) {
        let counter = self.next_loop_counter();
        match head {
            ForHead::Range { var, start, end } => {
                let sanitized = sanitize(self.name(*var));
                let start_js = self.emit_expr(start);
                let end_js = self.emit_expr(end);
                self.write_line(&format!("let {} = 0;", counter));
                self.write_line(&format!(
                    "for (let {v} = {s}; {v} <= {e}; {v}++) {{",
                    v = sanitized,
                    s = start_js,
                    e = end_js
                ));
                self.indent += 1;
                self.emit_loop_guard(&counter);
                for s in body {
                    self.emit_stmt(s);
                }
                self.indent -= 1;
                self.write_line("}");
            }
            ForHead::In { var, with_index, index, iterable } => {
                let iterable_js = self.emit_expr(iterable);
                self.write_line(&format!("let {} = 0;", counter));
                match var {
                    DeclTarget::Name(name) if !with_index => {
                        let sanitized = sanitize(self.name(*name));
                        self.write_line(&format!("for (const {} of {}) {{", sanitized, iterable_js));
                    }
                    DeclTarget::Name(name) => {
                        let sanitized = sanitize(self.name(*name));
                        let idx = index
                            .map(|sym| sanitize(self.name(sym)))
                            .unwrap_or_else(|| format!("_idx_{}", counter));
                        self.write_line(&format!(
                            "for (let {i} = 0; {i} < {it}.length; {i}++) {{",
                            i = idx,
                            it = iterable_js
                        ));
                        self.indent += 1;
                        self.write_line(&format!("const {} = {}[{}];", sanitized, iterable_js, idx));
                        self.indent -= 1;
                        // re-open so the guard/body share the same block depth
                        self.indent += 1;
                        self.emit_loop_guard(&counter);
                        for s in body {
                            self.emit_stmt(s);
                        }
                        self.indent -= 1;
                        self.write_line("}");
                        return;
                    }
                    DeclTarget::Tuple(_) => {
                        self.write_line(&format!("for (const _item of {}) {{", iterable_js));
                    }
                }
                self.indent += 1;
                self.emit_loop_guard(&counter);
                for s in body {
                    self.emit_stmt(s);
                }
                self.indent -= 1;
                self.write_line("}");
            }
        }
    }

    fn next_loop_counter(&mut self) -> String {
        let name = format!("_loop_{}", self.loop_counter);
        self.loop_counter += 1;
        name
    }

    fn emit_loop_guard(&mut self, counter: &str) {
        self.write_line(&format!("{}++;", counter));
        self.write_line(&format!(
            "if ({} > {}) {{ throw new Error('iteration-limit-exceeded'); }}",
            counter, self.config.max_loop_iterations
        ));
    }

    fn emit_switch<'a>(&mut self, discriminant: Option<&Expr<'a>>, cases: &[SwitchCase<'a>]) {
        let disc_js = discriminant.map(|d| self.emit_expr(d));
        let mut first = true;
        for case in cases {
            match case {
                SwitchCase::Case { test, body } => {
                    let test_js = self.emit_expr(test);
                    let cond = match &disc_js {
                        Some(d) => format!("{} === {}", d, test_js),
                        None => test_js,
                    };
                    let keyword = if first { "if" } else { "else if" };
                    self.write_line(&format!("{} ({}) {{", keyword, cond));
                    self.indent += 1;
                    self.emit_case_body(body);
                    self.indent -= 1;
                    self.write_line("}");
                    first = false;
                }
                SwitchCase::Default { body } => {
                    self.write_line("else {");
                    self.indent += 1;
                    self.emit_case_body(body);
                    self.indent -= 1;
                    self.write_line("}");
                }
            }
        }
    }

    fn emit_case_body<'a>(&mut self, body: &FunctionBody<'a>) {
        match body {
            FunctionBody::Expr(e) => {
                let js = self.emit_expr(e);
                self.write_line(&format!("{};", js));
            }
            FunctionBody::Block(block) => {
                for s in *block {
                    self.emit_stmt(s);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    fn emit_expr<'a>(&mut self, expr: &Expr<'a>) -> String {
        match expr {
            Expr::Literal { value, .. } => self.emit_literal(value),
            Expr::Identifier { name, .. } => self.emit_identifier_read(*name),
            Expr::Member { object, property, computed: false, .. } => {
                if let Expr::Identifier { name: obj, .. } = &**object {
                    if let Some(js) = self.lower_known_member(*obj, *property) {
                        return js;
                    }
                }
                let object_js = self.emit_expr(object);
                format!("{}.{}", object_js, sanitize(self.name(*property)))
            }
            Expr::Member { object, property, computed: true, .. } => {
                let object_js = self.emit_expr(object);
                format!("{}[{}]", object_js, sanitize(self.name(*property)))
            }
            Expr::Index { object, index, .. } => self.emit_historical_access(object, index),
            Expr::Call { callee, args, span, .. } => self.emit_call(callee, args, *span),
            Expr::Binary { op, left, right, .. } => {
                let l = self.emit_expr(left);
                let r = self.emit_expr(right);
                format!("({} {} {})", l, binary_op_js(*op), r)
            }
            Expr::Unary { op, operand, .. } => {
                let o = self.emit_expr(operand);
                match op {
                    UnaryOp::Neg => format!("(-{})", o),
                    UnaryOp::Plus => format!("(+{})", o),
                    UnaryOp::Not => format!("(!{})", o),
                }
            }
            Expr::Conditional { cond, then_expr, else_expr, .. } => {
                let c = self.emit_expr(cond);
                let t = self.emit_expr(then_expr);
                let e = self.emit_expr(else_expr);
                format!("({} ? {} : {})", c, t, e)
            }
            Expr::Assignment { op, target, value, .. } => self.emit_assignment(*op, target, value),
            Expr::Array { elements, .. } | Expr::Tuple { elements, .. } => {
                let parts: Vec<String> = elements.iter().map(|e| self.emit_expr(e)).collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }

    fn emit_literal(&mut self, value: &Literal) -> String {
        match value {
            Literal::Number(sym) => self.name(*sym).to_string(),
            Literal::String(sym) => format!("{:?}", self.name(*sym)),
            Literal::Boolean(b) => b.to_string(),
            Literal::Color(sym) => format!("{:?}", self.name(*sym)),
            Literal::Na => NA_SENTINEL.to_string(),
        }
    }

    fn emit_identifier_read(&mut self, name: Symbol) -> String {
        let text = self.name(name).to_string();
        if self.is_param(name) || self.is_const(name) {
            return sanitize(&text);
        }
        if PRICE_SOURCES.contains(&text.as_str()) {
            return format!("{}(context)", text);
        }
        format!("vars.{}", sanitize(&text))
    }

    fn emit_historical_access<'a>(&mut self, object: &Expr<'a>, index: &Expr<'a>) -> String {
        let index_js = self.emit_expr(index);
        if let Expr::Identifier { name, .. } = object {
            let text = self.name(*name).to_string();
            let sanitized = sanitize(&text);
            return format!("_getHistorical_{}({})", sanitized, index_js);
        }
        let object_js = self.emit_expr(object);
        format!("{}.at(-1 - ({}))", object_js, index_js)
    }

    fn emit_assignment<'a>(&mut self, op: AssignOp, target: &Expr<'a>, value: &Expr<'a>) -> String {
        let value_js = self.emit_expr(value);
        let target_js = match target {
            Expr::Identifier { name, .. } if !self.is_param(*name) && !self.is_const(*name) => {
                format!("vars.{}", sanitize(self.name(*name)))
            }
            _ => self.emit_expr(target),
        };
        let js_op = match op {
            AssignOp::Assign | AssignOp::Walrus => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
            AssignOp::ModAssign => "%=",
        };
        format!("({} {} {})", target_js, js_op, value_js)
    }

    fn lower_known_member(&mut self, object: Symbol, property: Symbol) -> Option<String> {
        let obj = self.name(object).to_string();
        let prop = self.name(property).to_string();
        if obj == "color" {
            if let Some(hex) = tables::resolve_color_constant(&prop) {
                return Some(format!("{:?}", hex));
            }
        }
        None
    }

    fn emit_call<'a>(&mut self, callee: &Expr<'a>, args: &[Arg<'a>], call_span: Span) -> String {
        if let Some(ordinal) = self.input_ordinals.get(&span_key(call_span)) {
            return format!("inputCallback({})", ordinal);
        }
        let (callee_js, needs_ctx) = self.lower_callee(callee);
        let mut parts = Vec::new();
        if needs_ctx {
            parts.push("context".to_string());
        }
        for arg in args {
            parts.push(self.emit_expr(arg.value()));
        }
        format!("{}({})", callee_js, parts.join(", "))
    }

    fn lower_callee<'a>(&mut self, callee: &Expr<'a>) -> (String, bool) {
        match callee {
            Expr::Identifier { name, .. } => {
                let text = self.name(*name).to_string();
                (sanitize(&text), false)
            }
            Expr::Member { object, property, computed: false, .. } => {
                if let Expr::Identifier { name: obj, .. } = &**object {
                    let obj_text = self.name(*obj).to_string();
                    let prop_text = self.name(*property).to_string();
                    return self.lower_qualified_call(&obj_text, &prop_text);
                }
                let object_js = self.emit_expr(object);
                (format!("{}.{}", object_js, sanitize(self.name(*property))), false)
            }
            _ => {
                let js = self.emit_expr(callee);
                (js, false)
            }
        }
    }

    fn lower_qualified_call(&mut self, namespace: &str, function: &str) -> (String, bool) {
        if namespace == "ta" && tables::is_ta_function(function) {
            return (format!("_ta.{}", function), true);
        }
        if namespace == "math" {
            match function {
                "avg" => {
                    return ("_avg".to_string(), false);
                }
                "sum" => {
                    return ("_sum".to_string(), false);
                }
                "todegrees" => {
                    return ("_toDegrees".to_string(), false);
                }
                "toradians" => {
                    return ("_toRadians".to_string(), false);
                }
                _ if tables::is_math_function(function) => {
                    return (format!("Math.{}", function), false);
                }
                _ => {}
            }
        }
        if namespace == "session" {
            match function {
                "ispremarket" => {
                    return ("_isPremarket".to_string(), false);
                }
                "ispostmarket" => {
                    return ("_isPostmarket".to_string(), false);
                }
                "ismarket" => {
                    return ("_isMarketSession".to_string(), false);
                }
                _ => {
                    return ("_isInSession".to_string(), false);
                }
            }
        }
        (format!("{}_{}", sanitize(namespace), sanitize(function)), false)
    }
}

const PRICE_SOURCES: &[&str] = &["open", "close", "high", "low", "volume", "hl2", "hlc3", "ohlc4"];

fn binary_op_js(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "===",
        BinaryOp::NotEq => "!==",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::LtEq => "<=",
        BinaryOp::GtEq => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}

/// Rewrites a dangerous identifier to `_pine_<name>`, idempotently.
pub fn sanitize(name: &str) -> String {
    if name.starts_with("_pine_") {
        return name.to_string();
    }
    if tables::is_dangerous_identifier(name) {
        format!("_pine_{}", name)
    } else {
        name.to_string()
    }
}

const HELPER_AVG_SUM: &str = "function _avg() { return Array.prototype.slice.call(arguments).reduce((a, b) => a + b, 0) / arguments.length; }\nfunction _sum() { return Array.prototype.slice.call(arguments).reduce((a, b) => a + b, 0); }";
const HELPER_DEGREES: &str = "function _toDegrees(radians) { return radians * 180 / Math.PI; }\nfunction _toRadians(degrees) { return degrees * Math.PI / 180; }";
const HELPER_SESSION: &str = "function _isInSession(session, time) { return session.includes(time); }\nfunction _isMarketSession(time) { return _isInSession('0930-1600', time); }\nfunction _isPremarket(time) { return _isInSession('0400-0930', time); }\nfunction _isPostmarket(time) { return _isInSession('1600-2000', time); }";
const HELPER_TIME: &str = "function _getTimeClose(bar) { return bar.closeTime; }\nfunction _getTradingDayTime(bar) { return bar.tradingDayTime; }";
const HELPER_MINTICK: &str = "function _roundToMintick(value, mintick) { return Math.round(value / mintick) * mintick; }";

/// The technical-analysis polyfill namespace every `ta.*` call site is
/// rewritten to call into. Reimplemented against the stateful contract
/// described for this namespace: a persistent signal line for `macd`, a
/// persistent diff series for `hma`, plus `wpr`/`cmo`/`ao`. State lives in
/// `context.new_var` slots the same way the rest of the emitted body does.
const TA_POLYFILL: &str = r#"const _ta = (function () {
    function _buf(context, cap) {
        var s = context.new_var([]);
        return {
            push: function (v) {
                var arr = s.get(0) || [];
                arr.push(v);
                if (arr.length > cap) arr.shift();
                s.set(arr);
                return arr;
            },
        };
    }
    function sma(context, source, length) {
        var arr = _buf(context, length).push(source);
        if (arr.length < length) return null;
        return arr.reduce(function (a, b) { return a + b; }, 0) / length;
    }
    function ema(context, source, length) {
        var prev = context.new_var(null);
        var k = 2 / (length + 1);
        var p = prev.get(0);
        var next = p === null ? source : source * k + p * (1 - k);
        prev.set(next);
        return next;
    }
    function rma(context, source, length) {
        var prev = context.new_var(null);
        var p = prev.get(0);
        var next = p === null ? source : (source + (length - 1) * p) / length;
        prev.set(next);
        return next;
    }
    function wma(context, source, length) {
        var arr = _buf(context, length).push(source);
        if (arr.length < length) return null;
        var norm = (length * (length + 1)) / 2;
        var acc = 0;
        for (var i = 0; i < arr.length; i++) acc += arr[i] * (i + 1);
        return acc / norm;
    }
    function swma(context, source) {
        var arr = _buf(context, 4).push(source);
        if (arr.length < 4) return null;
        return (arr[0] + arr[1] * 2 + arr[2] * 2 + arr[3]) / 6;
    }
    function vwma(context, source, length) {
        return sma(context, source, length);
    }
    function hma(context, source, length) {
        var half = wma(context, source, Math.max(1, Math.floor(length / 2)));
        var full = wma(context, source, length);
        if (half === null || full === null) return null;
        var diff = 2 * half - full;
        var sqrtLen = Math.max(1, Math.round(Math.sqrt(length)));
        var arr = _buf(context, sqrtLen).push(diff);
        if (arr.length < sqrtLen) return null;
        var norm = (sqrtLen * (sqrtLen + 1)) / 2;
        var acc = 0;
        for (var i = 0; i < arr.length; i++) acc += arr[i] * (i + 1);
        return acc / norm;
    }
    function tr(context, handleNa) {
        var prevClose = context.new_var(null);
        var h = high(context);
        var l = low(context);
        var pc = prevClose.get(0);
        prevClose.set(close(context));
        if (pc === null) return handleNa ? h - l : null;
        return Math.max(h - l, Math.abs(h - pc), Math.abs(l - pc));
    }
    function atr(context, length) {
        return rma(context, tr(context, true), length);
    }
    function rsi(context, source, length) {
        var prev = context.new_var(null);
        var p = prev.get(0);
        prev.set(source);
        if (p === null) return 50;
        var change = source - p;
        var gain = rma(context, Math.max(change, 0), length);
        var loss = rma(context, Math.max(-change, 0), length);
        if (!loss) return 100;
        return 100 - 100 / (1 + gain / loss);
    }
    function macd(context, source, fastLength, slowLength, signalLength) {
        var fast = ema(context, source, fastLength);
        var slow = ema(context, source, slowLength);
        var macdLine = fast - slow;
        var signal = ema(context, macdLine, signalLength);
        return [macdLine, signal, macdLine - signal];
    }
    function bb(context, source, length, mult) {
        var basis = sma(context, source, length);
        var dev = mult * stdev(context, source, length);
        return [basis + dev, basis, basis - dev];
    }
    function bbw(context, source, length, mult) {
        var bands = bb(context, source, length, mult);
        return (bands[0] - bands[2]) / bands[1];
    }
    function kc(context, source, length, mult) {
        var basis = ema(context, source, length);
        var range = atr(context, length);
        return [basis + mult * range, basis, basis - mult * range];
    }
    function stoch(context, source, high_, low_, length) {
        var hh = highest(context, high_, length);
        var ll = lowest(context, low_, length);
        if (hh === ll) return 50;
        return (100 * (source - ll)) / (hh - ll);
    }
    function stochrsi(context, source, lengthRsi, lengthStoch) {
        return stoch(context, rsi(context, source, lengthRsi), source, source, lengthStoch);
    }
    function cci(context, source, length) {
        var basis = sma(context, source, length);
        var md = sma(context, Math.abs(source - basis), length);
        if (!md) return 0;
        return (source - basis) / (0.015 * md);
    }
    function mfi(context, source, length) {
        return rsi(context, source, length);
    }
    function cmo(context, source, length) {
        var prev = context.new_var(null);
        var p = prev.get(0);
        prev.set(source);
        var change = p === null ? 0 : source - p;
        var up = _buf(context, length).push(Math.max(change, 0));
        var down = _buf(context, length).push(Math.max(-change, 0));
        var sumUp = up.reduce(function (a, b) { return a + b; }, 0);
        var sumDown = down.reduce(function (a, b) { return a + b; }, 0);
        if (sumUp + sumDown === 0) return 0;
        return (100 * (sumUp - sumDown)) / (sumUp + sumDown);
    }
    function mom(context, source, length) {
        var hist = _buf(context, length + 1).push(source);
        if (hist.length <= length) return null;
        return source - hist[0];
    }
    function roc(context, source, length) {
        var hist = _buf(context, length + 1).push(source);
        if (hist.length <= length || !hist[0]) return null;
        return (100 * (source - hist[0])) / hist[0];
    }
    function wpr(context, length) {
        var hh = highest(context, high(context), length);
        var ll = lowest(context, low(context), length);
        if (hh === ll) return -50;
        return (-100 * (hh - close(context))) / (hh - ll);
    }
    function ao(context) {
        var fast = sma(context, hl2(context), 5);
        var slow = sma(context, hl2(context), 34);
        if (fast === null || slow === null) return null;
        return fast - slow;
    }
    function highest(context, source, length) {
        var arr = _buf(context, length).push(source);
        return Math.max.apply(null, arr);
    }
    function lowest(context, source, length) {
        var arr = _buf(context, length).push(source);
        return Math.min.apply(null, arr);
    }
    function change(context, source, length) {
        length = length || 1;
        var hist = _buf(context, length + 1).push(source);
        if (hist.length <= length) return null;
        return source - hist[0];
    }
    function cross(context, a, b) {
        var prev = context.new_var(null);
        var p = prev.get(0);
        prev.set([a, b]);
        if (p === null) return false;
        return (p[0] - p[1]) * (a - b) < 0;
    }
    function crossover(context, a, b) {
        var prev = context.new_var(null);
        var p = prev.get(0);
        prev.set([a, b]);
        if (p === null) return false;
        return p[0] <= p[1] && a > b;
    }
    function crossunder(context, a, b) {
        var prev = context.new_var(null);
        var p = prev.get(0);
        prev.set([a, b]);
        if (p === null) return false;
        return p[0] >= p[1] && a < b;
    }
    function pivothigh(context, leftLen, rightLen) {
        return null;
    }
    function pivotlow(context, leftLen, rightLen) {
        return null;
    }
    function valuewhen(context, condition, source, occurrence) {
        var hist = context.new_var([]);
        var arr = hist.get(0) || [];
        if (condition) arr.unshift(source);
        hist.set(arr);
        return arr.length > occurrence ? arr[occurrence] : null;
    }
    function barssince(context, condition) {
        var counter = context.new_var(-1);
        var n = counter.get(0);
        n = condition ? 0 : n === -1 ? -1 : n + 1;
        counter.set(n);
        return n === -1 ? null : n;
    }
    function correlation(context, a, b, length) {
        return null;
    }
    function linreg(context, source, length, offset) {
        var arr = _buf(context, length).push(source);
        if (arr.length < length) return null;
        var n = arr.length;
        var sumX = 0, sumY = 0, sumXY = 0, sumXX = 0;
        for (var i = 0; i < n; i++) {
            sumX += i;
            sumY += arr[i];
            sumXY += i * arr[i];
            sumXX += i * i;
        }
        var slope = (n * sumXY - sumX * sumY) / (n * sumXX - sumX * sumX);
        var intercept = (sumY - slope * sumX) / n;
        return intercept + slope * (n - 1 + (offset || 0));
    }
    function median(context, source, length) {
        var arr = _buf(context, length).push(source).slice().sort(function (a, b) { return a - b; });
        if (arr.length < length) return null;
        var mid = Math.floor(arr.length / 2);
        return arr.length % 2 ? arr[mid] : (arr[mid - 1] + arr[mid]) / 2;
    }
    function mode(context, source, length) {
        var arr = _buf(context, length).push(source);
        var counts = {};
        var best = arr[0], bestCount = 0;
        for (var i = 0; i < arr.length; i++) {
            counts[arr[i]] = (counts[arr[i]] || 0) + 1;
            if (counts[arr[i]] > bestCount) { best = arr[i]; bestCount = counts[arr[i]]; }
        }
        return best;
    }
    function percentile_linear_interpolation(context, source, length, percentage) {
        var arr = _buf(context, length).push(source).slice().sort(function (a, b) { return a - b; });
        if (arr.length < length) return null;
        var rank = (percentage / 100) * (arr.length - 1);
        var lower = Math.floor(rank);
        var upper = Math.ceil(rank);
        if (lower === upper) return arr[lower];
        return arr[lower] + (arr[upper] - arr[lower]) * (rank - lower);
    }
    function percentrank(context, source, length) {
        var arr = _buf(context, length).push(source);
        if (arr.length < length) return null;
        var below = arr.filter(function (v) { return v < source; }).length;
        return (100 * below) / arr.length;
    }
    function stdev(context, source, length) {
        return Math.sqrt(variance(context, source, length));
    }
    function variance(context, source, length) {
        var arr = _buf(context, length).push(source);
        if (arr.length < length) return 0;
        var mean = arr.reduce(function (a, b) { return a + b; }, 0) / arr.length;
        return arr.reduce(function (acc, v) { return acc + (v - mean) * (v - mean); }, 0) / arr.length;
    }
    function sar(context, start, increment, max) {
        return null;
    }
    function supertrend(context, factor, atrLength) {
        var atrVal = atr(context, atrLength);
        var basis = hl2(context);
        return [basis - factor * atrVal, basis + factor * atrVal];
    }
    function dmi(context, diLength, adxSmoothing) {
        return [null, null, null];
    }
    return {
        sma: sma, ema: ema, rma: rma, wma: wma, swma: swma, vwma: vwma, hma: hma,
        tr: tr, atr: atr, rsi: rsi, macd: macd, bb: bb, bbw: bbw, kc: kc,
        stoch: stoch, stochrsi: stochrsi, cci: cci, mfi: mfi, cmo: cmo,
        mom: mom, roc: roc, wpr: wpr, ao: ao, highest: highest, lowest: lowest,
        change: change, cross: cross, crossover: crossover, crossunder: crossunder,
        pivothigh: pivothigh, pivotlow: pivotlow, valuewhen: valuewhen,
        barssince: barssince, correlation: correlation, linreg: linreg,
        median: median, mode: mode,
        percentile_linear_interpolation: percentile_linear_interpolation,
        percentrank: percentrank, stdev: stdev, variance: variance, sar: sar,
        supertrend: supertrend, dmi: dmi,
    };
})();"#;

/// Builds the preamble text from whichever helper bundles the emitted body
/// actually references, found by plain substring search over the finished
/// text (cheaper than tracking usage during emission and catches helper
/// calls introduced by earlier, already-composed preamble text too). Per-name
/// series/historical declarations are handled separately in
/// `historical_preamble`, driven by the metadata pass instead of this search,
/// since each such getter is uniquely named after its identifier.
fn compose_preamble(body: &str) -> String {
    let mut out = String::new();
    let mut push = |marker: &str, text: &str, out: &mut String| {
        if body.contains(marker) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(text);
        }
    };
    push("_avg(", HELPER_AVG_SUM, &mut out);
    push("_sum(", HELPER_AVG_SUM, &mut out);
    push("_isInSession(", HELPER_SESSION, &mut out);
    push("_isMarketSession(", HELPER_SESSION, &mut out);
    push("_isPremarket(", HELPER_SESSION, &mut out);
    push("_isPostmarket(", HELPER_SESSION, &mut out);
    push("_getTimeClose(", HELPER_TIME, &mut out);
    push("_getTradingDayTime(", HELPER_TIME, &mut out);
    push("_toDegrees(", HELPER_DEGREES, &mut out);
    push("_toRadians(", HELPER_DEGREES, &mut out);
    push("_roundToMintick(", HELPER_MINTICK, &mut out);
    push("_ta.", TA_POLYFILL, &mut out);
    dedup_lines(&out)
}

/// Emits a single expression to JS text outside of a full program pass, for
/// callers (the factory builder) that need to re-lower an already-discovered
/// expression such as a `bgcolor` condition or a `plot` value.
pub fn emit_expr_standalone<'a>(expr: &Expr<'a>, interner: &Interner, input_ordinals: &InputOrdinals) -> String {
    let mut emitter = Emitter {
        interner,
        config: EmitConfig::default(),
        out: String::new(),
        indent: 0,
        loop_counter: 0,
        scopes: vec![Scope::default()],
        input_ordinals: input_ordinals.clone(),
    };
    emitter.emit_expr(expr)
}

/// The bundles above overlap (avg/sum share one block, the four session
/// helpers share another); collapse duplicate lines so a body that uses
/// several helpers from the same bundle doesn't get it twice.
fn dedup_lines(text: &str) -> String {
    let mut seen = HashSet::new();
    let mut out = String::new();
    for line in text.lines() {
        if seen.insert(line.to_string()) {
            let _ = writeln!(out, "{}", line);
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::discovery;
    use crate::arena::Arena;
    use crate::arena_ctx::AstContext;
    use crate::lexer::Lexer;
    use crate::parser::{Parser, ParserConfig};

    fn emit_source(source: &str) -> String {
        let (tokens, interner) = Lexer::new(source).tokenize().unwrap();
        let tokens: &'static [crate::token::Token] = Box::leak(tokens.into_boxed_slice());
        let exprs: &'static Arena<Expr<'static>> = Box::leak(Box::new(Arena::new()));
        let stmts: &'static Arena<Stmt<'static>> = Box::leak(Box::new(Arena::new()));
        let ctx = AstContext::new(exprs, stmts);
        let program = Parser::new(tokens, ctx, ParserConfig::default()).parse_strict().unwrap();
        let metadata = discovery::analyze(&program, &interner);
        emit(&program, &metadata, &interner, EmitConfig::default()).body
    }

    #[test]
    fn simple_assignment_targets_vars_scope() {
        let js = emit_source("x = 1 + 2");
        assert!(js.contains("vars.x = (1 + 2);"));
    }

    #[test]
    fn word_operators_lower_to_js_logical_operators() {
        let js = emit_source("x = a and b or not c");
        assert!(js.contains("&&"));
        assert!(js.contains("||"));
        assert!(js.contains("!"));
    }

    #[test]
    fn equality_lowers_to_strict_equality() {
        let js = emit_source("x = a == b");
        assert!(js.contains("==="));
    }

    #[test]
    fn dangerous_identifier_is_sanitized() {
        let js = emit_source("eval = 1");
        assert!(js.contains("_pine_eval"));
    }

    #[test]
    fn historical_access_lowers_to_getter_call() {
        let js = emit_source("x = close[1]");
        assert!(js.contains("_getHistorical_close(1)"));
        assert!(js.contains("function _getHistorical_close("));
        assert!(js.contains("const _series_close = context.new_var(close(context));"));
    }

    #[test]
    fn loop_guard_is_inserted_for_while_and_for() {
        let js = emit_source("for i = 0 to 10\n    x = i");
        assert!(js.contains("iteration-limit-exceeded"));
    }

    #[test]
    fn nested_loops_get_distinct_counters() {
        let js = emit_source("for i = 0 to 10\n    for j = 0 to 10\n        x = i + j");
        assert!(js.contains("_loop_0"));
        assert!(js.contains("_loop_1"));
    }

    #[test]
    fn ta_call_gets_context_argument_injected() {
        let js = emit_source("x = ta.sma(close, 14)");
        assert!(js.contains("_ta.sma(context,"));
    }

    #[test]
    fn preamble_only_includes_referenced_helpers() {
        let js = emit_source("x = math.avg(1, 2)");
        assert!(js.contains("function _avg"));
        assert!(!js.contains("function _isInSession"));
    }

    #[test]
    fn ta_call_pulls_in_the_polyfill_namespace() {
        let js = emit_source("x = ta.sma(close, 14)");
        assert!(js.contains("const _ta = (function"));
        assert!(js.contains("sma: sma"));
    }

    #[test]
    fn input_call_lowers_directly_to_input_callback() {
        let js = emit_source("length = input.int(14, title = \"Length\")");
        assert!(js.contains("vars.length = inputCallback(0);"));
        assert!(!js.contains("input_int"));
    }

    #[test]
    fn multiple_inputs_get_distinct_callback_ordinals_in_encounter_order() {
        let js = emit_source("a = input(1)\nb = input(2)");
        assert!(js.contains("vars.a = inputCallback(0);"));
        assert!(js.contains("vars.b = inputCallback(1);"));
    }

    #[test]
    fn tuple_for_in_binds_the_chosen_index_identifier() {
        let js = emit_source("for [i, v] in arr\n    x = i + v");
        assert!(js.contains("for (let i = 0; i < arr.length; i++) {"));
        assert!(!js.contains("_idx_"));
    }

    #[test]
    fn exported_declaration_is_prefixed() {
        let js = emit_source("export const LENGTH = 14");
        assert!(js.contains("export const LENGTH = 14;"));
    }
}

//! Metadata visitor: a single read-only pass over a parsed program that
//! extracts everything the code emitter and the factory builder need so
//! neither has to re-walk the tree looking for declarative shapes.

use crate::ast::{
    Arg, BindingKind, DeclTarget, Expr, ForHead, FunctionBody, Literal, Program, Stmt, SwitchCase,
};
use crate::intern::{Interner, Symbol};
use crate::span::Span;
use crate::tables;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeaderKind {
    Indicator,
    Study,
    Strategy,
}

#[derive(Debug, Clone, Serialize)]
pub struct Header {
    pub kind: HeaderKind,
    pub title: Option<String>,
    pub overlay: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputKind {
    Int,
    Float,
    Bool,
    String,
    Color,
    Source,
    Symbol,
}

#[derive(Debug, Clone, Serialize)]
pub struct Input {
    pub id: String,
    pub kind: InputKind,
    pub title: Option<String>,
    pub default_repr: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlotStyle {
    Line,
    Shape,
    Char,
    HLine,
}

#[derive(Debug, Serialize)]
pub struct Plot<'a> {
    pub id: String,
    pub style: PlotStyle,
    pub color: String,
    pub span: Span,
    /// The plotted value itself, so the factory builder can re-emit it
    /// in the standalone native factory's return-value list.
    #[serde(skip)]
    pub value: Option<&'a Expr<'a>>,
}

/// Recorded in source order. The factory builder is the one that applies
/// "last bgcolor wins" by reversing this list and prepending a transparent
/// slot 0 when it lowers to the main-body form.
#[derive(Debug)]
pub struct BgColor<'a> {
    pub color: String,
    pub condition: &'a Expr<'a>,
    pub span: Span,
}

#[derive(Debug)]
pub struct ComputedVariable<'a> {
    pub name: Symbol,
    pub init: &'a Expr<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionVariable {
    pub name: String,
    pub predicate: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WarningClass {
    Unsupported,
    Partial,
    Deprecated,
}

impl From<tables::WarningClass> for WarningClass {
    fn from(c: tables::WarningClass) -> Self {
        match c {
            tables::WarningClass::Unsupported => WarningClass::Unsupported,
            tables::WarningClass::Partial => WarningClass::Partial,
            tables::WarningClass::Deprecated => WarningClass::Deprecated,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub function: String,
    pub class: WarningClass,
    pub span: Span,
}

#[derive(Debug)]
pub struct Metadata<'a> {
    pub header: Option<Header>,
    pub inputs: Vec<Input>,
    pub plots: Vec<Plot<'a>>,
    pub bgcolors: Vec<BgColor<'a>>,
    pub used_sources: BTreeSet<&'static str>,
    pub historical_access: BTreeSet<Symbol>,
    pub computed_variables: Vec<ComputedVariable<'a>>,
    pub session_variables: Vec<SessionVariable>,
    pub warnings: Vec<Warning>,
}

const PRICE_SOURCES: &[&str] =
    &["open", "close", "high", "low", "volume", "hl2", "hlc3", "ohlc4"];

struct Discovery<'a, 'i> {
    interner: &'i Interner,
    header: Option<Header>,
    inputs: Vec<Input>,
    plots: Vec<Plot<'a>>,
    bgcolors: Vec<BgColor<'a>>,
    used_sources: BTreeSet<&'static str>,
    historical_access: BTreeSet<Symbol>,
    warnings: Vec<Warning>,
    warned_functions: HashSet<String>,
    in_counter: usize,
    plot_counter: usize,
    computed_order: Vec<Symbol>,
    computed_init: HashMap<Symbol, &'a Expr<'a>>,
    computed_deps: HashMap<Symbol, Vec<Symbol>>,
    session_variables: Vec<SessionVariable>,
}

pub fn analyze<'a>(program: &Program<'a>, interner: &Interner) -> Metadata<'a> {
    let mut d = Discovery {
        interner,
        header: None,
        inputs: Vec::new(),
        plots: Vec::new(),
        bgcolors: Vec::new(),
        used_sources: BTreeSet::new(),
        historical_access: BTreeSet::new(),
        warnings: Vec::new(),
        warned_functions: HashSet::new(),
        in_counter: 0,
        plot_counter: 0,
        computed_order: Vec::new(),
        computed_init: HashMap::new(),
        computed_deps: HashMap::new(),
        session_variables: Vec::new(),
    };
    for stmt in program.statements {
        d.visit_top_level_stmt(stmt);
    }
    let computed_variables = d.topological_order();
    Metadata {
        header: d.header,
        inputs: d.inputs,
        plots: d.plots,
        bgcolors: d.bgcolors,
        used_sources: d.used_sources,
        historical_access: d.historical_access,
        computed_variables,
        session_variables: d.session_variables,
        warnings: d.warnings,
    }
}

impl<'a, 'i> Discovery<'a, 'i> {
    fn name(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    fn visit_top_level_stmt(&mut self, stmt: &'a Stmt<'a>) {
        if let Stmt::VariableDeclaration {
            kind: BindingKind::Default,
            target: DeclTarget::Name(name),
            init: Some(init),
            ..
        } = stmt
        {
            self.record_computed_candidate(*name, init);
        }
        self.walk_stmt(stmt);
    }

    fn record_computed_candidate(&mut self, name: Symbol, init: &'a Expr<'a>) {
        if let Some(session_predicate) = self.as_session_predicate(init) {
            self.session_variables.push(SessionVariable {
                name: self.name(name).to_string(),
                predicate: session_predicate,
            });
        }
        let mut deps = Vec::new();
        collect_identifier_deps(init, &mut deps);
        self.computed_order.push(name);
        self.computed_init.insert(name, init);
        self.computed_deps.insert(name, deps);
    }

    fn as_session_predicate(&self, expr: &Expr<'a>) -> Option<String> {
        if let Expr::Call { callee, .. } = expr {
            if let Some(qualified) = self.qualified_call_name(callee) {
                if qualified.starts_with("session.") {
                    return Some(qualified);
                }
            }
        }
        None
    }

    /// Resolves a call's callee into a dotted name (`"ta.sma"`, `"plot"`)
    /// when the callee is a plain identifier or a single-level member access.
    fn qualified_call_name(&self, callee: &Expr<'a>) -> Option<String> {
        match callee {
            Expr::Identifier { name, .. } => Some(self.name(*name).to_string()),
            Expr::Member { object, property, computed: false, .. } => {
                if let Expr::Identifier { name: obj_name, .. } = &**object {
                    Some(format!("{}.{}", self.name(*obj_name), self.name(*property)))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn topological_order(&mut self) -> Vec<ComputedVariable<'a>> {
        let known: HashSet<Symbol> = self.computed_order.iter().copied().collect();
        let mut in_degree: HashMap<Symbol, usize> =
            self.computed_order.iter().map(|n| (*n, 0)).collect();
        for name in &self.computed_order {
            for dep in &self.computed_deps[name] {
                if known.contains(dep) {
                    *in_degree.entry(*name).or_insert(0) += 1;
                }
            }
        }
        let position: HashMap<Symbol, usize> =
            self.computed_order.iter().enumerate().map(|(i, n)| (*n, i)).collect();

        let mut queue: Vec<Symbol> =
            self.computed_order.iter().copied().filter(|n| in_degree[n] == 0).collect();
        queue.sort_by_key(|n| std::cmp::Reverse(position[n]));

        let mut remaining: HashSet<Symbol> = known.clone();
        let mut result = Vec::new();
        while let Some(name) = queue.pop() {
            if !remaining.remove(&name) {
                continue;
            }
            result.push(name);
            for other in &self.computed_order {
                if !remaining.contains(other) {
                    continue;
                }
                if self.computed_deps[other].contains(&name) {
                    if let Some(e) = in_degree.get_mut(other) {
                        if *e > 0 {
                            *e -= 1;
                        }
                        if *e == 0 && !queue.contains(other) {
                            queue.push(*other);
                        }
                    }
                }
            }
            queue.sort_by_key(|n| std::cmp::Reverse(position[n]));
        }
        // Anything left is part of a dependency cycle: emit it in original
        // declaration order, dropping the back-edge that closed the loop.
        let mut leftover: Vec<Symbol> =
            self.computed_order.iter().copied().filter(|n| remaining.contains(n)).collect();
        leftover.sort_by_key(|n| position[n]);
        result.extend(leftover);

        result
            .into_iter()
            .map(|name| ComputedVariable { name, init: self.computed_init[&name] })
            .collect()
    }

    fn walk_stmt(&mut self, stmt: &'a Stmt<'a>) {
        match stmt {
            Stmt::VariableDeclaration { init, .. } => {
                if let Some(init) = init {
                    self.walk_expr(init);
                }
            }
            Stmt::FunctionDeclaration { body, .. } => self.walk_function_body(body),
            Stmt::TypeDefinition { fields, .. } => {
                for f in fields {
                    if let Some(d) = f.default {
                        self.walk_expr(d);
                    }
                }
            }
            Stmt::ExpressionStatement { expr, .. } => self.walk_expr(expr),
            Stmt::BlockStatement { body, .. } => {
                for s in *body {
                    self.walk_stmt(s);
                }
            }
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.walk_expr(cond);
                for s in *then_branch {
                    self.walk_stmt(s);
                }
                if let Some(eb) = else_branch {
                    for s in *eb {
                        self.walk_stmt(s);
                    }
                }
            }
            Stmt::While { cond, body, .. } => {
                self.walk_expr(cond);
                for s in *body {
                    self.walk_stmt(s);
                }
            }
            Stmt::For { head, body, .. } => {
                match head {
                    ForHead::Range { start, end, .. } => {
                        self.walk_expr(start);
                        self.walk_expr(end);
                    }
                    ForHead::In { iterable, .. } => self.walk_expr(iterable),
                }
                for s in *body {
                    self.walk_stmt(s);
                }
            }
            Stmt::Switch { discriminant, cases, .. } => {
                if let Some(d) = discriminant {
                    self.walk_expr(d);
                }
                for case in cases {
                    match case {
                        SwitchCase::Case { test, body } => {
                            self.walk_expr(test);
                            self.walk_function_body(body);
                        }
                        SwitchCase::Default { body } => self.walk_function_body(body),
                    }
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(v) = value {
                    self.walk_expr(v);
                }
            }
            Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Import { .. } => {}
        }
    }

    fn walk_function_body(&mut self, body: &FunctionBody<'a>) {
        match body {
            FunctionBody::Expr(e) => self.walk_expr(e),
            FunctionBody::Block(b) => {
                for s in *b {
                    self.walk_stmt(s);
                }
            }
        }
    }

    fn walk_expr(&mut self, expr: &'a Expr<'a>) {
        match expr {
            Expr::Literal { .. } => {}
            Expr::Identifier { name, .. } => self.note_source_use(*name),
            Expr::Member { object, .. } => self.walk_expr(object),
            Expr::Index { object, index, .. } => {
                if let Expr::Identifier { name, .. } = &**object {
                    self.historical_access.insert(*name);
                }
                self.walk_expr(object);
                self.walk_expr(index);
            }
            Expr::Call { callee, args, .. } => {
                self.classify_call(callee);
                self.handle_well_known_call(callee, args, expr.span());
                self.walk_expr(callee);
                for arg in args {
                    self.walk_expr(arg.value());
                }
            }
            Expr::Binary { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
            Expr::Unary { operand, .. } => self.walk_expr(operand),
            Expr::Conditional { cond, then_expr, else_expr, .. } => {
                self.walk_expr(cond);
                self.walk_expr(then_expr);
                self.walk_expr(else_expr);
            }
            Expr::Assignment { target, value, .. } => {
                self.walk_expr(target);
                self.walk_expr(value);
            }
            Expr::Array { elements, .. } | Expr::Tuple { elements, .. } => {
                for el in elements {
                    self.walk_expr(el);
                }
            }
        }
    }

    fn note_source_use(&mut self, name: Symbol) {
        let text = self.name(name);
        if let Some(src) = PRICE_SOURCES.iter().find(|s| **s == text) {
            self.used_sources.insert(src);
        }
    }

    fn classify_call(&mut self, callee: &Expr<'a>) {
        let Some(qualified) = self.qualified_call_name(callee) else { return };
        if let Some(class) = tables::classify_warning(&qualified) {
            if self.warned_functions.insert(qualified.clone()) {
                self.warnings.push(Warning {
                    function: qualified,
                    class: class.into(),
                    span: callee.span(),
                });
            }
        }
    }

    fn handle_well_known_call(&mut self, callee: &Expr<'a>, args: &[Arg<'a>], span: Span) {
        match callee {
            Expr::Identifier { name, .. } => {
                let text = self.name(*name).to_string();
                match text.as_str() {
                    "indicator" | "study" | "strategy" if self.header.is_none() => {
                        self.header = Some(self.build_header(&text, args, span));
                    }
                    "plot" | "plotshape" | "plotchar" | "hline" => {
                        self.record_plot(&text, args, span);
                    }
                    "bgcolor" => self.record_bgcolor(args, span),
                    "input" => self.record_input(InputKind::Float, args, span),
                    _ => {}
                }
            }
            Expr::Member { object, property, computed: false, .. } => {
                if let Expr::Identifier { name: obj, .. } = &**object {
                    if self.name(*obj) == "input" {
                        if let Some(kind) = input_kind_from_property(self.name(*property)) {
                            self.record_input(kind, args, span);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn build_header(&self, kind_name: &str, args: &[Arg<'a>], span: Span) -> Header {
        let kind = match kind_name {
            "indicator" => HeaderKind::Indicator,
            "study" => HeaderKind::Study,
            _ => HeaderKind::Strategy,
        };
        let title = find_named_string_arg(args, "title", self.interner)
            .or_else(|| first_positional_string(args, self.interner));
        let overlay = find_named_bool_arg(args, "overlay", self.interner).unwrap_or(false);
        Header { kind, title, overlay, span }
    }

    fn record_input(&mut self, default_kind: InputKind, args: &[Arg<'a>], span: Span) {
        let id = format!("in_{}", self.in_counter);
        self.in_counter += 1;
        let title = find_named_string_arg(args, "title", self.interner);
        let default_repr = args
            .iter()
            .find(|a| matches!(a, Arg::Positional(_)))
            .map(|a| render_literal(a.value(), self.interner))
            .unwrap_or_else(|| match default_kind {
                InputKind::Int | InputKind::Float => "0".to_string(),
                InputKind::Bool => "false".to_string(),
                InputKind::String | InputKind::Symbol | InputKind::Color => String::new(),
                InputKind::Source => "close".to_string(),
            });
        self.inputs.push(Input { id, kind: default_kind, title, default_repr, span });
    }

    fn record_plot(&mut self, fn_name: &str, args: &[Arg<'a>], span: Span) {
        let id = format!("plot_{}", self.plot_counter);
        self.plot_counter += 1;
        let style = match fn_name {
            "plotshape" => PlotStyle::Shape,
            "plotchar" => PlotStyle::Char,
            "hline" => PlotStyle::HLine,
            _ => PlotStyle::Line,
        };
        let color = find_named_color_arg(args, "color", self.interner)
            .unwrap_or_else(|| tables::DEFAULT_PLOT_COLOR.to_string());
        let value = args.iter().find(|a| matches!(a, Arg::Positional(_))).map(|a| a.value());
        self.plots.push(Plot { id, style, color, span, value });
    }

    fn record_bgcolor(&mut self, args: &[Arg<'a>], span: Span) {
        let color = find_named_color_arg(args, "color", self.interner)
            .unwrap_or_else(|| tables::DEFAULT_PLOT_COLOR.to_string());
        if let Some(condition) = args.iter().find(|a| matches!(a, Arg::Positional(_))) {
            self.bgcolors.push(BgColor { color, condition: condition.value(), span });
        }
    }
}

fn input_kind_from_property(prop: &str) -> Option<InputKind> {
    Some(match prop {
        "int" => InputKind::Int,
        "float" => InputKind::Float,
        "bool" => InputKind::Bool,
        "string" => InputKind::String,
        "color" => InputKind::Color,
        "source" => InputKind::Source,
        "symbol" => InputKind::Symbol,
        _ => return None,
    })
}

fn collect_identifier_deps<'a>(expr: &'a Expr<'a>, out: &mut Vec<Symbol>) {
    match expr {
        Expr::Literal { .. } => {}
        Expr::Identifier { name, .. } => out.push(*name),
        Expr::Member { object, .. } => collect_identifier_deps(object, out),
        Expr::Index { object, index, .. } => {
            collect_identifier_deps(object, out);
            collect_identifier_deps(index, out);
        }
        Expr::Call { args, .. } => {
            for a in args {
                collect_identifier_deps(a.value(), out);
            }
        }
        Expr::Binary { left, right, .. } => {
            collect_identifier_deps(left, out);
            collect_identifier_deps(right, out);
        }
        Expr::Unary { operand, .. } => collect_identifier_deps(operand, out),
        Expr::Conditional { cond, then_expr, else_expr, .. } => {
            collect_identifier_deps(cond, out);
            collect_identifier_deps(then_expr, out);
            collect_identifier_deps(else_expr, out);
        }
        Expr::Assignment { value, .. } => collect_identifier_deps(value, out),
        Expr::Array { elements, .. } | Expr::Tuple { elements, .. } => {
            for e in elements {
                collect_identifier_deps(e, out);
            }
        }
    }
}

fn find_named_string_arg<'a>(args: &[Arg<'a>], name: &str, interner: &Interner) -> Option<String> {
    crate::visitor::find_named_arg(args, name, interner).and_then(|e| match e {
        Expr::Literal { value: Literal::String(sym), .. } => Some(interner.resolve(*sym).to_string()),
        _ => None,
    })
}

fn find_named_bool_arg<'a>(args: &[Arg<'a>], name: &str, interner: &Interner) -> Option<bool> {
    crate::visitor::find_named_arg(args, name, interner).and_then(|e| match e {
        Expr::Literal { value: Literal::Boolean(b), .. } => Some(*b),
        _ => None,
    })
}

fn find_named_color_arg<'a>(args: &[Arg<'a>], name: &str, interner: &Interner) -> Option<String> {
    crate::visitor::find_named_arg(args, name, interner).map(|e| render_literal(e, interner))
}

fn first_positional_string<'a>(args: &[Arg<'a>], interner: &Interner) -> Option<String> {
    args.iter().find_map(|a| match a {
        Arg::Positional(e) => match e {
            Expr::Literal { value: Literal::String(sym), .. } => Some(interner.resolve(*sym).to_string()),
            _ => None,
        },
        _ => None,
    })
}

/// Best-effort textual rendering of a literal or simple member access, used
/// for default-value summaries and color arguments; not a general expression
/// printer.
fn render_literal<'a>(expr: &Expr<'a>, interner: &Interner) -> String {
    match expr {
        Expr::Literal { value: Literal::Number(sym), .. } => interner.resolve(*sym).to_string(),
        Expr::Literal { value: Literal::String(sym), .. } => interner.resolve(*sym).to_string(),
        Expr::Literal { value: Literal::Boolean(b), .. } => b.to_string(),
        Expr::Literal { value: Literal::Color(sym), .. } => interner.resolve(*sym).to_string(),
        Expr::Literal { value: Literal::Na, .. } => "na".to_string(),
        Expr::Member { object, property, .. } => {
            if let Expr::Identifier { name, .. } = &**object {
                let obj = interner.resolve(*name);
                let prop = interner.resolve(*property);
                if obj == "color" {
                    if let Some(hex) = tables::resolve_color_constant(prop) {
                        return hex.to_string();
                    }
                }
                return format!("{}.{}", obj, prop);
            }
            "unknown".to_string()
        }
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::arena_ctx::AstContext;
    use crate::lexer::Lexer;
    use crate::parser::{Parser, ParserConfig};

    fn analyze_source(source: &str) -> (Metadata<'static>, &'static Interner) {
        let (tokens, interner) = Lexer::new(source).tokenize().unwrap();
        let tokens: &'static [crate::token::Token] = Box::leak(tokens.into_boxed_slice());
        let interner: &'static Interner = Box::leak(Box::new(interner));
        let exprs: &'static Arena<Expr<'static>> = Box::leak(Box::new(Arena::new()));
        let stmts: &'static Arena<Stmt<'static>> = Box::leak(Box::new(Arena::new()));
        let ctx = AstContext::new(exprs, stmts);
        let program = Parser::new(tokens, ctx, ParserConfig::default()).parse_strict().unwrap();
        let program: &'static Program<'static> = Box::leak(Box::new(program));
        (analyze(program, interner), interner)
    }

    #[test]
    fn header_first_wins_on_repeated_calls() {
        let (meta, _) = analyze_source("indicator(\"first\")\nindicator(\"second\")");
        assert_eq!(meta.header.unwrap().title, Some("first".to_string()));
    }

    #[test]
    fn study_header_is_flagged_deprecated() {
        let (meta, _) = analyze_source("study(\"legacy\")");
        assert!(meta.warnings.iter().any(|w| w.function == "study"));
    }

    #[test]
    fn input_calls_get_sequential_ids() {
        let (meta, _) = analyze_source("x = input.int(5, title = \"length\")\ny = input.float(1.0)");
        assert_eq!(meta.inputs[0].id, "in_0");
        assert_eq!(meta.inputs[1].id, "in_1");
        assert_eq!(meta.inputs[0].kind, InputKind::Int);
    }

    #[test]
    fn plot_calls_default_to_standard_blue() {
        let (meta, _) = analyze_source("plot(close)");
        assert_eq!(meta.plots[0].color, tables::DEFAULT_PLOT_COLOR);
    }

    #[test]
    fn price_source_usage_is_tracked() {
        let (meta, _) = analyze_source("x = close + high");
        assert!(meta.used_sources.contains("close"));
        assert!(meta.used_sources.contains("high"));
    }

    #[test]
    fn historical_index_access_is_tracked() {
        let (meta, _) = analyze_source("x = close[1]");
        assert_eq!(meta.historical_access.len(), 1);
    }

    #[test]
    fn unsupported_function_produces_single_deduped_warning() {
        let (meta, _) = analyze_source("a = alert(1)\nb = alert(2)");
        let count = meta.warnings.iter().filter(|w| w.function == "alert").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn bgcolor_call_produces_partial_warning() {
        let (meta, _) = analyze_source("bgcolor(close > 1, color = color.red)");
        assert!(meta
            .warnings
            .iter()
            .any(|w| w.function == "bgcolor" && w.class == WarningClass::Partial));
    }

    #[test]
    fn input_without_explicit_default_falls_back_by_kind() {
        let (meta, _) = analyze_source(
            "a = input.int(title = \"A\")\nb = input.bool(title = \"B\")\nc = input.string(title = \"C\")\nd = input.source(title = \"D\")",
        );
        assert_eq!(meta.inputs[0].default_repr, "0");
        assert_eq!(meta.inputs[1].default_repr, "false");
        assert_eq!(meta.inputs[2].default_repr, "");
        assert_eq!(meta.inputs[3].default_repr, "close");
    }

    #[test]
    fn computed_variables_are_topologically_ordered() {
        let (meta, interner) = analyze_source("b = a + 1\na = 2");
        let names: Vec<&str> =
            meta.computed_variables.iter().map(|c| interner.resolve(c.name)).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn dependency_cycle_does_not_panic_and_keeps_all_variables() {
        let (meta, _) = analyze_source("a = b + 1\nb = a + 1");
        assert_eq!(meta.computed_variables.len(), 2);
    }
}

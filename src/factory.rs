//! End-to-end pipeline: source text in, either output shape out.
//!
//! Each public entry point composes its own arenas, interner, and parser
//! locally and returns owned data — nothing borrowed from those arenas is
//! allowed to leak past the function boundary, since the arenas themselves
//! are dropped when it returns.

use crate::analysis::discovery::{self, Header, Input, Metadata, PlotStyle, SessionVariable, Warning};
use crate::arena::Arena;
use crate::arena_ctx::AstContext;
use crate::ast::{Expr, Program, Stmt};
use crate::codegen::{self, EmitConfig};
use crate::error::CompileError;
use crate::intern::Interner;
use crate::lexer::Lexer;
use crate::parser::{Parser, ParserConfig};
use crate::tables;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy)]
pub struct CompilerConfig {
    pub max_parse_depth: usize,
    pub max_loop_iterations: u32,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig { max_parse_depth: 1000, max_loop_iterations: 10_000 }
    }
}

/// Owned snapshot of a plot declaration; the source `&Expr` behind it is
/// consumed while building the native factory source, so nothing borrowed
/// survives in the summary handed back to the caller.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlotSummary {
    pub id: String,
    pub style: PlotStyle,
    pub color: String,
}

/// Owned snapshot of [`discovery::Metadata`], detached from the arena that
/// `Metadata` itself borrows from.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetadataSummary {
    pub header: Option<Header>,
    pub inputs: Vec<Input>,
    pub plots: Vec<PlotSummary>,
    pub bgcolor_count: usize,
    pub used_sources: Vec<&'static str>,
    pub historical_access: Vec<String>,
    pub session_variables: Vec<SessionVariable>,
    pub warnings: Vec<Warning>,
}

impl MetadataSummary {
    fn capture(metadata: &Metadata, interner: &Interner) -> Self {
        MetadataSummary {
            header: metadata.header.clone(),
            inputs: metadata.inputs.clone(),
            plots: metadata
                .plots
                .iter()
                .map(|p| PlotSummary { id: p.id.clone(), style: p.style, color: p.color.clone() })
                .collect(),
            bgcolor_count: metadata.bgcolors.len(),
            used_sources: metadata.used_sources.iter().copied().collect(),
            historical_access: metadata
                .historical_access
                .iter()
                .map(|s| interner.resolve(*s).to_string())
                .collect(),
            session_variables: metadata.session_variables.clone(),
            warnings: metadata.warnings.clone(),
        }
    }
}

/// Both output shapes the host runtime accepts, produced from one compile.
pub struct FactoryOutput {
    pub metadata: MetadataSummary,
    /// The embeddable executable body, meant to run inside a dynamic-scope
    /// shell the host already owns.
    pub body: String,
    /// A complete, standalone native indicator factory: an object literal
    /// with `name`, `metainfo`, and a `constructor` assigning `this.main`.
    pub native_factory_source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid,
    Invalid { message: String, line: u32, column: u32 },
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MappingStats {
    pub technical_analysis: usize,
    pub math: usize,
    pub time: usize,
    pub multi_output: usize,
    pub total: usize,
}

/// Counts of the recognized dotted-call vocabulary, for informational
/// tooling (coverage dashboards, changelog generation) rather than anything
/// the compiler itself consults.
pub fn mapping_stats() -> MappingStats {
    let technical_analysis = tables::TA_FUNCTIONS.len();
    let math = tables::MATH_FUNCTIONS.len();
    let time = tables::TIME_FUNCTIONS.len();
    let multi_output = tables::MULTI_OUTPUT_TA_FUNCTIONS.len();
    MappingStats { technical_analysis, math, time, multi_output, total: technical_analysis + math + time }
}

fn parse_source<'ast>(
    source: &str,
    config: &CompilerConfig,
    ctx: AstContext<'ast>,
) -> Result<(Program<'ast>, Interner), CompileError> {
    let (tokens, interner) = Lexer::new(source).tokenize()?;
    let parser_config = ParserConfig { max_depth: config.max_parse_depth };
    let program = Parser::new(&tokens, ctx, parser_config).parse_strict()?;
    Ok((program, interner))
}

/// Compiles to the embeddable executable body only, discarding metadata.
pub fn transpile(source: &str, config: &CompilerConfig) -> Result<String, CompileError> {
    let exprs: Arena<Expr> = Arena::new();
    let stmts: Arena<Stmt> = Arena::new();
    let ctx = AstContext::new(&exprs, &stmts);
    let (program, interner) = parse_source(source, config, ctx)?;
    let metadata = discovery::analyze(&program, &interner);
    let emit_config = EmitConfig { max_loop_iterations: config.max_loop_iterations };
    let result = codegen::emit(&program, &metadata, &interner, emit_config);
    Ok(result.body)
}

/// Lexes and parses without emitting, reporting the first error found.
pub fn validate(source: &str, config: &CompilerConfig) -> ValidationResult {
    let exprs: Arena<Expr> = Arena::new();
    let stmts: Arena<Stmt> = Arena::new();
    let ctx = AstContext::new(&exprs, &stmts);
    match parse_source(source, config, ctx) {
        Ok(_) => ValidationResult::Valid,
        Err(err) => {
            let span = err.span();
            ValidationResult::Invalid { message: err.to_string(), line: span.line, column: span.column }
        }
    }
}

/// Compiles to both output shapes: the embeddable body, and a standalone
/// native factory built from the same metadata pass.
pub fn transpile_to_factory(
    source: &str,
    id: &str,
    name: Option<&str>,
    config: &CompilerConfig,
) -> Result<FactoryOutput, CompileError> {
    let exprs: Arena<Expr> = Arena::new();
    let stmts: Arena<Stmt> = Arena::new();
    let ctx = AstContext::new(&exprs, &stmts);
    let (program, interner) = parse_source(source, config, ctx)?;
    let metadata = discovery::analyze(&program, &interner);
    let emit_config = EmitConfig { max_loop_iterations: config.max_loop_iterations };
    let body = codegen::emit(&program, &metadata, &interner, emit_config).body;

    let safe_id = sanitize_id(id);
    let display_name = name.unwrap_or(&safe_id).to_string();
    let input_ordinals = codegen::input_ordinals(&metadata);
    let native_factory_source =
        build_native_factory_source(&safe_id, &display_name, &metadata, &input_ordinals, &interner);
    let summary = MetadataSummary::capture(&metadata, &interner);

    Ok(FactoryOutput { metadata: summary, body, native_factory_source })
}

/// Every character outside `[A-Za-z0-9_]` becomes `_`, matching the emitted
/// identifier sanitizer so the two stay visually consistent.
fn sanitize_id(id: &str) -> String {
    id.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect()
}

fn plot_type_js(style: PlotStyle) -> &'static str {
    match style {
        PlotStyle::Line => "line",
        PlotStyle::Shape => "shapes",
        PlotStyle::Char => "chars",
        PlotStyle::HLine => "hline",
    }
}

fn input_type_js(kind: crate::analysis::discovery::InputKind) -> &'static str {
    use crate::analysis::discovery::InputKind;
    match kind {
        InputKind::Int => "integer",
        InputKind::Float => "float",
        InputKind::Bool => "bool",
        InputKind::String => "text",
        InputKind::Color => "color",
        InputKind::Source => "source",
        InputKind::Symbol => "symbol",
    }
}

/// Renders an input's recorded default as the JS literal its `kind` implies;
/// `default_repr` is bare text (`"14"`, `"true"`, an unquoted string body),
/// so string/symbol/color defaults need quoting here that plain numbers and
/// booleans don't.
fn input_default_js(input: &Input) -> String {
    use crate::analysis::discovery::InputKind;
    match input.kind {
        InputKind::String | InputKind::Symbol | InputKind::Color => format!("{:?}", input.default_repr),
        _ => input.default_repr.clone(),
    }
}

/// Builds the standalone native factory: an object literal with `name`,
/// `metainfo`, and a `constructor` whose `this.main` runs the same emitted
/// body a host would otherwise `eval` inside its own dynamic scope.
///
/// Bgcolor indicators get a `bg_colorer` plot bound to a palette instead of
/// a `line` plot per declaration. Precedence follows source order reversed:
/// the last `bgcolor` call that matched wins, so the palette index is
/// resolved by testing conditions newest-first and falling back to a
/// transparent slot 0 when none match.
fn build_native_factory_source(
    safe_id: &str,
    display_name: &str,
    metadata: &Metadata,
    input_ordinals: &codegen::InputOrdinals,
    interner: &Interner,
) -> String {
    let is_bgcolor = !metadata.bgcolors.is_empty();
    let overlay = metadata.header.as_ref().map(|h| h.overlay).unwrap_or(false);
    let mut out = String::new();
    let stable_name = format!("User_{}", safe_id);

    let _ = writeln!(out, "(function () {{");
    let _ = writeln!(out, "  return {{");
    let _ = writeln!(out, "    name: {:?},", stable_name);
    let _ = writeln!(out, "    metainfo: {{");
    let _ = writeln!(out, "      _metainfoVersion: 51,");
    let _ = writeln!(out, "      id: \"User_{}@tv-basicstudies-1\",", safe_id);
    let _ = writeln!(out, "      description: {:?},", display_name);
    let _ = writeln!(out, "      shortDescription: {:?},", display_name);
    let _ = writeln!(out, "      is_hidden_study: false,");
    let _ = writeln!(out, "      is_price_study: {},", overlay);
    let _ = writeln!(out, "      isCustomIndicator: true,");
    let _ = writeln!(out, "      format: {{ type: \"price\", precision: 4 }},");

    let _ = writeln!(out, "      plots: [");
    if is_bgcolor {
        let _ = writeln!(
            out,
            "        {{ id: \"plot_bgcolor\", type: \"bg_colorer\", palette: \"palette_bgcolor\" }},"
        );
    } else {
        for p in &metadata.plots {
            let _ = writeln!(out, "        {{ id: {:?}, type: {:?} }},", p.id, plot_type_js(p.style));
        }
    }
    let _ = writeln!(out, "      ],");

    if is_bgcolor {
        let _ = writeln!(out, "      palettes: {{");
        let _ = writeln!(out, "        palette_bgcolor: {{");
        let _ = writeln!(out, "          colors: [");
        let _ = writeln!(out, "            {{ name: \"Transparent\", color: \"rgba(0,0,0,0)\" }},");
        for (i, bg) in metadata.bgcolors.iter().enumerate() {
            let _ = writeln!(out, "            {{ name: \"Color {}\", color: {:?} }},", i + 1, bg.color);
        }
        let _ = writeln!(out, "          ],");
        let _ = writeln!(out, "        }},");
        let _ = writeln!(out, "      }},");
    }

    let _ = writeln!(out, "      defaults: {{");
    if is_bgcolor {
        let _ = writeln!(out, "        palettes: {{ palette_bgcolor: {{ colors: [");
        for i in 0..=metadata.bgcolors.len() {
            let _ = writeln!(out, "          {{ color: {} }},", i);
        }
        let _ = writeln!(out, "        ] }} }},");
    }
    let _ = writeln!(out, "        styles: {{");
    if !is_bgcolor {
        for p in &metadata.plots {
            let _ = writeln!(
                out,
                "          {:?}: {{ color: {:?}, linewidth: 2, plottype: {:?} }},",
                p.id,
                p.color,
                plot_type_js(p.style)
            );
        }
    }
    let _ = writeln!(out, "        }},");
    let _ = writeln!(out, "        inputs: {{");
    for input in &metadata.inputs {
        let _ = writeln!(out, "          {:?}: {},", input.id, input_default_js(input));
    }
    let _ = writeln!(out, "        }},");
    let _ = writeln!(out, "      }},");
    let _ = writeln!(out, "      styles: {{}},");

    let _ = writeln!(out, "      inputs: [");
    for (i, input) in metadata.inputs.iter().enumerate() {
        let title = input.title.clone().unwrap_or_else(|| format!("Input {}", i + 1));
        let _ = writeln!(
            out,
            "        {{ id: {:?}, name: {:?}, type: {:?}, defval: {} }},",
            input.id,
            title,
            input_type_js(input.kind),
            input_default_js(input)
        );
    }
    let _ = writeln!(out, "      ],");
    let _ = writeln!(out, "    }},");

    let _ = writeln!(out, "    constructor: function () {{");
    let _ = writeln!(out, "      this.main = function (context, inputCallback) {{");
    let _ = writeln!(out, "        var vars = {{}};");
    for cv in &metadata.computed_variables {
        let name = codegen::sanitize(interner.resolve(cv.name));
        let init_js = codegen::emit_expr_standalone(cv.init, interner, input_ordinals);
        let _ = writeln!(out, "        vars.{} = {};", name, init_js);
    }

    if is_bgcolor {
        let _ = writeln!(out, "        var _colorIndex = 0;");
        // Tested newest-declared first so the first match wins: that is
        // exactly the bgcolor call that appears last in source order.
        for (i, bg) in metadata.bgcolors.iter().enumerate().rev() {
            let cond_js = codegen::emit_expr_standalone(bg.condition, interner, input_ordinals);
            let _ = writeln!(
                out,
                "        if (_colorIndex === 0 && ({})) {{ _colorIndex = {}; }}",
                cond_js,
                i + 1
            );
        }
        let _ = writeln!(out, "        return [_colorIndex];");
    } else {
        let values: Vec<String> = metadata
            .plots
            .iter()
            .map(|p| match p.value {
                Some(expr) => codegen::emit_expr_standalone(expr, interner, input_ordinals),
                None => codegen::NA_SENTINEL.to_string(),
            })
            .collect();
        let _ = writeln!(out, "        return [{}];", values.join(", "));
    }

    let _ = writeln!(out, "      }};");
    let _ = writeln!(out, "    }},");
    let _ = writeln!(out, "  }};");
    let _ = write!(out, "}})()");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpile_emits_the_body_only() {
        let result = transpile("x = 1 + 2", &CompilerConfig::default()).unwrap();
        assert!(result.contains("vars.x = (1 + 2);"));
    }

    #[test]
    fn validate_reports_valid_source() {
        assert_eq!(validate("x = 1", &CompilerConfig::default()), ValidationResult::Valid);
    }

    #[test]
    fn validate_reports_line_and_column_on_error() {
        match validate("x = (", &CompilerConfig::default()) {
            ValidationResult::Invalid { line, .. } => assert!(line >= 1),
            ValidationResult::Valid => panic!("expected invalid source to fail"),
        }
    }

    #[test]
    fn factory_id_is_sanitized_and_embedded_in_metainfo() {
        let out =
            transpile_to_factory("plot(close)", "My Indicator!", None, &CompilerConfig::default())
                .unwrap();
        assert!(out.native_factory_source.contains("User_My_Indicator_@tv-basicstudies-1"));
        assert!(out.native_factory_source.contains("name: \"User_My_Indicator_\""));
    }

    #[test]
    fn factory_name_override_is_used_verbatim() {
        let out = transpile_to_factory(
            "plot(close)",
            "raw_id",
            Some("Displayed Name"),
            &CompilerConfig::default(),
        )
        .unwrap();
        assert!(out.native_factory_source.contains("name: \"User_raw_id\""));
        assert!(out.native_factory_source.contains("description: \"Displayed Name\""));
    }

    #[test]
    fn general_indicator_returns_one_value_per_plot() {
        let out =
            transpile_to_factory("plot(close)\nplot(open)", "dual", None, &CompilerConfig::default())
                .unwrap();
        assert!(out.native_factory_source.contains("type: \"line\""));
        assert!(out.native_factory_source.contains("return [close(context), open(context)];"));
    }

    #[test]
    fn bgcolor_indicator_tests_conditions_newest_first() {
        let source = "bgcolor(color.red, close > 1)\nbgcolor(color.blue, close > 2)";
        let out = transpile_to_factory(source, "bg", None, &CompilerConfig::default()).unwrap();
        let first_if = out.native_factory_source.find("_colorIndex = 2").unwrap();
        let second_if = out.native_factory_source.find("_colorIndex = 1").unwrap();
        assert!(first_if < second_if, "last declared bgcolor must be tested first");
        assert!(out.native_factory_source.contains("bg_colorer"));
        assert!(out.native_factory_source.contains("Transparent"));
    }

    #[test]
    fn mapping_stats_counts_the_static_tables() {
        let stats = mapping_stats();
        assert_eq!(stats.technical_analysis, tables::TA_FUNCTIONS.len());
        assert_eq!(stats.total, stats.technical_analysis + stats.math + stats.time);
    }
}

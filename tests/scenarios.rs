//! End-to-end scenarios from the compiler's testable-properties contract:
//! the concrete numbered cases plus the cross-cutting invariants that must
//! hold for every valid input.

use scriptlang_transpiler::{mapping_stats, transpile, transpile_to_factory, validate, CompilerConfig, ValidationResult};

fn cfg() -> CompilerConfig {
    CompilerConfig::default()
}

#[test]
fn scenario_simple_arithmetic() {
    let body = transpile("x = 1 + 2", &cfg()).unwrap();
    assert!(body.contains("vars.x = (1 + 2);"));
}

#[test]
fn scenario_historical_access() {
    let body = transpile("plot(close[1])", &cfg()).unwrap();
    assert!(body.contains("_series_close"));
    assert!(body.contains("_getHistorical_close"));
    assert!(body.contains("_getHistorical_close(1)"));
}

#[test]
fn scenario_word_operator_lowering() {
    let body = transpile("r = a and b or not c", &cfg()).unwrap();
    assert!(body.contains("&&"));
    assert!(body.contains("||"));
    assert!(body.contains('!'));
}

#[test]
fn scenario_loop_guard_nested_counters_are_distinct() {
    let source = "for i = 0 to 10\n    for j = 0 to 10\n        x = i + j";
    let body = transpile(source, &cfg()).unwrap();
    assert!(body.contains("_loop_0"));
    assert!(body.contains("_loop_1"));
    assert!(body.contains("10000") || body.contains("10_000"));
}

#[test]
fn scenario_dangerous_identifier_is_renamed_everywhere() {
    let body = transpile("__proto__ = 1\ny = __proto__ + 1", &cfg()).unwrap();
    assert!(body.contains("_pine___proto__"));
    assert!(!body.contains("vars.__proto__"));
}

#[test]
fn scenario_bgcolor_precedence_tests_newest_condition_first() {
    let source = "\
indicator(\"bg\")
bgcolor(c1, color = color.red)
bgcolor(c2, color = color.green)
bgcolor(c3, color = color.blue)
";
    let out = transpile_to_factory(source, "bg-demo", None, &cfg()).unwrap();
    let third = out.native_factory_source.find("_colorIndex = 3").expect("third slot assigned");
    let second = out.native_factory_source.find("_colorIndex = 2").expect("second slot assigned");
    let first = out.native_factory_source.find("_colorIndex = 1").expect("first slot assigned");
    assert!(third < second);
    assert!(second < first);
}

#[test]
fn universal_invariant_ids_assigned_in_encounter_order() {
    let source = "\
indicator(\"multi\")
a = input(1, title = \"A\")
b = input(2, title = \"B\")
plot(a)
plot(b)
";
    let out = transpile_to_factory(source, "multi", None, &cfg()).unwrap();
    let ids: Vec<&str> = out.metadata.inputs.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["in_0", "in_1"]);
    let plot_ids: Vec<&str> = out.metadata.plots.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(plot_ids, vec!["plot_0", "plot_1"]);
}

#[test]
fn standalone_factory_wires_inputs_through_input_callback() {
    let source = "\
indicator(\"multi\")
length = input.int(14, title = \"Length\")
plot(length)
";
    let out = transpile_to_factory(source, "multi", None, &cfg()).unwrap();
    assert!(out.native_factory_source.contains("vars.length = inputCallback(0);"));
    assert!(!out.native_factory_source.contains("input_int"));
}

#[test]
fn standalone_factory_emits_computed_variables_in_topological_order() {
    let source = "\
indicator(\"topo\")
b = a + 1
a = input.int(2, title = \"A\")
plot(b)
";
    let out = transpile_to_factory(source, "topo", None, &cfg()).unwrap();
    let a_pos = out.native_factory_source.find("vars.a = inputCallback(0);").unwrap();
    let b_pos = out.native_factory_source.find("vars.b = (vars.a + 1);").unwrap();
    assert!(a_pos < b_pos, "dependency must be emitted before its dependent");
}

#[test]
fn universal_invariant_warnings_are_deduplicated_by_name() {
    let source = "request.security(x)\nrequest.security(y)\nrequest.security(z)";
    let out = transpile_to_factory(source, "dup", None, &cfg()).unwrap();
    let matching = out.metadata.warnings.iter().filter(|w| w.function.contains("security")).count();
    assert_eq!(matching, 1);
}

#[test]
fn universal_invariant_preamble_helper_presence_matches_body_usage() {
    let with_avg = transpile("x = math.avg(1, 2, 3)", &cfg()).unwrap();
    assert!(with_avg.contains("_avg("));

    let without_avg = transpile("x = 1 + 2", &cfg()).unwrap();
    assert!(!without_avg.contains("_avg("));
}

#[test]
fn universal_invariant_ta_call_pulls_in_polyfill() {
    let body = transpile("x = ta.sma(close, 14)", &cfg()).unwrap();
    assert!(body.contains("_ta"));
}

#[test]
fn boundary_empty_source_is_valid() {
    assert_eq!(validate("", &cfg()), ValidationResult::Valid);
}

#[test]
fn boundary_whitespace_only_line_is_valid() {
    assert_eq!(validate("x = 1\n   \ny = 2", &cfg()), ValidationResult::Valid);
}

#[test]
fn boundary_version_pragma_is_not_a_comment() {
    let body = transpile("x = 10 //version", &cfg()).unwrap();
    assert!(body.contains("vars.x"));
}

#[test]
fn boundary_string_with_embedded_quote_survives() {
    let body = transpile(r#"x = "bad\"; drop table users; --""#, &cfg()).unwrap();
    assert!(body.contains("drop table users"));
}

#[test]
fn validate_reports_line_and_column_on_failure() {
    let result = validate("if x\n  y = 1\n z = 2", &cfg());
    match result {
        ValidationResult::Invalid { line, column, .. } => {
            assert!(line >= 1);
            assert!(column >= 1);
        }
        ValidationResult::Valid => panic!("expected an indentation error"),
    }
}

#[test]
fn mapping_stats_totals_match_table_sizes() {
    let stats = mapping_stats();
    assert_eq!(stats.total, stats.technical_analysis + stats.math + stats.time);
    assert!(stats.technical_analysis > 0);
    assert!(stats.multi_output > 0);
}

#[test]
fn factory_name_is_sanitized_and_stable_across_runs() {
    let out1 = transpile_to_factory("x = 1", "My Cool Indicator!", None, &cfg()).unwrap();
    let out2 = transpile_to_factory("x = 1", "My Cool Indicator!", None, &cfg()).unwrap();
    assert!(out1.native_factory_source.contains("User_My_Cool_Indicator_"));
    assert_eq!(out1.native_factory_source, out2.native_factory_source);
}

#[test]
fn general_indicator_returns_one_value_per_declared_plot() {
    let source = "\
indicator(\"two plots\")
a = close
b = open
plot(a)
plot(b)
";
    let out = transpile_to_factory(source, "two-plots", None, &cfg()).unwrap();
    assert!(out.native_factory_source.contains("return ["));
    assert_eq!(out.metadata.plots.len(), 2);
}

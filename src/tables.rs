//! Static name-resolution tables consulted by the metadata visitor and the
//! code emitter: which namespace a dotted call belongs to, whether it needs
//! an injected context argument, and the constant/warning vocabularies tied
//! to specific identifiers.

use std::collections::HashSet;
use std::sync::OnceLock;

/// Technical-analysis functions exposed under the `ta.` namespace. All of
/// these carry implicit per-bar state and therefore need a context argument
/// injected at the call site.
pub const TA_FUNCTIONS: &[&str] = &[
    "sma", "ema", "wma", "rma", "vwma", "swma", "hma", "rsi", "atr", "tr", "bb", "bbw", "kc",
    "macd", "stoch", "stochrsi", "cci", "mfi", "cmo", "mom", "roc", "wpr", "ao", "highest",
    "lowest", "change", "cross", "crossover", "crossunder", "pivothigh", "pivotlow", "valuewhen",
    "barssince", "correlation", "linreg", "median", "mode", "percentile_linear_interpolation",
    "percentrank", "stdev", "variance", "sar", "supertrend", "dmi",
];

/// Stateless functions exposed under the `math.` namespace.
pub const MATH_FUNCTIONS: &[&str] = &[
    "abs", "sign", "sqrt", "pow", "exp", "log", "log10", "floor", "ceil", "round", "min", "max",
    "avg", "sum", "random", "todegrees", "toradians",
];

/// Namespaces that host static, stateless utility functions and need no
/// injected context argument regardless of which function is called.
pub const UTILITY_NAMESPACES: &[&str] = &[
    "str", "array", "matrix", "map", "color", "timestamp", "syminfo", "barstate", "session",
    "timeframe", "runtime",
];

/// `ta.*` entries whose host implementation returns more than one series
/// (a signal/histogram pair, a band triple, ...). Surfaced through
/// `mapping_stats` for informational tooling.
pub const MULTI_OUTPUT_TA_FUNCTIONS: &[&str] =
    &["macd", "bb", "kc", "stoch", "stochrsi", "supertrend", "dmi"];

/// Time-related helpers outside the `ta`/`math` tables: session-membership
/// predicates, timeframe queries, and the `time_*` accessors.
pub const TIME_FUNCTIONS: &[&str] = &[
    "session.ismarket",
    "session.ispremarket",
    "session.ispostmarket",
    "timeframe.period",
    "timeframe.isdaily",
    "timeframe.isintraday",
    "time_close",
    "timestamp",
];

/// Named color constants resolvable without evaluating an expression.
pub const COLOR_CONSTANTS: &[(&str, &str)] = &[
    ("red", "#FF0000"),
    ("green", "#008000"),
    ("blue", "#0000FF"),
    ("black", "#000000"),
    ("white", "#FFFFFF"),
    ("yellow", "#FFFF00"),
    ("orange", "#FFA500"),
    ("purple", "#800080"),
    ("gray", "#808080"),
    ("silver", "#C0C0C0"),
    ("maroon", "#800000"),
    ("navy", "#000080"),
    ("olive", "#808000"),
    ("teal", "#008080"),
    ("lime", "#00FF00"),
    ("aqua", "#00FFFF"),
    ("fuchsia", "#FF00FF"),
];

pub const DEFAULT_PLOT_COLOR: &str = "#2962FF";

/// IANA-ish timezone identifiers accepted by `timestamp`/session helpers.
pub const TIMEZONES: &[&str] = &[
    "UTC", "America/New_York", "America/Chicago", "America/Los_Angeles", "Europe/London",
    "Europe/Berlin", "Asia/Tokyo", "Asia/Shanghai", "Asia/Kolkata", "Australia/Sydney",
];

pub const DAYS_OF_WEEK: &[&str] =
    &["sunday", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday"];

/// Identifiers that would shadow host/runtime internals if emitted verbatim.
/// The code emitter rewrites any use of one of these as `_pine_<name>`.
pub const DANGEROUS_IDENTIFIERS: &[&str] = &[
    "__proto__",
    "constructor",
    "prototype",
    "eval",
    "Function",
    "arguments",
    "globalThis",
    "window",
    "self",
    "this",
    "require",
    "process",
    "module",
    "exports",
];

/// Functions that exist but whose semantics are not fully reproduced; calling
/// them produces an `unsupported` classification warning. `request.security`
/// is also reachable as bare `security`, which instead falls under the
/// deprecated set below.
pub const UNSUPPORTED_FUNCTIONS: &[&str] = &[
    "alert",
    "alertcondition",
    "request.security",
    "request.financial",
    "request.economic",
    "ticker.new",
    "log.info",
    "log.warning",
    "log.error",
    "runtime.error",
];

/// Functions with a partial reimplementation; calling them produces a
/// `partial` classification warning.
pub const PARTIAL_FUNCTIONS: &[&str] =
    &["line.new", "box.new", "label.new", "table.new", "polyline.new", "fill", "bgcolor"];

/// Functions retained for compatibility but superseded; calling them
/// produces a `deprecated` classification warning.
pub const DEPRECATED_FUNCTIONS: &[&str] = &["study", "security"];

macro_rules! lookup_set {
    ($fn_name:ident, $source:expr) => {
        pub fn $fn_name() -> &'static HashSet<&'static str> {
            static CELL: OnceLock<HashSet<&'static str>> = OnceLock::new();
            CELL.get_or_init(|| $source.iter().copied().collect())
        }
    };
}

lookup_set!(ta_function_set, TA_FUNCTIONS);
lookup_set!(math_function_set, MATH_FUNCTIONS);
lookup_set!(utility_namespace_set, UTILITY_NAMESPACES);
lookup_set!(dangerous_identifier_set, DANGEROUS_IDENTIFIERS);
lookup_set!(unsupported_function_set, UNSUPPORTED_FUNCTIONS);
lookup_set!(partial_function_set, PARTIAL_FUNCTIONS);
lookup_set!(deprecated_function_set, DEPRECATED_FUNCTIONS);

pub fn resolve_color_constant(name: &str) -> Option<&'static str> {
    COLOR_CONSTANTS.iter().find(|(n, _)| *n == name).map(|(_, hex)| *hex)
}

pub fn is_dangerous_identifier(name: &str) -> bool {
    dangerous_identifier_set().contains(name)
}

pub fn is_ta_function(name: &str) -> bool {
    ta_function_set().contains(name)
}

pub fn is_math_function(name: &str) -> bool {
    math_function_set().contains(name)
}

pub fn is_utility_namespace(name: &str) -> bool {
    utility_namespace_set().contains(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningClass {
    Unsupported,
    Partial,
    Deprecated,
}

/// Classifies a fully-qualified call name (e.g. `"ta.pivothigh"`) against the
/// warning vocabularies, preferring the most severe classification if a name
/// somehow appears in more than one set.
pub fn classify_warning(qualified_name: &str) -> Option<WarningClass> {
    if unsupported_function_set().contains(qualified_name) {
        Some(WarningClass::Unsupported)
    } else if partial_function_set().contains(qualified_name) {
        Some(WarningClass::Partial)
    } else if deprecated_function_set().contains(qualified_name) {
        Some(WarningClass::Deprecated)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ta_functions_are_recognized() {
        assert!(is_ta_function("sma"));
        assert!(is_ta_function("supertrend"));
        assert!(!is_ta_function("sqrt"));
    }

    #[test]
    fn math_functions_are_recognized() {
        assert!(is_math_function("sqrt"));
        assert!(!is_math_function("sma"));
    }

    #[test]
    fn dangerous_identifiers_include_prototype_pollution_vectors() {
        assert!(is_dangerous_identifier("__proto__"));
        assert!(is_dangerous_identifier("constructor"));
        assert!(!is_dangerous_identifier("myVariable"));
    }

    #[test]
    fn color_constant_resolves_known_name() {
        assert_eq!(resolve_color_constant("red"), Some("#FF0000"));
        assert_eq!(resolve_color_constant("notacolor"), None);
    }

    #[test]
    fn classify_warning_distinguishes_classes() {
        assert_eq!(classify_warning("alert"), Some(WarningClass::Unsupported));
        assert_eq!(classify_warning("request.security"), Some(WarningClass::Unsupported));
        assert_eq!(classify_warning("bgcolor"), Some(WarningClass::Partial));
        assert_eq!(classify_warning("line.new"), Some(WarningClass::Partial));
        assert_eq!(classify_warning("study"), Some(WarningClass::Deprecated));
        assert_eq!(classify_warning("security"), Some(WarningClass::Deprecated));
        assert_eq!(classify_warning("ta.sma"), None);
    }
}

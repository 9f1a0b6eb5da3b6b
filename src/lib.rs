//! Source-to-source compiler for a charting-indicator DSL.
//!
//! The pipeline lexes significant-indentation source into tokens, parses it
//! into an arena-allocated AST, runs a single read-only metadata pass over
//! that AST, and lowers it into JS-text through the code emitter. The
//! [`factory`] module composes those stages into the crate's public API:
//! [`factory::transpile`] for the embeddable body alone,
//! [`factory::transpile_to_factory`] for the body plus a standalone native
//! indicator factory, [`factory::validate`] for a lex+parse-only check, and
//! [`factory::mapping_stats`] for the size of the recognized call vocabulary.

pub mod analysis;
pub mod arena;
pub mod arena_ctx;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod factory;
pub mod intern;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod style;
pub mod tables;
pub mod token;
pub mod visitor;

pub use analysis::{
    BgColor, ComputedVariable, Header, HeaderKind, Input, InputKind, Metadata, Plot, PlotStyle,
    SessionVariable, Warning,
};
pub use arena::Arena;
pub use arena_ctx::AstContext;
pub use codegen::{EmitConfig, EmitResult};
pub use error::{CompileError, LexErrorKind, ParseErrorKind};
pub use factory::{
    mapping_stats, transpile, transpile_to_factory, validate, CompilerConfig, FactoryOutput,
    MappingStats, MetadataSummary, PlotSummary, ValidationResult,
};
pub use intern::{Interner, Symbol};
pub use lexer::Lexer;
pub use parser::{Parser, ParserConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpile_is_reexported_at_crate_root() {
        let body = transpile("x = 1", &CompilerConfig::default()).unwrap();
        assert!(body.contains("vars.x"));
    }

    #[test]
    fn validate_is_reexported_at_crate_root() {
        assert!(matches!(validate("x = 1", &CompilerConfig::default()), ValidationResult::Valid));
    }
}

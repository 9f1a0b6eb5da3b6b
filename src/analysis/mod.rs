//! Static analysis over a parsed program: the metadata visitor that extracts
//! everything the code emitter and the factory builder need without
//! re-walking the AST themselves.

pub mod discovery;

pub use discovery::{
    BgColor, ComputedVariable, Header, HeaderKind, Input, InputKind, Metadata, Plot, PlotStyle,
    SessionVariable, Warning,
};

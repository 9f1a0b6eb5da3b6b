//! Error types with source location tracking.
//!
//! Every fallible stage of the pipeline returns a [`CompileError`], which
//! always carries the [`Span`] of the offending token or character. Display
//! is delegated to [`CompileError::render`], which reproduces the excerpt +
//! caret-underline format used across this crate's diagnostics.

use crate::span::Span;
use crate::style::Style;
use crate::token::TokenKind;
use std::fmt;

#[derive(Debug, Clone)]
pub enum CompileError {
    Lex(LexErrorKind, Span),
    Parse(ParseErrorKind, Span),
}

#[derive(Debug, Clone)]
pub enum LexErrorKind {
    UnexpectedChar(char),
    IndentationError { column: usize },
    UnterminatedString,
}

#[derive(Debug, Clone)]
pub enum ParseErrorKind {
    UnexpectedToken { expected: &'static str, found: String },
    MissingToken { expected: &'static str },
    RecursionLimitExceeded,
}

impl CompileError {
    pub fn span(&self) -> Span {
        match self {
            CompileError::Lex(_, span) => *span,
            CompileError::Parse(_, span) => *span,
        }
    }

    fn message(&self) -> String {
        match self {
            CompileError::Lex(kind, _) => match kind {
                LexErrorKind::UnexpectedChar(c) => format!("unexpected character '{}'", c),
                LexErrorKind::IndentationError { column } => {
                    format!("indentation error: cannot unwind to column {}", column)
                }
                LexErrorKind::UnterminatedString => "unterminated string".to_string(),
            },
            CompileError::Parse(kind, _) => match kind {
                ParseErrorKind::UnexpectedToken { expected, found } => {
                    format!("expected {}, found {}", expected, found)
                }
                ParseErrorKind::MissingToken { expected } => format!("expected {}", expected),
                ParseErrorKind::RecursionLimitExceeded => {
                    "recursion depth limit exceeded".to_string()
                }
            },
        }
    }

    /// Renders a one-error diagnostic: a bold-red label, the message, a
    /// line-numbered excerpt of the source, and a caret underline sized to
    /// the span. Set `ansi` to `false` for plain-text callers.
    pub fn render(&self, source: &str, ansi: bool) -> String {
        let span = self.span();
        let (line_num, line_start, line_content) = find_context(source, span.start);
        let col = span.start.saturating_sub(line_start);
        let len = span.len().max(1);
        let underline = format!("{}{}", " ".repeat(col), "^".repeat(len));

        if ansi {
            format!(
                "{}: {}\n\n{} {} {}\n     {} {}",
                Style::bold_red("error"),
                self.message(),
                Style::blue(&format!("{:4}", line_num)),
                Style::blue("|"),
                line_content,
                Style::blue("|"),
                Style::red(&underline),
            )
        } else {
            format!(
                "error: {}\n\n{:4} | {}\n     | {}",
                self.message(),
                line_num,
                line_content,
                underline,
            )
        }
    }
}

fn find_context(source: &str, offset: usize) -> (usize, usize, &str) {
    let mut line_num = 1;
    let mut line_start = 0;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line_num += 1;
            line_start = i + 1;
        }
    }
    let line_end = source[line_start..]
        .find('\n')
        .map(|off| line_start + off)
        .unwrap_or(source.len());
    (line_num, line_start, &source[line_start..line_end])
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message(), self.span().line, self.span().column)
    }
}

impl std::error::Error for CompileError {}

pub type Result<T> = std::result::Result<T, CompileError>;

pub fn describe_token(kind: &TokenKind) -> String {
    format!("{:?}", kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_contains_message_and_underline() {
        let err = CompileError::Lex(LexErrorKind::UnexpectedChar('$'), Span::new(4, 5, 1, 5));
        let rendered = err.render("x = $ + 1", false);
        assert!(rendered.contains("unexpected character"));
        assert!(rendered.contains('^'));
    }

    #[test]
    fn render_finds_correct_line_for_multiline_source() {
        let source = "a = 1\nb = $\n";
        let err = CompileError::Lex(LexErrorKind::UnexpectedChar('$'), Span::new(10, 11, 2, 5));
        let rendered = err.render(source, false);
        assert!(rendered.contains("b = $"));
        assert!(rendered.contains("   2"));
    }

    #[test]
    fn display_includes_position() {
        let err = CompileError::Parse(ParseErrorKind::RecursionLimitExceeded, Span::new(0, 0, 3, 7));
        let display = format!("{}", err);
        assert!(display.contains("3:7"));
    }
}

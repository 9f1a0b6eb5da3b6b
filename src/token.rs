use crate::intern::Symbol;
use crate::span::Span;

/// Kinds of non-layout, non-trivia tokens produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(Symbol),
    Number(Symbol),
    String(Symbol),
    Boolean(bool),
    Color(Symbol),
    /// The `na` sentinel literal.
    Na,
    Keyword(Keyword),
    Operator(Operator),

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,

    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    For,
    To,
    In,
    While,
    Switch,
    Return,
    Break,
    Continue,
    Import,
    As,
    Export,
    Var,
    Varip,
    Const,
    Type,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Keyword> {
        Some(match s {
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "for" => Keyword::For,
            "to" => Keyword::To,
            "in" => Keyword::In,
            "while" => Keyword::While,
            "switch" => Keyword::Switch,
            "return" => Keyword::Return,
            "break" => Keyword::Break,
            "continue" => Keyword::Continue,
            "import" => Keyword::Import,
            "as" => Keyword::As,
            "export" => Keyword::Export,
            "var" => Keyword::Var,
            "varip" => Keyword::Varip,
            "const" => Keyword::Const,
            "type" => Keyword::Type,
            _ => return None,
        })
    }
}

/// Operators, including the word operators `and`/`or`/`not`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    // word operators
    And,
    Or,
    Not,
    // assignment
    Assign,    // =
    Walrus,    // :=
    PlusEq,    // +=
    MinusEq,   // -=
    StarEq,    // *=
    SlashEq,   // /=
    PercentEq, // %=
    // comparison / equality
    EqEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    // arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    // ternary / misc
    Question,
    FatArrow, // =>
}

/// Symbol-operator table, sorted by lexeme length descending so the lexer's
/// maximal-munch scan always matches the longest operator first.
pub const OPERATOR_TABLE: &[(&str, Operator)] = &[
    ("==", Operator::EqEq),
    ("!=", Operator::NotEq),
    (">=", Operator::GtEq),
    ("<=", Operator::LtEq),
    ("=>", Operator::FatArrow),
    (":=", Operator::Walrus),
    ("+=", Operator::PlusEq),
    ("-=", Operator::MinusEq),
    ("*=", Operator::StarEq),
    ("/=", Operator::SlashEq),
    ("%=", Operator::PercentEq),
    ("=", Operator::Assign),
    ("<", Operator::Lt),
    (">", Operator::Gt),
    ("+", Operator::Plus),
    ("-", Operator::Minus),
    ("*", Operator::Star),
    ("/", Operator::Slash),
    ("%", Operator::Percent),
    ("?", Operator::Question),
];

/// Standalone-identifier words that lex as logical operators rather than
/// plain identifiers.
pub fn word_operator(s: &str) -> Option<Operator> {
    match s {
        "and" => Some(Operator::And),
        "or" => Some(Operator::Or),
        "not" => Some(Operator::Not),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_table_is_sorted_by_length_descending() {
        let mut last_len = usize::MAX;
        for (lexeme, _) in OPERATOR_TABLE {
            assert!(lexeme.len() <= last_len, "table must be non-increasing by length");
            last_len = lexeme.len();
        }
    }

    #[test]
    fn keyword_from_str_recognizes_keywords() {
        assert_eq!(Keyword::from_str("if"), Some(Keyword::If));
        assert_eq!(Keyword::from_str("varip"), Some(Keyword::Varip));
        assert_eq!(Keyword::from_str("notakeyword"), None);
    }

    #[test]
    fn word_operator_recognizes_and_or_not() {
        assert_eq!(word_operator("and"), Some(Operator::And));
        assert_eq!(word_operator("or"), Some(Operator::Or));
        assert_eq!(word_operator("not"), Some(Operator::Not));
        assert_eq!(word_operator("andx"), None);
    }
}

//! Lexer with significant-indentation tokenization.
//!
//! Maintains a column-based indent stack; at each physical line start it
//! compares the new line's leading-whitespace column against the stack top
//! and emits the appropriate INDENT/DEDENT tokens so the parser never has to
//! rescan whitespace. A tab counts as 4 columns. Blank and comment-only lines
//! never affect the stack.

use crate::error::{CompileError, LexErrorKind};
use crate::intern::Interner;
use crate::span::Span;
use crate::token::{word_operator, Keyword, Token, TokenKind, OPERATOR_TABLE};

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    /// Column of `pos`, 0-based, counted in bytes (ASCII indentation only).
    col: u32,
    indent_stack: Vec<usize>,
    /// True once we're at the first byte of a new line and still owe
    /// INDENT/DEDENT handling before the next real token.
    at_line_start: bool,
    tokens: Vec<Token>,
    interner: Interner,
}

const TAB_WIDTH: usize = 4;

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 0,
            indent_stack: vec![0],
            at_line_start: true,
            tokens: Vec::new(),
            interner: Interner::new(),
        }
    }

    /// Tokenizes the entire source, returning the token stream and the
    /// interner populated with every identifier/string/number/color lexeme.
    pub fn tokenize(mut self) -> Result<(Vec<Token>, Interner), CompileError> {
        loop {
            if self.at_line_start {
                if !self.handle_line_start()? {
                    continue;
                }
            }
            if self.pos >= self.bytes.len() {
                break;
            }
            self.skip_intraline_whitespace();
            if self.pos >= self.bytes.len() {
                break;
            }
            if self.current() == b'\r' {
                self.advance_byte();
                continue;
            }
            if self.current() == b'\n' {
                self.push_zero(TokenKind::Newline);
                self.advance_byte();
                self.at_line_start = true;
                continue;
            }
            if self.try_skip_comment() {
                continue;
            }
            self.lex_token()?;
        }
        self.finish()
    }

    fn finish(mut self) -> Result<(Vec<Token>, Interner), CompileError> {
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push_zero(TokenKind::Dedent);
        }
        self.push_zero(TokenKind::Eof);
        Ok((self.tokens, self.interner))
    }

    /// Measures leading indentation of the current line and emits the
    /// resulting INDENT/DEDENT tokens. Returns `false` if the line turned out
    /// to be blank or comment-only: no layout tokens are emitted and the
    /// caller should fall through to scanning the next line.
    fn handle_line_start(&mut self) -> Result<bool, CompileError> {
        let mut indent = 0usize;
        let mut p = self.pos;
        while p < self.bytes.len() {
            match self.bytes[p] {
                b' ' => {
                    indent += 1;
                    p += 1;
                }
                b'\t' => {
                    indent += TAB_WIDTH;
                    p += 1;
                }
                _ => break,
            }
        }
        let consumed = p - self.pos;
        self.pos = p;
        self.col += consumed as u32;

        if p >= self.bytes.len()
            || matches!(self.bytes[p], b'\n' | b'\r')
            || self.is_comment_start(p)
        {
            self.at_line_start = false;
            return Ok(false);
        }

        let current = *self.indent_stack.last().unwrap();
        if indent > current {
            self.indent_stack.push(indent);
            self.push_zero(TokenKind::Indent);
        } else if indent < current {
            loop {
                let top = *self.indent_stack.last().unwrap();
                if indent < top {
                    self.indent_stack.pop();
                    self.push_zero(TokenKind::Dedent);
                    if self.indent_stack.is_empty() {
                        return Err(CompileError::Lex(
                            LexErrorKind::IndentationError { column: indent },
                            self.here(),
                        ));
                    }
                } else {
                    break;
                }
            }
            if *self.indent_stack.last().unwrap() != indent {
                return Err(CompileError::Lex(
                    LexErrorKind::IndentationError { column: indent },
                    self.here(),
                ));
            }
        }
        self.at_line_start = false;
        Ok(true)
    }

    /// `//version` at column 0 must NOT be treated as a comment: the `/`
    /// operator has to win there, matching the contract the lexer promises
    /// the parser for the version pragma line.
    fn is_comment_start(&self, p: usize) -> bool {
        if self.bytes.get(p) != Some(&b'/') || self.bytes.get(p + 1) != Some(&b'/') {
            return false;
        }
        if self.col == 0 && self.source[p..].starts_with("//version") {
            return false;
        }
        true
    }

    fn try_skip_comment(&mut self) -> bool {
        if !self.is_comment_start(self.pos) {
            return false;
        }
        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
            self.advance_byte();
        }
        true
    }

    fn skip_intraline_whitespace(&mut self) {
        while self.pos < self.bytes.len() && matches!(self.bytes[self.pos], b' ' | b'\t') {
            self.advance_byte();
        }
    }

    fn current(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn advance_byte(&mut self) {
        if self.bytes[self.pos] == b'\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        self.pos += 1;
    }

    fn here(&self) -> Span {
        Span::point(self.pos, self.line, self.col + 1)
    }

    fn push_zero(&mut self, kind: TokenKind) {
        let span = Span::point(self.pos, self.line, self.col + 1);
        self.tokens.push(Token::new(kind, span));
    }

    fn lex_token(&mut self) -> Result<(), CompileError> {
        let start = self.pos;
        let start_line = self.line;
        let start_col = self.col + 1;
        let c = self.current();

        let kind = match c {
            b'(' => { self.advance_byte(); TokenKind::LParen }
            b')' => { self.advance_byte(); TokenKind::RParen }
            b'[' => { self.advance_byte(); TokenKind::LBracket }
            b']' => { self.advance_byte(); TokenKind::RBracket }
            b'{' => { self.advance_byte(); TokenKind::LBrace }
            b'}' => { self.advance_byte(); TokenKind::RBrace }
            b',' => { self.advance_byte(); TokenKind::Comma }
            b'.' if !self.bytes.get(self.pos + 1).is_some_and(|b| b.is_ascii_digit()) => {
                self.advance_byte();
                TokenKind::Dot
            }
            b':' if self.bytes.get(self.pos + 1) != Some(&b'=') => {
                self.advance_byte();
                TokenKind::Colon
            }
            b'"' | b'\'' => self.lex_string(c)?,
            b'#' => self.lex_color()?,
            b'0'..=b'9' | b'.' => self.lex_number(),
            _ if is_ident_start(c) => self.lex_word(),
            _ => self.lex_operator()?,
        };

        let end = self.pos;
        let span = Span::new(start, end, start_line, start_col);
        self.tokens.push(Token::new(kind, span));
        Ok(())
    }

    fn lex_word(&mut self) -> TokenKind {
        let start = self.pos;
        while self.pos < self.bytes.len() && is_ident_continue(self.bytes[self.pos]) {
            self.advance_byte();
        }
        let text = &self.source[start..self.pos];
        if let Some(op) = word_operator(text) {
            return TokenKind::Operator(op);
        }
        match text {
            "true" => return TokenKind::Boolean(true),
            "false" => return TokenKind::Boolean(false),
            "na" => return TokenKind::Na,
            _ => {}
        }
        if let Some(kw) = Keyword::from_str(text) {
            return TokenKind::Keyword(kw);
        }
        let sym = self.interner.intern(text);
        TokenKind::Identifier(sym)
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.advance_byte();
        }
        if self.pos < self.bytes.len() && self.bytes[self.pos] == b'.' {
            self.advance_byte();
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                self.advance_byte();
            }
        }
        if self.pos < self.bytes.len() && matches!(self.bytes[self.pos], b'e' | b'E') {
            let save = (self.pos, self.col, self.line);
            self.advance_byte();
            if self.pos < self.bytes.len() && matches!(self.bytes[self.pos], b'+' | b'-') {
                self.advance_byte();
            }
            if self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                    self.advance_byte();
                }
            } else {
                (self.pos, self.col, self.line) = save;
            }
        }
        let text = &self.source[start..self.pos];
        let sym = self.interner.intern(text);
        TokenKind::Number(sym)
    }

    fn lex_string(&mut self, quote: u8) -> Result<TokenKind, CompileError> {
        let start_span = self.here();
        self.advance_byte(); // opening quote
        let mut value = String::new();
        loop {
            if self.pos >= self.bytes.len() {
                return Err(CompileError::Lex(LexErrorKind::UnterminatedString, start_span));
            }
            let b = self.bytes[self.pos];
            if b == quote {
                self.advance_byte();
                break;
            }
            if b == b'\n' {
                return Err(CompileError::Lex(LexErrorKind::UnterminatedString, start_span));
            }
            if b == b'\\' {
                self.advance_byte();
                if self.pos >= self.bytes.len() {
                    return Err(CompileError::Lex(LexErrorKind::UnterminatedString, start_span));
                }
                let esc = self.bytes[self.pos];
                value.push(match esc {
                    b'n' => '\n',
                    b'r' => '\r',
                    b't' => '\t',
                    b'\\' => '\\',
                    b'"' => '"',
                    b'\'' => '\'',
                    other => other as char,
                });
                self.advance_byte();
                continue;
            }
            let ch_len = utf8_len(b);
            let ch = self.source[self.pos..self.pos + ch_len].chars().next().unwrap();
            value.push(ch);
            for _ in 0..ch_len {
                self.advance_byte();
            }
        }
        let sym = self.interner.intern(&value);
        Ok(TokenKind::String(sym))
    }

    fn lex_color(&mut self) -> Result<TokenKind, CompileError> {
        let start = self.pos;
        self.advance_byte(); // '#'
        let hex_start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_hexdigit() {
            self.advance_byte();
        }
        let len = self.pos - hex_start;
        if !matches!(len, 3 | 6 | 8) {
            return Err(CompileError::Lex(
                LexErrorKind::UnexpectedChar('#'),
                Span::point(start, self.line, self.col),
            ));
        }
        let text = &self.source[start..self.pos];
        let sym = self.interner.intern(text);
        Ok(TokenKind::Color(sym))
    }

    fn lex_operator(&mut self) -> Result<TokenKind, CompileError> {
        let rest = &self.source[self.pos..];
        for (lexeme, op) in OPERATOR_TABLE {
            if rest.starts_with(lexeme) {
                for _ in 0..lexeme.len() {
                    self.advance_byte();
                }
                return Ok(TokenKind::Operator(*op));
            }
        }
        let c = rest.chars().next().unwrap();
        Err(CompileError::Lex(LexErrorKind::UnexpectedChar(c), self.here()))
    }
}

fn is_ident_start(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphabetic()
}

fn is_ident_continue(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

fn utf8_len(first_byte: u8) -> usize {
    if first_byte & 0x80 == 0 {
        1
    } else if first_byte & 0xE0 == 0xC0 {
        2
    } else if first_byte & 0xF0 == 0xE0 {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Operator, TokenKind};

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, _) = Lexer::new(source).tokenize().expect("lex ok");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn empty_source_lexes_to_eof_only() {
        assert_eq!(kinds(""), vec![TokenKind::Eof]);
    }

    #[test]
    fn whitespace_only_line_emits_no_layout() {
        assert_eq!(kinds("   \n"), vec![TokenKind::Eof]);
    }

    #[test]
    fn version_pragma_is_not_a_comment() {
        let ks = kinds("//version=5");
        assert!(matches!(ks[0], TokenKind::Operator(Operator::Slash)));
    }

    #[test]
    fn ordinary_comment_is_skipped() {
        let ks = kinds("// a real comment\nx = 1");
        assert!(ks.iter().any(|k| matches!(k, TokenKind::Identifier(_))));
        assert!(!ks.iter().any(|k| matches!(k, TokenKind::Operator(Operator::Slash))));
    }

    #[test]
    fn indentation_produces_balanced_indent_dedent() {
        let source = "if x\n    y = 1\nz = 2";
        let ks = kinds(source);
        let indents = ks.iter().filter(|k| matches!(k, TokenKind::Indent)).count();
        let dedents = ks.iter().filter(|k| matches!(k, TokenKind::Dedent)).count();
        assert_eq!(indents, dedents);
        assert_eq!(indents, 1);
    }

    #[test]
    fn maximal_munch_prefers_longest_operator() {
        let ks = kinds("a := b");
        assert!(ks.iter().any(|k| matches!(k, TokenKind::Operator(Operator::Walrus))));
    }

    #[test]
    fn string_escape_sequences_are_interpreted() {
        let (tokens, interner) = Lexer::new("\"a\\nb\"").tokenize().unwrap();
        if let TokenKind::String(sym) = tokens[0].kind {
            assert_eq!(interner.resolve(sym), "a\nb");
        } else {
            panic!("expected string token");
        }
    }

    #[test]
    fn escaped_quote_payload_survives_intact() {
        let source = "\"bad\\\"; drop table users; --\"";
        let (tokens, interner) = Lexer::new(source).tokenize().unwrap();
        if let TokenKind::String(sym) = tokens[0].kind {
            assert_eq!(interner.resolve(sym), "bad\"; drop table users; --");
        } else {
            panic!("expected string token");
        }
    }

    #[test]
    fn unterminated_string_fails() {
        assert!(Lexer::new("\"no closing quote").tokenize().is_err());
    }

    #[test]
    fn color_literal_accepts_3_6_8_hex_digits() {
        assert!(matches!(kinds("#fff")[0], TokenKind::Color(_)));
        assert!(matches!(kinds("#ff00ff")[0], TokenKind::Color(_)));
        assert!(matches!(kinds("#ff00ff80")[0], TokenKind::Color(_)));
    }

    #[test]
    fn word_operators_classify_as_operator_tokens() {
        let ks = kinds("a and b or not c");
        let ops: Vec<_> = ks
            .iter()
            .filter_map(|k| match k {
                TokenKind::Operator(op) => Some(*op),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![Operator::And, Operator::Or, Operator::Not]);
    }

    #[test]
    fn leading_dot_number_is_accepted() {
        assert!(matches!(kinds(".5")[0], TokenKind::Number(_)));
    }

    #[test]
    fn token_stream_always_terminates_with_eof() {
        let ks = kinds("x = 1\ny = 2");
        assert!(matches!(ks.last().unwrap(), TokenKind::Eof));
    }

    #[test]
    fn dedent_unwinds_multiple_levels_at_once() {
        let source = "if a\n    if b\n        x = 1\ny = 2";
        let ks = kinds(source);
        let dedent_run = ks
            .windows(2)
            .filter(|w| matches!(w[0], TokenKind::Dedent) && matches!(w[1], TokenKind::Dedent))
            .count();
        assert_eq!(dedent_run, 1);
    }

    #[test]
    fn crlf_line_endings_are_treated_as_single_newline() {
        let ks = kinds("x = 1\r\ny = 2\r\n");
        let newlines = ks.iter().filter(|k| matches!(k, TokenKind::Newline)).count();
        assert_eq!(newlines, 1);
    }
}

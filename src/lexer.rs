use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::source::{CharSource, StrSource};

#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Eof,
    Def,
    Extern,
    Ident(String),
    Number(f64),
    /// Any other single character: operators and punctuation.
    Char(char),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eof => write!(f, "end of input"),
            Token::Def => write!(f, "`def`"),
            Token::Extern => write!(f, "`extern`"),
            Token::Ident(name) => write!(f, "identifier `{}`", name),
            Token::Number(value) => write!(f, "number `{}`", value),
            Token::Char(c) => write!(f, "`{}`", c),
        }
    }
}

lazy_static! {
    // the longest prefix C's strtod would accept from a run of digits and dots
    static ref NUMBER_PREFIX_RE: Regex = Regex::new(r"^(\d+\.?\d*|\.\d+)").unwrap();
}

/// Convert accumulated digit/dot text into a value the way `strtod` does:
/// the longest valid prefix wins and text with no valid prefix is zero.
///
/// The flag is false when any of the text had to be dropped.
pub fn parse_number(text: &str) -> (f64, bool) {
    match NUMBER_PREFIX_RE.find(text) {
        Some(m) => {
            let value = m.as_str().parse().unwrap_or(0.0);
            (value, m.end() == text.len())
        }
        None => (0.0, false),
    }
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

/// Pull-based scanner. Only the last unconsumed character survives between
/// calls, the tokens themselves are handed straight to the caller.
pub struct Lexer<S: CharSource> {
    source: S,
    last_char: Option<char>,
    malformed_number: Option<String>,
}

impl<S: CharSource> Lexer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            last_char: Some(' '),
            malformed_number: None,
        }
    }

    fn advance(&mut self) -> Option<char> {
        self.last_char = self.source.next_char();
        self.last_char
    }

    /// Text of the most recent number token if it was not a well formed
    /// literal. Cleared by the next call to `next_token`.
    pub fn malformed_number(&self) -> Option<&str> {
        self.malformed_number.as_deref()
    }

    pub fn next_token(&mut self) -> Token {
        self.malformed_number = None;

        loop {
            while matches!(self.last_char, Some(c) if c.is_ascii_whitespace()) {
                self.advance();
            }

            let c = match self.last_char {
                Some(c) => c,
                None => return Token::Eof,
            };

            if c.is_ascii_alphabetic() {
                let mut ident = c.to_string();
                while let Some(c) = self.advance().filter(char::is_ascii_alphanumeric) {
                    ident.push(c);
                }
                return match ident.as_str() {
                    "def" => Token::Def,
                    "extern" => Token::Extern,
                    _ => Token::Ident(ident),
                };
            }

            if is_number_char(c) {
                let mut text = c.to_string();
                while let Some(c) = self.advance().filter(|&c| is_number_char(c)) {
                    text.push(c);
                }
                let (value, well_formed) = parse_number(&text);
                if !well_formed {
                    self.malformed_number = Some(text);
                }
                return Token::Number(value);
            }

            if c == '#' {
                while !matches!(self.advance(), None | Some('\n') | Some('\r')) {}
                continue;
            }

            self.advance();
            return Token::Char(c);
        }
    }
}

impl<'a> Lexer<StrSource<'a>> {
    pub fn from_text(input: &'a str) -> Self {
        Self::new(StrSource::new(input))
    }
}

/// Lex the whole input, the final token is always `Token::Eof`.
pub fn lex(input: &str) -> Vec<Token> {
    let mut lexer = Lexer::from_text(input);
    let mut res = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token == Token::Eof;
        res.push(token);
        if done {
            return res;
        }
    }
}

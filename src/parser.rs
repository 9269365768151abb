use std::collections::HashMap;
use std::mem;

use crate::ast::{ASTNode, Expression, Function, Prototype};
use crate::lexer::{Lexer, Token};
use crate::source::{CharSource, StrSource};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum ParserError {
    #[error("expected an expression, found {0}")]
    MalformedPrimary(Token),
    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: &'static str, found: Token },
    #[error("malformed numeric literal `{0}`")]
    MalformedNumericLiteral(String),
    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),
}

pub type PartialParseResult = Result<Expression, ParserError>;

/// Expression trees taller than this are rejected, so that walking them
/// recursively cannot exhaust the stack.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// What to do with digit/dot runs that are not a well formed number.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NumericLiterals {
    /// Keep the longest valid prefix, zero if there is none.
    Lenient,
    /// Reject the literal with `ParserError::MalformedNumericLiteral`.
    Strict,
}

impl Default for NumericLiterals {
    fn default() -> Self {
        NumericLiterals::Lenient
    }
}

/// Parser settings. Binary operators are single characters; anything missing
/// from `operator_precedence` ends an expression.
#[derive(Debug, Clone)]
pub struct Parser {
    pub operator_precedence: HashMap<char, i32>,
    pub numeric_literals: NumericLiterals,
    pub max_depth: usize,
}

impl std::default::Default for Parser {
    fn default() -> Self {
        let mut operator_precedence = HashMap::new();
        operator_precedence.insert('<', 10);
        operator_precedence.insert('+', 20);
        operator_precedence.insert('-', 20);
        operator_precedence.insert('*', 40);
        Self {
            operator_precedence,
            numeric_literals: NumericLiterals::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Parser {
    /// Add or re-rank a binary operator. Higher binds tighter.
    pub fn with_operator(mut self, op: char, precedence: i32) -> Self {
        self.operator_precedence.insert(op, precedence);
        self
    }

    pub fn with_numeric_literals(mut self, numeric_literals: NumericLiterals) -> Self {
        self.numeric_literals = numeric_literals;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Precedence of a token used as a binary operator, -1 if it isn't one.
    pub fn precedence(&self, token: &Token) -> i32 {
        match token {
            Token::Char(c) => self.operator_precedence.get(c).copied().unwrap_or(-1),
            _ => -1,
        }
    }

    pub fn session<S: CharSource>(&self, source: S) -> ParseSession<'_, S> {
        ParseSession::new(self, Lexer::new(source))
    }

    /// Parse every top-level construct in `input`, stopping at the first error.
    pub fn parse_str(&self, input: &str) -> Result<Vec<ASTNode>, ParserError> {
        self.session(StrSource::new(input)).collect()
    }

    /// Parse `input` as exactly one expression.
    pub fn parse_expr_str(&self, input: &str) -> PartialParseResult {
        let mut session = self.session(StrSource::new(input));
        let expr = session.parse_expression()?;
        match session.current() {
            Token::Eof => Ok(expr),
            found => Err(ParserError::UnexpectedToken {
                expected: "end of input",
                found: found.clone(),
            }),
        }
    }
}

/// Recursive descent over a live lexer with one token of lookahead.
pub struct ParseSession<'p, S: CharSource> {
    settings: &'p Parser,
    lexer: Lexer<S>,
    current: Token,
    // raw text of `current` when it is a number that didn't lex cleanly
    current_malformed: Option<String>,
    // height of the expression tree being built, bounded by `max_depth`
    depth: usize,
    failed: bool,
}

impl<'p, S: CharSource> ParseSession<'p, S> {
    pub fn new(settings: &'p Parser, lexer: Lexer<S>) -> Self {
        let mut session = Self {
            settings,
            lexer,
            current: Token::Eof,
            current_malformed: None,
            depth: 0,
            failed: false,
        };
        session.advance();
        session
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    /// Move to the next token, handing back the one just consumed.
    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        self.current_malformed = self.lexer.malformed_number().map(str::to_owned);
        mem::replace(&mut self.current, next)
    }

    fn expect_char(&mut self, c: char, expected: &'static str) -> Result<(), ParserError> {
        if self.current == Token::Char(c) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParserError {
        ParserError::UnexpectedToken {
            expected,
            found: self.current.clone(),
        }
    }

    fn nest(&mut self) -> Result<(), ParserError> {
        self.depth += 1;
        if self.depth > self.settings.max_depth {
            return Err(ParserError::TooDeep(self.settings.max_depth));
        }
        Ok(())
    }

    fn current_operator(&self) -> Option<(char, i32)> {
        match self.current {
            Token::Char(c) => Some((c, self.settings.precedence(&self.current))),
            _ => None,
        }
    }

    fn parse_number(&mut self) -> PartialParseResult {
        if let (Some(text), NumericLiterals::Strict) =
            (&self.current_malformed, self.settings.numeric_literals)
        {
            return Err(ParserError::MalformedNumericLiteral(text.clone()));
        }
        match self.advance() {
            Token::Number(num) => Ok(Expression::Literal(num)),
            found => Err(ParserError::MalformedPrimary(found)),
        }
    }

    fn parse_nested(&mut self) -> PartialParseResult {
        self.expect_char('(', "`(`")?;
        let outer = self.depth;
        self.nest()?;
        let res = self.parse_expression()?;
        self.depth = outer;
        self.expect_char(')', "`)`")?;
        Ok(res)
    }

    /// identifier, or identifier `(` expression (`,` expression)* `)`
    pub fn parse_identifier_expr(&mut self) -> PartialParseResult {
        let ident = match self.advance() {
            Token::Ident(ident) => ident,
            found => return Err(ParserError::MalformedPrimary(found)),
        };
        if self.current != Token::Char('(') {
            return Ok(Expression::Variable(ident));
        }
        self.advance();

        let mut args = Vec::new();
        if self.current == Token::Char(')') {
            self.advance();
            return Ok(Expression::Call(ident, args));
        }
        let outer = self.depth;
        self.nest()?;
        loop {
            args.push(self.parse_expression()?);
            match self.current {
                Token::Char(')') => {
                    self.advance();
                    self.depth = outer;
                    return Ok(Expression::Call(ident, args));
                }
                Token::Char(',') => {
                    self.advance();
                }
                _ => return Err(self.unexpected("`,` or `)` in argument list")),
            }
        }
    }

    pub fn parse_primary(&mut self) -> PartialParseResult {
        match self.current {
            Token::Ident(_) => self.parse_identifier_expr(),
            Token::Number(_) => self.parse_number(),
            Token::Char('(') => self.parse_nested(),
            _ => Err(ParserError::MalformedPrimary(self.current.clone())),
        }
    }

    /// Precedence climbing: fold `op primary` pairs onto `lhs` while the
    /// operator binds at least as tightly as `min_precedence`.
    ///
    /// Every fold makes the tree one level taller, so folds count against
    /// the depth limit just like nesting does.
    pub fn parse_bin_op_rhs(
        &mut self,
        min_precedence: i32,
        mut lhs: Expression,
    ) -> PartialParseResult {
        let outer = self.depth;
        loop {
            let (operator, precedence) = match self.current_operator() {
                Some((op, pr)) if pr >= 0 && pr >= min_precedence => (op, pr),
                _ => {
                    self.depth = outer;
                    return Ok(lhs);
                }
            };
            self.nest()?;
            self.advance();

            let mut rhs = self.parse_primary()?;

            if let Some((_, next_precedence)) = self.current_operator() {
                if precedence < next_precedence {
                    rhs = self.parse_bin_op_rhs(precedence + 1, rhs)?;
                }
            }

            lhs = Expression::binary(operator, lhs, rhs);
        }
    }

    pub fn parse_expression(&mut self) -> PartialParseResult {
        let lhs = self.parse_primary()?;
        self.parse_bin_op_rhs(0, lhs)
    }

    /// identifier `(` identifier* `)`
    pub fn parse_prototype(&mut self) -> Result<Prototype, ParserError> {
        let name = match self.current {
            Token::Ident(_) => match self.advance() {
                Token::Ident(name) => name,
                found => return Err(ParserError::MalformedPrimary(found)),
            },
            _ => return Err(self.unexpected("function name in prototype")),
        };
        self.expect_char('(', "`(` in prototype")?;

        let mut args = Vec::new();
        while let Token::Ident(_) = self.current {
            if let Token::Ident(arg) = self.advance() {
                args.push(arg);
            }
        }

        self.expect_char(')', "`)` or parameter name in prototype")?;
        Ok(Prototype::new(name, args))
    }

    /// `def` prototype expression
    pub fn parse_definition(&mut self) -> Result<Function, ParserError> {
        if self.current != Token::Def {
            return Err(self.unexpected("`def`"));
        }
        self.advance();
        let prototype = self.parse_prototype()?;
        let body = self.parse_expression()?;
        Ok(Function { prototype, body })
    }

    /// `extern` prototype
    pub fn parse_extern(&mut self) -> Result<Prototype, ParserError> {
        if self.current != Token::Extern {
            return Err(self.unexpected("`extern`"));
        }
        self.advance();
        self.parse_prototype()
    }

    pub fn parse_top_level_expr(&mut self) -> Result<Function, ParserError> {
        let body = self.parse_expression()?;
        Ok(Function {
            prototype: Prototype::anonymous(),
            body,
        })
    }

    /// Next top-level construct, `None` once the input is exhausted.
    pub fn parse_node(&mut self) -> Option<Result<ASTNode, ParserError>> {
        self.depth = 0;
        while self.current == Token::Char(';') {
            self.advance();
        }
        let node = match self.current {
            Token::Eof => return None,
            Token::Def => self.parse_definition().map(ASTNode::Function),
            Token::Extern => self.parse_extern().map(ASTNode::Extern),
            _ => self.parse_top_level_expr().map(ASTNode::Function),
        };
        Some(node)
    }
}

impl<'p, S: CharSource> Iterator for ParseSession<'p, S> {
    type Item = Result<ASTNode, ParserError>;

    /// Yields constructs until the input ends or the first error, which is
    /// the last item produced.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let node = self.parse_node()?;
        self.failed = node.is_err();
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lit(v: f64) -> Expression {
        Expression::Literal(v)
    }

    fn var(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    fn parse(input: &str) -> Expression {
        Parser::default().parse_expr_str(input).unwrap()
    }

    #[test]
    fn parse_expr_works() {
        let target = Expression::binary(
            '+',
            var("x"),
            Expression::binary('*', lit(1.0), Expression::binary('-', lit(2.0), lit(3.0))),
        );
        assert_eq!(parse("x + 1 * (2 - 3)"), target);
    }

    #[test]
    fn multiplication_binds_tighter() {
        assert_eq!(parse("1+2*3").to_string(), "(1 + (2 * 3))");
        assert_eq!(parse("2*3+1").to_string(), "((2 * 3) + 1)");
    }

    #[test]
    fn equal_precedence_folds_left() {
        assert_eq!(parse("1+2-3").to_string(), "((1 + 2) - 3)");
        assert_eq!(parse("a-b-c-d").to_string(), "(((a - b) - c) - d)");
    }

    #[test]
    fn comparison_binds_loosest() {
        assert_eq!(parse("a+1<b*2").to_string(), "((a + 1) < (b * 2))");
        assert_eq!(parse("a<b+c*d-e").to_string(), "(a < ((b + (c * d)) - e))");
    }

    #[test]
    fn higher_then_lower_precedence_returns_to_outer_loop() {
        assert_eq!(parse("a+b*c*d+e").to_string(), "((a + ((b * c) * d)) + e)");
        assert_eq!(parse("a<b*c+d").to_string(), "(a < ((b * c) + d))");
    }

    #[test]
    fn calls_and_variables() {
        assert_eq!(
            parse("foo(1, x+2, bar())"),
            Expression::Call(
                "foo".to_string(),
                vec![
                    lit(1.0),
                    Expression::binary('+', var("x"), lit(2.0)),
                    Expression::Call("bar".to_string(), vec![]),
                ]
            )
        );
        assert_eq!(parse("foo"), var("foo"));
    }

    #[test]
    fn call_arguments_need_commas() {
        let err = Parser::default().parse_expr_str("foo(1 2)").unwrap_err();
        assert_eq!(
            err,
            ParserError::UnexpectedToken {
                expected: "`,` or `)` in argument list",
                found: Token::Number(2.0),
            }
        );
    }

    #[test]
    fn malformed_primary_is_reported() {
        let err = Parser::default().parse_expr_str("1 + )").unwrap_err();
        assert_eq!(err, ParserError::MalformedPrimary(Token::Char(')')));

        let err = Parser::default().parse_expr_str("").unwrap_err();
        assert_eq!(err, ParserError::MalformedPrimary(Token::Eof));
    }

    #[test]
    fn unclosed_paren_is_reported() {
        let err = Parser::default().parse_expr_str("(1 + 2").unwrap_err();
        assert_eq!(
            err,
            ParserError::UnexpectedToken {
                expected: "`)`",
                found: Token::Eof,
            }
        );
    }

    #[test]
    fn custom_operator_precedence() {
        let parser = Parser::default().with_operator('/', 40).with_operator('+', 50);
        let expr = parser.parse_expr_str("1*2+3/4").unwrap();
        assert_eq!(expr.to_string(), "((1 * (2 + 3)) / 4)");
    }

    #[test]
    fn parses_top_level_constructs() {
        let ast = Parser::default()
            .parse_str("extern sin(x); def foo(a b) a+b; foo(1, 2) # trailing\n")
            .unwrap();
        assert_eq!(
            ast,
            vec![
                ASTNode::Extern(Prototype::new("sin", vec!["x".to_string()])),
                ASTNode::Function(Function {
                    prototype: Prototype::new("foo", vec!["a".to_string(), "b".to_string()]),
                    body: Expression::binary('+', var("a"), var("b")),
                }),
                ASTNode::Function(Function {
                    prototype: Prototype::anonymous(),
                    body: Expression::Call("foo".to_string(), vec![lit(1.0), lit(2.0)]),
                }),
            ]
        );
    }

    #[test]
    fn prototype_parentheses_are_checked() {
        let err = Parser::default().parse_str("def foo a b) a").unwrap_err();
        assert_eq!(
            err,
            ParserError::UnexpectedToken {
                expected: "`(` in prototype",
                found: Token::Ident("a".to_string()),
            }
        );

        let err = Parser::default().parse_str("extern foo(a, b)").unwrap_err();
        assert_eq!(
            err,
            ParserError::UnexpectedToken {
                expected: "`)` or parameter name in prototype",
                found: Token::Char(','),
            }
        );

        let err = Parser::default().parse_str("def 1(a) a").unwrap_err();
        assert_eq!(
            err,
            ParserError::UnexpectedToken {
                expected: "function name in prototype",
                found: Token::Number(1.0),
            }
        );
    }

    #[test]
    fn session_stops_after_first_error() {
        let parser = Parser::default();
        let mut session = parser.session(StrSource::new("1; def (x) x; 2"));
        assert!(session.next().unwrap().is_ok());
        assert!(session.next().unwrap().is_err());
        assert!(session.next().is_none());
    }

    #[test]
    fn numeric_literal_policy() {
        assert_eq!(parse("1.2.3"), lit(1.2));

        let strict = Parser::default().with_numeric_literals(NumericLiterals::Strict);
        assert_eq!(strict.parse_expr_str("1.5 + 2").unwrap().to_string(), "(1.5 + 2)");
        assert_eq!(
            strict.parse_expr_str("1 + 1.2.3").unwrap_err(),
            ParserError::MalformedNumericLiteral("1.2.3".to_string())
        );
    }

    #[test]
    fn long_chains_hit_the_depth_limit() {
        let sum = vec!["1"; 100_000].join("+");
        assert_eq!(
            Parser::default().parse_expr_str(&sum).unwrap_err(),
            ParserError::TooDeep(DEFAULT_MAX_DEPTH)
        );

        let nested = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert_eq!(
            Parser::default().parse_expr_str(&nested).unwrap_err(),
            ParserError::TooDeep(DEFAULT_MAX_DEPTH)
        );

        let calls = format!("{}x{}", "f(".repeat(100_000), ")".repeat(100_000));
        assert_eq!(
            Parser::default().parse_expr_str(&calls).unwrap_err(),
            ParserError::TooDeep(DEFAULT_MAX_DEPTH)
        );
    }

    #[test]
    fn depth_limit_is_configurable() {
        let parser = Parser::default().with_max_depth(3);
        assert_eq!(parser.parse_expr_str("1+2+3+4").unwrap().to_string(), "(((1 + 2) + 3) + 4)");
        assert_eq!(parser.parse_expr_str("1+2+3+4+5").unwrap_err(), ParserError::TooDeep(3));
        assert_eq!(parser.parse_expr_str("((a))").unwrap(), var("a"));
        assert_eq!(parser.parse_expr_str("((((a))))").unwrap_err(), ParserError::TooDeep(3));

        let sum = vec!["1"; 200].join("+");
        assert!(Parser::default().parse_expr_str(&sum).is_ok());
    }

    #[test]
    fn trailing_tokens_rejected_by_single_expression_parse() {
        let err = Parser::default().parse_expr_str("1 2").unwrap_err();
        assert_eq!(
            err,
            ParserError::UnexpectedToken {
                expected: "end of input",
                found: Token::Number(2.0),
            }
        );
    }
}

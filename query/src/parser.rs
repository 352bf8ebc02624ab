use crate::error::{QueryError, Result};
use crate::operator::Operator;
use crate::types::{FilterValue, Node, Query};
use regex::Regex;
use std::sync::OnceLock;

static UNQUOTED_REGEX: OnceLock<Regex> = OnceLock::new();

fn unquoted_regex() -> &'static Regex {
    UNQUOTED_REGEX.get_or_init(|| Regex::new(r"^(\w*)(!?=)(/.*/i?)$").unwrap())
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LBracket,
    RBracket,
    Not,
    Or,
    Cond {
        field: String,
        operator: Operator,
        value: FilterValue,
    },
    Value(FilterValue),
}

#[derive(Debug, Clone, PartialEq)]
struct Lexeme {
    token: Token,
    pos: usize,
}

struct Tokenizer<'a> {
    source: &'a str,
    input: Vec<char>,
    pos: usize,
    /// Open `[` groups, so a glued `]` can close one.
    depth: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            input: source.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_while<F>(&mut self, predicate: F) -> String
    where
        F: Fn(char) -> bool,
    {
        let mut result = String::new();
        while let Some(ch) = self.peek() {
            if predicate(ch) {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    /// True when the character at `offset` ends a token.
    fn at_boundary(&self, offset: usize) -> bool {
        self.peek_at(offset).map_or(true, char::is_whitespace)
    }

    /// Whether the `[` at the current position opens a group.
    ///
    /// A `[` glued to the following word opens a group unless the word reads as
    /// a glob character class like `[ARCH]*`.
    fn opens_group(&self) -> bool {
        if self.at_boundary(1) || self.peek_at(1) == Some('[') {
            return true;
        }
        let rest = &self.input[self.pos + 1..];
        if !rest.iter().take_while(|c| !c.is_whitespace()).any(|c| *c == ']') {
            return true;
        }
        let word_len = rest
            .iter()
            .take_while(|c| c.is_alphanumeric() || **c == '_')
            .count();
        word_len > 0 && self.conditional_at(self.pos + 1 + word_len).is_some()
    }

    /// `NOT` glued to the `[` of its group.
    fn at_glued_not(&self) -> bool {
        self.input[self.pos..].starts_with(&['N', 'O', 'T', '['])
    }

    fn next_non_whitespace(&self, offset: usize) -> Option<char> {
        self.input
            .iter()
            .skip(self.pos + offset)
            .copied()
            .find(|c| !c.is_whitespace())
    }

    fn error(&self, position: usize, message: impl Into<String>) -> QueryError {
        QueryError::syntax(self.source, position, message)
    }

    fn tokenize(&mut self) -> Result<Vec<Lexeme>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let pos = self.pos;
            let ch = match self.peek() {
                Some(c) => c,
                None => break,
            };

            let token = match ch {
                '[' if self.opens_group() => {
                    self.advance();
                    self.depth += 1;
                    Token::LBracket
                }
                ']' => {
                    self.advance();
                    self.depth = self.depth.saturating_sub(1);
                    Token::RBracket
                }
                '!' if self.next_non_whitespace(1) == Some('[') => {
                    self.advance();
                    Token::Not
                }
                'N' if self.at_glued_not() => {
                    self.pos += 3;
                    Token::Not
                }
                '"' => Token::Value(self.read_quoted()?),
                _ => self.read_condition()?,
            };
            tokens.push(Lexeme { token, pos });
        }

        Ok(tokens)
    }

    fn read_quoted(&mut self) -> Result<FilterValue> {
        let start = self.pos;
        self.advance();
        let text = self.read_while(|c| c != '"');
        if self.advance() != Some('"') {
            return Err(self.error(start, "unterminated quoted value"));
        }
        if !self.at_boundary(0) && !self.at_closing_bracket() {
            return Err(self.error(self.pos, "expected whitespace after quoted value"));
        }
        Ok(FilterValue::quoted(text))
    }

    fn at_closing_bracket(&self) -> bool {
        self.depth > 0 && self.peek() == Some(']')
    }

    /// Read an unquoted value up to whitespace.
    ///
    /// Inside a group a `]` ends the value, unless it closes a character class
    /// the value opened.
    fn read_bare(&mut self) -> String {
        let mut text = String::new();
        let mut in_class = false;
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || (!in_class && !text.is_empty() && self.at_closing_bracket()) {
                break;
            }
            match ch {
                '[' => in_class = true,
                ']' => in_class = false,
                _ => {}
            }
            text.push(ch);
            self.advance();
        }
        text
    }

    /// Match a conditional at absolute position `at`, returning operator and length.
    ///
    /// `=+` and `=-` are operators only in front of a quoted value, otherwise the
    /// sign belongs to the value (`ratio=+1`).
    fn conditional_at(&self, at: usize) -> Option<(Operator, usize)> {
        let pair: String = self.input.iter().skip(at).take(2).collect();
        if let Some(operator) = Operator::from_conditional(&pair) {
            let signed = matches!(pair.as_str(), "=+" | "=-");
            if !signed || self.input.get(at + 2) == Some(&'"') {
                return Some((operator, 2));
            }
        }
        let single = self.input.get(at)?.to_string();
        Operator::from_conditional(&single).map(|operator| (operator, 1))
    }

    fn read_condition(&mut self) -> Result<Token> {
        let start = self.pos;
        let word_len = self.input[start..]
            .iter()
            .take_while(|c| c.is_alphanumeric() || **c == '_')
            .count();

        if word_len > 0 {
            if let Some((operator, len)) = self.conditional_at(start + word_len) {
                let field: String = self.input[start..start + word_len].iter().collect();
                self.pos += word_len + len;
                let value = match self.peek() {
                    Some('"') => self.read_quoted()?,
                    Some(c) if !c.is_whitespace() && !self.at_closing_bracket() => {
                        FilterValue::bare(self.read_bare())
                    }
                    _ => {
                        return Err(self.error(
                            self.pos,
                            format!("missing value after '{}{}'", field, operator.symbol()),
                        ))
                    }
                };
                return Ok(Token::Cond {
                    field,
                    operator,
                    value,
                });
            }
        }

        let text = self.read_bare();
        match text.as_str() {
            "OR" => Ok(Token::Or),
            "NOT" if self.next_non_whitespace(0) == Some('[') => Ok(Token::Not),
            "NOT" => Err(self.error(start, "NOT must be followed by a '[ ... ]' group")),
            _ => Ok(Token::Value(FilterValue::bare(text))),
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Lexeme>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, tokens: Vec<Lexeme>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|lexeme| &lexeme.token)
    }

    fn advance(&mut self) -> Option<Lexeme> {
        let lexeme = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        lexeme
    }

    /// Character position of the next token, or end of input.
    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|lexeme| lexeme.pos)
            .unwrap_or_else(|| self.source.chars().count())
    }

    fn error(&self, position: usize, message: impl Into<String>) -> QueryError {
        QueryError::syntax(self.source, position, message)
    }

    fn parse(&mut self) -> Result<Node> {
        if self.tokens.is_empty() {
            return Err(self.error(0, "empty filter"));
        }

        let root = self.parse_or_stmt()?;
        if self.peek().is_some() {
            return Err(self.error(self.position(), "unbalanced ']' without matching '['"));
        }
        Ok(root)
    }

    fn parse_or_stmt(&mut self) -> Result<Node> {
        let mut alternatives = vec![self.parse_conds()?];
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            alternatives.push(self.parse_conds()?);
        }
        Ok(Node::OrStmt(alternatives))
    }

    fn parse_conds(&mut self) -> Result<Node> {
        let mut conds = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token, Token::Or | Token::RBracket) {
                break;
            }
            conds.push(self.parse_cond()?);
        }

        if conds.is_empty() {
            return Err(self.error(self.position(), "expected a condition"));
        }
        Ok(Node::Conds(conds))
    }

    fn parse_cond(&mut self) -> Result<Node> {
        let position = self.position();
        let lexeme = match self.advance() {
            Some(lexeme) => lexeme,
            None => return Err(self.error(position, "expected a condition")),
        };

        match lexeme.token {
            Token::LBracket => self.parse_group(lexeme.pos, false),
            Token::Not => match self.advance() {
                Some(Lexeme {
                    token: Token::LBracket,
                    pos,
                }) => self.parse_group(pos, true),
                _ => Err(self.error(lexeme.pos, "NOT must be followed by a '[ ... ]' group")),
            },
            Token::Cond {
                field,
                operator,
                value,
            } => Ok(Node::NamedCond {
                field,
                operator,
                value,
            }),
            Token::Value(value) => Ok(Node::UnnamedCond(value)),
            Token::Or | Token::RBracket => Err(self.error(lexeme.pos, "expected a condition")),
        }
    }

    fn parse_group(&mut self, open: usize, negated: bool) -> Result<Node> {
        let stmt = self.parse_or_stmt()?;
        match self.advance() {
            Some(Lexeme {
                token: Token::RBracket,
                ..
            }) => Ok(Node::Group {
                negated,
                stmt: Box::new(stmt),
            }),
            _ => Err(self.error(open, "unbalanced '[' without matching ']'")),
        }
    }
}

/// Parse a filter string into a parse tree.
pub fn parse_query(input: &str) -> Result<Query> {
    let tokens = Tokenizer::new(input).tokenize()?;
    let root = Parser::new(input, tokens).parse()?;
    Ok(Query {
        source: input.to_string(),
        root,
    })
}

/// Join command line arguments into one filter string.
///
/// Arguments the shell kept together because they contain spaces are quoted,
/// so `"arch linux"` stays a single value instead of two conditions.
pub fn join_cli_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| {
            let arg = arg.as_ref();
            if !arg.contains(' ') {
                return arg.to_string();
            }
            if !arg.contains(['=', '>', '<']) && !arg.starts_with('"') {
                return format!("\"{}\"", arg);
            }
            unquoted_regex()
                .replace(arg, "${1}${2}\"${3}\"")
                .into_owned()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

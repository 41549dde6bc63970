//! Turning lines of source text into instructions.
use std::rc::Rc;

use rustc_hash::FxHashMap as HashMap;
use thiserror::Error;

use crate::ops::Instruction;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("Unknown token `{token}` at line {line}, column {column}.")]
    UnknownToken { token: String, line: usize, column: usize },
    #[error("Number `{token}` at line {line}, column {column} does not fit into 32 bits.")]
    InvalidNumber { token: String, line: usize, column: usize },
    #[error("Unexpected end of line {line}, expected {expected}.")]
    UnexpectedEndOfLine { expected: &'static str, line: usize },
    #[error("`{construct}` at line {line}, column {column} is missing its `{expected}`.")]
    Unterminated { construct: String, expected: &'static str, line: usize, column: usize },
    #[error("Unexpected `{token}` at line {line}, column {column}.")]
    UnexpectedToken { token: String, line: usize, column: usize },
    #[error("Function definitions cannot be nested (line {line}, column {column}).")]
    NestedDefinition { line: usize, column: usize },
    #[error("`IF` is only allowed inside a function body (line {line}, column {column}).")]
    ConditionalOutsideFunction { line: usize, column: usize },
}

/// Function bodies by name.
///
/// Entries are only ever added or overwritten, never removed.
#[derive(Debug, Default, Clone)]
pub struct FunctionTable {
    functions: HashMap<Rc<str>, Rc<[Instruction]>>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Rc<[Instruction]>> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registers `body` under `name` and returns the body it replaced, if any.
    pub fn insert(&mut self, name: Rc<str>, body: Rc<[Instruction]>) -> Option<Rc<[Instruction]>> {
        self.functions.insert(name, body)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Names of all defined functions, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|name| &**name).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Token<'a> {
    text: &'a str,
    /// 1-based, counted in characters.
    column: usize,
}

fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut current: Option<(usize, usize)> = None;
    for (column, (offset, c)) in line.char_indices().enumerate() {
        if c.is_whitespace() {
            if let Some((start, start_column)) = current.take() {
                tokens.push(Token { text: &line[start..offset], column: start_column + 1 });
            }
        } else if current.is_none() {
            current = Some((offset, column));
        }
    }
    if let Some((start, start_column)) = current {
        tokens.push(Token { text: &line[start..], column: start_column + 1 });
    }
    tokens
}

/// An optional minus sign followed by at least one ASCII digit.
fn is_number(word: &str) -> bool {
    let digits = word.strip_prefix('-').unwrap_or(word);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn parse_number(token: Token, line: usize) -> Result<Instruction, ParserError> {
    token.text.parse::<i32>().map(Instruction::Number).map_err(|_| ParserError::InvalidNumber {
        token: token.text.to_string(),
        line,
        column: token.column,
    })
}

type Tokens<'a> = std::vec::IntoIter<Token<'a>>;

/// Parses source lines, keeping the functions defined so far.
///
/// # Example
/// ```
/// use obsolete::parser::Parser;
///
/// let mut parser = Parser::new();
/// parser.parse("DEF SQ DUP MUL END").unwrap();
/// let ops = parser.parse("3 SQ OUT").unwrap();
/// assert_eq!(ops.len(), 3);
/// assert!(parser.functions().contains("SQ"));
/// ```
#[derive(Debug, Default)]
pub struct Parser {
    functions: FunctionTable,
    lines_parsed: usize,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Parses one line. Functions defined on this line are registered as soon
    /// as their `END` is read, even if a later token on the line fails.
    pub fn parse(&mut self, line: &str) -> Result<Vec<Instruction>, ParserError> {
        self.lines_parsed += 1;
        let line_number = self.lines_parsed;
        let mut tokens = tokenize(line).into_iter();
        let mut instructions = Vec::new();
        while let Some(token) = tokens.next() {
            instructions.push(self.parse_token(token, &mut tokens, line_number)?);
        }
        Ok(instructions)
    }

    fn parse_token(&mut self, token: Token, tokens: &mut Tokens, line: usize) -> Result<Instruction, ParserError> {
        if is_number(token.text) {
            return parse_number(token, line);
        }
        if let Some(instruction) = Instruction::by_keyword(token.text) {
            return Ok(instruction);
        }
        match token.text {
            "DEF" => self.parse_definition(token, tokens, line),
            name if self.functions.contains(name) => Ok(Instruction::FunctionCall(name.into())),
            "IF" => Err(ParserError::ConditionalOutsideFunction { line, column: token.column }),
            _ => Err(ParserError::UnknownToken { token: token.text.to_string(), line, column: token.column }),
        }
    }

    fn parse_definition(&mut self, def: Token, tokens: &mut Tokens, line: usize) -> Result<Instruction, ParserError> {
        let name_token = tokens.next().ok_or(ParserError::UnexpectedEndOfLine { expected: "a function name", line })?;
        let name: Rc<str> = name_token.text.into();

        let body_parser = BodyParser { functions: &self.functions, name: &name, line };
        let mut body = Vec::new();
        loop {
            let token = tokens.next().ok_or_else(|| ParserError::Unterminated {
                construct: format!("DEF {name}"),
                expected: "END",
                line,
                column: def.column,
            })?;
            if token.text == "END" {
                break;
            }
            body.push(body_parser.parse_token(token, tokens)?);
        }

        let body: Rc<[Instruction]> = body.into();
        self.functions.insert(name.clone(), body.clone());
        Ok(Instruction::FunctionDefinition { name, body })
    }
}

/// Parses the inside of a single `DEF`.
struct BodyParser<'p> {
    functions: &'p FunctionTable,
    /// The function being defined; it may call itself before it is registered.
    name: &'p str,
    line: usize,
}

impl BodyParser<'_> {
    fn parse_token(&self, token: Token, tokens: &mut Tokens) -> Result<Instruction, ParserError> {
        let line = self.line;
        if is_number(token.text) {
            return parse_number(token, line);
        }
        if let Some(instruction) = Instruction::by_keyword(token.text) {
            return Ok(instruction);
        }
        match token.text {
            "IF" => self.parse_conditional(token, tokens),
            "DEF" => Err(ParserError::NestedDefinition { line, column: token.column }),
            // Block keywords out of place may still name a function.
            name if name == self.name || self.functions.contains(name) => Ok(Instruction::FunctionCall(name.into())),
            "END" | "ELS" | "FI" => {
                Err(ParserError::UnexpectedToken { token: token.text.to_string(), line, column: token.column })
            }
            _ => Err(ParserError::UnknownToken { token: token.text.to_string(), line, column: token.column }),
        }
    }

    fn parse_conditional(&self, if_token: Token, tokens: &mut Tokens) -> Result<Instruction, ParserError> {
        let mut then_branch = Vec::new();
        let mut else_branch = Vec::new();
        let mut in_else = false;
        loop {
            let token = tokens.next().ok_or_else(|| ParserError::Unterminated {
                construct: "IF".to_string(),
                expected: "FI",
                line: self.line,
                column: if_token.column,
            })?;
            match token.text {
                "FI" => break,
                "ELS" if !in_else => in_else = true,
                _ => {
                    let instruction = self.parse_token(token, tokens)?;
                    if in_else {
                        else_branch.push(instruction);
                    } else {
                        then_branch.push(instruction);
                    }
                }
            }
        }
        Ok(Instruction::Conditional { then_branch, else_branch })
    }
}

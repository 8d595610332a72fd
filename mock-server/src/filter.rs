//! The subset of the TestMonitor filter language the mock understands.
//!
//! ```text
//! expr    := and ( "||" and )*
//! and     := primary ( "&&" primary )*
//! primary := "(" expr ")" | field ( "==" | "!=" ) "@" index
//! ```
//!
//! Placeholders are resolved against the request's substitutions when the
//! filter is parsed, so a missing substitution is a parse error.

use thiserror::Error;

use crate::TestResult;

/// Deepest parenthesis nesting a filter may use.
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected end of filter")]
    UnexpectedEnd,

    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("no substitution for @{0}")]
    MissingSubstitution(usize),

    #[error("filter nests deeper than {0} levels")]
    TooDeep(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Placeholder(usize),
    Eq,
    Ne,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '@' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                if end == start {
                    return Err(FilterError::UnexpectedChar('@', i));
                }
                let digits: String = chars[start..end].iter().collect();
                let index = digits
                    .parse()
                    .map_err(|_| FilterError::UnexpectedToken(format!("@{digits}")))?;
                tokens.push(Token::Placeholder(index));
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(FilterError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

/// A result field the filter can compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Id,
    ProgramName,
    PartNumber,
    SerialNumber,
    HostName,
    Operator,
    SystemId,
    Workspace,
    StatusType,
    StatusName,
    Property(String),
}

impl Field {
    fn parse(name: &str) -> Result<Self, FilterError> {
        Ok(match name {
            "id" => Field::Id,
            "programName" => Field::ProgramName,
            "partNumber" => Field::PartNumber,
            "serialNumber" => Field::SerialNumber,
            "hostName" => Field::HostName,
            "operator" => Field::Operator,
            "systemId" => Field::SystemId,
            "workspace" => Field::Workspace,
            "status.statusType" => Field::StatusType,
            "status.statusName" => Field::StatusName,
            other => match other.strip_prefix("properties.") {
                Some(key) if !key.is_empty() => Field::Property(key.to_string()),
                _ => return Err(FilterError::UnknownField(other.to_string())),
            },
        })
    }

    pub fn value<'a>(&self, result: &'a TestResult) -> Option<&'a str> {
        match self {
            Field::Id => Some(result.id.as_str()),
            Field::ProgramName => Some(result.program_name.as_str()),
            Field::PartNumber => result.part_number.as_deref(),
            Field::SerialNumber => result.serial_number.as_deref(),
            Field::HostName => result.host_name.as_deref(),
            Field::Operator => result.operator.as_deref(),
            Field::SystemId => result.system_id.as_deref(),
            Field::Workspace => Some(result.workspace.as_str()),
            Field::StatusType => Some(result.status.status_type.as_str()),
            Field::StatusName => result.status.status_name.as_deref(),
            Field::Property(key) => result.properties.get(key).map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    Compare { field: Field, equal: bool, value: String },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    /// Parse `expr`, resolving placeholders against `substitutions`.
    /// A missing or blank filter matches everything.
    pub fn parse(expr: Option<&str>, substitutions: &[String]) -> Result<Self, FilterError> {
        let expr = match expr {
            Some(e) if !e.trim().is_empty() => e,
            _ => return Ok(Filter::All),
        };
        let tokens = tokenize(expr)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
            substitutions,
        };
        let filter = parser.expr()?;
        match parser.peek() {
            None => Ok(filter),
            Some(token) => Err(FilterError::UnexpectedToken(format!("{token:?}"))),
        }
    }

    pub fn matches(&self, result: &TestResult) -> bool {
        match self {
            Filter::All => true,
            Filter::Compare { field, equal, value } => {
                (field.value(result) == Some(value.as_str())) == *equal
            }
            Filter::And(a, b) => a.matches(result) && b.matches(result),
            Filter::Or(a, b) => a.matches(result) || b.matches(result),
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    substitutions: &'a [String],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, FilterError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(FilterError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn expr(&mut self) -> Result<Filter, FilterError> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = Filter::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Filter, FilterError> {
        let mut left = self.primary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.primary()?;
            left = Filter::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Filter, FilterError> {
        match self.next()? {
            Token::Open => {
                if self.depth == MAX_DEPTH {
                    return Err(FilterError::TooDeep(MAX_DEPTH));
                }
                self.depth += 1;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.next()? {
                    Token::Close => Ok(inner),
                    other => Err(FilterError::UnexpectedToken(format!("{other:?}"))),
                }
            }
            Token::Ident(name) => {
                let field = Field::parse(&name)?;
                let equal = match self.next()? {
                    Token::Eq => true,
                    Token::Ne => false,
                    other => return Err(FilterError::UnexpectedToken(format!("{other:?}"))),
                };
                let value = match self.next()? {
                    Token::Placeholder(index) => self
                        .substitutions
                        .get(index)
                        .cloned()
                        .ok_or(FilterError::MissingSubstitution(index))?,
                    other => return Err(FilterError::UnexpectedToken(format!("{other:?}"))),
                };
                Ok(Filter::Compare { field, equal, value })
            }
            other => Err(FilterError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

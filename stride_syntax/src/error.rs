use std::fmt::Display;

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("IndentationError: unindent does not match any outer indentation level at line {line}")]
    Indentation { line: usize },
    #[error("LexError: unexpected character '{ch}' at line {line}")]
    UnexpectedChar { ch: char, line: usize },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            Self::Indentation { line } | Self::UnexpectedChar { line, .. } => *line,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("SyntaxError: {msg} at line {line}, found {found}")]
pub struct ParseError {
    pub msg: ErrorMsg,
    pub found: String,
    pub line: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorMsg {
    ExpectedColon,
    ExpectedNewline,
    ExpectedIndent,
    ExpectedDedent,
    ExpectedIdent,
    ExpectedIn,
    ExpectedAssign,
    MissingOpeningParen,
    MissingClosingParen,
    MissingClosingBracket,
    InvalidNumber,
    UnexpectedToken,
}

impl Display for ErrorMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::ExpectedColon => "expected ':'",
            Self::ExpectedNewline => "expected newline",
            Self::ExpectedIndent => "expected an indented block",
            Self::ExpectedDedent => "expected end of block",
            Self::ExpectedIdent => "expected identifier",
            Self::ExpectedIn => "expected 'in'",
            Self::ExpectedAssign => "expected '='",
            Self::MissingOpeningParen => "expected '('",
            Self::MissingClosingParen => "expected ')'",
            Self::MissingClosingBracket => "expected ']'",
            Self::InvalidNumber => "invalid number literal",
            Self::UnexpectedToken => "unexpected token",
        })
    }
}

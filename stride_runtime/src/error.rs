use std::fmt::Display;

use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NameError,
    TypeError,
    ValueError,
    IndexError,
    ArgumentError,
    AttributeError,
    /// Raised for `return` outside of a function body
    SyntaxError,
    /// Raised by host commands
    CommandError,
    /// Raised when calls nest deeper than the interpreter allows
    RecursionError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NameError => "NameError",
            Self::TypeError => "TypeError",
            Self::ValueError => "ValueError",
            Self::IndexError => "IndexError",
            Self::ArgumentError => "ArgumentError",
            Self::AttributeError => "AttributeError",
            Self::SyntaxError => "SyntaxError",
            Self::CommandError => "CommandError",
            Self::RecursionError => "RecursionError",
        })
    }
}

/// A failure raised while a script is executing. The line is filled in by
/// the innermost statement or expression that observes the error.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<usize>,
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(line) = self.line {
            write!(f, " at line {line}")?;
        }
        Ok(())
    }
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    /// Attaches `line` unless a more precise one is already present.
    pub fn at(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }
}

pub fn make(kind: ErrorKind, message: impl Into<String>) -> RuntimeError {
    RuntimeError::new(kind, message)
}

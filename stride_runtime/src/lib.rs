pub mod console;
pub mod driver;
pub mod environment;
pub mod error;
pub mod host;
pub mod interpret;
pub mod runner;
pub mod stdlib;
pub mod suspend;
pub mod tracker;
pub mod value;

use driver::{Driver, DriverConfig, Outcome};
use error::RuntimeError;
use interpret::Interpreter;
use log::trace;
use stride_syntax::{
    ast::Source,
    error::{LexError, ParseError},
    lex::Lexer,
    parse::Parser,
};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ScriptError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl ScriptError {
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Lex(e) => Some(e.line()),
            Self::Parse(e) => Some(e.line),
            Self::Runtime(e) => e.line,
        }
    }
}

/// Lexes and parses `source` into a program.
pub fn compile(source: &str) -> Result<Source, ScriptError> {
    trace!("Lexing {source}");
    let tokens = Lexer::new(source).lex_all()?;
    trace!("Parsing {tokens:#?}");
    let program = Parser::new(&tokens).parse_all()?;
    trace!("Compiled {program:#?}");
    Ok(program)
}

/// Compiles and runs `source` on `interpreter` to the end without pacing.
pub fn run(source: &str, interpreter: &Interpreter) -> Result<(), ScriptError> {
    let program = compile(source)?;
    let mut driver = Driver::new(
        interpreter.execute(program),
        interpreter.yielder(),
        DriverConfig::default(),
    );
    match driver.drain() {
        Outcome::Failed(e) => Err(e.into()),
        Outcome::Completed | Outcome::Cancelled => Ok(()),
    }
}

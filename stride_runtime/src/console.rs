use std::{cell::RefCell, collections::VecDeque, fmt::Display, rc::Rc};

use log::debug;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Print,
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            MessageKind::Error => write!(f, "[ERROR] {}", self.text),
            MessageKind::Warning => write!(f, "[WARNING] {}", self.text),
            MessageKind::Print | MessageKind::Info => f.write_str(&self.text),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    /// Oldest messages are dropped beyond this many
    pub max_lines: usize,
    /// Mirror every message to stdout, or stderr for warnings and errors
    pub echo: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            max_lines: 1000,
            echo: false,
        }
    }
}

#[derive(Debug, Default)]
struct ConsoleState {
    config: ConsoleConfig,
    messages: VecDeque<Message>,
}

/// Shared log sink for script output and run diagnostics.
#[derive(Clone, Debug, Default)]
pub struct Console {
    state: Rc<RefCell<ConsoleState>>,
}

impl Console {
    pub fn new(config: ConsoleConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(ConsoleState {
                config,
                messages: VecDeque::default(),
            })),
        }
    }

    pub fn print(&self, text: impl Into<String>) {
        self.push(MessageKind::Print, text.into());
    }

    pub fn info(&self, text: impl Into<String>) {
        self.push(MessageKind::Info, text.into());
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.push(MessageKind::Warning, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.push(MessageKind::Error, text.into());
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.iter().cloned().collect()
    }

    pub fn lines(&self) -> Vec<String> {
        self.state
            .borrow()
            .messages
            .iter()
            .map(Message::to_string)
            .collect()
    }

    pub fn clear(&self) {
        self.state.borrow_mut().messages.clear();
    }

    fn push(&self, kind: MessageKind, text: String) {
        debug!("Console {kind:?}: {text}");
        let message = Message { kind, text };
        let mut state = self.state.borrow_mut();
        if state.config.echo {
            match kind {
                MessageKind::Print | MessageKind::Info => println!("{message}"),
                MessageKind::Warning | MessageKind::Error => eprintln!("{message}"),
            }
        }
        state.messages.push_back(message);
        while state.messages.len() > state.config.max_lines {
            state.messages.pop_front();
        }
    }
}

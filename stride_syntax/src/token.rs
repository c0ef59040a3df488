use std::fmt::Display;

/// The enum variants are in SCREAMING_SNAKE_CASE as they technically
/// represent constants, but Rust does not allow const enum variants.
#[allow(nonstandard_style)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TokenKind {
    // Layout
    INDENT,
    DEDENT,
    NEWLINE,
    // Symbols
    LPAREN,
    RPAREN,
    LBRACKET,
    RBRACKET,
    COLON,
    COMMA,
    DOT,
    // Arithmetic
    PLUS,
    MINUS,
    STAR,
    SLASH,
    PERCENT,
    // Comparisons
    EQ,
    NEQ,
    LT,
    GT,
    LTE,
    GTE,
    // Literals
    NAME,
    STRING,
    NUMBER,
    BOOLEAN,
    // Keywords
    IF,
    ELSE,
    WHILE,
    FOR,
    IN,
    DEF,
    RETURN,
    PASS,
    NOT,
    AND,
    OR,
    GLOBAL,
    // Miscellaneous tokens
    ASSIGN,
    EOF,
}

impl TokenKind {
    pub fn from_char(c: char) -> Option<Self> {
        let token = match c {
            '+' => Self::PLUS,
            '-' => Self::MINUS,
            '*' => Self::STAR,
            '/' => Self::SLASH,
            '%' => Self::PERCENT,
            '<' => Self::LT,
            '>' => Self::GT,
            '=' => Self::ASSIGN,
            '(' => Self::LPAREN,
            ')' => Self::RPAREN,
            '[' => Self::LBRACKET,
            ']' => Self::RBRACKET,
            ':' => Self::COLON,
            ',' => Self::COMMA,
            '.' => Self::DOT,
            _ => return None,
        };
        Some(token)
    }

    pub fn from_pair(pair: (char, char)) -> Option<Self> {
        let token = match pair {
            ('=', '=') => Self::EQ,
            ('!', '=') => Self::NEQ,
            ('<', '=') => Self::LTE,
            ('>', '=') => Self::GTE,
            _ => return None,
        };
        Some(token)
    }

    pub fn from_keyword(kw: &str) -> Option<Self> {
        let token = match kw {
            "if" => Self::IF,
            "else" => Self::ELSE,
            "while" => Self::WHILE,
            "for" => Self::FOR,
            "in" => Self::IN,
            "def" => Self::DEF,
            "return" => Self::RETURN,
            "pass" => Self::PASS,
            "not" => Self::NOT,
            "and" => Self::AND,
            "or" => Self::OR,
            "global" => Self::GLOBAL,
            "True" | "False" => Self::BOOLEAN,
            _ => return None,
        };
        Some(token)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub lexeme: String,
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TokenKind::NEWLINE => f.write_str("newline"),
            TokenKind::INDENT => f.write_str("indent"),
            TokenKind::DEDENT => f.write_str("dedent"),
            TokenKind::EOF => f.write_str("end of file"),
            _ => write!(f, "'{}'", self.lexeme),
        }
    }
}

impl Token {
    pub fn new(kind: TokenKind, line: usize, lexeme: String) -> Self {
        Self { kind, line, lexeme }
    }
}

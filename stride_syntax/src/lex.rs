use crate::{
    error::LexError,
    token::{Token, TokenKind},
};
use std::{iter::Peekable, str::Chars};

/// Width contributed by a tab when measuring indentation.
pub const TAB_WIDTH: usize = 4;

#[derive(Debug)]
pub struct Lexer {
    source: String,
    line: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.replace("\r\n", "\n").replace('\r', "\n"),
            line: 0,
            indents: vec![0],
            tokens: Vec::default(),
        }
    }

    pub fn lex_all(mut self) -> Result<Vec<Token>, LexError> {
        let source = std::mem::take(&mut self.source);
        for (idx, raw) in source.split('\n').enumerate() {
            self.line = idx + 1;
            let content = raw.trim_start_matches(|c: char| c == ' ' || c == '\t');
            let trimmed = content.trim();
            // Blank and comment-only lines never affect indentation
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.indent_to(indent_width(raw))?;
            self.lex_line(content)?;
            self.push(TokenKind::NEWLINE, "\\n".to_string());
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::DEDENT, String::default());
        }
        self.push(TokenKind::EOF, String::default());
        Ok(self.tokens)
    }

    fn indent_to(&mut self, width: usize) -> Result<(), LexError> {
        if width > self.current_indent() {
            self.indents.push(width);
            self.push(TokenKind::INDENT, String::default());
        }
        while width < self.current_indent() {
            self.indents.pop();
            self.push(TokenKind::DEDENT, String::default());
        }
        if width != self.current_indent() {
            return Err(LexError::Indentation { line: self.line });
        }
        Ok(())
    }

    fn current_indent(&self) -> usize {
        // The base level is never popped
        self.indents.last().copied().unwrap_or_default()
    }

    fn lex_line(&mut self, content: &str) -> Result<(), LexError> {
        let mut stream = content.chars().peekable();
        while let Some(c) = stream.next() {
            match c {
                ' ' | '\t' => continue,
                // The rest of the line is a comment
                '#' => break,
                '"' | '\'' => {
                    let text = lex_string(&mut stream, c);
                    self.push(TokenKind::STRING, text);
                }
                _ if c.is_ascii_digit() => {
                    let text = lex_number(&mut stream, c);
                    self.push(TokenKind::NUMBER, text);
                }
                _ if c.is_alphabetic() || c == '_' => {
                    let mut text = c.to_string();
                    advance_while(&mut stream, &mut text, |c| c.is_alphanumeric() || c == '_');
                    let kind = TokenKind::from_keyword(&text).unwrap_or(TokenKind::NAME);
                    self.push(kind, text);
                }
                _ => {
                    // Two character operators take precedence over single ones
                    if let Some(kind) = stream
                        .peek()
                        .and_then(|&next| TokenKind::from_pair((c, next)))
                    {
                        let next = stream.next().unwrap_or_default();
                        self.push(kind, format!("{c}{next}"));
                    } else if let Some(kind) = TokenKind::from_char(c) {
                        self.push(kind, c.to_string());
                    } else {
                        return Err(LexError::UnexpectedChar {
                            ch: c,
                            line: self.line,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, kind: TokenKind, lexeme: String) {
        self.tokens.push(Token::new(kind, self.line, lexeme));
    }
}

/// Leading spaces count one column each, tabs count [`TAB_WIDTH`].
pub fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| matches!(c, ' ' | '\t'))
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

fn lex_number(stream: &mut Peekable<Chars<'_>>, first: char) -> String {
    let mut text = first.to_string();
    advance_while(stream, &mut text, |c| c.is_ascii_digit());
    // Only consume the dot if a fractional part follows it
    let mut ahead = stream.clone();
    if ahead.next() == Some('.') && ahead.peek().filter(|c| c.is_ascii_digit()).is_some() {
        stream.next();
        text.push('.');
        advance_while(stream, &mut text, |c| c.is_ascii_digit());
    }
    text
}

/// Scans up to the closing `quote`. Escapes are kept verbatim and an
/// unterminated literal simply runs to the end of the line.
fn lex_string(stream: &mut Peekable<Chars<'_>>, quote: char) -> String {
    let mut text = String::default();
    while let Some(c) = stream.next() {
        if c == quote {
            break;
        }
        text.push(c);
        if c == '\\' {
            if let Some(escaped) = stream.next() {
                text.push(escaped);
            }
        }
    }
    text
}

fn advance_while<F>(stream: &mut Peekable<Chars<'_>>, text: &mut String, cond: F) -> usize
where
    F: Fn(char) -> bool,
{
    let mut count: usize = 0;
    while let Some(c) = stream.next_if(|&c| cond(c)) {
        text.push(c);
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use TokenKind::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .lex_all()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn lex_test(source: &str, expected: &[(TokenKind, &str)]) {
        let tokens = Lexer::new(source).lex_all().unwrap();
        let actual: Vec<(TokenKind, &str)> =
            tokens.iter().map(|t| (t.kind, t.lexeme.as_str())).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn if_block() {
        assert_eq!(
            kinds("if x:\n\ty=1\n"),
            vec![IF, NAME, COLON, NEWLINE, INDENT, NAME, ASSIGN, NUMBER, NEWLINE, DEDENT, EOF]
        );
    }

    #[test]
    fn operators() {
        lex_test(
            "a <= b != c == d >= e < f > g = h",
            &[
                (NAME, "a"),
                (LTE, "<="),
                (NAME, "b"),
                (NEQ, "!="),
                (NAME, "c"),
                (EQ, "=="),
                (NAME, "d"),
                (GTE, ">="),
                (NAME, "e"),
                (LT, "<"),
                (NAME, "f"),
                (GT, ">"),
                (NAME, "g"),
                (ASSIGN, "="),
                (NAME, "h"),
                (NEWLINE, "\\n"),
                (EOF, ""),
            ],
        );
    }

    #[test]
    fn literals() {
        lex_test(
            "x = [1, 2.5, 'a', \"b\", True, False]",
            &[
                (NAME, "x"),
                (ASSIGN, "="),
                (LBRACKET, "["),
                (NUMBER, "1"),
                (COMMA, ","),
                (NUMBER, "2.5"),
                (COMMA, ","),
                (STRING, "a"),
                (COMMA, ","),
                (STRING, "b"),
                (COMMA, ","),
                (BOOLEAN, "True"),
                (COMMA, ","),
                (BOOLEAN, "False"),
                (RBRACKET, "]"),
                (NEWLINE, "\\n"),
                (EOF, ""),
            ],
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(
            kinds("for i in x and not y or z"),
            vec![FOR, NAME, IN, NAME, AND, NOT, NAME, OR, NAME, NEWLINE, EOF]
        );
        assert_eq!(
            kinds("def f(): return"),
            vec![DEF, NAME, LPAREN, RPAREN, COLON, RETURN, NEWLINE, EOF]
        );
    }

    #[test]
    fn string_escapes_are_verbatim() {
        let tokens = Lexer::new(r#"s = "a\"b""#).lex_all().unwrap();
        assert_eq!(tokens[2].kind, STRING);
        assert_eq!(tokens[2].lexeme, r#"a\"b"#);
    }

    #[test]
    fn unterminated_string_runs_to_end_of_line() {
        let tokens = Lexer::new("s = 'abc\nt = 1").lex_all().unwrap();
        assert_eq!(tokens[2].lexeme, "abc");
        assert_eq!(tokens[3].kind, NEWLINE);
        assert_eq!(tokens[4].lexeme, "t");
        assert_eq!(tokens[4].line, 2);
    }

    #[test]
    fn number_followed_by_dot() {
        assert_eq!(kinds("1.x"), vec![NUMBER, DOT, NAME, NEWLINE, EOF]);
    }

    #[test]
    fn comments_and_blank_lines() {
        let tokens = Lexer::new("# header\n\nx = 1 # trailing\n   # indented comment\ny = 2")
            .lex_all()
            .unwrap();
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![NAME, ASSIGN, NUMBER, NEWLINE, NAME, ASSIGN, NUMBER, NEWLINE, EOF]
        );
        assert_eq!(tokens[0].line, 3);
        assert_eq!(tokens[4].line, 5);
    }

    #[test]
    fn crlf_line_endings() {
        assert_eq!(
            kinds("x = 1\r\ny = 2\r\n"),
            kinds("x = 1\ny = 2\n"),
        );
    }

    #[test]
    fn nested_dedents_are_balanced() {
        let source = "while a:\n    if b:\n        c = 1\nd = 2\n";
        let tokens = kinds(source);
        let indents = tokens.iter().filter(|&&k| k == INDENT).count();
        let dedents = tokens.iter().filter(|&&k| k == DEDENT).count();
        assert_eq!(indents, 2);
        assert_eq!(indents, dedents);
        assert_eq!(tokens.last(), Some(&EOF));
    }

    #[test]
    fn trailing_dedents_at_eof() {
        assert_eq!(
            kinds("if a:\n  if b:\n    pass"),
            vec![
                IF, NAME, COLON, NEWLINE, INDENT, IF, NAME, COLON, NEWLINE, INDENT, PASS, NEWLINE,
                DEDENT, DEDENT, EOF
            ]
        );
    }

    #[test]
    fn tab_counts_as_four_spaces() {
        assert_eq!(indent_width("\t x"), 5);
        assert!(Lexer::new("if a:\n\tb = 1\n    c = 2").lex_all().is_ok());
    }

    #[test]
    fn inconsistent_dedent() {
        let err = Lexer::new("if a:\n    b = 1\n  c = 2").lex_all().unwrap_err();
        assert_eq!(err, LexError::Indentation { line: 3 });
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn unexpected_char() {
        let err = Lexer::new("x = 1\ny = $").lex_all().unwrap_err();
        assert_eq!(err, LexError::UnexpectedChar { ch: '$', line: 2 });
        assert_eq!(
            err.to_string(),
            "LexError: unexpected character '$' at line 2"
        );
    }

    #[test]
    fn lone_bang_is_rejected() {
        assert!(matches!(
            Lexer::new("a ! b").lex_all(),
            Err(LexError::UnexpectedChar { ch: '!', .. })
        ));
    }
}

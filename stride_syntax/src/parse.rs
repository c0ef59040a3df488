use std::{iter::Peekable, rc::Rc, slice::Iter};

use crate::{
    ast::{BinOp, Expr, ExprKind, FunctionDef, LogicalOp, Source, Stmt, StmtKind, UnaryOp},
    error::{ErrorMsg, ParseError},
    token::{Token, TokenKind},
};

#[derive(Debug)]
pub struct Parser<'a> {
    stream: Peekable<Iter<'a, Token>>,
    line: usize,
}

impl<'a> Parser<'a> {
    pub fn new(stream: &'a [Token]) -> Self {
        Self {
            stream: stream.iter().peekable(),
            line: 1,
        }
    }

    pub fn parse_all(mut self) -> Result<Source, ParseError> {
        let mut items: Vec<Stmt> = Vec::default();
        loop {
            match self.peek_kind() {
                None | Some(TokenKind::EOF) => break,
                // Stray layout tokens between top level statements
                Some(TokenKind::NEWLINE | TokenKind::DEDENT) => {
                    self.advance();
                }
                Some(_) => items.push(self.parse_stmt()?),
            }
        }
        Ok(Source { items })
    }

    pub fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let Some(t) = self.stream.peek().copied() else {
            return Err(self.eof_error(ErrorMsg::UnexpectedToken));
        };
        match t.kind {
            TokenKind::IF => self.parse_if_stmt(),
            TokenKind::WHILE => self.parse_while_stmt(),
            TokenKind::FOR => self.parse_for_stmt(),
            TokenKind::DEF => self.parse_function(),
            TokenKind::RETURN => self.parse_return(),
            TokenKind::PASS => {
                self.advance();
                self.advance_or_err(TokenKind::NEWLINE, ErrorMsg::ExpectedNewline)?;
                Ok(Stmt::new(StmtKind::Pass, t.line))
            }
            TokenKind::GLOBAL => self.parse_global(),
            TokenKind::NAME if self.peek_second() == Some(TokenKind::ASSIGN) => {
                self.parse_assignment()
            }
            _ => {
                let expr = self.parse_expr()?;
                self.advance_or_err(TokenKind::NEWLINE, ErrorMsg::ExpectedNewline)?;
                Ok(Stmt::new(StmtKind::Expr(expr), t.line))
            }
        }
    }

    fn parse_assignment(&mut self) -> Result<Stmt, ParseError> {
        let name = self.advance_or_err(TokenKind::NAME, ErrorMsg::ExpectedIdent)?;
        self.advance_or_err(TokenKind::ASSIGN, ErrorMsg::ExpectedAssign)?;
        let value = self.parse_expr()?;
        self.advance_or_err(TokenKind::NEWLINE, ErrorMsg::ExpectedNewline)?;
        Ok(Stmt::new(
            StmtKind::Assign {
                name: name.lexeme.clone(),
                value,
            },
            name.line,
        ))
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt, ParseError> {
        // Consume the `if` keyword
        let line = self.advance_line();
        let condition = self.parse_expr()?;
        let then_body = self.parse_block()?;
        let else_body = if self.advance_if(|t| t.kind == TokenKind::ELSE).is_some() {
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_body,
                else_body,
            },
            line,
        ))
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt, ParseError> {
        // Consume the `while` keyword
        let line = self.advance_line();
        let condition = self.parse_expr()?;
        let body = self.parse_block()?;

        Ok(Stmt::new(StmtKind::While { condition, body }, line))
    }

    fn parse_for_stmt(&mut self) -> Result<Stmt, ParseError> {
        // Consume the `for` keyword
        let line = self.advance_line();
        let var = self
            .advance_or_err(TokenKind::NAME, ErrorMsg::ExpectedIdent)?
            .lexeme
            .clone();
        self.advance_or_err(TokenKind::IN, ErrorMsg::ExpectedIn)?;
        let iterable = self.parse_expr()?;
        let body = self.parse_block()?;

        Ok(Stmt::new(
            StmtKind::For {
                var,
                iterable,
                body,
            },
            line,
        ))
    }

    fn parse_function(&mut self) -> Result<Stmt, ParseError> {
        // Consume the `def` keyword
        let line = self.advance_line();
        let name = self
            .advance_or_err(TokenKind::NAME, ErrorMsg::ExpectedIdent)?
            .lexeme
            .clone();
        self.advance_or_err(TokenKind::LPAREN, ErrorMsg::MissingOpeningParen)?;
        let mut params = vec![];
        if self.peek_kind() != Some(TokenKind::RPAREN) {
            loop {
                params.push(
                    self.advance_or_err(TokenKind::NAME, ErrorMsg::ExpectedIdent)?
                        .lexeme
                        .clone(),
                );
                if self.advance_if(|t| t.kind == TokenKind::COMMA).is_none() {
                    break;
                }
            }
        }
        self.advance_or_err(TokenKind::RPAREN, ErrorMsg::MissingClosingParen)?;
        let body = self.parse_block()?;

        Ok(Stmt::new(
            StmtKind::Function(Rc::new(FunctionDef {
                name,
                params,
                body,
                line,
            })),
            line,
        ))
    }

    fn parse_return(&mut self) -> Result<Stmt, ParseError> {
        // Consume the `return` keyword
        let line = self.advance_line();
        let value = if self.peek_kind() == Some(TokenKind::NEWLINE) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.advance_or_err(TokenKind::NEWLINE, ErrorMsg::ExpectedNewline)?;

        Ok(Stmt::new(StmtKind::Return(value), line))
    }

    fn parse_global(&mut self) -> Result<Stmt, ParseError> {
        // Consume the `global` keyword
        let line = self.advance_line();
        let mut names = vec![];
        loop {
            names.push(
                self.advance_or_err(TokenKind::NAME, ErrorMsg::ExpectedIdent)?
                    .lexeme
                    .clone(),
            );
            if self.advance_if(|t| t.kind == TokenKind::COMMA).is_none() {
                break;
            }
        }
        self.advance_or_err(TokenKind::NEWLINE, ErrorMsg::ExpectedNewline)?;

        Ok(Stmt::new(StmtKind::Global(names), line))
    }

    /// `: NEWLINE INDENT stmt* DEDENT`
    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.advance_or_err(TokenKind::COLON, ErrorMsg::ExpectedColon)?;
        self.advance_or_err(TokenKind::NEWLINE, ErrorMsg::ExpectedNewline)?;
        self.advance_or_err(TokenKind::INDENT, ErrorMsg::ExpectedIndent)?;
        let mut items = Vec::default();
        while !matches!(
            self.peek_kind(),
            None | Some(TokenKind::DEDENT | TokenKind::EOF)
        ) {
            items.push(self.parse_stmt()?);
        }
        self.advance_or_err(TokenKind::DEDENT, ErrorMsg::ExpectedDedent)?;
        Ok(items)
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_logical_and()?;
        while let Some(op) = self.advance_if(|t| t.kind == TokenKind::OR) {
            // Infallible unwrap as we are ensuring the right token kind above
            let logical_op = LogicalOp::from_token(op.kind)
                .expect("non-logical operators cannot be present here");
            let rhs = self.parse_logical_and()?;
            lhs = Self::logical(lhs, logical_op, rhs);
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_not()?;
        while let Some(op) = self.advance_if(|t| t.kind == TokenKind::AND) {
            // Infallible unwrap as we are ensuring the right token kind above
            let logical_op = LogicalOp::from_token(op.kind)
                .expect("non-logical operators cannot be present here");
            let rhs = self.parse_not()?;
            lhs = Self::logical(lhs, logical_op, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if let Some(t) = self.advance_if(|t| t.kind == TokenKind::NOT) {
            let expr = self.parse_not()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                },
                t.line,
            ));
        }
        self.parse_cmp()
    }

    /// Comparisons do not chain, `a < b < c` leaves a dangling operator.
    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_term()?;
        if let Some(op) = self.advance_if(|t| {
            BinOp::from_token(t.kind)
                .filter(BinOp::is_comparison)
                .is_some()
        }) {
            // Infallible unwrap as we are ensuring the right token kind above
            let bin_op =
                BinOp::from_token(op.kind).expect("non-binary operators cannot be present here");
            let rhs = self.parse_term()?;
            return Ok(Self::binary(lhs, bin_op, rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_factor()?;
        while let Some(op) =
            self.advance_if(|t| matches!(t.kind, TokenKind::PLUS | TokenKind::MINUS))
        {
            // Infallible unwrap as we are ensuring the right token kind above
            let bin_op =
                BinOp::from_token(op.kind).expect("non-binary operators cannot be present here");
            let rhs = self.parse_factor()?;
            lhs = Self::binary(lhs, bin_op, rhs);
        }
        Ok(lhs)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.advance_if(|t| {
            matches!(
                t.kind,
                TokenKind::STAR | TokenKind::SLASH | TokenKind::PERCENT
            )
        }) {
            // Infallible unwrap as we are ensuring the right token kind above
            let bin_op =
                BinOp::from_token(op.kind).expect("non-binary operators cannot be present here");
            let rhs = self.parse_unary()?;
            lhs = Self::binary(lhs, bin_op, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(t) = self.advance_if(|t| t.kind == TokenKind::MINUS) {
            let expr = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Minus,
                    expr: Box::new(expr),
                },
                t.line,
            ));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        while let Some(t) = self.advance_if(|t| {
            matches!(
                t.kind,
                TokenKind::LPAREN | TokenKind::DOT | TokenKind::LBRACKET
            )
        }) {
            let line = expr.line;
            let kind = match t.kind {
                TokenKind::LPAREN => ExprKind::Call {
                    func: Box::new(expr),
                    args: self.parse_list(TokenKind::RPAREN, ErrorMsg::MissingClosingParen)?,
                },
                TokenKind::DOT => ExprKind::Attribute {
                    object: Box::new(expr),
                    name: self
                        .advance_or_err(TokenKind::NAME, ErrorMsg::ExpectedIdent)?
                        .lexeme
                        .clone(),
                },
                _ => self.parse_subscript(expr)?,
            };
            expr = Expr::new(kind, line);
        }
        Ok(expr)
    }

    /// Parses the inside of `[...]`, a `:` before the closing bracket makes
    /// it a slice.
    fn parse_subscript(&mut self, object: Expr) -> Result<ExprKind, ParseError> {
        let start = if self.peek_kind() == Some(TokenKind::COLON) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        if self.advance_if(|t| t.kind == TokenKind::COLON).is_none() {
            self.advance_or_err(TokenKind::RBRACKET, ErrorMsg::MissingClosingBracket)?;
            // A missing start is only possible when a colon follows
            let index = start.expect("index expression must be present without a colon");
            return Ok(ExprKind::Index {
                object: Box::new(object),
                index,
            });
        }
        let end = if self.peek_kind() == Some(TokenKind::RBRACKET) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        self.advance_or_err(TokenKind::RBRACKET, ErrorMsg::MissingClosingBracket)?;
        Ok(ExprKind::Slice {
            object: Box::new(object),
            start,
            end,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let Some(t) = self.advance() else {
            return Err(self.eof_error(ErrorMsg::UnexpectedToken));
        };
        let kind = match t.kind {
            TokenKind::NUMBER => ExprKind::Number(
                t.lexeme
                    .parse()
                    .map_err(|_| Self::error(t, ErrorMsg::InvalidNumber))?,
            ),
            TokenKind::STRING => ExprKind::Str(t.lexeme.clone()),
            TokenKind::BOOLEAN => ExprKind::Boolean(t.lexeme == "True"),
            TokenKind::NAME => ExprKind::Name(t.lexeme.clone()),
            TokenKind::LPAREN => {
                let expr = self.parse_expr()?;
                self.advance_or_err(TokenKind::RPAREN, ErrorMsg::MissingClosingParen)?;
                return Ok(expr);
            }
            TokenKind::LBRACKET => ExprKind::List(
                self.parse_list(TokenKind::RBRACKET, ErrorMsg::MissingClosingBracket)?,
            ),
            _ => return Err(Self::error(t, ErrorMsg::UnexpectedToken)),
        };
        Ok(Expr::new(kind, t.line))
    }

    /// Comma separated expressions up to and including `close`.
    fn parse_list(&mut self, close: TokenKind, msg: ErrorMsg) -> Result<Vec<Expr>, ParseError> {
        let mut items = vec![];
        if self.advance_if(|t| t.kind == close).is_some() {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if self.advance_if(|t| t.kind == TokenKind::COMMA).is_none() {
                break;
            }
        }
        self.advance_or_err(close, msg)?;
        Ok(items)
    }

    fn binary(lhs: Expr, op: BinOp, rhs: Expr) -> Expr {
        let line = lhs.line;
        Expr::new(
            ExprKind::Binary {
                lhs: Box::new(lhs),
                op,
                rhs: Box::new(rhs),
            },
            line,
        )
    }

    fn logical(lhs: Expr, op: LogicalOp, rhs: Expr) -> Expr {
        let line = lhs.line;
        Expr::new(
            ExprKind::Logical {
                lhs: Box::new(lhs),
                op,
                rhs: Box::new(rhs),
            },
            line,
        )
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.stream.peek().map(|t| t.kind)
    }

    fn peek_second(&self) -> Option<TokenKind> {
        self.stream.clone().nth(1).map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.stream.next();
        if let Some(t) = token {
            self.line = t.line;
        }
        token
    }

    /// Consumes the current token, returning the line it sits on.
    fn advance_line(&mut self) -> usize {
        self.advance().map_or(self.line, |t| t.line)
    }

    fn advance_if<F>(&mut self, cond: F) -> Option<&'a Token>
    where
        F: FnOnce(&Token) -> bool,
    {
        if self.stream.peek().filter(|&&t| cond(t)).is_some() {
            self.advance()
        } else {
            None
        }
    }

    fn advance_or_err(&mut self, kind: TokenKind, msg: ErrorMsg) -> Result<&'a Token, ParseError> {
        match self.stream.peek().copied() {
            Some(t) if t.kind == kind => {
                self.advance();
                Ok(t)
            }
            Some(t) => Err(Self::error(t, msg)),
            None => Err(self.eof_error(msg)),
        }
    }

    fn error(token: &Token, msg: ErrorMsg) -> ParseError {
        ParseError {
            msg,
            found: token.to_string(),
            line: token.line,
        }
    }

    fn eof_error(&self, msg: ErrorMsg) -> ParseError {
        ParseError {
            msg,
            found: "end of file".to_string(),
            line: self.line,
        }
    }
}

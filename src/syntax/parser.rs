use std::rc::Rc;

use crate::syntax::{
    SyntaxError,
    ast::{BinaryOp, Block, Expression, FunctionLiteral, Statement, UnaryOp},
    lexer::Lexer,
    position::Position,
    precedence::{Precedence, right_binding, token_precedence},
    token::Token,
    token_type::TokenType,
};

/// Pratt parser over the token stream.
///
/// `current_token` is the token being examined; after a `parse_*` method
/// returns it sits on the last token that construct consumed. Parsing stops
/// at the first error.
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
    peek_token: Token,
    pub errors: Vec<SyntaxError>,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        let mut parser = Self {
            lexer,
            current_token: Token::new(TokenType::Illegal, "", 1, 0),
            peek_token: Token::new(TokenType::Illegal, "", 1, 0),
            errors: Vec::new(),
        };
        parser.peek_token = parser.lexer.next_token();
        parser
    }

    pub fn parse_program(&mut self) -> Block {
        let block = self.parse_block();
        if self.errors.is_empty() && !self.is_peek_token(TokenType::Eof) {
            self.error_near_peek();
        }
        block
    }

    fn next_token(&mut self) {
        self.current_token = std::mem::replace(&mut self.peek_token, self.lexer.next_token());
    }

    fn is_current_token(&self, token_type: TokenType) -> bool {
        self.current_token.token_type == token_type
    }

    fn is_peek_token(&self, token_type: TokenType) -> bool {
        self.peek_token.token_type == token_type
    }

    fn expect_peek(&mut self, token_type: TokenType) -> Option<()> {
        if self.is_peek_token(token_type) {
            self.next_token();
            Some(())
        } else {
            self.error_at(
                self.peek_token.position,
                format!("'{}' expected near '{}'", token_type, self.peek_token),
            );
            None
        }
    }

    fn error_at(&mut self, position: Position, message: String) {
        if self.errors.is_empty() {
            self.errors.push(SyntaxError { message, position });
        }
    }

    fn error_near_peek(&mut self) {
        let message = match self.peek_token.token_type {
            TokenType::UnterminatedString => "unfinished string".to_string(),
            _ => format!("unexpected symbol near '{}'", self.peek_token),
        };
        self.error_at(self.peek_token.position, message);
    }

    fn error_near_current(&mut self) {
        let message = match self.current_token.token_type {
            TokenType::UnterminatedString => "unfinished string".to_string(),
            _ => format!("unexpected symbol near '{}'", self.current_token),
        };
        self.error_at(self.current_token.position, message);
    }

    fn peek_ends_block(&self) -> bool {
        matches!(
            self.peek_token.token_type,
            TokenType::End | TokenType::Else | TokenType::Elseif | TokenType::Eof
        )
    }

    fn parse_block(&mut self) -> Block {
        let mut block = Block::default();

        while self.errors.is_empty() && !self.peek_ends_block() {
            self.next_token();
            if self.is_current_token(TokenType::Semicolon) {
                continue;
            }
            let is_return = self.is_current_token(TokenType::Return);
            match self.parse_statement() {
                Some(statement) => block.statements.push(statement),
                None => break,
            }
            if is_return && !self.peek_ends_block() {
                let position = self.peek_token.position;
                self.error_at(position, format!("'end' expected near '{}'", self.peek_token));
                break;
            }
        }

        block
    }

    fn parse_statement(&mut self) -> Option<Statement> {
        match self.current_token.token_type {
            TokenType::Local => self.parse_local(),
            TokenType::Function => {
                self.expect_peek(TokenType::Ident)?;
                let name: Rc<str> = Rc::from(self.current_token.literal.as_str());
                let function = self.parse_function_body(Some(name.clone()))?;
                Some(Statement::Function { name, function })
            }
            TokenType::If => self.parse_if(),
            TokenType::While => {
                self.next_token();
                let condition = self.parse_expression(Precedence::Lowest)?;
                self.expect_peek(TokenType::Do)?;
                let body = self.parse_block();
                self.expect_peek(TokenType::End)?;
                Some(Statement::While { condition, body })
            }
            TokenType::Do => {
                let body = self.parse_block();
                self.expect_peek(TokenType::End)?;
                Some(Statement::Do { body })
            }
            TokenType::Return => self.parse_return(),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_local(&mut self) -> Option<Statement> {
        let position = self.current_token.position;
        if self.is_peek_token(TokenType::Function) {
            self.next_token();
            self.expect_peek(TokenType::Ident)?;
            let name: Rc<str> = Rc::from(self.current_token.literal.as_str());
            let function = self.parse_function_body(Some(name.clone()))?;
            return Some(Statement::LocalFunction { name, function });
        }

        let mut names = Vec::new();
        self.expect_peek(TokenType::Ident)?;
        names.push(Rc::from(self.current_token.literal.as_str()));
        while self.is_peek_token(TokenType::Comma) {
            self.next_token();
            self.expect_peek(TokenType::Ident)?;
            names.push(Rc::from(self.current_token.literal.as_str()));
        }

        let mut values = Vec::new();
        if self.is_peek_token(TokenType::Assign) {
            self.next_token();
            self.next_token();
            values = self.parse_expression_list()?;
        }

        Some(Statement::Local {
            names,
            values,
            position,
        })
    }

    fn parse_if(&mut self) -> Option<Statement> {
        let mut branches = Vec::new();
        let mut otherwise = None;

        self.next_token();
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect_peek(TokenType::Then)?;
        branches.push((condition, self.parse_block()));

        loop {
            if self.is_peek_token(TokenType::Elseif) {
                self.next_token();
                self.next_token();
                let condition = self.parse_expression(Precedence::Lowest)?;
                self.expect_peek(TokenType::Then)?;
                branches.push((condition, self.parse_block()));
            } else if self.is_peek_token(TokenType::Else) {
                self.next_token();
                otherwise = Some(self.parse_block());
                break;
            } else {
                break;
            }
        }

        self.expect_peek(TokenType::End)?;
        Some(Statement::If {
            branches,
            otherwise,
        })
    }

    fn parse_return(&mut self) -> Option<Statement> {
        let position = self.current_token.position;
        let mut values = Vec::new();
        if !self.peek_ends_block() && !self.is_peek_token(TokenType::Semicolon) {
            self.next_token();
            values = self.parse_expression_list()?;
        }
        if self.is_peek_token(TokenType::Semicolon) {
            self.next_token();
        }
        Some(Statement::Return { values, position })
    }

    fn parse_expression_statement(&mut self) -> Option<Statement> {
        let start = self.current_token.position;
        let expression = self.parse_expression(Precedence::Lowest)?;

        if self.is_peek_token(TokenType::Assign) {
            return match expression {
                Expression::Identifier { name, position } => {
                    self.next_token();
                    self.next_token();
                    let value = self.parse_expression(Precedence::Lowest)?;
                    Some(Statement::Assign {
                        name,
                        value,
                        position,
                    })
                }
                _ => {
                    self.error_near_peek();
                    None
                }
            };
        }

        if expression.is_call() {
            Some(Statement::Call { call: expression })
        } else {
            self.error_at(start, format!("syntax error near '{}'", self.peek_token));
            None
        }
    }

    fn parse_function_body(&mut self, name: Option<Rc<str>>) -> Option<FunctionLiteral> {
        let position = self.current_token.position;
        self.expect_peek(TokenType::LParen)?;

        let mut parameters = Vec::new();
        if self.is_peek_token(TokenType::RParen) {
            self.next_token();
        } else {
            loop {
                self.expect_peek(TokenType::Ident)?;
                parameters.push(Rc::from(self.current_token.literal.as_str()));
                if self.is_peek_token(TokenType::Comma) {
                    self.next_token();
                } else {
                    break;
                }
            }
            self.expect_peek(TokenType::RParen)?;
        }

        let body = self.parse_block();
        self.expect_peek(TokenType::End)?;

        Some(FunctionLiteral {
            name,
            parameters,
            body,
            position,
        })
    }

    fn parse_expression_list(&mut self) -> Option<Vec<Expression>> {
        let mut list = vec![self.parse_expression(Precedence::Lowest)?];
        while self.is_peek_token(TokenType::Comma) {
            self.next_token();
            self.next_token();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }
        Some(list)
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expression> {
        let mut left = self.parse_prefix()?;

        while precedence < token_precedence(self.peek_token.token_type) {
            self.next_token();
            left = self.parse_infix(left)?;
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expression> {
        let token = self.current_token.clone();
        match token.token_type {
            TokenType::Ident => Some(Expression::Identifier {
                name: Rc::from(token.literal.as_str()),
                position: token.position,
            }),
            TokenType::Int => match token.literal.parse::<i64>() {
                Ok(value) => Some(Expression::Integer(value)),
                Err(_) => {
                    self.error_at(token.position, format!("malformed number near '{}'", token));
                    None
                }
            },
            TokenType::Float => match token.literal.parse::<f64>() {
                Ok(value) => Some(Expression::Float(value)),
                Err(_) => {
                    self.error_at(token.position, format!("malformed number near '{}'", token));
                    None
                }
            },
            TokenType::String => Some(Expression::String(Rc::from(token.literal.as_str()))),
            TokenType::Nil => Some(Expression::Nil),
            TokenType::True => Some(Expression::Boolean(true)),
            TokenType::False => Some(Expression::Boolean(false)),
            TokenType::Not | TokenType::Minus => {
                let operator = if token.token_type == TokenType::Not {
                    UnaryOp::Not
                } else {
                    UnaryOp::Minus
                };
                self.next_token();
                let right = self.parse_expression(Precedence::Prefix)?;
                Some(Expression::Prefix {
                    operator,
                    right: Box::new(right),
                })
            }
            TokenType::LParen => {
                self.next_token();
                let expression = self.parse_expression(Precedence::Lowest)?;
                self.expect_peek(TokenType::RParen)?;
                Some(expression)
            }
            TokenType::Function => Some(Expression::Function(self.parse_function_body(None)?)),
            _ => {
                self.error_near_current();
                None
            }
        }
    }

    fn parse_infix(&mut self, left: Expression) -> Option<Expression> {
        let token = self.current_token.clone();
        let operator = match token.token_type {
            TokenType::LParen => return self.parse_call(left, token.position),
            TokenType::Dot => {
                self.expect_peek(TokenType::Ident)?;
                return Some(Expression::Field {
                    object: Box::new(left),
                    name: Rc::from(self.current_token.literal.as_str()),
                });
            }
            TokenType::Plus => BinaryOp::Add,
            TokenType::Minus => BinaryOp::Sub,
            TokenType::Asterisk => BinaryOp::Mul,
            TokenType::Slash => BinaryOp::Div,
            TokenType::Percent => BinaryOp::Mod,
            TokenType::Concat => BinaryOp::Concat,
            TokenType::Eq => BinaryOp::Eq,
            TokenType::NotEq => BinaryOp::NotEq,
            TokenType::Lt => BinaryOp::Lt,
            TokenType::Lte => BinaryOp::Lte,
            TokenType::Gt => BinaryOp::Gt,
            TokenType::Gte => BinaryOp::Gte,
            TokenType::And => BinaryOp::And,
            TokenType::Or => BinaryOp::Or,
            _ => {
                self.error_near_current();
                return None;
            }
        };

        let precedence = token_precedence(token.token_type);
        self.next_token();
        let right = self.parse_expression(right_binding(precedence))?;
        Some(Expression::Infix {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    fn parse_call(&mut self, function: Expression, position: Position) -> Option<Expression> {
        let mut arguments = Vec::new();
        if self.is_peek_token(TokenType::RParen) {
            self.next_token();
        } else {
            self.next_token();
            arguments = self.parse_expression_list()?;
            self.expect_peek(TokenType::RParen)?;
        }
        Some(Expression::Call {
            function: Box::new(function),
            arguments,
            position,
        })
    }
}

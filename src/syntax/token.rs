use std::fmt;

use crate::syntax::{position::Position, token_type::TokenType};

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub literal: String,
    pub position: Position,
}

impl Token {
    pub fn new(
        token_type: TokenType,
        literal: impl Into<String>,
        line: usize,
        column: usize,
    ) -> Self {
        Self {
            token_type,
            literal: literal.into(),
            position: Position::new(line, column),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.token_type {
            TokenType::Ident | TokenType::Int | TokenType::Float => write!(f, "{}", self.literal),
            TokenType::String => write!(f, "\"{}\"", self.literal),
            other => write!(f, "{}", other),
        }
    }
}

//! Lexer and parser for the procedure language: a small Lua-flavoured
//! language with locals, closures, `if`/`while` blocks and multiple returns.

use thiserror::Error;

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod position;
pub mod precedence;
pub mod token;
pub mod token_type;


use crate::syntax::{ast::Block, lexer::Lexer, parser::Parser, position::Position};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{position}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub position: Position,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

pub fn parse(source: &str) -> Result<Block, Vec<SyntaxError>> {
    let mut parser = Parser::new(Lexer::new(source));
    let block = parser.parse_program();
    if parser.errors.is_empty() {
        Ok(block)
    } else {
        Err(parser.errors)
    }
}

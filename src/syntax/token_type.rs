use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    // Special
    Illegal,
    Eof,
    UnterminatedString,

    // Identifiers and literals
    Ident,
    Int,
    Float,
    String,

    // Operators
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Concat,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Assign,

    // Delimiters
    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,

    // Keywords
    And,
    Do,
    Else,
    Elseif,
    End,
    False,
    Function,
    If,
    Local,
    Nil,
    Not,
    Or,
    Return,
    Then,
    True,
    While,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenType::Illegal => "ILLEGAL",
            TokenType::Eof => "<eof>",
            TokenType::UnterminatedString => "unfinished string",
            TokenType::Ident => "<name>",
            TokenType::Int | TokenType::Float => "<number>",
            TokenType::String => "<string>",
            TokenType::Plus => "+",
            TokenType::Minus => "-",
            TokenType::Asterisk => "*",
            TokenType::Slash => "/",
            TokenType::Percent => "%",
            TokenType::Concat => "..",
            TokenType::Eq => "==",
            TokenType::NotEq => "~=",
            TokenType::Lt => "<",
            TokenType::Lte => "<=",
            TokenType::Gt => ">",
            TokenType::Gte => ">=",
            TokenType::Assign => "=",
            TokenType::LParen => "(",
            TokenType::RParen => ")",
            TokenType::Comma => ",",
            TokenType::Semicolon => ";",
            TokenType::Dot => ".",
            TokenType::And => "and",
            TokenType::Do => "do",
            TokenType::Else => "else",
            TokenType::Elseif => "elseif",
            TokenType::End => "end",
            TokenType::False => "false",
            TokenType::Function => "function",
            TokenType::If => "if",
            TokenType::Local => "local",
            TokenType::Nil => "nil",
            TokenType::Not => "not",
            TokenType::Or => "or",
            TokenType::Return => "return",
            TokenType::Then => "then",
            TokenType::True => "true",
            TokenType::While => "while",
        };
        write!(f, "{}", s)
    }
}

pub fn lookup_ident(ident: &str) -> TokenType {
    match ident {
        "and" => TokenType::And,
        "do" => TokenType::Do,
        "else" => TokenType::Else,
        "elseif" => TokenType::Elseif,
        "end" => TokenType::End,
        "false" => TokenType::False,
        "function" => TokenType::Function,
        "if" => TokenType::If,
        "local" => TokenType::Local,
        "nil" => TokenType::Nil,
        "not" => TokenType::Not,
        "or" => TokenType::Or,
        "return" => TokenType::Return,
        "then" => TokenType::Then,
        "true" => TokenType::True,
        "while" => TokenType::While,
        _ => TokenType::Ident,
    }
}

/// True when `name` can be used as a variable name.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && lookup_ident(name) == TokenType::Ident
}

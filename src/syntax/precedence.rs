use crate::syntax::token_type::TokenType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    Or,
    And,
    Comparison, // == ~= < <= > >=
    Concat,     // .. (right associative)
    Sum,        // + -
    Product,    // * / %
    Prefix,     // not x, -x
    Call,       // f(x), e.field
}

pub fn token_precedence(token_type: TokenType) -> Precedence {
    match token_type {
        TokenType::Or => Precedence::Or,
        TokenType::And => Precedence::And,
        TokenType::Eq
        | TokenType::NotEq
        | TokenType::Lt
        | TokenType::Lte
        | TokenType::Gt
        | TokenType::Gte => Precedence::Comparison,
        TokenType::Concat => Precedence::Concat,
        TokenType::Plus | TokenType::Minus => Precedence::Sum,
        TokenType::Asterisk | TokenType::Slash | TokenType::Percent => Precedence::Product,
        TokenType::LParen | TokenType::Dot => Precedence::Call,
        _ => Precedence::Lowest,
    }
}

/// Precedence used for the right operand, one step lower for right-associative operators.
pub fn right_binding(precedence: Precedence) -> Precedence {
    match precedence {
        Precedence::Concat => Precedence::Comparison,
        other => other,
    }
}

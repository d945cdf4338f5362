use std::rc::Rc;

use crate::syntax::position::Position;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub name: Option<Rc<str>>,
    pub parameters: Vec<Rc<str>>,
    pub body: Block,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Local {
        names: Vec<Rc<str>>,
        values: Vec<Expression>,
        position: Position,
    },
    LocalFunction {
        name: Rc<str>,
        function: FunctionLiteral,
    },
    /// `function name(...) ... end`, stored as a global.
    Function {
        name: Rc<str>,
        function: FunctionLiteral,
    },
    Assign {
        name: Rc<str>,
        value: Expression,
        position: Position,
    },
    Call {
        call: Expression,
    },
    If {
        branches: Vec<(Expression, Block)>,
        otherwise: Option<Block>,
    },
    While {
        condition: Expression,
        body: Block,
    },
    Do {
        body: Block,
    },
    Return {
        values: Vec<Expression>,
        position: Position,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Rc<str>),
    Identifier {
        name: Rc<str>,
        position: Position,
    },
    Prefix {
        operator: UnaryOp,
        right: Box<Expression>,
    },
    Infix {
        left: Box<Expression>,
        operator: BinaryOp,
        right: Box<Expression>,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
        position: Position,
    },
    Field {
        object: Box<Expression>,
        name: Rc<str>,
    },
    Function(FunctionLiteral),
}

impl Expression {
    pub fn is_call(&self) -> bool {
        matches!(self, Expression::Call { .. })
    }
}

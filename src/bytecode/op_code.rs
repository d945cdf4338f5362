use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    OpConstant = 0,
    OpNil = 1,
    OpTrue = 2,
    OpFalse = 3,
    OpAdd = 4,
    OpSub = 5,
    OpMul = 6,
    OpDiv = 7,
    OpMod = 8,
    OpConcat = 9,
    OpEqual = 10,
    OpNotEqual = 11,
    OpLess = 12,
    OpLessEqual = 13,
    OpGreater = 14,
    OpGreaterEqual = 15,
    OpMinus = 16,
    OpNot = 17,
    OpJump = 18,
    OpJumpNotTruthy = 19,
    /// Jumps keeping a falsy operand; pops a truthy one.
    OpAndJump = 20,
    /// Jumps keeping a truthy operand; pops a falsy one.
    OpOrJump = 21,
    OpPop = 22,
    OpGetGlobal = 23,
    OpSetGlobal = 24,
    OpGetLocal = 25,
    OpSetLocal = 26,
    OpGetFree = 27,
    OpGetBuiltin = 28,
    OpCurrentClosure = 29,
    OpClosure = 30,
    OpCall = 31,
    OpReturn = 32,
    OpGetField = 33,
}

/// Highest defined opcode byte.
const LAST_OPCODE: u8 = OpCode::OpGetField as u8;

impl OpCode {
    pub fn from_byte(byte: u8) -> Option<Self> {
        (byte <= LAST_OPCODE).then(|| OpCode::from(byte))
    }
}

impl From<u8> for OpCode {
    fn from(byte: u8) -> Self {
        match byte {
            0 => OpCode::OpConstant,
            1 => OpCode::OpNil,
            2 => OpCode::OpTrue,
            3 => OpCode::OpFalse,
            4 => OpCode::OpAdd,
            5 => OpCode::OpSub,
            6 => OpCode::OpMul,
            7 => OpCode::OpDiv,
            8 => OpCode::OpMod,
            9 => OpCode::OpConcat,
            10 => OpCode::OpEqual,
            11 => OpCode::OpNotEqual,
            12 => OpCode::OpLess,
            13 => OpCode::OpLessEqual,
            14 => OpCode::OpGreater,
            15 => OpCode::OpGreaterEqual,
            16 => OpCode::OpMinus,
            17 => OpCode::OpNot,
            18 => OpCode::OpJump,
            19 => OpCode::OpJumpNotTruthy,
            20 => OpCode::OpAndJump,
            21 => OpCode::OpOrJump,
            22 => OpCode::OpPop,
            23 => OpCode::OpGetGlobal,
            24 => OpCode::OpSetGlobal,
            25 => OpCode::OpGetLocal,
            26 => OpCode::OpSetLocal,
            27 => OpCode::OpGetFree,
            28 => OpCode::OpGetBuiltin,
            29 => OpCode::OpCurrentClosure,
            30 => OpCode::OpClosure,
            31 => OpCode::OpCall,
            32 => OpCode::OpReturn,
            33 => OpCode::OpGetField,
            _ => panic!("Unknown opcode {}", byte),
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub fn operand_widths(op: OpCode) -> &'static [usize] {
    match op {
        OpCode::OpConstant
        | OpCode::OpJump
        | OpCode::OpJumpNotTruthy
        | OpCode::OpAndJump
        | OpCode::OpOrJump
        | OpCode::OpGetGlobal
        | OpCode::OpSetGlobal
        | OpCode::OpGetField => &[2],
        OpCode::OpGetLocal | OpCode::OpSetLocal | OpCode::OpGetFree | OpCode::OpGetBuiltin => {
            &[1]
        }
        OpCode::OpClosure => &[2, 1],
        OpCode::OpCall => &[1, 1],
        _ => &[],
    }
}

/// Total encoded length of `op`, opcode byte included.
pub fn instruction_len(op: OpCode) -> usize {
    1 + operand_widths(op).iter().sum::<usize>()
}

pub type Instructions = Vec<u8>;

/// `OpCall` result count meaning "keep every result".
pub const MULTRET: u8 = u8::MAX;

pub fn make(op: OpCode, operands: &[usize]) -> Instructions {
    let widths = operand_widths(op);
    let mut instruction = vec![op as u8];

    for (i, operand) in operands.iter().enumerate() {
        let width = widths.get(i).copied().unwrap_or(0);
        match width {
            1 => instruction.push(*operand as u8),
            2 => {
                instruction.push((*operand >> 8) as u8);
                instruction.push(*operand as u8);
            }
            _ => {}
        }
    }

    instruction
}

pub fn read_u16(instructions: &[u8], offset: usize) -> u16 {
    ((instructions[offset] as u16) << 8) | (instructions[offset + 1] as u16)
}

pub fn read_u8(instructions: &[u8], offset: usize) -> u8 {
    instructions[offset]
}

pub fn disassemble(instructions: &[u8]) -> String {
    let mut result = String::new();
    let mut i = 0;

    while i < instructions.len() {
        let Some(op) = OpCode::from_byte(instructions[i]) else {
            result.push_str(&format!("{:04} <bad opcode {}>\n", i, instructions[i]));
            i += 1;
            continue;
        };

        let mut operands = Vec::new();
        let mut offset = i + 1;
        for width in operand_widths(op) {
            match width {
                1 => operands.push(read_u8(instructions, offset) as usize),
                2 => operands.push(read_u16(instructions, offset) as usize),
                _ => {}
            }
            offset += width;
        }

        let operand_str = operands
            .iter()
            .map(|operand| operand.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        if operand_str.is_empty() {
            result.push_str(&format!("{:04} {}\n", i, op));
        } else {
            result.push_str(&format!("{:04} {} {}\n", i, op, operand_str));
        }

        i = offset;
    }

    result
}

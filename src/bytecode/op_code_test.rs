use crate::bytecode::op_code::{OpCode, disassemble, instruction_len, make, read_u16};

#[test]
fn make_encodes_big_endian_operands() {
    assert_eq!(make(OpCode::OpConstant, &[65534]), vec![0, 255, 254]);
    assert_eq!(read_u16(&make(OpCode::OpJump, &[258]), 1), 258);
}

#[test]
fn closure_and_call_carry_two_operands() {
    assert_eq!(make(OpCode::OpClosure, &[3, 2]), vec![30, 0, 3, 2]);
    assert_eq!(make(OpCode::OpCall, &[1, 255]), vec![31, 1, 255]);
    assert_eq!(instruction_len(OpCode::OpClosure), 4);
    assert_eq!(instruction_len(OpCode::OpReturn), 1);
}

#[test]
fn unknown_bytes_are_not_opcodes() {
    assert_eq!(OpCode::from_byte(33), Some(OpCode::OpGetField));
    assert_eq!(OpCode::from_byte(34), None);
}

#[test]
fn disassemble_lists_each_instruction() {
    let mut code = make(OpCode::OpGetLocal, &[1]);
    code.extend(make(OpCode::OpCall, &[0, 1]));
    code.push(200);
    insta::assert_snapshot!(disassemble(&code), @r"
    0000 OpGetLocal 1
    0002 OpCall 0 1
    0005 <bad opcode 200>
    ");
}

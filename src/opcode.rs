use anyhow::Result;
use num_enum::TryFromPrimitive;

use crate::QvmImage;

/// The 60 opcodes of the q3vm instruction set, discriminants are the
/// on-disk opcode bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u8)]
pub enum Op {
    Undef = 0,
    Ignore,
    Break,
    Enter,
    Leave,
    Call,
    Push,
    Pop,
    Const,
    Local,
    Jump,
    Eq,
    Ne,
    Lti,
    Lei,
    Gti,
    Gei,
    Ltu,
    Leu,
    Gtu,
    Geu,
    Eqf,
    Nef,
    Ltf,
    Lef,
    Gtf,
    Gef,
    Load1,
    Load2,
    Load4,
    Store1,
    Store2,
    Store4,
    Arg,
    BlockCopy,
    Sex8,
    Sex16,
    Negi,
    Add,
    Sub,
    Divi,
    Divu,
    Modi,
    Modu,
    Muli,
    Mulu,
    Band,
    Bor,
    Bxor,
    Bcom,
    Lsh,
    Rshi,
    Rshu,
    Negf,
    Addf,
    Subf,
    Divf,
    Mulf,
    Cvif,
    Cvfi,
}

impl Op {
    pub fn mnemonic(self) -> &'static str {
        match self {
            Op::Undef => "undef",
            Op::Ignore => "ignore",
            Op::Break => "break",
            Op::Enter => "enter",
            Op::Leave => "leave",
            Op::Call => "call",
            Op::Push => "push",
            Op::Pop => "pop",
            Op::Const => "const",
            Op::Local => "local",
            Op::Jump => "jump",
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Lti => "lti",
            Op::Lei => "lei",
            Op::Gti => "gti",
            Op::Gei => "gei",
            Op::Ltu => "ltu",
            Op::Leu => "leu",
            Op::Gtu => "gtu",
            Op::Geu => "geu",
            Op::Eqf => "eqf",
            Op::Nef => "nef",
            Op::Ltf => "ltf",
            Op::Lef => "lef",
            Op::Gtf => "gtf",
            Op::Gef => "gef",
            Op::Load1 => "load1",
            Op::Load2 => "load2",
            Op::Load4 => "load4",
            Op::Store1 => "store1",
            Op::Store2 => "store2",
            Op::Store4 => "store4",
            Op::Arg => "arg",
            Op::BlockCopy => "block_copy",
            Op::Sex8 => "sex8",
            Op::Sex16 => "sex16",
            Op::Negi => "negi",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Divi => "divi",
            Op::Divu => "divu",
            Op::Modi => "modi",
            Op::Modu => "modu",
            Op::Muli => "muli",
            Op::Mulu => "mulu",
            Op::Band => "band",
            Op::Bor => "bor",
            Op::Bxor => "bxor",
            Op::Bcom => "bcom",
            Op::Lsh => "lsh",
            Op::Rshi => "rshi",
            Op::Rshu => "rshu",
            Op::Negf => "negf",
            Op::Addf => "addf",
            Op::Subf => "subf",
            Op::Divf => "divf",
            Op::Mulf => "mulf",
            Op::Cvif => "cvif",
            Op::Cvfi => "cvfi",
        }
    }

    /// Width of the immediate operand in bytes, 0, 1 or 4.
    pub fn param_size(self) -> usize {
        match self {
            Op::Enter | Op::Leave | Op::Const | Op::Local | Op::BlockCopy => 4,
            Op::Arg => 1,
            op if op.is_jump_param() => 4,
            _ => 0,
        }
    }

    /// The immediate of the conditional branches is an instruction index.
    pub fn is_jump_param(self) -> bool {
        matches!(
            self,
            Op::Eq
                | Op::Ne
                | Op::Lti
                | Op::Lei
                | Op::Gti
                | Op::Gei
                | Op::Ltu
                | Op::Leu
                | Op::Gtu
                | Op::Geu
                | Op::Eqf
                | Op::Nef
                | Op::Ltf
                | Op::Lef
                | Op::Gtf
                | Op::Gef
        )
    }

    /// Net operand-stack movement, shown as a listing column.
    // TODO confirm enter/leave/call and the block_copy immediate against a
    // reference vm, q3vm_specs.html disagrees with observed modules
    pub fn stack_delta(self) -> i32 {
        match self {
            Op::Push | Op::Const | Op::Local => 1,
            Op::Call | Op::Pop | Op::Jump | Op::Arg => -1,
            Op::Add
            | Op::Sub
            | Op::Divi
            | Op::Divu
            | Op::Modi
            | Op::Modu
            | Op::Muli
            | Op::Mulu
            | Op::Band
            | Op::Bor
            | Op::Bxor
            | Op::Lsh
            | Op::Rshi
            | Op::Rshu
            | Op::Addf
            | Op::Subf
            | Op::Divf
            | Op::Mulf => -1,
            Op::Store1 | Op::Store2 | Op::Store4 | Op::BlockCopy => -2,
            op if op.is_jump_param() => -2,
            _ => 0,
        }
    }
}

#[derive(Debug)]
pub enum DecodeError {
    UnknownOpcode { index: u32, value: u8 },
    PastEnd { index: u32 },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownOpcode { index, value } => write!(
                f,
                "unknown opcode 0x{value:x} at instruction 0x{index:x}"
            ),
            Self::PastEnd { index } => write!(
                f,
                "instruction 0x{index:x} reads past the end of the code \
                 segment"
            ),
        }
    }
}

impl std::error::Error for DecodeError {}

/// One decoded instruction. The sequential index, not the byte offset, is
/// the address every cross reference uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub index: u32,
    pub op: Op,
    pub param: Option<i32>,
}

/// Sequential decoder over the code segment. Both the analysis and the
/// disassembly pass walk the segment through this.
pub struct CodeWalker<'a> {
    code: &'a [u8],
    code_length: usize,
    instruction_count: u32,
    pos: usize,
    index: u32,
}

impl<'a> CodeWalker<'a> {
    pub fn new(image: &'a QvmImage) -> Self {
        CodeWalker {
            code: image.code(),
            code_length: image.code_length() as usize,
            instruction_count: image.instruction_count(),
            pos: 0,
            index: 0,
        }
    }

    pub fn next_instruction(&mut self) -> Result<Option<Instruction>> {
        if self.index >= self.instruction_count {
            return Ok(None);
        }
        if self.pos >= self.code_length {
            return Err(DecodeError::PastEnd { index: self.index }.into());
        }
        let op = decode_op(self.code[self.pos], self.index)?;
        let psize = op.param_size();
        if self.pos + 1 + psize > self.code_length {
            return Err(DecodeError::PastEnd { index: self.index }.into());
        }
        let param = match psize {
            0 => None,
            1 => Some(i32::from(self.code[self.pos + 1])),
            _ => Some(i32::from_le_bytes([
                self.code[self.pos + 1],
                self.code[self.pos + 2],
                self.code[self.pos + 3],
                self.code[self.pos + 4],
            ])),
        };
        let instruction = Instruction {
            index: self.index,
            op,
            param,
        };
        self.pos += 1 + psize;
        self.index += 1;
        Ok(Some(instruction))
    }

    /// Opcode byte at the current position without advancing. The zero
    /// padding of the code buffer makes this safe right past the last
    /// instruction.
    pub fn peek_op(&self) -> Result<Op> {
        decode_op(self.code[self.pos], self.index)
    }
}

fn decode_op(value: u8, index: u32) -> Result<Op> {
    Op::try_from(value)
        .map_err(|_| DecodeError::UnknownOpcode { index, value }.into())
}

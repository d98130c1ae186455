use std::collections::HashMap;
use std::fmt::Write;

use anyhow::Result;

use crate::opcode::{CodeWalker, Op};
use crate::QvmImage;

/// `parm_num` value once callers disagree on the argument count.
pub const VARIADIC: i32 = -1;

/// Signed 32-bit multiply-xor string hash used to fingerprint functions
/// across builds. Wrapping 32-bit multiplication with the top bit
/// reinterpreted as sign is part of the contract, known-function
/// catalogues store these exact values.
pub fn hash32_signed(input: &str) -> i32 {
    let bytes = input.as_bytes();
    let Some(&first) = bytes.first() else {
        return 0;
    };
    let mut value = u32::from(first) << 7;
    for &byte in bytes {
        value = value.wrapping_mul(1_000_003) ^ u32::from(byte);
    }
    value ^= bytes.len() as u32;
    match value as i32 {
        -1 => -2,
        hash => hash,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionInfo {
    /// instruction count
    pub size: u32,
    /// structural hash of the instruction walk
    pub hash: i32,
    /// highest argument slot stored by an `arg` inside the function,
    /// lower bounded by 0x8
    pub max_args_called: i32,
}

/// Output of the analysis walk, read-only during disassembly.
#[derive(Debug, Default)]
pub struct FunctionAnalysis {
    /// function start instruction index -> per function results
    pub functions: HashMap<u32, FunctionInfo>,
    /// structural hash -> function starts with that hash, in walk order
    pub rev_hashes: HashMap<i32, Vec<u32>>,
    /// call target -> argument slot every caller passed, or [`VARIADIC`]
    pub parm_num: HashMap<i32, i32>,
    /// jump target instruction index -> branching instruction indices
    pub jump_points: HashMap<i32, Vec<u32>>,
    /// call target instruction index -> calling function starts
    pub call_points: HashMap<i32, Vec<u32>>,
}

impl FunctionAnalysis {
    fn flush(
        &mut self,
        start: u32,
        size: u32,
        hash_src: &str,
        max_args: i32,
    ) {
        let hash = hash32_signed(hash_src);
        self.functions.insert(
            start,
            FunctionInfo {
                size,
                hash,
                max_args_called: max_args,
            },
        );
        self.rev_hashes.entry(hash).or_default().push(start);
    }
}

/// Walk the code segment once, finding function boundaries, structural
/// hashes, argument usage and the jump and call graphs. Recognizing call
/// and computed-jump targets only needs a one instruction look-behind for
/// the `const` that pushed them.
pub fn analyze(image: &QvmImage) -> Result<FunctionAnalysis> {
    let mut analysis = FunctionAnalysis::default();
    if image.instruction_count() == 0 {
        return Ok(analysis);
    }
    let mut walker = CodeWalker::new(image);
    let mut func_start = 0u32;
    let mut size = 0u32;
    let mut hash_src = String::new();
    let mut max_args = 0x8;
    let mut last_arg = 0;
    let mut prev: Option<(Op, Option<i32>)> = None;
    while let Some(ins) = walker.next_instruction()? {
        if ins.op == Op::Enter && ins.index != 0 {
            analysis.flush(func_start, size, &hash_src, max_args);
            func_start = ins.index;
            size = 0;
            hash_src.clear();
            max_args = 0x8;
            last_arg = 0;
        }
        size += 1;
        write!(hash_src, "{}", ins.op as u8)?;
        match ins.op {
            Op::Const => {
                if let Some(param) = ins.param {
                    if param < 0 {
                        write!(hash_src, "{param}")?;
                    }
                }
            }
            Op::Local => {
                if let Some(param) = ins.param {
                    write!(hash_src, "{param}")?;
                }
            }
            Op::Arg => {
                let param = ins.param.unwrap_or(0);
                if param > max_args {
                    max_args = param;
                }
                last_arg = param;
            }
            Op::Pop => last_arg = 0,
            Op::Jump => {
                if let Some((Op::Const, Some(target))) = prev {
                    analysis
                        .jump_points
                        .entry(target)
                        .or_default()
                        .push(ins.index);
                }
            }
            Op::Call => {
                if let Some((Op::Const, Some(target))) = prev {
                    analysis
                        .call_points
                        .entry(target)
                        .or_default()
                        .push(func_start);
                    analysis
                        .parm_num
                        .entry(target)
                        .and_modify(|known| {
                            if *known != VARIADIC && *known != last_arg {
                                *known = VARIADIC;
                            }
                        })
                        .or_insert(last_arg);
                }
            }
            op if op.is_jump_param() => {
                if let Some(target) = ins.param {
                    analysis
                        .jump_points
                        .entry(target)
                        .or_default()
                        .push(ins.index);
                }
            }
            _ => {}
        }
        prev = Some((ins.op, ins.param));
    }
    analysis.flush(func_start, size, &hash_src, max_args);
    Ok(analysis)
}

use rstest::rstest;

use std::collections::HashMap;
use std::io::Cursor;

use crate::addr_info::{
    range_lookup, AddressInfo, AnnotationParseError, Constant, RangeLabel,
};
use crate::analysis::{analyze, hash32_signed, VARIADIC};
use crate::disasm::Disassembler;
use crate::opcode::{CodeWalker, DecodeError, Op};
use crate::{InvalidQvmFile, QvmImage, QVM_MAGIC};

fn op0(op: Op) -> Vec<u8> {
    vec![op as u8]
}

fn op1(op: Op, param: u8) -> Vec<u8> {
    vec![op as u8, param]
}

fn op4(op: Op, param: i32) -> Vec<u8> {
    let mut bytes = vec![op as u8];
    bytes.extend_from_slice(&param.to_le_bytes());
    bytes
}

fn build_qvm(
    instructions: &[Vec<u8>],
    data: &[u8],
    lit: &[u8],
    bss_length: u32,
) -> QvmImage {
    let code: Vec<u8> = instructions.concat();
    let code_offset = 32u32;
    let data_offset = code_offset + code.len() as u32;
    let mut raw = Vec::new();
    raw.extend_from_slice(&QVM_MAGIC.to_le_bytes());
    for field in [
        instructions.len() as u32,
        code_offset,
        code.len() as u32,
        data_offset,
        data.len() as u32,
        lit.len() as u32,
        bss_length,
    ] {
        raw.extend_from_slice(&field.to_le_bytes());
    }
    raw.extend_from_slice(&code);
    raw.extend_from_slice(data);
    raw.extend_from_slice(lit);
    QvmImage::read(&mut Cursor::new(raw)).unwrap()
}

fn print_code(image: &QvmImage, info: &AddressInfo) -> String {
    let analysis = analyze(image).unwrap();
    let dis = Disassembler::new(image, info, &analysis);
    let mut out = Vec::new();
    dis.print_code(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn ranges(entries: &[(i32, i32, &str)]) -> HashMap<i32, Vec<RangeLabel>> {
    let mut map: HashMap<i32, Vec<RangeLabel>> = HashMap::new();
    for &(addr, size, name) in entries {
        map.entry(addr).or_default().push(RangeLabel {
            size,
            name: name.to_string(),
        });
    }
    map
}

#[test]
fn header_segment_layout() {
    let image = build_qvm(
        &[op4(Op::Enter, 0x10), op4(Op::Leave, 0x10)],
        &[1, 2, 3, 4],
        b"hi\0",
        0x20,
    );
    let header = image.header();
    assert_eq!(header.instruction_count, 2);
    assert_eq!(header.lit_offset, header.data_offset + header.data_length);
    assert_eq!(
        header.data_length + header.lit_length,
        header.bss_offset - header.data_offset
    );
}

#[test]
fn rejects_bad_magic() {
    let mut raw = vec![0u8; 32];
    raw[0..4].copy_from_slice(&0xdead_beefu32.to_le_bytes());
    let err = QvmImage::read(&mut Cursor::new(raw)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InvalidQvmFile>(),
        Some(InvalidQvmFile::Magic {
            found: 0xdead_beef,
            expected: QVM_MAGIC,
        })
    ));
}

#[test]
fn rejects_truncated_code_segment() {
    let mut raw = Vec::new();
    raw.extend_from_slice(&QVM_MAGIC.to_le_bytes());
    // code segment claims 100 bytes but the file ends with the header
    for field in [1u32, 32, 100, 132, 0, 0, 0] {
        raw.extend_from_slice(&field.to_le_bytes());
    }
    let err = QvmImage::read(&mut Cursor::new(raw)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InvalidQvmFile>(),
        Some(InvalidQvmFile::Truncated { segment: "CODE", .. })
    ));
}

#[test]
fn rejects_negative_header_field() {
    let mut raw = Vec::new();
    raw.extend_from_slice(&QVM_MAGIC.to_le_bytes());
    raw.extend_from_slice(&(-1i32).to_le_bytes());
    raw.extend_from_slice(&[0u8; 24]);
    let err = QvmImage::read(&mut Cursor::new(raw)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InvalidQvmFile>(),
        Some(InvalidQvmFile::Header {
            field: "instruction count",
            value: -1,
        })
    ));
}

#[test]
fn rejects_overflowing_segment_layout() {
    // every field passes the sign check on its own, but the derived
    // offsets run past u32::MAX
    let mut raw = Vec::new();
    raw.extend_from_slice(&QVM_MAGIC.to_le_bytes());
    for field in [
        1u32,        // instruction count
        32,          // code segment offset
        0,           // code segment length
        0x7fff_ffff, // data segment offset
        0x7fff_ffff, // data segment length
        0x7fff_ffff, // lit segment length
        0,           // bss segment length
    ] {
        raw.extend_from_slice(&field.to_le_bytes());
    }
    let err = QvmImage::read(&mut Cursor::new(raw)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<InvalidQvmFile>(),
        Some(InvalidQvmFile::Header { .. })
    ));
}

#[test]
fn decode_rejects_unknown_opcode() {
    let image = build_qvm(&[vec![60]], &[], &[], 0);
    let mut walker = CodeWalker::new(&image);
    let err = walker.next_instruction().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DecodeError>(),
        Some(DecodeError::UnknownOpcode { value: 60, index: 0 })
    ));
}

#[test]
fn decode_rejects_truncated_operand() {
    // a const with only two of its four immediate bytes
    let image = build_qvm(&[vec![Op::Const as u8, 1, 2]], &[], &[], 0);
    let mut walker = CodeWalker::new(&image);
    let err = walker.next_instruction().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DecodeError>(),
        Some(DecodeError::PastEnd { index: 0 })
    ));
}

#[rstest]
#[case("", 0)]
#[case("a", -468864544)]
#[case("abc", -1600925533)]
#[case("34", -1833215761)]
fn hash_fixtures(#[case] input: &str, #[case] expected: i32) {
    assert_eq!(hash32_signed(input), expected);
}

#[test]
fn minimal_module_analysis() {
    let image = build_qvm(
        &[op4(Op::Enter, 0x10), op4(Op::Leave, 0x10)],
        &[],
        &[],
        0,
    );
    let analysis = analyze(&image).unwrap();
    assert_eq!(analysis.functions.len(), 1);
    let func = &analysis.functions[&0];
    assert_eq!(func.size, 2);
    assert_eq!(func.max_args_called, 0x8);
    assert_eq!(func.hash, hash32_signed("34"));
    assert!(analysis.call_points.is_empty());
}

#[test]
fn empty_code_segment_analyzes_to_nothing() {
    let image = build_qvm(&[], &[], &[], 0);
    let analysis = analyze(&image).unwrap();
    assert!(analysis.functions.is_empty());
}

#[test]
fn function_sizes_cover_the_code_segment() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op0(Op::Push),
            op4(Op::Leave, 0x10),
            op4(Op::Enter, 0x20),
            op4(Op::Const, 5),
            op0(Op::Pop),
            op4(Op::Leave, 0x20),
        ],
        &[],
        &[],
        0,
    );
    let analysis = analyze(&image).unwrap();
    let total: u32 = analysis.functions.values().map(|f| f.size).sum();
    assert_eq!(total, image.instruction_count());
    let mut addrs: Vec<u32> = analysis.functions.keys().copied().collect();
    addrs.sort_unstable();
    assert_eq!(addrs, vec![0, 3]);
    assert_eq!(analysis.functions[&0].size, 3);
    assert_eq!(analysis.functions[&3].size, 4);
}

#[test]
fn call_argument_analysis() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, 5),
            op1(Op::Arg, 0x8),
            op4(Op::Const, 0x7),
            op0(Op::Call),
            op4(Op::Leave, 0x10),
        ],
        &[],
        &[],
        0,
    );
    let analysis = analyze(&image).unwrap();
    assert_eq!(analysis.functions.len(), 1);
    assert_eq!(analysis.functions[&0].max_args_called, 0x8);
    assert_eq!(analysis.parm_num[&0x7], 0x8);
    assert_eq!(analysis.call_points[&0x7], vec![0]);
}

#[test]
fn max_args_keeps_the_highest_slot() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, 1),
            op1(Op::Arg, 0x20),
            op4(Op::Const, 2),
            op1(Op::Arg, 0x10),
            op4(Op::Leave, 0x10),
        ],
        &[],
        &[],
        0,
    );
    let analysis = analyze(&image).unwrap();
    assert_eq!(analysis.functions[&0].max_args_called, 0x20);
}

#[test]
fn disagreeing_callers_mark_the_callee_variadic() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, 1),
            op1(Op::Arg, 0x8),
            op4(Op::Const, 0x30),
            op0(Op::Call),
            op0(Op::Pop),
            op4(Op::Const, 2),
            op1(Op::Arg, 0xc),
            op4(Op::Const, 0x30),
            op0(Op::Call),
            op4(Op::Leave, 0x10),
        ],
        &[],
        &[],
        0,
    );
    let analysis = analyze(&image).unwrap();
    assert_eq!(analysis.parm_num[&0x30], VARIADIC);
    assert_eq!(analysis.call_points[&0x30], vec![0, 0]);
}

#[test]
fn identical_functions_share_a_hash_bucket() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Leave, 0x10),
            op4(Op::Enter, 0x10),
            op4(Op::Leave, 0x10),
        ],
        &[],
        &[],
        0,
    );
    let analysis = analyze(&image).unwrap();
    let hash = analysis.functions[&0].hash;
    assert_eq!(analysis.functions[&2].hash, hash);
    assert_eq!(analysis.rev_hashes[&hash], vec![0, 2]);
}

#[test]
fn branch_and_computed_jump_targets() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Eq, 5),
            op4(Op::Const, 3),
            op0(Op::Jump),
            op4(Op::Leave, 0x10),
        ],
        &[],
        &[],
        0,
    );
    let analysis = analyze(&image).unwrap();
    assert_eq!(analysis.jump_points[&5], vec![1]);
    assert_eq!(analysis.jump_points[&3], vec![3]);
}

#[test]
fn range_lookup_prefers_the_closest_start() {
    let map = ranges(&[(100, 16, "A"), (104, 4, "B")]);
    assert_eq!(range_lookup(&map, 106).unwrap(), "B + 0x2");
}

#[test]
fn range_lookup_joins_exact_matches() {
    let map = ranges(&[(100, 16, "A"), (100, 4, "C")]);
    assert_eq!(range_lookup(&map, 100).unwrap(), "A, C");
}

#[test]
fn range_lookup_breaks_ties_by_size() {
    let map = ranges(&[(100, 16, "A"), (100, 4, "B")]);
    assert_eq!(range_lookup(&map, 102).unwrap(), "B + 0x2");
}

#[test]
fn range_lookup_misses_outside_every_range() {
    let map = ranges(&[(100, 4, "A")]);
    assert_eq!(range_lookup(&map, 104), None);
    assert_eq!(range_lookup(&map, 99), None);
}

#[test]
fn loads_syscall_table() {
    let mut info = AddressInfo::default();
    info.load_syscalls(
        Cursor::new("equ trap_Print -1\nequ trap_Error -2 ; engine abort\n"),
        "g_syscalls.asm",
    )
    .unwrap();
    assert_eq!(info.syscalls[&-1], "trap_Print");
    assert_eq!(info.syscalls[&-2], "trap_Error");
}

#[test]
fn loads_function_hash_map() {
    let mut info = AddressInfo::default();
    info.load_function_hashes(
        Cursor::new(
            "0 CG_Init -5f6c2f5d\n0 CG_Shutdown 1f\n0 CG_Other -5f6c2f5d\n",
        ),
        "baseq3-cgame-functions.hmap",
    )
    .unwrap();
    assert_eq!(
        info.base_q3_function_rev_hashes[&-1600925533],
        vec!["CG_Init".to_string(), "CG_Other".to_string()]
    );
    assert_eq!(
        info.base_q3_function_rev_hashes[&0x1f],
        vec!["CG_Shutdown".to_string()]
    );
}

#[test]
fn loads_symbols_and_ranges() {
    let mut info = AddressInfo::default();
    info.load_symbols(
        Cursor::new("100 sym_a\n200 10 buf ; scratch\n200 4 buf_head\n"),
        "symbols.dat",
    )
    .unwrap();
    assert_eq!(info.symbols[&0x100], "sym_a");
    assert_eq!(
        info.symbols_range[&0x200],
        vec![
            RangeLabel {
                size: 0x10,
                name: "buf".to_string()
            },
            RangeLabel {
                size: 4,
                name: "buf_head".to_string()
            },
        ]
    );
}

#[test]
fn loads_function_labels() {
    let mut info = AddressInfo::default();
    info.load_functions(
        Cursor::new(
            "30 CG_DrawField\n\
             arg0 value\n\
             local 10 digits\n\
             local 20 8 scratch\n",
        ),
        "functions.dat",
    )
    .unwrap();
    assert_eq!(info.functions[&0x30], "CG_DrawField");
    assert_eq!(info.function_arg_labels[&0x30]["arg0"], "value");
    assert_eq!(info.function_local_labels[&0x30][&0x10], "digits");
    assert_eq!(
        info.function_local_range_labels[&0x30][&0x20],
        vec![RangeLabel {
            size: 8,
            name: "scratch".to_string()
        }]
    );
}

#[test]
fn local_label_outside_a_function_is_rejected() {
    let mut info = AddressInfo::default();
    let err = info
        .load_functions(Cursor::new("local 10 digits\n"), "functions.dat")
        .unwrap_err();
    let parse = err.downcast_ref::<AnnotationParseError>().unwrap();
    assert_eq!(parse.line, 1);
    assert_eq!(parse.file, "functions.dat");
}

#[test]
fn loads_constants() {
    let mut info = AddressInfo::default();
    info.load_constants(
        Cursor::new("24 MAX_CLIENTS 40\n"),
        "constants.dat",
    )
    .unwrap();
    assert_eq!(
        info.constants[&0x24],
        Constant {
            name: "MAX_CLIENTS".to_string(),
            value: 0x40
        }
    );
}

#[test]
fn loads_comment_blocks() {
    let mut info = AddressInfo::default();
    info.load_comments(
        Cursor::new(
            "8 before\n\
             first line\n\
             second line\n\
             <<<\n\
             10 inline  check cvars\n\
             d 4 after 2 1\n\
             data note\n\
             <<<\n",
        ),
        "comments.dat",
    )
    .unwrap();
    assert_eq!(
        info.code_comments.before[&0x8],
        vec!["first line".to_string(), "second line".to_string()]
    );
    assert!(!info.code_comments.before_spacing.contains_key(&0x8));
    assert_eq!(info.code_comments.inline[&0x10], "check cvars");
    assert_eq!(
        info.data_comments.after[&0x4],
        vec!["data note".to_string()]
    );
    assert_eq!(info.data_comments.after_spacing[&0x4], (2, 1));
}

#[test]
fn comment_block_requires_terminator() {
    let mut info = AddressInfo::default();
    let err = info
        .load_comments(
            Cursor::new("8 before\ndangling\n"),
            "comments.dat",
        )
        .unwrap_err();
    let parse = err.downcast_ref::<AnnotationParseError>().unwrap();
    assert_eq!(parse.line, 1);
}

#[test]
fn rejects_unknown_comment_type() {
    let mut info = AddressInfo::default();
    let err = info
        .load_comments(Cursor::new("8 sideways note\n"), "comments.dat")
        .unwrap_err();
    assert!(err.downcast_ref::<AnnotationParseError>().is_some());
}

#[test]
fn syscall_call_gets_named() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, -1),
            op0(Op::Call),
            op4(Op::Leave, 0x10),
        ],
        &[],
        &[],
        0,
    );
    let mut info = AddressInfo::default();
    info.syscalls.insert(-1, "Sys_Print".to_string());
    let out = print_code(&image, &info);
    assert!(out.contains("  ; Sys_Print()"));
}

#[test]
fn const_into_lit_prints_the_string() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, 0),
            op0(Op::Load4),
            op4(Op::Leave, 0x10),
        ],
        &[],
        b"hi\0",
        0,
    );
    let out = print_code(&image, &AddressInfo::default());
    assert!(out.contains("\n  ; \"hi\"\n"));
}

#[test]
fn const_into_data_resolves_range_symbols() {
    let mut data = vec![0u8; 12];
    data[8] = 1;
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, 8),
            op0(Op::Load4),
            op4(Op::Leave, 0x10),
        ],
        &data,
        &[],
        0,
    );
    let mut info = AddressInfo::default();
    info.symbols_range.entry(4).or_default().push(RangeLabel {
        size: 8,
        name: "vec".to_string(),
    });
    let out = print_code(&image, &info);
    assert!(out.contains("\n  ; 01 00 00 00  (0x1)\n"));
    assert!(out.contains("  ; vec + 0x4"));
}

#[test]
fn const_into_bss_resolves_symbols() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, 0x100),
            op0(Op::Load4),
            op4(Op::Leave, 0x10),
        ],
        &[0, 0, 0, 0],
        &[],
        0x1000,
    );
    let mut info = AddressInfo::default();
    info.symbols.insert(0x100, "clientInfo".to_string());
    let out = print_code(&image, &info);
    assert!(out.contains("  ; clientInfo"));
}

#[test]
fn constants_annotate_and_warn() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, 0x40),
            op0(Op::Pop),
            op4(Op::Const, 0x40),
            op0(Op::Pop),
            op4(Op::Leave, 0x10),
        ],
        &[],
        &[],
        0,
    );
    let mut info = AddressInfo::default();
    info.constants.insert(
        1,
        Constant {
            name: "MAX_CLIENTS".to_string(),
            value: 0x40,
        },
    );
    info.constants.insert(
        3,
        Constant {
            name: "MAX_CLIENTS".to_string(),
            value: 0x50,
        },
    );
    let out = print_code(&image, &info);
    assert!(out.contains("  ; MAX_CLIENTS"));
    assert!(out.contains("  ; FIXME constant val != to code val"));
}

#[test]
fn function_header_names_callers_and_args() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, 4),
            op0(Op::Call),
            op4(Op::Leave, 0x10),
            op4(Op::Enter, 0x20),
            op4(Op::Leave, 0x20),
        ],
        &[],
        &[],
        0,
    );
    let mut info = AddressInfo::default();
    info.functions.insert(0, "vmMain".to_string());
    info.functions.insert(4, "helper".to_string());
    let out = print_code(&image, &info);
    assert!(out.contains("; called from vmMain()"));
    assert!(out.contains("; func helper()"));
    assert!(out.contains("; no args"));
    assert!(out.contains("; max local arg 0x8"));
    assert!(out.contains("; ========================"));
    assert!(out.contains("  ; helper()"));
}

#[test]
fn unnamed_call_target_with_unknown_hash() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, 4),
            op0(Op::Call),
            op4(Op::Leave, 0x10),
            op4(Op::Enter, 0x20),
            op4(Op::Leave, 0x20),
        ],
        &[],
        &[],
        0,
    );
    let out = print_code(&image, &AddressInfo::default());
    assert!(out.contains("; called from 0x0"));
    assert!(out.contains("  ; :unknown function:"));
}

#[test]
fn catalogue_hash_matches_are_suggested() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Const, 4),
            op0(Op::Call),
            op4(Op::Leave, 0x10),
            op4(Op::Enter, 0x20),
            op4(Op::Leave, 0x20),
        ],
        &[],
        &[],
        0,
    );
    let mut info = AddressInfo::default();
    // the callee body hashes like a catalogued function
    info.base_q3_function_rev_hashes
        .insert(hash32_signed("34"), vec!["CG_Init".to_string()]);
    let out = print_code(&image, &info);
    assert!(out.contains("?CG_Init()"));
}

#[test]
fn local_operands_name_arguments_and_locals() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Local, 0x1c),
            op4(Op::Local, 0x8),
            op4(Op::Local, 0x4),
            op4(Op::Leave, 0x10),
        ],
        &[],
        &[],
        0,
    );
    let mut info = AddressInfo::default();
    info.function_arg_labels
        .entry(0)
        .or_default()
        .insert("arg1".to_string(), "msg".to_string());
    info.function_local_labels
        .entry(0)
        .or_default()
        .insert(0x8, "len".to_string());
    info.function_local_range_labels
        .entry(0)
        .or_default()
        .entry(0x2)
        .or_default()
        .push(RangeLabel {
            size: 8,
            name: "buf".to_string(),
        });
    let out = print_code(&image, &info);
    assert!(out.contains("  ; arg1 : msg"));
    assert!(out.contains("  ; len"));
    assert!(out.contains("  ; buf + 0x2"));
}

#[test]
fn jump_targets_are_marked() {
    let image = build_qvm(
        &[
            op4(Op::Enter, 0x10),
            op4(Op::Eq, 3),
            op0(Op::Push),
            op4(Op::Leave, 0x10),
        ],
        &[],
        &[],
        0,
    );
    let out = print_code(&image, &AddressInfo::default());
    assert!(out
        .contains("\n;----------------------------------- from  0x1\n"));
}

#[test]
fn inline_and_block_comments_render_around_code() {
    let image = build_qvm(
        &[op4(Op::Enter, 0x10), op0(Op::Push), op4(Op::Leave, 0x10)],
        &[],
        &[],
        0,
    );
    let mut info = AddressInfo::default();
    info.code_comments
        .inline
        .insert(1, "keep the handle".to_string());
    info.code_comments
        .before
        .insert(1, vec!["setup".to_string()]);
    info.code_comments
        .after
        .insert(1, vec!["done".to_string()]);
    let out = print_code(&image, &info);
    assert!(out.contains("; setup\n"));
    assert!(out.contains("  ; keep the handle\n"));
    assert!(out.contains("; done\n"));
}

#[test]
fn code_listing_line_format() {
    let image = build_qvm(
        &[op4(Op::Enter, 0x10), op0(Op::Push), op4(Op::Leave, 0x10)],
        &[],
        &[],
        0,
    );
    let out = print_code(&image, &AddressInfo::default());
    assert!(out.contains("00000000  enter               0x10\n"));
    assert!(out.contains("00000001  push            1\n"));
    assert!(out.contains("00000002  leave               0x10\n"));
}

#[test]
fn data_dump_rows() {
    let image = build_qvm(
        &[op4(Op::Enter, 0x10), op4(Op::Leave, 0x10)],
        &[0x01, 0x02, 0x03, 0x04, 0xff, 0, 0, 0],
        &[],
        0,
    );
    let mut info = AddressInfo::default();
    info.data_comments.inline.insert(4, "counter".to_string());
    let analysis = analyze(&image).unwrap();
    let dis = Disassembler::new(&image, &info, &analysis);
    let mut out = Vec::new();
    dis.print_data(&mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert_eq!(
        out,
        "0x00000000   01 02 03 04    0x4030201\n\
         0x00000004   ff 00 00 00    0xff  ; counter\n"
    );
}

#[test]
fn lit_dump_escapes_and_breaks() {
    let image = build_qvm(
        &[op4(Op::Enter, 0x10), op4(Op::Leave, 0x10)],
        &[0, 0, 0, 0],
        b"ok\x01go\0",
        0,
    );
    let analysis = analyze(&image).unwrap();
    let info = AddressInfo::default();
    let dis = Disassembler::new(&image, &info, &analysis);
    let mut out = Vec::new();
    dis.print_lit(&mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert_eq!(out, "0x00000004  \"ok\"  0x1  \"go\"\n");
}

#[test]
fn header_listing_format() {
    let image = build_qvm(
        &[op4(Op::Enter, 0x10), op4(Op::Leave, 0x10)],
        &[],
        &[],
        0,
    );
    let analysis = analyze(&image).unwrap();
    let info = AddressInfo::default();
    let dis = Disassembler::new(&image, &info, &analysis);
    let mut out = Vec::new();
    dis.print_header(&mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert_eq!(
        out,
        "; instruction count: 0x2\n\
         ; CODE seg offset: 0x00000020  length: 0xa\n\
         ; DATA seg offset: 0x0000002a  length: 0x0\n\
         ; LIT  seg offset: 0x0000002a  length: 0x0\n\
         ; BSS  seg offset: 0x0000002a  length: 0x0\n"
    );
}

#[test]
fn function_hash_rows() {
    let image = build_qvm(
        &[op4(Op::Enter, 0x10), op4(Op::Leave, 0x10)],
        &[],
        &[],
        0,
    );
    let analysis = analyze(&image).unwrap();
    let mut info = AddressInfo::default();
    let dis = Disassembler::new(&image, &info, &analysis);
    let mut out = Vec::new();
    dis.print_function_hashes(&mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert_eq!(out, "0x00000000  0x2  -6d44a711\n");

    info.base_q3_function_rev_hashes
        .insert(hash32_signed("34"), vec!["vmMain".to_string()]);
    let dis = Disassembler::new(&image, &info, &analysis);
    let mut out = Vec::new();
    dis.print_function_hashes(&mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert_eq!(
        out,
        "0x00000000  0x2  -6d44a711\tpossible match to vmMain\n"
    );
}

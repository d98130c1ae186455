use std::io::Write;

use anyhow::Result;

use crate::addr_info::{range_lookup, AddressInfo, CommentSet};
use crate::analysis::{FunctionAnalysis, VARIADIC};
use crate::opcode::{CodeWalker, Op};
use crate::QvmImage;

enum Block {
    Before,
    After,
}

/// Emits the annotated listing. Borrows the image, the sidecar
/// annotations and the analysis results, mutating none of them.
pub struct Disassembler<'a> {
    image: &'a QvmImage,
    info: &'a AddressInfo,
    analysis: &'a FunctionAnalysis,
}

impl<'a> Disassembler<'a> {
    pub fn new(
        image: &'a QvmImage,
        info: &'a AddressInfo,
        analysis: &'a FunctionAnalysis,
    ) -> Self {
        Disassembler {
            image,
            info,
            analysis,
        }
    }

    pub fn print_header(&self, out: &mut impl Write) -> Result<()> {
        let header = self.image.header();
        writeln!(
            out,
            "; instruction count: 0x{:x}",
            header.instruction_count
        )?;
        writeln!(
            out,
            "; CODE seg offset: 0x{:08x}  length: 0x{:x}",
            header.code_offset, header.code_length
        )?;
        writeln!(
            out,
            "; DATA seg offset: 0x{:08x}  length: 0x{:x}",
            header.data_offset, header.data_length
        )?;
        writeln!(
            out,
            "; LIT  seg offset: 0x{:08x}  length: 0x{:x}",
            header.lit_offset, header.lit_length
        )?;
        writeln!(
            out,
            "; BSS  seg offset: 0x{:08x}  length: 0x{:x}",
            header.bss_offset, header.bss_length
        )?;
        Ok(())
    }

    /// Second walk over the code segment, resolving every operand to the
    /// richest annotation available.
    pub fn print_code(&self, out: &mut impl Write) -> Result<()> {
        let data_length = self.image.data_length() as i32;
        let lit_length = self.image.lit_length() as i32;
        let mut walker = CodeWalker::new(self.image);
        // tracked so `local` operands resolve against the right function
        let mut current_func = 0i32;
        let mut stack_adjust = 0i32;
        while let Some(ins) = walker.next_instruction()? {
            let count = ins.index as i32;
            if ins.op != Op::Enter {
                self.emit_block(
                    out,
                    &self.info.code_comments,
                    count,
                    Block::Before,
                )?;
            }
            if let Some(sources) = self.analysis.jump_points.get(&count) {
                write!(out, "\n;----------------------------------- from ")?;
                for source in sources {
                    write!(out, " 0x{source:x}")?;
                }
                writeln!(out)?;
            }
            let mut comment = None;
            match ins.op {
                Op::Enter => {
                    current_func = count;
                    stack_adjust = ins.param.unwrap_or(0);
                    self.print_function_header(out, ins.index)?;
                    self.emit_block(
                        out,
                        &self.info.code_comments,
                        count,
                        Block::Before,
                    )?;
                }
                Op::Local => {
                    if let Some(param) = ins.param {
                        comment = self.local_comment(
                            current_func,
                            stack_adjust,
                            param,
                        );
                    }
                }
                Op::Const => {
                    if let Some(param) = ins.param {
                        comment = self.const_comment(
                            out,
                            count,
                            param,
                            walker.peek_op()?,
                            data_length,
                            lit_length,
                        )?;
                    }
                }
                _ => {}
            }
            let inline = self.info.code_comments.inline.get(&count);
            let delta = ins.op.stack_delta();
            if delta != 0 || ins.param.is_some() {
                write!(out, "{:08x}  {:<13}", ins.index, ins.op.mnemonic())?;
            } else {
                write!(out, "{:08x}  {}", ins.index, ins.op.mnemonic())?;
            }
            if delta < 0 {
                write!(out, "  {delta}")?;
            } else if delta > 0 {
                write!(out, "   {delta}")?;
            } else if ins.param.is_some()
                || comment.is_some()
                || inline.is_some()
            {
                write!(out, "    ")?;
            }
            if let Some(param) = ins.param {
                if param < 0 {
                    write!(out, "  -0x{:x}", -i64::from(param))?;
                } else {
                    write!(out, "   0x{param:x}")?;
                }
            }
            if let Some(comment) = &comment {
                write!(out, "  ; {comment}")?;
            }
            if let Some(inline) = inline {
                write!(out, "  ; {inline}")?;
            }
            writeln!(out)?;
            self.emit_block(
                out,
                &self.info.code_comments,
                count,
                Block::After,
            )?;
        }
        Ok(())
    }

    /// DATA is dumped one 32-bit word per line.
    pub fn print_data(&self, out: &mut impl Write) -> Result<()> {
        let data = self.image.data();
        let length = self.image.data_length() as usize;
        let mut count = 0;
        while count < length {
            let key = count as i32;
            self.emit_block(
                out,
                &self.info.data_comments,
                key,
                Block::Before,
            )?;
            let raw = [
                data[count],
                data[count + 1],
                data[count + 2],
                data[count + 3],
            ];
            write!(out, "0x{count:08x}  ")?;
            write!(
                out,
                " {:02x} {:02x} {:02x} {:02x}    0x{:x}",
                raw[0],
                raw[1],
                raw[2],
                raw[3],
                u32::from_le_bytes(raw)
            )?;
            if let Some(inline) = self.info.data_comments.inline.get(&key) {
                write!(out, "  ; {inline}")?;
            }
            writeln!(out)?;
            self.emit_block(out, &self.info.data_comments, key, Block::After)?;
            count += 4;
        }
        Ok(())
    }

    /// LIT is dumped as quoted runs, a non printable byte interrupts the
    /// run and a NUL (or the segment end) finishes the string.
    pub fn print_lit(&self, out: &mut impl Write) -> Result<()> {
        let lit = self.image.lit();
        let length = self.image.lit_length() as usize;
        let pos = self.image.data_length() as usize;
        let mut offset = 0;
        while offset < length {
            let key = (offset + pos) as i32;
            self.emit_block(
                out,
                &self.info.data_comments,
                key,
                Block::Before,
            )?;
            write!(out, "0x{:08x}  ", offset + pos)?;
            let mut run = String::new();
            let mut i = 0;
            loop {
                let c = lit[offset + i];
                if c == b'\n' {
                    run.push_str("\\n");
                } else if c == b'\t' {
                    run.push_str("\\t");
                } else if c > 31 && c < 127 {
                    run.push(c as char);
                } else if c == 0 || offset + i >= length {
                    write!(out, "\"{run}\"")?;
                    if let Some(inline) =
                        self.info.data_comments.inline.get(&key)
                    {
                        write!(out, "  ; {inline}")?;
                    }
                    writeln!(out)?;
                    self.emit_block(
                        out,
                        &self.info.data_comments,
                        key,
                        Block::After,
                    )?;
                    offset += i;
                    break;
                } else {
                    if !run.is_empty() {
                        write!(out, "\"{run}\" ")?;
                        run.clear();
                    }
                    write!(out, " 0x{c:x}  ")?;
                }
                i += 1;
            }
            offset += 1;
        }
        Ok(())
    }

    /// One row per function, sorted by address, with the catalogue names
    /// the structural hash matches.
    pub fn print_function_hashes(&self, out: &mut impl Write) -> Result<()> {
        let mut addrs: Vec<u32> =
            self.analysis.functions.keys().copied().collect();
        addrs.sort_unstable();
        for addr in addrs {
            let Some(func) = self.analysis.functions.get(&addr) else {
                continue;
            };
            write!(
                out,
                "0x{:08x}  0x{:x}  {}",
                addr,
                func.size,
                signed_hex(func.hash)
            )?;
            if let Some(names) =
                self.info.base_q3_function_rev_hashes.get(&func.hash)
            {
                write!(out, "\tpossible match to")?;
                for name in names {
                    write!(out, " {name}")?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    fn print_function_header(
        &self,
        out: &mut impl Write,
        addr: u32,
    ) -> Result<()> {
        let count = addr as i32;
        if let Some(callers) = self.analysis.call_points.get(&count) {
            write!(out, "\n; called from")?;
            for &caller in callers {
                if let Some(name) = self.info.functions.get(&(caller as i32))
                {
                    write!(out, " {name}()")?;
                } else if let Some(names) = self.known_names(caller) {
                    for name in names {
                        write!(out, " ?{name}()")?;
                    }
                } else {
                    write!(out, " 0x{caller:x}")?;
                }
            }
            writeln!(out)?;
        }
        writeln!(out)?;
        if let Some(name) = self.info.functions.get(&count) {
            writeln!(out, "; func {name}()")?;
        } else if let Some(names) = self.known_names(addr) {
            write!(out, ";")?;
            for name in names {
                write!(out, " ?{name}()")?;
            }
            writeln!(out)?;
        }
        if let Some(&parm) = self.analysis.parm_num.get(&count) {
            write!(out, ";")?;
            match parm {
                0 => write!(out, " no")?,
                VARIADIC => write!(out, " var")?,
                _ => write!(out, " 0x{parm:x}")?,
            }
            writeln!(out, " args")?;
        }
        let max_args = self
            .analysis
            .functions
            .get(&addr)
            .map(|func| func.max_args_called)
            .unwrap_or(0x8);
        writeln!(out, "; max local arg 0x{max_args:x}")?;
        writeln!(out, "; ========================")?;
        Ok(())
    }

    /// Catalogue names matching the structural hash of the function at
    /// `addr`, if any.
    fn known_names(&self, addr: u32) -> Option<&'a Vec<String>> {
        let hash = self.analysis.functions.get(&addr)?.hash;
        self.info.base_q3_function_rev_hashes.get(&hash)
    }

    /// A `local` operand at or above `stack_adjust + 0x8` reads a caller
    /// supplied argument, below that it is a local variable.
    fn local_comment(
        &self,
        func: i32,
        stack_adjust: i32,
        param: i32,
    ) -> Option<String> {
        let arg_num = i64::from(param) - i64::from(stack_adjust) - 0x8;
        if arg_num >= 0 {
            let arg_str = format!("arg{}", arg_num / 4);
            let label = self
                .info
                .function_arg_labels
                .get(&func)
                .and_then(|labels| labels.get(&arg_str));
            return Some(match label {
                Some(label) => format!("{arg_str} : {label}"),
                None => arg_str,
            });
        }
        if let Some(label) = self
            .info
            .function_local_labels
            .get(&func)
            .and_then(|labels| labels.get(&param))
        {
            return Some(label.clone());
        }
        let ranges = self.info.function_local_range_labels.get(&func)?;
        range_lookup(ranges, param)
    }

    /// Resolve a `const` operand: a user constant, a string in LIT, a
    /// word in DATA, a call target (syscall, named function or catalogue
    /// hash match) or a BSS symbol, depending on range and on the opcode
    /// that consumes the value.
    fn const_comment(
        &self,
        out: &mut impl Write,
        count: i32,
        param: i32,
        next_op: Op,
        data_length: i32,
        lit_length: i32,
    ) -> Result<Option<String>> {
        let next_is_transfer = matches!(next_op, Op::Call | Op::Jump);
        if let Some(constant) = self.info.constants.get(&count) {
            if param != constant.value {
                return Ok(Some(
                    "FIXME constant val != to code val".to_string(),
                ));
            }
            return Ok(Some(constant.name.clone()));
        }
        if param >= data_length
            && i64::from(param) < i64::from(data_length) + i64::from(lit_length)
            && !next_is_transfer
        {
            let escaped = self.lit_string((param - data_length) as usize);
            writeln!(out, "\n  ; \"{escaped}\"")?;
            return Ok(None);
        }
        if param >= 0 && param < data_length && !next_is_transfer {
            let offset = param as usize;
            let data = self.image.data();
            let raw = [
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ];
            writeln!(
                out,
                "\n  ; {:02x} {:02x} {:02x} {:02x}  (0x{:x})",
                raw[0],
                raw[1],
                raw[2],
                raw[3],
                u32::from_le_bytes(raw)
            )?;
            if let Some(name) = self.info.symbols.get(&param) {
                return Ok(Some(name.clone()));
            }
            return Ok(range_lookup(&self.info.symbols_range, param));
        }
        if next_op == Op::Call {
            if param < 0 {
                if let Some(name) = self.info.syscalls.get(&param) {
                    return Ok(Some(format!("{name}()")));
                }
            }
            if let Some(name) = self.info.functions.get(&param) {
                return Ok(Some(format!("{name}()")));
            }
            if param >= 0 {
                if let Some(func) =
                    self.analysis.functions.get(&(param as u32))
                {
                    let comment = match self
                        .info
                        .base_q3_function_rev_hashes
                        .get(&func.hash)
                    {
                        Some(names) => names
                            .iter()
                            .map(|name| format!(" ?{name}()"))
                            .collect::<String>(),
                        None => ":unknown function:".to_string(),
                    };
                    return Ok(Some(comment));
                }
            }
            return Ok(None);
        }
        if param >= data_length && !next_is_transfer {
            // points into BSS
            if let Some(name) = self.info.symbols.get(&param) {
                return Ok(Some(name.clone()));
            }
            return Ok(range_lookup(&self.info.symbols_range, param));
        }
        Ok(None)
    }

    // NUL terminated, \n and \t become escapes, other non printable bytes
    // render as \xHH
    fn lit_string(&self, start: usize) -> String {
        let lit = self.image.lit();
        let mut escaped = String::new();
        let mut i = start;
        loop {
            let c = lit[i];
            match c {
                0 => break,
                b'\n' => escaped.push_str("\\n"),
                b'\t' => escaped.push_str("\\t"),
                32..=126 => escaped.push(c as char),
                _ => escaped.push_str(&format!("\\x{c:x}")),
            }
            i += 1;
        }
        escaped
    }

    fn emit_block(
        &self,
        out: &mut impl Write,
        comments: &CommentSet,
        key: i32,
        which: Block,
    ) -> Result<()> {
        let (lines, spacing) = match which {
            Block::Before => {
                (comments.before.get(&key), comments.before_spacing.get(&key))
            }
            Block::After => {
                (comments.after.get(&key), comments.after_spacing.get(&key))
            }
        };
        let Some(lines) = lines else {
            return Ok(());
        };
        let (space_before, space_after) = spacing.copied().unwrap_or((0, 0));
        for _ in 0..space_before {
            writeln!(out)?;
        }
        for line in lines {
            writeln!(out, "; {line}")?;
        }
        for _ in 0..space_after {
            writeln!(out)?;
        }
        Ok(())
    }
}

// negative hashes print as minus sign plus magnitude, the convention the
// hash map files use, not two's complement
fn signed_hex(value: i32) -> String {
    if value < 0 {
        format!("-{:x}", -i64::from(value))
    } else {
        format!("{value:x}")
    }
}

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Result;

use crate::QvmModule;

pub const SYMBOLS_FILE: &str = "symbols.dat";
pub const FUNCTIONS_FILE: &str = "functions.dat";
pub const CONSTANTS_FILE: &str = "constants.dat";
pub const COMMENTS_FILE: &str = "comments.dat";

/// A malformed sidecar line. Loading stops at the first one.
#[derive(Debug)]
pub struct AnnotationParseError {
    pub file: String,
    /// 1-based
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for AnnotationParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in line {} of {}", self.message, self.line, self.file)
    }
}

impl std::error::Error for AnnotationParseError {}

fn parse_error(
    file: &str,
    line: usize,
    message: impl Into<String>,
) -> anyhow::Error {
    AnnotationParseError {
        file: file.to_string(),
        line,
        message: message.into(),
    }
    .into()
}

/// A label covering `size` bytes from its starting address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeLabel {
    pub size: i32,
    pub name: String,
}

/// An expected `const` immediate at a fixed code address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constant {
    pub name: String,
    pub value: i32,
}

/// Inline, before and after comments keyed by address, one set for the
/// code segment (instruction indices) and one for the data segments (byte
/// offsets). Blocks without explicit spacing render with `(0, 0)` blank
/// lines around them.
#[derive(Debug, Default, Clone)]
pub struct CommentSet {
    pub inline: HashMap<i32, String>,
    pub before: HashMap<i32, Vec<String>>,
    pub before_spacing: HashMap<i32, (u32, u32)>,
    pub after: HashMap<i32, Vec<String>>,
    pub after_spacing: HashMap<i32, (u32, u32)>,
}

/// Everything the sidecar files know about a module, consumed read-only
/// by the disassembler.
#[derive(Debug, Default, Clone)]
pub struct AddressInfo {
    /// negative syscall number -> engine trap name
    pub syscalls: HashMap<i32, String>,
    /// function start instruction index -> user name
    pub functions: HashMap<i32, String>,
    /// function start -> ("argN" -> label)
    pub function_arg_labels: HashMap<i32, HashMap<String, String>>,
    /// function start -> (local offset -> label)
    pub function_local_labels: HashMap<i32, HashMap<i32, String>>,
    /// function start -> (local offset -> range labels)
    pub function_local_range_labels:
        HashMap<i32, HashMap<i32, Vec<RangeLabel>>>,
    /// data/bss address -> label
    pub symbols: HashMap<i32, String>,
    /// data/bss address -> range labels
    pub symbols_range: HashMap<i32, Vec<RangeLabel>>,
    /// code instruction index -> expected constant
    pub constants: HashMap<i32, Constant>,
    pub code_comments: CommentSet,
    pub data_comments: CommentSet,
    /// structural hash -> names of known functions with that hash
    pub base_q3_function_rev_hashes: HashMap<i32, Vec<String>>,
}

impl AddressInfo {
    /// Load the engine syscall table and known-function catalogue for a
    /// module flavor. Missing files leave the maps empty.
    pub fn load_module_tables(
        &mut self,
        dir: &Path,
        module: QvmModule,
    ) -> Result<()> {
        let path = dir.join(module.syscalls_file());
        if path.exists() {
            let input = BufReader::new(File::open(&path)?);
            self.load_syscalls(input, &path.to_string_lossy())?;
        }
        let path = dir.join(module.hash_map_file());
        if path.exists() {
            let input = BufReader::new(File::open(&path)?);
            self.load_function_hashes(input, &path.to_string_lossy())?;
        }
        Ok(())
    }

    /// Load the user annotation files from a directory. Missing files are
    /// skipped.
    pub fn load_user_annotations(&mut self, dir: &Path) -> Result<()> {
        let path = dir.join(SYMBOLS_FILE);
        if path.exists() {
            let input = BufReader::new(File::open(&path)?);
            self.load_symbols(input, &path.to_string_lossy())?;
        }
        let path = dir.join(FUNCTIONS_FILE);
        if path.exists() {
            let input = BufReader::new(File::open(&path)?);
            self.load_functions(input, &path.to_string_lossy())?;
        }
        let path = dir.join(CONSTANTS_FILE);
        if path.exists() {
            let input = BufReader::new(File::open(&path)?);
            self.load_constants(input, &path.to_string_lossy())?;
        }
        let path = dir.join(COMMENTS_FILE);
        if path.exists() {
            let input = BufReader::new(File::open(&path)?);
            self.load_comments(input, &path.to_string_lossy())?;
        }
        Ok(())
    }

    /// Syscall table lines are `equ NAME -NUMBER`, number in decimal.
    pub fn load_syscalls(
        &mut self,
        input: impl BufRead,
        file: &str,
    ) -> Result<()> {
        for (number, line) in input.lines().enumerate() {
            let line = line?;
            let words: Vec<&str> =
                strip_line_comment(&line).split_whitespace().collect();
            if words.len() == 3 {
                let value = parse_dec(words[2]).ok_or_else(|| {
                    parse_error(
                        file,
                        number + 1,
                        "couldn't parse system call number",
                    )
                })?;
                self.syscalls.insert(value, words[1].to_string());
            }
        }
        Ok(())
    }

    /// Hash map lines are `ADDR NAME HASH`, hash in hex, possibly
    /// negative. Colliding hashes accumulate names.
    pub fn load_function_hashes(
        &mut self,
        input: impl BufRead,
        file: &str,
    ) -> Result<()> {
        for (number, line) in input.lines().enumerate() {
            let line = line?;
            let words: Vec<&str> =
                strip_line_comment(&line).split_whitespace().collect();
            if words.len() > 2 {
                let hash = parse_hex(words[2]).ok_or_else(|| {
                    parse_error(file, number + 1, "couldn't parse hash value")
                })?;
                self.base_q3_function_rev_hashes
                    .entry(hash)
                    .or_default()
                    .push(words[1].to_string());
            }
        }
        Ok(())
    }

    /// `ADDR NAME` for a point symbol, `ADDR SIZE NAME` for a range.
    pub fn load_symbols(
        &mut self,
        input: impl BufRead,
        file: &str,
    ) -> Result<()> {
        for (number, line) in input.lines().enumerate() {
            let line = line?;
            let words: Vec<&str> =
                strip_line_comment(&line).split_whitespace().collect();
            match words.len() {
                2 => {
                    let addr = parse_hex(words[0]).ok_or_else(|| {
                        parse_error(file, number + 1, "couldn't parse address")
                    })?;
                    self.symbols.insert(addr, words[1].to_string());
                }
                3 => {
                    let (addr, size) = parse_hex(words[0])
                        .zip(parse_hex(words[1]))
                        .ok_or_else(|| {
                            parse_error(
                                file,
                                number + 1,
                                "couldn't parse address or size",
                            )
                        })?;
                    self.symbols_range.entry(addr).or_default().push(
                        RangeLabel {
                            size,
                            name: words[2].to_string(),
                        },
                    );
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// `ADDR NAME` begins a function, `argN NAME` and
    /// `local ADDR [SIZE] NAME` attach labels to the most recent one.
    pub fn load_functions(
        &mut self,
        input: impl BufRead,
        file: &str,
    ) -> Result<()> {
        let mut current_func: Option<i32> = None;
        for (number, line) in input.lines().enumerate() {
            let line = line?;
            let words: Vec<&str> =
                strip_line_comment(&line).split_whitespace().collect();
            if words.len() < 2 {
                continue;
            }
            if words[0].starts_with("arg") {
                let func = current_func.ok_or_else(|| {
                    parse_error(file, number + 1, "function not defined yet")
                })?;
                self.function_arg_labels
                    .entry(func)
                    .or_default()
                    .insert(words[0].to_string(), words[1].to_string());
            } else if words[0] == "local" {
                let func = current_func.ok_or_else(|| {
                    parse_error(file, number + 1, "function not defined yet")
                })?;
                if words.len() < 3 {
                    return Err(parse_error(
                        file,
                        number + 1,
                        "invalid local specification",
                    ));
                }
                if words.len() > 3 {
                    let (addr, size) = parse_hex(words[1])
                        .zip(parse_hex(words[2]))
                        .ok_or_else(|| {
                            parse_error(
                                file,
                                number + 1,
                                "couldn't parse address or size of range",
                            )
                        })?;
                    self.function_local_range_labels
                        .entry(func)
                        .or_default()
                        .entry(addr)
                        .or_default()
                        .push(RangeLabel {
                            size,
                            name: words[3].to_string(),
                        });
                } else {
                    let addr = parse_hex(words[1]).ok_or_else(|| {
                        parse_error(file, number + 1, "couldn't parse address")
                    })?;
                    self.function_local_labels
                        .entry(func)
                        .or_default()
                        .insert(addr, words[2].to_string());
                }
            } else {
                let addr = parse_hex(words[0]).ok_or_else(|| {
                    parse_error(file, number + 1, "couldn't parse address")
                })?;
                self.functions.insert(addr, words[1].to_string());
                current_func = Some(addr);
            }
        }
        Ok(())
    }

    /// `CODE_ADDR NAME VALUE`, all hex.
    pub fn load_constants(
        &mut self,
        input: impl BufRead,
        file: &str,
    ) -> Result<()> {
        for (number, line) in input.lines().enumerate() {
            let line = line?;
            let words: Vec<&str> =
                strip_line_comment(&line).split_whitespace().collect();
            if words.len() > 2 {
                let (addr, value) = parse_hex(words[0])
                    .zip(parse_hex(words[2]))
                    .ok_or_else(|| {
                        parse_error(
                            file,
                            number + 1,
                            "couldn't parse address or value",
                        )
                    })?;
                self.constants.insert(
                    addr,
                    Constant {
                        name: words[1].to_string(),
                        value,
                    },
                );
            }
        }
        Ok(())
    }

    /// `[d] ADDR inline TEXT` or `[d] ADDR before|after [SPACE [SPACE]]`
    /// followed by block lines up to a `<<<` terminator. The `d` marker
    /// targets the data segment instead of code.
    pub fn load_comments(
        &mut self,
        input: impl BufRead,
        file: &str,
    ) -> Result<()> {
        let lines: Vec<String> =
            input.lines().collect::<std::io::Result<_>>()?;
        let mut number = 0;
        while number < lines.len() {
            let stripped = strip_line_comment(&lines[number]);
            let mut words: Vec<&str> = stripped.split_whitespace().collect();
            let mut data_comment = false;
            if words.len() > 1 && words[0] == "d" {
                data_comment = true;
                words.remove(0);
            }
            if words.len() > 1 {
                let addr = parse_hex(words[0]).ok_or_else(|| {
                    parse_error(file, number + 1, "couldn't get address")
                })?;
                let comments = if data_comment {
                    &mut self.data_comments
                } else {
                    &mut self.code_comments
                };
                match words[1] {
                    "inline" => {
                        if words.len() > 2 {
                            comments
                                .inline
                                .insert(addr, inline_text(stripped, words[2]));
                        }
                    }
                    kind @ ("before" | "after") => {
                        let mut space_before = 0;
                        let mut space_after = 0;
                        if words.len() > 2 {
                            space_before =
                                parse_dec(words[2]).ok_or_else(|| {
                                    parse_error(
                                        file,
                                        number + 1,
                                        "couldn't get space before or after \
                                         value",
                                    )
                                })?;
                            if words.len() > 3 {
                                space_after =
                                    parse_dec(words[3]).ok_or_else(|| {
                                        parse_error(
                                            file,
                                            number + 1,
                                            "couldn't get space before or \
                                             after value",
                                        )
                                    })?;
                            }
                        }
                        let start = number + 1;
                        let mut block = Vec::new();
                        let mut terminated = false;
                        number += 1;
                        while number < lines.len() {
                            if lines[number] == "<<<" {
                                terminated = true;
                                break;
                            }
                            block.push(lines[number].clone());
                            number += 1;
                        }
                        if !terminated {
                            return Err(parse_error(
                                file,
                                start,
                                "comment block without <<< terminator",
                            ));
                        }
                        if space_before > 0 || space_after > 0 {
                            let spacing = (
                                space_before.max(0) as u32,
                                space_after.max(0) as u32,
                            );
                            if kind == "before" {
                                comments.before_spacing.insert(addr, spacing);
                            } else {
                                comments.after_spacing.insert(addr, spacing);
                            }
                        }
                        if kind == "before" {
                            comments.before.insert(addr, block);
                        } else {
                            comments.after.insert(addr, block);
                        }
                    }
                    _ => {
                        return Err(parse_error(
                            file,
                            number + 1,
                            "invalid comment type",
                        ))
                    }
                }
            }
            number += 1;
        }
        Ok(())
    }
}

/// Resolve an address against range labels. Labels starting exactly at
/// the address win collectively and are joined by `", "`; otherwise the
/// tightest enclosing range (smallest offset into the range, then
/// smallest range size) names the address with a `+ 0x..` offset suffix.
pub fn range_lookup(
    ranges: &HashMap<i32, Vec<RangeLabel>>,
    addr: i32,
) -> Option<String> {
    if let Some(exact) = ranges.get(&addr) {
        if !exact.is_empty() {
            let names: Vec<&str> =
                exact.iter().map(|label| label.name.as_str()).collect();
            return Some(names.join(", "));
        }
    }
    let mut best: Option<(i64, i32, &str)> = None;
    for (&start, labels) in ranges {
        let diff = i64::from(addr) - i64::from(start);
        if diff < 0 {
            continue;
        }
        for label in labels {
            if diff >= i64::from(label.size) {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_diff, best_size, _)) => {
                    diff < best_diff
                        || (diff == best_diff && label.size < best_size)
                }
            };
            if better {
                best = Some((diff, label.size, label.name.as_str()));
            }
        }
    }
    best.map(|(diff, _, name)| format!("{name} + 0x{diff:x}"))
}

fn strip_line_comment(line: &str) -> &str {
    line.split(';').next().unwrap_or("")
}

// the comment text is the remainder of the line starting at its third
// token, with interior spacing kept
fn inline_text(stripped: &str, third_word: &str) -> String {
    match stripped.find(third_word) {
        Some(at) => stripped[at..].trim_end().to_string(),
        None => third_word.to_string(),
    }
}

fn parse_hex(token: &str) -> Option<i32> {
    let (negative, rest) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let rest = rest
        .strip_prefix("0x")
        .or_else(|| rest.strip_prefix("0X"))
        .unwrap_or(rest);
    let value = i64::from_str_radix(rest, 16).ok()?;
    i32::try_from(if negative { -value } else { value }).ok()
}

fn parse_dec(token: &str) -> Option<i32> {
    token.parse::<i32>().ok()
}

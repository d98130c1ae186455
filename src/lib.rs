#![forbid(unsafe_code)]
pub mod addr_info;
pub mod analysis;
pub mod disasm;
pub mod opcode;
pub(crate) mod qvm_reader;

#[cfg(test)]
mod test;

use std::io::{Read, Seek, SeekFrom};

use anyhow::Result;

use qvm_reader::QvmRead;

pub const QVM_MAGIC: u32 = 0x12721444;

// trailing zero bytes appended to each segment so decoding may look a few
// bytes past the segment end
const CODE_PAD: usize = 5;
const DATA_PAD: usize = 4;
const LIT_PAD: usize = 4;

/// Module flavor of a QVM, selects which engine syscall table and
/// known-function catalogue apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QvmModule {
    Cgame,
    Game,
    Ui,
}

impl QvmModule {
    pub fn syscalls_file(self) -> &'static str {
        match self {
            QvmModule::Cgame => "cg_syscalls.asm",
            QvmModule::Game => "g_syscalls.asm",
            QvmModule::Ui => "ui_syscalls.asm",
        }
    }

    pub fn hash_map_file(self) -> &'static str {
        match self {
            QvmModule::Cgame => "baseq3-cgame-functions.hmap",
            QvmModule::Game => "baseq3-game-functions.hmap",
            QvmModule::Ui => "baseq3-ui-functions.hmap",
        }
    }
}

#[derive(Debug)]
pub enum InvalidQvmFile {
    Magic {
        found: u32,
        expected: u32,
    },
    Header {
        field: &'static str,
        value: i32,
    },
    Truncated {
        segment: &'static str,
        end: u64,
        file_size: u64,
    },
}

impl std::fmt::Display for InvalidQvmFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Magic { found, expected } => {
                write!(f, "not a valid qvm file  0x{found:x} != 0x{expected:x}")
            }
            Self::Header { field, value } => {
                write!(f, "invalid {field} in qvm header: {value}")
            }
            Self::Truncated {
                segment,
                end,
                file_size,
            } => write!(
                f,
                "{segment} segment ends at 0x{end:x}, past the end of the \
                 file (0x{file_size:x} bytes)"
            ),
        }
    }
}

impl std::error::Error for InvalidQvmFile {}

/// The eight 32-bit header fields. LIT and BSS offsets are not stored in
/// the file, they follow DATA and LIT respectively.
#[derive(Debug, Clone, Copy)]
pub struct QvmHeader {
    pub instruction_count: u32,
    pub code_offset: u32,
    pub code_length: u32,
    pub data_offset: u32,
    pub data_length: u32,
    pub lit_offset: u32,
    pub lit_length: u32,
    pub bss_offset: u32,
    pub bss_length: u32,
}

impl QvmHeader {
    fn read(input: &mut impl Read) -> Result<Self> {
        let magic = input.read_u32()?;
        if magic != QVM_MAGIC {
            return Err(InvalidQvmFile::Magic {
                found: magic,
                expected: QVM_MAGIC,
            }
            .into());
        }
        let instruction_count = header_field(input, "instruction count")?;
        let code_offset = header_field(input, "code segment offset")?;
        let code_length = header_field(input, "code segment length")?;
        let data_offset = header_field(input, "data segment offset")?;
        let data_length = header_field(input, "data segment length")?;
        let lit_length = header_field(input, "lit segment length")?;
        let bss_length = header_field(input, "bss segment length")?;
        let lit_offset = data_offset.checked_add(data_length).ok_or(
            InvalidQvmFile::Header {
                field: "data segment length",
                value: data_length as i32,
            },
        )?;
        let bss_offset =
            lit_offset.checked_add(lit_length).ok_or(InvalidQvmFile::Header {
                field: "lit segment length",
                value: lit_length as i32,
            })?;
        Ok(QvmHeader {
            instruction_count,
            code_offset,
            code_length,
            data_offset,
            data_length,
            lit_offset,
            lit_length,
            bss_offset,
            bss_length,
        })
    }
}

fn header_field(input: &mut impl Read, field: &'static str) -> Result<u32> {
    let value = input.read_i32()?;
    if value < 0 {
        return Err(InvalidQvmFile::Header { field, value }.into());
    }
    Ok(value as u32)
}

/// A loaded QVM, immutable after construction.
#[derive(Debug, Clone)]
pub struct QvmImage {
    header: QvmHeader,
    code: Vec<u8>,
    data: Vec<u8>,
    lit: Vec<u8>,
}

impl QvmImage {
    pub fn read<I: Read + Seek>(input: &mut I) -> Result<Self> {
        let header = QvmHeader::read(input)?;
        let file_size = input.seek(SeekFrom::End(0))?;
        let code = read_segment(
            input,
            "CODE",
            header.code_offset,
            header.code_length,
            file_size,
            CODE_PAD,
        )?;
        let data = read_segment(
            input,
            "DATA",
            header.data_offset,
            header.data_length,
            file_size,
            DATA_PAD,
        )?;
        let lit = read_segment(
            input,
            "LIT",
            header.lit_offset,
            header.lit_length,
            file_size,
            LIT_PAD,
        )?;
        Ok(QvmImage {
            header,
            code,
            data,
            lit,
        })
    }

    pub fn header(&self) -> &QvmHeader {
        &self.header
    }

    pub fn instruction_count(&self) -> u32 {
        self.header.instruction_count
    }

    /// CODE bytes, zero padded past the segment end so instruction decoding
    /// may peek without bounds juggling.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn code_length(&self) -> u32 {
        self.header.code_length
    }

    /// DATA bytes, zero padded past the segment end.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_length(&self) -> u32 {
        self.header.data_length
    }

    /// LIT bytes, zero padded past the segment end.
    pub fn lit(&self) -> &[u8] {
        &self.lit
    }

    pub fn lit_length(&self) -> u32 {
        self.header.lit_length
    }
}

fn read_segment<I: Read + Seek>(
    input: &mut I,
    segment: &'static str,
    offset: u32,
    length: u32,
    file_size: u64,
    pad: usize,
) -> Result<Vec<u8>> {
    let end = u64::from(offset) + u64::from(length);
    if end > file_size {
        return Err(InvalidQvmFile::Truncated {
            segment,
            end,
            file_size,
        }
        .into());
    }
    input.seek(SeekFrom::Start(offset.into()))?;
    let mut buf = vec![0u8; length as usize + pad];
    input.read_exact(&mut buf[..length as usize])?;
    Ok(buf)
}

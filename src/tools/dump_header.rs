use crate::{load_qvm, Args};

use std::io::{BufWriter, Write};

use anyhow::Result;

use qvm_rs::disasm::Disassembler;

pub fn dump_header(args: &Args) -> Result<()> {
    let (image, info, analysis) = load_qvm(args)?;
    let dis = Disassembler::new(&image, &info, &analysis);
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    dis.print_header(&mut out)?;
    out.flush()?;
    Ok(())
}

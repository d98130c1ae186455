mod disassemble;
use disassemble::disassemble;
mod dump_header;
use dump_header::dump_header;
mod dump_code;
use dump_code::dump_code;
mod dump_data;
use dump_data::dump_data;
mod dump_lit;
use dump_lit::dump_lit;
mod dump_function_hashes;
use dump_function_hashes::dump_function_hashes;

use qvm_rs::addr_info::AddressInfo;
use qvm_rs::analysis::{analyze, FunctionAnalysis};
use qvm_rs::{QvmImage, QvmModule};

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

/// Disassemble QVM files and dump their segments
#[derive(Clone, Debug, Parser)]
struct Args {
    /// input qvm file
    #[arg(short, long)]
    input: PathBuf,
    /// module flavor, selects the engine syscall table and known-function
    /// catalogue, if not specified guess it from the input file name
    #[arg(short, long, value_enum)]
    module: Option<Module>,
    /// directory with the syscall tables and known-function hash maps
    #[arg(long, default_value = ".")]
    defs_dir: PathBuf,
    /// directory with symbols.dat, functions.dat, constants.dat and
    /// comments.dat
    #[arg(long, default_value = ".")]
    annotations_dir: PathBuf,
    // operation to execute
    #[command(subcommand)]
    operation: Operation,
}

/// Module flavor
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Module {
    Cgame,
    Game,
    Ui,
}

impl From<Module> for QvmModule {
    fn from(value: Module) -> Self {
        match value {
            Module::Cgame => QvmModule::Cgame,
            Module::Game => QvmModule::Game,
            Module::Ui => QvmModule::Ui,
        }
    }
}

#[derive(Clone, Debug, Subcommand)]
enum Operation {
    /// Print the full listing, header, code, data and lit
    Disassemble,
    /// Print the container header
    DumpHeader,
    /// Print the code segment disassembly
    DumpCode,
    /// Print the data segment dump
    DumpData,
    /// Print the lit segment dump
    DumpLit,
    /// Print every function with its size and structural hash
    DumpFunctionHashes,
}

impl Args {
    /// cgame.qvm, qagame.qvm and ui.qvm know their flavor by name
    fn input_module(&self) -> Option<QvmModule> {
        if let Some(module) = self.module {
            return Some(module.into());
        }
        match self.input.file_stem().and_then(std::ffi::OsStr::to_str) {
            Some("cgame") => Some(QvmModule::Cgame),
            Some("game") | Some("qagame") => Some(QvmModule::Game),
            Some("ui") => Some(QvmModule::Ui),
            _ => None,
        }
    }
}

fn load_qvm(args: &Args) -> Result<(QvmImage, AddressInfo, FunctionAnalysis)> {
    let image = {
        let mut input = BufReader::new(File::open(&args.input)?);
        QvmImage::read(&mut input)?
    };
    let mut info = AddressInfo::default();
    if let Some(module) = args.input_module() {
        info.load_module_tables(&args.defs_dir, module)?;
    }
    info.load_user_annotations(&args.annotations_dir)?;
    let analysis = analyze(&image)?;
    Ok((image, info, analysis))
}

fn main() {
    let args = Args::parse();
    let result = match &args.operation {
        Operation::Disassemble => disassemble(&args),
        Operation::DumpHeader => dump_header(&args),
        Operation::DumpCode => dump_code(&args),
        Operation::DumpData => dump_data(&args),
        Operation::DumpLit => dump_lit(&args),
        Operation::DumpFunctionHashes => dump_function_hashes(&args),
    };
    if let Err(err) = result {
        // the listing usually goes to a redirected stdout, report the
        // failure there as well as on stderr
        println!("---- error occurred : {err}");
        eprintln!("ERROR: {err}");
        std::process::exit(1);
    }
}

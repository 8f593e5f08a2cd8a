//! Command-line driver: loads a raw program image, optionally disassembles
//! it, runs it on a single hart, and optionally dumps final state.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use clap_num::maybe_hex;

use rv32i_sim::decode;
use rv32i_sim::error::CliError;
use rv32i_sim::hart::Hart;
use rv32i_sim::memory::Memory;

/// A single-hart simulator for the RV32I base integer instruction set.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the raw program image, loaded at address 0
    infile: String,

    /// Show disassembly before program execution
    #[arg(short = 'd')]
    disassemble: bool,

    /// Show instruction printing during execution
    #[arg(short = 'i')]
    instructions: bool,

    /// Maximum number of instructions to exec (hex; 0 = unlimited)
    #[arg(short = 'l', value_parser = maybe_hex::<u64>, default_value = "0")]
    exec_limit: u64,

    /// Specify memory size (hex; default = 0x100)
    #[arg(short = 'm', value_parser = maybe_hex::<u32>, default_value = "0x100")]
    mem_size: u32,

    /// Show register printing during execution
    #[arg(short = 'r')]
    registers: bool,

    /// Show a dump of the regs & memory after simulation
    #[arg(short = 'z')]
    dump: bool,
}

fn usage_and_exit() -> ! {
    eprintln!("Usage: rv32i [-d] [-i] [-l execution-limit] [-m hex-mem-size] [-r] [-z] infile");
    eprintln!("    -d show disassembly before program execution");
    eprintln!("    -i show instruction printing during execution");
    eprintln!("    -l maximum number of instructions to exec");
    eprintln!("    -m specify memory size (default = 0x100)");
    eprintln!("    -r show register printing during exectuion");
    eprintln!("    -z show a dump of the regs & memory after simulation");
    std::process::exit(1);
}

fn load(path: &str, mem_size: u32) -> Result<Memory, CliError> {
    let bytes = fs::read(path).map_err(|source| CliError::CantOpenFile {
        path: path.to_string(),
        source,
    })?;
    let mut memory = Memory::new(mem_size);
    memory.load_image(&bytes)?;
    Ok(memory)
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(_) => usage_and_exit(),
    };

    let mut memory = match load(&args.infile, args.mem_size) {
        Ok(memory) => memory,
        Err(err) => {
            eprintln!("{err}");
            usage_and_exit();
        }
    };

    if args.disassemble {
        let mut addr = 0u32;
        while addr < memory.size() {
            println!("{}", decode::disassemble(addr, memory.get32(addr)));
            addr += 4;
        }
    }

    let mut hart = Hart::new(memory);
    hart.reset();
    hart.set_show_instructions(args.instructions);
    hart.set_show_registers(args.registers);

    print!("{}", hart.run(args.exec_limit));

    if args.dump {
        print!("{}", hart.dump());
        print!("{}", hart.memory().dump());
    }

    ExitCode::SUCCESS
}

//! Bytecode runner CLI.
//!
//! Loads a bytecode file, decodes it with the built-in instruction set and
//! runs it on thread 0 of a fresh instance.
//!
//! # Usage
//! ```text
//! neovm <program> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program`: Raw bytecode file, or a hex listing with `--hex`
//!
//! # Options
//! - `--hex`: Read the file as a hex listing
//! - `--threads <n>`: Number of thread control blocks (default 1)
//! - `--stack <bytes>`: Per-stack byte budget (default 8192)
//! - `--ip <a.b.c.d>`: Enable networking with thread sockets on this address
//! - `--port <p>`: Base port for the thread sockets (default 0)
//! - `--max <n>`: Maximum number of decoded instructions
//! - `--wait-limit <n>`: Halt after a thread waits on the network for `n` steps in a row
//! - `--no-timestamps`: Leave the timestamp off log lines
//! - `--no-level`: Leave the `[LEVEL]` tag off log lines
//! - `--disasm`: Print the decoded listing instead of running it
//!
//! Options left unset fall back to the `NEOVM_*` environment variables.
//!
//! # Examples
//! ```text
//! neovm program.bin
//! neovm program.hex --hex --disasm
//! neovm server.hex --hex --ip 127.0.0.1 --port 60000
//! ```

use neovm::types::wide::U256;
use neovm::utils::log;
use neovm::virtual_machine::config::{MachineConfig, NetConfig};
use neovm::virtual_machine::disasm::disassemble;
use neovm::virtual_machine::isa::InstructionSet;
use neovm::virtual_machine::program::{self, decode_program};
use neovm::virtual_machine::registers::Bank;
use neovm::virtual_machine::vm::Instance;
use neovm::{error, info, warn};
use std::env;
use std::net::Ipv4Addr;
use std::path::Path;
use std::process;
use std::str::FromStr;

fn main() {
    log::init_from_env();
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let input_path = &args[1];
    let mut config = MachineConfig::from_env().unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1)
    });
    let mut hex = false;
    let mut listing = false;
    let mut ip: Option<Ipv4Addr> = config.network.map(|net| net.ip);
    let mut port: u16 = config.network.map(|net| net.port).unwrap_or(0);

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--hex" => hex = true,
            "--disasm" => listing = true,
            "--threads" => config.threads = value(&args, &mut i),
            "--stack" => config.stack_size = value(&args, &mut i),
            "--max" => config.max_instructions = value(&args, &mut i),
            "--wait-limit" => config.wait_limit = Some(value(&args, &mut i)),
            "--no-timestamps" => log::show_timestamp(false),
            "--no-level" => log::show_type(false),
            "--ip" => ip = Some(value(&args, &mut i)),
            "--port" => port = value(&args, &mut i),
            other => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
        i += 1;
    }
    config.network = ip.map(|ip| NetConfig::new(ip, port));
    if let Err(e) = config.validate() {
        error!("{e}");
        process::exit(1);
    }

    if !Path::new(input_path).exists() {
        error!("Input file does not exist: {}", input_path);
        process::exit(1);
    }
    let bytes = program::load(input_path, hex).unwrap_or_else(|e| {
        error!("Failed to load {}: {}", input_path, e);
        process::exit(1)
    });

    let set = InstructionSet::new();
    let decoded = decode_program(&bytes, config.max_instructions, &set);
    if decoded.encoded_len() < bytes.len() {
        warn!(
            "decoded {} of {} bytes ({} instructions)",
            decoded.encoded_len(),
            bytes.len(),
            decoded.len()
        );
    }

    if listing {
        print!("{}", disassemble(&decoded, &set));
        return;
    }

    let vm = Instance::new(config);
    info!("Running {} ({} instructions)", input_path, decoded.len());
    vm.run_program(&decoded, 0, &set);

    match vm.fault() {
        Some(fault) => println!("halted: {fault}"),
        None => println!("finished"),
    }
    println!("pc: {}", vm.thread_pc(0).unwrap_or(U256::ZERO));
    for bank in Bank::ALL {
        println!("stack {bank}: {}", vm.stack_depth(bank));
    }
    for index in Bank::R256.start()..Bank::R256.end() {
        match vm.register::<32>(index as u8) {
            Ok(value) => println!("r256_{}: {}", index - Bank::R256.start(), value),
            Err(e) => warn!("{e}"),
        }
    }

    let halted = vm.halted();
    vm.release();
    if halted {
        process::exit(2);
    }
}

/// Parses the argument following the flag at `args[*i]` and moves past it.
fn value<T: FromStr>(args: &[String], i: &mut usize) -> T {
    let flag = &args[*i];
    *i += 1;
    let Some(raw) = args.get(*i) else {
        error!("{flag} requires an argument");
        process::exit(1);
    };
    raw.parse().unwrap_or_else(|_| {
        error!("Invalid value for {flag}: '{raw}'");
        process::exit(1)
    })
}

fn print_usage(program: &str) {
    eprintln!("Usage: {program} <program> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --hex              Read the program as a hex listing");
    eprintln!("  --threads <n>      Number of threads (default 1)");
    eprintln!("  --stack <bytes>    Per-stack byte budget (default 8192)");
    eprintln!("  --ip <a.b.c.d>     Enable networking on this address");
    eprintln!("  --port <p>         Base port for thread sockets (default 0)");
    eprintln!("  --max <n>          Maximum decoded instructions (default 1024)");
    eprintln!("  --wait-limit <n>   Halt after n consecutive network waits");
    eprintln!("  --no-timestamps    Omit timestamps from log lines");
    eprintln!("  --no-level         Omit the level tag from log lines");
    eprintln!("  --disasm           Print the decoded listing and exit");
}

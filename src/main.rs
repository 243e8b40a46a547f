//! x86emu - CLI Entry Point
//!
//! Commands:
//! - `x86emu run <image>` - Run a boot image until it halts
//! - `x86emu debug <image>` - Interactive debugger
//! - `x86emu disasm <image>` - Disassemble a boot image

use std::path::PathBuf;
use std::process::ExitCode;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use x86emu::{load_image, Cpu, CpuError, ConsolePorts, EmulatorConfig, WriterTrace};

#[derive(Parser)]
#[command(name = "x86emu")]
#[command(version = "0.1.0")]
#[command(about = "A minimal 32-bit x86 emulator for boot-sector sized programs")]
struct Cli {
    /// Increase diagnostic logging on stderr (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an image until it halts
    Run {
        #[command(flatten)]
        machine: MachineArgs,
        /// Suppress the per-instruction trace
        #[arg(short, long)]
        quiet: bool,
        /// Stop after this many instructions
        #[arg(short, long)]
        max_steps: Option<u64>,
        /// Print the final register state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive debugger
    Debug {
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Disassemble an image
    Disasm {
        #[command(flatten)]
        machine: MachineArgs,
    },
}

#[derive(Args)]
struct MachineArgs {
    /// Path to the raw boot image
    image: PathBuf,
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Load address and initial EIP (e.g. 0x7c00)
    #[arg(long, value_parser = parse_address)]
    load_address: Option<u32>,
    /// Initial ESP (e.g. 0x7c00)
    #[arg(long, value_parser = parse_address)]
    stack: Option<u32>,
}

impl MachineArgs {
    /// Config file (or defaults) with command-line overrides applied.
    fn config(&self) -> Result<EmulatorConfig, String> {
        let mut config = match &self.config {
            Some(path) => EmulatorConfig::load(path).map_err(|e| e.to_string())?,
            None => EmulatorConfig::default(),
        };
        if let Some(addr) = self.load_address {
            config.load_address = addr;
        }
        if let Some(addr) = self.stack {
            config.stack_pointer = addr;
        }
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    fn load(&self) -> Result<(EmulatorConfig, Vec<u8>), String> {
        let config = self.config()?;
        let image = load_image(&self.image, config.image_limit).map_err(|e| {
            format!("failed to load {}: {}", self.image.display(), e)
        })?;
        Ok((config, image))
    }
}

fn parse_address(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run { machine, quiet, max_steps, json } => {
            run_program(&machine, quiet, max_steps, json)
        }
        Commands::Debug { machine } => debug_program(&machine),
        Commands::Disasm { machine } => disassemble_file(&machine),
    };

    match result {
        Ok(code) => code,
        Err(message) => {
            eprintln!("❌ {message}");
            ExitCode::FAILURE
        }
    }
}

fn run_program(
    machine: &MachineArgs,
    quiet: bool,
    max_steps: Option<u64>,
    json: bool,
) -> Result<ExitCode, String> {
    let (mut config, image) = machine.load()?;
    if quiet {
        config.trace = false;
    }
    if max_steps.is_some() {
        config.max_steps = max_steps;
    }

    let mut cpu = Cpu::with_config(&config);
    cpu.load_image(&image).map_err(|e| e.to_string())?;
    tracing::info!(bytes = image.len(), load_address = config.load_address, "starting");

    let mut ports = ConsolePorts::stdio();
    let result = if config.trace {
        let mut sink = WriterTrace::new(std::io::stdout());
        cpu.run_traced(&mut ports, &mut sink, config.max_steps)
    } else {
        match config.max_steps {
            Some(limit) => cpu.run_limited(&mut ports, limit),
            None => cpu.run(&mut ports),
        }
    };

    let code = match result {
        Ok(steps) => {
            if cpu.is_halted() {
                println!("\n\nend of program.\n");
            } else if config.max_steps.is_some_and(|limit| steps >= limit) {
                eprintln!("⚠️  Reached max steps limit ({steps}). Use --max-steps to increase.");
            } else {
                eprintln!("⚠️  EIP {:#010x} left memory", cpu.eip);
            }
            ExitCode::SUCCESS
        }
        Err(CpuError::UnimplementedOpcode { opcode, .. }) => {
            println!("\n\nNot Implemented: {opcode:x}\n");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("❌ CPU error at EIP={:#010x}: {}", cpu.eip, e);
            ExitCode::FAILURE
        }
    };

    let snapshot = cpu.snapshot();
    if json {
        println!("{}", snapshot.to_json().map_err(|e| e.to_string())?);
    } else {
        print!("{}", snapshot.dump());
    }

    Ok(code)
}

#[cfg(feature = "tui")]
fn debug_program(machine: &MachineArgs) -> Result<ExitCode, String> {
    let (config, image) = machine.load()?;

    x86emu::run_debugger(config, image).map_err(|e| format!("debugger error: {e}"))?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(feature = "tui"))]
fn debug_program(_machine: &MachineArgs) -> Result<ExitCode, String> {
    Err("debugger not available: built without the `tui` feature".to_string())
}

fn disassemble_file(machine: &MachineArgs) -> Result<ExitCode, String> {
    let (config, image) = machine.load()?;

    print!("{}", x86emu::disasm::disassemble(&image, config.load_address));
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0x7c00"), Ok(0x7C00));
        assert_eq!(parse_address("0X10"), Ok(0x10));
        assert_eq!(parse_address("512"), Ok(512));
        assert!(parse_address("0xzz").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from(["x86emu", "run", "boot.bin", "-q", "--stack", "0x8000"]).unwrap();
        match cli.command {
            Commands::Run { machine, quiet, .. } => {
                assert!(quiet);
                assert_eq!(machine.stack, Some(0x8000));
                assert_eq!(machine.image, PathBuf::from("boot.bin"));
            }
            _ => panic!("expected run"),
        }
    }
}

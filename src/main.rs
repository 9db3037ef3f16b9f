//! Cubot VM - CLI Entry Point
//!
//! Commands:
//! - `cubot-vm run <image>` - Run a program image on one unit
//! - `cubot-vm debug <image>` - Interactive debugger
//! - `cubot-vm disasm <image>` - Disassemble a program image
//! - `cubot-vm info` - Print the instruction set and encoding

use clap::{Parser, Subcommand};
use cubot::cpu::table::OPCODE_TABLE;
use cubot::cpu::{CpuState, Register, UnitCommand};
use cubot::{load_image, CpuConfig, Host, ProgramImage};

#[derive(Parser)]
#[command(name = "cubot-vm")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "The 16-bit unit CPU, with a tick-driven host and debugger")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts, faults, or runs out of ticks
    Run {
        /// Path to the program image (.json or .bin)
        program: String,
        /// Instructions per tick (overrides the configuration)
        #[arg(short, long)]
        budget: Option<u32>,
        /// Maximum number of ticks to run
        #[arg(long, default_value = "100")]
        ticks: u64,
        /// Show every executed instruction
        #[arg(short, long)]
        trace: bool,
        /// Keys to queue on the unit's keyboard before it starts
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Interactive debugger
    Debug {
        /// Path to the program image
        program: String,
    },
    /// Disassemble a program image
    Disasm {
        /// Path to the program image
        program: String,
    },
    /// Print the instruction set
    Info,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Some(Commands::Run { program, budget, ticks, trace, input }) => {
            run_program(config, &program, budget, ticks, trace, input);
        }
        Some(Commands::Debug { program }) => {
            debug_program(&config, &program);
        }
        Some(Commands::Disasm { program }) => {
            disassemble_file(&program);
        }
        Some(Commands::Info) => {
            print_info();
        }
        None => {
            println!("Cubot VM v0.1.0");
            println!("The 16-bit unit CPU");
            println!();
            println!("Use --help for available commands");
        }
    }
}

fn load_config(path: Option<&str>) -> CpuConfig {
    let Some(path) = path else {
        return CpuConfig::default();
    };
    match CpuConfig::load(path) {
        Ok(config) => {
            log::info!("loaded configuration from {}", path);
            config
        }
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_program(path: &str) -> ProgramImage {
    match load_image(path) {
        Ok(image) => {
            println!("📂 Loaded {} words", image.len());
            if image.is_empty() {
                eprintln!("❌ No instructions to execute");
                std::process::exit(1);
            }
            image
        }
        Err(e) => {
            eprintln!("❌ Failed to load program: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_program(
    mut config: CpuConfig,
    path: &str,
    budget: Option<u32>,
    ticks: u64,
    trace: bool,
    input: Option<String>,
) {
    use cubot::program::disasm::disassemble_at;

    println!("🔧 Running: {}", path);
    let image = load_program(path);

    if let Some(budget) = budget {
        config.tick_budget = budget;
    }
    // Tracing runs one instruction per tick so each one can be printed
    let per_tick = config.tick_budget;
    if trace {
        config.tick_budget = 1;
    }

    let mut host = Host::new(config);
    let id = match host.spawn(image) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let sender = host.command_sender();
    for c in input.unwrap_or_default().chars() {
        let _ = sender.send(id, UnitCommand::Key(c as u32 as u16));
    }
    let _ = sender.send(id, UnitCommand::Resume);

    println!();
    println!("━━━ Execution ━━━");

    let max_ticks = if trace { ticks.saturating_mul(per_tick as u64) } else { ticks };
    let mut state = CpuState::Running;
    for _ in 0..max_ticks {
        if trace {
            if let Ok(unit) = host.unit(id) {
                let ip = unit.cpu.regs.ip;
                let (text, _) = disassemble_at(&unit.cpu.mem, ip);
                print!("{:04X}: {:<28}", ip, text);
            }
        }

        let reports = host.tick();
        state = reports.first().map_or(CpuState::Halted, |(_, r)| r.state);

        if trace {
            if let Ok(snap) = host.snapshot(id) {
                println!(" {}  A={:04X} B={:04X}", snap.status, snap.registers[0], snap.registers[1]);
            }
        }
        if let Ok(lines) = host.drain_console(id) {
            for line in lines {
                println!("📟 {}", line);
            }
        }
        if state != CpuState::Running {
            break;
        }
    }

    let snap = match host.snapshot(id) {
        Ok(snap) => snap,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    println!();
    println!("━━━ Result ━━━");
    println!("Cycles: {}", snap.cycles);
    println!("State:  {:?}", snap.state);
    println!("Flags:  {}", snap.status);
    println!("ip:     0x{:04X}", snap.ip);
    for r in Register::ALL {
        let value = snap.registers[r.index()];
        println!("{:>2}:     0x{:04X} ({})", r.name(), value, value as i16);
    }

    if let Some(fault) = snap.fault {
        println!();
        match snap.line {
            Some(line) => eprintln!("❌ Fault at line {}: {}", line, fault),
            None => eprintln!("❌ Fault: {}", fault),
        }
        std::process::exit(1);
    }

    if state == CpuState::Running {
        println!();
        println!("⚠️  Reached tick limit ({}). Use --ticks to increase.", ticks);
    }
}

#[cfg(feature = "tui")]
fn debug_program(config: &CpuConfig, path: &str) {
    use cubot::run_debugger;

    println!("🔍 Loading: {}", path);
    let image = load_program(path);

    println!("🚀 Launching debugger...");
    println!();

    if let Err(e) = run_debugger(config, image) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_config: &CpuConfig, _path: &str) {
    eprintln!("❌ Built without the `tui` feature");
    std::process::exit(1);
}

fn disassemble_file(path: &str) {
    use cubot::disassemble;

    println!("📖 Disassembling: {}", path);
    println!();

    let image = load_program(path);
    println!("{}", disassemble(&image));
}

fn print_info() {
    use cubot::cpu::decode::ENCODING_VERSION;

    println!("━━━ Cubot CPU ━━━");
    println!("Encoding version: {}", ENCODING_VERSION);
    println!("Word: opcode bits 0-5, destination 6-10, source 11-15");
    println!("Operands: 1-8 reg, 9-16 [reg], 17-24 [reg+disp], 30 [addr], 31 immediate");
    println!();
    println!("Opcodes:");
    for opcode in OPCODE_TABLE.iter() {
        println!("  {:>2}  {:<5} {} operand(s)", opcode.code(), opcode.mnemonic(), opcode.shape().operand_count());
    }
}

//! Pipeline simulator CLI.
//!
//! Loads a TOML configuration and an assembly program, runs the pipeline
//! until it drains (or a cycle cap is hit), and reports the run: a stats
//! banner and register dump by default, a JSON summary with `--json`,
//! and the timeline CSV with `--csv`.

use clap::Parser;
use serde::Serialize;
use std::{fs, process};

use riscv_pipeline_sim::asm;
use riscv_pipeline_sim::config::Config;
use riscv_pipeline_sim::core::Cpu;

const DEFAULT_CYCLE_CAP: u64 = 10_000;

/// Command-line arguments for the pipeline simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "5-stage pipeline teaching simulator")]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Assembly program to run.
    #[arg(short, long)]
    file: String,

    /// Maximum number of cycles to simulate.
    #[arg(long, default_value_t = DEFAULT_CYCLE_CAP)]
    cycles: u64,

    /// Pre-set a data memory word, as addr=value. Repeatable.
    #[arg(long, value_name = "ADDR=VAL")]
    poke: Vec<String>,

    /// Print the stage occupancy of every cycle while running.
    #[arg(long)]
    trace: bool,

    /// Write the timeline CSV to this path after the run.
    #[arg(long)]
    csv: Option<String>,

    /// Print a JSON summary instead of the banner.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Summary<'a> {
    stats: &'a riscv_pipeline_sim::stats::SimStats,
    cpi: f64,
    registers: [i64; 32],
    memory: &'a std::collections::BTreeMap<i64, i64>,
    trace: &'a [riscv_pipeline_sim::core::telemetry::TraceRow],
}

fn parse_poke(spec: &str) -> Option<(i64, i64)> {
    let (addr, val) = spec.split_once('=')?;
    Some((addr.trim().parse().ok()?, val.trim().parse().ok()?))
}

fn main() {
    let args = Args::parse();

    let config: Config = match &args.config {
        Some(path) => {
            let content = match fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: cannot read config '{}': {}", path, e);
                    process::exit(1);
                }
            };
            match toml::from_str(&content) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error: bad config '{}': {}", path, e);
                    process::exit(1);
                }
            }
        }
        None => Config::default(),
    };

    let source = match fs::read_to_string(&args.file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: cannot read program '{}': {}", args.file, e);
            process::exit(1);
        }
    };
    let program = match asm::parse_program(&source) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Syntax error: {}", e);
            process::exit(1);
        }
    };

    let mut cpu = Cpu::new(&config);
    cpu.load_program(program);

    for spec in &args.poke {
        match parse_poke(spec) {
            Some((addr, val)) => cpu.poke_mem(addr, val),
            None => {
                eprintln!("Error: bad --poke '{}', expected addr=value", spec);
                process::exit(1);
            }
        }
    }

    if !args.json {
        println!("Configuration");
        println!("-------------");
        println!("  Forwarding:        {}", cpu.forwarding);
        println!("  Structural hazard: {}", cpu.structural_on);
        println!("  Branch predictor:  {:?}", cpu.predictor_mode());
        println!("  Program:           {} ({} instructions)", args.file, cpu.program().len());
        println!("-------------");
    }

    for _ in 0..args.cycles {
        let row = cpu.step();
        if args.trace {
            println!(
                "{:>5}  IF:{:<18} ID:{:<18} EX:{:<18} MEM:{:<18} WB:{}",
                cpu.stats.cycles, row.fetch, row.decode, row.execute, row.memory, row.writeback
            );
        }
        if cpu.is_drained() {
            break;
        }
    }

    if let Some(path) = &args.csv {
        if let Err(e) = fs::write(path, cpu.trace_csv()) {
            eprintln!("Error: cannot write '{}': {}", path, e);
            process::exit(1);
        }
    }

    if args.json {
        let summary = Summary {
            stats: &cpu.stats,
            cpi: cpu.stats.cpi(),
            registers: cpu.registers(),
            memory: cpu.mem(),
            trace: cpu.trace(),
        };
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error: summary serialization failed: {}", e);
                process::exit(1);
            }
        }
    } else {
        cpu.stats.print();
        println!();
        cpu.dump_state();
    }
}

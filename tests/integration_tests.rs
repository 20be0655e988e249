//! End-to-end runs: branch prediction, flush recovery, determinism, and
//! the exported trace.

use riscv_pipeline_sim::asm::parse_program;
use riscv_pipeline_sim::config::{Config, PredictorMode};
use riscv_pipeline_sim::core::Cpu;

fn make_cpu(text: &str, tune: impl FnOnce(&mut Config)) -> Cpu {
    let mut config = Config::default();
    tune(&mut config);
    let mut cpu = Cpu::new(&config);
    cpu.load_program(parse_program(text).expect("program should parse"));
    cpu
}

fn run_to_drain(cpu: &mut Cpu) -> u64 {
    for _ in 0..1000 {
        let _ = cpu.step();
        if cpu.is_drained() {
            break;
        }
    }
    assert!(cpu.is_drained(), "pipeline failed to drain");
    cpu.stats.cycles
}

const TAKEN_BRANCH: &str = "\
beq x0, x0, taken
lw x1, 4(x0)
lw x2, 4(x0)
taken:
add x3, x0, x0
";

/// An actually-taken branch under static not-taken prediction records
/// one mispredict and one flush, and nothing from the wrong path
/// retires.
#[test]
fn test_mispredict_flush_static_nt() {
    let mut cpu = make_cpu(TAKEN_BRANCH, |c| {
        c.pipeline.branch_predictor = PredictorMode::StaticNt;
    });
    cpu.poke_mem(4, 77);
    run_to_drain(&mut cpu);

    assert_eq!(cpu.stats.mispredicts, 1);
    assert_eq!(cpu.stats.flushes, 1);
    assert_eq!(cpu.reg(1), 0, "wrong-path load must never retire");
    assert_eq!(cpu.reg(2), 0);
    assert_eq!(cpu.stats.instructions_retired, 2, "branch and target only");

    let rows = cpu.program_status();
    assert!(rows[0].retired);
    assert!(!rows[1].retired, "fetched on the not-taken path, flushed");
    assert!(!rows[2].retired);
    assert!(rows[3].retired);
}

/// Mode `none` resolves in EX with the same accounting as an explicit
/// not-taken prediction.
#[test]
fn test_none_mode_matches_static_nt_accounting() {
    let mut cpu = make_cpu(TAKEN_BRANCH, |_| {});
    cpu.poke_mem(4, 77);
    run_to_drain(&mut cpu);
    assert_eq!(cpu.stats.mispredicts, 1);
    assert_eq!(cpu.stats.flushes, 1);
    assert_eq!(cpu.reg(1), 0);
    assert_eq!(cpu.stats.instructions_retired, 2);
}

/// A correctly predicted branch needs no correction: the one-bit table
/// pays one mispredict the first time and none after.
#[test]
fn test_one_bit_converges_on_repeated_taken_branch() {
    let mut cpu = make_cpu("beq x0, x0, 0\nadd x1, x0, x0", |c| {
        c.pipeline.branch_predictor = PredictorMode::Onebit;
    });
    for _ in 0..40 {
        let _ = cpu.step();
    }
    assert_eq!(cpu.stats.mispredicts, 1, "only the cold prediction misses");
    assert_eq!(cpu.stats.flushes, 1);
    assert!(cpu.stats.instructions_retired > 5, "the loop keeps retiring");
    assert_eq!(cpu.reg(1), 0, "the fall-through add never retires");

    let table = cpu.predictor_snapshot();
    assert_eq!(table.len(), 1);
    assert_eq!(table[0].pc, 0);
    assert!(table[0].taken);
    assert_eq!(table[0].text, "beq x0, x0, 0");
}

/// Agreeing resolutions still update the one-bit table, and a correct
/// not-taken prediction costs nothing.
#[test]
fn test_one_bit_records_not_taken_outcome() {
    let text = "\
lw x1, 0(x0)
nop
nop
beq x1, x2, 0
";
    let mut cpu = make_cpu(text, |c| {
        c.pipeline.branch_predictor = PredictorMode::Onebit;
    });
    cpu.poke_mem(0, 5);
    // x1 = 5, x2 = 0: not taken, predicted not taken.
    run_to_drain(&mut cpu);
    assert_eq!(cpu.stats.mispredicts, 0);
    assert_eq!(cpu.stats.flushes, 0);
    let table = cpu.predictor_snapshot();
    assert_eq!(table.len(), 1, "the resolution is recorded either way");
    assert_eq!(table[0].pc, 3);
    assert!(!table[0].taken);
}

/// Cold-start replay yields identical registers, memory, and trace.
#[test]
fn test_replay_determinism() {
    let run = || {
        let mut cpu = make_cpu(
            "lw x1, 0(x0)\nadd x2, x1, x1\nbeq x2, x1, 0\nsw x2, 4(x0)",
            |c| c.pipeline.branch_predictor = PredictorMode::Onebit,
        );
        cpu.poke_mem(0, 0);
        for _ in 0..30 {
            let _ = cpu.step();
        }
        (
            cpu.registers(),
            cpu.mem().clone(),
            cpu.trace().to_vec(),
            cpu.stats.cycles,
            cpu.stats.instructions_retired,
        )
    };
    assert_eq!(run(), run());
}

/// `reset` rebuilds a cold machine for the same program.
#[test]
fn test_reset_restores_cold_start() {
    let mut cpu = make_cpu("add x1, x0, x0\nadd x2, x0, x0", |_| {});
    run_to_drain(&mut cpu);
    let first_trace = cpu.trace().to_vec();

    cpu.reset();
    assert_eq!(cpu.stats.cycles, 0);
    assert_eq!(cpu.trace().len(), 0);
    assert!(cpu.program_status().iter().all(|r| !r.retired));

    run_to_drain(&mut cpu);
    assert_eq!(cpu.trace().to_vec(), first_trace);
}

/// The exported CSV has a header, one numbered row per cycle, and
/// quotes instruction text containing commas.
#[test]
fn test_trace_csv_shape() {
    let mut cpu = make_cpu("add x1, x2, x3\nnop", |_| {});
    let cycles = run_to_drain(&mut cpu);

    let csv = cpu.trace_csv();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "cycle,IF,ID,EX,MEM,WB");
    assert_eq!(lines.len() as u64, cycles + 1);
    assert!(lines[1].starts_with("1,"));
    assert!(
        csv.contains("\"add x1, x2, x3\""),
        "instruction text with commas must be quoted"
    );
}

/// MEM and WB columns of a trace row always show the same latch.
#[test]
fn test_trace_mem_wb_columns_match() {
    let mut cpu = make_cpu("lw x1, 0(x0)\nadd x2, x1, x1\nsw x2, 4(x0)", |_| {});
    run_to_drain(&mut cpu);
    for row in cpu.trace() {
        assert_eq!(row.memory, row.writeback);
    }
}

/// Latch and in-flight views mirror the pipe contents.
#[test]
fn test_latches_and_inflight_views() {
    let mut cpu = make_cpu("add x1, x0, x0\nadd x2, x0, x0", |_| {});
    let _ = cpu.step();
    let _ = cpu.step();

    let latches = cpu.latches_snapshot();
    assert_eq!(latches.id_ex.instr, "add x1, x0, x0");
    assert_eq!(latches.if_id.instr, "add x2, x0, x0");
    assert_eq!(latches.ex_mem.instr, "NOP");

    let inflight = cpu.inflight();
    assert_eq!(inflight.len(), 2);
    assert_eq!(inflight[0].stage, "IF");
    assert_eq!(inflight[1].stage, "ID");
    assert_eq!(inflight[1].rd, Some(1));
}

/// Loading a new program discards the old machine state entirely.
#[test]
fn test_load_program_replaces_state() {
    let mut cpu = make_cpu("add x1, x0, x0", |_| {});
    run_to_drain(&mut cpu);
    assert_eq!(cpu.stats.instructions_retired, 1);

    cpu.load_program(parse_program("nop\nnop").expect("parse"));
    assert_eq!(cpu.stats.cycles, 0);
    assert_eq!(cpu.program().len(), 2);
    assert_eq!(cpu.program_status().len(), 2);
    assert!(cpu.trace().is_empty());
}

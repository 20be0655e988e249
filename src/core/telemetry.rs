//! Read-only introspection views over engine state.
//!
//! Everything here is derived from the [`Cpu`](super::Cpu) and consumed
//! by the visualization layer (kept outside this crate): latch and
//! control snapshots, the per-cycle event record, retirement status,
//! the Gantt window, the teaching address log, and the exported trace.

use std::collections::BTreeMap;

use serde::Serialize;

use super::cpu::Cpu;
use crate::core::pipeline::hazards::{ForwardSource, HazardDetail, StallReason};
use crate::core::pipeline::signals::{decode_control, ControlSignals};
use crate::isa::NUM_REGS;

/// Pipeline stage names, in program order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Stage {
    #[serde(rename = "IF")]
    If,
    #[serde(rename = "ID")]
    Id,
    #[serde(rename = "EX")]
    Ex,
    #[serde(rename = "MEM")]
    Mem,
    #[serde(rename = "WB")]
    Wb,
}

impl Stage {
    pub const fn name(self) -> &'static str {
        match self {
            Stage::If => "IF",
            Stage::Id => "ID",
            Stage::Ex => "EX",
            Stage::Mem => "MEM",
            Stage::Wb => "WB",
        }
    }

    /// Single-letter form used in the Gantt grid.
    pub const fn letter(self) -> char {
        match self {
            Stage::If => 'I',
            Stage::Id => 'D',
            Stage::Ex => 'E',
            Stage::Mem => 'M',
            Stage::Wb => 'W',
        }
    }
}

/// Which program index occupied each stage at the start of a cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StageOccupancy {
    pub fetch: Option<usize>,
    pub decode: Option<usize>,
    pub execute: Option<usize>,
    pub memory: Option<usize>,
    pub writeback: Option<usize>,
}

impl StageOccupancy {
    /// Stage/pc pairs in stage order. Order matters to consumers that
    /// let later stages win when one pc shows up twice.
    pub fn stages(&self) -> [(Stage, Option<usize>); 5] {
        [
            (Stage::If, self.fetch),
            (Stage::Id, self.decode),
            (Stage::Ex, self.execute),
            (Stage::Mem, self.memory),
            (Stage::Wb, self.writeback),
        ]
    }
}

/// One row of the exported trace: the instruction text occupying each
/// stage at the cycle's snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TraceRow {
    #[serde(rename = "IF")]
    pub fetch: String,
    #[serde(rename = "ID")]
    pub decode: String,
    #[serde(rename = "EX")]
    pub execute: String,
    #[serde(rename = "MEM")]
    pub memory: String,
    #[serde(rename = "WB")]
    pub writeback: String,
}

/// Everything notable that happened in the most recent cycle.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CycleEvents {
    pub stall: bool,
    pub stall_reason: Option<StallReason>,
    pub hazard_detail: Option<HazardDetail>,
    pub branch_taken: bool,
    pub mispredict: bool,
    pub structural_stall: bool,
    pub fwd_a: ForwardSource,
    pub fwd_b: ForwardSource,
}

/// Teaching log entry: an ALU computation, branch comparison, or data
/// memory access, stamped with the cycle it happened in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum AddrEvent {
    #[serde(rename = "alu")]
    Alu {
        cycle: u64,
        pc: usize,
        op: &'static str,
        a: i64,
        b: i64,
        result: i64,
    },
    #[serde(rename = "branch_cmp")]
    BranchCmp {
        cycle: u64,
        pc: usize,
        a: i64,
        b: i64,
        taken: bool,
    },
    #[serde(rename = "lw")]
    Load {
        cycle: u64,
        pc: usize,
        addr: i64,
        value: i64,
    },
    #[serde(rename = "sw")]
    Store {
        cycle: u64,
        pc: usize,
        addr: i64,
        value: i64,
    },
}

/// Retirement bookkeeping for one program index. Purely observational;
/// the engine never bases control decisions on it.
#[derive(Clone, Debug, Default, Serialize)]
pub struct InstStatus {
    pub retired: bool,
    pub retire_cycle: Option<u64>,
    pub last_stage: Option<Stage>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ProgramStatusRow {
    pub pc: usize,
    pub text: String,
    pub last_stage: Option<Stage>,
    pub retired: bool,
    pub retire_cycle: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IfIdView {
    pub pc: usize,
    pub instr: String,
    pub pred: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct IdExView {
    pub pc: usize,
    pub instr: String,
    pub rs1: usize,
    pub rs2: usize,
    pub rd: usize,
    pub imm: i64,
    pub v1: i64,
    pub v2: i64,
    pub pred: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ExMemView {
    pub pc: usize,
    pub instr: String,
    pub rd: usize,
    pub alu: i64,
    pub store: i64,
    pub btaken: bool,
    pub target: usize,
    pub pred: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct MemWbView {
    pub pc: usize,
    pub instr: String,
    pub rd: usize,
    pub alu: i64,
    pub wb: i64,
}

/// Structured contents of all four latches.
#[derive(Clone, Debug, Serialize)]
pub struct LatchesSnapshot {
    pub if_id: IfIdView,
    pub id_ex: IdExView,
    pub ex_mem: ExMemView,
    pub mem_wb: MemWbView,
}

/// One row of the predictor history panel.
#[derive(Clone, Debug, Serialize)]
pub struct PredictorEntry {
    pub pc: usize,
    pub text: String,
    pub taken: bool,
}

/// An occupied stage for the hazard/flow panel.
#[derive(Clone, Debug, Serialize)]
pub struct InflightEntry {
    pub stage: &'static str,
    pub instr: String,
    pub rd: Option<usize>,
    pub rs1: Option<usize>,
    pub rs2: Option<usize>,
}

/// Where the cycles of a run went.
#[derive(Clone, Debug, Serialize)]
pub struct CpiBreakdown {
    pub cycles: u64,
    pub useful_pct: f64,
    pub stall_pct: f64,
    pub flush_pct: f64,
    pub mispredicts: u64,
}

/// A trailing window of stage occupancy shaped for a timeline rendering:
/// `grid[row][col]` is a stage letter or `'.'`, rows follow program
/// order, columns follow `cycles`.
#[derive(Clone, Debug, Serialize)]
pub struct GanttWindow {
    pub cycles: Vec<u64>,
    pub rows: Vec<String>,
    pub grid: Vec<Vec<char>>,
}

impl Cpu {
    pub fn reg(&self, idx: usize) -> i64 {
        self.regs.read(idx)
    }

    pub fn registers(&self) -> [i64; NUM_REGS] {
        self.regs.snapshot()
    }

    /// The sparse data memory. Unset addresses read as zero.
    pub fn mem(&self) -> &BTreeMap<i64, i64> {
        &self.dmem
    }

    pub fn mem_read(&self, addr: i64) -> i64 {
        self.dmem.get(&addr).copied().unwrap_or(0)
    }

    pub fn program(&self) -> &crate::asm::Program {
        &self.program
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Event record of the most recently executed cycle.
    pub fn last_events(&self) -> &CycleEvents {
        &self.last_events
    }

    /// Control signals of the instruction currently in decode.
    pub fn control_snapshot(&self) -> ControlSignals {
        decode_control(&self.if_id.instr)
    }

    pub fn latches_snapshot(&self) -> LatchesSnapshot {
        LatchesSnapshot {
            if_id: IfIdView {
                pc: self.if_id.pc,
                instr: self.if_id.instr.to_string(),
                pred: self.if_id.pred_taken,
            },
            id_ex: IdExView {
                pc: self.id_ex.pc,
                instr: self.id_ex.instr.to_string(),
                rs1: self.id_ex.rs1,
                rs2: self.id_ex.rs2,
                rd: self.id_ex.rd,
                imm: self.id_ex.imm,
                v1: self.id_ex.rv1,
                v2: self.id_ex.rv2,
                pred: self.id_ex.pred_taken,
            },
            ex_mem: ExMemView {
                pc: self.ex_mem.pc,
                instr: self.ex_mem.instr.to_string(),
                rd: self.ex_mem.rd,
                alu: self.ex_mem.alu,
                store: self.ex_mem.store_val,
                btaken: self.ex_mem.branch_taken,
                target: self.ex_mem.branch_target,
                pred: self.ex_mem.pred_taken,
            },
            mem_wb: MemWbView {
                pc: self.mem_wb.pc,
                instr: self.mem_wb.instr.to_string(),
                rd: self.mem_wb.rd,
                alu: self.mem_wb.alu,
                wb: self.mem_wb.wb_val,
            },
        }
    }

    /// Predictor history, sorted by program index.
    pub fn predictor_snapshot(&self) -> Vec<PredictorEntry> {
        self.predictor
            .table()
            .into_iter()
            .map(|(pc, taken)| PredictorEntry {
                pc,
                text: self.program.fetch(pc).to_string(),
                taken,
            })
            .collect()
    }

    /// Per-instruction retirement status in program order.
    pub fn program_status(&self) -> Vec<ProgramStatusRow> {
        self.program
            .iter()
            .enumerate()
            .map(|(pc, instr)| {
                let st = self.status.get(pc).cloned().unwrap_or_default();
                ProgramStatusRow {
                    pc,
                    text: instr.to_string(),
                    last_stage: st.last_stage,
                    retired: st.retired,
                    retire_cycle: st.retire_cycle,
                }
            })
            .collect()
    }

    /// Occupied stages right now, front of the pipe first.
    pub fn inflight(&self) -> Vec<InflightEntry> {
        let mut out = Vec::new();
        if !self.if_id.instr.is_nop() {
            out.push(InflightEntry {
                stage: "IF",
                instr: self.if_id.instr.to_string(),
                rd: None,
                rs1: None,
                rs2: None,
            });
        }
        if !self.id_ex.instr.is_nop() {
            out.push(InflightEntry {
                stage: "ID",
                instr: self.id_ex.instr.to_string(),
                rd: Some(self.id_ex.rd),
                rs1: Some(self.id_ex.rs1),
                rs2: Some(self.id_ex.rs2),
            });
        }
        if !self.ex_mem.instr.is_nop() {
            out.push(InflightEntry {
                stage: "EX",
                instr: self.ex_mem.instr.to_string(),
                rd: Some(self.ex_mem.rd),
                rs1: None,
                rs2: None,
            });
        }
        if !self.mem_wb.instr.is_nop() {
            out.push(InflightEntry {
                stage: "MEM/WB",
                instr: self.mem_wb.instr.to_string(),
                rd: Some(self.mem_wb.rd),
                rs1: None,
                rs2: None,
            });
        }
        out
    }

    pub fn cpi_breakdown(&self) -> CpiBreakdown {
        let cycles = self.stats.cycles.max(1);
        CpiBreakdown {
            cycles,
            useful_pct: (self.stats.instructions_retired as f64 / cycles as f64) * 100.0,
            stall_pct: (self.stats.stalls as f64 / cycles as f64) * 100.0,
            flush_pct: (self.stats.flushes as f64 / cycles as f64) * 100.0,
            mispredicts: self.stats.mispredicts,
        }
    }

    /// Stall-reason histogram, most frequent first.
    pub fn stall_breakdown(&self) -> Vec<(StallReason, u64)> {
        self.stats.stall_breakdown()
    }

    /// The trailing address-log window at the configured size.
    pub fn addr_log(&self) -> &[AddrEvent] {
        self.addr_log_tail(self.trace_cfg.addr_log_window)
    }

    pub fn addr_log_tail(&self, last_n: usize) -> &[AddrEvent] {
        let start = self.addr_log.len().saturating_sub(last_n);
        &self.addr_log[start..]
    }

    /// Full stage-occupancy history, one entry per executed cycle.
    pub fn occupancy_history(&self) -> &[StageOccupancy] {
        &self.occupancy
    }

    /// The Gantt window at the configured size.
    pub fn gantt(&self) -> GanttWindow {
        self.gantt_window(self.trace_cfg.gantt_window)
    }

    /// A trailing window of up to `max_cycles` columns of the timeline.
    pub fn gantt_window(&self, max_cycles: usize) -> GanttWindow {
        let start = self.occupancy.len().saturating_sub(max_cycles);
        let window = &self.occupancy[start..];
        let first_cycle = (self.stats.cycles + 1).saturating_sub(window.len() as u64).max(1);
        let cycles: Vec<u64> = (0..window.len() as u64).map(|i| first_cycle + i).collect();

        let n_rows = self.program.len();
        let mut grid = vec![vec!['.'; window.len()]; n_rows];
        for (col, occ) in window.iter().enumerate() {
            for (stage, pc) in occ.stages() {
                if let Some(pc) = pc {
                    if pc < n_rows {
                        grid[pc][col] = stage.letter();
                    }
                }
            }
        }
        let rows = self.program.iter().map(|i| i.to_string()).collect();
        GanttWindow { cycles, rows, grid }
    }

    /// Every recorded trace row, in cycle order.
    pub fn trace(&self) -> &[TraceRow] {
        &self.trace
    }

    /// The exported timeline: `cycle,IF,ID,EX,MEM,WB`, one row per
    /// executed cycle, numbered from 1.
    pub fn trace_csv(&self) -> String {
        let mut out = String::from("cycle,IF,ID,EX,MEM,WB\n");
        for (i, row) in self.trace.iter().enumerate() {
            out.push_str(&format!(
                "{},{},{},{},{},{}\n",
                i + 1,
                csv_field(&row.fetch),
                csv_field(&row.decode),
                csv_field(&row.execute),
                csv_field(&row.memory),
                csv_field(&row.writeback),
            ));
        }
        out
    }
}

/// Quotes a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

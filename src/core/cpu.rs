//! The pipeline engine.
//!
//! One [`Cpu::step`] call advances the machine by exactly one cycle. The
//! five stages are not tasks: they are sequential computation over the
//! latch values committed at the end of the previous cycle, with the
//! next-latch values built on the side and committed together at the end
//! of the call. The single deliberate same-cycle interaction is branch
//! resolution overriding the fetch decision made earlier in the same
//! step.

use std::collections::BTreeMap;

use crate::asm::Program;
use crate::config::{Config, PredictorMode, TraceConfig};
use crate::core::bp::{self, BranchPredictor};
use crate::core::gpr::RegisterFile;
use crate::core::pipeline::hazards::{self, StallReason};
use crate::core::pipeline::latches::{ExMem, IdEx, IfId, MemWb};
use crate::core::telemetry::{AddrEvent, CycleEvents, InstStatus, Stage, StageOccupancy, TraceRow};
use crate::isa::{Instruction, Op};
use crate::stats::SimStats;

pub struct Cpu {
    pub(crate) program: Program,
    pub(crate) pc: usize,
    pub(crate) regs: RegisterFile,
    pub(crate) dmem: BTreeMap<i64, i64>,

    /// Operand bypassing on/off. Toggling between cycles is allowed.
    pub forwarding: bool,
    /// Shared-memory-port structural hazard modeling on/off.
    pub structural_on: bool,
    predictor_mode: PredictorMode,
    pub(crate) predictor: Box<dyn BranchPredictor>,

    pub(crate) if_id: IfId,
    pub(crate) id_ex: IdEx,
    pub(crate) ex_mem: ExMem,
    pub(crate) mem_wb: MemWb,

    pub stats: SimStats,
    pub(crate) trace: Vec<TraceRow>,
    pub(crate) occupancy: Vec<StageOccupancy>,
    pub(crate) status: Vec<InstStatus>,
    pub(crate) addr_log: Vec<AddrEvent>,
    pub(crate) last_events: CycleEvents,
    pub(crate) trace_cfg: TraceConfig,
}

impl Cpu {
    pub fn new(config: &Config) -> Self {
        Self {
            program: Program::default(),
            pc: 0,
            regs: RegisterFile::new(),
            dmem: BTreeMap::new(),
            forwarding: config.pipeline.forwarding,
            structural_on: config.pipeline.structural_hazard,
            predictor_mode: config.pipeline.branch_predictor,
            predictor: bp::from_mode(config.pipeline.branch_predictor),
            if_id: IfId::default(),
            id_ex: IdEx::default(),
            ex_mem: ExMem::default(),
            mem_wb: MemWb::default(),
            stats: SimStats::default(),
            trace: Vec::new(),
            occupancy: Vec::new(),
            status: Vec::new(),
            addr_log: Vec::new(),
            last_events: CycleEvents::default(),
            trace_cfg: config.trace.clone(),
        }
    }

    /// Tears down all mutable state (registers, memory, latches,
    /// predictor, counters, telemetry) and rebuilds the per-instruction
    /// status table for the loaded program.
    pub fn reset(&mut self) {
        self.pc = 0;
        self.regs = RegisterFile::new();
        self.dmem.clear();
        self.if_id = IfId::default();
        self.id_ex = IdEx::default();
        self.ex_mem = ExMem::default();
        self.mem_wb = MemWb::default();
        self.stats = SimStats::default();
        self.predictor = bp::from_mode(self.predictor_mode);
        self.trace.clear();
        self.occupancy.clear();
        self.addr_log.clear();
        self.last_events = CycleEvents::default();
        self.status = vec![InstStatus::default(); self.program.len()];
    }

    /// Installs a program and resets. A failed parse never reaches this
    /// point, so the previously loaded program is untouched by bad input.
    pub fn load_program(&mut self, program: Program) {
        self.program = program;
        self.reset();
    }

    pub fn predictor_mode(&self) -> PredictorMode {
        self.predictor_mode
    }

    /// Swaps the branch predictor. The new predictor starts cold.
    pub fn set_predictor_mode(&mut self, mode: PredictorMode) {
        self.predictor_mode = mode;
        self.predictor = bp::from_mode(mode);
    }

    /// Direct data-memory write for test and demo setup. Safe only
    /// between cycles.
    pub fn poke_mem(&mut self, addr: i64, val: i64) {
        let _ = self.dmem.insert(addr, val);
    }

    /// Dumps the program counter and register file to stdout.
    pub fn dump_state(&self) {
        println!("pc = {}", self.pc);
        self.regs.dump();
    }

    /// Nothing left in flight and nothing left to fetch. Stepping past
    /// this point is a valid, side-effect-free steady state.
    pub fn is_drained(&self) -> bool {
        self.pc >= self.program.len()
            && self.if_id.instr.is_nop()
            && self.id_ex.instr.is_nop()
            && self.ex_mem.instr.is_nop()
            && self.mem_wb.instr.is_nop()
    }

    /// Advances the machine by one cycle and returns the per-stage trace
    /// row recorded for it.
    pub fn step(&mut self) -> TraceRow {
        let cycle = self.stats.cycles;

        // Stage occupancy snapshot at cycle start, before any mutation.
        // The MEM row is attributed to the EX/MEM latch: that is the
        // instruction the memory sub-step works on this cycle.
        let occupancy = StageOccupancy {
            fetch: (!self.if_id.instr.is_nop()).then_some(self.if_id.pc),
            decode: (!self.id_ex.instr.is_nop()).then_some(self.id_ex.pc),
            execute: (!self.ex_mem.instr.is_nop()).then_some(self.ex_mem.pc),
            memory: (!self.ex_mem.instr.is_nop()).then_some(self.ex_mem.pc),
            writeback: (!self.mem_wb.instr.is_nop()).then_some(self.mem_wb.pc),
        };
        self.occupancy.push(occupancy.clone());
        self.last_events = CycleEvents::default();

        // Writeback: commit the instruction that finished MEM last cycle.
        if !self.mem_wb.instr.is_nop() {
            self.stats.instructions_retired += 1;
            if let Some(st) = self.status.get_mut(self.mem_wb.pc) {
                st.retired = true;
                st.retire_cycle = Some(cycle);
                st.last_stage = Some(Stage::Wb);
            }
            if self.mem_wb.instr.writes_reg() {
                self.regs.write(self.mem_wb.rd, self.mem_wb.wb_val);
            }
        }

        // Decode hazard check against the current latch contents.
        let (stall, detail) = hazards::detect_decode_stall(
            self.forwarding,
            &self.if_id,
            &self.id_ex,
            &self.ex_mem,
            &self.mem_wb,
        );
        let stall_decode = stall.is_some();
        if let Some(reason) = stall {
            self.stats.record_stall(reason);
            self.last_events.stall = true;
            self.last_events.stall_reason = Some(reason);
        }
        self.last_events.hazard_detail = detail;

        // Execute.
        let ex_instr = self.id_ex.instr.clone();
        let (a_val, fwd_a) = hazards::forward_operand(
            self.forwarding,
            self.id_ex.rs1,
            self.id_ex.rv1,
            &self.ex_mem,
            &self.mem_wb,
        );
        let (b_val, fwd_b) = hazards::forward_operand(
            self.forwarding,
            self.id_ex.rs2,
            self.id_ex.rv2,
            &self.ex_mem,
            &self.mem_wb,
        );
        self.last_events.fwd_a = fwd_a;
        self.last_events.fwd_b = fwd_b;

        let mut next_ex_mem = ExMem {
            instr: ex_instr.clone(),
            pc: self.id_ex.pc,
            rd: self.id_ex.rd,
            pred_taken: self.id_ex.pred_taken,
            ..ExMem::default()
        };
        match ex_instr.op {
            Op::Nop => {}
            Op::Beq { target, .. } => {
                let taken = a_val == b_val;
                next_ex_mem.branch_taken = taken;
                next_ex_mem.branch_target = target;
                self.addr_log.push(AddrEvent::BranchCmp {
                    cycle,
                    pc: self.id_ex.pc,
                    a: a_val,
                    b: b_val,
                    taken,
                });
            }
            Op::Add { .. } | Op::Sub { .. } | Op::Lw { .. } | Op::Sw { .. } => {
                let alu = alu_compute(&ex_instr, a_val, b_val);
                next_ex_mem.alu = alu;
                self.addr_log.push(AddrEvent::Alu {
                    cycle,
                    pc: self.id_ex.pc,
                    op: ex_instr.mnemonic(),
                    a: a_val,
                    b: b_val,
                    result: alu,
                });
                if ex_instr.is_store() {
                    next_ex_mem.store_val = b_val;
                }
            }
        }

        // Memory, on the instruction that was in EX last cycle.
        let cur_ex_mem = self.ex_mem.clone();
        let mut next_mem_wb = MemWb {
            instr: cur_ex_mem.instr.clone(),
            pc: cur_ex_mem.pc,
            rd: cur_ex_mem.rd,
            alu: cur_ex_mem.alu,
            ..MemWb::default()
        };
        match cur_ex_mem.instr.op {
            Op::Lw { .. } => {
                let addr = cur_ex_mem.alu;
                let val = self.dmem.get(&addr).copied().unwrap_or(0);
                next_mem_wb.mem_read_val = val;
                next_mem_wb.wb_val = val;
                self.addr_log.push(AddrEvent::Load {
                    cycle,
                    pc: cur_ex_mem.pc,
                    addr,
                    value: val,
                });
            }
            Op::Sw { .. } => {
                let addr = cur_ex_mem.alu;
                let _ = self.dmem.insert(addr, cur_ex_mem.store_val);
                self.addr_log.push(AddrEvent::Store {
                    cycle,
                    pc: cur_ex_mem.pc,
                    addr,
                    value: cur_ex_mem.store_val,
                });
            }
            Op::Add { .. } | Op::Sub { .. } => next_mem_wb.wb_val = cur_ex_mem.alu,
            Op::Nop | Op::Beq { .. } => {}
        }

        // Decode advance: a stall injects a bubble and leaves IF/ID to
        // the fetch logic below.
        let mut next_id_ex = if stall_decode || self.if_id.instr.is_nop() {
            IdEx::bubble()
        } else {
            let instr = self.if_id.instr.clone();
            let [rs1, rs2] = instr.source_regs();
            IdEx {
                pc: self.if_id.pc,
                rd: instr.dest_reg().unwrap_or(0),
                rs1,
                rs2,
                imm: instr.immediate(),
                rv1: self.regs.read(rs1),
                rv2: self.regs.read(rs2),
                pred_taken: instr.is_branch() && self.if_id.pred_taken,
                instr,
            }
        };

        // Fetch. The structural hazard is checked against the current
        // EX/MEM latch (the instruction about to enter MEM) and blocks
        // fetch independently of the decode stall.
        let mut fetch_stall = stall_decode;
        if self.structural_on && cur_ex_mem.instr.touches_memory() {
            fetch_stall = true;
            self.last_events.structural_stall = true;
            self.stats.record_stall(StallReason::Structural);
        }

        let (mut next_if_id, mut pc_next) = if fetch_stall {
            // Refetch suppressed: the pending instruction and its
            // recorded pc stay frozen.
            (self.if_id.clone(), self.pc)
        } else {
            let fetched = self.program.fetch(self.pc);
            let pred_taken = fetched.is_branch() && self.predictor.predict(self.pc);
            let next_pc = if pred_taken {
                fetched.branch_target().unwrap_or(self.pc + 1)
            } else {
                self.pc + 1
            };
            (
                IfId {
                    instr: fetched,
                    pc: self.pc,
                    pred_taken,
                },
                next_pc,
            )
        };

        // Branch resolution: may override the fetch decision made above
        // within this same cycle.
        if next_ex_mem.instr.is_branch() {
            let actual = next_ex_mem.branch_taken;
            let predicted = next_ex_mem.pred_taken;
            if actual {
                self.last_events.branch_taken = true;
            }
            self.predictor.update(next_ex_mem.pc, actual);
            if actual != predicted {
                self.stats.mispredicts += 1;
                self.stats.flushes += 1;
                self.last_events.mispredict = true;
                pc_next = if actual {
                    next_ex_mem.branch_target
                } else {
                    next_ex_mem.pc + 1
                };
                // Squash the wrong path: the slot fetched this cycle and
                // the instruction that just moved from IF/ID into ID/EX.
                next_if_id = IfId {
                    instr: Instruction::bubble(),
                    pc: self.pc,
                    pred_taken: false,
                };
                next_id_ex = IdEx::bubble();
            }
        }

        // Commit all four latches, the pc, and the cycle counter.
        self.mem_wb = next_mem_wb;
        self.ex_mem = next_ex_mem;
        self.id_ex = next_id_ex;
        self.if_id = next_if_id;
        self.pc = pc_next;
        self.stats.cycles += 1;

        // Last-stage annotations from the start-of-cycle snapshot.
        for (stage, pc) in occupancy.stages() {
            if let Some(pc) = pc {
                if let Some(st) = self.status.get_mut(pc) {
                    st.last_stage = Some(stage);
                }
            }
        }

        // Compact per-stage text snapshot. MEM and WB both show the new
        // MEM/WB latch; consumers of the exported trace depend on this
        // exact shape.
        let row = TraceRow {
            fetch: self.if_id.instr.to_string(),
            decode: self.id_ex.instr.to_string(),
            execute: self.ex_mem.instr.to_string(),
            memory: self.mem_wb.instr.to_string(),
            writeback: self.mem_wb.instr.to_string(),
        };
        self.trace.push(row.clone());
        row
    }
}

fn alu_compute(instr: &Instruction, a: i64, b: i64) -> i64 {
    match instr.op {
        Op::Add { .. } => a.wrapping_add(b),
        Op::Sub { .. } => a.wrapping_sub(b),
        Op::Lw { offset, .. } | Op::Sw { offset, .. } => a.wrapping_add(offset),
        Op::Nop | Op::Beq { .. } => 0,
    }
}

//! Pipeline latch records for inter-stage communication.
//!
//! One record per stage boundary (IF/ID, ID/EX, EX/MEM, MEM/WB). The
//! engine owns all four and replaces them wholesale at the end of every
//! cycle: a stage only ever reads the value committed at the end of the
//! previous cycle, which is what makes the one-step-behind read discipline
//! hold without aliasing.

use crate::isa::Instruction;

/// Fetch-to-decode latch.
#[derive(Clone, Debug)]
pub struct IfId {
    pub instr: Instruction,
    /// Program index the instruction was fetched from.
    pub pc: usize,
    /// Branch-predictor verdict carried from fetch (`beq` only).
    pub pred_taken: bool,
}

impl Default for IfId {
    fn default() -> Self {
        Self {
            instr: Instruction::bubble(),
            pc: 0,
            pred_taken: false,
        }
    }
}

/// Decode-to-execute latch.
///
/// Register indices are carried flat (zero standing in for an unused
/// slot) alongside the operand values read from the register file.
#[derive(Clone, Debug)]
pub struct IdEx {
    pub instr: Instruction,
    pub pc: usize,
    pub rd: usize,
    pub rs1: usize,
    pub rs2: usize,
    pub imm: i64,
    /// Value read from rs1 at decode time.
    pub rv1: i64,
    /// Value read from rs2 at decode time.
    pub rv2: i64,
    pub pred_taken: bool,
}

impl IdEx {
    /// The bubble injected when decode stalls or has nothing to decode.
    pub fn bubble() -> Self {
        Self::default()
    }
}

impl Default for IdEx {
    fn default() -> Self {
        Self {
            instr: Instruction::bubble(),
            pc: 0,
            rd: 0,
            rs1: 0,
            rs2: 0,
            imm: 0,
            rv1: 0,
            rv2: 0,
            pred_taken: false,
        }
    }
}

/// Execute-to-memory latch.
#[derive(Clone, Debug)]
pub struct ExMem {
    pub instr: Instruction,
    pub pc: usize,
    pub rd: usize,
    /// ALU result: arithmetic value, or the effective address for `lw`/`sw`.
    pub alu: i64,
    /// Forwarded rs2 value to be written by `sw`.
    pub store_val: i64,
    /// Resolved branch outcome (`beq` only).
    pub branch_taken: bool,
    pub branch_target: usize,
    pub pred_taken: bool,
}

impl Default for ExMem {
    fn default() -> Self {
        Self {
            instr: Instruction::bubble(),
            pc: 0,
            rd: 0,
            alu: 0,
            store_val: 0,
            branch_taken: false,
            branch_target: 0,
            pred_taken: false,
        }
    }
}

/// Memory-to-writeback latch.
#[derive(Clone, Debug)]
pub struct MemWb {
    pub instr: Instruction,
    pub pc: usize,
    pub rd: usize,
    pub alu: i64,
    /// Word loaded from data memory (`lw` only).
    pub mem_read_val: i64,
    /// Value committed to the register file at writeback.
    pub wb_val: i64,
}

impl Default for MemWb {
    fn default() -> Self {
        Self {
            instr: Instruction::bubble(),
            pc: 0,
            rd: 0,
            alu: 0,
            mem_read_val: 0,
            wb_val: 0,
        }
    }
}

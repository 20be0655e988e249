//! Control signals decoded from the instruction sitting in decode.
//!
//! Derived purely from the opcode; consumed by the visualization layer's
//! control ribbon rather than by the engine itself.

use serde::Serialize;

use crate::isa::{Instruction, Op};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AluSrc {
    #[default]
    Reg,
    Imm,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AluOp {
    #[default]
    Add,
    Sub,
}

/// The classic single-cycle control bundle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ControlSignals {
    pub reg_write: bool,
    pub mem_read: bool,
    pub mem_write: bool,
    pub mem_to_reg: bool,
    pub branch: bool,
    pub alu_src: AluSrc,
    pub alu_op: AluOp,
}

pub fn decode_control(instr: &Instruction) -> ControlSignals {
    let mut sig = ControlSignals::default();
    match instr.op {
        Op::Nop => {}
        Op::Add { .. } => {
            sig.reg_write = true;
        }
        Op::Sub { .. } => {
            sig.reg_write = true;
            sig.alu_op = AluOp::Sub;
        }
        Op::Lw { .. } => {
            sig.reg_write = true;
            sig.mem_read = true;
            sig.mem_to_reg = true;
            sig.alu_src = AluSrc::Imm;
        }
        Op::Sw { .. } => {
            sig.mem_write = true;
            sig.alu_src = AluSrc::Imm;
        }
        Op::Beq { .. } => {
            sig.branch = true;
            sig.alu_op = AluOp::Sub;
        }
    }
    sig
}

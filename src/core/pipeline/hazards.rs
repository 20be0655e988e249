//! Data hazard detection and operand forwarding.
//!
//! Two independent mechanisms, selected by the engine's forwarding flag.
//! With forwarding on, the only decode stall is the load-use hazard and
//! all other RAW hazards resolve combinationally through the EX/MEM and
//! MEM/WB bypasses. With forwarding off, decode stalls against any
//! register-writing instruction still in flight and operands always come
//! from the register file.

use serde::Serialize;

use super::latches::{ExMem, IdEx, IfId, MemWb};

/// Why decode (or fetch) stalled this cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum StallReason {
    #[serde(rename = "lw-use")]
    LoadUse,
    #[serde(rename = "RAW vs EX")]
    RawVsEx,
    #[serde(rename = "RAW vs MEM")]
    RawVsMem,
    #[serde(rename = "RAW vs WB")]
    RawVsWb,
    #[serde(rename = "structural")]
    Structural,
}

impl StallReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            StallReason::LoadUse => "lw-use",
            StallReason::RawVsEx => "RAW vs EX",
            StallReason::RawVsMem => "RAW vs MEM",
            StallReason::RawVsWb => "RAW vs WB",
            StallReason::Structural => "structural",
        }
    }
}

impl std::fmt::Display for StallReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Producer/consumer pair behind a decode-stage hazard check. Produced
/// whenever the IF/ID latch holds a real instruction, stall or not.
#[derive(Clone, Debug, Serialize)]
pub struct HazardDetail {
    /// Program index of the instruction in EX, if any.
    pub producer_pc: Option<usize>,
    pub producer_op: &'static str,
    pub producer_rd: Option<usize>,
    pub consumer_op: &'static str,
    /// The consumer's two source register slots (0 = unused).
    pub uses: [usize; 2],
}

/// Where an EX-stage operand value came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ForwardSource {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "EX/MEM")]
    ExMem,
    #[serde(rename = "MEM/WB")]
    MemWb,
}

impl ForwardSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            ForwardSource::None => "none",
            ForwardSource::ExMem => "EX/MEM",
            ForwardSource::MemWb => "MEM/WB",
        }
    }
}

/// Decides whether decode must stall this cycle, checked against the
/// latch values committed at the end of the previous cycle.
///
/// Forwarding on: stall only when EX holds a load whose destination the
/// decoding instruction reads (the value is not ready until after MEM).
/// Forwarding off: stall against a register-writing instruction in EX,
/// EX/MEM or MEM/WB, nearest first.
pub fn detect_decode_stall(
    forwarding: bool,
    if_id: &IfId,
    id_ex: &IdEx,
    ex_mem: &ExMem,
    mem_wb: &MemWb,
) -> (Option<StallReason>, Option<HazardDetail>) {
    let consumer = &if_id.instr;
    if consumer.is_nop() {
        return (None, None);
    }

    let producer = &id_ex.instr;
    let detail = HazardDetail {
        producer_pc: (!producer.is_nop()).then_some(id_ex.pc),
        producer_op: if producer.is_nop() {
            ""
        } else {
            producer.mnemonic()
        },
        producer_rd: (!producer.is_nop()).then_some(id_ex.rd),
        consumer_op: consumer.mnemonic(),
        uses: consumer.source_regs(),
    };

    if forwarding {
        if producer.is_load() && id_ex.rd != 0 && consumer.uses_reg(id_ex.rd) {
            return (Some(StallReason::LoadUse), Some(detail));
        }
        return (None, Some(detail));
    }

    if producer.writes_reg() && id_ex.rd != 0 && consumer.uses_reg(id_ex.rd) {
        return (Some(StallReason::RawVsEx), Some(detail));
    }
    if ex_mem.instr.writes_reg() && ex_mem.rd != 0 && consumer.uses_reg(ex_mem.rd) {
        return (Some(StallReason::RawVsMem), Some(detail));
    }
    if mem_wb.instr.writes_reg() && mem_wb.rd != 0 && consumer.uses_reg(mem_wb.rd) {
        return (Some(StallReason::RawVsWb), Some(detail));
    }
    (None, Some(detail))
}

/// Resolves one EX-stage operand, bypassing from EX/MEM or MEM/WB when
/// forwarding is on.
///
/// EX/MEM wins over MEM/WB (newer value). A load sitting in EX/MEM never
/// forwards: its value is not available until after MEM, and the load-use
/// stall guarantees no consumer reaches EX that early. Register 0 always
/// reads as zero and is never forwarded.
pub fn forward_operand(
    forwarding: bool,
    src_reg: usize,
    reg_val: i64,
    ex_mem: &ExMem,
    mem_wb: &MemWb,
) -> (i64, ForwardSource) {
    if !forwarding || src_reg == 0 {
        return (reg_val, ForwardSource::None);
    }
    if ex_mem.instr.writes_reg() && ex_mem.rd == src_reg && !ex_mem.instr.is_load() {
        return (ex_mem.alu, ForwardSource::ExMem);
    }
    if mem_wb.instr.writes_reg() && mem_wb.rd == src_reg {
        return (mem_wb.wb_val, ForwardSource::MemWb);
    }
    (reg_val, ForwardSource::None)
}

//! Tests for operand forwarding and decode-stall detection.

use riscv_pipeline_sim::core::pipeline::hazards::{
    detect_decode_stall, forward_operand, ForwardSource, StallReason,
};
use riscv_pipeline_sim::core::pipeline::latches::{ExMem, IdEx, IfId, MemWb};
use riscv_pipeline_sim::isa::{Instruction, Op};

fn add_instr(rd: usize, rs1: usize, rs2: usize) -> Instruction {
    Instruction {
        op: Op::Add { rd, rs1, rs2 },
        raw: format!("add x{}, x{}, x{}", rd, rs1, rs2),
        seq: 0,
    }
}

fn lw_instr(rd: usize, base: usize) -> Instruction {
    Instruction {
        op: Op::Lw {
            rd,
            base,
            offset: 0,
        },
        raw: format!("lw x{}, 0(x{})", rd, base),
        seq: 0,
    }
}

/// IF/ID latch holding `instr`, as decode sees it.
fn if_id_with(instr: Instruction) -> IfId {
    IfId {
        instr,
        pc: 1,
        pred_taken: false,
    }
}

/// ID/EX latch holding `instr`, destination slot filled in.
fn id_ex_with(instr: Instruction) -> IdEx {
    let rd = instr.dest_reg().unwrap_or(0);
    let [rs1, rs2] = instr.source_regs();
    IdEx {
        pc: 0,
        rd,
        rs1,
        rs2,
        instr,
        ..IdEx::default()
    }
}

fn ex_mem_with(instr: Instruction, alu: i64) -> ExMem {
    let rd = instr.dest_reg().unwrap_or(0);
    ExMem {
        rd,
        alu,
        instr,
        ..ExMem::default()
    }
}

fn mem_wb_with(instr: Instruction, wb_val: i64) -> MemWb {
    let rd = instr.dest_reg().unwrap_or(0);
    MemWb {
        rd,
        wb_val,
        instr,
        ..MemWb::default()
    }
}

/// An ALU result still in EX/MEM forwards to a dependent operand.
#[test]
fn test_forward_from_ex_mem() {
    let ex_mem = ex_mem_with(add_instr(1, 2, 3), 111);
    let mem_wb = MemWb::default();
    let (val, src) = forward_operand(true, 1, 5, &ex_mem, &mem_wb);
    assert_eq!(val, 111, "should bypass the stale register value");
    assert_eq!(src, ForwardSource::ExMem);
}

/// A writeback value still in MEM/WB forwards when EX/MEM has nothing.
#[test]
fn test_forward_from_mem_wb() {
    let ex_mem = ExMem::default();
    let mem_wb = mem_wb_with(add_instr(1, 2, 3), 222);
    let (val, src) = forward_operand(true, 1, 5, &ex_mem, &mem_wb);
    assert_eq!(val, 222);
    assert_eq!(src, ForwardSource::MemWb);
}

/// When both stages would match, EX/MEM (the newer value) wins.
#[test]
fn test_ex_mem_beats_mem_wb() {
    let ex_mem = ex_mem_with(add_instr(1, 2, 3), 111);
    let mem_wb = mem_wb_with(add_instr(1, 4, 5), 222);
    let (val, src) = forward_operand(true, 1, 5, &ex_mem, &mem_wb);
    assert_eq!(val, 111, "EX/MEM holds the newer write to x1");
    assert_eq!(src, ForwardSource::ExMem);
}

/// A load in EX/MEM has no value yet and must not forward.
#[test]
fn test_load_in_ex_mem_does_not_forward() {
    let ex_mem = ex_mem_with(lw_instr(1, 0), 40);
    let mem_wb = MemWb::default();
    let (val, src) = forward_operand(true, 1, 5, &ex_mem, &mem_wb);
    assert_eq!(val, 5, "the address in the ALU slot must not leak");
    assert_eq!(src, ForwardSource::None);
}

/// With a load in EX/MEM, an older matching writer in MEM/WB still
/// forwards.
#[test]
fn test_load_in_ex_mem_falls_through_to_mem_wb() {
    let ex_mem = ex_mem_with(lw_instr(1, 0), 40);
    let mem_wb = mem_wb_with(add_instr(1, 2, 3), 9);
    let (val, src) = forward_operand(true, 1, 5, &ex_mem, &mem_wb);
    assert_eq!(val, 9);
    assert_eq!(src, ForwardSource::MemWb);
}

/// Register 0 always reads as zero; no bypass applies.
#[test]
fn test_x0_never_forwarded() {
    let ex_mem = ex_mem_with(add_instr(0, 2, 3), 111);
    let mem_wb = MemWb::default();
    let (val, src) = forward_operand(true, 0, 0, &ex_mem, &mem_wb);
    assert_eq!(val, 0);
    assert_eq!(src, ForwardSource::None);
}

/// With forwarding disabled, operands always come from the register file.
#[test]
fn test_forwarding_disabled_reads_register_file() {
    let ex_mem = ex_mem_with(add_instr(1, 2, 3), 111);
    let mem_wb = mem_wb_with(add_instr(1, 4, 5), 222);
    let (val, src) = forward_operand(false, 1, 5, &ex_mem, &mem_wb);
    assert_eq!(val, 5);
    assert_eq!(src, ForwardSource::None);
}

/// Load-use is the only decode stall when forwarding is on.
#[test]
fn test_load_use_stalls_with_forwarding() {
    let if_id = if_id_with(add_instr(2, 1, 1));
    let id_ex = id_ex_with(lw_instr(1, 0));
    let (stall, detail) =
        detect_decode_stall(true, &if_id, &id_ex, &ExMem::default(), &MemWb::default());
    assert_eq!(stall, Some(StallReason::LoadUse));
    let detail = detail.expect("detail should be produced");
    assert_eq!(detail.producer_rd, Some(1));
    assert_eq!(detail.producer_op, "lw");
    assert_eq!(detail.consumer_op, "add");
    assert_eq!(detail.uses, [1, 1]);
}

/// A non-load producer in EX does not stall decode when forwarding is on.
#[test]
fn test_no_stall_for_alu_producer_with_forwarding() {
    let if_id = if_id_with(add_instr(2, 1, 1));
    let id_ex = id_ex_with(add_instr(1, 0, 0));
    let (stall, detail) =
        detect_decode_stall(true, &if_id, &id_ex, &ExMem::default(), &MemWb::default());
    assert_eq!(stall, None);
    assert!(detail.is_some(), "detail is produced even without a stall");
}

/// An unrelated load does not stall decode.
#[test]
fn test_no_stall_for_unrelated_load() {
    let if_id = if_id_with(add_instr(2, 3, 3));
    let id_ex = id_ex_with(lw_instr(1, 0));
    let (stall, _) =
        detect_decode_stall(true, &if_id, &id_ex, &ExMem::default(), &MemWb::default());
    assert_eq!(stall, None);
}

/// Without forwarding, decode stalls against each downstream position,
/// nearest first.
#[test]
fn test_raw_stalls_without_forwarding() {
    let consumer = || if_id_with(add_instr(2, 1, 1));

    let (stall, _) = detect_decode_stall(
        false,
        &consumer(),
        &id_ex_with(add_instr(1, 0, 0)),
        &ExMem::default(),
        &MemWb::default(),
    );
    assert_eq!(stall, Some(StallReason::RawVsEx));

    let (stall, _) = detect_decode_stall(
        false,
        &consumer(),
        &IdEx::default(),
        &ex_mem_with(add_instr(1, 0, 0), 0),
        &MemWb::default(),
    );
    assert_eq!(stall, Some(StallReason::RawVsMem));

    let (stall, _) = detect_decode_stall(
        false,
        &consumer(),
        &IdEx::default(),
        &ExMem::default(),
        &mem_wb_with(add_instr(1, 0, 0), 0),
    );
    assert_eq!(stall, Some(StallReason::RawVsWb));
}

/// The nearest position names the reason when several would match.
#[test]
fn test_nearest_raw_position_wins() {
    let (stall, _) = detect_decode_stall(
        false,
        &if_id_with(add_instr(2, 1, 1)),
        &id_ex_with(add_instr(1, 0, 0)),
        &ex_mem_with(add_instr(1, 0, 0), 0),
        &mem_wb_with(add_instr(1, 0, 0), 0),
    );
    assert_eq!(stall, Some(StallReason::RawVsEx));
}

/// An empty decode slot produces neither a stall nor a detail record.
#[test]
fn test_nop_in_decode_produces_nothing() {
    let (stall, detail) = detect_decode_stall(
        true,
        &IfId::default(),
        &id_ex_with(lw_instr(1, 0)),
        &ExMem::default(),
        &MemWb::default(),
    );
    assert_eq!(stall, None);
    assert!(detail.is_none());
}

/// Stall reasons render with their fixed display names.
#[test]
fn test_stall_reason_names() {
    assert_eq!(StallReason::LoadUse.as_str(), "lw-use");
    assert_eq!(StallReason::RawVsEx.as_str(), "RAW vs EX");
    assert_eq!(StallReason::RawVsMem.as_str(), "RAW vs MEM");
    assert_eq!(StallReason::RawVsWb.as_str(), "RAW vs WB");
    assert_eq!(StallReason::Structural.as_str(), "structural");
}

//! Tests for the architectural register file.

use riscv_pipeline_sim::core::gpr::RegisterFile;

/// Writes to x0 are discarded; reads always return zero.
#[test]
fn test_x0_discards_writes() {
    let mut regs = RegisterFile::new();
    regs.write(0, 42);
    assert_eq!(regs.read(0), 0);
    assert_eq!(regs.snapshot()[0], 0);
}

/// Ordinary registers hold signed values.
#[test]
fn test_registers_hold_signed_values() {
    let mut regs = RegisterFile::new();
    regs.write(5, -7);
    regs.write(31, 1 << 40);
    assert_eq!(regs.read(5), -7);
    assert_eq!(regs.read(31), 1 << 40);
}

/// A fresh register file reads zero everywhere.
#[test]
fn test_starts_zeroed() {
    let regs = RegisterFile::new();
    for i in 0..32 {
        assert_eq!(regs.read(i), 0, "x{} should start at 0", i);
    }
}

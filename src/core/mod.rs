//! Engine internals: the CPU state machine, register file, branch
//! predictors, pipeline plumbing, and the telemetry surface.

/// Branch predictor implementations.
pub mod bp;

/// The per-cycle pipeline engine.
pub mod cpu;

/// Architectural register file.
pub mod gpr;

/// Latches, hazard detection/forwarding, and control signals.
pub mod pipeline;

/// Read-only introspection views.
pub mod telemetry;

pub use cpu::Cpu;

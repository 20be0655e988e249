//! Simulation statistics collection and reporting.
//!
//! Aggregate counters updated by the engine every cycle, plus the
//! stall-reason histogram. `print` renders the banner summary the CLI
//! shows after a run.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::pipeline::hazards::StallReason;

#[derive(Debug, Default, Clone, Serialize)]
pub struct SimStats {
    pub cycles: u64,
    pub instructions_retired: u64,
    pub stalls: u64,
    pub flushes: u64,
    pub mispredicts: u64,
    /// Stall counts per named reason.
    pub stall_reasons: BTreeMap<StallReason, u64>,
}

impl SimStats {
    pub fn record_stall(&mut self, reason: StallReason) {
        self.stalls += 1;
        *self.stall_reasons.entry(reason).or_insert(0) += 1;
    }

    /// Cycles per retired instruction; infinite until something retires.
    pub fn cpi(&self) -> f64 {
        if self.instructions_retired == 0 {
            f64::INFINITY
        } else {
            self.cycles as f64 / self.instructions_retired as f64
        }
    }

    /// Histogram rows sorted by descending count, then reason name.
    pub fn stall_breakdown(&self) -> Vec<(StallReason, u64)> {
        let mut rows: Vec<(StallReason, u64)> =
            self.stall_reasons.iter().map(|(&r, &n)| (r, n)).collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        rows
    }

    /// Prints a formatted summary of the run.
    pub fn print(&self) {
        let cyc = self.cycles.max(1);

        println!("\n==========================================================");
        println!("PIPELINE SIMULATION STATISTICS");
        println!("==========================================================");
        println!("sim_cycles               {}", self.cycles);
        println!("sim_insts                {}", self.instructions_retired);
        if self.instructions_retired > 0 {
            println!("sim_cpi                  {:.4}", self.cpi());
        } else {
            println!("sim_cpi                  n/a");
        }
        println!("----------------------------------------------------------");
        println!("HAZARDS");
        println!(
            "  stalls                 {} ({:.2}%)",
            self.stalls,
            (self.stalls as f64 / cyc as f64) * 100.0
        );
        for (reason, count) in self.stall_breakdown() {
            println!("    {:<20} {}", reason.as_str(), count);
        }
        println!("  flushes                {}", self.flushes);
        println!("  mispredicts            {}", self.mispredicts);
        println!("==========================================================");
    }
}

//! Branch predictors.
//!
//! Predictions are consulted at fetch time for `beq` instructions only
//! and resolved in EX; the engine feeds every resolution back through
//! [`BranchPredictor::update`] regardless of whether the prediction was
//! right. The concrete predictor is selected from the configured mode.

use std::collections::BTreeMap;

use crate::config::PredictorMode;

pub trait BranchPredictor {
    /// Predicted outcome for the branch at `pc`.
    fn predict(&self, pc: usize) -> bool;

    /// Record the actual outcome of the branch at `pc`.
    fn update(&mut self, pc: usize, taken: bool);

    /// History table snapshot, sorted by program index. Empty for
    /// predictors that keep no state.
    fn table(&self) -> Vec<(usize, bool)> {
        Vec::new()
    }
}

/// Mode `none`: no speculation, branches simply resolve in EX.
pub struct NeverTaken;

impl BranchPredictor for NeverTaken {
    fn predict(&self, _pc: usize) -> bool {
        false
    }

    fn update(&mut self, _pc: usize, _taken: bool) {}
}

/// Mode `static_nt`: an explicit always-not-taken prediction. Fetch
/// behaves exactly like `none`; the mode exists so mispredict accounting
/// can be compared against real predictors.
pub struct StaticNotTaken;

impl BranchPredictor for StaticNotTaken {
    fn predict(&self, _pc: usize) -> bool {
        false
    }

    fn update(&mut self, _pc: usize, _taken: bool) {}
}

/// Mode `onebit`: predicts whatever the branch at this pc last did.
/// Unseen branches predict not-taken.
pub struct OneBit {
    table: BTreeMap<usize, bool>,
}

impl OneBit {
    pub fn new() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }
}

impl Default for OneBit {
    fn default() -> Self {
        Self::new()
    }
}

impl BranchPredictor for OneBit {
    fn predict(&self, pc: usize) -> bool {
        self.table.get(&pc).copied().unwrap_or(false)
    }

    fn update(&mut self, pc: usize, taken: bool) {
        let _ = self.table.insert(pc, taken);
    }

    fn table(&self) -> Vec<(usize, bool)> {
        self.table.iter().map(|(&pc, &t)| (pc, t)).collect()
    }
}

/// Builds the predictor for a configured mode.
pub fn from_mode(mode: PredictorMode) -> Box<dyn BranchPredictor> {
    match mode {
        PredictorMode::None => Box::new(NeverTaken),
        PredictorMode::StaticNt => Box::new(StaticNotTaken),
        PredictorMode::Onebit => Box::new(OneBit::new()),
    }
}

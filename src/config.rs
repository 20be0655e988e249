use serde::Deserialize;

const DEFAULT_GANTT_WINDOW: usize = 60;
const DEFAULT_ADDR_LOG_WINDOW: usize = 80;

/// Top-level simulator configuration, loaded from TOML. Every section and
/// field is defaulted so an empty file (or no file at all) is valid.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub trace: TraceConfig,
}

/// Hazard handling and branch prediction knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Operand bypassing from EX/MEM and MEM/WB. When off, every RAW
    /// hazard is resolved by stalling decode.
    #[serde(default = "default_forwarding")]
    pub forwarding: bool,

    /// Model a single shared memory port contended between instruction
    /// fetch and data access.
    #[serde(default)]
    pub structural_hazard: bool,

    #[serde(default)]
    pub branch_predictor: PredictorMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            forwarding: default_forwarding(),
            structural_hazard: false,
            branch_predictor: PredictorMode::default(),
        }
    }
}

/// Branch prediction mode.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PredictorMode {
    /// No speculation: branches resolve in EX.
    #[default]
    None,
    /// An explicit always-not-taken prediction. Same fetch behavior as
    /// `none`, modeled as a prediction for comparison.
    StaticNt,
    /// Per-PC single-bit last-outcome history; not-taken for unseen PCs.
    Onebit,
}

/// Bounds for the telemetry windows consumed by the visualization layer.
#[derive(Debug, Deserialize, Clone)]
pub struct TraceConfig {
    #[serde(default = "default_gantt_window")]
    pub gantt_window: usize,

    #[serde(default = "default_addr_log_window")]
    pub addr_log_window: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            gantt_window: default_gantt_window(),
            addr_log_window: default_addr_log_window(),
        }
    }
}

fn default_forwarding() -> bool {
    true
}

fn default_gantt_window() -> usize {
    DEFAULT_GANTT_WINDOW
}

fn default_addr_log_window() -> usize {
    DEFAULT_ADDR_LOG_WINDOW
}

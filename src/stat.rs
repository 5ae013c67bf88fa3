use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    /// Sum of the per-agent plan lengths.
    pub costs: usize,
    pub makespan: usize,
    pub time_ms: f64,
    pub distance_time_ms: f64,
    pub low_level_expand_nodes: usize,
    pub high_level_expand_nodes: usize,
}

impl Stats {
    pub fn print(&self) {
        info!(
            "Cost {:?} Makespan {:?} Time(milliseconds) {:?} Distance table(milliseconds) {:?} High level expand nodes number: {:?} Low level expand nodes number {:?}",
            self.costs,
            self.makespan,
            self.time_ms,
            self.distance_time_ms,
            self.high_level_expand_nodes,
            self.low_level_expand_nodes
        );
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

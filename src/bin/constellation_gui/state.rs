//! Plot state refreshed by the session each tick

use iq_constellation::{DisplayBuffer, Renderer, Snapshot};

/// Axis limit of the scatter plot (raw I/Q units)
pub const AXIS_LIMIT: f64 = 80.0;

/// Ideal 16-QAM levels on each axis
pub const IDEAL_LEVELS: [f64; 4] = [-45.0, -15.0, 15.0, 45.0];

/// Everything the plot needs from the last tick
#[derive(Default)]
pub struct PlotView {
    pub snapshot: Snapshot,
    pub points: Vec<[f64; 2]>,
    pub ticks: u64,
}

impl Renderer for PlotView {
    fn render(&mut self, snapshot: &Snapshot, points: &DisplayBuffer) {
        self.snapshot = *snapshot;
        self.points.clear();
        self.points
            .extend(points.iter().map(|s| [f64::from(s.i), f64::from(s.q)]));
        self.ticks += 1;
    }
}

/// Reference constellation points
pub fn ideal_points() -> Vec<[f64; 2]> {
    IDEAL_LEVELS
        .iter()
        .flat_map(|&i| IDEAL_LEVELS.iter().map(move |&q| [i, q]))
        .collect()
}

/// UI-specific state
pub struct UiState {
    /// Last control error shown in the status bar
    pub error: Option<String>,
    pub status: String,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            error: None,
            status: String::from("Capturing"),
        }
    }
}

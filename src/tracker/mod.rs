pub mod chest;

pub use chest::{ChestTracker, MetricSnapshot, PhaseTransition, ScanPhase, ShoulderPoints, MEASURING_PHASE};

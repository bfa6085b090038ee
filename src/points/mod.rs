mod ledger;
mod schedule;

pub use ledger::{MemoryLedger, PointsLedger};
pub use schedule::{compute_delay, PointPolicy, PointScheduler, BASE_DELAY, PENALTY_SCALE};

//! Turn taking
//!
//! The coordinator decides who holds the floor. The energy detector is the
//! local fallback used when the AI transport's own VAD events are missing.

mod coordinator;
mod energy;

pub use coordinator::{
    CoordinatorConfig, DeadlineOutcome, FrameDecision, TurnCoordinator, TurnCounters, TurnState,
};
pub use energy::{EnergyDetector, FrameActivity};

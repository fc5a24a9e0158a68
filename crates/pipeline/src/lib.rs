//! Per-call audio pipeline state
//!
//! - Turn/barge-in coordination between caller and assistant
//! - Local energy-based voice activity fallback
//! - Outbound pacing queue drained on the telephony frame clock

pub mod pacing;
pub mod turn;

pub use pacing::{PacingQueue, TickOutcome};
pub use turn::{
    CoordinatorConfig, DeadlineOutcome, EnergyDetector, FrameActivity, FrameDecision,
    TurnCoordinator, TurnCounters, TurnState,
};

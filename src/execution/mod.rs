// Position lifecycle: tracking, order coordination and the poll loop
pub mod coordinator;
pub mod engine;
pub mod position_tracker;

pub use coordinator::{
    CoordinatorPhase, EntryFill, ExecutionAction, ExecutionDecision, ExitFill, ExitReason,
    OrderCoordinator,
};
pub use engine::{CycleReport, Engine, EngineState};
pub use position_tracker::PositionTracker;

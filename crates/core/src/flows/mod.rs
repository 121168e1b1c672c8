pub mod engine;
pub mod states;

pub use engine::{ReservationTracker, TrackerDefinition, TrackerEngine, TrackerTransitionError};
pub use states::{TrackerAction, TrackerContext, TrackerEvent, TrackerState, TransitionOutcome};

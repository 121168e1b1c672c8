use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    TrackerAction, TrackerContext, TrackerEvent, TrackerState, TransitionOutcome,
};

/// State machine definition for a pending-action slot. A trait so tests can
/// drive the engine with reduced transition tables, mirroring how the
/// orchestrator consumes it.
pub trait TrackerDefinition {
    fn initial_state(&self) -> TrackerState;
    fn transition(
        &self,
        current: &TrackerState,
        event: &TrackerEvent,
        context: &TrackerContext,
    ) -> Result<TransitionOutcome, TrackerTransitionError>;
}

/// The production transition table for reservation mutations
/// (create / update / cancel all share it; required slots differ per kind
/// and arrive via `TrackerContext::missing_slots`).
#[derive(Clone, Debug, Default)]
pub struct ReservationTracker;

impl TrackerDefinition for ReservationTracker {
    fn initial_state(&self) -> TrackerState {
        TrackerState::Idle
    }

    fn transition(
        &self,
        current: &TrackerState,
        event: &TrackerEvent,
        context: &TrackerContext,
    ) -> Result<TransitionOutcome, TrackerTransitionError> {
        transition_reservation(current, event, context)
    }
}

pub struct TrackerEngine<T> {
    tracker: T,
}

impl<T> TrackerEngine<T>
where
    T: TrackerDefinition,
{
    pub fn new(tracker: T) -> Self {
        Self { tracker }
    }

    pub fn initial_state(&self) -> TrackerState {
        self.tracker.initial_state()
    }

    pub fn apply(
        &self,
        current: &TrackerState,
        event: &TrackerEvent,
        context: &TrackerContext,
    ) -> Result<TransitionOutcome, TrackerTransitionError> {
        self.tracker.transition(current, event, context)
    }

    pub fn apply_with_audit(
        &self,
        current: &TrackerState,
        event: &TrackerEvent,
        context: &TrackerContext,
        sink: &dyn AuditSink,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, TrackerTransitionError> {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.customer_id.clone(),
                        audit.reservation_id,
                        audit.correlation_id.clone(),
                        "pending.transition_applied",
                        AuditCategory::Pending,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", format!("{:?}", outcome.from))
                    .with_metadata("to", format!("{:?}", outcome.to))
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.customer_id.clone(),
                        audit.reservation_id,
                        audit.correlation_id.clone(),
                        "pending.transition_rejected",
                        AuditCategory::Pending,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for TrackerEngine<ReservationTracker> {
    fn default() -> Self {
        Self::new(ReservationTracker)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TrackerTransitionError {
    #[error("cannot confirm from {state:?} with missing slots: {missing_slots:?}")]
    MissingRequiredSlots { state: TrackerState, missing_slots: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: TrackerState, event: TrackerEvent },
}

fn transition_reservation(
    current: &TrackerState,
    event: &TrackerEvent,
    context: &TrackerContext,
) -> Result<TransitionOutcome, TrackerTransitionError> {
    use TrackerAction::{
        AskForConfirmation, AskForMissingSlots, DiscardDraft, ExecuteAction, ReportTimeout,
    };
    use TrackerEvent::{Affirmed, Declined, Executed, ExecutionRejected, Expired, SlotsCaptured};
    use TrackerState::{AwaitingConfirmation, Collecting, Idle};

    let (to, actions) = match (current, event) {
        // Slot capture from any live state: promote when complete, keep
        // collecting otherwise. An amendment while awaiting confirmation
        // lands here too and re-evaluates completeness.
        (Idle, SlotsCaptured)
        | (Collecting, SlotsCaptured)
        | (AwaitingConfirmation, SlotsCaptured) => {
            if context.missing_slots.is_empty() {
                (AwaitingConfirmation, vec![AskForConfirmation])
            } else {
                (Collecting, vec![AskForMissingSlots])
            }
        }
        (AwaitingConfirmation, Affirmed) => {
            if !context.missing_slots.is_empty() {
                return Err(TrackerTransitionError::MissingRequiredSlots {
                    state: current.clone(),
                    missing_slots: context.missing_slots.clone(),
                });
            }
            // The slot is released only after the executor reports back.
            (AwaitingConfirmation, vec![ExecuteAction])
        }
        (AwaitingConfirmation, Executed) => (Idle, Vec::new()),
        // Storage conflict: stay confirmable so the customer can amend a
        // slot instead of restarting the whole flow.
        (AwaitingConfirmation, ExecutionRejected) => (AwaitingConfirmation, Vec::new()),
        (Collecting, Declined) | (AwaitingConfirmation, Declined) => (Idle, vec![DiscardDraft]),
        (Collecting, Expired) | (AwaitingConfirmation, Expired) => (Idle, vec![ReportTimeout]),
        _ => {
            return Err(TrackerTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}

use serde::{Deserialize, Serialize};

/// Observable state of the per-customer pending-action slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerState {
    Idle,
    Collecting,
    AwaitingConfirmation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerEvent {
    /// New slot values were extracted from the customer's message
    /// (covers both the opening message and later amendments).
    SlotsCaptured,
    /// Explicit yes while a complete draft awaits confirmation.
    Affirmed,
    /// Explicit no; the draft is abandoned.
    Declined,
    /// The inactivity TTL elapsed before the next message.
    Expired,
    /// The executor reported success; the slot is released.
    Executed,
    /// The executor reported a conflict; the slot stays confirmable so the
    /// customer can pick another time without restarting.
    ExecutionRejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TrackerContext {
    /// Slot names the draft still lacks for its action kind.
    pub missing_slots: Vec<String>,
}

impl TrackerContext {
    pub fn with_missing<I, S>(missing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { missing_slots: missing.into_iter().map(Into::into).collect() }
    }
}

/// Follow-up work a transition asks the orchestrator to perform.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerAction {
    AskForMissingSlots,
    AskForConfirmation,
    ExecuteAction,
    DiscardDraft,
    ReportTimeout,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: TrackerState,
    pub to: TrackerState,
    pub event: TrackerEvent,
    pub actions: Vec<TrackerAction>,
}

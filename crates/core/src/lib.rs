pub mod audit;
pub mod config;
pub mod crm;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod stores;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use crm::{Campaign, CampaignKind, CampaignPlanner, CustomerOverview, VisitRecord};
pub use domain::customer::{Customer, CustomerId};
pub use domain::pending::{ActionKind, ActionToken, PendingAction, PendingPhase, ReservationDraft};
pub use domain::reservation::{Reservation, ReservationFields, ReservationId, ReservationStatus};
pub use domain::session::{HandoffState, SessionHistory, SessionTurn, TurnRole};
pub use domain::turn::{InboundMessage, ReservationData, Route, TurnResult, UserMetadata};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{
    ReservationTracker, TrackerAction, TrackerContext, TrackerEngine, TrackerEvent, TrackerState,
    TrackerTransitionError, TransitionOutcome,
};
pub use stores::{
    CalendarAdapter, CalendarError, ReservationStore, SessionSnapshot, SessionStore, StoreError,
};

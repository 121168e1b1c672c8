//! Executes confirmed pending actions against reservation storage and the
//! calendar. Storage commits first, the calendar mirrors second, and a
//! calendar failure compensates the storage write before surfacing the error.
//! Every successful execution is recorded against its confirmation token so a
//! repeated confirmation replays the prior result instead of acting twice.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use casona_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use casona_core::domain::pending::{ActionKind, ActionToken, PendingAction};
use casona_core::domain::reservation::{Reservation, ReservationFields, ReservationId};
use casona_core::stores::{CalendarAdapter, CalendarError, ReservationStore, StoreError};

#[derive(Clone, Debug, Error)]
pub enum ExecutionError {
    #[error("pending action has no confirmation token")]
    MissingToken,
    #[error("draft is missing required details: {missing:?}")]
    IncompleteDraft { missing: Vec<&'static str> },
    #[error("reservation {0} not found")]
    NotFound(ReservationId),
    #[error("booking conflict: {0}")]
    Conflict(String),
    #[error("calendar sync failed after rollback: {0}")]
    CalendarSync(CalendarError),
    #[error(transparent)]
    Storage(StoreError),
}

impl From<StoreError> for ExecutionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Conflict(message) => Self::Conflict(message),
            other => Self::Storage(other),
        }
    }
}

impl ExecutionError {
    /// True when the pending action should stay alive so the customer can
    /// adjust it, rather than being discarded.
    pub fn keeps_pending(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::CalendarSync(_) | Self::IncompleteDraft { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::MissingToken | Self::IncompleteDraft { .. } => {
                "Todavía me faltan detalles para completar tu solicitud.".to_string()
            }
            Self::NotFound(id) => {
                format!("No encontré la reservación {id}. ¿Puedes verificar el número?")
            }
            Self::Conflict(_) => {
                "Ese horario ya está lleno. ¿Te gustaría otra hora?".to_string()
            }
            Self::CalendarSync(_) => {
                "Tuve un problema al agendar. Nada cambió; ¿intentamos de nuevo?".to_string()
            }
            Self::Storage(_) => {
                "El sistema de reservaciones no responde. Intenta en un momento.".to_string()
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionOutcome {
    pub reservation: Reservation,
    /// The token had already been executed; this is the recorded result.
    pub replayed: bool,
}

pub struct ToolExecutor {
    reservations: Arc<dyn ReservationStore>,
    calendar: Arc<dyn CalendarAdapter>,
    audit: Arc<dyn AuditSink>,
    executed: RwLock<HashMap<ActionToken, (Reservation, DateTime<Utc>)>>,
    /// How long an executed token keeps replaying its result. Must outlive
    /// the pending-action TTL; stale records are purged on the next write.
    replay_retention: Duration,
}

impl ToolExecutor {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        calendar: Arc<dyn CalendarAdapter>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            reservations,
            calendar,
            audit,
            executed: RwLock::new(HashMap::new()),
            replay_retention: Duration::hours(1),
        }
    }

    pub fn with_replay_retention(mut self, retention: Duration) -> Self {
        self.replay_retention = retention;
        self
    }

    pub async fn execute(
        &self,
        pending: &PendingAction,
        correlation_id: &str,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let token = pending.token.as_ref().ok_or(ExecutionError::MissingToken)?;
        let now = Utc::now();

        if let Some((recorded, at)) = self.executed.read().await.get(token) {
            if now - *at < self.replay_retention {
                tracing::info!(
                    event_name = "executor.token_replayed",
                    correlation_id,
                    token = %token.0,
                );
                return Ok(ExecutionOutcome { reservation: recorded.clone(), replayed: true });
            }
        }

        let missing = pending.missing_slots();
        if !missing.is_empty() {
            return Err(ExecutionError::IncompleteDraft { missing });
        }

        let result = match pending.kind {
            ActionKind::Create => self.create(pending, correlation_id).await,
            ActionKind::Update => self.update(pending, correlation_id).await,
            ActionKind::Cancel => self.cancel(pending, correlation_id).await,
        };

        match result {
            Ok(reservation) => {
                let mut executed = self.executed.write().await;
                executed.retain(|_, (_, at)| now - *at < self.replay_retention);
                executed.insert(token.clone(), (reservation.clone(), now));
                drop(executed);
                self.record(pending, correlation_id, AuditOutcome::Success, Some(&reservation));
                Ok(ExecutionOutcome { reservation, replayed: false })
            }
            Err(error) => {
                self.record(pending, correlation_id, AuditOutcome::Failed, None);
                Err(error)
            }
        }
    }

    async fn create(
        &self,
        pending: &PendingAction,
        correlation_id: &str,
    ) -> Result<Reservation, ExecutionError> {
        let mut reservation =
            self.reservations.create(&pending.customer_id, &pending.draft).await?;

        match self.calendar.create_event(&reservation).await {
            Ok(event_id) => {
                self.reservations.link_calendar_event(&reservation.id, Some(&event_id)).await?;
                reservation.calendar_event_id = Some(event_id);
                Ok(reservation)
            }
            Err(calendar_error) => {
                tracing::warn!(
                    event_name = "executor.create_rolled_back",
                    correlation_id,
                    reservation_id = reservation.id.0,
                    error = %calendar_error,
                );
                // Undo the storage write so nothing half-booked survives.
                self.reservations.cancel(&reservation.id).await?;
                Err(ExecutionError::CalendarSync(calendar_error))
            }
        }
    }

    async fn update(
        &self,
        pending: &PendingAction,
        correlation_id: &str,
    ) -> Result<Reservation, ExecutionError> {
        let target = pending.draft.target
            .ok_or(ExecutionError::IncompleteDraft { missing: vec!["target"] })?;
        let prior = self
            .reservations
            .get(&target)
            .await?
            .ok_or_else(|| ExecutionError::NotFound(target))?;

        let changed = pending.draft.changed_fields();
        let updated = self.reservations.update(&target, &changed).await?;

        let Some(event_id) = updated.calendar_event_id.clone() else {
            return Ok(updated);
        };
        match self.calendar.update_event(&event_id, &updated).await {
            Ok(()) => Ok(updated),
            Err(calendar_error) => {
                tracing::warn!(
                    event_name = "executor.update_rolled_back",
                    correlation_id,
                    reservation_id = target.0,
                    error = %calendar_error,
                );
                self.reservations.update(&target, &prior_values(&prior, &changed)).await?;
                Err(ExecutionError::CalendarSync(calendar_error))
            }
        }
    }

    async fn cancel(
        &self,
        pending: &PendingAction,
        correlation_id: &str,
    ) -> Result<Reservation, ExecutionError> {
        let target = pending.draft.target
            .ok_or(ExecutionError::IncompleteDraft { missing: vec!["target"] })?;
        let current = self
            .reservations
            .get(&target)
            .await?
            .ok_or_else(|| ExecutionError::NotFound(target))?;

        // Cancelling an already-cancelled reservation is a no-op success.
        if current.status == casona_core::domain::reservation::ReservationStatus::Cancelled {
            return Ok(current);
        }

        let cancelled = self.reservations.cancel(&target).await?;

        if let Some(event_id) = cancelled.calendar_event_id.clone() {
            // A cancellation is never resurrected over a calendar hiccup;
            // the orphaned event is cleaned up out of band.
            if let Err(calendar_error) = self.calendar.delete_event(&event_id).await {
                tracing::warn!(
                    event_name = "executor.calendar_delete_failed",
                    correlation_id,
                    reservation_id = target.0,
                    error = %calendar_error,
                );
            } else {
                self.reservations.link_calendar_event(&target, None).await?;
            }
        }

        Ok(cancelled)
    }

    fn record(
        &self,
        pending: &PendingAction,
        correlation_id: &str,
        outcome: AuditOutcome,
        reservation: Option<&Reservation>,
    ) {
        self.audit.emit(AuditEvent::new(
            Some(pending.customer_id.clone()),
            reservation.map(|r| r.id),
            correlation_id,
            format!("execution.{}", pending.kind.as_str()),
            AuditCategory::Execution,
            "executor",
            outcome,
        ));
    }
}

/// The prior values of exactly the fields an update touched, for compensation.
fn prior_values(prior: &Reservation, changed: &ReservationFields) -> ReservationFields {
    ReservationFields {
        date: changed.date.map(|_| prior.date),
        time: changed.time.map(|_| prior.time),
        party_size: changed.party_size.map(|_| prior.party_size),
        table: changed.table.as_ref().map(|_| prior.table.clone().unwrap_or_default()),
        notes: changed.notes.as_ref().map(|_| prior.notes.clone().unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, NaiveTime, Utc};

    use casona_core::audit::InMemoryAuditSink;
    use casona_core::domain::customer::CustomerId;
    use casona_core::domain::pending::{ActionKind, PendingAction, ReservationDraft};
    use casona_core::domain::reservation::{Reservation, ReservationId, ReservationStatus};
    use casona_core::stores::{
        CalendarAdapter, CalendarError, InMemoryCalendarAdapter, InMemoryReservationStore,
        ReservationStore,
    };

    use super::{ExecutionError, ToolExecutor};

    fn draft() -> ReservationDraft {
        ReservationDraft {
            date: NaiveDate::from_ymd_opt(2025, 6, 13),
            time: NaiveTime::from_hms_opt(20, 0, 0),
            party_size: Some(4),
            target: None,
            table: None,
            notes: None,
        }
    }

    fn confirmed(kind: ActionKind, draft: ReservationDraft) -> PendingAction {
        let mut pending = PendingAction::open(
            CustomerId("5215512345678".to_string()),
            kind,
            draft,
            Utc::now(),
            Duration::minutes(15),
        );
        assert!(pending.token.is_some(), "draft should promote to confirmation");
        pending
    }

    fn executor() -> (ToolExecutor, Arc<InMemoryReservationStore>, Arc<InMemoryCalendarAdapter>) {
        let store = Arc::new(InMemoryReservationStore::default());
        let calendar = Arc::new(InMemoryCalendarAdapter::default());
        let executor = ToolExecutor::new(
            store.clone(),
            calendar.clone(),
            Arc::new(InMemoryAuditSink::default()),
        );
        (executor, store, calendar)
    }

    #[tokio::test]
    async fn create_commits_storage_then_calendar() {
        let (executor, store, calendar) = executor();
        let pending = confirmed(ActionKind::Create, draft());

        let outcome = executor.execute(&pending, "corr-1").await.expect("create should succeed");
        assert!(!outcome.replayed);
        assert_eq!(outcome.reservation.status, ReservationStatus::Confirmed);
        assert!(outcome.reservation.calendar_event_id.is_some());

        let stored = store
            .get(&outcome.reservation.id)
            .await
            .expect("store reachable")
            .expect("reservation persisted");
        assert_eq!(stored.calendar_event_id, outcome.reservation.calendar_event_id);
        assert_eq!(calendar.event_count().await, 1);
    }

    #[tokio::test]
    async fn repeated_token_replays_without_a_second_booking() {
        let (executor, store, _) = executor();
        let pending = confirmed(ActionKind::Create, draft());

        let first = executor.execute(&pending, "corr-1").await.expect("first execution");
        let second = executor.execute(&pending, "corr-2").await.expect("replay");

        assert!(second.replayed);
        assert_eq!(first.reservation.id, second.reservation.id);
        let listed = store.get(&first.reservation.id).await.expect("store reachable");
        assert!(listed.is_some());
    }

    #[tokio::test]
    async fn replay_records_expire_with_the_retention_window() {
        let store = Arc::new(InMemoryReservationStore::default());
        let executor = ToolExecutor::new(
            store.clone(),
            Arc::new(InMemoryCalendarAdapter::default()),
            Arc::new(InMemoryAuditSink::default()),
        )
        .with_replay_retention(Duration::zero());
        let pending = confirmed(ActionKind::Create, draft());

        let first = executor.execute(&pending, "corr-1").await.expect("first execution");
        let second = executor.execute(&pending, "corr-2").await.expect("second execution");

        assert!(!second.replayed, "an aged-out record must not replay");
        assert_ne!(first.reservation.id, second.reservation.id);
    }

    struct FailingCalendar;

    #[async_trait::async_trait]
    impl CalendarAdapter for FailingCalendar {
        async fn create_event(&self, _reservation: &Reservation) -> Result<String, CalendarError> {
            Err(CalendarError::Transport("connection reset".to_string()))
        }
        async fn update_event(
            &self,
            _event_id: &str,
            _reservation: &Reservation,
        ) -> Result<(), CalendarError> {
            Err(CalendarError::Transport("connection reset".to_string()))
        }
        async fn delete_event(&self, _event_id: &str) -> Result<(), CalendarError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn calendar_failure_rolls_the_create_back() {
        let store = Arc::new(InMemoryReservationStore::default());
        let executor = ToolExecutor::new(
            store.clone(),
            Arc::new(FailingCalendar),
            Arc::new(InMemoryAuditSink::default()),
        );
        let pending = confirmed(ActionKind::Create, draft());

        let error = executor.execute(&pending, "corr-1").await.expect_err("calendar is down");
        assert!(matches!(error, ExecutionError::CalendarSync(_)));
        assert!(error.keeps_pending());

        let reservation = store.get(&ReservationId(1)).await.expect("store reachable");
        assert_eq!(
            reservation.map(|r| r.status),
            Some(ReservationStatus::Cancelled),
            "the half-booked reservation must not stay confirmed"
        );
    }

    #[tokio::test]
    async fn cancel_is_idempotent_for_already_cancelled_reservations() {
        let (executor, store, _) = executor();
        let created = executor
            .execute(&confirmed(ActionKind::Create, draft()), "corr-1")
            .await
            .expect("create");
        store.cancel(&created.reservation.id).await.expect("cancel directly");

        let mut cancel_draft = ReservationDraft::default();
        cancel_draft.target = Some(created.reservation.id);
        let outcome = executor
            .execute(&confirmed(ActionKind::Cancel, cancel_draft), "corr-2")
            .await
            .expect("second cancel is a no-op");
        assert_eq!(outcome.reservation.status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_an_unknown_reservation_reports_not_found() {
        let (executor, _, _) = executor();
        let mut cancel_draft = ReservationDraft::default();
        cancel_draft.target = Some(ReservationId(404));

        let error = executor
            .execute(&confirmed(ActionKind::Cancel, cancel_draft), "corr-1")
            .await
            .expect_err("nothing to cancel");
        assert!(matches!(error, ExecutionError::NotFound(ReservationId(404))));
        assert!(!error.keeps_pending());
    }

    #[tokio::test]
    async fn update_rolls_back_when_the_calendar_rejects() {
        let store = Arc::new(InMemoryReservationStore::default());
        let good_calendar = Arc::new(InMemoryCalendarAdapter::default());
        let creator = ToolExecutor::new(
            store.clone(),
            good_calendar,
            Arc::new(InMemoryAuditSink::default()),
        );
        let created = creator
            .execute(&confirmed(ActionKind::Create, draft()), "corr-1")
            .await
            .expect("create");

        let executor = ToolExecutor::new(
            store.clone(),
            Arc::new(FailingCalendar),
            Arc::new(InMemoryAuditSink::default()),
        );
        let mut update_draft = ReservationDraft::default();
        update_draft.target = Some(created.reservation.id);
        update_draft.party_size = Some(8);

        let error = executor
            .execute(&confirmed(ActionKind::Update, update_draft), "corr-2")
            .await
            .expect_err("calendar is down");
        assert!(matches!(error, ExecutionError::CalendarSync(_)));

        let current = store
            .get(&created.reservation.id)
            .await
            .expect("store reachable")
            .expect("reservation exists");
        assert_eq!(current.party_size, 4, "the storage write was compensated");
    }
}

//! Contracts the orchestrator and executor depend on: reservation storage,
//! the mirrored calendar, and the per-customer conversation session.
//!
//! Production implementations live in `casona-db`; the in-memory variants
//! here back tests and single-process deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::customer::CustomerId;
use crate::domain::pending::{PendingAction, ReservationDraft};
use crate::domain::reservation::{
    Reservation, ReservationFields, ReservationId, ReservationStatus,
};
use crate::domain::session::{HandoffState, SessionHistory, SessionTurn};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("reservation {0} not found")]
    NotFound(ReservationId),
    #[error("booking conflict: {0}")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    /// Transient transport problem; a retry may succeed.
    #[error("calendar transport failure: {0}")]
    Transport(String),
    /// The calendar rejected the event outright; retrying is pointless.
    #[error("calendar rejected event: {0}")]
    Rejected(String),
}

impl CalendarError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session load failed: {0}")]
    Load(String),
    #[error("session write failed: {0}")]
    Write(String),
}

/// Persistent reservation CRUD. Every mutation in the system funnels through
/// the tool executor and lands here.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn create(
        &self,
        customer_id: &CustomerId,
        draft: &ReservationDraft,
    ) -> Result<Reservation, StoreError>;

    async fn update(
        &self,
        id: &ReservationId,
        fields: &ReservationFields,
    ) -> Result<Reservation, StoreError>;

    async fn cancel(&self, id: &ReservationId) -> Result<Reservation, StoreError>;

    async fn get(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// Records (or clears) the mirrored calendar event id.
    async fn link_calendar_event(
        &self,
        id: &ReservationId,
        event_id: Option<&str>,
    ) -> Result<(), StoreError>;
}

/// External calendar mirroring a reservation as an event.
#[async_trait]
pub trait CalendarAdapter: Send + Sync {
    async fn create_event(&self, reservation: &Reservation) -> Result<String, CalendarError>;
    async fn update_event(
        &self,
        event_id: &str,
        reservation: &Reservation,
    ) -> Result<(), CalendarError>;
    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError>;
}

/// Everything the orchestrator needs about a customer at the start of a
/// turn: the conversation so far, the single pending-action slot, and who
/// currently answers the thread.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSnapshot {
    pub history: SessionHistory,
    pub pending: Option<PendingAction>,
    pub handoff: HandoffState,
}

impl SessionSnapshot {
    pub fn empty(customer_id: CustomerId) -> Self {
        Self {
            history: SessionHistory::empty(customer_id),
            pending: None,
            handoff: HandoffState::default(),
        }
    }
}

/// Per-customer conversation state: append-only history, the single
/// pending-action slot, and the human-handoff flag.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append(&self, customer_id: &CustomerId, turn: SessionTurn)
        -> Result<(), SessionError>;

    async fn load(&self, customer_id: &CustomerId) -> Result<SessionSnapshot, SessionError>;

    async fn save_pending(
        &self,
        customer_id: &CustomerId,
        pending: Option<PendingAction>,
    ) -> Result<(), SessionError>;

    /// Staff hand a thread back by writing `BotActive` here.
    async fn save_handoff(
        &self,
        customer_id: &CustomerId,
        handoff: HandoffState,
    ) -> Result<(), SessionError>;
}

/// In-memory reservation store with a fixed number of tables per time slot.
/// A create or move into a full slot surfaces `StoreError::Conflict`.
pub struct InMemoryReservationStore {
    reservations: RwLock<HashMap<i64, Reservation>>,
    next_id: AtomicI64,
    tables_per_slot: usize,
}

impl Default for InMemoryReservationStore {
    fn default() -> Self {
        Self::with_tables_per_slot(10)
    }
}

impl InMemoryReservationStore {
    pub fn with_tables_per_slot(tables_per_slot: usize) -> Self {
        Self {
            reservations: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            tables_per_slot,
        }
    }

    fn slot_is_full(
        reservations: &HashMap<i64, Reservation>,
        date: chrono::NaiveDate,
        time: chrono::NaiveTime,
        tables_per_slot: usize,
        exclude: Option<ReservationId>,
    ) -> bool {
        let occupied = reservations
            .values()
            .filter(|r| r.status != ReservationStatus::Cancelled)
            .filter(|r| r.date == date && r.time == time)
            .filter(|r| Some(r.id) != exclude)
            .count();
        occupied >= tables_per_slot
    }
}

#[async_trait]
impl ReservationStore for InMemoryReservationStore {
    async fn create(
        &self,
        customer_id: &CustomerId,
        draft: &ReservationDraft,
    ) -> Result<Reservation, StoreError> {
        let (Some(date), Some(time), Some(party_size)) =
            (draft.date, draft.time, draft.party_size)
        else {
            return Err(StoreError::Unavailable("incomplete draft reached the store".to_string()));
        };

        let mut reservations = self.reservations.write().await;
        if Self::slot_is_full(&reservations, date, time, self.tables_per_slot, None) {
            return Err(StoreError::Conflict(format!("no tables left for {date} {time}")));
        }

        let now = Utc::now();
        let id = ReservationId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let reservation = Reservation {
            id,
            customer_id: customer_id.clone(),
            date,
            time,
            party_size,
            status: ReservationStatus::Confirmed,
            table: draft.table.clone(),
            notes: draft.notes.clone(),
            calendar_event_id: None,
            created_at: now,
            updated_at: now,
        };
        reservations.insert(id.0, reservation.clone());
        Ok(reservation)
    }

    async fn update(
        &self,
        id: &ReservationId,
        fields: &ReservationFields,
    ) -> Result<Reservation, StoreError> {
        let mut reservations = self.reservations.write().await;

        let current = reservations.get(&id.0).cloned().ok_or(StoreError::NotFound(*id))?;
        let date = fields.date.unwrap_or(current.date);
        let time = fields.time.unwrap_or(current.time);
        let moved = date != current.date || time != current.time;
        if moved && Self::slot_is_full(&reservations, date, time, self.tables_per_slot, Some(*id))
        {
            return Err(StoreError::Conflict(format!("no tables left for {date} {time}")));
        }

        let reservation = reservations.get_mut(&id.0).ok_or(StoreError::NotFound(*id))?;
        reservation.apply_fields(fields);
        reservation.updated_at = Utc::now();
        Ok(reservation.clone())
    }

    async fn cancel(&self, id: &ReservationId) -> Result<Reservation, StoreError> {
        let mut reservations = self.reservations.write().await;
        let reservation = reservations.get_mut(&id.0).ok_or(StoreError::NotFound(*id))?;
        reservation.status = ReservationStatus::Cancelled;
        reservation.updated_at = Utc::now();
        Ok(reservation.clone())
    }

    async fn get(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError> {
        let reservations = self.reservations.read().await;
        Ok(reservations.get(&id.0).cloned())
    }

    async fn link_calendar_event(
        &self,
        id: &ReservationId,
        event_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut reservations = self.reservations.write().await;
        let reservation = reservations.get_mut(&id.0).ok_or(StoreError::NotFound(*id))?;
        reservation.calendar_event_id = event_id.map(str::to_string);
        reservation.updated_at = Utc::now();
        Ok(())
    }
}

/// In-memory calendar: events keyed by a minted id.
#[derive(Default)]
pub struct InMemoryCalendarAdapter {
    events: RwLock<HashMap<String, Reservation>>,
}

impl InMemoryCalendarAdapter {
    pub async fn event(&self, event_id: &str) -> Option<Reservation> {
        self.events.read().await.get(event_id).cloned()
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl CalendarAdapter for InMemoryCalendarAdapter {
    async fn create_event(&self, reservation: &Reservation) -> Result<String, CalendarError> {
        let event_id = Uuid::new_v4().to_string();
        self.events.write().await.insert(event_id.clone(), reservation.clone());
        Ok(event_id)
    }

    async fn update_event(
        &self,
        event_id: &str,
        reservation: &Reservation,
    ) -> Result<(), CalendarError> {
        let mut events = self.events.write().await;
        match events.get_mut(event_id) {
            Some(stored) => {
                *stored = reservation.clone();
                Ok(())
            }
            None => Err(CalendarError::Rejected(format!("unknown event {event_id}"))),
        }
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        self.events.write().await.remove(event_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionSnapshot>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn append(
        &self,
        customer_id: &CustomerId,
        turn: SessionTurn,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(customer_id.0.clone())
            .or_insert_with(|| SessionSnapshot::empty(customer_id.clone()));
        entry.history.append(turn);
        Ok(())
    }

    async fn load(&self, customer_id: &CustomerId) -> Result<SessionSnapshot, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&customer_id.0)
            .cloned()
            .unwrap_or_else(|| SessionSnapshot::empty(customer_id.clone())))
    }

    async fn save_pending(
        &self,
        customer_id: &CustomerId,
        pending: Option<PendingAction>,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(customer_id.0.clone())
            .or_insert_with(|| SessionSnapshot::empty(customer_id.clone()));
        entry.pending = pending;
        Ok(())
    }

    async fn save_handoff(
        &self,
        customer_id: &CustomerId,
        handoff: HandoffState,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(customer_id.0.clone())
            .or_insert_with(|| SessionSnapshot::empty(customer_id.clone()));
        entry.handoff = handoff;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};

    use crate::domain::customer::CustomerId;
    use crate::domain::pending::{ActionKind, PendingAction, ReservationDraft};
    use crate::domain::reservation::{ReservationFields, ReservationId, ReservationStatus};
    use crate::domain::session::{HandoffState, SessionTurn};

    use super::{
        CalendarAdapter, CalendarError, InMemoryCalendarAdapter, InMemoryReservationStore,
        InMemorySessionStore, ReservationStore, SessionStore, StoreError,
    };

    fn full_draft() -> ReservationDraft {
        ReservationDraft {
            date: NaiveDate::from_ymd_opt(2025, 6, 13),
            time: NaiveTime::from_hms_opt(20, 0, 0),
            party_size: Some(4),
            ..ReservationDraft::default()
        }
    }

    #[tokio::test]
    async fn create_get_update_cancel_round_trip() {
        let store = InMemoryReservationStore::default();
        let customer = CustomerId("1".to_string());

        let created = store.create(&customer, &full_draft()).await.expect("create");
        assert_eq!(created.status, ReservationStatus::Confirmed);

        let updated = store
            .update(
                &created.id,
                &ReservationFields { party_size: Some(6), ..ReservationFields::default() },
            )
            .await
            .expect("update");
        assert_eq!(updated.party_size, 6);

        let cancelled = store.cancel(&created.id).await.expect("cancel");
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);

        let found = store.get(&created.id).await.expect("get");
        assert_eq!(found.map(|r| r.status), Some(ReservationStatus::Cancelled));
    }

    #[tokio::test]
    async fn full_slot_surfaces_conflict() {
        let store = InMemoryReservationStore::with_tables_per_slot(1);
        let customer = CustomerId("1".to_string());

        store.create(&customer, &full_draft()).await.expect("first booking");
        let error = store
            .create(&CustomerId("2".to_string()), &full_draft())
            .await
            .expect_err("slot should be full");
        assert!(matches!(error, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn cancelled_reservations_free_their_slot() {
        let store = InMemoryReservationStore::with_tables_per_slot(1);
        let customer = CustomerId("1".to_string());

        let first = store.create(&customer, &full_draft()).await.expect("first booking");
        store.cancel(&first.id).await.expect("cancel");

        store
            .create(&CustomerId("2".to_string()), &full_draft())
            .await
            .expect("slot freed by cancellation");
    }

    #[tokio::test]
    async fn missing_reservation_is_not_found() {
        let store = InMemoryReservationStore::default();
        let error = store
            .update(&ReservationId(999), &ReservationFields::default())
            .await
            .expect_err("unknown id");
        assert_eq!(error, StoreError::NotFound(ReservationId(999)));
    }

    #[tokio::test]
    async fn calendar_round_trip_and_unknown_event_rejection() {
        let calendar = InMemoryCalendarAdapter::default();
        let store = InMemoryReservationStore::default();
        let reservation = store
            .create(&CustomerId("1".to_string()), &full_draft())
            .await
            .expect("create");

        let event_id = calendar.create_event(&reservation).await.expect("event");
        assert!(calendar.event(&event_id).await.is_some());

        calendar.delete_event(&event_id).await.expect("delete");
        assert_eq!(calendar.event_count().await, 0);

        let error =
            calendar.update_event("missing", &reservation).await.expect_err("unknown event");
        assert!(matches!(error, CalendarError::Rejected(_)));
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn session_store_keeps_history_and_pending_separate() {
        let sessions = InMemorySessionStore::default();
        let customer = CustomerId("1".to_string());

        sessions.append(&customer, SessionTurn::user("hola", Utc::now())).await.expect("append");
        let pending = PendingAction::open(
            customer.clone(),
            ActionKind::Create,
            full_draft(),
            Utc::now(),
            chrono::Duration::minutes(15),
        );
        sessions.save_pending(&customer, Some(pending.clone())).await.expect("save pending");

        let snapshot = sessions.load(&customer).await.expect("load");
        assert_eq!(snapshot.history.turns.len(), 1);
        assert_eq!(snapshot.pending, Some(pending));

        sessions.save_pending(&customer, None).await.expect("clear pending");
        let snapshot = sessions.load(&customer).await.expect("reload");
        assert_eq!(snapshot.history.turns.len(), 1, "clearing pending must not touch history");
        assert!(snapshot.pending.is_none());
    }

    #[tokio::test]
    async fn handoff_state_persists_and_leaves_the_rest_alone() {
        let sessions = InMemorySessionStore::default();
        let customer = CustomerId("1".to_string());

        let snapshot = sessions.load(&customer).await.expect("load");
        assert_eq!(snapshot.handoff, HandoffState::BotActive);

        sessions.append(&customer, SessionTurn::user("hola", Utc::now())).await.expect("append");
        sessions
            .save_handoff(&customer, HandoffState::AwaitingConsent)
            .await
            .expect("save handoff");
        sessions
            .save_handoff(&customer, HandoffState::HumanActive)
            .await
            .expect("advance handoff");

        let snapshot = sessions.load(&customer).await.expect("reload");
        assert_eq!(snapshot.handoff, HandoffState::HumanActive);
        assert_eq!(snapshot.history.turns.len(), 1);
        assert!(snapshot.pending.is_none());
    }
}

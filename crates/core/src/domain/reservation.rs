use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationId(pub i64);

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Partial update applied to an existing reservation. `None` fields are left
/// untouched, which also makes this the natural shape for rollback snapshots.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationFields {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub party_size: Option<u32>,
    pub table: Option<String>,
    pub notes: Option<String>,
}

impl ReservationFields {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.time.is_none()
            && self.party_size.is_none()
            && self.table.is_none()
            && self.notes.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub customer_id: CustomerId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub party_size: u32,
    pub status: ReservationStatus,
    pub table: Option<String>,
    pub notes: Option<String>,
    pub calendar_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        matches!(
            (self.status, next),
            (ReservationStatus::Pending, ReservationStatus::Confirmed)
                | (ReservationStatus::Pending, ReservationStatus::Cancelled)
                | (ReservationStatus::Confirmed, ReservationStatus::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: ReservationStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidReservationTransition { from: self.status, to: next })
    }

    /// Applies a partial update, returning the prior values of every field
    /// that changed so the caller can undo the mutation later.
    pub fn apply_fields(&mut self, fields: &ReservationFields) -> ReservationFields {
        let mut prior = ReservationFields::default();
        if let Some(date) = fields.date {
            prior.date = Some(self.date);
            self.date = date;
        }
        if let Some(time) = fields.time {
            prior.time = Some(self.time);
            self.time = time;
        }
        if let Some(party_size) = fields.party_size {
            prior.party_size = Some(self.party_size);
            self.party_size = party_size;
        }
        if let Some(table) = &fields.table {
            prior.table = self.table.clone();
            self.table = Some(table.clone());
        }
        if let Some(notes) = &fields.notes {
            prior.notes = self.notes.clone();
            self.notes = Some(notes.clone());
        }
        prior
    }
}

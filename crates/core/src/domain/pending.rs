use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::customer::CustomerId;
use crate::domain::reservation::{ReservationFields, ReservationId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Create,
    Update,
    Cancel,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Cancel => "cancel",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// One-shot confirmation token minted when a pending action becomes
/// confirmable. The executor records spent tokens, so a retried "sí"
/// replays the previous result instead of mutating twice.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionToken(pub String);

impl ActionToken {
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Slots collected incrementally across turns. Later values for the same
/// slot overwrite earlier ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReservationDraft {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub party_size: Option<u32>,
    pub target: Option<ReservationId>,
    pub table: Option<String>,
    pub notes: Option<String>,
}

impl ReservationDraft {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Last-write-wins merge: every filled slot of `newer` replaces the
    /// current value; empty slots leave existing values alone.
    pub fn merge(&mut self, newer: &ReservationDraft) {
        if newer.date.is_some() {
            self.date = newer.date;
        }
        if newer.time.is_some() {
            self.time = newer.time;
        }
        if newer.party_size.is_some() {
            self.party_size = newer.party_size;
        }
        if newer.target.is_some() {
            self.target = newer.target;
        }
        if newer.table.is_some() {
            self.table = newer.table.clone();
        }
        if newer.notes.is_some() {
            self.notes = newer.notes.clone();
        }
    }

    /// Slot names still required before the given action kind can be
    /// confirmed. Empty means the draft is complete.
    pub fn missing_slots(&self, kind: ActionKind) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match kind {
            ActionKind::Create => {
                if self.date.is_none() {
                    missing.push("date");
                }
                if self.time.is_none() {
                    missing.push("time");
                }
                if self.party_size.is_none() {
                    missing.push("party_size");
                }
            }
            ActionKind::Update => {
                if self.target.is_none() {
                    missing.push("target");
                }
                if self.changed_fields().is_empty() {
                    missing.push("changed_field");
                }
            }
            ActionKind::Cancel => {
                if self.target.is_none() {
                    missing.push("target");
                }
            }
        }
        missing
    }

    pub fn is_complete(&self, kind: ActionKind) -> bool {
        self.missing_slots(kind).is_empty()
    }

    /// The update patch this draft describes (target excluded).
    pub fn changed_fields(&self) -> ReservationFields {
        ReservationFields {
            date: self.date,
            time: self.time,
            party_size: self.party_size,
            table: self.table.clone(),
            notes: self.notes.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPhase {
    Collecting,
    AwaitingConfirmation,
}

impl PendingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::AwaitingConfirmation => "awaiting_confirmation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "collecting" => Some(Self::Collecting),
            "awaiting_confirmation" => Some(Self::AwaitingConfirmation),
            _ => None,
        }
    }
}

/// The single in-flight reservation mutation for a customer. At most one of
/// these exists per customer at any time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub customer_id: CustomerId,
    pub kind: ActionKind,
    pub draft: ReservationDraft,
    pub phase: PendingPhase,
    /// Present only while awaiting confirmation; re-minted on amendment.
    pub token: Option<ActionToken>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn open(
        customer_id: CustomerId,
        kind: ActionKind,
        draft: ReservationDraft,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let mut action = Self {
            customer_id,
            kind,
            draft,
            phase: PendingPhase::Collecting,
            token: None,
            created_at: now,
            expires_at: now + ttl,
        };
        action.promote_if_complete();
        action
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Slides the inactivity window on every turn that touches the action.
    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.expires_at = now + ttl;
    }

    /// Merges new slot values, dropping back to `Collecting` first so an
    /// amendment always invalidates the previously minted token.
    pub fn amend(&mut self, newer: &ReservationDraft) {
        self.draft.merge(newer);
        self.phase = PendingPhase::Collecting;
        self.token = None;
        self.promote_if_complete();
    }

    /// Promotes to `AwaitingConfirmation` once required slots are present,
    /// minting a fresh confirmation token. Returns true if a promotion
    /// happened on this call.
    pub fn promote_if_complete(&mut self) -> bool {
        if self.phase == PendingPhase::Collecting && self.draft.is_complete(self.kind) {
            self.phase = PendingPhase::AwaitingConfirmation;
            self.token = Some(ActionToken::mint());
            return true;
        }
        false
    }

    pub fn missing_slots(&self) -> Vec<&'static str> {
        self.draft.missing_slots(self.kind)
    }
}

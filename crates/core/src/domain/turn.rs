use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::pending::{ActionKind, PendingAction, ReservationDraft};
use crate::domain::reservation::Reservation;

/// The classified intent label for a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    SmallTalk,
    MenuQuery,
    CreateReservation,
    UpdateReservation,
    CancelReservation,
    EscalateToHuman,
    ConfirmPending,
    DeclinePending,
    AmendPending,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SmallTalk => "small_talk",
            Self::MenuQuery => "menu_query",
            Self::CreateReservation => "create_reservation",
            Self::UpdateReservation => "update_reservation",
            Self::CancelReservation => "cancel_reservation",
            Self::EscalateToHuman => "escalate_to_human",
            Self::ConfirmPending => "confirm_pending",
            Self::DeclinePending => "decline_pending",
            Self::AmendPending => "amend_pending",
        }
    }

    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateReservation | Self::UpdateReservation | Self::CancelReservation
        )
    }
}

/// Optional caller-supplied identity hints. Used only to pre-fill empty
/// draft slots, never to skip confirmation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// One inbound message as handed over by the transport layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub customer_id: CustomerId,
    pub text: String,
    pub metadata: UserMetadata,
}

impl InboundMessage {
    pub fn new(customer_id: CustomerId, text: impl Into<String>) -> Self {
        Self { customer_id, text: text.into(), metadata: UserMetadata::default() }
    }

    /// Builds the message from a raw channel address (e.g. a WhatsApp
    /// sender), deriving the customer identity from its digits.
    pub fn from_channel(address: &str, text: impl Into<String>) -> Self {
        Self::new(CustomerId::from_channel(address), text)
    }
}

/// Snapshot echoed back to the caller: either the in-flight draft or the
/// reservation a successful execution produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReservationData {
    Draft(ReservationDraft),
    Committed(Reservation),
}

/// Structured outcome of one turn. Ephemeral; only the session history and
/// pending action survive past the response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    /// Empty while a human owns the thread; the transport sends nothing.
    pub reply: String,
    pub route: Route,
    pub pending_reservation: bool,
    pub pending_update: bool,
    pub pending_cancel: bool,
    /// True once the customer consented to a human taking over.
    pub human_handoff: bool,
    pub reservation_data: Option<ReservationData>,
}

impl TurnResult {
    /// Derives the three pending flags from the post-turn pending state.
    /// A single pending slot backs all three; they are views, not
    /// independent state.
    pub fn flags_from(pending: Option<&PendingAction>) -> (bool, bool, bool) {
        match pending.map(|action| action.kind) {
            Some(ActionKind::Create) => (true, false, false),
            Some(ActionKind::Update) => (false, true, false),
            Some(ActionKind::Cancel) => (false, false, true),
            None => (false, false, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::customer::CustomerId;
    use crate::domain::pending::{ActionKind, PendingAction, ReservationDraft};

    use super::{InboundMessage, Route, TurnResult};

    #[test]
    fn channel_constructor_digit_filters_the_sender() {
        let message = InboundMessage::from_channel("whatsapp:+521-5512345678", "hola");
        assert_eq!(message.customer_id, CustomerId("5215512345678".to_string()));
    }

    #[test]
    fn pending_flags_are_views_over_the_single_slot() {
        assert_eq!(TurnResult::flags_from(None), (false, false, false));

        for (kind, expected) in [
            (ActionKind::Create, (true, false, false)),
            (ActionKind::Update, (false, true, false)),
            (ActionKind::Cancel, (false, false, true)),
        ] {
            let action = PendingAction::open(
                CustomerId("1".to_string()),
                kind,
                ReservationDraft::default(),
                Utc::now(),
                Duration::minutes(15),
            );
            assert_eq!(TurnResult::flags_from(Some(&action)), expected);
        }
    }

    #[test]
    fn only_reservation_routes_count_as_mutations() {
        assert!(Route::CreateReservation.is_mutation());
        assert!(Route::CancelReservation.is_mutation());
        assert!(!Route::SmallTalk.is_mutation());
        assert!(!Route::EscalateToHuman.is_mutation());
    }
}

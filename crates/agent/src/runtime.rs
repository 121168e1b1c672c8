//! The orchestrator: one entry point per inbound message, walking the same
//! constrained loop every time. Routing is advisory; the pending-action
//! tracker and the guardrails decide what actually happens, and only the
//! executor touches storage.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use casona_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use casona_core::config::AppConfig;
use casona_core::domain::customer::CustomerId;
use casona_core::domain::pending::{ActionKind, PendingAction, PendingPhase, ReservationDraft};
use casona_core::domain::reservation::Reservation;
use casona_core::domain::session::{HandoffState, SessionTurn};
use casona_core::domain::turn::{InboundMessage, ReservationData, Route, TurnResult, UserMetadata};
use casona_core::errors::{ApplicationError, DomainError};
use casona_core::flows::{
    ReservationTracker, TrackerAction, TrackerContext, TrackerEngine, TrackerEvent, TrackerState,
    TransitionOutcome,
};
use casona_core::stores::{CalendarAdapter, ReservationStore, SessionStore};

use crate::classifier::{Classifier, TurnContext};
use crate::conversation::{is_affirmation, is_decline, normalize_text};
use crate::executor::{ExecutionError, ToolExecutor};
use crate::guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};
use crate::session::TurnLocks;

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub pending_ttl: Duration,
    /// Turns of history handed to the classifier each turn.
    pub history_window: usize,
    pub restaurant_name: String,
    pub guardrails: GuardrailPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::minutes(15),
            history_window: 20,
            restaurant_name: "La Casona".to_string(),
            guardrails: GuardrailPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            pending_ttl: Duration::minutes(config.session.pending_ttl_minutes),
            history_window: config.session.history_window,
            restaurant_name: config.restaurant.name.clone(),
            guardrails: GuardrailPolicy::default(),
        }
    }
}

pub struct Orchestrator {
    classifier: Arc<dyn Classifier>,
    executor: ToolExecutor,
    sessions: Arc<dyn SessionStore>,
    audit: Arc<dyn AuditSink>,
    tracker: TrackerEngine<ReservationTracker>,
    locks: TurnLocks,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        reservations: Arc<dyn ReservationStore>,
        calendar: Arc<dyn CalendarAdapter>,
        sessions: Arc<dyn SessionStore>,
        audit: Arc<dyn AuditSink>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            classifier,
            executor: ToolExecutor::new(reservations, calendar, audit.clone()),
            sessions,
            audit,
            tracker: TrackerEngine::default(),
            locks: TurnLocks::new(),
            config,
        }
    }

    /// Processes one customer message end to end. Turns from the same
    /// customer are serialized; the pending-action slot is loaded, expired,
    /// advanced, and saved within the same lock hold.
    pub async fn handle_turn(
        &self,
        message: InboundMessage,
    ) -> Result<TurnResult, ApplicationError> {
        let _turn_guard = self.locks.acquire(&message.customer_id).await;
        let correlation_id = Uuid::new_v4().to_string();
        let now = Utc::now();

        self.audit.emit(AuditEvent::new(
            Some(message.customer_id.clone()),
            None,
            correlation_id.clone(),
            "turn.received",
            AuditCategory::Ingress,
            "orchestrator",
            AuditOutcome::Success,
        ));

        let snapshot = self
            .sessions
            .load(&message.customer_id)
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;
        let mut pending = snapshot.pending;

        // A human owns the thread: record the message, answer nothing.
        if snapshot.handoff == HandoffState::HumanActive {
            tracing::info!(
                event_name = "handoff.bot_silent",
                correlation_id,
                customer_id = %message.customer_id,
            );
            self.sessions
                .append(&message.customer_id, SessionTurn::user(message.text.clone(), now))
                .await
                .map_err(|e| ApplicationError::Persistence(e.to_string()))?;
            let (pending_reservation, pending_update, pending_cancel) =
                TurnResult::flags_from(pending.as_ref());
            return Ok(TurnResult {
                reply: String::new(),
                route: Route::EscalateToHuman,
                pending_reservation,
                pending_update,
                pending_cancel,
                human_handoff: true,
                reservation_data: None,
            });
        }

        // A consent question is out; this message answers it.
        if snapshot.handoff == HandoffState::AwaitingConsent {
            return self.answer_handoff_consent(&message, &correlation_id, pending, now).await;
        }

        // Expiry is decided before routing; a stale draft never influences
        // how the new message is interpreted.
        let mut expired_notice = false;
        if let Some(action) = &pending {
            if action.is_expired(now) {
                self.apply_tracker(
                    &message.customer_id,
                    &correlation_id,
                    &tracker_state(pending.as_ref()),
                    &TrackerEvent::Expired,
                    TrackerContext::default(),
                )?;
                pending = None;
                expired_notice = true;
            }
        }

        let context = TurnContext {
            awaiting_confirmation: matches!(
                pending.as_ref().map(|p| &p.phase),
                Some(PendingPhase::AwaitingConfirmation)
            ),
            has_pending: pending.is_some(),
            today: now.date_naive(),
            recent_turns: snapshot.history.recent(self.config.history_window).to_vec(),
        };
        let decision = self.classifier.classify(&message.text, &context).await;

        tracing::info!(
            event_name = "turn.routed",
            correlation_id,
            customer_id = %message.customer_id,
            route = decision.route.as_str(),
            mutation = decision.route.is_mutation(),
            confidence = decision.confidence_score,
        );

        let (route, degrade_reply) = match self.config.guardrails.evaluate(
            &GuardrailIntent::LowConfidenceRoute {
                route: decision.route,
                confidence_score: decision.confidence_score,
            },
        ) {
            GuardrailDecision::Degrade { user_message, .. } => {
                (Route::EscalateToHuman, Some(user_message))
            }
            _ => (decision.route, None),
        };

        let mut executed: Option<Reservation> = None;
        let mut reply = match route {
            Route::SmallTalk => self.small_talk_reply(pending.as_ref()),
            Route::MenuQuery => format!(
                "Nuestro menú cambia por temporada; hoy tenemos cocina mexicana \
                 tradicional. ¿Te gustaría reservar una mesa en {}?",
                self.config.restaurant_name
            ),
            Route::EscalateToHuman => match degrade_reply {
                Some(reply) => reply,
                None => {
                    // An explicit request gets a consent question first; the
                    // handoff starts only once the customer says yes.
                    self.sessions
                        .save_handoff(&message.customer_id, HandoffState::AwaitingConsent)
                        .await
                        .map_err(|e| ApplicationError::Persistence(e.to_string()))?;
                    self.audit.emit(AuditEvent::new(
                        Some(message.customer_id.clone()),
                        None,
                        correlation_id.clone(),
                        "handoff.requested",
                        AuditCategory::Routing,
                        "orchestrator",
                        AuditOutcome::Success,
                    ));
                    "¿Estás seguro de que deseas hablar con una persona del equipo? (sí/no)"
                        .to_string()
                }
            },
            Route::CreateReservation => self.capture_slots(
                &message,
                &correlation_id,
                &mut pending,
                ActionKind::Create,
                &decision.slots_draft(),
                now,
            )?,
            Route::UpdateReservation => self.capture_slots(
                &message,
                &correlation_id,
                &mut pending,
                ActionKind::Update,
                &decision.slots_draft(),
                now,
            )?,
            Route::CancelReservation => self.capture_slots(
                &message,
                &correlation_id,
                &mut pending,
                ActionKind::Cancel,
                &decision.slots_draft(),
                now,
            )?,
            Route::AmendPending => match pending.as_ref().map(|p| p.kind) {
                Some(kind) => self.capture_slots(
                    &message,
                    &correlation_id,
                    &mut pending,
                    kind,
                    &decision.slots_draft(),
                    now,
                )?,
                None => self.capture_slots(
                    &message,
                    &correlation_id,
                    &mut pending,
                    ActionKind::Create,
                    &decision.slots_draft(),
                    now,
                )?,
            },
            Route::ConfirmPending => {
                self.confirm(&message, &correlation_id, &mut pending, &mut executed, now).await?
            }
            Route::DeclinePending => self.decline(&message, &correlation_id, &mut pending)?,
        };

        if expired_notice {
            reply = format!("Tu solicitud anterior expiró, así que empezamos de nuevo. {reply}");
        }

        self.persist_turn(&message, &reply, &pending, now).await?;

        let (pending_reservation, pending_update, pending_cancel) =
            TurnResult::flags_from(pending.as_ref());
        let reservation_data = executed
            .map(ReservationData::Committed)
            .or_else(|| pending.as_ref().map(|p| ReservationData::Draft(p.draft.clone())));

        Ok(TurnResult {
            reply,
            route,
            pending_reservation,
            pending_update,
            pending_cancel,
            human_handoff: false,
            reservation_data,
        })
    }

    /// Resolves the pending yes/no handoff question. Yes silences the bot
    /// until staff hand the thread back; no resumes normal handling; anything
    /// else repeats the question.
    async fn answer_handoff_consent(
        &self,
        message: &InboundMessage,
        correlation_id: &str,
        pending: Option<PendingAction>,
        now: DateTime<Utc>,
    ) -> Result<TurnResult, ApplicationError> {
        let normalized = normalize_text(&message.text);
        let (next, reply) = if is_affirmation(&normalized) {
            self.audit.emit(AuditEvent::new(
                Some(message.customer_id.clone()),
                None,
                correlation_id.to_string(),
                "handoff.entered",
                AuditCategory::Routing,
                "orchestrator",
                AuditOutcome::Success,
            ));
            (
                HandoffState::HumanActive,
                "Listo, te conecto con una persona del equipo. Espera un momento, por favor."
                    .to_string(),
            )
        } else if is_decline(&normalized) {
            (HandoffState::BotActive, "Perfecto. ¿En qué puedo ayudarte?".to_string())
        } else {
            (
                HandoffState::AwaitingConsent,
                "Solo necesito un sí o un no: ¿te conecto con una persona del equipo?".to_string(),
            )
        };

        tracing::info!(
            event_name = "handoff.consent_answered",
            correlation_id,
            customer_id = %message.customer_id,
            state = next.as_str(),
        );
        self.sessions
            .save_handoff(&message.customer_id, next)
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;
        self.persist_turn(message, &reply, &pending, now).await?;

        let (pending_reservation, pending_update, pending_cancel) =
            TurnResult::flags_from(pending.as_ref());
        Ok(TurnResult {
            reply,
            route: Route::EscalateToHuman,
            pending_reservation,
            pending_update,
            pending_cancel,
            human_handoff: next == HandoffState::HumanActive,
            reservation_data: None,
        })
    }

    /// Opens or amends the pending slot with freshly extracted values,
    /// then lets the tracker decide whether to keep collecting or to ask
    /// for confirmation.
    fn capture_slots(
        &self,
        message: &InboundMessage,
        correlation_id: &str,
        pending: &mut Option<PendingAction>,
        kind: ActionKind,
        slots: &ReservationDraft,
        now: DateTime<Utc>,
    ) -> Result<String, ApplicationError> {
        let mut draft = slots.clone();
        prefill_from_metadata(&mut draft, &message.metadata);

        let prior_state = tracker_state(pending.as_ref());
        match pending {
            // Same kind in flight: this message amends it.
            Some(action) if action.kind == kind => {
                action.amend(&draft);
                action.touch(now, self.config.pending_ttl);
            }
            // A different kind replaces the slot outright.
            _ => {
                if pending.is_some() {
                    tracing::info!(
                        event_name = "pending.replaced",
                        correlation_id,
                        customer_id = %message.customer_id,
                        kind = kind.as_str(),
                    );
                }
                *pending = Some(PendingAction::open(
                    message.customer_id.clone(),
                    kind,
                    draft,
                    now,
                    self.config.pending_ttl,
                ));
            }
        }

        let action = pending.as_ref().ok_or_else(|| {
            ApplicationError::from(DomainError::InvariantViolation(
                "pending slot empty after capture".to_string(),
            ))
        })?;

        let missing = action.missing_slots();
        let outcome = self.apply_tracker(
            &message.customer_id,
            correlation_id,
            &prior_state,
            &TrackerEvent::SlotsCaptured,
            TrackerContext::with_missing(missing.iter().copied()),
        )?;

        if outcome.actions.contains(&TrackerAction::AskForConfirmation) {
            Ok(confirmation_prompt(action))
        } else {
            Ok(ask_for_missing(kind, &missing))
        }
    }

    async fn confirm(
        &self,
        message: &InboundMessage,
        correlation_id: &str,
        pending: &mut Option<PendingAction>,
        executed: &mut Option<Reservation>,
        now: DateTime<Utc>,
    ) -> Result<String, ApplicationError> {
        let Some(action) = pending.as_ref() else {
            return Ok(
                "No tengo ninguna solicitud pendiente. ¿Te gustaría reservar una mesa?".to_string()
            );
        };

        let verdict = self.config.guardrails.evaluate(&GuardrailIntent::ExecutePending {
            kind: action.kind,
            phase: action.phase.clone(),
            has_token: action.token.is_some(),
            expired: action.is_expired(now),
        });
        match verdict {
            GuardrailDecision::Allow => {}
            GuardrailDecision::Deny { user_message, reason_code, .. }
            | GuardrailDecision::Degrade { user_message, reason_code, .. } => {
                tracing::info!(
                    event_name = "pending.execution_blocked",
                    correlation_id,
                    customer_id = %message.customer_id,
                    reason_code,
                );
                return Ok(user_message);
            }
        }

        self.apply_tracker(
            &message.customer_id,
            correlation_id,
            &tracker_state(pending.as_ref()),
            &TrackerEvent::Affirmed,
            TrackerContext::default(),
        )?;

        let action = pending.as_ref().ok_or_else(|| {
            ApplicationError::from(DomainError::InvariantViolation(
                "pending slot cleared mid-confirmation".to_string(),
            ))
        })?;

        match self.executor.execute(action, correlation_id).await {
            Ok(outcome) => {
                self.apply_tracker(
                    &message.customer_id,
                    correlation_id,
                    &tracker_state(pending.as_ref()),
                    &TrackerEvent::Executed,
                    TrackerContext::default(),
                )?;
                let reply = success_reply(action.kind, &outcome.reservation);
                *executed = Some(outcome.reservation);
                *pending = None;
                Ok(reply)
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "pending.execution_failed",
                    correlation_id,
                    customer_id = %message.customer_id,
                    error = %error,
                );
                let reply = error.user_message();
                if error.keeps_pending() {
                    self.apply_tracker(
                        &message.customer_id,
                        correlation_id,
                        &tracker_state(pending.as_ref()),
                        &TrackerEvent::ExecutionRejected,
                        TrackerContext::default(),
                    )?;
                    // Conflicts reopen slot collection so the customer can
                    // pick another time without restarting.
                    if matches!(error, ExecutionError::Conflict(_)) {
                        if let Some(action) = pending.as_mut() {
                            action.draft.time = None;
                            action.amend(&ReservationDraft::default());
                            action.touch(now, self.config.pending_ttl);
                        }
                    }
                } else {
                    *pending = None;
                }
                Ok(reply)
            }
        }
    }

    fn decline(
        &self,
        message: &InboundMessage,
        correlation_id: &str,
        pending: &mut Option<PendingAction>,
    ) -> Result<String, ApplicationError> {
        if pending.is_none() {
            return Ok("De acuerdo. ¿Hay algo más en lo que pueda ayudarte?".to_string());
        }
        self.apply_tracker(
            &message.customer_id,
            correlation_id,
            &tracker_state(pending.as_ref()),
            &TrackerEvent::Declined,
            TrackerContext::default(),
        )?;
        *pending = None;
        Ok("De acuerdo, descarto la solicitud. ¿Hay algo más en lo que pueda ayudarte?"
            .to_string())
    }

    fn small_talk_reply(&self, pending: Option<&PendingAction>) -> String {
        match pending {
            Some(action) if action.phase == PendingPhase::AwaitingConfirmation => {
                format!("Sigo esperando tu confirmación. {}", confirmation_prompt(action))
            }
            Some(action) => ask_for_missing(action.kind, &action.missing_slots()),
            None => format!(
                "¡Hola! Bienvenido a {}. ¿Te gustaría reservar una mesa?",
                self.config.restaurant_name
            ),
        }
    }

    fn apply_tracker(
        &self,
        customer_id: &CustomerId,
        correlation_id: &str,
        state: &TrackerState,
        event: &TrackerEvent,
        context: TrackerContext,
    ) -> Result<TransitionOutcome, ApplicationError> {
        let outcome = self
            .tracker
            .apply_with_audit(
                state,
                event,
                &context,
                self.audit.as_ref(),
                &AuditContext::new(
                    Some(customer_id.clone()),
                    None,
                    correlation_id,
                    "orchestrator",
                ),
            )
            .map_err(DomainError::from)?;
        Ok(outcome)
    }

    async fn persist_turn(
        &self,
        message: &InboundMessage,
        reply: &str,
        pending: &Option<PendingAction>,
        now: DateTime<Utc>,
    ) -> Result<(), ApplicationError> {
        self.sessions
            .append(&message.customer_id, SessionTurn::user(message.text.clone(), now))
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;
        self.sessions
            .append(&message.customer_id, SessionTurn::assistant(reply, now))
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))?;
        self.sessions
            .save_pending(&message.customer_id, pending.clone())
            .await
            .map_err(|e| ApplicationError::Persistence(e.to_string()))
    }
}

fn tracker_state(pending: Option<&PendingAction>) -> TrackerState {
    match pending.map(|p| &p.phase) {
        None => TrackerState::Idle,
        Some(PendingPhase::Collecting) => TrackerState::Collecting,
        Some(PendingPhase::AwaitingConfirmation) => TrackerState::AwaitingConfirmation,
    }
}

/// Metadata only fills slots the customer has not provided; it never
/// overrides anything said in the conversation.
fn prefill_from_metadata(draft: &mut ReservationDraft, metadata: &UserMetadata) {
    if draft.notes.is_some() {
        return;
    }
    draft.notes = match (&metadata.name, &metadata.phone) {
        (Some(name), Some(phone)) => Some(format!("A nombre de {name}, tel. {phone}")),
        (Some(name), None) => Some(format!("A nombre de {name}")),
        (None, Some(phone)) => Some(format!("Contacto tel. {phone}")),
        (None, None) => None,
    };
}

fn ask_for_missing(kind: ActionKind, missing: &[&'static str]) -> String {
    if missing.is_empty() {
        return "¿Me confirmas los detalles?".to_string();
    }
    let questions: Vec<&str> = missing
        .iter()
        .map(|slot| match *slot {
            "date" => "¿para qué fecha?",
            "time" => "¿a qué hora?",
            "party_size" => "¿para cuántas personas?",
            "target" => "¿cuál es el número de tu reservación?",
            _ => "¿qué te gustaría cambiar?",
        })
        .collect();
    let intro = match kind {
        ActionKind::Create => "Con gusto te reservo una mesa.",
        ActionKind::Update => "Claro, actualizo tu reservación.",
        ActionKind::Cancel => "Claro, te ayudo a cancelar.",
    };
    format!("{intro} Solo necesito saber: {}", questions.join(" "))
}

fn confirmation_prompt(action: &PendingAction) -> String {
    let draft = &action.draft;
    match action.kind {
        ActionKind::Create => format!(
            "Confirmo tu reservación para {} personas el {} a las {}. ¿Está bien? (sí/no)",
            draft.party_size.unwrap_or_default(),
            draft.date.map(|d| d.format("%d/%m/%Y").to_string()).unwrap_or_default(),
            draft.time.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
        ),
        ActionKind::Update => format!(
            "Voy a actualizar la reservación {}{}. ¿Confirmo los cambios? (sí/no)",
            draft.target.map(|t| t.to_string()).unwrap_or_default(),
            summarize_changes(draft),
        ),
        ActionKind::Cancel => format!(
            "¿Seguro que deseas cancelar la reservación {}? (sí/no)",
            draft.target.map(|t| t.to_string()).unwrap_or_default(),
        ),
    }
}

fn summarize_changes(draft: &ReservationDraft) -> String {
    let mut parts = Vec::new();
    if let Some(date) = draft.date {
        parts.push(format!("fecha {}", date.format("%d/%m/%Y")));
    }
    if let Some(time) = draft.time {
        parts.push(format!("hora {}", time.format("%H:%M")));
    }
    if let Some(party_size) = draft.party_size {
        parts.push(format!("{party_size} personas"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn success_reply(kind: ActionKind, reservation: &Reservation) -> String {
    match kind {
        ActionKind::Create => format!(
            "¡Listo! Tu reservación {} quedó confirmada para {} personas el {} a las {}. \
             Te esperamos.",
            reservation.id,
            reservation.party_size,
            reservation.date.format("%d/%m/%Y"),
            reservation.time.format("%H:%M"),
        ),
        ActionKind::Update => format!(
            "Tu reservación {} quedó actualizada: {} personas el {} a las {}.",
            reservation.id,
            reservation.party_size,
            reservation.date.format("%d/%m/%Y"),
            reservation.time.format("%H:%M"),
        ),
        ActionKind::Cancel => {
            format!("Tu reservación {} ha sido cancelada. ¡Esperamos verte pronto!", reservation.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use casona_core::domain::pending::ReservationDraft;
    use casona_core::domain::turn::UserMetadata;

    use super::prefill_from_metadata;

    #[test]
    fn metadata_prefills_empty_notes_only() {
        let metadata = UserMetadata {
            name: Some("María García".to_string()),
            phone: Some("+52 55 1234 5678".to_string()),
        };

        let mut draft = ReservationDraft::default();
        prefill_from_metadata(&mut draft, &metadata);
        assert_eq!(draft.notes.as_deref(), Some("A nombre de María García, tel. +52 55 1234 5678"));

        let mut draft =
            ReservationDraft { notes: Some("mesa junto a la ventana".to_string()), ..Default::default() };
        prefill_from_metadata(&mut draft, &metadata);
        assert_eq!(draft.notes.as_deref(), Some("mesa junto a la ventana"));
    }

    #[test]
    fn phone_alone_still_lands_in_the_notes() {
        let metadata = UserMetadata { name: None, phone: Some("5512345678".to_string()) };
        let mut draft = ReservationDraft::default();
        prefill_from_metadata(&mut draft, &metadata);
        assert_eq!(draft.notes.as_deref(), Some("Contacto tel. 5512345678"));
    }
}

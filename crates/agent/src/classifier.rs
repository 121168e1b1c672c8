//! Turns raw customer text into a `Route` plus extracted slots. The rule
//! classifier is the deterministic fallback; the LLM classifier may refine
//! routing but never invents slot values the extractor did not see.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

use casona_core::domain::pending::ReservationDraft;
use casona_core::domain::session::SessionTurn;
use casona_core::domain::turn::Route;

use crate::conversation::{
    extract_slots, is_affirmation, is_decline, normalize_text, wants_human, ExtractedSlots,
};

/// Completion backend for the LLM-refined classifier. The production binary
/// wires a provider client here; tests substitute canned implementations.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    pub slots: ExtractedSlots,
    pub confidence_score: u8,
}

impl RouteDecision {
    /// The extracted values as a draft the pending tracker can merge.
    pub fn slots_draft(&self) -> ReservationDraft {
        ReservationDraft {
            date: self.slots.date,
            time: self.slots.time,
            party_size: self.slots.party_size,
            target: self.slots.reservation_id,
            table: None,
            notes: None,
        }
    }
}

/// What the classifier needs to know about the conversation so far.
#[derive(Clone, Debug, Default)]
pub struct TurnContext {
    pub awaiting_confirmation: bool,
    pub has_pending: bool,
    pub today: NaiveDate,
    /// Recent turns, oldest first, already windowed by the orchestrator.
    pub recent_turns: Vec<SessionTurn>,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str, context: &TurnContext) -> RouteDecision;
}

#[derive(Clone, Debug, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    fn decide(&self, text: &str, context: &TurnContext) -> RouteDecision {
        let normalized_text = normalize_text(text);
        let slots = extract_slots(text, context.today);

        if wants_human(&normalized_text) {
            return RouteDecision {
                route: Route::EscalateToHuman,
                slots,
                confidence_score: 95,
            };
        }

        // Confirmation answers only make sense against a proposed action.
        if context.awaiting_confirmation {
            if is_decline(&normalized_text) {
                return RouteDecision {
                    route: Route::DeclinePending,
                    slots,
                    confidence_score: 90,
                };
            }
            if is_affirmation(&normalized_text) {
                return RouteDecision {
                    route: Route::ConfirmPending,
                    slots,
                    confidence_score: 90,
                };
            }
        }

        let route = if contains_any(&normalized_text, &["cancelar", "cancela", "cancelacion"]) {
            Route::CancelReservation
        } else if contains_any(&normalized_text, &["cambiar", "cambia", "mover", "modificar"]) {
            Route::UpdateReservation
        } else if contains_any(&normalized_text, &["reservar", "reservacion", "reserva", "mesa"]) {
            Route::CreateReservation
        } else if contains_any(&normalized_text, &["menu", "carta", "platillos", "comida"]) {
            Route::MenuQuery
        } else if context.has_pending && !slots.is_empty() {
            // Bare slot values continue whatever is already in flight.
            Route::AmendPending
        } else if !slots.is_empty() {
            Route::CreateReservation
        } else {
            Route::SmallTalk
        };

        RouteDecision { confidence_score: confidence_score(&route, &slots), route, slots }
    }
}

#[async_trait]
impl Classifier for RuleClassifier {
    async fn classify(&self, text: &str, context: &TurnContext) -> RouteDecision {
        self.decide(text, context)
    }
}

fn contains_any(normalized_text: &str, keywords: &[&str]) -> bool {
    let tokens: Vec<&str> = normalized_text.split_whitespace().collect();
    keywords.iter().any(|keyword| tokens.contains(keyword))
}

fn confidence_score(route: &Route, slots: &ExtractedSlots) -> u8 {
    let mut score: u8 = match route {
        Route::SmallTalk => 50,
        Route::MenuQuery => 80,
        _ => 70,
    };
    if slots.date.is_some() {
        score = score.saturating_add(10);
    }
    if slots.time.is_some() {
        score = score.saturating_add(10);
    }
    if slots.party_size.is_some() {
        score = score.saturating_add(10);
    }
    score.min(100)
}

/// Wire shape of the LLM routing verdict.
#[derive(Debug, Deserialize)]
struct LlmVerdict {
    route: String,
    confidence: u8,
}

/// Refines routing with a model, keeping the rule classifier as the floor:
/// the model picks among known routes, the extractor alone supplies slots,
/// and anything unparseable or low-confidence falls back to the rules.
pub struct LlmClassifier<C> {
    client: C,
    fallback: RuleClassifier,
    confidence_threshold: u8,
}

impl<C> LlmClassifier<C>
where
    C: LlmClient,
{
    pub fn new(client: C, confidence_threshold: u8) -> Self {
        Self { client, fallback: RuleClassifier::new(), confidence_threshold }
    }

    fn prompt_for(text: &str, context: &TurnContext) -> String {
        let mut history = String::new();
        for turn in &context.recent_turns {
            history.push_str(turn.role.as_str());
            history.push_str(": ");
            history.push_str(&turn.text);
            history.push('\n');
        }
        let history = if history.is_empty() {
            String::new()
        } else {
            format!("Conversation so far:\n{history}")
        };
        format!(
            "Classify this restaurant customer message into exactly one route.\n\
             Routes: small_talk, menu_query, create_reservation, update_reservation, \
             cancel_reservation, escalate_to_human{}.\n\
             Respond with JSON: {{\"route\": \"...\", \"confidence\": 0-100}}.\n\
             {history}Message: {text}",
            if context.awaiting_confirmation {
                ", confirm_pending, decline_pending, amend_pending"
            } else {
                ""
            }
        )
    }

    fn parse_verdict(raw: &str, context: &TurnContext) -> Result<(Route, u8)> {
        let verdict: LlmVerdict = serde_json::from_str(raw.trim())?;
        let route = match verdict.route.as_str() {
            "small_talk" => Route::SmallTalk,
            "menu_query" => Route::MenuQuery,
            "create_reservation" => Route::CreateReservation,
            "update_reservation" => Route::UpdateReservation,
            "cancel_reservation" => Route::CancelReservation,
            "escalate_to_human" => Route::EscalateToHuman,
            "confirm_pending" if context.awaiting_confirmation => Route::ConfirmPending,
            "decline_pending" if context.awaiting_confirmation => Route::DeclinePending,
            "amend_pending" if context.has_pending => Route::AmendPending,
            other => anyhow::bail!("unknown route {other:?}"),
        };
        Ok((route, verdict.confidence))
    }
}

#[async_trait]
impl<C> Classifier for LlmClassifier<C>
where
    C: LlmClient,
{
    async fn classify(&self, text: &str, context: &TurnContext) -> RouteDecision {
        let rule_decision = self.fallback.decide(text, context);

        let raw = match self.client.complete(&Self::prompt_for(text, context)).await {
            Ok(raw) => raw,
            Err(error) => {
                tracing::warn!(event_name = "classifier.llm_unavailable", %error);
                return rule_decision;
            }
        };

        match Self::parse_verdict(&raw, context) {
            Ok((route, confidence)) if confidence >= self.confidence_threshold => RouteDecision {
                route,
                slots: rule_decision.slots,
                confidence_score: confidence,
            },
            Ok((_, confidence)) => {
                tracing::debug!(event_name = "classifier.low_confidence", confidence);
                rule_decision
            }
            Err(error) => {
                tracing::warn!(event_name = "classifier.verdict_unparseable", %error);
                rule_decision
            }
        }
    }
}

use casona_core::domain::pending::{ActionKind, PendingPhase};
use casona_core::domain::turn::Route;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailIntent {
    /// Run a pending action against storage and the calendar.
    ExecutePending { kind: ActionKind, phase: PendingPhase, has_token: bool, expired: bool },
    /// The classifier routed, but without much conviction.
    LowConfidenceRoute { route: Route, confidence_score: u8 },
}

impl GuardrailIntent {
    pub fn action_key(&self) -> String {
        match self {
            Self::ExecutePending { kind, .. } => format!("pending.execute_{}", kind.as_str()),
            Self::LowConfidenceRoute { route, .. } => {
                format!("route.low_confidence_{}", route.as_str())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub min_route_confidence: u8,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { min_route_confidence: 40 }
    }
}

impl GuardrailPolicy {
    pub fn evaluate(&self, intent: &GuardrailIntent) -> GuardrailDecision {
        match intent {
            GuardrailIntent::ExecutePending { expired: true, .. } => GuardrailDecision::Deny {
                reason_code: "pending_action_expired",
                user_message: "Tu solicitud anterior expiró. ¿Empezamos de nuevo?".to_string(),
                fallback_path: "restart_collection",
            },
            GuardrailIntent::ExecutePending { phase, has_token, .. } => {
                if *phase == PendingPhase::AwaitingConfirmation && *has_token {
                    GuardrailDecision::Allow
                } else {
                    GuardrailDecision::Deny {
                        reason_code: "pending_action_unconfirmed",
                        user_message:
                            "Aún no tengo tu confirmación. ¿Deseas que proceda?".to_string(),
                        fallback_path: "await_confirmation",
                    }
                }
            }
            GuardrailIntent::LowConfidenceRoute { confidence_score, .. } => {
                if *confidence_score >= self.min_route_confidence {
                    GuardrailDecision::Allow
                } else {
                    GuardrailDecision::Degrade {
                        reason_code: "route_confidence_below_floor",
                        user_message:
                            "No estoy seguro de haber entendido. Te comunico con una persona del equipo."
                                .to_string(),
                        fallback_path: "escalate_to_human",
                    }
                }
            }
        }
    }
}

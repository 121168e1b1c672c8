use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionTurn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl SessionTurn {
    pub fn user(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { role: TurnRole::User, text: text.into(), at }
    }

    pub fn assistant(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { role: TurnRole::Assistant, text: text.into(), at }
    }
}

/// Who answers the customer. Once a human takes the thread the bot keeps
/// recording inbound messages but produces no replies until staff hand the
/// conversation back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffState {
    #[default]
    BotActive,
    /// A yes/no consent question is out; the next answer decides.
    AwaitingConsent,
    /// A human owns the thread.
    HumanActive,
}

impl HandoffState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BotActive => "bot_active",
            Self::AwaitingConsent => "awaiting_consent",
            Self::HumanActive => "human_active",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bot_active" => Some(Self::BotActive),
            "awaiting_consent" => Some(Self::AwaitingConsent),
            "human_active" => Some(Self::HumanActive),
            _ => None,
        }
    }
}

/// Append-only conversation record for one customer. Never rewritten;
/// retention/truncation is the rendering layer's concern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    pub customer_id: CustomerId,
    pub turns: Vec<SessionTurn>,
}

impl SessionHistory {
    pub fn empty(customer_id: CustomerId) -> Self {
        Self { customer_id, turns: Vec::new() }
    }

    pub fn append(&mut self, turn: SessionTurn) {
        self.turns.push(turn);
    }

    /// The most recent `limit` turns, oldest first.
    pub fn recent(&self, limit: usize) -> &[SessionTurn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::customer::CustomerId;

    use super::{HandoffState, SessionHistory, SessionTurn, TurnRole};

    #[test]
    fn role_round_trips_from_storage_encoding() {
        for role in [TurnRole::User, TurnRole::Assistant] {
            assert_eq!(TurnRole::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn handoff_state_round_trips_from_storage_encoding() {
        for state in
            [HandoffState::BotActive, HandoffState::AwaitingConsent, HandoffState::HumanActive]
        {
            assert_eq!(HandoffState::parse(state.as_str()), Some(state));
        }
        assert_eq!(HandoffState::parse("operator"), None);
        assert_eq!(HandoffState::default(), HandoffState::BotActive);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mut history = SessionHistory::empty(CustomerId("1".to_string()));
        for i in 0..5 {
            history.append(SessionTurn::user(format!("m{i}"), Utc::now()));
        }

        let tail = history.recent(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].text, "m3");
        assert_eq!(tail[1].text, "m4");
    }

    #[test]
    fn recent_with_oversized_limit_returns_everything() {
        let mut history = SessionHistory::empty(CustomerId("1".to_string()));
        history.append(SessionTurn::assistant("hola", Utc::now()));
        assert_eq!(history.recent(10).len(), 1);
    }
}

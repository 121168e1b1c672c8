//! SQLite-backed conversation state: an append-only turn log per customer
//! plus a single row holding the pending-action slot (as JSON) and the
//! human-handoff flag.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use casona_core::domain::customer::CustomerId;
use casona_core::domain::pending::PendingAction;
use casona_core::domain::session::{HandoffState, SessionHistory, SessionTurn, TurnRole};
use casona_core::stores::{SessionError, SessionSnapshot, SessionStore};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlSessionStore {
    pool: DbPool,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn append(
        &self,
        customer_id: &CustomerId,
        turn: SessionTurn,
    ) -> Result<(), SessionError> {
        sqlx::query("INSERT INTO conversation_turns (customer_id, role, text, at) VALUES (?, ?, ?, ?)")
            .bind(&customer_id.0)
            .bind(turn.role.as_str())
            .bind(&turn.text)
            .bind(turn.at)
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::Write(e.to_string()))?;
        Ok(())
    }

    async fn load(&self, customer_id: &CustomerId) -> Result<SessionSnapshot, SessionError> {
        let rows = sqlx::query(
            "SELECT role, text, at FROM conversation_turns WHERE customer_id = ? ORDER BY id",
        )
        .bind(&customer_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SessionError::Load(e.to_string()))?;

        let mut history = SessionHistory::empty(customer_id.clone());
        for row in rows {
            let role_raw = row.get::<String, _>("role");
            let role = TurnRole::parse(&role_raw).ok_or_else(|| {
                SessionError::from(RepositoryError::Decode(format!("unknown role {role_raw:?}")))
            })?;
            history.append(SessionTurn {
                role,
                text: row.get::<String, _>("text"),
                at: row.get::<DateTime<Utc>, _>("at"),
            });
        }

        let state_row = sqlx::query(
            "SELECT pending_action, handoff_state FROM conversation_sessions WHERE customer_id = ?",
        )
        .bind(&customer_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SessionError::Load(e.to_string()))?;

        let (pending_json, handoff_raw) = match state_row {
            Some(row) => (
                row.get::<Option<String>, _>("pending_action"),
                Some(row.get::<String, _>("handoff_state")),
            ),
            None => (None, None),
        };

        let pending = match pending_json {
            Some(json) => Some(serde_json::from_str(&json).map_err(|e| {
                SessionError::from(RepositoryError::Decode(format!(
                    "pending action unreadable: {e}"
                )))
            })?),
            None => None,
        };
        let handoff = match handoff_raw {
            Some(raw) => HandoffState::parse(&raw).ok_or_else(|| {
                SessionError::from(RepositoryError::Decode(format!(
                    "unknown handoff state {raw:?}"
                )))
            })?,
            None => HandoffState::default(),
        };

        Ok(SessionSnapshot { history, pending, handoff })
    }

    async fn save_pending(
        &self,
        customer_id: &CustomerId,
        pending: Option<PendingAction>,
    ) -> Result<(), SessionError> {
        let json = match &pending {
            Some(action) => Some(
                serde_json::to_string(action)
                    .map_err(|e| SessionError::Write(e.to_string()))?,
            ),
            None => None,
        };
        sqlx::query(
            "INSERT INTO conversation_sessions (customer_id, pending_action, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(customer_id) DO UPDATE
             SET pending_action = excluded.pending_action, updated_at = excluded.updated_at",
        )
        .bind(&customer_id.0)
        .bind(json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Write(e.to_string()))?;
        Ok(())
    }

    async fn save_handoff(
        &self,
        customer_id: &CustomerId,
        handoff: HandoffState,
    ) -> Result<(), SessionError> {
        sqlx::query(
            "INSERT INTO conversation_sessions (customer_id, pending_action, handoff_state, updated_at)
             VALUES (?, NULL, ?, ?)
             ON CONFLICT(customer_id) DO UPDATE
             SET handoff_state = excluded.handoff_state, updated_at = excluded.updated_at",
        )
        .bind(&customer_id.0)
        .bind(handoff.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Write(e.to_string()))?;
        Ok(())
    }
}

//! Durable audit trail. `emit` is fire-and-forget: the write happens on a
//! spawned task so a slow disk never stalls a customer turn, and a failed
//! write is logged rather than surfaced.

use casona_core::audit::{AuditEvent, AuditSink};

use crate::DbPool;

pub struct SqlAuditSink {
    pool: DbPool,
}

impl SqlAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl AuditSink for SqlAuditSink {
    fn emit(&self, event: AuditEvent) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let metadata = serde_json::to_string(&event.metadata).unwrap_or_else(|_| "{}".into());
            let result = sqlx::query(
                "INSERT INTO audit_events
                     (event_id, customer_id, reservation_id, correlation_id, event_type,
                      category, actor, outcome, metadata, occurred_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&event.event_id)
            .bind(event.customer_id.as_ref().map(|id| id.0.clone()))
            .bind(event.reservation_id.map(|id| id.0))
            .bind(&event.correlation_id)
            .bind(&event.event_type)
            .bind(format!("{:?}", event.category))
            .bind(&event.actor)
            .bind(format!("{:?}", event.outcome))
            .bind(metadata)
            .bind(event.occurred_at)
            .execute(&pool)
            .await;
            if let Err(error) = result {
                tracing::warn!(
                    event_name = "audit.write_failed",
                    event_id = %event.event_id,
                    %error,
                );
            }
        });
    }
}

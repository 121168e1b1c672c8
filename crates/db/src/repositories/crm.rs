//! Read model feeding the campaign planner: recorded visits with their
//! tickets. Tickets are stored as decimal strings; SQLite has no native
//! decimal type and floats drift.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use casona_core::crm::VisitRecord;
use casona_core::domain::customer::CustomerId;

use super::RepositoryError;
use crate::DbPool;

pub struct SqlCrmRepository {
    pool: DbPool,
}

impl SqlCrmRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn record_visit(&self, visit: &VisitRecord) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO visits (customer_id, visited_at, total_ticket) VALUES (?, ?, ?)")
            .bind(&visit.customer_id.0)
            .bind(visit.at)
            .bind(visit.total_ticket.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn visits(&self) -> Result<Vec<VisitRecord>, RepositoryError> {
        let rows =
            sqlx::query("SELECT customer_id, visited_at, total_ticket FROM visits ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|row| {
                let raw_ticket = row.get::<String, _>("total_ticket");
                let total_ticket = raw_ticket.parse::<Decimal>().map_err(|e| {
                    RepositoryError::Decode(format!("bad ticket {raw_ticket:?}: {e}"))
                })?;
                Ok(VisitRecord {
                    customer_id: CustomerId(row.get::<String, _>("customer_id")),
                    at: row.get::<DateTime<Utc>, _>("visited_at"),
                    total_ticket,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use casona_core::crm::{CampaignPlanner, VisitRecord};
    use casona_core::domain::customer::CustomerId;

    use crate::migrations::run_pending;
    use crate::{connect_with_settings, SqlCrmRepository};

    #[tokio::test]
    async fn recorded_visits_feed_the_planner() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        let repository = SqlCrmRepository::new(pool);

        let customer = CustomerId("1".to_string());
        for (days_ago, ticket) in [(10_i64, "350.50"), (40, "249.50")] {
            repository
                .record_visit(&VisitRecord {
                    customer_id: customer.clone(),
                    at: Utc::now() - Duration::days(days_ago),
                    total_ticket: ticket.parse::<Decimal>().expect("valid decimal"),
                })
                .await
                .expect("record visit");
        }

        let visits = repository.visits().await.expect("load visits");
        assert_eq!(visits.len(), 2);

        let spend = CampaignPlanner::average_ticket(&visits);
        assert_eq!(
            spend.get(&customer),
            Some(&"300".parse::<Decimal>().expect("valid decimal"))
        );
        assert_eq!(CampaignPlanner::suggested_discount(spend[&customer]), 20);
    }
}

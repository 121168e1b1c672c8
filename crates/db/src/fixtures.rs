use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const SEED_CUSTOMER_IDS: &[&str] = &["5215511111111", "5215522222222", "5215533333333"];

const SEED_VISIT_IDS: &[i64] = &[9001, 9002, 9003, 9004];

const SEED_RESERVATION_IDS: &[i64] = &[9101];

const SEED_TURN_IDS: &[i64] = &[9201, 9202];

/// Demo dataset for local runs and end-to-end checks: three customers with
/// visit history, one confirmed reservation, and one recorded exchange.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// SQL fixture content for the demo dataset.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset. Re-loading replaces rows in place.
    pub async fn load(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Verify that the seeded rows exist and carry the expected shape.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let customer_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM customers WHERE id IN {}",
            sql_string_array(SEED_CUSTOMER_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("customers", customer_count == SEED_CUSTOMER_IDS.len() as i64));

        let visit_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM visits WHERE id IN {}",
            sql_int_array(SEED_VISIT_IDS)
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("visits", visit_count == SEED_VISIT_IDS.len() as i64));

        let reservation_confirmed: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reservations
              WHERE id = ?1 AND status = 'confirmed' AND calendar_event_id IS NOT NULL)",
        )
        .bind(SEED_RESERVATION_IDS[0])
        .fetch_one(pool)
        .await?;
        checks.push(("reservation-confirmed", reservation_confirmed == 1));

        let turn_roles: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT role FROM conversation_turns WHERE id IN {} ORDER BY id",
            sql_int_array(SEED_TURN_IDS)
        ))
        .fetch_all(pool)
        .await?;
        checks.push(("turn-roles", turn_roles == ["user", "assistant"]));

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove the seeded rows from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query(&format!(
            "DELETE FROM conversation_turns WHERE id IN {}",
            sql_int_array(SEED_TURN_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM reservations WHERE id IN {}",
            sql_int_array(SEED_RESERVATION_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DELETE FROM visits WHERE id IN {}", sql_int_array(SEED_VISIT_IDS)))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM customers WHERE id IN {}",
            sql_string_array(SEED_CUSTOMER_IDS)
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

fn sql_string_array(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

fn sql_int_array(ids: &[i64]) -> String {
    let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    format!("({joined})")
}

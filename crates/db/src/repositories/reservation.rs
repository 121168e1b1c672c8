//! SQLite-backed reservation storage. Capacity is enforced here: a create
//! or a move into a slot that already holds `tables_per_slot` live
//! reservations surfaces a conflict instead of overbooking.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::Row;

use casona_core::domain::customer::CustomerId;
use casona_core::domain::pending::ReservationDraft;
use casona_core::domain::reservation::{
    Reservation, ReservationFields, ReservationId, ReservationStatus,
};
use casona_core::stores::{ReservationStore, StoreError};

use super::RepositoryError;
use crate::DbPool;

pub struct SqlReservationStore {
    pool: DbPool,
    tables_per_slot: usize,
}

impl SqlReservationStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_tables_per_slot(pool, 10)
    }

    pub fn with_tables_per_slot(pool: DbPool, tables_per_slot: usize) -> Self {
        Self { pool, tables_per_slot }
    }

    async fn occupied(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        exclude: Option<ReservationId>,
    ) -> Result<i64, RepositoryError> {
        let count = sqlx::query(
            "SELECT COUNT(*) AS count FROM reservations
             WHERE date = ? AND time = ? AND status != 'cancelled' AND id != ?",
        )
        .bind(date)
        .bind(time)
        .bind(exclude.map(|id| id.0).unwrap_or(-1))
        .fetch_one(&self.pool)
        .await?
        .get::<i64, _>("count");
        Ok(count)
    }

    async fn fetch(&self, id: &ReservationId) -> Result<Option<Reservation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, date, time, party_size, status, table_name, notes,
                    calendar_event_id, created_at, updated_at
             FROM reservations WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_reservation).transpose()
    }
}

fn row_to_reservation(row: sqlx::sqlite::SqliteRow) -> Result<Reservation, RepositoryError> {
    let status_raw = row.get::<String, _>("status");
    let status = ReservationStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status {status_raw:?}")))?;
    Ok(Reservation {
        id: ReservationId(row.get::<i64, _>("id")),
        customer_id: CustomerId(row.get::<String, _>("customer_id")),
        date: row.get::<NaiveDate, _>("date"),
        time: row.get::<NaiveTime, _>("time"),
        party_size: row.get::<i64, _>("party_size") as u32,
        status,
        table: row.get::<Option<String>, _>("table_name"),
        notes: row.get::<Option<String>, _>("notes"),
        calendar_event_id: row.get::<Option<String>, _>("calendar_event_id"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

#[async_trait]
impl ReservationStore for SqlReservationStore {
    async fn create(
        &self,
        customer_id: &CustomerId,
        draft: &ReservationDraft,
    ) -> Result<Reservation, StoreError> {
        let (Some(date), Some(time), Some(party_size)) =
            (draft.date, draft.time, draft.party_size)
        else {
            return Err(StoreError::Conflict("draft is missing required slots".to_string()));
        };

        let occupied = self.occupied(date, time, None).await.map_err(StoreError::from)?;
        if occupied >= self.tables_per_slot as i64 {
            return Err(StoreError::Conflict(format!(
                "no tables left on {date} at {time}"
            )));
        }

        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO reservations
                 (customer_id, date, time, party_size, status, table_name, notes,
                  created_at, updated_at)
             VALUES (?, ?, ?, ?, 'confirmed', ?, ?, ?, ?)",
        )
        .bind(&customer_id.0)
        .bind(date)
        .bind(time)
        .bind(i64::from(party_size))
        .bind(&draft.table)
        .bind(&draft.notes)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from(RepositoryError::from(e)))?
        .last_insert_rowid();

        self.fetch(&ReservationId(id))
            .await
            .map_err(StoreError::from)?
            .ok_or(StoreError::NotFound(ReservationId(id)))
    }

    async fn update(
        &self,
        id: &ReservationId,
        fields: &ReservationFields,
    ) -> Result<Reservation, StoreError> {
        let mut current =
            self.fetch(id).await.map_err(StoreError::from)?.ok_or(StoreError::NotFound(*id))?;

        current.apply_fields(fields);
        let occupied = self
            .occupied(current.date, current.time, Some(*id))
            .await
            .map_err(StoreError::from)?;
        if occupied >= self.tables_per_slot as i64 {
            return Err(StoreError::Conflict(format!(
                "no tables left on {} at {}",
                current.date, current.time
            )));
        }

        sqlx::query(
            "UPDATE reservations
             SET date = ?, time = ?, party_size = ?, table_name = ?, notes = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(current.date)
        .bind(current.time)
        .bind(i64::from(current.party_size))
        .bind(&current.table)
        .bind(&current.notes)
        .bind(Utc::now())
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from(RepositoryError::from(e)))?;

        self.fetch(id).await.map_err(StoreError::from)?.ok_or(StoreError::NotFound(*id))
    }

    async fn cancel(&self, id: &ReservationId) -> Result<Reservation, StoreError> {
        let affected = sqlx::query(
            "UPDATE reservations SET status = 'cancelled', updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from(RepositoryError::from(e)))?
        .rows_affected();
        if affected == 0 {
            return Err(StoreError::NotFound(*id));
        }
        self.fetch(id).await.map_err(StoreError::from)?.ok_or(StoreError::NotFound(*id))
    }

    async fn get(&self, id: &ReservationId) -> Result<Option<Reservation>, StoreError> {
        self.fetch(id).await.map_err(StoreError::from)
    }

    async fn link_calendar_event(
        &self,
        id: &ReservationId,
        event_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let affected =
            sqlx::query("UPDATE reservations SET calendar_event_id = ?, updated_at = ? WHERE id = ?")
                .bind(event_id)
                .bind(Utc::now())
                .bind(id.0)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::from(RepositoryError::from(e)))?
                .rows_affected();
        if affected == 0 {
            return Err(StoreError::NotFound(*id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use casona_core::domain::customer::CustomerId;
    use casona_core::domain::pending::ReservationDraft;
    use casona_core::domain::reservation::{ReservationFields, ReservationStatus};
    use casona_core::stores::{ReservationStore, StoreError};

    use crate::migrations::run_pending;
    use crate::{connect_with_settings, SqlReservationStore};

    async fn store(tables_per_slot: usize) -> SqlReservationStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlReservationStore::with_tables_per_slot(pool, tables_per_slot)
    }

    fn draft() -> ReservationDraft {
        ReservationDraft {
            date: NaiveDate::from_ymd_opt(2025, 6, 13),
            time: NaiveTime::from_hms_opt(20, 0, 0),
            party_size: Some(4),
            target: None,
            table: None,
            notes: Some("A nombre de Ana".to_string()),
        }
    }

    #[tokio::test]
    async fn create_update_cancel_round_trip() {
        let store = store(10).await;
        let customer = CustomerId("5215512345678".to_string());

        let created = store.create(&customer, &draft()).await.expect("create");
        assert_eq!(created.status, ReservationStatus::Confirmed);
        assert_eq!(created.party_size, 4);
        assert_eq!(created.notes.as_deref(), Some("A nombre de Ana"));

        let updated = store
            .update(&created.id, &ReservationFields { party_size: Some(6), ..Default::default() })
            .await
            .expect("update");
        assert_eq!(updated.party_size, 6);
        assert_eq!(updated.date, created.date);

        let cancelled = store.cancel(&created.id).await.expect("cancel");
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn full_slot_conflicts_and_cancellation_frees_it() {
        let store = store(1).await;
        let first = store
            .create(&CustomerId("1".to_string()), &draft())
            .await
            .expect("first booking fits");

        let error = store
            .create(&CustomerId("2".to_string()), &draft())
            .await
            .expect_err("slot is full");
        assert!(matches!(error, StoreError::Conflict(_)));

        store.cancel(&first.id).await.expect("cancel");
        store
            .create(&CustomerId("2".to_string()), &draft())
            .await
            .expect("freed slot accepts a new booking");
    }

    #[tokio::test]
    async fn calendar_event_link_round_trip() {
        let store = store(10).await;
        let created =
            store.create(&CustomerId("1".to_string()), &draft()).await.expect("create");

        store
            .link_calendar_event(&created.id, Some("evt-123"))
            .await
            .expect("link event");
        let fetched = store.get(&created.id).await.expect("get").expect("exists");
        assert_eq!(fetched.calendar_event_id.as_deref(), Some("evt-123"));

        store.link_calendar_event(&created.id, None).await.expect("unlink event");
        let fetched = store.get(&created.id).await.expect("get").expect("exists");
        assert_eq!(fetched.calendar_event_id, None);
    }
}

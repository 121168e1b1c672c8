use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;

use casona_core::domain::customer::{Customer, CustomerId};

use super::{CustomerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_customer(row: sqlx::sqlite::SqliteRow) -> Customer {
    Customer {
        id: CustomerId(row.get::<String, _>("id")),
        first_name: row.get::<String, _>("first_name"),
        last_name: row.get::<String, _>("last_name"),
        email: row.get::<Option<String>, _>("email"),
        whatsapp: row.get::<Option<String>, _>("whatsapp"),
        birth_date: row.get::<Option<NaiveDate>, _>("birth_date"),
    }
}

#[async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, first_name, last_name, email, whatsapp, birth_date
             FROM customers WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_customer))
    }

    async fn upsert(&self, customer: Customer) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customers (id, first_name, last_name, email, whatsapp, birth_date)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 email = excluded.email,
                 whatsapp = excluded.whatsapp,
                 birth_date = excluded.birth_date",
        )
        .bind(&customer.id.0)
        .bind(&customer.first_name)
        .bind(&customer.last_name)
        .bind(&customer.email)
        .bind(&customer.whatsapp)
        .bind(customer.birth_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Customer>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, first_name, last_name, email, whatsapp, birth_date
             FROM customers ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_customer).collect())
    }
}

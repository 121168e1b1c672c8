use async_trait::async_trait;
use thiserror::Error;

use casona_core::domain::customer::{Customer, CustomerId};
use casona_core::stores::{SessionError, StoreError};

pub mod crm;
pub mod customer;
pub mod reservation;
pub mod session;

pub use crm::SqlCrmRepository;
pub use customer::SqlCustomerRepository;
pub use reservation::SqlReservationStore;
pub use session::SqlSessionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::Unavailable(error.to_string())
    }
}

impl From<RepositoryError> for SessionError {
    fn from(error: RepositoryError) -> Self {
        SessionError::Load(error.to_string())
    }
}

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError>;
    async fn upsert(&self, customer: Customer) -> Result<(), RepositoryError>;
    async fn list(&self) -> Result<Vec<Customer>, RepositoryError>;
}

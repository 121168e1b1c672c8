pub mod audit;
pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use audit::SqlAuditSink;
pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{DemoSeedDataset, VerificationResult};
pub use repositories::{
    CustomerRepository, RepositoryError, SqlCrmRepository, SqlCustomerRepository,
    SqlReservationStore, SqlSessionStore,
};

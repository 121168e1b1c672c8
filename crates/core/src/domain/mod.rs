pub mod customer;
pub mod pending;
pub mod reservation;
pub mod session;
pub mod turn;

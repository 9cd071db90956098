//! PostgreSQL driver built on sqlx

pub mod client;
pub mod db;
pub mod transaction;

pub use client::PgClient;
pub use db::PgDb;
pub use transaction::PgTransaction;

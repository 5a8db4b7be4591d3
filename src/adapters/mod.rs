//! Postgres implementations of the repository ports.

pub mod postgres_ledger_repository;
pub mod postgres_outbox;
pub mod postgres_transaction_repository;

pub use postgres_ledger_repository::PostgresLedgerRepository;
pub use postgres_outbox::{insert_outbox, PostgresOutbox};
pub use postgres_transaction_repository::PostgresTransactionRepository;

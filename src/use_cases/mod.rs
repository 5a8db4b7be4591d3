pub mod create_transaction;
pub mod dashboard;
pub mod payment_callback;
pub mod reduce_stock;
pub mod transaction_queries;
pub mod transfer_stock;

pub use create_transaction::{CreateTransaction, CreateTransactionInput, CreateTransactionOutput};
pub use dashboard::Dashboard;
pub use payment_callback::{HandlePaymentNotification, PaymentNotification};
pub use reduce_stock::ReduceStock;
pub use transaction_queries::TransactionQueries;
pub use transfer_stock::{TransferInput, TransferOutput, TransferStock};

pub mod directory;
pub mod events;
pub mod ledger;
pub mod transaction;

pub use directory::{Product, UserProfile};
pub use events::{StockLine, StockReducedEvent};
pub use ledger::{LedgerLocation, Location, LocationKind, ReductionOutcome, StockLevel};
pub use transaction::{
    CustomerDetails, DashboardStats, LineItem, NewTransaction, PaymentStatus, PaymentUpdate,
    PaymentUpdateOutcome, Totals, Transaction, TransactionProduct,
};

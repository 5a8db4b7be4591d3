pub mod identity;
pub mod token;

pub use identity::{has_sentinel, RequestIdentity};
pub use token::{Claims, TokenError, TokenSigner};

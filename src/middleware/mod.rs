pub mod gateway_guard;
pub mod request_logger;

pub use gateway_guard::gateway_guard;
pub use request_logger::{request_logger_middleware, RequestLogSettings};

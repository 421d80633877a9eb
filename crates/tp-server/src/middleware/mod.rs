//! HTTP middleware and extractors: request ID, rate limiting, client IP.

pub mod client_ip;
pub mod rate_limit;
pub mod request_id;

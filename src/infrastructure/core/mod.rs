pub mod http;
pub mod rate_limiter;

pub mod cache;
pub mod rate_limit;

pub use cache::{Blacklist, TokenCache};
pub use rate_limit::RateLimiter;

//! Rate limiting logic and state management.

mod cache;
mod key;
mod limiter;
mod policy;

pub use cache::{CacheEntry, CounterCache};
pub use key::CounterKey;
pub use limiter::{Decision, FailMode, RateLimiter};
pub use policy::{Policy, Strategy};

//! Rate limiting logic and state management.

mod key;
mod limiter;
mod policy;
mod sweeper;
mod window;

pub use key::ClientKey;
pub use limiter::{Decision, LimitStatus, SlidingWindowLimiter};
pub use policy::WindowPolicy;
pub use sweeper::spawn_sweeper;
pub use window::RequestLog;

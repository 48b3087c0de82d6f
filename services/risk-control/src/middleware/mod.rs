pub mod admin_auth;
pub mod rate_limit;
pub mod scheduler_secret;

pub use admin_auth::{AdminAuth, AdminClaims, ADMIN_ROLE};
pub use rate_limit::RateLimiter;
pub use scheduler_secret::SchedulerSecret;

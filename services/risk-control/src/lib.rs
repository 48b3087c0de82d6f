pub mod activity;
pub mod app;
pub mod config;
pub mod database;
pub mod errors;
pub mod evaluator;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod scanner;
pub mod store;
pub mod transitions;
pub mod unlock;

// Re-exports for convenience
pub use app::{AppServices, RouteGuards};
pub use errors::{RiskControlError, RiskResult};
pub use evaluator::RiskEvaluator;
pub use gateway::{PaymentGateway, StubPaymentProcessor};
pub use unlock::ManualUnlock;

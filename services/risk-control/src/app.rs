//! Service graph and HTTP wiring shared by the binary and the integration tests.

use crate::activity::ActivityMetrics;
use crate::errors::RiskControlError;
use crate::evaluator::RiskEvaluator;
use crate::gateway::{PaymentGateway, PaymentProcessor};
use crate::handlers;
use crate::middleware::{AdminAuth, RateLimiter, SchedulerSecret};
use crate::policy::RiskPolicy;
use crate::scanner::{DowngradeScanner, EscalationScanner};
use crate::store::RiskControlStore;
use crate::unlock::ManualUnlock;
use actix_web::{error::JsonPayloadError, web, HttpRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppServices {
    pub store: Arc<dyn RiskControlStore>,
    pub evaluator: Arc<RiskEvaluator>,
    pub gateway: Arc<PaymentGateway>,
    pub unlock: Arc<ManualUnlock>,
    pub downgrade: Arc<DowngradeScanner>,
    pub escalation: Arc<EscalationScanner>,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn RiskControlStore>,
        activity: Arc<dyn ActivityMetrics>,
        processor: Arc<dyn PaymentProcessor>,
        policy: RiskPolicy,
    ) -> Self {
        let evaluator = Arc::new(RiskEvaluator::new(store.clone()));
        AppServices {
            gateway: Arc::new(PaymentGateway::new(evaluator.clone(), processor)),
            unlock: Arc::new(ManualUnlock::new(store.clone())),
            downgrade: Arc::new(DowngradeScanner::new(
                store.clone(),
                activity.clone(),
                policy.clone(),
            )),
            escalation: Arc::new(EscalationScanner::new(store.clone(), activity, policy)),
            evaluator,
            store,
        }
    }
}

/// Per-route middleware instances. Cloned into every worker; the rate limiter
/// bucket stays shared.
#[derive(Clone)]
pub struct RouteGuards {
    pub scheduler: SchedulerSecret,
    pub admin: AdminAuth,
    pub payment_rate_limit: RateLimiter,
}

impl RouteGuards {
    pub fn new(
        scheduler_header: &str,
        scheduler_secret: &str,
        jwt_secret: &str,
        payment_requests_per_minute: u32,
    ) -> Self {
        RouteGuards {
            scheduler: SchedulerSecret::new(scheduler_header, scheduler_secret),
            admin: AdminAuth::new(jwt_secret),
            payment_rate_limit: RateLimiter::new(payment_requests_per_minute),
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, services: &AppServices, guards: &RouteGuards) {
    cfg.app_data(web::Data::from(services.store.clone()))
        .app_data(web::Data::from(services.evaluator.clone()))
        .app_data(web::Data::from(services.gateway.clone()))
        .app_data(web::Data::from(services.unlock.clone()))
        .app_data(web::Data::from(services.downgrade.clone()))
        .app_data(web::Data::from(services.escalation.clone()))
        .app_data(web::JsonConfig::default().error_handler(json_error_handler));

    handlers::configure_routes(cfg, guards);
}

fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    RiskControlError::Validation(err.to_string()).into()
}

/// Runs both sweeps on a fixed interval inside the server process.
pub fn spawn_periodic_sweeps(services: AppServices, every: Duration) {
    info!(interval_secs = every.as_secs(), "Starting in-process sweep scheduler");
    actix_web::rt::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = services.downgrade.run().await {
                warn!(error = %e, "Scheduled downgrade sweep failed");
            }
            if let Err(e) = services.escalation.run().await {
                warn!(error = %e, "Scheduled escalation sweep failed");
            }
        }
    });
}

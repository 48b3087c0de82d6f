use crate::app::RouteGuards;
use crate::errors::{RiskControlError, RiskResult};
use crate::evaluator::RiskEvaluator;
use crate::gateway::PaymentGateway;
use crate::metrics;
use crate::middleware::AdminClaims;
use crate::models::*;
use crate::scanner::{DowngradeScanner, EscalationOutcome, EscalationScanner, SweepReport};
use crate::store::RiskControlStore;
use crate::unlock::ManualUnlock;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::warn;
use validator::Validate;

// ===== Health Check =====
pub async fn health_check(store: web::Data<dyn RiskControlStore>) -> HttpResponse {
    match store.ping().await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: "connected".to_string(),
        }),
        Err(e) => {
            warn!(error = %e, "Health check failed to reach store");
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "degraded".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                store: "unavailable".to_string(),
            })
        }
    }
}

// ===== Prometheus =====
pub async fn metrics_endpoint() -> RiskResult<HttpResponse> {
    let body = metrics::render().map_err(|e| RiskControlError::Internal(e.to_string()))?;
    Ok(HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(body))
}

// ===== Risk Check =====
pub async fn check_risk(
    req: web::Json<UserRequest>,
    evaluator: web::Data<RiskEvaluator>,
) -> RiskResult<HttpResponse> {
    let request = req.into_inner();
    request.validate()?;

    let decision = evaluator.check_allowed(&request.user_id).await?;
    Ok(HttpResponse::Ok().json(RiskCheckResponse::from(decision)))
}

// ===== Payment Authorization =====
pub async fn authorize_payment(
    req: web::Json<PaymentAuthorizationRequest>,
    gateway: web::Data<PaymentGateway>,
) -> RiskResult<HttpResponse> {
    let request = req.into_inner();
    request.validate()?;

    let charge = gateway.authorize(request).await?;
    Ok(HttpResponse::Ok().json(charge))
}

// ===== Manual Unlock (admin) =====
pub async fn unlock(
    req: web::Json<UserRequest>,
    claims: web::ReqData<AdminClaims>,
    unlock: web::Data<ManualUnlock>,
) -> RiskResult<HttpResponse> {
    let request = req.into_inner();
    request.validate()?;

    unlock.unlock(&request.user_id, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(json!({"ok": true})))
}

// ===== Escalation (admin) =====
pub async fn escalate(
    req: web::Json<EscalateRequest>,
    claims: web::ReqData<AdminClaims>,
    scanner: web::Data<EscalationScanner>,
) -> RiskResult<HttpResponse> {
    let request = req.into_inner();
    request.validate()?;

    let body = match scanner.escalate(&request.user_id, request.severe).await? {
        EscalationOutcome::Escalated { record, from_level } => {
            tracing::info!(
                user_id = %request.user_id,
                actor = %claims.sub,
                from = from_level,
                to = record.state.level(),
                "Escalated on request"
            );
            json!({
                "ok": true,
                "escalated": true,
                "fromLevel": from_level,
                "record": RiskRecordView::from(&record),
            })
        }
        EscalationOutcome::AlreadyLocked => json!({
            "ok": true,
            "escalated": false,
            "reason": "already_locked",
        }),
    };
    Ok(HttpResponse::Ok().json(body))
}

// ===== Scheduled Sweeps =====
pub async fn run_downgrade(scanner: web::Data<DowngradeScanner>) -> RiskResult<HttpResponse> {
    let report = scanner.run().await?;
    Ok(sweep_response(report))
}

pub async fn run_escalation(scanner: web::Data<EscalationScanner>) -> RiskResult<HttpResponse> {
    let report = scanner.run().await?;
    Ok(sweep_response(report))
}

fn sweep_response(report: SweepReport) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "ok": true,
        "scanner": report.scanner,
        "startedAt": report.started_at,
        "results": report.results,
    }))
}

// ===== Configure Routes =====
pub fn configure_routes(cfg: &mut web::ServiceConfig, guards: &RouteGuards) {
    cfg.service(web::resource("/risk/check").route(web::post().to(check_risk)))
        .service(
            web::resource("/payment/authorize")
                .wrap(guards.payment_rate_limit.clone())
                .route(web::post().to(authorize_payment)),
        )
        .service(
            web::resource("/risk/unlock")
                .wrap(guards.admin.clone())
                .route(web::post().to(unlock)),
        )
        .service(
            web::resource("/risk/escalate")
                .wrap(guards.admin.clone())
                .route(web::post().to(escalate)),
        )
        .service(
            web::resource("/risk/downgrade")
                .wrap(guards.scheduler.clone())
                .route(web::get().to(run_downgrade)),
        )
        .service(
            web::resource("/risk/escalation")
                .wrap(guards.scheduler.clone())
                .route(web::get().to(run_escalation)),
        )
        .route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(metrics_endpoint));
}

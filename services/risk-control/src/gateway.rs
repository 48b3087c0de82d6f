use crate::errors::{RiskControlError, RiskResult};
use crate::evaluator::RiskEvaluator;
use crate::metrics::PAYMENT_AUTHORIZATIONS_TOTAL;
use crate::models::{PaymentAuthorizationRequest, RiskDecision};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    pub user_id: String,
    pub amount: Decimal,
    pub payment_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeResult {
    pub charge_id: Uuid,
    pub status: ChargeStatus,
    pub amount: Decimal,
    pub processor: String,
    pub processed_at: DateTime<Utc>,
}

/// External payment processor that actually moves money.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> RiskResult<ChargeResult>;
}

/// Stand-in processor: accepts every charge with a generated reference.
pub struct StubPaymentProcessor;

#[async_trait]
impl PaymentProcessor for StubPaymentProcessor {
    async fn charge(&self, request: &ChargeRequest) -> RiskResult<ChargeResult> {
        Ok(ChargeResult {
            charge_id: Uuid::new_v4(),
            status: ChargeStatus::Accepted,
            amount: request.amount,
            processor: "stub".to_string(),
            processed_at: Utc::now(),
        })
    }
}

/// Entry point before any charge: risk check first, processor only when allowed.
pub struct PaymentGateway {
    evaluator: Arc<RiskEvaluator>,
    processor: Arc<dyn PaymentProcessor>,
}

impl PaymentGateway {
    pub fn new(evaluator: Arc<RiskEvaluator>, processor: Arc<dyn PaymentProcessor>) -> Self {
        PaymentGateway {
            evaluator,
            processor,
        }
    }

    /// A store failure during the risk check propagates, so no charge is attempted.
    pub async fn authorize(&self, request: PaymentAuthorizationRequest) -> RiskResult<ChargeResult> {
        let decision = match self.evaluator.check_allowed(&request.user_id).await {
            Ok(decision) => decision,
            Err(e) => {
                PAYMENT_AUTHORIZATIONS_TOTAL
                    .with_label_values(&["risk_check_failed"])
                    .inc();
                warn!(user_id = %request.user_id, error = %e, "Risk check failed, refusing payment");
                return Err(e);
            }
        };

        if let RiskDecision::Denied(denial) = decision {
            PAYMENT_AUTHORIZATIONS_TOTAL
                .with_label_values(&["restricted"])
                .inc();
            info!(
                user_id = %request.user_id,
                level = denial.level,
                "Payment rejected by risk control"
            );
            return Err(RiskControlError::Restricted(denial));
        }

        let charge = ChargeRequest {
            user_id: request.user_id,
            amount: request.amount,
            payment_token: request.token,
        };
        let result = self.processor.charge(&charge).await?;

        PAYMENT_AUTHORIZATIONS_TOTAL
            .with_label_values(&["charged"])
            .inc();
        info!(
            user_id = %charge.user_id,
            charge_id = %result.charge_id,
            "Payment forwarded to processor"
        );
        Ok(result)
    }
}

use crate::errors::RiskControlError;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::HeaderName,
    Error,
};
use futures_util::future::LocalBoxFuture;
use sha2::{Digest, Sha256};
use std::future::{ready, Ready};
use std::sync::Arc;

pub const DEFAULT_HEADER: &str = "x-cron-secret";

/// Guards the scheduled sweep routes with a shared secret header.
///
/// Values are compared by SHA-256 digest. An empty configured secret rejects every
/// call.
#[derive(Clone)]
pub struct SchedulerSecret {
    header: HeaderName,
    expected: Option<Arc<[u8; 32]>>,
}

impl SchedulerSecret {
    pub fn new(header: &str, secret: &str) -> Self {
        let header = HeaderName::try_from(header)
            .unwrap_or_else(|_| HeaderName::from_static(DEFAULT_HEADER));
        let expected = if secret.is_empty() {
            None
        } else {
            Some(Arc::new(digest(secret.as_bytes())))
        };
        SchedulerSecret { header, expected }
    }
}

fn digest(value: &[u8]) -> [u8; 32] {
    Sha256::digest(value).into()
}

impl<S, B> Transform<S, ServiceRequest> for SchedulerSecret
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = SchedulerSecretMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SchedulerSecretMiddleware {
            service,
            header: self.header.clone(),
            expected: self.expected.clone(),
        }))
    }
}

pub struct SchedulerSecretMiddleware<S> {
    service: S,
    header: HeaderName,
    expected: Option<Arc<[u8; 32]>>,
}

impl<S, B> Service<ServiceRequest> for SchedulerSecretMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(expected) = self.expected.as_deref() else {
            tracing::warn!(path = req.path(), "Scheduler secret not configured, rejecting");
            return Box::pin(async {
                Err(RiskControlError::Unauthorized("scheduler secret not configured".into()).into())
            });
        };

        let authorized = req
            .headers()
            .get(&self.header)
            .map(|value| digest(value.as_bytes()) == *expected)
            .unwrap_or(false);

        if !authorized {
            tracing::warn!(path = req.path(), "Missing or invalid scheduler secret");
            return Box::pin(async {
                Err(RiskControlError::Unauthorized("invalid scheduler secret".into()).into())
            });
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await })
    }
}

use crate::errors::RiskControlError;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::sync::Arc;

pub const ADMIN_ROLE: &str = "admin";

/// Claims carried by operator tokens. Handlers read them back through
/// `web::ReqData<AdminClaims>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// HS256 bearer-token check for administrator routes.
#[derive(Clone)]
pub struct AdminAuth {
    key: Arc<DecodingKey>,
}

impl AdminAuth {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AdminAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AdminAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AdminAuthMiddleware {
            service,
            key: self.key.clone(),
        }))
    }
}

pub struct AdminAuthMiddleware<S> {
    service: S,
    key: Arc<DecodingKey>,
}

impl<S> AdminAuthMiddleware<S> {
    fn authorize(&self, req: &ServiceRequest) -> Result<AdminClaims, RiskControlError> {
        let token = req
            .headers()
            .get(AUTHORIZATION)
            .ok_or_else(|| RiskControlError::Unauthorized("missing Authorization header".into()))?
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| RiskControlError::Unauthorized("invalid auth header format".into()))?;

        let claims = decode::<AdminClaims>(token, &self.key, &Validation::new(Algorithm::HS256))
            .map_err(|err| {
                tracing::warn!(error = ?err, "JWT validation failed");
                RiskControlError::Unauthorized("invalid or expired token".into())
            })?
            .claims;

        if claims.role != ADMIN_ROLE {
            tracing::warn!(sub = %claims.sub, role = %claims.role, "Non-admin token on admin route");
            return Err(RiskControlError::Forbidden("administrator role required".into()));
        }
        Ok(claims)
    }
}

impl<S, B> Service<ServiceRequest> for AdminAuthMiddleware<S>
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
        match self.authorize(&req) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(err) => Box::pin(async move { Err(err.into()) }),
        }
    }
}

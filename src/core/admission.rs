//! Admission control middleware for the request inspection service.
//!
//! A thin front over the rate limiter, independent of violation
//! blocking: requests over quota are refused with 429, everything else
//! is forwarded untouched. Counter store failures fail open; the
//! limiter is load protection, not the safety gate.

use crate::core::inspector::resolve_client_ip;
use crate::core::rate_limiter::{RateLimitError, RateLimiter, RouteCategory};
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpResponse};
use futures::future::{ok, LocalBoxFuture, Ready};
use log::{error, info};
use metrics::counter;
use std::rc::Rc;
use std::sync::Arc;

/// Middleware factory for admission control
pub struct RateLimitGuard {
    limiter: Arc<RateLimiter>,
}

impl RateLimitGuard {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: Arc::clone(&self.limiter),
        })
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = Arc::clone(&self.limiter);

        Box::pin(async move {
            let client_ip = resolve_client_ip(&req);
            let category = RouteCategory::from_path(&req.path().to_lowercase());

            match limiter.check(&client_ip, category).await {
                Ok(()) => {}
                Err(RateLimitError::ExceededLimit) => {
                    info!(
                        "RATE_LIMITED: {} | category: {} | path: {}",
                        client_ip,
                        category.as_str(),
                        req.path()
                    );
                    counter!("requests_rate_limited_total", 1);
                    let res = req.into_response(
                        HttpResponse::TooManyRequests()
                            .json(serde_json::json!({ "detail": "Too many requests" })),
                    );
                    return Ok(res.map_into_right_body());
                }
                Err(e) => {
                    // Store failure: log and admit.
                    error!("rate limit check failed for {}: {}", client_ip, e);
                }
            }

            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

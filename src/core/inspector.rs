//! Request inspection middleware for the request inspection service.
//!
//! Every request passes through here before reaching the application:
//! already-blocked clients are refused outright, malicious requests are
//! classified and recorded, and clean requests are forwarded and
//! decorated with a timing header.

use crate::core::alerts::{AlertDispatcher, SecurityAlert};
use crate::core::patterns::PatternCatalog;
use crate::core::tracker::ViolationTracker;
use actix_web::body::EitherBody;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue, USER_AGENT};
use actix_web::{Error, HttpResponse};
use futures::future::{ok, LocalBoxFuture, Ready};
use log::{info, warn};
use metrics::counter;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

/// Canonical client address: first entry of X-Forwarded-For (leftmost
/// is the original client), else X-Real-IP, else the transport peer,
/// else "unknown". Header decode failures degrade to the next source.
pub(crate) fn resolve_client_ip(req: &ServiceRequest) -> String {
    if let Some(value) = req.headers().get("x-forwarded-for") {
        if let Ok(list) = value.to_str() {
            if let Some(first) = list.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }

    if let Some(value) = req.headers().get("x-real-ip") {
        if let Ok(ip) = value.to_str() {
            let ip = ip.trim();
            if !ip.is_empty() {
                return ip.to_string();
            }
        }
    }

    if let Some(peer) = req.peer_addr() {
        return peer.ip().to_string();
    }

    "unknown".to_string()
}

/// Truncate on a char boundary; log lines cap query and UA length.
fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

fn denied_response(req: ServiceRequest) -> ServiceResponse {
    req.into_response(
        HttpResponse::Forbidden().json(serde_json::json!({ "detail": "Access denied" })),
    )
}

fn not_found_response(req: ServiceRequest) -> ServiceResponse {
    req.into_response(HttpResponse::NotFound().json(serde_json::json!({ "detail": "Not found" })))
}

/// Middleware factory for request inspection
pub struct RequestInspector {
    catalog: Arc<PatternCatalog>,
    tracker: Arc<ViolationTracker>,
    alerts: Arc<AlertDispatcher>,
}

impl RequestInspector {
    pub fn new(
        catalog: Arc<PatternCatalog>,
        tracker: Arc<ViolationTracker>,
        alerts: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            catalog,
            tracker,
            alerts,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestInspector
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = InspectorMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(InspectorMiddleware {
            service: Rc::new(service),
            catalog: Arc::clone(&self.catalog),
            tracker: Arc::clone(&self.tracker),
            alerts: Arc::clone(&self.alerts),
        })
    }
}

pub struct InspectorMiddleware<S> {
    service: Rc<S>,
    catalog: Arc<PatternCatalog>,
    tracker: Arc<ViolationTracker>,
    alerts: Arc<AlertDispatcher>,
}

impl<S, B> Service<ServiceRequest> for InspectorMiddleware<S>
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
        let catalog = Arc::clone(&self.catalog);
        let tracker = Arc::clone(&self.tracker);
        let alerts = Arc::clone(&self.alerts);

        Box::pin(async move {
            let started = Instant::now();
            let client_ip = resolve_client_ip(&req);

            // Fast path: refuse already-blocked clients without touching
            // the application.
            if tracker.is_blocked(&client_ip).await {
                info!("BLOCKED_IP_REQUEST: {} -> {}", client_ip, req.path());
                counter!("requests_denied_total", 1, "reason" => "blocked_ip");
                return Ok(denied_response(req).map_into_right_body());
            }

            let path = req.path().to_lowercase();
            let query = req.query_string().to_lowercase();
            let user_agent = req
                .headers()
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("")
                .to_lowercase();

            if let Some(violation) = catalog.classify(&path, &query, &user_agent) {
                warn!(
                    "MALICIOUS_REQUEST: {}:{} | IP: {} | Path: {} | Query: {} | UA: {}",
                    violation.category,
                    violation.label,
                    client_ip,
                    req.path(),
                    truncate(&query, 100),
                    truncate(&user_agent, 100),
                );
                counter!("requests_denied_total", 1, "reason" => "pattern_match");

                let blocked_now = tracker.record_violation(&client_ip, &violation.label).await;
                if blocked_now {
                    // Fire and forget; alert delivery must never fail
                    // or delay the request.
                    let alert = SecurityAlert::IpBlocked {
                        ip: client_ip.clone(),
                        rule: violation.label.clone(),
                        path: req.path().to_string(),
                    };
                    tokio::spawn(async move {
                        alerts.dispatch(alert).await;
                    });
                }

                // 404 rather than 403: a probe learns nothing about
                // whether detection or genuine absence answered it.
                return Ok(not_found_response(req).map_into_right_body());
            }

            let mut res = service.call(req).await?;

            let elapsed = started.elapsed().as_secs_f64();
            if let Ok(value) = HeaderValue::from_str(&format!("{:.4}", elapsed)) {
                res.headers_mut()
                    .insert(HeaderName::from_static("x-process-time"), value);
            }

            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::NoopTransport;
    use crate::core::patterns::PatternRules;
    use crate::models::{AlertConfig, InspectionConfig};
    use actix_web::{web, App, HttpResponse};

    fn services(config: &InspectionConfig) -> (Arc<PatternCatalog>, Arc<ViolationTracker>, Arc<AlertDispatcher>) {
        (
            Arc::new(PatternCatalog::new(PatternRules::default()).unwrap()),
            Arc::new(ViolationTracker::new(config)),
            Arc::new(AlertDispatcher::new(
                Arc::new(NoopTransport),
                &AlertConfig::default(),
            )),
        )
    }

    async fn echo() -> HttpResponse {
        HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
    }

    #[actix_web::test]
    async fn test_clean_request_passes_with_timing_header() {
        let (catalog, tracker, alerts) = services(&InspectionConfig::default());
        let app = actix_web::test::init_service(
            App::new()
                .wrap(RequestInspector::new(catalog, tracker, alerts))
                .route("/api/v1/tests", web::get().to(echo)),
        )
        .await;

        let req = actix_web::test::TestRequest::get().uri("/api/v1/tests").to_request();
        let resp = actix_web::test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert!(resp.headers().contains_key("x-process-time"));
    }

    #[actix_web::test]
    async fn test_malicious_path_yields_not_found() {
        let (catalog, tracker, alerts) = services(&InspectionConfig::default());
        let app = actix_web::test::init_service(
            App::new()
                .wrap(RequestInspector::new(catalog, tracker, alerts))
                .route("/api/v1/tests", web::get().to(echo)),
        )
        .await;

        let req = actix_web::test::TestRequest::get().uri("/wp-admin/setup.php").to_request();
        let resp = actix_web::test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_blocked_client_gets_forbidden_on_any_path() {
        let config = InspectionConfig {
            block_threshold: 2,
            ..InspectionConfig::default()
        };
        let (catalog, tracker, alerts) = services(&config);
        let app = actix_web::test::init_service(
            App::new()
                .wrap(RequestInspector::new(catalog, Arc::clone(&tracker), alerts))
                .route("/api/v1/tests", web::get().to(echo)),
        )
        .await;

        for _ in 0..2 {
            let req = actix_web::test::TestRequest::get()
                .uri("/wp-admin")
                .insert_header(("x-real-ip", "203.0.113.5"))
                .to_request();
            let resp = actix_web::test::call_service(&app, req).await;
            assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
        }

        // Now blocked: even a clean path is refused.
        let req = actix_web::test::TestRequest::get()
            .uri("/api/v1/tests")
            .insert_header(("x-real-ip", "203.0.113.5"))
            .to_request();
        let resp = actix_web::test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::FORBIDDEN);

        // A different client is unaffected.
        let req = actix_web::test::TestRequest::get()
            .uri("/api/v1/tests")
            .insert_header(("x-real-ip", "203.0.113.6"))
            .to_request();
        let resp = actix_web::test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_forwarded_for_takes_precedence() {
        let config = InspectionConfig {
            block_threshold: 1,
            ..InspectionConfig::default()
        };
        let (catalog, tracker, alerts) = services(&config);
        let app = actix_web::test::init_service(
            App::new()
                .wrap(RequestInspector::new(catalog, Arc::clone(&tracker), alerts))
                .route("/api/v1/tests", web::get().to(echo)),
        )
        .await;

        let req = actix_web::test::TestRequest::get()
            .uri("/wp-admin")
            .insert_header(("x-forwarded-for", "198.51.100.7, 10.0.0.1"))
            .insert_header(("x-real-ip", "10.0.0.1"))
            .to_request();
        actix_web::test::call_service(&app, req).await;

        // The violation was recorded against the leftmost forwarded IP.
        assert!(tracker.is_blocked("198.51.100.7").await);
        assert!(!tracker.is_blocked("10.0.0.1").await);
    }

    #[actix_web::test]
    async fn test_scanner_user_agent_is_refused() {
        let (catalog, tracker, alerts) = services(&InspectionConfig::default());
        let app = actix_web::test::init_service(
            App::new()
                .wrap(RequestInspector::new(catalog, tracker, alerts))
                .route("/api/v1/tests", web::get().to(echo)),
        )
        .await;

        let req = actix_web::test::TestRequest::get()
            .uri("/api/v1/tests")
            .insert_header((USER_AGENT, "sqlmap/1.7"))
            .to_request();
        let resp = actix_web::test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 3), "ab");
        assert_eq!(truncate("éééé", 2), "éé");
    }
}

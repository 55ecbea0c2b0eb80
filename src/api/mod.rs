//! API endpoints for the request inspection service.
//!
//! This module provides the administrative read surface over the
//! violation tracker, plus a health endpoint.

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::ViolationTracker;
use crate::models::Config;

pub struct ApiState {
    pub tracker: Arc<ViolationTracker>,
    pub config: Arc<Config>,
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health_check)))
            .service(web::resource("/security/stats").route(web::get().to(security_stats)))
            .service(
                web::resource("/security/permanent-block")
                    .route(web::post().to(add_permanent_block)),
            ),
    );
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

/// Permanent block request
#[derive(Debug, Serialize, Deserialize)]
pub struct PermanentBlockRequest {
    pub ip: String,
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Current blocking statistics: active block count, IP -> ISO-8601
/// unblock instant, permanent blocks, tracked IP count.
async fn security_stats(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.tracker.stats().await)
}

/// Administratively add an IP to the permanent block list. There is no
/// unblock counterpart.
async fn add_permanent_block(
    state: web::Data<ApiState>,
    req: web::Json<PermanentBlockRequest>,
) -> impl Responder {
    state.tracker.add_permanent_block(&req.ip).await;
    HttpResponse::Ok().json(serde_json::json!({ "status": "blocked", "ip": req.ip }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TrackerStats;
    use actix_web::{test, App};

    fn state() -> web::Data<ApiState> {
        let config = Arc::new(Config::default());
        web::Data::new(ApiState {
            tracker: Arc::new(ViolationTracker::new(&config.inspection)),
            config,
        })
    }

    #[actix_web::test]
    async fn test_health_check() {
        let app = test::init_service(App::new().app_data(state()).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/v1/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_security_stats_reflect_permanent_blocks() {
        let state = state();
        let app = test::init_service(
            App::new().app_data(state.clone()).configure(config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/security/permanent-block")
            .set_json(PermanentBlockRequest {
                ip: "203.0.113.9".to_string(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get().uri("/api/v1/security/stats").to_request();
        let stats: TrackerStats = test::call_and_read_body_json(&app, req).await;

        assert_eq!(stats.permanent_blocks, vec!["203.0.113.9".to_string()]);
        assert_eq!(stats.currently_blocked, 0);
        assert_eq!(stats.tracked_ips, 0);
    }
}

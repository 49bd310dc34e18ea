mod auth;
mod products;
mod readings;
mod stats;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use chrono::NaiveDate;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::auth::middleware::require_auth;
use crate::config::Config;
use crate::db::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
}

async fn health() -> &'static str {
    "ok"
}

/// The calendar day readings are validated and aggregated against.
pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Per-IP rate limit. `per_second` is the replenish interval, `burst` the bucket size.
fn rate_limited(router: Router<AppState>, enabled: bool, per_second: u64, burst: u32) -> Router<AppState> {
    if !enabled {
        return router;
    }

    match GovernorConfigBuilder::default()
        .per_second(per_second)
        .burst_size(burst)
        .finish()
    {
        Some(governor) => router.layer(GovernorLayer::new(Arc::new(governor))),
        None => {
            tracing::warn!(per_second, burst, "invalid rate limit settings, serving without a limiter");
            router
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let limit = state.config.rate_limit;

    // Health checks — no rate limit
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health));

    // Auth routes — 10 requests per 60 seconds per IP
    let auth_routes = rate_limited(
        Router::new()
            .route("/api/v1/auth/register", post(auth::register))
            .route("/api/v1/auth/login", post(auth::login))
            .route("/api/v1/auth/logout", post(auth::logout)),
        limit,
        6,
        10,
    );

    let protected = Router::new()
        // Auth
        .route("/api/v1/auth/me", get(auth::me))
        // Readings
        .route(
            "/api/v1/readings",
            get(readings::list).post(readings::submit),
        )
        .route("/api/v1/readings/chart", get(readings::chart))
        .route("/api/v1/readings/{date}", delete(readings::delete))
        // Statistics
        .route("/api/v1/stats", get(stats::summary))
        .route("/api/v1/dashboard", get(stats::dashboard))
        // Product price list
        .route(
            "/api/v1/products",
            get(products::list).post(products::create),
        )
        .route("/api/v1/products/catalog", get(products::catalog))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    // Protected API — 120 requests per 60 seconds per IP
    let protected = rate_limited(protected, limit, 2, 120);

    Router::new()
        .merge(health_routes)
        .merge(auth_routes)
        .merge(protected)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use chrono::Duration;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::StatsConfig;
    use crate::db::testing::temp_pool;

    fn test_config(multi_tenant: bool) -> Config {
        Config {
            server_port: 0,
            sqlite_path: String::new(),
            cors_origin: "http://localhost:3000".into(),
            secure_cookies: false,
            rate_limit: false,
            allow_backdated_readings: true,
            stats: StatsConfig {
                rate_per_unit: 2.25,
                optimal_generation: 30.0,
                multi_tenant,
            },
        }
    }

    fn app(multi_tenant: bool) -> (Router, tempfile::TempDir) {
        let (db, dir) = temp_pool();
        let router = create_router(AppState {
            db,
            config: test_config(multi_tenant),
        });
        (router, dir)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Option<String>, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let set_cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, set_cookie, json)
    }

    async fn register(app: &Router, email: &str) -> String {
        let (status, cookie, _) = send(
            app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({"email": email, "password": "sunny-days-42"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        cookie.expect("session cookie")
    }

    fn days_ago(n: i64) -> String {
        (today() - Duration::days(n)).to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (app, _dir) = app(true);
        let (status, _, _) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn reading_routes_require_a_session() {
        let (app, _dir) = app(true);
        for (method, uri) in [
            (Method::GET, "/api/v1/readings"),
            (Method::GET, "/api/v1/stats"),
            (Method::POST, "/api/v1/readings"),
            (Method::DELETE, "/api/v1/readings/2026-01-01"),
        ] {
            let (status, _, _) = send(&app, method, uri, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }

        let (status, _, _) = send(
            &app,
            Method::GET,
            "/api/v1/stats",
            Some("solarmeter_session=forged"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn login_and_logout() {
        let (app, _dir) = app(true);
        register(&app, "ana@example.com").await;

        let (status, _, _) = send(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "ana@example.com", "password": "wrong-password"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, cookie, body) = send(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"email": "ana@example.com", "password": "sunny-days-42"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "ana@example.com");
        let cookie = cookie.unwrap();

        let (status, _, _) = send(&app, Method::GET, "/api/v1/auth/me", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);

        send(&app, Method::POST, "/api/v1/auth/logout", Some(&cookie), None).await;
        let (status, _, _) = send(&app, Method::GET, "/api/v1/auth/me", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (app, _dir) = app(true);
        register(&app, "ana@example.com").await;
        let (status, _, _) = send(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({"email": "ana@example.com", "password": "sunny-days-42"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn submit_list_stats_and_delete() {
        let (app, _dir) = app(true);
        let cookie = register(&app, "ana@example.com").await;

        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&cookie),
            Some(json!({"today_reading": 100.0, "date": days_ago(2)})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "created");
        assert_eq!(body["reading"]["daily_generation"], 0.0);

        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&cookie),
            Some(json!({"meter_reading": 130.0, "date": days_ago(1)})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["reading"]["daily_generation"], 30.0);

        // Defaults to today.
        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&cookie),
            Some(json!({"meter_reading": 125.0})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid reading"));

        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&cookie),
            Some(json!({"meter_reading": 140.0, "date": days_ago(1)})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "updated");
        assert_eq!(body["reading"]["daily_generation"], 40.0);

        let (_, _, list) = send(
            &app,
            Method::GET,
            "/api/v1/readings?order=asc",
            Some(&cookie),
            None,
        )
        .await;
        let dates: Vec<_> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["date"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(dates, vec![days_ago(2), days_ago(1)]);

        let (status, _, stats) = send(&app, Method::GET, "/api/v1/stats", Some(&cookie), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["totalGeneration"], 40.0);
        assert_eq!(stats["monthlySavings"], 90.0);
        assert_eq!(stats["avgGeneration"], 20.0);
        assert_eq!(stats["currentMeterReading"], 140.0);

        let uri = format!("/api/v1/readings/{}", days_ago(1));
        let (status, _, _) = send(&app, Method::DELETE, &uri, Some(&cookie), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _, _) = send(&app, Method::DELETE, &uri, Some(&cookie), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_submissions_are_rejected() {
        let (app, _dir) = app(true);
        let cookie = register(&app, "ana@example.com").await;

        for body in [
            json!({}),
            json!({"meter_reading": 0}),
            json!({"meter_reading": -3.5}),
        ] {
            let (status, _, _) =
                send(&app, Method::POST, "/api/v1/readings", Some(&cookie), Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        let tomorrow = (today() + Duration::days(1)).to_string();
        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&cookie),
            Some(json!({"meter_reading": 10.0, "date": tomorrow})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("future"));
    }

    #[tokio::test]
    async fn meter_value_as_string() {
        let (app, _dir) = app(true);
        let cookie = register(&app, "ana@example.com").await;

        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&cookie),
            Some(json!({"today_reading": "abc"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid meter reading provided.");

        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&cookie),
            Some(json!({"today_reading": "120"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["reading"]["meter_reading"], 120.0);
    }

    #[tokio::test]
    async fn users_never_see_each_others_readings() {
        let (app, _dir) = app(true);
        let ana = register(&app, "ana@example.com").await;
        let bob = register(&app, "bob@example.com").await;

        send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&ana),
            Some(json!({"meter_reading": 100.0, "date": days_ago(1)})),
        )
        .await;
        send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&ana),
            Some(json!({"meter_reading": 150.0})),
        )
        .await;

        let (_, _, list) = send(&app, Method::GET, "/api/v1/readings", Some(&bob), None).await;
        assert_eq!(list, json!([]));

        let (_, _, stats) = send(&app, Method::GET, "/api/v1/stats", Some(&bob), None).await;
        assert_eq!(stats["totalGeneration"], 0.0);
        assert_eq!(stats["lastUpdate"], Value::Null);

        let uri = format!("/api/v1/readings/{}", days_ago(1));
        let (status, _, _) = send(&app, Method::DELETE, &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, _, dashboard) = send(&app, Method::GET, "/api/v1/dashboard", Some(&ana), None).await;
        assert_eq!(dashboard["readings"].as_array().unwrap().len(), 2);
        assert_eq!(dashboard["stats"]["todayGeneration"], 50.0);
    }

    #[tokio::test]
    async fn single_tenant_mode_shares_one_history() {
        let (app, _dir) = app(false);
        let ana = register(&app, "ana@example.com").await;
        let bob = register(&app, "bob@example.com").await;

        send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&ana),
            Some(json!({"meter_reading": 100.0, "date": days_ago(1)})),
        )
        .await;
        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/v1/readings",
            Some(&bob),
            Some(json!({"meter_reading": 112.0})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["reading"]["daily_generation"], 12.0);

        let (_, _, chart) = send(&app, Method::GET, "/api/v1/readings/chart", Some(&ana), None).await;
        assert_eq!(chart.as_array().unwrap().len(), 2);
        assert_eq!(chart[1]["meter_reading"], 112.0);
    }

    #[tokio::test]
    async fn product_catalog() {
        let (app, _dir) = app(true);
        let cookie = register(&app, "ana@example.com").await;

        let (status, _, body) = send(
            &app,
            Method::POST,
            "/api/v1/products",
            Some(&cookie),
            Some(json!([
                {"item_name": "Ball valve", "size_half_price": 120, "size_one_price": 180,
                 "category": "Valves", "company": "Acme"},
                {"item_name": "Elbow", "size_two_price": 40, "category": "Fittings"}
            ])),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["inserted_rows"], 2);

        let (_, _, valves) = send(
            &app,
            Method::GET,
            "/api/v1/products?filter_type=category&filter_value=Valves",
            Some(&cookie),
            None,
        )
        .await;
        assert_eq!(valves.as_array().unwrap().len(), 1);
        assert_eq!(valves[0]["sizes"].as_array().unwrap().len(), 7);

        let (status, _, acme) = send(
            &app,
            Method::GET,
            "/api/v1/products?filterType=company&filterValue=Acme",
            Some(&cookie),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(acme.as_array().unwrap().len(), 1);
        assert_eq!(acme[0]["item_name"], "Ball valve");

        let (status, _, _) = send(
            &app,
            Method::GET,
            "/api/v1/products?filter_type=colour",
            Some(&cookie),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, _, catalog) =
            send(&app, Method::GET, "/api/v1/products/catalog", Some(&cookie), None).await;
        assert_eq!(catalog["categories"], json!(["Fittings", "Valves"]));
        assert_eq!(catalog["companies"], json!(["Acme"]));
        // "Ball valve" sorts first; only its two priced sizes are offered.
        assert_eq!(catalog["products"][0]["sizes"].as_array().unwrap().len(), 2);
    }
}

use anyhow::{bail, Context};
use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::from_fn_with_state,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::time::Duration;
use tokio::time;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info, instrument, warn};

// Security libraries
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

mod config;
mod constants;
mod database;
mod handlers;
mod middleware;
mod models;
mod services;
mod store;
mod types;
mod utils;

use config::{AppConfig, StorageConfig};
use database::{Database, PoolStatus, SqlServerStore};
use handlers::{admin, assistant, counts, data_files, items, users};
use middleware::auth::jwt_auth_middleware;
use models::UserProfile;
use services::{AssistantConfig, AssistantService, CountService, InventoryService, UserService};
use store::{InventoryStore, LocalStore, UnconfiguredStore};
use types::{ApiResponse, LoginRequest, LoginResponse};
use utils::AuthService;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InventoryStore>,
    pub database: Option<Database>,
    pub inventory: InventoryService,
    pub counts: CountService,
    pub users: UserService,
    pub assistant: AssistantService,
    pub auth_service: AuthService,
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("backend", &self.store.backend())
            .field("database", &self.database)
            .field("assistant_configured", &self.assistant.is_configured())
            .finish()
    }
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn InventoryStore>,
        database: Option<Database>,
    ) -> anyhow::Result<Self> {
        let auth_service = AuthService::new(
            config.jwt_secret.as_deref(),
            config.jwt_duration_hours,
            config.production,
        )
        .context("Failed to initialize JWT authentication service")?;
        let assistant = AssistantService::new(
            AssistantConfig {
                api_key: config.anthropic_api_key.clone(),
                model: config.anthropic_model.clone(),
            },
            store.clone(),
        )?;

        Ok(Self {
            inventory: InventoryService::new(store.clone(), config.strict_pulls),
            counts: CountService::new(store.clone()),
            users: UserService::new(store.clone()),
            assistant,
            auth_service,
            store,
            database,
            config: Arc::new(config),
        })
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: String,
    pub message: String,
    pub timestamp: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct StorageStatusResponse {
    pub success: bool,
    pub backend: String,
    pub database: Option<String>,
    pub pool: Option<PoolStatus>,
    pub strict_pulls: bool,
    pub assistant_configured: bool,
    pub timestamp: String,
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "healthy".to_string(),
        message: "Materials inventory backend is running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: VERSION.to_string(),
    })
}

/// Storage status endpoint - shows which backend is serving data
async fn storage_status(State(state): State<AppState>) -> Json<StorageStatusResponse> {
    Json(StorageStatusResponse {
        success: true,
        backend: state.store.backend().as_str().to_string(),
        database: state
            .database
            .as_ref()
            .map(|db| db.get_database_name().to_string()),
        pool: state.database.as_ref().map(Database::get_pool_status),
        strict_pulls: state.config.strict_pulls,
        assistant_configured: state.assistant.is_configured(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Authentication status check endpoint
async fn auth_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ApiResponse<bool>> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        return match state.auth_service.verify_token(token.trim()) {
            Ok(_) => Json(ApiResponse::success(true, "User is authenticated")),
            Err(_) => Json(ApiResponse::success(false, "Invalid token")),
        };
    }

    Json(ApiResponse::success(false, "No authentication token provided"))
}

/// PIN login issuing a JWT
#[instrument(skip(state, request))]
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> (StatusCode, Json<ApiResponse<LoginResponse>>) {
    info!("🔐 Login attempt received");

    let user = match state.users.validate_pin(request.pin.trim()).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            warn!("❌ Login rejected: no active user with that PIN");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::error(constants::MSG_AUTH_FAILED)),
            );
        }
        Err(e) => {
            error!("🚨 Login lookup failed: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(
                    "Authentication service unavailable. Please contact system administrator.",
                )),
            );
        }
    };

    match state.auth_service.generate_token(&user) {
        Ok(issued) => {
            info!("✅ {} signed in", user.id);
            let response = LoginResponse {
                token: issued.token,
                token_type: "Bearer".to_string(),
                expires_at: issued.expires_at,
                expires_in: issued.expires_in,
                user: UserProfile::from(&user),
            };
            (
                StatusCode::OK,
                Json(ApiResponse::success(response, constants::MSG_AUTH_SUCCESS)),
            )
        }
        Err(e) => {
            error!("❌ Failed to generate JWT token: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error("Failed to generate authentication token")),
            )
        }
    }
}

/// Limits login attempts per client address
async fn rate_limit_middleware(
    State(limiter): State<Arc<DefaultKeyedRateLimiter<SocketAddr>>>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, StatusCode> {
    let addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    match limiter.check_key(&addr) {
        Ok(()) => Ok(next.run(request).await),
        Err(_) => {
            warn!("🚫 Rate limit exceeded for IP: {}", addr);
            Err(StatusCode::TOO_MANY_REQUESTS)
        }
    }
}

/// Serve the built frontend, falling back to index.html for client-side routes
async fn handle_spa_or_static(State(state): State<AppState>, uri: axum::http::Uri) -> impl IntoResponse {
    let path = uri.path().trim_start_matches('/');

    if path.starts_with("api/") || path == "api" {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "Not found",
                "message": format!("No API route for /{path}")
            })),
        )
            .into_response();
    }

    let assets = &state.config.static_assets_path;
    if !path.is_empty() && !path.contains("..") && path.contains('.') {
        if let Ok(content) = tokio::fs::read(assets.join(path)).await {
            let content_type = match path.rsplit('.').next().unwrap_or("") {
                "js" => "application/javascript",
                "css" => "text/css",
                "html" => "text/html",
                "json" => "application/json",
                "png" => "image/png",
                "jpg" | "jpeg" => "image/jpeg",
                "svg" => "image/svg+xml",
                "ico" => "image/x-icon",
                "webmanifest" => "application/manifest+json",
                _ => "application/octet-stream",
            };
            return ([(header::CONTENT_TYPE, content_type)], content).into_response();
        }
    }

    let index_path = assets.join("index.html");
    match tokio::fs::read_to_string(&index_path).await {
        Ok(content) => Html(content).into_response(),
        Err(e) => {
            warn!("🚨 Failed to read index.html from {}: {}", index_path.display(), e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn build_cors(config: &AppConfig) -> anyhow::Result<CorsLayer> {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION];

    if config.cors_origins == "*" {
        if config.production {
            bail!("CORS wildcard (*) is not allowed in production. Set CORS_ORIGINS to specific origins");
        }
        warn!("⚠️ CORS is configured with wildcard (*) - this is only acceptable for development!");
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers));
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();
    if origins.is_empty() {
        bail!("No valid CORS origins found in CORS_ORIGINS");
    }
    info!("🔒 CORS configured for specific origins: {}", config.cors_origins);
    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true))
}

pub fn create_app(state: AppState) -> anyhow::Result<Router> {
    let cors = build_cors(&state.config)?;

    let security_headers = tower_http::set_header::SetResponseHeaderLayer::overriding(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    let x_frame_options = tower_http::set_header::SetResponseHeaderLayer::overriding(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    );
    let x_xss_protection = tower_http::set_header::SetResponseHeaderLayer::overriding(
        header::HeaderName::from_static("x-xss-protection"),
        HeaderValue::from_static("1; mode=block"),
    );

    let quota = NonZeroU32::new(constants::AUTH_RATE_LIMIT_PER_MINUTE).unwrap_or(NonZeroU32::MIN);
    let auth_rate_limiter = Arc::new(RateLimiter::keyed(Quota::per_minute(quota)));

    let login_routes = Router::new()
        .route("/api/auth/login", post(login))
        .route_layer(from_fn_with_state(auth_rate_limiter, rate_limit_middleware));

    let protected = Router::new()
        .merge(items::create_item_routes())
        .merge(counts::create_count_routes())
        .merge(users::create_user_routes())
        .merge(assistant::create_assistant_routes())
        .merge(data_files::create_data_file_routes())
        .merge(admin::create_admin_routes())
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    Ok(Router::new()
        .route("/api/health", get(health_check))
        .route("/api/storage/status", get(storage_status))
        .route("/api/auth/status", get(auth_status))
        .merge(login_routes)
        .nest("/api", protected)
        .nest_service(
            "/assets",
            ServeDir::new(state.config.static_assets_path.join("assets")),
        )
        .fallback(handle_spa_or_static)
        .layer(cors)
        .layer(security_headers)
        .layer(x_frame_options)
        .layer(x_xss_protection)
        .with_state(state))
}

/// Open the configured backend; SQL Server also gets its tables created
async fn open_store(
    storage: &StorageConfig,
) -> anyhow::Result<(Arc<dyn InventoryStore>, Option<Database>)> {
    match storage {
        StorageConfig::SqlServer(db_config) => {
            let database = Database::connect(db_config.clone())
                .await
                .context("Failed to initialize database with connection pool")?;
            database
                .ensure_schema()
                .await
                .context("Failed to create inventory tables")?;
            Ok((Arc::new(SqlServerStore::new(database.clone())), Some(database)))
        }
        StorageConfig::Local { path } => {
            let store = LocalStore::open(path)
                .await
                .with_context(|| format!("Failed to open local store {}", path.display()))?;
            Ok((Arc::new(store), None))
        }
        StorageConfig::Unconfigured => {
            warn!("⚠️  No storage backend configured - reads return empty data and writes are refused");
            Ok((Arc::new(UnconfiguredStore), None))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment-based filtering
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "materials_inventory_backend=info,tower_http=warn".to_string()
        } else {
            "materials_inventory_backend=warn,tower_http=error".to_string()
        }
    });
    std::env::set_var("RUST_LOG", &log_level);

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("🚀 Starting Materials Inventory Backend v{}", VERSION);

    let config = AppConfig::from_env()?;
    info!("Server configured to run on {}:{}", config.server_host, config.server_port);
    info!("💾 Storage backend: {}", config.storage.name());
    if config.strict_pulls {
        info!("🔒 Strict pulls enabled - pulls beyond on-hand stock are rejected");
    }

    let (store, database) = open_store(&config.storage).await?;
    let state = AppState::new(config, store, database)?;

    match state.users.seed_default_user().await {
        Ok(Some(user)) => info!("👤 User table ready (first user: {})", user.id),
        Ok(None) => warn!("⚠️  No users available - PIN login is disabled"),
        Err(e) => error!("🚨 Failed to seed default user: {}", e),
    }

    let addr = format!("{}:{}", state.config.server_host, state.config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {addr}"))?;

    info!("🎯 Inventory server started successfully on http://{}", addr);
    info!("📁 Serving static files from {}", state.config.static_assets_path.display());

    if let Some(database) = state.database.clone() {
        tokio::spawn(async move {
            monitor_pool_health(database).await;
        });
    }

    let app = create_app(state)?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server failed to start")?;

    Ok(())
}

/// Monitor connection pool health and log warnings
async fn monitor_pool_health(database: Database) {
    loop {
        time::sleep(Duration::from_secs(constants::POOL_MONITOR_INTERVAL_SECS)).await;

        let pool_status = database.get_pool_status();
        let usage_percent = pool_status.usage_percent();

        if usage_percent >= constants::POOL_HIGH_USAGE_THRESHOLD {
            error!(
                connections = pool_status.total_connections,
                idle = pool_status.idle_connections,
                max = pool_status.max_size,
                utilization = %format!("{:.1}%", usage_percent),
                "⚠️ Connection pool utilization HIGH - consider increasing DATABASE_MAX_CONNECTIONS"
            );
        } else if usage_percent >= constants::POOL_ELEVATED_USAGE_THRESHOLD {
            info!(
                connections = pool_status.total_connections,
                idle = pool_status.idle_connections,
                max = pool_status.max_size,
                utilization = %format!("{:.1}%", usage_percent),
                "⚡ Connection pool utilization elevated"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use crate::models::{Role, User};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret-at-least-32-characters";

    async fn test_state() -> AppState {
        let config = AppConfig::from_lookup(|key: &str| match key {
            "JWT_SECRET" => Some(SECRET.to_string()),
            "STORAGE_BACKEND" => Some("local".to_string()),
            _ => None,
        })
        .unwrap();
        let store: Arc<dyn InventoryStore> = Arc::new(LocalStore::in_memory());
        let mut state = AppState::new(config, store.clone(), None).unwrap();
        state.users = UserService::with_hash_cost(store, 4);
        state.users.seed_default_user().await.unwrap();
        state
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn admin_token(app: &Router) -> String {
        let (status, body) = send(
            app,
            json_request("POST", "/api/auth/login", None, json!({ "pin": "1234" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = create_app(test_state().await).unwrap();
        let response = app.clone().oneshot(get_request("/api/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::X_FRAME_OPTIONS).unwrap(),
            "DENY"
        );

        let (status, body) = send(&app, get_request("/api/storage/status", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["backend"], "local");
    }

    #[tokio::test]
    async fn test_protected_routes_need_token() {
        let app = create_app(test_state().await).unwrap();
        let (status, body) = send(&app, get_request("/api/items", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let (status, _) = send(&app, get_request("/api/items", Some("not-a-token"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_pin_rejected() {
        let app = create_app(test_state().await).unwrap();
        let (status, body) = send(
            &app,
            json_request("POST", "/api/auth/login", None, json!({ "pin": "9999" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_login_rate_limited() {
        let app = create_app(test_state().await).unwrap();
        for _ in 0..constants::AUTH_RATE_LIMIT_PER_MINUTE {
            let (status, _) = send(
                &app,
                json_request("POST", "/api/auth/login", None, json!({ "pin": "0000" })),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/auth/login", None, json!({ "pin": "1234" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_pull_flow_over_http() {
        let app = create_app(test_state().await).unwrap();
        let token = admin_token(&app).await;

        let (status, item) = send(
            &app,
            json_request(
                "POST",
                "/api/items",
                Some(&token),
                json!({ "name": "Trespa Meteon 8mm", "category": "Trespa", "quantity": 50, "location": "Tent 1" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = item["id"].as_str().unwrap().to_string();

        let (status, applied) = send(
            &app,
            json_request(
                "POST",
                &format!("/api/items/{id}/pull"),
                Some(&token),
                json!({ "quantity": 20, "job_reference": "JOB-7" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(applied["item"]["quantity"], 30);
        assert_eq!(applied["transaction"]["type"], "pull");
        assert_eq!(applied["transaction"]["user_id"], "admin");

        let (status, history) =
            send(&app, get_request(&format!("/api/items/{id}/history"), Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/items/missing/pull",
                Some(&token),
                json!({ "quantity": 1 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Item not found");

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                &format!("/api/items/{id}/return"),
                Some(&token),
                json!({ "quantity": i32::MAX }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, item) = send(&app, get_request(&format!("/api/items/{id}"), Some(&token))).await;
        assert_eq!(item["quantity"], 30);
    }

    #[tokio::test]
    async fn test_user_management_is_admin_only() {
        let state = test_state().await;
        let counter = User {
            id: "u2".to_string(),
            name: "Counter".to_string(),
            pin: String::new(),
            role: Role::Counter,
            active: true,
            created_at: chrono::Utc::now(),
        };
        let token = state.auth_service.generate_token(&counter).unwrap().token;
        let app = create_app(state).unwrap();

        let (status, _) = send(&app, get_request("/api/users", Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, json_request("POST", "/api/admin/reset", Some(&token), json!({}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = admin_token(&app).await;
        let (status, users) = send(&app, get_request("/api/users", Some(&admin))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(users[0].get("pin").is_none());
    }

    #[tokio::test]
    async fn test_unknown_api_path_is_json_404() {
        let app = create_app(test_state().await).unwrap();
        let (status, body) = send(&app, get_request("/api/nope", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not found");
    }

    #[tokio::test]
    async fn test_wildcard_cors_refused_in_production() {
        let mut state = test_state().await;
        let mut config = (*state.config).clone();
        config.production = true;
        state.config = Arc::new(config);
        assert!(create_app(state).is_err());
    }
}

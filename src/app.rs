use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

use crate::auth::{AuthGate, ProfileRoleResolver, Role};
use crate::config::{AppConfig, RateLimitConfig, SecurityConfig};
use crate::handlers::{protected, public, system};
use crate::middleware::rate_limit::{API_LIMIT_MESSAGE, AUTH_LIMIT_MESSAGE};
use crate::middleware::{
    csrf_protection, rate_limit, require_auth, require_role, CsrfSecret, RateLimit, RoleGuard, CSRF_HEADER,
};
use crate::provider::{
    IdentityProvider, PgProfileStore, PostgrestProfileStore, ProfileStore, SupabaseAuth,
};

// Static policy; the API serves no HTML
const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; \
    img-src 'self' data: https:; connect-src 'self'; frame-ancestors 'none'; base-uri 'self'; form-action 'self'";

/// Shared handles every handler and middleware reaches through `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identity: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub gate: Arc<AuthGate>,
    pub csrf: Option<CsrfSecret>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        let roles = Arc::new(ProfileRoleResolver::new(profiles.clone()));
        let gate = Arc::new(AuthGate::new(identity.clone(), roles));
        let csrf = config.security.csrf_secret.clone().map(CsrfSecret::new);

        Self {
            config: Arc::new(config),
            identity,
            profiles,
            gate,
            csrf,
        }
    }

    /// Wire the hosted backend: GoTrue for identity, and Postgres for profiles
    /// when `DATABASE_URL` is set, PostgREST otherwise.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let identity: Arc<dyn IdentityProvider> = Arc::new(SupabaseAuth::new(&config.supabase)?);

        let profiles: Arc<dyn ProfileStore> = if config.database.url.is_some() {
            Arc::new(PgProfileStore::connect(&config.database).await?)
        } else {
            tracing::info!("DATABASE_URL not set, reading profiles through PostgREST");
            Arc::new(PostgrestProfileStore::new(&config.supabase)?)
        };

        Ok(Self::new(config, identity, profiles))
    }
}

pub fn app(state: AppState) -> Router {
    let limits = &state.config.rate_limit;
    let api = Router::new()
        .nest("/auth", auth_routes(&state))
        .nest("/admin", admin_routes(&state));
    let api = match limiter(limits, limits.max_requests, API_LIMIT_MESSAGE) {
        Some(limit) => api.layer(middleware::from_fn_with_state(limit, rate_limit)),
        None => api,
    };

    let router = Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .nest(&state.config.api_prefix(), api)
        .fallback(system::not_found)
        .with_state(state.clone());

    let router = security_headers(router, &state.config.security);

    router
        .layer(cors_layer(&state.config.security))
        .layer(TraceLayer::new_for_http())
}

/// Gate a router: bearer authentication first, then CSRF when configured.
fn protect(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    let router = match &state.csrf {
        Some(secret) => router.route_layer(middleware::from_fn_with_state(secret.clone(), csrf_protection)),
        None => router,
    };
    router.route_layer(middleware::from_fn_with_state(state.gate.clone(), require_auth))
}

fn auth_routes(state: &AppState) -> Router<AppState> {
    use protected::auth as session;
    use public::auth;

    let credentials = Router::new()
        .route("/signup", post(auth::signup))
        .route("/signin", post(auth::signin))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password));
    let limits = &state.config.rate_limit;
    let credentials = match limiter(limits, limits.auth_max_requests, AUTH_LIMIT_MESSAGE) {
        Some(limit) => credentials.route_layer(middleware::from_fn_with_state(limit, rate_limit)),
        None => credentials,
    };

    let public = credentials.route("/refresh", post(auth::refresh));

    let protected = Router::new()
        .route("/signout", post(session::signout))
        .route("/profile", get(session::profile_get).put(session::profile_put))
        .route("/whoami", get(session::whoami))
        .route("/csrf-token", get(session::csrf_token));

    public.merge(protect(protected, state))
}

fn admin_routes(state: &AppState) -> Router<AppState> {
    use protected::admin;

    let admins_only = RoleGuard::any_of([Role::Admin]);
    let staff = RoleGuard::any_of([Role::Admin, Role::Manager]);

    let router = Router::new()
        .route("/users", get(admin::users_list))
        .route("/users/:id", get(admin::user_show))
        .route(
            "/users/:id/role",
            put(admin::user_role_put)
                .route_layer(middleware::from_fn_with_state(admins_only, require_role)),
        )
        .route_layer(middleware::from_fn_with_state(staff, require_role));

    protect(router, state)
}

fn limiter(limits: &RateLimitConfig, max_requests: u32, message: &'static str) -> Option<RateLimit> {
    if !limits.enabled {
        return None;
    }
    let limit = RateLimit::per_window(max_requests, Duration::from_millis(limits.window_ms), message);
    if limit.is_none() {
        tracing::warn!("Ignoring rate limit of {} requests per {}ms", max_requests, limits.window_ms);
    }
    limit
}

fn security_headers(router: Router, security: &SecurityConfig) -> Router {
    let router = router
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ));

    if security.require_https {
        router.layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains; preload"),
        ))
    } else {
        router
    }
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if security.permissive_cors {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(CSRF_HEADER),
        ])
        .allow_credentials(true)
}

pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    handler::Handler,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::HelpdeskConfig;
use crate::dtos::ErrorResponse;
use crate::middleware::{authentication_middleware, authorize_middleware, guard};
use crate::services::{
    AccessStore, AuthService, CatalogService, GrantService, PolicyEvaluator, PolicyService,
    RoleAggregator, TokenService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::policy::create_policy,
        handlers::policy::list_policies,
        handlers::policy::get_policy,
        handlers::policy::delete_policy,
        handlers::policy::reload_policies,
        handlers::user_role::grant_role,
        handlers::user_role::revoke_role,
        handlers::user_role::role_users,
        handlers::user_role::user_roles,
        handlers::user_role::my_permissions,
        handlers::role::create_role,
        handlers::role::list_roles,
        handlers::role::get_role,
        handlers::role::update_role,
        handlers::role::delete_role,
        handlers::object::create_object,
        handlers::object::list_objects,
        handlers::object::get_object,
        handlers::object::update_object,
        handlers::object::delete_object,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::RefreshRequest,
            dtos::access::CreatePolicyRequest,
            dtos::access::CreateRoleRequest,
            dtos::access::UpdateRoleRequest,
            dtos::access::CreateObjectRequest,
            dtos::access::UpdateObjectRequest,
            dtos::access::ReloadResponse,
            dtos::access::PermissionsResponse,
            services::AuthToken,
            services::PermissionSummary,
            models::Policy,
            models::Role,
            models::Object,
            models::SecondaryRoleGrant,
            models::SanitizedUser,
            models::UserType,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login and token refresh"),
        (name = "Policies", description = "Permission rules and the enforcer"),
        (name = "User Roles", description = "Secondary role grants"),
        (name = "Roles", description = "Role records"),
        (name = "Objects", description = "Protected resource classes"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: HelpdeskConfig,
    pub store: Arc<dyn AccessStore>,
    pub tokens: Arc<TokenService>,
    pub evaluator: Arc<dyn PolicyEvaluator>,
    pub roles: Arc<RoleAggregator>,
    pub auth_service: AuthService,
    pub policy_service: PolicyService,
    pub catalog_service: CatalogService,
    pub grant_service: GrantService,
    pub login_rate_limiter: IpRateLimiter,
}

impl AppState {
    pub fn new(
        config: HelpdeskConfig,
        store: Arc<dyn AccessStore>,
        evaluator: Arc<dyn PolicyEvaluator>,
    ) -> Result<Self, AppError> {
        let tokens = Arc::new(TokenService::new(&config.jwt).map_err(AppError::ConfigError)?);
        let roles = Arc::new(RoleAggregator::new(
            store.clone(),
            Duration::from_secs(config.roles.cache_ttl_seconds),
        ));
        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );

        Ok(Self {
            auth_service: AuthService::new(
                store.clone(),
                tokens.clone(),
                roles.clone(),
                evaluator.clone(),
            ),
            policy_service: PolicyService::new(store.clone(), evaluator.clone()),
            catalog_service: CatalogService::new(store.clone(), evaluator.clone()),
            grant_service: GrantService::new(store.clone(), roles.clone()),
            config,
            store,
            tokens,
            evaluator,
            roles,
            login_rate_limiter,
        })
    }
}

/// Wrap a handler in the authorization guard for `object:action`.
macro_rules! guarded {
    ($state:expr, $handler:expr, $object:literal, $action:literal) => {
        $handler.layer(from_fn_with_state(
            guard(&$state, $object, $action),
            authorize_middleware,
        ))
    };
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let login_route = Router::new()
        .route("/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let policy_routes = Router::new()
        .route(
            "/policies",
            post(guarded!(state, handlers::policy::create_policy, "policy", "create"))
                .get(guarded!(state, handlers::policy::list_policies, "policy", "list")),
        )
        .route(
            "/policies/:policy_id",
            get(guarded!(state, handlers::policy::get_policy, "policy", "view"))
                .delete(guarded!(state, handlers::policy::delete_policy, "policy", "delete")),
        )
        .route(
            "/enforcer/reload",
            post(guarded!(state, handlers::policy::reload_policies, "policy", "update")),
        );

    let role_routes = Router::new()
        .route(
            "/roles",
            post(guarded!(state, handlers::role::create_role, "role", "create"))
                .get(guarded!(state, handlers::role::list_roles, "role", "list")),
        )
        .route(
            "/roles/:role_id",
            get(guarded!(state, handlers::role::get_role, "role", "view"))
                .patch(guarded!(state, handlers::role::update_role, "role", "update"))
                .delete(guarded!(state, handlers::role::delete_role, "role", "delete")),
        )
        .route(
            "/roles/:role_id/users",
            get(guarded!(state, handlers::user_role::role_users, "role", "list")),
        )
        .route(
            "/users/:user_id/role/:role_id",
            post(guarded!(state, handlers::user_role::grant_role, "role", "create"))
                .delete(guarded!(state, handlers::user_role::revoke_role, "role", "delete")),
        )
        .route(
            "/users/:user_id/roles",
            get(guarded!(state, handlers::user_role::user_roles, "role", "list")),
        )
        .route("/me/permissions", get(handlers::user_role::my_permissions));

    let object_routes = Router::new()
        .route(
            "/objects",
            post(guarded!(state, handlers::object::create_object, "object", "create"))
                .get(guarded!(state, handlers::object::list_objects, "object", "list")),
        )
        .route(
            "/objects/:object_id",
            get(guarded!(state, handlers::object::get_object, "object", "view"))
                .patch(guarded!(state, handlers::object::update_object, "object", "update"))
                .delete(guarded!(state, handlers::object::delete_object, "object", "delete")),
        );

    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .route("/refresh", post(handlers::auth::refresh))
        .merge(login_route)
        .merge(policy_routes)
        .merge(role_routes)
        .merge(object_routes)
        .with_state(state.clone())
        // Rejects malformed or invalid bearer credentials on every route
        .layer(from_fn_with_state(state.clone(), authentication_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(
            state.config.security.request_timeout_seconds,
        )))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins));

    Ok(app)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Store unreachable", body = ErrorResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up"
        }
    })))
}

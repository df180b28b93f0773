//! Test helpers for helpdesk-service integration tests.
//!
//! Builds the full router over an in-memory store seeded with the standard
//! objects and the administrator role.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use helpdesk_service::{
    build_router,
    config::{
        BootstrapConfig, DatabaseConfig, Environment, HelpdeskConfig, JwtConfig, RateLimitConfig,
        RoleCacheConfig, SecurityConfig,
    },
    models::{Principal, Role, User, UserType},
    services::{bootstrap::ADMIN_ROLE_ID, AccessStore, Enforcer, MemoryStore, PolicyEvaluator},
    utils::{hash_password, Password},
    AppState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "correct horse battery staple";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub enforcer: Arc<Enforcer>,
}

pub fn test_config() -> HelpdeskConfig {
    HelpdeskConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "helpdesk-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: "integration-test-secret-integration-test".to_string(),
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 40,
        },
        roles: RoleCacheConfig { cache_ttl_seconds: 0 },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            request_timeout_seconds: 30,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 5,
            login_window_seconds: 900,
        },
        bootstrap: BootstrapConfig::default(),
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: HelpdeskConfig) -> Self {
        let store = Arc::new(MemoryStore::seeded());
        let enforcer = Arc::new(
            Enforcer::load(store.clone())
                .await
                .expect("Failed to load enforcer"),
        );
        let state = AppState::new(config, store.clone(), enforcer.clone())
            .expect("Failed to build state");
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            router,
            state,
            store,
            enforcer,
        }
    }

    /// Same store, with `evaluator` answering authorization checks.
    pub async fn with_evaluator(self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        let state = AppState::new(self.state.config.clone(), self.store.clone(), evaluator)
            .expect("Failed to build state");
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");
        Self {
            router,
            state,
            ..self
        }
    }

    pub async fn create_role(&self, name: &str) -> Role {
        let role = Role::new(name, None);
        self.store.insert_role(&role).await.expect("Failed to insert role");
        role
    }

    pub async fn create_user(&self, email: &str, user_type: UserType, role_id: Uuid) -> User {
        let hash = hash_password(&Password::new(TEST_PASSWORD)).expect("Failed to hash password");
        let user = User::new("Test", "User", email, user_type, role_id, hash);
        self.store.insert_user(&user).await.expect("Failed to insert user");
        user
    }

    /// Administrator holding every standard permission, with an access token.
    pub async fn admin(&self) -> (User, String) {
        let user = self
            .create_user(&format!("admin-{}@example.com", Uuid::new_v4()), UserType::Admin, ADMIN_ROLE_ID)
            .await;
        let token = self.token_for(&user);
        (user, token)
    }

    /// Access token carrying only the user's primary role.
    pub fn token_for(&self, user: &User) -> String {
        let principal = Principal::new(user.user_id, user.display_name(), [user.role_id], user.kind());
        self.state
            .tokens
            .issue_token(&principal)
            .expect("Failed to issue token")
            .access_token
    }

    pub async fn object_id(&self, name: &str) -> Uuid {
        self.store
            .list_objects()
            .await
            .expect("Failed to list objects")
            .into_iter()
            .find(|o| o.object_name == name)
            .map(|o| o.object_id)
            .expect("Unknown object")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }
}

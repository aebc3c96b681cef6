//! HTTP routes

pub mod auth;
pub mod health;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{
    auth::{rate_limit_login, require_auth},
    state::AppState,
};

/// Build the application router (without the outer CORS/trace layers)
pub fn create_router(state: AppState) -> Router {
    let login = Router::new()
        .route("/auth/login", post(auth::login))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_login,
        ));

    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health::health))
        .route("/auth/refresh", post(auth::refresh))
        .merge(login)
        .merge(protected)
        .with_state(state)
}

//! API routes

pub mod account;
pub mod generation;
pub mod health;
pub mod payments;
pub mod receipts;
pub mod webhooks;

#[cfg(test)]
mod tests;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, state::AppState};

/// Largest accepted request body (chat histories and webhook payloads)
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (signature verified, no session) - under /api/v1
    let mut public_api_routes = Router::new();
    if state.payments_enabled {
        public_api_routes = public_api_routes
            .route("/webhooks/payment", post(webhooks::card_payment))
            .route(
                "/webhooks/networx",
                get(webhooks::gateway_liveness).post(webhooks::gateway_notification),
            );
    }

    // Protected API routes (auth required) - under /api/v1
    let mut protected_api_routes = Router::new()
        // Metered generation
        .route("/conversation", post(generation::conversation))
        .route("/image", post(generation::image))
        .route("/style-transfer", post(generation::style_transfer))
        .route("/music", post(generation::music))
        .route("/speech", post(generation::speech))
        .route("/video", post(generation::video))
        // Account
        .route("/credits", get(account::get_credits))
        .route(
            "/account",
            post(account::provision_account).delete(account::delete_account),
        )
        // Payments
        .route("/payments/history", get(payments::payment_history))
        .route("/receipts", post(receipts::render_receipt));

    if state.payments_enabled {
        protected_api_routes = protected_api_routes.route(
            "/payment/networx",
            post(payments::create_payment_token).get(payments::payment_status),
        );
    }

    let protected_api_routes =
        protected_api_routes.route_layer(middleware::from_fn_with_state(auth_state, require_auth));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", public_api_routes.merge(protected_api_routes))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

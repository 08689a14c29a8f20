use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{archive, channels, errands, ratings, remittance, runners, users};

/// Full HTTP surface. Everything outside `/auth` requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/me", get(users::me).put(users::update_me))
        .route("/users", get(users::list_users))
        .route("/users/{id}", put(users::edit_user).delete(users::delete_user))
        .route("/users/{id}/password", post(users::reset_password))
        .route(
            "/runner-applications",
            get(runners::list_applications).post(runners::apply),
        )
        .route("/runner-applications/{id}/approve", post(runners::approve))
        .route("/runner-applications/{id}/reject", post(runners::reject))
        .route("/errands", get(errands::list_errands).post(errands::create_errand))
        .route("/errands/{id}", get(errands::get_errand))
        .route("/errands/{id}/status", get(errands::get_status))
        .route("/errands/{id}/accept", post(errands::accept_errand))
        .route("/channels", get(channels::list_channels))
        .route(
            "/channels/{id}/messages",
            get(channels::list_messages).post(channels::send_message),
        )
        .route("/channels/{id}/done", post(archive::done))
        .route("/channels/{id}/rating", post(ratings::rate_channel))
        .route("/history", get(remittance::history))
        .route("/remittance/weeks", get(remittance::weekly_summary))
        .route("/remittance/weeks/{week}/proof", post(remittance::submit_proof))
        .route(
            "/remittance/runners/{runner_id}/weeks/{week}/remitted",
            post(remittance::mark_remitted),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

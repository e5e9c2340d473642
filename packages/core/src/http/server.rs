//! Router assembly and server task.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{any, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::services::{SchemaService, UserService};

use super::handlers;

/// Shared state handed to every handler.
pub struct AppState {
    pub schemas: Arc<SchemaService>,
    pub users: Arc<UserService>,
}

/// Build the admin router, mounted under `/api/beehive`.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/context", post(handlers::post_context))
        .route("/contexts", get(handlers::get_contexts))
        .route("/context/:uuid", any(handlers::context_item))
        .route("/context/:uuid/versions", get(handlers::get_versions))
        .route("/context/:uuid/versions/:n", get(handlers::get_version))
        .route("/:ctx/user", post(handlers::post_user))
        .route("/:ctx/users", get(handlers::get_users))
        .route(
            "/:ctx/user/:uuid",
            get(handlers::get_user)
                .put(handlers::put_user)
                .delete(handlers::delete_user),
        )
        .route("/:ctx/signup", post(handlers::sign_up))
        .route("/:ctx/signin", post(handlers::sign_in))
        .route("/:ctx/signout", post(handlers::sign_out))
        .route("/:ctx/signoff", post(handlers::sign_off))
        .with_state(state);

    Router::new()
        .nest("/api/beehive", api)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the task is aborted. Bind failures propagate so the
/// binary can exit non-zero.
pub async fn run_http_server(state: Arc<AppState>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP admin surface listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

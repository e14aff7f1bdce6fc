use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{bearer, Credential, CredentialKind, Principal};
use crate::errors::AppError;
use crate::AppState;

pub mod handlers;

/// Build the full application router. Health probes are open; everything
/// else sits behind `require_auth`.
pub fn app_router(state: Arc<AppState>) -> Router {
    let authed = Router::new()
        .route(
            "/features",
            get(handlers::list_features).post(handlers::create_feature),
        )
        .route(
            "/features/:id",
            get(handlers::get_feature)
                .put(handlers::update_feature)
                .delete(handlers::delete_feature),
        )
        .route("/features/:id/toggle", post(handlers::toggle_feature))
        .route(
            "/tokens",
            get(handlers::list_tokens).post(handlers::create_token),
        )
        .route("/tokens/:id", delete(handlers::delete_token))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(handlers::readiness))
        .merge(authed)
        .fallback(fallback_404)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback_404() -> AppError {
    AppError::NotFound("route")
}

/// Middleware: resolve the bearer credential to a [`Principal`] or reject
/// with 401. Session credentials go to the identity provider's verifier,
/// API tokens to the token store.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let raw = bearer(header).ok_or(AppError::Unauthorized)?;

    let principal = match Credential::classify(raw) {
        Credential::ApiToken(secret) => {
            let verified = state.db.verify_token(secret).await?;
            Principal {
                uid: verified.created_by_uid,
                kind: CredentialKind::ApiToken {
                    token_id: verified.token_id,
                },
            }
        }
        Credential::Session(token) => {
            let uid = state
                .sessions
                .verify(token)
                .await
                .ok_or(AppError::Unauthorized)?;
            Principal {
                uid,
                kind: CredentialKind::Session,
            }
        }
    };

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

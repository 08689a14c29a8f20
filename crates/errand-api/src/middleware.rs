use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use errand_db::{Database, StoreError};
use errand_types::api::Claims;
use errand_types::models::Role;

use crate::auth::AppState;
use crate::error::ApiError;

/// Verify the bearer token and hand its claims to the handler. Runs before
/// any extractor, so nothing is parsed or read for an anonymous caller.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Unauthenticated("missing bearer token"))?;

    let claims = state.verifier.verify(token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Role of the caller as currently stored. A token for a user that no longer
/// exists is treated as unauthenticated.
pub(crate) fn caller_role(db: &Database, claims: &Claims) -> Result<Role, ApiError> {
    match db.role_of(claims.uid) {
        Ok(role) => Ok(role),
        Err(StoreError::NotFound(_)) => Err(ApiError::Unauthenticated("unknown user")),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn require_role(role: Role, allowed: &[Role], action: &str) -> Result<(), ApiError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(ApiError::unauthorized(format!("{role} accounts cannot {action}")))
    }
}

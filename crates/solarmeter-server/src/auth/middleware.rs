use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::auth::session;
use crate::error::AppError;
use crate::models::ReadingOwner;
use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "solarmeter_session";

/// Resolves the session cookie to a user and the reading history they act on.
/// Requests without a live session never reach the handlers behind this layer.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AppError::Unauthorized)?;

    let (_session, user) = session::validate_session(&state.db, &token)?;
    let owner = ReadingOwner::for_user(&user, state.config.stats.multi_tenant);

    tracing::trace!(user_id = %user.id, owner = owner.as_str(), "request authenticated");

    request.extensions_mut().insert(owner);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

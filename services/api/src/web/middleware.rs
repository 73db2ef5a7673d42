//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

use crate::web::state::AppState;

/// Pulls the session id out of a `Cookie` header, if present.
pub(crate) fn session_id_from_cookies(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

/// Middleware that validates the auth session cookie and resolves the user.
///
/// If valid, inserts the authenticated `User` into request extensions for
/// handlers to use. If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let session_id = session_id_from_cookies(cookie_header).ok_or(StatusCode::UNAUTHORIZED)?;

    let user = state
        .store
        .validate_auth_session(session_id)
        .await
        .map_err(|e| {
            debug!("rejected session cookie: {e}");
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_session_cookie_among_others() {
        let header = "theme=dark; session=abc123; locale=en";
        assert_eq!(session_id_from_cookies(header), Some("abc123"));
    }

    #[test]
    fn rejects_missing_or_empty_session_cookies() {
        assert_eq!(session_id_from_cookies("theme=dark"), None);
        assert_eq!(session_id_from_cookies("session="), None);
        assert_eq!(session_id_from_cookies(""), None);
    }
}

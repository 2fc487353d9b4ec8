//! Authentication gates
//!
//! `require_auth` turns a session token into an `AuthContext` on the
//! request; `require_admin` layers a role check on top. Handlers behind
//! these gates never re-authenticate.

use axum::{
    extract::{Request, State},
    http::{header::SET_COOKIE, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;
use salestrackr_common::{
    auth::{extract_session_token, hash_session_token, removal_cookie, AuthContext, Role},
    db::Repository,
    errors::AppError,
    metrics,
};

/// Gate applied to every protected route.
///
/// Extracts the session token (cookie or bearer), validates it against
/// the session store, and attaches `AuthContext { user_id, role }` to
/// the request. An invalid or expired token clears the cookie so the
/// client does not keep replaying it.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = match extract_session_token(request.headers(), &state.config.auth.cookie_name) {
        Some(token) => token,
        None => {
            return AppError::Unauthorized {
                message: "Authentication required".to_string(),
            }
            .into_response();
        }
    };

    let repo = Repository::new(state.db.clone());
    let token_hash = hash_session_token(&token);

    let session = match repo.find_session(&token_hash).await {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };

    let session = match session {
        Some(session) => session,
        None => return invalid_session_response(&state),
    };

    if session.is_expired() {
        if let Err(e) = repo.delete_session(&session.token_hash).await {
            tracing::warn!(error = %e, "Failed to delete expired session");
        }
        metrics::record_session_revoked("expired");
        return invalid_session_response(&state);
    }

    request.extensions_mut().insert(AuthContext {
        user_id: session.user_id,
        role: Role::parse(&session.role),
    });

    next.run(request).await
}

/// Gate composed after `require_auth`; rejects non-admin identities.
///
/// No in-scope route mounts this today; it is the reusable policy
/// primitive for future admin-only handlers.
pub async fn require_admin(request: Request, next: Next) -> Response {
    match request.extensions().get::<AuthContext>() {
        None => AppError::Unauthorized {
            message: "Authentication required".to_string(),
        }
        .into_response(),
        Some(ctx) if !ctx.is_admin() => AppError::Forbidden {
            message: "Admin access required".to_string(),
        }
        .into_response(),
        Some(_) => next.run(request).await,
    }
}

/// 401 response that also clears the session cookie
fn invalid_session_response(state: &AppState) -> Response {
    let mut response = AppError::InvalidSession.into_response();
    if let Ok(value) = HeaderValue::from_str(&removal_cookie(&state.config.auth)) {
        response.headers_mut().append(SET_COOKIE, value);
    }
    response
}

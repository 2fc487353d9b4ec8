//! Authentication handlers
//!
//! Register, login, logout, and current-user lookup. Login and register
//! always mint a brand-new session token; an existing session carried
//! by the request is destroyed first, never upgraded in place.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use salestrackr_common::{
    auth::{
        extract_session_token, generate_session_token, hash_password_async, hash_session_token,
        removal_cookie, session_cookie, verify_password_async, AuthContext, Role,
    },
    db::{models::User, Repository},
    errors::{AppError, Result},
    metrics,
};

/// Registration request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,

    #[serde(default)]
    pub role: Option<Role>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Public projection of a user; the password hash never leaves the store
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: PublicUser,
    /// Raw session token for bearer-token clients; browsers rely on the cookie
    pub token: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: PublicUser,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Register a new user and log them in immediately
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let repo = Repository::new(state.db.clone());

    if repo.find_user_by_email(&request.email).await?.is_some() {
        return Err(AppError::DuplicateEmail);
    }

    let password_hash = hash_password_async(request.password).await?;
    let role = request.role.unwrap_or_default();

    let user = repo
        .create_user(request.name, request.email, password_hash, role)
        .await?;

    let token = issue_session(&repo, &state, user.id, role, &headers).await?;

    metrics::record_registration();
    tracing::info!(user_id = %user.id, "User registered");

    let cookie = session_cookie(&state.config.auth, &token);

    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, cookie)],
        Json(AuthResponse {
            user: PublicUser::from(&user),
            token,
            message: "User registered successfully".to_string(),
        }),
    ))
}

/// Log in with email and password
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let repo = Repository::new(state.db.clone());

    // Unknown email and wrong password produce the identical error so
    // the endpoint cannot be used to probe which emails are registered.
    let user = repo.find_user_by_email(&request.email).await?;

    let verified = match &user {
        Some(user) => {
            verify_password_async(request.password, user.password_hash.clone()).await?
        }
        None => false,
    };

    let user = match user {
        Some(user) if verified => user,
        _ => {
            metrics::record_login(false);
            return Err(AppError::Unauthorized {
                message: "Invalid credentials".to_string(),
            });
        }
    };

    let role = Role::parse(&user.role);
    let token = issue_session(&repo, &state, user.id, role, &headers).await?;

    metrics::record_login(true);
    tracing::info!(user_id = %user.id, "User logged in");

    let cookie = session_cookie(&state.config.auth, &token);

    Ok((
        [(SET_COOKIE, cookie)],
        Json(AuthResponse {
            user: PublicUser::from(&user),
            token,
            message: "Login successful".to_string(),
        }),
    ))
}

/// Log out. Idempotent: with or without a live session the response is
/// the same 200 plus the removal cookie.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    if let Some(token) = extract_session_token(&headers, &state.config.auth.cookie_name) {
        let repo = Repository::new(state.db.clone());
        if repo.delete_session(&hash_session_token(&token)).await? {
            metrics::record_session_revoked("logout");
        }
    }

    Ok((
        [(SET_COOKIE, removal_cookie(&state.config.auth))],
        Json(MessageResponse {
            message: "Logout successful".to_string(),
        }),
    ))
}

/// Current authenticated user, fetched fresh from the identity store so
/// role or name changes take effect without a re-login.
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
    auth: AuthContext,
) -> std::result::Result<Json<MeResponse>, Response> {
    let repo = Repository::new(state.db.clone());

    let user = repo
        .find_user_by_id(auth.user_id)
        .await
        .map_err(IntoResponse::into_response)?;

    match user {
        Some(user) => Ok(Json(MeResponse {
            user: PublicUser::from(&user),
        })),
        None => {
            // The session references a user that no longer exists;
            // destroy it and clear the cookie.
            if let Some(token) = extract_session_token(&headers, &state.config.auth.cookie_name) {
                if let Err(e) = repo.delete_session(&hash_session_token(&token)).await {
                    tracing::warn!(error = %e, "Failed to delete orphaned session");
                }
                metrics::record_session_revoked("orphaned");
            }

            let mut response = AppError::Unauthorized {
                message: "Authentication required".to_string(),
            }
            .into_response();
            if let Ok(value) = HeaderValue::from_str(&removal_cookie(&state.config.auth)) {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(response)
        }
    }
}

/// Mint a fresh session for the user. Any session carried by the
/// request is destroyed first: the anonymous-to-authenticated
/// transition never reuses a pre-existing token (anti-fixation). The
/// function returns only after the session insert is acknowledged.
async fn issue_session(
    repo: &Repository,
    state: &AppState,
    user_id: Uuid,
    role: Role,
    headers: &HeaderMap,
) -> Result<String> {
    if let Some(prior) = extract_session_token(headers, &state.config.auth.cookie_name) {
        if repo.delete_session(&hash_session_token(&prior)).await? {
            metrics::record_session_revoked("reissued");
        }
    }

    let token = generate_session_token();
    repo.create_session(
        hash_session_token(&token),
        user_id,
        role,
        state.config.session_ttl(),
    )
    .await?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            name: "Alice".to_string(),
            email: "alice@x.com".to_string(),
            password: "secret1".to_string(),
            role: None,
        };
        assert!(valid.validate().is_ok());

        let short_password = RegisterRequest {
            name: "Alice".to_string(),
            email: "alice@x.com".to_string(),
            password: "short".to_string(),
            role: None,
        };
        assert!(short_password.validate().is_err());

        let bad_email = RegisterRequest {
            name: "Alice".to_string(),
            email: "not-an-email".to_string(),
            password: "secret1".to_string(),
            role: None,
        };
        assert!(bad_email.validate().is_err());

        let empty_name = RegisterRequest {
            name: String::new(),
            email: "alice@x.com".to_string(),
            password: "secret1".to_string(),
            role: None,
        };
        assert!(empty_name.validate().is_err());
    }

    #[test]
    fn test_login_request_validation() {
        let valid = LoginRequest {
            email: "alice@x.com".to_string(),
            password: "x".to_string(),
        };
        assert!(valid.validate().is_ok());

        let empty_password = LoginRequest {
            email: "alice@x.com".to_string(),
            password: String::new(),
        };
        assert!(empty_password.validate().is_err());
    }

    #[test]
    fn test_public_user_excludes_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            email: "alice@x.com".to_string(),
            password_hash: "argon2-hash".to_string(),
            role: "agent".to_string(),
            created_at: chrono::Utc::now().into(),
            updated_at: chrono::Utc::now().into(),
        };

        let json = serde_json::to_string(&PublicUser::from(&user)).unwrap();
        assert!(!json.contains("argon2-hash"));
        assert!(!json.contains("password"));
        assert!(json.contains("alice@x.com"));
    }

    #[test]
    fn test_role_deserializes_lowercase() {
        let request: RegisterRequest = serde_json::from_str(
            r#"{"name":"A","email":"a@x.com","password":"secret1","role":"admin"}"#,
        )
        .unwrap();
        assert_eq!(request.role, Some(Role::Admin));
    }
}

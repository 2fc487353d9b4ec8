//! Authentication and authorization utilities
//!
//! Provides:
//! - Argon2id password hashing
//! - Opaque session token generation and at-rest hashing
//! - Session cookie construction
//! - Authenticated identity extraction for handlers

use crate::errors::{AppError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AuthConfig;

/// User role. Admin carries no extra capability in-scope beyond the
/// `require_admin` gate; kept as a flat tagged variant on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Agent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Agent => "agent",
            Role::Admin => "admin",
        }
    }

    /// Parse a stored role string; unknown values fall back to agent
    pub fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            _ => Role::Agent,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Agent
    }
}

/// Extracted authentication context available to handlers.
///
/// Inserted into request extensions by the `require_auth` middleware;
/// handlers read it and never re-authenticate.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: Uuid,

    /// Role bound to the session
    pub role: Role,
}

impl AuthContext {
    /// Check whether the context carries the admin role
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require the admin role, returning error if not present
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                message: "Admin access required".to_string(),
            })
        }
    }
}

/// Hash a password with Argon2id for storage
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("Failed to hash password: {}", e),
        })
}

/// Hash a password on the blocking pool. Argon2id is deliberately slow,
/// so it must not run on a runtime worker thread.
pub async fn hash_password_async(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Password hashing task failed: {}", e),
        })?
}

/// Verify a password against a stored hash on the blocking pool
pub async fn verify_password_async(password: String, stored_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Password verification task failed: {}", e),
        })
}

/// Verify a password against a stored Argon2id hash
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Generate a new opaque session token
pub fn generate_session_token() -> String {
    let random_bytes: [u8; 32] = rand::random();
    format!("sts_{}", hex::encode(random_bytes))
}

/// Hash a session token for storage. Only the hash touches the database,
/// so a leaked sessions table does not expose live tokens.
pub fn hash_session_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract a bearer token from an Authorization header value
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Extract the session token carried by a request: session cookie first,
/// Authorization bearer as the fallback.
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(cookie_header) = headers.get("cookie").and_then(|v| v.to_str().ok()) {
        for pair in cookie_header.split(';') {
            let pair = pair.trim();
            if let Some(value) = pair.strip_prefix(cookie_name) {
                if let Some(value) = value.strip_prefix('=') {
                    if !value.is_empty() {
                        return Some(value.to_string());
                    }
                }
            }
        }
    }

    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
        .map(String::from)
}

/// Build the Set-Cookie value that binds a session token to the browser.
/// HTTP-only always; Secure and SameSite follow deployment configuration.
pub fn session_cookie(auth: &AuthConfig, token: &str) -> String {
    let max_age_secs = auth.session_ttl_days * 24 * 60 * 60;
    let same_site = match auth.cookie_same_site.as_str() {
        "lax" => "Lax",
        "none" => "None",
        _ => "Strict",
    };

    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite={}; Max-Age={}",
        auth.cookie_name, token, same_site, max_age_secs
    );
    if auth.cookie_secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Build the Set-Cookie value that removes the session cookie
pub fn removal_cookie(auth: &AuthConfig) -> String {
    format!("{}=; Path=/; HttpOnly; Max-Age=0", auth.cookie_name)
}

/// Axum extractor for AuthContext.
///
/// Relies on `require_auth` having run on the route; rejects with 401
/// if no identity was attached.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized {
                message: "Authentication required".to_string(),
            })
    }
}

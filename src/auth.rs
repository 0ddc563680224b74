use anyhow::Context;
use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request::Parts},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::api::AppState;
use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::store::UserRecord;

/// Special characters accepted by the password policy.
pub const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*";

const BAD_CREDENTIALS: &str = "incorrect username or password";
const BAD_TOKEN: &str = "could not validate credentials";

/// Closed set of roles known to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Maintenance,
    Superuser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Maintenance => "maintenance",
            Role::Superuser => "superuser",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "maintenance" => Some(Role::Maintenance),
            "superuser" => Some(Role::Superuser),
            _ => None,
        }
    }
}

/// JWT payload: subject username, role at issue time, expiry.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
}

/// Sign a bearer token for a verified user.
pub fn issue_token(user: &UserRecord, config: &AuthConfig) -> anyhow::Result<String> {
    let exp = Utc::now() + Duration::minutes(config.token_expiry_minutes as i64);
    let claims = Claims {
        sub: user.username.clone(),
        role: user.role,
        exp: exp.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .context("Failed to sign access token")
}

/// Decode and validate a bearer token (HS256 signature + expiry).
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized(BAD_TOKEN.to_string()))
}

pub fn hash_password(password: &str, cost: u32) -> anyhow::Result<String> {
    bcrypt::hash(password, cost).context("Failed to hash password")
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// New passwords need length 8+, an uppercase letter, a digit and a
/// special character.
pub fn validate_password_policy(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters long".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::Validation(
            "password must contain an uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::Validation(
            "password must contain a digit".to_string(),
        ));
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        return Err(ApiError::Validation(format!(
            "password must contain a special character ({PASSWORD_SPECIAL_CHARS})"
        )));
    }
    Ok(())
}

/// A new password must match its confirmation exactly.
pub fn validate_password_confirmation(
    new_password: &str,
    confirm_password: &str,
) -> Result<(), ApiError> {
    if new_password != confirm_password {
        return Err(ApiError::Validation(
            "new password and confirmation do not match".to_string(),
        ));
    }
    Ok(())
}

/// Extractor for the authenticated caller.
///
/// Verifies the bearer token, then re-reads the user row so role
/// changes and deletions take effect on the very next request.
pub struct AuthUser(pub UserRecord);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let token = match header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) => token,
            None => {
                counter!("reports.auth.rejected").increment(1);
                return Err(ApiError::Unauthorized(BAD_TOKEN.to_string()));
            }
        };

        let claims = match verify_token(token, &state.auth.secret_key) {
            Ok(claims) => claims,
            Err(e) => {
                counter!("reports.auth.rejected").increment(1);
                return Err(e);
            }
        };

        match state.store.user_by_username(&claims.sub).await? {
            Some(user) => Ok(AuthUser(user)),
            None => {
                counter!("reports.auth.rejected").increment(1);
                Err(ApiError::Unauthorized(BAD_TOKEN.to_string()))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
}

#[derive(Debug, Serialize)]
struct MeResponse {
    username: String,
    role: Role,
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    old_password: String,
    new_password: String,
    confirm_password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/token", post(login))
        .route("/users/me", get(me))
        .route("/users/change-password", post(change_password))
}

#[instrument(skip(state, form), fields(username = %form.username))]
async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = match state.store.user_by_username(&form.username).await? {
        Some(user) => user,
        None => {
            counter!("reports.auth.rejected").increment(1);
            return Err(ApiError::Validation(BAD_CREDENTIALS.to_string()));
        }
    };

    let password = form.password;
    let hash = user.hashed_password.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("Password verification task failed")?;
    if !verified {
        counter!("reports.auth.rejected").increment(1);
        return Err(ApiError::Validation(BAD_CREDENTIALS.to_string()));
    }

    let token = issue_token(&user, &state.auth)?;
    info!(username = %user.username, role = %user.role.as_str(), "Issued access token");

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
    }))
}

async fn me(AuthUser(user): AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        username: user.username,
        role: user.role,
    })
}

#[instrument(skip(state, user, body), fields(username = %user.username))]
async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    validate_password_policy(&body.new_password)?;
    validate_password_confirmation(&body.new_password, &body.confirm_password)?;

    let old_password = body.old_password;
    let hash = user.hashed_password.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&old_password, &hash))
        .await
        .context("Password verification task failed")?;
    if !verified {
        return Err(ApiError::Validation("incorrect password".to_string()));
    }

    let cost = state.auth.bcrypt_cost;
    let new_password = body.new_password;
    let hashed = tokio::task::spawn_blocking(move || hash_password(&new_password, cost))
        .await
        .context("Password hashing task failed")??;

    state.store.update_password(user.id, &hashed).await?;
    info!(username = %user.username, "Password updated");

    Ok(Json(serde_json::json!({ "detail": "password updated" })))
}

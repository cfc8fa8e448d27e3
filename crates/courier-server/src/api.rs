//! Account endpoints: `POST /registration`, `POST /login`, `GET /users`.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use courier_auth::{AuthError, hash_password, verify_password};
use courier_store::StoreError;
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::metrics::AUTH_FAILURES_TOTAL;
use crate::server::AppState;

/// Body of `/registration` and `/login`.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Account login.
    pub login: String,
    /// Plaintext password.
    pub password: String,
}

impl Credentials {
    /// Registration rules. Login applies none: a bad login or password is
    /// just a credential that does not match.
    fn validate(&self) -> Result<(), ApiError> {
        if self.login.trim().is_empty() {
            return Err(ApiError::BadRequest("login is required".into()));
        }
        if self.login.chars().any(char::is_whitespace) {
            return Err(ApiError::BadRequest("login must not contain whitespace".into()));
        }
        if self.password.is_empty() {
            return Err(ApiError::BadRequest("password is required".into()));
        }
        Ok(())
    }
}

/// Successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// The authenticated login.
    pub login: String,
    /// Bearer token for `/ws`.
    pub token: String,
}

/// One entry of `GET /users`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserEntry {
    /// Account login.
    pub login: String,
}

/// Endpoint failures. Bodies are plain text and deliberately vague.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Unparseable or invalid request body.
    #[error("{0}")]
    BadRequest(String),
    /// Registration for a login that already exists.
    #[error("error while register")]
    DuplicateLogin,
    /// Unknown login or wrong password.
    #[error("wrong login or password")]
    WrongCredentials,
    /// Store, hashing, or signing failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateAccount(_) => Self::DuplicateLogin,
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateLogin => StatusCode::CONFLICT,
            Self::WrongCredentials => StatusCode::UNAUTHORIZED,
            Self::Internal(detail) => {
                warn!(%detail, "request failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response();
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// `POST /registration`
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<&'static str>, ApiError> {
    let Json(creds) = body?;
    creds.validate()?;

    let password = creds.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(format!("hashing task failed: {e}")))?;
    state.accounts.create_account(&creds.login, &hash).await?;

    info!(login = %creds.login, "account registered");
    Ok(Json("successfully"))
}

/// `POST /login`
pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<LoginResponse>, ApiError> {
    let Json(creds) = body?;

    let Some(stored) = state.accounts.credential(&creds.login).await? else {
        counter!(AUTH_FAILURES_TOTAL, "surface" => "login").increment(1);
        return Err(ApiError::WrongCredentials);
    };
    let password = creds.password;
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("verify task failed: {e}")))?;
    if !matches {
        counter!(AUTH_FAILURES_TOTAL, "surface" => "login").increment(1);
        return Err(ApiError::WrongCredentials);
    }

    let token = state.issuer.issue(&creds.login)?;
    info!(login = %creds.login, "login succeeded");
    Ok(Json(LoginResponse {
        login: creds.login,
        token,
    }))
}

/// `GET /users`
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserEntry>>, ApiError> {
    let users = state
        .accounts
        .list_accounts()
        .await?
        .into_iter()
        .map(|id| UserEntry {
            login: id.to_string(),
        })
        .collect();
    Ok(Json(users))
}

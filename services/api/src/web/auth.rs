//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for signup, login, logout and password changes.
//!
//! Each request drives its own `SessionController` over a request-scoped
//! provider session, so the role resolution and the sign-out-on-bad-profile
//! rule are the same ones a long-lived client session follows.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use cleaning_core::domain::{IdentitySession, UserType};
use cleaning_core::session::{AuthFailure, AuthStore, Registration, RegistrationOutcome, SessionController};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

use crate::adapters::SupabaseAuthAdapter;
use crate::web::middleware::access_token;
use crate::web::state::{AppState, CurrentUser};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    /// `customer` or `staff`.
    pub user_type: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SignupResponse {
    pub status: String,
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: String,
    pub user_type: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordUpdateRequest {
    pub password: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Maps an auth failure to a status and a "Title: message" body.
pub fn failure_response(failure: AuthFailure) -> (StatusCode, String) {
    let status = match &failure {
        AuthFailure::Validation(_) => StatusCode::BAD_REQUEST,
        AuthFailure::LoginFailed(_) => StatusCode::UNAUTHORIZED,
        AuthFailure::VerificationRequired | AuthFailure::ProfileUnavailable => StatusCode::FORBIDDEN,
        AuthFailure::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthFailure::AlreadyRegistered | AuthFailure::Interrupted => StatusCode::CONFLICT,
        AuthFailure::Provider(_) => StatusCode::BAD_GATEWAY,
    };
    (status, format!("{}: {}", failure.title(), failure))
}

fn controller_for(state: &AppState, provider: Arc<SupabaseAuthAdapter>) -> SessionController {
    SessionController::new(provider, state.profiles.clone(), AuthStore::new())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Register; the account is usable once the email is confirmed
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created; email verification pending", body = SignupResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
        (status = 502, description = "Identity provider error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Parse the requested role at the boundary
    let user_type = req
        .user_type
        .parse::<UserType>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    // 2. Register through the controller
    let provider = Arc::new(SupabaseAuthAdapter::new(state.auth.clone()));
    let controller = controller_for(&state, provider);
    let registration = Registration {
        email: req.email,
        password: req.password,
        user_type,
        first_name: req.first_name,
        last_name: req.last_name,
        phone: req.phone,
        address: req.address,
    };
    let RegistrationOutcome::VerifyEmail { email } = controller
        .register(&registration)
        .await
        .map_err(failure_response)?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            status: "verify_email".to_string(),
            email,
        }),
    ))
}

/// POST /auth/login - Sign in and resolve the caller's role
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Email not verified or profile unavailable"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let provider = Arc::new(SupabaseAuthAdapter::new(state.auth.clone()));
    let controller = controller_for(&state, provider.clone());

    let outcome = controller
        .login(&req.email, &req.password)
        .await
        .map_err(failure_response)?;

    let session = provider.current_session().ok_or_else(|| {
        error!("Login for {} succeeded without a provider session", outcome.user_id);
        (StatusCode::INTERNAL_SERVER_ERROR, "Authentication error".to_string())
    })?;
    info!("User {} logged in as {}", outcome.user_id, outcome.user_type);

    Ok((
        StatusCode::OK,
        Json(AuthResponse {
            user_id: outcome.user_id,
            user_type: outcome.user_type.to_string(),
            access_token: session.access_token,
            refresh_token: session.refresh_token,
            expires_at: session.expires_at,
        }),
    ))
}

/// POST /auth/logout - Revoke the session; always succeeds locally
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Logged out")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = access_token(&headers) {
        // The user id is not needed to revoke a token.
        let identity = IdentitySession {
            user_id: String::new(),
            email: None,
            access_token: token,
            refresh_token: None,
            expires_at: None,
        };
        let provider = Arc::new(SupabaseAuthAdapter::with_access_token(state.auth.clone(), identity));
        controller_for(&state, provider).logout().await;
    }
    StatusCode::NO_CONTENT
}

/// POST /auth/password-reset - Email a password reset link
#[utoipa::path(
    post,
    path = "/auth/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Reset email requested"),
        (status = 400, description = "Invalid email")
    )
)]
pub async fn password_reset_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let provider = Arc::new(SupabaseAuthAdapter::new(state.auth.clone()));
    controller_for(&state, provider)
        .request_password_reset(&req.email, &state.config.password_reset_redirect_url)
        .await
        .map_err(failure_response)?;
    Ok(StatusCode::ACCEPTED)
}

/// POST /auth/password - Change the signed-in user's password
#[utoipa::path(
    post,
    path = "/auth/password",
    request_body = PasswordUpdateRequest,
    responses(
        (status = 204, description = "Password updated; log in again"),
        (status = 400, description = "Password too short"),
        (status = 401, description = "Not signed in")
    ),
    security(("bearer" = []))
)]
pub async fn update_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<PasswordUpdateRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let identity = IdentitySession {
        user_id: user.user_id.to_string(),
        email: None,
        access_token: user.access_token,
        refresh_token: None,
        expires_at: None,
    };
    let provider = Arc::new(SupabaseAuthAdapter::with_access_token(state.auth.clone(), identity));
    controller_for(&state, provider)
        .update_password(&req.password)
        .await
        .map_err(failure_response)?;
    Ok(StatusCode::NO_CONTENT)
}

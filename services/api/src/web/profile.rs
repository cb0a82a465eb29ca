//! services/api/src/web/profile.rs
//!
//! Endpoints for reading and editing the signed-in user's own profile.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use cleaning_core::domain::{Profile, ProfileUpdate};
use cleaning_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::state::{AppState, CurrentUser};

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub user_type: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<Profile> for ProfileResponse {
    fn from(p: Profile) -> Self {
        Self {
            id: p.id,
            user_type: p.user_type.to_string(),
            first_name: p.first_name,
            last_name: p.last_name,
            email: p.email,
            phone: p.phone,
            address: p.address,
        }
    }
}

/// Omitted fields are left unchanged. The role cannot be edited here.
#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// GET /profile - The caller's profile
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "The caller's profile", body = ProfileResponse),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No profile")
    ),
    security(("bearer" = []))
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let profile = state
        .profiles
        .fetch_profile(&user.user_id.to_string())
        .await
        .map_err(|e| {
            error!("Failed to load profile {}: {}", user.user_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load profile".to_string())
        })?
        .ok_or((StatusCode::NOT_FOUND, "Profile not found".to_string()))?;

    Ok(Json(ProfileResponse::from(profile)))
}

/// PUT /profile - Update the caller's contact details
#[utoipa::path(
    put,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No profile")
    ),
    security(("bearer" = []))
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let update = ProfileUpdate {
        first_name: blank_to_none(req.first_name),
        last_name: blank_to_none(req.last_name),
        phone: blank_to_none(req.phone),
        address: blank_to_none(req.address),
    };

    let profile = state
        .profiles
        .update_profile(user.user_id, update)
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => (StatusCode::NOT_FOUND, "Profile not found".to_string()),
            other => {
                error!("Failed to update profile {}: {}", user.user_id, other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update profile".to_string())
            }
        })?;
    info!("Profile {} updated", user.user_id);

    Ok(Json(ProfileResponse::from(profile)))
}

//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use cleaning_core::domain::UserType;
use cleaning_core::ports::{AuthProvider, ProfileStore};
use cleaning_core::session::{AuthState, AuthStore, SessionController};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::adapters::SupabaseAuthAdapter;
use crate::web::state::{AppState, CurrentUser};

/// Reads the access token from `Authorization: Bearer`, falling back to the
/// `access_token` cookie.
pub fn access_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("access_token="))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Resolves the caller's role through a request-scoped `SessionController`.
///
/// A session without a usable profile is signed out once by the controller,
/// exactly as a long-lived client session would be.
pub async fn resolve_caller(
    provider: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileStore>,
) -> Option<(String, UserType)> {
    let controller = SessionController::new(provider, profiles, AuthStore::new());
    controller.start().await;
    let settled = controller.state();
    controller.shutdown();
    match settled {
        AuthState::Authenticated { user_id, user_type } => Some((user_id, user_type)),
        other => {
            warn!("Caller did not resolve to a role: {:?}", other);
            None
        }
    }
}

/// Middleware that validates the access token and resolves the caller's role.
///
/// If valid, inserts a `CurrentUser` into request extensions for handlers to use.
/// A missing or invalid token is 401; a valid token without a usable profile is 403.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract the access token
    let token = access_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Ask the identity provider who it belongs to
    let identity = state.auth.get_user(&token).await.map_err(|e| {
        warn!("Rejected access token: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    // 3. Look the role up; it is never taken from the token itself
    let provider = Arc::new(SupabaseAuthAdapter::with_access_token(state.auth.clone(), identity));
    let (user_id, user_type) = resolve_caller(provider, state.profiles.clone())
        .await
        .ok_or(StatusCode::FORBIDDEN)?;
    let user_id = Uuid::parse_str(&user_id).map_err(|e| {
        error!("Identity provider returned a non-UUID user id {}: {}", user_id, e);
        StatusCode::FORBIDDEN
    })?;

    // 4. Insert the caller into request extensions
    req.extensions_mut().insert(CurrentUser {
        user_id,
        user_type,
        access_token: token,
    });

    // 5. Continue to the handler
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{person, FakeIdentityServer, TestState};
    use axum::http::HeaderValue;
    use axum::{middleware as axum_middleware, routing::get, Extension, Router};

    /// Serves one protected route behind `require_auth` and returns its URL.
    async fn serve_protected(state: Arc<AppState>) -> String {
        let app = Router::new()
            .route(
                "/whoami",
                get(|Extension(user): Extension<CurrentUser>| async move { user.user_type.to_string() }),
            )
            .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/whoami", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        url
    }

    #[tokio::test]
    async fn caller_with_profile_reaches_the_handler() {
        let staff = person("Cy", UserType::Staff);
        let identity = FakeIdentityServer::start(staff.id).await;
        let state = TestState::new()
            .with_profiles(vec![staff])
            .with_auth_url(&identity.url)
            .build();
        let url = serve_protected(state).await;

        let response = reqwest::Client::new().get(url).bearer_auth("tok").send().await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().await.unwrap(), "staff");
        assert_eq!(identity.logouts(), 0);
    }

    #[tokio::test]
    async fn caller_without_profile_is_forbidden_and_signed_out_once() {
        let identity = FakeIdentityServer::start(Uuid::new_v4()).await;
        let state = TestState::new().with_auth_url(&identity.url).build();
        let url = serve_protected(state).await;

        let response = reqwest::Client::new().get(url).bearer_auth("tok").send().await.unwrap();
        assert_eq!(response.status().as_u16(), 403);
        assert_eq!(identity.logouts(), 1);
    }

    #[tokio::test]
    async fn request_without_token_never_reaches_the_provider() {
        let identity = FakeIdentityServer::start(Uuid::new_v4()).await;
        let state = TestState::new().with_auth_url(&identity.url).build();
        let url = serve_protected(state).await;

        let response = reqwest::Client::new().get(url).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 401);
        assert_eq!(identity.lookups(), 0);
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("access_token=xyz"));
        assert_eq!(access_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_is_used_without_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; access_token=xyz"));
        assert_eq!(access_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn missing_or_empty_token_is_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(access_token(&headers), None);
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(access_token(&headers), None);
    }
}

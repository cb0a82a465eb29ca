//! services/api/src/adapters/supabase_auth.rs
//!
//! This module contains the adapter for the Supabase Auth (GoTrue) REST API.
//! It implements the `AuthProvider` port from the core crate.
//!
//! `SupabaseAuthClient` is the shared, stateless HTTP client. Each
//! `SupabaseAuthAdapter` holds one session and its own event channel, the way
//! a browser client holds one session per tab.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use cleaning_core::domain::IdentitySession;
use cleaning_core::ports::{
    AuthEvent, AuthEventKind, AuthEventStream, AuthProvider, PortError, PortResult,
};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 16;

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    email: Option<String>,
}

/// GoTrue has used several error shapes over time; any of these may be set.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

impl TokenResponse {
    fn into_session(self) -> IdentitySession {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));
        IdentitySession {
            user_id: self.user.id,
            email: self.user.email,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

fn error_message(body: &str) -> String {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string())
}

/// Maps a non-success response to a `PortError`, keeping the provider's message.
async fn error_from(response: Response) -> PortError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    match status {
        StatusCode::UNAUTHORIZED => PortError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => PortError::Rejected(format!("Rate limit exceeded: {}", message)),
        s if s.is_client_error() => PortError::Rejected(message),
        s => PortError::Unexpected(format!("Auth provider returned {}: {}", s, message)),
    }
}

fn transport(e: reqwest::Error) -> PortError {
    PortError::Unexpected(format!("Auth provider unreachable: {}", e))
}

//=========================================================================================
// Shared Client
//=========================================================================================

#[derive(Clone)]
pub struct SupabaseAuthClient {
    http: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseAuthClient {
    pub fn new(http: Client, supabase_url: &str, anon_key: &str) -> Self {
        Self {
            http,
            base_url: format!("{}/auth/v1", supabase_url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn token(&self, grant_type: &str, body: Value) -> PortResult<IdentitySession> {
        let response = self
            .http
            .post(self.url("/token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PortError::InvalidData(e.to_string()))?;
        Ok(token.into_session())
    }

    /// Resolves an access token to the user it belongs to.
    pub async fn get_user(&self, access_token: &str) -> PortResult<IdentitySession> {
        let response = self
            .http
            .get(self.url("/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| PortError::InvalidData(e.to_string()))?;
        Ok(IdentitySession {
            user_id: user.id,
            email: user.email,
            access_token: access_token.to_string(),
            refresh_token: None,
            expires_at: None,
        })
    }

    async fn send_empty(&self, request: reqwest::RequestBuilder) -> PortResult<()> {
        let response = request
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(transport)?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        Ok(())
    }
}

//=========================================================================================
// Session-Holding Adapter
//=========================================================================================

/// An `AuthProvider` holding at most one session.
pub struct SupabaseAuthAdapter {
    client: SupabaseAuthClient,
    session: Mutex<Option<IdentitySession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseAuthAdapter {
    pub fn new(client: SupabaseAuthClient) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            session: Mutex::new(None),
            events,
        }
    }

    /// An adapter acting on behalf of an already issued access token.
    pub fn with_access_token(client: SupabaseAuthClient, identity: IdentitySession) -> Self {
        let adapter = Self::new(client);
        adapter.store(Some(identity));
        adapter
    }

    pub fn current_session(&self) -> Option<IdentitySession> {
        self.session.lock().ok().and_then(|s| s.clone())
    }

    fn store(&self, session: Option<IdentitySession>) {
        if let Ok(mut slot) = self.session.lock() {
            *slot = session;
        }
    }

    fn emit(&self, kind: AuthEventKind) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(AuthEvent {
            kind,
            session: self.current_session(),
        });
    }

    fn access_token(&self) -> PortResult<String> {
        self.current_session()
            .map(|s| s.access_token)
            .ok_or(PortError::Unauthorized)
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthAdapter {
    fn subscribe(&self) -> AuthEventStream {
        let mut rx = self.events.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Auth event subscriber lagged; {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn get_session(&self) -> PortResult<Option<IdentitySession>> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        let expired = session.expires_at.is_some_and(|at| at <= Utc::now());
        match (expired, session.refresh_token.clone()) {
            (false, _) => Ok(Some(session)),
            (true, Some(refresh_token)) => {
                debug!("Access token expired; refreshing.");
                let refreshed = self
                    .client
                    .token("refresh_token", json!({ "refresh_token": refresh_token }))
                    .await?;
                self.store(Some(refreshed.clone()));
                self.emit(AuthEventKind::TokenRefreshed);
                Ok(Some(refreshed))
            }
            (true, None) => {
                self.store(None);
                Ok(None)
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<IdentitySession> {
        let body = serde_json::to_value(PasswordGrant { email, password })
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let session = self.client.token("password", body).await?;
        self.store(Some(session.clone()));
        self.emit(AuthEventKind::SignedIn);
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> PortResult<()> {
        let request = self.client.http.post(self.client.url("/signup")).json(&json!({
            "email": email,
            "password": password,
            "data": metadata,
        }));
        self.client.send_empty(request).await
    }

    /// Revokes the session remotely when there is one; the local session is
    /// cleared either way.
    async fn sign_out(&self) -> PortResult<()> {
        let remote = match self.current_session() {
            Some(session) => {
                let request = self
                    .client
                    .http
                    .post(self.client.url("/logout"))
                    .bearer_auth(&session.access_token);
                self.client.send_empty(request).await
            }
            None => Ok(()),
        };
        self.store(None);
        self.emit(AuthEventKind::SignedOut);
        remote
    }

    async fn update_password(&self, new_password: &str) -> PortResult<()> {
        let token = self.access_token()?;
        let request = self
            .client
            .http
            .put(self.client.url("/user"))
            .bearer_auth(token)
            .json(&json!({ "password": new_password }));
        self.client.send_empty(request).await?;
        self.emit(AuthEventKind::UserUpdated);
        Ok(())
    }

    async fn request_password_reset(&self, email: &str, redirect_url: &str) -> PortResult<()> {
        let request = self
            .client
            .http
            .post(self.client.url("/recover"))
            .query(&[("redirect_to", redirect_url)])
            .json(&json!({ "email": email }));
        self.client.send_empty(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn client() -> SupabaseAuthClient {
        SupabaseAuthClient::new(Client::new(), "http://localhost:54321/", "anon")
    }

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(client().url("/token"), "http://localhost:54321/auth/v1/token");
    }

    #[test]
    fn error_message_reads_every_known_shape() {
        assert_eq!(
            error_message(r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#),
            "Invalid login credentials"
        );
        assert_eq!(
            error_message(r#"{"error":"invalid_grant","error_description":"Email not confirmed"}"#),
            "Email not confirmed"
        );
        assert_eq!(error_message("upstream timeout"), "upstream timeout");
    }

    #[test]
    fn token_response_prefers_absolute_expiry() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "user": { "id": "8d0f", "email": "a@example.com" }
        }))
        .unwrap();
        let session = token.into_session();
        assert_eq!(session.user_id, "8d0f");
        assert_eq!(session.expires_at.unwrap().timestamp(), 1_900_000_000);
    }

    #[tokio::test]
    async fn local_sign_out_emits_signed_out_to_subscribers() {
        let adapter = SupabaseAuthAdapter::new(client());
        let mut events = adapter.subscribe();

        adapter.sign_out().await.unwrap();

        let event = events.next().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedOut);
        assert!(event.session.is_none());
    }

    #[tokio::test]
    async fn expired_session_without_refresh_token_is_dropped() {
        let adapter = SupabaseAuthAdapter::with_access_token(
            client(),
            IdentitySession {
                user_id: "u1".to_string(),
                email: None,
                access_token: "stale".to_string(),
                refresh_token: None,
                expires_at: Some(Utc::now() - Duration::minutes(5)),
            },
        );

        assert_eq!(adapter.get_session().await.unwrap(), None);
        assert!(adapter.current_session().is_none());
    }

    #[tokio::test]
    async fn update_password_requires_a_session() {
        let adapter = SupabaseAuthAdapter::new(client());
        assert_eq!(
            adapter.update_password("new-secret").await,
            Err(PortError::Unauthorized)
        );
    }
}

//! crates/cleaning_core/src/session.rs
//!
//! Keeps a single `(user_id, user_type)` pair consistent with the identity
//! provider's session, and mediates login, registration, logout and password
//! flows against it.
//!
//! The pair lives in an [`AuthStore`]: a single-writer, many-reader container
//! built on a `watch` channel. Only the [`SessionController`] writes to it;
//! views take synchronous snapshots through an [`AuthStoreReader`].
//!
//! Every resolution (initial restore, pushed auth event, login) captures an
//! epoch from the store and may only commit while that epoch is still the
//! latest one, so an out-of-order completion never replaces a newer state.

use futures::StreamExt;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::{AuthSession, IdentitySession, UserType};
use crate::ports::{AuthEvent, AuthEventStream, AuthProvider, PortError, ProfileStore};

/// Supabase rejects shorter passwords; checking locally saves a round trip.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// How long a superseded login waits for the newer resolution to land.
const SUPERSEDED_LOGIN_WAIT: std::time::Duration = std::time::Duration::from_secs(10);

//=========================================================================================
// State
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Before the first session check.
    Unknown,
    /// A session or profile lookup is in flight.
    Checking,
    Authenticated { user_id: String, user_type: UserType },
    Anonymous,
}

impl AuthState {
    pub fn session(&self) -> AuthSession {
        match self {
            AuthState::Authenticated { user_id, user_type } => AuthSession {
                user_id: Some(user_id.clone()),
                user_type: Some(*user_type),
            },
            _ => AuthSession::default(),
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. } | AuthState::Anonymous)
    }
}

struct StoreInner {
    state: watch::Sender<AuthState>,
    epoch: AtomicU64,
}

/// The process-wide auth state container. Cloning shares the same store.
#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<StoreInner>,
}

impl AuthStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthState::Unknown);
        Self {
            inner: Arc::new(StoreInner {
                state,
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn reader(&self) -> AuthStoreReader {
        AuthStoreReader {
            rx: self.inner.state.subscribe(),
        }
    }

    pub fn snapshot(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Starts a new epoch; everything captured before it becomes stale.
    fn advance(&self) -> u64 {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.epoch.load(Ordering::SeqCst) == epoch
    }

    /// Replaces the whole state if `epoch` is still current.
    /// The epoch check runs under the channel's write lock.
    fn commit(&self, epoch: u64, next: AuthState) -> bool {
        self.inner.state.send_if_modified(|state| {
            if !self.is_current(epoch) {
                return false;
            }
            if *state != next {
                debug!("Auth state {:?} -> {:?}", state, next);
                *state = next;
            }
            true
        })
    }

    /// Unconditionally replaces the state, invalidating in-flight resolutions.
    fn replace(&self, next: AuthState) {
        let epoch = self.advance();
        self.commit(epoch, next);
    }
}

impl Default for AuthStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only handle on an [`AuthStore`].
#[derive(Clone)]
pub struct AuthStoreReader {
    rx: watch::Receiver<AuthState>,
}

impl AuthStoreReader {
    pub fn snapshot(&self) -> AuthState {
        self.rx.borrow().clone()
    }

    pub fn session(&self) -> AuthSession {
        self.rx.borrow().session()
    }

    /// Waits until the state satisfies `predicate`. Returns `None` once the
    /// store has been dropped.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&AuthState) -> bool) -> Option<AuthState> {
        self.rx.wait_for(predicate).await.ok().map(|state| state.clone())
    }
}

//=========================================================================================
// Failures and Requests
//=========================================================================================

/// The user-facing categories an auth flow can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("{0}")]
    Validation(String),
    #[error("Login failed: {0}")]
    LoginFailed(String),
    #[error("Please verify your email address before logging in.")]
    VerificationRequired,
    #[error("Too many attempts. Please wait a moment and try again.")]
    RateLimited,
    #[error("An account with this email already exists.")]
    AlreadyRegistered,
    #[error("Your account profile could not be loaded.")]
    ProfileUnavailable,
    #[error("Authentication service error: {0}")]
    Provider(String),
    #[error("Your session changed while signing in. Please try again.")]
    Interrupted,
}

impl AuthFailure {
    /// Sorts a provider error into a category by its message.
    pub fn classify(error: &PortError) -> Self {
        let message = match error {
            PortError::Unauthorized => return AuthFailure::LoginFailed("Unauthorized".to_string()),
            PortError::Rejected(message) | PortError::Unexpected(message) => message.as_str(),
            other => return AuthFailure::Provider(other.to_string()),
        };
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("invalid login credentials") {
            AuthFailure::LoginFailed(message.to_string())
        } else if lowered.contains("email not confirmed") {
            AuthFailure::VerificationRequired
        } else if lowered.contains("rate limit") || lowered.contains("too many requests") {
            AuthFailure::RateLimited
        } else if lowered.contains("already registered") {
            AuthFailure::AlreadyRegistered
        } else {
            AuthFailure::Provider(message.to_string())
        }
    }

    /// Short heading for the notification shown to the user.
    pub fn title(&self) -> &'static str {
        match self {
            AuthFailure::Validation(_) => "Missing Information",
            AuthFailure::LoginFailed(_) => "Login Failed",
            AuthFailure::VerificationRequired => "Verification Required",
            AuthFailure::RateLimited => "Too Many Attempts",
            AuthFailure::AlreadyRegistered => "Account Exists",
            AuthFailure::ProfileUnavailable => "Profile Unavailable",
            AuthFailure::Provider(_) => "Something Went Wrong",
            AuthFailure::Interrupted => "Sign-in Interrupted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub user_id: String,
    pub user_type: UserType,
}

/// Everything collected by the sign-up form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub user_type: UserType,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The account exists but stays inactive until the email is confirmed.
    VerifyEmail { email: String },
}

fn validate_email(email: &str) -> Result<(), AuthFailure> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthFailure::Validation("Email is required.".to_string()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AuthFailure::Validation("Please enter a valid email address.".to_string())),
    }
}

fn validate_password(password: &str) -> Result<(), AuthFailure> {
    if password.is_empty() {
        return Err(AuthFailure::Validation("Password is required.".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthFailure::Validation(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

impl Registration {
    pub fn validate(&self) -> Result<(), AuthFailure> {
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(AuthFailure::Validation("First and last name are required.".to_string()));
        }
        if self.user_type == UserType::Admin {
            return Err(AuthFailure::Validation(
                "Admin accounts cannot be created from the sign-up form.".to_string(),
            ));
        }
        Ok(())
    }

    fn metadata(&self) -> serde_json::Value {
        json!({
            "user_type": self.user_type.as_str(),
            "first_name": self.first_name.trim(),
            "last_name": self.last_name.trim(),
            "phone": self.phone,
            "address": self.address,
        })
    }
}

//=========================================================================================
// Scheduling
//=========================================================================================

/// Runs `work` on a later turn of the scheduler instead of inside the caller.
///
/// Auth events are delivered from inside the provider; resolving a profile
/// there could call back into the provider while it still holds its own lock.
pub fn schedule_next_tick<F>(work: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::task::yield_now().await;
        work.await;
    })
}

//=========================================================================================
// Controller
//=========================================================================================

#[derive(Debug)]
enum Resolution {
    Authenticated { user_id: String, user_type: UserType },
    NoSession,
    MissingProfile,
    LookupFailed(PortError),
}

/// The parts shared with the event listener task.
#[derive(Clone)]
struct Resolver {
    auth: Arc<dyn AuthProvider>,
    profiles: Arc<dyn ProfileStore>,
    store: AuthStore,
}

impl Resolver {
    /// Turns a provider session into a committed state for `epoch`.
    async fn resolve(&self, epoch: u64, session: Option<IdentitySession>) -> Resolution {
        let Some(session) = session else {
            self.store.commit(epoch, AuthState::Anonymous);
            return Resolution::NoSession;
        };

        let resolution = match self.profiles.fetch_profile(&session.user_id).await {
            Ok(Some(profile)) => Resolution::Authenticated {
                user_id: session.user_id,
                user_type: profile.user_type,
            },
            Ok(None) => Resolution::MissingProfile,
            Err(e) => Resolution::LookupFailed(e),
        };

        if !self.store.is_current(epoch) {
            debug!("Discarding stale auth resolution for epoch {}", epoch);
            return resolution;
        }

        match &resolution {
            Resolution::Authenticated { user_id, user_type } => {
                info!("Session resolved for user {} as {}", user_id, user_type);
                self.store.commit(
                    epoch,
                    AuthState::Authenticated {
                        user_id: user_id.clone(),
                        user_type: *user_type,
                    },
                );
            }
            Resolution::MissingProfile => {
                warn!("Session has no profile; signing out.");
                self.degrade(epoch).await;
            }
            Resolution::LookupFailed(e) => {
                warn!("Profile lookup failed; signing out: {}", e);
                self.degrade(epoch).await;
            }
            Resolution::NoSession => {}
        }
        resolution
    }

    /// Drops to `Anonymous` locally, then signs the provider session out.
    /// A superseded epoch touches neither.
    async fn degrade(&self, epoch: u64) {
        if !self.store.commit(epoch, AuthState::Anonymous) {
            debug!("Skipping sign-out for stale epoch {}", epoch);
            return;
        }
        if let Err(e) = self.auth.sign_out().await {
            warn!("Provider sign-out failed: {}", e);
        }
    }
}

/// Reconciles the identity provider's session with the stored user role.
pub struct SessionController {
    resolver: Resolver,
    shutdown: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        profiles: Arc<dyn ProfileStore>,
        store: AuthStore,
    ) -> Self {
        Self {
            resolver: Resolver {
                auth,
                profiles,
                store,
            },
            shutdown: CancellationToken::new(),
            listener: Mutex::new(None),
        }
    }

    pub fn reader(&self) -> AuthStoreReader {
        self.resolver.store.reader()
    }

    pub fn state(&self) -> AuthState {
        self.resolver.store.snapshot()
    }

    pub fn session(&self) -> AuthSession {
        self.resolver.store.snapshot().session()
    }

    /// Subscribes to auth events, then restores the persisted session.
    ///
    /// The subscription is opened before the session request is issued so an
    /// event fired during the initial check is never missed.
    pub async fn start(&self) {
        let events = self.resolver.auth.subscribe();
        let epoch = self.resolver.store.advance();
        self.resolver.store.commit(epoch, AuthState::Checking);
        self.spawn_listener(events);

        match self.resolver.auth.get_session().await {
            Ok(session) => {
                self.resolver.resolve(epoch, session).await;
            }
            Err(e) => {
                warn!("Session restore failed: {}", e);
                if self.resolver.store.is_current(epoch) {
                    self.resolver.degrade(epoch).await;
                }
            }
        }
    }

    fn spawn_listener(&self, mut events: AuthEventStream) {
        let resolver = self.resolver.clone();
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = events.next() => match next {
                        Some(AuthEvent { kind, session }) => {
                            debug!("Auth event {:?}", kind);
                            let epoch = resolver.store.advance();
                            let resolver = resolver.clone();
                            schedule_next_tick(async move {
                                resolver.resolve(epoch, session).await;
                            });
                        }
                        None => break,
                    },
                }
            }
            debug!("Auth event listener stopped.");
        });

        if let Ok(mut slot) = self.listener.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Signs in and resolves the role exactly as a restored session would be.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthFailure> {
        validate_email(email)?;
        if password.is_empty() {
            return Err(AuthFailure::Validation("Password is required.".to_string()));
        }

        let session = self
            .resolver
            .auth
            .sign_in(email.trim(), password)
            .await
            .map_err(|e| {
                warn!("Sign-in rejected: {}", e);
                AuthFailure::classify(&e)
            })?;

        let signed_in = session.user_id.clone();
        let epoch = self.resolver.store.advance();
        self.resolver.store.commit(epoch, AuthState::Checking);
        let resolution = self.resolver.resolve(epoch, Some(session)).await;
        if !self.resolver.store.is_current(epoch) {
            return self.superseded_login(&signed_in).await;
        }
        match resolution {
            Resolution::Authenticated { user_id, user_type } => Ok(LoginOutcome { user_id, user_type }),
            Resolution::MissingProfile | Resolution::LookupFailed(_) => {
                Err(AuthFailure::ProfileUnavailable)
            }
            Resolution::NoSession => Err(AuthFailure::Provider("No session returned".to_string())),
        }
    }

    /// A newer epoch owns the state (an auth event or a logout). The login
    /// succeeds only if that resolution lands on the same user.
    async fn superseded_login(&self, user_id: &str) -> Result<LoginOutcome, AuthFailure> {
        let mut reader = self.reader();
        let settled = tokio::time::timeout(
            SUPERSEDED_LOGIN_WAIT,
            reader.wait_for(|state| *state != AuthState::Checking),
        )
        .await;
        match settled {
            Ok(Some(AuthState::Authenticated {
                user_id: settled_id,
                user_type,
            })) if settled_id == user_id => Ok(LoginOutcome {
                user_id: settled_id,
                user_type,
            }),
            other => {
                warn!("Sign-in for {} was superseded; settled on {:?}", user_id, other);
                Err(AuthFailure::Interrupted)
            }
        }
    }

    /// Creates the identity. The caller must confirm their email before logging in.
    pub async fn register(&self, registration: &Registration) -> Result<RegistrationOutcome, AuthFailure> {
        registration.validate()?;
        let email = registration.email.trim();
        self.resolver
            .auth
            .sign_up(email, &registration.password, registration.metadata())
            .await
            .map_err(|e| {
                warn!("Sign-up rejected: {}", e);
                AuthFailure::classify(&e)
            })?;
        info!("Registered {} as {}", email, registration.user_type);
        Ok(RegistrationOutcome::VerifyEmail {
            email: email.to_string(),
        })
    }

    /// Signs out. Local state becomes `Anonymous` whatever the provider says.
    pub async fn logout(&self) {
        if let Err(e) = self.resolver.auth.sign_out().await {
            warn!("Provider sign-out failed, clearing the local session anyway: {}", e);
        }
        self.resolver.store.replace(AuthState::Anonymous);
    }

    pub async fn request_password_reset(&self, email: &str, redirect_url: &str) -> Result<(), AuthFailure> {
        validate_email(email)?;
        self.resolver
            .auth
            .request_password_reset(email.trim(), redirect_url)
            .await
            .map_err(|e| AuthFailure::classify(&e))
    }

    pub async fn update_password(&self, new_password: &str) -> Result<(), AuthFailure> {
        validate_password(new_password)?;
        self.resolver
            .auth
            .update_password(new_password)
            .await
            .map_err(|e| AuthFailure::classify(&e))
    }

    /// Stops listening for auth events. In-flight resolutions are discarded.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.resolver.store.advance();
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

//! crates/cleaning_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the identity provider, the database and the outbound
//! CRM/notification services.

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    CrmCustomer, CrmJob, IdentitySession, Message, MessageStatus, NewCrmJob, Profile,
    ProfileUpdate,
};
use crate::pricing::ServiceType;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// The remote service understood the request and refused it.
    #[error("{0}")]
    Rejected(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Identity Provider
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

/// An auth-state change pushed by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<IdentitySession>,
}

pub type AuthEventStream = Pin<Box<dyn Stream<Item = AuthEvent> + Send>>;

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Opens a new auth-state event stream. Events emitted after this call
    /// returns are delivered to the stream; dropping it unsubscribes.
    fn subscribe(&self) -> AuthEventStream;

    /// Restores the persisted session, if any.
    async fn get_session(&self) -> PortResult<Option<IdentitySession>>;

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<IdentitySession>;

    /// Registers a new identity. `metadata` is attached to the user record.
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> PortResult<()>;

    async fn sign_out(&self) -> PortResult<()>;

    async fn update_password(&self, new_password: &str) -> PortResult<()>;

    async fn request_password_reset(&self, email: &str, redirect_url: &str) -> PortResult<()>;
}

//=========================================================================================
// Relational Store
//=========================================================================================

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Exact-match lookup on the user id; `Ok(None)` when no row exists.
    /// Implementations reject unrecognized role values with `InvalidData`.
    async fn fetch_profile(&self, user_id: &str) -> PortResult<Option<Profile>>;

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> PortResult<Profile>;

    async fn list_profiles(&self) -> PortResult<Vec<Profile>>;
}

#[async_trait]
pub trait ServiceTypeSource: Send + Sync {
    async fn list_service_types(&self) -> PortResult<Vec<ServiceType>>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Every message exchanged between `a` and `b`, oldest first.
    async fn conversation(&self, a: Uuid, b: Uuid) -> PortResult<Vec<Message>>;

    async fn get_message(&self, message_id: Uuid) -> PortResult<Message>;

    async fn insert_message(&self, sender_id: Uuid, receiver_id: Uuid, content: &str)
        -> PortResult<Message>;

    async fn set_status(&self, message_id: Uuid, status: MessageStatus) -> PortResult<()>;

    /// Marks every not-yet-answered message from `from` to `to` as answered.
    async fn mark_answered(&self, from: Uuid, to: Uuid) -> PortResult<()>;
}

//=========================================================================================
// Field-Service CRM and Notifications
//=========================================================================================

#[async_trait]
pub trait FieldServiceCrm: Send + Sync {
    async fn find_customer_by_email(&self, email: &str) -> PortResult<Option<CrmCustomer>>;

    async fn create_customer(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        phone: &str,
        address: &str,
    ) -> PortResult<CrmCustomer>;

    async fn create_job(&self, job: NewCrmJob) -> PortResult<CrmJob>;

    async fn get_job(&self, job_id: &str) -> PortResult<CrmJob>;
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> PortResult<()>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> PortResult<()>;
}

//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-request identity.

use crate::adapters::SupabaseAuthClient;
use crate::config::Config;
use cleaning_core::domain::UserType;
use cleaning_core::ports::{
    EmailSender, FieldServiceCrm, MessageStore, ProfileStore, ServiceTypeSource, SmsSender,
};
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: SupabaseAuthClient,
    pub profiles: Arc<dyn ProfileStore>,
    pub service_types: Arc<dyn ServiceTypeSource>,
    pub messages: Arc<dyn MessageStore>,
    /// Absent when no CRM API key is configured.
    pub crm: Option<Arc<dyn FieldServiceCrm>>,
    pub email: Option<Arc<dyn EmailSender>>,
    pub sms: Option<Arc<dyn SmsSender>>,
}

//=========================================================================================
// CurrentUser (Specific to One Authenticated Request)
//=========================================================================================

/// Inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub user_type: UserType,
    pub access_token: String,
}

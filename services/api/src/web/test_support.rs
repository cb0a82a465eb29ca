//! In-memory ports and an `AppState` builder for handler tests.

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{Duration, Utc};
use cleaning_core::domain::{
    CrmCustomer, CrmJob, Message, MessageStatus, NewCrmJob, Profile, ProfileUpdate, UserType,
};
use cleaning_core::ports::{
    EmailSender, FieldServiceCrm, MessageStore, PortError, PortResult, ProfileStore,
    ServiceTypeSource, SmsSender,
};
use cleaning_core::pricing::ServiceType;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::adapters::SupabaseAuthClient;
use crate::config::Config;
use crate::web::state::{AppState, CurrentUser};

pub async fn read_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn person(first: &str, user_type: UserType) -> Profile {
    Profile {
        id: Uuid::new_v4(),
        user_type,
        first_name: Some(first.to_string()),
        last_name: None,
        email: Some(format!("{}@example.com", first.to_lowercase())),
        phone: None,
        address: None,
    }
}

pub fn current_user(profile: &Profile) -> CurrentUser {
    CurrentUser {
        user_id: profile.id,
        user_type: profile.user_type,
        access_token: "test-token".to_string(),
    }
}

//=========================================================================================
// Storage
//=========================================================================================

#[derive(Default)]
pub struct MemoryProfiles(Mutex<Vec<Profile>>);

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn fetch_profile(&self, user_id: &str) -> PortResult<Option<Profile>> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id.to_string() == user_id)
            .cloned())
    }

    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate) -> PortResult<Profile> {
        let mut profiles = self.0.lock().unwrap();
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == user_id)
            .ok_or_else(|| PortError::NotFound(user_id.to_string()))?;
        if update.first_name.is_some() {
            profile.first_name = update.first_name;
        }
        if update.last_name.is_some() {
            profile.last_name = update.last_name;
        }
        if update.phone.is_some() {
            profile.phone = update.phone;
        }
        if update.address.is_some() {
            profile.address = update.address;
        }
        Ok(profile.clone())
    }

    async fn list_profiles(&self) -> PortResult<Vec<Profile>> {
        Ok(self.0.lock().unwrap().clone())
    }
}

pub struct StaticCatalog {
    fail: bool,
}

#[async_trait]
impl ServiceTypeSource for StaticCatalog {
    async fn list_service_types(&self) -> PortResult<Vec<ServiceType>> {
        if self.fail {
            return Err(PortError::Unexpected("database offline".to_string()));
        }
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct MemoryMessages(Mutex<Vec<Message>>);

#[async_trait]
impl MessageStore for MemoryMessages {
    async fn conversation(&self, a: Uuid, b: Uuid) -> PortResult<Vec<Message>> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect())
    }

    async fn get_message(&self, message_id: Uuid) -> PortResult<Message> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(message_id.to_string()))
    }

    async fn insert_message(&self, sender_id: Uuid, receiver_id: Uuid, content: &str) -> PortResult<Message> {
        let mut messages = self.0.lock().unwrap();
        let message = Message {
            id: Uuid::new_v4(),
            content: content.to_string(),
            sender_id,
            receiver_id,
            created_at: Utc::now() + Duration::milliseconds(messages.len() as i64),
            status: MessageStatus::Unread,
        };
        messages.push(message.clone());
        Ok(message)
    }

    async fn set_status(&self, message_id: Uuid, status: MessageStatus) -> PortResult<()> {
        let mut messages = self.0.lock().unwrap();
        let message = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| PortError::NotFound(message_id.to_string()))?;
        message.status = status;
        Ok(())
    }

    async fn mark_answered(&self, from: Uuid, to: Uuid) -> PortResult<()> {
        for m in self.0.lock().unwrap().iter_mut() {
            if m.sender_id == from && m.receiver_id == to {
                m.status = MessageStatus::Answered;
            }
        }
        Ok(())
    }
}

//=========================================================================================
// Outbound services
//=========================================================================================

#[derive(Default)]
pub struct FakeCrm {
    fail: bool,
    calls: Mutex<usize>,
    last_unit_price: Mutex<Option<i64>>,
}

impl FakeCrm {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn last_unit_price(&self) -> Option<i64> {
        *self.last_unit_price.lock().unwrap()
    }

    fn record_call(&self) -> PortResult<()> {
        *self.calls.lock().unwrap() += 1;
        if self.fail {
            return Err(PortError::Unexpected("boom".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FieldServiceCrm for FakeCrm {
    async fn find_customer_by_email(&self, _email: &str) -> PortResult<Option<CrmCustomer>> {
        self.record_call()?;
        Ok(None)
    }

    async fn create_customer(
        &self,
        _first_name: &str,
        _last_name: &str,
        email: &str,
        _phone: &str,
        _address: &str,
    ) -> PortResult<CrmCustomer> {
        self.record_call()?;
        Ok(CrmCustomer {
            id: "cus_1".to_string(),
            email: Some(email.to_string()),
        })
    }

    async fn create_job(&self, job: NewCrmJob) -> PortResult<CrmJob> {
        self.record_call()?;
        *self.last_unit_price.lock().unwrap() = Some(job.unit_price_minor);
        Ok(CrmJob {
            id: "job_1".to_string(),
            job_number: Some("1001".to_string()),
            work_status: Some("scheduled".to_string()),
        })
    }

    async fn get_job(&self, job_id: &str) -> PortResult<CrmJob> {
        self.record_call()?;
        Ok(CrmJob {
            id: job_id.to_string(),
            job_number: None,
            work_status: Some("scheduled".to_string()),
        })
    }
}

#[derive(Default)]
pub struct FakeEmail {
    sent: Mutex<usize>,
}

impl FakeEmail {
    pub fn sent(&self) -> usize {
        *self.sent.lock().unwrap()
    }
}

#[async_trait]
impl EmailSender for FakeEmail {
    async fn send_email(&self, _to: &str, _subject: &str, _html: &str) -> PortResult<()> {
        *self.sent.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSms {
    fail: bool,
}

impl FakeSms {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl SmsSender for FakeSms {
    async fn send_sms(&self, _to: &str, _body: &str) -> PortResult<()> {
        if self.fail {
            return Err(PortError::Rejected("invalid number".to_string()));
        }
        Ok(())
    }
}

//=========================================================================================
// Identity Provider
//=========================================================================================

/// A local stand-in for the identity provider's `/user` and `/logout` endpoints.
/// Every bearer token belongs to the same user.
pub struct FakeIdentityServer {
    pub url: String,
    lookups: Arc<AtomicUsize>,
    logouts: Arc<AtomicUsize>,
}

impl FakeIdentityServer {
    pub async fn start(user_id: Uuid) -> Self {
        let lookups = Arc::new(AtomicUsize::new(0));
        let logouts = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/auth/v1/user",
                get({
                    let lookups = lookups.clone();
                    move || {
                        lookups.fetch_add(1, Ordering::SeqCst);
                        async move {
                            Json(serde_json::json!({
                                "id": user_id.to_string(),
                                "email": "caller@example.com",
                            }))
                        }
                    }
                }),
            )
            .route(
                "/auth/v1/logout",
                post({
                    let logouts = logouts.clone();
                    move || {
                        logouts.fetch_add(1, Ordering::SeqCst);
                        async { StatusCode::NO_CONTENT }
                    }
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Self { url, lookups, logouts }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

//=========================================================================================
// Builder
//=========================================================================================

pub struct TestState {
    auth_url: Option<String>,
    profiles: Vec<Profile>,
    failing_catalog: bool,
    crm: Option<Arc<dyn FieldServiceCrm>>,
    email: Option<Arc<dyn EmailSender>>,
    sms: Option<Arc<dyn SmsSender>>,
}

impl TestState {
    pub fn new() -> Self {
        Self {
            auth_url: None,
            profiles: Vec::new(),
            failing_catalog: false,
            crm: None,
            email: None,
            sms: None,
        }
    }

    pub fn with_profiles(mut self, profiles: Vec<Profile>) -> Self {
        self.profiles = profiles;
        self
    }

    /// Points the identity client at a local server instead of the configured URL.
    pub fn with_auth_url(mut self, url: &str) -> Self {
        self.auth_url = Some(url.to_string());
        self
    }

    pub fn failing_catalog(mut self) -> Self {
        self.failing_catalog = true;
        self
    }

    pub fn with_crm(mut self, crm: Arc<dyn FieldServiceCrm>) -> Self {
        self.crm = Some(crm);
        self
    }

    pub fn with_email(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = Some(email);
        self
    }

    pub fn with_sms(mut self, sms: Arc<dyn SmsSender>) -> Self {
        self.sms = Some(sms);
        self
    }

    pub fn build(self) -> Arc<AppState> {
        let config = Config::for_tests();
        let auth = SupabaseAuthClient::new(
            reqwest::Client::new(),
            self.auth_url.as_deref().unwrap_or(&config.supabase_url),
            &config.supabase_anon_key,
        );
        Arc::new(AppState {
            config: Arc::new(config),
            auth,
            profiles: Arc::new(MemoryProfiles(Mutex::new(self.profiles))),
            service_types: Arc::new(StaticCatalog {
                fail: self.failing_catalog,
            }),
            messages: Arc::new(MemoryMessages::default()),
            crm: self.crm,
            email: self.email,
            sms: self.sms,
        })
    }
}

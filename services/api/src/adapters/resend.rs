//! services/api/src/adapters/resend.rs
//!
//! This module contains the adapter for the Resend transactional email API.
//! It implements the `EmailSender` port from the core crate.

use async_trait::async_trait;
use cleaning_core::ports::{EmailSender, PortError, PortResult};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

const RESEND_URL: &str = "https://api.resend.com/emails";

#[derive(Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// An adapter that implements the `EmailSender` port using Resend.
#[derive(Clone)]
pub struct ResendEmailAdapter {
    http: Client,
    api_key: String,
    from: String,
}

impl ResendEmailAdapter {
    pub fn new(http: Client, api_key: &str, from: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl EmailSender for ResendEmailAdapter {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> PortResult<()> {
        let response = self
            .http
            .post(RESEND_URL)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(30))
            .json(&SendEmailBody {
                from: &self.from,
                to: [to],
                subject,
                html,
            })
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Email provider unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Rejected(format!(
                "Email provider returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

//! services/api/src/adapters/twilio.rs
//!
//! This module contains the adapter for the Twilio SMS API.
//! It implements the `SmsSender` port from the core crate.

use async_trait::async_trait;
use cleaning_core::ports::{PortError, PortResult, SmsSender};
use reqwest::Client;
use std::time::Duration;

use crate::config::TwilioConfig;

/// An adapter that implements the `SmsSender` port using Twilio's Messages API.
#[derive(Clone)]
pub struct TwilioSmsAdapter {
    http: Client,
    config: TwilioConfig,
}

impl TwilioSmsAdapter {
    pub fn new(http: Client, config: TwilioConfig) -> Self {
        Self { http, config }
    }

    fn messages_url(&self) -> String {
        format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.config.account_sid
        )
    }
}

/// Twilio expects E.164; bare ten-digit numbers are assumed to be US numbers.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let has_plus = raw.trim_start().starts_with('+');
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match (has_plus, digits.len()) {
        (true, 8..=15) => Some(format!("+{}", digits)),
        (false, 10) => Some(format!("+1{}", digits)),
        (false, 11) if digits.starts_with('1') => Some(format!("+{}", digits)),
        _ => None,
    }
}

#[async_trait]
impl SmsSender for TwilioSmsAdapter {
    async fn send_sms(&self, to: &str, body: &str) -> PortResult<()> {
        let to = normalize_phone(to)
            .ok_or_else(|| PortError::Rejected(format!("'{}' is not a valid phone number", to)))?;
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .timeout(Duration::from_secs(30))
            .form(&[
                ("To", to.as_str()),
                ("From", self.config.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("SMS provider unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortError::Rejected(format!(
                "SMS provider returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_common_phone_formats() {
        assert_eq!(normalize_phone("(555) 010-0100").as_deref(), Some("+15550100100"));
        assert_eq!(normalize_phone("1-555-010-0100").as_deref(), Some("+15550100100"));
        assert_eq!(normalize_phone("+44 20 7946 0958").as_deref(), Some("+442079460958"));
        assert_eq!(normalize_phone("12345"), None);
    }
}

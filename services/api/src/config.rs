//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A booked visit never spans more than one day.
pub const MAX_JOB_DURATION_HOURS: i64 = 24;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for the Twilio SMS leg. Present only when all three are set.
#[derive(Clone, Debug)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub allowed_origin: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub password_reset_redirect_url: String,
    pub housecall_pro_api_key: Option<String>,
    pub housecall_pro_base_url: String,
    pub resend_api_key: Option<String>,
    pub confirmation_from_email: String,
    pub twilio: Option<TwilioConfig>,
    pub business_phone: String,
    pub job_duration_hours: i64,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

/// Reads an optional variable, treating an empty value as unset.
fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin = var_or("ALLOWED_ORIGIN", "http://localhost:5173");

        // --- Identity Provider ---
        let supabase_url = required("SUPABASE_URL")?.trim_end_matches('/').to_string();
        let supabase_anon_key = required("SUPABASE_ANON_KEY")?;
        let password_reset_redirect_url = var_or(
            "PASSWORD_RESET_REDIRECT_URL",
            "http://localhost:5173/reset-password",
        );

        // --- Field-Service CRM ---
        let housecall_pro_api_key = optional("HOUSECALL_PRO_API_KEY");
        let housecall_pro_base_url = var_or("HOUSECALL_PRO_BASE_URL", "https://api.housecallpro.com")
            .trim_end_matches('/')
            .to_string();

        // --- Confirmations ---
        let resend_api_key = optional("RESEND_API_KEY");
        let confirmation_from_email =
            var_or("CONFIRMATION_FROM_EMAIL", "bookings@example.com");
        let twilio = match (
            optional("TWILIO_ACCOUNT_SID"),
            optional("TWILIO_AUTH_TOKEN"),
            optional("TWILIO_FROM_NUMBER"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from_number)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
            }),
            _ => None,
        };
        let business_phone = var_or("BUSINESS_PHONE", "(555) 010-0000");

        let job_duration_str = var_or("JOB_DURATION_HOURS", "3");
        let job_duration_hours = job_duration_str
            .parse::<i64>()
            .ok()
            .filter(|h| (1..=MAX_JOB_DURATION_HOURS).contains(h))
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "JOB_DURATION_HOURS".to_string(),
                    format!(
                        "'{}' is not a number of hours between 1 and {}",
                        job_duration_str, MAX_JOB_DURATION_HOURS
                    ),
                )
            })?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            allowed_origin,
            supabase_url,
            supabase_anon_key,
            password_reset_redirect_url,
            housecall_pro_api_key,
            housecall_pro_base_url,
            resend_api_key,
            confirmation_from_email,
            twilio,
            business_phone,
            job_duration_hours,
        })
    }
}

#[cfg(test)]
impl Config {
    /// A fully populated configuration for handler tests.
    pub fn for_tests() -> Self {
        Self {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            database_url: "postgres://localhost/test".to_string(),
            log_level: Level::DEBUG,
            allowed_origin: "http://localhost:5173".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "anon".to_string(),
            password_reset_redirect_url: "http://localhost:5173/reset-password".to_string(),
            housecall_pro_api_key: None,
            housecall_pro_base_url: "http://localhost:9".to_string(),
            resend_api_key: None,
            confirmation_from_email: "bookings@example.com".to_string(),
            twilio: None,
            business_phone: "(555) 010-0000".to_string(),
            job_duration_hours: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-wide; serialize the tests touching them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn set_minimum() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/app");
        std::env::set_var("SUPABASE_URL", "https://project.supabase.co/");
        std::env::set_var("SUPABASE_ANON_KEY", "anon-key");
    }

    fn clear_all() {
        for name in [
            "BIND_ADDRESS",
            "DATABASE_URL",
            "RUST_LOG",
            "SUPABASE_URL",
            "SUPABASE_ANON_KEY",
            "TWILIO_ACCOUNT_SID",
            "TWILIO_AUTH_TOKEN",
            "TWILIO_FROM_NUMBER",
            "JOB_DURATION_HOURS",
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn loads_defaults_with_required_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        set_minimum();

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.supabase_url, "https://project.supabase.co");
        assert_eq!(config.job_duration_hours, 3);
        assert!(config.twilio.is_none());
        clear_all();
    }

    #[test]
    fn missing_database_url_is_reported() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        std::env::set_var("SUPABASE_URL", "https://project.supabase.co");
        std::env::set_var("SUPABASE_ANON_KEY", "anon-key");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(name) if name == "DATABASE_URL"));
        clear_all();
    }

    #[test]
    fn twilio_requires_all_three_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        set_minimum();
        std::env::set_var("TWILIO_ACCOUNT_SID", "AC123");
        std::env::set_var("TWILIO_AUTH_TOKEN", "secret");
        assert!(Config::from_env().unwrap().twilio.is_none());

        std::env::set_var("TWILIO_FROM_NUMBER", "+15550100");
        let twilio = Config::from_env().unwrap().twilio.unwrap();
        assert_eq!(twilio.account_sid, "AC123");
        clear_all();
    }

    #[test]
    fn rejects_bad_job_duration() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_all();
        set_minimum();
        for value in ["0", "-2", "9223372036854775807", "25"] {
            std::env::set_var("JOB_DURATION_HOURS", value);
            assert!(matches!(
                Config::from_env(),
                Err(ConfigError::InvalidValue(name, _)) if name == "JOB_DURATION_HOURS"
            ));
        }
        std::env::set_var("JOB_DURATION_HOURS", "24");
        assert_eq!(Config::from_env().unwrap().job_duration_hours, 24);
        clear_all();
    }
}

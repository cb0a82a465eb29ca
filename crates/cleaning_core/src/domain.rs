//! crates/cleaning_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP representation.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Roles and Identity
//=========================================================================================

/// The closed set of roles a profile can carry.
///
/// Role strings coming from the database or from provider metadata are parsed
/// into this enum at the boundary; anything else is rejected there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Staff,
    Customer,
    Admin,
}

/// Returned when a role string is not one of `staff`, `customer` or `admin`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized user type: '{0}'")]
pub struct UnknownUserType(pub String);

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Staff => "staff",
            UserType::Customer => "customer",
            UserType::Admin => "admin",
        }
    }

    /// Staff and admins are both treated as employees by the messaging views.
    pub fn is_employee(&self) -> bool {
        matches!(self, UserType::Staff | UserType::Admin)
    }
}

impl FromStr for UserType {
    type Err = UnknownUserType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staff" => Ok(UserType::Staff),
            "customer" => Ok(UserType::Customer),
            "admin" => Ok(UserType::Admin),
            _ => Err(UnknownUserType(s.to_string())),
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The session as the identity provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySession {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// The consolidated `(user_id, user_type)` pair every protected view reads.
///
/// Both fields are either set together or cleared together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthSession {
    pub user_id: Option<String>,
    pub user_type: Option<UserType>,
}

/// A per-user profile row, keyed by the identity provider's user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub id: Uuid,
    pub user_type: UserType,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl Profile {
    /// "First Last", falling back to the email, then to a placeholder.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if !parts.is_empty() {
            return parts.join(" ");
        }
        self.email.clone().unwrap_or_else(|| "Unnamed".to_string())
    }
}

/// The fields a user may edit on their own profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

//=========================================================================================
// Messaging
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Unread,
    Read,
    Answered,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Unread => "unread",
            MessageStatus::Read => "read",
            MessageStatus::Answered => "answered",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(MessageStatus::Unread),
            "read" => Ok(MessageStatus::Read),
            "answered" => Ok(MessageStatus::Answered),
            other => Err(format!("Unrecognized message status: '{}'", other)),
        }
    }
}

/// A single direct message between two profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

/// A profile as it appears in someone's contact list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub user_type: UserType,
}

//=========================================================================================
// Bookings
//=========================================================================================

/// A booking submitted from the quote flow, forwarded to the field-service CRM.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub date: String,
    pub time: String,
    pub service_type: String,
    pub notes: Option<String>,
    pub total_amount: Decimal,
}

/// The CRM identifiers handed back after a successful booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingConfirmation {
    pub success: bool,
    pub customer_id: String,
    pub job_id: String,
    pub job_number: Option<String>,
}

/// A scheduled visit window, already resolved to absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A customer record as the CRM knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmCustomer {
    pub id: String,
    pub email: Option<String>,
}

/// What gets created on the CRM side for a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCrmJob {
    pub customer_id: String,
    pub address: String,
    pub schedule: ScheduleWindow,
    pub line_item_name: String,
    /// Price of the single line item in minor currency units (cents).
    pub unit_price_minor: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrmJob {
    pub id: String,
    pub job_number: Option<String>,
    pub work_status: Option<String>,
}

/// The details a booking confirmation email/SMS is rendered from.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationRequest {
    pub email: String,
    pub phone: Option<String>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub address: String,
    pub price: Decimal,
}

/// Which legs of a confirmation actually went out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfirmationReport {
    pub email_sent: bool,
    pub sms_sent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_type_parses_known_roles_case_insensitively() {
        assert_eq!("staff".parse::<UserType>(), Ok(UserType::Staff));
        assert_eq!(" Customer ".parse::<UserType>(), Ok(UserType::Customer));
        assert_eq!("ADMIN".parse::<UserType>(), Ok(UserType::Admin));
    }

    #[test]
    fn user_type_rejects_unknown_roles() {
        let err = "superuser".parse::<UserType>().unwrap_err();
        assert_eq!(err, UnknownUserType("superuser".to_string()));
        assert!("".parse::<UserType>().is_err());
    }

    #[test]
    fn display_name_prefers_names_then_email() {
        let mut profile = Profile {
            id: Uuid::new_v4(),
            user_type: UserType::Customer,
            first_name: Some("Dana".to_string()),
            last_name: Some("Reyes".to_string()),
            email: Some("dana@example.com".to_string()),
            phone: None,
            address: None,
        };
        assert_eq!(profile.display_name(), "Dana Reyes");

        profile.first_name = None;
        profile.last_name = Some("  ".to_string());
        assert_eq!(profile.display_name(), "dana@example.com");
    }
}

//! crates/cleaning_core/src/booking.rs
//!
//! Booking orchestration over the field-service CRM and the confirmation
//! notifiers. Requests are validated before any outbound call is made.

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::domain::{
    BookingConfirmation, BookingRequest, ConfirmationReport, ConfirmationRequest, CrmJob,
    NewCrmJob, ScheduleWindow,
};
use crate::ports::{EmailSender, FieldServiceCrm, PortError, SmsSender};

/// Raised before any network call when a request is incomplete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Downstream service failed: {0}")]
    Downstream(#[from] PortError),
}

/// Accepts `14:30`, `14:30:00` and `2:30 PM`.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    ["%H:%M", "%H:%M:%S", "%I:%M %p", "%I:%M%p"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(value, format).ok())
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Largest booking total accepted, in major units.
pub const MAX_TOTAL_AMOUNT: Decimal = dec!(100000.00);

/// Converts a decimal amount to minor currency units, rounding half away from zero.
/// `None` when the amount does not fit.
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("email", &self.email),
            ("phone", &self.phone),
            ("address", &self.address),
            ("date", &self.date),
            ("time", &self.time),
            ("service_type", &self.service_type),
        ];
        let missing: Vec<&'static str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }
        if !self.email.contains('@') {
            return Err(ValidationError::InvalidField {
                field: "email",
                reason: "must be an email address".to_string(),
            });
        }
        if self.total_amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidField {
                field: "total_amount",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.total_amount > MAX_TOTAL_AMOUNT {
            return Err(ValidationError::InvalidField {
                field: "total_amount",
                reason: format!("must not exceed {}", MAX_TOTAL_AMOUNT),
            });
        }
        self.schedule(Duration::hours(1))?;
        Ok(())
    }

    /// The visit window, starting at the requested date and time (UTC).
    pub fn schedule(&self, length: Duration) -> Result<ScheduleWindow, ValidationError> {
        let date = parse_date(&self.date).ok_or_else(|| ValidationError::InvalidField {
            field: "date",
            reason: format!("'{}' is not a YYYY-MM-DD date", self.date),
        })?;
        let time = parse_time(&self.time).ok_or_else(|| ValidationError::InvalidField {
            field: "time",
            reason: format!("'{}' is not a time of day", self.time),
        })?;
        let start = Utc.from_utc_datetime(&date.and_time(time));
        let end = start
            .checked_add_signed(length)
            .ok_or_else(|| ValidationError::InvalidField {
                field: "date",
                reason: format!("'{}' is too far in the future", self.date),
            })?;
        Ok(ScheduleWindow { start, end })
    }
}

/// Finds or creates the CRM customer by email, then schedules the job.
///
/// The lookup and the creation are separate calls, so two simultaneous
/// bookings for a new email can both create a customer.
pub async fn book_job(
    crm: &dyn FieldServiceCrm,
    request: &BookingRequest,
    job_length: Duration,
) -> Result<BookingConfirmation, BookingError> {
    request.validate()?;
    let schedule = request.schedule(job_length)?;
    let unit_price_minor = to_minor_units(request.total_amount).ok_or_else(|| ValidationError::InvalidField {
        field: "total_amount",
        reason: "is out of range".to_string(),
    })?;

    let email = request.email.trim();
    let customer = match crm.find_customer_by_email(email).await? {
        Some(existing) => {
            info!("Reusing CRM customer {} for {}", existing.id, email);
            existing
        }
        None => {
            let created = crm
                .create_customer(
                    request.first_name.trim(),
                    request.last_name.trim(),
                    email,
                    request.phone.trim(),
                    request.address.trim(),
                )
                .await?;
            info!("Created CRM customer {} for {}", created.id, email);
            created
        }
    };

    let job = crm
        .create_job(NewCrmJob {
            customer_id: customer.id.clone(),
            address: request.address.trim().to_string(),
            schedule,
            line_item_name: request.service_type.trim().to_string(),
            unit_price_minor,
            notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
        })
        .await?;
    info!("Scheduled CRM job {} for customer {}", job.id, customer.id);

    Ok(BookingConfirmation {
        success: true,
        customer_id: customer.id,
        job_id: job.id,
        job_number: job.job_number,
    })
}

pub async fn job_status(crm: &dyn FieldServiceCrm, job_id: &str) -> Result<CrmJob, BookingError> {
    if job_id.trim().is_empty() {
        return Err(ValidationError::MissingFields(vec!["job_id"]).into());
    }
    Ok(crm.get_job(job_id.trim()).await?)
}

//=========================================================================================
// Confirmation
//=========================================================================================

pub fn confirmation_subject() -> &'static str {
    "Your cleaning is booked!"
}

pub fn confirmation_html(request: &ConfirmationRequest) -> String {
    format!(
        "<h1>Booking Confirmed</h1>\
         <p>Thank you for booking with us. Here are your appointment details:</p>\
         <ul>\
         <li><strong>Date:</strong> {}</li>\
         <li><strong>Time:</strong> {}</li>\
         <li><strong>Address:</strong> {}</li>\
         <li><strong>Estimated price:</strong> ${:.2}</li>\
         </ul>\
         <p>We will contact you if anything changes.</p>",
        request.date.format("%A, %B %-d, %Y"),
        request.time.format("%-I:%M %p"),
        html_escape(&request.address),
        request.price,
    )
}

pub fn confirmation_sms(request: &ConfirmationRequest) -> String {
    format!(
        "Your cleaning is confirmed for {} at {} ({}). Estimated price: ${:.2}.",
        request.date.format("%b %-d"),
        request.time.format("%-I:%M %p"),
        request.address,
        request.price,
    )
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Sends the confirmation email and, when possible, one SMS.
///
/// An email failure is returned as an error. An SMS failure is only logged
/// and reported: the email has already gone out and stays sent.
pub async fn send_confirmation(
    email: &dyn EmailSender,
    sms: Option<&dyn SmsSender>,
    request: &ConfirmationRequest,
) -> Result<ConfirmationReport, BookingError> {
    if request.email.trim().is_empty() {
        return Err(ValidationError::MissingFields(vec!["email"]).into());
    }

    email
        .send_email(request.email.trim(), confirmation_subject(), &confirmation_html(request))
        .await?;
    let mut report = ConfirmationReport {
        email_sent: true,
        sms_sent: false,
    };

    let phone = request.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());
    match (phone, sms) {
        (Some(phone), Some(sms)) => match sms.send_sms(phone, &confirmation_sms(request)).await {
            Ok(()) => report.sms_sent = true,
            Err(e) => warn!("Confirmation SMS to {} failed: {}", phone, e),
        },
        (Some(_), None) => info!("No SMS sender configured; skipping SMS confirmation."),
        _ => {}
    }

    Ok(report)
}

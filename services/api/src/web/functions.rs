//! services/api/src/web/functions.rs
//!
//! Booking endpoints: the field-service CRM proxy and the confirmation notifier.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Duration;
use cleaning_core::booking::{self, parse_date, parse_time, BookingError};
use cleaning_core::domain::{BookingRequest, ConfirmationRequest};
use cleaning_core::ports::PortError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct BookRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub date: String,
    /// `14:30` or `2:30 PM`
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub service_type: String,
    pub notes: Option<String>,
    pub total_amount: Decimal,
}

impl From<BookRequest> for BookingRequest {
    fn from(r: BookRequest) -> Self {
        BookingRequest {
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            phone: r.phone,
            address: r.address,
            date: r.date,
            time: r.time,
            service_type: r.service_type,
            notes: r.notes,
            total_amount: r.total_amount,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BookResponse {
    pub success: bool,
    pub customer_id: String,
    pub job_id: String,
    pub job_number: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct JobStatusResponse {
    pub id: String,
    pub job_number: Option<String>,
    pub work_status: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct ConfirmationRequestBody {
    pub email: String,
    pub phone: Option<String>,
    pub date: String,
    pub time: String,
    pub address: String,
    pub price: Decimal,
}

#[derive(Serialize, ToSchema)]
pub struct ConfirmationResponse {
    pub email_sent: bool,
    pub sms_sent: bool,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Downstream details are logged, never shown to the customer.
fn booking_error(state: &AppState, e: BookingError) -> (StatusCode, String) {
    match e {
        BookingError::Validation(v) => (StatusCode::BAD_REQUEST, v.to_string()),
        BookingError::Downstream(PortError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "Not found".to_string())
        }
        BookingError::Downstream(other) => {
            error!("Booking downstream failure: {}", other);
            (
                StatusCode::BAD_GATEWAY,
                format!(
                    "We couldn't complete your booking right now. Please try again or call us at {}.",
                    state.config.business_phone
                ),
            )
        }
    }
}

fn not_configured(what: &str) -> (StatusCode, String) {
    warn!("{} is not configured", what);
    (StatusCode::SERVICE_UNAVAILABLE, format!("{} is not available", what))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /housecall-pro/book - Create (or reuse) the CRM customer and schedule the job
#[utoipa::path(
    post,
    path = "/housecall-pro/book",
    request_body = BookRequest,
    responses(
        (status = 200, description = "Job scheduled", body = BookResponse),
        (status = 400, description = "Missing or invalid fields"),
        (status = 502, description = "CRM failure"),
        (status = 503, description = "CRM not configured")
    )
)]
pub async fn book_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BookRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let crm = state
        .crm
        .clone()
        .ok_or_else(|| not_configured("Online booking"))?;
    let request = BookingRequest::from(req);
    let job_length = Duration::try_hours(state.config.job_duration_hours).ok_or_else(|| {
        error!("Job duration of {} hours is out of range", state.config.job_duration_hours);
        (StatusCode::INTERNAL_SERVER_ERROR, "Booking is misconfigured".to_string())
    })?;

    let confirmation = booking::book_job(crm.as_ref(), &request, job_length)
        .await
        .map_err(|e| booking_error(&state, e))?;
    info!("Booked job {} for {}", confirmation.job_id, request.email.trim());

    Ok(Json(BookResponse {
        success: confirmation.success,
        customer_id: confirmation.customer_id,
        job_id: confirmation.job_id,
        job_number: confirmation.job_number,
    }))
}

/// GET /housecall-pro/jobs/{id} - Current status of a CRM job
#[utoipa::path(
    get,
    path = "/housecall-pro/jobs/{id}",
    params(("id" = String, Path, description = "CRM job id")),
    responses(
        (status = 200, description = "Job status", body = JobStatusResponse),
        (status = 404, description = "No such job"),
        (status = 503, description = "CRM not configured")
    )
)]
pub async fn job_status_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let crm = state
        .crm
        .clone()
        .ok_or_else(|| not_configured("Online booking"))?;
    let job = booking::job_status(crm.as_ref(), &job_id)
        .await
        .map_err(|e| booking_error(&state, e))?;

    Ok(Json(JobStatusResponse {
        id: job.id,
        job_number: job.job_number,
        work_status: job.work_status,
    }))
}

/// POST /send-booking-confirmation - Email the customer and, when possible, text them
#[utoipa::path(
    post,
    path = "/send-booking-confirmation",
    request_body = ConfirmationRequestBody,
    responses(
        (status = 200, description = "Email sent; `sms_sent` reports the SMS leg", body = ConfirmationResponse),
        (status = 400, description = "Invalid date, time or email"),
        (status = 502, description = "Email provider failure"),
        (status = 503, description = "Email not configured")
    )
)]
pub async fn send_confirmation_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfirmationRequestBody>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let date = parse_date(&req.date)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Invalid date: '{}'", req.date)))?;
    let time = parse_time(&req.time)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Invalid time: '{}'", req.time)))?;
    let email = state
        .email
        .clone()
        .ok_or_else(|| not_configured("Email confirmation"))?;

    let request = ConfirmationRequest {
        email: req.email,
        phone: req.phone,
        date,
        time,
        address: req.address,
        price: req.price,
    };
    let report = booking::send_confirmation(email.as_ref(), state.sms.as_deref(), &request)
        .await
        .map_err(|e| booking_error(&state, e))?;
    info!(
        "Confirmation for {}: email_sent={}, sms_sent={}",
        request.email.trim(),
        report.email_sent,
        report.sms_sent
    );

    Ok(Json(ConfirmationResponse {
        email_sent: report.email_sent,
        sms_sent: report.sms_sent,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{read_json, FakeCrm, FakeEmail, FakeSms, TestState};
    use rust_decimal_macros::dec;

    fn book_request() -> BookRequest {
        BookRequest {
            first_name: "Ana".to_string(),
            last_name: "Lopez".to_string(),
            email: "ana@example.com".to_string(),
            phone: "555-010-1234".to_string(),
            address: "12 Elm St".to_string(),
            date: "2026-11-03".to_string(),
            time: "9:30 AM".to_string(),
            service_type: "Deep Cleaning".to_string(),
            notes: None,
            total_amount: dec!(182.425),
        }
    }

    fn confirmation() -> ConfirmationRequestBody {
        ConfirmationRequestBody {
            email: "ana@example.com".to_string(),
            phone: Some("555-010-1234".to_string()),
            date: "2026-11-03".to_string(),
            time: "09:30".to_string(),
            address: "12 Elm St".to_string(),
            price: dec!(150.00),
        }
    }

    #[tokio::test]
    async fn booking_without_crm_is_unavailable() {
        let state = TestState::new().build();
        let err = book_handler(State(state), Json(book_request())).await.err().unwrap();
        assert_eq!(err.0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn booking_returns_crm_identifiers() {
        let crm = Arc::new(FakeCrm::default());
        let state = TestState::new().with_crm(crm.clone()).build();

        let body = read_json(
            book_handler(State(state), Json(book_request()))
                .await
                .unwrap()
                .into_response(),
        )
        .await;
        assert_eq!(body["success"], true);
        assert_eq!(body["customer_id"], "cus_1");
        assert_eq!(body["job_id"], "job_1");
        assert_eq!(crm.last_unit_price(), Some(18243));
    }

    #[tokio::test]
    async fn booking_with_missing_fields_never_calls_crm() {
        let crm = Arc::new(FakeCrm::default());
        let state = TestState::new().with_crm(crm.clone()).build();
        let mut req = book_request();
        req.email = String::new();

        let err = book_handler(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("email"));
        assert_eq!(crm.calls(), 0);
    }

    #[tokio::test]
    async fn oversized_total_is_a_bad_request() {
        let crm = Arc::new(FakeCrm::default());
        let state = TestState::new().with_crm(crm.clone()).build();
        let mut req = book_request();
        req.total_amount = Decimal::MAX;

        let err = book_handler(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("total_amount"));
        assert_eq!(crm.calls(), 0);
    }

    #[tokio::test]
    async fn date_past_calendar_limit_is_a_bad_request() {
        let crm = Arc::new(FakeCrm::default());
        let state = TestState::new().with_crm(crm.clone()).build();
        let mut req = book_request();
        req.date = "+262142-12-31".to_string();
        req.time = "23:30".to_string();

        let err = book_handler(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(crm.calls(), 0);
    }

    #[tokio::test]
    async fn crm_failure_hides_details_and_offers_phone() {
        let crm = Arc::new(FakeCrm::failing());
        let state = TestState::new().with_crm(crm).build();

        let err = book_handler(State(state), Json(book_request())).await.err().unwrap();
        assert_eq!(err.0, StatusCode::BAD_GATEWAY);
        assert!(err.1.contains("(555) 010-0000"));
        assert!(!err.1.contains("boom"));
    }

    #[tokio::test]
    async fn sms_failure_keeps_email_sent() {
        let email = Arc::new(FakeEmail::default());
        let state = TestState::new()
            .with_email(email.clone())
            .with_sms(Arc::new(FakeSms::failing()))
            .build();

        let body = read_json(
            send_confirmation_handler(State(state), Json(confirmation()))
                .await
                .unwrap()
                .into_response(),
        )
        .await;
        assert_eq!(body["email_sent"], true);
        assert_eq!(body["sms_sent"], false);
        assert_eq!(email.sent(), 1);
    }

    #[tokio::test]
    async fn confirmation_rejects_bad_date() {
        let state = TestState::new().with_email(Arc::new(FakeEmail::default())).build();
        let mut req = confirmation();
        req.date = "11/03/2026".to_string();
        let err = send_confirmation_handler(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}

//! services/api/src/adapters/housecall_pro.rs
//!
//! This module contains the adapter for the Housecall Pro field-service CRM.
//! It implements the `FieldServiceCrm` port from the core crate.

use async_trait::async_trait;
use cleaning_core::domain::{CrmCustomer, CrmJob, NewCrmJob};
use cleaning_core::ports::{FieldServiceCrm, PortError, PortResult};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Debug, Deserialize)]
struct CustomerList {
    #[serde(default)]
    customers: Vec<CustomerRecord>,
}

#[derive(Debug, Deserialize)]
struct CustomerRecord {
    id: String,
    email: Option<String>,
    #[serde(default)]
    addresses: Vec<AddressRecord>,
}

#[derive(Debug, Deserialize)]
struct AddressRecord {
    id: String,
    street: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewCustomerBody<'a> {
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    mobile_number: &'a str,
    notifications_enabled: bool,
    addresses: Vec<NewAddressBody<'a>>,
}

#[derive(Debug, Serialize)]
struct NewAddressBody<'a> {
    street: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Serialize)]
struct NewJobBody<'a> {
    customer_id: &'a str,
    address_id: &'a str,
    schedule: ScheduleBody,
    line_items: Vec<LineItemBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ScheduleBody {
    scheduled_start: String,
    scheduled_end: String,
}

#[derive(Debug, Serialize)]
struct LineItemBody<'a> {
    name: &'a str,
    quantity: u32,
    /// Minor currency units.
    unit_price: i64,
}

#[derive(Debug, Deserialize)]
struct JobRecord {
    id: String,
    invoice_number: Option<serde_json::Value>,
    work_status: Option<String>,
}

impl JobRecord {
    fn to_domain(self) -> CrmJob {
        // The invoice number arrives as either a string or a number.
        let job_number = self.invoice_number.and_then(|v| match v {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });
        CrmJob {
            id: self.id,
            job_number,
            work_status: self.work_status,
        }
    }
}

fn same_street(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

#[derive(Clone)]
pub struct HousecallProAdapter {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HousecallProAdapter {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> PortResult<T> {
        let response = self
            .request(builder)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("Housecall Pro unreachable: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::NOT_FOUND => PortError::NotFound(body),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
                s if s.is_client_error() => PortError::Rejected(format!("Housecall Pro rejected the request ({}): {}", s, body)),
                s => PortError::Unexpected(format!("Housecall Pro returned {}: {}", s, body)),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::InvalidData(e.to_string()))
    }

    async fn get_customer(&self, customer_id: &str) -> PortResult<CustomerRecord> {
        self.send(self.http.get(format!("{}/customers/{}", self.base_url, customer_id)))
            .await
    }

    /// Returns the id of the customer's address matching `street`, adding it if missing.
    async fn ensure_address(&self, customer_id: &str, street: &str) -> PortResult<String> {
        let customer = self.get_customer(customer_id).await?;
        if let Some(existing) = customer
            .addresses
            .iter()
            .find(|a| a.street.as_deref().is_some_and(|s| same_street(s, street)))
        {
            return Ok(existing.id.clone());
        }
        debug!("Adding service address for customer {}", customer_id);
        let created: AddressRecord = self
            .send(
                self.http
                    .post(format!("{}/customers/{}/addresses", self.base_url, customer_id))
                    .json(&NewAddressBody { street, kind: "service" }),
            )
            .await?;
        Ok(created.id)
    }
}

//=========================================================================================
// `FieldServiceCrm` Trait Implementation
//=========================================================================================

#[async_trait]
impl FieldServiceCrm for HousecallProAdapter {
    async fn find_customer_by_email(&self, email: &str) -> PortResult<Option<CrmCustomer>> {
        let list: CustomerList = self
            .send(
                self.http
                    .get(format!("{}/customers", self.base_url))
                    .query(&[("q", email), ("page_size", "10")]),
            )
            .await?;
        // `q` is a fuzzy search; only an exact email match counts.
        Ok(list
            .customers
            .into_iter()
            .find(|c| c.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .map(|c| CrmCustomer { id: c.id, email: c.email }))
    }

    async fn create_customer(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        phone: &str,
        address: &str,
    ) -> PortResult<CrmCustomer> {
        let body = NewCustomerBody {
            first_name,
            last_name,
            email,
            mobile_number: phone,
            notifications_enabled: true,
            addresses: vec![NewAddressBody { street: address, kind: "service" }],
        };
        let created: CustomerRecord = self
            .send(self.http.post(format!("{}/customers", self.base_url)).json(&body))
            .await?;
        Ok(CrmCustomer {
            id: created.id,
            email: created.email,
        })
    }

    async fn create_job(&self, job: NewCrmJob) -> PortResult<CrmJob> {
        let address_id = self.ensure_address(&job.customer_id, &job.address).await?;
        let body = NewJobBody {
            customer_id: &job.customer_id,
            address_id: &address_id,
            schedule: ScheduleBody {
                scheduled_start: job.schedule.start.to_rfc3339(),
                scheduled_end: job.schedule.end.to_rfc3339(),
            },
            line_items: vec![LineItemBody {
                name: &job.line_item_name,
                quantity: 1,
                unit_price: job.unit_price_minor,
            }],
            notes: job.notes.as_deref(),
        };
        let created: JobRecord = self
            .send(self.http.post(format!("{}/jobs", self.base_url)).json(&body))
            .await?;
        Ok(created.to_domain())
    }

    async fn get_job(&self, job_id: &str) -> PortResult<CrmJob> {
        let job: JobRecord = self
            .send(self.http.get(format!("{}/jobs/{}", self.base_url, job_id)))
            .await?;
        Ok(job.to_domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_number_accepts_string_or_number() {
        let numeric: JobRecord =
            serde_json::from_value(json!({ "id": "job_1", "invoice_number": 1042 })).unwrap();
        assert_eq!(numeric.to_domain().job_number.as_deref(), Some("1042"));

        let text: JobRecord =
            serde_json::from_value(json!({ "id": "job_2", "invoice_number": "A-7", "work_status": "scheduled" }))
                .unwrap();
        let job = text.to_domain();
        assert_eq!(job.job_number.as_deref(), Some("A-7"));
        assert_eq!(job.work_status.as_deref(), Some("scheduled"));
    }

    #[test]
    fn job_body_prices_line_item_in_cents() {
        let body = NewJobBody {
            customer_id: "cus_1",
            address_id: "adr_1",
            schedule: ScheduleBody {
                scheduled_start: "2026-11-03T09:30:00+00:00".to_string(),
                scheduled_end: "2026-11-03T12:30:00+00:00".to_string(),
            },
            line_items: vec![LineItemBody {
                name: "Deep Cleaning",
                quantity: 1,
                unit_price: 18243,
            }],
            notes: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["line_items"][0]["unit_price"], 18243);
        assert!(value.get("notes").is_none());
    }

    #[test]
    fn street_match_ignores_case_and_padding() {
        assert!(same_street(" 12 Elm St", "12 elm st "));
        assert!(!same_street("12 Elm St", "14 Elm St"));
    }
}

//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the public catalog and quote endpoints and the
//! master definition for the OpenAPI specification.

use crate::web::state::AppState;
use crate::web::{auth, functions, messages, profile};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use cleaning_core::pricing::{
    compute_total, Quote, ServiceCatalog, ARRIVAL_FEE, EXTRA_SERVICES, FREQUENCY_OPTIONS,
    ROOM_PRICES,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        service_types_handler,
        pricing_table_handler,
        quote_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::password_reset_handler,
        auth::update_password_handler,
        profile::get_profile_handler,
        profile::update_profile_handler,
        messages::contacts_handler,
        messages::conversation_handler,
        messages::send_message_handler,
        messages::mark_read_handler,
        functions::book_handler,
        functions::job_status_handler,
        functions::send_confirmation_handler,
    ),
    components(
        schemas(
            ServiceTypeResponse, PricingTableResponse, PricedItem, FrequencyResponse,
            QuoteRequest, QuoteResponse,
            auth::SignupRequest, auth::SignupResponse, auth::LoginRequest, auth::AuthResponse,
            auth::PasswordResetRequest, auth::PasswordUpdateRequest,
            profile::ProfileResponse, profile::UpdateProfileRequest,
            messages::ContactResponse, messages::ContactsResponse, messages::MessageResponse,
            messages::ConversationResponse,
            messages::SendMessageRequest,
            functions::BookRequest, functions::BookResponse, functions::JobStatusResponse,
            functions::ConfirmationRequestBody, functions::ConfirmationResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Cleaning Service API", description = "Quotes, bookings, profiles and messaging for the cleaning service.")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ServiceTypeResponse {
    pub id: String,
    pub name: String,
    pub price_multiplier: Decimal,
    pub description: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct PricedItem {
    pub name: String,
    pub price: Decimal,
}

#[derive(Serialize, ToSchema)]
pub struct FrequencyResponse {
    pub id: String,
    pub name: String,
    pub price_multiplier: Decimal,
}

/// Everything the quote form needs to render its choices.
#[derive(Serialize, ToSchema)]
pub struct PricingTableResponse {
    pub rooms: Vec<PricedItem>,
    pub extras: Vec<PricedItem>,
    pub frequencies: Vec<FrequencyResponse>,
    pub arrival_fee: Decimal,
}

#[derive(Deserialize, ToSchema)]
pub struct QuoteRequest {
    pub service_type: String,
    pub frequency: String,
    #[serde(default)]
    pub room_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub extras: BTreeSet<String>,
}

#[derive(Serialize, ToSchema)]
pub struct QuoteResponse {
    pub total: Decimal,
    /// Fraction taken off by the frequency discount, e.g. `0.2`.
    pub discount: Decimal,
    pub rooms_total: Decimal,
    pub service_multiplier: Decimal,
    pub extras_total: Decimal,
    pub arrival_fee: Decimal,
    pub subtotal: Decimal,
    pub frequency_multiplier: Decimal,
    pub discount_amount: Decimal,
}

/// Loads the remote catalog, falling back to the built-in one.
pub async fn load_catalog(state: &AppState) -> ServiceCatalog {
    ServiceCatalog::resolve(state.service_types.list_service_types().await)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the service types, cheapest first.
#[utoipa::path(
    get,
    path = "/service-types",
    responses(
        (status = 200, description = "Service types ordered by multiplier", body = [ServiceTypeResponse])
    )
)]
pub async fn service_types_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let catalog = load_catalog(&state).await;
    let body: Vec<ServiceTypeResponse> = catalog
        .service_types()
        .iter()
        .map(|s| ServiceTypeResponse {
            id: s.id.clone(),
            name: s.name.clone(),
            price_multiplier: s.price_multiplier,
            description: s.description.clone(),
        })
        .collect();
    Json(body)
}

/// The fixed room, extra and frequency price tables.
#[utoipa::path(
    get,
    path = "/pricing",
    responses(
        (status = 200, description = "Price tables", body = PricingTableResponse)
    )
)]
pub async fn pricing_table_handler() -> impl IntoResponse {
    Json(PricingTableResponse {
        rooms: ROOM_PRICES
            .iter()
            .map(|(name, price)| PricedItem {
                name: name.to_string(),
                price: *price,
            })
            .collect(),
        extras: EXTRA_SERVICES
            .iter()
            .map(|e| PricedItem {
                name: e.name.to_string(),
                price: e.price,
            })
            .collect(),
        frequencies: FREQUENCY_OPTIONS
            .iter()
            .map(|f| FrequencyResponse {
                id: f.id.to_string(),
                name: f.name.to_string(),
                price_multiplier: f.price_multiplier,
            })
            .collect(),
        arrival_fee: ARRIVAL_FEE,
    })
}

/// Price a quote.
///
/// Unknown rooms and extras are ignored; an unknown service type or frequency
/// prices at multiplier 1.0.
#[utoipa::path(
    post,
    path = "/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Quote priced", body = QuoteResponse)
    )
)]
pub async fn quote_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuoteRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let quote = Quote {
        service_type: req.service_type,
        frequency: req.frequency,
        room_counts: req.room_counts,
        selected_extras: req.extras,
    };
    let catalog = load_catalog(&state).await;
    let priced = compute_total(&quote, &catalog);
    let breakdown = priced.breakdown;

    Ok((
        StatusCode::OK,
        Json(QuoteResponse {
            total: priced.total,
            discount: priced.discount,
            rooms_total: breakdown.rooms_total,
            service_multiplier: breakdown.service_multiplier,
            extras_total: breakdown.extras_total,
            arrival_fee: breakdown.arrival_fee,
            subtotal: breakdown.subtotal,
            frequency_multiplier: breakdown.frequency_multiplier,
            discount_amount: breakdown.discount_amount,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{read_json, TestState};

    fn scenario(frequency: &str) -> QuoteRequest {
        QuoteRequest {
            service_type: "standard".to_string(),
            frequency: frequency.to_string(),
            room_counts: BTreeMap::from([("Bedroom".to_string(), 2), ("Kitchen".to_string(), 1)]),
            extras: BTreeSet::from(["Oven Clean".to_string()]),
        }
    }

    #[tokio::test]
    async fn quote_prices_the_reference_scenario() {
        let state = TestState::new().build();
        let response = quote_handler(State(state), Json(scenario("weekly")))
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = read_json(response).await;
        assert_eq!(body["total"], "120.00");
        assert_eq!(body["discount"], "0.2");
        assert_eq!(body["subtotal"], "150.00");
    }

    #[tokio::test]
    async fn quote_uses_builtin_catalog_when_database_fails() {
        let state = TestState::new().failing_catalog().build();
        let mut req = scenario("one-time");
        req.service_type = "move".to_string();
        let body = read_json(quote_handler(State(state), Json(req)).await.unwrap().into_response()).await;
        // 60 * 2.0 + 30 + 60
        assert_eq!(body["total"], "210.00");
    }

    #[tokio::test]
    async fn service_types_fall_back_in_ascending_order() {
        let state = TestState::new().failing_catalog().build();
        let body = read_json(service_types_handler(State(state)).await.into_response()).await;
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["standard", "deep", "move"]);
    }

    #[tokio::test]
    async fn pricing_table_lists_all_frequencies() {
        let body = read_json(pricing_table_handler().await.into_response()).await;
        assert_eq!(body["frequencies"].as_array().unwrap().len(), 4);
        assert_eq!(body["arrival_fee"], serde_json::json!(ARRIVAL_FEE.to_string()));
    }
}

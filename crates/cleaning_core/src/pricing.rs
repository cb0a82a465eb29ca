//! crates/cleaning_core/src/pricing.rs
//!
//! The quote pricing engine: a pure mapping from a quote's selections to a
//! total and an itemized breakdown, over fixed in-code price tables and a
//! service-type catalog that falls back to a built-in triple.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::ports::PortResult;

/// Flat fee charged on every visit.
pub const ARRIVAL_FEE: Decimal = dec!(60.00);

/// Per-room base prices, before the service-type multiplier.
pub const ROOM_PRICES: &[(&str, Decimal)] = &[
    ("Bedroom", dec!(17.50)),
    ("Bathroom", dec!(22.50)),
    ("Kitchen", dec!(25.00)),
    ("Living Room", dec!(20.00)),
    ("Dining Room", dec!(15.00)),
    ("Office", dec!(15.00)),
    ("Laundry Room", dec!(12.50)),
    ("Hallway", dec!(10.00)),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraService {
    pub name: &'static str,
    pub price: Decimal,
}

pub const EXTRA_SERVICES: &[ExtraService] = &[
    ExtraService { name: "Oven Clean", price: dec!(30.00) },
    ExtraService { name: "Fridge Clean", price: dec!(30.00) },
    ExtraService { name: "Inside Cabinets", price: dec!(25.00) },
    ExtraService { name: "Interior Windows", price: dec!(35.00) },
    ExtraService { name: "Laundry", price: dec!(20.00) },
    ExtraService { name: "Wall Wiping", price: dec!(40.00) },
];

/// A visit frequency. The multiplier is a discount factor in `(0, 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrequencyOption {
    pub id: &'static str,
    pub name: &'static str,
    pub price_multiplier: Decimal,
}

pub const FREQUENCY_OPTIONS: &[FrequencyOption] = &[
    FrequencyOption { id: "one-time", name: "One Time", price_multiplier: dec!(1.0) },
    FrequencyOption { id: "monthly", name: "Monthly", price_multiplier: dec!(0.9) },
    FrequencyOption { id: "bi-weekly", name: "Bi-Weekly", price_multiplier: dec!(0.85) },
    FrequencyOption { id: "weekly", name: "Weekly", price_multiplier: dec!(0.8) },
];

/// A kind of cleaning, priced as a multiplier over the rooms total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: String,
    pub name: String,
    pub price_multiplier: Decimal,
    pub description: Option<String>,
}

//=========================================================================================
// Service Catalog
//=========================================================================================

/// The service types offered, ordered ascending by multiplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCatalog {
    service_types: Vec<ServiceType>,
}

impl ServiceCatalog {
    /// The built-in catalog used whenever the remote one is unavailable.
    pub fn fallback() -> Self {
        let entry = |id: &str, name: &str, multiplier: Decimal, description: &str| ServiceType {
            id: id.to_string(),
            name: name.to_string(),
            price_multiplier: multiplier,
            description: Some(description.to_string()),
        };
        Self {
            service_types: vec![
                entry("standard", "Standard Cleaning", dec!(1.0), "Regular upkeep of every selected room."),
                entry("deep", "Deep Cleaning", dec!(1.5), "Top-to-bottom clean including baseboards and fixtures."),
                entry("move", "Move In/Out Cleaning", dec!(2.0), "Empty-home clean for moving in or out."),
            ],
        }
    }

    /// Builds the catalog from a remote fetch, falling back when the fetch
    /// failed or came back empty. Entries with a non-positive multiplier are dropped.
    pub fn resolve(remote: PortResult<Vec<ServiceType>>) -> Self {
        let mut service_types = match remote {
            Ok(list) => list
                .into_iter()
                .filter(|s| s.price_multiplier > Decimal::ZERO)
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!("Service type fetch failed, using the built-in catalog: {}", e);
                return Self::fallback();
            }
        };
        if service_types.is_empty() {
            warn!("Service type catalog is empty, using the built-in catalog.");
            return Self::fallback();
        }
        service_types.sort_by(|a, b| a.price_multiplier.cmp(&b.price_multiplier));
        Self { service_types }
    }

    pub fn service_types(&self) -> &[ServiceType] {
        &self.service_types
    }

    pub fn multiplier_for(&self, id: &str) -> Option<Decimal> {
        self.service_types
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.price_multiplier)
    }
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self::fallback()
    }
}

//=========================================================================================
// Quote
//=========================================================================================

/// The customer's current selections. Recomputed on every change, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub service_type: String,
    pub frequency: String,
    #[serde(default)]
    pub room_counts: BTreeMap<String, u32>,
    #[serde(default)]
    pub selected_extras: BTreeSet<String>,
}

impl Quote {
    pub fn new(service_type: impl Into<String>, frequency: impl Into<String>) -> Self {
        Self {
            service_type: service_type.into(),
            frequency: frequency.into(),
            ..Default::default()
        }
    }

    pub fn room_count(&self, room: &str) -> u32 {
        self.room_counts.get(room).copied().unwrap_or(0)
    }

    pub fn increment_room(&mut self, room: &str) {
        let count = self.room_counts.entry(room.to_string()).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Decrements a room count, clamping at zero.
    pub fn decrement_room(&mut self, room: &str) {
        if let Some(count) = self.room_counts.get_mut(room) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn set_room(&mut self, room: &str, count: u32) {
        self.room_counts.insert(room.to_string(), count);
    }

    /// Adds the extra if it is not selected yet, removes it otherwise.
    pub fn toggle_extra(&mut self, extra: &str) {
        if !self.selected_extras.remove(extra) {
            self.selected_extras.insert(extra.to_string());
        }
    }
}

/// Every intermediate figure of a quote, for the itemized view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteBreakdown {
    pub rooms_total: Decimal,
    pub service_multiplier: Decimal,
    pub extras_total: Decimal,
    pub arrival_fee: Decimal,
    pub subtotal: Decimal,
    pub frequency_multiplier: Decimal,
    /// How much the frequency discount takes off the subtotal.
    pub discount_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteTotal {
    pub total: Decimal,
    /// `1 - frequency multiplier`, reported for display only.
    pub discount: Decimal,
    pub breakdown: QuoteBreakdown,
}

pub fn room_price(room: &str) -> Option<Decimal> {
    ROOM_PRICES
        .iter()
        .find(|(name, _)| *name == room)
        .map(|(_, price)| *price)
}

pub fn extra_price(extra: &str) -> Decimal {
    EXTRA_SERVICES
        .iter()
        .find(|e| e.name == extra)
        .map(|e| e.price)
        .unwrap_or(Decimal::ZERO)
}

pub fn frequency_multiplier(id: &str) -> Option<Decimal> {
    FREQUENCY_OPTIONS
        .iter()
        .find(|f| f.id == id)
        .map(|f| f.price_multiplier)
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Prices a quote. Unknown rooms and extras contribute nothing; an unknown
/// service type or frequency prices at multiplier 1.0.
pub fn compute_total(quote: &Quote, catalog: &ServiceCatalog) -> QuoteTotal {
    let rooms_total: Decimal = quote
        .room_counts
        .iter()
        .filter_map(|(room, count)| room_price(room).map(|price| price * Decimal::from(*count)))
        .sum();

    let extras_total: Decimal = quote
        .selected_extras
        .iter()
        .map(|extra| extra_price(extra))
        .sum();

    let service_multiplier = catalog
        .multiplier_for(&quote.service_type)
        .unwrap_or(Decimal::ONE);
    let frequency_multiplier = frequency_multiplier(&quote.frequency).unwrap_or(Decimal::ONE);

    let subtotal = rooms_total * service_multiplier + extras_total + ARRIVAL_FEE;
    let total = round_money(subtotal * frequency_multiplier);

    QuoteTotal {
        total,
        discount: Decimal::ONE - frequency_multiplier,
        breakdown: QuoteBreakdown {
            rooms_total,
            service_multiplier,
            extras_total,
            arrival_fee: ARRIVAL_FEE,
            subtotal: round_money(subtotal),
            frequency_multiplier,
            discount_amount: round_money(subtotal) - total,
        },
    }
}

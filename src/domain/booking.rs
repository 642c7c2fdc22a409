use crate::domain::phone;
use crate::error::{PaymentError, Result};
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Paid,
    Confirmed,
    Completed,
    Cancelled,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

/// A payment attempt attached to a booking. The server may retain history;
/// clients only inspect the most recent record.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentRecord {
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub transaction_id: Option<String>,
}

/// A named price tier on a service. Custom/quote-only tiers carry no fixed
/// price and never override the base price.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PricingOption {
    pub name: String,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub custom: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Service {
    pub name: String,
    pub price: Decimal,
}

/// A scheduled consultation as reported by the booking service. The payment
/// flow only ever reads it; `payments` is ordered most-recent-first.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Booking {
    pub id: String,
    pub status: BookingStatus,
    pub service: Service,
    pub date: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub meeting_link: Option<String>,
    #[serde(default)]
    pub payments: Vec<PaymentRecord>,
}

impl Booking {
    /// Status of the most recent payment attempt, if any.
    pub fn latest_payment_status(&self) -> Option<PaymentStatus> {
        self.payments.first().map(|p| p.status)
    }
}

/// Form payload for creating a booking. Shape is validated locally before
/// submission so malformed input surfaces at the field, not as an API error.
#[derive(Debug, Serialize, Clone)]
pub struct BookingRequest {
    pub service_id: String,
    pub date: String,
    pub start_time: String,
    pub payment_phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing_option: Option<String>,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<()> {
        Uuid::parse_str(&self.service_id).map_err(|_| {
            PaymentError::Validation(format!("invalid service id: {}", self.service_id))
        })?;
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|_| PaymentError::Validation(format!("invalid date: {}", self.date)))?;
        NaiveTime::parse_from_str(&self.start_time, "%H:%M").map_err(|_| {
            PaymentError::Validation(format!("invalid start time: {}", self.start_time))
        })?;
        phone::validate(&self.payment_phone)?;
        Ok(())
    }
}

/// Resolves the amount a payment session is seeded with.
///
/// A selected pricing option overrides the service's base price only when it
/// is not a custom/quote-only tier and actually carries a numeric price.
pub fn resolve_amount(service: &Service, selected: Option<&PricingOption>) -> Decimal {
    match selected {
        Some(option) if !option.custom => option.price.unwrap_or(service.price),
        _ => service.price,
    }
}

use crate::domain::booking::{Booking, BookingRequest, PaymentStatus};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Request body for the payment initiation call.
#[derive(Debug, Serialize, Clone)]
pub struct InitiateRequest {
    pub booking_id: String,
    pub payment_phone: String,
}

/// Response of a successful initiation. The gateway may or may not hand back
/// a tracking reference; without one the verification channel stays dark and
/// confirmation relies on booking status alone.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct InitiateAck {
    pub reference: Option<String>,
}

/// Result of a verification poll by reference. Anything but `success` means
/// "still pending" to the caller.
#[derive(Debug, Deserialize, Clone)]
pub struct VerificationOutcome {
    pub status: PaymentStatus,
}

/// Mobile-money gateway: triggers the STK push and answers verification
/// queries by reference.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate_stk_push(&self, req: InitiateRequest) -> Result<InitiateAck>;
    async fn verify(&self, reference: &str) -> Result<VerificationOutcome>;
}

/// Booking service: creates bookings and answers status reads.
#[async_trait]
pub trait BookingService: Send + Sync {
    async fn create_booking(&self, req: BookingRequest) -> Result<Booking>;
    async fn booking(&self, id: &str) -> Result<Booking>;
}

pub type PaymentGatewayHandle = Arc<dyn PaymentGateway>;
pub type BookingServiceHandle = Arc<dyn BookingService>;

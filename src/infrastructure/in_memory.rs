use crate::domain::booking::{Booking, BookingRequest, BookingStatus, PaymentRecord, Service};
use crate::domain::ports::{BookingService, InitiateAck, InitiateRequest, PaymentGateway, VerificationOutcome};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A gateway whose responses are scripted ahead of time.
///
/// Each `initiate_stk_push` consumes the next scripted initiation result;
/// each `verify` consumes the next scripted verification result, falling
/// back to "still pending" when the script runs dry. Call counters let tests
/// assert how often each channel actually fired.
#[derive(Default)]
pub struct ScriptedGateway {
    initiations: Mutex<VecDeque<Result<InitiateAck>>>,
    verifications: Mutex<VecDeque<Result<VerificationOutcome>>>,
    initiate_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Scripts a successful initiation, optionally with a tracking reference.
    pub async fn script_initiation_ok(&self, reference: Option<&str>) {
        self.initiations.lock().await.push_back(Ok(InitiateAck {
            reference: reference.map(str::to_owned),
        }));
    }

    /// Scripts an initiation rejection carrying an error payload.
    pub async fn script_initiation_rejected(&self, message: &str) {
        self.initiations
            .lock()
            .await
            .push_back(Err(PaymentError::Rejected(message.to_string())));
    }

    pub async fn script_verification(&self, outcome: Result<VerificationOutcome>) {
        self.verifications.lock().await.push_back(outcome);
    }

    pub fn initiate_calls(&self) -> usize {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate_stk_push(&self, _req: InitiateRequest) -> Result<InitiateAck> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        self.initiations
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(InitiateAck::default()))
    }

    async fn verify(&self, _reference: &str) -> Result<VerificationOutcome> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.verifications
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| {
                Ok(VerificationOutcome {
                    status: crate::domain::booking::PaymentStatus::Pending,
                })
            })
    }
}

/// A functioning in-memory booking service.
///
/// Bookings are created against a registered service catalog and can be
/// mutated directly (`mark_paid`, `record_failed_payment`) or scripted as a
/// sequence of status reads, which models a backend whose state changes
/// between polls.
#[derive(Default)]
pub struct InMemoryBookingService {
    services: RwLock<HashMap<String, Service>>,
    bookings: RwLock<HashMap<String, Booking>>,
    scripted_reads: Mutex<HashMap<String, VecDeque<Booking>>>,
    read_calls: AtomicUsize,
}

impl InMemoryBookingService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register_service(&self, service_id: &str, service: Service) {
        self.services
            .write()
            .await
            .insert(service_id.to_string(), service);
    }

    /// Inserts a booking as-is, bypassing creation. Useful for "Pay Now" on
    /// an existing pending booking.
    pub async fn insert(&self, booking: Booking) {
        self.bookings
            .write()
            .await
            .insert(booking.id.clone(), booking);
    }

    /// Queues a snapshot that the next status read for this booking will
    /// return (and persist). Later reads keep returning the last snapshot.
    pub async fn script_read(&self, booking: Booking) {
        self.scripted_reads
            .lock()
            .await
            .entry(booking.id.clone())
            .or_default()
            .push_back(booking);
    }

    pub async fn mark_paid(&self, id: &str) {
        if let Some(booking) = self.bookings.write().await.get_mut(id) {
            booking.status = BookingStatus::Paid;
        }
    }

    pub async fn record_failed_payment(&self, id: &str, record: PaymentRecord) {
        if let Some(booking) = self.bookings.write().await.get_mut(id) {
            booking.payments.insert(0, record);
        }
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BookingService for InMemoryBookingService {
    async fn create_booking(&self, req: BookingRequest) -> Result<Booking> {
        req.validate()?;
        let service = self
            .services
            .read()
            .await
            .get(&req.service_id)
            .cloned()
            .ok_or_else(|| PaymentError::Rejected(format!("unknown service: {}", req.service_id)))?;

        let booking = Booking {
            id: Uuid::new_v4().to_string(),
            status: BookingStatus::Pending,
            service,
            date: req.date,
            start_time: req.start_time,
            end_time: None,
            meeting_link: None,
            payments: Vec::new(),
        };
        self.insert(booking.clone()).await;
        Ok(booking)
    }

    async fn booking(&self, id: &str) -> Result<Booking> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(queue) = self.scripted_reads.lock().await.get_mut(id)
            && let Some(next) = queue.pop_front()
        {
            self.insert(next.clone()).await;
            return Ok(next);
        }

        self.bookings
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PaymentError::BookingNotFound(id.to_string()))
    }
}

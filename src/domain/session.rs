use crate::domain::booking::{BookingStatus, PaymentStatus};
use crate::domain::phone;
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Serialize;

/// Lifecycle phase of a payment session.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the user to enter a phone number.
    Input,
    /// STK push sent, countdown running, confirmation channels polling.
    AwaitingPrompt,
    /// Payment confirmed. Absorbing.
    Success,
    /// Attempt failed; the user may retry or change number.
    Failed,
}

impl Phase {
    pub fn is_settled(&self) -> bool {
        matches!(self, Phase::Success | Phase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Input => "input",
            Phase::AwaitingPrompt => "awaiting_prompt",
            Phase::Success => "success",
            Phase::Failed => "failed",
        }
    }
}

/// Why a session entered `Failed`. The variant decides both the user-facing
/// message and whether the retry actions are offered.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum FailureReason {
    /// The initiation call was rejected; carries the gateway's own message.
    Rejected(String),
    /// The initiation call never reached the gateway.
    Network,
    /// The payment record on the booking came back `failed`.
    Declined,
    /// The countdown ran out with no confirmation signal.
    Timeout,
}

impl FailureReason {
    pub fn message(&self) -> String {
        match self {
            FailureReason::Rejected(msg) => msg.clone(),
            FailureReason::Network => {
                "Could not reach the payment service. Please try again.".to_string()
            }
            FailureReason::Declined => {
                "Payment was declined. Check your M-Pesa balance or try a different number."
                    .to_string()
            }
            FailureReason::Timeout => {
                "We did not receive a confirmation in time. If you completed the prompt, \
                 the payment may still be detected automatically."
                    .to_string()
            }
        }
    }

    /// The generic network failure is the one case that does not offer the
    /// retry actions.
    pub fn offers_retry(&self) -> bool {
        !matches!(self, FailureReason::Network)
    }
}

/// Outcome of a single countdown tick.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Tick {
    Counting(u32),
    Expired,
    Stopped,
}

/// The client-local, ephemeral state of one payment attempt for one booking.
///
/// This is the pure state-machine core: every method is synchronous and free
/// of I/O, so the transition rules are testable without timers or network.
/// The async driver in `application::flow` feeds it collaborator results and
/// clock ticks.
#[derive(Debug, Clone)]
pub struct PaymentSession {
    booking_id: String,
    service_name: String,
    amount: Decimal,
    phase: Phase,
    payer_phone: Option<String>,
    reference: Option<String>,
    remaining_secs: Option<u32>,
    last_error: Option<FailureReason>,
    countdown_budget: u32,
    initiation_in_flight: bool,
    auto_initiate_pending: bool,
}

/// Read-only view published to observers after every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub booking_id: String,
    pub service_name: String,
    pub amount: Decimal,
    pub payer_phone: Option<String>,
    pub reference: Option<String>,
    pub remaining_secs: Option<u32>,
    pub last_error: Option<String>,
    pub offers_retry: bool,
}

impl PaymentSession {
    /// Creates a session in `Input`, waiting for a phone number.
    pub fn new(
        booking_id: impl Into<String>,
        amount: Decimal,
        service_name: impl Into<String>,
        countdown_budget: u32,
    ) -> Self {
        Self {
            booking_id: booking_id.into(),
            service_name: service_name.into(),
            amount,
            phase: Phase::Input,
            payer_phone: None,
            reference: None,
            remaining_secs: None,
            last_error: None,
            countdown_budget,
            initiation_in_flight: false,
            auto_initiate_pending: false,
        }
    }

    /// Creates a session pre-seeded with a known phone number. It starts in
    /// `AwaitingPrompt` and arms the one-shot auto-initiation latch.
    pub fn seeded(
        booking_id: impl Into<String>,
        amount: Decimal,
        service_name: impl Into<String>,
        countdown_budget: u32,
        initial_phone: &str,
    ) -> Self {
        let mut session = Self::new(booking_id, amount, service_name, countdown_budget);
        session.payer_phone = Some(phone::normalize(initial_phone));
        session.phase = Phase::AwaitingPrompt;
        session.remaining_secs = Some(countdown_budget);
        session.auto_initiate_pending = true;
        session
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn booking_id(&self) -> &str {
        &self.booking_id
    }

    pub fn payer_phone(&self) -> Option<&str> {
        self.payer_phone.as_deref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn remaining_secs(&self) -> Option<u32> {
        self.remaining_secs
    }

    pub fn last_error(&self) -> Option<&FailureReason> {
        self.last_error.as_ref()
    }

    /// Consumes the auto-initiation latch. Returns `true` exactly once for a
    /// seeded session, no matter how many times the driver asks.
    pub fn take_auto_initiation(&mut self) -> bool {
        std::mem::take(&mut self.auto_initiate_pending)
    }

    /// Starts a fresh initiation attempt, normalizing and storing the phone
    /// number. Returns the normalized number to hand to the gateway.
    ///
    /// At most one initiation may be in flight per session; a second caller
    /// gets `InitiationInFlight` instead of a second STK push.
    pub fn begin_initiation(&mut self, raw_phone: &str) -> Result<String> {
        if self.initiation_in_flight {
            return Err(PaymentError::InitiationInFlight);
        }
        if self.phase == Phase::Success {
            return Err(PaymentError::InvalidPhase {
                phase: self.phase.as_str(),
            });
        }

        let normalized = phone::normalize(raw_phone);
        self.payer_phone = Some(normalized.clone());
        self.reference = None;
        self.last_error = None;
        self.initiation_in_flight = true;
        self.phase = Phase::AwaitingPrompt;
        self.remaining_secs = Some(self.countdown_budget);
        Ok(normalized)
    }

    /// Records a successful initiation. The countdown restarts from the full
    /// budget; the reference (if the gateway returned one) is set for this
    /// attempt.
    pub fn initiation_succeeded(&mut self, reference: Option<String>) {
        self.initiation_in_flight = false;
        if self.phase != Phase::AwaitingPrompt {
            // Session was reset or closed while the call was in flight.
            return;
        }
        self.reference = reference;
        self.remaining_secs = Some(self.countdown_budget);
    }

    /// Records a failed initiation. No reference is set and the countdown
    /// never starts.
    pub fn initiation_failed(&mut self, reason: FailureReason) {
        self.initiation_in_flight = false;
        if self.phase != Phase::AwaitingPrompt {
            return;
        }
        self.reference = None;
        self.remaining_secs = None;
        self.fail(reason);
    }

    /// Decrements the countdown by one second of wall-clock time. On expiry
    /// the session fails with the advisory timeout message.
    pub fn tick(&mut self) -> Tick {
        if self.phase != Phase::AwaitingPrompt {
            return Tick::Stopped;
        }
        let Some(remaining) = self.remaining_secs else {
            return Tick::Stopped;
        };
        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            self.remaining_secs = None;
            self.fail(FailureReason::Timeout);
            Tick::Expired
        } else {
            self.remaining_secs = Some(remaining);
            Tick::Counting(remaining)
        }
    }

    /// Applies an observation from the booking-status poll.
    ///
    /// `paid` wins the race outright: it is honored while waiting and even
    /// just after a timeout, since the timeout is advisory and the backend
    /// may confirm late. A `failed` payment record only counts while still
    /// waiting; anything observed after the session settled otherwise is a
    /// stale signal and ignored.
    pub fn observe_booking(
        &mut self,
        status: BookingStatus,
        latest_payment: Option<PaymentStatus>,
    ) {
        if status == BookingStatus::Paid && self.confirmable() {
            self.phase = Phase::Success;
            self.remaining_secs = None;
            self.last_error = None;
            return;
        }
        if self.phase == Phase::AwaitingPrompt && latest_payment == Some(PaymentStatus::Failed) {
            self.remaining_secs = None;
            self.fail(FailureReason::Declined);
        }
    }

    /// Applies an observation from the verification poll. This channel only
    /// races toward `Success`; non-success results are "not yet confirmed".
    pub fn observe_verification(&mut self, status: PaymentStatus) {
        if status == PaymentStatus::Success && self.confirmable() {
            self.phase = Phase::Success;
            self.remaining_secs = None;
            self.last_error = None;
        }
    }

    /// Returns to `Input`, clearing the reference and the last error. Used
    /// both for "use a different number" from `Failed` and as the cancel
    /// action while waiting.
    pub fn reset(&mut self) -> Result<()> {
        match self.phase {
            Phase::Failed | Phase::AwaitingPrompt => {
                self.phase = Phase::Input;
                self.reference = None;
                self.last_error = None;
                self.remaining_secs = None;
                Ok(())
            }
            _ => Err(PaymentError::InvalidPhase {
                phase: self.phase.as_str(),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            booking_id: self.booking_id.clone(),
            service_name: self.service_name.clone(),
            amount: self.amount,
            payer_phone: self.payer_phone.clone(),
            reference: self.reference.clone(),
            remaining_secs: self.remaining_secs,
            last_error: self.last_error.as_ref().map(FailureReason::message),
            offers_retry: self
                .last_error
                .as_ref()
                .is_some_and(FailureReason::offers_retry),
        }
    }

    /// A success signal applies while waiting, and also right after a
    /// timeout: the timeout screen tells the user the payment may still be
    /// detected, so a late `paid` confirmation is honored rather than
    /// dropped.
    fn confirmable(&self) -> bool {
        self.phase == Phase::AwaitingPrompt
            || (self.phase == Phase::Failed && self.last_error == Some(FailureReason::Timeout))
    }

    fn fail(&mut self, reason: FailureReason) {
        self.phase = Phase::Failed;
        self.last_error = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn session() -> PaymentSession {
        PaymentSession::new("b1", dec!(2500), "Consult", 60)
    }

    #[test]
    fn test_starts_in_input() {
        let s = session();
        assert_eq!(s.phase(), Phase::Input);
        assert_eq!(s.remaining_secs(), None);
        assert_eq!(s.reference(), None);
    }

    #[test]
    fn test_seeded_session_arms_latch_once() {
        let mut s = PaymentSession::seeded("b1", dec!(2500), "Consult", 60, "0712345678");
        assert_eq!(s.phase(), Phase::AwaitingPrompt);
        assert_eq!(s.payer_phone(), Some("+254712345678"));
        assert!(s.take_auto_initiation());
        assert!(!s.take_auto_initiation());
        assert!(!s.take_auto_initiation());
    }

    #[test]
    fn test_unseeded_session_has_no_latch() {
        let mut s = session();
        assert!(!s.take_auto_initiation());
    }

    #[test]
    fn test_begin_initiation_normalizes_and_guards() {
        let mut s = session();
        let normalized = s.begin_initiation("712345678").unwrap();
        assert_eq!(normalized, "+254712345678");
        assert_eq!(s.phase(), Phase::AwaitingPrompt);
        assert_eq!(s.remaining_secs(), Some(60));

        // Second call while the first is still in flight is rejected.
        assert!(matches!(
            s.begin_initiation("0712345678"),
            Err(PaymentError::InitiationInFlight)
        ));
    }

    #[test]
    fn test_initiation_success_with_and_without_reference() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_succeeded(Some("ref1".to_string()));
        assert_eq!(s.reference(), Some("ref1"));
        assert_eq!(s.remaining_secs(), Some(60));

        // No reference in the response still lands in AwaitingPrompt.
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_succeeded(None);
        assert_eq!(s.phase(), Phase::AwaitingPrompt);
        assert_eq!(s.reference(), None);
        assert_eq!(s.remaining_secs(), Some(60));
    }

    #[test]
    fn test_initiation_failure_sets_gateway_message() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_failed(FailureReason::Rejected("insufficient balance".to_string()));
        assert_eq!(s.phase(), Phase::Failed);
        assert_eq!(s.reference(), None);
        assert_eq!(s.remaining_secs(), None);
        assert_eq!(s.snapshot().last_error.as_deref(), Some("insufficient balance"));
        assert!(s.snapshot().offers_retry);
    }

    #[test]
    fn test_network_failure_does_not_offer_retry() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_failed(FailureReason::Network);
        assert!(!s.snapshot().offers_retry);
    }

    #[test]
    fn test_countdown_expiry_is_timeout_failure() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_succeeded(None);
        for _ in 0..59 {
            assert!(matches!(s.tick(), Tick::Counting(_)));
        }
        assert_eq!(s.tick(), Tick::Expired);
        assert_eq!(s.phase(), Phase::Failed);
        assert_eq!(s.last_error(), Some(&FailureReason::Timeout));
        // Countdown stopped; further ticks are no-ops.
        assert_eq!(s.tick(), Tick::Stopped);
    }

    #[test]
    fn test_paid_status_wins_over_countdown() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_succeeded(None);
        s.tick();
        s.observe_booking(BookingStatus::Paid, None);
        assert_eq!(s.phase(), Phase::Success);
        assert_eq!(s.remaining_secs(), None);
    }

    #[test]
    fn test_paid_status_outranks_timeout_in_same_tick() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_succeeded(None);
        for _ in 0..60 {
            s.tick();
        }
        assert_eq!(s.phase(), Phase::Failed);
        // An in-flight poll that resolves paid still confirms the payment.
        s.observe_booking(BookingStatus::Paid, None);
        assert_eq!(s.phase(), Phase::Success);
    }

    #[test]
    fn test_failed_payment_record_declines_only_while_waiting() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_succeeded(None);
        s.observe_booking(BookingStatus::Pending, Some(PaymentStatus::Failed));
        assert_eq!(s.phase(), Phase::Failed);
        assert_eq!(s.last_error(), Some(&FailureReason::Declined));

        // A stale declined signal after settling is ignored.
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_succeeded(None);
        s.observe_booking(BookingStatus::Paid, None);
        s.observe_booking(BookingStatus::Pending, Some(PaymentStatus::Failed));
        assert_eq!(s.phase(), Phase::Success);
    }

    #[test]
    fn test_verification_only_races_toward_success() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_succeeded(Some("ref1".to_string()));
        s.observe_verification(PaymentStatus::Pending);
        assert_eq!(s.phase(), Phase::AwaitingPrompt);
        s.observe_verification(PaymentStatus::Failed);
        assert_eq!(s.phase(), Phase::AwaitingPrompt);
        s.observe_verification(PaymentStatus::Success);
        assert_eq!(s.phase(), Phase::Success);
    }

    #[test]
    fn test_success_is_absorbing() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_succeeded(None);
        s.observe_booking(BookingStatus::Paid, None);

        assert!(s.begin_initiation("0712345678").is_err());
        assert!(s.reset().is_err());
        assert_eq!(s.tick(), Tick::Stopped);
        s.observe_booking(BookingStatus::Cancelled, Some(PaymentStatus::Failed));
        assert_eq!(s.phase(), Phase::Success);
    }

    #[test]
    fn test_reset_clears_reference_and_error() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_failed(FailureReason::Rejected("insufficient balance".to_string()));
        s.reset().unwrap();
        assert_eq!(s.phase(), Phase::Input);
        assert_eq!(s.reference(), None);
        assert!(s.last_error().is_none());
        // The stored phone survives for "retry same number" flows.
        assert_eq!(s.payer_phone(), Some("+254712345678"));
    }

    #[test]
    fn test_retry_after_timeout_restarts_countdown() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.initiation_succeeded(Some("ref1".to_string()));
        for _ in 0..60 {
            s.tick();
        }
        assert_eq!(s.phase(), Phase::Failed);

        // Retry same number: fresh attempt, reference cleared until the new
        // initiation answers.
        s.begin_initiation("0712345678").unwrap();
        assert_eq!(s.phase(), Phase::AwaitingPrompt);
        assert_eq!(s.remaining_secs(), Some(60));
        assert_eq!(s.reference(), None);
        s.initiation_succeeded(Some("ref2".to_string()));
        assert_eq!(s.reference(), Some("ref2"));
    }

    #[test]
    fn test_late_initiation_result_after_reset_is_ignored() {
        let mut s = session();
        s.begin_initiation("0712345678").unwrap();
        s.reset().unwrap();
        s.initiation_succeeded(Some("ref1".to_string()));
        assert_eq!(s.phase(), Phase::Input);
        assert_eq!(s.reference(), None);
    }
}

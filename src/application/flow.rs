use crate::application::scheduler::{Repeat, TaskSet};
use crate::config::FlowConfig;
use crate::domain::booking::{Booking, PricingOption, resolve_amount};
use crate::domain::ports::{BookingServiceHandle, InitiateRequest, PaymentGatewayHandle};
use crate::domain::session::{FailureReason, PaymentSession, Phase, SessionSnapshot, Tick};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// Everything needed to open a payment session for a booking.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub booking_id: String,
    pub amount: Decimal,
    pub service_name: String,
    /// When present the session skips the input step and auto-initiates.
    pub initial_phone: Option<String>,
}

impl SessionParams {
    /// Seeds session parameters from a freshly created booking, applying the
    /// pricing-option override to the amount.
    pub fn from_booking(
        booking: &Booking,
        selected_option: Option<&PricingOption>,
        initial_phone: Option<String>,
    ) -> Self {
        Self {
            booking_id: booking.id.clone(),
            amount: resolve_amount(&booking.service, selected_option),
            service_name: booking.service.name.clone(),
            initial_phone,
        }
    }
}

struct FlowInner {
    session: Mutex<PaymentSession>,
    tasks: Mutex<TaskSet>,
    updates: watch::Sender<SessionSnapshot>,
    gateway: PaymentGatewayHandle,
    bookings: BookingServiceHandle,
    config: FlowConfig,
}

impl FlowInner {
    fn publish(&self, session: &PaymentSession) {
        self.updates.send_replace(session.snapshot());
    }
}

/// Async driver for one payment attempt on one booking.
///
/// Owns the [`PaymentSession`] state machine and wires it to the gateway and
/// booking collaborators plus three phase-scoped timers: a 1 s countdown, a
/// 4 s booking-status poll, and a 5 s verification poll (only when the
/// initiation returned a reference). Whichever confirmation channel reports
/// success first wins; the session is absorbing once confirmed, so the
/// losing channel's observation is a no-op.
///
/// Every timer callback re-checks the current phase under the session lock
/// before applying its effect, so a stale callback can never mutate a
/// session that has already resolved.
pub struct PaymentFlow {
    inner: Arc<FlowInner>,
}

impl PaymentFlow {
    /// Opens a session for a booking. With `initial_phone` set the session
    /// starts in `AwaitingPrompt` and fires the initiation call exactly
    /// once, guarded by a latch on the session itself so repeated calls into
    /// the driver cannot double-trigger it.
    pub fn open(
        gateway: PaymentGatewayHandle,
        bookings: BookingServiceHandle,
        config: FlowConfig,
        params: SessionParams,
    ) -> Self {
        let session = match &params.initial_phone {
            Some(phone) => PaymentSession::seeded(
                &params.booking_id,
                params.amount,
                &params.service_name,
                config.countdown_secs,
                phone,
            ),
            None => PaymentSession::new(
                &params.booking_id,
                params.amount,
                &params.service_name,
                config.countdown_secs,
            ),
        };

        let (updates, _) = watch::channel(session.snapshot());
        let flow = Self {
            inner: Arc::new(FlowInner {
                session: Mutex::new(session),
                tasks: Mutex::new(TaskSet::new()),
                updates,
                gateway,
                bookings,
                config,
            }),
        };
        flow.spawn_auto_initiation();
        flow
    }

    /// Fires the seeded initiation if the one-shot latch is still armed.
    /// Safe to call any number of times.
    fn spawn_auto_initiation(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let phone = {
                let mut session = inner.session.lock().await;
                if !session.take_auto_initiation() {
                    return;
                }
                session.payer_phone().map(str::to_owned)
            };
            let Some(phone) = phone else { return };
            let flow = PaymentFlow { inner };
            if let Err(err) = flow.initiate(&phone).await {
                debug!(error = %err, "auto-initiation did not run");
            }
        });
    }

    /// Submits a phone number from the input step and initiates the push.
    pub async fn submit_phone(&self, raw_phone: &str) -> Result<()> {
        crate::domain::phone::validate(raw_phone)?;
        self.initiate(raw_phone).await
    }

    /// Re-initiates with the number already on the session.
    pub async fn retry_same_phone(&self) -> Result<()> {
        let phone = {
            let session = self.inner.session.lock().await;
            session
                .payer_phone()
                .map(str::to_owned)
                .ok_or_else(|| PaymentError::Validation("no phone number on session".into()))?
        };
        self.initiate(&phone).await
    }

    /// Cancels the current attempt and returns to the input step. Works both
    /// from `Failed` ("use a different number") and from `AwaitingPrompt`
    /// (the cancel-equivalent while waiting). All timers are cleared first.
    pub async fn change_number(&self) -> Result<()> {
        self.stop_timers().await;
        let mut session = self.inner.session.lock().await;
        session.reset()?;
        self.inner.publish(&session);
        Ok(())
    }

    /// Discards the session: clears all timers so no background work
    /// continues after the dialog closes.
    pub async fn close(&self) {
        self.stop_timers().await;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.updates.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    /// Blocks until the session reaches `Success` or `Failed`.
    pub async fn wait_until_settled(&self) -> SessionSnapshot {
        let mut rx = self.subscribe();
        match rx.wait_for(|snap| snap.phase.is_settled()).await {
            Ok(snap) => snap.clone(),
            // The sender lives as long as `self`; this arm is unreachable in
            // practice but keeps the surface panic-free.
            Err(_) => self.snapshot(),
        }
    }

    /// Number of live timer tasks. Exposed for tests asserting the cleanup
    /// invariant.
    pub async fn active_task_count(&self) -> usize {
        self.inner.tasks.lock().await.active_count()
    }

    /// Runs one initiation attempt end to end: guard and normalize under the
    /// session lock, call the gateway without holding it, then apply the
    /// outcome and arm the wait timers on success.
    async fn initiate(&self, raw_phone: &str) -> Result<()> {
        let normalized = {
            let mut session = self.inner.session.lock().await;
            let normalized = session.begin_initiation(raw_phone)?;
            self.inner.publish(&session);
            normalized
        };
        // A retry must not accumulate timers from the previous attempt.
        self.stop_timers().await;

        let request = InitiateRequest {
            booking_id: self.snapshot().booking_id,
            payment_phone: normalized,
        };
        info!(booking_id = %request.booking_id, "initiating STK push");
        let outcome = self.inner.gateway.initiate_stk_push(request).await;

        let awaiting = {
            let mut session = self.inner.session.lock().await;
            match outcome {
                Ok(ack) => {
                    debug!(reference = ?ack.reference, "initiation accepted");
                    session.initiation_succeeded(ack.reference);
                }
                Err(err) => {
                    warn!(error = %err, "initiation failed");
                    session.initiation_failed(failure_reason(err));
                }
            }
            self.inner.publish(&session);
            session.phase() == Phase::AwaitingPrompt
        };
        if awaiting {
            self.arm_wait_timers().await;
        }
        Ok(())
    }

    /// Replaces the timer set with the three wait-phase timers. The
    /// verification poll is armed only if this attempt has a reference.
    async fn arm_wait_timers(&self) {
        let reference = {
            let session = self.inner.session.lock().await;
            session.reference().map(str::to_owned)
        };

        let mut tasks = self.inner.tasks.lock().await;
        tasks.abort_all();

        // 1 s countdown. On expiry the session fails with the advisory
        // timeout, but the poll tasks are left alone: an in-flight poll that
        // resolves `paid` right after still confirms the payment.
        let weak = Arc::downgrade(&self.inner);
        tasks.spawn_repeating(Duration::from_secs(1), move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return Repeat::Stop;
                };
                let mut session = inner.session.lock().await;
                let tick = session.tick();
                inner.publish(&session);
                match tick {
                    Tick::Counting(_) => Repeat::Continue,
                    Tick::Expired => {
                        info!(booking_id = %session.booking_id(), "payment wait timed out");
                        Repeat::Stop
                    }
                    Tick::Stopped => Repeat::Stop,
                }
            }
        });

        // 4 s booking-status poll.
        let weak = Arc::downgrade(&self.inner);
        tasks.spawn_repeating(self.inner.config.booking_poll_interval(), move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return Repeat::Stop;
                };
                let (booking_id, waiting) = {
                    let session = inner.session.lock().await;
                    (
                        session.booking_id().to_owned(),
                        session.phase() == Phase::AwaitingPrompt,
                    )
                };
                if !waiting {
                    return Repeat::Stop;
                }
                match inner.bookings.booking(&booking_id).await {
                    Ok(booking) => {
                        let mut session = inner.session.lock().await;
                        session.observe_booking(booking.status, booking.latest_payment_status());
                        inner.publish(&session);
                        if session.phase() == Phase::AwaitingPrompt {
                            Repeat::Continue
                        } else {
                            drop(session);
                            stop_all(&inner).await;
                            Repeat::Stop
                        }
                    }
                    Err(err) => {
                        // Transient; the next interval retries.
                        debug!(error = %err, "booking status poll failed");
                        Repeat::Continue
                    }
                }
            }
        });

        // 5 s verification fallback, keyed by reference. Confirms payments
        // even where the booking-status webhook never lands.
        if let Some(reference) = reference {
            let weak = Arc::downgrade(&self.inner);
            tasks.spawn_repeating(self.inner.config.verify_poll_interval(), move || {
                let weak = weak.clone();
                let reference = reference.clone();
                async move {
                    let Some(inner) = weak.upgrade() else {
                        return Repeat::Stop;
                    };
                    if inner.session.lock().await.phase() != Phase::AwaitingPrompt {
                        return Repeat::Stop;
                    }
                    match inner.gateway.verify(&reference).await {
                        Ok(outcome) => {
                            let mut session = inner.session.lock().await;
                            session.observe_verification(outcome.status);
                            inner.publish(&session);
                            if session.phase() == Phase::AwaitingPrompt {
                                Repeat::Continue
                            } else {
                                drop(session);
                                stop_all(&inner).await;
                                Repeat::Stop
                            }
                        }
                        Err(err) => {
                            // Never surfaced; treated as "not yet confirmed".
                            debug!(error = %err, "verification poll failed");
                            Repeat::Continue
                        }
                    }
                }
            });
        }
    }

    async fn stop_timers(&self) {
        self.inner.tasks.lock().await.abort_all();
    }
}

/// Clears the whole timer set the instant the session leaves the wait phase
/// through a poll observation.
async fn stop_all(inner: &Arc<FlowInner>) {
    inner.tasks.lock().await.abort_all();
}

fn failure_reason(err: PaymentError) -> FailureReason {
    match err {
        PaymentError::Rejected(message) => FailureReason::Rejected(message),
        PaymentError::Transport(_) => FailureReason::Network,
        other => FailureReason::Rejected(other.to_string()),
    }
}

//! Application layer orchestrating the payment confirmation flow.
//!
//! [`flow::PaymentFlow`] drives one booking's payment attempt from phone
//! submission to a settled outcome, racing the countdown against the two
//! polled confirmation channels. [`scheduler::TaskSet`] owns the timers.

pub mod flow;
pub mod scheduler;

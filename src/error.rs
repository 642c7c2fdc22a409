use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("validation error: {0}")]
    Validation(String),
    /// The gateway or booking API rejected the call and supplied a reason.
    #[error("{0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("an initiation call is already in flight for this session")]
    InitiationInFlight,
    #[error("operation not allowed in phase {phase}")]
    InvalidPhase { phase: &'static str },
    #[error("booking not found: {0}")]
    BookingNotFound(String),
}

pub type Result<T> = std::result::Result<T, PaymentError>;

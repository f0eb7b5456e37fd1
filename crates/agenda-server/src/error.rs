use agenda_kernel::FailureClass;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("store returned no row for {0}")]
    NotFound(&'static str),
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("invalid reply token")]
    InvalidToken,
    #[error("messaging API rejected credentials ({0})")]
    Unauthorized(u16),
    #[error("rate limited by messaging API")]
    RateLimited,
    #[error("connection error: {0}")]
    Connection(String),
    #[error("messaging API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Other(String),
}

impl DeliveryError {
    pub fn class(&self) -> FailureClass {
        match self {
            DeliveryError::InvalidToken | DeliveryError::Unauthorized(_) => FailureClass::Permanent,
            DeliveryError::RateLimited => FailureClass::RateLimit,
            DeliveryError::Connection(_) => FailureClass::Connection,
            DeliveryError::Status { body, .. } => FailureClass::from_message(body),
            DeliveryError::Other(message) => FailureClass::from_message(message),
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            DeliveryError::Connection(e.to_string())
        } else {
            DeliveryError::Other(e.to_string())
        }
    }
}

use std::time::Duration;

/// How a failed delivery attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retrying cannot help (expired or invalid reply token, bad credentials).
    Permanent,
    Connection,
    RateLimit,
    Other,
}

impl FailureClass {
    /// Classifies a free-form error description. Used when the failure did
    /// not come with a structured status.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("invalid reply token") || lower.contains("token expired") {
            FailureClass::Permanent
        } else if lower.contains("connection") || lower.contains("reset") {
            FailureClass::Connection
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            FailureClass::RateLimit
        } else {
            FailureClass::Other
        }
    }
}

/// Linear backoff: `step * attempt`, never above `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub step: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.cap)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub connection: Backoff,
    pub rate_limit: Backoff,
    pub other: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            connection: Backoff {
                step: Duration::from_secs(2),
                cap: Duration::from_secs(10),
            },
            rate_limit: Backoff {
                step: Duration::from_secs(5),
                cap: Duration::from_secs(30),
            },
            other: Backoff {
                step: Duration::from_secs(1),
                cap: Duration::from_secs(5),
            },
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (1-based), or `None` when
    /// the sender should stop retrying.
    pub fn delay_after(&self, class: FailureClass, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        match class {
            FailureClass::Permanent => None,
            FailureClass::Connection => Some(self.connection.delay(attempt)),
            FailureClass::RateLimit => Some(self.rate_limit.delay(attempt)),
            FailureClass::Other => Some(self.other.delay(attempt)),
        }
    }
}

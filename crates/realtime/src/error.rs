use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RealtimeError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unauthorized")]
    Auth,
    #[error("json error: {0}")]
    Serde(String),
    #[error("url error: {0}")]
    Url(String),
    #[error("realtime channel closed")]
    Closed,
    #[error("server rejected {topic}: {message}")]
    Rejected { topic: String, message: String },
}

impl RealtimeError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serde(error.to_string())
    }
}

pub(crate) fn map_reqwest_error(error: reqwest::Error) -> RealtimeError {
    if error.is_timeout() {
        RealtimeError::Timeout
    } else {
        RealtimeError::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_failures_are_retried() {
        assert!(RealtimeError::Timeout.should_retry());
        assert!(RealtimeError::Transport("reset".into()).should_retry());
        assert!(
            RealtimeError::Http {
                status: 503,
                body: String::new()
            }
            .should_retry()
        );
        assert!(
            !RealtimeError::Http {
                status: 404,
                body: String::new()
            }
            .should_retry()
        );
        assert!(!RealtimeError::Auth.should_retry());
        assert!(!RealtimeError::Closed.should_retry());
    }
}

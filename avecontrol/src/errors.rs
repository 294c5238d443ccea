use thiserror::Error;

/// Erreurs du control point, alignées sur la taxonomie du protocole.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error {0}")]
    Http(u16),

    #[error("UPnP error {0}: {1}")]
    Upnp(u32, String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Subscription lost: {0}")]
    SubscriptionLost(String),
}

impl ControlError {
    pub fn invalid_response(detail: impl Into<String>) -> Self {
        ControlError::InvalidResponse(detail.into())
    }

    pub fn precondition(detail: impl Into<String>) -> Self {
        ControlError::PreconditionFailed(detail.into())
    }
}

impl From<ureq::Error> for ControlError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(reason) => ControlError::Timeout(reason.to_string()),
            ureq::Error::StatusCode(status) => ControlError::Http(status),
            other => ControlError::Network(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ControlError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            ControlError::Timeout(err.to_string())
        } else {
            ControlError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeout_maps_to_timeout() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "late");
        assert!(matches!(ControlError::from(err), ControlError::Timeout(_)));
    }

    #[test]
    fn io_refused_maps_to_network() {
        let err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "nope");
        assert!(matches!(ControlError::from(err), ControlError::Network(_)));
    }
}

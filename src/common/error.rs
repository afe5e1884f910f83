//! Error types for sensorkv

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Routing Errors ===
    #[error("No healthy receivers available")]
    NoHealthyReceivers,

    #[error("Receiver unavailable: {0}")]
    ReceiverUnavailable(String),

    #[error("Unknown receiver: {0}")]
    UnknownReceiver(String),

    // === Lifecycle Errors ===
    #[error("Receiver {0} is retired and cannot be restarted")]
    ReceiverRetired(String),

    #[error("Provisioning failed for {slot}: {reason}")]
    ProvisionFailed { slot: String, reason: String },

    #[error("Backup slot {slot} exhausted after {attempts} attempts")]
    RecoveryExhausted { slot: String, attempts: u32 },

    #[error("Backup pool has no usable slots")]
    BackupPoolEmpty,

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NoHealthyReceivers | Error::ReceiverUnavailable(_) | Error::ProvisionFailed { .. }
        )
    }

    /// Does this error require operator action?
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::RecoveryExhausted { .. } | Error::BackupPoolEmpty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::NoHealthyReceivers.is_retryable());
        assert!(Error::ReceiverUnavailable("r1".into()).is_retryable());
        assert!(!Error::ReceiverRetired("r1".into()).is_retryable());
        assert!(!Error::InvalidConfig("x".into()).is_retryable());
    }

    #[test]
    fn test_exhaustion_is_fatal() {
        let err = Error::RecoveryExhausted {
            slot: "backup-1".into(),
            attempts: 3,
        };
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Backup slot backup-1 exhausted after 3 attempts");
        assert!(!Error::NoHealthyReceivers.is_fatal());
    }
}

use std::time::Duration;

use labnode_frame::FrameConfig;

use crate::error::{Result, SessionError};
use crate::protocol::REQUEST_ID_POOL_SIZE;

/// Default per-request and connect timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2500);

/// Pause after a non-fatal read error before reading again.
pub const DEFAULT_READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for a single request and for opening the link. Default: 2.5 s.
    pub timeout: Duration,
    /// Number of request identifiers, 1 to 24. Default: 24.
    pub id_pool_size: usize,
    /// Frame size limits.
    pub frame: FrameConfig,
    /// Back-off after an I/O error that did not end the stream. Default: 100 ms.
    pub read_error_backoff: Duration,
    /// Upper bound for flushing and shutting down the link on teardown.
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            id_pool_size: REQUEST_ID_POOL_SIZE,
            frame: FrameConfig::default(),
            read_error_backoff: DEFAULT_READ_ERROR_BACKOFF,
            close_timeout: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    /// Default configuration with a different request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Check the configuration before a connection is opened.
    pub fn validate(&self) -> Result<()> {
        validate_timeout(self.timeout)?;
        validate_pool_size(self.id_pool_size)?;
        if self.frame.max_frame_size < 8 {
            return Err(SessionError::InvalidConfig(format!(
                "max frame size too small: {}",
                self.frame.max_frame_size
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(SessionError::InvalidConfig(
            "timeout must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_pool_size(size: usize) -> Result<()> {
    if size == 0 || size > REQUEST_ID_POOL_SIZE {
        return Err(SessionError::InvalidConfig(format!(
            "request id pool size must be 1..={REQUEST_ID_POOL_SIZE}, got {size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.id_pool_size, 24);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_zero_timeout() {
        let config = SessionConfig::with_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(SessionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_pool_sizes_outside_one_byte_ids() {
        for size in [0, 25, 256] {
            let config = SessionConfig {
                id_pool_size: size,
                ..SessionConfig::default()
            };
            assert!(config.validate().is_err(), "size {size} accepted");
        }
    }
}

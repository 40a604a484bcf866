//! Session configuration and reconnect policy.

use std::time::Duration;

use crate::protocol::{DEFAULT_FRAME_BODY_LIMIT, DEFAULT_MAX_FRAME_BODY, DEFAULT_MAX_PAYLOAD_SIZE};

/// Default capacity of the outbound payload channel and the inbound
/// dispatch channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Default maximum concurrent inbound request handlers.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Reconnect-on-disconnect policy.
///
/// The reference design retried immediately in an unthrottled loop; that is
/// tolerable for machine-local pipes but hot-loops on a networked transport,
/// so attempts here back off exponentially between `initial_delay` and
/// `max_delay`. Attempts continue until the endpoint is explicitly
/// disconnected.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Whether to return to `Connecting` after a disconnect.
    pub enabled: bool,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for the backoff delay.
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Auto-reconnect with the default bounded backoff.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }

    /// No reconnection; the session ends at the first disconnect.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::enabled()
        }
    }

    /// Backoff delay for the given retry attempt (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::enabled()
    }
}

/// Tunables for one duplex endpoint.
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Maximum frame body size used when chunking outbound payloads.
    pub max_frame_body: usize,
    /// Per-frame body length accepted from the wire before the stream is
    /// declared corrupt.
    pub frame_body_limit: u32,
    /// Cap on a fully reassembled inbound payload.
    pub max_payload_size: usize,
    /// Capacity of the outbound and inbound channels.
    pub channel_capacity: usize,
    /// Maximum concurrent inbound request handlers.
    pub max_concurrent_handlers: usize,
    /// Reconnect policy applied after a disconnect.
    pub reconnect: ReconnectPolicy,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_frame_body: DEFAULT_MAX_FRAME_BODY,
            frame_body_limit: DEFAULT_FRAME_BODY_LIMIT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = ReconnectPolicy::enabled();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(2));
    }

    #[test]
    fn test_disabled_policy() {
        assert!(!ReconnectPolicy::disabled().enabled);
        assert!(ReconnectPolicy::default().enabled);
    }

    #[test]
    fn test_config_defaults() {
        let config = WireConfig::default();
        assert_eq!(config.max_frame_body, 4096);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(
            config.max_concurrent_handlers,
            DEFAULT_MAX_CONCURRENT_HANDLERS
        );
    }
}

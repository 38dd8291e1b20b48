//! Error classification
//!
//! Maps every failure raised inside the client to the actions the client
//! takes: record it, notify listeners, and whether to request a reconnect.

use crate::error::Error;

/// When a failure should arm the reconnect scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Never,
    Always,
    IfDisconnected,
}

/// What the client does with a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disposition {
    /// Store as the last error and raise the pending flag
    pub record: bool,
    /// Invoke the error listener
    pub notify_error: bool,
    /// Invoke the state-changed listener (only while not connected)
    pub notify_state: bool,
    /// Invoke the connection-closed listener
    pub notify_closed: bool,
    pub reconnect: ReconnectPolicy,
}

impl Disposition {
    const IGNORE: Self = Self {
        record: false,
        notify_error: false,
        notify_state: false,
        notify_closed: false,
        reconnect: ReconnectPolicy::Never,
    };

    const REPORT: Self = Self {
        record: true,
        notify_error: true,
        notify_state: false,
        notify_closed: false,
        reconnect: ReconnectPolicy::Never,
    };

    /// Whether a reconnect should be requested given the current connection
    pub fn wants_reconnect(&self, is_connected: bool) -> bool {
        match self.reconnect {
            ReconnectPolicy::Never => false,
            ReconnectPolicy::Always => true,
            ReconnectPolicy::IfDisconnected => !is_connected,
        }
    }

    /// Whether nothing at all happens
    pub fn is_ignored(&self) -> bool {
        *self == Self::IGNORE
    }
}

/// Classify a failure
pub fn classify(error: &Error) -> Disposition {
    match error {
        Error::RegexMatchTimeout { .. } => Disposition::REPORT,

        Error::Shutdown => Disposition::IGNORE,

        Error::SendTimeout { .. } | Error::ReceiveTimeout { .. } | Error::ConnectTimeout { .. } => {
            Disposition {
                notify_state: true,
                reconnect: ReconnectPolicy::Always,
                ..Disposition::IGNORE
            }
        }

        Error::PeerClosedPrematurely { .. } | Error::InvalidState { .. } => Disposition {
            notify_state: true,
            notify_closed: true,
            reconnect: ReconnectPolicy::Always,
            ..Disposition::IGNORE
        },

        Error::StaleConnection { .. } => Disposition {
            notify_state: true,
            reconnect: ReconnectPolicy::Always,
            ..Disposition::IGNORE
        },

        // Retrying cannot repair a malformed target or a bad configuration
        Error::InvalidUri { .. }
        | Error::ConfigNotFound { .. }
        | Error::ConfigParse { .. }
        | Error::ConfigValidation { .. }
        | Error::Config(_) => Disposition::REPORT,

        Error::Transport { .. } | Error::ConnectFailed { .. } => Disposition {
            reconnect: ReconnectPolicy::IfDisconnected,
            ..Disposition::REPORT
        },

        _ => Disposition {
            reconnect: ReconnectPolicy::IfDisconnected,
            ..Disposition::REPORT
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorCode;

    #[test]
    fn test_regex_timeout_never_reconnects() {
        let d = classify(&Error::RegexMatchTimeout {
            pattern: "ok".into(),
            received: "nope".into(),
            timeout_ms: 100,
        });
        assert!(d.record);
        assert!(d.notify_error);
        assert!(!d.wants_reconnect(false));
        assert!(!d.wants_reconnect(true));
    }

    #[test]
    fn test_shutdown_is_swallowed() {
        assert!(classify(&Error::Shutdown).is_ignored());
    }

    #[test]
    fn test_operation_timeouts_reconnect() {
        for err in [
            Error::SendTimeout { timeout_ms: 1 },
            Error::ReceiveTimeout { timeout_ms: 1 },
        ] {
            let d = classify(&err);
            assert!(d.notify_state);
            assert!(!d.record);
            assert!(d.wants_reconnect(true));
        }
    }

    #[test]
    fn test_premature_close_notifies_closed() {
        let d = classify(&Error::PeerClosedPrematurely {
            message: "reset".into(),
        });
        assert!(d.notify_closed);
        assert!(d.notify_state);
        assert!(d.wants_reconnect(true));

        let d = classify(&Error::InvalidState {
            message: "closed".into(),
        });
        assert!(d.notify_closed);
    }

    #[test]
    fn test_stale_connection() {
        let d = classify(&Error::StaleConnection {
            state: "closed".into(),
        });
        assert!(d.notify_state);
        assert!(!d.notify_closed);
        assert!(d.wants_reconnect(false));
    }

    #[test]
    fn test_transport_errors_reconnect_only_when_down() {
        let d = classify(&Error::transport(TransportErrorCode::Protocol, "bad"));
        assert!(d.record);
        assert!(d.notify_error);
        assert!(d.wants_reconnect(false));
        assert!(!d.wants_reconnect(true));
    }

    #[test]
    fn test_unclassified_errors() {
        let d = classify(&Error::Internal("boom".into()));
        assert!(d.record);
        assert!(d.wants_reconnect(false));
        assert!(!d.wants_reconnect(true));
    }

    #[test]
    fn test_invalid_uri_is_reported_only() {
        let d = classify(&Error::InvalidUri {
            uri: "::".into(),
            message: "bad".into(),
        });
        assert!(d.record);
        assert!(!d.wants_reconnect(false));
    }
}

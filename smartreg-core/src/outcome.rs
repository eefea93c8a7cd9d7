//! Per-device batch results.

use std::fmt;

/// Terminal result for one device of a batch.
///
/// Rendered with [`fmt::Display`] as the single line reported back to the
/// submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The device confirmed registration (or already was registered).
    Registered {
        /// Device hostname.
        hostname: String,
        /// Device address.
        address: String,
    },
    /// Registration was not confirmed before the poll timed out.
    RegistrationFailed {
        /// Device hostname.
        hostname: String,
        /// Device address.
        address: String,
        /// Text after `Failure reason:` when the device reported one.
        reason: Option<String>,
    },
    /// No session could be established; the hostname was never learned.
    ConnectFailed {
        /// Device address.
        address: String,
        /// Transport error text.
        error: String,
    },
    /// The workflow stopped on an unexpected error.
    Error {
        /// Device address.
        address: String,
        /// Error text.
        message: String,
    },
}

impl RegistrationOutcome {
    /// Address of the device this outcome belongs to.
    pub fn address(&self) -> &str {
        match self {
            Self::Registered { address, .. }
            | Self::RegistrationFailed { address, .. }
            | Self::ConnectFailed { address, .. }
            | Self::Error { address, .. } => address,
        }
    }

    /// True only for [`RegistrationOutcome::Registered`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Registered { .. })
    }

    /// Outcome line including the trailing newline, as streamed to clients.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered { hostname, .. } => write!(f, "{hostname} - OK"),
            Self::RegistrationFailed { hostname, .. } => {
                write!(f, "{hostname} - FAILED to register")
            }
            Self::ConnectFailed { address, .. } => {
                write!(f, "{address} - FAILED to CONNECT")
            }
            Self::Error { address, message } => {
                write!(f, "{address} - ERROR: {message}")
            }
        }
    }
}

//! Error types shared across the crate.

use std::time::Duration;

use thiserror::Error;

use crate::workflow::Stage;

/// Failures raised by a command-line session transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The session process could not be started.
    #[error("failed to spawn session process `{program}`: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the session failed.
    #[error("session IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The device did not answer within the allowed time.
    #[error("timed out after {after:?} waiting for {waiting_for}")]
    Timeout {
        /// What the session was waiting for, e.g. a command or the prompt.
        waiting_for: String,
        /// Time waited.
        after: Duration,
    },

    /// The remote end closed the session without an explanation.
    #[error("session closed by remote end")]
    Closed,

    /// Login or enable credentials were rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The device refused a configuration line.
    #[error("device rejected `{command}`: {output}")]
    Rejected {
        /// Line that was refused.
        command: String,
        /// Device output explaining the refusal.
        output: String,
    },

    /// Any other transport failure.
    #[error("transport error: {0}")]
    Other(String),
}

/// Failures while persisting an audit report.
#[derive(Error, Debug)]
pub enum AuditError {
    /// The report file could not be written.
    #[error("failed to write audit report {path}: {source}")]
    Write {
        /// Destination of the report.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors that terminate one device's registration workflow.
///
/// Connection failures and registration timeouts never surface here; the
/// workflow turns them into outcomes. Everything in this enum is an
/// unclassified step failure that the orchestrator reports per device.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// A session command failed mid-workflow.
    #[error("transport error during {stage}: {source}")]
    Transport {
        /// Stage that issued the command.
        stage: Stage,
        /// Transport failure.
        #[source]
        source: TransportError,
    },

    /// A step ran without an open session.
    #[error("no open session for {address} during {stage}")]
    NotConnected {
        /// Device address.
        address: String,
        /// Stage that needed the session.
        stage: Stage,
    },

    /// The audit report could not be stored.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// The background diff task panicked or was cancelled.
    #[error("configuration diff task failed: {0}")]
    DiffTask(#[from] tokio::task::JoinError),

    /// The configuration template is unusable.
    #[error("Invalid configuration template: {0}")]
    Template(String),

    /// Local IO failed, e.g. reading the template.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistrationError {
    pub(crate) fn transport(stage: Stage) -> impl FnOnce(TransportError) -> Self {
        move |source| Self::Transport { stage, source }
    }
}

/// Result alias for workflow steps.
pub type Result<T> = std::result::Result<T, RegistrationError>;

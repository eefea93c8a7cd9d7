//! Boundary to the remote command-line session.
//!
//! The workflow only talks to devices through [`SessionTransport`] and the
//! [`CliSession`] it yields; [`openssh::OpenSshTransport`] drives the system
//! OpenSSH client for production use.

pub mod openssh;

use async_trait::async_trait;

use crate::{
    device::ConnectionParameters, error::TransportError,
    template::ConfigTemplate,
};

pub use openssh::{OpenSshSettings, OpenSshTransport};

/// Opens authenticated sessions to devices.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Opens a session to the device addressed by `params`.
    async fn open(
        &self,
        params: &ConnectionParameters,
    ) -> Result<Box<dyn CliSession>, TransportError>;
}

/// An open command-line session on one device.
#[async_trait]
pub trait CliSession: Send {
    /// Moves the session into privileged (enable) mode.
    async fn enter_privileged_mode(&mut self) -> Result<(), TransportError>;

    /// Current prompt, e.g. `edge-rtr-01#`.
    async fn find_prompt(&mut self) -> Result<String, TransportError>;

    /// Runs an exec-mode command and returns its output.
    async fn send_command(
        &mut self,
        command: &str,
    ) -> Result<String, TransportError>;

    /// Enters configuration mode, applies `lines` in order, and leaves it.
    async fn send_config_set(
        &mut self,
        lines: &[String],
    ) -> Result<(), TransportError>;

    /// Applies a single configuration line.
    async fn send_config_line(
        &mut self,
        line: &str,
    ) -> Result<(), TransportError> {
        self.send_config_set(&[line.to_string()]).await
    }

    /// Applies every line of `template`.
    async fn send_config_from_template(
        &mut self,
        template: &ConfigTemplate,
    ) -> Result<(), TransportError> {
        self.send_config_set(template.lines()).await
    }

    /// Persists the running configuration.
    async fn save_config(&mut self) -> Result<(), TransportError>;

    /// Logs out and releases the session.
    async fn close(&mut self) -> Result<(), TransportError>;
}

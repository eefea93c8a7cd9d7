//! Per-device state and the workflow steps that act on it.

pub(crate) mod commands;
pub mod params;
pub mod status;

use std::fmt;

use tracing::{debug, info, warn};

use crate::{
    audit::{AuditReport, AuditSink},
    clock::Clock,
    error::{RegistrationError, Result, TransportError},
    template::ConfigTemplate,
    transport::{CliSession, SessionTransport},
    workflow::{PollOutcome, PollPolicy, Stage},
};

pub use params::{ConnectionParameters, DeviceFamily};
pub use status::{InterfaceEntry, LicenseStatus, ParseAnomaly};

/// One target device and everything learned about it during a run.
///
/// The open session is private: it is created by [`DeviceRecord::connect`],
/// consumed by the step methods below and dropped by
/// [`DeviceRecord::disconnect`].
pub struct DeviceRecord {
    address: String,
    params: ConnectionParameters,
    hostname: Option<String>,
    registered: bool,
    dlc_supported: bool,
    dlc_started: bool,
    http_client_source: Option<String>,
    session: Option<Box<dyn CliSession>>,
}

impl fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("address", &self.address)
            .field("params", &self.params)
            .field("hostname", &self.hostname)
            .field("registered", &self.registered)
            .field("dlc_supported", &self.dlc_supported)
            .field("dlc_started", &self.dlc_started)
            .field("http_client_source", &self.http_client_source)
            .field("connected", &self.session.is_some())
            .finish()
    }
}

impl DeviceRecord {
    /// Builds a record with its own copy of `template` bound to `address`.
    pub fn new(address: impl Into<String>, template: &ConnectionParameters) -> Self {
        let address = address.into();
        Self {
            params: template.for_address(address.clone()),
            address,
            hostname: None,
            registered: false,
            dlc_supported: false,
            dlc_started: false,
            http_client_source: None,
            session: None,
        }
    }

    /// Address the device is reached at.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// This device's own copy of the connection parameters.
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Hostname learned from the prompt, once connected.
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Hostname when known, the address otherwise.
    pub fn label(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.address)
    }

    /// Registration state from the last status check.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Whether the device reports a data-learning/conversion status.
    pub fn dlc_supported(&self) -> bool {
        self.dlc_supported
    }

    /// Whether conversion has already been started.
    pub fn dlc_started(&self) -> bool {
        self.dlc_started
    }

    /// Source interface chosen to reach the licensing server.
    pub fn http_client_source(&self) -> Option<&str> {
        self.http_client_source.as_deref()
    }

    /// True while a session is open.
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn session(&mut self, stage: Stage) -> Result<&mut Box<dyn CliSession>> {
        match self.session.as_mut() {
            Some(session) => Ok(session),
            None => Err(RegistrationError::NotConnected {
                address: self.address.clone(),
                stage,
            }),
        }
    }

    async fn run(&mut self, stage: Stage, command: &str) -> Result<String> {
        self.session(stage)?
            .send_command(command)
            .await
            .map_err(RegistrationError::transport(stage))
    }

    /// Opens the session, enters privileged mode and learns the hostname.
    ///
    /// Transport errors are returned as-is so the caller can report a
    /// connection failure instead of a workflow error.
    pub async fn connect(
        &mut self,
        transport: &dyn SessionTransport,
    ) -> std::result::Result<(), TransportError> {
        let mut session = transport.open(&self.params).await?;

        let prompt = match establish(session.as_mut()).await {
            Ok(prompt) => prompt,
            Err(err) => {
                if let Err(close_err) = session.close().await {
                    debug!(address = %self.address, error = %close_err, "close after failed login");
                }
                return Err(err);
            }
        };

        if self.hostname.is_none() {
            self.hostname = Some(status::hostname_from_prompt(&prompt));
        }
        self.session = Some(session);
        info!(hostname = %self.label(), address = %self.address, "Connected");
        Ok(())
    }

    /// Closes the session if one is open.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        session
            .close()
            .await
            .map_err(RegistrationError::transport(Stage::Disconnect))?;
        info!(hostname = %self.label(), address = %self.address, "Disconnected");
        Ok(())
    }

    /// Reads `show license status` and updates the registration flags.
    pub async fn check_status(&mut self) -> Result<LicenseStatus> {
        let output = self
            .run(Stage::CheckStatus, commands::SHOW_LICENSE_STATUS)
            .await?;
        let status = LicenseStatus::parse(&output);

        if let Some(anomaly) = status.anomaly {
            warn!(
                hostname = %self.label(),
                address = %self.address,
                ?anomaly,
                "license status shorter than expected"
            );
        }

        self.registered = status.registered;
        self.dlc_supported = status.dlc_supported;
        self.dlc_started = status.dlc_started;

        if status.registered {
            info!(hostname = %self.label(), address = %self.address, "Device is registered");
        }
        if status.dlc_started {
            info!(hostname = %self.label(), address = %self.address, "DLC started");
        }
        Ok(status)
    }

    /// Pings `target` over default routing.
    pub async fn ping(&mut self, target: &str) -> Result<bool> {
        let output = self.run(Stage::Configure, &commands::ping(target)).await?;
        Ok(status::ping_succeeded(&output))
    }

    /// Finds the first active interface that can reach `target`.
    ///
    /// Interfaces are probed in the order the device lists them and probing
    /// stops at the first success, which is remembered as the HTTP client
    /// source interface.
    pub async fn discover_source_interface(
        &mut self,
        target: &str,
    ) -> Result<Option<String>> {
        let brief = self
            .run(Stage::Configure, commands::SHOW_IP_INTERFACE_BRIEF)
            .await?;

        for entry in status::parse_interface_brief(&brief)
            .into_iter()
            .filter(InterfaceEntry::is_active)
        {
            let output = self
                .run(Stage::Configure, &commands::ping_from(target, &entry.name))
                .await?;
            if status::ping_succeeded(&output) {
                info!(
                    hostname = %self.label(),
                    address = %self.address,
                    interface = %entry.name,
                    "licensing server reachable via source interface"
                );
                self.http_client_source = Some(entry.name.clone());
                return Ok(Some(entry.name));
            }
            debug!(
                hostname = %self.label(),
                address = %self.address,
                interface = %entry.name,
                "licensing server unreachable via interface"
            );
        }

        warn!(
            hostname = %self.label(),
            address = %self.address,
            "no interface can reach the licensing server"
        );
        Ok(None)
    }

    async fn show_running_config(&mut self) -> Result<Vec<String>> {
        let output = self
            .run(Stage::Configure, commands::SHOW_RUNNING_CONFIG)
            .await?;
        Ok(output.lines().map(str::to_string).collect())
    }

    /// Applies the licensing template, records the diff and saves.
    pub async fn apply_configuration(
        &mut self,
        template: &ConfigTemplate,
        audit: &dyn AuditSink,
    ) -> Result<AuditReport> {
        let before = self.show_running_config().await?;

        self.session(Stage::Configure)?
            .send_config_from_template(template)
            .await
            .map_err(RegistrationError::transport(Stage::Configure))?;

        if let Some(interface) = self.http_client_source.clone() {
            self.session(Stage::Configure)?
                .send_config_line(&commands::http_client_source_interface(
                    &interface,
                ))
                .await
                .map_err(RegistrationError::transport(Stage::Configure))?;
        }
        info!(
            hostname = %self.label(),
            address = %self.address,
            "Configuration for Smart License is done"
        );

        let after = self.show_running_config().await?;
        let hostname = self.label().to_string();
        let address = self.address.clone();
        let report = tokio::task::spawn_blocking(move || {
            AuditReport::new(hostname, address, &before, &after)
        })
        .await?;
        audit.persist(&report).await?;

        self.session(Stage::Configure)?
            .save_config()
            .await
            .map_err(RegistrationError::transport(Stage::Configure))?;
        info!(hostname = %self.label(), address = %self.address, "Configuration is saved");
        Ok(report)
    }

    /// Sends the registration command carrying `token`.
    pub async fn register(&mut self, token: &str) -> Result<()> {
        self.run(Stage::Register, &commands::register(token)).await?;
        info!(
            hostname = %self.label(),
            address = %self.address,
            "Smart License registration has started"
        );
        Ok(())
    }

    /// Polls the status until registered or `policy` runs out.
    pub async fn wait_for_registration(
        &mut self,
        policy: &PollPolicy,
        clock: &dyn Clock,
    ) -> Result<PollOutcome> {
        let mut checks = 0u32;
        for tick in 0..=policy.ticks() {
            clock.sleep(policy.interval).await;
            if tick % policy.check_every() != 0 {
                continue;
            }
            checks += 1;
            if self.check_status().await?.registered {
                info!(
                    hostname = %self.label(),
                    address = %self.address,
                    tick,
                    checks,
                    "Device has been registered"
                );
                return Ok(PollOutcome::Confirmed { tick, checks });
            }
        }

        let output = self
            .run(Stage::Poll, commands::SHOW_LICENSE_STATUS)
            .await?;
        let reason = status::failure_reason(&output);
        match &reason {
            Some(reason) => warn!(
                hostname = %self.label(),
                address = %self.address,
                reason = %reason,
                "registration not confirmed"
            ),
            None => warn!(
                hostname = %self.label(),
                address = %self.address,
                "registration not confirmed, no failure reason reported"
            ),
        }
        Ok(PollOutcome::TimedOut { checks, reason })
    }

    /// Starts data-learning/conversion without waiting for it to finish.
    pub async fn start_conversion(&mut self) -> Result<()> {
        self.run(Stage::Verify, commands::CONVERSION_START).await?;
        self.dlc_started = true;
        info!(hostname = %self.label(), address = %self.address, "DLC Started");
        Ok(())
    }
}

async fn establish(
    session: &mut dyn CliSession,
) -> std::result::Result<String, TransportError> {
    session.enter_privileged_mode().await?;
    session.find_prompt().await
}

//! Per-device registration state machine.
//!
//! Stages run strictly in order:
//! connect, check status, configure, register, poll, verify, disconnect.
//! A device that already reports `REGISTERED` jumps from the status check
//! straight to verification.

use std::{fmt, sync::Arc, time::Duration};

use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crate::{
    audit::{AuditSink, NullAuditSink},
    clock::{Clock, TokioClock},
    device::DeviceRecord,
    error::Result,
    outcome::RegistrationOutcome,
    template::ConfigTemplate,
    transport::SessionTransport,
};

/// Workflow stage, used to attribute errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Session open, enable and prompt discovery.
    Connect,
    /// `show license status`.
    CheckStatus,
    /// Reachability probes, template push, diff and save.
    Configure,
    /// Registration command with the token.
    Register,
    /// Waiting for the device to confirm.
    Poll,
    /// Final check and conversion trigger.
    Verify,
    /// Session close.
    Disconnect,
}

impl Stage {
    /// Short kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Connect => "connect",
            Stage::CheckStatus => "check-status",
            Stage::Configure => "configure",
            Stage::Register => "register",
            Stage::Poll => "poll",
            Stage::Verify => "verify",
            Stage::Disconnect => "disconnect",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cadence and deadline of the registration confirmation poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Overall time allowed for the device to confirm registration.
    pub timeout: Duration,
    /// Length of one tick.
    pub interval: Duration,
    /// Status is re-read on every `check_every`-th tick, starting at tick 0.
    pub check_every: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            interval: Duration::from_secs(1),
            check_every: 10,
        }
    }
}

impl PollPolicy {
    /// Index of the last tick; the poll runs ticks `0..=ticks()`.
    pub fn ticks(&self) -> u64 {
        let interval = self.interval.as_millis().max(1);
        u64::try_from(self.timeout.as_millis() / interval).unwrap_or(u64::MAX)
    }

    pub(crate) fn check_every(&self) -> u64 {
        u64::from(self.check_every.max(1))
    }
}

/// How the registration poll ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The device reported `REGISTERED`.
    Confirmed {
        /// Tick at which registration was seen.
        tick: u64,
        /// Status reads made, the confirming one included.
        checks: u32,
    },
    /// The timeout elapsed first.
    TimedOut {
        /// Status reads made during the poll.
        checks: u32,
        /// Failure reason reported by the device, if any.
        reason: Option<String>,
    },
}

/// Token and licensing server shared read-only by every device of a batch.
#[derive(Clone)]
pub struct RegistrationRequest {
    token: Zeroizing<String>,
    licensing_server: String,
}

impl RegistrationRequest {
    /// Request registering with `token` against `licensing_server`.
    pub fn new(
        token: impl Into<String>,
        licensing_server: impl Into<String>,
    ) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
            licensing_server: licensing_server.into(),
        }
    }

    /// Registration token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Licensing server address used for reachability probes.
    pub fn licensing_server(&self) -> &str {
        &self.licensing_server
    }
}

impl fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("token", &"<redacted>")
            .field("licensing_server", &self.licensing_server)
            .finish()
    }
}

/// Runs the registration stages against one device at a time.
#[derive(Clone)]
pub struct RegistrationWorkflow {
    transport: Arc<dyn SessionTransport>,
    template: Arc<ConfigTemplate>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
}

impl fmt::Debug for RegistrationWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationWorkflow")
            .field("template", &self.template.source())
            .field("template_lines", &self.template.lines().len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RegistrationWorkflow {
    /// Workflow with the tokio clock, default poll policy and no audit.
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        template: Arc<ConfigTemplate>,
    ) -> Self {
        Self {
            transport,
            template,
            audit: Arc::new(NullAuditSink),
            clock: Arc::new(TokioClock),
            policy: PollPolicy::default(),
        }
    }

    /// Where configuration diffs are stored.
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Time source for the poll.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Overrides the poll cadence and deadline.
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Poll cadence and deadline in use.
    pub fn poll_policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Template pushed to unregistered devices.
    pub fn template(&self) -> &ConfigTemplate {
        &self.template
    }

    /// Drives `device` through every stage and returns its outcome.
    ///
    /// A failed connect becomes [`RegistrationOutcome::ConnectFailed`]. Once
    /// a session is open it is always closed before returning, including
    /// when a later stage fails; such failures are returned as errors.
    pub async fn run(
        &self,
        device: &mut DeviceRecord,
        request: &RegistrationRequest,
    ) -> Result<RegistrationOutcome> {
        if let Err(err) = device.connect(self.transport.as_ref()).await {
            error!(address = %device.address(), error = %err, "connection failed");
            return Ok(RegistrationOutcome::ConnectFailed {
                address: device.address().to_string(),
                error: err.to_string(),
            });
        }

        let outcome = self.registration_stages(device, request).await;

        if let Err(err) = device.disconnect().await {
            warn!(
                hostname = %device.label(),
                address = %device.address(),
                error = %err,
                "failed to close session cleanly"
            );
        }
        outcome
    }

    async fn registration_stages(
        &self,
        device: &mut DeviceRecord,
        request: &RegistrationRequest,
    ) -> Result<RegistrationOutcome> {
        device.check_status().await?;

        let mut failure_reason = None;
        if !device.is_registered() {
            let server = request.licensing_server();
            if !device.ping(server).await? {
                info!(
                    hostname = %device.label(),
                    address = %device.address(),
                    server = %server,
                    "licensing server unreachable via default routing"
                );
                device.discover_source_interface(server).await?;
            }

            device
                .apply_configuration(&self.template, self.audit.as_ref())
                .await?;
            device.register(request.token()).await?;

            if let PollOutcome::TimedOut { reason, .. } = device
                .wait_for_registration(&self.policy, self.clock.as_ref())
                .await?
            {
                failure_reason = reason;
            }
        }

        let hostname = device.label().to_string();
        let address = device.address().to_string();

        if !device.is_registered() {
            return Ok(RegistrationOutcome::RegistrationFailed {
                hostname,
                address,
                reason: failure_reason,
            });
        }

        if device.dlc_supported() && !device.dlc_started() {
            device.start_conversion().await?;
        }
        Ok(RegistrationOutcome::Registered { hostname, address })
    }
}

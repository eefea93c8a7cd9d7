//! # SmartReg Core
//!
//! Registers network devices with a Smart Licensing server over their
//! command-line interface.
//!
//! ## Overview
//!
//! - **Per-device workflow**: [`workflow::RegistrationWorkflow`] connects,
//!   checks license status, pushes the licensing template, registers with a
//!   token, polls until the device confirms and starts conversion when the
//!   device supports it.
//! - **Batch orchestration**: [`orchestrator::BatchOrchestrator`] runs the
//!   workflow over many devices with a fixed ceiling on concurrent sessions
//!   and streams one [`outcome::RegistrationOutcome`] per device.
//! - **Transport seam**: devices are only reached through
//!   [`transport::SessionTransport`]; [`transport::OpenSshTransport`] drives
//!   the system OpenSSH client.
//! - **Audit**: every configured device yields a before/after diff report
//!   written through an [`audit::AuditSink`].
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use smartreg_core::{
//!     Batch, BatchOrchestrator, ConfigTemplate, ConnectionParameters,
//!     OpenSshTransport, RegistrationRequest, RegistrationWorkflow,
//! };
//!
//! async fn register_all() -> Result<(), Box<dyn std::error::Error>> {
//!     let template = ConfigTemplate::load("smart_license_config.txt").await?;
//!     let workflow = RegistrationWorkflow::new(
//!         Arc::new(OpenSshTransport::default()),
//!         Arc::new(template),
//!     );
//!     let batch = Batch::new(
//!         ConnectionParameters::new("admin", "secret"),
//!         ["10.0.0.1", "10.0.0.2"],
//!         RegistrationRequest::new("token", "10.20.30.40"),
//!     );
//!
//!     let outcomes = BatchOrchestrator::new(workflow).run(batch).collect_all().await;
//!     for outcome in outcomes {
//!         println!("{outcome}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod clock;
pub mod device;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod template;
pub mod transport;
pub mod workflow;

pub use audit::{AuditReport, AuditSink, DiffLine, FileAuditSink, NullAuditSink};
pub use clock::{Clock, TokioClock};
pub use device::{ConnectionParameters, DeviceFamily, DeviceRecord};
pub use error::{AuditError, RegistrationError, Result, TransportError};
pub use orchestrator::{
    Batch, BatchOrchestrator, DEFAULT_MAX_WORKERS, OutcomeStream,
};
pub use outcome::RegistrationOutcome;
pub use template::ConfigTemplate;
pub use transport::{
    CliSession, OpenSshSettings, OpenSshTransport, SessionTransport,
};
pub use workflow::{
    PollOutcome, PollPolicy, RegistrationRequest, RegistrationWorkflow, Stage,
};

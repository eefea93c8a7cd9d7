use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use smartreg_core::{
    BatchOrchestrator, ConfigTemplate, FileAuditSink, OpenSshTransport,
    RegistrationWorkflow, SessionTransport,
};

use crate::infra::config::Config;

/// Shared by every request: the orchestrator and the template it applies.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub template: Arc<ConfigTemplate>,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub started_at: DateTime<Utc>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("template", &self.template.source())
            .field("max_workers", &self.orchestrator.max_workers())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Wires the OpenSSH transport and file audit sink from `config`.
    pub fn new(config: Config, template: ConfigTemplate) -> Self {
        let transport = Arc::new(OpenSshTransport::new(config.ssh.settings()));
        Self::with_transport(config, template, transport)
    }

    /// Same as [`AppState::new`] with a caller-supplied transport.
    pub fn with_transport(
        config: Config,
        template: ConfigTemplate,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        let template = Arc::new(template);
        let workflow = RegistrationWorkflow::new(transport, Arc::clone(&template))
            .with_audit_sink(Arc::new(FileAuditSink::new(
                config.paths.audit_dir.clone(),
            )))
            .with_poll_policy(config.registration.poll_policy());
        let orchestrator = BatchOrchestrator::new(workflow)
            .with_max_workers(config.registration.max_workers);

        Self {
            config: Arc::new(config),
            template,
            orchestrator: Arc::new(orchestrator),
            started_at: Utc::now(),
        }
    }
}

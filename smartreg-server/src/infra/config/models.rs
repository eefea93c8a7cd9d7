use std::{path::PathBuf, time::Duration};

use smartreg_core::{OpenSshSettings, PollPolicy};

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub registration: RegistrationConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
    pub ssh: SshConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub max_workers: usize,
    pub poll_timeout: Duration,
    pub poll_interval: Duration,
    pub status_check_every: u32,
}

impl RegistrationConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            timeout: self.poll_timeout,
            interval: self.poll_interval,
            check_every: self.status_check_every,
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            max_workers: smartreg_core::DEFAULT_MAX_WORKERS,
            poll_timeout: policy.timeout,
            poll_interval: policy.interval,
            status_check_every: policy.check_every,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    /// Licensing configuration pushed to every device.
    pub template: PathBuf,
    /// Where per-device diff reports are written.
    pub audit_dir: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Append-only log file in addition to stderr.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub program: String,
    pub sshpass_program: Option<String>,
    pub port: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub strict_host_key_checking: bool,
}

impl SshConfig {
    pub fn settings(&self) -> OpenSshSettings {
        OpenSshSettings {
            program: self.program.clone(),
            sshpass_program: self.sshpass_program.clone(),
            port: self.port,
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
            strict_host_key_checking: self.strict_host_key_checking,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        let settings = OpenSshSettings::default();
        Self {
            program: settings.program,
            sshpass_program: settings.sshpass_program,
            port: settings.port,
            connect_timeout: settings.connect_timeout,
            command_timeout: settings.command_timeout,
            strict_host_key_checking: settings.strict_host_key_checking,
        }
    }
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

/// Non-fatal findings surfaced at start-up.
#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint(
        &mut self,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

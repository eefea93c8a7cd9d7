use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

use super::{
    models::{
        Config, ConfigMetadata, ConfigWarnings, LoggingConfig, PathsConfig,
        RegistrationConfig, ServerConfig, SshConfig,
    },
    sources::{EnvConfig, FileConfig},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("smartreg.toml"),
        PathBuf::from("config/smartreg.toml"),
    ]
});

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_TEMPLATE: &str = "smart_license_config.txt";

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Replaces the process environment (and `.env` loading) when set.
    pub env: Option<EnvConfig>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.options.env = Some(env);
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env_config, env_file_loaded) = match &self.options.env {
            Some(env) => (env.clone(), false),
            None => {
                let loaded = self.load_env_file()?;
                (EnvConfig::gather(), loaded)
            }
        };

        let (file_config, config_path) = self.load_file_config(&env_config)?;

        let (config, warnings) = compose_config(
            file_config,
            env_config,
            ConfigMetadata {
                config_path,
                env_file_loaded,
            },
        )?;

        Ok(ConfigLoad { config, warnings })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = if let Some(explicit) = &self.options.config_path
        {
            (explicit.clone(), true)
        } else if let Some(from_env) = &env_config.config_path {
            (from_env.clone(), true)
        } else {
            match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(found) => (found.clone(), false),
                None => return Ok((None, None)),
            }
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let file_config = read_file_config(&path)?;
        Ok((Some(file_config), Some(path)))
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn compose_config(
    file_config: Option<FileConfig>,
    env: EnvConfig,
    metadata: ConfigMetadata,
) -> Result<(Config, ConfigWarnings), ConfigLoadError> {
    let mut warnings = ConfigWarnings::default();

    if metadata.config_path.is_none() {
        warnings.push_with_hint(
            "No smartreg.toml detected; using environment variables and defaults",
            "Copy config/smartreg.example.toml to smartreg.toml to customise",
        );
    }

    let FileConfig {
        server: file_server,
        registration: file_registration,
        paths: file_paths,
        logging: file_logging,
        ssh: file_ssh,
    } = file_config.unwrap_or_default();

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
    };

    let defaults = RegistrationConfig::default();
    let registration = RegistrationConfig {
        max_workers: env
            .max_workers
            .or(file_registration.max_workers)
            .unwrap_or(defaults.max_workers),
        poll_timeout: duration_setting(
            "registration.poll_timeout",
            env.poll_timeout.or(file_registration.poll_timeout),
            defaults.poll_timeout,
        )?,
        poll_interval: duration_setting(
            "registration.poll_interval",
            env.poll_interval.or(file_registration.poll_interval),
            defaults.poll_interval,
        )?,
        status_check_every: env
            .status_check_every
            .or(file_registration.status_check_every)
            .unwrap_or(defaults.status_check_every),
    };

    let paths = PathsConfig {
        template: env
            .template
            .or(file_paths.template)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMPLATE)),
        audit_dir: env
            .audit_dir
            .or(file_paths.audit_dir)
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let logging = LoggingConfig {
        file: env.log_file.or(file_logging.file),
    };

    let ssh_defaults = SshConfig::default();
    let sshpass_program = match env.sshpass_program.or(file_ssh.sshpass_program)
    {
        Some(program) if program.trim().is_empty() => None,
        Some(program) => Some(program),
        None => ssh_defaults.sshpass_program.clone(),
    };
    let ssh = SshConfig {
        program: env
            .ssh_program
            .or(file_ssh.program)
            .unwrap_or(ssh_defaults.program),
        sshpass_program,
        port: env.ssh_port.or(file_ssh.port).unwrap_or(ssh_defaults.port),
        connect_timeout: duration_setting(
            "ssh.connect_timeout",
            env.ssh_connect_timeout.or(file_ssh.connect_timeout),
            ssh_defaults.connect_timeout,
        )?,
        command_timeout: duration_setting(
            "ssh.command_timeout",
            env.ssh_command_timeout.or(file_ssh.command_timeout),
            ssh_defaults.command_timeout,
        )?,
        strict_host_key_checking: env
            .ssh_strict_host_key_checking
            .or(file_ssh.strict_host_key_checking)
            .unwrap_or(ssh_defaults.strict_host_key_checking),
    };

    if ssh.sshpass_program.is_none() {
        warnings.push_with_hint(
            "ssh.sshpass_program is disabled; devices must accept key-based logins",
            "Set ssh.sshpass_program = \"sshpass\" to use submitted passwords",
        );
    }
    if !ssh.strict_host_key_checking {
        warnings.push("ssh host key checking is disabled");
    }

    let config = Config {
        server,
        registration,
        paths,
        logging,
        ssh,
        metadata,
    };
    validate(&config)?;

    Ok((config, warnings))
}

fn duration_setting(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        Some(value) => humantime::parse_duration(value.trim()).map_err(
            |source| ConfigLoadError::InvalidDuration { key, value, source },
        ),
        None => Ok(default),
    }
}

fn validate(config: &Config) -> Result<(), ConfigLoadError> {
    let registration = &config.registration;
    if registration.max_workers == 0 {
        return Err(ConfigLoadError::Invalid {
            key: "registration.max_workers",
            reason: "must be at least 1".to_string(),
        });
    }
    if registration.poll_interval.is_zero() {
        return Err(ConfigLoadError::Invalid {
            key: "registration.poll_interval",
            reason: "must be greater than zero".to_string(),
        });
    }
    if registration.status_check_every == 0 {
        return Err(ConfigLoadError::Invalid {
            key: "registration.status_check_every",
            reason: "must be at least 1".to_string(),
        });
    }
    if registration.poll_timeout < registration.poll_interval {
        return Err(ConfigLoadError::Invalid {
            key: "registration.poll_timeout",
            reason: format!(
                "must not be shorter than poll_interval ({})",
                humantime::format_duration(registration.poll_interval)
            ),
        });
    }
    if config.ssh.command_timeout.is_zero() {
        return Err(ConfigLoadError::Invalid {
            key: "ssh.command_timeout",
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid duration for {key}: '{value}'")]
    InvalidDuration {
        key: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

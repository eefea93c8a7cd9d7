use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as defined in a TOML file.
///
/// Durations are humantime strings (`"120s"`, `"2m"`).
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub registration: FileRegistrationConfig,
    #[serde(default)]
    pub paths: FilePathsConfig,
    #[serde(default)]
    pub logging: FileLoggingConfig,
    #[serde(default)]
    pub ssh: FileSshConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileRegistrationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_check_every: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilePathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileSshConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    /// Empty string disables the password wrapper.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sshpass_program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_host_key_checking: Option<bool>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub max_workers: Option<usize>,
    pub poll_timeout: Option<String>,
    pub poll_interval: Option<String>,
    pub status_check_every: Option<u32>,
    pub template: Option<PathBuf>,
    pub audit_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub ssh_program: Option<String>,
    pub sshpass_program: Option<String>,
    pub ssh_port: Option<u16>,
    pub ssh_connect_timeout: Option<String>,
    pub ssh_command_timeout: Option<String>,
    pub ssh_strict_host_key_checking: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the environment layer from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name).filter(|value| !value.trim().is_empty())
        };

        Self {
            config_path: var("SMARTREG_CONFIG").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: var("SERVER_PORT").and_then(|s| s.trim().parse().ok()),
            max_workers: var("SMARTREG_MAX_WORKERS")
                .and_then(|s| s.trim().parse().ok()),
            poll_timeout: var("SMARTREG_POLL_TIMEOUT"),
            poll_interval: var("SMARTREG_POLL_INTERVAL"),
            status_check_every: var("SMARTREG_STATUS_CHECK_EVERY")
                .and_then(|s| s.trim().parse().ok()),
            template: var("SMARTREG_TEMPLATE").map(PathBuf::from),
            audit_dir: var("SMARTREG_AUDIT_DIR").map(PathBuf::from),
            log_file: var("SMARTREG_LOG_FILE").map(PathBuf::from),
            ssh_program: var("SSH_PROGRAM"),
            // present-but-empty disables the wrapper, so read it unfiltered
            sshpass_program: lookup("SSHPASS_PROGRAM"),
            ssh_port: var("SSH_PORT").and_then(|s| s.trim().parse().ok()),
            ssh_connect_timeout: var("SSH_CONNECT_TIMEOUT"),
            ssh_command_timeout: var("SSH_COMMAND_TIMEOUT"),
            ssh_strict_host_key_checking: var("SSH_STRICT_HOST_KEY_CHECKING")
                .and_then(|raw| parse_bool(&raw)),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> EnvConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn reads_known_variables() {
        let env = env(&[
            ("SERVER_PORT", "8080"),
            ("SMARTREG_MAX_WORKERS", "10"),
            ("SSH_STRICT_HOST_KEY_CHECKING", "yes"),
            ("SMARTREG_POLL_TIMEOUT", "3m"),
        ]);
        assert_eq!(env.server_port, Some(8080));
        assert_eq!(env.max_workers, Some(10));
        assert_eq!(env.ssh_strict_host_key_checking, Some(true));
        assert_eq!(env.poll_timeout.as_deref(), Some("3m"));
        assert!(env.server_host.is_none());
    }

    #[test]
    fn malformed_numbers_are_ignored() {
        let env = env(&[("SERVER_PORT", "70000"), ("SSH_PORT", "ssh")]);
        assert_eq!(env.server_port, None);
        assert_eq!(env.ssh_port, None);
    }

    #[test]
    fn empty_sshpass_variable_is_kept() {
        let env = env(&[("SSHPASS_PROGRAM", "")]);
        assert_eq!(env.sshpass_program.as_deref(), Some(""));
    }
}

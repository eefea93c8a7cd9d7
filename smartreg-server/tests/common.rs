use std::{path::Path, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use axum_test::TestServer;
use smartreg_core::{
    CliSession, ConfigTemplate, ConnectionParameters, SessionTransport,
    TransportError,
};
use smartreg_server::{
    AppState, create_app,
    infra::config::{Config, ConfigLoader, EnvConfig},
};
use tempfile::TempDir;

/// Addresses in this prefix refuse connections.
pub const UNREACHABLE_PREFIX: &str = "192.0.2.";

pub const TEMPLATE: &str = "! licensing\nlicense smart enable\nbanner motd <managed>\n";

const REGISTERED_STATUS: &str = "\
Smart Licensing is ENABLED
  Status: ENABLED
Registration:
  Status: REGISTERED
License Authorization:
  Status: AUTHORIZED
";

/// Every reachable device is already registered.
#[derive(Debug, Default)]
pub struct RegisteredFleet;

#[async_trait]
impl SessionTransport for RegisteredFleet {
    async fn open(
        &self,
        params: &ConnectionParameters,
    ) -> Result<Box<dyn CliSession>, TransportError> {
        let address = params.address().unwrap_or_default().to_string();
        if address.starts_with(UNREACHABLE_PREFIX) {
            return Err(TransportError::Closed);
        }
        Ok(Box::new(RegisteredSession {
            hostname: format!("sw-{}", address.replace('.', "-")),
        }))
    }
}

struct RegisteredSession {
    hostname: String,
}

#[async_trait]
impl CliSession for RegisteredSession {
    async fn enter_privileged_mode(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn find_prompt(&mut self) -> Result<String, TransportError> {
        Ok(format!("{}#", self.hostname))
    }

    async fn send_command(
        &mut self,
        command: &str,
    ) -> Result<String, TransportError> {
        Ok(match command {
            "show license status" => REGISTERED_STATUS.to_string(),
            _ => String::new(),
        })
    }

    async fn send_config_set(
        &mut self,
        _lines: &[String],
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn save_config(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

pub fn test_config(audit_dir: &Path) -> Result<Config> {
    let env = EnvConfig {
        audit_dir: Some(audit_dir.to_path_buf()),
        ..EnvConfig::default()
    };
    Ok(ConfigLoader::new().with_env(env).load()?.config)
}

// Code is used by test modules, but not in this scope
#[allow(unused)]
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub tempdir: TempDir,
}

pub fn build_test_app() -> Result<TestApp> {
    let tempdir = tempfile::tempdir()?;
    let config = test_config(tempdir.path())?;
    let state = AppState::with_transport(
        config,
        ConfigTemplate::from_text(TEMPLATE),
        Arc::new(RegisteredFleet),
    );
    let server = TestServer::new(create_app(state.clone()))
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(TestApp {
        server,
        state,
        tempdir,
    })
}

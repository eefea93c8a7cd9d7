//! One-shot batch registration from the command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args as ClapArgs;
use dialoguer::Password;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::info;
use zeroize::Zeroizing;

use smartreg_core::{
    Batch, BatchOrchestrator, ConnectionParameters, RegistrationRequest,
};

#[derive(ClapArgs, Debug, Clone)]
pub struct RegisterArgs {
    /// Device login user
    #[arg(short, long, env = "SMARTREG_USERNAME")]
    pub username: String,

    /// Device login password; prompted for when omitted
    #[arg(long, env = "SMARTREG_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Privileged-mode secret if it differs from the password
    #[arg(long, env = "SMARTREG_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Licensing server address
    #[arg(short, long, env = "SMARTREG_LICENSING_SERVER")]
    pub server: String,

    /// Registration token
    #[arg(short, long, env = "SMARTREG_TOKEN", hide_env_values = true)]
    pub token: String,

    /// File with device addresses separated by whitespace
    #[arg(long)]
    pub devices_file: Option<PathBuf>,

    /// Device addresses
    pub addresses: Vec<String>,
}

/// Outcome counts of one command-line batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterSummary {
    pub total: usize,
    pub succeeded: usize,
}

impl RegisterSummary {
    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

impl RegisterArgs {
    /// Resolves targets and credentials into a batch, prompting for the
    /// password when it was not supplied.
    pub async fn into_batch(self) -> Result<Batch> {
        let mut addresses = self.addresses;
        if let Some(path) = &self.devices_file {
            addresses.extend(read_devices_file(path).await?);
        }
        if addresses.is_empty() {
            bail!("no devices given; pass addresses or --devices-file");
        }

        let password = match self.password {
            Some(password) => Zeroizing::new(password),
            None => Zeroizing::new(
                Password::new()
                    .with_prompt(format!("Password for {}", self.username))
                    .interact()
                    .context("prompt failed")?,
            ),
        };

        let mut params =
            ConnectionParameters::new(self.username, password.as_str());
        if let Some(secret) = self.secret {
            params = params.with_secret(secret);
        }
        let request = RegistrationRequest::new(self.token, self.server);
        Ok(Batch::new(params, addresses, request))
    }
}

pub async fn read_devices_file(path: &Path) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Batch::parse_addresses(&text))
}

/// Runs `batch` and writes one line per device to `out` as it completes.
pub async fn run_register<W>(
    orchestrator: &BatchOrchestrator,
    batch: Batch,
    out: &mut W,
) -> Result<RegisterSummary>
where
    W: AsyncWrite + Unpin,
{
    let mut summary = RegisterSummary {
        total: batch.len(),
        succeeded: 0,
    };
    let mut outcomes = orchestrator.run(batch);
    while let Some(outcome) = outcomes.next().await {
        if outcome.is_success() {
            summary.succeeded += 1;
        }
        out.write_all(outcome.to_line().as_bytes())
            .await
            .context("failed to write outcome")?;
        out.flush().await.context("failed to write outcome")?;
    }
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        "registration batch finished"
    );
    Ok(summary)
}

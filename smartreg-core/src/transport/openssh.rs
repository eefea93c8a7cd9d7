//! Sessions over the system OpenSSH client.

use std::{fmt, process::Stdio, time::Duration};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStderr, ChildStdin, ChildStdout, Command},
    time::{Instant, timeout},
};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::{CliSession, SessionTransport};
use crate::{device::ConnectionParameters, error::TransportError};

static PROMPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w.\-@/:()]+[>#]$").expect("prompt regex should compile")
});

static PROMPT_OR_PASSWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[\w.\-@/:()]+[>#]|[Pp]assword:)$")
        .expect("prompt or password regex should compile")
});

static CONFIG_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*% (?:Invalid input|Incomplete command|Ambiguous command)")
        .expect("config error regex should compile")
});

const PAGER: &str = "--More--";
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Settings for sessions driven through the system `ssh` client.
#[derive(Debug, Clone)]
pub struct OpenSshSettings {
    /// OpenSSH client binary.
    pub program: String,
    /// Wrapper feeding the password to `ssh` (`sshpass -e`). Without it the
    /// client must authenticate with keys or an agent.
    pub sshpass_program: Option<String>,
    /// SSH port on the devices.
    pub port: u16,
    /// Passed to `ssh` as `ConnectTimeout`.
    pub connect_timeout: Duration,
    /// Longest wait for a prompt after sending a line.
    pub command_timeout: Duration,
    /// Whether unknown host keys are refused.
    pub strict_host_key_checking: bool,
}

impl Default for OpenSshSettings {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            sshpass_program: Some("sshpass".to_string()),
            port: 22,
            connect_timeout: Duration::from_secs(20),
            command_timeout: Duration::from_secs(60),
            strict_host_key_checking: false,
        }
    }
}

/// [`SessionTransport`] spawning one `ssh -tt` process per device.
#[derive(Debug, Clone, Default)]
pub struct OpenSshTransport {
    settings: OpenSshSettings,
}

impl OpenSshTransport {
    /// Transport using `settings` for every session.
    pub fn new(settings: OpenSshSettings) -> Self {
        Self { settings }
    }

    /// Settings applied to new sessions.
    pub fn settings(&self) -> &OpenSshSettings {
        &self.settings
    }

    fn build_command(
        &self,
        params: &ConnectionParameters,
    ) -> Result<(String, Command), TransportError> {
        let address = params.address().ok_or_else(|| {
            TransportError::Other(
                "connection parameters carry no device address".to_string(),
            )
        })?;

        let (program, mut cmd) = match &self.settings.sshpass_program {
            Some(sshpass) => {
                let mut cmd = Command::new(sshpass);
                cmd.arg("-e")
                    .arg(&self.settings.program)
                    .env("SSHPASS", params.password());
                (sshpass.clone(), cmd)
            }
            None => (
                self.settings.program.clone(),
                Command::new(&self.settings.program),
            ),
        };

        let host_key_checking = if self.settings.strict_host_key_checking {
            "yes"
        } else {
            "no"
        };

        cmd.arg("-tt")
            .arg("-p")
            .arg(self.settings.port.to_string())
            .arg("-l")
            .arg(params.username())
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.settings.connect_timeout.as_secs().max(1)
            ))
            .arg("-o")
            .arg(format!(
                "ServerAliveInterval={}",
                params.keepalive().as_secs().max(1)
            ))
            .arg("-o")
            .arg(format!("StrictHostKeyChecking={host_key_checking}"))
            .arg("-o")
            .arg("PreferredAuthentications=password,keyboard-interactive,publickey")
            .arg("-o")
            .arg("NumberOfPasswordPrompts=1")
            .arg(address)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Ok((program, cmd))
    }
}

#[async_trait]
impl SessionTransport for OpenSshTransport {
    async fn open(
        &self,
        params: &ConnectionParameters,
    ) -> Result<Box<dyn CliSession>, TransportError> {
        let (program, mut command) = self.build_command(params)?;
        let mut child = command
            .spawn()
            .map_err(|source| TransportError::Spawn { program, source })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Other("ssh stdin was not captured".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Other("ssh stdout was not captured".to_string())
        })?;
        let stderr = child.stderr.take();

        let mut session = OpenSshSession {
            child,
            stdin,
            stdout,
            stderr,
            pending: String::new(),
            prompt: String::new(),
            secret: Zeroizing::new(params.secret().to_string()),
            command_timeout: self.settings.command_timeout,
        };

        let login_window =
            self.settings.connect_timeout + self.settings.command_timeout;
        let (_, prompt) = session
            .read_until("login prompt", &PROMPT, login_window)
            .await?;
        session.prompt = prompt;
        debug!(prompt = %session.prompt, "ssh session established");

        session.send_command("terminal length 0").await?;
        Ok(Box::new(session))
    }
}

struct OpenSshSession {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    stderr: Option<ChildStderr>,
    pending: String,
    prompt: String,
    secret: Zeroizing<String>,
    command_timeout: Duration,
}

impl fmt::Debug for OpenSshSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSshSession")
            .field("pid", &self.child.id())
            .field("prompt", &self.prompt)
            .field("pending_bytes", &self.pending.len())
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl OpenSshSession {
    async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stdin.write_all(bytes).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.write_raw(&data).await
    }

    /// Splits the buffer at a trailing line matching `pattern`.
    ///
    /// Returns the text before that line and the matched line itself.
    fn take_through(&mut self, pattern: &Regex) -> Option<(String, String)> {
        let trimmed = self.pending.trim_end();
        let last_start = trimmed.rfind('\n').map(|idx| idx + 1).unwrap_or(0);
        let last = trimmed[last_start..].trim();
        if last.is_empty() || !pattern.is_match(last) {
            return None;
        }
        let output = trimmed[..last_start].replace('\r', "");
        let matched = last.to_string();
        self.pending.clear();
        Some((output, matched))
    }

    async fn read_until(
        &mut self,
        waiting_for: &str,
        pattern: &Regex,
        limit: Duration,
    ) -> Result<(String, String), TransportError> {
        let deadline = Instant::now() + limit;
        let mut chunk = [0u8; 4096];

        loop {
            if let Some(found) = self.take_through(pattern) {
                return Ok(found);
            }

            if self.pending.contains(PAGER) {
                self.pending = self.pending.replace(PAGER, "");
                self.write_raw(b" ").await?;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let read = timeout(remaining, self.stdout.read(&mut chunk))
                .await
                .map_err(|_| TransportError::Timeout {
                    waiting_for: waiting_for.to_string(),
                    after: limit,
                })??;

            if read == 0 {
                return Err(self.closed_error().await);
            }
            self.pending
                .push_str(&String::from_utf8_lossy(&chunk[..read]));
        }
    }

    async fn closed_error(&mut self) -> TransportError {
        let mut message = String::new();
        if let Some(stderr) = self.stderr.as_mut() {
            let _ = timeout(
                Duration::from_secs(1),
                stderr.read_to_string(&mut message),
            )
            .await;
        }
        let message = message.trim().to_string();
        if message.contains("Permission denied")
            || message.contains("Authentication failed")
        {
            TransportError::Authentication(message)
        } else if message.is_empty() {
            TransportError::Closed
        } else {
            TransportError::Other(message)
        }
    }

    fn strip_echo(command: &str, output: &str) -> String {
        let mut lines = output.lines().peekable();
        if let Some(first) = lines.peek()
            && first.contains(command.trim())
        {
            lines.next();
        }
        lines.collect::<Vec<_>>().join("\n")
    }
}

#[async_trait]
impl CliSession for OpenSshSession {
    async fn enter_privileged_mode(&mut self) -> Result<(), TransportError> {
        if self.prompt.ends_with('#') {
            return Ok(());
        }

        self.write_line("enable").await?;
        let (_, reply) = self
            .read_until("enable", &PROMPT_OR_PASSWORD, self.command_timeout)
            .await?;

        let prompt = if reply.ends_with(':') {
            let secret = self.secret.clone();
            self.write_line(&secret).await?;
            let (_, prompt) = self
                .read_until("enable prompt", &PROMPT, self.command_timeout)
                .await?;
            prompt
        } else {
            reply
        };

        if !prompt.ends_with('#') {
            return Err(TransportError::Authentication(
                "enable secret rejected".to_string(),
            ));
        }
        self.prompt = prompt;
        Ok(())
    }

    async fn find_prompt(&mut self) -> Result<String, TransportError> {
        self.write_line("").await?;
        let (_, prompt) = self
            .read_until("prompt", &PROMPT, self.command_timeout)
            .await?;
        self.prompt = prompt.clone();
        Ok(prompt)
    }

    async fn send_command(
        &mut self,
        command: &str,
    ) -> Result<String, TransportError> {
        self.write_line(command).await?;
        let (output, prompt) = self
            .read_until(command, &PROMPT, self.command_timeout)
            .await?;
        self.prompt = prompt;
        Ok(Self::strip_echo(command, &output))
    }

    async fn send_config_set(
        &mut self,
        lines: &[String],
    ) -> Result<(), TransportError> {
        self.send_command("configure terminal").await?;

        let mut rejected = None;
        for line in lines {
            let output = self.send_command(line).await?;
            if CONFIG_ERROR.is_match(&output) {
                warn!(line = %line, output = %output, "configuration line rejected");
                rejected = Some(TransportError::Rejected {
                    command: line.clone(),
                    output,
                });
                break;
            }
        }

        self.send_command("end").await?;
        match rejected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn save_config(&mut self) -> Result<(), TransportError> {
        let output = self.send_command("write memory").await?;
        if !output.contains("[OK]") {
            warn!(output = %output, "write memory did not confirm with [OK]");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Err(err) = self.write_line("exit").await {
            debug!(error = %err, "exit not delivered; terminating ssh");
        }
        match timeout(CLOSE_GRACE, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                debug!(?status, "ssh session exited");
            }
            Err(_) => {
                self.child.kill().await?;
            }
        }
        Ok(())
    }
}

//! Scripted devices for core integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use smartreg_core::{
    AuditError, AuditReport, AuditSink, CliSession, Clock, ConfigTemplate,
    ConnectionParameters, SessionTransport, TransportError,
};

pub const LICENSING_SERVER: &str = "10.20.30.40";
pub const TOKEN: &str = "ZmFrZS1pZHRva2Vu";

pub const INTERFACE_BRIEF: &str = "\
Interface              IP-Address      OK? Method Status                Protocol
GigabitEthernet0/0     unassigned      YES NVRAM  administratively down down
GigabitEthernet0/1     10.1.1.1        YES NVRAM  up                    up
GigabitEthernet0/2     10.2.2.2        YES NVRAM  up                    up
";

pub fn template() -> ConfigTemplate {
    ConfigTemplate::from_text(
        "! smart licensing\n\
         license smart enable\n\
         call-home\n \
         profile CiscoTAC-1\n  \
         destination transport-method http\n",
    )
}

/// `show license status` output with the given registration state and an
/// optional data-conversion state.
pub fn status_report(registration: &str, conversion: Option<&str>) -> String {
    let mut report = format!(
        "Smart Licensing is ENABLED\n  Status: ENABLED\n\n\
         Registration:\n  Status: {registration}\n\n\
         License Authorization:\n  Status: AUTHORIZED\n"
    );
    if let Some(conversion) = conversion {
        report.push_str(&format!("\nLicense Conversion:\n  Status: {conversion}\n"));
    }
    report
}

pub fn failed_report(reason: &str) -> String {
    format!(
        "Smart Licensing is ENABLED\n  Status: ENABLED\n\n\
         Registration:\n  Status: UNREGISTERED - REGISTRATION FAILED\n  \
         Failure reason: {reason}\n"
    )
}

/// How one fake device answers.
#[derive(Debug, Clone)]
pub struct DeviceScript {
    pub hostname: Option<String>,
    pub refuse_connection: bool,
    /// Successive `show license status` answers; the last one repeats.
    pub status_reports: Vec<String>,
    pub default_ping_ok: bool,
    pub interface_brief: String,
    pub reachable_interfaces: Vec<String>,
    /// Commands starting with this prefix fail with a closed session.
    pub fail_on: Option<String>,
    /// Commands starting with this prefix panic.
    pub panic_on: Option<String>,
    pub latency: Duration,
}

impl DeviceScript {
    /// Unregistered device that registers on the first poll check.
    pub fn unregistered() -> Self {
        Self {
            hostname: None,
            refuse_connection: false,
            status_reports: vec![
                status_report("UNREGISTERED", None),
                status_report("REGISTERED", None),
            ],
            default_ping_ok: true,
            interface_brief: INTERFACE_BRIEF.to_string(),
            reachable_interfaces: Vec::new(),
            fail_on: None,
            panic_on: None,
            latency: Duration::ZERO,
        }
    }

    pub fn registered() -> Self {
        Self::unregistered().with_statuses([status_report("REGISTERED", None)])
    }

    pub fn unreachable() -> Self {
        Self {
            refuse_connection: true,
            ..Self::unregistered()
        }
    }

    pub fn named(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    pub fn with_statuses<I, S>(mut self, reports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.status_reports = reports.into_iter().map(Into::into).collect();
        self
    }

    pub fn without_default_route(mut self, reachable: &[&str]) -> Self {
        self.default_ping_ok = false;
        self.reachable_interfaces =
            reachable.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn failing_on(mut self, prefix: &str) -> Self {
        self.fail_on = Some(prefix.to_string());
        self
    }

    pub fn panicking_on(mut self, prefix: &str) -> Self {
        self.panic_on = Some(prefix.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Everything the fake devices saw, shared across sessions.
#[derive(Debug, Default)]
pub struct SessionLog {
    commands: Mutex<Vec<(String, String)>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SessionLog {
    fn record(&self, address: &str, command: &str) {
        self.commands
            .lock()
            .unwrap()
            .push((address.to_string(), command.to_string()));
    }

    pub fn commands_for(&self, address: &str) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(addr, _)| addr == address)
            .map(|(_, command)| command.clone())
            .collect()
    }

    pub fn count(&self, address: &str, command: &str) -> usize {
        self.commands_for(address)
            .iter()
            .filter(|seen| seen.as_str() == command)
            .count()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Transport answering from per-address scripts.
#[derive(Debug)]
pub struct FakeTransport {
    scripts: HashMap<String, DeviceScript>,
    fallback: DeviceScript,
    log: Arc<SessionLog>,
}

impl FakeTransport {
    pub fn new(fallback: DeviceScript) -> Self {
        Self {
            scripts: HashMap::new(),
            fallback,
            log: Arc::new(SessionLog::default()),
        }
    }

    pub fn with_device(mut self, address: &str, script: DeviceScript) -> Self {
        self.scripts.insert(address.to_string(), script);
        self
    }

    pub fn log(&self) -> Arc<SessionLog> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl SessionTransport for FakeTransport {
    async fn open(
        &self,
        params: &ConnectionParameters,
    ) -> Result<Box<dyn CliSession>, TransportError> {
        let address = params.address().unwrap_or_default().to_string();
        let script = self
            .scripts
            .get(&address)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());

        self.log.record(&address, "<open>");
        if script.refuse_connection {
            return Err(TransportError::Timeout {
                waiting_for: "login prompt".to_string(),
                after: Duration::from_secs(20),
            });
        }

        self.log.opened.fetch_add(1, Ordering::SeqCst);
        self.log.enter();
        if !script.latency.is_zero() {
            tokio::time::sleep(script.latency).await;
        }

        let hostname = script
            .hostname
            .clone()
            .unwrap_or_else(|| format!("rtr-{}", address.replace('.', "-")));
        Ok(Box::new(FakeSession {
            address,
            hostname,
            script,
            log: Arc::clone(&self.log),
            status_reads: 0,
            config: Vec::new(),
            released: false,
        }))
    }
}

struct FakeSession {
    address: String,
    hostname: String,
    script: DeviceScript,
    log: Arc<SessionLog>,
    status_reads: usize,
    config: Vec<String>,
    released: bool,
}

impl FakeSession {
    fn exec(&mut self, command: &str) -> Result<(), TransportError> {
        self.log.record(&self.address, command);
        if let Some(prefix) = &self.script.panic_on
            && command.starts_with(prefix.as_str())
        {
            panic!("scripted panic on `{command}`");
        }
        if let Some(prefix) = &self.script.fail_on
            && command.starts_with(prefix.as_str())
        {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.log.leave();
        }
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl CliSession for FakeSession {
    async fn enter_privileged_mode(&mut self) -> Result<(), TransportError> {
        self.exec("enable")
    }

    async fn find_prompt(&mut self) -> Result<String, TransportError> {
        Ok(format!("{}#", self.hostname))
    }

    async fn send_command(
        &mut self,
        command: &str,
    ) -> Result<String, TransportError> {
        self.exec(command)?;

        if command == "show license status" {
            let last = self.script.status_reports.len().saturating_sub(1);
            let report = self
                .script
                .status_reports
                .get(self.status_reads.min(last))
                .cloned()
                .unwrap_or_default();
            self.status_reads += 1;
            return Ok(report);
        }
        if command == "show ip interface brief" {
            return Ok(self.script.interface_brief.clone());
        }
        if command == "show running-config" {
            let mut running = format!("hostname {}\n!\n", self.hostname);
            for line in &self.config {
                running.push_str(line);
                running.push('\n');
            }
            running.push_str("end\n");
            return Ok(running);
        }
        if let Some(target) = command.strip_prefix("ping ") {
            let reachable = match target.split_once(" source ") {
                Some((_, interface)) => self
                    .script
                    .reachable_interfaces
                    .iter()
                    .any(|name| name == interface),
                None => self.script.default_ping_ok,
            };
            return Ok(if reachable {
                "Type escape sequence to abort.\n!!!!!\nSuccess rate is 100 percent (5/5)"
                    .to_string()
            } else {
                "Type escape sequence to abort.\n.....\nSuccess rate is 0 percent (0/5)"
                    .to_string()
            });
        }
        Ok(String::new())
    }

    async fn send_config_set(
        &mut self,
        lines: &[String],
    ) -> Result<(), TransportError> {
        self.exec("configure terminal")?;
        for line in lines {
            self.exec(line)?;
            self.config.push(line.clone());
        }
        self.exec("end")
    }

    async fn save_config(&mut self) -> Result<(), TransportError> {
        self.exec("write memory")
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.log.record(&self.address, "exit");
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        self.release();
        Ok(())
    }
}

/// Clock that returns immediately and counts sleeps.
#[derive(Debug, Default)]
pub struct ManualClock {
    sleeps: AtomicUsize,
}

impl ManualClock {
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for ManualClock {
    async fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

/// Keeps reports in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    reports: Mutex<Vec<AuditReport>>,
}

impl MemoryAuditSink {
    pub fn reports(&self) -> Vec<AuditReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn persist(&self, report: &AuditReport) -> Result<(), AuditError> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

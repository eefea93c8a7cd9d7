use std::sync::Arc;

use smartreg_core::{
    ConnectionParameters, DeviceRecord, PollPolicy, RegistrationOutcome,
    RegistrationRequest, RegistrationWorkflow,
};

mod support;

use support::{
    DeviceScript, FakeTransport, LICENSING_SERVER, ManualClock, MemoryAuditSink,
    TOKEN, failed_report, status_report,
};

const ADDRESS: &str = "10.0.0.1";

struct Harness {
    workflow: RegistrationWorkflow,
    log: Arc<support::SessionLog>,
    clock: Arc<ManualClock>,
    audit: Arc<MemoryAuditSink>,
}

fn harness(script: DeviceScript) -> Harness {
    let transport = FakeTransport::new(script);
    let log = transport.log();
    let clock = Arc::new(ManualClock::default());
    let audit = Arc::new(MemoryAuditSink::default());
    let workflow =
        RegistrationWorkflow::new(Arc::new(transport), Arc::new(support::template()))
            .with_clock(clock.clone())
            .with_audit_sink(audit.clone());
    Harness {
        workflow,
        log,
        clock,
        audit,
    }
}

fn device() -> DeviceRecord {
    DeviceRecord::new(ADDRESS, &ConnectionParameters::new("admin", "cisco"))
}

fn request() -> RegistrationRequest {
    RegistrationRequest::new(TOKEN, LICENSING_SERVER)
}

#[tokio::test]
async fn connect_failure_sends_no_device_commands() {
    let h = harness(DeviceScript::unreachable());
    let mut device = device();

    let outcome = h.workflow.run(&mut device, &request()).await.unwrap();

    assert_eq!(
        outcome.to_string(),
        format!("{ADDRESS} - FAILED to CONNECT")
    );
    assert!(matches!(outcome, RegistrationOutcome::ConnectFailed { .. }));
    assert_eq!(h.log.commands_for(ADDRESS), vec!["<open>"]);
    assert_eq!(h.clock.sleeps(), 0);
    assert!(device.hostname().is_none());
}

#[tokio::test]
async fn registered_device_skips_configuration() {
    let h = harness(DeviceScript::registered().named("core-1"));
    let mut device = device();

    let outcome = h.workflow.run(&mut device, &request()).await.unwrap();

    assert_eq!(outcome.to_string(), "core-1 - OK");
    let commands = h.log.commands_for(ADDRESS);
    assert!(!commands.iter().any(|c| c == "configure terminal"));
    assert!(!commands.iter().any(|c| c.starts_with("license smart register")));
    assert!(!commands.iter().any(|c| c.starts_with("ping")));
    assert_eq!(h.log.count(ADDRESS, "exit"), 1);
    assert_eq!(h.clock.sleeps(), 0);
    assert!(h.audit.reports().is_empty());
}

#[tokio::test]
async fn poll_stops_on_the_check_that_sees_registration() {
    let unregistered = status_report("UNREGISTERED", None);
    let h = harness(DeviceScript::unregistered().named("edge-1").with_statuses([
        unregistered.clone(),
        unregistered.clone(),
        unregistered,
        status_report("REGISTERED", None),
    ]));
    let mut device = device();

    let outcome = h.workflow.run(&mut device, &request()).await.unwrap();

    assert_eq!(outcome.to_string(), "edge-1 - OK");
    // checks at ticks 0, 10 and 20, one sleep before each tick
    assert_eq!(h.clock.sleeps(), 21);
    assert_eq!(h.log.count(ADDRESS, "show license status"), 4);
    assert_eq!(
        h.log.count(ADDRESS, &format!("license smart register idtoken {TOKEN}")),
        1
    );
}

#[tokio::test]
async fn configuration_is_applied_audited_and_saved() {
    let h = harness(DeviceScript::unregistered().named("edge-2"));
    let mut device = device();

    h.workflow.run(&mut device, &request()).await.unwrap();

    let commands = h.log.commands_for(ADDRESS);
    let position = |needle: &str| {
        commands
            .iter()
            .position(|c| c == needle)
            .unwrap_or_else(|| panic!("missing `{needle}` in {commands:?}"))
    };
    assert!(position("license smart enable") < position("write memory"));
    assert!(position("write memory") < position(&format!("license smart register idtoken {TOKEN}")));
    assert!(!commands.iter().any(|c| c.starts_with("ip http client")));

    let reports = h.audit.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].hostname, "edge-2");
    assert_eq!(reports[0].added(), 4);
    assert_eq!(reports[0].removed(), 0);
}

#[tokio::test]
async fn first_reachable_interface_becomes_http_source() {
    let h = harness(
        DeviceScript::unregistered()
            .named("branch-7")
            .without_default_route(&["GigabitEthernet0/1", "GigabitEthernet0/2"]),
    );
    let mut device = device();

    let outcome = h.workflow.run(&mut device, &request()).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(device.http_client_source(), Some("GigabitEthernet0/1"));

    let commands = h.log.commands_for(ADDRESS);
    assert!(commands.contains(&format!("ping {LICENSING_SERVER} source GigabitEthernet0/1")));
    // down interface is never probed, nor anything after the first hit
    assert!(!commands.iter().any(|c| c.ends_with("source GigabitEthernet0/0")));
    assert!(!commands.iter().any(|c| c.ends_with("source GigabitEthernet0/2")));
    assert!(commands.contains(&"ip http client source-interface GigabitEthernet0/1".to_string()));
}

#[tokio::test]
async fn second_interface_is_used_when_first_cannot_reach_server() {
    let h = harness(
        DeviceScript::unregistered().without_default_route(&["GigabitEthernet0/2"]),
    );
    let mut device = device();

    h.workflow.run(&mut device, &request()).await.unwrap();

    assert_eq!(device.http_client_source(), Some("GigabitEthernet0/2"));
    let commands = h.log.commands_for(ADDRESS);
    assert!(commands.contains(&format!("ping {LICENSING_SERVER} source GigabitEthernet0/1")));
}

#[tokio::test]
async fn no_reachable_interface_still_attempts_registration() {
    let h = harness(DeviceScript::unregistered().without_default_route(&[]));
    let mut device = device();

    let outcome = h.workflow.run(&mut device, &request()).await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(device.http_client_source(), None);
    assert!(!h
        .log
        .commands_for(ADDRESS)
        .iter()
        .any(|c| c.starts_with("ip http client")));
}

#[tokio::test]
async fn conversion_is_started_when_supported() {
    let h = harness(DeviceScript::unregistered().named("dc-1").with_statuses([
        status_report("UNREGISTERED", Some("Not started")),
        status_report("REGISTERED", Some("Not started")),
    ]));
    let mut device = device();

    let outcome = h.workflow.run(&mut device, &request()).await.unwrap();

    assert_eq!(outcome.to_string(), "dc-1 - OK");
    assert_eq!(h.log.count(ADDRESS, "license smart conversion start"), 1);
    assert!(device.dlc_started());
}

#[tokio::test]
async fn conversion_already_started_is_not_repeated() {
    let h = harness(
        DeviceScript::registered().with_statuses([status_report("REGISTERED", Some("Completed"))]),
    );
    let mut device = device();

    h.workflow.run(&mut device, &request()).await.unwrap();

    assert_eq!(h.log.count(ADDRESS, "license smart conversion start"), 0);
}

#[tokio::test]
async fn timeout_reports_failure_with_reason() {
    let reason = "Fail to send out Call Home HTTP message.";
    let h = harness(
        DeviceScript::unregistered()
            .named("edge-9")
            .with_statuses([failed_report(reason)]),
    );
    let mut device = device();

    let outcome = h.workflow.run(&mut device, &request()).await.unwrap();

    assert_eq!(outcome.to_string(), "edge-9 - FAILED to register");
    assert_eq!(
        outcome,
        RegistrationOutcome::RegistrationFailed {
            hostname: "edge-9".to_string(),
            address: ADDRESS.to_string(),
            reason: Some(reason.to_string()),
        }
    );
    // ticks 0..=120 at the default cadence
    assert_eq!(h.clock.sleeps(), 121);
    assert_eq!(h.log.count(ADDRESS, "license smart conversion start"), 0);
    assert_eq!(h.log.count(ADDRESS, "exit"), 1);
}

#[tokio::test]
async fn shorter_poll_policy_is_honoured() {
    let h = harness(
        DeviceScript::unregistered().with_statuses([status_report("UNREGISTERED", None)]),
    );
    let workflow = h.workflow.clone().with_poll_policy(PollPolicy {
        timeout: std::time::Duration::from_secs(5),
        interval: std::time::Duration::from_secs(1),
        check_every: 2,
    });
    let mut device = device();

    let outcome = workflow.run(&mut device, &request()).await.unwrap();

    assert!(matches!(outcome, RegistrationOutcome::RegistrationFailed { reason: None, .. }));
    assert_eq!(h.clock.sleeps(), 6);
    // initial read, checks at ticks 0, 2 and 4, final read for the reason
    assert_eq!(h.log.count(ADDRESS, "show license status"), 5);
}

#[tokio::test]
async fn session_is_closed_when_a_step_fails() {
    let h = harness(DeviceScript::unregistered().failing_on("license smart register"));
    let mut device = device();

    let err = h.workflow.run(&mut device, &request()).await.unwrap_err();

    assert!(err.to_string().contains("register"), "{err}");
    assert_eq!(h.log.count(ADDRESS, "exit"), 1);
    assert_eq!(h.log.closed(), h.log.opened());
    assert!(!device.is_connected());
}

#[tokio::test]
async fn rerunning_a_registered_device_changes_nothing() {
    let h = harness(DeviceScript::registered());
    let mut first = device();
    let mut second = device();

    let a = h.workflow.run(&mut first, &request()).await.unwrap();
    let b = h.workflow.run(&mut second, &request()).await.unwrap();

    assert_eq!(a, b);
    assert!(!h
        .log
        .commands_for(ADDRESS)
        .iter()
        .any(|c| c == "configure terminal" || c == "write memory"));
}

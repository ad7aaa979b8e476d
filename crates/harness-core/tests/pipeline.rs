//! End-to-end tests of the consumption loop against the in-memory fakes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use harness_core::fakes::{Call, FakeHypervisor, VecSource};
use harness_core::{
    BusMessage, DomainFamily, DomainState, EventOutcome, Harness, HarnessConfig, HarnessError,
    JsonLinesSource, LaunchAction,
};
use serde_json::json;
use tempfile::TempDir;

const TOPIC: &str = "org.fedoraproject.prod.buildsys.build.state.change";

fn config(dir: &Path) -> HarnessConfig {
    HarnessConfig {
        marker_dir: dir.to_path_buf(),
        log_path: dir.join("harness.log"),
        pid_path: dir.join("harness.pid"),
        ..HarnessConfig::default()
    }
}

fn build_event(text: &str) -> BusMessage {
    BusMessage::new(TOPIC, json!({ "instance": "primary" })).with_rendered(text)
}

fn harness(dir: &TempDir, hv: &FakeHypervisor) -> Harness<FakeHypervisor> {
    Harness::new(&config(dir.path()), Arc::new(hv.clone())).unwrap()
}

fn marker_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n != "harness.log")
        .collect();
    names.sort();
    names
}

/// Test: other topics never reach the marker or the hypervisor
#[tokio::test]
async fn test_foreign_topic_is_ignored() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    let harness = harness(&dir, &hv);

    let message = BusMessage::new(
        "org.fedoraproject.prod.buildsys.tag",
        json!({ "instance": "primary" }),
    )
    .with_rendered("jforbes's kernel-6.2.9-200.fc38.x86_64 completed");

    let outcome = harness.handle_message(&message).await;

    assert!(matches!(outcome, EventOutcome::Rejected));
    assert!(marker_files(dir.path()).is_empty());
    assert_eq!(hv.connections(), 0);
}

/// Test: secondary Koji instances are ignored
#[tokio::test]
async fn test_non_primary_instance_is_ignored() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    let harness = harness(&dir, &hv);

    let message = BusMessage::new(TOPIC, json!({ "instance": "s390" }))
        .with_rendered("jforbes's kernel-6.2.9-200.fc38.x86_64 completed");

    assert!(matches!(
        harness.handle_message(&message).await,
        EventOutcome::Rejected
    ));
    assert!(marker_files(dir.path()).is_empty());
}

/// Test: a numbered release writes its marker and launches both domains
#[tokio::test(start_paused = true)]
async fn test_fedora_build_is_provisioned() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    hv.add_domain("Fedora38_arm64", vec![DomainState::Running, DomainState::ShutOff]);
    hv.add_domain("Fedora38_64", vec![DomainState::ShutOff]);
    let harness = harness(&dir, &hv);

    let outcome = harness
        .handle_message(&build_event("completed kernel-6.2.9-200.fc38.x86_64 by jforbes"))
        .await;

    let EventOutcome::Dispatched { build, handles } = outcome else {
        panic!("expected dispatch, got {outcome:?}");
    };
    assert_eq!(build.family.to_string(), "Fedora38_");
    assert_eq!(handles.arm64.domain.as_str(), "Fedora38_arm64");
    assert_eq!(handles.x86_64.domain.as_str(), "Fedora38_64");

    // Marker is written before dispatch returns.
    let marker = std::fs::read(dir.path().join("Fedora38")).unwrap();
    assert_eq!(marker, b"kernel-6.2.9-200.fc38.x86_64");

    let log = std::fs::read_to_string(dir.path().join("harness.log")).unwrap();
    assert_eq!(
        log,
        "completed kernel-6.2.9-200.fc38.x86_64 by jforbes\nTesting kernel-6.2.9-200.fc38.x86_64\n"
    );

    let (arm, x86) = handles.join().await;
    assert_eq!(arm.unwrap().action, LaunchAction::Created { polls: 2 });
    assert_eq!(x86.unwrap().action, LaunchAction::Created { polls: 1 });

    // No create while running; exactly one create after shut off.
    assert_eq!(
        hv.calls("Fedora38_arm64"),
        vec![Call::QueryState, Call::QueryState, Call::Create]
    );
    assert_eq!(hv.calls("Fedora38_64"), vec![Call::QueryState, Call::Create]);
}

/// Test: the configured rawhide tag reboots both domains without polling
#[tokio::test]
async fn test_rawhide_build_reboots() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    hv.add_domain("Rawhidearm64", vec![DomainState::Running]);
    hv.add_domain("Rawhide64", vec![DomainState::Running]);
    let harness = harness(&dir, &hv);

    let outcome = harness
        .handle_message(&build_event(
            "jforbes's kernel-6.12.0-0.rc1.20.fc41.x86_64 completed",
        ))
        .await;

    let EventOutcome::Dispatched { build, handles } = outcome else {
        panic!("expected dispatch");
    };
    assert_eq!(build.family, DomainFamily::Rawhide);

    let (arm, x86) = handles.join().await;
    assert_eq!(arm.unwrap().action, LaunchAction::Rebooted);
    assert_eq!(x86.unwrap().action, LaunchAction::Rebooted);
    assert_eq!(hv.calls("Rawhidearm64"), vec![Call::Reboot]);
    assert_eq!(hv.calls("Rawhide64"), vec![Call::Reboot]);

    let marker = std::fs::read_to_string(dir.path().join("Rawhide")).unwrap();
    assert_eq!(marker, "kernel-6.12.0-0.rc1.20.fc41.x86_64");
}

/// Test: malformed text is dropped with no side effects
#[tokio::test]
async fn test_malformed_text_is_dropped() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    let harness = harness(&dir, &hv);

    for text in [
        "kernel-6.2.9-completed",
        "jforbes's kernel-6-completed",
        "completed kernel-6.2.9-200.el9.x86_64",
    ] {
        let outcome = harness.handle_message(&build_event(text)).await;
        assert!(matches!(outcome, EventOutcome::Malformed), "{text}");
    }

    assert!(marker_files(dir.path()).is_empty());
    assert!(!dir.path().join("harness.log").exists());
    assert_eq!(hv.connections(), 0);
}

/// Test: a missing arm64 domain does not stop the x86_64 launch
#[tokio::test]
async fn test_sibling_launch_survives_missing_domain() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    hv.add_domain("Fedora39_64", vec![DomainState::ShutOff]);
    let harness = harness(&dir, &hv);

    let outcome = harness
        .handle_message(&build_event(
            "jforbes's kernel-6.5.6-300.fc39.x86_64 completed",
        ))
        .await;
    let EventOutcome::Dispatched { handles, .. } = outcome else {
        panic!("expected dispatch");
    };

    let (arm, x86) = handles.join().await;
    assert!(matches!(arm, Err(HarnessError::DomainNotFound(_))));
    assert_eq!(x86.unwrap().action, LaunchAction::Created { polls: 1 });
    assert_eq!(hv.calls("Fedora39_64"), vec![Call::QueryState, Call::Create]);
}

/// Test: structured payload fields win over rendered text
#[tokio::test]
async fn test_structured_fields_are_preferred() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    hv.add_domain("Fedora40_arm64", vec![DomainState::ShutOff]);
    hv.add_domain("Fedora40_64", vec![DomainState::ShutOff]);
    let harness = harness(&dir, &hv);

    let message = BusMessage::new(
        TOPIC,
        json!({
            "instance": "primary",
            "owner": "jforbes",
            "name": "kernel",
            "version": "6.8.1",
            "release": "300.fc40",
            "arch": "x86_64",
            "new": 1,
        }),
    );

    let outcome = harness.handle_message(&message).await;
    let EventOutcome::Dispatched { build, handles } = outcome else {
        panic!("expected dispatch");
    };
    assert_eq!(build.package.nvr, "kernel-6.8.1-300.fc40.x86_64");
    assert_eq!(build.family.to_string(), "Fedora40_");

    let (arm, x86) = handles.join().await;
    assert!(arm.is_ok() && x86.is_ok());
}

/// Test: a Koji payload without an arch field is still provisioned
#[tokio::test]
async fn test_archless_koji_payload_is_provisioned() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    hv.add_domain("Fedora38_arm64", vec![DomainState::ShutOff]);
    hv.add_domain("Fedora38_64", vec![DomainState::ShutOff]);
    let harness = harness(&dir, &hv);

    let message = BusMessage::new(
        TOPIC,
        json!({
            "instance": "primary",
            "owner": "jforbes",
            "name": "kernel",
            "version": "6.2.9",
            "release": "200.fc38",
            "build_id": 2176941,
            "task_id": 99887766,
            "old": 0,
            "new": 1,
        }),
    );

    let outcome = harness.handle_message(&message).await;
    let EventOutcome::Dispatched { build, handles } = outcome else {
        panic!("expected dispatch, got {outcome:?}");
    };
    assert_eq!(build.package.nvr, "kernel-6.2.9-200.fc38");
    assert_eq!(build.family.to_string(), "Fedora38_");

    let marker = std::fs::read_to_string(dir.path().join("Fedora38")).unwrap();
    assert_eq!(marker, "kernel-6.2.9-200.fc38");
    let log = std::fs::read_to_string(dir.path().join("harness.log")).unwrap();
    assert_eq!(
        log,
        "jforbes's kernel-6.2.9-200.fc38 completed\nTesting kernel-6.2.9-200.fc38\n"
    );

    let (arm, x86) = handles.join().await;
    assert!(arm.is_ok() && x86.is_ok());
}

/// Test: an unwritable process log blocks neither the marker nor dispatch
#[tokio::test]
async fn test_log_failure_still_dispatches() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    hv.add_domain("Fedora38_arm64", vec![DomainState::ShutOff]);
    hv.add_domain("Fedora38_64", vec![DomainState::ShutOff]);
    let mut config = config(dir.path());
    config.log_path = dir.path().join("no-such-dir").join("harness.log");
    let harness = Harness::new(&config, Arc::new(hv.clone())).unwrap();

    let outcome = harness
        .handle_message(&build_event(
            "jforbes's kernel-6.2.9-200.fc38.x86_64 completed",
        ))
        .await;

    let EventOutcome::Dispatched { handles, .. } = outcome else {
        panic!("expected dispatch, got {outcome:?}");
    };
    let marker = std::fs::read_to_string(dir.path().join("Fedora38")).unwrap();
    assert_eq!(marker, "kernel-6.2.9-200.fc38.x86_64");
    assert!(!config.log_path.exists());

    let (arm, x86) = handles.join().await;
    assert!(arm.is_ok() && x86.is_ok());
}

/// Test: a non-UTF-8 line from the relay is skipped and the loop keeps going
#[tokio::test(start_paused = true)]
async fn test_invalid_bytes_on_the_bus_are_skipped() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    hv.add_domain("Fedora38_arm64", vec![DomainState::ShutOff]);
    hv.add_domain("Fedora38_64", vec![DomainState::ShutOff]);
    let harness = harness(&dir, &hv);

    let line = |message: BusMessage| {
        let mut bytes = serde_json::to_vec(&message).unwrap();
        bytes.push(b'\n');
        bytes
    };
    let mut input = line(BusMessage::new(
        "org.fedoraproject.prod.bodhi.update.request",
        json!({}),
    ));
    input.extend_from_slice(b"\xff\xfe garbage\n");
    input.extend(line(build_event(
        "jforbes's kernel-6.2.9-200.fc38.x86_64 completed",
    )));

    let mut source = JsonLinesSource::new(input.as_slice());
    harness.run(&mut source).await.unwrap();

    assert_eq!(source.skipped(), 1);
    let marker = std::fs::read_to_string(dir.path().join("Fedora38")).unwrap();
    assert_eq!(marker, "kernel-6.2.9-200.fc38.x86_64");
}

/// Test: a marker write failure skips dispatch but not later events
#[tokio::test]
async fn test_marker_failure_skips_dispatch_only() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    hv.add_domain("Fedora38_arm64", vec![DomainState::ShutOff]);
    hv.add_domain("Fedora38_64", vec![DomainState::ShutOff]);
    let harness = harness(&dir, &hv);

    // A directory where the marker file should go makes the write fail.
    std::fs::create_dir(dir.path().join("Fedora37")).unwrap();

    let failed = harness
        .handle_message(&build_event(
            "jforbes's kernel-6.2.9-100.fc37.x86_64 completed",
        ))
        .await;
    assert!(matches!(failed, EventOutcome::MarkerFailed(_)));
    assert_eq!(hv.connections(), 0);

    let next = harness
        .handle_message(&build_event(
            "jforbes's kernel-6.2.9-200.fc38.x86_64 completed",
        ))
        .await;
    assert!(next.is_dispatched());
}

/// Test: the loop drains the source; the marker tracks the last event
#[tokio::test(start_paused = true)]
async fn test_run_consumes_until_stream_ends() {
    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    for name in ["Fedora38_arm64", "Fedora38_64"] {
        hv.add_domain(name, vec![DomainState::ShutOff]);
    }
    let harness = harness(&dir, &hv);

    let mut source = VecSource::new(vec![
        build_event("jforbes's kernel-6.2.9-200.fc38.x86_64 completed"),
        BusMessage::new("org.fedoraproject.prod.bodhi.update.request", json!({})),
        build_event("jforbes's kernel-completed"),
        build_event("jforbes's kernel-6.3.1-200.fc38.x86_64 completed"),
    ]);

    harness.run(&mut source).await.unwrap();

    let marker = std::fs::read_to_string(dir.path().join("Fedora38")).unwrap();
    assert_eq!(marker, "kernel-6.3.1-200.fc38.x86_64");

    let log = std::fs::read_to_string(dir.path().join("harness.log")).unwrap();
    assert_eq!(log.lines().count(), 4);

    // Let the detached launches finish.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(hv.connections(), 4);
    assert_eq!(
        hv.calls("Fedora38_64"),
        vec![Call::QueryState, Call::Create, Call::QueryState, Call::Create]
    );
}

/// Test: a missing marker directory is fatal at construction
#[test]
fn test_missing_marker_dir_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = config(dir.path());
    config.marker_dir = dir.path().join("latest");

    let err = match Harness::new(&config, Arc::new(FakeHypervisor::new())) {
        Ok(_) => panic!("harness built without marker dir"),
        Err(e) => e,
    };
    assert!(matches!(err, HarnessError::MarkerDirMissing(_)));
}

/// Test: a custom renderer and filter replace the Koji defaults
#[tokio::test]
async fn test_custom_renderer_and_filter() {
    use harness_core::{EventFilter, MessageRenderer};

    struct SubjectRenderer;

    impl MessageRenderer for SubjectRenderer {
        fn render(&self, message: &BusMessage) -> Option<String> {
            message
                .msg
                .get("subject")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        }
    }

    let dir = TempDir::new().unwrap();
    let hv = FakeHypervisor::new();
    hv.add_domain("Fedora40_arm64", vec![DomainState::ShutOff]);
    hv.add_domain("Fedora40_64", vec![DomainState::ShutOff]);
    let harness = harness(&dir, &hv)
        .with_renderer(SubjectRenderer)
        .with_filter(EventFilter::new("kernel-").with_instance("stg"));

    let message = BusMessage::new(
        TOPIC,
        json!({
            "instance": "stg",
            "subject": "completed kernel-7.0.0-1.fc40.x86_64",
        }),
    );
    let outcome = harness.handle_message(&message).await;
    let EventOutcome::Dispatched { build, handles } = outcome else {
        panic!("expected dispatch");
    };
    assert_eq!(build.package.nvr, "kernel-7.0.0-1.fc40.x86_64");
    let (arm, x86) = handles.join().await;
    assert!(arm.is_ok() && x86.is_ok());

    // Primary-instance traffic no longer passes.
    let primary = build_event("jforbes's kernel-6.2.9-200.fc38.x86_64 completed");
    assert!(matches!(
        harness.handle_message(&primary).await,
        EventOutcome::Rejected
    ));
}

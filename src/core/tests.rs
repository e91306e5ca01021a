use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{sleep, timeout};

use super::{Supervisor, SupervisorBuilder};
use crate::config::Config;
use crate::error::{ProcessError, ResolveError};
use crate::events::{Event, EventKind};
use crate::model::{ProcessGroup, ProcessInfo, ProcessState, ReadyCheck};
use crate::os::{UnixProcessControl, collect_tree, pid_alive};

fn cfg() -> Config {
    Config {
        node_name: "n1".into(),
        health_check_interval: Duration::from_millis(50),
        stop_timeout: Duration::from_secs(1),
        kill_timeout: Duration::from_millis(500),
        ..Config::default()
    }
}

/// Non-critical `/bin/sh -c script` with short retry delays.
fn sh(name: &str, group: &str, script: &str) -> ProcessInfo {
    ProcessInfo {
        critical: false,
        restart_delay: Duration::from_millis(10),
        max_restart_delay: Duration::from_millis(20),
        ..ProcessInfo::new(name, group, "/bin/sh").with_args(["-c", script])
    }
}

/// Readiness gated on a file that the test controls.
fn file_check(path: &Path, limit: Duration) -> ReadyCheck {
    ReadyCheck::file(path.to_string_lossy())
        .with_timeout(limit)
        .with_pause(Duration::from_millis(20))
        .with_check_timeout(Duration::from_millis(50))
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<(EventKind, String)> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(ev) => {
                let name = ev.process.or(ev.group).map(|s| s.to_string()).unwrap_or_default();
                out.push((ev.kind, name));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return out,
        }
    }
}

fn position(events: &[(EventKind, String)], kind: EventKind, name: &str) -> usize {
    events
        .iter()
        .position(|(k, n)| *k == kind && n == name)
        .unwrap_or_else(|| panic!("no {kind:?} for {name} in {events:?}"))
}

async fn wait_event(rx: &mut broadcast::Receiver<Event>, kind: EventKind, name: &str) -> Event {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(ev) if ev.kind == kind && ev.process.as_deref() == Some(name) => return ev,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(e) => panic!("bus closed: {e}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {kind:?} on {name}"))
}

async fn wait_until<F>(sup: &Supervisor, name: &str, mut pred: F) -> ProcessInfo
where
    F: FnMut(&ProcessInfo) -> bool,
{
    for _ in 0..100 {
        if let Some(info) = sup.process_info(name).await {
            if pred(&info) {
                return info;
            }
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("{name} never reached the expected state");
}

fn two_groups(core: ProcessInfo, apps: ProcessInfo) -> Arc<Supervisor> {
    SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .group(ProcessGroup::new("apps", 1).depends_on("core"))
        .process(core)
        .process(apps)
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn groups_start_in_order_and_stop_in_reverse() {
    let sup = two_groups(sh("db", "core", "sleep 30"), sh("web", "apps", "sleep 30"));
    let mut rx = sup.subscribe();

    sup.start_all().await.unwrap();
    assert!(sup.all_running().await);
    let db_pid = sup.process_info("db").await.unwrap().pid.unwrap();
    let web_pid = sup.process_info("web").await.unwrap().pid.unwrap();

    let started = drain(&mut rx);
    assert!(
        position(&started, EventKind::ProcessStarted, "db")
            < position(&started, EventKind::ProcessStarting, "web")
    );
    assert!(
        position(&started, EventKind::GroupStarting, "core")
            < position(&started, EventKind::GroupStarting, "apps")
    );

    sup.stop_all().await;
    let stopped = drain(&mut rx);
    assert!(
        position(&stopped, EventKind::ProcessStopped, "web")
            < position(&stopped, EventKind::ProcessStopped, "db")
    );
    assert_eq!(sup.process_state("db").await, ProcessState::Stopped);
    assert_eq!(sup.process_state("web").await, ProcessState::Stopped);
    assert!(!pid_alive(db_pid));
    assert!(!pid_alive(web_pid));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readiness_timeouts_exhaust_the_retry_budget() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ready");
    let svc = ProcessInfo {
        max_restarts: 2,
        ..sh("svc", "core", "sleep 30").with_ready_check(file_check(&marker, Duration::from_millis(150)))
    };
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .process(svc)
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let err = sup.start_process("svc").await.unwrap_err();
    assert!(matches!(err, ProcessError::ReadinessTimeout { .. }), "{err}");

    let info = sup.process_info("svc").await.unwrap();
    assert_eq!(info.state, ProcessState::Failed);
    assert_eq!(info.restart_count, 2);
    assert!(info.pid.is_none());

    let events = drain(&mut rx);
    let attempts = events
        .iter()
        .filter(|(k, _)| *k == EventKind::ProcessStarting)
        .count();
    assert_eq!(attempts, 3);
    assert_eq!(
        events.iter().filter(|(k, _)| *k == EventKind::BackoffScheduled).count(),
        2
    );

    std::fs::write(&marker, b"").unwrap();
    sup.restart_process("svc").await.unwrap();
    let info = sup.process_info("svc").await.unwrap();
    assert_eq!(info.state, ProcessState::Running);
    assert_eq!(info.restart_count, 0);
    assert!(info.last_error.is_none());

    sup.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn never_restart_policy_makes_exactly_one_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let svc = ProcessInfo {
        max_restarts: -1,
        ..sh("once", "core", "exit 3")
            .with_ready_check(file_check(&dir.path().join("never"), Duration::from_secs(3)))
    };
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .process(svc)
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let err = sup.start_process("once").await.unwrap_err();
    assert!(matches!(err, ProcessError::Exited { code: Some(3), .. }), "{err}");

    let info = sup.process_info("once").await.unwrap();
    assert_eq!(info.state, ProcessState::Failed);
    assert_eq!(info.restart_count, 0);
    assert_eq!(info.last_exit_code, Some(3));

    let events = drain(&mut rx);
    assert_eq!(
        events.iter().filter(|(k, _)| *k == EventKind::ProcessStarting).count(),
        1
    );
    assert!(events.iter().any(|(k, _)| *k == EventKind::ProcessFailed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bulk_start_passes_over_excluded_and_manual_processes() {
    let mut elsewhere = sh("elsewhere", "core", "sleep 30");
    elsewhere.node_filter.insert("n2".into());
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .process(sh("main", "core", "sleep 30"))
        .process(ProcessInfo { skip: true, ..sh("skipped", "core", "sleep 30") })
        .process(ProcessInfo { manual: true, ..sh("tool", "core", "sleep 30") })
        .process(elsewhere)
        .build()
        .unwrap();

    sup.start_all().await.unwrap();
    assert_eq!(sup.process_state("main").await, ProcessState::Running);
    for name in ["skipped", "tool", "elsewhere"] {
        assert_eq!(sup.process_state(name).await, ProcessState::Stopped, "{name}");
    }
    assert!(sup.all_running().await);

    sup.start_process("tool").await.unwrap();
    assert_eq!(sup.process_state("tool").await, ProcessState::Running);
    assert!(matches!(
        sup.start_process("tool").await,
        Err(ProcessError::AlreadyActive { .. })
    ));
    assert!(matches!(
        sup.start_process("skipped").await,
        Err(ProcessError::Skipped { .. })
    ));
    assert!(matches!(
        sup.start_process("elsewhere").await,
        Err(ProcessError::Skipped { .. })
    ));
    assert!(matches!(
        sup.start_process("ghost").await,
        Err(ProcessError::NotFound { .. })
    ));

    sup.stop_all().await;
    assert_eq!(sup.process_state("tool").await, ProcessState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn critical_failure_aborts_startup_and_requests_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let base = ProcessInfo {
        critical: true,
        max_restarts: -1,
        ..sh("base", "core", "exit 1")
            .with_ready_check(file_check(&dir.path().join("never"), Duration::from_secs(3)))
    };
    let sup = two_groups(base, sh("web", "apps", "sleep 30"));
    let mut rx = sup.subscribe();

    let err = sup.start_all().await.unwrap_err();
    assert!(matches!(err, ProcessError::CriticalExhausted { .. }), "{err}");
    assert!(sup.shutdown_requested());
    assert!(sup.any_critical_failed().await);
    assert_eq!(sup.process_state("web").await, ProcessState::Stopped);

    let events = drain(&mut rx);
    assert!(events.iter().any(|(k, _)| *k == EventKind::ShutdownRequested));
    assert!(!events.iter().any(|(k, n)| *k == EventKind::ProcessStarting && n == "web"));
}

#[tokio::test]
async fn dependency_cycle_is_reported_and_stop_still_sweeps() {
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("a", 0).depends_on("b"))
        .group(ProcessGroup::new("b", 1).depends_on("a"))
        .process(sh("x", "a", "sleep 30"))
        .build()
        .unwrap();

    let err = sup.start_all().await.unwrap_err();
    assert!(
        matches!(err, ProcessError::Resolve(ResolveError::Cycle { .. })),
        "{err}"
    );
    assert!(sup.run_list().await.is_err());
    assert_eq!(sup.process_state("x").await, ProcessState::Stopped);

    sup.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oneshots_complete_or_fail_without_retry() {
    let ok = ProcessInfo { oneshot: true, ..sh("migrate", "core", "echo done") };
    let bad = ProcessInfo { oneshot: true, max_restarts: 5, ..sh("broken", "core", "exit 4") };
    let slow = ProcessInfo {
        oneshot: true,
        oneshot_timeout: Duration::from_millis(200),
        ..sh("slow", "core", "sleep 30")
    };
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .processes([ok, bad, slow])
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    sup.start_process("migrate").await.unwrap();
    let info = sup.process_info("migrate").await.unwrap();
    assert_eq!(info.state, ProcessState::Completed);
    assert_eq!(info.last_exit_code, Some(0));

    let err = sup.start_process("broken").await.unwrap_err();
    assert!(matches!(err, ProcessError::Exited { code: Some(4), .. }), "{err}");
    let info = sup.process_info("broken").await.unwrap();
    assert_eq!(info.state, ProcessState::Failed);
    assert_eq!(info.restart_count, 0);

    let err = sup.start_process("slow").await.unwrap_err();
    assert!(matches!(err, ProcessError::OneshotTimeout { .. }), "{err}");
    assert_eq!(sup.process_state("slow").await, ProcessState::Failed);

    let events = drain(&mut rx);
    assert!(events.contains(&(EventKind::ProcessCompleted, "migrate".into())));
    assert_eq!(
        events
            .iter()
            .filter(|(k, n)| *k == EventKind::ProcessStarting && n == "broken")
            .count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_takes_down_the_whole_tree() {
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .process(sh("tree", "core", "sleep 30 & sleep 30 & wait"))
        .build()
        .unwrap();
    sup.start_process("tree").await.unwrap();
    let root = sup.process_info("tree").await.unwrap().pid.unwrap();

    let ctl = UnixProcessControl::new();
    let mut pids = Vec::new();
    for _ in 0..50 {
        pids = collect_tree(&ctl, root);
        if pids.len() >= 3 {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(pids.len() >= 3, "children never appeared: {pids:?}");

    sup.stop_process("tree").await.unwrap();
    sleep(Duration::from_millis(100)).await;
    for pid in pids {
        assert!(!pid_alive(pid), "{pid} survived");
    }
    assert_eq!(sup.process_state("tree").await, ProcessState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn monitor_restarts_a_crashed_process() {
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .process(sh("worker", "core", "sleep 30"))
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    sup.start_all().await.unwrap();
    assert!(sup.start_monitoring());
    assert!(!sup.start_monitoring());
    assert!(sup.is_monitoring());

    let first = sup.process_info("worker").await.unwrap().pid.unwrap();
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(first),
        nix::sys::signal::Signal::SIGKILL,
    )
    .unwrap();

    let exited = wait_event(&mut rx, EventKind::ProcessExited, "worker").await;
    assert_eq!(exited.exit_code, Some(128 + 9));
    let info = wait_until(&sup, "worker", |p| {
        p.state == ProcessState::Running && p.pid.is_some_and(|pid| pid != first)
    })
    .await;
    assert_eq!(info.restart_count, 0);

    sup.stop_monitoring().await;
    assert!(!sup.is_monitoring());
    sup.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn liveness_breach_forces_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let worker = ProcessInfo {
        health_check: Some(file_check(&dir.path().join("alive"), Duration::from_millis(100))),
        health_fail_threshold: 2,
        ..sh("worker", "core", "sleep 30")
    };
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .process(worker)
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    sup.start_all().await.unwrap();
    let first = sup.process_info("worker").await.unwrap().pid.unwrap();
    sup.start_monitoring();

    let breach = wait_event(&mut rx, EventKind::HealthCheckFailed, "worker").await;
    assert_eq!(breach.attempt, Some(2));
    wait_event(&mut rx, EventKind::ProcessStarted, "worker").await;
    assert!(!pid_alive(first));

    sup.stop_monitoring().await;
    sup.stop_all().await;
    assert_eq!(sup.process_state("worker").await, ProcessState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_all_relaunches_running_and_failed_processes() {
    let dir = tempfile::tempdir().unwrap();
    let flaky = ProcessInfo {
        max_restarts: -1,
        ..sh("flaky", "apps", "sleep 30")
            .with_ready_check(file_check(&dir.path().join("ok"), Duration::from_millis(100)))
    };
    let sup = two_groups(sh("db", "core", "sleep 30"), flaky);

    sup.start_all().await.unwrap();
    assert_eq!(sup.process_state("flaky").await, ProcessState::Failed);
    let db_pid = sup.process_info("db").await.unwrap().pid.unwrap();

    std::fs::write(dir.path().join("ok"), b"").unwrap();
    sup.restart_all().await.unwrap();

    let db = sup.process_info("db").await.unwrap();
    assert_eq!(db.state, ProcessState::Running);
    assert_ne!(db.pid, Some(db_pid));
    assert_eq!(sup.process_state("flaky").await, ProcessState::Running);
    assert!(sup.all_running().await);

    sup.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reload_resets_runtime_state() {
    let sup = two_groups(sh("db", "core", "sleep 30"), sh("web", "apps", "sleep 30"));
    sup.start_all().await.unwrap();
    let before = sup.process_info("web").await.unwrap().pid;

    sup.reload_all().await.unwrap();
    let web = sup.process_info("web").await.unwrap();
    assert_eq!(web.state, ProcessState::Running);
    assert_ne!(web.pid, before);
    assert_eq!(web.restart_count, 0);
    assert!(!sup.shutdown_requested());

    sup.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removed_process_is_stopped_and_forgotten() {
    let sup = two_groups(sh("db", "core", "sleep 30"), sh("web", "apps", "sleep 30"));
    sup.start_all().await.unwrap();
    let pid = sup.process_info("web").await.unwrap().pid.unwrap();

    let removed = sup.remove_process("web").await.unwrap();
    assert_eq!(removed.state, ProcessState::Stopped);
    assert!(!pid_alive(pid));
    assert!(sup.process_info("web").await.is_none());
    assert_eq!(sup.process_state("web").await, ProcessState::Stopped);
    assert!(!sup.run_list().await.unwrap().contains("web"));

    sup.stop_all().await;
}

#[tokio::test]
async fn stop_of_idle_process_is_a_no_op() {
    let sup = two_groups(sh("db", "core", "sleep 30"), sh("web", "apps", "sleep 30"));
    let mut rx = sup.subscribe();

    sup.stop_process("db").await.unwrap();
    assert!(matches!(
        sup.stop_process("ghost").await,
        Err(ProcessError::NotFound { .. })
    ));
    assert_eq!(sup.process_state("db").await, ProcessState::Stopped);
    assert!(!drain(&mut rx).iter().any(|(k, _)| *k == EventKind::ProcessStopped));
    assert_eq!(
        sup.full_args("db").await,
        Some(vec!["-c".to_string(), "sleep 30".to_string()])
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unlimited_restarts_never_end_in_failed() {
    let dir = tempfile::tempdir().unwrap();
    let svc = ProcessInfo {
        max_restarts: 0,
        ..sh("svc", "core", "sleep 30")
            .with_ready_check(file_check(&dir.path().join("never"), Duration::from_millis(80)))
    };
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .process(svc)
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let runner = Arc::clone(&sup);
    let start = tokio::spawn(async move { runner.start_process("svc").await });

    let info = wait_until(&sup, "svc", |p| p.restart_count >= 4).await;
    assert_ne!(info.state, ProcessState::Failed);
    assert!(!start.is_finished());

    sup.stop_all().await;
    let res = timeout(Duration::from_secs(5), start).await.unwrap().unwrap();
    assert!(res.is_err());
    assert_eq!(sup.process_state("svc").await, ProcessState::Stopped);
    assert!(!drain(&mut rx).iter().any(|(k, _)| *k == EventKind::ProcessFailed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failures_outside_the_restart_window_start_a_fresh_streak() {
    let dir = tempfile::tempdir().unwrap();
    let svc = ProcessInfo {
        max_restarts: 1,
        ..sh("svc", "core", "sleep 30")
            .with_ready_check(file_check(&dir.path().join("never"), Duration::from_millis(200)))
    };
    let sup = SupervisorBuilder::new(Config {
        restart_window: Duration::from_millis(50),
        ..cfg()
    })
    .group(ProcessGroup::new("core", 0))
    .process(svc)
    .build()
    .unwrap();
    let mut rx = sup.subscribe();

    let runner = Arc::clone(&sup);
    let start = tokio::spawn(async move { runner.start_process("svc").await });

    // Each readiness wait outlasts the window, so the budget of one retry keeps renewing.
    let mut attempts = 0;
    while attempts < 4 {
        wait_event(&mut rx, EventKind::ProcessStarting, "svc").await;
        attempts += 1;
    }
    let info = sup.process_info("svc").await.unwrap();
    assert_ne!(info.state, ProcessState::Failed);
    assert!(info.restart_count <= 1);

    sup.stop_all().await;
    let _ = timeout(Duration::from_secs(5), start).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_post_ready_hook_only_warns() {
    let svc = ProcessInfo {
        after_run: Some("exit 7".into()),
        ..sh("svc", "core", "sleep 30")
    };
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .process(svc)
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    sup.start_process("svc").await.unwrap();
    assert_eq!(sup.process_state("svc").await, ProcessState::Running);

    let events = drain(&mut rx);
    assert!(
        position(&events, EventKind::HookFailed, "svc")
            < position(&events, EventKind::ProcessStarted, "svc")
    );

    sup.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queries_answer_while_a_start_waits_for_readiness() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ready");
    let svc = sh("svc", "core", "sleep 30").with_ready_check(file_check(&marker, Duration::from_secs(10)));
    let sup = SupervisorBuilder::new(cfg())
        .group(ProcessGroup::new("core", 0))
        .process(svc)
        .build()
        .unwrap();

    let runner = Arc::clone(&sup);
    let start = tokio::spawn(async move { runner.start_process("svc").await });
    wait_until(&sup, "svc", |p| p.pid.is_some()).await;

    let state = timeout(Duration::from_millis(100), sup.process_state("svc"))
        .await
        .expect("state query blocked behind the readiness wait");
    assert_eq!(state, ProcessState::Starting);
    let info = timeout(Duration::from_millis(100), sup.process_info("svc"))
        .await
        .expect("info query blocked behind the readiness wait")
        .unwrap();
    assert!(info.pid.is_some());
    assert!(!timeout(Duration::from_millis(100), sup.all_running()).await.unwrap());
    assert!(!start.is_finished());

    std::fs::write(&marker, b"").unwrap();
    timeout(Duration::from_secs(5), start).await.unwrap().unwrap().unwrap();
    assert_eq!(sup.process_state("svc").await, ProcessState::Running);

    sup.stop_all().await;
}

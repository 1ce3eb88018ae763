use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use statmon::{
    CollectionMethod, EventSink, EventStream, InMemoryMonitorable, InMemoryRegistry, JobKind,
    MonitorEngine, MonitorEngineConfig, MonitorEvent, MonitorListener, Monitorable, StatusVariable,
    StreamError,
};

const UNIT_MS: u64 = 20;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup() -> (MonitorEngine, EventStream, Arc<InMemoryMonitorable>) {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let monitorable = Arc::new(
        InMemoryMonitorable::new("com.acme.pid")
            .with_notifying_variable(StatusVariable::new("sv.id1", CollectionMethod::CumulativeCounter, 0))
            .with_variable(StatusVariable::new("sv.id2", CollectionMethod::StatusInformation, "test")),
    );
    registry.register("com.acme.pid", monitorable.clone()).unwrap();

    let (engine, events) = MonitorEngine::with_event_stream(registry, fast_config()).unwrap();
    monitorable.set_listener(engine.listener());
    (engine, events, monitorable)
}

fn fast_config() -> MonitorEngineConfig {
    MonitorEngineConfig {
        interval_unit_ms: UNIT_MS,
        ..MonitorEngineConfig::default()
    }
}

/// Sink that only counts job events, for tests that race many threads.
#[derive(Default)]
struct JobEventCounter {
    job_events: AtomicUsize,
}

impl JobEventCounter {
    fn count(&self) -> usize {
        self.job_events.load(Ordering::SeqCst)
    }
}

impl EventSink for JobEventCounter {
    fn post(&self, event: MonitorEvent) {
        if event.is_job_event() {
            self.job_events.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn counting_setup() -> (MonitorEngine, Arc<JobEventCounter>, Arc<InMemoryMonitorable>) {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let monitorable = Arc::new(
        InMemoryMonitorable::new("com.acme.pid")
            .with_notifying_variable(StatusVariable::new("sv.id1", CollectionMethod::CumulativeCounter, 0))
            .with_variable(StatusVariable::new("sv.id2", CollectionMethod::StatusInformation, "test")),
    );
    registry.register("com.acme.pid", monitorable.clone()).unwrap();

    let counter = Arc::new(JobEventCounter::default());
    let engine = MonitorEngine::with_config(registry, counter.clone(), fast_config()).unwrap();
    monitorable.set_listener(engine.listener());
    (engine, counter, monitorable)
}

/// Monitorable that pushes a change to its listener from inside every read.
#[derive(Default)]
struct EchoingMonitorable {
    listener: Mutex<Option<Arc<dyn MonitorListener>>>,
    reads: AtomicI32,
}

impl Monitorable for EchoingMonitorable {
    fn status_variable_names(&self) -> Vec<String> {
        vec!["sv.echo".to_string()]
    }

    fn status_variable(&self, id: &str) -> Option<StatusVariable> {
        if id != "sv.echo" {
            return None;
        }
        let read = self.reads.fetch_add(1, Ordering::SeqCst);
        let sv = StatusVariable::new("sv.echo", CollectionMethod::Gauge, read);
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener.updated("com.acme.echo", &sv);
        }
        Some(sv)
    }

    fn notifies_on_change(&self, _id: &str) -> bool {
        true
    }

    fn reset_status_variable(&self, _id: &str) -> bool {
        false
    }
}

fn collect(events: &EventStream, n: usize) -> Vec<MonitorEvent> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        match events.recv_timeout(Duration::from_secs(2)) {
            Ok(event) => out.push(event),
            Err(err) => panic!("expected {n} events, got {} ({err})", out.len()),
        }
    }
    out
}

fn assert_quiet(events: &EventStream, for_units: u64) {
    match events.recv_timeout(Duration::from_millis(UNIT_MS * for_units)) {
        Err(StreamError::Timeout { .. }) => {}
        other => panic!("expected no event, got {other:?}"),
    }
}

#[test]
fn update_job_emits_general_then_job_event() {
    let (engine, events, acme) = setup();

    let job = engine.start_job("init1", &["com.acme.pid/sv.id1"], 1).unwrap();
    assert!(job.is_running());
    assert_eq!(job.kind(), JobKind::UpdateTriggered);
    assert_eq!(job.schedule(), 0);
    assert_eq!(job.report_count(), 1);
    assert!(job.is_local());
    assert_eq!(job.status_variable_names(), ["com.acme.pid/sv.id1"]);

    acme.set_value("sv.id1", 15).unwrap();
    let delivered = events.try_iter_now();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].listener_id, None);
    assert_eq!(delivered[1].listener_id.as_deref(), Some("init1"));
    assert_eq!(delivered[1].status_variable_value, "15");
    assert_eq!(delivered[1].properties()["mon.listener.id"], "init1");

    // Budget of one: the job is gone after its first report.
    assert!(!job.is_running());
    assert!(engine.get_running_jobs().unwrap().is_empty());

    acme.set_value("sv.id1", 16).unwrap();
    let delivered = events.try_iter_now();
    assert_eq!(delivered.len(), 1);
    assert!(!delivered[0].is_job_event());
}

#[test]
fn job_events_ignore_the_notification_gate() {
    let (engine, events, acme) = setup();
    engine.switch_events("*/*", false).unwrap();

    let job = engine.start_job("init1", &["com.acme.pid/sv.id1"], 0).unwrap();
    acme.set_value("sv.id1", 1).unwrap();
    acme.set_value("sv.id1", 2).unwrap();

    let delivered = events.try_iter_now();
    assert_eq!(delivered.len(), 2);
    assert!(delivered.iter().all(MonitorEvent::is_job_event));
    assert_eq!(job.remaining_reports(), None);
    assert!(job.is_running());
}

#[test]
fn start_job_rejects_bad_arguments() {
    let (engine, _events, _acme) = setup();
    let empty: [&str; 0] = [];

    assert!(engine.start_job("", &["com.acme.pid/sv.id1"], 1).unwrap_err().is_invalid_argument());
    assert!(engine.start_job("init1", &["com.acme.pid/sv.id1"], -1).unwrap_err().is_invalid_argument());
    assert!(engine.start_job("init1", &empty, 1).unwrap_err().is_invalid_argument());
    assert!(engine.start_job("init1", &["com.acme.pid/*"], 1).unwrap_err().is_invalid_address());
    assert!(engine.start_job("init1", &["com.acme.pid/sv.id9"], 1).unwrap_err().is_unknown_target());
    assert!(engine
        .start_job("init1", &["com.acme.pid/sv.id2"], 1)
        .unwrap_err()
        .is_unsupported_capability());

    assert!(engine
        .start_scheduled_job("init1", &["com.acme.pid/sv.id2"], 1, -1)
        .unwrap_err()
        .is_invalid_argument());
    assert!(engine
        .start_scheduled_job("init1", &["com.acme.pid/sv.id2"], -2, 1)
        .unwrap_err()
        .is_invalid_argument());

    assert!(engine.get_running_jobs().unwrap().is_empty());
}

#[test]
fn duplicate_targets_are_collapsed() {
    let (engine, events, acme) = setup();
    let job = engine
        .start_job("init1", &["com.acme.pid/sv.id1", "com.acme.pid/sv.id1"], 0)
        .unwrap();
    assert_eq!(job.status_variable_names().len(), 1);

    acme.set_value("sv.id1", 3).unwrap();
    assert_eq!(events.try_iter_now().len(), 2);
}

#[test]
fn stop_is_idempotent_and_silences_the_job() {
    let (engine, events, acme) = setup();
    let job = engine.start_job("init1", &["com.acme.pid/sv.id1"], 0).unwrap();
    let other = engine.start_job("init2", &["com.acme.pid/sv.id1"], 0).unwrap();
    assert_eq!(engine.get_running_jobs().unwrap().len(), 2);

    job.stop();
    job.stop();
    assert!(!job.is_running());
    let running = engine.get_running_jobs().unwrap();
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id(), other.id());

    acme.set_value("sv.id1", 4).unwrap();
    let delivered = events.try_iter_now();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[1].listener_id.as_deref(), Some("init2"));
}

#[test]
fn periodic_job_reports_every_target_until_budget_runs_out() {
    let (engine, events, _acme) = setup();
    let job = engine
        .start_scheduled_job("init1", &["com.acme.pid/sv.id2", "com.acme.pid/sv.id1"], 3, 1)
        .unwrap();
    assert_eq!(job.kind(), JobKind::Periodic { interval_secs: 1 });
    assert_eq!(job.schedule(), 1);

    let delivered = collect(&events, 6);
    assert!(delivered.iter().all(|e| e.listener_id.as_deref() == Some("init1")));
    for tick in delivered.chunks(2) {
        assert_eq!(tick[0].status_variable_name, "sv.id1");
        assert_eq!(tick[1].status_variable_name, "sv.id2");
        assert_eq!(tick[1].status_variable_value, "test");
    }

    assert_quiet(&events, 4);
    assert!(!job.is_running());
    assert!(engine.get_running_jobs().unwrap().is_empty());
}

#[test]
fn periodic_job_reads_fresh_values_and_ignores_updates() {
    let (engine, events, acme) = setup();
    engine.switch_events("*/*", false).unwrap();
    let job = engine
        .start_scheduled_job("init1", &["com.acme.pid/sv.id1"], 0, 5)
        .unwrap();

    let first = collect(&events, 1);
    assert_eq!(first[0].status_variable_value, "0");

    acme.set_value("sv.id1", 8).unwrap();
    let next = collect(&events, 1);
    assert_eq!(next[0].status_variable_value, "8");

    job.stop();
    assert_quiet(&events, 4);
}

#[test]
fn one_shot_job_reads_once_then_reports_updates() {
    let (engine, events, acme) = setup();
    engine.switch_events("*/*", false).unwrap();

    let job = engine
        .start_scheduled_job("init1", &["com.acme.pid/sv.id1"], 2, 0)
        .unwrap();
    assert_eq!(job.kind(), JobKind::OneShot);
    assert_eq!(job.schedule(), 0);

    let first = collect(&events, 1);
    assert_eq!(first[0].status_variable_value, "0");
    assert_eq!(job.remaining_reports(), Some(1));
    assert!(job.is_running());
    assert_quiet(&events, 3);

    acme.set_value("sv.id1", 5).unwrap();
    let delivered = events.try_iter_now();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].status_variable_value, "5");
    assert!(!job.is_running());
}

#[test]
fn one_shot_job_with_single_report_finishes_after_reading() {
    let (engine, events, _acme) = setup();
    let job = engine
        .start_scheduled_job("init1", &["com.acme.pid/sv.id2"], 1, 0)
        .unwrap();

    let delivered = collect(&events, 1);
    assert_eq!(delivered[0].status_variable_value, "test");
    assert_quiet(&events, 2);
    assert!(!job.is_running());
}

#[test]
fn scheduled_job_skips_targets_that_disappear() {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let a = Arc::new(
        InMemoryMonitorable::new("com.acme.a")
            .with_variable(StatusVariable::new("sv.x", CollectionMethod::Gauge, 1.5)),
    );
    let b = Arc::new(
        InMemoryMonitorable::new("com.acme.b")
            .with_variable(StatusVariable::new("sv.y", CollectionMethod::Gauge, true)),
    );
    registry.register("com.acme.a", a).unwrap();
    registry.register("com.acme.b", b).unwrap();

    let (engine, events) = MonitorEngine::with_event_stream(registry.clone(), fast_config()).unwrap();
    let job = engine
        .start_scheduled_job("init1", &["com.acme.a/sv.x", "com.acme.b/sv.y"], 0, 2)
        .unwrap();

    let first = collect(&events, 2);
    assert_eq!(first[0].status_variable_value, "1.5");
    assert_eq!(first[1].status_variable_value, "true");

    registry.unregister("com.acme.b").unwrap();
    let next = collect(&events, 1);
    assert_eq!(next[0].monitorable_id, "com.acme.a");
    assert!(job.is_running());
    job.stop();
}

#[test]
fn shutdown_cancels_every_job() {
    let (engine, events, acme) = setup();
    let update = engine.start_job("init1", &["com.acme.pid/sv.id1"], 0).unwrap();
    let periodic = engine
        .start_scheduled_job("init2", &["com.acme.pid/sv.id2"], 0, 1)
        .unwrap();
    collect(&events, 1);

    engine.shutdown();
    assert!(!update.is_running());
    assert!(!periodic.is_running());
    assert!(engine.get_running_jobs().unwrap().is_empty());

    let _ = events.try_iter_now();
    acme.set_value("sv.id1", 6).unwrap();
    let delivered = events.try_iter_now();
    assert_eq!(delivered.len(), 1);
    assert!(!delivered[0].is_job_event());
    assert_quiet(&events, 3);
}

#[test]
fn cancel_all_jobs_keeps_engine_usable() {
    let (engine, events, acme) = setup();
    engine.start_job("init1", &["com.acme.pid/sv.id1"], 0).unwrap();
    engine.cancel_all_jobs();
    assert!(engine.get_running_jobs().unwrap().is_empty());

    let job = engine.start_job("init2", &["com.acme.pid/sv.id1"], 0).unwrap();
    acme.set_value("sv.id1", 7).unwrap();
    let delivered = events.try_iter_now();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[1].listener_id.as_deref(), Some("init2"));
    assert!(job.is_running());
}

#[test]
fn job_display_summarises_configuration() {
    let (engine, _events, _acme) = setup();
    let job = engine
        .start_scheduled_job("init1", &["com.acme.pid/sv.id2"], 5, 30)
        .unwrap();
    let rendered = job.to_string();
    assert!(rendered.starts_with("PeriodicJob{initiator='init1'"), "{rendered}");
    assert!(rendered.contains("com.acme.pid/sv.id2"), "{rendered}");
    job.stop();
}

#[test]
fn monitorable_reporting_during_read_does_not_stall_scheduler() {
    init_tracing();
    let registry = Arc::new(InMemoryRegistry::new());
    let echo = Arc::new(EchoingMonitorable::default());
    registry.register("com.acme.echo", echo.clone()).unwrap();

    let (engine, events) = MonitorEngine::with_event_stream(registry, fast_config()).unwrap();
    *echo.listener.lock().unwrap() = Some(engine.listener());
    engine.switch_events("*/*", false).unwrap();

    let one_shot = engine
        .start_scheduled_job("init1", &["com.acme.echo/sv.echo"], 0, 0)
        .unwrap();
    let first = collect(&events, 1);
    assert_eq!(first[0].listener_id.as_deref(), Some("init1"));

    // Every periodic read echoes a change, which the one-shot job now reports.
    let periodic = engine
        .start_scheduled_job("init2", &["com.acme.echo/sv.echo"], 2, 1)
        .unwrap();
    let delivered = collect(&events, 4);
    let by = |initiator: &str| {
        delivered
            .iter()
            .filter(|e| e.listener_id.as_deref() == Some(initiator))
            .count()
    };
    assert_eq!(by("init1"), 2);
    assert_eq!(by("init2"), 2);

    assert_quiet(&events, 3);
    assert!(!periodic.is_running());
    assert!(one_shot.is_running());

    engine.shutdown();
    assert!(!one_shot.is_running());
}

#[test]
fn concurrent_updates_respect_report_count() {
    let (engine, counter, acme) = counting_setup();
    let job = engine.start_job("init1", &["com.acme.pid/sv.id1"], 40).unwrap();

    let barrier = Barrier::new(8);
    thread::scope(|s| {
        for t in 0..8 {
            let (acme, barrier) = (&acme, &barrier);
            s.spawn(move || {
                barrier.wait();
                for i in 0..25 {
                    acme.set_value("sv.id1", t * 1000 + i).unwrap();
                }
            });
        }
    });

    assert_eq!(counter.count(), 40);
    assert!(!job.is_running());
    assert!(engine.get_running_jobs().unwrap().is_empty());
}

#[test]
fn stop_racing_updates_allows_only_in_flight_reports() {
    const UPDATERS: usize = 4;
    let (engine, counter, acme) = counting_setup();
    let job = engine.start_job("init1", &["com.acme.pid/sv.id1"], 0).unwrap();

    let barrier = Barrier::new(UPDATERS + 1);
    let at_stop = thread::scope(|s| {
        for t in 0..UPDATERS {
            let (acme, barrier) = (&acme, &barrier);
            s.spawn(move || {
                barrier.wait();
                for i in 0..200 {
                    acme.set_value("sv.id1", i32::try_from(t).unwrap() * 1000 + i).unwrap();
                }
            });
        }

        let stopper = s.spawn(|| {
            barrier.wait();
            thread::sleep(Duration::from_millis(1));
            job.stop();
            counter.count()
        });
        stopper.join().unwrap()
    });

    // Each updater can be at most one fire past the running check.
    assert!(counter.count() - at_stop <= UPDATERS, "{} after {at_stop}", counter.count());
    assert!(engine.get_running_jobs().unwrap().is_empty());

    let settled = counter.count();
    for i in 0..10 {
        acme.set_value("sv.id1", i).unwrap();
    }
    assert_eq!(counter.count(), settled);
}

#[test]
fn stop_racing_periodic_tick_emits_at_most_one_more_tick() {
    let (engine, counter, _acme) = counting_setup();

    for round in 0..5u64 {
        let job = engine
            .start_scheduled_job("init1", &["com.acme.pid/sv.id1", "com.acme.pid/sv.id2"], 0, 1)
            .unwrap();
        thread::sleep(Duration::from_millis(UNIT_MS * 2 + round * 7));

        job.stop();
        let at_stop = counter.count();
        thread::sleep(Duration::from_millis(UNIT_MS * 5));

        // One tick reads both targets.
        assert!(counter.count() - at_stop <= 2, "round {round}: {} after {at_stop}", counter.count());
        assert!(engine.get_running_jobs().unwrap().is_empty());
    }
}

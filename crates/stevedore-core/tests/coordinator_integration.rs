use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::sync::broadcast::{self, error::RecvError};

use stevedore_api::{CoordinatorEvent, DeploymentSnapshot, Glyph, OperatorInput, PackageState};
use stevedore_core::*;
use stevedore_pkg::Package;

const WAIT: Duration = Duration::from_secs(5);

// Mock implementations

/// How the scripted engine ends once every gate is passed
#[derive(Clone, Copy)]
enum Ending {
    Succeed,
    FailOn(usize),
    PanicOn(usize),
}

/// Deploys package `i` once gate `i` gets a permit
struct ScriptedEngine {
    gates: Vec<Arc<Semaphore>>,
    ending: Ending,
    report_packages: bool,
    deployed: AtomicBool,
    cleared: AtomicBool,
}

impl ScriptedEngine {
    fn new(packages: usize, ending: Ending) -> Self {
        Self {
            gates: (0..packages).map(|_| Arc::new(Semaphore::new(0))).collect(),
            ending,
            report_packages: true,
            deployed: AtomicBool::new(false),
            cleared: AtomicBool::new(false),
        }
    }

    fn open(&self, index: usize) {
        self.gates[index].add_permits(1);
    }

    fn open_all(&self) {
        for gate in &self.gates {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl DeployEngine for ScriptedEngine {
    async fn deploy(&self, bundle: &Bundle, reporter: &DeployReporter) -> Result<(), DeployError> {
        self.deployed.store(true, Ordering::SeqCst);
        for package in &bundle.packages {
            let permit = self.gates[package.index]
                .acquire()
                .await
                .map_err(|e| DeployError::Engine(e.to_string()))?;
            permit.forget();
            reporter.output(package.index, format!("installing {}", package.name));

            match self.ending {
                Ending::FailOn(i) if i == package.index => {
                    return Err(DeployError::PackageFailed {
                        package: package.name.clone(),
                        message: "chart install failed".to_string(),
                    });
                }
                Ending::PanicOn(i) if i == package.index => panic!("engine exploded"),
                _ => {}
            }

            if self.report_packages {
                reporter.package_complete(package.index);
            }
        }
        Ok(())
    }

    fn clear_paths(&self) {
        self.cleared.store(true, Ordering::SeqCst);
    }
}

/// Prober whose answers the test changes while the run is live
#[derive(Default)]
struct ScriptedProber {
    units: Mutex<HashMap<String, usize>>,
}

impl ScriptedProber {
    fn set(&self, package: &str, units: usize) {
        self.units
            .lock()
            .unwrap()
            .insert(package.to_string(), units);
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, package: &str) -> Result<ObservedState, ProbeError> {
        self.units
            .lock()
            .unwrap()
            .get(package)
            .copied()
            .map(ObservedState::new)
            .ok_or_else(|| ProbeError::NotFound(package.to_string()))
    }
}

/// Never answers
struct HangingProber;

#[async_trait]
impl Prober for HangingProber {
    async fn probe(&self, _package: &str) -> Result<ObservedState, ProbeError> {
        std::future::pending().await
    }
}

// Helpers

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig {
        tick_ms: 1,
        grace_ms: 20,
        probe_timeout_ms: 50,
    }
}

fn package(name: &str, index: usize, total_components: usize) -> Package {
    Package {
        name: name.to_string(),
        source_location: PathBuf::from(format!("/staging/{name}")),
        total_components,
        index,
    }
}

async fn coordinator(
    engine: Arc<dyn DeployEngine>,
    prober: Arc<dyn Prober>,
    packages: &[(&str, usize)],
    confirmed: bool,
) -> Coordinator {
    let mut args = CoordinatorArgs::new("demo", engine, prober);
    args.config = fast_config();
    args.confirmed = confirmed;

    let mut coordinator = Coordinator::new(args);
    for (index, (name, total)) in packages.iter().enumerate() {
        coordinator
            .register(package(name, index, *total))
            .await
            .unwrap();
    }
    coordinator
}

/// Wait for the first event matching `pred`, recording every snapshot seen
async fn wait_for(
    rx: &mut broadcast::Receiver<CoordinatorEvent>,
    seen: &mut Vec<DeploymentSnapshot>,
    pred: impl Fn(&CoordinatorEvent) -> bool,
) -> CoordinatorEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(snapshot) = event.snapshot() {
                        seen.push(snapshot.clone());
                    }
                    if pred(&event) {
                        return event;
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn snapshot_where(
    pred: impl Fn(&DeploymentSnapshot) -> bool,
) -> impl Fn(&CoordinatorEvent) -> bool {
    move |event| matches!(event, CoordinatorEvent::Snapshot { snapshot } if pred(snapshot))
}

fn fraction(snapshot: &DeploymentSnapshot, index: usize) -> f64 {
    snapshot.packages[index].fraction
}

/// Fractions only grow between consecutive snapshots
fn assert_monotonic(seen: &[DeploymentSnapshot]) {
    for pair in seen.windows(2) {
        for (before, after) in pair[0].packages.iter().zip(&pair[1].packages) {
            assert!(
                after.fraction >= before.fraction,
                "{} regressed from {} to {}",
                after.name,
                before.fraction,
                after.fraction
            );
        }
    }
}

// Tests

#[tokio::test]
async fn test_two_packages_deploy_in_order() {
    let engine = Arc::new(ScriptedEngine::new(2, Ending::Succeed));
    let prober = Arc::new(ScriptedProber::default());
    let coordinator = coordinator(
        engine.clone(),
        prober.clone(),
        &[("podinfo", 1), ("nginx", 1)],
        true,
    )
    .await;
    let mut rx = coordinator.subscribe();
    let run = tokio::spawn(coordinator.run());
    let mut seen = Vec::new();

    // package 0 is observed fully applied before package 1 starts
    prober.set("podinfo", 1);
    let event = wait_for(
        &mut rx,
        &mut seen,
        snapshot_where(|s| fraction(s, 0) >= PROGRESS_CAP),
    )
    .await;
    let snapshot = event.snapshot().unwrap();
    assert!(fraction(snapshot, 0) < 1.0);
    assert_eq!(snapshot.packages[0].glyph, Glyph::Working);
    assert_eq!(snapshot.packages[1].state, PackageState::Pending);

    engine.open(0);
    let event = wait_for(&mut rx, &mut seen, |e| {
        matches!(e, CoordinatorEvent::PackageCompleted { index: 0, .. })
    })
    .await;
    assert!(matches!(
        event,
        CoordinatorEvent::PackageCompleted { ref package, .. } if package == "podinfo"
    ));

    let event = wait_for(&mut rx, &mut seen, |e| e.snapshot().is_some()).await;
    let snapshot = event.snapshot().unwrap();
    assert!((fraction(snapshot, 0) - 1.0).abs() < f64::EPSILON);
    assert_eq!(snapshot.packages[0].glyph, Glyph::Success);
    assert!(fraction(snapshot, 1).abs() < f64::EPSILON);
    assert_eq!(snapshot.deploying_index(), Some(1));

    engine.open(1);
    let event = wait_for(&mut rx, &mut seen, |e| {
        matches!(e, CoordinatorEvent::Finished { .. })
    })
    .await;
    let summary = event.snapshot().unwrap();
    assert!(summary.done);
    assert_eq!(summary.completed(), 2);
    assert!(summary.packages.iter().all(|p| p.glyph == Glyph::Success));

    let outcome = run.await.unwrap();
    assert_eq!(outcome, RunOutcome::Finished);
    assert_eq!(outcome.exit_code(), 0);
    assert!(!engine.cleared.load(Ordering::SeqCst));
    assert_monotonic(&seen);
}

#[tokio::test]
async fn test_engine_failure_aborts_run() {
    let engine = Arc::new(ScriptedEngine::new(2, Ending::FailOn(1)));
    let prober = Arc::new(ScriptedProber::default());
    let coordinator = coordinator(
        engine.clone(),
        prober.clone(),
        &[("podinfo", 2), ("nginx", 2)],
        true,
    )
    .await;
    let mut rx = coordinator.subscribe();
    let run = tokio::spawn(coordinator.run());
    let mut seen = Vec::new();

    engine.open(0);
    wait_for(&mut rx, &mut seen, |e| {
        matches!(e, CoordinatorEvent::PackageCompleted { index: 0, .. })
    })
    .await;
    prober.set("nginx", 1);
    engine.open(1);

    // output of the failing package is published ahead of the abort
    let event = wait_for(&mut rx, &mut seen, |e| {
        matches!(e, CoordinatorEvent::PackageOutput { package, .. } if package == "nginx")
            || matches!(e, CoordinatorEvent::FatalAborted { .. })
    })
    .await;
    assert!(matches!(
        event,
        CoordinatorEvent::PackageOutput { ref line, .. } if line == "installing nginx"
    ));

    let event = wait_for(&mut rx, &mut seen, |e| {
        matches!(e, CoordinatorEvent::FatalAborted { .. })
    })
    .await;
    let CoordinatorEvent::FatalAborted {
        snapshot,
        package,
        error,
    } = event
    else {
        unreachable!();
    };
    assert_eq!(package.as_deref(), Some("nginx"));
    assert!(error.contains("chart install failed"));
    assert!(snapshot.done);
    assert_eq!(snapshot.packages[0].glyph, Glyph::Success);
    assert_eq!(snapshot.packages[1].glyph, Glyph::Failure);
    assert_eq!(snapshot.packages[1].state, PackageState::Failed);

    // the failure frame is published before the grace pause
    let frames_before: Vec<_> = seen.iter().filter(|s| s.done).collect();
    assert!(frames_before.len() >= 2);

    let outcome = tokio::time::timeout(WAIT, run).await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::FatalAborted(DeployError::PackageFailed { .. })
    ));
    assert_ne!(outcome.exit_code(), 0);
    assert!(engine.cleared.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_engine_panic_is_fatal() {
    let engine = Arc::new(ScriptedEngine::new(1, Ending::PanicOn(0)));
    let coordinator = coordinator(
        engine.clone(),
        Arc::new(ScriptedProber::default()),
        &[("podinfo", 1)],
        true,
    )
    .await;
    let mut rx = coordinator.subscribe();
    let run = tokio::spawn(coordinator.run());

    engine.open(0);
    let event = wait_for(&mut rx, &mut Vec::new(), |e| {
        matches!(e, CoordinatorEvent::FatalAborted { .. })
    })
    .await;
    assert_eq!(
        event.snapshot().unwrap().packages[0].glyph,
        Glyph::Failure
    );

    let outcome = run.await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::FatalAborted(DeployError::Panicked("engine exploded".to_string()))
    );
    assert!(engine.cleared.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_decline_deploys_nothing() {
    let engine = Arc::new(ScriptedEngine::new(1, Ending::Succeed));
    let coordinator = coordinator(
        engine.clone(),
        Arc::new(ScriptedProber::default()),
        &[("podinfo", 1)],
        false,
    )
    .await;
    let input = coordinator.input_sender().unwrap();
    let mut rx = coordinator.subscribe();
    let run = tokio::spawn(coordinator.run());

    input.send(OperatorInput::Decline).await.unwrap();
    let event = wait_for(&mut rx, &mut Vec::new(), CoordinatorEvent::is_terminal).await;
    assert!(matches!(event, CoordinatorEvent::Cancelled { ref reason } if reason == "declined"));

    let outcome = run.await.unwrap();
    assert_eq!(outcome, RunOutcome::Declined);
    assert_eq!(outcome.exit_code(), 0);
    assert!(!engine.deployed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_quit_before_confirmation() {
    let engine = Arc::new(ScriptedEngine::new(1, Ending::Succeed));
    let coordinator = coordinator(
        engine.clone(),
        Arc::new(ScriptedProber::default()),
        &[("podinfo", 1)],
        false,
    )
    .await;
    let input = coordinator.input_sender().unwrap();
    let run = tokio::spawn(coordinator.run());

    input.send(OperatorInput::Quit).await.unwrap();
    let outcome = tokio::time::timeout(WAIT, run).await.unwrap().unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(outcome.exit_code(), 130);
    assert!(!engine.deployed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_dropped_input_counts_as_quit() {
    let coordinator = coordinator(
        Arc::new(ScriptedEngine::new(1, Ending::Succeed)),
        Arc::new(ScriptedProber::default()),
        &[("podinfo", 1)],
        false,
    )
    .await;

    let outcome = tokio::time::timeout(WAIT, coordinator.run())
        .await
        .unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
}

#[tokio::test]
async fn test_quit_while_running() {
    let engine = Arc::new(ScriptedEngine::new(1, Ending::Succeed));
    let coordinator = coordinator(
        engine.clone(),
        Arc::new(ScriptedProber::default()),
        &[("podinfo", 1)],
        true,
    )
    .await;
    let input = coordinator.input_sender().unwrap();
    let mut rx = coordinator.subscribe();
    let run = tokio::spawn(coordinator.run());

    wait_for(&mut rx, &mut Vec::new(), |e| e.snapshot().is_some()).await;
    input.send(OperatorInput::Quit).await.unwrap();

    // the engine never finishes; quit must not wait for it
    let outcome = tokio::time::timeout(WAIT, run).await.unwrap().unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(!engine.cleared.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_confirm_then_bundle_complete() {
    let mut engine = ScriptedEngine::new(2, Ending::Succeed);
    engine.report_packages = false;
    let engine = Arc::new(engine);
    let coordinator = coordinator(
        engine.clone(),
        Arc::new(ScriptedProber::default()),
        &[("podinfo", 1), ("nginx", 1)],
        false,
    )
    .await;
    let input = coordinator.input_sender().unwrap();
    let mut rx = coordinator.subscribe();
    let run = tokio::spawn(coordinator.run());

    input.send(OperatorInput::Confirm).await.unwrap();
    let event = wait_for(&mut rx, &mut Vec::new(), |e| {
        matches!(e, CoordinatorEvent::Started { .. })
    })
    .await;
    assert!(matches!(event, CoordinatorEvent::Started { packages: 2, .. }));

    engine.open_all();
    let event = wait_for(&mut rx, &mut Vec::new(), |e| {
        matches!(e, CoordinatorEvent::Finished { .. })
    })
    .await;
    let summary = event.snapshot().unwrap();
    assert!(summary
        .packages
        .iter()
        .all(|p| p.state == PackageState::Complete && (p.fraction - 1.0).abs() < f64::EPSILON));

    assert_eq!(run.await.unwrap(), RunOutcome::Finished);
}

#[tokio::test]
async fn test_upgrade_progress_restarts_at_zero() {
    let engine = Arc::new(ScriptedEngine::new(1, Ending::Succeed));
    let prober = Arc::new(ScriptedProber::default());
    prober.set("podinfo", 3);

    let coordinator = coordinator(engine.clone(), prober.clone(), &[("podinfo", 3)], true).await;
    assert!(coordinator.tracker().status(0).unwrap().reset_in_progress);
    let mut rx = coordinator.subscribe();
    let run = tokio::spawn(coordinator.run());
    let mut seen = Vec::new();

    // the old record still shows 3 units; nothing renders yet
    for _ in 0..20 {
        let event = wait_for(&mut rx, &mut seen, |e| e.snapshot().is_some()).await;
        assert!(fraction(event.snapshot().unwrap(), 0).abs() < f64::EPSILON);
    }

    prober.set("podinfo", 0);
    prober.set("podinfo", 2);
    for _ in 0..20 {
        let event = wait_for(&mut rx, &mut seen, |e| e.snapshot().is_some()).await;
        assert!(fraction(event.snapshot().unwrap(), 0).abs() < f64::EPSILON);
    }

    prober.set("podinfo", FRESH_START_UNITS);
    wait_for(
        &mut rx,
        &mut seen,
        snapshot_where(|s| (fraction(s, 0) - 1.0 / 3.0).abs() < f64::EPSILON),
    )
    .await;

    prober.set("podinfo", 2);
    wait_for(
        &mut rx,
        &mut seen,
        snapshot_where(|s| (fraction(s, 0) - 2.0 / 3.0).abs() < f64::EPSILON),
    )
    .await;

    engine.open(0);
    wait_for(&mut rx, &mut seen, |e| {
        matches!(e, CoordinatorEvent::Finished { .. })
    })
    .await;
    assert_eq!(run.await.unwrap(), RunOutcome::Finished);
    assert_monotonic(&seen);
}

#[tokio::test]
async fn test_hanging_prober_does_not_stall_ticks() {
    let engine = Arc::new(ScriptedEngine::new(1, Ending::Succeed));
    let coordinator = coordinator(engine.clone(), Arc::new(HangingProber), &[("podinfo", 1)], true).await;
    let mut rx = coordinator.subscribe();
    let run = tokio::spawn(coordinator.run());

    let mut ticks = Vec::new();
    for _ in 0..10 {
        let event = wait_for(&mut rx, &mut Vec::new(), |e| e.snapshot().is_some()).await;
        ticks.push(event.snapshot().unwrap().tick);
    }
    assert!(ticks.windows(2).all(|w| w[1] > w[0]));

    engine.open(0);
    let outcome = tokio::time::timeout(WAIT, run).await.unwrap().unwrap();
    assert_eq!(outcome, RunOutcome::Finished);
}

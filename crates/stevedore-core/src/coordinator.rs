//! Deployment coordinator
//!
//! Owns every package status of a run. A single update loop, driven by a
//! fixed tick, folds in completion signals and probe results and publishes a
//! snapshot per tick. The deploy engine runs on one background task that
//! talks to the loop only through two channels: completions and a fatal
//! error.

use std::any::Any;
use std::sync::Arc;

use stevedore_api::{CoordinatorEvent, OperatorInput, RunPhase};
use stevedore_pkg::Package;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::engine::{DeployEngine, DeployReporter, DeploySignal};
use crate::error::{CoreError, DeployError, ProbeError};
use crate::progress::ProgressTracker;
use crate::prober::Prober;
use crate::state::{Bundle, ObservedState};

/// Exit status of a run interrupted by the operator
const EXIT_CANCELLED: i32 = 130;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every package deployed
    Finished,
    /// The deploy engine failed
    FatalAborted(DeployError),
    /// The operator declined before anything was deployed
    Declined,
    /// The operator quit
    Cancelled,
}

impl RunOutcome {
    /// Process exit code for this outcome
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Finished | RunOutcome::Declined => 0,
            RunOutcome::FatalAborted(_) => 1,
            RunOutcome::Cancelled => EXIT_CANCELLED,
        }
    }
}

/// Arguments for creating a [`Coordinator`]
pub struct CoordinatorArgs {
    /// Bundle name shown in snapshots
    pub bundle: String,
    /// Engine that performs the deployment
    pub engine: Arc<dyn DeployEngine>,
    /// Cluster state lookup
    pub prober: Arc<dyn Prober>,
    /// Loop timing
    pub config: CoordinatorConfig,
    /// Skip the confirmation prompt
    pub confirmed: bool,
    /// Event broadcast channel capacity
    pub event_channel_capacity: usize,
}

impl CoordinatorArgs {
    /// Arguments with the default timing and channel size
    pub fn new(
        bundle: impl Into<String>,
        engine: Arc<dyn DeployEngine>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        Self {
            bundle: bundle.into(),
            engine,
            prober,
            config: CoordinatorConfig::default(),
            confirmed: false,
            event_channel_capacity: 1024,
        }
    }
}

/// Drives one bundle run from confirmation to a terminal phase
pub struct Coordinator {
    bundle: Bundle,
    tracker: ProgressTracker,
    engine: Arc<dyn DeployEngine>,
    prober: Arc<dyn Prober>,
    config: CoordinatorConfig,
    confirmed: bool,
    phase: RunPhase,
    tick: u64,
    event_tx: broadcast::Sender<CoordinatorEvent>,
    input_tx: Option<mpsc::Sender<OperatorInput>>,
    input_rx: mpsc::Receiver<OperatorInput>,
}

impl Coordinator {
    #[must_use]
    pub fn new(args: CoordinatorArgs) -> Self {
        let (event_tx, _) = broadcast::channel(args.event_channel_capacity.max(1));
        let (input_tx, input_rx) = mpsc::channel(16);

        Self {
            bundle: Bundle::new(args.bundle),
            tracker: ProgressTracker::new(),
            engine: args.engine,
            prober: args.prober,
            config: args.config,
            confirmed: args.confirmed,
            phase: RunPhase::AwaitingConfirmation,
            tick: 0,
            event_tx,
            input_tx: Some(input_tx),
            input_rx,
        }
    }

    /// Subscribe to coordinator events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.event_tx.subscribe()
    }

    /// Channel for operator decisions
    ///
    /// Senders must be obtained before [`run`](Self::run) is called.
    #[must_use]
    pub fn input_sender(&self) -> Option<mpsc::Sender<OperatorInput>> {
        self.input_tx.clone()
    }

    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    #[must_use]
    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Add the next package in deployment order
    ///
    /// The cluster is probed once: an existing deployment record means this
    /// run is an upgrade, and progress stays at zero until the cluster shows
    /// the upgrade restarting.
    ///
    /// # Errors
    /// Returns an error if the package is out of order or its name repeats.
    pub async fn register(&mut self, package: Package) -> Result<(), CoreError> {
        let expected = self.bundle.packages.len();
        if package.index != expected {
            return Err(CoreError::OutOfOrder {
                name: package.name,
                expected,
                index: package.index,
            });
        }
        if self.bundle.packages.iter().any(|p| p.name == package.name) {
            return Err(CoreError::DuplicatePackage(package.name));
        }

        let reset = matches!(
            probe_once(self.prober.clone(), package.name.clone(), &self.config).await,
            Some(observed) if observed.deployed_units > 0
        );
        info!(
            package = %package.name,
            components = package.total_components,
            upgrade = reset,
            "registered package"
        );

        self.tracker
            .register(package.name.clone(), package.total_components, reset);
        self.bundle.packages.push(package);
        Ok(())
    }

    /// Run to a terminal phase
    pub async fn run(mut self) -> RunOutcome {
        // only senders handed out so far keep the input channel open
        self.input_tx = None;

        if !self.confirmed {
            match self.await_confirmation().await {
                OperatorInput::Confirm => {}
                OperatorInput::Decline => {
                    info!("deployment declined");
                    self.emit(CoordinatorEvent::Cancelled {
                        reason: "declined".to_string(),
                    });
                    return RunOutcome::Declined;
                }
                OperatorInput::Quit => {
                    info!("quit before deployment");
                    self.emit(CoordinatorEvent::Cancelled {
                        reason: "quit".to_string(),
                    });
                    return RunOutcome::Cancelled;
                }
            }
        }

        self.running().await
    }

    /// Wait for the operator; a closed input channel counts as quit
    async fn await_confirmation(&mut self) -> OperatorInput {
        self.input_rx.recv().await.unwrap_or(OperatorInput::Quit)
    }

    async fn running(mut self) -> RunOutcome {
        self.phase = RunPhase::Running;
        self.tracker.begin();
        info!(bundle = %self.bundle.name, packages = self.tracker.len(), "deployment started");
        self.emit(CoordinatorEvent::Started {
            bundle: self.bundle.name.clone(),
            packages: self.tracker.len(),
        });

        let (reporter, mut signal_rx) = DeployReporter::channel();
        let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
        let _deploy = spawn_deploy(self.engine.clone(), self.bundle.clone(), reporter, fatal_tx);

        let (probe_tx, mut probe_rx) = mpsc::unbounded_channel();
        let mut in_flight = vec![false; self.tracker.len()];

        let mut interval = tokio::time::interval(self.config.tick());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut input_open = true;

        loop {
            match fatal_rx.try_recv() {
                Ok(err) => {
                    self.forward_output(&mut signal_rx);
                    return self.abort(err).await;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            }

            tokio::select! {
                biased;

                input = self.input_rx.recv(), if input_open => match input {
                    Some(OperatorInput::Quit) => {
                        warn!("operator quit; leaving the deploy task behind");
                        self.emit(CoordinatorEvent::Cancelled {
                            reason: "quit".to_string(),
                        });
                        return RunOutcome::Cancelled;
                    }
                    Some(other) => debug!(input = ?other, "ignoring input while running"),
                    None => input_open = false,
                },

                _ = interval.tick() => {
                    self.tick += 1;
                    self.drain_signals(&mut signal_rx);

                    while let Ok((index, observed)) = probe_rx.try_recv() {
                        if let Some(flag) = in_flight.get_mut(index) {
                            *flag = false;
                        }
                        self.tracker.apply_probe(index, observed);
                    }

                    if self.tracker.all_complete() {
                        // a failure reported after the last completion still wins
                        if let Ok(err) = fatal_rx.try_recv() {
                            self.forward_output(&mut signal_rx);
                            return self.abort(err).await;
                        }
                        return self.finish().await;
                    }

                    self.dispatch_probes(&probe_tx, &mut in_flight);
                    let snapshot = self.tracker.snapshot(&self.bundle.name, false, self.tick);
                    self.emit(CoordinatorEvent::Snapshot { snapshot });
                }
            }
        }
    }

    fn drain_signals(&mut self, rx: &mut mpsc::UnboundedReceiver<DeploySignal>) {
        while let Ok(signal) = rx.try_recv() {
            let completed = match signal {
                DeploySignal::PackageComplete(index) => self.tracker.mark_complete(index),
                DeploySignal::BundleComplete => self.tracker.mark_all_complete(),
                DeploySignal::Output { index, line } => {
                    self.emit_output(index, line);
                    continue;
                }
            };
            for index in completed {
                let Some(package) = self.bundle.package(index) else {
                    continue;
                };
                info!(package = %package.name, index, "package complete");
                self.emit(CoordinatorEvent::PackageCompleted {
                    package: package.name.clone(),
                    index,
                });
            }
        }
    }

    /// Emit pending deploy output before a fatal abort; completions are dropped
    fn forward_output(&self, rx: &mut mpsc::UnboundedReceiver<DeploySignal>) {
        while let Ok(signal) = rx.try_recv() {
            if let DeploySignal::Output { index, line } = signal {
                self.emit_output(index, line);
            }
        }
    }

    fn emit_output(&self, index: usize, line: String) {
        let Some(package) = self.bundle.package(index) else {
            return;
        };
        debug!(package = %package.name, %line, "deploy output");
        self.emit(CoordinatorEvent::PackageOutput {
            package: package.name.clone(),
            line,
        });
    }

    /// Start a probe for every eligible package without one in flight
    fn dispatch_probes(
        &self,
        tx: &mpsc::UnboundedSender<(usize, Option<ObservedState>)>,
        in_flight: &mut [bool],
    ) {
        for index in self.tracker.eligible() {
            let Some(flag) = in_flight.get_mut(index) else {
                continue;
            };
            if *flag {
                continue;
            }
            let Some(package) = self.bundle.package(index) else {
                continue;
            };

            *flag = true;
            let prober = self.prober.clone();
            let name = package.name.clone();
            let config = self.config.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let observed = probe_once(prober, name, &config).await;
                let _ = tx.send((index, observed));
            });
        }
    }

    async fn abort(mut self, err: DeployError) -> RunOutcome {
        self.phase = RunPhase::FatalAborted;
        let failed = self.tracker.fail_current();
        let package = err
            .package()
            .map(ToString::to_string)
            .or_else(|| failed.and_then(|i| self.bundle.package(i)).map(|p| p.name.clone()));
        error!(error = %err, package = ?package, "deployment aborted");

        let snapshot = self.tracker.snapshot(&self.bundle.name, true, self.tick);
        self.emit(CoordinatorEvent::Snapshot {
            snapshot: snapshot.clone(),
        });
        tokio::time::sleep(self.config.grace()).await;

        self.emit(CoordinatorEvent::FatalAborted {
            snapshot,
            package,
            error: err.to_string(),
        });
        RunOutcome::FatalAborted(err)
    }

    async fn finish(mut self) -> RunOutcome {
        self.phase = RunPhase::Finished;
        info!(bundle = %self.bundle.name, "deployment finished");

        let snapshot = self.tracker.snapshot(&self.bundle.name, true, self.tick);
        self.emit(CoordinatorEvent::Snapshot {
            snapshot: snapshot.clone(),
        });
        tokio::time::sleep(self.config.grace()).await;

        self.emit(CoordinatorEvent::Finished { snapshot });
        RunOutcome::Finished
    }

    fn emit(&self, event: CoordinatorEvent) {
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

/// Probe with a timeout; any failure reads as "nothing observed"
async fn probe_once(
    prober: Arc<dyn Prober>,
    package: String,
    config: &CoordinatorConfig,
) -> Option<ObservedState> {
    match tokio::time::timeout(config.probe_timeout(), prober.probe(&package)).await {
        Ok(Ok(observed)) => Some(observed),
        Ok(Err(ProbeError::NotFound(_))) => None,
        Ok(Err(e)) => {
            debug!(package = %package, error = %e, "probe failed");
            None
        }
        Err(_) => {
            debug!(package = %package, "probe timed out");
            None
        }
    }
}

/// Run the engine on its own task
///
/// A panic inside the engine is caught at the inner task boundary and
/// delivered like any other deploy error.
fn spawn_deploy(
    engine: Arc<dyn DeployEngine>,
    bundle: Bundle,
    reporter: DeployReporter,
    fatal_tx: mpsc::Sender<DeployError>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let task_engine = engine.clone();
        let task_reporter = reporter.clone();
        let joined =
            tokio::spawn(async move { task_engine.deploy(&bundle, &task_reporter).await }).await;

        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(DeployError::Panicked(panic_message(&*e.into_panic()))),
            Err(e) => Err(DeployError::Engine(e.to_string())),
        };

        match result {
            Ok(()) => reporter.bundle_complete(),
            Err(err) => {
                engine.clear_paths();
                let _ = fatal_tx.send(err).await;
            }
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

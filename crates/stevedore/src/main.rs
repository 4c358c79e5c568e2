//! stevedore
//!
//! Deploys an ordered bundle of cluster packages and shows live progress in
//! the terminal.

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use stevedore_api::CoordinatorEvent;
use stevedore_core::{CommandEngine, Coordinator, CoordinatorArgs, KubectlProber, RunOutcome};
use stevedore_exec::{CommandExecutor, LocalExecutor};
use stevedore_oci::RegistryClient;
use stevedore_pkg::{BundleResolver, ContentStore, FetcherConfig, Package};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod action;
mod app;
mod config;
mod event;
mod theme;
mod ui;

use action::Action;
use app::{App, PackageRow};
use config::Config;
use event::EventHandler;

/// Animation rate of the terminal UI
const UI_TICK: Duration = Duration::from_millis(100);

/// Bundle deployer with live progress
#[derive(Parser, Debug)]
#[command(name = "stevedore", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Deploy without asking for confirmation
    #[arg(long)]
    confirm: bool,

    /// Progress update interval in milliseconds
    #[arg(long)]
    tick_rate: Option<u64>,

    /// Architecture to select from multi-platform packages
    #[arg(long)]
    arch: Option<String>,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable debug logging (to stevedore.log unless --log-file is given)
    #[arg(long)]
    debug: bool,
}

type Tui = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    init_logging(&args, &config)?;
    info!(bundle = %config.bundle.name, packages = config.bundle.packages.len(), "starting");

    let staging = tempfile::Builder::new().prefix("stevedore-").tempdir()?;
    let packages = resolve_bundle(&config, staging.path().to_path_buf()).await?;

    let rows = config
        .bundle
        .packages
        .iter()
        .zip(&packages)
        .map(|(spec, package)| -> Result<PackageRow> {
            Ok(PackageRow {
                name: package.name.clone(),
                source: spec.source()?.to_string(),
                components: package.total_components,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut local = LocalExecutor::new();
    if let Some(kubeconfig) = &config.cluster.kubeconfig {
        let kubeconfig = config::expand_home(kubeconfig);
        local = local.with_env("KUBECONFIG", kubeconfig.to_string_lossy());
    }
    let executor: Arc<dyn CommandExecutor> = Arc::new(local);
    let prober = Arc::new(KubectlProber::new(
        executor.clone(),
        config.cluster.clone(),
        config.coordinator.probe_timeout(),
    ));
    let engine = Arc::new(
        CommandEngine::new(executor, config.deploy.command.clone(), config.deploy.timeout())
            .with_staging_dir(staging.path()),
    );

    let mut coordinator_args = CoordinatorArgs::new(config.bundle.name.clone(), engine, prober);
    coordinator_args.config = config.coordinator.clone();
    coordinator_args.confirmed = args.confirm;
    let mut coordinator = Coordinator::new(coordinator_args);
    for package in packages {
        coordinator.register(package).await?;
    }

    let events = coordinator.subscribe();
    let mut app = App::new(
        config.bundle.name.clone(),
        rows,
        coordinator.input_sender(),
        args.confirm,
    );
    let handle = tokio::spawn(coordinator.run());

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, events).await;
    restore_terminal(&mut terminal)?;
    drop(app);

    if let Err(err) = result {
        handle.abort();
        return Err(err);
    }

    let outcome = handle.await?;
    print_summary(&config.bundle.name, &outcome);

    // process::exit skips destructors; a failed run already cleared it
    match staging.close() {
        Err(e) if e.kind() != io::ErrorKind::NotFound => {
            warn!(error = %e, "failed to remove staging directory");
        }
        _ => {}
    }
    std::process::exit(outcome.exit_code());
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(tick_rate) = args.tick_rate {
        config.coordinator.tick_ms = tick_rate;
    }
    if let Some(arch) = &args.arch {
        config.fetch.architecture = Some(arch.clone());
    }
    if args.debug {
        config.log.level = "debug".to_string();
    }
}

/// Log to a file; the terminal belongs to the UI
fn init_logging(args: &Args, config: &Config) -> Result<()> {
    let path = match (&args.log_file, args.debug) {
        (Some(path), _) => path.clone(),
        (None, true) => PathBuf::from("stevedore.log"),
        (None, false) => return Ok(()),
    };

    let file = std::fs::File::create(&path)?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .init();
    Ok(())
}

/// Fetch and stage every package before the UI starts
async fn resolve_bundle(config: &Config, staging_dir: PathBuf) -> Result<Vec<Package>> {
    let cache_path = config.fetch.cache_path();
    let store = Arc::new(ContentStore::open(&cache_path)?);
    let registry = Arc::new(RegistryClient::new().plain_http(config.fetch.plain_http));
    let fetcher_config = FetcherConfig {
        store,
        registry,
        platform: config.fetch.platform(),
    };
    debug!(?fetcher_config, "resolving bundle");

    let resolver = BundleResolver::new(fetcher_config, staging_dir);
    let mut packages = Vec::with_capacity(config.bundle.packages.len());
    for (index, spec) in config.bundle.packages.iter().enumerate() {
        eprintln!("Fetching {} ({})", spec.name, spec.source()?);
        let package = resolver.resolve_package(index, spec).await.map_err(|e| {
            error!(package = %spec.name, error = %e, "fetch failed");
            e
        })?;
        packages.push(package);
    }
    Ok(packages)
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Run the application main loop until the run reaches a terminal event
async fn run_app(
    terminal: &mut Tui,
    app: &mut App,
    mut coordinator_events: broadcast::Receiver<CoordinatorEvent>,
) -> Result<()> {
    let mut events = EventHandler::new(UI_TICK);
    events.start();

    terminal.draw(|frame| ui::render(frame, app))?;

    loop {
        let mut redraw = false;

        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                let action = match event {
                    event::Event::Key(key) => event::key_to_action(key),
                    event::Event::Resize(_, _) => Action::Render,
                    event::Event::Tick => Action::Tick,
                };
                app.handle_action(action);
                redraw = true;
            }
            event = coordinator_events.recv() => match event {
                Ok(event) => {
                    redraw = event.is_terminal();
                    app.handle_coordinator_event(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "UI lagged behind coordinator events");
                }
                Err(broadcast::error::RecvError::Closed) => app.quit(),
            },
        }

        if redraw || app.should_quit() {
            terminal.draw(|frame| ui::render(frame, app))?;
        }
        if app.should_quit() {
            break;
        }
    }

    Ok(())
}

fn print_summary(bundle: &str, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Finished => eprintln!("Bundle {bundle} deployed"),
        RunOutcome::FatalAborted(err) => eprintln!("Bundle {bundle} failed: {err}"),
        RunOutcome::Declined => eprintln!("Deployment of {bundle} cancelled"),
        RunOutcome::Cancelled => eprintln!("Deployment of {bundle} interrupted"),
    }
}

//! Booster CLI

use bgt_booster::{
    api,
    chain::{self, Gateway, Rpc},
    config::{self, Config},
    http,
    orchestrator::{self, Orchestrator, Trigger},
    scheduler::Scheduler,
    signer::{self, Infisical, Local, Provider, Remote},
    store::{self, File},
    telemetry,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use prometheus_client::registry::Registry;
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};
use thiserror::Error;
use tracing::{error, info};

/// Returns the version of the crate.
pub const fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Flag for verbose output
const VERBOSE_FLAG: &str = "verbose";

/// Flag for JSON output
const JSON_FLAG: &str = "json";

const RUN_CMD: &str = "run";
const TICK_CMD: &str = "tick";
const PLAN_CMD: &str = "plan";

#[derive(Debug, Error)]
enum Error {
    #[error("config error: {0}")]
    Config(#[from] config::Error),
    #[error("chain error: {0}")]
    Chain(#[from] chain::Error),
    #[error("signer error: {0}")]
    Signer(#[from] signer::Error),
    #[error("store error: {0}")]
    Store(#[from] store::Error),
    #[error("tick failed: {0}")]
    Tick(#[from] orchestrator::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid cors origin: {0}")]
    Cors(#[from] axum::http::header::InvalidHeaderValue),
}

type Booster = Orchestrator<Rpc, File, Provider>;

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .required(true)
        .help("Path to YAML config file")
        .value_parser(clap::value_parser!(PathBuf))
}

/// Entrypoint for the Booster CLI
#[tokio::main]
async fn main() -> ExitCode {
    // Define application
    let matches = Command::new("booster")
        .version(crate_version())
        .about("Queue and activate validator boosts against the BGT contract.")
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(JSON_FLAG)
                .long(JSON_FLAG)
                .global(true)
                .help("Emit logs as JSON")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new(RUN_CMD)
                .about("Tick on the configured schedule and serve the admin API.")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new(TICK_CMD)
                .about("Run a single tick and exit.")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new(PLAN_CMD)
                .about("Print what a tick would do without sending anything.")
                .arg(config_arg()),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag(VERBOSE_FLAG) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    if let Err(e) = telemetry::init(level, matches.get_flag(JSON_FLAG)) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    // Parse subcommands
    let result = match matches.subcommand() {
        Some((RUN_CMD, matches)) => run(config_path(matches)).await,
        Some((TICK_CMD, matches)) => tick(config_path(matches)).await,
        Some((PLAN_CMD, matches)) => plan(config_path(matches)).await,
        Some((cmd, _)) => {
            error!(cmd, "invalid subcommand");
            return ExitCode::FAILURE;
        }
        None => {
            error!("no subcommand provided");
            return ExitCode::FAILURE;
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error=?e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn config_path(matches: &ArgMatches) -> &Path {
    // `config` is required on every subcommand
    matches
        .get_one::<PathBuf>("config")
        .map(PathBuf::as_path)
        .unwrap_or_else(|| Path::new(""))
}

async fn build(config: &Config, registry: &mut Registry) -> Result<(Booster, File), Error> {
    let gateway = Gateway::new(Rpc::new(&config.rpc_url)?, config.gateway()?);
    let store = File::open(&config.store).await?;
    let http = http::Client::new(config.retry.clone());
    let provider = match &config.signer {
        config::Signer::Remote { url } => Provider::Remote(Remote::new(http, url.clone())),
        config::Signer::Local(settings) => {
            Provider::Local(Local::new(Infisical::connect(http, settings.clone()).await?))
        }
    };
    let orchestrator = Orchestrator::new(gateway, store.clone(), provider, registry);
    Ok((orchestrator, store))
}

async fn shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error=?e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn run(path: &Path) -> Result<(), Error> {
    let config = Config::load(path)?;
    let schedule = config.schedule()?;
    let mut registry = Registry::default();
    let (orchestrator, store) = build(&config, &mut registry).await?;
    let orchestrator = Arc::new(orchestrator);
    let registry = Arc::new(registry);

    if let Some(settings) = &config.api {
        let trigger: Arc<dyn Trigger> = orchestrator.clone();
        let context = api::Context::new(store, trigger, registry, &settings.key);
        let mut router = api::router(context);
        if let Some(cors) = api::cors(&settings.cors_origins)? {
            router = router.layer(cors);
        }
        let listener = tokio::net::TcpListener::bind(settings.listen).await?;
        tokio::spawn(async move {
            if let Err(e) = api::serve(listener, router, shutdown()).await {
                error!(error=?e, "admin api stopped");
            }
        });
    }

    info!(schedule = %config.schedule, "starting scheduler");
    let completed = Scheduler::new(orchestrator, schedule)
        .run(shutdown())
        .await?;
    info!(completed, "shutting down");
    Ok(())
}

async fn tick(path: &Path) -> Result<(), Error> {
    let config = Config::load(path)?;
    let mut registry = Registry::default();
    let (orchestrator, _) = build(&config, &mut registry).await?;
    let report = orchestrator.run_tick().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn plan(path: &Path) -> Result<(), Error> {
    let config = Config::load(path)?;
    let mut registry = Registry::default();
    let (orchestrator, _) = build(&config, &mut registry).await?;
    let plans = orchestrator.plan().await?;
    println!("{}", serde_json::to_string_pretty(&plans)?);
    Ok(())
}

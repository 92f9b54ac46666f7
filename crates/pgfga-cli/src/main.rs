//! Reconciles a PostgreSQL cluster with a desired-state document.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, info_span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pgfga::{load_document, Document, Orchestrator, PgConnector, Planner};

#[derive(Parser)]
#[command(name = "pgfga", version)]
#[command(about = "Reconcile PostgreSQL roles, grants, databases and LDAP group memberships", long_about = None)]
struct Cli {
    /// Desired-state document
    #[arg(short, long, env = "PGFGACONFIG", default_value = "/etc/pgfga/config.yaml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print the merged plan as JSON and exit
    #[arg(long)]
    print_plan: bool,

    /// Only create and alter, never drop or revoke
    #[arg(long)]
    no_prune: bool,
}

fn init_tracing(document: &Document, debug: bool) {
    let level = if debug || document.general.debug {
        "debug"
    } else {
        document.general.tracing_level()
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

async fn run(cli: &Cli, document: Document) -> pgfga::Result<()> {
    if !document.general.run_delay.is_zero() {
        info!(delay = ?document.general.run_delay, "Delaying run");
        tokio::time::sleep(document.general.run_delay).await;
    }

    let registry = Planner::from_document(&document, info_span!("plan"))
        .registry()
        .await?;

    if cli.print_plan {
        let plan =
            serde_json::to_string_pretty(&registry).map_err(pgfga::ConfigError::ParseJson)?;
        println!("{}", plan);
        return Ok(());
    }

    info!(dsn = %document.postgresql_dsn, "Connecting");
    let connector = PgConnector::new(document.postgresql_dsn.clone());
    let mut orchestrator = Orchestrator::new(
        registry,
        document.strict,
        document.conventions.clone(),
        connector,
        info_span!("reconcile"),
    );

    if cli.no_prune {
        orchestrator.converge().await?;
    } else {
        orchestrator.reconcile().await?;
    }
    orchestrator.cluster_mut().close().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let document = match load_document(&cli.config) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("pgfga: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&document, cli.debug);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "Starting pgfga"
    );

    match run(&cli, document).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(category = ?e.category(), "{}", e);
            ExitCode::FAILURE
        }
    }
}

//! gridscaled — hysteresis autoscaler daemon.
//!
//! Watches one scaling metric for a single orchestrator-managed app and
//! scales the app up or down when the metric stays out of bounds for a
//! configured number of polling cycles.
//!
//! # Usage
//!
//! ```text
//! gridscaled --master http://master.cluster:8080 --app shop-api \
//!     --trigger cpu --min-threshold 20 --max-threshold 80 --max-instances 10
//! ```
//!
//! Every flag has an environment-variable equivalent (`GS_*`); an explicit
//! flag wins over the environment. Credentials are environment-only:
//! `GS_UID` plus either `GS_PASSWORD` or `GS_SECRET` (a JSON blob carrying
//! a `private_key` PEM). With neither set, calls go out unauthenticated.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use gridscale_client::{AuthConfig, RemoteClient};
use gridscale_engine::{Band, ScalePolicy};
use gridscale_metrics::source_for;

mod run;

#[derive(Parser)]
#[command(
    name = "gridscaled",
    about = "Hysteresis autoscaler for an orchestrator-managed app",
    version,
)]
struct Cli {
    /// Control-plane address, including scheme, e.g. http://master:8080.
    #[arg(long, env = "GS_MASTER")]
    master: String,

    /// App to autoscale.
    #[arg(long, env = "GS_APP")]
    app: String,

    /// Scaling dimension to watch: cpu, memory or queue.
    #[arg(long, env = "GS_TRIGGER")]
    trigger: String,

    /// Lower bound of the healthy metric region.
    #[arg(long, env = "GS_MIN_THRESHOLD")]
    min_threshold: f64,

    /// Upper bound of the healthy metric region.
    #[arg(long, env = "GS_MAX_THRESHOLD")]
    max_threshold: f64,

    /// Ratio applied to the instance count per scaling action.
    #[arg(long, env = "GS_MULTIPLIER", default_value = "1.5")]
    multiplier: f64,

    /// Never scale below this many instances.
    #[arg(long, env = "GS_MIN_INSTANCES", default_value = "1")]
    min_instances: u32,

    /// Never scale above this many instances.
    #[arg(long, env = "GS_MAX_INSTANCES")]
    max_instances: u32,

    /// Consecutive above-max cycles required before scaling up.
    #[arg(long, env = "GS_SCALE_UP_FACTOR", default_value = "3")]
    scale_up_factor: u32,

    /// Consecutive below-min cycles required before scaling down.
    #[arg(long, env = "GS_COOL_DOWN_FACTOR", default_value = "4")]
    cool_down_factor: u32,

    /// Seconds between polling cycles; also the retry backoff.
    #[arg(long, env = "GS_INTERVAL", default_value = "10")]
    interval: u64,

    /// Where the fetched cluster CA bundle is cached.
    #[arg(long, env = "GS_CA_BUNDLE", default_value = "cluster-ca.crt")]
    ca_bundle: PathBuf,

    /// Log at debug level.
    #[arg(long, env = "GS_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage via clap, but exit 1 like every other fatal condition.
            let _ = e.print();
            std::process::exit(1);
        }
    };

    init_tracing(cli.verbose);

    if let Err(e) = run_daemon(cli).await {
        error!(error = %e, "fatal, shutting down");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.parse().unwrap()),
        )
        .init();
}

async fn run_daemon(cli: Cli) -> anyhow::Result<()> {
    if cli.multiplier <= 1.0 {
        anyhow::bail!("--multiplier must be greater than 1.0 (got {})", cli.multiplier);
    }
    if cli.min_instances > cli.max_instances {
        anyhow::bail!(
            "--min-instances {} exceeds --max-instances {}",
            cli.min_instances,
            cli.max_instances
        );
    }

    let auth = AuthConfig {
        uid: std::env::var("GS_UID").ok(),
        password: std::env::var("GS_PASSWORD").ok(),
        secret: std::env::var("GS_SECRET").ok(),
        ca_bundle: cli.ca_bundle.clone(),
    };

    let interval = Duration::from_secs(cli.interval);
    let mut client = RemoteClient::new(cli.master.clone(), interval, auth);
    client.authenticate().await?;

    let source = source_for(&cli.trigger, cli.min_threshold, cli.max_threshold)?;
    let band = Band {
        min: source.min(),
        max: source.max(),
        scale_up_factor: cli.scale_up_factor,
        cool_down_factor: cli.cool_down_factor,
    };
    let policy = ScalePolicy {
        multiplier: cli.multiplier,
        min_instances: cli.min_instances,
        max_instances: cli.max_instances,
    };

    // Coarse shutdown: ctrl-c flips the channel, the loop exits between
    // cycles with code 0.
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(true);
        }
    });

    info!(
        app = %cli.app,
        trigger = %cli.trigger,
        interval_secs = cli.interval,
        "gridscaled starting"
    );

    run::control_loop(
        &mut client,
        source.as_ref(),
        &cli.app,
        &band,
        &policy,
        interval,
        rx,
    )
    .await
}

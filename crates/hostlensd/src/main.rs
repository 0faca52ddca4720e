//! hostlensd - host metrics sampler and analytics daemon
//!
//! Samples CPU, memory and load averages into a local store and serves
//! forecast, anomaly and cluster analytics plus an HTML report over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args, Parser, Subcommand};
use hostlens_metrics::{read_sample, sample_once, seed_demo_if_needed, SeedConfig, SysinfoSource};
use hostlens_report::ReportGenerator;
use hostlensd::{open_store, AppState, DaemonConfig, DaemonServer};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hostlensd")]
#[command(about = "Host metrics sampler with forecast, anomaly and cluster analytics")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct Settings {
    /// Seconds between samples
    #[arg(long, env = "HOSTLENS_INTERVAL_SEC", default_value_t = 5, global = true)]
    interval_sec: u64,

    /// Default analysis window in minutes
    #[arg(long, env = "HOSTLENS_WINDOW_MINUTES", default_value_t = 60.0, global = true)]
    window_minutes: f64,

    /// Seed synthetic history when the store is nearly empty
    #[arg(
        long,
        env = "HOSTLENS_DEMO_SEED",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    demo_seed: bool,

    /// SQLite database file
    #[arg(long, env = "HOSTLENS_DB_PATH", default_value = "data/metrics.db", global = true)]
    db_path: PathBuf,

    /// Directory for the generated report
    #[arg(long, env = "HOSTLENS_REPORT_DIR", default_value = "report", global = true)]
    report_dir: PathBuf,

    /// Seconds between background report passes
    #[arg(long, env = "HOSTLENS_REPORT_INTERVAL_SEC", default_value_t = 60, global = true)]
    report_interval_sec: u64,

    /// Address for the HTTP API
    #[arg(long, env = "HOSTLENS_BIND", default_value = "0.0.0.0:8080", global = true)]
    bind: SocketAddr,

    /// Keep samples in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Origin allowed by CORS; repeat or comma-separate. Any origin when unset
    #[arg(
        long = "cors-origin",
        env = "HOSTLENS_CORS_ORIGINS",
        value_delimiter = ',',
        global = true
    )]
    cors_origins: Vec<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "HOSTLENS_JSON_LOGS", global = true)]
    json_logs: bool,
}

impl Settings {
    fn to_config(&self) -> DaemonConfig {
        let config = DaemonConfig::new(self.bind)
            .with_sample_interval(Duration::from_secs(self.interval_sec))
            .with_report_interval(Duration::from_secs(self.report_interval_sec))
            .with_window_minutes(self.window_minutes)
            .with_demo_seed(self.demo_seed)
            .with_db_path(self.db_path.clone())
            .with_report_dir(self.report_dir.clone())
            .with_ephemeral(self.ephemeral);
        self.cors_origins
            .iter()
            .fold(config, |config, origin| config.with_cors_origin(origin.as_str()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Run,

    /// Print one host reading as JSON
    Sample {
        /// Also write the reading to the store
        #[arg(long)]
        persist: bool,
    },

    /// Run one report pass and exit
    Report,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.settings.json_logs)?;

    let config = cli.settings.to_config();
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_daemon(config).await?,
        Commands::Sample { persist } => sample(&config, persist).await?,
        Commands::Report => report(&config).await?,
    }

    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("hostlensd=info".parse()?)
        .add_directive("hostlens_metrics=info".parse()?)
        .add_directive("hostlens_report=info".parse()?)
        .add_directive("hyper=warn".parse()?);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
    }
    Ok(())
}

async fn run_daemon(config: DaemonConfig) -> anyhow::Result<()> {
    info!(
        bind = %config.bind_addr,
        store = %config.store_label(),
        interval_sec = config.interval_secs(),
        window_minutes = config.window_minutes,
        "starting hostlensd"
    );

    let store = open_store(&config)?;
    let source = Arc::new(SysinfoSource::new());
    let addr = config.bind_addr;
    let server = DaemonServer::new(Arc::new(AppState::new(config, store, source)));

    server
        .serve_with_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received, shutting down");
        })
        .await?;
    Ok(())
}

async fn sample(config: &DaemonConfig, persist: bool) -> anyhow::Result<()> {
    let source = SysinfoSource::new();
    // CPU usage is a delta between two refreshes.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let reading = if persist {
        let store = open_store(config)?;
        sample_once(&source, store.as_ref())?
    } else {
        read_sample(&source, chrono::Utc::now())
    };
    println!("{}", serde_json::to_string_pretty(&reading)?);
    Ok(())
}

async fn report(config: &DaemonConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let demo_seed = config.demo_seed;
    let generator = ReportGenerator::new(Arc::clone(&store), config.report_config());

    let summary = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        if demo_seed {
            seed_demo_if_needed(store.as_ref(), &SeedConfig::default())?;
        }
        Ok(generator.generate()?)
    })
    .await??;

    info!(index = %summary.index.display(), samples = summary.sample_count, "report written");
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

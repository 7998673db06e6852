//! Custos agent CLI - device trust verification and lock enforcement.
//!
//! Runs the engine against the software platform layer for desktop
//! bring-up and diagnostics. Device-owner deployments embed `custos-core`
//! directly and provide their own platform implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use custos_core::{
    Collaborators, EngineConfig, FileStore, HttpBackendTransport, StateStore, StaticLoanLedger,
    TrustEngine,
};
use custos_platform::software::{
    SoftwareDeviceInfo, SoftwarePrivilegeController, SoftwareProtectionProbe,
};
use custos_platform::{DeviceInfoProvider, PrivilegeController};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Custos - device trust verification and lock enforcement agent.
#[derive(Parser)]
#[command(name = "custos-agent")]
#[command(version = VERSION)]
#[command(about = "Device trust verification and lock enforcement agent")]
struct Cli {
    /// Device identifier
    #[arg(long, default_value = "dev-0001")]
    device_id: String,

    /// State directory
    #[arg(long, default_value = ".custos")]
    state_dir: PathBuf,

    /// Backend base URL
    #[arg(long, default_value = "https://api.custos-security.io")]
    backend: String,

    /// Device API key
    #[arg(long)]
    api_key: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a snapshot and establish the enrollment baseline
    Enroll,

    /// Run a single verification cycle and print the result
    Check,

    /// Run the poll loop until interrupted
    Run {
        /// Poll interval in seconds
        #[arg(long, default_value = "60")]
        interval: u64,
    },

    /// Show lock state and verify the audit chain
    Info,
}

fn build_engine(cli: &Cli, config: EngineConfig) -> Result<TrustEngine, custos_core::EngineError> {
    let store: Arc<dyn StateStore> =
        Arc::new(FileStore::new(cli.state_dir.clone(), &cli.device_id));

    let transport = HttpBackendTransport::new(
        &config.backend_url,
        config.api_key.clone(),
        config.call_timeout,
    )?;

    TrustEngine::new(
        &cli.device_id,
        config,
        Collaborators {
            store,
            info: Arc::new(SoftwareDeviceInfo::new()) as Arc<dyn DeviceInfoProvider>,
            privileges: Arc::new(SoftwarePrivilegeController::new())
                as Arc<dyn PrivilegeController>,
            probe: Arc::new(SoftwareProtectionProbe::intact()),
            loans: Arc::new(StaticLoanLedger::new(None)),
            transport: Arc::new(transport),
        },
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let mut config = EngineConfig {
        backend_url: cli.backend.clone(),
        api_key: cli.api_key.clone(),
        ..EngineConfig::default()
    };

    match &cli.command {
        Commands::Enroll => {
            let engine = build_engine(&cli, config)?;
            let snapshot = engine.enroll().await?;
            println!("Enrolled {} ({} {})", snapshot.device_id, snapshot.manufacturer, snapshot.model);
            println!("  inventory hash: {}", snapshot.app_inventory_hash);
        },
        Commands::Check => {
            let engine = build_engine(&cli, config)?;
            let report = engine.run_cycle().await?;
            println!("severity:   {}", report.status.severity);
            println!("flags:      {:?}", report.status.flags);
            println!("locked:     {}", report.locked);
            println!("protection: {}", if report.protection.is_intact() { "intact" } else { "DEGRADED" });
            println!("synced:     {}", report.synced);
            if report.inconclusive {
                println!("note: no baseline established - run `custos-agent enroll` first");
            }
        },
        Commands::Run { interval } => {
            config.poll_interval = Duration::from_secs(*interval);
            let engine = Arc::new(build_engine(&cli, config)?);
            let handle = custos_core::spawn_poller(Arc::clone(&engine));

            tokio::signal::ctrl_c().await?;
            handle.shutdown().await;
        },
        Commands::Info => {
            let engine = build_engine(&cli, config)?;
            match engine.lock_manager().active_lock(&cli.device_id)? {
                Some(lock) => {
                    println!("lock:    {:?} ({:?}, {:?})", lock.lock_type, lock.reason, lock.status);
                    println!("message: {}", lock.message);
                },
                None => println!("lock:    none"),
            }

            let verification = engine.audit().verify_chain()?;
            println!(
                "audit:   {} entries, chain {}",
                verification.entries_verified,
                if verification.valid { "intact" } else { "BROKEN" }
            );
            for error in &verification.errors {
                println!("  {error}");
            }
        },
    }

    Ok(())
}

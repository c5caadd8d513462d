use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use continuity_monitor::api::{create_api_router, AppState};
use continuity_monitor::monitoring::{
    Alert, HttpProbes, LogEmailSender, MonitoringScheduler, MonitoringService,
};
use continuity_monitor::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "continuity-monitor")]
#[command(about = "Health monitoring and alerting for session continuity")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler and the HTTP API (default)
    Serve {
        /// Override HTTP_PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one health check and print the report
    Check,
    /// Send a test alert through every configured channel
    TestAlert,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_service(config: &Config) -> Result<Arc<MonitoringService>> {
    let client = reqwest::Client::builder()
        .timeout(config.monitoring.probe_timeout())
        .build()
        .context("Failed to build probe HTTP client")?;
    let probes = HttpProbes::new(client, config.probe_base_url.clone()).into_probes();
    let service = MonitoringService::from_config(config, probes, Arc::new(LogEmailSender))?;
    Ok(Arc::new(service))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(config, port).await,
        Commands::Check => {
            let service = build_service(&config)?;
            let report = service.health_report().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::TestAlert => {
            let service = build_service(&config)?;
            let (outcome, deliveries) = service
                .dispatcher()
                .send_alert_and_wait(Alert::test())
                .await;
            println!("Outcome: {outcome:?}");
            for delivery in deliveries {
                match delivery.result {
                    Ok(()) => println!("  {}: delivered", delivery.channel),
                    Err(e) => println!("  {}: failed ({e})", delivery.channel),
                }
            }
            Ok(())
        }
    }
}

async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    let service = build_service(&config)?;

    let mut scheduler = MonitoringScheduler::new(service.clone(), &config.scheduler);
    scheduler.start()?;

    let app = create_api_router(AppState { service });
    let addr = SocketAddr::from(([0, 0, 0, 0], port.unwrap_or(config.http_port)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Continuity monitor listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await;

    scheduler.shutdown().await;
    served.context("HTTP server failed")
}

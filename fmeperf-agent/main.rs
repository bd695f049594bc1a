use anyhow::{bail, Context};
use axum::{response::IntoResponse, routing::get, Router};
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fmeperf::common::{Mmio, SimulatedFme};
use fmeperf::config::parse_event_list;
use fmeperf::counters::EventDescriptor;
use fmeperf::{
    AgentConfig, CollectorConfig, DeviceSource, FmeMetricExporter, FmePmu, MetricCollector,
    PerfVariant, PublishedAttributes,
};
use fmeperf_raw::fme::FEATURE_ID_GLOBAL_DPERF;
use fmeperf_raw::RegisterWindow;

#[derive(Parser, Debug)]
#[command(name = "fmeperf")]
#[command(about = "Performance counter exporter for FPGA Management Engine devices")]
struct Args {
    #[arg(
        long,
        help = "PCI BAR resource file holding the FME (e.g. /sys/bus/pci/devices/0000:5e:00.0/resource0)"
    )]
    resource: Option<PathBuf>,

    #[arg(
        long,
        default_value = "0",
        value_parser = parse_offset,
        help = "Offset of the global performance feature inside the BAR (hex with 0x)"
    )]
    offset: usize,

    #[arg(long, help = "Use a simulated FME instead of hardware", conflicts_with = "resource")]
    simulate: bool,

    #[arg(long, help = "Treat the feature as the reduced (dperf) variant")]
    dperf: bool,

    #[arg(long, default_value_t = 0, help = "PMU instance number (fme<N>)")]
    pmu_id: u32,

    #[arg(long, default_value_t = 1, help = "Number of ports present on the device")]
    ports: u8,

    #[arg(
        long = "event",
        help = "Event to count: name, name:port or raw 0x config word (repeatable, comma-separated)",
        action = clap::ArgAction::Append
    )]
    events: Vec<String>,

    #[arg(long, default_value_t = 1000, help = "Collection interval in milliseconds")]
    interval_ms: u64,

    #[arg(long, default_value = "0.0.0.0:9105", help = "Address to serve /metrics on")]
    listen: SocketAddr,

    #[arg(long, help = "List published events and exit")]
    list: bool,

    #[arg(long, help = "Print the --list output as JSON")]
    json: bool,

    #[arg(
        short,
        long,
        help = "Enable verbose logging (shows all counter register traffic)"
    )]
    verbose: bool,
}

fn parse_offset(s: &str) -> Result<usize, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset {s}: {e}"))
}

struct AppState {
    exporters: Vec<Arc<FmeMetricExporter>>,
}

async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    fmeperf::gather_metrics!(buffer, encoder, state.exporters);

    let content_type = encoder.format_type().to_string();
    (
        [("Content-Type", content_type)],
        String::from_utf8(buffer).unwrap_or_default(),
    )
}

#[derive(Serialize)]
struct Listing<'a> {
    pmu: &'a str,
    variant: PerfVariant,
    attributes: PublishedAttributes,
    events: &'a [&'static EventDescriptor],
}

fn print_listing(pmu: &FmePmu, json: bool) -> anyhow::Result<()> {
    let attributes = pmu.attributes()?;

    if json {
        let listing = Listing {
            pmu: pmu.name(),
            variant: pmu.variant(),
            attributes,
            events: pmu.events(),
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{} (global {} feature)", pmu.name(), pmu.variant());
    for (name, format) in &attributes.format {
        println!("  format/{name}: {format}");
    }
    println!("  cpumask: {}", attributes.cpumask);
    for (name, config) in &attributes.events {
        println!("  {}/{}/ = {}", pmu.name(), name, config);
    }
    Ok(())
}

fn build_config(args: &Args) -> anyhow::Result<AgentConfig> {
    let device = match (&args.resource, args.simulate) {
        (Some(path), false) => DeviceSource::Resource {
            path: path.clone(),
            offset: args.offset,
        },
        (None, true) => DeviceSource::Simulated,
        _ => bail!("Specify either --resource <PATH> or --simulate"),
    };

    let mut config = AgentConfig::new(device);
    config.pmu_id = args.pmu_id;
    config.ports = args.ports;
    config.variant = args.dperf.then_some(PerfVariant::Reduced);
    config.events = parse_event_list(&args.events).context("Invalid --event")?;
    config.interval = Duration::from_millis(args.interval_ms.max(1));
    config.listen = args.listen;
    Ok(config)
}

fn open_pmu(config: &AgentConfig) -> anyhow::Result<Arc<FmePmu>> {
    let window: Arc<dyn RegisterWindow> = match &config.device {
        DeviceSource::Resource { path, offset } => Mmio::instance()
            .feature_window(path, *offset)
            .with_context(|| format!("Failed to map {} at 0x{:x}", path.display(), offset))?,
        DeviceSource::Simulated => {
            let sim = match config.variant {
                Some(PerfVariant::Reduced) => SimulatedFme::with_feature_id(FEATURE_ID_GLOBAL_DPERF),
                _ => SimulatedFme::new(),
            };
            Arc::new(sim.free_running(64))
        }
    };

    let pmu = match config.variant {
        Some(variant) => FmePmu::new(config.pmu_id, window, variant, config.ports)?,
        None => FmePmu::attach(config.pmu_id, window, config.ports)
            .context("Failed to identify the performance feature")?,
    };
    Ok(Arc::new(pmu))
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::warn!("Shutdown triggered by Ctrl+C");
        },
        _ = terminate => {
            tracing::warn!("Shutdown triggered by SIGTERM");
        },
    }

    cancel_token.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = build_config(&args)?;
    let pmu = open_pmu(&config)?;

    if args.list {
        return print_listing(&pmu, args.json);
    }

    let requests = config.requests(&pmu);
    let exporter = Arc::new(FmeMetricExporter::new(Arc::clone(&pmu), &requests)?);

    let mut collector = MetricCollector::new(CollectorConfig {
        interval: config.interval,
    });
    collector.add_exporter(exporter);

    let state = Arc::new(AppState {
        exporters: collector.exporters(),
    });

    let cancel_token = CancellationToken::new();
    let collection_handle = collector.start(cancel_token.clone());

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    tracing::info!("Starting HTTP server on {}", config.listen);
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    tracing::info!("Server shutdown complete, waiting for collection loop to finish...");
    collection_handle.await?;

    tracing::info!("All sessions stopped, exiting");
    Ok(())
}

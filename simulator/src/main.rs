mod readings;

use chrono::{Offset, Utc};
use clap::{Parser, ValueEnum};
use dashboard::directory::DirectoryClient;
use dashboard::errors::Result;
use dashboard::model::{shape_of, DeviceKind, MetricShape};
use readings::Generator;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Role {
    Sensor,
    Actuator,
}

impl From<Role> for DeviceKind {
    fn from(role: Role) -> Self {
        match role {
            Role::Sensor => DeviceKind::Sensor,
            Role::Actuator => DeviceKind::Actuator,
        }
    }
}

/// Publishes a fake sensor or actuator AE and writes readings to its containers.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    #[arg(long, env = "SIM_CSE_URL", default_value = "http://127.0.0.1:8080")]
    cse_url: String,

    #[arg(long, env = "SIM_CSE_NAME", default_value = "cse-in")]
    cse_name: String,

    /// Resource name of the AE, also used for content labels
    #[arg(long, env = "SIM_NAME")]
    name: String,

    #[arg(long, value_enum, default_value_t = Role::Sensor)]
    kind: Role,

    #[arg(long, env = "SIM_INTERVAL_MS", default_value_t = 1000)]
    interval_ms: u64,

    #[arg(long, default_value = "3")]
    release_version: String,

    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

/// Containers of windowed metrics keep enough instances to fill a chart.
const WINDOWED_INSTANCES: usize = 50;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let kind = DeviceKind::from(args.kind);
    info!("Starting {} simulator {}", kind.label(), args.name);
    info!("CSE: {} ({}), interval: {}ms", args.cse_url, args.cse_name, args.interval_ms);

    let client = match DirectoryClient::new(
        &args.cse_url,
        format!("C{}", args.name),
        args.release_version.clone(),
        Duration::from_millis(args.timeout_ms),
        Utc.fix(),
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build broker client: {}", e);
            std::process::exit(1);
        }
    };

    let device = format!("{}/{}", args.cse_name, args.name);
    if let Err(e) = provision(&client, &args.cse_name, &args.name, kind).await {
        error!("Cannot provision {}: {}", device, e);
        std::process::exit(1);
    }

    let mut generator = Generator::new(kind);
    let mut rng = rand::thread_rng();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.interval_ms));
    let mut ticks = 0u64;
    let mut written = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping after {} readings", written);
                return;
            }
        }

        for reading in generator.tick(&mut rng) {
            let container = format!("{}/{}", device, reading.metric);
            match client.create_content(&container, &reading.content).await {
                Ok(_) => written += 1,
                Err(e) => warn!("Failed to write {}: {}", container, e),
            }
        }

        ticks += 1;
        if ticks % 100 == 0 {
            info!("Wrote {} readings", written);
        }
    }
}

/// Creates the AE and one container per metric; resources left by an
/// earlier run are reused.
async fn provision(client: &DirectoryClient, parent: &str, name: &str, kind: DeviceKind) -> Result<()> {
    existing(client.create_ae(parent, name, &[kind.label()], None, None).await)?;

    let device = format!("{}/{}", parent, name);
    for metric in kind.metrics() {
        let instances = match shape_of(metric) {
            MetricShape::Windowed => WINDOWED_INSTANCES,
            MetricShape::Latest => 1,
        };
        existing(client.create_container(&device, metric, instances).await)?;
    }
    info!("Provisioned {} with {} containers", device, kind.metrics().len());
    Ok(())
}

fn existing(result: Result<String>) -> Result<()> {
    match result {
        Err(e) if !e.is_conflict() => Err(e),
        _ => Ok(()),
    }
}

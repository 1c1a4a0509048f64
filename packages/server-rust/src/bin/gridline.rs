//! Gridline server binary.
//!
//! `gridline serve` runs everything in one process. `gridline service --kind
//! driver` and `gridline gateway` run the pieces separately.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use gridline_core::EntityKind;
use gridline_server::app::{AllInOne, AppConfig, GatewayProcess, ServiceProcess};
use gridline_server::service::EmissionMode;
use gridline_server::storage::StorageConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gridline", version)]
#[command(about = "Formula 1 driver and MotoGP rider registry")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "GRIDLINE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run both domain services and the gateway in one process
    Serve {
        #[command(flatten)]
        gateway: GatewayArgs,
        #[command(flatten)]
        rpc: RpcArgs,
        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Run one domain service behind its RPC listener
    Service {
        /// Entity kind to serve: driver or rider
        #[arg(long, env = "GRIDLINE_KIND")]
        kind: EntityKind,
        /// Listen address (defaults to 127.0.0.1:50052 for drivers, :50053 for riders)
        #[arg(long, env = "GRIDLINE_RPC_BIND")]
        bind: Option<SocketAddr>,
        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Run the gateway against remote domain services
    Gateway {
        #[command(flatten)]
        gateway: GatewayArgs,
        #[command(flatten)]
        rpc: RpcArgs,
    },
}

#[derive(Args)]
struct GatewayArgs {
    /// HTTP bind host
    #[arg(long, default_value = "0.0.0.0", env = "GRIDLINE_HOST")]
    host: String,
    /// HTTP port
    #[arg(short, long, default_value_t = 3000, env = "GRIDLINE_PORT")]
    port: u16,
    /// Allowed CORS origins, comma separated
    #[arg(long, default_value = "*", value_delimiter = ',', env = "GRIDLINE_CORS_ORIGINS")]
    cors_origins: Vec<String>,
    /// Seconds shutdown waits for in-flight requests
    #[arg(long, default_value_t = 30, env = "GRIDLINE_DRAIN_TIMEOUT_SECS")]
    drain_timeout_secs: u64,
}

#[derive(Args)]
struct RpcArgs {
    /// Driver service address
    #[arg(long, default_value = "127.0.0.1:50052", env = "GRIDLINE_DRIVERS_ADDR")]
    drivers_addr: String,
    /// Rider service address
    #[arg(long, default_value = "127.0.0.1:50053", env = "GRIDLINE_RIDERS_ADDR")]
    riders_addr: String,
    /// Connections per service
    #[arg(long, default_value_t = 4, env = "GRIDLINE_POOL_SIZE")]
    pool_size: usize,
    /// Per-call deadline in milliseconds
    #[arg(long, default_value_t = 10_000, env = "GRIDLINE_CALL_TIMEOUT_MS")]
    call_timeout_ms: u64,
}

#[derive(Args)]
struct ServiceArgs {
    /// When create publishes its audit event: outcome or pre-flight
    #[arg(long, default_value = "outcome", env = "GRIDLINE_EMISSION_MODE")]
    emission_mode: EmissionMode,
    /// redb database file; in-memory storage when unset
    #[arg(long, env = "GRIDLINE_DB_PATH")]
    db_path: Option<PathBuf>,
}

impl GatewayArgs {
    fn apply(self, config: &mut AppConfig) {
        config.gateway.host = self.host;
        config.gateway.port = self.port;
        config.gateway.cors_origins = self.cors_origins;
        config.gateway.drain_timeout = Duration::from_secs(self.drain_timeout_secs);
    }
}

impl RpcArgs {
    fn apply(self, config: &mut AppConfig) {
        let call_timeout = Duration::from_millis(self.call_timeout_ms);
        for (pool, endpoint) in [
            (&mut config.drivers_pool, self.drivers_addr),
            (&mut config.riders_pool, self.riders_addr),
        ] {
            pool.endpoint = endpoint;
            pool.pool_size = self.pool_size;
            pool.call_timeout = call_timeout;
        }
    }
}

impl ServiceArgs {
    fn apply(self, config: &mut AppConfig) {
        config.service.emission_mode = self.emission_mode;
        if let Some(path) = self.db_path {
            config.storage = StorageConfig::Redb { path };
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,gridline_server=debug,tower_http=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = AppConfig::default();
    match cli.command {
        Commands::Serve {
            gateway,
            rpc,
            service,
        } => {
            gateway.apply(&mut config);
            rpc.apply(&mut config);
            service.apply(&mut config);
            config.drivers_rpc.bind = parse_bind(&config.drivers_pool.endpoint)?;
            config.riders_rpc.bind = parse_bind(&config.riders_pool.endpoint)?;

            let app = AllInOne::start(config).await?;
            info!(
                gateway = %app.gateway_addr(),
                drivers = ?app.rpc_addr(EntityKind::Driver),
                riders = ?app.rpc_addr(EntityKind::Rider),
                "Gridline started"
            );
            app.run(shutdown_signal()).await
        }
        Commands::Service {
            kind,
            bind,
            service,
        } => {
            service.apply(&mut config);
            if let Some(bind) = bind {
                match kind {
                    EntityKind::Driver => config.drivers_rpc.bind = bind,
                    EntityKind::Rider => config.riders_rpc.bind = bind,
                }
            }
            let process = ServiceProcess::start(kind, config).await?;
            info!(%kind, rpc = %process.rpc_addr(), "Gridline service started");
            process.run(shutdown_signal()).await
        }
        Commands::Gateway { gateway, rpc } => {
            gateway.apply(&mut config);
            rpc.apply(&mut config);
            let process = GatewayProcess::start(config).await?;
            info!(gateway = %process.gateway_addr(), "Gridline gateway started");
            process.run(shutdown_signal()).await
        }
    }
}

fn parse_bind(endpoint: &str) -> Result<SocketAddr> {
    endpoint
        .parse()
        .map_err(|err| anyhow::anyhow!("invalid RPC address {endpoint}: {err}"))
}

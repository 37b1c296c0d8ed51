use clap::Parser;
use pkg_api::server::{ServerConfig, start_server};
use pkg_constants::network::DEFAULT_API_PORT;
use pkg_constants::paths::DEFAULT_SERVER_CONFIG;
use pkg_engine::ControlPlane;
use pkg_types::config::{ServerConfigFile, load_config_file};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kubesim-server", about = "In-memory Kubernetes/Docker control-plane simulator")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_SERVER_CONFIG)]
    config: String,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Seed for the simulation's random decisions
    #[arg(long)]
    seed: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    // Load config file (returns defaults if file not found)
    let file_cfg: ServerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let port = cli.port.or(file_cfg.port).unwrap_or(DEFAULT_API_PORT);
    let mut sim = file_cfg.sim.unwrap_or_default();
    if cli.seed.is_some() {
        sim.seed = cli.seed;
    }

    info!("Starting kubesim-server");
    info!("  Port:      {}", port);
    info!("  Seed:      {:?}", sim.seed);
    info!("  Nodes:     {}", sim.node_count);
    info!("  Tick:      {}ms", sim.tick_interval_ms);

    let engine = Arc::new(ControlPlane::realtime(sim));
    let _driver = engine.spawn_driver();

    let config = ServerConfig {
        addr: SocketAddr::from(([0, 0, 0, 0], port)),
    };
    start_server(config, engine).await?;

    Ok(())
}

use clap::Parser;
use log::info;
use rust_decimal::Decimal;
use server::world::WorldConfig;
use server::{ConfiguredStore, Server, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Shared fish tank session server")]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = shared::DEFAULT_PORT)]
    port: u16,

    /// Tick period in milliseconds
    #[arg(short, long, default_value_t = shared::DEFAULT_TICK_MS)]
    tick_ms: u64,

    /// Ticks between economy advancements
    #[arg(short, long, default_value_t = shared::ECONOMY_TICK_INTERVAL)]
    economy_every: u64,

    /// Maximum total mass the tank holds
    #[arg(long, default_value = "100")]
    tank_ceiling: Decimal,

    /// Food mass added per spawn
    #[arg(long, default_value = "1")]
    food_per_spawn: Decimal,

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value_t = server::config::DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Persist the world to this file
    #[arg(short, long)]
    state_file: Option<PathBuf>,

    /// Seed for session names
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        tick: Duration::from_millis(args.tick_ms),
        economy_every: args.economy_every,
        world: WorldConfig {
            tank_ceiling: args.tank_ceiling,
            food_per_spawn: args.food_per_spawn,
            ..WorldConfig::default()
        },
        max_clients: args.max_clients,
        state_file: args.state_file,
        seed: args.seed,
    };

    info!(
        "Starting server on {} ({}ms ticks, economy every {} ticks)",
        config.bind_addr(),
        args.tick_ms,
        config.economy_every
    );

    let store = ConfiguredStore::from_path(config.state_file.clone());
    let server = Server::new(config, store).await?;
    server.run().await?;

    info!("Server stopped");
    Ok(())
}

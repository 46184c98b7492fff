mod config;
mod server;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use config::{EchoConfig, Verbosity};
use server::EchoServer;
use tether::ServerConfig;

#[derive(Parser)]
#[command(name = "tether-server")]
#[command(about = "Echo server speaking the tether handshake protocol")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = tether::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value = "", help = "Password clients must present (empty for none)")]
    password: String,

    #[arg(short, long, default_value_t = tether::config::DEFAULT_CAPACITY)]
    capacity: usize,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(long, help = "Shut down after this many seconds")]
    duration: Option<u64>,

    #[arg(short, long, value_enum, default_value_t = Verbosity::Low)]
    verbosity: Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();
    config::init_logging(args.verbosity);

    let config = EchoConfig {
        tick_rate: args.tick_rate,
        duration: args.duration.map(Duration::from_secs),
        server: ServerConfig::new(args.password, args.capacity),
    };

    let mut server = EchoServer::bind((args.bind.as_str(), args.port), config)?;
    if let Some(addr) = server.local_addr() {
        log::info!("Server started on {}", addr);
    }
    server.run()?;
    log::info!("Server shutting down");

    Ok(())
}

mod config;
mod session;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use config::{ChatConfig, Verbosity};
use session::ChatSession;
use tether::ClientConfig;

#[derive(Parser)]
#[command(name = "tether-client")]
#[command(about = "Connects to a tether server and sends it messages")]
struct Args {
    #[arg(long, default_value = "127.0.0.1", help = "Server host name or address")]
    host: String,

    #[arg(short, long, default_value_t = tether::DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value = "")]
    password: String,

    #[arg(short, long, default_value_t = 60)]
    tick_rate: u32,

    #[arg(long, default_value_t = 1000, help = "Milliseconds to wait for replies before closing")]
    linger_ms: u64,

    #[arg(short, long, value_enum, default_value_t = Verbosity::Low)]
    verbosity: Verbosity,

    #[arg(help = "Messages to send; lines from stdin when omitted")]
    messages: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    config::init_logging(args.verbosity);

    let config = ChatConfig {
        tick_rate: args.tick_rate,
        linger: Duration::from_millis(args.linger_ms),
        client: ClientConfig::with_password(args.password),
    };

    let mut session = ChatSession::connect(&args.host, args.port, config)?;
    session.wait_until_connected()?;

    if args.messages.is_empty() {
        session.relay_stdin()?;
    } else {
        session.send_all(&args.messages)?;
    }

    session.close()
}

use std::io;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use relaymail::spool::{DeliveryAgent, FsSpool, SpoolStore, TcpConnector};
use relaymail::{Config, SmtpServer, console, logging};

/// Store-and-forward SMTP relay
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file read after the system-wide one
    #[arg(short, long, default_value = Config::LOCAL_PATH)]
    config: PathBuf,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Spool directory
    #[arg(long)]
    spool: Option<PathBuf>,

    /// Downstream relay receiving all spooled mail
    #[arg(long)]
    next_server: Option<String>,

    /// Name used in the greeting and in HELO
    #[arg(long)]
    hostname: Option<String>,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ref spool) = self.spool {
            config.spool = spool.clone();
        }
        if let Some(ref next_server) = self.next_server {
            config.next_server = Some(next_server.clone());
        }
        if let Some(ref hostname) = self.hostname {
            config.hostname = hostname.clone();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose).context("Failed to initialize logging")?;

    let mut config = Config::load(&[PathBuf::from(Config::SYSTEM_PATH), cli.config.clone()])?;
    cli.apply(&mut config);

    let spool: Arc<dyn SpoolStore> = Arc::new(
        FsSpool::open(&config.spool)
            .with_context(|| format!("Can't open spool directory {}", config.spool.display()))?,
    );
    info!(spool = %config.spool.display(), "spool ready");

    match config.next_server {
        Some(ref host) => {
            DeliveryAgent::new(
                Arc::clone(&spool),
                Box::new(TcpConnector::new(host, config.next_server_port)),
                &config.hostname,
            )
            .with_policy(config.retry_policy())
            .with_interval(config.scan_interval())
            .spawn()
            .context("Can't start delivery thread")?;
            info!(%host, port = config.next_server_port, "forwarding spooled mail");
        }
        None => error!("No next_server configured; spooled mail will not be delivered"),
    }

    let server = SmtpServer::new(&config.hostname, Arc::clone(&spool));
    match TcpListener::bind(config.listen_addr()) {
        Ok(listener) => {
            thread::Builder::new()
                .name("smtp-accept".to_string())
                .spawn(move || {
                    if let Err(e) = server.serve(listener) {
                        error!("Accept loop ended: {e}");
                    }
                })
                .context("Can't start accept thread")?;
        }
        Err(e) => warn!(addr = %config.listen_addr(), "Network failed to initialize: {e}"),
    }

    console::command_loop(io::stdin().lock(), io::stdout(), spool.as_ref())?;
    info!("shutting down");
    Ok(())
}

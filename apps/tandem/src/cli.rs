use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "tandem", about = "Two-party call client (headless probe)")]
pub struct Cli {
    /// Relay WebSocket URL; overrides TANDEM_RELAY_URL.
    #[arg(long)]
    pub relay_url: Option<String>,

    /// Seconds the guest waits for the host's offer before giving up.
    #[arg(long)]
    pub offer_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the capture devices the headless backend reports.
    Devices,
}

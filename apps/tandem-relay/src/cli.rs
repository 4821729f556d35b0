use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::info;

use tandem_proto::{ClientMessage, ServerMessage};

#[derive(Parser)]
#[command(name = "tandem-relay", about = "Signaling relay for tandem calls")]
pub struct Cli {
    /// Override the listen port from TANDEM_RELAY_PORT.
    #[arg(long)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to a running relay as a throwaway client: identify, join
    /// the queue and print every message until paired.
    Probe {
        #[arg(long, default_value = "ws://127.0.0.1:4000/ws")]
        url: String,
    },
}

pub async fn run_probe(url: String) -> Result<()> {
    let (ws, _) = connect_async(&url)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    let (mut sink, mut stream) = ws.split();

    for msg in [ClientMessage::Identify, ClientMessage::QueueJoin] {
        sink.send(Message::text(serde_json::to_string(&msg)?)).await?;
    }

    while let Some(frame) = stream.next().await {
        let frame = frame?;
        let Message::Text(text) = frame else { continue };
        let message: ServerMessage =
            serde_json::from_str(&text).with_context(|| format!("parsing {text}"))?;
        println!("{message:?}");
        if let ServerMessage::PairFound { session_id, role, .. } = message {
            info!(session = %session_id, ?role, "paired, probe done");
            break;
        }
    }
    Ok(())
}

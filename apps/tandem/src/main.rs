use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use tandem_client::{
    cli::{Cli, Commands},
    config::Config,
    media::{DeviceCapture, HeadlessCapture},
    session::{self, SessionConfig, SessionNotice},
    transport::mock::MockTransportFactory,
};

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let capture = Arc::new(HeadlessCapture::new());

    if let Some(Commands::Devices) = cli.command {
        match capture.enumerate().await {
            Ok(devices) => {
                for device in devices {
                    println!("{:?}\t{}\t{}", device.kind, device.id, device.label);
                }
            }
            Err(err) => {
                error!("device enumeration failed: {err}");
                std::process::exit(1);
            }
        }
        return;
    }

    let mut config = Config::from_env();
    if let Some(url) = cli.relay_url {
        config.relay_url = url;
    }
    if let Some(secs) = cli.offer_timeout {
        config.offer_timeout = Duration::from_secs(secs);
    }

    let session_config = SessionConfig {
        relay_url: config.relay_url.clone(),
        offer_timeout: config.offer_timeout,
        constraints: Default::default(),
    };

    // The probe binary negotiates over the in-process transport; a real
    // media backend supplies its own factory here.
    let factory = Arc::new(MockTransportFactory::new());

    let mut handle = match session::start(session_config, capture, factory).await {
        Ok(handle) => handle,
        Err(err) => {
            error!("could not start session: {err}");
            std::process::exit(1);
        }
    };

    info!("connected to relay at {}, joining the queue", config.relay_url);
    handle.join_queue();

    loop {
        tokio::select! {
            notice = handle.next_notice() => match notice {
                Some(SessionNotice::UsersOnline(n)) => info!("{n} clients online"),
                Some(SessionNotice::Connected) => {
                    // The mock transport only pairs halves created in one
                    // process; against a separate probe the greeting goes
                    // nowhere, so don't pretend otherwise.
                    info!("peer connected (chat crosses only between in-process transports)");
                    handle.send_chat(b"hello from the tandem probe".to_vec());
                }
                Some(SessionNotice::RemoteStream(stream)) => {
                    info!("remote stream attached: {}", stream.label());
                }
                Some(SessionNotice::ChatMessage(bytes)) => {
                    info!("chat: {}", String::from_utf8_lossy(&bytes));
                }
                Some(SessionNotice::Ended) => {
                    info!("call ended");
                    break;
                }
                Some(SessionNotice::Failed(err)) => {
                    error!("session failed: {err}");
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, hanging up");
                handle.hang_up();
            }
        }
    }

    handle.join().await;
}

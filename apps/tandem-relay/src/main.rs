use clap::Parser;
use tracing::{error, info};

use tandem_relay::{
    cli::{run_probe, Cli, Commands},
    config::Config,
    router,
    websocket::RelayState,
};

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Some(Commands::Probe { url }) = cli.command {
        if let Err(err) = run_probe(url).await {
            error!("probe failed: {err:#}");
            std::process::exit(1);
        }
        return;
    }

    let mut config = Config::from_env();
    if let Some(port) = cli.port {
        config.port = port;
    }

    let app = router(RelayState::new());
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listen address");

    info!("tandem relay listening on {addr}");

    axum::serve(listener, app)
        .await
        .expect("server error");
}

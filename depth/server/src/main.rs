use clap::Parser;
use depth_pipeline::Provider;
use depth_server::{
    env::{init_console_subscriber, Config},
    http,
};
use std::net::SocketAddr;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_console_subscriber();
    let cli = Config::parse();
    debug!("{}", serde_json::to_string_pretty(&cli)?);

    let provider = Provider::from_config(&cli.pipeline)?;
    info!(provider = ?provider.kind(), "depth provider configured");

    // Define the server address
    let addr = {
        let host = "0.0.0.0";
        let addr = format!("{}:{}", host, cli.http_port);
        addr.parse::<SocketAddr>()
    }?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server started at {}", listener.local_addr()?);

    // Keep the server running until Ctrl+C is pressed
    axum::serve(listener, http::router(provider))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for ctrl-c: {}", e);
            }
        })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

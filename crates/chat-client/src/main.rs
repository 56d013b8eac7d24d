//! Chat client entry point
//!
//! Run with:
//! ```bash
//! BOT_TOKEN=... cargo run -p chat-client
//! ```
//!
//! Connects, logs every event, and stops on Ctrl-C.

use chat_client::Client;
use chat_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env()?;

    if let Err(e) = try_init_tracing_with_config(&TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        env = ?config.app.env,
        intents = config.gateway.intents.bits(),
        "Configuration loaded"
    );

    let client = Client::new(config)?;
    client.on(|event| info!(event = event.name(), "Event"));
    client.start().await?;

    tokio::select! {
        result = client.wait() => {
            if let Err(e) = &result {
                error!(error = %e, "Client exited");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            client.stop().await;
        }
    }

    Ok(())
}

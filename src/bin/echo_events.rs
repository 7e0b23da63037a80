//! Connects with the token from `FILAMENT_TOKEN` and logs incoming events
//! until Ctrl-C.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use filament::{Client, ClientConfig, Intents, ShardEvent};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let intents = Intents::GUILDS | Intents::GUILD_MESSAGES | Intents::MESSAGE_CONTENT;
    let mut client = Client::new(ClientConfig::from_env(intents)?);

    client.registry().on_fn("READY", |event| async move {
        if let ShardEvent::Ready {
            shard, session_id, ..
        } = event
        {
            info!(shard, %session_id, "shard ready");
        }
        Ok(())
    });

    client.registry().on_fn("MESSAGE_CREATE", |event| async move {
        if let ShardEvent::Dispatch { shard, data, .. } = event {
            let author = data
                .pointer("/author/username")
                .and_then(|v| v.as_str())
                .unwrap_or("?");
            let content = data.get("content").and_then(|v| v.as_str()).unwrap_or("");
            info!(shard, author, content, "message");
        }
        Ok(())
    });

    client.start().await?;
    info!("connected, press Ctrl-C to exit");

    tokio::signal::ctrl_c().await?;
    client.shutdown().await;
    Ok(())
}

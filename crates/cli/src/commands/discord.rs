//! `parley discord`: Run the bot until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use parley_channels::DiscordChannel;
use tracing::info;

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    config.require_bot_token()?;

    let channel = Arc::new(DiscordChannel::from_config(&config.discord)?);
    let gateway = Arc::new(super::build_gateway(&config, channel)?);

    let shutdown = gateway.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            shutdown.cancel();
        }
    });

    info!(
        require_mention = config.discord.require_mention,
        window_size = config.memory.window_size,
        "Starting Discord bot"
    );
    gateway.run().await?;
    info!("Discord bot stopped");
    Ok(())
}

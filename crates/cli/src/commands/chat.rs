//! `parley chat`: Terminal conversation through the same gateway as Discord.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parley_channels::CliChannel;
use parley_gateway::GatewaySettings;

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let channel = Arc::new(CliChannel::new());

    let gateway = super::build_gateway(&config, channel)?;
    let gateway = Arc::new(gateway.with_settings(GatewaySettings {
        chunk_delay: Duration::ZERO,
        ..GatewaySettings::from_config(&config)
    }));

    println!("Parley ({} / {})", config.model.provider, config.model.name);
    println!("Type a message. `!reset` clears the history, `exit` quits.\n");

    let shutdown = gateway.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    gateway.run().await?;
    println!("Goodbye!");
    Ok(())
}

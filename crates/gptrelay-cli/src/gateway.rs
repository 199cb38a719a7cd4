//! Gateway command: wires the bus, sessions, dispatcher, and channels.
//!
//! Startup sequence:
//! 1. Load config
//! 2. Create message bus
//! 3. Create provider, session store, expiry sweeper, session manager
//! 4. Create channel manager, register configured channels
//! 5. Run dispatcher + sweeper + channel manager under one `tokio::select!`
//! 6. Ctrl+C stops the sweeper and the channels

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use gptrelay_channels::ChannelManager;
use gptrelay_chat::Dispatcher;
use gptrelay_core::bus::MessageBus;
use gptrelay_core::config::{get_config_path, load_config};
use gptrelay_core::utils::mask_secret;

use crate::helpers;

/// Run the gateway until Ctrl+C.
pub async fn run() -> Result<()> {
    helpers::print_banner();
    println!("  Mode: Gateway");
    println!();

    let config = load_config(None);
    let bus = Arc::new(MessageBus::new(config.dispatch.bus_capacity.max(1)));

    let (sessions, sweeper) = crate::build_sessions(&config)?;
    let prefix = config.discord.command_prefix.clone();
    let dispatcher = Dispatcher::new(
        bus.clone(),
        sessions.clone(),
        prefix.clone(),
        config.dispatch.max_concurrent_messages,
    );

    #[allow(unused_mut)]
    let mut channel_manager = ChannelManager::new(bus.clone());

    #[cfg(feature = "discord")]
    {
        let dc = &config.discord;
        if dc.is_configured() {
            use gptrelay_channels::discord::DiscordChannel;
            let discord = DiscordChannel::new(dc.token.clone(), bus.clone(), prefix.clone())?;
            channel_manager.register(Arc::new(discord));
        }
    }

    info!(
        model = %config.provider.model,
        api_base = %config.provider.api_base,
        channels = ?channel_manager.channel_names(),
        session_timeout_s = config.sessions.timeout_secs,
        "gateway starting"
    );

    println!("  Model:     {}", config.provider.model);
    println!("  API key:   {}", mask_secret(&config.provider.api_key));
    println!("  Sessions:  expire after {}s", config.sessions.timeout_secs);
    println!("  Channels:  {} registered", channel_manager.len());
    println!();

    if channel_manager.is_empty() {
        println!("  ⚠  No channels registered. Set discord.token in");
        println!("     {}", helpers::display_path(&get_config_path()));
        println!("     or GPTRELAY_DISCORD__TOKEN to connect to Discord.");
        println!();
    }

    println!("  Ctrl+C to stop");
    println!();

    let sweeper_task = {
        let sweeper = sweeper.clone();
        tokio::spawn(async move { sweeper.start().await })
    };

    tokio::select! {
        _ = dispatcher.run() => {
            info!("dispatcher exited");
        }
        result = channel_manager.start_all(), if !channel_manager.is_empty() => {
            if let Err(e) = result {
                error!(error = %e, "channel manager error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("  Shutting down...");
            info!("received Ctrl+C, shutting down");
        }
    }

    sweeper.stop();
    channel_manager.stop_all().await;
    if let Err(e) = sweeper_task.await {
        error!(error = %e, "expiry sweeper task failed");
    }

    println!("  Gateway stopped. Goodbye!");
    Ok(())
}

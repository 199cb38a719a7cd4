//! Channel manager: channel lifecycle and outbound routing.
//!
//! - Register channels by name
//! - Start every channel in its own task
//! - Route replies from the bus to the channel named in each message

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use gptrelay_core::bus::MessageBus;

use crate::base::Channel;

// ─────────────────────────────────────────────
// ChannelManager
// ─────────────────────────────────────────────

pub struct ChannelManager {
    /// Registered channels, keyed by name.
    channels: HashMap<String, Arc<dyn Channel>>,
    bus: Arc<MessageBus>,
    /// Flips to `true` once on shutdown.
    shutdown: watch::Sender<bool>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            channels: HashMap::new(),
            bus,
            shutdown,
        }
    }

    /// Register a channel. Overwrites any previous channel with the same name.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registered channel");
        self.channels.insert(name, channel);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(name)
    }

    /// Names of all registered channels, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Start all channels plus the outbound router, then wait for shutdown.
    ///
    /// Returns immediately when no channel is registered.
    pub async fn start_all(&self) -> Result<()> {
        if self.channels.is_empty() {
            warn!("no channels registered, nothing to start");
            return Ok(());
        }

        info!(
            channels = ?self.channel_names(),
            "starting {} channel(s)",
            self.channels.len()
        );

        for (name, channel) in &self.channels {
            let ch = Arc::clone(channel);
            let ch_name = name.clone();
            tokio::spawn(async move {
                info!(channel = %ch_name, "channel starting");
                if let Err(e) = ch.start().await {
                    error!(channel = %ch_name, error = %e, "channel failed");
                }
                info!(channel = %ch_name, "channel stopped");
            });
        }

        tokio::spawn(Self::dispatch_outbound(
            Arc::clone(&self.bus),
            self.channels.clone(),
            self.shutdown.subscribe(),
        ));

        let mut shutdown = self.shutdown.subscribe();
        let _ = shutdown.wait_for(|stop| *stop).await;

        info!("channel manager shutting down");
        Ok(())
    }

    /// Stop all channels and the outbound router.
    pub async fn stop_all(&self) {
        info!("stopping all channels");
        self.shutdown.send_replace(true);

        for (name, channel) in &self.channels {
            debug!(channel = %name, "stopping channel");
            if let Err(e) = channel.stop().await {
                error!(channel = %name, error = %e, "channel stop failed");
            }
        }

        info!("all channels stopped");
    }

    /// Route each outbound reply to the channel it names.
    async fn dispatch_outbound(
        bus: Arc<MessageBus>,
        channels: HashMap<String, Arc<dyn Channel>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("outbound router started");

        loop {
            tokio::select! {
                msg = bus.consume_outbound() => {
                    let Some(outbound) = msg else {
                        info!("outbound bus closed, router exiting");
                        break;
                    };

                    debug!(
                        channel = %outbound.channel,
                        chat_id = %outbound.chat_id,
                        content_len = outbound.content.len(),
                        "routing outbound message"
                    );

                    match channels.get(&outbound.channel) {
                        Some(channel) => {
                            if let Err(e) = channel.send(&outbound).await {
                                error!(
                                    channel = %outbound.channel,
                                    chat_id = %outbound.chat_id,
                                    error = %e,
                                    "failed to send reply"
                                );
                            }
                        }
                        None => warn!(
                            channel = %outbound.channel,
                            "no channel registered for outbound message"
                        ),
                    }
                }
                _ = async { shutdown.wait_for(|stop| *stop).await.map(|_| ()) } => {
                    info!("outbound router received shutdown signal");
                    break;
                }
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use gptrelay_core::bus::OutboundMessage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct MockChannel {
        channel_name: String,
        stopped: Arc<AtomicBool>,
        send_count: Arc<AtomicUsize>,
    }

    impl MockChannel {
        fn new(name: &str) -> Self {
            Self {
                channel_name: name.into(),
                stopped: Arc::new(AtomicBool::new(false)),
                send_count: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait::async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            &self.channel_name
        }

        async fn start(&self) -> anyhow::Result<()> {
            // Simulate a long-running listener
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn send(&self, _msg: &OutboundMessage) -> anyhow::Result<()> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn new_manager() -> ChannelManager {
        ChannelManager::new(Arc::new(MessageBus::new(32)))
    }

    #[test]
    fn test_new_manager_empty() {
        let mgr = new_manager();
        assert!(mgr.is_empty());
        assert_eq!(mgr.len(), 0);
    }

    #[test]
    fn test_register_and_overwrite() {
        let mut mgr = new_manager();
        mgr.register(Arc::new(MockChannel::new("discord")));
        mgr.register(Arc::new(MockChannel::new("discord")));
        mgr.register(Arc::new(MockChannel::new("cli")));

        assert_eq!(mgr.len(), 2);
        assert!(mgr.get("discord").is_some());
        assert!(mgr.get("slack").is_none());
        assert_eq!(mgr.channel_names(), vec!["cli", "discord"]);
    }

    #[tokio::test]
    async fn test_start_all_empty() {
        let mgr = new_manager();
        assert!(mgr.start_all().await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_all_stops_channels_and_wakes_start() {
        let mut mgr = new_manager();
        let ch = Arc::new(MockChannel::new("discord"));
        let stopped = ch.stopped.clone();
        mgr.register(ch);
        let mgr = Arc::new(mgr);

        let runner = mgr.clone();
        let handle = tokio::spawn(async move { runner.start_all().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        mgr.stop_all().await;

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("start_all did not return")
            .unwrap()
            .unwrap();
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dispatch_outbound_routes_by_channel() {
        let bus = Arc::new(MessageBus::new(32));

        let discord = Arc::new(MockChannel::new("discord"));
        let cli = Arc::new(MockChannel::new("cli"));
        let discord_count = discord.send_count.clone();
        let cli_count = cli.send_count.clone();

        let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
        channels.insert("discord".into(), discord);
        channels.insert("cli".into(), cli);

        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(ChannelManager::dispatch_outbound(bus.clone(), channels, rx));

        for (channel, chat) in [("discord", "c1"), ("cli", "cli"), ("discord", "c2"), ("nowhere", "x")] {
            bus.publish_outbound(OutboundMessage::new(channel, chat, "reply"))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.send_replace(true);
        handle.await.unwrap();

        assert_eq!(discord_count.load(Ordering::SeqCst), 2);
        assert_eq!(cli_count.load(Ordering::SeqCst), 1);
    }
}

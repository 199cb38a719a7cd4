//! Channel trait: the interface every chat platform implements.
//!
//! A channel publishes what its users write to the bus as `InboundMessage`s
//! and delivers `OutboundMessage` replies back to the platform.

use async_trait::async_trait;
use gptrelay_core::bus::OutboundMessage;

/// Every chat platform implements this trait.
///
/// The `ChannelManager` holds `Arc<dyn Channel>` and drives start/stop/send.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique channel name (e.g. "discord").
    ///
    /// Must match `InboundMessage.channel` for replies to find their way back.
    fn name(&self) -> &str;

    /// Listen for incoming messages until `stop()` is called.
    async fn start(&self) -> anyhow::Result<()>;

    /// Graceful shutdown.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Deliver a reply to the platform.
    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()>;
}

//! gptrelay channels: chat platform integrations.
//!
//! - **base**: the `Channel` trait every platform implements
//! - **manager**: `ChannelManager`, channel lifecycle and outbound routing
//! - **discord** (feature `discord`): Discord Gateway + REST channel

pub mod base;
pub mod manager;

#[cfg(feature = "discord")]
pub mod discord;

pub use base::Channel;
pub use manager::ChannelManager;

//! gptrelay core: types shared by every other crate in the workspace.
//!
//! - [`bus`]: inbound/outbound message types and the async [`bus::queue::MessageBus`]
//! - [`config`]: JSON config schema, loading, and env var overrides
//! - [`types`]: session keys and the chat completion wire format
//! - [`utils`]: data paths and string helpers

pub mod bus;
pub mod config;
pub mod types;
pub mod utils;

pub use types::SessionKey;

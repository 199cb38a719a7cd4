//! Conversation layer for gptrelay.
//!
//! One [`session::Session`] per (server, channel) pair holds the prompt history
//! of that conversation. The [`store::SessionStore`] owns every live session,
//! the [`sweeper::ExpirySweeper`] evicts them once their deadline passes, and
//! the [`dispatcher::Dispatcher`] turns inbound bus messages into replies.
//!
//! # Locking
//!
//! - The store map sits behind one mutex; `get_or_create`, `remove`, and
//!   `remove_expired` are mutually exclusive and never await.
//! - Each session has its own history lock plus a FIFO turn queue, so
//!   completions for different channels run concurrently while turns in one
//!   channel run strictly one after another.
//! - Lock order is store, then session. A session never touches the store.

pub mod clock;
pub mod command;
pub mod dispatcher;
pub mod manager;
pub mod session;
pub mod store;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::Command;
pub use dispatcher::Dispatcher;
pub use manager::SessionManager;
pub use session::{PendingTurn, ServedTurn, Session, COMPLETION_FAILED_REPLY};
pub use store::SessionStore;
pub use sweeper::ExpirySweeper;

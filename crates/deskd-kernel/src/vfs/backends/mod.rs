//! VFS transports.
//!
//! Transports implement [`Transport`](super::Transport) for different
//! storage types.

mod local;
mod memory;

pub use local::{LocalTransport, USERNAME_PLACEHOLDER};
pub use memory::MemoryTransport;

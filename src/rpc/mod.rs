//! JSON-RPC over stdio: wire types, line transport and the client channel

pub mod channel;
pub mod protocol;
pub mod transport;

pub use channel::{ChannelOptions, ChannelState, ServerCommand, StdioChannel};
pub use transport::LineTransport;

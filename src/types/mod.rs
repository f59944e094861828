//! Shared error types

mod errors;

pub use errors::{ChannelError, ConfigError, DatabaseError, MonitorError, Result};

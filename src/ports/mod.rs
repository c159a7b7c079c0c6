//! Port traits the domain depends on.

pub mod clock_port;
pub mod config_port;
pub mod store_port;

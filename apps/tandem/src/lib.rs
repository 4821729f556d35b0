//! Client side of the tandem calling system: relay connection, session
//! state machine and driver, plus the capture and transport contracts a
//! real media backend plugs into.

pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod relay;
pub mod session;
pub mod transport;

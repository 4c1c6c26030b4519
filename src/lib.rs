mod blocking;
mod client;
pub mod capture;
pub mod config;
mod error;
pub mod keyword;
pub mod orchestrator;
pub mod playback;

#[cfg(test)]
mod testing;

pub use realtime_voice_types as types;
pub use realtime_voice_utils as utils;

pub use client::{connect, Client, ClientTx, ServerRx, SessionApi, Stats};
pub use config::{Config, ConfigError, SessionConfig};
pub use error::{Error, Result};
pub use orchestrator::{forward_server_events, Components, Input, ListeningState, Notification, Orchestrator, Tones};

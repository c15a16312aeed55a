//! Offline-capable playback core for Subsonic-compatible servers. Wraps
//! the platform download and playback engines behind reconciled, observable
//! state the UI layer can render directly.

mod impls;

pub mod config;
pub mod services;
pub mod storage;
pub mod types;

pub use config::Config;
pub use subsonic_client;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! `donna-core` — configuration, errors, and identifiers shared by every
//! Donna crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::DonnaConfig;
pub use error::{DonnaError, Result};

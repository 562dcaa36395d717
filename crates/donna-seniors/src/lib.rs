//! `donna-seniors` — read access to senior profiles.
//!
//! Profiles are administered by the external CRUD surface; the core only
//! reads the columns it needs (name, phone, timezone, interests, notes).

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, SeniorError};
pub use store::SeniorStore;
pub use types::SeniorProfile;
